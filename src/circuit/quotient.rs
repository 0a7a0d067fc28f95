//! Quotient shares: rational scores that are never actually divided.

use crate::backend::{ArithShare, BackendError, BoolShare, MpcBackend};

/// Logical fraction `num / den` over arithmetic shares.
///
/// The secure path never divides; quotients are compared by
/// cross-multiplication inside the tournament gadgets.
#[derive(Debug, Clone, Copy)]
pub struct ArithQuotient {
    /// Scaled score sum `N`.
    pub num: ArithShare,
    /// Effective weight sum `D`.
    pub den: ArithShare,
}

/// Per-field contribution to a row's quotient.
///
/// `fw` is `weight * comparison * presence`, `w` is `weight * presence`.
#[derive(Debug, Clone, Copy)]
pub struct FieldWeight {
    /// Field-weight addend of the numerator.
    pub fw: ArithShare,
    /// Effective-weight addend of the denominator.
    pub w: ArithShare,
}

/// Tournament candidate: a quotient plus shares permuted alongside it.
///
/// The lane argmax attaches the constant row-index vector as a target; the
/// permutation maximiser runs with no targets.
#[derive(Debug, Clone)]
pub struct MaxCandidate {
    /// The score quotient under comparison.
    pub quotient: ArithQuotient,
    /// Shares that follow the winning quotient through each selection.
    pub targets: Vec<BoolShare>,
}

/// Sums all field weights into a single quotient `(N, D)`.
pub fn sum_field_weights<B: MpcBackend>(
    backend: &mut B,
    weights: &[FieldWeight],
) -> Result<ArithQuotient, BackendError> {
    let (first, rest) = weights
        .split_first()
        .expect("at least one field weight per row");
    let mut num = first.fw;
    let mut den = first.w;
    for weight in rest {
        num = backend.arith_add(num, weight.fw)?;
        den = backend.arith_add(den, weight.w)?;
    }
    Ok(ArithQuotient { num, den })
}
