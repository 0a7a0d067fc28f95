//! Reusable circuit gadgets: comparison coefficients, quotient tournaments
//! and lane reductions.
//!
//! Every gadget is written against the [`MpcBackend`] contract and works on
//! SIMD shares; none of them reveal anything.

use std::path::Path;

use crate::backend::{ArithShare, BackendError, BoolShare, BooleanSharing, MpcBackend};
use crate::circuit::quotient::{ArithQuotient, MaxCandidate};

/// Converts an arithmetic share into the active boolean sharing.
pub fn to_bool<B: MpcBackend>(backend: &mut B, share: ArithShare) -> Result<BoolShare, BackendError> {
    match backend.boolean_sharing() {
        BooleanSharing::Yao => backend.a2y(share),
        BooleanSharing::Gmw => backend.a2b(share),
    }
}

/// Converts a boolean share into an arithmetic share.
pub fn to_arith<B: MpcBackend>(
    backend: &mut B,
    share: BoolShare,
) -> Result<ArithShare, BackendError> {
    match backend.boolean_sharing() {
        BooleanSharing::Yao => backend.y2a(share),
        BooleanSharing::Gmw => backend.b2a(share),
    }
}

/// Secure population count: a balanced reduction tree over the payload bits.
///
/// The result is exactly `hw_bits(width)` bits wide. The adder tree itself
/// over-declares by one bit whenever the payload width is not a power of
/// two; the count always fits `hw_bits(width)`, so the surplus high wire is
/// dropped before returning.
pub fn hammingweight<B: MpcBackend>(
    backend: &mut B,
    share: BoolShare,
) -> Result<BoolShare, BackendError> {
    let mut layer = Vec::with_capacity(share.bitlen() as usize);
    for bit in 0..share.bitlen() {
        layer.push(backend.bool_bit(share, bit)?);
    }
    while layer.len() > 1 {
        let mut next = Vec::with_capacity(layer.len() / 2 + 1);
        let mut pairs = layer.chunks_exact(2);
        for pair in &mut pairs {
            next.push(backend.add_b(pair[0], pair[1])?);
        }
        if let [leftover] = pairs.remainder() {
            next.push(*leftover);
        }
        layer = next;
    }
    let sum = layer[0];
    let width = crate::num::hw_bits(share.bitlen() as usize) as u16;
    if sum.bitlen() > width {
        return backend.bool_truncate(sum, width);
    }
    Ok(sum)
}

/// Set-similarity coefficient of two payloads, to `prec` fractional bits.
///
/// `hw_x` and `hw_y` are the precomputed population counts of `x` and `y`;
/// only `popcount(x AND y)` is computed inside the circuit. The shift by
/// `prec + 1` folds the coefficient's factor 2 into the fixed-point scale,
/// and the division runs through the fixed-shape 16-bit sub-circuit.
pub fn set_similarity<B: MpcBackend>(
    backend: &mut B,
    x: BoolShare,
    y: BoolShare,
    hw_x: BoolShare,
    hw_y: BoolShare,
    prec: usize,
    div_circuit: &Path,
) -> Result<BoolShare, BackendError> {
    let conj = backend.and(x, y)?;
    let hw_and = hammingweight(backend, conj)?;
    let shifted = backend.shl_const(hw_and, prec as u16 + 1)?;
    let hw_sum = backend.add_b(hw_x, hw_y)?;
    backend.sub_circuit_div(div_circuit, shifted, hw_sum)
}

/// Payload equality as a single-bit share.
pub fn equality<B: MpcBackend>(
    backend: &mut B,
    x: BoolShare,
    y: BoolShare,
) -> Result<BoolShare, BackendError> {
    backend.eq(x, y)
}

/// One tournament duel: selects the better of two candidates, lane-wise.
///
/// `right` wins only when it strictly beats `left`:
/// `left.num * right.den < right.num * left.den`, or `left` has a zero
/// denominator while `right` does not. On ties `left` survives, which is what
/// makes the reductions stable (earlier candidate, lower row index).
fn duel<B: MpcBackend>(
    backend: &mut B,
    left: &MaxCandidate,
    right: &MaxCandidate,
) -> Result<MaxCandidate, BackendError> {
    let nvals = left.quotient.num.nvals();

    let left_cross = backend.arith_mul(left.quotient.num, right.quotient.den)?;
    let right_cross = backend.arith_mul(right.quotient.num, left.quotient.den)?;
    let left_cross_b = to_bool(backend, left_cross)?;
    let right_cross_b = to_bool(backend, right_cross)?;
    let strictly_greater = backend.lt(left_cross_b, right_cross_b)?;

    // A zero-denominator incumbent loses to any rival with substance.
    let left_den_b = to_bool(backend, left.quotient.den)?;
    let right_den_b = to_bool(backend, right.quotient.den)?;
    let zero = backend.bool_constant(0, left_den_b.bitlen(), nvals)?;
    let left_empty = backend.eq(left_den_b, zero)?;
    let right_has_weight = {
        let right_empty = backend.eq(right_den_b, zero)?;
        backend.not(right_empty)?
    };
    let takeover = backend.and(left_empty, right_has_weight)?;
    let select_right = backend.or(strictly_greater, takeover)?;

    let left_num_b = to_bool(backend, left.quotient.num)?;
    let right_num_b = to_bool(backend, right.quotient.num)?;
    let num_b = backend.mux(select_right, right_num_b, left_num_b)?;
    let den_b = backend.mux(select_right, right_den_b, left_den_b)?;

    let mut targets = Vec::with_capacity(left.targets.len());
    for (&left_target, &right_target) in left.targets.iter().zip(&right.targets) {
        targets.push(backend.mux(select_right, right_target, left_target)?);
    }

    Ok(MaxCandidate {
        quotient: ArithQuotient {
            num: to_arith(backend, num_b)?,
            den: to_arith(backend, den_b)?,
        },
        targets,
    })
}

/// Maximum over a list of candidates (e.g. one per group permutation).
///
/// Adjacent-pair tournament; ties keep the earlier candidate, so the
/// earliest permutation wins.
pub fn tournament_max<B: MpcBackend>(
    backend: &mut B,
    mut candidates: Vec<MaxCandidate>,
) -> Result<MaxCandidate, BackendError> {
    assert!(!candidates.is_empty(), "tournament over an empty candidate list");
    while candidates.len() > 1 {
        let mut next = Vec::with_capacity(candidates.len() / 2 + 1);
        let mut pairs = candidates.chunks_exact(2);
        for pair in &mut pairs {
            next.push(duel(backend, &pair[0], &pair[1])?);
        }
        if let [leftover] = pairs.remainder() {
            next.push(leftover.clone());
        }
        candidates = next;
    }
    Ok(candidates.pop().expect("one winner remains"))
}

/// Argmax over the SIMD lanes of one candidate.
///
/// Reduces the `nvals` lanes to a single one by pairing lanes `(2i, 2i + 1)`
/// each round; targets (the constant row-index vector) ride along through the
/// selections. Ties keep the even lane, so the lowest row index wins.
pub fn argmax_lanes<B: MpcBackend>(
    backend: &mut B,
    candidate: MaxCandidate,
) -> Result<MaxCandidate, BackendError> {
    let mut current = candidate;
    let mut lanes = current.quotient.num.nvals();
    while lanes > 1 {
        let pairs = lanes / 2;
        let evens: Vec<u32> = (0..pairs).map(|i| 2 * i).collect();
        let odds: Vec<u32> = (0..pairs).map(|i| 2 * i + 1).collect();

        let left = gather_candidate(backend, &current, &evens)?;
        let right = gather_candidate(backend, &current, &odds)?;
        let mut winner = duel(backend, &left, &right)?;

        if lanes % 2 == 1 {
            let leftover = gather_candidate(backend, &current, &[lanes - 1])?;
            winner = concat_candidates(backend, &winner, &leftover)?;
        }
        lanes = winner.quotient.num.nvals();
        current = winner;
    }
    Ok(current)
}

fn gather_candidate<B: MpcBackend>(
    backend: &mut B,
    candidate: &MaxCandidate,
    lanes: &[u32],
) -> Result<MaxCandidate, BackendError> {
    let num = backend.arith_gather(candidate.quotient.num, lanes)?;
    let den = backend.arith_gather(candidate.quotient.den, lanes)?;
    let mut targets = Vec::with_capacity(candidate.targets.len());
    for &target in &candidate.targets {
        targets.push(backend.bool_gather(target, lanes)?);
    }
    Ok(MaxCandidate {
        quotient: ArithQuotient { num, den },
        targets,
    })
}

fn concat_candidates<B: MpcBackend>(
    backend: &mut B,
    front: &MaxCandidate,
    back: &MaxCandidate,
) -> Result<MaxCandidate, BackendError> {
    let num = backend.arith_combine(&[front.quotient.num, back.quotient.num])?;
    let den = backend.arith_combine(&[front.quotient.den, back.quotient.den])?;
    let mut targets = Vec::with_capacity(front.targets.len());
    for (&f, &b) in front.targets.iter().zip(&back.targets) {
        targets.push(backend.bool_combine(&[f, b])?);
    }
    Ok(MaxCandidate {
        quotient: ArithQuotient { num, den },
        targets,
    })
}

/// Sums a single-bit SIMD share across its lanes.
///
/// Used by the counting circuit to turn per-row match bits into a count.
pub fn lane_count<B: MpcBackend>(
    backend: &mut B,
    bits: BoolShare,
) -> Result<BoolShare, BackendError> {
    let mut current = bits;
    let mut lanes = current.nvals();
    while lanes > 1 {
        let pairs = lanes / 2;
        let evens: Vec<u32> = (0..pairs).map(|i| 2 * i).collect();
        let odds: Vec<u32> = (0..pairs).map(|i| 2 * i + 1).collect();
        let left = backend.bool_gather(current, &evens)?;
        let right = backend.bool_gather(current, &odds)?;
        let mut sum = backend.add_b(left, right)?;

        if lanes % 2 == 1 {
            // Widen the carried lane to the sum's payload width before the
            // lane concatenation.
            let leftover = backend.bool_gather(current, &[lanes - 1])?;
            let zero = backend.bool_constant(0, leftover.bitlen(), 1)?;
            let widened = backend.add_b(leftover, zero)?;
            sum = backend.bool_combine(&[sum, widened])?;
        }
        lanes = sum.nvals();
        current = sum;
    }
    Ok(current)
}
