//! Fixed-point precision planning.
//!
//! The linkage circuit compares quotients `N/D` by cross-multiplication, so
//! the machine word has to absorb a product of the form
//! `sum_n(c * w) * sum_n(w)` without overflowing. That yields the budget
//!
//! ```text
//! set_sim_prec + 2 * weight_prec + ceil_log2(n^2) <= machine_bit_width
//! ```
//!
//! where `n` is the field count. The planner distributes the available bits
//! between the similarity fraction and the weight fraction.

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::num::{ceil_log2, hw_bits};

/// Input width of the file-driven integer-division sub-circuit.
///
/// The set-similarity dividend `popcount(x AND y) << (set_sim_prec + 1)` must
/// fit this width, which caps `set_sim_prec` in safe mode.
pub const INT_DIV_INPUT_BITS: usize = 16;

/// Chosen fractional bit counts for similarities and weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecisionPlan {
    /// Fractional bits of the set-similarity coefficient.
    pub set_sim_prec: usize,
    /// Fractional bits of rescaled field weights.
    pub weight_prec: usize,
}

/// Verifies the overflow budget for an explicit precision choice.
pub(crate) fn check_budget(
    set_sim_prec: usize,
    weight_prec: usize,
    field_count: usize,
    machine_bit_width: usize,
) -> Result<(), ConfigError> {
    let field_bits = ceil_log2(field_count * field_count);
    if set_sim_prec + 2 * weight_prec + field_bits > machine_bit_width {
        return Err(ConfigError::PrecisionOverflow {
            set_sim_prec,
            weight_prec,
            field_bits,
            machine_bit_width,
        });
    }
    Ok(())
}

/// Default plan: maximum similarity precision that still feeds the
/// [`INT_DIV_INPUT_BITS`]-bit division gadget, remaining bits split evenly
/// over the two weight factors.
///
/// The `- 1` accounts for the factor 2 in the similarity numerator.
pub(crate) fn safe_plan(
    machine_bit_width: usize,
    field_count: usize,
    max_set_width: usize,
) -> Result<PrecisionPlan, ConfigError> {
    let field_bits = ceil_log2(field_count * field_count);
    let set_sim_prec = INT_DIV_INPUT_BITS - 1 - hw_bits(max_set_width);
    let weight_prec = machine_bit_width
        .checked_sub(field_bits + set_sim_prec)
        .map(|rest| rest / 2)
        .ok_or(ConfigError::PrecisionOverflow {
            set_sim_prec,
            weight_prec: 0,
            field_bits,
            machine_bit_width,
        })?;
    let plan = PrecisionPlan {
        set_sim_prec,
        weight_prec,
    };
    check_budget(
        plan.set_sim_prec,
        plan.weight_prec,
        field_count,
        machine_bit_width,
    )?;
    Ok(plan)
}

/// Ideal plan: distribute the available bits in thirds.
///
/// One leftover bit goes to the similarity precision. Two leftover bits go to
/// the weight precision, which is counted twice in the budget and therefore
/// absorbs exactly two bits.
pub(crate) fn ideal_plan(machine_bit_width: usize, field_count: usize) -> PrecisionPlan {
    let available = machine_bit_width - ceil_log2(field_count * field_count);
    let mut set_sim_prec = available / 3;
    let mut weight_prec = set_sim_prec;
    match available % 3 {
        1 => set_sim_prec += 1,
        2 => weight_prec += 1,
        _ => {}
    }
    PrecisionPlan {
        set_sim_prec,
        weight_prec,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_plan_respects_div_input_width() {
        // One 8-bit set-similarity field on a 32-bit machine: hw fits 4 bits,
        // so the shifted dividend occupies 4 + set_sim_prec + 1 <= 16 bits.
        let plan = safe_plan(32, 1, 8).unwrap();
        assert_eq!(plan.set_sim_prec, 11);
        assert_eq!(plan.weight_prec, 10);
        assert!(hw_bits(8) + plan.set_sim_prec + 1 <= INT_DIV_INPUT_BITS);
    }

    #[test]
    fn safe_plan_with_no_set_fields() {
        let plan = safe_plan(32, 1, 0).unwrap();
        assert_eq!(plan.set_sim_prec, 14);
        assert_eq!(plan.weight_prec, 9);
    }

    #[test]
    fn ideal_plan_uses_every_available_bit() {
        for (machine, n) in [(32usize, 1usize), (32, 4), (64, 7), (16, 2)] {
            let plan = ideal_plan(machine, n);
            let used = plan.set_sim_prec + 2 * plan.weight_prec + ceil_log2(n * n);
            assert_eq!(used, machine, "machine {machine}, n {n}");
        }
    }

    #[test]
    fn budget_rejects_oversized_precisions() {
        assert!(check_budget(20, 20, 1, 32).is_err());
        assert!(check_budget(14, 9, 1, 32).is_ok());
    }
}
