mod _fixtures;

use _fixtures::bm_field;
use proptest::prelude::*;
use sealink::num::{ceil_log2, rescale_weight};
use sealink::{ConfigError, LinkConfigBuilder};

fn builder_with_fields(count: usize, bit_width: u16, machine: usize) -> LinkConfigBuilder {
    let mut builder = LinkConfigBuilder::new().machine_bit_width(machine);
    for i in 0..count {
        builder = builder.field(bm_field(&format!("bm_{i}"), (i + 1) as f64, bit_width));
    }
    builder
}

proptest! {
    /// The overflow budget holds for every configuration the builder
    /// accepts, in both the safe and the ideal plan.
    #[test]
    fn precision_bit_invariant(
        count in 1usize..=10,
        bit_width in 1u16..=512,
        machine in prop_oneof![Just(32usize), Just(64usize)],
    ) {
        let mut cfg = builder_with_fields(count, bit_width, machine)
            .build()
            .expect("safe plan fits 32- and 64-bit machines");
        let field_bits = ceil_log2(count * count);
        prop_assert!(
            cfg.set_sim_prec() + 2 * cfg.weight_prec() + field_bits <= machine
        );

        cfg.set_ideal_precisions().expect("ideal plan fits the budget");
        prop_assert!(
            cfg.set_sim_prec() + 2 * cfg.weight_prec() + field_bits <= machine
        );
    }

    /// Rescaled weights stay inside `[0, 2^prec - 1]` and are monotone in
    /// the weight, up to rounding.
    #[test]
    fn rescale_weight_round_trip(
        weight_a in 0.0f64..=100.0,
        weight_b in 0.0f64..=100.0,
        prec in 1usize..=16,
        max_weight in 100.0f64..=200.0,
    ) {
        let a = rescale_weight(weight_a, prec, max_weight);
        let b = rescale_weight(weight_b, prec, max_weight);
        prop_assert!(a <= (1u64 << prec) - 1);
        prop_assert!(b <= (1u64 << prec) - 1);
        if weight_a <= weight_b {
            prop_assert!(a <= b);
        }
    }

    #[test]
    fn ceil_log2_brackets_its_argument(n in 2usize..=1 << 20) {
        let k = ceil_log2(n);
        prop_assert!(1usize << k >= n);
        prop_assert!(1usize << (k - 1) < n);
    }
}

#[test]
fn max_weight_rescales_to_all_ones() {
    assert_eq!(rescale_weight(3.5, 10, 3.5), (1 << 10) - 1);
}

#[test]
fn explicit_overflow_is_rejected() {
    // 20 + 2 * 20 fractional bits cannot fit a 32-bit machine word.
    let mut cfg = builder_with_fields(1, 8, 32).build().unwrap();
    let err = cfg.set_precisions(20, 20).unwrap_err();
    assert!(matches!(err, ConfigError::PrecisionOverflow { .. }));
    assert!(err.is_precision_overflow());
}

#[test]
fn explicit_precisions_within_budget_are_accepted() {
    let mut cfg = builder_with_fields(2, 8, 32).build().unwrap();
    cfg.set_precisions(10, 9).expect("10 + 18 + 2 <= 32");
    assert_eq!(cfg.set_sim_prec(), 10);
    assert_eq!(cfg.weight_prec(), 9);
}

#[test]
fn safe_plan_keeps_the_division_input_narrow() {
    // The shifted dividend popcount(x AND y) << (prec + 1) must fit the
    // 16-bit divider for every payload width the builder accepts.
    for bit_width in [1u16, 8, 64, 500] {
        let cfg = builder_with_fields(1, bit_width, 32).build().unwrap();
        assert!(
            cfg.hw_bits() + cfg.set_sim_prec() + 1 <= sealink::config::INT_DIV_INPUT_BITS,
            "bit width {bit_width}"
        );
    }
}

#[test]
fn ideal_mode_beats_safe_mode_on_wide_machines() {
    let mut cfg = builder_with_fields(2, 8, 64).build().unwrap();
    let safe = cfg.precision_plan();
    cfg.set_ideal_precisions().unwrap();
    let ideal = cfg.precision_plan();
    assert!(ideal.set_sim_prec > safe.set_sim_prec);
}
