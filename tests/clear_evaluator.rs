mod _fixtures;

use _fixtures::{
    bitmask, bm_field, client_input, server_input, EQUALITY_CFG, EXCHANGE_CFG, SET_SIM_CFG,
    TWO_FIELD_CFG,
};
use proptest::prelude::*;
use sealink::clear::{evaluate, evaluate_counts, score_rows, ClearResult};
use sealink::{Bitmask, LinkConfigBuilder, LinkError, LinkErrorKind};

fn decisions<T: sealink::ScoreUnit>(result: &ClearResult<T>) -> (u32, bool, bool) {
    (result.index, result.is_match, result.is_tentative_match)
}

#[test]
fn equality_identical_is_a_match() {
    let payload = [0xde, 0xad, 0xbe, 0xef];
    let client = client_input(&[("int_1", bitmask(&payload))], 1);
    let server = server_input(&[("int_1", vec![bitmask(&payload)])]);

    let result = evaluate::<u32>(&EQUALITY_CFG, &client, &server).unwrap();
    assert_eq!(decisions(&result), (0, true, true));
    // weight 511 at nine fractional bits, comparison 2^14
    assert_eq!(result.numerator, 511 << 14);
    assert_eq!(result.denominator, 511);
}

#[test]
fn set_similarity_lands_in_the_tentative_band() {
    // popcounts 6 and 6, five shared bits: 2*5/12 ~ 0.833
    let client = client_input(&[("bm_1", bitmask(&[0b0111_0111]))], 1);
    let server = server_input(&[("bm_1", vec![bitmask(&[0b1011_0111])])]);

    let result = evaluate::<u32>(&SET_SIM_CFG, &client, &server).unwrap();
    assert_eq!(decisions(&result), (0, false, true));
    // (5 << 12) / 12 = 1706 at eleven fractional bits, weight 1023
    assert_eq!(result.numerator, 1023 * 1706);
    assert_eq!(result.denominator, 1023);
}

#[test]
fn two_bit_mismatch_falls_below_the_tentative_band() {
    // popcounts 6 and 6, four shared bits: 2*4/12 ~ 0.667
    let client = client_input(&[("bm_1", bitmask(&[0b0111_0111]))], 1);
    let server = server_input(&[("bm_1", vec![bitmask(&[0b1110_1110])])]);

    let result = evaluate::<u32>(&SET_SIM_CFG, &client, &server).unwrap();
    assert_eq!(decisions(&result), (0, false, false));
}

#[test]
fn exchange_group_selects_the_swapped_permutation() {
    let client = client_input(&[("bm_1", bitmask(&[0x33])), ("bm_2", bitmask(&[0x43]))], 1);
    let server = server_input(&[
        ("bm_1", vec![bitmask(&[0x44])]),
        ("bm_2", vec![bitmask(&[0x35])]),
    ]);

    let result = evaluate::<u32>(&EXCHANGE_CFG, &client, &server).unwrap();
    // swapped: (3 << 12) / 8 = 1536 and (1 << 12) / 5 = 819, weight 511 each
    assert_eq!(result.numerator, 511 * (1536 + 819));
    assert_eq!(result.denominator, 2 * 511);
    assert_eq!(decisions(&result), (0, false, false));

    // straight assignment scores (0 + (1 << 12) / 7 = 585) * 511 over the
    // same denominator; the reported quotient must be the maximum
    assert!(result.numerator > 511 * 585);
}

#[test]
fn swapping_group_values_does_not_change_the_decision() {
    let client = client_input(&[("bm_1", bitmask(&[0x33])), ("bm_2", bitmask(&[0x43]))], 1);
    let swapped = client_input(&[("bm_1", bitmask(&[0x43])), ("bm_2", bitmask(&[0x33]))], 1);
    let server = server_input(&[
        ("bm_1", vec![bitmask(&[0x44])]),
        ("bm_2", vec![bitmask(&[0x35])]),
    ]);

    let straight = evaluate::<u32>(&EXCHANGE_CFG, &client, &server).unwrap();
    let exchanged = evaluate::<u32>(&EXCHANGE_CFG, &swapped, &server).unwrap();
    assert_eq!(straight, exchanged);
}

#[test]
fn swapping_across_ungrouped_fields_changes_the_score() {
    // Same payloads, but the fields are not exchangeable: each field is
    // compared in place, so swapping the client values changes the result.
    let client = client_input(&[("bm_1", bitmask(&[0x33])), ("bm_2", bitmask(&[0x43]))], 1);
    let swapped = client_input(&[("bm_1", bitmask(&[0x43])), ("bm_2", bitmask(&[0x33]))], 1);
    let server = server_input(&[
        ("bm_1", vec![bitmask(&[0x44])]),
        ("bm_2", vec![bitmask(&[0x35])]),
    ]);

    let straight = evaluate::<u32>(&TWO_FIELD_CFG, &client, &server).unwrap();
    let exchanged = evaluate::<u32>(&TWO_FIELD_CFG, &swapped, &server).unwrap();
    assert_ne!(straight.numerator, exchanged.numerator);
}

#[test]
fn missing_field_contributes_zero_weight() {
    let client = client_input(&[("bm_1", None), ("bm_2", bitmask(&[0x44]))], 2);
    let server = server_input(&[
        ("bm_1", vec![None, bitmask(&[0x31])]),
        ("bm_2", vec![bitmask(&[0x43]), bitmask(&[0x44])]),
    ]);

    let result = evaluate::<u32>(&TWO_FIELD_CFG, &client, &server).unwrap();
    // row 1 matches perfectly on bm_2; bm_1 is empty on the client side and
    // stays out of both sums
    assert_eq!(decisions(&result), (1, true, true));
    assert_eq!(result.denominator, 511);
    assert_eq!(result.numerator, 511 << 11);
}

#[test]
fn rows_empty_on_one_side_never_win() {
    let client = client_input(&[("bm_1", bitmask(&[0x33])), ("bm_2", bitmask(&[0x43]))], 2);
    let server = server_input(&[
        ("bm_1", vec![None, bitmask(&[0x33])]),
        ("bm_2", vec![None, bitmask(&[0x43])]),
    ]);

    let result = evaluate::<u32>(&TWO_FIELD_CFG, &client, &server).unwrap();
    assert_eq!(decisions(&result), (1, true, true));

    // the empty row's quotient is 0/0
    let scores = score_rows::<u32>(&TWO_FIELD_CFG, &client, &server).unwrap();
    assert_eq!(scores[0], (0, 0));
}

#[test]
fn all_rows_empty_is_never_a_match() {
    let client = client_input(&[("bm_1", None), ("bm_2", bitmask(&[0x44]))], 1);
    let server = server_input(&[
        ("bm_1", vec![bitmask(&[0x31])]),
        ("bm_2", vec![None]),
    ]);

    let result = evaluate::<u32>(&TWO_FIELD_CFG, &client, &server).unwrap();
    assert_eq!(decisions(&result), (0, false, false));
    assert_eq!((result.numerator, result.denominator), (0, 0));
}

#[test]
fn ties_resolve_to_the_lowest_index() {
    let row = bitmask(&[0b1011_0111]);
    let client = client_input(&[("bm_1", bitmask(&[0b0111_0111]))], 3);
    let server = server_input(&[(
        "bm_1",
        vec![row.clone(), row.clone(), row],
    )]);

    for _ in 0..2 {
        let result = evaluate::<u32>(&SET_SIM_CFG, &client, &server).unwrap();
        assert_eq!(result.index, 0);
    }
}

#[test]
fn empty_database_is_refused() {
    let client = client_input(&[("bm_1", bitmask(&[0x01]))], 0);
    let server = server_input(&[("bm_1", Vec::<Option<Bitmask>>::new())]);
    let err = evaluate::<u32>(&SET_SIM_CFG, &client, &server).unwrap_err();
    assert_eq!(err.kind(), LinkErrorKind::EmptyDatabase);
    assert!(matches!(err, LinkError::EmptyDatabase));
}

#[test]
fn cardinality_disagreement_is_a_shape_error() {
    let client = client_input(&[("bm_1", bitmask(&[0x01]))], 2);
    let server = server_input(&[("bm_1", vec![bitmask(&[0x01])])]);
    let err = evaluate::<u32>(&SET_SIM_CFG, &client, &server).unwrap_err();
    assert_eq!(err.kind(), LinkErrorKind::ShapeMismatch);
}

#[test]
fn instantiations_agree_on_the_scenarios() {
    let cases = [
        (
            client_input(&[("bm_1", bitmask(&[0b0111_0111]))], 1),
            server_input(&[("bm_1", vec![bitmask(&[0b1011_0111])])]),
        ),
        (
            client_input(&[("bm_1", bitmask(&[0x0f]))], 2),
            server_input(&[("bm_1", vec![bitmask(&[0x0f]), bitmask(&[0xf0])])]),
        ),
        (
            client_input(&[("bm_1", None)], 1),
            server_input(&[("bm_1", vec![bitmask(&[0x55])])]),
        ),
    ];
    for (client, server) in &cases {
        let r32 = evaluate::<u32>(&SET_SIM_CFG, client, server).unwrap();
        let r64 = evaluate::<u64>(&SET_SIM_CFG, client, server).unwrap();
        let rf = evaluate::<f64>(&SET_SIM_CFG, client, server).unwrap();
        assert_eq!(decisions(&r32), decisions(&r64));
        assert_eq!(decisions(&r32), decisions(&rf));
    }
}

#[test]
fn match_implies_tentative() {
    let cases = [
        (
            client_input(&[("int_1", bitmask(&[1, 2, 3, 4]))], 1),
            server_input(&[("int_1", vec![bitmask(&[1, 2, 3, 4])])]),
            &*EQUALITY_CFG,
        ),
        (
            client_input(&[("bm_1", bitmask(&[0xff]))], 1),
            server_input(&[("bm_1", vec![bitmask(&[0xff])])]),
            &*SET_SIM_CFG,
        ),
    ];
    for (client, server, cfg) in &cases {
        let result = evaluate::<u32>(cfg, client, server).unwrap();
        assert!(!result.is_match || result.is_tentative_match);
    }
}

#[test]
fn counts_mirror_per_row_thresholds() {
    let client = client_input(&[("bm_1", None), ("bm_2", bitmask(&[0x44]))], 2);
    let server = server_input(&[
        ("bm_1", vec![None, bitmask(&[0x31])]),
        ("bm_2", vec![bitmask(&[0x43]), bitmask(&[0x44])]),
    ]);
    let counts = evaluate_counts::<u32>(&TWO_FIELD_CFG, &client, &server).unwrap();
    // row 0 scores ~0.4, row 1 scores 1.0
    assert_eq!(counts.matches, 1);
    assert_eq!(counts.tentative_matches, 1);
}

proptest! {
    /// The 32-bit and the 64-bit instantiation share one fixed-point model;
    /// within the overflow budget they agree exactly.
    #[test]
    fn narrow_and_wide_integers_agree(
        client_bytes in proptest::collection::vec(any::<u8>(), 2),
        row_a in proptest::collection::vec(any::<u8>(), 2),
        row_b in proptest::collection::vec(any::<u8>(), 2),
        client_present in any::<bool>(),
    ) {
        let cfg = LinkConfigBuilder::new()
            .field(bm_field("bm_1", 3.0, 16))
            .thresholds(0.9, 0.7)
            .build()
            .unwrap();
        let entry = client_present.then(|| Bitmask::new(client_bytes));
        let client = client_input(&[("bm_1", entry)], 2);
        let server = server_input(&[(
            "bm_1",
            vec![Some(Bitmask::new(row_a)), Some(Bitmask::new(row_b))],
        )]);

        let r32 = evaluate::<u32>(&cfg, &client, &server).unwrap();
        let r64 = evaluate::<u64>(&cfg, &client, &server).unwrap();
        prop_assert_eq!(decisions(&r32), decisions(&r64));
        prop_assert_eq!(r32.numerator as u64, r64.numerator);
        prop_assert_eq!(r32.denominator as u64, r64.denominator);
    }
}
