//! The clear-text reference evaluator.
//!
//! Computes the same link decision as the secure circuit, over the same
//! configuration object and the same fixed-point model. It is the oracle the
//! secure path is validated against, and doubles as the local-only scoring
//! path of the reference harness.

use serde::{Deserialize, Serialize};

use super::score::{quotient_beats, ScoreUnit};
use crate::config::{Comparator, LinkConfig};
use crate::input::{ClientInput, ServerInput};
use crate::num::{mask_to_width, next_permutation, popcount_bytes};
use crate::LinkError;

/// Decision of the clear evaluator for one query record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClearResult<T> {
    /// Index of the database row with the maximal score.
    pub index: u32,
    /// Whether the winning score strictly exceeds the match threshold.
    pub is_match: bool,
    /// Whether the winning score strictly exceeds the tentative threshold.
    pub is_tentative_match: bool,
    /// Numerator of the winning quotient.
    pub numerator: T,
    /// Denominator of the winning quotient.
    pub denominator: T,
}

/// Row counts above each threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearCounts {
    /// Rows whose score strictly exceeds the match threshold.
    pub matches: u32,
    /// Rows whose score strictly exceeds the tentative threshold.
    pub tentative_matches: u32,
}

struct PreparedValue {
    bytes: Vec<u8>,
    hw: u64,
}

fn prepare(bytes: &[u8], bit_width: usize) -> PreparedValue {
    let mut bytes = bytes.to_vec();
    mask_to_width(&mut bytes, bit_width);
    let hw = popcount_bytes(&bytes);
    PreparedValue { bytes, hw }
}

struct PreparedInputs {
    /// Per canonical field: the query value.
    client: Vec<Option<PreparedValue>>,
    /// Per canonical field: one value per database row.
    server: Vec<Vec<Option<PreparedValue>>>,
}

impl PreparedInputs {
    fn build(
        cfg: &LinkConfig,
        client: &ClientInput,
        server: &ServerInput,
    ) -> Result<Self, LinkError> {
        client.validate(cfg)?;
        server.validate(cfg)?;
        if client.nvals != server.nvals {
            return Err(LinkError::ShapeMismatch(
                crate::input::ShapeError::CardinalityMismatch {
                    expected: server.nvals,
                    got: client.nvals,
                },
            ));
        }

        let mut client_values = Vec::with_capacity(cfg.field_count());
        let mut server_columns = Vec::with_capacity(cfg.field_count());
        for field in cfg.fields() {
            let width = field.bit_width as usize;
            let entry = &client.record[&field.name];
            client_values.push(entry.as_ref().map(|bm| prepare(bm.as_bytes(), width)));
            let column = &server.database[&field.name];
            server_columns.push(
                column
                    .iter()
                    .map(|entry| entry.as_ref().map(|bm| prepare(bm.as_bytes(), width)))
                    .collect(),
            );
        }
        Ok(Self {
            client: client_values,
            server: server_columns,
        })
    }

    /// Field weight of comparing query field `left` with database field
    /// `right` in `row`; returns `(field_weight, effective_weight)`.
    fn field_pair<T: ScoreUnit>(
        &self,
        cfg: &LinkConfig,
        left: usize,
        right: usize,
        row: usize,
    ) -> (T, T) {
        let (x, y) = match (&self.client[left], &self.server[right][row]) {
            (Some(x), Some(y)) => (x, y),
            // An empty field on either side contributes zero weight.
            _ => return (T::zero(), T::zero()),
        };

        let fields = cfg.fields();
        let avg_weight = (fields[left].weight + fields[right].weight) / 2.0;
        let weight = T::weight(avg_weight, cfg.weight_prec(), cfg.max_weight());

        let comparison = match fields[left].comparator {
            Comparator::SetSimilarity => {
                let hw_and = popcount_bytes(
                    &x.bytes
                        .iter()
                        .zip(&y.bytes)
                        .map(|(a, b)| a & b)
                        .collect::<Vec<u8>>(),
                );
                T::similarity(hw_and, x.hw + y.hw, cfg.set_sim_prec())
            }
            Comparator::Equality => {
                if x.bytes == y.bytes {
                    T::equality_hit(cfg.set_sim_prec())
                } else {
                    T::zero()
                }
            }
        };

        (weight.mul(comparison), weight)
    }

    /// Best permutation quotient of one exchange group for one row.
    fn best_group_quotient<T: ScoreUnit>(
        &self,
        cfg: &LinkConfig,
        group: &[usize],
        row: usize,
    ) -> (T, T) {
        let mut perm = group.to_vec();
        let mut best: Option<(T, T)> = None;
        loop {
            let mut fw = T::zero();
            let mut w = T::zero();
            for (&left, &right) in group.iter().zip(&perm) {
                let (pair_fw, pair_w) = self.field_pair::<T>(cfg, left, right, row);
                fw = fw.add(pair_fw);
                w = w.add(pair_w);
            }
            best = match best {
                Some(incumbent) if !quotient_beats(incumbent, (fw, w)) => Some(incumbent),
                _ => Some((fw, w)),
            };
            if !next_permutation(&mut perm) {
                break;
            }
        }
        best.expect("group has at least one permutation")
    }

    /// Aggregated quotient `(N, D)` of one database row.
    fn row_quotient<T: ScoreUnit>(&self, cfg: &LinkConfig, row: usize) -> (T, T) {
        let mut num = T::zero();
        let mut den = T::zero();
        for group in cfg.exchange_groups() {
            let (fw, w) = self.best_group_quotient::<T>(cfg, group, row);
            num = num.add(fw);
            den = den.add(w);
        }
        for index in cfg.ungrouped_fields() {
            let (fw, w) = self.field_pair::<T>(cfg, index, index, row);
            num = num.add(fw);
            den = den.add(w);
        }
        (num, den)
    }
}

/// Scores every database row, in row order.
pub fn score_rows<T: ScoreUnit>(
    cfg: &LinkConfig,
    client: &ClientInput,
    server: &ServerInput,
) -> Result<Vec<(T, T)>, LinkError> {
    let prepared = PreparedInputs::build(cfg, client, server)?;
    Ok((0..server.nvals as usize)
        .map(|row| prepared.row_quotient(cfg, row))
        .collect())
}

fn exceeds<T: ScoreUnit>(num: T, den: T, factor: T) -> bool {
    num.widen() > T::cross(factor, den)
}

/// Computes the link decision for one query record.
pub fn evaluate<T: ScoreUnit>(
    cfg: &LinkConfig,
    client: &ClientInput,
    server: &ServerInput,
) -> Result<ClearResult<T>, LinkError> {
    if server.nvals == 0 {
        return Err(LinkError::EmptyDatabase);
    }
    let scores = score_rows::<T>(cfg, client, server)?;

    let mut index = 0usize;
    for (row, &score) in scores.iter().enumerate().skip(1) {
        if quotient_beats(scores[index], score) {
            index = row;
        }
    }
    let (numerator, denominator) = scores[index];

    let match_factor = T::threshold_factor(cfg.match_threshold(), cfg.set_sim_prec());
    let tentative_factor = T::threshold_factor(cfg.tentative_threshold(), cfg.set_sim_prec());
    Ok(ClearResult {
        index: index as u32,
        is_match: exceeds(numerator, denominator, match_factor),
        is_tentative_match: exceeds(numerator, denominator, tentative_factor),
        numerator,
        denominator,
    })
}

/// Counts database rows above each threshold for one query record.
pub fn evaluate_counts<T: ScoreUnit>(
    cfg: &LinkConfig,
    client: &ClientInput,
    server: &ServerInput,
) -> Result<ClearCounts, LinkError> {
    if server.nvals == 0 {
        return Err(LinkError::EmptyDatabase);
    }
    let scores = score_rows::<T>(cfg, client, server)?;
    let match_factor = T::threshold_factor(cfg.match_threshold(), cfg.set_sim_prec());
    let tentative_factor = T::threshold_factor(cfg.tentative_threshold(), cfg.set_sim_prec());
    let mut counts = ClearCounts {
        matches: 0,
        tentative_matches: 0,
    };
    for (num, den) in scores {
        if exceeds(num, den, match_factor) {
            counts.matches += 1;
        }
        if exceeds(num, den, tentative_factor) {
            counts.tentative_matches += 1;
        }
    }
    Ok(counts)
}
