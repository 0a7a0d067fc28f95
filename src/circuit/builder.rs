//! Assembles the full per-record linkage circuit.
//!
//! The builder owns every share handle for the duration of one run. Input
//! marshalling replicates the query record across the SIMD lanes (one lane
//! per database row), concatenates database columns, and feeds precomputed
//! population counts and presence flags next to each payload. The circuit
//! shape depends only on the configuration and `nvals`, never on values.

use std::path::PathBuf;

use tracing::debug;

use crate::backend::{ArithShare, BoolShare, MpcBackend, OutputHandle, OutputTarget, Role};
use crate::circuit::gadgets::{
    argmax_lanes, equality, lane_count, set_similarity, to_arith, to_bool, tournament_max,
};
use crate::circuit::quotient::{sum_field_weights, ArithQuotient, FieldWeight, MaxCandidate};
use crate::clear::ScoreUnit;
use crate::config::{Comparator, ConfigError, LinkConfig, INT_DIV_INPUT_BITS};
use crate::input::{ClientInput, ServerInput, ShapeError};
use crate::num::{
    ceil_log2_min1, le_payload, mask_to_width, next_permutation, popcount_bytes, rescale_weight,
};
use crate::LinkError;

/// Per-side shares of one field.
struct SideShares {
    /// The payload itself, one lane per database row.
    value: BoolShare,
    /// Precomputed population count; set-similarity fields only.
    hw: Option<BoolShare>,
    /// 1 where the field is present, 0 where it is empty.
    delta: ArithShare,
}

struct FieldShares {
    client: SideShares,
    server: SideShares,
}

/// Output handles of a built linkage circuit.
pub struct LinkageHandles {
    /// Winning row index.
    pub index: OutputHandle,
    /// Match flag.
    pub is_match: OutputHandle,
    /// Tentative-match flag.
    pub is_tentative: OutputHandle,
    /// Winning `(numerator, denominator)`, revealed in debug runs only.
    pub score: Option<(OutputHandle, OutputHandle)>,
}

/// Output handles of a built counting circuit.
pub struct CountHandles {
    /// Rows above the match threshold.
    pub matches: OutputHandle,
    /// Rows above the tentative threshold.
    pub tentative_matches: OutputHandle,
}

/// Builder for one linkage or counting run.
pub struct CircuitBuilder<'a, B: MpcBackend> {
    cfg: &'a LinkConfig,
    backend: &'a mut B,
    div_circuit: PathBuf,
    reveal_score: bool,
    nvals: u32,
    const_idx: BoolShare,
    match_factor: u64,
    tentative_factor: u64,
    inputs: Option<Vec<FieldShares>>,
}

impl<'a, B: MpcBackend> CircuitBuilder<'a, B> {
    /// Materialises the run constants: the `[0, 1, .., nvals-1]` index
    /// vector and the fixed-point threshold factors.
    pub fn new(
        backend: &'a mut B,
        cfg: &'a LinkConfig,
        div_circuit: PathBuf,
        reveal_score: bool,
        nvals: u32,
    ) -> Result<Self, LinkError> {
        let has_set_fields = cfg
            .fields()
            .iter()
            .any(|f| f.comparator == Comparator::SetSimilarity);
        // The shifted similarity dividend must fit the fixed-shape divider.
        if has_set_fields && cfg.hw_bits() + cfg.set_sim_prec() + 1 > INT_DIV_INPUT_BITS {
            return Err(LinkError::PrecisionOverflow(ConfigError::PrecisionOverflow {
                set_sim_prec: cfg.set_sim_prec(),
                weight_prec: cfg.weight_prec(),
                field_bits: cfg.hw_bits() + 1,
                machine_bit_width: INT_DIV_INPUT_BITS,
            }));
        }

        let index_bits = ceil_log2_min1(nvals as usize) as u16;
        let mut lanes = Vec::with_capacity(nvals as usize);
        for i in 0..nvals {
            lanes.push(backend.bool_constant(i as u64, index_bits, 1)?);
        }
        let const_idx = backend.bool_combine(&lanes)?;

        let match_factor =
            <u64 as ScoreUnit>::threshold_factor(cfg.match_threshold(), cfg.set_sim_prec());
        let tentative_factor =
            <u64 as ScoreUnit>::threshold_factor(cfg.tentative_threshold(), cfg.set_sim_prec());
        debug!(
            nvals,
            index_bits, match_factor, tentative_factor, "run constants materialised"
        );

        Ok(Self {
            cfg,
            backend,
            div_circuit,
            reveal_score,
            nvals,
            const_idx,
            match_factor,
            tentative_factor,
            inputs: None,
        })
    }

    /// Sets the real query-side inputs and placeholder database-side inputs.
    pub fn set_client_input(&mut self, input: &ClientInput) -> Result<(), LinkError> {
        input.validate(self.cfg)?;
        self.check_cardinality(input.nvals)?;
        let client = self.marshal_client(input)?;
        let server = self.dummy_side()?;
        self.adopt_inputs(client, server);
        Ok(())
    }

    /// Sets the real database-side inputs and placeholder query-side inputs.
    pub fn set_server_input(&mut self, input: &ServerInput) -> Result<(), LinkError> {
        input.validate(self.cfg)?;
        self.check_cardinality(input.nvals)?;
        let client = self.dummy_side()?;
        let server = self.marshal_server(input)?;
        self.adopt_inputs(client, server);
        Ok(())
    }

    /// Debug path: sets both parties' real inputs in one process.
    #[cfg(feature = "run-both")]
    pub fn set_both_inputs(
        &mut self,
        client_input: &ClientInput,
        server_input: &ServerInput,
    ) -> Result<(), LinkError> {
        client_input.validate(self.cfg)?;
        server_input.validate(self.cfg)?;
        self.check_cardinality(client_input.nvals)?;
        self.check_cardinality(server_input.nvals)?;
        let client = self.marshal_client(client_input)?;
        let server = self.marshal_server(server_input)?;
        self.adopt_inputs(client, server);
        Ok(())
    }

    /// Builds the linkage circuit: per-field weights, aggregation, lane
    /// argmax and the threshold comparators, then registers the reveals.
    pub fn build_linkage(&mut self) -> Result<LinkageHandles, LinkError> {
        let total = self.aggregate()?;
        let winner = argmax_lanes(
            self.backend,
            MaxCandidate {
                quotient: total,
                targets: vec![self.const_idx],
            },
        )?;

        let num_b = to_bool(self.backend, winner.quotient.num)?;
        let match_bit = self.threshold_bit(winner.quotient.den, self.match_factor, num_b)?;
        let tentative_bit =
            self.threshold_bit(winner.quotient.den, self.tentative_factor, num_b)?;

        let index = self
            .backend
            .reveal_bool(winner.targets[0], OutputTarget::All)?;
        let is_match = self.backend.reveal_bool(match_bit, OutputTarget::All)?;
        let is_tentative = self.backend.reveal_bool(tentative_bit, OutputTarget::All)?;
        let score = if self.reveal_score {
            let num = self
                .backend
                .reveal_arith(winner.quotient.num, OutputTarget::All)?;
            let den = self
                .backend
                .reveal_arith(winner.quotient.den, OutputTarget::All)?;
            Some((num, den))
        } else {
            None
        };

        Ok(LinkageHandles {
            index,
            is_match,
            is_tentative,
            score,
        })
    }

    /// Builds the counting circuit: per-lane threshold bits reduced to two
    /// counts instead of the argmax.
    pub fn build_count(&mut self) -> Result<CountHandles, LinkError> {
        let total = self.aggregate()?;
        let num_b = to_bool(self.backend, total.num)?;

        let mut counts = [None, None];
        for (slot, factor) in counts
            .iter_mut()
            .zip([self.match_factor, self.tentative_factor])
        {
            let bit = self.threshold_bit(total.den, factor, num_b)?;
            let count = lane_count(self.backend, bit)?;
            *slot = Some(self.backend.reveal_bool(count, OutputTarget::All)?);
        }

        Ok(CountHandles {
            matches: counts[0].expect("match count registered"),
            tentative_matches: counts[1].expect("tentative count registered"),
        })
    }

    /// `threshold * D < N`, lane-wise.
    fn threshold_bit(
        &mut self,
        den: ArithShare,
        factor: u64,
        num_b: BoolShare,
    ) -> Result<BoolShare, LinkError> {
        let factor = self.backend.arith_constant(factor, den.nvals())?;
        let scaled = self.backend.arith_mul(factor, den)?;
        let scaled_b = to_bool(self.backend, scaled)?;
        Ok(self.backend.lt(scaled_b, num_b)?)
    }

    /// Sums the per-group maxima and the ungrouped field weights into the
    /// row quotient `(N, D)`. Deterministic order: groups in configuration
    /// order, then remaining fields in configuration order.
    fn aggregate(&mut self) -> Result<ArithQuotient, LinkError> {
        if self.inputs.is_none() {
            return Err(LinkError::IllegalState {
                operation: "build_circuit",
                state: "inputs not set",
            });
        }
        let groups = self.cfg.exchange_groups().to_vec();
        let mut weights = Vec::with_capacity(self.cfg.field_count());
        for group in &groups {
            weights.push(self.best_group_weight(group)?);
        }
        for index in self.cfg.ungrouped_fields() {
            weights.push(self.field_weight(index, index)?);
        }
        Ok(sum_field_weights(self.backend, &weights)?)
    }

    /// Evaluates every permutation of one exchange group and reduces to the
    /// best-scoring one. Permutations are enumerated lexicographically over
    /// the sorted-by-insertion-index member list; the tournament keeps the
    /// earlier permutation on ties.
    fn best_group_weight(&mut self, group: &[usize]) -> Result<FieldWeight, LinkError> {
        let mut permutation = group.to_vec();
        let mut candidates = Vec::new();
        loop {
            let mut pair_weights = Vec::with_capacity(group.len());
            for (&left, &right) in group.iter().zip(&permutation) {
                pair_weights.push(self.field_weight(left, right)?);
            }
            let quotient = sum_field_weights(self.backend, &pair_weights)?;
            candidates.push(MaxCandidate {
                quotient,
                targets: Vec::new(),
            });
            if !next_permutation(&mut permutation) {
                break;
            }
        }
        let winner = tournament_max(self.backend, candidates)?;
        Ok(FieldWeight {
            fw: winner.quotient.num,
            w: winner.quotient.den,
        })
    }

    /// Field weight of comparing query field `left` against database field
    /// `right`: `(weight * comparison * presence, weight * presence)`.
    ///
    /// The rescaled average weight is a public constant; presence flags keep
    /// empty fields out of both sums. Equality results are converted to
    /// arithmetic and multiplied by the constant `2^set_sim_prec`, which is
    /// cheaper than left-shifting a boolean share.
    fn field_weight(&mut self, left: usize, right: usize) -> Result<FieldWeight, LinkError> {
        let (client, server) = {
            let inputs = self.inputs.as_ref().expect("inputs set before weights");
            (
                (
                    inputs[left].client.value,
                    inputs[left].client.hw,
                    inputs[left].client.delta,
                ),
                (
                    inputs[right].server.value,
                    inputs[right].server.hw,
                    inputs[right].server.delta,
                ),
            )
        };
        let fields = self.cfg.fields();
        let weight_value = rescale_weight(
            (fields[left].weight + fields[right].weight) / 2.0,
            self.cfg.weight_prec(),
            self.cfg.max_weight(),
        );
        let weight_const = self.backend.arith_constant(weight_value, self.nvals)?;
        let presence = self.backend.arith_mul(client.2, server.2)?;
        let weight = self.backend.arith_mul(weight_const, presence)?;

        let comparison = match fields[left].comparator {
            Comparator::SetSimilarity => {
                let hw_x = client.1.expect("set-similarity field carries hw share");
                let hw_y = server.1.expect("set-similarity field carries hw share");
                let coefficient = set_similarity(
                    self.backend,
                    client.0,
                    server.0,
                    hw_x,
                    hw_y,
                    self.cfg.set_sim_prec(),
                    &self.div_circuit,
                )?;
                to_arith(self.backend, coefficient)?
            }
            Comparator::Equality => {
                let hit = equality(self.backend, client.0, server.0)?;
                let hit = to_arith(self.backend, hit)?;
                let scale = self
                    .backend
                    .arith_constant(1u64 << self.cfg.set_sim_prec(), self.nvals)?;
                self.backend.arith_mul(hit, scale)?
            }
        };

        let fw = self.backend.arith_mul(weight, comparison)?;
        Ok(FieldWeight { fw, w: weight })
    }

    fn check_cardinality(&self, got: u32) -> Result<(), LinkError> {
        if got != self.nvals {
            return Err(LinkError::ShapeMismatch(ShapeError::CardinalityMismatch {
                expected: self.nvals,
                got,
            }));
        }
        Ok(())
    }

    fn adopt_inputs(&mut self, client: Vec<SideShares>, server: Vec<SideShares>) {
        self.inputs = Some(
            client
                .into_iter()
                .zip(server)
                .map(|(client, server)| FieldShares { client, server })
                .collect(),
        );
    }

    fn marshal_client(&mut self, input: &ClientInput) -> Result<Vec<SideShares>, LinkError> {
        let nvals = self.nvals as usize;
        let mut sides = Vec::with_capacity(self.cfg.field_count());
        for field in self.cfg.fields() {
            let width = field.bit_width as usize;
            let entry = &input.record[&field.name];
            let (payload, present) = match entry {
                Some(bitmask) => {
                    let mut bytes = bitmask.as_bytes().to_vec();
                    mask_to_width(&mut bytes, width);
                    (bytes, 1u64)
                }
                None => (vec![0u8; field.byte_len()], 0),
            };

            let value_lanes = vec![payload.clone(); nvals];
            let value = self
                .backend
                .bool_input(Role::Client, field.bit_width, &value_lanes)?;

            let hw = if field.comparator == Comparator::SetSimilarity {
                let hw_lanes =
                    vec![le_payload(popcount_bytes(&payload), self.cfg.hw_bits()); nvals];
                Some(self.backend.bool_input(
                    Role::Client,
                    self.cfg.hw_bits() as u16,
                    &hw_lanes,
                )?)
            } else {
                None
            };

            let delta = self
                .backend
                .arith_input(Role::Client, &vec![present; nvals])?;
            sides.push(SideShares { value, hw, delta });
        }
        Ok(sides)
    }

    fn marshal_server(&mut self, input: &ServerInput) -> Result<Vec<SideShares>, LinkError> {
        let mut sides = Vec::with_capacity(self.cfg.field_count());
        for field in self.cfg.fields() {
            let width = field.bit_width as usize;
            let column = &input.database[&field.name];

            let mut value_lanes = Vec::with_capacity(column.len());
            let mut hw_lanes = Vec::with_capacity(column.len());
            let mut deltas = Vec::with_capacity(column.len());
            for entry in column {
                let payload = match entry {
                    Some(bitmask) => {
                        let mut bytes = bitmask.as_bytes().to_vec();
                        mask_to_width(&mut bytes, width);
                        deltas.push(1);
                        bytes
                    }
                    None => {
                        deltas.push(0);
                        vec![0u8; field.byte_len()]
                    }
                };
                hw_lanes.push(le_payload(popcount_bytes(&payload), self.cfg.hw_bits()));
                value_lanes.push(payload);
            }

            let value = self
                .backend
                .bool_input(Role::Server, field.bit_width, &value_lanes)?;
            let hw = if field.comparator == Comparator::SetSimilarity {
                Some(self.backend.bool_input(
                    Role::Server,
                    self.cfg.hw_bits() as u16,
                    &hw_lanes,
                )?)
            } else {
                None
            };
            let delta = self.backend.arith_input(Role::Server, &deltas)?;
            sides.push(SideShares { value, hw, delta });
        }
        Ok(sides)
    }

    fn dummy_side(&mut self) -> Result<Vec<SideShares>, LinkError> {
        let mut sides = Vec::with_capacity(self.cfg.field_count());
        for field in self.cfg.fields() {
            let value = self.backend.bool_dummy(field.bit_width, self.nvals)?;
            let hw = if field.comparator == Comparator::SetSimilarity {
                Some(
                    self.backend
                        .bool_dummy(self.cfg.hw_bits() as u16, self.nvals)?,
                )
            } else {
                None
            };
            let delta = self.backend.arith_dummy(self.nvals)?;
            sides.push(SideShares { value, hw, delta });
        }
        Ok(sides)
    }
}
