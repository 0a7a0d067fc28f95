//! In-process reference backend.
//!
//! Evaluates the gate stream eagerly over plain values. Both parties' inputs
//! live in one address space, which makes the backend suitable for the
//! debug `run_as_both` path, the agreement tests and the reference harness —
//! and useless as a privacy mechanism, which is the point: it validates the
//! circuit shape and semantics, not the protocol.
//!
//! Single-sided runs allocate placeholder shares for the remote party. A
//! real runtime fills those over the network during execution; the loopback
//! backend has no peer, so `execute()` refuses with
//! [`BackendError::PeerUnavailable`] instead of silently scoring zeros.

use std::path::Path;

use tracing::debug;

use super::traits::{
    ArithShare, BoolShare, BooleanSharing, MpcBackend, OutputHandle, OutputTarget, Role,
};
use super::BackendError;
use crate::config::INT_DIV_INPUT_BITS;
use crate::num::{bit_bytes, mask_to_width};

enum Wire {
    Bool { bitlen: u16, lanes: Vec<Vec<u8>> },
    Arith { lanes: Vec<u64> },
}

struct Output {
    wire: usize,
    #[allow(dead_code)]
    target: OutputTarget,
}

/// Reference [`MpcBackend`] evaluating gates in the clear, in-process.
pub struct LoopbackBackend {
    machine_bit_width: usize,
    sharing: BooleanSharing,
    wires: Vec<Wire>,
    outputs: Vec<Output>,
    results: Option<Vec<Vec<u64>>>,
    dummy_inputs: usize,
    gate_count: u64,
}

impl LoopbackBackend {
    /// Creates a backend with the given arithmetic width and boolean sharing.
    pub fn new(machine_bit_width: usize, sharing: BooleanSharing) -> Self {
        Self {
            machine_bit_width,
            sharing,
            wires: Vec::new(),
            outputs: Vec::new(),
            results: None,
            dummy_inputs: 0,
            gate_count: 0,
        }
    }

    fn word_mask(&self) -> u64 {
        if self.machine_bit_width >= 64 {
            u64::MAX
        } else {
            (1u64 << self.machine_bit_width) - 1
        }
    }

    fn push_bool(&mut self, bitlen: u16, lanes: Vec<Vec<u8>>) -> BoolShare {
        let nvals = lanes.len() as u32;
        self.wires.push(Wire::Bool { bitlen, lanes });
        BoolShare::new(self.wires.len() as u32 - 1, bitlen, nvals)
    }

    fn push_arith(&mut self, lanes: Vec<u64>) -> ArithShare {
        let nvals = lanes.len() as u32;
        self.wires.push(Wire::Arith { lanes });
        ArithShare::new(self.wires.len() as u32 - 1, nvals)
    }

    fn bool_lanes(&self, share: BoolShare) -> Result<&[Vec<u8>], BackendError> {
        match self.wires.get(share.id() as usize) {
            Some(Wire::Bool { lanes, .. }) => Ok(lanes),
            _ => Err(BackendError::InvalidShare {
                details: "handle does not name a boolean wire",
            }),
        }
    }

    fn arith_lanes(&self, share: ArithShare) -> Result<&[u64], BackendError> {
        match self.wires.get(share.id() as usize) {
            Some(Wire::Arith { lanes }) => Ok(lanes),
            _ => Err(BackendError::InvalidShare {
                details: "handle does not name an arithmetic wire",
            }),
        }
    }

    fn numeric_lanes(&self, share: BoolShare) -> Result<Vec<u64>, BackendError> {
        if share.bitlen() > 64 {
            return Err(BackendError::InvalidShare {
                details: "numeric gate over payload wider than 64 bits",
            });
        }
        let lanes = self.bool_lanes(share)?;
        Ok(lanes.iter().map(|lane| lane_value(lane)).collect())
    }

    fn lanes_to_bool(&mut self, bitlen: u16, values: Vec<u64>) -> BoolShare {
        let lanes = values
            .into_iter()
            .map(|value| value_lane(value, bitlen))
            .collect();
        self.push_bool(bitlen, lanes)
    }

    fn check_pair_nvals(a: u32, b: u32) -> Result<(), BackendError> {
        if a != b {
            return Err(BackendError::InvalidShare {
                details: "operands disagree on lane count",
            });
        }
        Ok(())
    }

    fn bytewise(
        &mut self,
        a: BoolShare,
        b: BoolShare,
        op: fn(u8, u8) -> u8,
    ) -> Result<BoolShare, BackendError> {
        Self::check_pair_nvals(a.nvals(), b.nvals())?;
        if a.bitlen() != b.bitlen() {
            return Err(BackendError::InvalidShare {
                details: "bitwise gate over mismatched payload widths",
            });
        }
        self.gate_count += 1;
        let lanes = {
            let left = self.bool_lanes(a)?;
            let right = self.bool_lanes(b)?;
            left.iter()
                .zip(right)
                .map(|(x, y)| x.iter().zip(y).map(|(&p, &q)| op(p, q)).collect())
                .collect()
        };
        Ok(self.push_bool(a.bitlen(), lanes))
    }

    fn to_arith(&mut self, share: BoolShare) -> Result<ArithShare, BackendError> {
        let mask = self.word_mask();
        let values = self
            .numeric_lanes(share)?
            .into_iter()
            .map(|v| v & mask)
            .collect();
        self.gate_count += 1;
        Ok(self.push_arith(values))
    }

    fn to_bool(&mut self, share: ArithShare) -> Result<BoolShare, BackendError> {
        let bitlen = self.machine_bit_width as u16;
        let values = self.arith_lanes(share)?.to_vec();
        self.gate_count += 1;
        Ok(self.lanes_to_bool(bitlen, values))
    }
}

impl MpcBackend for LoopbackBackend {
    fn machine_bit_width(&self) -> usize {
        self.machine_bit_width
    }

    fn boolean_sharing(&self) -> BooleanSharing {
        self.sharing
    }

    fn bool_input(
        &mut self,
        _party: Role,
        bitlen: u16,
        lanes: &[Vec<u8>],
    ) -> Result<BoolShare, BackendError> {
        let expected = bit_bytes(bitlen as usize);
        let mut owned = Vec::with_capacity(lanes.len());
        for lane in lanes {
            if lane.len() != expected {
                return Err(BackendError::InvalidShare {
                    details: "input lane byte length does not match payload width",
                });
            }
            let mut lane = lane.clone();
            mask_to_width(&mut lane, bitlen as usize);
            owned.push(lane);
        }
        Ok(self.push_bool(bitlen, owned))
    }

    fn bool_dummy(&mut self, bitlen: u16, nvals: u32) -> Result<BoolShare, BackendError> {
        self.dummy_inputs += 1;
        let lanes = vec![vec![0u8; bit_bytes(bitlen as usize)]; nvals as usize];
        Ok(self.push_bool(bitlen, lanes))
    }

    fn bool_constant(
        &mut self,
        value: u64,
        bitlen: u16,
        nvals: u32,
    ) -> Result<BoolShare, BackendError> {
        Ok(self.lanes_to_bool(bitlen, vec![value; nvals as usize]))
    }

    fn arith_input(&mut self, _party: Role, lanes: &[u64]) -> Result<ArithShare, BackendError> {
        let mask = self.word_mask();
        Ok(self.push_arith(lanes.iter().map(|&v| v & mask).collect()))
    }

    fn arith_dummy(&mut self, nvals: u32) -> Result<ArithShare, BackendError> {
        self.dummy_inputs += 1;
        Ok(self.push_arith(vec![0; nvals as usize]))
    }

    fn arith_constant(&mut self, value: u64, nvals: u32) -> Result<ArithShare, BackendError> {
        let mask = self.word_mask();
        Ok(self.push_arith(vec![value & mask; nvals as usize]))
    }

    fn and(&mut self, a: BoolShare, b: BoolShare) -> Result<BoolShare, BackendError> {
        self.bytewise(a, b, |x, y| x & y)
    }

    fn xor(&mut self, a: BoolShare, b: BoolShare) -> Result<BoolShare, BackendError> {
        self.bytewise(a, b, |x, y| x ^ y)
    }

    fn or(&mut self, a: BoolShare, b: BoolShare) -> Result<BoolShare, BackendError> {
        self.bytewise(a, b, |x, y| x | y)
    }

    fn not(&mut self, a: BoolShare) -> Result<BoolShare, BackendError> {
        self.gate_count += 1;
        let bitlen = a.bitlen();
        let lanes = self
            .bool_lanes(a)?
            .iter()
            .map(|lane| {
                let mut flipped: Vec<u8> = lane.iter().map(|&b| !b).collect();
                mask_to_width(&mut flipped, bitlen as usize);
                flipped
            })
            .collect();
        Ok(self.push_bool(bitlen, lanes))
    }

    fn add_b(&mut self, a: BoolShare, b: BoolShare) -> Result<BoolShare, BackendError> {
        Self::check_pair_nvals(a.nvals(), b.nvals())?;
        let bitlen = (a.bitlen().max(b.bitlen()) + 1).min(64);
        self.gate_count += 1;
        let values: Vec<u64> = self
            .numeric_lanes(a)?
            .into_iter()
            .zip(self.numeric_lanes(b)?)
            .map(|(x, y)| x.wrapping_add(y))
            .collect();
        Ok(self.lanes_to_bool(bitlen, values))
    }

    fn eq(&mut self, a: BoolShare, b: BoolShare) -> Result<BoolShare, BackendError> {
        Self::check_pair_nvals(a.nvals(), b.nvals())?;
        if a.bitlen() != b.bitlen() {
            return Err(BackendError::InvalidShare {
                details: "equality gate over mismatched payload widths",
            });
        }
        self.gate_count += 1;
        let values: Vec<u64> = {
            let left = self.bool_lanes(a)?;
            let right = self.bool_lanes(b)?;
            left.iter()
                .zip(right)
                .map(|(x, y)| u64::from(x == y))
                .collect()
        };
        Ok(self.lanes_to_bool(1, values))
    }

    fn lt(&mut self, a: BoolShare, b: BoolShare) -> Result<BoolShare, BackendError> {
        Self::check_pair_nvals(a.nvals(), b.nvals())?;
        self.gate_count += 1;
        let values: Vec<u64> = self
            .numeric_lanes(a)?
            .into_iter()
            .zip(self.numeric_lanes(b)?)
            .map(|(x, y)| u64::from(x < y))
            .collect();
        Ok(self.lanes_to_bool(1, values))
    }

    fn shl_const(&mut self, a: BoolShare, shift: u16) -> Result<BoolShare, BackendError> {
        let bitlen = a.bitlen() + shift;
        if bitlen > 64 {
            return Err(BackendError::InvalidShare {
                details: "left shift widens payload past 64 bits",
            });
        }
        self.gate_count += 1;
        let values: Vec<u64> = self
            .numeric_lanes(a)?
            .into_iter()
            .map(|v| v << shift)
            .collect();
        Ok(self.lanes_to_bool(bitlen, values))
    }

    fn bool_truncate(&mut self, a: BoolShare, bitlen: u16) -> Result<BoolShare, BackendError> {
        if bitlen == 0 || bitlen > a.bitlen() {
            return Err(BackendError::InvalidShare {
                details: "truncation must narrow the payload",
            });
        }
        self.gate_count += 1;
        let width = bitlen as usize;
        let lanes = self
            .bool_lanes(a)?
            .iter()
            .map(|lane| {
                let mut narrowed = lane[..bit_bytes(width)].to_vec();
                mask_to_width(&mut narrowed, width);
                narrowed
            })
            .collect();
        Ok(self.push_bool(bitlen, lanes))
    }

    fn mux(
        &mut self,
        sel: BoolShare,
        if_true: BoolShare,
        if_false: BoolShare,
    ) -> Result<BoolShare, BackendError> {
        Self::check_pair_nvals(sel.nvals(), if_true.nvals())?;
        Self::check_pair_nvals(if_true.nvals(), if_false.nvals())?;
        if sel.bitlen() != 1 {
            return Err(BackendError::InvalidShare {
                details: "mux selector must be a single bit",
            });
        }
        if if_true.bitlen() != if_false.bitlen() {
            return Err(BackendError::InvalidShare {
                details: "mux branches disagree on payload width",
            });
        }
        self.gate_count += 1;
        let lanes: Vec<Vec<u8>> = {
            let sel_lanes = self.bool_lanes(sel)?;
            let true_lanes = self.bool_lanes(if_true)?;
            let false_lanes = self.bool_lanes(if_false)?;
            sel_lanes
                .iter()
                .zip(true_lanes.iter().zip(false_lanes))
                .map(|(s, (t, f))| if s[0] & 1 == 1 { t.clone() } else { f.clone() })
                .collect()
        };
        Ok(self.push_bool(if_true.bitlen(), lanes))
    }

    fn bool_bit(&mut self, a: BoolShare, index: u16) -> Result<BoolShare, BackendError> {
        if index >= a.bitlen() {
            return Err(BackendError::InvalidShare {
                details: "bit index outside payload width",
            });
        }
        self.gate_count += 1;
        let values: Vec<u64> = self
            .bool_lanes(a)?
            .iter()
            .map(|lane| u64::from(lane[index as usize / 8] >> (index % 8) & 1))
            .collect();
        Ok(self.lanes_to_bool(1, values))
    }

    fn bool_gather(&mut self, a: BoolShare, lanes: &[u32]) -> Result<BoolShare, BackendError> {
        self.gate_count += 1;
        let source = self.bool_lanes(a)?;
        let mut gathered = Vec::with_capacity(lanes.len());
        for &lane in lanes {
            let lane = source
                .get(lane as usize)
                .ok_or(BackendError::InvalidShare {
                    details: "gather index outside lane count",
                })?
                .clone();
            gathered.push(lane);
        }
        Ok(self.push_bool(a.bitlen(), gathered))
    }

    fn bool_combine(&mut self, parts: &[BoolShare]) -> Result<BoolShare, BackendError> {
        let bitlen = parts
            .first()
            .ok_or(BackendError::InvalidShare {
                details: "combine over an empty share list",
            })?
            .bitlen();
        self.gate_count += 1;
        let mut lanes = Vec::new();
        for part in parts {
            if part.bitlen() != bitlen {
                return Err(BackendError::InvalidShare {
                    details: "combine over mismatched payload widths",
                });
            }
            lanes.extend_from_slice(self.bool_lanes(*part)?);
        }
        Ok(self.push_bool(bitlen, lanes))
    }

    fn sub_circuit_div(
        &mut self,
        path: &Path,
        num: BoolShare,
        den: BoolShare,
    ) -> Result<BoolShare, BackendError> {
        if !path.is_file() {
            return Err(BackendError::MissingSubCircuit {
                path: path.to_path_buf(),
            });
        }
        Self::check_pair_nvals(num.nvals(), den.nvals())?;
        if num.bitlen() as usize > INT_DIV_INPUT_BITS || den.bitlen() as usize > INT_DIV_INPUT_BITS
        {
            return Err(BackendError::InvalidShare {
                details: "division sub-circuit operand wider than 16 bits",
            });
        }
        self.gate_count += 1;
        let values: Vec<u64> = self
            .numeric_lanes(num)?
            .into_iter()
            .zip(self.numeric_lanes(den)?)
            .map(|(n, d)| if d == 0 { 0 } else { n / d })
            .collect();
        Ok(self.lanes_to_bool(INT_DIV_INPUT_BITS as u16, values))
    }

    fn arith_add(&mut self, a: ArithShare, b: ArithShare) -> Result<ArithShare, BackendError> {
        Self::check_pair_nvals(a.nvals(), b.nvals())?;
        self.gate_count += 1;
        let mask = self.word_mask();
        let lanes: Vec<u64> = self
            .arith_lanes(a)?
            .iter()
            .zip(self.arith_lanes(b)?)
            .map(|(&x, &y)| x.wrapping_add(y) & mask)
            .collect();
        Ok(self.push_arith(lanes))
    }

    fn arith_mul(&mut self, a: ArithShare, b: ArithShare) -> Result<ArithShare, BackendError> {
        Self::check_pair_nvals(a.nvals(), b.nvals())?;
        self.gate_count += 1;
        let mask = self.word_mask();
        let lanes: Vec<u64> = self
            .arith_lanes(a)?
            .iter()
            .zip(self.arith_lanes(b)?)
            .map(|(&x, &y)| x.wrapping_mul(y) & mask)
            .collect();
        Ok(self.push_arith(lanes))
    }

    fn arith_gather(&mut self, a: ArithShare, lanes: &[u32]) -> Result<ArithShare, BackendError> {
        self.gate_count += 1;
        let source = self.arith_lanes(a)?;
        let mut gathered = Vec::with_capacity(lanes.len());
        for &lane in lanes {
            let value = *source.get(lane as usize).ok_or(BackendError::InvalidShare {
                details: "gather index outside lane count",
            })?;
            gathered.push(value);
        }
        Ok(self.push_arith(gathered))
    }

    fn arith_combine(&mut self, parts: &[ArithShare]) -> Result<ArithShare, BackendError> {
        if parts.is_empty() {
            return Err(BackendError::InvalidShare {
                details: "combine over an empty share list",
            });
        }
        self.gate_count += 1;
        let mut lanes = Vec::new();
        for part in parts {
            lanes.extend_from_slice(self.arith_lanes(*part)?);
        }
        Ok(self.push_arith(lanes))
    }

    fn a2b(&mut self, a: ArithShare) -> Result<BoolShare, BackendError> {
        self.to_bool(a)
    }

    fn a2y(&mut self, a: ArithShare) -> Result<BoolShare, BackendError> {
        self.to_bool(a)
    }

    fn b2a(&mut self, b: BoolShare) -> Result<ArithShare, BackendError> {
        self.to_arith(b)
    }

    fn y2a(&mut self, y: BoolShare) -> Result<ArithShare, BackendError> {
        self.to_arith(y)
    }

    fn reveal_bool(
        &mut self,
        share: BoolShare,
        target: OutputTarget,
    ) -> Result<OutputHandle, BackendError> {
        if share.bitlen() > 64 {
            return Err(BackendError::InvalidShare {
                details: "revealed payload wider than 64 bits",
            });
        }
        self.bool_lanes(share)?;
        self.outputs.push(Output {
            wire: share.id() as usize,
            target,
        });
        Ok(OutputHandle(self.outputs.len() as u32 - 1))
    }

    fn reveal_arith(
        &mut self,
        share: ArithShare,
        target: OutputTarget,
    ) -> Result<OutputHandle, BackendError> {
        self.arith_lanes(share)?;
        self.outputs.push(Output {
            wire: share.id() as usize,
            target,
        });
        Ok(OutputHandle(self.outputs.len() as u32 - 1))
    }

    fn execute(&mut self) -> Result<(), BackendError> {
        if self.dummy_inputs > 0 {
            return Err(BackendError::PeerUnavailable {
                reason: "the remote party's input shares",
            });
        }
        let mut results = Vec::with_capacity(self.outputs.len());
        for output in &self.outputs {
            let values = match &self.wires[output.wire] {
                Wire::Bool { lanes, .. } => lanes.iter().map(|lane| lane_value(lane)).collect(),
                Wire::Arith { lanes } => lanes.clone(),
            };
            results.push(values);
        }
        debug!(
            gates = self.gate_count,
            wires = self.wires.len(),
            outputs = self.outputs.len(),
            "loopback circuit executed"
        );
        self.results = Some(results);
        Ok(())
    }

    fn clear_values(&self, output: OutputHandle) -> Result<Vec<u64>, BackendError> {
        let results = self
            .results
            .as_ref()
            .ok_or_else(|| BackendError::execution("clear_values before execute()"))?;
        results
            .get(output.0 as usize)
            .cloned()
            .ok_or_else(|| BackendError::execution("unknown output handle"))
    }

    fn reset(&mut self) {
        self.wires.clear();
        self.outputs.clear();
        self.results = None;
        self.dummy_inputs = 0;
        self.gate_count = 0;
    }
}

fn lane_value(lane: &[u8]) -> u64 {
    let mut value = 0u64;
    for (i, &byte) in lane.iter().enumerate().take(8) {
        value |= (byte as u64) << (8 * i);
    }
    value
}

fn value_lane(value: u64, bitlen: u16) -> Vec<u8> {
    let mut lane = vec![0u8; bit_bytes(bitlen as usize)];
    for (i, byte) in lane.iter_mut().enumerate().take(8) {
        *byte = (value >> (8 * i)) as u8;
    }
    lane
}
