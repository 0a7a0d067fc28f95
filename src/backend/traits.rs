//! The backend contract: typed share handles and the gate vocabulary.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::BackendError;

/// Party executing one side of the two-party computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Holds the query record.
    Client,
    /// Holds the database.
    Server,
}

/// Boolean sharing flavour used for the boolean circuit portions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BooleanSharing {
    /// GMW-style bitwise sharing.
    Gmw,
    /// Garbled-circuit sharing.
    Yao,
}

/// Recipient of a revealed output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputTarget {
    /// Both parties learn the value.
    All,
    /// Only the query side learns the value.
    Client,
    /// Only the database side learns the value.
    Server,
}

/// Handle to a boolean share allocated by the backend.
///
/// A share carries `nvals` parallel lanes of a `bitlen`-bit payload; one lane
/// per database row. Handles are plain values; the shared secret stays inside
/// the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoolShare {
    id: u32,
    bitlen: u16,
    nvals: u32,
}

impl BoolShare {
    /// Wraps a backend wire id. Only backend implementations allocate ids.
    pub fn new(id: u32, bitlen: u16, nvals: u32) -> Self {
        Self { id, bitlen, nvals }
    }

    /// Backend wire id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Payload width in bits.
    pub fn bitlen(&self) -> u16 {
        self.bitlen
    }

    /// Number of SIMD lanes.
    pub fn nvals(&self) -> u32 {
        self.nvals
    }
}

/// Handle to an arithmetic share (mod `2^machine_bit_width`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArithShare {
    id: u32,
    nvals: u32,
}

impl ArithShare {
    /// Wraps a backend wire id. Only backend implementations allocate ids.
    pub fn new(id: u32, nvals: u32) -> Self {
        Self { id, nvals }
    }

    /// Backend wire id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Number of SIMD lanes.
    pub fn nvals(&self) -> u32 {
        self.nvals
    }
}

/// Handle to a revealed output, readable after `execute()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputHandle(pub u32);

/// Contract between the linkage core and a two-party computation runtime.
///
/// All binary gates require operands with matching lane counts; boolean
/// bitwise gates additionally require matching payload widths. Lane counts
/// and widths are tracked in the handles, so misuse surfaces as
/// [`BackendError::InvalidShare`] before any protocol work happens.
pub trait MpcBackend {
    /// Arithmetic word width, typically 32 or 64.
    fn machine_bit_width(&self) -> usize;

    /// Boolean sharing flavour the boolean gates run under.
    fn boolean_sharing(&self) -> BooleanSharing;

    /// Creates a private boolean input share from per-lane byte payloads.
    fn bool_input(
        &mut self,
        party: Role,
        bitlen: u16,
        lanes: &[Vec<u8>],
    ) -> Result<BoolShare, BackendError>;

    /// Creates a zero-valued placeholder for the remote party's boolean input.
    fn bool_dummy(&mut self, bitlen: u16, nvals: u32) -> Result<BoolShare, BackendError>;

    /// Creates a public boolean constant replicated over `nvals` lanes.
    fn bool_constant(&mut self, value: u64, bitlen: u16, nvals: u32)
        -> Result<BoolShare, BackendError>;

    /// Creates a private arithmetic input share from per-lane values.
    fn arith_input(&mut self, party: Role, lanes: &[u64]) -> Result<ArithShare, BackendError>;

    /// Creates a zero-valued placeholder for the remote party's arithmetic
    /// input.
    fn arith_dummy(&mut self, nvals: u32) -> Result<ArithShare, BackendError>;

    /// Creates a public arithmetic constant replicated over `nvals` lanes.
    fn arith_constant(&mut self, value: u64, nvals: u32) -> Result<ArithShare, BackendError>;

    /// Bitwise AND.
    fn and(&mut self, a: BoolShare, b: BoolShare) -> Result<BoolShare, BackendError>;

    /// Bitwise XOR (boolean addition).
    fn xor(&mut self, a: BoolShare, b: BoolShare) -> Result<BoolShare, BackendError>;

    /// Bitwise OR.
    fn or(&mut self, a: BoolShare, b: BoolShare) -> Result<BoolShare, BackendError>;

    /// Bitwise complement within the payload width.
    fn not(&mut self, a: BoolShare) -> Result<BoolShare, BackendError>;

    /// Unsigned integer addition; the result is one bit wider than the wider
    /// operand.
    fn add_b(&mut self, a: BoolShare, b: BoolShare) -> Result<BoolShare, BackendError>;

    /// Payload equality, yielding a single-bit share.
    fn eq(&mut self, a: BoolShare, b: BoolShare) -> Result<BoolShare, BackendError>;

    /// Unsigned `a < b`, yielding a single-bit share.
    fn lt(&mut self, a: BoolShare, b: BoolShare) -> Result<BoolShare, BackendError>;

    /// Left shift by a public constant; widens the payload by `shift` bits.
    fn shl_const(&mut self, a: BoolShare, shift: u16) -> Result<BoolShare, BackendError>;

    /// Narrows the declared payload width to the low `bitlen` bits.
    ///
    /// A wire-subset gate: callers use it to drop always-zero high wires
    /// before feeding a fixed-shape sub-circuit. `bitlen` must not exceed
    /// the share's current width.
    fn bool_truncate(&mut self, a: BoolShare, bitlen: u16) -> Result<BoolShare, BackendError>;

    /// Lane-wise selection: `if_true` where `sel` is set, else `if_false`.
    fn mux(
        &mut self,
        sel: BoolShare,
        if_true: BoolShare,
        if_false: BoolShare,
    ) -> Result<BoolShare, BackendError>;

    /// Extracts one payload bit as a single-bit share.
    fn bool_bit(&mut self, a: BoolShare, index: u16) -> Result<BoolShare, BackendError>;

    /// Re-arranges SIMD lanes: lane `k` of the result is lane `lanes[k]` of
    /// the operand.
    fn bool_gather(&mut self, a: BoolShare, lanes: &[u32]) -> Result<BoolShare, BackendError>;

    /// Concatenates the lanes of equal-width shares.
    fn bool_combine(&mut self, parts: &[BoolShare]) -> Result<BoolShare, BackendError>;

    /// Applies the file-driven integer-division sub-circuit.
    ///
    /// Both operands must fit the sub-circuit's 16-bit input width. A zero
    /// divisor yields zero, matching the clear evaluator's similarity rule.
    fn sub_circuit_div(
        &mut self,
        path: &Path,
        num: BoolShare,
        den: BoolShare,
    ) -> Result<BoolShare, BackendError>;

    /// Arithmetic addition mod `2^machine_bit_width`.
    fn arith_add(&mut self, a: ArithShare, b: ArithShare) -> Result<ArithShare, BackendError>;

    /// Arithmetic multiplication mod `2^machine_bit_width`.
    fn arith_mul(&mut self, a: ArithShare, b: ArithShare) -> Result<ArithShare, BackendError>;

    /// Lane re-arrangement for arithmetic shares.
    fn arith_gather(&mut self, a: ArithShare, lanes: &[u32]) -> Result<ArithShare, BackendError>;

    /// Lane concatenation for arithmetic shares.
    fn arith_combine(&mut self, parts: &[ArithShare]) -> Result<ArithShare, BackendError>;

    /// Converts an arithmetic share to a GMW boolean share.
    fn a2b(&mut self, a: ArithShare) -> Result<BoolShare, BackendError>;

    /// Converts an arithmetic share to a Yao boolean share.
    fn a2y(&mut self, a: ArithShare) -> Result<BoolShare, BackendError>;

    /// Converts a GMW boolean share to an arithmetic share.
    fn b2a(&mut self, b: BoolShare) -> Result<ArithShare, BackendError>;

    /// Converts a Yao boolean share to an arithmetic share.
    fn y2a(&mut self, y: BoolShare) -> Result<ArithShare, BackendError>;

    /// Registers a boolean share for reveal to `target`.
    fn reveal_bool(
        &mut self,
        share: BoolShare,
        target: OutputTarget,
    ) -> Result<OutputHandle, BackendError>;

    /// Registers an arithmetic share for reveal to `target`.
    fn reveal_arith(
        &mut self,
        share: ArithShare,
        target: OutputTarget,
    ) -> Result<OutputHandle, BackendError>;

    /// Runs protocol precomputation for the pending circuit.
    ///
    /// Backends without a dedicated setup phase keep the default no-op.
    fn setup(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    /// Runs the accumulated circuit; blocks until the peer interaction
    /// finishes.
    fn execute(&mut self) -> Result<(), BackendError>;

    /// Reads a revealed output after [`MpcBackend::execute`]; one value per
    /// lane.
    fn clear_values(&self, output: OutputHandle) -> Result<Vec<u64>, BackendError>;

    /// Releases all circuits and shares but keeps the connection.
    fn reset(&mut self);
}
