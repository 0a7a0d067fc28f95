//! Field descriptors: the per-field portion of a link configuration.

use serde::{Deserialize, Serialize};

/// Comparison algorithm applied to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    /// Set-similarity coefficient over bit payloads:
    /// `2 * |x AND y| / (|x| + |y|)`.
    SetSimilarity,
    /// Exact equality of the full payload.
    Equality,
}

impl core::fmt::Display for Comparator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Comparator::SetSimilarity => write!(f, "set-similarity"),
            Comparator::Equality => write!(f, "equality"),
        }
    }
}

/// Declared source type of a field.
///
/// The hint is carried from configuration to configuration consumers; the
/// linkage core never interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeHint {
    /// Numeric source value.
    Integer,
    /// Free-text source value.
    String,
    /// Pre-encoded bit payload, e.g. a Bloom filter of n-grams.
    Bitmask,
    /// Calendar date component.
    Date,
}

/// Description of a single linkage field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Unique field name; also the key used by input records.
    pub name: String,
    /// Positive, finite linkage weight.
    pub weight: f64,
    /// Comparison algorithm.
    pub comparator: Comparator,
    /// Payload width in bits.
    pub bit_width: u16,
    /// Optional source-type hint, carried but never interpreted.
    pub type_hint: Option<TypeHint>,
}

impl FieldDescriptor {
    /// Creates a descriptor without a type hint.
    pub fn new(
        name: impl Into<String>,
        weight: f64,
        comparator: Comparator,
        bit_width: u16,
    ) -> Self {
        Self {
            name: name.into(),
            weight,
            comparator,
            bit_width,
            type_hint: None,
        }
    }

    /// Attaches a type hint to the descriptor.
    pub fn with_type_hint(mut self, hint: TypeHint) -> Self {
        self.type_hint = Some(hint);
        self
    }

    /// Payload size in whole bytes.
    pub fn byte_len(&self) -> usize {
        crate::num::bit_bytes(self.bit_width as usize)
    }
}
