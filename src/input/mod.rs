//! Typed inputs for one linkage run.
//!
//! The client contributes a single query record, the server a database of
//! `nvals` rows. Every configured field must be present as a key on both
//! sides; a missing *value* is the explicit `None` entry, which contributes
//! zero weight during scoring.

use std::collections::BTreeMap;

use core::fmt;
use serde::{Deserialize, Serialize};

use crate::config::LinkConfig;

/// Fixed-length bit payload of one field value.
///
/// Carries exactly `ceil(bit_width / 8)` bytes for its field; bit `i` of the
/// payload lives at `bytes[i / 8] >> (i % 8)`. Stray bits beyond the declared
/// width are ignored by every consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bitmask(Vec<u8>);

impl Bitmask {
    /// Wraps a byte payload.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Raw payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Payload length in bytes.
    pub fn byte_len(&self) -> usize {
        self.0.len()
    }
}

impl From<Vec<u8>> for Bitmask {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl<const N: usize> From<[u8; N]> for Bitmask {
    fn from(bytes: [u8; N]) -> Self {
        Self(bytes.to_vec())
    }
}

/// One record: field name to optional payload.
pub type Record = BTreeMap<String, Option<Bitmask>>;

/// One database column: optional payload per row.
pub type Column = Vec<Option<Bitmask>>;

/// Query-side input of one linkage run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInput {
    /// The query record.
    pub record: Record,
    /// Database cardinality the client was told; the record is replicated
    /// this many times inside the circuit.
    pub nvals: u32,
}

impl ClientInput {
    /// Creates a client input.
    pub fn new(record: Record, nvals: u32) -> Self {
        Self { record, nvals }
    }

    /// Checks the record against the configuration: every configured field
    /// present, no unknown fields, payload lengths exact.
    pub fn validate(&self, cfg: &LinkConfig) -> Result<(), ShapeError> {
        validate_keys(cfg, self.record.keys())?;
        for field in cfg.fields() {
            let entry = self
                .record
                .get(&field.name)
                .ok_or_else(|| ShapeError::MissingField {
                    name: field.name.clone(),
                })?;
            if let Some(bitmask) = entry {
                check_payload(&field.name, bitmask, field.byte_len(), None)?;
            }
        }
        Ok(())
    }
}

/// Database-side input of one linkage run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInput {
    /// Field name to column of optional payloads.
    pub database: BTreeMap<String, Column>,
    /// Number of database rows; every column has this length.
    pub nvals: u32,
}

impl ServerInput {
    /// Creates a server input, deriving `nvals` from the first column and
    /// checking that all columns agree on it.
    pub fn new(database: BTreeMap<String, Column>) -> Result<Self, ShapeError> {
        let nvals = database
            .values()
            .next()
            .map(|column| column.len() as u32)
            .unwrap_or(0);
        for (name, column) in &database {
            if column.len() as u32 != nvals {
                return Err(ShapeError::ColumnLength {
                    name: name.clone(),
                    expected: nvals,
                    got: column.len() as u32,
                });
            }
        }
        Ok(Self { database, nvals })
    }

    /// Checks the database against the configuration: every configured field
    /// present, no unknown fields, column lengths uniform, payload lengths
    /// exact.
    pub fn validate(&self, cfg: &LinkConfig) -> Result<(), ShapeError> {
        validate_keys(cfg, self.database.keys())?;
        for field in cfg.fields() {
            let column =
                self.database
                    .get(&field.name)
                    .ok_or_else(|| ShapeError::MissingField {
                        name: field.name.clone(),
                    })?;
            if column.len() as u32 != self.nvals {
                return Err(ShapeError::ColumnLength {
                    name: field.name.clone(),
                    expected: self.nvals,
                    got: column.len() as u32,
                });
            }
            for (row, entry) in column.iter().enumerate() {
                if let Some(bitmask) = entry {
                    check_payload(&field.name, bitmask, field.byte_len(), Some(row as u32))?;
                }
            }
        }
        Ok(())
    }
}

fn validate_keys<'a>(
    cfg: &LinkConfig,
    keys: impl Iterator<Item = &'a String>,
) -> Result<(), ShapeError> {
    for key in keys {
        if cfg.field_index(key).is_none() {
            return Err(ShapeError::UnknownField { name: key.clone() });
        }
    }
    Ok(())
}

fn check_payload(
    name: &str,
    bitmask: &Bitmask,
    expected: usize,
    row: Option<u32>,
) -> Result<(), ShapeError> {
    if bitmask.byte_len() != expected {
        return Err(ShapeError::WrongByteLength {
            name: name.to_string(),
            expected,
            got: bitmask.byte_len(),
            row,
        });
    }
    Ok(())
}

/// Error enumeration for input shape violations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    /// A configured field had no entry in the input.
    MissingField {
        /// Missing field name.
        name: String,
    },
    /// The input carried a key that no configured field matches.
    UnknownField {
        /// Unknown key.
        name: String,
    },
    /// A payload had the wrong byte length for its field.
    WrongByteLength {
        /// Field name.
        name: String,
        /// Expected byte length.
        expected: usize,
        /// Observed byte length.
        got: usize,
        /// Database row, when server-side.
        row: Option<u32>,
    },
    /// A database column disagreed with the declared row count.
    ColumnLength {
        /// Field name.
        name: String,
        /// Declared row count.
        expected: u32,
        /// Observed column length.
        got: u32,
    },
    /// The input declared a different database cardinality than the built
    /// circuit.
    CardinalityMismatch {
        /// Cardinality the circuit was built for.
        expected: u32,
        /// Cardinality the input declared.
        got: u32,
    },
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapeError::MissingField { name } => write!(f, "input misses field '{name}'"),
            ShapeError::UnknownField { name } => write!(f, "input names unknown field '{name}'"),
            ShapeError::WrongByteLength {
                name,
                expected,
                got,
                row,
            } => match row {
                Some(row) => write!(
                    f,
                    "field '{name}' row {row}: payload of {got} bytes, expected {expected}"
                ),
                None => write!(
                    f,
                    "field '{name}': payload of {got} bytes, expected {expected}"
                ),
            },
            ShapeError::ColumnLength {
                name,
                expected,
                got,
            } => write!(
                f,
                "column '{name}' has {got} rows, database declares {expected}"
            ),
            ShapeError::CardinalityMismatch { expected, got } => write!(
                f,
                "input declares {got} database rows, circuit was built for {expected}"
            ),
        }
    }
}

impl std::error::Error for ShapeError {}
