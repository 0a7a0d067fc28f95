//! Validated link configuration shared by the clear evaluator and the
//! circuit builder.
//!
//! A [`LinkConfig`] is assembled through [`LinkConfigBuilder`] and immutable
//! afterwards, except for the precision setters which re-validate the
//! overflow budget. Both linkage paths read the same configuration object,
//! which is what makes their fixed-point arithmetic agree.

mod builder;
mod field;
mod link;
mod precision;

pub use builder::LinkConfigBuilder;
pub use field::{Comparator, FieldDescriptor, TypeHint};
pub use link::LinkConfig;
pub use precision::{PrecisionPlan, INT_DIV_INPUT_BITS};

use core::fmt;

/// Largest admissible exchange group.
///
/// A group of size `k` costs `k!` permutation evaluations inside the circuit;
/// beyond 8 fields the gate count is prohibitive.
pub const MAX_EXCHANGE_GROUP_SIZE: usize = 8;

/// Machine bit widths the circuit arithmetic supports.
pub const SUPPORTED_MACHINE_BIT_WIDTHS: [usize; 3] = [16, 32, 64];

/// Error enumeration for configuration validation failures.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A field name appeared more than once.
    DuplicateField {
        /// Offending field name.
        name: String,
    },
    /// A field was declared with an empty name.
    EmptyFieldName,
    /// A weight was zero, negative or not finite.
    InvalidWeight {
        /// Offending field name.
        name: String,
        /// Declared weight.
        weight: f64,
    },
    /// A field was declared with a zero payload width.
    ZeroBitWidth {
        /// Offending field name.
        name: String,
    },
    /// No fields were declared.
    NoFields,
    /// An exchange group referenced an unknown field.
    UnknownGroupField {
        /// Name that did not resolve.
        name: String,
    },
    /// An exchange group had fewer than two members.
    GroupTooSmall {
        /// Declared member count.
        size: usize,
    },
    /// An exchange group exceeded [`MAX_EXCHANGE_GROUP_SIZE`].
    GroupTooLarge {
        /// Declared member count.
        size: usize,
        /// The admissible maximum.
        max: usize,
    },
    /// A field was claimed by more than one exchange group.
    OverlappingGroups {
        /// Field claimed twice.
        name: String,
    },
    /// Two members of one exchange group use different comparators.
    MixedComparators {
        /// First member of the group.
        left: String,
        /// Member with the mismatching comparator.
        right: String,
    },
    /// Two members of one exchange group use different payload widths.
    MixedBitWidths {
        /// First member of the group.
        left: String,
        /// Member with the mismatching width.
        right: String,
    },
    /// A threshold was outside `[0, 1]`.
    ThresholdOutOfRange {
        /// Which threshold failed.
        which: &'static str,
        /// Declared value.
        value: f64,
    },
    /// The tentative threshold exceeded the match threshold.
    ThresholdOrder {
        /// Declared match threshold.
        match_threshold: f64,
        /// Declared tentative threshold.
        tentative_threshold: f64,
    },
    /// The machine bit width is not one of [`SUPPORTED_MACHINE_BIT_WIDTHS`].
    UnsupportedMachineWidth {
        /// Declared width.
        got: usize,
    },
    /// The backend's arithmetic width disagrees with the configuration.
    MachineWidthDisagreement {
        /// Width the configuration was planned for.
        config: usize,
        /// Width the backend provides.
        backend: usize,
    },
    /// The precision choice violates the overflow budget.
    PrecisionOverflow {
        /// Similarity precision under test.
        set_sim_prec: usize,
        /// Weight precision under test.
        weight_prec: usize,
        /// `ceil_log2(n^2)` term of the budget.
        field_bits: usize,
        /// Available machine width.
        machine_bit_width: usize,
    },
}

impl ConfigError {
    /// Returns whether the error reports a violated precision budget rather
    /// than a malformed configuration.
    pub fn is_precision_overflow(&self) -> bool {
        matches!(self, ConfigError::PrecisionOverflow { .. })
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::DuplicateField { name } => {
                write!(f, "field '{name}' declared more than once")
            }
            ConfigError::EmptyFieldName => write!(f, "field with empty name"),
            ConfigError::InvalidWeight { name, weight } => {
                write!(f, "field '{name}' has non-positive weight {weight}")
            }
            ConfigError::ZeroBitWidth { name } => {
                write!(f, "field '{name}' has zero bit width")
            }
            ConfigError::NoFields => write!(f, "configuration declares no fields"),
            ConfigError::UnknownGroupField { name } => {
                write!(f, "exchange group references unknown field '{name}'")
            }
            ConfigError::GroupTooSmall { size } => {
                write!(f, "exchange group with {size} member(s); at least 2 required")
            }
            ConfigError::GroupTooLarge { size, max } => {
                write!(f, "exchange group with {size} members exceeds maximum {max}")
            }
            ConfigError::OverlappingGroups { name } => {
                write!(f, "field '{name}' appears in more than one exchange group")
            }
            ConfigError::MixedComparators { left, right } => write!(
                f,
                "cannot exchange field '{right}' with '{left}': different comparators"
            ),
            ConfigError::MixedBitWidths { left, right } => write!(
                f,
                "cannot exchange field '{right}' with '{left}': different bit widths"
            ),
            ConfigError::ThresholdOutOfRange { which, value } => {
                write!(f, "{which} threshold {value} outside [0, 1]")
            }
            ConfigError::ThresholdOrder {
                match_threshold,
                tentative_threshold,
            } => write!(
                f,
                "tentative threshold {tentative_threshold} exceeds match threshold {match_threshold}"
            ),
            ConfigError::UnsupportedMachineWidth { got } => {
                write!(f, "unsupported machine bit width {got}")
            }
            ConfigError::MachineWidthDisagreement { config, backend } => write!(
                f,
                "configuration planned for {config}-bit words, backend provides {backend}"
            ),
            ConfigError::PrecisionOverflow {
                set_sim_prec,
                weight_prec,
                field_bits,
                machine_bit_width,
            } => write!(
                f,
                "precisions ({set_sim_prec}, {weight_prec}) plus {field_bits} field bits \
                 overflow machine width {machine_bit_width}"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}
