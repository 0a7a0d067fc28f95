#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

//! Secure two-party record linkage engine.
//!
//! Two mutually distrusting parties — a client holding a query record and a
//! server holding a database — jointly compute, for each query, the index of
//! the database row maximising a weighted similarity score and whether that
//! maximum exceeds a match and a tentative-match threshold, without either
//! party learning the other's inputs or any intermediate score.
//!
//! The crate is organised around a shared numeric model:
//!
//! - [`config`] validates the linkage configuration and plans the
//!   fixed-point precisions both paths compute with;
//! - [`clear`] evaluates the decision in the clear, in three numeric
//!   instantiations, and serves as the oracle for the secure path;
//! - [`circuit`] assembles the secure circuit from gadgets over the
//!   abstract [`backend`] contract;
//! - [`engine`] drives the build → setup → online lifecycle and decodes
//!   results.
//!
//! The shipped [`backend::LoopbackBackend`] evaluates the circuit in-process
//! over both parties' inputs; it validates circuit shape and semantics
//! against the clear evaluator and backs the `link-harness` reference
//! binary. Production deployments substitute a networked implementation of
//! [`backend::MpcBackend`].

pub mod backend;
pub mod circuit;
pub mod clear;
pub mod config;
pub mod engine;
pub mod input;
pub mod num;

use core::fmt;

pub use backend::{BackendError, BooleanSharing, LoopbackBackend, MpcBackend, Role};
pub use clear::{ClearCounts, ClearResult, ScoreUnit};
pub use config::{
    Comparator, ConfigError, FieldDescriptor, LinkConfig, LinkConfigBuilder, PrecisionPlan,
    TypeHint, MAX_EXCHANGE_GROUP_SIZE,
};
pub use engine::{
    CountResult, EngineConfig, LinkageEngine, LinkageResult, ScoreQuotient, INT_DIV_CIRCUIT_FILE,
};
pub use input::{Bitmask, ClientInput, Record, ServerInput, ShapeError};

/// Result type used throughout the library.
pub type LinkResult<T> = core::result::Result<T, LinkError>;

/// Classification of a [`LinkError`], for callers that match on failure
/// classes rather than payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkErrorKind {
    /// A configuration invariant was violated.
    InvalidConfig,
    /// A precision choice violated the overflow budget.
    PrecisionOverflow,
    /// An input did not have the shape the configuration demands.
    ShapeMismatch,
    /// The database holds no rows.
    EmptyDatabase,
    /// An operation was called in the wrong engine state.
    IllegalState,
    /// The secure-computation backend failed.
    BackendError,
}

/// Error enumeration for the linkage engine.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkError {
    /// A configuration invariant was violated.
    InvalidConfig(ConfigError),
    /// A precision choice violated the overflow budget.
    PrecisionOverflow(ConfigError),
    /// An input did not have the shape the configuration demands.
    ShapeMismatch(ShapeError),
    /// The database holds no rows.
    EmptyDatabase,
    /// An operation was called in the wrong engine state.
    IllegalState {
        /// The operation that was attempted.
        operation: &'static str,
        /// The state the engine was in.
        state: &'static str,
    },
    /// The secure-computation backend failed.
    Backend(BackendError),
}

impl LinkError {
    /// Returns the failure class of this error.
    pub fn kind(&self) -> LinkErrorKind {
        match self {
            LinkError::InvalidConfig(_) => LinkErrorKind::InvalidConfig,
            LinkError::PrecisionOverflow(_) => LinkErrorKind::PrecisionOverflow,
            LinkError::ShapeMismatch(_) => LinkErrorKind::ShapeMismatch,
            LinkError::EmptyDatabase => LinkErrorKind::EmptyDatabase,
            LinkError::IllegalState { .. } => LinkErrorKind::IllegalState,
            LinkError::Backend(_) => LinkErrorKind::BackendError,
        }
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::InvalidConfig(error) => write!(f, "invalid configuration: {error}"),
            LinkError::PrecisionOverflow(error) => write!(f, "precision overflow: {error}"),
            LinkError::ShapeMismatch(error) => write!(f, "input shape mismatch: {error}"),
            LinkError::EmptyDatabase => write!(f, "database holds no rows"),
            LinkError::IllegalState { operation, state } => {
                write!(f, "{operation} called while engine is {state}")
            }
            LinkError::Backend(error) => write!(f, "backend failure: {error}"),
        }
    }
}

impl std::error::Error for LinkError {}

impl From<ConfigError> for LinkError {
    fn from(error: ConfigError) -> Self {
        if error.is_precision_overflow() {
            LinkError::PrecisionOverflow(error)
        } else {
            LinkError::InvalidConfig(error)
        }
    }
}

impl From<ShapeError> for LinkError {
    fn from(error: ShapeError) -> Self {
        LinkError::ShapeMismatch(error)
    }
}

impl From<BackendError> for LinkError {
    fn from(error: BackendError) -> Self {
        LinkError::Backend(error)
    }
}
