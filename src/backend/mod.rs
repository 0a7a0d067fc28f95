//! Abstract secure-computation backend consumed by the circuit builder.
//!
//! The linkage core never talks to an MPC runtime directly; it drives the
//! [`MpcBackend`] trait, which models typed shares, SIMD gates, share-type
//! conversions and circuit execution. [`LoopbackBackend`] is the reference
//! implementation shipped with the crate: it evaluates the gate stream
//! in-process over both parties' inputs and is what the agreement tests and
//! the reference harness run against.

mod loopback;
mod traits;

pub use loopback::LoopbackBackend;
pub use traits::{
    ArithShare, BoolShare, BooleanSharing, MpcBackend, OutputHandle, OutputTarget, Role,
};

use core::fmt;
use std::path::PathBuf;

/// Error enumeration for backend failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Connection establishment or teardown failed.
    Connection {
        /// Human-readable failure context.
        details: String,
    },
    /// The setup phase failed.
    Setup {
        /// Human-readable failure context.
        details: String,
    },
    /// Online circuit execution failed.
    Execution {
        /// Human-readable failure context.
        details: String,
    },
    /// The file-driven sub-circuit was not found.
    MissingSubCircuit {
        /// Path that was probed.
        path: PathBuf,
    },
    /// The run requires a network peer the backend does not have.
    ///
    /// The loopback backend raises this when only one party's real inputs
    /// were provided: the missing half would normally arrive over the wire.
    PeerUnavailable {
        /// Which side's inputs are placeholders.
        reason: &'static str,
    },
    /// A gate was driven with incompatible share shapes.
    InvalidShare {
        /// Violated constraint.
        details: &'static str,
    },
}

impl BackendError {
    pub(crate) fn execution(details: impl Into<String>) -> Self {
        BackendError::Execution {
            details: details.into(),
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Connection { details } => write!(f, "backend connection: {details}"),
            BackendError::Setup { details } => write!(f, "backend setup: {details}"),
            BackendError::Execution { details } => write!(f, "backend execution: {details}"),
            BackendError::MissingSubCircuit { path } => {
                write!(f, "sub-circuit file not found: {}", path.display())
            }
            BackendError::PeerUnavailable { reason } => {
                write!(f, "no peer to supply {reason}")
            }
            BackendError::InvalidShare { details } => write!(f, "invalid share usage: {details}"),
        }
    }
}

impl std::error::Error for BackendError {}
