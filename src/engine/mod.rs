//! Engine facade: lifecycle, execution and result decoding.
//!
//! One engine owns one backend and runs one linkage at a time. The state
//! machine is linear: *Created* → *Built* → *SetupDone* → (execute) →
//! *Created*. Executing from *Built* logs a warning and runs the setup phase
//! implicitly; that convenience is documented and deprecated.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::backend::{BackendError, BooleanSharing, LoopbackBackend, MpcBackend, Role};
use crate::circuit::CircuitBuilder;
use crate::config::{ConfigError, LinkConfig};
use crate::input::{ClientInput, ServerInput};
use crate::{LinkError, LinkResult};

/// File name of the integer-division sub-circuit inside
/// [`EngineConfig::circuit_data_dir`].
pub const INT_DIV_CIRCUIT_FILE: &str = "int_div_16.gate";

/// Runtime configuration of one engine instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Which party this process plays.
    pub role: Role,
    /// Boolean sharing flavour for the boolean circuit portions.
    pub boolean_sharing: BooleanSharing,
    /// Peer host name or address.
    pub peer_host: String,
    /// Peer port.
    pub peer_port: u16,
    /// Worker threads the backend may use for gate evaluation.
    pub worker_threads: usize,
    /// Directory holding the file-driven sub-circuits.
    pub circuit_data_dir: PathBuf,
    /// Debug switch: additionally reveal the winning `(N, D)` pair.
    pub reveal_score: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            role: Role::Client,
            boolean_sharing: BooleanSharing::Yao,
            peer_host: "127.0.0.1".to_string(),
            peer_port: 5676,
            worker_threads: 1,
            circuit_data_dir: PathBuf::from("data/circ"),
            reveal_score: false,
        }
    }
}

/// Winning quotient revealed in debug runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreQuotient {
    /// Scaled score sum of the winning row.
    pub numerator: u64,
    /// Effective weight sum of the winning row.
    pub denominator: u64,
}

/// Decoded result of one linkage run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkageResult {
    /// Index of the database row with the maximal score.
    pub index: u32,
    /// Whether the winning score strictly exceeds the match threshold.
    pub is_match: bool,
    /// Whether the winning score strictly exceeds the tentative threshold.
    pub is_tentative_match: bool,
    /// Winning quotient; populated only when
    /// [`EngineConfig::reveal_score`] is set.
    pub score: Option<ScoreQuotient>,
}

/// Decoded result of one counting run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountResult {
    /// Rows whose score strictly exceeds the match threshold.
    pub matches: u32,
    /// Rows whose score strictly exceeds the tentative threshold.
    pub tentative_matches: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CircuitKind {
    Linkage,
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState {
    Created,
    Built { nvals: u32, kind: CircuitKind },
    SetupDone { nvals: u32, kind: CircuitKind },
}

impl EngineState {
    fn name(&self) -> &'static str {
        match self {
            EngineState::Created => "created",
            EngineState::Built { .. } => "built",
            EngineState::SetupDone { .. } => "setup-done",
        }
    }
}

enum RunInputs<'i> {
    Client(&'i ClientInput),
    Server(&'i ServerInput),
    #[cfg(feature = "run-both")]
    Both(&'i ClientInput, &'i ServerInput),
}

/// The secure linkage engine.
///
/// Owns its backend exclusively; the link configuration is shared read-only
/// with the clear evaluator.
pub struct LinkageEngine<'cfg, B: MpcBackend = LoopbackBackend> {
    backend: B,
    engine_cfg: EngineConfig,
    link_cfg: &'cfg LinkConfig,
    state: EngineState,
}

impl<'cfg> LinkageEngine<'cfg, LoopbackBackend> {
    /// Creates an engine over the in-process loopback backend.
    pub fn new(engine_cfg: EngineConfig, link_cfg: &'cfg LinkConfig) -> LinkResult<Self> {
        let backend = LoopbackBackend::new(
            link_cfg.machine_bit_width(),
            engine_cfg.boolean_sharing,
        );
        Self::with_backend(backend, engine_cfg, link_cfg)
    }
}

impl<'cfg, B: MpcBackend> LinkageEngine<'cfg, B> {
    /// Creates an engine over a caller-provided backend.
    pub fn with_backend(
        backend: B,
        engine_cfg: EngineConfig,
        link_cfg: &'cfg LinkConfig,
    ) -> LinkResult<Self> {
        if backend.machine_bit_width() != link_cfg.machine_bit_width() {
            return Err(LinkError::InvalidConfig(
                ConfigError::MachineWidthDisagreement {
                    config: link_cfg.machine_bit_width(),
                    backend: backend.machine_bit_width(),
                },
            ));
        }
        Ok(Self {
            backend,
            engine_cfg,
            link_cfg,
            state: EngineState::Created,
        })
    }

    /// The link configuration this engine runs under.
    pub fn link_config(&self) -> &LinkConfig {
        self.link_cfg
    }

    /// Declares the database cardinality and stages a linkage circuit.
    pub fn build_circuit(&mut self, nvals: u32) -> LinkResult<()> {
        self.build(nvals, CircuitKind::Linkage)
    }

    /// Declares the database cardinality and stages a counting circuit.
    pub fn build_count_circuit(&mut self, nvals: u32) -> LinkResult<()> {
        self.build(nvals, CircuitKind::Count)
    }

    fn build(&mut self, nvals: u32, kind: CircuitKind) -> LinkResult<()> {
        if self.state != EngineState::Created {
            return Err(LinkError::IllegalState {
                operation: "build_circuit",
                state: self.state.name(),
            });
        }
        if nvals == 0 {
            return Err(LinkError::EmptyDatabase);
        }
        let div_circuit = self.div_circuit_path();
        if !div_circuit.is_file() {
            return Err(LinkError::Backend(BackendError::MissingSubCircuit {
                path: div_circuit,
            }));
        }
        self.state = EngineState::Built { nvals, kind };
        Ok(())
    }

    /// Runs the backend's setup phase.
    pub fn run_setup(&mut self) -> LinkResult<()> {
        match self.state {
            EngineState::Built { nvals, kind } => {
                self.backend.setup()?;
                self.state = EngineState::SetupDone { nvals, kind };
                Ok(())
            }
            _ => Err(LinkError::IllegalState {
                operation: "run_setup",
                state: self.state.name(),
            }),
        }
    }

    /// Executes the linkage as the query-holding party.
    pub fn run_as_client(&mut self, input: &ClientInput) -> LinkResult<LinkageResult> {
        self.run_linkage("run_as_client", RunInputs::Client(input))
    }

    /// Executes the linkage as the database-holding party.
    pub fn run_as_server(&mut self, input: &ServerInput) -> LinkResult<LinkageResult> {
        self.run_linkage("run_as_server", RunInputs::Server(input))
    }

    /// Debug path: executes the linkage with both parties' inputs in one
    /// process.
    #[cfg(feature = "run-both")]
    pub fn run_as_both(
        &mut self,
        client: &ClientInput,
        server: &ServerInput,
    ) -> LinkResult<LinkageResult> {
        self.run_linkage("run_as_both", RunInputs::Both(client, server))
    }

    /// Executes the counting circuit as the query-holding party.
    pub fn count_as_client(&mut self, input: &ClientInput) -> LinkResult<CountResult> {
        self.run_count("count_as_client", RunInputs::Client(input))
    }

    /// Executes the counting circuit as the database-holding party.
    pub fn count_as_server(&mut self, input: &ServerInput) -> LinkResult<CountResult> {
        self.run_count("count_as_server", RunInputs::Server(input))
    }

    /// Debug path: executes the counting circuit with both parties' inputs.
    #[cfg(feature = "run-both")]
    pub fn count_as_both(
        &mut self,
        client: &ClientInput,
        server: &ServerInput,
    ) -> LinkResult<CountResult> {
        self.run_count("count_as_both", RunInputs::Both(client, server))
    }

    /// Releases all circuits and shares and returns to *Created*.
    ///
    /// Idempotent; the backend connection survives.
    pub fn reset(&mut self) {
        self.backend.reset();
        self.state = EngineState::Created;
    }

    fn div_circuit_path(&self) -> PathBuf {
        self.engine_cfg.circuit_data_dir.join(INT_DIV_CIRCUIT_FILE)
    }

    /// Checks state and kind, auto-running setup from *Built* with a
    /// warning. Returns the staged cardinality.
    fn prepare_run(&mut self, operation: &'static str, expected: CircuitKind) -> LinkResult<u32> {
        let (nvals, kind) = match self.state {
            EngineState::Built { nvals, kind } => {
                warn!(operation, "setup phase not run; running it implicitly");
                self.backend.setup()?;
                self.state = EngineState::SetupDone { nvals, kind };
                (nvals, kind)
            }
            EngineState::SetupDone { nvals, kind } => (nvals, kind),
            EngineState::Created => {
                return Err(LinkError::IllegalState {
                    operation,
                    state: self.state.name(),
                })
            }
        };
        if kind != expected {
            return Err(LinkError::IllegalState {
                operation,
                state: match kind {
                    CircuitKind::Linkage => "built for linkage",
                    CircuitKind::Count => "built for counting",
                },
            });
        }
        Ok(nvals)
    }

    fn run_linkage(
        &mut self,
        operation: &'static str,
        inputs: RunInputs<'_>,
    ) -> LinkResult<LinkageResult> {
        let nvals = self.prepare_run(operation, CircuitKind::Linkage)?;
        let div_circuit = self.div_circuit_path();
        let handles = {
            let mut builder = CircuitBuilder::new(
                &mut self.backend,
                self.link_cfg,
                div_circuit,
                self.engine_cfg.reveal_score,
                nvals,
            )?;
            Self::stage_inputs(&mut builder, inputs)?;
            builder.build_linkage()?
        };
        self.backend.execute()?;

        let index = self.single_output(handles.index)? as u32;
        let is_match = self.single_output(handles.is_match)? == 1;
        let is_tentative_match = self.single_output(handles.is_tentative)? == 1;
        let score = match handles.score {
            Some((num, den)) => Some(ScoreQuotient {
                numerator: self.single_output(num)?,
                denominator: self.single_output(den)?,
            }),
            None => None,
        };

        self.reset();
        Ok(LinkageResult {
            index,
            is_match,
            is_tentative_match,
            score,
        })
    }

    fn run_count(
        &mut self,
        operation: &'static str,
        inputs: RunInputs<'_>,
    ) -> LinkResult<CountResult> {
        let nvals = self.prepare_run(operation, CircuitKind::Count)?;
        let div_circuit = self.div_circuit_path();
        let handles = {
            let mut builder = CircuitBuilder::new(
                &mut self.backend,
                self.link_cfg,
                div_circuit,
                self.engine_cfg.reveal_score,
                nvals,
            )?;
            Self::stage_inputs(&mut builder, inputs)?;
            builder.build_count()?
        };
        self.backend.execute()?;

        let matches = self.single_output(handles.matches)? as u32;
        let tentative_matches = self.single_output(handles.tentative_matches)? as u32;

        self.reset();
        Ok(CountResult {
            matches,
            tentative_matches,
        })
    }

    fn stage_inputs(
        builder: &mut CircuitBuilder<'_, B>,
        inputs: RunInputs<'_>,
    ) -> LinkResult<()> {
        match inputs {
            RunInputs::Client(input) => builder.set_client_input(input),
            RunInputs::Server(input) => builder.set_server_input(input),
            #[cfg(feature = "run-both")]
            RunInputs::Both(client, server) => builder.set_both_inputs(client, server),
        }
    }

    fn single_output(&self, handle: crate::backend::OutputHandle) -> LinkResult<u64> {
        let values = self.backend.clear_values(handle)?;
        values
            .first()
            .copied()
            .ok_or_else(|| LinkError::Backend(BackendError::execution("empty output lane")))
    }
}
