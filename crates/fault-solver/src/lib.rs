//! External SMT solver driver and probabilistic result weighting.
//!
//! Takes the generated SMT-LIB text, runs the configured solver over stdio,
//! and parses the model into per-variable traces. If `uncertain` variables
//! are present, the traces are re-scored against their declared Normal
//! priors so the caller sees how plausible the solver's assignment was.

pub mod driver;
pub mod model;
pub mod scenario;

use thiserror::Error;

pub use driver::{ModelChecker, Solver, SOLVER_ARG_ENV, SOLVER_CMD_ENV};
pub use scenario::{BoolTrace, FloatTrace, IntTrace, Scenario};

/// Errors from solver configuration, the subprocess, or model parsing.
/// Nothing is retried.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("no solver is loaded, missing {0}")]
    MissingConfig(&'static str),

    #[error("failed to spawn solver `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("solver I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("solver exited with status {status}: {stderr}")]
    SolverExit { status: i32, stderr: String },

    #[error("unexpected solver output: {0}")]
    UnexpectedOutput(String),

    #[error("malformed model output: {0}")]
    ModelParse(String),

    #[error(transparent)]
    InvalidPrior(#[from] fault_prob::NormalError),
}

pub type SolverResult<T> = Result<T, SolverError>;
