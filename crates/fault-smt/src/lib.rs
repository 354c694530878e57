//! SSA lowering and SMT-LIB generation for Fault models.
//!
//! The generator walks the LLVM-shaped IR the frontend produced, threads every
//! variable write through a monotonically increasing SSA state index, and
//! emits QF_NRA formulas that encode all reachable states of the model.
//! Assertion statements from the AST are compiled over the recorded state
//! histories and appended as property assertions.

pub mod asserts;
pub mod forks;
pub mod lowering;
pub mod printer;
pub mod rounds;
pub mod rules;
pub mod sorts;
pub mod variables;

use miette::Diagnostic;
use thiserror::Error;

pub use lowering::Generator;
pub use sorts::Sort;

/// Errors raised while lowering a model or compiling its assertions.
///
/// Nothing here is retried: any error aborts the compilation with no partial
/// output.
#[derive(Debug, Error, Diagnostic)]
pub enum SmtError {
    #[error("illegal {kind} in assert or assume")]
    #[diagnostic(code(fault::smt::illegal_node))]
    IllegalAssertNode {
        kind: &'static str,
        #[label("this node")]
        span: miette::SourceSpan,
    },

    #[error("cannot mix temporal logic with when/then assertions")]
    #[diagnostic(code(fault::smt::mixed_temporal))]
    MixedTemporal {
        #[label("this assertion")]
        span: miette::SourceSpan,
    },

    #[error("assert variable base name `{base}` is invalid")]
    #[diagnostic(code(fault::smt::invalid_base))]
    InvalidBase { base: String },

    #[error("state {state} of variable {base} is missing from the round log")]
    #[diagnostic(code(fault::smt::missing_state))]
    MissingState { base: String, state: u32 },

    #[error("value for `{id}` not found in scope `{scope}`")]
    #[diagnostic(code(fault::smt::unbound_temp))]
    UnboundTemp { scope: String, id: String },

    #[error("unknown function `{0}` in call")]
    #[diagnostic(code(fault::smt::unknown_function))]
    UnknownFunction(String),

    #[error("recursive call to `{0}` is not supported")]
    #[diagnostic(code(fault::smt::recursive_call))]
    RecursiveCall(String),

    #[error("unknown block `{0}` in branch target")]
    #[diagnostic(code(fault::smt::unknown_block))]
    UnknownBlock(String),

    #[error("unrecognized terminal branch `{0}`")]
    #[diagnostic(code(fault::smt::unknown_branch))]
    UnknownBranch(String),

    #[error("modulo lowers poorly to SMT; `frem` is not supported")]
    #[diagnostic(code(fault::smt::rem_unsupported))]
    RemUnsupported,

    #[error("improper argument to builtin function `{callee}`")]
    #[diagnostic(code(fault::smt::bad_builtin_arg))]
    BadBuiltinArg { callee: String },

    #[error("`{callee}` called outside a statechart step function")]
    #[diagnostic(code(fault::smt::state_call))]
    StateCallOutsideChart { callee: String },

    #[error("invalid conditional expression")]
    #[diagnostic(code(fault::smt::invalid_cond))]
    InvalidCond,

    #[error("smt generation error: {0}")]
    #[diagnostic(code(fault::smt::internal))]
    Internal(String),
}

pub type SmtResult<T> = Result<T, SmtError>;
