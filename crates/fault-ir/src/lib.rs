//! LLVM-shaped intermediate representation consumed by the SMT generator.
//!
//! The Fault frontend compiles a spec into this function-structured IR; the
//! generator walks it and emits SMT rules. Only the instruction subset the
//! generator understands is represented. Call metadata (run-round markers and
//! parallel grouping) is carried as typed fields, not free-form tags.

pub mod module;

pub use module::{
    Block, CallMeta, Constant, Func, Global, Inst, Module, Operand, Pred, Terminator,
    PARALLEL_GROUP_VAR, ROUND_COUNTER_VAR, RUN_FUNC,
};
