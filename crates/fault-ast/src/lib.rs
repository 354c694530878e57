//! AST node types for Fault assertion and invariant statements.
//!
//! The frontend parses Fault source and hands these nodes to the SMT
//! generator; this crate only defines the shape of that boundary. Every node
//! carries a [`Span`] so lowering errors can point back into the source.

pub mod ast;

pub use ast::{
    AssertVar, AssertionStatement, BoolLit, Expr, FilterKind, FloatLit, IndexExpr, InfixExpr,
    IntegerLit, InvariantClause, NilLit, PrefixExpr, Span, StringLit, Temporal, TemporalFilter,
};
