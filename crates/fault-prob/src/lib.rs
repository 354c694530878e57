//! Probability routines for scoring solver-chosen states.
//!
//! The model checker asks the solver for *some* satisfying assignment; for
//! variables declared `uncertain(mu, sigma)` that assignment then has to be
//! scored against the declared prior. This crate provides the single
//! distribution needed for that pass.

pub mod normal;

pub use normal::{Normal, NormalError};
