//! The structural rule tree the lowering emits.
//!
//! Rules stay structural until the printer renders them, so tests can diff
//! trees instead of strings. The assertion compiler works over [`States`] and
//! [`StateGroup`] instead: those carry already-rendered per-round SMT terms
//! keyed by the round they were recorded in.

use std::collections::{BTreeMap, BTreeSet};

use crate::sorts::Sort;

/// Binary and unary operators that appear inside rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// A store: rendered as a declaration plus an equality assertion.
    Store,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Not,
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Op::Store | Op::Eq => "=",
            Op::Ne => "!=",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::And => "and",
            Op::Or => "or",
            Op::Not => "not",
        };
        write!(f, "{s}")
    }
}

/// One rule in the emitted tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Wrap(Wrap),
    Infix(Infix),
    Ite(Ite),
    Phi(Phi),
    Ands(Ands),
    Choices(Choices),
    WrapGroup(WrapGroup),
}

impl Rule {
    pub fn ident(value: impl Into<String>) -> Self {
        Rule::Wrap(Wrap {
            value: value.into(),
        })
    }

    pub fn infix(x: Rule, op: Op, y: Rule, ty: Option<Sort>) -> Self {
        Rule::Infix(Infix {
            x: Box::new(x),
            y: Box::new(y),
            op,
            ty,
        })
    }
}

/// A leaf: an identifier or a literal, rendered verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct Wrap {
    pub value: String,
}

/// A binary operation at any level of the tree. A `Store`/`Eq` infix at the
/// top level renders as a declaration plus an equality assertion.
#[derive(Debug, Clone, PartialEq)]
pub struct Infix {
    pub x: Box<Rule>,
    pub y: Box<Rule>,
    pub op: Op,
    pub ty: Option<Sort>,
}

/// An if-then-else over the phi-capping equalities of a conditional. The
/// branch bodies themselves are emitted unconditionally; only the join
/// equalities live here.
#[derive(Debug, Clone, PartialEq)]
pub struct Ite {
    pub cond: Box<Rule>,
    pub then_rules: Vec<Rule>,
    pub else_rules: Vec<Rule>,
}

/// Declares `end_state` equal to one of the contributing branch states of
/// `base`.
#[derive(Debug, Clone, PartialEq)]
pub struct Phi {
    pub base: String,
    pub end_state: String,
    pub states: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Ands {
    pub rules: Vec<Rule>,
}

/// An n-ary grouping of branch conjunctions, joined by `op`.
#[derive(Debug, Clone, PartialEq)]
pub struct Choices {
    pub branches: Vec<Ands>,
    pub op: Op,
}

/// A list of terminal leaves.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WrapGroup {
    pub wraps: Vec<Wrap>,
}

/// The per-round state history of one side of an invariant: round index →
/// rendered SMT terms.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct States {
    pub base: String,
    pub states: BTreeMap<usize, Vec<String>>,
    pub constant: bool,
    pub terminal: bool,
}

impl States {
    /// All rendered terms across rounds, in round order.
    pub fn flattened(&self) -> Vec<String> {
        self.states.values().flatten().cloned().collect()
    }
}

/// An ordered list of [`States`] sharing a semantic role (one side of an
/// invariant).
#[derive(Debug, Clone, Default)]
pub struct StateGroup {
    pub wraps: Vec<States>,
    pub bases: BTreeSet<String>,
}

impl StateGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_wrap(&mut self, states: States) {
        self.wraps.push(states);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_renders_smtlib_form() {
        assert_eq!(Op::Store.to_string(), "=");
        assert_eq!(Op::Le.to_string(), "<=");
        assert_eq!(Op::And.to_string(), "and");
    }

    #[test]
    fn states_flatten_in_round_order() {
        let mut st = States::default();
        st.states.insert(2, vec!["c".into()]);
        st.states.insert(0, vec!["a".into(), "b".into()]);
        assert_eq!(st.flattened(), vec!["a", "b", "c"]);
    }

    #[test]
    fn rule_builders() {
        let r = Rule::infix(Rule::ident("x_0"), Op::Gt, Rule::ident("0"), None);
        match r {
            Rule::Infix(i) => {
                assert_eq!(*i.x, Rule::ident("x_0"));
                assert_eq!(i.op, Op::Gt);
            }
            _ => panic!("expected infix"),
        }
    }
}
