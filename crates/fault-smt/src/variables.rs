//! The SSA variable table.
//!
//! Every user variable is a base name plus a monotonically increasing state
//! index; `base_N` names one SSA value. The table owns the index allocator,
//! the committed view reads resolve against, a stack of branch scopes for
//! conditional lowering, and the scoped temporary bindings created while
//! walking the IR.

use std::collections::HashMap;

use fault_ir::{Inst, Operand};
use indexmap::IndexMap;

use crate::rules::Rule;
use crate::sorts::Sort;

/// `base_N`.
pub fn ssa_name(base: &str, n: u32) -> String {
    format!("{base}_{n}")
}

/// Split `base_N` into its base and state index.
pub fn split_state(id: &str) -> Option<(&str, u32)> {
    let (base, tail) = id.rsplit_once('_')?;
    let n = tail.parse().ok()?;
    Some((base, n))
}

/// Identifiers starting with `%` are lowering temporaries.
pub fn is_temp(id: &str) -> bool {
    id.starts_with('%')
}

/// Strip the `@`/`%` sigil off an IR identifier.
pub fn format_ident(id: &str) -> &str {
    id.trim_start_matches(['@', '%'])
}

pub fn is_bool_literal(v: &str) -> bool {
    matches!(v, "true" | "false" | "True" | "False")
}

pub fn is_numeric(v: &str) -> bool {
    v.parse::<f64>().is_ok()
}

/// Render a float the way the SMT output expects: integral values keep a
/// trailing `.0`.
pub fn format_float(v: f64) -> String {
    if v.is_finite() && v == v.trunc() {
        format!("{v:.1}")
    } else {
        v.to_string()
    }
}

/// Render an operand as it appears inside a rule.
pub fn format_value(op: &Operand) -> String {
    match op {
        Operand::Var(v) => v.clone(),
        Operand::Float(x) => format_float(*x),
        Operand::Bool(b) => b.to_string(),
        Operand::StateTag(s) => s.clone(),
    }
}

/// What a scoped temporary resolves to: the pointer operand a `load` named,
/// or a whole deferred instruction (builtin calls and boolean chains whose
/// lowering is postponed to the join).
#[derive(Debug, Clone)]
pub enum Loaded {
    Ptr(Operand),
    Inst(Inst),
}

/// A provenance edge from one SSA state of a base to the next. The edges for
/// a base form a DAG whose join points are phi results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarChange {
    pub id: String,
    pub parent: Option<String>,
}

/// A restorable view of the table, taken around each parallel permutation.
#[derive(Debug, Clone)]
pub struct VarSnapshot {
    current: HashMap<String, u32>,
    scopes: Vec<HashMap<String, u32>>,
}

#[derive(Debug, Default)]
pub struct VarTable {
    /// Highest state index ever allocated per base. Never rewound.
    alloc: HashMap<String, u32>,
    /// Committed view: what a read resolves to outside any branch.
    current: HashMap<String, u32>,
    /// Branch scopes; writes inside a conditional land in the innermost one.
    scopes: Vec<HashMap<String, u32>>,
    /// Pre-branch / pre-permutation views for `start_state`.
    starts: Vec<HashMap<String, u32>>,
    types: HashMap<String, Sort>,
    /// Scoped temp → stored sub-rule.
    pub refs: HashMap<String, Rule>,
    /// Scoped temp → load target.
    pub loads: HashMap<String, Loaded>,
}

impl VarTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next unused state index for `base` and make it the
    /// current state in the innermost scope. Indices are never reused, not
    /// even across sibling branches of a fork.
    pub fn advance(&mut self, base: &str) -> u32 {
        let next = self.alloc.get(base).map_or(0, |n| n + 1);
        self.alloc.insert(base.to_string(), next);
        self.pin(base, next);
        next
    }

    /// Pin the visible state of `base` without allocating.
    pub fn pin(&mut self, base: &str, n: u32) {
        match self.scopes.last_mut() {
            Some(scope) => {
                scope.insert(base.to_string(), n);
            }
            None => {
                self.current.insert(base.to_string(), n);
            }
        }
    }

    /// The state index a read of `base` resolves to.
    pub fn current(&self, base: &str) -> u32 {
        for scope in self.scopes.iter().rev() {
            if let Some(n) = scope.get(base) {
                return *n;
            }
        }
        self.current.get(base).copied().unwrap_or(0)
    }

    /// The current SSA name of `base`.
    pub fn current_name(&self, base: &str) -> String {
        ssa_name(base, self.current(base))
    }

    /// Whether any state was ever allocated for `base`.
    pub fn tracked(&self, base: &str) -> bool {
        self.alloc.contains_key(base)
    }

    /// Iterate (base, highest allocated index).
    pub fn allocated(&self) -> impl Iterator<Item = (&str, u32)> {
        self.alloc.iter().map(|(b, n)| (b.as_str(), *n))
    }

    /// Open a branch scope: records the pre-branch view so the join can
    /// reconcile branch-local states, and diverts writes into the scope.
    pub fn new_phi_scope(&mut self) {
        self.starts.push(self.flatten_view());
        self.scopes.push(HashMap::new());
    }

    /// Close the innermost branch scope. The base's visible index becomes
    /// the max of the pre-branch view and any writes inside the branch.
    pub fn pop_phi_scope(&mut self) {
        let closed = self.scopes.pop().unwrap_or_default();
        self.starts.pop();
        for (base, n) in closed {
            let outer = match self.scopes.last_mut() {
                Some(scope) => scope.entry(base).or_insert(0),
                None => self.current.entry(base).or_insert(0),
            };
            if n > *outer {
                *outer = n;
            }
        }
    }

    /// Apply the phi outputs of a join to the visible view.
    pub fn append_state(&mut self, phis: &IndexMap<String, u32>) {
        for (base, n) in phis {
            if *n >= self.current(base) {
                self.pin(base, *n);
            }
        }
    }

    /// The state `base` had at the top of the innermost branch or
    /// permutation scope.
    pub fn start_state(&self, base: &str) -> u32 {
        self.starts
            .last()
            .and_then(|view| view.get(base).copied())
            .unwrap_or(0)
    }

    /// Snapshot the readable view before a parallel permutation. The
    /// allocator is deliberately not part of the snapshot.
    pub fn save_state(&mut self) -> VarSnapshot {
        self.starts.push(self.flatten_view());
        VarSnapshot {
            current: self.current.clone(),
            scopes: self.scopes.clone(),
        }
    }

    /// Restore a snapshot taken by [`Self::save_state`].
    pub fn load_state(&mut self, snap: VarSnapshot) {
        self.current = snap.current;
        self.scopes = snap.scopes;
        self.starts.pop();
    }

    fn flatten_view(&self) -> HashMap<String, u32> {
        let mut view = self.current.clone();
        for scope in &self.scopes {
            for (base, n) in scope {
                view.insert(base.clone(), *n);
            }
        }
        view
    }

    pub fn set_type(&mut self, base: &str, sort: Sort) {
        self.types.entry(base.to_string()).or_insert(sort);
    }

    /// The declared sort of `base`, defaulting to `Real`. State-indexed
    /// names fall back to their base's sort.
    pub fn lookup_type(&self, id: &str) -> Sort {
        if let Some(s) = self.types.get(id) {
            return *s;
        }
        if let Some((base, _)) = split_state(id) {
            if let Some(s) = self.types.get(base) {
                return *s;
            }
        }
        Sort::Real
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_advance_is_state_zero() {
        let mut vt = VarTable::new();
        assert_eq!(vt.advance("x"), 0);
        assert_eq!(vt.advance("x"), 1);
        assert_eq!(vt.current("x"), 1);
        assert_eq!(vt.current_name("x"), "x_1");
    }

    #[test]
    fn branch_writes_stay_scoped_until_pop() {
        let mut vt = VarTable::new();
        vt.advance("x"); // x_0
        vt.new_phi_scope();
        assert_eq!(vt.start_state("x"), 0);
        assert_eq!(vt.advance("x"), 1);
        assert_eq!(vt.current("x"), 1);
        vt.pop_phi_scope();
        // max of snapshot and branch writes
        assert_eq!(vt.current("x"), 1);
    }

    #[test]
    fn indices_are_never_reused_across_branches() {
        let mut vt = VarTable::new();
        vt.advance("x"); // x_0
        vt.new_phi_scope();
        assert_eq!(vt.advance("x"), 1); // true branch
        assert_eq!(vt.advance("x"), 2); // false branch
        vt.pop_phi_scope();
        assert_eq!(vt.current("x"), 2);
    }

    #[test]
    fn phi_outputs_apply_after_pop() {
        let mut vt = VarTable::new();
        vt.advance("x");
        vt.new_phi_scope();
        vt.advance("x");
        let mut phis = IndexMap::new();
        phis.insert("x".to_string(), vt.advance("x"));
        vt.pop_phi_scope();
        vt.append_state(&phis);
        assert_eq!(vt.current("x"), 2);
    }

    #[test]
    fn snapshots_restore_the_view_but_not_the_allocator() {
        let mut vt = VarTable::new();
        vt.advance("x"); // x_0
        let snap = vt.save_state();
        assert_eq!(vt.start_state("x"), 0);
        assert_eq!(vt.advance("x"), 1);
        vt.load_state(snap);
        assert_eq!(vt.current("x"), 0);
        // allocator keeps counting
        assert_eq!(vt.advance("x"), 2);
    }

    #[test]
    fn classification_helpers() {
        assert!(is_temp("%1"));
        assert!(!is_temp("@x"));
        assert_eq!(format_ident("@spec_x_value"), "spec_x_value");
        assert_eq!(format_ident("%3"), "3");
        assert!(is_bool_literal("true"));
        assert!(is_numeric("10.5"));
        assert!(!is_numeric("x_1"));
        assert_eq!(split_state("a_b_3"), Some(("a_b", 3)));
        assert_eq!(split_state("a"), None);
    }

    #[test]
    fn float_formatting_keeps_trailing_zero() {
        assert_eq!(format_float(10.0), "10.0");
        assert_eq!(format_float(2.25), "2.25");
        assert_eq!(format_float(-2.0), "-2.0");
    }

    #[test]
    fn types_default_to_real() {
        let mut vt = VarTable::new();
        assert_eq!(vt.lookup_type("x"), Sort::Real);
        vt.set_type("flag", Sort::Bool);
        assert_eq!(vt.lookup_type("flag"), Sort::Bool);
        assert_eq!(vt.lookup_type("flag_2"), Sort::Bool);
        // first classification wins
        vt.set_type("flag", Sort::Real);
        assert_eq!(vt.lookup_type("flag"), Sort::Bool);
    }
}
