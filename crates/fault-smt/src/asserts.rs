//! Compiling assert/assume statements into SMT property assertions.
//!
//! Both sides of an invariant reduce to [`StateGroup`]s over the SSA state
//! histories the round log recorded. Merging is round-aware: same-base sides
//! pair positionally, constants cross against the other side, terminal
//! variables pair along their shared round timeline, and everything else
//! takes the per-round cross product. A plain `assert` searches for a
//! counterexample, so its constraint is negated before lowering; `assume`
//! and temporal constraints are compiled as written.

use std::collections::BTreeMap;

use fault_ast::{
    AssertionStatement, Expr, FilterKind, InvariantClause, Temporal, TemporalFilter,
};

use crate::lowering::Generator;
use crate::printer::{write_assert, write_assertless_rule};
use crate::rules::{StateGroup, States};
use crate::variables::{split_state, ssa_name};
use crate::{SmtError, SmtResult};

impl Generator {
    /// Compile the raw assertion statements into property assertions.
    /// Multiple asserts are OR'd (violating any one is a counterexample);
    /// each assume stands alone.
    pub(crate) fn compile_asserts(&mut self) -> SmtResult<()> {
        let asserts_in = std::mem::take(&mut self.raw_asserts);
        let mut arule = Vec::new();
        for a in &asserts_in {
            arule.push(self.parse_assert_stmt(a)?);
        }
        self.raw_asserts = asserts_in;
        if arule.len() > 1 {
            let joined = arule.join(" ");
            self.asserts.push(write_assert("or", &joined));
        } else if let Some(single) = arule.pop() {
            self.asserts.push(write_assert("", &single));
        }

        let assumes_in = std::mem::take(&mut self.raw_assumes);
        for a in &assumes_in {
            let s = self.parse_assert_stmt(a)?;
            self.asserts.push(write_assert("", &s));
        }
        self.raw_assumes = assumes_in;
        Ok(())
    }

    pub(crate) fn parse_assert_stmt(&self, a: &AssertionStatement) -> SmtResult<String> {
        let state_range = a.constraint.operator == "then";
        if state_range && (a.temporal.is_some() || a.filter.is_some()) {
            return Err(SmtError::MixedTemporal {
                span: a.span.into(),
            });
        }

        // A plain assert searches for a violation, so it lowers the
        // negation of its constraint.
        let negated;
        let constraint = if !a.assume && !state_range && a.temporal.is_none() && a.filter.is_none()
        {
            negated = negate_clause(&a.constraint);
            &negated
        } else {
            &a.constraint
        };

        let left = self.parse_invariant_node(&constraint.left)?;
        let right = self.parse_invariant_node(&constraint.right)?;
        let op = smtlib_op(&constraint.operator);

        if state_range {
            // when X then Y: the then-side must hold at some state of the
            // when-side's state set.
            let sg = self.merge_invariant_infix(&left, &right, "or")?;
            return Ok(self.join_states(&sg, "and"));
        }

        let same_base = left.bases.symmetric_difference(&right.bases).count() == 0;
        if (a.temporal.is_some() || a.filter.is_some()) && same_base {
            let sg = self.merge_invariant_infix(&left, &right, &op)?;
            let ir = self.flatten_states(&sg);
            return Ok(apply_temporal(a.temporal, &ir, a.filter.is_some(), a.assume));
        }
        if let Some(filter) = a.filter {
            let ir = expand_assert_state_graph(
                &self.flatten_states(&left),
                &self.flatten_states(&right),
                &op,
                filter,
            );
            return Ok(apply_temporal(a.temporal, &ir, true, a.assume));
        }
        if a.temporal.is_some() {
            let sg = self.merge_invariant_infix(&left, &right, &op)?;
            let ir = self.flatten_states(&sg);
            return Ok(apply_temporal(a.temporal, &ir, false, a.assume));
        }

        if a.assume {
            if op == "and" {
                // (and (and ..) (and ..)) is redundant
                let sg = concat_groups(&left, &right);
                return Ok(self.join_states(&sg, "and"));
            }
            let sg = self.merge_invariant_infix(&left, &right, &op)?;
            return Ok(self.join_states(&sg, "and"));
        }

        if op == "or" {
            let sg = concat_groups(&left, &right);
            return Ok(self.join_states(&sg, "or"));
        }
        let sg = self.merge_invariant_infix(&left, &right, &op)?;
        Ok(self.join_states(&sg, "or"))
    }

    fn parse_invariant_node(&self, exp: &Expr) -> SmtResult<StateGroup> {
        match exp {
            Expr::Infix(e) => {
                let operator = smtlib_op(&e.operator);
                let left = self.parse_invariant_node(&e.left)?;
                let right = self.parse_invariant_node(&e.right)?;
                self.merge_invariant_infix(&left, &right, &operator)
            }
            Expr::Var(e) => {
                let mut wg = StateGroup::new();
                for v in &e.instances {
                    wg.bases.insert(v.clone());
                    let (state, constant) = capture_state(v);
                    let lookup_base = match state {
                        Some(_) => split_state(v)
                            .map(|(b, _)| b.to_string())
                            .unwrap_or_else(|| v.clone()),
                        None => v.clone(),
                    };
                    let vr = self.rounds.states_by_round(&lookup_base, state)?;
                    wg.add_wrap(States {
                        base: v.clone(),
                        states: vr,
                        constant,
                        terminal: true,
                    });
                }
                Ok(wg)
            }
            Expr::Int(e) => Ok(literal_group("__int", e.value.to_string())),
            Expr::Float(e) => Ok(literal_group("__float", e.value.to_string())),
            Expr::Bool(e) => Ok(literal_group("__bool", e.value.to_string())),
            Expr::Str(e) => Ok(literal_group("__string", e.value.clone())),
            Expr::Prefix(e) => {
                let operator = if e.operator == "!" {
                    "not".to_string()
                } else {
                    smtlib_op(&e.operator)
                };
                let right = self.parse_invariant_node(&e.right)?;
                Ok(self.merge_invariant_prefix(&right, &operator))
            }
            Expr::Index(e) => {
                let var = match e.left.as_ref() {
                    Expr::Var(v) => v,
                    other => {
                        return Err(SmtError::IllegalAssertNode {
                            kind: other.kind(),
                            span: other.span().into(),
                        })
                    }
                };
                let idx = match e.index.as_ref() {
                    Expr::Int(i) if i.value >= 0 => i.value as u32,
                    other => {
                        return Err(SmtError::IllegalAssertNode {
                            kind: other.kind(),
                            span: other.span().into(),
                        })
                    }
                };
                let mut wg = StateGroup::new();
                for v in &var.instances {
                    wg.bases.insert(v.clone());
                    let vr = self.rounds.states_by_round(v, Some(idx))?;
                    wg.add_wrap(States {
                        base: v.clone(),
                        states: vr,
                        constant: true,
                        terminal: false,
                    });
                }
                Ok(wg)
            }
            Expr::Nil(e) => Err(SmtError::IllegalAssertNode {
                kind: "nil",
                span: e.span.into(),
            }),
        }
    }

    fn merge_invariant_prefix(&self, right: &StateGroup, operator: &str) -> StateGroup {
        let mut sg = StateGroup::new();
        for r in &right.wraps {
            let mut states: BTreeMap<usize, Vec<String>> = BTreeMap::new();
            for i in 0..=self.run_rounds {
                if let Some(list) = r.states.get(&i) {
                    states.insert(
                        i,
                        list.iter().map(|s| format!("({operator} {s})")).collect(),
                    );
                }
            }
            let mut wrapped = r.clone();
            wrapped.states = states;
            sg.add_wrap(wrapped);
        }
        sg
    }

    fn merge_invariant_infix(
        &self,
        left: &StateGroup,
        right: &StateGroup,
        operator: &str,
    ) -> SmtResult<StateGroup> {
        let mut sg = StateGroup::new();
        for l in &left.wraps {
            for r in &right.wraps {
                sg.add_wrap(self.merge_by_round(l, r, operator)?);
            }
        }
        Ok(sg)
    }

    fn merge_by_round(&self, left: &States, right: &States, operator: &str) -> SmtResult<States> {
        let mut ret = States::default();
        let mut st: BTreeMap<usize, Vec<String>> = BTreeMap::new();

        if left.constant && right.constant {
            let combos = cartesian(&left.flattened(), &right.flattened());
            st.insert(0, package_state_graph(&combos, operator));
            ret.states = st;
            return Ok(ret);
        }

        if left.base == right.base && !left.base.is_empty() {
            // Pair states positionally, extending the shorter side by its
            // last value.
            ret.base = left.base.clone();
            let (long, short, left_lead) = if left.states.len() >= right.states.len() {
                (&left.states, &right.states, true)
            } else {
                (&right.states, &left.states, false)
            };
            let short_flat: Vec<String> = short.values().flatten().cloned().collect();
            let mut slast: Option<String> = short_flat.first().cloned();
            for i in 0..=self.run_rounds {
                let Some(states) = long.get(&i) else { continue };
                let mut pairs: Vec<Vec<String>> = Vec::new();
                for (idx, s) in states.iter().enumerate() {
                    let partner = match short.get(&i) {
                        Some(ss) if idx < ss.len() => {
                            slast = ss.last().cloned();
                            ss[idx].clone()
                        }
                        Some(ss) => {
                            slast = ss.last().cloned();
                            ss.last().cloned().unwrap_or_default()
                        }
                        None => slast.clone().unwrap_or_default(),
                    };
                    if partner.is_empty() {
                        continue;
                    }
                    pairs.push(merge_pair(s.clone(), partner, left_lead));
                }
                if !pairs.is_empty() {
                    st.insert(i, package_state_graph(&pairs, operator));
                }
            }
            ret.states = st;
            return Ok(ret);
        }

        if left.constant {
            ret.base = right.base.clone();
            ret.states = self.balance(right, left, operator);
            return Ok(ret);
        }
        if right.constant {
            ret.base = left.base.clone();
            ret.states = self.balance(left, right, operator);
            return Ok(ret);
        }

        if left.terminal && right.terminal {
            for (i, c) in self.term_combos(&left.base, &right.base) {
                if !c.is_empty() {
                    st.insert(i, package_state_graph(&c, operator));
                }
            }
            ret.states = st;
            return Ok(ret);
        }

        // General case: per-round cross product, carrying each side's last
        // states into rounds where it was not written.
        let mut llast: Option<Vec<String>> = None;
        let mut rlast: Option<Vec<String>> = None;
        for i in 0..=self.run_rounds {
            let l = match left.states.get(&i) {
                Some(v) => v.clone(),
                None => match &llast {
                    Some(v) => v.clone(),
                    None => {
                        if invalid_base(&left.base) {
                            return Err(SmtError::InvalidBase {
                                base: left.base.clone(),
                            });
                        }
                        vec![ssa_name(&left.base, 0)]
                    }
                },
            };
            let r = match right.states.get(&i) {
                Some(v) => v.clone(),
                None => match &rlast {
                    Some(v) => v.clone(),
                    None => {
                        if invalid_base(&right.base) {
                            return Err(SmtError::InvalidBase {
                                base: right.base.clone(),
                            });
                        }
                        vec![ssa_name(&right.base, 0)]
                    }
                },
            };
            let combos = cartesian(&l, &r);
            st.insert(i, package_state_graph(&combos, operator));
            llast = l.last().cloned().map(|s| vec![s]);
            rlast = r.last().cloned().map(|s| vec![s]);
        }
        ret.states = st;
        Ok(ret)
    }

    /// Pair two terminal variables along the shared round timeline: every
    /// write of either base pairs with the latest state of the other.
    fn term_combos(&self, lbase: &str, rbase: &str) -> BTreeMap<usize, Vec<Vec<String>>> {
        let mut llast: Option<String> = None;
        let mut rlast: Option<String> = None;
        let mut combos = BTreeMap::new();
        for (i, round) in self.rounds.rounds().iter().enumerate() {
            let mut c = Vec::new();
            for (base, state) in round {
                if base == lbase {
                    llast = Some(ssa_name(base, *state));
                    if let (Some(l), Some(r)) = (&llast, &rlast) {
                        c.push(vec![l.clone(), r.clone()]);
                    }
                }
                if base == rbase {
                    rlast = Some(ssa_name(base, *state));
                    if let (Some(l), Some(r)) = (&llast, &rlast) {
                        c.push(vec![l.clone(), r.clone()]);
                    }
                }
            }
            combos.insert(i, c);
        }
        combos
    }

    /// Cross a variable's per-round states with a constant side.
    fn balance(
        &self,
        vr: &States,
        con: &States,
        operator: &str,
    ) -> BTreeMap<usize, Vec<String>> {
        let con_states = con.flattened();
        let mut ret = BTreeMap::new();
        for i in 0..=self.run_rounds {
            if let Some(v) = vr.states.get(&i) {
                let combos = cartesian(v, &con_states);
                ret.insert(i, package_state_graph(&combos, operator));
            }
        }
        ret
    }

    fn flatten_states(&self, sg: &StateGroup) -> Vec<String> {
        let mut out = Vec::new();
        for w in &sg.wraps {
            for i in 0..=self.run_rounds {
                if let Some(list) = w.states.get(&i) {
                    out.extend(list.iter().cloned());
                }
            }
        }
        out
    }

    fn join_states(&self, sg: &StateGroup, operator: &str) -> String {
        let mut asserts = self.flatten_states(sg);
        match asserts.len() {
            1 => asserts.swap_remove(0),
            _ => write_assertless_rule(operator, &asserts.join(" "), ""),
        }
    }
}

fn concat_groups(left: &StateGroup, right: &StateGroup) -> StateGroup {
    let mut sg = StateGroup::new();
    sg.wraps.extend(left.wraps.iter().cloned());
    sg.wraps.extend(right.wraps.iter().cloned());
    sg
}

fn literal_group(base: &str, value: String) -> StateGroup {
    let mut states = BTreeMap::new();
    states.insert(0, vec![value]);
    let mut sg = StateGroup::new();
    sg.add_wrap(States {
        base: base.to_string(),
        states,
        constant: true,
        terminal: false,
    });
    sg
}

/// Apply the temporal modifier over the flattened per-state terms.
fn apply_temporal(
    temporal: Option<Temporal>,
    ir: &[String],
    has_filter: bool,
    assume: bool,
) -> String {
    if ir.is_empty() {
        return "true".to_string();
    }
    if ir.len() == 1 {
        return ir[0].clone();
    }
    match temporal {
        Some(Temporal::Eventually) => group(ir, if assume { "and" } else { "or" }),
        Some(Temporal::Always) => group(ir, if assume { "or" } else { "and" }),
        Some(Temporal::EventuallyAlways) => eventually_always(ir),
        None => {
            let op = if has_filter {
                "or"
            } else if assume {
                "and"
            } else {
                "or"
            };
            group(ir, op)
        }
    }
}

fn group(ir: &[String], op: &str) -> String {
    format!("({op} {})", ir.join(" "))
}

/// For each suffix `ir[i..]`, the property holds from there on; one suffix
/// must exist.
fn eventually_always(ir: &[String]) -> String {
    let progression: Vec<String> = (0..ir.len())
        .map(|i| format!("(and {})", ir[i..].join(" ")))
        .collect();
    format!("(or {})", progression.join(" "))
}

/// Expand a counting filter over the cross product of both sides' states.
fn expand_assert_state_graph(
    list1: &[String],
    list2: &[String],
    op: &str,
    filter: TemporalFilter,
) -> Vec<String> {
    let c = cartesian(list1, list2);
    let mut x: Vec<Vec<String>> = Vec::new();
    match filter.kind {
        FilterKind::NoMoreThan => {
            // (and (or on ...) (and off ...)): any of the chosen states may
            // be on, every other state must be off.
            for on_set in combinations(&c, filter.n) {
                let off_set = not_in_set(&on_set, &c);
                let o: Vec<String> = on_set
                    .iter()
                    .map(|p| format!("({op} {} {})", p[0], p[1]))
                    .collect();
                let on_str = if o.len() == 1 {
                    o[0].clone()
                } else {
                    format!("(or {})", o.join(" "))
                };
                if off_set.is_empty() {
                    x.push(vec![on_str]);
                    continue;
                }
                let f: Vec<String> = off_set
                    .iter()
                    .map(|p| negated_clause(op, &p[0], &p[1]))
                    .collect();
                let off_str = if f.len() == 1 {
                    f[0].clone()
                } else {
                    format!("(and {})", f.join(" "))
                };
                x.push(vec![on_str, off_str]);
            }
            package_state_graph(&x, "and")
        }
        FilterKind::NoFewerThan => {
            // (or (and on ...)): every state of some chosen subset is on.
            for on_set in combinations(&c, filter.n) {
                let o: Vec<String> = on_set
                    .iter()
                    .map(|p| format!("({op} {} {})", p[0], p[1]))
                    .collect();
                let on_str = if o.len() == 1 {
                    o[0].clone()
                } else {
                    format!("(and {})", o.join(" "))
                };
                x.push(vec![on_str]);
            }
            package_state_graph(&x, "or")
        }
    }
}

fn package_state_graph(x: &[Vec<String>], op: &str) -> Vec<String> {
    x.iter()
        .map(|a| {
            if a.len() == 1 {
                a[0].clone()
            } else if op == "not" && a[0] == "false" {
                format!("(not {})", a[1])
            } else if op == "not" && a[1] == "false" {
                format!("(not {})", a[0])
            } else if op == "not" {
                format!("(not (= {} {}))", a[0], a[1])
            } else {
                format!("({op} {} {})", a[0], a[1])
            }
        })
        .collect()
}

fn merge_pair(l: String, r: String, left_lead: bool) -> Vec<String> {
    if left_lead {
        vec![l, r]
    } else {
        vec![r, l]
    }
}

fn cartesian(a: &[String], b: &[String]) -> Vec<Vec<String>> {
    let mut out = Vec::with_capacity(a.len() * b.len());
    for l in a {
        for r in b {
            out.push(vec![l.clone(), r.clone()]);
        }
    }
    out
}

/// All n-element subsets of `items`, in index order.
fn combinations<T: Clone>(items: &[T], n: usize) -> Vec<Vec<T>> {
    if n == 0 || n > items.len() {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut idx: Vec<usize> = (0..n).collect();
    loop {
        out.push(idx.iter().map(|&i| items[i].clone()).collect());
        let mut i = n;
        loop {
            if i == 0 {
                return out;
            }
            i -= 1;
            if idx[i] != i + items.len() - n {
                idx[i] += 1;
                for j in i + 1..n {
                    idx[j] = idx[j - 1] + 1;
                }
                break;
            }
        }
    }
}

fn not_in_set(subset: &[Vec<String>], all: &[Vec<String>]) -> Vec<Vec<String>> {
    all.iter()
        .filter(|p| !subset.contains(p))
        .cloned()
        .collect()
}

/// The logical complement used for the off-clauses of `nmt`.
fn negated_clause(op: &str, a: &str, b: &str) -> String {
    match op {
        "=" => format!("(not (= {a} {b}))"),
        "<" => format!("(>= {a} {b})"),
        "<=" => format!("(> {a} {b})"),
        ">" => format!("(<= {a} {b})"),
        ">=" => format!("(< {a} {b})"),
        "not" => format!("(= {a} {b})"),
        other => format!("(not ({other} {a} {b}))"),
    }
}

fn smtlib_op(op: &str) -> String {
    match op {
        "==" => "=",
        // != is not valid in SMT-LIB; it renders as a negated equality
        "!=" => "not",
        "||" => "or",
        "&&" => "and",
        other => other,
    }
    .to_string()
}

/// Classify an instance name: an embedded trailing state index pins the
/// reference to one state; short names read as constants.
fn capture_state(id: &str) -> (Option<u32>, bool) {
    let parts: Vec<&str> = id.split('_').collect();
    let constant = parts.len() <= 2;
    match parts.last().and_then(|p| p.parse::<u32>().ok()) {
        Some(n) => (Some(n), false),
        None => (None, constant),
    }
}

fn invalid_base(base: &str) -> bool {
    matches!(base, "__string" | "__bool" | "__float" | "__int" | "")
}

fn negate_op(op: &str) -> Option<&'static str> {
    Some(match op {
        "&&" => "||",
        "||" => "&&",
        ">" => "<=",
        ">=" => "<",
        "<" => ">=",
        "<=" => ">",
        "==" => "!=",
        "!=" => "==",
        _ => return None,
    })
}

fn negate_expr(e: &Expr) -> Expr {
    match e {
        Expr::Infix(i) => match negate_op(&i.operator) {
            Some(n) if n == "&&" || n == "||" => Expr::Infix(fault_ast::InfixExpr {
                left: Box::new(negate_expr(&i.left)),
                operator: n.to_string(),
                right: Box::new(negate_expr(&i.right)),
                span: i.span,
            }),
            Some(n) => Expr::Infix(fault_ast::InfixExpr {
                left: i.left.clone(),
                operator: n.to_string(),
                right: i.right.clone(),
                span: i.span,
            }),
            None => e.clone(),
        },
        Expr::Prefix(p) if p.operator == "!" => (*p.right).clone(),
        _ => e.clone(),
    }
}

/// De Morgan over the constraint: the negation of `a && b` is `!a || !b`;
/// comparisons flip to their complements.
fn negate_clause(c: &InvariantClause) -> InvariantClause {
    match negate_op(&c.operator) {
        Some(n) if n == "&&" || n == "||" => InvariantClause {
            left: negate_expr(&c.left),
            operator: n.to_string(),
            right: negate_expr(&c.right),
            span: c.span,
        },
        Some(n) => InvariantClause {
            left: c.left.clone(),
            operator: n.to_string(),
            right: c.right.clone(),
            span: c.span,
        },
        None => c.clone(),
    }
}
