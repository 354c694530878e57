//! The IR walk that turns a compiled Fault model into a rule tree.
//!
//! The [`Generator`] is the explicit lowering context: it owns the SSA
//! variable table, the round log, the fork stack, and the phi/return flags,
//! and threads them through the walk. Branch bodies are emitted
//! unconditionally; conditionals only gate the phi-capping equalities at
//! their join (see `branches`).

mod branches;
mod builtins;
mod parallel;

use std::collections::{HashMap, HashSet};

use fault_ast::AssertionStatement;
use fault_ir::{
    Block, Constant, Func, Global, Inst, Module, Operand, Pred, Terminator, PARALLEL_GROUP_VAR,
    ROUND_COUNTER_VAR, RUN_FUNC,
};
use indexmap::IndexMap;
use tracing::debug;

use crate::forks::{Fork, PhiState};
use crate::rounds::RoundLog;
use crate::rules::{Infix, Op, Rule};
use crate::sorts::Sort;
use crate::variables::{
    format_ident, format_value, is_bool_literal, is_numeric, is_temp, split_state, ssa_name,
    Loaded, VarChange, VarTable,
};
use crate::{SmtError, SmtResult};

pub(crate) use builtins::{is_builtin, StateChange};

/// The lowering context and accumulated SMT program.
///
/// One generator lowers one model: `load_meta` feeds it the frontend's
/// metadata, `generate` walks the IR and compiles assertions, and `smt`
/// assembles the final text.
pub struct Generator {
    pub(crate) current_function: String,

    uncertains: HashMap<String, (f64, f64)>,
    unknowns: Vec<String>,
    pub(crate) raw_asserts: Vec<AssertionStatement>,
    pub(crate) raw_assumes: Vec<AssertionStatement>,
    pub(crate) raw_rules: Vec<Vec<Rule>>,

    pub(crate) inits: Vec<String>,
    pub(crate) declared: HashSet<String>,
    pub(crate) constants: Vec<String>,
    pub(crate) rules: Vec<String>,
    pub(crate) asserts: Vec<String>,

    pub(crate) vars: VarTable,
    functions: HashMap<String, Func>,
    pub(crate) local_callstack: Vec<String>,

    pub(crate) forks: Vec<Fork>,
    pub(crate) stored_choice: IndexMap<String, StateChange>,
    pub(crate) phi_state: PhiState,
    pub(crate) parallel_grouping: Option<String>,
    pub(crate) parallel_run_start: bool,
    return_void: PhiState,

    pub(crate) run_rounds: usize,
    pub(crate) rounds: RoundLog,
    results: HashMap<String, Vec<VarChange>>,
}

impl Default for Generator {
    fn default() -> Self {
        Self::new()
    }
}

impl Generator {
    pub fn new() -> Self {
        Self {
            current_function: RUN_FUNC.to_string(),
            uncertains: HashMap::new(),
            unknowns: Vec::new(),
            raw_asserts: Vec::new(),
            raw_assumes: Vec::new(),
            raw_rules: Vec::new(),
            inits: Vec::new(),
            declared: HashSet::new(),
            constants: Vec::new(),
            rules: Vec::new(),
            asserts: Vec::new(),
            vars: VarTable::new(),
            functions: HashMap::new(),
            local_callstack: Vec::new(),
            forks: Vec::new(),
            stored_choice: IndexMap::new(),
            phi_state: PhiState::new(),
            parallel_grouping: None,
            parallel_run_start: false,
            return_void: PhiState::new(),
            run_rounds: 1,
            rounds: RoundLog::new(),
            results: HashMap::new(),
        }
    }

    /// Load the frontend's metadata: the run count, the solver-chosen
    /// variables, and the raw assertion statements.
    pub fn load_meta(
        &mut self,
        runs: u16,
        uncertains: HashMap<String, (f64, f64)>,
        unknowns: Vec<String>,
        asserts: Vec<AssertionStatement>,
        assumes: Vec<AssertionStatement>,
    ) {
        // Even a model with zero runs needs asserts over initialization.
        self.run_rounds = if runs == 0 { 1 } else { runs as usize };
        self.uncertains = uncertains;
        self.unknowns = unknowns;
        self.raw_asserts = asserts;
        self.raw_assumes = assumes;
    }

    /// Lower the module and compile its assertions. After this, [`Self::smt`]
    /// returns the full program text.
    pub fn generate(&mut self, module: &Module) -> SmtResult<()> {
        debug!(
            globals = module.globals.len(),
            funcs = module.funcs.len(),
            "lowering module"
        );
        self.new_constants(&module.globals);
        self.sort_funcs(&module.funcs);
        let run = self.parse_run_block(&module.funcs)?;
        self.raw_rules.push(run);
        let rendered = self.render_rules()?;
        self.rules.extend(rendered);
        self.compile_asserts()?;
        Ok(())
    }

    pub fn forks(&self) -> &[Fork] {
        &self.forks
    }

    pub fn rounds(&self) -> &RoundLog {
        &self.rounds
    }

    pub fn variables(&self) -> &VarTable {
        &self.vars
    }

    /// Provenance edges per base, for downstream consumers of the model.
    pub fn var_changes(&self) -> &HashMap<String, Vec<VarChange>> {
        &self.results
    }

    pub fn uncertains(&self) -> &HashMap<String, (f64, f64)> {
        &self.uncertains
    }

    pub fn unknowns(&self) -> &[String] {
        &self.unknowns
    }

    pub(crate) fn scoped(&self, id: &str) -> String {
        format!("{}-{}", self.current_function, id)
    }

    // Constants don't increment in SSA: they lower straight to round-0
    // states.
    fn new_constants(&mut self, globals: &[Global]) {
        for g in globals {
            let id = format_ident(&g.name).to_string();
            if let Some(line) = self.constant_rule(&id, &g.init) {
                self.constants.push(line);
            }
        }
    }

    fn constant_rule(&mut self, id: &str, c: &Constant) -> Option<String> {
        match c {
            Constant::Float(x) => {
                self.vars.set_type(id, Sort::Real);
                self.rounds.record(id, 0);
                let n = self.vars.advance(id);
                let sid = ssa_name(id, n);
                if self.is_solvable(id) {
                    self.declare_var(&sid, Sort::Real);
                    None
                } else {
                    Some(self.write_init_rule(&sid, Sort::Real, &crate::variables::format_float(*x)))
                }
            }
            Constant::Bool(b) => {
                self.vars.set_type(id, Sort::Bool);
                self.rounds.record(id, 0);
                let n = self.vars.advance(id);
                let sid = ssa_name(id, n);
                if self.is_solvable(id) {
                    self.declare_var(&sid, Sort::Bool);
                    None
                } else {
                    Some(self.write_init_rule(&sid, Sort::Bool, if *b { "true" } else { "false" }))
                }
            }
        }
    }

    fn sort_funcs(&mut self, funcs: &[Func]) {
        for f in funcs {
            if f.name != RUN_FUNC {
                self.functions.insert(f.name.clone(), f.clone());
            }
        }
    }

    pub(crate) fn function(&self, name: &str) -> SmtResult<Func> {
        self.functions
            .get(name)
            .cloned()
            .ok_or_else(|| SmtError::UnknownFunction(name.to_string()))
    }

    fn parse_run_block(&mut self, funcs: &[Func]) -> SmtResult<Vec<Rule>> {
        for f in funcs {
            if f.name == RUN_FUNC {
                return self.parse_function(f);
            }
        }
        Ok(Vec::new())
    }

    pub(crate) fn parse_function(&mut self, f: &Func) -> SmtResult<Vec<Rule>> {
        let mut ru = Vec::new();
        if is_builtin(&f.name) {
            return Ok(ru);
        }
        let old = std::mem::replace(&mut self.current_function, f.name.clone());
        for block in &f.blocks {
            if !self.return_void.check() {
                ru.extend(self.parse_block(f, block)?);
            }
        }
        self.return_void.exit();
        self.current_function = old;
        Ok(ru)
    }

    pub(crate) fn parse_block(&mut self, f: &Func, block: &Block) -> SmtResult<Vec<Rule>> {
        let mut ru = self.parse_insts(block)?;

        let stored: Vec<(String, StateChange)> = self.stored_choice.drain(..).collect();
        for (_, sc) in stored {
            ru.push(self.state_rules(&sc)?);
        }

        ru.extend(self.execute_callstack()?);

        match &block.term {
            Terminator::CondBr { cond, succs } => {
                let r2 = self.parse_term_con(f, cond, succs)?;
                ru.extend(r2);
            }
            Terminator::Ret => self.return_void.enter(),
            Terminator::Br { .. } => {}
        }
        Ok(ru)
    }

    fn parse_insts(&mut self, block: &Block) -> SmtResult<Vec<Rule>> {
        let mut ru = Vec::new();
        for inst in &block.insts {
            match inst {
                Inst::Alloca { .. } | Inst::Bitcast { .. } => {}
                Inst::Load { dst, src } => {
                    let key = self.scoped(dst);
                    self.vars.loads.insert(key, Loaded::Ptr(src.clone()));
                }
                Inst::Store { dst, src } => {
                    if dst == ROUND_COUNTER_VAR {
                        // Flush the pending calls, close out the round's
                        // rules, and open the next round.
                        ru.extend(self.execute_callstack()?);
                        let batch = std::mem::take(&mut ru);
                        self.raw_rules.push(batch);
                        self.rounds.new_round();
                        continue;
                    }
                    if dst == PARALLEL_GROUP_VAR {
                        continue;
                    }
                    if let Operand::StateTag(_) = src {
                        let key = self.scoped(dst);
                        self.vars.loads.insert(key, Loaded::Ptr(src.clone()));
                        continue;
                    }
                    ru.extend(self.store_rule(dst, src)?);
                }
                Inst::FAdd { dst, x, y } => self.bind_infix(dst, x, y, Op::Add),
                Inst::FSub { dst, x, y } => self.bind_infix(dst, x, y, Op::Sub),
                Inst::FMul { dst, x, y } => self.bind_infix(dst, x, y, Op::Mul),
                Inst::FDiv { dst, x, y } => self.bind_infix(dst, x, y, Op::Div),
                Inst::FRem { .. } => return Err(SmtError::RemUnsupported),
                Inst::FCmp { dst, pred, x, y } | Inst::ICmp { dst, pred, x, y } => {
                    let r = self.compare_rule(pred, x, y);
                    if is_temp(dst) {
                        let key = self.scoped(dst);
                        self.vars.refs.insert(key, r);
                    } else {
                        ru.push(r);
                    }
                }
                Inst::Call {
                    dst,
                    callee,
                    args,
                    meta,
                } => {
                    if is_builtin(callee) {
                        if !meta.is_empty() {
                            // Part of a boolean transition chain; defer to
                            // the chain's join.
                            if let Some(d) = dst {
                                let key = self.scoped(d);
                                let mut stripped = inst.clone();
                                if let Inst::Call { meta, .. } = &mut stripped {
                                    *meta = fault_ir::CallMeta::default();
                                }
                                self.vars.loads.insert(key, Loaded::Inst(stripped));
                            }
                        } else {
                            ru.extend(self.parse_builtin(callee, args, false)?);
                        }
                        continue;
                    }
                    if self.is_same_parallel_group(meta) {
                        self.local_callstack.push(callee.clone());
                    } else if self.single_parallel_step(callee) {
                        // A self-loop on the last callee is a single step.
                        ru.extend(self.execute_callstack()?);
                        ru.extend(self.generate_from_callstack(vec![callee.clone()])?);
                    } else {
                        ru.extend(self.execute_callstack()?);
                        self.local_callstack.push(callee.clone());
                    }
                    self.update_parallel_group(meta);
                    self.return_void.exit();
                }
                Inst::Xor { dst, x } => {
                    let r = self.not_rule(x);
                    self.bind_temp(dst, r);
                }
                Inst::And { dst, x, y } => {
                    if self.is_state_change_chain(x, y) {
                        let mut sc = StateChange::default();
                        self.parse_choice(inst, &mut sc)?;
                        let key = self.scoped(dst);
                        self.vars.loads.insert(key.clone(), Loaded::Inst(inst.clone()));
                        self.stored_choice.insert(key, sc);
                    } else {
                        let r = self.bool_infix(x, y, Op::And);
                        self.bind_temp(dst, r);
                    }
                }
                Inst::Or { dst, x, y } => {
                    if self.is_state_change_chain(x, y) {
                        let mut sc = StateChange::default();
                        self.parse_choice(inst, &mut sc)?;
                        let key = self.scoped(dst);
                        self.vars.loads.insert(key.clone(), Loaded::Inst(inst.clone()));
                        self.stored_choice.insert(key, sc);
                    } else {
                        let r = self.bool_infix(x, y, Op::Or);
                        self.bind_temp(dst, r);
                    }
                }
            }
        }
        Ok(ru)
    }

    /// Allocate the next state of `base` and log it in the current round.
    /// Returns the previous index and the new one.
    pub(crate) fn next_state(&mut self, base: &str) -> (u32, u32) {
        let prev = self.vars.current(base);
        let n = self.vars.advance(base);
        self.rounds.record(base, n);
        (prev, n)
    }

    pub(crate) fn add_var_change(&mut self, base: &str, id: &str, parent: &str) {
        let parent = if id == parent {
            None
        } else {
            Some(parent.to_string())
        };
        self.results.entry(base.to_string()).or_default().push(VarChange {
            id: id.to_string(),
            parent,
        });
    }

    pub(crate) fn var_change_phi(&mut self, base: &str, end: &str, nums: &[u32]) {
        for n in nums {
            let start = ssa_name(base, *n);
            self.add_var_change(base, end, &start);
        }
    }

    /// A base whose value the solver chooses rather than the program.
    pub(crate) fn is_solvable(&self, id: &str) -> bool {
        let base = split_state(id).map_or(id, |(b, _)| b);
        self.unknowns.iter().any(|u| u == base) || self.uncertains.contains_key(base)
    }

    fn bind_temp(&mut self, dst: &str, r: Rule) {
        if is_temp(dst) {
            let key = self.scoped(dst);
            self.vars.refs.insert(key, r);
        }
    }

    fn bind_infix(&mut self, dst: &str, x: &Operand, y: &Operand, op: Op) {
        let xs = self.convert_infix_operand(x);
        let ys = self.convert_infix_operand(y);
        let r = Rule::infix(Rule::ident(xs), op, Rule::ident(ys), None);
        self.bind_temp(dst, r);
    }

    /// Resolve an infix operand to the term that names it: literals render
    /// directly, loaded temps resolve to the current SSA state of their
    /// source (or the pre-permutation state at the start of a parallel run).
    fn convert_infix_operand(&mut self, op: &Operand) -> String {
        match op {
            Operand::Float(v) => crate::variables::format_float(*v),
            Operand::Bool(b) => b.to_string(),
            Operand::StateTag(s) => s.clone(),
            Operand::Var(x) => {
                if is_temp(x) {
                    let key = self.scoped(x);
                    if let Some(Loaded::Ptr(v)) = self.vars.loads.get(&key) {
                        let base = format_ident(&format_value(v)).to_string();
                        if self.parallel_run_start {
                            let n = self.vars.start_state(&base);
                            self.parallel_run_start = false;
                            return ssa_name(&base, n);
                        }
                        return self.vars.current_name(&base);
                    }
                }
                x.clone()
            }
        }
    }

    fn compare_rule(&mut self, pred: &Pred, x: &Operand, y: &Operand) -> Rule {
        let xs = self.convert_infix_operand(x);
        match pred {
            Pred::True => Rule::infix(Rule::ident(xs), Op::Eq, Rule::ident("true"), None),
            Pred::False => Rule::infix(Rule::ident(xs), Op::Eq, Rule::ident("false"), None),
            other => {
                let ys = self.convert_infix_operand(y);
                let op = match other {
                    Pred::Eq => Op::Eq,
                    Pred::Ne => Op::Ne,
                    Pred::Gt => Op::Gt,
                    Pred::Ge => Op::Ge,
                    Pred::Lt => Op::Lt,
                    Pred::Le => Op::Le,
                    Pred::True | Pred::False => Op::Eq,
                };
                Rule::infix(Rule::ident(xs), op, Rule::ident(ys), None)
            }
        }
    }

    /// One boolean operand of an and/or/xor: a stored comparison sub-rule,
    /// a loaded variable's current state, or a literal identifier.
    fn bool_part(&mut self, x: &Operand) -> Rule {
        if let Some(id) = x.ident() {
            if is_temp(id) {
                let key = self.scoped(id);
                if let Some(r) = self.vars.refs.get(&key) {
                    return r.clone();
                }
                if let Some(Loaded::Ptr(v)) = self.vars.loads.get(&key) {
                    let base = format_ident(&format_value(v)).to_string();
                    return Rule::ident(self.vars.current_name(&base));
                }
            }
            return Rule::ident(format_ident(id).to_string());
        }
        Rule::ident(format_value(x))
    }

    fn not_rule(&mut self, x: &Operand) -> Rule {
        let xr = self.bool_part(x);
        Rule::infix(xr, Op::Not, Rule::ident(""), Some(Sort::Bool))
    }

    fn bool_infix(&mut self, x: &Operand, y: &Operand, op: Op) -> Rule {
        let xr = self.bool_part(x);
        let yr = self.bool_part(y);
        Rule::infix(xr, op, yr, Some(Sort::Bool))
    }

    pub(crate) fn store_rule(&mut self, dst: &str, src: &Operand) -> SmtResult<Vec<Rule>> {
        let mut ru = Vec::new();
        let base = format_ident(dst).to_string();
        let src_temp = src
            .ident()
            .filter(|s| is_temp(s))
            .map(str::to_string);

        if let Some(src_id) = src_temp {
            let key = self.scoped(&src_id);
            if let Some(Loaded::Ptr(val)) = self.vars.loads.get(&key).cloned() {
                let mut v = format_value(&val);
                let ty = if is_bool_literal(&v) {
                    Sort::Bool
                } else {
                    Sort::Real
                };
                self.vars.set_type(&base, ty);
                let (prev, n) = self.next_state(&base);
                let id = ssa_name(&base, n);
                if !is_bool_literal(&v) && !is_numeric(&v) {
                    v = ssa_name(format_ident(&v), prev);
                }
                self.add_var_change(&base, &id, &ssa_name(&base, prev));
                ru.push(Rule::infix(
                    Rule::ident(id),
                    Op::Store,
                    Rule::ident(v),
                    Some(ty),
                ));
            } else if let Some(r) = self.vars.refs.get(&key).cloned() {
                match r {
                    Rule::Infix(infix) => {
                        let x = self.temp_to_ident(*infix.x)?;
                        let y = self.temp_to_ident(*infix.y)?;
                        let ty = match &y {
                            Rule::Wrap(w) if is_bool_literal(&w.value) => Sort::Bool,
                            _ => Sort::Real,
                        };
                        self.vars.set_type(&base, ty);
                        let (prev, n) = self.next_state(&base);
                        let id = ssa_name(&base, n);
                        self.add_var_change(&base, &id, &ssa_name(&base, prev));
                        let rhs = Rule::Infix(Infix {
                            x: Box::new(x),
                            y: Box::new(y),
                            op: infix.op,
                            ty: infix.ty,
                        });
                        ru.push(Rule::infix(Rule::ident(id), Op::Store, rhs, Some(ty)));
                    }
                    other => {
                        let ty = self.vars.lookup_type(&base);
                        let (prev, n) = self.next_state(&base);
                        let id = ssa_name(&base, n);
                        self.add_var_change(&base, &id, &ssa_name(&base, prev));
                        ru.push(Rule::infix(Rule::ident(id), Op::Store, other, Some(ty)));
                    }
                }
            } else {
                return Err(SmtError::UnboundTemp {
                    scope: self.current_function.clone(),
                    id: src_id,
                });
            }
        } else {
            let ty = match src {
                Operand::Bool(_) => Sort::Bool,
                Operand::Float(_) => Sort::Real,
                Operand::Var(v) if is_bool_literal(v) => Sort::Bool,
                _ => self.vars.lookup_type(&base),
            };
            self.vars.set_type(&base, ty);
            let (prev, n) = self.next_state(&base);
            let id = ssa_name(&base, n);
            self.add_var_change(&base, &id, &ssa_name(&base, prev));
            ru.push(Rule::infix(
                Rule::ident(id),
                Op::Store,
                Rule::ident(format_value(src)),
                Some(ty),
            ));
        }
        Ok(ru)
    }

    /// Resolve temp leaves of a stored sub-rule to SSA identifiers, inlining
    /// nested sub-rules.
    pub(crate) fn temp_to_ident(&mut self, rule: Rule) -> SmtResult<Rule> {
        match rule {
            Rule::Wrap(w) => self.fetch_ident(w),
            Rule::Infix(mut i) => {
                i.x = Box::new(self.temp_to_ident(*i.x)?);
                i.y = Box::new(self.temp_to_ident(*i.y)?);
                Ok(Rule::Infix(i))
            }
            other => Ok(other),
        }
    }

    fn fetch_ident(&mut self, w: crate::rules::Wrap) -> SmtResult<Rule> {
        if !is_temp(&w.value) {
            return Ok(Rule::Wrap(w));
        }
        let key = self.scoped(&w.value);
        if let Some(Loaded::Ptr(v)) = self.vars.loads.get(&key) {
            let base = format_ident(&format_value(v)).to_string();
            return Ok(Rule::ident(self.vars.current_name(&base)));
        }
        if let Some(r) = self.vars.refs.get(&key).cloned() {
            return match r {
                Rule::Infix(_) => self.temp_to_ident(r),
                other => Ok(other),
            };
        }
        Err(SmtError::UnboundTemp {
            scope: self.current_function.clone(),
            id: w.value,
        })
    }
}
