//! Conditional lowering and the fork join.
//!
//! Both branches of a conditional are lowered and emitted unconditionally;
//! the `Ite` rule produced here gates only the phi-capping equalities. The
//! fork records which bases each branch wrote so `cap_cond` can declare one
//! phi output per base, and `cap_cond_sync_rules` patches asymmetric forks
//! so an untouched branch still defines the phi output.

use fault_ir::{Block, Func, Operand};
use indexmap::IndexMap;

use crate::forks::{Choice, Fork};
use crate::rules::{Ite, Op, Rule};
use crate::variables::{is_bool_literal, is_numeric, is_temp, split_state, ssa_name};
use crate::{SmtError, SmtResult};

use super::Generator;

impl Generator {
    /// Open a fork for the next split. Inside a phi scope the current fork
    /// is replaced; at the top level a new one is pushed.
    pub(crate) fn new_fork(&mut self) {
        if self.phi_state.check() {
            match self.forks.last_mut() {
                Some(last) => *last = Fork::new(),
                None => self.forks.push(Fork::new()),
            }
        } else {
            self.forks.push(Fork::new());
        }
    }

    pub(crate) fn current_fork(&self) -> Fork {
        self.forks.last().cloned().unwrap_or_default()
    }

    /// Record every state a branch's rules wrote into the current fork.
    pub(crate) fn build_fork_choice(&mut self, rules: &[Rule], branch: &str) {
        let mut state_changes = Vec::new();
        for r in rules {
            self.collect_state_changes(r, &mut state_changes);
        }

        let Some(fork) = self.forks.last_mut() else {
            return;
        };
        let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();
        for s in state_changes {
            let Some((base, n)) = split_state(&s) else {
                continue;
            };
            let base = base.to_string();
            if let Some(list) = fork.get_mut(&base) {
                let extend = seen.contains(&base)
                    && list.last().is_some_and(|c| c.branch == branch);
                if extend {
                    if let Some(last) = list.last_mut() {
                        last.add_value(n);
                    }
                } else {
                    seen.insert(base.clone());
                    list.push(Choice::new(base, n, branch));
                }
            } else {
                seen.insert(base.clone());
                fork.insert(base.clone(), Choice::new(base, n, branch));
            }
        }
    }

    fn collect_state_changes(&self, rule: &Rule, out: &mut Vec<String>) {
        match rule {
            Rule::Wrap(w) => {
                // Wraps might be static values.
                if !w.value.is_empty() && !is_numeric(&w.value) && !is_bool_literal(&w.value) {
                    out.push(w.value.clone());
                }
            }
            Rule::Infix(i) => {
                self.collect_state_changes(&i.x, out);
                self.collect_state_changes(&i.y, out);
            }
            Rule::Ite(ite) => {
                for r in ite.then_rules.iter().chain(&ite.else_rules) {
                    self.collect_state_changes(r, out);
                }
            }
            Rule::WrapGroup(wg) => {
                for w in &wg.wraps {
                    if !w.value.is_empty() && !is_numeric(&w.value) && !is_bool_literal(&w.value) {
                        out.push(w.value.clone());
                    }
                }
            }
            Rule::Ands(a) => {
                for r in &a.rules {
                    self.collect_state_changes(r, out);
                }
            }
            Rule::Choices(c) => {
                for a in &c.branches {
                    for r in &a.rules {
                        self.collect_state_changes(r, out);
                    }
                }
            }
            Rule::Phi(_) => {}
        }
    }

    pub(crate) fn parse_term_con(
        &mut self,
        f: &Func,
        cond: &Operand,
        succs: &[String],
    ) -> SmtResult<Vec<Rule>> {
        let mut ru = Vec::new();

        let cond_rule = match cond.ident() {
            Some(id) if is_temp(id) => {
                let key = self.scoped(id);
                self.vars
                    .refs
                    .get(&key)
                    .cloned()
                    .ok_or_else(|| SmtError::UnboundTemp {
                        scope: self.current_function.clone(),
                        id: id.to_string(),
                    })?
            }
            Some(id) => Rule::ident(id.to_string()),
            None => Rule::ident(crate::variables::format_value(cond)),
        };
        match &cond_rule {
            Rule::Wrap(_) | Rule::Infix(_) => {}
            _ => return Err(SmtError::InvalidCond),
        }

        self.vars.new_phi_scope();
        let (t, fr, after) = self.parse_terms(f, succs)?;

        let mut phis: IndexMap<String, u32> = IndexMap::new();
        if !(t.is_empty() && fr.is_empty()) {
            ru.extend(t.iter().cloned());
            ru.extend(fr.iter().cloned());

            // Step back into a phi state so multiconditionals cap correctly.
            self.phi_state.enter();
            self.new_fork();
            self.build_fork_choice(&t, "true");
            self.build_fork_choice(&fr, "false");

            let mut t_ends = self.cap_cond("true", &mut phis)?;
            let mut f_ends = self.cap_cond("false", &mut phis)?;

            // Keep variable names in sync across branches.
            let mut syncs = self.cap_cond_sync_rules(&["true", "false"])?;
            if let Some(s) = syncs.shift_remove("true") {
                t_ends.extend(s);
            }
            if let Some(s) = syncs.shift_remove("false") {
                f_ends.extend(s);
            }

            ru.push(Rule::Ite(Ite {
                cond: Box::new(cond_rule),
                then_rules: t_ends,
                else_rules: f_ends,
            }));
            self.phi_state.exit();
        }

        self.vars.pop_phi_scope();
        self.vars.append_state(&phis);

        if let Some(a) = after {
            ru.extend(self.parse_after_block(f, &a)?);
        }
        Ok(ru)
    }

    fn parse_terms(
        &mut self,
        f: &Func,
        succs: &[String],
    ) -> SmtResult<(Vec<Rule>, Vec<Rule>, Option<Block>)> {
        let mut t = Vec::new();
        let mut fr = Vec::new();
        let mut after = None;
        for name in succs {
            let block = f
                .block(name)
                .ok_or_else(|| SmtError::UnknownBlock(name.clone()))?
                .clone();
            match name.rsplit('-').next().unwrap_or("") {
                "true" => {
                    self.phi_state.enter();
                    t = self.parse_block(f, &block)?;
                    self.phi_state.exit();
                }
                "false" => {
                    self.phi_state.enter();
                    fr = self.parse_block(f, &block)?;
                    self.local_callstack.clear();
                    self.phi_state.exit();
                }
                "after" => after = Some(block),
                _ => return Err(SmtError::UnknownBranch(name.clone())),
            }
        }
        Ok((t, fr, after))
    }

    fn parse_after_block(&mut self, f: &Func, block: &Block) -> SmtResult<Vec<Rule>> {
        let mut a = self.parse_block(f, block)?;
        a.extend(self.execute_callstack()?);
        Ok(a)
    }

    /// Cap one branch of the current fork: allocate (once per base) a fresh
    /// phi output, declare it, and equate it with the branch's terminal
    /// states.
    pub(crate) fn cap_cond(
        &mut self,
        branch: &str,
        phis: &mut IndexMap<String, u32>,
    ) -> SmtResult<Vec<Rule>> {
        let fork = self.current_fork();
        let mut rules = Vec::new();
        for (k, choices) in fork.iter() {
            // The phi output is allocated when the first branch caps this
            // base; later branches reuse it.
            let id = match phis.get(k) {
                Some(phi) => ssa_name(k, *phi),
                None => {
                    let n = self.vars.advance(k);
                    let id = ssa_name(k, n);
                    let ty = self.vars.lookup_type(k);
                    self.declare_var(&id, ty);
                    self.rounds.record(k, n);
                    phis.insert(k.clone(), n);
                    id
                }
            };
            for c in choices {
                if c.branch == branch {
                    rules.extend(self.cap_rule(k, &[c.end()], &id));
                }
            }
        }
        Ok(rules)
    }

    pub(crate) fn cap_rule(&mut self, base: &str, nums: &[u32], id: &str) -> Vec<Rule> {
        let ty = self.vars.lookup_type(base);
        let mut e = Vec::new();
        for v in nums {
            let id2 = ssa_name(base, *v);
            self.add_var_change(base, id, &id2);
            e.push(Rule::infix(
                Rule::ident(id.to_string()),
                Op::Eq,
                Rule::ident(id2),
                Some(ty),
            ));
        }
        e
    }

    /// For bases written in one branch but not another, equate the phi
    /// output with the start state in the untouched branches, so every path
    /// defines the phi output.
    pub(crate) fn cap_cond_sync_rules(
        &mut self,
        branches: &[&str],
    ) -> SmtResult<IndexMap<String, Vec<Rule>>> {
        let mut ends: IndexMap<String, Vec<Rule>> = IndexMap::new();
        for b in branches {
            let fork = self.current_fork();
            let mut e = Vec::new();
            for (k, choices) in fork.iter() {
                if choices.len() == 1 && choices[0].branch == *b {
                    let start = self.vars.start_state(k);
                    let id = self.vars.current_name(k);
                    e.extend(self.cap_rule(k, &[start], &id));
                }
            }
            for nb in branches.iter().filter(|nb| *nb != b) {
                ends.entry(nb.to_string()).or_default().extend(e.iter().cloned());
            }
        }
        Ok(ends)
    }
}
