//! Parallel runs.
//!
//! Callees sharing a parallel group execute concurrently in the source
//! language. The lowering enumerates every ordering of the group, replays
//! each one against a snapshot of the variable table, and caps the whole
//! fork with one `Phi` per touched base: the solver nondeterministically
//! picks which interleaving actually ran.

use fault_ir::CallMeta;
use tracing::debug;

use crate::rules::{Phi, Rule};
use crate::variables::ssa_name;
use crate::SmtResult;

use super::Generator;

/// Enumerate all permutations of `items`, in lexicographic order of the
/// input list. Pure: the input is left untouched.
pub(crate) fn parallel_permutations(items: &[String]) -> Vec<Vec<String>> {
    fn rec(prefix: &mut Vec<String>, rest: &mut Vec<String>, out: &mut Vec<Vec<String>>) {
        if rest.is_empty() {
            out.push(prefix.clone());
            return;
        }
        for i in 0..rest.len() {
            let item = rest.remove(i);
            prefix.push(item);
            rec(prefix, rest, out);
            if let Some(item) = prefix.pop() {
                rest.insert(i, item);
            }
        }
    }

    let mut out = Vec::new();
    rec(&mut Vec::new(), &mut items.to_vec(), &mut out);
    out
}

impl Generator {
    /// Flush the pending call stack into rules.
    pub(crate) fn execute_callstack(&mut self) -> SmtResult<Vec<Rule>> {
        let stack = std::mem::take(&mut self.local_callstack);
        self.generate_from_callstack(stack)
    }

    pub(crate) fn generate_from_callstack(&mut self, callstack: Vec<String>) -> SmtResult<Vec<Rule>> {
        if callstack.is_empty() {
            return Ok(Vec::new());
        }
        if callstack.iter().any(|c| *c == self.current_function) {
            return Err(crate::SmtError::RecursiveCall(self.current_function.clone()));
        }
        if callstack.len() > 1 {
            let perms = parallel_permutations(&callstack);
            debug!(
                callees = callstack.len(),
                permutations = perms.len(),
                "lowering parallel group"
            );
            return self.run_parallel(perms);
        }
        let f = self.function(&callstack[0])?;
        self.parse_function(&f)
    }

    fn run_parallel(&mut self, perms: Vec<Vec<String>>) -> SmtResult<Vec<Rule>> {
        let mut ru = Vec::new();
        self.new_fork();
        let in_phi = self.phi_state.check();
        for (i, calls) in perms.iter().enumerate() {
            let label = format!("option_{i}");
            let snapshot = self.vars.save_state();
            let mut raw = Vec::new();
            for c in calls {
                // The first read of any variable binds to the
                // pre-permutation state: all interleavings start from the
                // same point.
                self.parallel_run_start = true;
                // inside the callee the walk must not behave as if it were
                // in a phi scope
                if in_phi {
                    self.phi_state.exit();
                }
                let f = self.function(c)?;
                let rules = self.parse_function(&f)?;
                if in_phi {
                    self.phi_state.enter();
                }
                raw.extend(rules);
            }
            self.build_fork_choice(&raw, &label);
            self.vars.load_state(snapshot);
            ru.extend(raw);
        }
        ru.extend(self.cap_parallel());
        Ok(ru)
    }

    /// Cap every base the parallel fork touched with a single `Phi` over all
    /// permutation end states.
    fn cap_parallel(&mut self) -> Vec<Rule> {
        let fork = self.current_fork();
        let mut ru = Vec::new();
        for (k, choices) in fork.iter() {
            let n = self.vars.advance(k);
            self.rounds.record(k, n);
            let id = ssa_name(k, n);
            let nums: Vec<u32> = choices.iter().map(|c| c.end()).collect();
            self.var_change_phi(k, &id, &nums);
            ru.push(Rule::Phi(Phi {
                base: k.clone(),
                end_state: id,
                states: nums,
            }));
        }
        ru
    }

    pub(crate) fn is_same_parallel_group(&self, meta: &CallMeta) -> bool {
        if meta.is_empty() {
            return false;
        }
        match (&self.parallel_grouping, &meta.group) {
            (None, _) => true,
            (Some(current), Some(tag)) => current == tag,
            (Some(_), None) => false,
        }
    }

    pub(crate) fn single_parallel_step(&self, callee: &str) -> bool {
        self.local_callstack.last().is_some_and(|last| last == callee)
    }

    pub(crate) fn update_parallel_group(&mut self, meta: &CallMeta) {
        if let Some(group) = &meta.group {
            self.parallel_grouping = Some(group.clone());
        }
    }
}
