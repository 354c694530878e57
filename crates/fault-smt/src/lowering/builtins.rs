//! Statechart transition builtins and boolean transition chains.
//!
//! `advance(state)` moves a component to a new state: the referenced state
//! flag becomes true and the component's current state flag becomes false,
//! both at fresh SSA indices. `stay()` re-asserts the current state at a
//! fresh index. When these calls appear inside boolean and/or chains, their
//! lowering is deferred into a [`StateChange`] so the join can combine the
//! alternatives with the right operator.

use fault_ir::{Inst, Operand};
use indexmap::IndexMap;

use crate::rules::{Ands, Choices, Op, Rule};
use crate::sorts::Sort;
use crate::variables::{format_ident, is_temp, ssa_name, Loaded};
use crate::{SmtError, SmtResult};

use super::Generator;

pub(crate) const ADVANCE: &str = "@advance";
pub(crate) const STAY: &str = "@stay";

pub(crate) fn is_builtin(name: &str) -> bool {
    name == ADVANCE || name == STAY
}

/// Deferred transition calls collected from a boolean chain: `ands` must all
/// fire together, each entry of `ors` is an alternative.
#[derive(Debug, Clone, Default)]
pub(crate) struct StateChange {
    pub ands: Vec<Inst>,
    pub ors: Vec<Inst>,
}

impl Generator {
    pub(crate) fn parse_builtin(
        &mut self,
        callee: &str,
        args: &[Operand],
        declare: bool,
    ) -> SmtResult<Vec<Rule>> {
        match callee {
            ADVANCE => {
                let arg = args.first().ok_or_else(|| SmtError::BadBuiltinArg {
                    callee: callee.to_string(),
                })?;
                let base = self.resolve_state_arg(callee, arg)?;
                let r1 = self.transition_flag(&base, true, declare);
                let current = self.chart_base(callee)?;
                let r2 = self.transition_flag(&current, false, declare);
                Ok(vec![r1, r2])
            }
            STAY => {
                let current = self.chart_base(callee)?;
                Ok(vec![self.transition_flag(&current, true, declare)])
            }
            other => Err(SmtError::UnknownFunction(other.to_string())),
        }
    }

    /// The state base an `advance` argument names: either directly, or via a
    /// loaded pointer to a state tag.
    fn resolve_state_arg(&self, callee: &str, arg: &Operand) -> SmtResult<String> {
        match arg {
            Operand::StateTag(s) => Ok(format_ident(s).to_string()),
            Operand::Var(v) if is_temp(v) => {
                let key = self.scoped(v);
                match self.vars.loads.get(&key) {
                    Some(Loaded::Ptr(Operand::StateTag(s))) => Ok(format_ident(s).to_string()),
                    _ => Err(SmtError::BadBuiltinArg {
                        callee: callee.to_string(),
                    }),
                }
            }
            _ => Err(SmtError::BadBuiltinArg {
                callee: callee.to_string(),
            }),
        }
    }

    /// The component base of the enclosing statechart step function.
    fn chart_base(&self, callee: &str) -> SmtResult<String> {
        format_ident(&self.current_function)
            .strip_suffix("__state")
            .map(str::to_string)
            .ok_or_else(|| SmtError::StateCallOutsideChart {
                callee: callee.to_string(),
            })
    }

    /// Allocate a fresh SSA state for a statechart flag and pin it to a
    /// boolean value.
    fn transition_flag(&mut self, base: &str, value: bool, declare: bool) -> Rule {
        self.vars.set_type(base, Sort::Bool);
        let (prev, n) = self.next_state(base);
        let id = ssa_name(base, n);
        self.add_var_change(base, &id, &ssa_name(base, prev));
        if declare {
            self.declare_var(&id, Sort::Bool);
        }
        Rule::infix(
            Rule::ident(id),
            Op::Eq,
            Rule::ident(if value { "true" } else { "false" }),
            Some(Sort::Bool),
        )
    }

    /// Both operands resolve to deferred transition instructions: this
    /// and/or is a transition chain, not an ordinary boolean temp.
    pub(crate) fn is_state_change_chain(&self, x: &Operand, y: &Operand) -> bool {
        [x, y].iter().all(|o| {
            o.ident().is_some_and(|id| {
                is_temp(id)
                    && matches!(
                        self.vars.loads.get(&self.scoped(id)),
                        Some(Loaded::Inst(
                            Inst::Call { .. } | Inst::And { .. } | Inst::Or { .. }
                        ))
                    )
            })
        })
    }

    /// Fold a boolean chain into a [`StateChange`], consuming any nested
    /// chains already stored.
    pub(crate) fn parse_choice(&mut self, inst: &Inst, sc: &mut StateChange) -> SmtResult<()> {
        let (x, y, to_ors) = match inst {
            Inst::Or { x, y, .. } => (x, y, true),
            Inst::And { x, y, .. } => (x, y, false),
            Inst::Call { .. } => {
                sc.ors.push(inst.clone());
                return Ok(());
            }
            _ => {
                return Err(SmtError::Internal(
                    "unsupported instruction in transition chain".to_string(),
                ))
            }
        };
        for op in [x, y] {
            let id = op.ident().ok_or_else(|| {
                SmtError::Internal("non-identifier operand in transition chain".to_string())
            })?;
            let key = self.scoped(id);
            let loaded =
                self.vars
                    .loads
                    .get(&key)
                    .cloned()
                    .ok_or_else(|| SmtError::UnboundTemp {
                        scope: self.current_function.clone(),
                        id: id.to_string(),
                    })?;
            match loaded {
                Loaded::Inst(call @ Inst::Call { .. }) => {
                    if to_ors {
                        sc.ors.push(call);
                    } else {
                        sc.ands.push(call);
                    }
                }
                Loaded::Inst(nested @ (Inst::And { .. } | Inst::Or { .. })) => {
                    if let Some(sub) = self.stored_choice.shift_remove(&key) {
                        sc.ands.extend(sub.ands);
                        sc.ors.extend(sub.ors);
                    } else {
                        self.parse_choice(&nested, sc)?;
                    }
                }
                _ => {
                    return Err(SmtError::Internal(
                        "unsupported instruction in transition chain".to_string(),
                    ))
                }
            }
            self.stored_choice.shift_remove(&key);
        }
        Ok(())
    }

    /// Turn a collected [`StateChange`] into the rule that encodes it: a
    /// conjunction when there are no alternatives, otherwise a choice over
    /// the alternatives, each synced into a full branch.
    pub(crate) fn state_rules(&mut self, sc: &StateChange) -> SmtResult<Rule> {
        if sc.ors.is_empty() {
            let ands = self.and_state_rule(&sc.ands)?;
            return Ok(Rule::Choices(Choices {
                branches: vec![Ands { rules: ands }],
                op: Op::And,
            }));
        }

        let ands = self.and_state_rule(&sc.ands)?;
        let mut branches = self.or_state_rule(&sc.ors)?;
        if !sc.ands.is_empty() {
            branches.insert("joined_ands".to_string(), ands);
        }
        let x = self.sync_state_rules(branches)?;
        Ok(Rule::Choices(Choices {
            branches: x,
            op: Op::Or,
        }))
    }

    fn or_state_rule(&mut self, calls: &[Inst]) -> SmtResult<IndexMap<String, Vec<Rule>>> {
        self.phi_state.enter();
        let mut out = IndexMap::new();
        for call in calls {
            if let Inst::Call {
                dst, callee, args, ..
            } = call
            {
                let name = dst.clone().unwrap_or_else(|| callee.clone());
                let key = self.scoped(&name);
                let rules = self.parse_builtin(callee, args, true)?;
                out.insert(key, rules);
            }
        }
        self.phi_state.exit();
        Ok(out)
    }

    fn and_state_rule(&mut self, calls: &[Inst]) -> SmtResult<Vec<Rule>> {
        self.phi_state.enter();
        let mut ands = Vec::new();
        for call in calls {
            if let Inst::Call { callee, args, .. } = call {
                ands.extend(self.parse_builtin(callee, args, true)?);
            }
        }
        self.phi_state.exit();
        Ok(ands)
    }

    /// Cap each alternative of a transition choice like a fork branch and
    /// sync the bases the other alternatives left untouched.
    fn sync_state_rules(
        &mut self,
        branches: IndexMap<String, Vec<Rule>>,
    ) -> SmtResult<Vec<Ands>> {
        self.phi_state.enter();
        self.new_fork();

        let mut phis = IndexMap::new();
        let mut ends: IndexMap<String, Vec<Rule>> = IndexMap::new();
        for (k, v) in &branches {
            self.build_fork_choice(v, k);
            let e = self.cap_cond(k, &mut phis)?;
            let mut all = v.clone();
            all.extend(e);
            ends.insert(k.clone(), all);
        }

        let keys: Vec<&str> = branches.keys().map(String::as_str).collect();
        let syncs = self.cap_cond_sync_rules(&keys)?;
        let mut x = Vec::new();
        for (k, v) in syncs {
            let mut e2 = ends.shift_remove(&k).unwrap_or_default();
            e2.extend(v);
            x.push(Ands { rules: e2 });
        }
        self.phi_state.exit();
        Ok(x)
    }
}
