//! Rendering the rule tree as SMT-LIB 2 text.
//!
//! This is the only place rules become strings. Output order is fixed: the
//! `(set-logic QF_NRA)` preamble, every `declare-fun` in first-emission
//! order (deduplicated by identifier), constant assertions, rule assertions,
//! then property assertions.

use crate::lowering::Generator;
use crate::rules::{Infix, Op, Rule};
use crate::sorts::Sort;
use crate::{SmtError, SmtResult};

/// Literal the frontend stores for a value the solver chooses. An equality
/// against it is suppressed: the variable is declared and left free.
pub const SOLVER_CHOSEN_SENTINEL: &str = "0x3DA3CA8CB153A753";

pub(crate) fn write_assert(op: &str, stmt: &str) -> String {
    if op.is_empty() {
        format!("(assert {stmt})")
    } else {
        format!("(assert ({op} {stmt}))")
    }
}

pub(crate) fn write_assertless_rule(op: &str, x: &str, y: &str) -> String {
    if y.is_empty() {
        format!("({op} {x})")
    } else {
        format!("({op} {x} {y})")
    }
}

fn infix_text(op: Op, x: &str, y: &str) -> String {
    match op {
        Op::Ne => format!("(not (= {x} {y}))"),
        _ => write_assertless_rule(&op.to_string(), x, y),
    }
}

impl Generator {
    pub(crate) fn declare_var(&mut self, id: &str, ty: Sort) {
        if self.declared.insert(id.to_string()) {
            self.inits.push(format!("(declare-fun {id} () {ty})"));
        }
    }

    pub(crate) fn write_init_rule(&mut self, id: &str, ty: Sort, val: &str) -> String {
        self.declare_var(id, ty);
        format!("(assert (= {id} {val}))")
    }

    pub(crate) fn render_rules(&mut self) -> SmtResult<Vec<String>> {
        let raw = std::mem::take(&mut self.raw_rules);
        let mut out = Vec::new();
        for batch in &raw {
            for r in batch {
                let s = self.write_rule(r)?;
                if !s.is_empty() {
                    out.push(s);
                }
            }
        }
        self.raw_rules = raw;
        Ok(out)
    }

    pub(crate) fn write_rule(&mut self, ru: &Rule) -> SmtResult<String> {
        match ru {
            Rule::Infix(r) => {
                let y = self.unpack_rule(&r.y)?;
                let x = self.unpack_rule(&r.x)?;
                if y == SOLVER_CHOSEN_SENTINEL {
                    self.declare_var(&x, r.ty.unwrap_or_default());
                    return Ok(String::new());
                }
                match r.op {
                    Op::Or => Ok(write_assert("or", &format!("{x} {y}"))),
                    Op::Store | Op::Eq => Ok(self.write_init_rule(&x, r.ty.unwrap_or_default(), &y)),
                    op => Ok(infix_text(op, &x, &y)),
                }
            }
            Rule::Ite(ite) => {
                let cond = self.write_cond(&ite.cond)?;
                let t = self.branch_parts(&ite.then_rules)?;
                let f = self.branch_parts(&ite.else_rules)?;
                let br = format!("(ite {cond} {t} {f})");
                Ok(write_assert("", &br))
            }
            Rule::Wrap(w) => Ok(w.value.clone()),
            Rule::Phi(p) => {
                let ty = self.vars.lookup_type(&p.base);
                self.declare_var(&p.end_state, ty);
                let ends = format_ends(&p.base, &p.states, &p.end_state);
                Ok(write_assert("or", &ends))
            }
            Rule::Ands(a) => {
                let mut parts = Vec::new();
                for x in &a.rules {
                    match x {
                        Rule::Infix(i) => parts.push(self.write_branch_rule(i)?),
                        other => parts.push(self.write_rule(other)?),
                    }
                }
                Ok(write_assertless_rule("and", &parts.join(" "), ""))
            }
            Rule::Choices(c) => {
                let mut parts = Vec::new();
                for a in &c.branches {
                    parts.push(self.write_rule(&Rule::Ands(a.clone()))?);
                }
                let joined = parts.join(" ");
                if c.op == Op::Or {
                    Ok(write_assert("or", &joined))
                } else {
                    Ok(write_assert("", &joined))
                }
            }
            Rule::WrapGroup(wg) => Ok(wg
                .wraps
                .iter()
                .map(|w| w.value.clone())
                .collect::<Vec<_>>()
                .join(" ")),
        }
    }

    fn branch_parts(&mut self, rules: &[Rule]) -> SmtResult<String> {
        let mut parts = Vec::new();
        for r in rules {
            match r {
                Rule::Infix(i) => parts.push(self.write_branch_rule(i)?),
                other => parts.push(self.write_rule(other)?),
            }
        }
        Ok(match parts.len() {
            0 => "true".to_string(),
            1 => parts.swap_remove(0),
            _ => format!("(and {})", parts.join(" ")),
        })
    }

    /// An infix inside an `Ite` branch: plain `(op x y)`, never a
    /// declaration.
    fn write_branch_rule(&mut self, r: &Infix) -> SmtResult<String> {
        let y = self.unpack_rule(&r.y)?;
        let x = self.unpack_rule(&r.x)?;
        Ok(infix_text(r.op, &x, &y))
    }

    fn write_cond(&mut self, cond: &Rule) -> SmtResult<String> {
        match cond {
            Rule::Wrap(w) => Ok(w.value.clone()),
            Rule::Infix(r) => {
                let y = self.unpack_cond_rule(&r.y)?;
                let x = self.unpack_cond_rule(&r.x)?;
                Ok(infix_text(r.op, &x, &y))
            }
            _ => Err(SmtError::InvalidCond),
        }
    }

    fn unpack_cond_rule(&self, rule: &Rule) -> SmtResult<String> {
        match rule {
            Rule::Wrap(w) => Ok(w.value.clone()),
            Rule::Infix(r) => {
                let x = self.unpack_cond_rule(&r.x)?;
                let y = self.unpack_cond_rule(&r.y)?;
                Ok(infix_text(r.op, &x, &y))
            }
            _ => Err(SmtError::InvalidCond),
        }
    }

    fn unpack_rule(&mut self, rule: &Rule) -> SmtResult<String> {
        match rule {
            Rule::Wrap(w) => Ok(w.value.clone()),
            Rule::Infix(_) | Rule::Ands(_) | Rule::Choices(_) => self.write_rule(rule),
            other => Err(SmtError::Internal(format!(
                "rule {other:?} cannot appear as an operand"
            ))),
        }
    }

    /// The assembled program text.
    pub fn smt(&self) -> String {
        let mut out = String::from("(set-logic QF_NRA)");
        for line in self
            .inits
            .iter()
            .chain(&self.constants)
            .chain(&self.rules)
            .chain(&self.asserts)
        {
            out.push('\n');
            out.push_str(line);
        }
        out
    }
}

fn format_ends(base: &str, nums: &[u32], id: &str) -> String {
    nums.iter()
        .map(|v| format!("(= {id} {base}_{v})"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assert_wrapping() {
        assert_eq!(write_assert("", "(> x 0)"), "(assert (> x 0))");
        assert_eq!(write_assert("or", "a b"), "(assert (or a b))");
    }

    #[test]
    fn assertless_rule_elides_empty_operand() {
        assert_eq!(write_assertless_rule("not", "x", ""), "(not x)");
        assert_eq!(write_assertless_rule("=", "x", "y"), "(= x y)");
    }

    #[test]
    fn not_equal_renders_as_negated_equality() {
        assert_eq!(infix_text(Op::Ne, "a", "b"), "(not (= a b))");
    }

    #[test]
    fn format_ends_joins_phi_alternatives() {
        assert_eq!(
            format_ends("x", &[1, 3], "x_4"),
            "(= x_4 x_1) (= x_4 x_3)"
        );
    }
}
