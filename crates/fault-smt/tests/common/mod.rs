//! Shared IR and AST fixtures: small stock-and-flow models built by hand,
//! the way the frontend would emit them.
#![allow(dead_code)]

use fault_ast::{
    AssertVar, AssertionStatement, Expr, IndexExpr, InfixExpr, IntegerLit, InvariantClause, Span,
    Temporal, TemporalFilter,
};
use fault_ir::{
    Block, CallMeta, Constant, Func, Global, Inst, Module, Operand, Terminator, ROUND_COUNTER_VAR,
    RUN_FUNC,
};

/// A flow function that applies one arithmetic step to a stock:
/// `base <- base <op> amount`.
pub fn flow_step(name: &str, base: &str, op: char, amount: f64) -> Func {
    let x = Operand::Var("%1".to_string());
    let y = Operand::Float(amount);
    let arith = match op {
        '+' => Inst::FAdd {
            dst: "%2".to_string(),
            x,
            y,
        },
        '*' => Inst::FMul {
            dst: "%2".to_string(),
            x,
            y,
        },
        '/' => Inst::FDiv {
            dst: "%2".to_string(),
            x,
            y,
        },
        _ => Inst::FSub {
            dst: "%2".to_string(),
            x,
            y,
        },
    };
    Func {
        name: name.to_string(),
        blocks: vec![Block {
            name: "entry".to_string(),
            insts: vec![
                Inst::Load {
                    dst: "%1".to_string(),
                    src: Operand::Var(format!("@{base}")),
                },
                arith,
                Inst::Store {
                    dst: format!("@{base}"),
                    src: Operand::Var("%2".to_string()),
                },
            ],
            term: Terminator::Ret,
        }],
    }
}

/// The `@__run` entry: each round calls the given flows, then stores to the
/// round counter.
pub fn run_func(runs: usize, callees: &[&str]) -> Func {
    let mut insts = Vec::new();
    for r in 0..runs {
        for c in callees {
            insts.push(Inst::Call {
                dst: None,
                callee: c.to_string(),
                args: vec![],
                meta: CallMeta {
                    round: Some(r as u32 + 1),
                    group: None,
                },
            });
        }
        insts.push(Inst::Store {
            dst: ROUND_COUNTER_VAR.to_string(),
            src: Operand::Float((r + 1) as f64),
        });
    }
    Func {
        name: RUN_FUNC.to_string(),
        blocks: vec![Block {
            name: "entry".to_string(),
            insts,
            term: Terminator::Ret,
        }],
    }
}

pub fn global(base: &str, init: f64) -> Global {
    Global {
        name: format!("@{base}"),
        init: Constant::Float(init),
    }
}

/// The canonical decreasing stock: `base` starts at `init` and one flow
/// subtracts `dec` per round.
pub fn stock_module(runs: usize, base: &str, init: f64, dec: f64) -> Module {
    Module {
        globals: vec![global(base, init)],
        funcs: vec![
            run_func(runs, &["@test_bar"]),
            flow_step("@test_bar", base, '-', dec),
        ],
    }
}

pub fn var(name: &str) -> Expr {
    Expr::Var(AssertVar {
        instances: vec![name.to_string()],
        span: Span::default(),
    })
}

pub fn int(v: i64) -> Expr {
    Expr::Int(IntegerLit {
        value: v,
        span: Span::default(),
    })
}

pub fn infix(left: Expr, op: &str, right: Expr) -> Expr {
    Expr::Infix(InfixExpr {
        left: Box::new(left),
        operator: op.to_string(),
        right: Box::new(right),
        span: Span::default(),
    })
}

pub fn index(left: Expr, idx: Expr) -> Expr {
    Expr::Index(IndexExpr {
        left: Box::new(left),
        index: Box::new(idx),
        span: Span::default(),
    })
}

pub fn stmt(left: Expr, op: &str, right: Expr, assume: bool) -> AssertionStatement {
    AssertionStatement {
        constraint: InvariantClause {
            left,
            operator: op.to_string(),
            right,
            span: Span::default(),
        },
        assume,
        temporal: None,
        filter: None,
        span: Span::default(),
    }
}

pub fn stmt_temporal(
    left: Expr,
    op: &str,
    right: Expr,
    assume: bool,
    temporal: Temporal,
) -> AssertionStatement {
    AssertionStatement {
        temporal: Some(temporal),
        ..stmt(left, op, right, assume)
    }
}

pub fn stmt_filtered(
    left: Expr,
    op: &str,
    right: Expr,
    assume: bool,
    filter: TemporalFilter,
) -> AssertionStatement {
    AssertionStatement {
        filter: Some(filter),
        ..stmt(left, op, right, assume)
    }
}
