//! Error surfaces: unsupported instructions, malformed assertions, and
//! frontend mistakes all abort with a typed error instead of partial output.

mod common;

use std::collections::HashMap;

use common::*;
use fault_ast::{NilLit, Span, Temporal};
use fault_ir::{Block, CallMeta, Func, Inst, Module, Operand, Terminator};
use fault_smt::{Generator, SmtError};

fn generate(module: &Module, asserts: Vec<fault_ast::AssertionStatement>) -> Result<String, SmtError> {
    let mut g = Generator::new();
    g.load_meta(1, HashMap::new(), vec![], asserts, vec![]);
    g.generate(module)?;
    Ok(g.smt())
}

fn one_block_flow(name: &str, insts: Vec<Inst>) -> Func {
    Func {
        name: name.to_string(),
        blocks: vec![Block {
            name: "entry".to_string(),
            insts,
            term: Terminator::Ret,
        }],
    }
}

#[test]
fn frem_is_rejected() {
    let module = Module {
        globals: vec![global("test1_m_x", 10.0)],
        funcs: vec![
            run_func(1, &["@test_bar"]),
            one_block_flow(
                "@test_bar",
                vec![
                    Inst::Load {
                        dst: "%1".to_string(),
                        src: Operand::Var("@test1_m_x".to_string()),
                    },
                    Inst::FRem {
                        dst: "%2".to_string(),
                        x: Operand::Var("%1".to_string()),
                        y: Operand::Float(3.0),
                    },
                ],
            ),
        ],
    };
    assert!(matches!(
        generate(&module, vec![]),
        Err(SmtError::RemUnsupported)
    ));
}

#[test]
fn storing_an_unbound_temp_fails() {
    let module = Module {
        globals: vec![global("test1_m_x", 10.0)],
        funcs: vec![
            run_func(1, &["@test_bar"]),
            one_block_flow(
                "@test_bar",
                vec![Inst::Store {
                    dst: "@test1_m_x".to_string(),
                    src: Operand::Var("%9".to_string()),
                }],
            ),
        ],
    };
    match generate(&module, vec![]) {
        Err(SmtError::UnboundTemp { scope, id }) => {
            assert_eq!(scope, "@test_bar");
            assert_eq!(id, "%9");
        }
        other => panic!("expected unbound temp error, got {other:?}"),
    }
}

#[test]
fn advance_outside_a_statechart_fails() {
    let module = Module {
        globals: vec![],
        funcs: vec![
            run_func(1, &["@test_flow"]),
            one_block_flow(
                "@test_flow",
                vec![Inst::Call {
                    dst: None,
                    callee: "@advance".to_string(),
                    args: vec![Operand::StateTag("test1_door_open".to_string())],
                    meta: CallMeta::default(),
                }],
            ),
        ],
    };
    assert!(matches!(
        generate(&module, vec![]),
        Err(SmtError::StateCallOutsideChart { .. })
    ));
}

#[test]
fn advance_without_an_argument_fails() {
    let module = Module {
        globals: vec![],
        funcs: vec![
            run_func(1, &["@test1_door__state"]),
            one_block_flow(
                "@test1_door__state",
                vec![Inst::Call {
                    dst: None,
                    callee: "@advance".to_string(),
                    args: vec![],
                    meta: CallMeta::default(),
                }],
            ),
        ],
    };
    assert!(matches!(
        generate(&module, vec![]),
        Err(SmtError::BadBuiltinArg { .. })
    ));
}

#[test]
fn a_function_calling_itself_fails() {
    let module = Module {
        globals: vec![global("test1_m_x", 10.0)],
        funcs: vec![
            run_func(1, &["@test_loop"]),
            one_block_flow(
                "@test_loop",
                vec![
                    Inst::Store {
                        dst: "@test1_m_x".to_string(),
                        src: Operand::Float(1.0),
                    },
                    Inst::Call {
                        dst: None,
                        callee: "@test_loop".to_string(),
                        args: vec![],
                        meta: CallMeta::default(),
                    },
                ],
            ),
        ],
    };
    assert!(matches!(
        generate(&module, vec![]),
        Err(SmtError::RecursiveCall(name)) if name == "@test_loop"
    ));
}

#[test]
fn calling_an_unknown_function_fails() {
    let module = Module {
        globals: vec![],
        funcs: vec![run_func(1, &["@missing"])],
    };
    assert!(matches!(
        generate(&module, vec![]),
        Err(SmtError::UnknownFunction(name)) if name == "@missing"
    ));
}

#[test]
fn temporal_and_when_then_do_not_mix() {
    let module = stock_module(1, "test1_amount_value", 10.0, 2.0);
    let mut s = stmt(
        infix(var("test1_amount_value"), ">", int(0)),
        "then",
        infix(var("test1_amount_value"), "<=", int(10)),
        false,
    );
    s.temporal = Some(Temporal::Eventually);
    assert!(matches!(
        generate(&module, vec![s]),
        Err(SmtError::MixedTemporal { .. })
    ));
}

#[test]
fn indexing_a_missing_state_fails() {
    let module = stock_module(1, "test1_amount_value", 10.0, 2.0);
    let s = stmt(
        index(var("test1_amount_value"), int(9)),
        ">",
        int(0),
        false,
    );
    assert!(matches!(
        generate(&module, vec![s]),
        Err(SmtError::MissingState { state: 9, .. })
    ));
}

#[test]
fn nil_in_an_invariant_is_illegal() {
    let module = stock_module(1, "test1_amount_value", 10.0, 2.0);
    let s = stmt(
        var("test1_amount_value"),
        ">",
        fault_ast::Expr::Nil(NilLit {
            span: Span::new(3, 6),
        }),
        false,
    );
    assert!(matches!(
        generate(&module, vec![s]),
        Err(SmtError::IllegalAssertNode { kind: "nil", .. })
    ));
}
