//! The stdio protocol, driven against stub solvers. The driver writes the
//! whole problem, closes stdin, and reads to EOF, so any program that
//! consumes stdin and prints a verdict works as a stand-in.
#![cfg(unix)]

use std::collections::HashMap;

use fault_solver::{ModelChecker, Scenario, Solver, SolverError};

fn checker(script: &str) -> ModelChecker {
    let mut mc = ModelChecker::new(Solver::new(
        "sh",
        vec!["-c".to_string(), script.to_string()],
    ));
    mc.load_model(
        "(set-logic QF_NRA)\n(declare-fun x_0 () Real)".to_string(),
        HashMap::new(),
        Vec::new(),
        HashMap::new(),
    );
    mc
}

#[test]
fn check_reads_a_sat_verdict() {
    let mc = checker("cat >/dev/null; echo sat");
    assert!(mc.check().unwrap());
}

#[test]
fn check_reads_an_unsat_verdict() {
    let mc = checker("cat >/dev/null; echo unsat");
    assert!(!mc.check().unwrap());
}

#[test]
fn unexpected_output_is_an_error() {
    let mc = checker("cat >/dev/null; echo 'error \"unknown logic\"'");
    assert!(matches!(mc.check(), Err(SolverError::UnexpectedOutput(_))));
}

#[test]
fn nonzero_exit_is_an_error() {
    let mc = checker("cat >/dev/null; echo boom >&2; exit 3");
    match mc.check() {
        Err(SolverError::SolverExit { status, stderr }) => {
            assert_eq!(status, 3);
            assert_eq!(stderr, "boom");
        }
        other => panic!("expected exit error, got {other:?}"),
    }
}

#[test]
fn missing_binary_is_a_spawn_error() {
    let mut mc = ModelChecker::new(Solver::new("/nonexistent/solver-binary", vec![]));
    mc.load_model(String::new(), HashMap::new(), Vec::new(), HashMap::new());
    assert!(matches!(mc.check(), Err(SolverError::Spawn { .. })));
}

#[test]
fn solve_extracts_the_model() {
    let mut mc = checker(
        "cat >/dev/null; printf 'sat\\n(\\n(define-fun x_0 () Real 4.0)\\n(define-fun x_1 () Real (- 2.0))\\n)\\n'",
    );
    let results = mc.solve().unwrap();
    match &results["x"] {
        Scenario::Float(t) => {
            assert_eq!(t.results[&0], 4.0);
            assert_eq!(t.results[&1], -2.0);
        }
        other => panic!("expected float trace, got {other:?}"),
    }
    assert_eq!(mc.result_values()["x_1"], "(- 2.0)");
}
