//! The solver subprocess and the reweighting pass.
//!
//! The driver writes the whole problem to the solver's stdin, closes it,
//! reads stdout to EOF, and waits for exit. There is no protocol-level
//! timeout; cancellation means killing the subprocess. If the model contains
//! `uncertain` variables, their traces are re-scored against the declared
//! Normal priors after solving.

use std::collections::HashMap;
use std::io::Write;
use std::process::{Command, Stdio};

use indexmap::IndexMap;
use tracing::{debug, info};

use fault_prob::Normal;
use fault_smt::variables::VarChange;
use fault_smt::Generator;

use crate::model::parse_model;
use crate::scenario::Scenario;
use crate::{SolverError, SolverResult};

/// Environment variable naming the solver binary. Required.
pub const SOLVER_CMD_ENV: &str = "SOLVERCMD";
/// Environment variable with the single argument passed to it. Required.
pub const SOLVER_ARG_ENV: &str = "SOLVERARG";

/// The configured solver command.
#[derive(Debug, Clone)]
pub struct Solver {
    command: String,
    arguments: Vec<String>,
}

impl Solver {
    pub fn new(command: impl Into<String>, arguments: Vec<String>) -> Self {
        Self {
            command: command.into(),
            arguments,
        }
    }

    /// Read `SOLVERCMD`/`SOLVERARG`. Missing either is fatal: there is no
    /// fallback solver.
    pub fn from_env() -> SolverResult<Self> {
        let command = std::env::var(SOLVER_CMD_ENV)
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or(SolverError::MissingConfig(SOLVER_CMD_ENV))?;
        let arg = std::env::var(SOLVER_ARG_ENV)
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or(SolverError::MissingConfig(SOLVER_ARG_ENV))?;
        Ok(Self::new(command, vec![arg]))
    }

    /// Feed the program plus the given commands to the solver and collect
    /// its full output.
    fn run(&self, smt: &str, actions: &[&str]) -> SolverResult<String> {
        info!(command = %self.command, "running solver");
        let mut child = Command::new(&self.command)
            .args(&self.arguments)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| SolverError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(smt.as_bytes())?;
            stdin.write_all(b"\n")?;
            stdin.write_all(actions.join("\n").as_bytes())?;
            stdin.write_all(b"\n")?;
        }
        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(SolverError::SolverExit {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Runs the solver over a generated program and interprets the results.
#[derive(Debug)]
pub struct ModelChecker {
    smt: String,
    uncertains: HashMap<String, (f64, f64)>,
    unknowns: Vec<String>,
    var_changes: HashMap<String, Vec<VarChange>>,
    result_values: IndexMap<String, String>,
    solver: Solver,
}

impl ModelChecker {
    pub fn new(solver: Solver) -> Self {
        Self {
            smt: String::new(),
            uncertains: HashMap::new(),
            unknowns: Vec::new(),
            var_changes: HashMap::new(),
            result_values: IndexMap::new(),
            solver,
        }
    }

    pub fn from_env() -> SolverResult<Self> {
        Ok(Self::new(Solver::from_env()?))
    }

    pub fn load_model(
        &mut self,
        smt: String,
        uncertains: HashMap<String, (f64, f64)>,
        unknowns: Vec<String>,
        var_changes: HashMap<String, Vec<VarChange>>,
    ) {
        self.smt = smt;
        self.uncertains = uncertains;
        self.unknowns = unknowns;
        self.var_changes = var_changes;
    }

    /// Load everything straight from a finished generator.
    pub fn load_generator(&mut self, g: &Generator) {
        self.load_model(
            g.smt(),
            g.uncertains().clone(),
            g.unknowns().to_vec(),
            g.var_changes().clone(),
        );
    }

    pub fn unknowns(&self) -> &[String] {
        &self.unknowns
    }

    /// The raw identifier → value text from the last model, for
    /// re-rendering.
    pub fn result_values(&self) -> &IndexMap<String, String> {
        &self.result_values
    }

    /// Satisfiability probe: `(check-sat)` only.
    pub fn check(&self) -> SolverResult<bool> {
        let results = self.solver.run(&self.smt, &["(check-sat)"])?;
        if results.ends_with("unsat") {
            Ok(false)
        } else if results.ends_with("sat") {
            Ok(true)
        } else {
            Err(SolverError::UnexpectedOutput(results))
        }
    }

    /// Solve and extract the model as typed traces.
    pub fn solve(&mut self) -> SolverResult<IndexMap<String, Scenario>> {
        let results = self.solver.run(&self.smt, &["(check-sat)", "(get-model)"])?;
        let (scenarios, values) = parse_model(&results)?;
        debug!(variables = scenarios.len(), "parsed solver model");
        self.result_values = values;
        Ok(scenarios)
    }

    /// Weight the states of every `uncertain` base by the density of its
    /// Normal prior at the solver's value. Results are kept as-is; bool
    /// traces stay unweighted.
    pub fn reweight(
        &self,
        mut results: IndexMap<String, Scenario>,
    ) -> SolverResult<IndexMap<String, Scenario>> {
        for (base, (mu, sigma)) in &self.uncertains {
            let Some(scenario) = results.get_mut(base) else {
                continue;
            };
            let dist = Normal::new(*mu, *sigma)?;
            match scenario {
                Scenario::Float(t) => {
                    let weights: Vec<(u32, f64)> = t
                        .results
                        .iter()
                        .map(|(i, v)| (*i, dist.pdf(*v)))
                        .collect();
                    for (i, w) in weights {
                        t.add_weight(i, w);
                    }
                }
                Scenario::Int(t) => {
                    let weights: Vec<(u32, f64)> = t
                        .results
                        .iter()
                        .map(|(i, v)| (*i, dist.pdf(*v as f64)))
                        .collect();
                    for (i, w) in weights {
                        t.add_weight(i, w);
                    }
                }
                Scenario::Bool(_) => {}
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{FloatTrace, IntTrace};

    fn checker_with_uncertain(base: &str, mu: f64, sigma: f64) -> ModelChecker {
        let mut mc = ModelChecker::new(Solver::new("unused", vec![]));
        let mut uncertains = HashMap::new();
        uncertains.insert(base.to_string(), (mu, sigma));
        mc.load_model(String::new(), uncertains, Vec::new(), HashMap::new());
        mc
    }

    #[test]
    fn reweighting_scores_float_traces_against_the_prior() {
        let mc = checker_with_uncertain("x", 10.0, 2.0);
        let mut t = FloatTrace::default();
        t.add_result(0, 10.0);
        t.add_result(1, 14.0);
        let mut results = IndexMap::new();
        results.insert("x".to_string(), Scenario::Float(t));

        let out = mc.reweight(results).unwrap();
        match &out["x"] {
            Scenario::Float(t) => {
                assert_eq!(t.results.len(), t.weights.len());
                // density peaks at the mean
                assert!(t.weights[&0] > t.weights[&1]);
                assert_eq!(t.results[&0], 10.0);
            }
            other => panic!("expected float trace, got {other:?}"),
        }
    }

    #[test]
    fn reweighting_ignores_bases_without_a_prior() {
        let mc = checker_with_uncertain("x", 0.0, 1.0);
        let mut t = IntTrace::default();
        t.add_result(0, 5);
        let mut results = IndexMap::new();
        results.insert("y".to_string(), Scenario::Int(t));

        let out = mc.reweight(results).unwrap();
        match &out["y"] {
            Scenario::Int(t) => assert!(t.weights.is_empty()),
            other => panic!("expected int trace, got {other:?}"),
        }
    }

    #[test]
    fn invalid_prior_is_an_error() {
        let mc = checker_with_uncertain("x", 0.0, 0.0);
        let mut t = FloatTrace::default();
        t.add_result(0, 1.0);
        let mut results = IndexMap::new();
        results.insert("x".to_string(), Scenario::Float(t));
        assert!(matches!(
            mc.reweight(results),
            Err(SolverError::InvalidPrior(_))
        ));
    }

    #[test]
    fn missing_config_is_fatal() {
        std::env::remove_var(SOLVER_CMD_ENV);
        std::env::remove_var(SOLVER_ARG_ENV);
        assert!(matches!(
            Solver::from_env(),
            Err(SolverError::MissingConfig("SOLVERCMD"))
        ));
    }
}
