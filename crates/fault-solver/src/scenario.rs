//! Typed traces parsed from a solver model.
//!
//! A scenario maps a variable's state indices to the values the solver
//! picked, plus an optional probability weight per state set by the
//! reweighting pass.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One variable's trace through the model, keyed by state index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Scenario {
    Float(FloatTrace),
    Int(IntTrace),
    Bool(BoolTrace),
}

impl Scenario {
    /// Number of states in the trace.
    pub fn len(&self) -> usize {
        match self {
            Scenario::Float(t) => t.results.len(),
            Scenario::Int(t) => t.results.len(),
            Scenario::Bool(t) => t.results.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FloatTrace {
    pub results: BTreeMap<u32, f64>,
    pub weights: BTreeMap<u32, f64>,
}

impl FloatTrace {
    pub fn add_result(&mut self, state: u32, value: f64) {
        self.results.insert(state, value);
    }

    pub fn add_weight(&mut self, state: u32, weight: f64) {
        self.weights.insert(state, weight);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntTrace {
    pub results: BTreeMap<u32, i64>,
    pub weights: BTreeMap<u32, f64>,
}

impl IntTrace {
    pub fn add_result(&mut self, state: u32, value: i64) {
        self.results.insert(state, value);
    }

    pub fn add_weight(&mut self, state: u32, weight: f64) {
        self.weights.insert(state, weight);
    }
}

/// Boolean traces are never reweighted: there is no Gaussian over them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoolTrace {
    pub results: BTreeMap<u32, bool>,
}

impl BoolTrace {
    pub fn add_result(&mut self, state: u32, value: bool) {
        self.results.insert(state, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_length_counts_states() {
        let mut t = FloatTrace::default();
        t.add_result(0, 10.0);
        t.add_result(1, 8.0);
        let s = Scenario::Float(t);
        assert_eq!(s.len(), 2);
        assert!(!s.is_empty());
    }

    #[test]
    fn scenarios_serialize_with_a_type_tag() {
        let mut t = IntTrace::default();
        t.add_result(0, 3);
        let json = serde_json::to_value(Scenario::Int(t)).unwrap();
        assert_eq!(json["type"], "Int");
        assert_eq!(json["results"]["0"], 3);
    }
}
