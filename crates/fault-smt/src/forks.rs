//! Fork bookkeeping for conditional and parallel splits.
//!
//! A fork records, per variable base, which branches wrote it and the state
//! indices those writes produced. The join inspects the fork to cap each
//! touched base with a phi value and to patch branches that left a base
//! untouched.

use indexmap::IndexMap;

/// The states one branch of a fork drove one base through. Consecutive
/// writes to the same base in the same branch extend `values`, so the values
/// are contiguous in the base's SSA timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub base: String,
    pub branch: String,
    pub values: Vec<u32>,
}

impl Choice {
    pub fn new(base: impl Into<String>, n: u32, branch: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            branch: branch.into(),
            values: vec![n],
        }
    }

    pub fn add_value(&mut self, n: u32) {
        self.values.push(n);
    }

    /// The branch's terminal state for this base.
    pub fn end(&self) -> u32 {
        self.values.iter().copied().max().unwrap_or(0)
    }
}

/// One conditional or parallel split. Insertion-ordered so the join emits
/// deterministic output.
#[derive(Debug, Clone, Default)]
pub struct Fork {
    choices: IndexMap<String, Vec<Choice>>,
}

impl Fork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_mut(&mut self, base: &str) -> Option<&mut Vec<Choice>> {
        self.choices.get_mut(base)
    }

    pub fn insert(&mut self, base: impl Into<String>, choice: Choice) {
        self.choices.entry(base.into()).or_default().push(choice);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<Choice>)> {
        self.choices.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.choices.is_empty()
    }
}

/// Conditional/parallel nesting depth. Reads as a boolean almost everywhere,
/// but the parallel join needs the exact level, so it stays a counter.
#[derive(Debug, Default)]
pub struct PhiState {
    level: u32,
}

impl PhiState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&mut self) {
        self.level += 1;
    }

    pub fn exit(&mut self) {
        self.level = self.level.saturating_sub(1);
    }

    pub fn check(&self) -> bool {
        self.level > 0
    }

    pub fn level(&self) -> u32 {
        self.level
    }
}
