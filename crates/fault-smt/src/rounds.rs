//! The round tracker.
//!
//! Each run-round records, in order, every (base, state-index) pair written
//! during that round. Round 0 is the initialization round and exists
//! implicitly; later rounds open when the lowering stores to the round
//! counter. A reverse index supports the assertion compiler's lookups by
//! base and by explicit state.

use std::collections::{BTreeMap, HashMap};

use crate::variables::ssa_name;
use crate::{SmtError, SmtResult};

/// One occurrence of a state in the round log: which state, in which round,
/// at which position within the round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundEntry {
    pub state: u32,
    pub round: usize,
    pub pos: usize,
}

#[derive(Debug, Default)]
pub struct RoundLog {
    rounds: Vec<Vec<(String, u32)>>,
    index: HashMap<String, Vec<RoundEntry>>,
}

impl RoundLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the next round.
    pub fn new_round(&mut self) {
        self.ensure_round_zero();
        self.rounds.push(Vec::new());
    }

    /// Record a state write in the current round.
    pub fn record(&mut self, base: &str, state: u32) {
        self.ensure_round_zero();
        let round = self.rounds.len() - 1;
        let entries = &mut self.rounds[round];
        entries.push((base.to_string(), state));
        let pos = entries.len() - 1;
        self.index
            .entry(base.to_string())
            .or_default()
            .push(RoundEntry { state, round, pos });
    }

    fn ensure_round_zero(&mut self) {
        if self.rounds.is_empty() {
            self.rounds.push(Vec::new());
        }
    }

    pub fn current_round(&self) -> usize {
        self.rounds.len().saturating_sub(1)
    }

    /// The ordered (base, state) pairs per round.
    pub fn rounds(&self) -> &[Vec<(String, u32)>] {
        &self.rounds
    }

    /// All recorded occurrences for `base`.
    pub fn entries(&self, base: &str) -> &[RoundEntry] {
        self.index.get(base).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Occurrences of `base`, narrowed to one explicit state if given. An
    /// explicit state that was never recorded is an error: the lowering
    /// records every allocated state.
    pub fn lookup(&self, base: &str, state: Option<u32>) -> SmtResult<Vec<RoundEntry>> {
        match state {
            None => Ok(self.entries(base).to_vec()),
            Some(s) => {
                let found = self.entries(base).iter().find(|e| e.state == s).copied();
                match found {
                    Some(e) => Ok(vec![e]),
                    None => Err(SmtError::MissingState {
                        base: base.to_string(),
                        state: s,
                    }),
                }
            }
        }
    }

    /// Rendered SSA names of `base` grouped by round, narrowed to one
    /// explicit state if given.
    pub fn states_by_round(
        &self,
        base: &str,
        state: Option<u32>,
    ) -> SmtResult<BTreeMap<usize, Vec<String>>> {
        let mut by_round: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for e in self.lookup(base, state)? {
            by_round
                .entry(e.round)
                .or_default()
                .push(ssa_name(base, e.state));
        }
        Ok(by_round)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_zero_exists_implicitly() {
        let mut log = RoundLog::new();
        log.record("x", 0);
        assert_eq!(log.current_round(), 0);
        assert_eq!(log.rounds().len(), 1);
    }

    #[test]
    fn rounds_partition_the_states() {
        let mut log = RoundLog::new();
        log.record("x", 0);
        log.record("x", 1);
        log.new_round();
        log.record("x", 2);
        let by_round = log.states_by_round("x", None).unwrap();
        assert_eq!(by_round[&0], vec!["x_0", "x_1"]);
        assert_eq!(by_round[&1], vec!["x_2"]);
    }

    #[test]
    fn explicit_lookup_returns_exactly_one_entry() {
        let mut log = RoundLog::new();
        log.record("x", 0);
        log.new_round();
        log.record("x", 1);
        let found = log.lookup("x", Some(1)).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].round, 1);
        assert!(matches!(
            log.lookup("x", Some(9)),
            Err(SmtError::MissingState { state: 9, .. })
        ));
    }

    #[test]
    fn reverse_index_tracks_positions() {
        let mut log = RoundLog::new();
        log.record("x", 0);
        log.record("y", 0);
        log.record("x", 1);
        let entries = log.entries("x");
        assert_eq!(entries[0].pos, 0);
        assert_eq!(entries[1].pos, 2);
    }
}
