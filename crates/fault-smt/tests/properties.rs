//! Property tests over randomly shaped stock-and-flow models.

mod common;

use std::collections::{BTreeSet, HashMap};

use common::*;
use fault_ir::Module;
use fault_smt::Generator;
use proptest::prelude::*;

/// A model with `nvars` stocks, each decremented by its own flow every
/// round. Flows in the same round share no explicit group, so they batch
/// into a parallel fork, which exercises permutations and phi capping too.
fn arb_module() -> impl Strategy<Value = (Module, usize)> {
    (1usize..=5, 1usize..=3, 1u32..=4).prop_map(|(runs, nvars, dec)| {
        let mut globals = Vec::new();
        let mut funcs = Vec::new();
        let names: Vec<String> = (0..nvars).map(|i| format!("test1_s{i}_value")).collect();
        let flow_names: Vec<String> = (0..nvars).map(|i| format!("@flow_{i}")).collect();
        for (base, fname) in names.iter().zip(&flow_names) {
            globals.push(global(base, 100.0));
            funcs.push(flow_step(fname, base, '-', dec as f64));
        }
        let callee_refs: Vec<&str> = flow_names.iter().map(String::as_str).collect();
        funcs.insert(0, run_func(runs, &callee_refs));
        (Module { globals, funcs }, runs)
    })
}

fn lower(module: &Module, runs: usize) -> Generator {
    let mut g = Generator::new();
    g.load_meta(runs as u16, HashMap::new(), vec![], vec![], vec![]);
    g.generate(module).expect("lowering failed");
    g
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// The round log records exactly the set of SSA indices ever allocated
    /// for every base.
    #[test]
    fn round_log_covers_every_allocated_state((module, runs) in arb_module()) {
        let g = lower(&module, runs);
        for (base, max) in g.variables().allocated() {
            let logged: BTreeSet<u32> =
                g.rounds().entries(base).iter().map(|e| e.state).collect();
            let expected: BTreeSet<u32> = (0..=max).collect();
            prop_assert_eq!(logged, expected, "base {}", base);
        }
    }

    /// Every identifier inside an assertion has a declaration earlier in
    /// the output.
    #[test]
    fn identifiers_are_declared_before_use((module, runs) in arb_module()) {
        let g = lower(&module, runs);
        let smt = g.smt();
        let mut declared: BTreeSet<String> = BTreeSet::new();
        for line in smt.lines() {
            if let Some(rest) = line.strip_prefix("(declare-fun ") {
                if let Some(name) = rest.split_whitespace().next() {
                    declared.insert(name.to_string());
                }
            } else if line.starts_with("(assert") {
                for tok in line.split(['(', ')', ' ']) {
                    let is_state_ident = tok
                        .rsplit_once('_')
                        .is_some_and(|(_, tail)| tail.parse::<u32>().is_ok())
                        && tok.starts_with(|c: char| c.is_ascii_alphabetic());
                    if is_state_ident {
                        prop_assert!(
                            declared.contains(tok),
                            "identifier {} used before declaration in: {}",
                            tok,
                            line
                        );
                    }
                }
            }
        }
    }

    /// Lowering the same module twice produces byte-identical SMT.
    #[test]
    fn lowering_is_deterministic((module, runs) in arb_module()) {
        let a = lower(&module, runs);
        let b = lower(&module, runs);
        prop_assert_eq!(a.smt(), b.smt());
    }

    /// Phi outputs sit strictly above every contributing state of their
    /// base.
    #[test]
    fn phi_outputs_dominate_their_sources((module, runs) in arb_module()) {
        let g = lower(&module, runs);
        for fork in g.forks() {
            for (base, choices) in fork.iter() {
                let max_end = choices.iter().map(|c| c.end()).max().unwrap_or(0);
                let (_, alloc_max) = g
                    .variables()
                    .allocated()
                    .find(|(b, _)| *b == base.as_str())
                    .expect("fork base was never allocated");
                prop_assert!(
                    alloc_max >= max_end,
                    "base {} allocated up to {} but fork ends at {}",
                    base,
                    alloc_max,
                    max_end
                );
            }
        }
    }
}
