use std::collections::HashMap;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fault_ir::{
    Block, CallMeta, Constant, Func, Global, Inst, Module, Operand, Terminator, ROUND_COUNTER_VAR,
    RUN_FUNC,
};
use fault_smt::Generator;

fn stock_module(runs: usize) -> Module {
    let base = "bench_amount_value";
    let mut insts = Vec::new();
    for r in 0..runs {
        insts.push(Inst::Call {
            dst: None,
            callee: "@bench_bar".to_string(),
            args: vec![],
            meta: CallMeta {
                round: Some(r as u32 + 1),
                group: None,
            },
        });
        insts.push(Inst::Store {
            dst: ROUND_COUNTER_VAR.to_string(),
            src: Operand::Float((r + 1) as f64),
        });
    }
    Module {
        globals: vec![Global {
            name: format!("@{base}"),
            init: Constant::Float(1000.0),
        }],
        funcs: vec![
            Func {
                name: RUN_FUNC.to_string(),
                blocks: vec![Block {
                    name: "entry".to_string(),
                    insts,
                    term: Terminator::Ret,
                }],
            },
            Func {
                name: "@bench_bar".to_string(),
                blocks: vec![Block {
                    name: "entry".to_string(),
                    insts: vec![
                        Inst::Load {
                            dst: "%1".to_string(),
                            src: Operand::Var(format!("@{base}")),
                        },
                        Inst::FSub {
                            dst: "%2".to_string(),
                            x: Operand::Var("%1".to_string()),
                            y: Operand::Float(2.0),
                        },
                        Inst::Store {
                            dst: format!("@{base}"),
                            src: Operand::Var("%2".to_string()),
                        },
                    ],
                    term: Terminator::Ret,
                }],
            },
        ],
    }
}

fn bench_lowering(c: &mut Criterion) {
    let module = stock_module(100);
    c.bench_function("lower_100_round_stock", |b| {
        b.iter(|| {
            let mut g = Generator::new();
            g.load_meta(100, HashMap::new(), vec![], vec![], vec![]);
            g.generate(black_box(&module)).expect("lowering failed");
            black_box(g.smt())
        })
    });
}

criterion_group!(benches, bench_lowering);
criterion_main!(benches);
