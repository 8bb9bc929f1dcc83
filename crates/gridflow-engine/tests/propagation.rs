//! End-to-end propagation behaviour of the engine.

use gridflow_engine::engine::{CellId, Engine, Formula, Op};
use gridflow_engine::EngineError;
use proptest::prelude::*;
use proptest::sample::Index;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

fn c(raw: u32) -> CellId {
    CellId::new(raw)
}

/// A = 0, B = 2 * A, C = B + 1.
fn chain() -> Engine {
    let engine = Engine::new(3, 0.0);
    engine
        .bind_formula(c(1), Formula::new(vec![c(0)], |v| 2.0 * v[0]))
        .unwrap();
    engine
        .bind_formula(c(2), Formula::new(vec![c(1)], |v| v[0] + 1.0))
        .unwrap();
    engine
}

#[test]
fn test_sum_of_two_cells() {
    let engine = Engine::new(4, 1.0);
    engine
        .bind_formula(c(3), Op::Sum.formula(vec![c(0), c(1)]).unwrap())
        .unwrap();

    engine.update_independent_cell(c(0), 5.0).unwrap();

    assert_eq!(engine.value(c(3)).unwrap(), 6.0);
    assert_eq!(engine.value(c(1)).unwrap(), 1.0);
    assert_eq!(engine.value(c(2)).unwrap(), 1.0);
}

#[test]
fn test_chain_depth_two() {
    let engine = chain();

    let report = engine.update_independent_cell(c(0), 3.0).unwrap();

    assert_eq!(engine.value(c(1)).unwrap(), 6.0);
    assert_eq!(engine.value(c(2)).unwrap(), 7.0);
    assert_eq!(report.recomputed, vec![c(1), c(2)]);
}

#[test]
fn test_cycle_through_chain_rejected() {
    let engine = chain();
    engine.update_independent_cell(c(0), 3.0).unwrap();
    let before: Vec<f64> = (0..3).map(|i| engine.value(c(i)).unwrap()).collect();

    let err = engine
        .bind_formula(c(0), Formula::new(vec![c(2)], |v| v[0]))
        .unwrap_err();

    assert_eq!(
        err,
        EngineError::Cycle {
            target: c(0),
            path: vec![c(0), c(1), c(2), c(0)],
        }
    );
    let after: Vec<f64> = (0..3).map(|i| engine.value(c(i)).unwrap()).collect();
    assert_eq!(before, after);
    assert!(!engine.has_formula(c(0)).unwrap());
    assert_eq!(engine.formula_inputs(c(1)).unwrap(), Some(vec![c(0)]));
}

#[test]
fn test_two_cell_cycle_keeps_existing_formulas() {
    let engine = Engine::new(2, 1.0);
    engine
        .bind_formula(c(1), Op::Scale(3.0).formula(vec![c(0)]).unwrap())
        .unwrap();

    let result = engine.bind_formula(c(0), Op::Sum.formula(vec![c(1)]).unwrap());

    assert!(matches!(result, Err(EngineError::Cycle { .. })));
    assert_eq!(engine.formula_inputs(c(0)).unwrap(), None);
    assert_eq!(engine.formula_inputs(c(1)).unwrap(), Some(vec![c(0)]));
    assert_eq!(engine.value(c(0)).unwrap(), 1.0);
    assert_eq!(engine.value(c(1)).unwrap(), 3.0);
}

#[test]
fn test_rebinding_same_formula_is_idempotent() {
    let once = chain();
    let twice = chain();
    twice
        .bind_formula(c(2), Formula::new(vec![c(1)], |v| v[0] + 1.0))
        .unwrap();

    for engine in [&once, &twice] {
        engine.update_independent_cell(c(0), 4.0).unwrap();
    }
    assert_eq!(once.snapshot(), twice.snapshot());
}

#[test]
fn test_concurrent_increments_are_not_lost() {
    let engine = Arc::new(Engine::new(2, 0.0));
    engine
        .bind_formula(c(1), Op::Scale(2.0).formula(vec![c(0)]).unwrap())
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for _ in 0..250 {
                    engine.increment_cell(c(0), 1.0).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(engine.value(c(0)).unwrap(), 2000.0);
    assert_eq!(engine.value(c(1)).unwrap(), 4000.0);
}

#[test]
fn test_cell_handles_only_observe_settled_values() {
    let engine = Engine::new(2, 1.0);
    engine
        .bind_formula(c(1), Op::Scale(2.0).formula(vec![c(0)]).unwrap())
        .unwrap();
    let input = engine.cell(c(0)).unwrap();
    let derived = engine.cell(c(1)).unwrap();

    // Writes go through the engine only; handles see the settled result.
    engine.update_independent_cell(c(0), 5.0).unwrap();

    assert_eq!(input.read(), 5.0);
    assert_eq!(derived.read(), 10.0);
    assert!(derived.has_formula());
    assert!(!input.has_formula());
}

#[test]
fn test_updates_from_one_thread_apply_in_order() {
    let engine = chain();
    for v in [1.0, 2.0, 3.0] {
        engine.update_independent_cell(c(0), v).unwrap();
    }
    assert_eq!(engine.value(c(2)).unwrap(), 7.0);
}

/// Random DAG: cell `i` may read any cells below it, so ids are a valid
/// topological order. Cell 0 is always independent.
#[derive(Debug, Clone)]
struct Layout {
    inputs: Vec<Option<Vec<usize>>>,
}

fn layout_strategy() -> impl Strategy<Value = Layout> {
    prop::collection::vec(
        (any::<bool>(), prop::collection::vec(any::<Index>(), 1..4)),
        2..12,
    )
    .prop_map(|raw| {
        let inputs = raw
            .into_iter()
            .enumerate()
            .map(|(i, (derived, picks))| {
                (i > 0 && derived).then(|| picks.iter().map(|p| p.index(i)).collect::<Vec<usize>>())
            })
            .collect();
        Layout { inputs }
    })
}

fn build(layout: &Layout) -> Engine {
    let engine = Engine::new(layout.inputs.len(), 1.0);
    for (i, inputs) in layout.inputs.iter().enumerate() {
        if let Some(inputs) = inputs {
            let ids: Vec<CellId> = inputs.iter().map(|&j| c(j as u32)).collect();
            engine
                .bind_formula(c(i as u32), Op::Sum.formula(ids).unwrap())
                .unwrap();
        }
    }
    engine
}

fn reachable_from(layout: &Layout, origin: usize) -> HashSet<usize> {
    let mut reached = HashSet::new();
    reached.insert(origin);
    // Inputs always have smaller ids, so one ascending pass suffices.
    for (i, inputs) in layout.inputs.iter().enumerate() {
        if let Some(inputs) = inputs
            && inputs.iter().any(|j| reached.contains(j))
        {
            reached.insert(i);
        }
    }
    reached
}

proptest! {
    #[test]
    fn prop_every_derived_cell_is_settled(
        layout in layout_strategy(),
        updates in prop::collection::vec((any::<Index>(), -100.0f64..100.0), 1..8),
    ) {
        let engine = build(&layout);
        let independent: Vec<usize> = layout
            .inputs
            .iter()
            .enumerate()
            .filter(|(_, inputs)| inputs.is_none())
            .map(|(i, _)| i)
            .collect();

        for (pick, value) in updates {
            let id = independent[pick.index(independent.len())];
            engine.update_independent_cell(c(id as u32), value).unwrap();

            for (i, inputs) in layout.inputs.iter().enumerate() {
                if let Some(inputs) = inputs {
                    let values: Vec<f64> = inputs
                        .iter()
                        .map(|&j| engine.value(c(j as u32)).unwrap())
                        .collect();
                    prop_assert_eq!(engine.value(c(i as u32)).unwrap(), Op::Sum.apply(&values));
                }
            }
        }
    }

    #[test]
    fn prop_unreachable_cells_keep_exact_bits(
        layout in layout_strategy(),
        pick in any::<Index>(),
        value in -100.0f64..100.0,
    ) {
        let engine = build(&layout);
        let independent: Vec<usize> = layout
            .inputs
            .iter()
            .enumerate()
            .filter(|(_, inputs)| inputs.is_none())
            .map(|(i, _)| i)
            .collect();
        let origin = independent[pick.index(independent.len())];
        let before = engine.snapshot();

        engine.update_independent_cell(c(origin as u32), value).unwrap();

        let reached = reachable_from(&layout, origin);
        for view in before {
            if !reached.contains(&view.id.index()) {
                let now = engine.value(view.id).unwrap();
                prop_assert_eq!(now.to_bits(), view.value.to_bits());
            }
        }
    }
}
