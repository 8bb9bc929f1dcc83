//! The reactive engine: owns cells, formula bindings and propagation.

use dashmap::DashMap;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use super::cell::{Cell, CellView, SubscriptionId};
use super::cell_id::CellId;
use super::formula::Formula;
use super::graph::DepGraph;
use super::recalc::RoundReport;
use crate::error::{EngineError, Result};

/// Thread-safe cell storage. Lookups never wait on a propagation round.
pub type Grid = DashMap<CellId, Arc<Cell>>;

/// Everything a round reads or writes besides cell values.
#[derive(Default)]
struct GraphState {
    graph: DepGraph,
    formulas: FxHashMap<CellId, Formula>,
    next_id: u32,
    round: u64,
}

/// Reactive grid of numeric cells.
///
/// All binding changes and every propagation round run inside one exclusive
/// section, so rounds never interleave and calls made in order from one
/// thread take effect in that order. Single-cell reads do not take that lock.
///
/// Cell subscribers are called from inside that section. They may use the
/// lock-free readers ([`Engine::value`], [`Engine::cell`],
/// [`Engine::has_formula`], [`Engine::snapshot`], [`Engine::contains`]) and
/// subscribe or unsubscribe, but must not call [`Engine::formula_inputs`] or
/// any mutating method: those take the same lock and would deadlock.
pub struct Engine {
    cells: Grid,
    state: Mutex<GraphState>,
}

impl Engine {
    /// Create an engine holding `count` independent cells seeded with `seed`.
    pub fn new(count: usize, seed: f64) -> Engine {
        Engine::with_seeds(std::iter::repeat_n(seed, count))
    }

    /// Create an engine with one independent cell per seed value.
    pub fn with_seeds<I>(seeds: I) -> Engine
    where
        I: IntoIterator<Item = f64>,
    {
        let engine = Engine {
            cells: DashMap::new(),
            state: Mutex::new(GraphState::default()),
        };
        {
            let mut state = engine.state.lock();
            for seed in seeds {
                engine.push_cell(&mut state, seed);
            }
        }
        engine
    }

    /// Append `count` independent cells seeded with `seed`; returns their ids.
    pub fn create_cells(&self, count: usize, seed: f64) -> Vec<CellId> {
        let mut state = self.state.lock();
        (0..count).map(|_| self.push_cell(&mut state, seed)).collect()
    }

    fn push_cell(&self, state: &mut GraphState, seed: f64) -> CellId {
        let id = CellId::new(state.next_id);
        state.next_id += 1;
        self.cells.insert(id, Arc::new(Cell::new(id, seed)));
        id
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn contains(&self, id: CellId) -> bool {
        self.cells.contains_key(&id)
    }

    pub fn cell(&self, id: CellId) -> Result<Arc<Cell>> {
        self.cells
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(EngineError::UnknownCell(id))
    }

    pub fn value(&self, id: CellId) -> Result<f64> {
        Ok(self.cell(id)?.read())
    }

    pub fn has_formula(&self, id: CellId) -> Result<bool> {
        Ok(self.cell(id)?.has_formula())
    }

    /// Ordered inputs of the formula bound to `id`, if any.
    ///
    /// Takes the engine lock; not callable from a subscriber.
    pub fn formula_inputs(&self, id: CellId) -> Result<Option<Vec<CellId>>> {
        self.cell(id)?;
        let state = self.state.lock();
        Ok(state.formulas.get(&id).map(|f| f.inputs().to_vec()))
    }

    /// Every cell in id order, for display layers.
    pub fn snapshot(&self) -> Vec<CellView> {
        let mut views: Vec<CellView> = self.cells.iter().map(|entry| entry.value().view()).collect();
        views.sort_by_key(|view| view.id);
        views
    }

    pub fn subscribe<F>(&self, id: CellId, callback: F) -> Result<SubscriptionId>
    where
        F: Fn(CellId, f64) + Send + Sync + 'static,
    {
        Ok(self.cell(id)?.subscribe(callback))
    }

    /// Attach or replace the formula of `target`, then recompute it and
    /// everything downstream.
    ///
    /// Unknown ids and loops are rejected before anything changes. If the
    /// formula itself fails during the recompute the binding stays in place
    /// and the evaluation error is returned.
    pub fn bind_formula(&self, target: CellId, formula: Formula) -> Result<RoundReport> {
        let mut state = self.state.lock();
        let target_cell = self.cell(target)?;
        for input in formula.inputs() {
            self.cell(*input)?;
        }

        if let Some(path) = state.graph.would_create_cycle(target, formula.inputs()) {
            debug!("rejecting formula for {}: would close a loop", target);
            return Err(EngineError::Cycle { target, path });
        }

        state.graph.replace_edges(target, formula.inputs());
        state.formulas.insert(target, formula);
        target_cell.set_has_formula(true);

        self.propagate(&mut state, target, true)
    }

    /// Detach the formula of `target`, keeping its current value.
    ///
    /// Returns whether a formula was bound.
    pub fn unbind_formula(&self, target: CellId) -> Result<bool> {
        let mut state = self.state.lock();
        let target_cell = self.cell(target)?;
        let existed = state.formulas.remove(&target).is_some();
        state.graph.replace_edges(target, &[]);
        target_cell.set_has_formula(false);
        Ok(existed)
    }

    /// Write `value` into `id` and bring every dependent up to date.
    ///
    /// Writing a cell that has a formula is allowed; its value lasts until one
    /// of its inputs changes.
    pub fn update_independent_cell(&self, id: CellId, value: f64) -> Result<RoundReport> {
        let mut state = self.state.lock();
        let cell = self.cell(id)?;
        cell.write(value);
        self.propagate(&mut state, id, false)
    }

    /// Add `delta` to the value of `id` and propagate.
    ///
    /// The read and the write happen in the same exclusive section, so
    /// concurrent increments are never lost.
    pub fn increment_cell(&self, id: CellId, delta: f64) -> Result<RoundReport> {
        let mut state = self.state.lock();
        let cell = self.cell(id)?;
        cell.write(cell.read() + delta);
        self.propagate(&mut state, id, false)
    }

    /// Recompute the transitive dependents of `origin` in dependency order.
    ///
    /// On the first failing formula the round stops: the failing cell and
    /// every cell after it keep their pre-round values.
    fn propagate(
        &self,
        state: &mut GraphState,
        origin: CellId,
        include_origin: bool,
    ) -> Result<RoundReport> {
        let started = Instant::now();
        state.round += 1;
        let round = state.round;

        let downstream = state
            .graph
            .affected_order(origin)
            .map_err(|path| EngineError::Cycle {
                target: origin,
                path,
            })?;
        let mut order = Vec::with_capacity(downstream.len() + 1);
        if include_origin {
            order.push(origin);
        }
        order.extend(downstream);

        for (position, &id) in order.iter().enumerate() {
            let Some(formula) = state.formulas.get(&id) else {
                continue;
            };
            let values: Vec<f64> = formula
                .inputs()
                .iter()
                .map(|input| self.cell(*input).map(|c| c.read()))
                .collect::<Result<_>>()?;
            let cell = self.cell(id)?;

            match formula.evaluate(&values) {
                Ok(value) => cell.write(value),
                Err(err) => {
                    let unsettled = order.len() - position - 1;
                    warn!(
                        "round {} aborted at {}: {} ({} cells left unsettled)",
                        round, id, err, unsettled
                    );
                    return Err(EngineError::FormulaEvaluation {
                        cell: id,
                        round,
                        message: err.message,
                        unsettled,
                    });
                }
            }
        }

        let report = RoundReport {
            round,
            origin,
            recomputed: order,
            duration: started.elapsed(),
        };
        debug!("{}", report.log_line());
        Ok(report)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new(0, 0.0)
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("cells", &self.cells.len())
            .finish_non_exhaustive()
    }
}
