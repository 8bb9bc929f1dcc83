//! Observable numeric cells.
//!
//! A [`Cell`] owns exactly one value. Only the engine writes it, through one
//! path, and every write notifies every subscriber once, whether or not the
//! value actually changed. Outside the crate a cell is read-only:
//!
//! ```compile_fail
//! use gridflow_engine::{CellId, Engine};
//!
//! let engine = Engine::new(1, 0.0);
//! engine.cell(CellId::new(0)).unwrap().write(5.0);
//! ```

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::cell_id::CellId;

/// Callback invoked after a write with the cell id and the value just stored.
pub type Subscriber = Arc<dyn Fn(CellId, f64) + Send + Sync>;

/// Handle returned by [`Cell::subscribe`], used to unsubscribe.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct SubscriptionId(u64);

/// A numeric cell.
///
/// The value is kept as the bit pattern of an `f64` so reads never wait on a
/// propagation round that is writing other cells.
pub struct Cell {
    id: CellId,
    bits: AtomicU64,
    /// Set by the engine while a formula is bound to this cell.
    derived: AtomicBool,
    subscribers: Mutex<Vec<(SubscriptionId, Subscriber)>>,
    next_subscription: AtomicU64,
}

impl Cell {
    pub fn new(id: CellId, value: f64) -> Cell {
        Cell {
            id,
            bits: AtomicU64::new(value.to_bits()),
            derived: AtomicBool::new(false),
            subscribers: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> CellId {
        self.id
    }

    /// Current value. No side effects.
    pub fn read(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Store `value` and notify subscribers. Callers hold the engine lock and
    /// propagate afterwards.
    pub(crate) fn write(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Release);

        // Snapshot so a callback may (un)subscribe without deadlocking.
        let subscribers: Vec<Subscriber> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, s)| Arc::clone(s))
            .collect();
        for subscriber in subscribers {
            subscriber(self.id, value);
        }
    }

    /// Register a callback run after every subsequent write.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(CellId, f64) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push((id, Arc::new(callback)));
        id
    }

    /// Remove a subscription. Returns false if it was not registered.
    pub fn unsubscribe(&self, subscription: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(id, _)| *id != subscription);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Whether a formula is currently bound to this cell.
    pub fn has_formula(&self) -> bool {
        self.derived.load(Ordering::Acquire)
    }

    pub(crate) fn set_has_formula(&self, derived: bool) {
        self.derived.store(derived, Ordering::Release);
    }

    pub fn view(&self) -> CellView {
        CellView {
            id: self.id,
            value: self.read(),
            has_formula: self.has_formula(),
        }
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("id", &self.id)
            .field("value", &self.read())
            .field("has_formula", &self.has_formula())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Read-only view of a cell for display layers.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct CellView {
    pub id: CellId,
    pub value: f64,
    pub has_formula: bool,
}
