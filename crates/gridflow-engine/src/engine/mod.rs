//! Reactive cell engine API.
//!
//! - [`Cell`], [`CellView`] - Observable numeric storage
//! - [`CellId`] - Stable cell identity
//! - [`Formula`], [`Op`] - Computations bound to derived cells
//! - [`DepGraph`] - Precedent/dependent edges, cycle checks, recompute order
//! - [`Engine`] - Owns the cells and runs propagation rounds
//! - [`RoundReport`] - What a round recomputed

mod cell;
mod cell_id;
mod formula;
mod graph;
mod recalc;
mod sheet;

pub use cell::{Cell, CellView, Subscriber, SubscriptionId};
pub use cell_id::CellId;
pub use formula::{Formula, FormulaError, Op};
pub use graph::DepGraph;
pub use recalc::RoundReport;
pub use sheet::{Engine, Grid};
