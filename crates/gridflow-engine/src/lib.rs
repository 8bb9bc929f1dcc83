//! gridflow_engine - Reactive dependency-graph engine for numeric cells.

pub mod engine;
pub mod error;

pub use engine::{CellId, Engine, Formula, Op};
pub use error::{EngineError, Result};
