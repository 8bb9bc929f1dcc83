//! Error types for the gridflow engine.

use thiserror::Error;

use crate::engine::CellId;

/// Errors returned by engine operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The operation named a cell the engine never created. Nothing was changed.
    #[error("unknown cell {0}")]
    UnknownCell(CellId),

    /// Binding would make a cell depend on itself. Nothing was changed.
    #[error("circular dependency for {target}: {}", format_path(.path))]
    Cycle { target: CellId, path: Vec<CellId> },

    /// A formula failed mid-round. `cell` and the `unsettled` cells after it
    /// kept their pre-round values.
    #[error("formula for {cell} failed in round {round}: {message} ({unsettled} cells left unsettled)")]
    FormulaEvaluation {
        cell: CellId,
        round: u64,
        message: String,
        unsettled: usize,
    },
}

fn format_path(path: &[CellId]) -> String {
    path.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

pub type Result<T> = std::result::Result<T, EngineError>;
