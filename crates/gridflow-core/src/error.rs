//! Error types for Gridflow core.

use thiserror::Error;

use gridflow_engine::engine::FormulaError;
use gridflow_engine::{CellId, EngineError};

use crate::feeds::FeedError;

/// Errors that can occur while configuring or operating a workbook
#[derive(Error, Debug)]
pub enum GridflowError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Invalid formula for {target}: {source}")]
    Formula {
        target: CellId,
        #[source]
        source: FormulaError,
    },

    #[error("Cell {0} is outside the grid")]
    OutOfGrid(CellId),

    #[error("'{0}' is not a cell on this grid")]
    UnknownCellName(String),

    #[error("Cell {0} is computed from a formula and cannot be edited")]
    DerivedCell(CellId),

    #[error("No feed named '{0}'")]
    UnknownFeed(String),

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Feeds need a running tokio runtime")]
    NoRuntime,
}

pub type Result<T> = std::result::Result<T, GridflowError>;
