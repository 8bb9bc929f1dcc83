//! gridflow-core - workbook built on the gridflow engine: grid layout,
//! TOML configuration and live data feeds.

pub mod config;
pub mod error;
pub mod feeds;
pub mod layout;
pub mod workbook;

pub use config::{Config, EditPolicy, load_config};
pub use error::{GridflowError, Result};
pub use layout::GridLayout;
pub use workbook::Workbook;

pub use gridflow_engine::{CellId, Engine};
