//! The workbook ties a configured engine to its grid layout, edit policy and
//! live feeds.

mod feeds;
mod ops;
mod render;
mod state;

pub use render::format_value;
pub use state::{MAX_CELLS, Workbook};
