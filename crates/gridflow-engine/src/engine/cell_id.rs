//! Cell identity.
//!
//! A `CellId` is handed out by the engine when a cell is created and is never
//! reused for the lifetime of that engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a cell within one engine.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellId(u32);

impl CellId {
    #[inline]
    pub const fn new(raw: u32) -> CellId {
        CellId(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Position of the cell in creation order.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for CellId {
    fn from(raw: u32) -> Self {
        CellId(raw)
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
