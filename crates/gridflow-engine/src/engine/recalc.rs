//! Propagation round reporting.

use std::time::Duration;

use super::cell_id::CellId;

/// Outcome of one successful propagation round.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundReport {
    /// Monotonic round counter, starting at 1 for the first round.
    pub round: u64,
    /// The cell whose change started the round.
    pub origin: CellId,
    /// Cells recomputed, in the order they were evaluated.
    pub recomputed: Vec<CellId>,
    pub duration: Duration,
}

impl RoundReport {
    pub fn cells_recomputed(&self) -> usize {
        self.recomputed.len()
    }

    /// One-line summary for logs.
    ///
    /// Format: `[round 12] origin=#0  3 cells  41µs`
    pub fn log_line(&self) -> String {
        format!(
            "[round {}] origin={}  {} cells  {}µs",
            self.round,
            self.origin,
            self.recomputed.len(),
            self.duration.as_micros()
        )
    }
}
