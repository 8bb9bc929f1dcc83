use gridflow_engine::{CellId, engine::RoundReport};
use tracing::debug;

use super::Workbook;
use crate::config::EditPolicy;
use crate::error::{GridflowError, Result};

impl Workbook {
    /// Set a cell from the display layer.
    pub fn edit(&self, id: CellId, value: f64) -> Result<RoundReport> {
        self.check_editable(id)?;
        let report = self.engine.update_independent_cell(id, value)?;
        debug!("edit {} = {}: {}", self.label(id), value, report.log_line());
        Ok(report)
    }

    /// Bump a cell by one, as a tap on it does.
    pub fn click(&self, id: CellId) -> Result<RoundReport> {
        self.check_editable(id)?;
        let report = self.engine.increment_cell(id, 1.0)?;
        debug!("click {}: {}", self.label(id), report.log_line());
        Ok(report)
    }

    /// Whether the current policy lets the display layer change `id`.
    pub fn is_editable(&self, id: CellId) -> bool {
        self.check_editable(id).is_ok()
    }

    fn check_editable(&self, id: CellId) -> Result<()> {
        if !self.layout.contains(id) {
            return Err(GridflowError::OutOfGrid(id));
        }
        if self.policy == EditPolicy::Locked && self.engine.has_formula(id)? {
            return Err(GridflowError::DerivedCell(id));
        }
        Ok(())
    }
}
