//! Row-major grid addressing.
//!
//! Cells are created in one batch of `cols * rows` and laid out row by row,
//! so id `n` sits at row `n / cols`, column `n % cols`. Positions can also be
//! written in spreadsheet notation (`A1` is id 0, `B1` is id 1).
//!
//! ```ignore
//! let layout = GridLayout::new(6, 10);
//! assert_eq!(layout.id_at(1, 0), Some(CellId::new(6)));
//! assert_eq!(layout.label(CellId::new(7)).unwrap(), "B2");
//! ```

use gridflow_engine::CellId;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridLayout {
    pub cols: usize,
    pub rows: usize,
}

impl GridLayout {
    pub fn new(cols: usize, rows: usize) -> GridLayout {
        GridLayout { cols, rows }
    }

    /// `cols * rows`, or `None` if that overflows.
    pub fn cell_count(&self) -> Option<usize> {
        self.cols.checked_mul(self.rows)
    }

    pub fn contains(&self, id: CellId) -> bool {
        self.cell_count().is_some_and(|count| id.index() < count)
    }

    pub fn id_at(&self, row: usize, col: usize) -> Option<CellId> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        let index = row.checked_mul(self.cols)?.checked_add(col)?;
        u32::try_from(index).ok().map(CellId::new)
    }

    /// (row, col) of a cell, both 0-indexed.
    pub fn position(&self, id: CellId) -> Option<(usize, usize)> {
        if !self.contains(id) {
            return None;
        }
        Some((id.index() / self.cols, id.index() % self.cols))
    }

    /// Spreadsheet-style label, e.g. `C4`.
    pub fn label(&self, id: CellId) -> Option<String> {
        let (row, col) = self.position(id)?;
        Some(format!("{}{}", col_to_letters(col), row + 1))
    }

    /// Parse `A1`-style labels, `#7` or a bare index into a cell id on this grid.
    pub fn parse_cell(&self, text: &str) -> Option<CellId> {
        let text = text.trim();
        let digits = text.strip_prefix('#').unwrap_or(text);
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            let id = CellId::new(digits.parse::<u32>().ok()?);
            return self.contains(id).then_some(id);
        }

        let caps = a1_re().captures(text)?;
        let mut col_acc = 0usize;
        for c in caps["letters"].to_ascii_uppercase().bytes() {
            let digit = (c - b'A') as usize + 1;
            col_acc = col_acc.checked_mul(26)?.checked_add(digit)?;
        }
        let col = col_acc.checked_sub(1)?;
        let row = caps["numbers"].parse::<usize>().ok()?.checked_sub(1)?;
        self.id_at(row, col)
    }
}

fn a1_re() -> &'static Regex {
    static A1_RE: OnceLock<Regex> = OnceLock::new();
    A1_RE.get_or_init(|| {
        Regex::new(r"^(?<letters>[A-Za-z]+)(?<numbers>[0-9]+)$")
            .expect("cell label regex must compile")
    })
}

/// Convert column index to letters (0 -> A, 25 -> Z, 26 -> AA).
pub fn col_to_letters(col: usize) -> String {
    let mut result = String::new();
    let mut n = col as u128 + 1;
    while n > 0 {
        n -= 1;
        result.insert(0, (b'A' + (n % 26) as u8) as char);
        n /= 26;
    }
    result
}
