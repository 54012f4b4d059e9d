//! In-memory grid model for worksheet data.
//!
//! [`SheetGrid`] is the exchange format between the spreadsheet reader and
//! the classification stage: a dense, 0-indexed matrix of typed cells plus
//! merge metadata. Only the top-left cell of a merged region carries a
//! value; the remaining cells are marked hidden so entry serialisation and
//! JSON output skip them, the same way a rendered table would.

use serde::{Deserialize, Serialize};

/// A typed cell value.
///
/// The reader preserves the source cell type rather than flattening
/// everything to strings, so numeric columns (debit/credit amounts) stay
/// numeric all the way to JSON output.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl CellValue {
    /// True for `Empty` and for whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Render the value the way it would appear in a cell.
    pub fn to_display(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{n}")
                }
            }
            CellValue::Bool(b) => {
                if *b {
                    "TRUE".to_string()
                } else {
                    "FALSE".to_string()
                }
            }
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        if s.trim().is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(s.to_string())
        }
    }
}

/// One cell of a [`SheetGrid`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cell {
    pub value: CellValue,
    /// Rows this cell spans (≥ 2 only for merge anchors).
    #[serde(default = "one", skip_serializing_if = "is_one")]
    pub row_span: usize,
    /// Columns this cell spans (≥ 2 only for merge anchors).
    #[serde(default = "one", skip_serializing_if = "is_one")]
    pub col_span: usize,
    /// Hidden cells are merge continuations or members of fully-empty
    /// columns; they carry no visible value.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hidden: bool,
}

fn one() -> usize {
    1
}
#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_one(n: &usize) -> bool {
    *n == 1
}

impl Cell {
    pub fn text(s: impl Into<String>) -> Self {
        Cell {
            value: CellValue::Text(s.into()),
            row_span: 1,
            col_span: 1,
            hidden: false,
        }
    }

    pub fn empty() -> Self {
        Cell {
            row_span: 1,
            col_span: 1,
            ..Default::default()
        }
    }
}

/// A merged region, 0-indexed and inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRange {
    pub first_row: usize,
    pub first_col: usize,
    pub last_row: usize,
    pub last_col: usize,
}

/// A parsed worksheet: name, dense cell matrix, merge metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SheetGrid {
    pub name: String,
    /// Row-major cells; every row has the same length.
    pub rows: Vec<Vec<Cell>>,
    pub merges: Vec<MergeRange>,
}

impl SheetGrid {
    /// Build a grid from plain text rows (tests and extraction output).
    pub fn from_text_rows(name: impl Into<String>, rows: Vec<Vec<String>>) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        let rows = rows
            .into_iter()
            .map(|r| {
                let mut cells: Vec<Cell> = r
                    .iter()
                    .map(|s| Cell {
                        value: CellValue::from(s.as_str()),
                        ..Cell::empty()
                    })
                    .collect();
                cells.resize_with(width, Cell::empty);
                cells
            })
            .collect();
        SheetGrid {
            name: name.into(),
            rows,
            merges: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn col_count(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    /// True when no cell in the grid carries a visible non-blank value.
    pub fn is_blank(&self) -> bool {
        self.rows
            .iter()
            .flatten()
            .all(|c| c.hidden || c.value.is_blank())
    }

    /// Apply merge metadata: set spans on anchors, hide continuations.
    ///
    /// Out-of-bounds regions are clamped; zero-area regions are ignored.
    pub fn apply_merges(&mut self, merges: Vec<MergeRange>) {
        let (nrows, ncols) = (self.row_count(), self.col_count());
        for m in &merges {
            if m.first_row >= nrows || m.first_col >= ncols {
                continue;
            }
            let last_row = m.last_row.min(nrows.saturating_sub(1));
            let last_col = m.last_col.min(ncols.saturating_sub(1));

            self.rows[m.first_row][m.first_col].row_span = last_row - m.first_row + 1;
            self.rows[m.first_row][m.first_col].col_span = last_col - m.first_col + 1;

            for r in m.first_row..=last_row {
                for c in m.first_col..=last_col {
                    if r != m.first_row || c != m.first_col {
                        self.rows[r][c].hidden = true;
                    }
                }
            }
        }
        self.merges = merges;
    }

    /// Hide every cell of columns that contain no visible value.
    ///
    /// Mirrors how the source data hides decorative spacer columns from the
    /// classification input.
    pub fn hide_empty_columns(&mut self) {
        let ncols = self.col_count();
        let mut non_empty = vec![false; ncols];
        for row in &self.rows {
            for (c, cell) in row.iter().enumerate() {
                if !cell.value.is_blank() {
                    non_empty[c] = true;
                }
            }
        }
        for row in &mut self.rows {
            for (c, cell) in row.iter_mut().enumerate() {
                if !non_empty[c] {
                    cell.hidden = true;
                }
            }
        }
    }

    /// Visible, non-blank values of a row in column order.
    pub fn visible_values(&self, row: usize) -> Vec<String> {
        self.rows
            .get(row)
            .map(|r| {
                r.iter()
                    .filter(|c| !c.hidden && !c.value.is_blank())
                    .map(|c| c.value.to_display())
                    .collect()
            })
            .unwrap_or_default()
    }
}
