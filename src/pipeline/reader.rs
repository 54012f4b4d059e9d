//! Read-only workbook parsing with calamine.
//!
//! Produces [`SheetGrid`]s — the typed, merge-aware grid the classification
//! stage consumes — without ever mutating the workbook. All editing goes
//! through [`crate::pipeline::reshape`] and [`crate::pipeline::writer`],
//! which operate on the xlsx bytes directly so styles survive.
//!
//! Grids are anchored at A1 regardless of where the sheet's data starts, so
//! grid row indices line up with Excel row numbers (minus one). Header-row
//! detection and write-back both rely on that alignment.

use crate::error::TbClassifyError;
use crate::grid::{Cell, CellValue, MergeRange, SheetGrid};
use crate::output::WorkbookInfo;
use calamine::{Data, Dimensions, Reader, Xlsx};
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// Parse every worksheet of an xlsx byte buffer into grids.
///
/// Merge metadata is applied (anchors get spans, continuations are hidden)
/// and fully-empty columns are hidden, matching how the sheet renders.
pub fn read_workbook(bytes: &[u8], origin: &Path) -> Result<Vec<SheetGrid>, TbClassifyError> {
    let mut workbook: Xlsx<_> =
        Xlsx::new(Cursor::new(bytes)).map_err(|e| TbClassifyError::WorkbookParse {
            path: origin.to_path_buf(),
            detail: e.to_string(),
        })?;

    workbook
        .load_merged_regions()
        .map_err(|e| TbClassifyError::WorkbookParse {
            path: origin.to_path_buf(),
            detail: format!("failed to load merged regions: {e}"),
        })?;

    let sheet_names = workbook.sheet_names().to_owned();
    if sheet_names.is_empty() {
        return Err(TbClassifyError::NoWorksheets);
    }

    let mut grids = Vec::with_capacity(sheet_names.len());
    for name in &sheet_names {
        let range = workbook
            .worksheet_range(name)
            .map_err(|e| TbClassifyError::WorkbookParse {
                path: origin.to_path_buf(),
                detail: format!("failed to read sheet '{name}': {e}"),
            })?;

        let merges = workbook
            .worksheet_merge_cells(name)
            .unwrap_or(Ok(Vec::new()))
            .unwrap_or_default();

        let mut grid = range_to_grid(name, &range);
        grid.apply_merges(merges.iter().map(dimensions_to_merge).collect());
        grid.hide_empty_columns();

        debug!(
            sheet = %name,
            rows = grid.row_count(),
            cols = grid.col_count(),
            merges = grid.merges.len(),
            "parsed worksheet"
        );
        grids.push(grid);
    }

    Ok(grids)
}

/// Workbook metadata without parsing cell contents into grids.
pub fn inspect_workbook(bytes: &[u8], origin: &Path) -> Result<WorkbookInfo, TbClassifyError> {
    let grids = read_workbook(bytes, origin)?;
    Ok(WorkbookInfo {
        sheet_names: grids.iter().map(|g| g.name.clone()).collect(),
        dimensions: grids.iter().map(|g| (g.row_count(), g.col_count())).collect(),
        merge_counts: grids.iter().map(|g| g.merges.len()).collect(),
    })
}

/// Convert a calamine range into a dense, A1-anchored grid.
///
/// The range may start below/right of A1 when the sheet has leading empty
/// rows or columns; those are materialised as empty cells so indices stay
/// absolute.
fn range_to_grid(name: &str, range: &calamine::Range<Data>) -> SheetGrid {
    let Some(end) = range.end() else {
        return SheetGrid {
            name: name.to_string(),
            rows: Vec::new(),
            merges: Vec::new(),
        };
    };

    let nrows = end.0 as usize + 1;
    let ncols = end.1 as usize + 1;

    let mut rows = vec![vec![Cell::empty(); ncols]; nrows];
    for (r, row) in rows.iter_mut().enumerate() {
        for (c, cell) in row.iter_mut().enumerate() {
            if let Some(data) = range.get_value((r as u32, c as u32)) {
                cell.value = data_to_value(data);
            }
        }
    }

    SheetGrid {
        name: name.to_string(),
        rows,
        merges: Vec::new(),
    }
}

/// Map a calamine cell to our typed value.
///
/// Dates come back as their serial number; the trial-balance columns we care
/// about are codes, descriptions and amounts, so no date formatting is
/// applied.
fn data_to_value(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::from(s.as_str()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::from(s.as_str()),
        Data::Error(_) => CellValue::Empty,
    }
}

fn dimensions_to_merge(d: &Dimensions) -> MergeRange {
    MergeRange {
        first_row: d.start.0 as usize,
        first_col: d.start.1 as usize,
        last_row: d.end.0 as usize,
        last_col: d.end.1 as usize,
    }
}
