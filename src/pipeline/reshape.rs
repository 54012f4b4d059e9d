//! In-place reshape of a trial-balance workbook into the canonical layout.
//!
//! The transform edits the workbook itself (via umya-spreadsheet) rather than
//! rebuilding from a grid so cell styles travel with their cells. Per sheet:
//!
//! 1. find the header row by keyword match, delete every row above it;
//! 2. rename legacy headers (`Account` → `Account Description`, the
//!    year-to-date debit/credit variants → `Debit Amount`/`Credit Amount`);
//! 3. move recognised columns into canonical positions 1–8, creating the
//!    classification columns blank when the source lacks them, and append
//!    unrecognised non-empty columns after column 8 in source order;
//! 4. drop fully-blank rows bottom-to-top.
//!
//! The transform is idempotent: on an already-canonical sheet the header
//! matches row 1, every canonical column is found in place, and nothing
//! changes.

use crate::config::ClassifyConfig;
use crate::error::TbClassifyError;
use std::io::Cursor;
use tracing::{debug, info};
use umya_spreadsheet::{reader, writer, Spreadsheet, Style, Worksheet};

/// Canonical headers in column order (Excel columns 1–8).
pub const CANONICAL_HEADERS: [&str; 8] = [
    "Account Code",
    "Account Description",
    "Debit Amount",
    "Credit Amount",
    "Account Type",
    "Primary Classification",
    "Secondary Classification",
    "Tertiary Classification",
];

/// Reshape every worksheet of the workbook bytes.
///
/// Returns the re-serialised workbook and, per sheet, the 0-based index of
/// the header row that was found in the *source* layout.
pub fn reshape_workbook(
    bytes: &[u8],
    config: &ClassifyConfig,
) -> Result<(Vec<u8>, Vec<(String, usize)>), TbClassifyError> {
    let mut book = parse(bytes)?;

    let sheet_count = book.get_sheet_count();
    if sheet_count == 0 {
        return Err(TbClassifyError::NoWorksheets);
    }

    let mut header_rows = Vec::with_capacity(sheet_count);
    for i in 0..sheet_count {
        let sheet = book
            .get_sheet_mut(&i)
            .ok_or_else(|| TbClassifyError::Internal(format!("sheet {i} disappeared")))?;
        let header_row = reshape_sheet(sheet, config)?;
        header_rows.push((sheet.get_name().to_string(), header_row));
    }

    Ok((serialize(&book)?, header_rows))
}

/// Parse xlsx bytes into an editable workbook.
pub fn parse(bytes: &[u8]) -> Result<Spreadsheet, TbClassifyError> {
    reader::xlsx::read_reader(Cursor::new(bytes), true).map_err(|e| {
        TbClassifyError::WorkbookParse {
            path: "<bytes>".into(),
            detail: e.to_string(),
        }
    })
}

/// Serialise an editable workbook back to xlsx bytes.
pub fn serialize(book: &Spreadsheet) -> Result<Vec<u8>, TbClassifyError> {
    let mut out = Cursor::new(Vec::new());
    writer::xlsx::write_writer(book, &mut out).map_err(|e| TbClassifyError::WorkbookWrite {
        detail: e.to_string(),
    })?;
    Ok(out.into_inner())
}

/// Reshape one worksheet in place. Returns the 0-based source header row.
fn reshape_sheet(sheet: &mut Worksheet, config: &ClassifyConfig) -> Result<usize, TbClassifyError> {
    let nrows = sheet.get_highest_row();
    let ncols = sheet.get_highest_column();
    if nrows == 0 || ncols == 0 {
        return Err(TbClassifyError::EmptySheet {
            sheet: sheet.get_name().to_string(),
            operation: "reshape".to_string(),
        });
    }

    let header_row = find_header_row(sheet, nrows, ncols, &config.header_keywords)?;

    // Delete the junk above the header; header becomes row 1.
    if header_row > 1 {
        sheet.remove_row(&1, &(header_row - 1));
    }

    rename_headers(sheet, &config.header_renames);
    reorder_columns(sheet);
    strip_blank_rows(sheet);

    debug!(
        sheet = sheet.get_name(),
        source_header_row = header_row,
        rows = sheet.get_highest_row(),
        cols = sheet.get_highest_column(),
        "reshaped worksheet"
    );

    Ok(header_row as usize - 1)
}

/// Find the first row containing any header keyword (trimmed,
/// case-insensitive).
fn find_header_row(
    sheet: &Worksheet,
    nrows: u32,
    ncols: u32,
    keywords: &[String],
) -> Result<u32, TbClassifyError> {
    for r in 1..=nrows {
        for c in 1..=ncols {
            let value = sheet.get_value((c, r));
            let trimmed = value.trim();
            if !trimmed.is_empty()
                && keywords.iter().any(|k| trimmed.eq_ignore_ascii_case(k))
            {
                return Ok(r);
            }
        }
    }
    Err(TbClassifyError::HeaderNotFound {
        sheet: sheet.get_name().to_string(),
        keywords: keywords.join(", "),
    })
}

/// Apply header renames on row 1. A no-op for already-renamed headers.
fn rename_headers(sheet: &mut Worksheet, renames: &[(String, String)]) {
    let ncols = sheet.get_highest_column();
    for c in 1..=ncols {
        let value = sheet.get_value((c, 1));
        let trimmed = value.trim();
        if let Some((_, to)) = renames
            .iter()
            .find(|(from, _)| trimmed.eq_ignore_ascii_case(from))
        {
            sheet.get_cell_mut((c, 1)).set_value_string(to.clone());
        }
    }
}

/// Snapshot of one source column: header, then (row, value, style) triples
/// for the non-default cells below it.
struct ColumnSnapshot {
    header: String,
    cells: Vec<(u32, String, Style)>,
}

impl ColumnSnapshot {
    fn is_blank(&self) -> bool {
        self.header.trim().is_empty() && self.cells.iter().all(|(_, v, _)| v.trim().is_empty())
    }
}

/// Rebuild the sheet with columns in canonical order.
///
/// Columns are matched to canonical positions by header text; classification
/// columns missing from the source are created with just their header.
/// Unmatched non-blank columns keep their data after column 8.
fn reorder_columns(sheet: &mut Worksheet) {
    let nrows = sheet.get_highest_row();
    let ncols = sheet.get_highest_column();

    let mut snapshots: Vec<ColumnSnapshot> = (1..=ncols)
        .map(|c| {
            let header = sheet.get_value((c, 1)).trim().to_string();
            let cells = (2..=nrows)
                .filter_map(|r| {
                    sheet.get_cell((c, r)).map(|cell| {
                        (r, cell.get_value().to_string(), cell.get_style().clone())
                    })
                })
                .collect();
            ColumnSnapshot { header, cells }
        })
        .collect();

    // Header styles, kept so canonical headers inherit the source's header
    // formatting when the column moves.
    let header_styles: Vec<Option<Style>> = (1..=ncols)
        .map(|c| sheet.get_cell((c, 1)).map(|cell| cell.get_style().clone()))
        .collect();

    let mut consumed = vec![false; snapshots.len()];
    // Canonical slot -> source column index (0-based into snapshots).
    let placement: Vec<Option<usize>> = CANONICAL_HEADERS
        .iter()
        .map(|wanted| {
            let found = snapshots
                .iter()
                .enumerate()
                .find(|(i, s)| !consumed[*i] && s.header.eq_ignore_ascii_case(wanted))
                .map(|(i, _)| i);
            if let Some(i) = found {
                consumed[i] = true;
            }
            found
        })
        .collect();

    // Wipe and rewrite. Column widths are not preserved; cell styles are.
    sheet.remove_column_by_index(&1, &ncols);

    let mut dest: u32 = 0;
    for (slot, source) in placement.iter().enumerate() {
        dest += 1;
        let style = source.and_then(|i| header_styles[i].as_ref());
        write_header(sheet, dest, CANONICAL_HEADERS[slot], style);
        if let Some(i) = *source {
            write_column_cells(sheet, dest, &snapshots[i]);
        }
    }

    for (i, snap) in snapshots.iter().enumerate() {
        if consumed[i] || snap.is_blank() {
            continue;
        }
        dest += 1;
        write_header(sheet, dest, &snap.header, header_styles[i].as_ref());
        write_column_cells(sheet, dest, snap);
    }
}

fn write_header(sheet: &mut Worksheet, col: u32, text: &str, style: Option<&Style>) {
    let cell = sheet.get_cell_mut((col, 1));
    cell.set_value_string(text.to_string());
    if let Some(style) = style {
        cell.set_style(style.clone());
    }
}

fn write_column_cells(sheet: &mut Worksheet, col: u32, snap: &ColumnSnapshot) {
    for (row, value, style) in &snap.cells {
        let cell = sheet.get_cell_mut((col, *row));
        if !value.is_empty() {
            cell.set_value(value.clone());
        }
        cell.set_style(style.clone());
    }
}

/// Remove rows whose cells are all blank, bottom-to-top so indices stay valid.
fn strip_blank_rows(sheet: &mut Worksheet) {
    let ncols = sheet.get_highest_column();
    for r in (2..=sheet.get_highest_row()).rev() {
        let blank = (1..=ncols).all(|c| sheet.get_value((c, r)).trim().is_empty());
        if blank {
            sheet.remove_row(&r, &1);
        }
    }
}

/// Reshape and additionally log the before/after shape at info level.
///
/// Used by the top-level entry points; the plain [`reshape_workbook`] is the
/// building block for tests.
pub fn reshape_with_report(
    bytes: &[u8],
    config: &ClassifyConfig,
) -> Result<(Vec<u8>, Vec<(String, usize)>), TbClassifyError> {
    let before = bytes.len();
    let (out, header_rows) = reshape_workbook(bytes, config)?;
    info!(
        sheets = header_rows.len(),
        bytes_in = before,
        bytes_out = out.len(),
        "reshape complete"
    );
    Ok((out, header_rows))
}
