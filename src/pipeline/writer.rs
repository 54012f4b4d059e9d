//! Write classification values back into the workbook.
//!
//! Operates on the xlsx bytes directly (umya-spreadsheet) so every style,
//! merge and column the reshape produced survives untouched; only the four
//! classification cells of each classified row change.

use crate::error::TbClassifyError;
use crate::output::Classification;
use crate::pipeline::classify::Entry;
use crate::pipeline::reshape::{parse, serialize};
use tracing::debug;

/// First classification column (Account Type), 1-indexed.
const CLASSIFICATION_START_COL: u32 = 5;

/// Fill the classification columns of the first worksheet.
///
/// `entries[i]` names the data row that `classifications[i]` belongs to;
/// its Excel row is `entries[i].row + 2` (row 1 is the header). Rows past
/// the sheet's current extent and empty classifications are skipped, so a
/// failed batch leaves its rows blank rather than writing empty strings
/// over whatever is there.
pub fn fill_classifications(
    bytes: &[u8],
    entries: &[Entry],
    classifications: &[Classification],
) -> Result<Vec<u8>, TbClassifyError> {
    let mut book = parse(bytes)?;
    let sheet = book
        .get_sheet_mut(&0)
        .ok_or(TbClassifyError::NoWorksheets)?;

    let highest_row = sheet.get_highest_row();
    let mut written = 0usize;

    for (entry, classification) in entries.iter().zip(classifications) {
        if classification.is_empty() {
            continue;
        }
        let excel_row = entry.row as u32 + 2;
        if excel_row > highest_row {
            continue;
        }
        let values = [
            &classification.account_type,
            &classification.primary,
            &classification.secondary,
            &classification.tertiary,
        ];
        for (offset, value) in values.iter().enumerate() {
            sheet
                .get_cell_mut((CLASSIFICATION_START_COL + offset as u32, excel_row))
                .set_value_string(value.as_str());
        }
        written += 1;
    }

    debug!(rows = written, "classification columns filled");
    serialize(&book)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::reshape;
    use umya_spreadsheet::new_file;

    fn canonical_book(data_rows: &[&[&str]]) -> Vec<u8> {
        let mut book = new_file();
        let sheet = book.get_sheet_mut(&0).unwrap();
        for (c, header) in reshape::CANONICAL_HEADERS.iter().enumerate() {
            sheet
                .get_cell_mut((c as u32 + 1, 1))
                .set_value(header.to_string());
        }
        for (r, row) in data_rows.iter().enumerate() {
            for (c, v) in row.iter().enumerate() {
                if !v.is_empty() {
                    sheet
                        .get_cell_mut((c as u32 + 1, r as u32 + 2))
                        .set_value(v.to_string());
                }
            }
        }
        reshape::serialize(&book).unwrap()
    }

    #[test]
    fn writes_by_entry_row() {
        let bytes = canonical_book(&[
            &["1001", "Cash at bank", "2500"],
            &["9999", "Subtotal row"],
            &["2001", "Trade payables", "", "1300"],
        ]);
        let entries = vec![
            Entry { row: 0, text: "Cash at bank".into() },
            Entry { row: 2, text: "Trade payables".into() },
        ];
        let classifications = vec![
            Classification::new("Asset", "Cash and Cash Equivalents", "Bank Balances", "Bank Balances"),
            Classification::new("Liability", "Current Liabilities", "Trade and Other Payables", "Trade Payables"),
        ];
        let out = fill_classifications(&bytes, &entries, &classifications).unwrap();

        let book = reshape::parse(&out).unwrap();
        let sheet = book.get_sheet(&0).unwrap();
        assert_eq!(sheet.get_value((5, 2)), "Asset");
        assert_eq!(sheet.get_value((8, 2)), "Bank Balances");
        // row 1 (0-based) got no classification entry
        assert_eq!(sheet.get_value((5, 3)), "");
        assert_eq!(sheet.get_value((5, 4)), "Liability");
    }

    #[test]
    fn empty_classifications_are_skipped() {
        let bytes = canonical_book(&[&["1001", "Cash at bank"]]);
        let entries = vec![Entry { row: 0, text: "Cash at bank".into() }];
        let out =
            fill_classifications(&bytes, &entries, &[Classification::default()]).unwrap();
        let book = reshape::parse(&out).unwrap();
        assert_eq!(book.get_sheet(&0).unwrap().get_value((5, 2)), "");
    }

    #[test]
    fn rows_past_sheet_extent_are_skipped() {
        let bytes = canonical_book(&[&["1001", "Cash at bank"]]);
        let entries = vec![Entry { row: 500, text: "ghost".into() }];
        let classifications = vec![Classification::new("Asset", "x", "y", "z")];
        // must not panic or grow the sheet
        let out = fill_classifications(&bytes, &entries, &classifications).unwrap();
        let book = reshape::parse(&out).unwrap();
        assert_eq!(book.get_sheet(&0).unwrap().get_highest_row(), 2);
    }
}
