//! Integration tests for the offline pipeline stages.
//!
//! These build real xlsx workbooks with umya-spreadsheet, run them through
//! reshape / read / write-back, and re-parse the output with calamine — the
//! same two libraries the production path uses, so the round trip exercises
//! the actual wire format rather than in-memory fixtures.

use std::path::Path;
use tb_classify::pipeline::classify::{extract_entries, split_batches, Entry};
use tb_classify::pipeline::reader::read_workbook;
use tb_classify::pipeline::reshape::{reshape_workbook, serialize, CANONICAL_HEADERS};
use tb_classify::pipeline::writer::fill_classifications;
use tb_classify::{ClassifyConfig, Classification};
use umya_spreadsheet::new_file;

// ── Helpers ──────────────────────────────────────────────────────────────────

fn workbook_from_rows(rows: &[&[&str]]) -> Vec<u8> {
    let mut book = new_file();
    let sheet = book.get_sheet_mut(&0).unwrap();
    for (r, row) in rows.iter().enumerate() {
        for (c, v) in row.iter().enumerate() {
            if !v.is_empty() {
                sheet
                    .get_cell_mut((c as u32 + 1, r as u32 + 1))
                    .set_value(v.to_string());
            }
        }
    }
    serialize(&book).unwrap()
}

fn display_rows(bytes: &[u8]) -> Vec<Vec<String>> {
    let grids = read_workbook(bytes, Path::new("test.xlsx")).unwrap();
    grids[0]
        .rows
        .iter()
        .map(|row| row.iter().map(|c| c.value.to_display()).collect())
        .collect()
}

/// A messy export the way accounting packages actually produce them:
/// title rows, legacy headers, out-of-order columns, a blank spacer row.
fn messy_export() -> Vec<u8> {
    workbook_from_rows(&[
        &["Acme Trading Pte Ltd"],
        &["Trial Balance as at 31 December 2023"],
        &[""],
        &[
            "Account",
            "Account Code",
            "Debit - Year to date",
            "Credit - Year to date",
        ],
        &["Cash at bank", "1001", "25000", ""],
        &["Trade receivables", "1100", "18000", ""],
        &["", "", "", ""],
        &["Trade payables", "2001", "", "13000"],
        &["Share capital", "3001", "", "30000"],
    ])
}

// ── Reshape round trip ───────────────────────────────────────────────────────

#[test]
fn messy_export_becomes_canonical() {
    let config = ClassifyConfig::default();
    let (out, header_rows) = reshape_workbook(&messy_export(), &config).unwrap();

    assert_eq!(header_rows, vec![("Sheet1".to_string(), 3)]);

    let rows = display_rows(&out);
    assert_eq!(
        rows[0][..8],
        CANONICAL_HEADERS.map(String::from),
        "header row must be the canonical layout"
    );
    // data rows follow, blank spacer removed
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[1][0], "1001");
    assert_eq!(rows[1][1], "Cash at bank");
    assert_eq!(rows[1][2], "25000");
    assert_eq!(rows[4][1], "Share capital");
    assert_eq!(rows[4][3], "30000");
}

#[test]
fn reshape_then_reshape_is_identity() {
    let config = ClassifyConfig::default();
    let (once, _) = reshape_workbook(&messy_export(), &config).unwrap();
    let (twice, _) = reshape_workbook(&once, &config).unwrap();
    assert_eq!(display_rows(&once), display_rows(&twice));
}

// ── Reader round trip ────────────────────────────────────────────────────────

#[test]
fn typed_values_survive_umya_to_calamine() {
    let mut book = new_file();
    let sheet = book.get_sheet_mut(&0).unwrap();
    sheet.get_cell_mut((1, 1)).set_value("Account Code");
    sheet.get_cell_mut((1, 2)).set_value_number(1001);
    sheet.get_cell_mut((2, 2)).set_value_bool(true);
    let bytes = serialize(&book).unwrap();

    let grids = read_workbook(&bytes, Path::new("typed.xlsx")).unwrap();
    let g = &grids[0];
    assert_eq!(g.rows[0][0].value.to_display(), "Account Code");
    assert_eq!(g.rows[1][0].value.to_display(), "1001");
    assert_eq!(g.rows[1][1].value.to_display(), "TRUE");
}

// ── Entry extraction on reshaped output ──────────────────────────────────────

#[test]
fn entries_extracted_from_reshaped_workbook() {
    let config = ClassifyConfig::default();
    let (out, _) = reshape_workbook(&messy_export(), &config).unwrap();
    let grids = read_workbook(&out, Path::new("test.xlsx")).unwrap();

    let entries = extract_entries(&grids[0]);
    let texts: Vec<&str> = entries.iter().map(|e| e.text.as_str()).collect();
    assert_eq!(
        texts,
        vec![
            "Cash at bank",
            "Trade receivables",
            "Trade payables",
            "Share capital"
        ]
    );
    // rows are 0-based data rows, contiguous after blank-row stripping
    assert_eq!(entries.iter().map(|e| e.row).collect::<Vec<_>>(), vec![0, 1, 2, 3]);

    let batches = split_batches(&entries, 3);
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[1].row_offset, 3);
    assert_eq!(batches[1].entries, vec!["Share capital"]);
}

// ── Write-back round trip ────────────────────────────────────────────────────

#[test]
fn classifications_land_in_columns_five_to_eight() {
    let config = ClassifyConfig::default();
    let (reshaped, _) = reshape_workbook(&messy_export(), &config).unwrap();
    let grids = read_workbook(&reshaped, Path::new("test.xlsx")).unwrap();
    let entries = extract_entries(&grids[0]);

    let classifications: Vec<Classification> = vec![
        Classification::new(
            "Asset",
            "Cash and Cash Equivalents",
            "Bank Balances",
            "Bank Balances",
        ),
        Classification::new(
            "Asset",
            "Trade and Other Receivables",
            "Trade Receivables",
            "Trade Receivables",
        ),
        Classification::default(), // this batch row failed
        Classification::new("Equity", "Share Capital", "Issued Capital", "Ordinary Shares"),
    ];

    let out = fill_classifications(&reshaped, &entries, &classifications).unwrap();
    let rows = display_rows(&out);

    assert_eq!(rows[1][4], "Asset");
    assert_eq!(rows[1][7], "Bank Balances");
    assert_eq!(rows[2][4], "Asset");
    // the failed row stays blank rather than getting empty-string writes
    assert_eq!(rows[3][4], "");
    assert_eq!(rows[4][4], "Equity");
    assert_eq!(rows[4][5], "Share Capital");

    // original data untouched
    assert_eq!(rows[1][0], "1001");
    assert_eq!(rows[4][3], "30000");
}

#[test]
fn write_back_handles_sparse_entry_rows() {
    // entry rows need not be contiguous when some rows had no usable text
    let bytes = workbook_from_rows(&[
        &[
            "Account Code",
            "Account Description",
            "Debit Amount",
            "Credit Amount",
            "Account Type",
            "Primary Classification",
            "Secondary Classification",
            "Tertiary Classification",
        ],
        &["1001", "Cash at bank"],
        &["1002", "Petty cash"],
    ]);
    let entries = vec![Entry {
        row: 1,
        text: "Petty cash".into(),
    }];
    let classifications = vec![Classification::new(
        "Asset",
        "Cash and Cash Equivalents",
        "Cash on Hand",
        "Petty Cash",
    )];
    let out = fill_classifications(&bytes, &entries, &classifications).unwrap();
    let rows = display_rows(&out);
    assert_eq!(rows[1][4], "", "row 0 was not classified");
    assert_eq!(rows[2][4], "Asset");
    assert_eq!(rows[2][7], "Petty Cash");
}
