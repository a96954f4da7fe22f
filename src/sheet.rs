//! Tabular batches and their `.xlsx` representation.
//!
//! A [`Table`] is an ordered list of column names plus string rows. Cells are
//! kept as text end to end: the spreadsheets exchanged with the QM tooling
//! carry short codes ("QM", "-", "A") and identifiers, never arithmetic.

use std::path::{Path, PathBuf};

use calamine::{open_workbook, Data, Reader, Xlsx};
use rust_xlsxwriter::Workbook;
use thiserror::Error;

/// Column names shared by the fetch and update pipelines.
pub mod columns {
    pub const TEST_PLAN: &str = "Test Plan";
    pub const MASTER_TEST_PLAN: &str = "Master Test Plan";
    pub const CHILD_TEST_PLAN: &str = "Child Test Plan";
    pub const TEST_CASE_ID: &str = "TestCaseID";
    pub const TEST_CASE_URL: &str = "TestCaseURL";
    pub const REQUIREMENT_URL: &str = "RequirementURL";
    pub const DOORS_ASIL: &str = "Doors ASIL";
    pub const DOORS_CATEGORY: &str = "Doors Category";
    pub const PREVIOUS_ASIL: &str = "Previous ASIL Value RQM";
    pub const PREVIOUS_CATEGORY: &str = "Previous Category Value RQM";
    pub const TEST_CASE_STATE: &str = "TestCase State";
    pub const UPDATED_ASIL: &str = "Updated_ASIL_Values_RQM";
    pub const UPDATED_SECURITY: &str = "Updated_Security_Category_RQM";
}

#[derive(Error, Debug)]
pub enum SheetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not read workbook: {0}")]
    Read(#[from] calamine::XlsxError),

    #[error("Could not write workbook: {0}")]
    Write(#[from] rust_xlsxwriter::XlsxError),

    #[error("Workbook has no worksheet: {0}")]
    NoWorksheet(PathBuf),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Row has {found} cells, table has {expected} columns")]
    RowWidth { found: usize, expected: usize },

    #[error("Column '{name}' has {found} values, table has {expected} rows")]
    ColumnLength {
        name: String,
        found: usize,
        expected: usize,
    },

    #[error("Table exceeds worksheet limits: {0}")]
    TooLarge(String),
}

/// An ordered batch of string rows under named columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn with_columns(columns: &[&str]) -> Self {
        Self::new(columns.iter().map(|c| c.to_string()).collect())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Position of a column, or `MissingColumn`.
    pub fn column_index(&self, name: &str) -> Result<usize, SheetError> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| SheetError::MissingColumn(name.to_string()))
    }

    /// All values of one column, in row order.
    pub fn column(&self, name: &str) -> Result<Vec<&str>, SheetError> {
        let idx = self.column_index(name)?;
        Ok(self.rows.iter().map(|row| row[idx].as_str()).collect())
    }

    /// Cell at `row` under `column`. `None` if either is out of range.
    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row).map(|r| r[idx].as_str())
    }

    pub fn push_row(&mut self, row: Vec<String>) -> Result<(), SheetError> {
        if row.len() != self.columns.len() {
            return Err(SheetError::RowWidth {
                found: row.len(),
                expected: self.columns.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Replace the values of `name`, appending the column if it is new.
    ///
    /// Either every row receives a value or the table is left untouched.
    pub fn set_column(&mut self, name: &str, values: Vec<String>) -> Result<(), SheetError> {
        if values.len() != self.rows.len() {
            return Err(SheetError::ColumnLength {
                name: name.to_string(),
                found: values.len(),
                expected: self.rows.len(),
            });
        }

        match self.columns.iter().position(|c| c == name) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                self.columns.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        Ok(())
    }
}

/// Read the first worksheet of an `.xlsx` file. The first row is the header.
///
/// Rows whose cells are all empty are dropped. [`write_xlsx`] stores no cell
/// for an empty string, so a blank row cannot be told apart from the end of
/// the sheet; every batch row carries at least its `TestCaseID`.
pub fn read_xlsx(path: &Path) -> Result<Table, SheetError> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| SheetError::NoWorksheet(path.to_path_buf()))??;

    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(Table::default());
    };

    let mut table = Table::new(header.iter().map(cell_text).collect());
    let width = table.columns.len();

    for row in rows {
        let mut cells: Vec<String> = row.iter().map(cell_text).collect();
        if cells.iter().all(|c| c.is_empty()) {
            continue;
        }
        cells.resize(width, String::new());
        table.push_row(cells)?;
    }

    tracing::debug!(
        path = %path.display(),
        rows = table.len(),
        columns = width,
        "Spreadsheet loaded"
    );

    Ok(table)
}

/// Write `table` as a single worksheet, every cell as a string.
pub fn write_xlsx(table: &Table, path: &Path) -> Result<(), SheetError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();

    for (col, name) in table.columns.iter().enumerate() {
        worksheet.write_string(0, column_number(col)?, name)?;
    }

    for (r, row) in table.rows.iter().enumerate() {
        let row_number = u32::try_from(r + 1)
            .map_err(|_| SheetError::TooLarge(format!("{} rows", table.rows.len())))?;
        for (col, value) in row.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            worksheet.write_string(row_number, column_number(col)?, value)?;
        }
    }

    workbook.save(path)?;

    tracing::info!(path = %path.display(), rows = table.len(), "Spreadsheet written");
    Ok(())
}

fn column_number(col: usize) -> Result<u16, SheetError> {
    u16::try_from(col).map_err(|_| SheetError::TooLarge(format!("{} columns", col + 1)))
}

/// Render a cell as text. Whole floats lose their `.0` so numeric ids
/// entered in Excel read back as "1", not "1.0".
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::columns::*;
    use super::*;

    fn sample_table() -> Table {
        let mut table = Table::with_columns(&[TEST_CASE_ID, DOORS_ASIL, DOORS_CATEGORY]);
        table
            .push_row(vec!["1".into(), "A".into(), "Security".into()])
            .unwrap();
        table
            .push_row(vec!["2".into(), "-".into(), "General".into()])
            .unwrap();
        table
    }

    #[test]
    fn push_row_rejects_wrong_width() {
        let mut table = Table::with_columns(&["a", "b"]);
        let err = table.push_row(vec!["only one".into()]).unwrap_err();
        assert!(matches!(err, SheetError::RowWidth { found: 1, expected: 2 }));
        assert!(table.is_empty());
    }

    #[test]
    fn column_index_reports_missing_column_by_name() {
        let table = sample_table();
        let err = table.column_index("Nope").unwrap_err();
        assert_eq!(err.to_string(), "Missing column: Nope");
    }

    #[test]
    fn set_column_appends_new_column() {
        let mut table = sample_table();
        table
            .set_column(UPDATED_ASIL, vec!["B".into(), "-".into()])
            .unwrap();
        assert_eq!(table.columns().last().unwrap(), UPDATED_ASIL);
        assert_eq!(table.cell(0, UPDATED_ASIL), Some("B"));
        assert_eq!(table.cell(1, UPDATED_ASIL), Some("-"));
    }

    #[test]
    fn set_column_replaces_existing_values() {
        let mut table = sample_table();
        table
            .set_column(DOORS_ASIL, vec!["QM".into(), "D".into()])
            .unwrap();
        assert_eq!(table.columns().len(), 3);
        assert_eq!(table.column(DOORS_ASIL).unwrap(), vec!["QM", "D"]);
    }

    #[test]
    fn set_column_with_wrong_length_leaves_table_untouched() {
        let mut table = sample_table();
        let before = table.clone();
        assert!(table.set_column(UPDATED_ASIL, vec!["B".into()]).is_err());
        assert_eq!(table, before);
    }

    #[test]
    fn xlsx_round_trip_preserves_derived_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("batch.xlsx");

        let mut table = sample_table();
        table
            .set_column(UPDATED_ASIL, vec!["B".into(), "-".into()])
            .unwrap();
        table
            .set_column(
                UPDATED_SECURITY,
                vec!["Security Relevant".into(), "Not Security Relevant".into()],
            )
            .unwrap();

        write_xlsx(&table, &path).unwrap();
        let loaded = read_xlsx(&path).unwrap();

        assert_eq!(loaded, table);
    }

    #[test]
    fn round_trip_keeps_empty_cells_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gaps.xlsx");

        let mut table = Table::with_columns(&["a", "b", "c"]);
        table
            .push_row(vec!["x".into(), String::new(), "z".into()])
            .unwrap();

        write_xlsx(&table, &path).unwrap();
        let loaded = read_xlsx(&path).unwrap();
        assert_eq!(loaded.cell(0, "b"), Some(""));
        assert_eq!(loaded.cell(0, "c"), Some("z"));
    }

    #[test]
    fn whole_floats_render_without_fraction() {
        assert_eq!(cell_text(&Data::Float(1.0)), "1");
        assert_eq!(cell_text(&Data::Float(2.5)), "2.5");
        assert_eq!(cell_text(&Data::Int(7)), "7");
        assert_eq!(cell_text(&Data::Empty), "");
    }

    #[test]
    fn read_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_xlsx(&dir.path().join("absent.xlsx")).is_err());
    }

    #[test]
    fn blank_rows_are_dropped_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.xlsx");

        let mut table = Table::with_columns(&["a", "b"]);
        table.push_row(vec!["1".into(), "x".into()]).unwrap();
        table.push_row(vec![String::new(), String::new()]).unwrap();
        table.push_row(vec!["3".into(), String::new()]).unwrap();

        write_xlsx(&table, &path).unwrap();
        let loaded = read_xlsx(&path).unwrap();

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.column("a").unwrap(), vec!["1", "3"]);
        assert_eq!(loaded.cell(1, "b"), Some(""));
    }
}
