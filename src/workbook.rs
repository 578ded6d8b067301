//! In-memory workbook model
//!
//! calamine hands out ranges that start at the first used cell. Fixed-row
//! layouts ("header at row 7") need absolute coordinates, so every sheet is
//! re-anchored at A1 when loaded.

use calamine::{open_workbook_auto, open_workbook_auto_from_rs, Data, Reader, SheetType, SheetVisible, Sheets};
use chrono::NaiveDate;
use std::io::{Cursor, Read, Seek};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::IngestError;

/// A single cell value, reduced to what the format processors care about
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Bool(bool),
    /// Formula error such as `#DIV/0!`; blank as a label, a parse failure as a value
    Error(String),
}

static EMPTY: Cell = Cell::Empty;

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty | Cell::Error(_) => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Renders the cell the way it would read in a header or label position.
    pub fn display(&self) -> String {
        match self {
            Cell::Empty | Cell::Error(_) => String::new(),
            Cell::Text(s) => s.trim().to_string(),
            Cell::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            Cell::Date(d) => d.format("%Y-%m-%d").to_string(),
            Cell::Bool(b) => b.to_string(),
        }
    }
}

/// Converts an Excel serial day number (1899-12-30 epoch) to a date
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() {
        return None;
    }
    let excel_epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    excel_epoch.checked_add_signed(chrono::Duration::days(serial.floor() as i64))
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => Cell::Empty,
            Data::Error(e) => Cell::Error(e.to_string()),
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Float(f) => Cell::Number(*f),
            Data::Bool(b) => Cell::Bool(*b),
            Data::String(s) => {
                if s.trim().is_empty() {
                    Cell::Empty
                } else {
                    Cell::Text(s.clone())
                }
            }
            Data::DateTime(dt) => match excel_serial_to_date(dt.as_f64()) {
                Some(date) => Cell::Date(date),
                None => Cell::Number(dt.as_f64()),
            },
            Data::DateTimeIso(s) => s
                .get(..10)
                .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
                .map(Cell::Date)
                .unwrap_or_else(|| Cell::Text(s.clone())),
            Data::DurationIso(s) => Cell::Text(s.clone()),
        }
    }
}

/// One worksheet with cells addressed by absolute (row, column), zero-based
#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    pub visible: bool,
    rows: Vec<Vec<Cell>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, visible: bool, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            name: name.into(),
            visible,
            rows,
        }
    }

    /// Cell at an absolute position; out-of-range positions read as empty.
    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY)
    }

    pub fn row(&self, row: usize) -> &[Cell] {
        self.rows.get(row).map(|r| r.as_slice()).unwrap_or(&[])
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Cell]> {
        self.rows.iter().map(|r| r.as_slice())
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.rows.iter().map(|r| r.len()).max().unwrap_or(0)
    }
}

/// All sheets of a workbook in their original order
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn from_sheets(sheets: Vec<Sheet>) -> Self {
        Self { sheets }
    }

    /// Opens an .xlsx/.xlsm/.xls/.ods file from disk
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, IngestError> {
        let path = path.as_ref();
        info!("Opening workbook: {:?}", path);
        let reader = open_workbook_auto(path)?;
        Self::load(reader)
    }

    /// Loads a workbook from an in-memory upload
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, IngestError> {
        debug!("Loading workbook from {} bytes", bytes.len());
        let reader = open_workbook_auto_from_rs(Cursor::new(bytes))?;
        Self::load(reader)
    }

    fn load<RS: Read + Seek>(mut reader: Sheets<RS>) -> Result<Self, IngestError> {
        let metadata: Vec<(String, bool)> = reader
            .sheets_metadata()
            .iter()
            .filter(|s| matches!(s.typ, SheetType::WorkSheet))
            .map(|s| (s.name.clone(), matches!(s.visible, SheetVisible::Visible)))
            .collect();

        let mut sheets = Vec::with_capacity(metadata.len());
        for (name, visible) in metadata {
            let range = match reader.worksheet_range(&name) {
                Ok(range) => range,
                Err(e) => {
                    warn!("Skipping unreadable sheet '{}': {}", name, e);
                    continue;
                }
            };

            let (start_row, start_col) = range.start().unwrap_or((0, 0));
            let mut rows: Vec<Vec<Cell>> = vec![Vec::new(); start_row as usize];
            for source_row in range.rows() {
                let mut row = vec![Cell::Empty; start_col as usize];
                row.extend(source_row.iter().map(Cell::from));
                rows.push(row);
            }

            debug!(
                "Loaded sheet '{}' ({} rows, visible: {})",
                name,
                rows.len(),
                visible
            );
            sheets.push(Sheet::new(name, visible, rows));
        }

        info!("Workbook has {} worksheets", sheets.len());
        Ok(Self { sheets })
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn visible_sheets(&self) -> impl Iterator<Item = &Sheet> {
        self.sheets.iter().filter(|s| s.visible)
    }

    /// The sheet a processor should look at when none was requested
    pub fn first_visible(&self) -> Option<&Sheet> {
        self.visible_sheets().next().or_else(|| self.sheets.first())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::CellErrorType;

    #[test]
    fn test_cell_from_calamine_data() {
        assert_eq!(Cell::from(&Data::Int(42)), Cell::Number(42.0));
        assert_eq!(Cell::from(&Data::String("  ".to_string())), Cell::Empty);
        assert_eq!(
            Cell::from(&Data::String("Vacancy".to_string())),
            Cell::text("Vacancy")
        );
        assert_eq!(
            Cell::from(&Data::DateTimeIso("2024-07-31T00:00:00".to_string())),
            Cell::Date(NaiveDate::from_ymd_opt(2024, 7, 31).unwrap())
        );
    }

    #[test]
    fn test_formula_error_cell_is_kept_distinct() {
        let cell = Cell::from(&Data::Error(CellErrorType::Div0));
        assert_eq!(cell, Cell::Error("#DIV/0!".to_string()));
        assert!(cell.is_empty());
        assert_eq!(cell.display(), "");
        assert_eq!(cell.as_text(), None);
    }

    #[test]
    fn test_excel_serial_to_date() {
        assert_eq!(
            excel_serial_to_date(45658.0),
            NaiveDate::from_ymd_opt(2025, 1, 1)
        );
        assert_eq!(excel_serial_to_date(f64::NAN), None);
    }

    #[test]
    fn test_out_of_range_cell_is_empty() {
        let sheet = Sheet::new("S", true, vec![vec![Cell::text("a")]]);
        assert_eq!(sheet.cell(0, 0), &Cell::text("a"));
        assert!(sheet.cell(10, 3).is_empty());
        assert!(sheet.row(5).is_empty());
        assert_eq!(sheet.width(), 1);
    }

    #[test]
    fn test_cell_display() {
        assert_eq!(Cell::Number(2024.0).display(), "2024");
        assert_eq!(Cell::Number(0.065).display(), "0.065");
        assert_eq!(Cell::text("  YTD ").display(), "YTD");
        assert_eq!(
            Cell::Date(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()).display(),
            "2024-01-31"
        );
    }

    #[test]
    fn test_visible_sheets_and_first_visible() {
        let wb = Workbook::from_sheets(vec![
            Sheet::new("Hidden", false, vec![]),
            Sheet::new("Shown", true, vec![]),
        ]);
        assert_eq!(wb.visible_sheets().count(), 1);
        assert_eq!(wb.first_visible().map(|s| s.name.as_str()), Some("Shown"));
        assert!(wb.sheet("Hidden").is_some());
        assert_eq!(wb.sheet_names(), vec!["Hidden", "Shown"]);
    }
}
