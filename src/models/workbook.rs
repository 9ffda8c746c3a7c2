//! In-memory cell grid for the destination workbook (1-based row/col, like edit-xlsx).
//!
//! The grid is loaded once by the workbook adapter, mutated only through [`Sheet::write`], and every
//! write is recorded as a [`CellEdit`] so the adapter can replay exactly those cells onto the original
//! file without touching anything else.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::services::amount::parse_amount;

/// Column index to Excel letter (0→A, 1→B, 25→Z, 26→AA).
pub fn col_index_to_letter(index: u32) -> String {
    let mut n = index;
    let mut s = String::new();
    loop {
        let r = (n % 26) as u8;
        s.insert(0, (b'A' + r) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    s
}

/// A1-style reference for a 1-based (row, col).
pub fn cell_ref(row: u32, col: u32) -> String {
    format!("{}{}", col_index_to_letter(col.saturating_sub(1)), row)
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Text(String),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            CellValue::Number(_) => false,
        }
    }

    /// Display text of the cell. Integral numbers are rendered without a fractional part.
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            CellValue::Text(s) => s.clone(),
        }
    }

    /// Numeric reading of a prior value. Blank or unparsable text counts as zero.
    pub fn as_amount(&self) -> f64 {
        match self {
            CellValue::Empty => 0.0,
            CellValue::Number(n) if n.is_finite() => *n,
            CellValue::Number(_) => 0.0,
            CellValue::Text(s) => parse_amount(s),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

/// Inclusive merged range, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MergedRange {
    pub first_row: u32,
    pub first_col: u32,
    pub last_row: u32,
    pub last_col: u32,
}

impl MergedRange {
    pub fn new(first_row: u32, first_col: u32, last_row: u32, last_col: u32) -> Self {
        Self {
            first_row: first_row.min(last_row),
            first_col: first_col.min(last_col),
            last_row: first_row.max(last_row),
            last_col: first_col.max(last_col),
        }
    }

    pub fn contains(&self, row: u32, col: u32) -> bool {
        row >= self.first_row && row <= self.last_row && col >= self.first_col && col <= self.last_col
    }

    /// Top-left cell: the only cell of the range that holds a value and is persisted.
    pub fn master(&self) -> (u32, u32) {
        (self.first_row, self.first_col)
    }
}

impl fmt::Display for MergedRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            cell_ref(self.first_row, self.first_col),
            cell_ref(self.last_row, self.last_col)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CellStyle {
    /// Keep whatever formatting the template cell already has.
    Keep,
    /// Thin border on all sides (audit rows).
    Bordered,
    /// Bold with thin border (audit header row).
    Header,
}

/// One recorded write, replayed by the workbook adapter on save.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellEdit {
    pub row: u32,
    pub col: u32,
    pub value: CellValue,
    pub style: CellStyle,
}

static EMPTY: CellValue = CellValue::Empty;

#[derive(Debug, Clone, Default)]
pub struct Sheet {
    name: String,
    cells: BTreeMap<(u32, u32), CellValue>,
    merged: Vec<MergedRange>,
    created: bool,
    edits: Vec<CellEdit>,
    column_widths: BTreeMap<u32, f64>,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when the sheet did not exist in the source file and must be created on save.
    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Populate a cell while loading. Not recorded as an edit.
    pub fn load_cell(&mut self, row: u32, col: u32, value: CellValue) {
        if value.is_empty() {
            self.cells.remove(&(row, col));
        } else {
            self.cells.insert((row, col), value);
        }
    }

    pub fn add_merged_range(&mut self, range: MergedRange) {
        self.merged.push(range);
    }

    pub fn merged_ranges(&self) -> &[MergedRange] {
        &self.merged
    }

    pub fn merged_range_at(&self, row: u32, col: u32) -> Option<&MergedRange> {
        self.merged.iter().find(|m| m.contains(row, col))
    }

    /// Cell that actually holds the value for (row, col): the master cell when (row, col) is inside a
    /// merged range, otherwise (row, col) itself. Every read of layout text and every write goes
    /// through here.
    pub fn writable_cell(&self, row: u32, col: u32) -> (u32, u32) {
        self.merged_range_at(row, col)
            .map(MergedRange::master)
            .unwrap_or((row, col))
    }

    /// Inside a merged range but not its master.
    pub fn is_merged_alias(&self, row: u32, col: u32) -> bool {
        self.merged_range_at(row, col)
            .is_some_and(|m| m.master() != (row, col))
    }

    /// Raw value stored at exactly (row, col).
    pub fn value(&self, row: u32, col: u32) -> &CellValue {
        self.cells.get(&(row, col)).unwrap_or(&EMPTY)
    }

    /// Text of the cell as displayed: merged aliases show their master's value.
    pub fn display_text(&self, row: u32, col: u32) -> String {
        let (r, c) = self.writable_cell(row, col);
        self.value(r, c).as_text()
    }

    pub fn max_row(&self) -> u32 {
        let data = self.cells.keys().map(|(r, _)| *r).max().unwrap_or(0);
        let merged = self.merged.iter().map(|m| m.last_row).max().unwrap_or(0);
        data.max(merged)
    }

    pub fn max_col(&self) -> u32 {
        let data = self.cells.keys().map(|(_, c)| *c).max().unwrap_or(0);
        let merged = self.merged.iter().map(|m| m.last_col).max().unwrap_or(0);
        data.max(merged)
    }

    /// Write a value, redirecting to the master cell of a merged range. Returns the cell written.
    pub fn write(&mut self, row: u32, col: u32, value: CellValue, style: CellStyle) -> (u32, u32) {
        let (row, col) = self.writable_cell(row, col);
        self.load_cell(row, col, value.clone());
        self.edits.push(CellEdit { row, col, value, style });
        (row, col)
    }

    pub fn edits(&self) -> &[CellEdit] {
        &self.edits
    }

    pub fn set_column_width(&mut self, col: u32, width: f64) {
        self.column_widths.insert(col, width);
    }

    pub fn column_widths(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.column_widths.iter().map(|(c, w)| (*c, *w))
    }

    /// Text of every non-empty cell in a row, in column order.
    pub fn row_texts(&self, row: u32) -> Vec<String> {
        self.cells
            .range((row, 0)..=(row, u32::MAX))
            .map(|(_, v)| v.as_text())
            .filter(|s| !s.trim().is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Workbook {
    sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sheet(&mut self, sheet: Sheet) {
        self.sheets.push(sheet);
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Sheet> {
        self.sheets.iter_mut().find(|s| s.name == name)
    }

    pub fn first_sheet(&self) -> Option<&Sheet> {
        self.sheets.first()
    }

    /// Add a sheet that will be created on save. Returns the existing sheet if the name is taken.
    pub fn create_sheet(&mut self, name: &str) -> &mut Sheet {
        if let Some(idx) = self.sheets.iter().position(|s| s.name == name) {
            return &mut self.sheets[idx];
        }
        let mut sheet = Sheet::new(name);
        sheet.created = true;
        self.sheets.push(sheet);
        let last = self.sheets.len() - 1;
        &mut self.sheets[last]
    }

    pub fn has_edits(&self) -> bool {
        self.sheets.iter().any(|s| s.created || !s.edits.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_sheet() -> Sheet {
        let mut sheet = Sheet::new("Resumen");
        sheet.load_cell(1, 2, "Proveedores".into());
        sheet.add_merged_range(MergedRange::new(1, 2, 1, 4));
        sheet.load_cell(5, 3, CellValue::Number(10.0));
        sheet
    }

    #[test]
    fn test_col_index_to_letter() {
        assert_eq!(col_index_to_letter(0), "A");
        assert_eq!(col_index_to_letter(25), "Z");
        assert_eq!(col_index_to_letter(26), "AA");
        assert_eq!(cell_ref(3, 28), "AB3");
    }

    #[test]
    fn test_writable_cell_redirects_to_master() {
        let sheet = header_sheet();
        assert_eq!(sheet.writable_cell(1, 3), (1, 2));
        assert_eq!(sheet.writable_cell(1, 2), (1, 2));
        assert_eq!(sheet.writable_cell(2, 3), (2, 3));
        assert!(sheet.is_merged_alias(1, 4));
        assert!(!sheet.is_merged_alias(1, 2));
        assert_eq!(sheet.display_text(1, 4), "Proveedores");
    }

    #[test]
    fn test_write_records_edit_at_master() {
        let mut sheet = header_sheet();
        let written = sheet.write(1, 3, "Productores".into(), CellStyle::Keep);
        assert_eq!(written, (1, 2));
        assert_eq!(sheet.value(1, 2).as_text(), "Productores");
        assert_eq!(sheet.value(1, 3), &CellValue::Empty);
        assert_eq!(sheet.edits().len(), 1);
        assert_eq!(sheet.edits()[0].col, 2);
    }

    #[test]
    fn test_cell_value_text_and_amount() {
        assert_eq!(CellValue::Number(225.0).as_text(), "225");
        assert_eq!(CellValue::Number(225.5).as_text(), "225.5");
        assert_eq!(CellValue::Text("Q1,200.00".into()).as_amount(), 1200.0);
        assert_eq!(CellValue::Text("Total: 1200".into()).as_amount(), 1200.0);
        assert_eq!(CellValue::Text("n/a".into()).as_amount(), 0.0);
        assert_eq!(CellValue::Empty.as_amount(), 0.0);
    }

    #[test]
    fn test_create_sheet_is_idempotent() {
        let mut wb = Workbook::new();
        wb.add_sheet(header_sheet());
        wb.create_sheet("Detalle").load_cell(1, 1, "x".into());
        wb.create_sheet("Detalle");
        assert_eq!(wb.sheet_names(), vec!["Resumen", "Detalle"]);
        assert!(wb.sheet("Detalle").is_some_and(Sheet::is_created));
        assert!(wb.has_edits());
        assert_eq!(wb.sheet("Resumen").map(Sheet::max_row), Some(5));
    }
}
