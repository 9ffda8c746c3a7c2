use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::models::col_index_to_letter;
use crate::types::RegionId;

/// Logical destination columns of the main report sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportColumn {
    Groceries,
    Agriculture,
    Establishments,
    Producers,
}

impl ReportColumn {
    pub const ALL: [ReportColumn; 4] = [
        ReportColumn::Groceries,
        ReportColumn::Agriculture,
        ReportColumn::Establishments,
        ReportColumn::Producers,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ReportColumn::Groceries => "abarrotes",
            ReportColumn::Agriculture => "agricultura",
            ReportColumn::Establishments => "escuelas",
            ReportColumn::Producers => "productores",
        }
    }

    /// The run cannot proceed without these.
    pub fn is_mandatory(&self) -> bool {
        matches!(self, ReportColumn::Groceries | ReportColumn::Agriculture)
    }
}

/// Destination column per logical field, resolved once per workbook.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ColumnMap {
    columns: BTreeMap<ReportColumn, u32>,
    /// Bottom header row of each mapped field (sub-header rows included).
    header_rows: BTreeMap<ReportColumn, u32>,
}

impl ColumnMap {
    /// Map `column` to `col`, replacing an earlier mapping of the same field.
    pub fn insert(&mut self, column: ReportColumn, col: u32, header_row: u32) {
        self.columns.insert(column, col);
        self.header_rows.insert(column, header_row);
    }

    pub fn get(&self, column: ReportColumn) -> Option<u32> {
        self.columns.get(&column).copied()
    }

    pub fn contains(&self, column: ReportColumn) -> bool {
        self.columns.contains_key(&column)
    }

    /// Deepest header row among the mapped fields; data rows start below it.
    pub fn header_depth(&self) -> u32 {
        self.header_rows.values().copied().max().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ReportColumn, u32)> + '_ {
        self.columns.iter().map(|(k, v)| (*k, *v))
    }

    pub fn missing_mandatory(&self) -> Vec<ReportColumn> {
        ReportColumn::ALL
            .into_iter()
            .filter(|c| c.is_mandatory() && !self.contains(*c))
            .collect()
    }
}

impl fmt::Display for ColumnMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.columns.is_empty() {
            return write!(f, "{{}}");
        }
        let parts: Vec<String> = self
            .columns
            .iter()
            .map(|(k, col)| format!("{}={}", k.label(), col_index_to_letter(col.saturating_sub(1))))
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// Destination row per region, resolved once per workbook.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RowMap {
    rows: BTreeMap<RegionId, u32>,
}

impl RowMap {
    /// First row to claim a region keeps it.
    pub fn claim(&mut self, region: RegionId, row: u32) -> bool {
        if self.rows.contains_key(&region) {
            return false;
        }
        self.rows.insert(region, row);
        true
    }

    pub fn get(&self, region: RegionId) -> Option<u32> {
        self.rows.get(&region).copied()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RegionId, u32)> + '_ {
        self.rows.iter().map(|(k, v)| (*k, *v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_map_display_and_missing() {
        let mut map = ColumnMap::default();
        map.insert(ReportColumn::Groceries, 3, 4);
        map.insert(ReportColumn::Producers, 6, 5);
        assert_eq!(map.to_string(), "{abarrotes=C, productores=F}");
        assert_eq!(map.missing_mandatory(), vec![ReportColumn::Agriculture]);
        assert_eq!(map.header_depth(), 5);
    }

    #[test]
    fn test_row_map_first_claim_wins() {
        let mut rows = RowMap::default();
        assert!(rows.claim(RegionId(2), 8));
        assert!(!rows.claim(RegionId(2), 12));
        assert_eq!(rows.get(RegionId(2)), Some(8));
        assert_eq!(rows.len(), 1);
    }
}
