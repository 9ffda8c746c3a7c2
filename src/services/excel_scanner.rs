//! Report layout scanning over the loaded grid (1-based row/col): header → column map, region → row
//! map, and the audit sheet's header row and free rows.

use tracing::debug;

use crate::config::LayoutConfig;
use crate::error::{Error, Result};
use crate::models::{ColumnMap, ReportColumn, RowMap, Sheet};
use crate::services::normalize::norm;
use crate::services::region::RegionResolver;

/// Audit header labels, written when the sheet is created and matched when it already exists.
pub const AUDIT_HEADERS: [&str; 6] = [
    "Emisor",
    "NIT Emisor",
    "NIT Receptor",
    "Autorización (UUID)",
    "Municipio",
    "Alerta",
];

/// 1-based audit column holding the invoice identifier when the header does not say otherwise.
pub const AUDIT_IDENTIFIER_COLUMN: u32 = 4;

const AUDIT_KEYWORDS: &[&str] = &["emisor", "nit", "receptor", "autorizacion", "uuid", "municipio", "alerta"];

/// Bottom row of the (possibly merged) cell at (row, col).
fn header_bottom(sheet: &Sheet, row: u32, col: u32) -> u32 {
    sheet.merged_range_at(row, col).map(|m| m.last_row).unwrap_or(row)
}

/// Column of the "Total" sub-header beneath a producers header, if any.
fn producers_total_column(sheet: &Sheet, row: u32, col: u32, window: u32) -> Option<(u32, u32)> {
    let sub_row = header_bottom(sheet, row, col) + 1;
    (col..col + window.max(1))
        .find(|c| norm(&sheet.display_text(sub_row, *c)).contains("total"))
        .map(|c| (sub_row, c))
}

/// Map header labels in the first `layout.header_rows` rows to destination columns. A later header
/// matching a field replaces an earlier one, so a title above the header row never keeps a column.
/// Fails with [`Error::MissingColumns`] when groceries or agriculture is absent.
pub fn resolve_columns(sheet: &Sheet, layout: &LayoutConfig) -> Result<ColumnMap> {
    let mut map = ColumnMap::default();
    let last_row = layout.header_rows.min(sheet.max_row());
    let last_col = sheet.max_col();
    for row in 1..=last_row {
        for col in 1..=last_col {
            if sheet.is_merged_alias(row, col) {
                continue;
            }
            let text = norm(&sheet.display_text(row, col));
            if text.trim().is_empty() {
                continue;
            }
            let depth = header_bottom(sheet, row, col);
            if text.contains("abarrotes") {
                map.insert(ReportColumn::Groceries, col, depth);
            }
            if text.contains("agricultura") {
                map.insert(ReportColumn::Agriculture, col, depth);
            }
            if text.contains("escuela") || text.contains("establecimiento") {
                map.insert(ReportColumn::Establishments, col, depth);
            }
            if text.contains("proveedor") || text.contains("productor") {
                match producers_total_column(sheet, row, col, layout.sub_header_window) {
                    Some((sub_row, total_col)) => map.insert(ReportColumn::Producers, total_col, sub_row),
                    // Without a "Total" sub-header the header column is only a fallback.
                    None if !map.contains(ReportColumn::Producers) => {
                        map.insert(ReportColumn::Producers, col, depth)
                    }
                    None => {}
                }
            }
        }
    }
    debug!(sheet = sheet.name(), columns = %map, "header columns resolved");
    if !map.missing_mandatory().is_empty() {
        return Err(Error::MissingColumns { found: map });
    }
    Ok(map)
}

/// Normalized text of a row, merged aliases excluded.
pub fn row_text(sheet: &Sheet, row: u32) -> String {
    let parts: Vec<String> = (1..=sheet.max_col())
        .filter(|col| !sheet.is_merged_alias(row, *col))
        .map(|col| sheet.value(row, col).as_text())
        .filter(|s| !s.trim().is_empty())
        .collect();
    norm(&parts.join(" "))
}

/// Claim one destination row per region, scanning `limit` rows below the deepest header row.
pub fn resolve_rows(sheet: &Sheet, columns: &ColumnMap, resolver: &RegionResolver, limit: u32) -> RowMap {
    let mut rows = RowMap::default();
    let first = columns.header_depth() + 1;
    let last = first.saturating_add(limit.saturating_sub(1)).min(sheet.max_row());
    for row in first..=last {
        let text = row_text(sheet, row);
        if text.is_empty() {
            continue;
        }
        if let Some(region) = resolver.resolve(&text) {
            if rows.claim(region, row) {
                debug!(row, region = resolver.name(region), "region row claimed");
            }
        }
        if rows.len() == resolver.len() {
            break;
        }
    }
    rows
}

/// Detect the audit header row by scanning the top rows for audit labels; 1 when none is found.
pub fn detect_header_row(sheet: &Sheet) -> u32 {
    for row in 1..=sheet.max_row().min(20) {
        let keyword_count = (1..=sheet.max_col().min(20))
            .map(|col| norm(&sheet.display_text(row, col)))
            .filter(|text| AUDIT_KEYWORDS.iter().any(|k| text.contains(k)))
            .count();
        if keyword_count >= 3 {
            return row;
        }
    }
    1
}

/// Audit column holding identifiers: the header mentioning the authorization, else column 4.
pub fn identifier_column(sheet: &Sheet, header_row: u32) -> u32 {
    (1..=sheet.max_col())
        .find(|col| {
            let text = norm(&sheet.display_text(header_row, *col));
            text.contains("autorizacion") || text.contains("uuid")
        })
        .unwrap_or(AUDIT_IDENTIFIER_COLUMN)
}

/// Last row with any data at or below `header_row`.
pub fn find_last_data_row(sheet: &Sheet, header_row: u32) -> u32 {
    (header_row + 1..=sheet.max_row())
        .rev()
        .find(|row| !sheet.row_texts(*row).is_empty())
        .unwrap_or(header_row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::models::{CellValue, MergedRange};

    /// Title row, two-row header with merged "Proveedores" over "Cantidad | Total", then regions.
    fn report_sheet() -> Sheet {
        let mut s = Sheet::new("Informe");
        s.load_cell(1, 1, "INFORME DE COMPRAS".into());
        s.add_merged_range(MergedRange::new(1, 1, 1, 7));
        s.load_cell(3, 1, "Municipio".into());
        s.load_cell(3, 2, "Escuelas".into());
        s.load_cell(3, 3, "Abarrotes (Q)".into());
        s.load_cell(3, 4, "Agricultura Familiar (Q)".into());
        s.load_cell(3, 5, "Proveedores".into());
        s.add_merged_range(MergedRange::new(3, 5, 3, 6));
        s.load_cell(4, 5, "Cantidad".into());
        s.load_cell(4, 6, "Total".into());
        s.load_cell(5, 1, "Totonicapán".into());
        s.load_cell(6, 1, "San Cristóbal Totonicapán".into());
        s.load_cell(7, 1, "Momostenango".into());
        s.load_cell(7, 4, CellValue::Number(100.0));
        s.load_cell(8, 1, "Momostenango".into());
        s
    }

    #[test]
    fn test_resolve_columns_with_merged_sub_header() {
        let map = resolve_columns(&report_sheet(), &LayoutConfig::default()).unwrap();
        assert_eq!(map.get(ReportColumn::Establishments), Some(2));
        assert_eq!(map.get(ReportColumn::Groceries), Some(3));
        assert_eq!(map.get(ReportColumn::Agriculture), Some(4));
        assert_eq!(map.get(ReportColumn::Producers), Some(6));
        assert_eq!(map.header_depth(), 4);
    }

    #[test]
    fn test_keyword_title_does_not_keep_columns() {
        let mut s = report_sheet();
        s.load_cell(1, 1, "Informe de compras: abarrotes y agricultura familiar".into());
        let config = EngineConfig::default();
        let map = resolve_columns(&s, &config.layout).unwrap();
        assert_eq!(map.get(ReportColumn::Groceries), Some(3));
        assert_eq!(map.get(ReportColumn::Agriculture), Some(4));
        assert_eq!(map.header_depth(), 4);

        // Region names in column A stay out of the destination columns.
        let resolver = RegionResolver::new(&config.regions);
        let rows = resolve_rows(&s, &map, &resolver, config.layout.row_scan_limit);
        assert!(map.iter().all(|(_, col)| col != 1));
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn test_producers_fallback_to_own_column() {
        let mut s = report_sheet();
        s.load_cell(4, 6, "Monto".into());
        let map = resolve_columns(&s, &LayoutConfig::default()).unwrap();
        assert_eq!(map.get(ReportColumn::Producers), Some(5));
    }

    #[test]
    fn test_missing_mandatory_column() {
        let mut s = report_sheet();
        s.load_cell(3, 3, "Otros".into());
        match resolve_columns(&s, &LayoutConfig::default()) {
            Err(Error::MissingColumns { found }) => {
                assert!(found.contains(ReportColumn::Agriculture));
                assert!(!found.contains(ReportColumn::Groceries));
            }
            other => panic!("expected MissingColumns, got {:?}", other),
        }
    }

    #[test]
    fn test_header_beyond_scan_window_is_ignored() {
        let mut s = Sheet::new("x");
        s.load_cell(20, 1, "Abarrotes".into());
        s.load_cell(20, 2, "Agricultura".into());
        assert!(resolve_columns(&s, &LayoutConfig::default()).is_err());
    }

    #[test]
    fn test_resolve_rows_first_match_claims() {
        let sheet = report_sheet();
        let config = EngineConfig::default();
        let resolver = RegionResolver::new(&config.regions);
        let map = resolve_columns(&sheet, &config.layout).unwrap();
        let rows = resolve_rows(&sheet, &map, &resolver, config.layout.row_scan_limit);
        let id = |name: &str| resolver.resolve(&norm(name)).unwrap();
        assert_eq!(rows.get(id("Totonicapán")), Some(5));
        assert_eq!(rows.get(id("San Cristóbal Totonicapán")), Some(6));
        assert_eq!(rows.get(id("Momostenango")), Some(7));
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn test_row_scan_limit() {
        let sheet = report_sheet();
        let config = EngineConfig::default();
        let resolver = RegionResolver::new(&config.regions);
        let map = resolve_columns(&sheet, &config.layout).unwrap();
        let rows = resolve_rows(&sheet, &map, &resolver, 2);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_audit_header_detection() {
        let mut s = Sheet::new("Detalle Facturas");
        s.load_cell(1, 1, "Reporte".into());
        for (i, h) in AUDIT_HEADERS.iter().enumerate() {
            s.load_cell(2, i as u32 + 1, (*h).into());
        }
        s.load_cell(3, 4, "ABC".into());
        let header = detect_header_row(&s);
        assert_eq!(header, 2);
        assert_eq!(identifier_column(&s, header), 4);
        assert_eq!(find_last_data_row(&s, header), 3);
        assert_eq!(detect_header_row(&Sheet::new("vacia")), 1);
    }
}
