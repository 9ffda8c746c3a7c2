//! Merging batch totals into the report sheet and appending audit rows.

use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::batch::BatchAccumulator;
use crate::config::LayoutConfig;
use crate::models::{cell_ref, CellStyle, CellValue, ColumnMap, ReportColumn, RowMap, Sheet, Workbook};
use crate::services::excel_scanner::{detect_header_row, find_last_data_row, AUDIT_HEADERS};
use crate::services::region::RegionResolver;
use crate::types::{BatchNotice, InvoiceRecord, RegionTotals};

/// Add each region's accumulated values onto its destination row. Prior cell values are read
/// tolerantly; zero contributions leave the cell untouched.
pub fn write_totals(
    sheet: &mut Sheet,
    columns: &ColumnMap,
    rows: &RowMap,
    batch: &BatchAccumulator,
    resolver: &RegionResolver,
) -> (BTreeMap<String, RegionTotals>, Vec<BatchNotice>) {
    let mut totals = BTreeMap::new();
    let mut notices = Vec::new();
    for (region, acc) in batch.iter() {
        if acc.is_zero() {
            continue;
        }
        let name = resolver.name(region).to_string();
        totals.insert(
            name.clone(),
            RegionTotals {
                region: name.clone(),
                sums: acc.sums,
                establishments: acc.receivers.len(),
                producers: acc.issuers.len(),
            },
        );
        let Some(row) = rows.get(region) else {
            warn!(region = %name, "no destination row for region; totals not written");
            notices.push(BatchNotice::RegionWithoutRow { region: name });
            continue;
        };
        for (column, col) in columns.iter() {
            let contribution = match column {
                ReportColumn::Groceries => acc.sums.groceries,
                ReportColumn::Agriculture => acc.sums.agriculture,
                ReportColumn::Establishments => acc.receivers.len() as f64,
                ReportColumn::Producers => acc.issuers.len() as f64,
            };
            if contribution == 0.0 {
                continue;
            }
            let (r, c) = sheet.writable_cell(row, col);
            let prior = sheet.value(r, c).as_amount();
            sheet.write(r, c, CellValue::Number(prior + contribution), CellStyle::Keep);
            debug!(
                cell = %cell_ref(r, c),
                column = column.label(),
                prior,
                contribution,
                "total updated"
            );
        }
    }
    (totals, notices)
}

/// Audit values for one record, in [`AUDIT_HEADERS`] order.
fn audit_row(record: &InvoiceRecord, resolver: &RegionResolver) -> [String; 6] {
    [
        record.issuer_name.clone(),
        record.issuer_tax_id.clone(),
        record.receiver_tax_id.clone(),
        record.identifier.clone(),
        record
            .region
            .map(|r| resolver.name(r).to_string())
            .unwrap_or_default(),
        record.alert.audit_text().to_string(),
    ]
}

/// Append one row per accepted record to the audit sheet, creating it with a header row if absent.
/// Returns the 1-based rows written.
pub fn append_audit_rows(
    workbook: &mut Workbook,
    layout: &LayoutConfig,
    records: &[InvoiceRecord],
    resolver: &RegionResolver,
) -> Vec<u32> {
    let exists = workbook.sheet(&layout.audit_sheet).is_some();
    let sheet = workbook.create_sheet(&layout.audit_sheet);
    let header_row = if exists {
        detect_header_row(sheet)
    } else {
        for (i, header) in AUDIT_HEADERS.iter().enumerate() {
            sheet.write(1, i as u32 + 1, (*header).into(), CellStyle::Header);
        }
        1
    };
    if records.is_empty() {
        return Vec::new();
    }
    let mut next = find_last_data_row(sheet, header_row) + 1;
    let mut written = Vec::with_capacity(records.len());
    for record in records {
        for (i, value) in audit_row(record, resolver).into_iter().enumerate() {
            sheet.write(next, i as u32 + 1, value.into(), CellStyle::Bordered);
        }
        written.push(next);
        next += 1;
    }
    for col in 1..=AUDIT_HEADERS.len() as u32 {
        sheet.set_column_width(col, layout.audit_column_width);
    }
    written
}
