//! The reconciliation run: resolve the report layout, process documents in input order, then merge
//! the batch into the workbook.

use std::fmt;
use tracing::{debug, error, info, info_span, warn};

use crate::batch::{BatchAccumulator, ProcessedIdentifierSet};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::models::{ColumnMap, RowMap, Sheet, Workbook};
use crate::reconcile::{append_audit_rows, write_totals};
use crate::services::classify::CategoryClassifier;
use crate::services::excel_scanner::{resolve_columns, resolve_rows};
use crate::services::fields::extract_fields;
use crate::services::normalize::norm;
use crate::services::region::RegionResolver;
use crate::types::{
    AlertFlag, BatchNotice, BatchSummary, ExtractedDocument, IdentifierSource, InvoiceRecord,
    UnreadableDocument,
};

/// Run-level states. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RunState {
    AwaitingInputs,
    ColumnsResolved,
    RowsResolved,
    ProcessingDocuments,
    Reconciled,
    Persisted,
    StructuralError,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::AwaitingInputs => "awaiting_inputs",
            RunState::ColumnsResolved => "columns_resolved",
            RunState::RowsResolved => "rows_resolved",
            RunState::ProcessingDocuments => "processing_documents",
            RunState::Reconciled => "reconciled",
            RunState::Persisted => "persisted",
            RunState::StructuralError => "structural_error",
        };
        f.write_str(s)
    }
}

/// Per-document states inside `ProcessingDocuments`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    Extracted,
    Classified,
    Deduplicated,
    Skipped,
    Aggregated,
}

#[derive(Debug)]
struct RunTracker {
    state: RunState,
}

impl RunTracker {
    fn new() -> Self {
        debug!(state = %RunState::AwaitingInputs, "run state");
        Self {
            state: RunState::AwaitingInputs,
        }
    }

    fn advance(&mut self, next: RunState) {
        debug_assert!(next > self.state, "run state {} revisited from {}", next, self.state);
        debug!(from = %self.state, to = %next, "run state");
        self.state = next;
    }
}

/// Layout resolved once per workbook.
#[derive(Debug, Clone)]
pub struct ReportLayout {
    pub sheet_name: String,
    pub columns: ColumnMap,
    pub rows: RowMap,
}

pub struct Engine {
    config: EngineConfig,
    resolver: RegionResolver,
    classifier: CategoryClassifier,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let resolver = RegionResolver::new(&config.regions);
        let classifier = CategoryClassifier::new(&config.keywords);
        Ok(Self {
            config,
            resolver,
            classifier,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn resolver(&self) -> &RegionResolver {
        &self.resolver
    }

    fn main_sheet<'w>(&self, workbook: &'w Workbook) -> Result<&'w Sheet> {
        match &self.config.layout.main_sheet {
            Some(name) => workbook
                .sheet(name)
                .ok_or_else(|| Error::Workbook(format!("Worksheet '{}' not found", name))),
            None => workbook
                .first_sheet()
                .ok_or_else(|| Error::Workbook("Workbook has no worksheets".to_string())),
        }
    }

    /// Column and row maps of the main sheet.
    pub fn resolve_layout(&self, workbook: &Workbook) -> Result<ReportLayout> {
        let sheet = self.main_sheet(workbook)?;
        let layout = &self.config.layout;
        let columns = resolve_columns(sheet, layout)?;
        let rows = resolve_rows(sheet, &columns, &self.resolver, layout.row_scan_limit);
        Ok(ReportLayout {
            sheet_name: sheet.name().to_string(),
            columns,
            rows,
        })
    }

    /// Extraction, region resolution and classification of one document.
    pub fn process_document(&self, doc: &ExtractedDocument) -> InvoiceRecord {
        let fields = extract_fields(&doc.text, &doc.source, &self.config.anchors);
        debug!(state = ?DocumentState::Extracted, identifier = %fields.identifier);
        let region = self.resolver.resolve(&norm(&doc.text));
        let category_sums = self.classifier.classify_tables(&doc.tables);
        let alert = AlertFlag::from_sums(&category_sums, self.config.alert_ratio);
        debug!(
            state = ?DocumentState::Classified,
            groceries = category_sums.groceries,
            agriculture = category_sums.agriculture
        );
        InvoiceRecord {
            identifier: fields.identifier,
            identifier_source: fields.identifier_source,
            source: doc.source.clone(),
            region,
            issuer_name: fields.issuer_name,
            issuer_tax_id: fields.issuer_tax_id,
            receiver_tax_id: fields.receiver_tax_id,
            category_sums,
            alert,
        }
    }

    /// Run the batch against `workbook` in memory. Nothing is persisted.
    pub fn run<I>(&self, workbook: &mut Workbook, documents: I) -> Result<BatchSummary>
    where
        I: IntoIterator<Item = std::result::Result<ExtractedDocument, UnreadableDocument>>,
    {
        let mut tracker = RunTracker::new();
        self.run_tracked(&mut tracker, workbook, documents)
    }

    /// Run the batch, then hand the workbook to `persist`. The workbook is persisted only when every
    /// previous step succeeded.
    pub fn run_and_persist<I, F>(&self, workbook: &mut Workbook, documents: I, persist: F) -> Result<BatchSummary>
    where
        I: IntoIterator<Item = std::result::Result<ExtractedDocument, UnreadableDocument>>,
        F: FnOnce(&Workbook) -> Result<()>,
    {
        let mut tracker = RunTracker::new();
        let summary = self.run_tracked(&mut tracker, workbook, documents)?;
        persist(workbook)?;
        tracker.advance(RunState::Persisted);
        Ok(summary)
    }

    fn run_tracked<I>(&self, tracker: &mut RunTracker, workbook: &mut Workbook, documents: I) -> Result<BatchSummary>
    where
        I: IntoIterator<Item = std::result::Result<ExtractedDocument, UnreadableDocument>>,
    {
        let layout = match self.resolve_layout(workbook) {
            Ok(layout) => layout,
            Err(e) => {
                tracker.advance(RunState::StructuralError);
                error!(error = %e, "report layout could not be resolved");
                return Err(e);
            }
        };
        tracker.advance(RunState::ColumnsResolved);
        info!(sheet = %layout.sheet_name, columns = %layout.columns, "columns resolved");
        tracker.advance(RunState::RowsResolved);
        info!(rows = layout.rows.len(), "region rows resolved");

        let audit_name = &self.config.layout.audit_sheet;
        let mut processed = workbook
            .sheet(audit_name)
            .map(ProcessedIdentifierSet::from_audit_sheet)
            .unwrap_or_default();
        debug!(count = processed.len(), "identifiers already ingested");

        tracker.advance(RunState::ProcessingDocuments);
        let mut summary = BatchSummary::default();
        let mut batch = BatchAccumulator::new();
        for item in documents {
            let doc = match item {
                Ok(doc) => doc,
                Err(unreadable) => {
                    warn!(source = %unreadable.source, reason = %unreadable.reason, "document unreadable");
                    summary.unreadable_count += 1;
                    summary.notices.push(BatchNotice::UnreadableDocument {
                        source: unreadable.source,
                        reason: unreadable.reason,
                    });
                    continue;
                }
            };
            let span = info_span!("document", source = %doc.source);
            let _guard = span.enter();

            let record = self.process_document(&doc);
            if record.region.is_none() {
                warn!(identifier = %record.identifier, "region could not be resolved; document skipped");
                summary.unresolved_count += 1;
                summary.notices.push(BatchNotice::UnresolvedRegion {
                    source: record.source,
                    identifier: record.identifier,
                });
                continue;
            }
            if record.identifier_source == IdentifierSource::FileName {
                warn!("no authorization identifier found; using file name");
                summary.notices.push(BatchNotice::FileNameIdentifier {
                    source: record.source.clone(),
                });
            }
            if !processed.insert(&record.identifier) {
                debug!(state = ?DocumentState::Skipped, identifier = %record.identifier);
                info!(identifier = %record.identifier, "already ingested; skipped");
                summary.skipped_count += 1;
                summary.notices.push(BatchNotice::Duplicate {
                    source: record.source,
                    identifier: record.identifier,
                });
                continue;
            }
            debug!(state = ?DocumentState::Deduplicated);

            batch.add(&record);
            if record.alert == AlertFlag::HighGroceryRatio {
                let ratio = record.category_sums.grocery_ratio();
                warn!(ratio, "grocery share above threshold");
                summary.notices.push(BatchNotice::HighGroceryRatio {
                    source: record.source.clone(),
                    identifier: record.identifier.clone(),
                    ratio,
                });
            }
            debug!(state = ?DocumentState::Aggregated);
            summary.new_count += 1;
            summary.records.push(record);
        }

        let sheet = workbook
            .sheet_mut(&layout.sheet_name)
            .ok_or_else(|| Error::Workbook(format!("Worksheet '{}' not found", layout.sheet_name)))?;
        let (totals, notices) = write_totals(sheet, &layout.columns, &layout.rows, &batch, &self.resolver);
        summary.totals = totals;
        summary.notices.extend(notices);
        append_audit_rows(workbook, &self.config.layout, &summary.records, &self.resolver);
        tracker.advance(RunState::Reconciled);
        info!(
            new = summary.new_count,
            skipped = summary.skipped_count,
            unresolved = summary.unresolved_count,
            unreadable = summary.unreadable_count,
            "batch reconciled"
        );
        Ok(summary)
    }
}
