//! Batch-scoped state: identifiers already ingested and per-region running totals.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::models::Sheet;
use crate::services::excel_scanner::{detect_header_row, identifier_column};
use crate::types::{CategorySums, InvoiceRecord, RegionId, UNKNOWN};

/// Identifiers present in the audit sheet before the run, plus those accepted during it. Only grows.
#[derive(Debug, Clone, Default)]
pub struct ProcessedIdentifierSet {
    seen: HashSet<String>,
}

impl ProcessedIdentifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from the identifier column of an existing audit sheet.
    pub fn from_audit_sheet(sheet: &Sheet) -> Self {
        let header_row = detect_header_row(sheet);
        let col = identifier_column(sheet, header_row);
        let mut set = Self::new();
        for row in header_row + 1..=sheet.max_row() {
            let text = sheet.display_text(row, col);
            let text = text.trim();
            if !text.is_empty() {
                set.insert(text);
            }
        }
        set
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.seen.contains(&Self::key(identifier))
    }

    /// Returns false when the identifier was already present.
    pub fn insert(&mut self, identifier: &str) -> bool {
        self.seen.insert(Self::key(identifier))
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    // Pattern identifiers are upper-cased on extraction; hand-typed audit rows may not be.
    fn key(identifier: &str) -> String {
        identifier.trim().to_uppercase()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionAccumulator {
    pub sums: CategorySums,
    pub issuers: BTreeSet<String>,
    pub receivers: BTreeSet<String>,
}

impl RegionAccumulator {
    /// Nothing to write for this region.
    pub fn is_zero(&self) -> bool {
        self.sums.groceries == 0.0
            && self.sums.agriculture == 0.0
            && self.issuers.is_empty()
            && self.receivers.is_empty()
    }
}

/// Per-region sums and unique tax-ID sets for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchAccumulator {
    regions: BTreeMap<RegionId, RegionAccumulator>,
}

impl BatchAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one accepted record into its region. Records without a region are ignored.
    pub fn add(&mut self, record: &InvoiceRecord) {
        let Some(region) = record.region else {
            return;
        };
        let entry = self.regions.entry(region).or_default();
        entry.sums.merge(&record.category_sums);
        if record.issuer_tax_id != UNKNOWN {
            entry.issuers.insert(record.issuer_tax_id.clone());
        }
        if record.receiver_tax_id != UNKNOWN {
            entry.receivers.insert(record.receiver_tax_id.clone());
        }
    }

    pub fn get(&self, region: RegionId) -> Option<&RegionAccumulator> {
        self.regions.get(&region)
    }

    pub fn iter(&self) -> impl Iterator<Item = (RegionId, &RegionAccumulator)> + '_ {
        self.regions.iter().map(|(k, v)| (*k, v))
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}
