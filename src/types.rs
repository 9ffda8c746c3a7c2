use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default value for fields whose anchor was not found in the document.
pub const UNKNOWN: &str = "unknown";

/// Index of a region in the configured, closed region set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionId(pub u16);

/// The two tracked spending classifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Category A: general goods ("abarrotes").
    Groceries,
    /// Category B: locally-sourced produce ("agricultura").
    Agriculture,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CategorySums {
    pub groceries: f64,
    pub agriculture: f64,
}

impl CategorySums {
    pub fn get(&self, category: Category) -> f64 {
        match category {
            Category::Groceries => self.groceries,
            Category::Agriculture => self.agriculture,
        }
    }

    pub fn add(&mut self, category: Category, amount: f64) {
        match category {
            Category::Groceries => self.groceries += amount,
            Category::Agriculture => self.agriculture += amount,
        }
    }

    pub fn merge(&mut self, other: &CategorySums) {
        self.groceries += other.groceries;
        self.agriculture += other.agriculture;
    }

    pub fn total(&self) -> f64 {
        self.groceries + self.agriculture
    }

    /// Share of groceries in the categorized total; 0 when nothing was categorized.
    pub fn grocery_ratio(&self) -> f64 {
        let denominator = self.total();
        if denominator > 0.0 {
            self.groceries / denominator
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertFlag {
    Ok,
    HighGroceryRatio,
}

impl AlertFlag {
    pub fn from_sums(sums: &CategorySums, threshold: f64) -> Self {
        if sums.grocery_ratio() > threshold {
            AlertFlag::HighGroceryRatio
        } else {
            AlertFlag::Ok
        }
    }

    /// Text written to the audit sheet.
    pub fn audit_text(&self) -> &'static str {
        match self {
            AlertFlag::Ok => "OK",
            AlertFlag::HighGroceryRatio => "ALERTA: exceso de abarrotes",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierSource {
    /// Canonical 8-4-4-4-12 authorization identifier found in the text.
    Pattern,
    /// Degraded: the source file name stands in for the identifier.
    FileName,
}

/// One invoice after extraction and classification. Never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub identifier: String,
    pub identifier_source: IdentifierSource,
    pub source: String,
    pub region: Option<RegionId>,
    pub issuer_name: String,
    pub issuer_tax_id: String,
    pub receiver_tax_id: String,
    pub category_sums: CategorySums,
    pub alert: AlertFlag,
}

/// Output of the document-parsing collaborator: flattened text plus extracted tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedDocument {
    /// File name of the source document; loaders fill it in when absent.
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub text: String,
    /// Tables as rows of cell text.
    #[serde(default)]
    pub tables: Vec<Vec<Vec<String>>>,
}

impl ExtractedDocument {
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            text: text.into(),
            tables: Vec::new(),
        }
    }

    pub fn with_table(mut self, rows: Vec<Vec<String>>) -> Self {
        self.tables.push(rows);
        self
    }
}

/// A document the parsing collaborator could not turn into text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnreadableDocument {
    pub source: String,
    pub reason: String,
}

/// Per-document signals surfaced to whoever invoked the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BatchNotice {
    UnresolvedRegion { source: String, identifier: String },
    Duplicate { source: String, identifier: String },
    FileNameIdentifier { source: String },
    HighGroceryRatio { source: String, identifier: String, ratio: f64 },
    UnreadableDocument { source: String, reason: String },
    RegionWithoutRow { region: String },
}

impl BatchNotice {
    /// Duplicates are expected and informational; everything else is a warning.
    pub fn is_warning(&self) -> bool {
        !matches!(self, BatchNotice::Duplicate { .. })
    }
}

/// Totals written for one region, reported back in the summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionTotals {
    pub region: String,
    pub sums: CategorySums,
    pub establishments: usize,
    pub producers: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub new_count: usize,
    pub skipped_count: usize,
    pub unresolved_count: usize,
    pub unreadable_count: usize,
    pub notices: Vec<BatchNotice>,
    /// Records accepted in this run, in input order.
    pub records: Vec<InvoiceRecord>,
    pub totals: BTreeMap<String, RegionTotals>,
}

impl BatchSummary {
    pub fn warnings(&self) -> impl Iterator<Item = &BatchNotice> {
        self.notices.iter().filter(|n| n.is_warning())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracted_document_without_source() {
        let doc: ExtractedDocument = serde_json::from_str(r#"{"text":"Factura","tables":[]}"#).unwrap();
        assert_eq!(doc.source, "");
        assert_eq!(doc.text, "Factura");
    }

    #[test]
    fn test_grocery_ratio() {
        let sums = CategorySums {
            groceries: 30.0,
            agriculture: 70.0,
        };
        assert!((sums.grocery_ratio() - 0.30).abs() < 1e-9);
        assert_eq!(AlertFlag::from_sums(&sums, 0.30), AlertFlag::Ok);

        let sums = CategorySums {
            groceries: 31.0,
            agriculture: 69.0,
        };
        assert_eq!(AlertFlag::from_sums(&sums, 0.30), AlertFlag::HighGroceryRatio);
    }

    #[test]
    fn test_ratio_without_categorized_amounts() {
        let sums = CategorySums::default();
        assert_eq!(sums.grocery_ratio(), 0.0);
        assert_eq!(AlertFlag::from_sums(&sums, 0.30), AlertFlag::Ok);
    }

    #[test]
    fn test_extracted_document_from_json() {
        let doc: ExtractedDocument =
            serde_json::from_str(r#"{"source":"a.pdf","tables":[[["tomate","Q225,00"]]]}"#).unwrap();
        assert_eq!(doc.source, "a.pdf");
        assert!(doc.text.is_empty());
        assert_eq!(doc.tables[0][0][1], "Q225,00");
    }
}
