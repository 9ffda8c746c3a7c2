//! Row-level spending classification by keyword membership.

use crate::config::KeywordConfig;
use crate::services::normalize::norm;
use crate::services::table_total::{locate_total_column, row_amount};
use crate::types::{Category, CategorySums};

/// Normalized keyword sets for the two categories.
#[derive(Debug, Clone)]
pub struct CategoryClassifier {
    groceries: Vec<String>,
    agriculture: Vec<String>,
    discount: Vec<String>,
}

impl CategoryClassifier {
    pub fn new(keywords: &KeywordConfig) -> Self {
        let prepare = |items: &[String]| -> Vec<String> {
            items
                .iter()
                .map(|k| norm(k.trim()))
                .filter(|k| !k.is_empty())
                .collect()
        };
        Self {
            groceries: prepare(&keywords.groceries),
            agriculture: prepare(&keywords.agriculture),
            discount: prepare(&keywords.discount),
        }
    }

    /// Categories whose keywords occur in `row_text` (already normalized). The two tests are
    /// independent: a row naming both kinds of goods counts toward both.
    pub fn categories(&self, row_text: &str) -> Vec<Category> {
        let mut found = Vec::with_capacity(2);
        if self.groceries.iter().any(|k| row_text.contains(k.as_str())) {
            found.push(Category::Groceries);
        }
        if self.agriculture.iter().any(|k| row_text.contains(k.as_str())) {
            found.push(Category::Agriculture);
        }
        found
    }

    /// Add one row's amount to every matching category.
    pub fn classify_row(&self, row: &[String], total_column: Option<usize>, sums: &mut CategorySums) {
        let text = norm(&row.join(" "));
        let categories = self.categories(&text);
        if categories.is_empty() {
            return;
        }
        let amount = row_amount(row, total_column);
        for category in categories {
            sums.add(category, amount);
        }
    }

    /// Category sums over every row of every table in a document.
    pub fn classify_tables(&self, tables: &[Vec<Vec<String>>]) -> CategorySums {
        let mut sums = CategorySums::default();
        for table in tables {
            let total_column = locate_total_column(table, &self.discount);
            for row in table {
                self.classify_row(row, total_column, &mut sums);
            }
        }
        sums
    }
}
