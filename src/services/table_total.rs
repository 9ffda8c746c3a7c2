//! Locating the line-total column of an extracted table whose column order is not fixed.

use crate::services::amount::parse_amount;
use crate::services::normalize::norm;

/// Index of the first cell (row by row, cell by cell) that reads "total" and does not mention a
/// discount keyword. `None` when no row carries such a header.
pub fn locate_total_column(rows: &[Vec<String>], discount_keywords: &[String]) -> Option<usize> {
    let discount: Vec<String> = discount_keywords.iter().map(|k| norm(k)).collect();
    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            let text = norm(cell);
            if text.contains("total") && !discount.iter().any(|d| !d.is_empty() && text.contains(d)) {
                return Some(idx);
            }
        }
    }
    None
}

/// Monetary value of one row: the located total column first, then the row's cells from last to
/// first until a positive amount parses. 0.0 when nothing does.
pub fn row_amount(row: &[String], total_column: Option<usize>) -> f64 {
    if let Some(cell) = total_column.and_then(|idx| row.get(idx)) {
        let value = parse_amount(cell);
        if value > 0.0 {
            return value;
        }
    }
    row.iter()
        .rev()
        .map(|cell| parse_amount(cell))
        .find(|v| *v > 0.0)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    fn discounts() -> Vec<String> {
        vec!["descuento".to_string()]
    }

    #[test]
    fn test_skips_discount_column() {
        let rows = vec![
            row(&["Cant.", "Descripción", "Precio", "Total Descuento", "Total"]),
            row(&["2", "Tomate", "Q5.00", "Q0.00", "Q10.00"]),
        ];
        assert_eq!(locate_total_column(&rows, &discounts()), Some(4));
    }

    #[test]
    fn test_header_in_later_row() {
        let rows = vec![
            row(&["Factura 123"]),
            row(&["Descripción", "TOTAL (Q)", "Cant."]),
        ];
        assert_eq!(locate_total_column(&rows, &discounts()), Some(1));
    }

    #[test]
    fn test_not_found() {
        let rows = vec![row(&["1", "Arroz", "Q25,00"])];
        assert_eq!(locate_total_column(&rows, &discounts()), None);
        assert_eq!(locate_total_column(&[], &discounts()), None);
    }

    #[test]
    fn test_row_amount_prefers_located_column() {
        let r = row(&["2", "Tomate", "Q5.00", "Q10.00"]);
        assert_eq!(row_amount(&r, Some(2)), 5.0);
        assert_eq!(row_amount(&r, None), 10.0);
    }

    #[test]
    fn test_row_amount_falls_back_when_short_or_blank() {
        let short = row(&["1", "Tomate", "Q225,00"]);
        assert_eq!(row_amount(&short, Some(5)), 225.0);

        let blank_total = row(&["1", "Tomate", "Q225,00", ""]);
        assert_eq!(row_amount(&blank_total, Some(3)), 225.0);

        let nothing = row(&["", "-"]);
        assert_eq!(row_amount(&nothing, Some(0)), 0.0);
    }
}
