//! Currency string parsing tolerant of mixed separators and scan noise.

use regex::Regex;
use std::sync::OnceLock;

fn trailing_decimal_comma() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",(\d{1,2})$").expect("trailing comma regex"))
}

fn trailing_decimal_colon() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d):(\d{1,2})\s*$").expect("trailing colon regex"))
}

/// Parse a currency-like string ("Q1,200.00", "225,00", "8.986.00") into a non-negative amount.
/// Returns 0.0 when no number can be recovered.
///
/// A comma followed by one or two trailing digits is a decimal comma; otherwise commas are thousand
/// separators. When several periods survive, only the last one is the decimal point. A colon between
/// the digits and a final one- or two-digit group ("225:00") is a misrecognized decimal point; any other
/// colon is dropped with the rest of the non-numeric text.
pub fn parse_amount(raw: &str) -> f64 {
    let raw = trailing_decimal_colon().replace(raw, "$1.$2");
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();

    let mut s = if trailing_decimal_comma().is_match(&cleaned) {
        let without_periods = cleaned.replace('.', "");
        trailing_decimal_comma()
            .replace(&without_periods, ".$1")
            .into_owned()
    } else {
        cleaned.replace(',', "")
    };

    if s.matches('.').count() > 1 {
        if let Some(last) = s.rfind('.') {
            let (int_part, dec_part) = s.split_at(last);
            s = format!("{}{}", int_part.replace('.', ""), dec_part);
        }
    }

    match s.parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => v,
        _ => 0.0,
    }
}
