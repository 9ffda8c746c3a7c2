//! Identity fields pulled from the flattened document text.
//!
//! Each field is a pure function with an explicit default; a missing anchor never aborts the document.

use regex::Regex;
use std::sync::OnceLock;

use crate::config::AnchorConfig;
use crate::services::normalize::find_folded;
use crate::types::{IdentifierSource, UNKNOWN};

fn uuid_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}")
            .expect("static regex")
    })
}

fn tax_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*([A-Za-z0-9-]+)").expect("static regex"))
}

/// Authorization UUID, upper-cased. Falls back to the source file name when the text has none.
pub fn extract_identifier(text: &str, source: &str) -> (String, IdentifierSource) {
    match uuid_regex().find(text) {
        Some(m) => (m.as_str().to_uppercase(), IdentifierSource::Pattern),
        None => (source.to_string(), IdentifierSource::FileName),
    }
}

/// First `[A-Za-z0-9-]` run after `anchor`, skipping leading whitespace.
pub fn extract_tax_id(text: &str, anchor: &str) -> String {
    find_folded(text, anchor)
        .and_then(|(_, end)| tax_id_regex().captures(&text[end..]))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// Text between the invoice-type anchor and the issuer tax-ID anchor that follows it, line breaks
/// folded, cut at the first noise anchor.
pub fn extract_issuer_name(text: &str, anchors: &AnchorConfig) -> String {
    let Some((_, start)) = find_folded(text, &anchors.invoice_type) else {
        return UNKNOWN.to_string();
    };
    let rest = &text[start..];
    let Some((end, _)) = find_folded(rest, &anchors.issuer_name_end) else {
        return UNKNOWN.to_string();
    };
    let mut name = rest[..end].split_whitespace().collect::<Vec<_>>().join(" ");
    let cut = anchors
        .name_noise
        .iter()
        .filter_map(|noise| find_folded(&name, noise).map(|(s, _)| s))
        .min();
    if let Some(cut) = cut {
        name.truncate(cut);
    }
    let name = name.trim_matches(|c: char| c.is_whitespace() || c == ':' || c == '-').trim();
    if name.is_empty() {
        UNKNOWN.to_string()
    } else {
        name.to_string()
    }
}

/// All identity fields of one document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentFields {
    pub identifier: String,
    pub identifier_source: IdentifierSource,
    pub issuer_name: String,
    pub issuer_tax_id: String,
    pub receiver_tax_id: String,
}

pub fn extract_fields(text: &str, source: &str, anchors: &AnchorConfig) -> DocumentFields {
    let (identifier, identifier_source) = extract_identifier(text, source);
    DocumentFields {
        identifier,
        identifier_source,
        issuer_name: extract_issuer_name(text, anchors),
        issuer_tax_id: extract_tax_id(text, &anchors.issuer_tax_id),
        receiver_tax_id: extract_tax_id(text, &anchors.receiver_tax_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEL: &str = "DOCUMENTO TRIBUTARIO ELECTRÓNICO\nFactura\nAGROSERVICIOS\nLA COSECHA, S.A.\n\
NIT Emisor: 1234567-8\nNúmero de Autorización:\n3f2a9c10-4b7d-4e21-9a0c-5d6e7f8a9b01\n\
Serie: 3F2A9C10 Número de DTE: 1266436641\nNIT Receptor: CF\nDirección: Cantón Xequemeya, Momostenango, Totonicapán";

    fn anchors() -> AnchorConfig {
        AnchorConfig::default()
    }

    #[test]
    fn test_identifier_upper_cased() {
        let (id, source) = extract_identifier(FEL, "factura_01.pdf");
        assert_eq!(id, "3F2A9C10-4B7D-4E21-9A0C-5D6E7F8A9B01");
        assert_eq!(source, IdentifierSource::Pattern);
    }

    #[test]
    fn test_identifier_falls_back_to_file_name() {
        let (id, source) = extract_identifier("Factura sin autorización", "scan 7.pdf");
        assert_eq!(id, "scan 7.pdf");
        assert_eq!(source, IdentifierSource::FileName);
    }

    #[test]
    fn test_tax_ids() {
        assert_eq!(extract_tax_id(FEL, "Emisor:"), "1234567-8");
        assert_eq!(extract_tax_id(FEL, "Receptor:"), "CF");
        assert_eq!(extract_tax_id("NIT emisor:   98765K", "Emisor:"), "98765K");
        assert_eq!(extract_tax_id("Sin datos", "Emisor:"), UNKNOWN);
        assert_eq!(extract_tax_id("NIT Emisor: ###", "Emisor:"), UNKNOWN);
    }

    #[test]
    fn test_issuer_name_across_line_breaks() {
        assert_eq!(extract_issuer_name(FEL, &anchors()), "AGROSERVICIOS LA COSECHA, S.A.");
    }

    #[test]
    fn test_issuer_name_truncated_at_noise() {
        let text = "FACTURA Tienda El Sol Serie: A1 NIT Emisor: 55";
        assert_eq!(extract_issuer_name(text, &anchors()), "Tienda El Sol");
    }

    #[test]
    fn test_issuer_name_missing_anchor() {
        assert_eq!(extract_issuer_name("Recibo Tienda NIT Emisor: 1", &anchors()), UNKNOWN);
        assert_eq!(extract_issuer_name("Factura Tienda sin nit", &anchors()), UNKNOWN);
    }

    #[test]
    fn test_extract_fields_defaults() {
        let fields = extract_fields("", "vacio.pdf", &anchors());
        assert_eq!(fields.identifier, "vacio.pdf");
        assert_eq!(fields.issuer_name, UNKNOWN);
        assert_eq!(fields.issuer_tax_id, UNKNOWN);
        assert_eq!(fields.receiver_tax_id, UNKNOWN);
    }
}
