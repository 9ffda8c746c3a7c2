//! Engine configuration: regions, keyword sets, text anchors and workbook layout bounds.
//!
//! Loaded from TOML. Every section has defaults, so an empty file (or no file) yields the built-in
//! Totonicapán profile.

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Grocery share of categorized spending above which a document is flagged.
    pub alert_ratio: f64,
    pub regions: Vec<RegionConfig>,
    pub keywords: KeywordConfig,
    pub anchors: AnchorConfig,
    pub layout: LayoutConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionConfig {
    /// Canonical name, written to the audit sheet.
    pub name: String,
    /// Spellings matched against document and row text. The canonical name is always included.
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordConfig {
    pub groceries: Vec<String>,
    pub agriculture: Vec<String>,
    /// Header words that disqualify a column from being the line-total column.
    pub discount: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorConfig {
    pub issuer_tax_id: String,
    pub receiver_tax_id: String,
    pub invoice_type: String,
    pub issuer_name_end: String,
    /// Trailing text sometimes glued to the issuer name; the name is cut at the first one found.
    pub name_noise: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Main report sheet; the first sheet when unset.
    pub main_sheet: Option<String>,
    pub audit_sheet: String,
    /// Rows scanned from the top for header labels.
    pub header_rows: u32,
    /// Columns inspected beneath a merged producers header for its "Total" sub-column.
    pub sub_header_window: u32,
    /// Rows scanned below the header for region names.
    pub row_scan_limit: u32,
    pub audit_column_width: f64,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn region(name: &str, aliases: &[&str]) -> RegionConfig {
    RegionConfig {
        name: name.to_string(),
        aliases: strings(aliases),
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            alert_ratio: 0.30,
            regions: vec![
                region("Totonicapán", &["totonicapan"]),
                region("San Cristóbal Totonicapán", &["san cristobal totonicapan", "san cristobal"]),
                region("San Francisco El Alto", &["san francisco el alto"]),
                region("San Andrés Xecul", &["san andres xecul", "xecul"]),
                region("Momostenango", &["momostenango"]),
                region("Santa María Chiquimula", &["santa maria chiquimula", "chiquimula"]),
                region("Santa Lucía La Reforma", &["santa lucia la reforma", "la reforma"]),
                region(
                    "San Bartolo Aguas Calientes",
                    &["san bartolo aguas calientes", "san bartolo"],
                ),
            ],
            keywords: KeywordConfig::default(),
            anchors: AnchorConfig::default(),
            layout: LayoutConfig::default(),
        }
    }
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            groceries: strings(&[
                "arroz", "azucar", "aceite", "frijol", "harina", "pasta", "fideo", "mosh", "avena",
                "incaparina", "atol", "sardina", "atun", "leche", "cafe", "consome", "maseca",
                "margarina", "mayonesa", "salsa", "galleta", "cereal", "vitacereal", "lenteja",
                "soya", "maiz",
            ]),
            agriculture: strings(&[
                "tomate", "cebolla", "papa", "zanahoria", "guisquil", "guicoy", "repollo", "lechuga",
                "brocoli", "coliflor", "chile", "pimiento", "aguacate", "banano", "platano",
                "naranja", "limon", "manzana", "sandia", "melon", "mango", "hierba", "acelga",
                "espinaca", "cilantro", "rabano", "remolacha", "elote", "ejote", "arveja", "huevo",
                "pollo",
            ]),
            discount: strings(&["descuento", "dscto"]),
        }
    }
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            issuer_tax_id: "Emisor:".to_string(),
            receiver_tax_id: "Receptor:".to_string(),
            invoice_type: "Factura".to_string(),
            issuer_name_end: "NIT Emisor".to_string(),
            name_noise: strings(&["Número de Autorización", "Serie"]),
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            main_sheet: None,
            audit_sheet: "Detalle Facturas".to_string(),
            header_rows: 15,
            sub_header_window: 3,
            row_scan_limit: 200,
            audit_column_width: 28.0,
        }
    }
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Could not read {}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.regions.is_empty() {
            return Err(Error::Config("at least one region is required".to_string()));
        }
        if self.regions.len() > u16::MAX as usize {
            return Err(Error::Config("too many regions".to_string()));
        }
        for (i, r) in self.regions.iter().enumerate() {
            if r.name.trim().is_empty() {
                return Err(Error::Config(format!("region #{} has an empty name", i + 1)));
            }
            if self.regions[..i].iter().any(|other| other.name == r.name) {
                return Err(Error::Config(format!("duplicate region '{}'", r.name)));
            }
        }
        if self.keywords.groceries.is_empty() || self.keywords.agriculture.is_empty() {
            return Err(Error::Config(
                "both groceries and agriculture keyword sets must be non-empty".to_string(),
            ));
        }
        if !(self.alert_ratio > 0.0 && self.alert_ratio <= 1.0) {
            return Err(Error::Config(format!(
                "alert_ratio must be within (0, 1], got {}",
                self.alert_ratio
            )));
        }
        if self.layout.header_rows == 0 || self.layout.audit_sheet.trim().is_empty() {
            return Err(Error::Config(
                "layout needs header_rows > 0 and an audit sheet name".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.regions.len(), 8);
        assert_eq!(config.alert_ratio, 0.30);
    }

    #[test]
    fn test_empty_toml_yields_defaults() {
        let config = EngineConfig::from_toml("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let toml = r#"
alert_ratio = 0.5

[[regions]]
name = "Quetzaltenango"
aliases = ["xela"]

[layout]
audit_sheet = "Auditoria"
"#;
        let config = EngineConfig::from_toml(toml).unwrap();
        assert_eq!(config.regions.len(), 1);
        assert_eq!(config.regions[0].aliases, vec!["xela"]);
        assert_eq!(config.layout.audit_sheet, "Auditoria");
        assert_eq!(config.layout.header_rows, 15);
        assert_eq!(config.keywords, KeywordConfig::default());
    }

    #[test]
    fn test_rejects_bad_ratio_and_duplicates() {
        assert!(matches!(
            EngineConfig::from_toml("alert_ratio = 1.5"),
            Err(Error::Config(_))
        ));
        let dup = r#"
[[regions]]
name = "A"
[[regions]]
name = "A"
"#;
        assert!(matches!(EngineConfig::from_toml(dup), Err(Error::Config(_))));
    }

    #[test]
    fn test_round_trips_through_toml() {
        let config = EngineConfig::default();
        let text = config.to_toml().unwrap();
        assert_eq!(EngineConfig::from_toml(&text).unwrap(), config);
    }
}
