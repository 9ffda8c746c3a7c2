//! Free-form text to region resolution via longest-alias-first substring matching.

use crate::config::RegionConfig;
use crate::services::normalize::{collapse, norm};
use crate::types::RegionId;

#[derive(Debug, Clone)]
struct Alias {
    collapsed: String,
    region: RegionId,
}

/// Resolves normalized text to one of the configured regions.
///
/// Aliases are compared with whitespace and commas removed, longest first, so
/// "san cristobal totonicapan" wins over the plain "totonicapan" it contains.
#[derive(Debug, Clone)]
pub struct RegionResolver {
    aliases: Vec<Alias>,
    names: Vec<String>,
}

impl RegionResolver {
    pub fn new(regions: &[RegionConfig]) -> Self {
        let mut aliases = Vec::new();
        let mut names = Vec::with_capacity(regions.len());
        for (idx, region) in regions.iter().enumerate() {
            let id = RegionId(idx as u16);
            names.push(region.name.clone());
            for alias in std::iter::once(&region.name).chain(region.aliases.iter()) {
                let collapsed = collapse(&norm(alias));
                if collapsed.is_empty() || aliases.iter().any(|a: &Alias| a.collapsed == collapsed) {
                    continue;
                }
                aliases.push(Alias {
                    collapsed,
                    region: id,
                });
            }
        }
        // Stable sort keeps configuration order among aliases of equal length.
        aliases.sort_by(|a, b| b.collapsed.chars().count().cmp(&a.collapsed.chars().count()));
        Self { aliases, names }
    }

    /// First region whose alias occurs in `text`. `text` is expected to be normalized already.
    pub fn resolve(&self, text: &str) -> Option<RegionId> {
        let haystack = collapse(text);
        if haystack.is_empty() {
            return None;
        }
        self.aliases
            .iter()
            .find(|a| haystack.contains(&a.collapsed))
            .map(|a| a.region)
    }

    pub fn name(&self, region: RegionId) -> &str {
        self.names
            .get(region.0 as usize)
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn regions(&self) -> impl Iterator<Item = RegionId> + '_ {
        (0..self.names.len()).map(|i| RegionId(i as u16))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
