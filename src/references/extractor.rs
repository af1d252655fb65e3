//! Reference extractors: raw property value -> entity references.
//!
//! Extraction is total. Untrusted content must never be able to fail a save,
//! so malformed values produce no references and a warning.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use super::link::parse_links;
use crate::entity::{EntityIdentifier, EntityReference};
use crate::error::Result;

/// Editor alias of the multi URL picker (JSON link list).
pub const MULTI_URL_PICKER_ALIAS: &str = "Umbraco.MultiUrlPicker";
/// Editor alias of the rich text editor (HTML with `data-udi` attributes).
pub const RICH_TEXT_ALIAS: &str = "Umbraco.TinyMCE";

/// A property editor whose values can embed entity references.
pub trait DataValueReference: Send + Sync {
    /// Alias of the property editor this extractor understands
    fn editor_alias(&self) -> &str;

    /// References in `value`, in document order, duplicates kept
    fn references(&self, value: Option<&str>) -> Vec<EntityReference>;
}

/// Extracts references from a stored link-picker list.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinkListExtractor;

impl LinkListExtractor {
    /// Fallible form of [`DataValueReference::references`]
    pub fn try_references(&self, value: Option<&str>) -> Result<Vec<EntityReference>> {
        let links = parse_links(value.unwrap_or_default())?;
        Ok(links
            .iter()
            .filter_map(|link| link.udi().copied())
            .map(EntityReference::new)
            .collect())
    }
}

impl DataValueReference for LinkListExtractor {
    fn editor_alias(&self) -> &str {
        MULTI_URL_PICKER_ALIAS
    }

    fn references(&self, value: Option<&str>) -> Vec<EntityReference> {
        match self.try_references(value) {
            Ok(references) => references,
            Err(e) => {
                log::warn!("Ignoring malformed {} value: {}", MULTI_URL_PICKER_ALIAS, e);
                Vec::new()
            }
        }
    }
}

fn data_udi_regex() -> &'static Regex {
    static DATA_UDI: OnceLock<Regex> = OnceLock::new();
    DATA_UDI.get_or_init(|| {
        Regex::new(r#"data-udi\s*=\s*["'](umb://[^"']+)["']"#).expect("Invalid regex pattern")
    })
}

/// Extracts `data-udi` references from rich-text HTML.
#[derive(Debug, Default, Clone, Copy)]
pub struct RichTextExtractor;

impl DataValueReference for RichTextExtractor {
    fn editor_alias(&self) -> &str {
        RICH_TEXT_ALIAS
    }

    fn references(&self, value: Option<&str>) -> Vec<EntityReference> {
        let Some(html) = value.filter(|v| !v.trim().is_empty()) else {
            return Vec::new();
        };
        data_udi_regex()
            .captures_iter(html)
            .filter_map(|cap| {
                let raw = cap.get(1)?.as_str();
                match raw.parse::<EntityIdentifier>() {
                    Ok(udi) => Some(EntityReference::new(udi)),
                    Err(e) => {
                        log::warn!("Skipping unparsable data-udi '{}': {}", raw, e);
                        None
                    }
                }
            })
            .collect()
    }
}

/// Extractor registry that selects an extractor by property editor alias
pub struct ExtractorRegistry {
    extractors: HashMap<String, Box<dyn DataValueReference>>,
}

impl ExtractorRegistry {
    /// Create a new registry with all built-in extractors
    pub fn new() -> Self {
        let mut registry = Self {
            extractors: HashMap::new(),
        };

        registry.register(Box::new(LinkListExtractor));
        registry.register(Box::new(RichTextExtractor));

        registry
    }

    /// Register an extractor, replacing any earlier one for the same editor
    pub fn register(&mut self, extractor: Box<dyn DataValueReference>) {
        self.extractors
            .insert(extractor.editor_alias().to_string(), extractor);
    }

    pub fn find(&self, editor_alias: &str) -> Option<&dyn DataValueReference> {
        self.extractors.get(editor_alias).map(|e| e.as_ref())
    }

    /// References in a value of the given editor; none for editors that don't track any
    pub fn extract(&self, editor_alias: &str, value: Option<&str>) -> Vec<EntityReference> {
        match self.find(editor_alias) {
            Some(extractor) => extractor.references(value),
            None => {
                log::debug!("No reference extractor for editor {}", editor_alias);
                Vec::new()
            }
        }
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
