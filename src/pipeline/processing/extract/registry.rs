use std::collections::HashMap;
use std::io::Read;

use super::extractors::{
    ClinvarExtractor, CosmicExtractor, FathmmCancerExtractor, GdcExtractor,
    GdcOccurrenceExtractor, VepExtractor,
};
use super::{ExtractContext, SourceExtractor};
use crate::error::{ImportError, Result};
use crate::types::{Extraction, SourceKind};

/// Registry for source-specific extractors
pub struct ExtractorRegistry {
    extractors: HashMap<SourceKind, Box<dyn SourceExtractor>>,
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractorRegistry {
    /// Create a registry with every built-in extractor
    pub fn new() -> Self {
        let mut registry = Self {
            extractors: HashMap::new(),
        };
        registry.register(Box::new(GdcExtractor::new()));
        registry.register(Box::new(GdcOccurrenceExtractor::new()));
        registry.register(Box::new(CosmicExtractor::new()));
        registry.register(Box::new(ClinvarExtractor::new()));
        registry.register(Box::new(VepExtractor::new()));
        registry.register(Box::new(FathmmCancerExtractor::new()));
        registry
    }

    /// Register (or replace) the extractor for its source kind
    pub fn register(&mut self, extractor: Box<dyn SourceExtractor>) {
        self.extractors.insert(extractor.kind(), extractor);
    }

    pub fn get_extractor(&self, kind: SourceKind) -> Option<&dyn SourceExtractor> {
        self.extractors.get(&kind).map(|e| e.as_ref())
    }

    pub fn extract(
        &self,
        kind: SourceKind,
        input: &mut dyn Read,
        ctx: &ExtractContext,
    ) -> Result<Extraction> {
        match self.get_extractor(kind) {
            Some(extractor) => extractor.extract(input, ctx),
            None => Err(ImportError::Config(format!(
                "No extractor registered for source: {}",
                kind
            ))),
        }
    }

    /// Registered kinds in write order
    pub fn list_sources(&self) -> Vec<SourceKind> {
        SourceKind::ALL
            .into_iter()
            .filter(|kind| self.extractors.contains_key(kind))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_has_built_in_extractors() {
        let registry = ExtractorRegistry::new();
        assert_eq!(registry.list_sources(), SourceKind::ALL.to_vec());
    }

    #[test]
    fn test_registry_returns_error_for_unregistered_source() {
        let registry = ExtractorRegistry {
            extractors: HashMap::new(),
        };
        let result = registry.extract(
            SourceKind::Vep,
            &mut "".as_bytes(),
            &ExtractContext::default(),
        );
        assert!(matches!(result, Err(ImportError::Config(_))));
    }
}
