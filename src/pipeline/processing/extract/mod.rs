//! Per-source record extraction.
//!
//! Each upstream export has one [`SourceExtractor`]. Extractors filter to the configured gene,
//! normalize identifiers and vocabulary, and emit per-table record batches keyed by the canonical
//! mutation identifier. Row-level problems are recorded on the [`Extraction`] and never abort it;
//! a missing column or required JSON key aborts that source only.

pub mod columns;
pub mod extractors;
pub mod registry;

use std::collections::HashSet;
use std::io::Read;

use crate::error::Result;
use crate::pipeline::processing::domain::DomainMap;
use crate::pipeline::processing::normalize::residue_number;
use crate::types::{
    Extraction, ImpactRecord, MutationRecord, SourceDatabase, SourceKind, SourceRecord,
    TissueRecord,
};

pub use registry::ExtractorRegistry;

/// Everything an extractor needs to know besides the raw export
#[derive(Debug, Clone)]
pub struct ExtractContext {
    pub gene: String,
    pub organism: String,
    pub chromosome: String,
    pub domains: DomainMap,
}

impl Default for ExtractContext {
    fn default() -> Self {
        Self {
            gene: "KIF11".to_string(),
            organism: "Homo sapiens".to_string(),
            chromosome: "10".to_string(),
            domains: DomainMap::default(),
        }
    }
}

impl ExtractContext {
    /// Blank mutation row for `mutation_id` with the derived columns filled in
    pub fn mutation(&self, mutation_id: &str, source: SourceDatabase) -> MutationRecord {
        MutationRecord {
            protein_change: mutation_id.to_string(),
            residue_number: residue_number(mutation_id),
            genomic_coordinate: None,
            coding: true,
            cds: None,
            mutation_class: None,
            consequence: None,
            gene: self.gene.clone(),
            organism: self.organism.clone(),
            domain: self.domains.classify(mutation_id),
            annotation_source: source,
        }
    }

    /// Gene columns sometimes carry transcript suffixes (`KIF11_ENST00000260731`) or lists (`KIF11|KIF15`)
    pub fn matches_gene(&self, raw: &str) -> bool {
        raw.split(['|', ',', ';'])
            .map(|g| g.trim().split('_').next().unwrap_or_default())
            .any(|g| g == self.gene)
    }

    /// Whether a `10:92648120` style coordinate sits on the gene's chromosome. `chr` prefixes are ignored.
    pub fn on_chromosome(&self, coordinate: &str) -> bool {
        coordinate
            .split(':')
            .next()
            .map(|chrom| chrom.trim().trim_start_matches("chr"))
            .is_some_and(|chrom| chrom.eq_ignore_ascii_case(&self.chromosome))
    }
}

/// Trait implemented by every upstream format
pub trait SourceExtractor: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Parse one export into per-table batches
    fn extract(&self, input: &mut dyn Read, ctx: &ExtractContext) -> Result<Extraction>;
}

/// Accumulates records for one export, keeping the first record per key
pub(crate) struct Collector {
    extraction: Extraction,
    mutations: HashSet<String>,
    sources: HashSet<(String, String)>,
    impacts: HashSet<String>,
    tissues: HashSet<(String, String)>,
}

impl Collector {
    pub fn new(kind: SourceKind) -> Self {
        Self {
            extraction: Extraction::new(kind),
            mutations: HashSet::new(),
            sources: HashSet::new(),
            impacts: HashSet::new(),
            tissues: HashSet::new(),
        }
    }

    pub fn reject(&mut self, position: usize, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(
            source = %self.extraction.kind,
            position,
            reason = %reason,
            "Skipping malformed record"
        );
        self.extraction.reject(position, reason);
    }

    pub fn other_gene(&mut self) {
        self.extraction.other_gene += 1;
    }

    /// Returns false when the mutation was already emitted from an earlier row
    pub fn mutation(&mut self, record: MutationRecord) -> bool {
        if !self.mutations.insert(record.protein_change.clone()) {
            self.extraction.duplicates += 1;
            return false;
        }
        self.extraction.mutations.push(record);
        true
    }

    pub fn source(&mut self, record: SourceRecord) {
        if self
            .sources
            .insert((record.mutation_id.clone(), record.source_id.clone()))
        {
            self.extraction.sources.push(record);
        }
    }

    pub fn impact(&mut self, record: ImpactRecord) -> bool {
        if !self.impacts.insert(record.mutation_id.clone()) {
            self.extraction.duplicates += 1;
            return false;
        }
        self.extraction.impacts.push(record);
        true
    }

    pub fn tissue(&mut self, record: TissueRecord) {
        if self
            .tissues
            .insert((record.mutation_id.clone(), record.sample_id.clone()))
        {
            self.extraction.tissues.push(record);
        }
    }

    pub fn finish(self) -> Extraction {
        let e = &self.extraction;
        tracing::info!(
            source = %e.kind,
            mutations = e.mutations.len(),
            sources = e.sources.len(),
            impacts = e.impacts.len(),
            tissues = e.tissues.len(),
            rejected = e.rejected.len(),
            other_gene = e.other_gene,
            duplicates = e.duplicates,
            "Extraction complete"
        );
        self.extraction
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gene_column_variants() {
        let ctx = ExtractContext::default();
        assert!(ctx.matches_gene("KIF11"));
        assert!(ctx.matches_gene("KIF15|KIF11"));
        assert!(ctx.matches_gene("KIF11_ENST00000260731"));
        assert!(!ctx.matches_gene("KIF11A"));
    }

    #[test]
    fn test_coordinates_off_the_gene_chromosome() {
        let ctx = ExtractContext::default();
        assert!(ctx.on_chromosome("10:92648120"));
        assert!(ctx.on_chromosome("chr10:92648120"));
        assert!(!ctx.on_chromosome("17:7675088"));
        assert!(!ctx.on_chromosome("1:92648120"));
    }
}
