use std::io::Read;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{ImportError, Result};
use crate::pipeline::processing::aggregate::NA;
use crate::pipeline::processing::extract::{Collector, ExtractContext, SourceExtractor};
use crate::pipeline::processing::normalize::from_one_letter;
use crate::types::{
    Consequence, Extraction, ImpactRecord, MutationClass, SourceKind, SourceRecord,
};

static GENOMIC_CHANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^chr(\w+):g\.(\d+)").expect("valid genomic change regex"));

/// One simple somatic mutation from the GDC mutation export
#[derive(Debug, Deserialize)]
struct Ssm {
    ssm_id: String,
    genomic_dna_change: String,
    mutation_subtype: Option<String>,
    consequence: Vec<ConsequenceNode>,
}

#[derive(Debug, Deserialize)]
struct ConsequenceNode {
    transcript: Transcript,
}

#[derive(Debug, Deserialize)]
struct Transcript {
    aa_change: Option<String>,
    consequence_type: String,
    gene: Gene,
    annotation: Option<Annotation>,
}

#[derive(Debug, Deserialize)]
struct Gene {
    symbol: String,
}

#[derive(Debug, Deserialize)]
struct Annotation {
    vep_impact: Option<String>,
    sift_impact: Option<String>,
    polyphen_impact: Option<String>,
}

/// `chr10:g.92648120G>A` → `10:92648120`
pub fn genomic_coordinate(genomic_dna_change: &str) -> Option<String> {
    GENOMIC_CHANGE
        .captures(genomic_dna_change.trim())
        .map(|caps| format!("{}:{}", &caps[1], &caps[2]))
}

fn annotation_value(value: &Option<String>) -> String {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => NA.to_string(),
    }
}

/// Parse a JSON array export into per-element values. Element shape is checked separately so a
/// schema error can name the offending index.
pub(crate) fn read_array(input: &mut dyn Read, source_name: &str) -> Result<Vec<Value>> {
    let document: Value = serde_json::from_reader(input)?;
    match document {
        Value::Array(items) => Ok(items),
        _ => Err(ImportError::schema(source_name, "expected a top-level JSON array")),
    }
}

/// GDC SSM mutation export (JSON array)
pub struct GdcExtractor;

impl GdcExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GdcExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceExtractor for GdcExtractor {
    fn kind(&self) -> SourceKind {
        SourceKind::GdcMutations
    }

    fn extract(&self, input: &mut dyn Read, ctx: &ExtractContext) -> Result<Extraction> {
        let database = self.kind().database();
        let items = read_array(input, database.as_str())?;
        let mut out = Collector::new(self.kind());

        for (i, item) in items.into_iter().enumerate() {
            let position = i + 1;
            let ssm: Ssm = serde_json::from_value(item).map_err(|e| {
                ImportError::schema(database.as_str(), format!("mutation #{position}: {e}"))
            })?;

            let transcript = match ssm.consequence.first() {
                Some(node) => &node.transcript,
                None => {
                    out.reject(position, format!("ssm {} has no consequence", ssm.ssm_id));
                    continue;
                }
            };

            if transcript.gene.symbol != ctx.gene {
                out.other_gene();
                continue;
            }

            let mutation_id = match from_one_letter(transcript.aa_change.as_deref().unwrap_or_default()) {
                Ok(id) => id,
                Err(e) => {
                    out.reject(position, e.to_string());
                    continue;
                }
            };

            let coordinate = genomic_coordinate(&ssm.genomic_dna_change);
            if let Some(coordinate) = coordinate.as_deref().filter(|c| !ctx.on_chromosome(c)) {
                out.reject(
                    position,
                    format!("ssm {} at {coordinate} is not on chromosome {}", ssm.ssm_id, ctx.chromosome),
                );
                continue;
            }

            let mut mutation = ctx.mutation(&mutation_id, database);
            mutation.genomic_coordinate = coordinate;
            mutation.mutation_class = ssm.mutation_subtype.as_deref().map(MutationClass::normalize);
            mutation.consequence = Some(Consequence::normalize(&transcript.consequence_type));

            if out.mutation(mutation) {
                if let Some(annotation) = &transcript.annotation {
                    let mut impact = ImpactRecord::new(mutation_id.clone());
                    impact.vep_impact = Some(annotation_value(&annotation.vep_impact));
                    impact.sift_pred = Some(annotation_value(&annotation.sift_impact));
                    impact.polyphen_pred = Some(annotation_value(&annotation.polyphen_impact));
                    out.impact(impact);
                }
            }

            out.source(SourceRecord {
                source_id: ssm.ssm_id,
                source_database: database,
                mutation_id,
            });
        }

        Ok(out.finish())
    }
}
