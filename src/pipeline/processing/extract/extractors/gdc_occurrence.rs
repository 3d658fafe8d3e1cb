use std::io::Read;

use serde::Deserialize;
use serde_json::Value;

use super::gdc::read_array;
use crate::error::{ImportError, Result};
use crate::pipeline::processing::extract::{Collector, ExtractContext, SourceExtractor};
use crate::pipeline::processing::normalize::from_one_letter;
use crate::types::{Extraction, SourceKind, TissueRecord};

#[derive(Debug, Deserialize)]
struct OccurrenceEntry {
    data: OccurrenceData,
}

#[derive(Debug, Deserialize)]
struct OccurrenceData {
    ssm_id: String,
    #[serde(default)]
    cosmic_id: Option<Value>,
    gene_aa_change: GeneAaChange,
    occurrence: Vec<Occurrence>,
}

/// `"KIF11 A366T"` or a list of such strings
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GeneAaChange {
    One(String),
    Many(Vec<String>),
}

impl GeneAaChange {
    fn entries(&self) -> Vec<&str> {
        match self {
            GeneAaChange::One(s) => vec![s.as_str()],
            GeneAaChange::Many(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Occurrence {
    case: Case,
}

#[derive(Debug, Deserialize)]
struct Case {
    case_id: Option<String>,
    primary_site: Option<String>,
    disease_type: Option<String>,
}

fn recorded_in_catalogue(cosmic_id: &Option<Value>) -> bool {
    match cosmic_id {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty() && s != "None",
        Some(Value::Array(ids)) => !ids.is_empty(),
        Some(_) => true,
    }
}

/// GDC SSM occurrence export. Emits tissue rows only; observations that also carry a COSMIC id
/// are left to the catalogue import so a sample is not counted twice.
pub struct GdcOccurrenceExtractor;

impl GdcOccurrenceExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GdcOccurrenceExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceExtractor for GdcOccurrenceExtractor {
    fn kind(&self) -> SourceKind {
        SourceKind::GdcOccurrences
    }

    fn extract(&self, input: &mut dyn Read, ctx: &ExtractContext) -> Result<Extraction> {
        let source_name = self.kind().database().as_str();
        let items = read_array(input, source_name)?;
        let mut out = Collector::new(self.kind());

        for (i, item) in items.into_iter().enumerate() {
            let position = i + 1;
            let entry: OccurrenceEntry = serde_json::from_value(item).map_err(|e| {
                ImportError::schema(source_name, format!("occurrence #{position}: {e}"))
            })?;
            let data = entry.data;

            let change = data.gene_aa_change.entries().into_iter().find_map(|entry| {
                let (gene, change) = entry.trim().split_once(char::is_whitespace)?;
                (gene == ctx.gene).then(|| change.trim().to_string())
            });
            let Some(change) = change else {
                out.other_gene();
                continue;
            };

            if recorded_in_catalogue(&data.cosmic_id) {
                tracing::debug!(ssm_id = %data.ssm_id, "Occurrence also recorded by COSMIC, skipping");
                continue;
            }

            let mutation_id = match from_one_letter(&change) {
                Ok(id) => id,
                Err(e) => {
                    out.reject(position, e.to_string());
                    continue;
                }
            };

            for occurrence in data.occurrence {
                let case = occurrence.case;
                out.tissue(TissueRecord {
                    mutation_id: mutation_id.clone(),
                    sample_id: case.case_id.unwrap_or_else(|| data.ssm_id.clone()),
                    tissue_type: case.primary_site,
                    cancer_type: case.disease_type,
                });
            }
        }

        Ok(out.finish())
    }
}
