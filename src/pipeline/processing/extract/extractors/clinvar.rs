use std::io::Read;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::Result;
use crate::pipeline::processing::aggregate::NA;
use crate::pipeline::processing::extract::columns::ColumnIndex;
use crate::pipeline::processing::extract::{Collector, ExtractContext, SourceExtractor};
use crate::pipeline::processing::normalize::from_three_letter;
use crate::types::{Extraction, ImpactRecord, SourceKind, SourceRecord};

const NAME: &str = "Name";
const GENES: &str = "Gene(s)";
const SIGNIFICANCE: &str = "Clinical significance (Last reviewed)";
const VARIATION_ID: &str = "VariationID";

static REVIEW_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(.*\)$").expect("valid review date regex"));

/// Clinical significance without the trailing review parenthetical
pub fn clean_significance(raw: &str) -> String {
    REVIEW_DATE.replace(raw.trim(), "").trim().to_string()
}

/// ClinVar tabular search report
pub struct ClinvarExtractor;

impl ClinvarExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ClinvarExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceExtractor for ClinvarExtractor {
    fn kind(&self) -> SourceKind {
        SourceKind::Clinvar
    }

    fn extract(&self, input: &mut dyn Read, ctx: &ExtractContext) -> Result<Extraction> {
        let database = self.kind().database();
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .quoting(false)
            .from_reader(input);
        let columns = ColumnIndex::new(
            database.as_str(),
            reader.headers()?,
            &[NAME, GENES, SIGNIFICANCE, VARIATION_ID],
        )?;
        let mut out = Collector::new(self.kind());

        for (i, row) in reader.records().enumerate() {
            let position = i + 1;
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    out.reject(position, e.to_string());
                    continue;
                }
            };

            if !ctx.matches_gene(columns.raw(&row, GENES).unwrap_or_default()) {
                out.other_gene();
                continue;
            }

            let mutation_id = match from_three_letter(columns.raw(&row, NAME).unwrap_or_default()) {
                Ok(id) => id,
                Err(e) => {
                    out.reject(position, e.to_string());
                    continue;
                }
            };

            let significance = clean_significance(columns.raw(&row, SIGNIFICANCE).unwrap_or_default());
            let mut impact = ImpactRecord::new(mutation_id.clone());
            impact.clinvar_significance = Some(if significance.is_empty() {
                NA.to_string()
            } else {
                significance
            });

            if out.impact(impact) {
                if let Some(variation_id) = columns.raw(&row, VARIATION_ID).filter(|v| !v.is_empty()) {
                    out.source(SourceRecord {
                        source_id: variation_id.to_string(),
                        source_database: database,
                        mutation_id,
                    });
                }
            }
        }

        Ok(out.finish())
    }
}
