use std::io::Read;

use crate::error::Result;
use crate::pipeline::processing::extract::columns::ColumnIndex;
use crate::pipeline::processing::extract::{Collector, ExtractContext, SourceExtractor};
use crate::pipeline::processing::normalize::from_one_letter;
use crate::types::{Extraction, ImpactRecord, SourceKind};

const SUBSTITUTION: &str = "Substitution";
const PREDICTION: &str = "Prediction";
const SCORE: &str = "Score";

/// FATHMM cancer web-service results. Rows are keyed by protein accession, so there is no gene
/// column to filter on; the submitted list is already restricted to one protein.
pub struct FathmmCancerExtractor;

impl FathmmCancerExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FathmmCancerExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceExtractor for FathmmCancerExtractor {
    fn kind(&self) -> SourceKind {
        SourceKind::FathmmCancer
    }

    fn extract(&self, input: &mut dyn Read, _ctx: &ExtractContext) -> Result<Extraction> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .quoting(false)
            .from_reader(input);
        let columns = ColumnIndex::new(
            self.kind().database().as_str(),
            reader.headers()?,
            &[SUBSTITUTION, PREDICTION, SCORE],
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

            match from_one_letter(columns.raw(&row, SUBSTITUTION).unwrap_or_default()) {
                Ok(mutation_id) => {
                    let mut impact = ImpactRecord::new(mutation_id);
                    impact.fathmm_cancer_pred = Some(columns.value(&row, PREDICTION));
                    impact.fathmm_cancer_score = Some(columns.value(&row, SCORE));
                    out.impact(impact);
                }
                Err(e) => out.reject(position, e.to_string()),
            }
        }

        Ok(out.finish())
    }
}
