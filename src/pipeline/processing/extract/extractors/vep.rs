use std::io::Read;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::Result;
use crate::pipeline::processing::aggregate::NA;
use crate::pipeline::processing::extract::columns::ColumnIndex;
use crate::pipeline::processing::extract::{Collector, ExtractContext, SourceExtractor};
use crate::pipeline::processing::normalize::from_amino_acid_pair;
use crate::types::{Extraction, ImpactRecord, SourceKind};

const SYMBOL: &str = "SYMBOL";
const PROTEIN_POSITION: &str = "Protein_position";
const AMINO_ACIDS: &str = "Amino_acids";
const IMPACT: &str = "IMPACT";
const SIFT: &str = "SIFT";
const POLYPHEN: &str = "PolyPhen";
const CONDEL: &str = "Condel";

static PREDICTION_SCORE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*)\((.*)\)").expect("valid prediction regex"));

/// Plain score / rank / prediction columns, copied as-is after placeholder cleanup
const PASSTHROUGH: [&str; 21] = [
    "CADD_raw",
    "CADD_raw_rankscore",
    "FATHMM_score",
    "FATHMM_converted_rankscore",
    "FATHMM_pred",
    "MetaSVM_score",
    "MetaSVM_rankscore",
    "MetaSVM_pred",
    "MutPred_score",
    "MutPred_rankscore",
    "MutationAssessor_score",
    "MutationAssessor_score_rankscore",
    "MutationAssessor_pred",
    "MutationTaster_score",
    "MutationTaster_converted_rankscore",
    "MutationTaster_pred",
    "PROVEAN_score",
    "PROVEAN_converted_rankscore",
    "PROVEAN_pred",
    "REVEL_score",
    "REVEL_rankscore",
];

fn passthrough_slot<'a>(impact: &'a mut ImpactRecord, column: &str) -> Option<&'a mut Option<String>> {
    let slot = match column {
        "CADD_raw" => &mut impact.cadd_raw,
        "CADD_raw_rankscore" => &mut impact.cadd_rank,
        "FATHMM_score" => &mut impact.fathmm_score,
        "FATHMM_converted_rankscore" => &mut impact.fathmm_rank,
        "FATHMM_pred" => &mut impact.fathmm_pred,
        "MetaSVM_score" => &mut impact.metasvm_score,
        "MetaSVM_rankscore" => &mut impact.metasvm_rank,
        "MetaSVM_pred" => &mut impact.metasvm_pred,
        "MutPred_score" => &mut impact.mutpred_score,
        "MutPred_rankscore" => &mut impact.mutpred_rank,
        "MutationAssessor_score" => &mut impact.mutassessor_score,
        "MutationAssessor_score_rankscore" => &mut impact.mutassessor_rank,
        "MutationAssessor_pred" => &mut impact.mutassessor_pred,
        "MutationTaster_score" => &mut impact.muttaster_score,
        "MutationTaster_converted_rankscore" => &mut impact.muttaster_rank,
        "MutationTaster_pred" => &mut impact.muttaster_pred,
        "PROVEAN_score" => &mut impact.provean_score,
        "PROVEAN_converted_rankscore" => &mut impact.provean_rank,
        "PROVEAN_pred" => &mut impact.provean_pred,
        "REVEL_score" => &mut impact.revel_score,
        "REVEL_rankscore" => &mut impact.revel_rank,
        _ => return None,
    };
    Some(slot)
}

/// Split `deleterious(0.01)` into prediction and score. `NA` stays `NA` on both sides.
pub fn split_prediction(value: &str) -> (String, String) {
    if value == NA {
        return (NA.to_string(), NA.to_string());
    }
    match PREDICTION_SCORE.captures(value) {
        Some(caps) => (caps[1].trim().to_string(), caps[2].trim().to_string()),
        None => (value.to_string(), NA.to_string()),
    }
}

/// VEP web-service tabular output. `##` meta lines precede the `#Uploaded_variation` header.
pub struct VepExtractor;

impl VepExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for VepExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceExtractor for VepExtractor {
    fn kind(&self) -> SourceKind {
        SourceKind::Vep
    }

    fn extract(&self, input: &mut dyn Read, ctx: &ExtractContext) -> Result<Extraction> {
        let database = self.kind().database();
        let mut raw = String::new();
        input.read_to_string(&mut raw)?;
        let table: String = raw
            .lines()
            .filter(|line| !line.starts_with("##"))
            .map(|line| format!("{line}\n"))
            .collect();

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .quoting(false)
            .from_reader(table.as_bytes());
        let required: Vec<&str> = [SYMBOL, PROTEIN_POSITION, AMINO_ACIDS, IMPACT, SIFT, POLYPHEN, CONDEL]
            .into_iter()
            .chain(PASSTHROUGH)
            .collect();
        // A renamed predictor column must fail loudly rather than leave its field empty
        let columns = ColumnIndex::new(database.as_str(), reader.headers()?, &required)?;
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

            if !ctx.matches_gene(columns.raw(&row, SYMBOL).unwrap_or_default()) {
                out.other_gene();
                continue;
            }

            let mutation_id = match from_amino_acid_pair(
                columns.raw(&row, AMINO_ACIDS).unwrap_or_default(),
                columns.raw(&row, PROTEIN_POSITION).unwrap_or_default(),
            ) {
                Ok(id) => id,
                Err(e) => {
                    out.reject(position, e.to_string());
                    continue;
                }
            };

            let mut impact = ImpactRecord::new(mutation_id);
            impact.vep_impact = Some(columns.value(&row, IMPACT));
            let (pred, score) = split_prediction(&columns.value(&row, SIFT));
            impact.sift_pred = Some(pred);
            impact.sift_score = Some(score);
            let (pred, score) = split_prediction(&columns.value(&row, POLYPHEN));
            impact.polyphen_pred = Some(pred);
            impact.polyphen_score = Some(score);
            let (pred, score) = split_prediction(&columns.value(&row, CONDEL));
            // a bare value without parentheses is already the score
            impact.condel = Some(if score == NA { pred } else { score });
            for column in PASSTHROUGH {
                if let Some(slot) = passthrough_slot(&mut impact, column) {
                    *slot = Some(columns.value(&row, column));
                }
            }

            out.impact(impact);
        }

        Ok(out.finish())
    }
}
