use std::io::Read;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::Result;
use crate::pipeline::processing::extract::columns::ColumnIndex;
use crate::pipeline::processing::extract::{Collector, ExtractContext, SourceExtractor};
use crate::pipeline::processing::normalize::{from_one_letter, vocabulary::split_description};
use crate::types::{Extraction, ImpactRecord, SourceKind, SourceRecord, TissueRecord};

const GENE: &str = "Gene name";
const SAMPLE: &str = "ID_sample";
const PRIMARY_SITE: &str = "Primary site";
const PRIMARY_HISTOLOGY: &str = "Primary histology";
const HISTOLOGY_SUBTYPE: &str = "Histology subtype 1";
const MUTATION_ID: &str = "Mutation ID";
const MUTATION_CDS: &str = "Mutation CDS";
const MUTATION_AA: &str = "Mutation AA";
const DESCRIPTION: &str = "Mutation Description";
const GENOME_POSITION: &str = "Mutation genome position";
const FATHMM_PREDICTION: &str = "FATHMM prediction";
const FATHMM_SCORE: &str = "FATHMM score";

const REQUIRED: [&str; 12] = [
    GENE,
    SAMPLE,
    PRIMARY_SITE,
    PRIMARY_HISTOLOGY,
    HISTOLOGY_SUBTYPE,
    MUTATION_ID,
    MUTATION_CDS,
    MUTATION_AA,
    DESCRIPTION,
    GENOME_POSITION,
    FATHMM_PREDICTION,
    FATHMM_SCORE,
];

static GENOME_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\w+:\d+)(?:-\d+)?$").expect("valid genome position regex"));

/// COSMIC mutant export (comma-delimited, one row per sample observation)
pub struct CosmicExtractor;

impl CosmicExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CosmicExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn optional(value: Option<&str>) -> Option<String> {
    value
        .filter(|v| !v.is_empty() && *v != "-" && *v != "NS")
        .map(str::to_string)
}

impl SourceExtractor for CosmicExtractor {
    fn kind(&self) -> SourceKind {
        SourceKind::Cosmic
    }

    fn extract(&self, input: &mut dyn Read, ctx: &ExtractContext) -> Result<Extraction> {
        let database = self.kind().database();
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b',')
            .flexible(true)
            .from_reader(input);
        let columns = ColumnIndex::new(database.as_str(), reader.headers()?, &REQUIRED)?;
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

            if !ctx.matches_gene(columns.raw(&row, GENE).unwrap_or_default()) {
                out.other_gene();
                continue;
            }

            let mutation_id = match from_one_letter(columns.raw(&row, MUTATION_AA).unwrap_or_default()) {
                Ok(id) => id,
                Err(e) => {
                    out.reject(position, e.to_string());
                    continue;
                }
            };

            let coordinate = columns
                .raw(&row, GENOME_POSITION)
                .and_then(|raw| GENOME_START.captures(raw))
                .map(|caps| caps[1].to_string());
            if let Some(coordinate) = coordinate.as_deref().filter(|c| !ctx.on_chromosome(c)) {
                out.reject(
                    position,
                    format!("{mutation_id} at {coordinate} is not on chromosome {}", ctx.chromosome),
                );
                continue;
            }

            let mut mutation = ctx.mutation(&mutation_id, database);
            mutation.cds = optional(columns.raw(&row, MUTATION_CDS))
                .map(|cds| cds.trim_start_matches("c.").to_string());
            mutation.genomic_coordinate = coordinate;
            if let Some((class, consequence)) =
                split_description(columns.raw(&row, DESCRIPTION).unwrap_or_default())
            {
                mutation.mutation_class = Some(class);
                mutation.consequence = Some(consequence);
            }

            if out.mutation(mutation) {
                let mut impact = ImpactRecord::new(mutation_id.clone());
                impact.cosmic_fathmm_pred = Some(columns.value(&row, FATHMM_PREDICTION));
                impact.cosmic_fathmm_score = Some(columns.value(&row, FATHMM_SCORE));
                out.impact(impact);
            }

            if let Some(source_id) = optional(columns.raw(&row, MUTATION_ID)) {
                out.source(SourceRecord {
                    source_id,
                    source_database: database,
                    mutation_id: mutation_id.clone(),
                });
            }

            match optional(columns.raw(&row, SAMPLE)) {
                Some(sample_id) => {
                    let cancer_type = optional(columns.raw(&row, HISTOLOGY_SUBTYPE))
                        .or_else(|| optional(columns.raw(&row, PRIMARY_HISTOLOGY)));
                    out.tissue(TissueRecord {
                        mutation_id,
                        sample_id,
                        tissue_type: optional(columns.raw(&row, PRIMARY_SITE)),
                        cancer_type,
                    });
                }
                None => tracing::debug!(position, "COSMIC row without sample id, no tissue row"),
            }
        }

        Ok(out.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ImportError;
    use crate::pipeline::processing::domain::Domain;
    use crate::types::{Consequence, MutationClass};

    const HEADER: &str = "Gene name,ID_sample,Primary site,Primary histology,Histology subtype 1,\
Mutation ID,Mutation CDS,Mutation AA,Mutation Description,Mutation genome position,\
FATHMM prediction,FATHMM score";

    fn extract(body: &str) -> Result<Extraction> {
        let csv = format!("{HEADER}\n{body}");
        CosmicExtractor::new().extract(&mut csv.as_bytes(), &ExtractContext::default())
    }

    #[test]
    fn test_rows_become_four_batches() {
        let extraction = extract(
            "KIF11,1001,breast,carcinoma,ductal_carcinoma,COSV1,c.1096G>A,p.A366T,Substitution - Missense,10:92648120-92648120,PATHOGENIC,0.97\n\
             KIF11,1002,lung,carcinoma,NS,COSV1,c.1096G>A,p.A366T,Substitution - Missense,10:92648120-92648120,PATHOGENIC,0.97\n\
             KIF11,1003,skin,malignant_melanoma,NS,COSV2,c.3G>A,p.M1=,Substitution - coding silent,10:92593130-92593130,NEUTRAL,0.1\n",
        )
        .unwrap();

        assert_eq!(extraction.mutations.len(), 2);
        assert_eq!(extraction.duplicates, 1);

        let a366t = &extraction.mutations[0];
        assert_eq!(a366t.protein_change, "A366T");
        assert_eq!(a366t.residue_number, Some(366));
        assert_eq!(a366t.cds.as_deref(), Some("1096G>A"));
        assert_eq!(a366t.genomic_coordinate.as_deref(), Some("10:92648120"));
        assert_eq!(a366t.mutation_class, Some(MutationClass::Substitution));
        assert_eq!(a366t.consequence, Some(Consequence::Missense));
        assert_eq!(a366t.domain, Domain::KinesinMotor);

        let m1m = &extraction.mutations[1];
        assert_eq!(m1m.protein_change, "M1M");
        assert_eq!(m1m.consequence, Some(Consequence::Synonymous));

        assert_eq!(extraction.sources.len(), 2);
        assert_eq!(extraction.impacts[0].cosmic_fathmm_pred.as_deref(), Some("PATHOGENIC"));

        assert_eq!(extraction.tissues.len(), 3);
        assert_eq!(extraction.tissues[0].cancer_type.as_deref(), Some("ductal_carcinoma"));
        assert_eq!(extraction.tissues[1].cancer_type.as_deref(), Some("carcinoma"));
    }

    #[test]
    fn test_unknown_protein_change_and_other_genes_are_skipped() {
        let extraction = extract(
            "KIF11,1001,breast,carcinoma,NS,COSV9,c.?,p.?,Unknown,,,\n\
             KIF15,1002,lung,carcinoma,NS,COSV3,c.10A>T,p.K4M,Substitution - Missense,12:100-100,,\n",
        )
        .unwrap();

        assert!(extraction.mutations.is_empty());
        assert_eq!(extraction.rejected.len(), 1);
        assert_eq!(extraction.rejected[0].position, 1);
        assert_eq!(extraction.other_gene, 1);
    }

    #[test]
    fn test_missing_column_is_schema_error() {
        let err = CosmicExtractor::new()
            .extract(&mut "Gene name,Mutation AA\nKIF11,p.A366T\n".as_bytes(), &ExtractContext::default())
            .unwrap_err();
        assert!(matches!(err, ImportError::Schema { .. }));
    }

    #[test]
    fn test_renamed_fathmm_column_is_schema_error() {
        let renamed = HEADER.replace("FATHMM score", "FATHMM_score");
        let csv = format!(
            "{renamed}\nKIF11,1001,breast,carcinoma,NS,COSV1,c.1096G>A,p.A366T,Substitution - Missense,10:92648120-92648120,PATHOGENIC,0.97\n"
        );
        let err = CosmicExtractor::new()
            .extract(&mut csv.as_bytes(), &ExtractContext::default())
            .unwrap_err();
        match err {
            ImportError::Schema { message, .. } => assert!(message.contains("FATHMM score")),
            other => panic!("expected schema error, got {other}"),
        }
    }

    #[test]
    fn test_position_on_another_chromosome_is_rejected() {
        let extraction = extract(
            "KIF11,1001,breast,carcinoma,NS,COSV1,c.1096G>A,p.A366T,Substitution - Missense,12:92648120-92648120,PATHOGENIC,0.97\n\
             KIF11,1002,lung,carcinoma,NS,COSV2,c.2848T>C,p.S950P,Substitution - Missense,10:92665380-92665380,NEUTRAL,0.2\n",
        )
        .unwrap();

        assert_eq!(extraction.mutations.len(), 1);
        assert_eq!(extraction.mutations[0].protein_change, "S950P");
        assert_eq!(extraction.rejected[0].position, 1);
        assert_eq!(extraction.tissues.len(), 1);
    }
}
