use serde::{Deserialize, Serialize};
use std::fmt;

use crate::pipeline::processing::domain::Domain;

/// Upstream dataset that contributed a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceDatabase {
    #[serde(rename = "GDC")]
    Gdc,
    #[serde(rename = "COSMIC")]
    Cosmic,
    #[serde(rename = "ClinVar")]
    Clinvar,
    #[serde(rename = "VEP")]
    Vep,
    #[serde(rename = "FATHMM")]
    FathmmCancer,
}

impl SourceDatabase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceDatabase::Gdc => "GDC",
            SourceDatabase::Cosmic => "COSMIC",
            SourceDatabase::Clinvar => "ClinVar",
            SourceDatabase::Vep => "VEP",
            SourceDatabase::FathmmCancer => "FATHMM",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "GDC" => Some(SourceDatabase::Gdc),
            "COSMIC" => Some(SourceDatabase::Cosmic),
            "ClinVar" => Some(SourceDatabase::Clinvar),
            "VEP" => Some(SourceDatabase::Vep),
            "FATHMM" => Some(SourceDatabase::FathmmCancer),
            _ => None,
        }
    }

    /// Rank used when two sources describe the same mutation.
    /// Catalogue sources with dense annotation outrank case-level sources.
    pub fn precedence(&self) -> u8 {
        match self {
            SourceDatabase::Cosmic => 2,
            SourceDatabase::Gdc => 1,
            _ => 0,
        }
    }
}

impl fmt::Display for SourceDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One upstream export format, each handled by its own extractor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    GdcMutations,
    Cosmic,
    Vep,
    FathmmCancer,
    Clinvar,
    GdcOccurrences,
}

impl SourceKind {
    /// Write order across sources: mutation-bearing exports first, GDC before the catalogue
    pub const ALL: [SourceKind; 6] = [
        SourceKind::GdcMutations,
        SourceKind::Cosmic,
        SourceKind::Vep,
        SourceKind::FathmmCancer,
        SourceKind::Clinvar,
        SourceKind::GdcOccurrences,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::GdcMutations => "gdc",
            SourceKind::Cosmic => "cosmic",
            SourceKind::Vep => "vep",
            SourceKind::FathmmCancer => "fathmm",
            SourceKind::Clinvar => "clinvar",
            SourceKind::GdcOccurrences => "gdc_occurrences",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        SourceKind::ALL
            .into_iter()
            .find(|kind| kind.name() == name.trim().to_lowercase())
    }

    pub fn database(&self) -> SourceDatabase {
        match self {
            SourceKind::GdcMutations | SourceKind::GdcOccurrences => SourceDatabase::Gdc,
            SourceKind::Cosmic => SourceDatabase::Cosmic,
            SourceKind::Vep => SourceDatabase::Vep,
            SourceKind::FathmmCancer => SourceDatabase::FathmmCancer,
            SourceKind::Clinvar => SourceDatabase::Clinvar,
        }
    }

    /// Whether this export introduces mutation rows. Dependents from other exports may
    /// reference mutations the catalogue never saw.
    pub fn carries_mutations(&self) -> bool {
        matches!(self, SourceKind::GdcMutations | SourceKind::Cosmic)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Persisted tables, in foreign-key order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Table {
    Mutation,
    SourceInfo,
    Impact,
    Tissue,
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Table::Mutation => "mutation",
            Table::SourceInfo => "source_info",
            Table::Impact => "impact",
            Table::Tissue => "tissue",
        };
        f.write_str(name)
    }
}

/// Normalized mutation class shared across sources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum MutationClass {
    Substitution,
    Insertion,
    Deletion,
    Complex,
    Nonsense,
    Other(String),
}

/// Normalized protein-level consequence shared across sources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Consequence {
    Missense,
    Synonymous,
    Nonsense,
    Frameshift,
    InFrame,
    StartLost,
    StopLost,
    Other(String),
}

/// A protein mutation keyed by its canonical one-letter identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationRecord {
    pub protein_change: String,
    pub residue_number: Option<u32>,
    pub genomic_coordinate: Option<String>,
    pub coding: bool,
    pub cds: Option<String>,
    pub mutation_class: Option<MutationClass>,
    pub consequence: Option<Consequence>,
    pub gene: String,
    pub organism: String,
    pub domain: Domain,
    /// Source whose attribute set currently owns the row
    pub annotation_source: SourceDatabase,
}

/// Provenance row linking a mutation to an upstream dataset entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRecord {
    pub source_id: String,
    pub source_database: SourceDatabase,
    pub mutation_id: String,
}

/// Tissue/cancer context of one observation of a mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TissueRecord {
    pub mutation_id: String,
    pub sample_id: String,
    pub tissue_type: Option<String>,
    pub cancer_type: Option<String>,
}

macro_rules! impact_columns {
    ($($column:ident),+ $(,)?) => {
        /// Sparse prediction record for one mutation.
        ///
        /// `None` means the writer has nothing to say about a column and leaves it untouched;
        /// `Some("NA")` is an explicit upstream placeholder.
        #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
        pub struct ImpactRecord {
            pub mutation_id: String,
            $(pub $column: Option<String>,)+
        }

        impl ImpactRecord {
            /// Predictor columns in table order, excluding `mutation_id`
            pub const COLUMNS: &'static [&'static str] = &[$(stringify!($column)),+];

            pub fn values(&self) -> Vec<Option<&str>> {
                vec![$(self.$column.as_deref()),+]
            }

            pub fn values_mut(&mut self) -> Vec<&mut Option<String>> {
                vec![$(&mut self.$column),+]
            }
        }
    };
}

impact_columns!(
    vep_impact,
    sift_pred,
    sift_score,
    polyphen_pred,
    polyphen_score,
    condel,
    cadd_raw,
    cadd_rank,
    fathmm_score,
    fathmm_rank,
    fathmm_pred,
    metasvm_score,
    metasvm_rank,
    metasvm_pred,
    mutpred_score,
    mutpred_rank,
    mutassessor_score,
    mutassessor_rank,
    mutassessor_pred,
    muttaster_score,
    muttaster_rank,
    muttaster_pred,
    provean_score,
    provean_rank,
    provean_pred,
    revel_score,
    revel_rank,
    cosmic_fathmm_pred,
    cosmic_fathmm_score,
    fathmm_cancer_pred,
    fathmm_cancer_score,
    clinvar_significance,
    median_rank,
);

impl ImpactRecord {
    pub fn new(mutation_id: impl Into<String>) -> Self {
        Self {
            mutation_id: mutation_id.into(),
            ..Default::default()
        }
    }

    /// Copy every column `other` carries into `self`. Returns true if anything changed.
    pub fn merge_from(&mut self, other: &ImpactRecord) -> bool {
        let mut changed = false;
        for (slot, incoming) in self.values_mut().into_iter().zip(other.values()) {
            if let Some(value) = incoming {
                if slot.as_deref() != Some(value) {
                    *slot = Some(value.to_string());
                    changed = true;
                }
            }
        }
        changed
    }

    /// True when the record carries no predictor column at all
    pub fn is_empty(&self) -> bool {
        self.values().iter().all(Option::is_none)
    }

    /// Normalized rank scores feeding the aggregate, in fixed predictor order
    pub fn rank_scores(&self) -> [Option<&str>; 9] {
        [
            self.condel.as_deref(),
            self.cadd_rank.as_deref(),
            self.fathmm_rank.as_deref(),
            self.metasvm_rank.as_deref(),
            self.mutpred_rank.as_deref(),
            self.mutassessor_rank.as_deref(),
            self.muttaster_rank.as_deref(),
            self.provean_rank.as_deref(),
            self.revel_rank.as_deref(),
        ]
    }
}

/// Records that reference a mutation by its canonical identifier
pub trait MutationKeyed {
    fn mutation_id(&self) -> &str;
}

impl MutationKeyed for MutationRecord {
    fn mutation_id(&self) -> &str {
        &self.protein_change
    }
}

impl MutationKeyed for SourceRecord {
    fn mutation_id(&self) -> &str {
        &self.mutation_id
    }
}

impl MutationKeyed for ImpactRecord {
    fn mutation_id(&self) -> &str {
        &self.mutation_id
    }
}

impl MutationKeyed for TissueRecord {
    fn mutation_id(&self) -> &str {
        &self.mutation_id
    }
}

/// A row dropped during extraction
#[derive(Debug, Clone, Serialize)]
pub struct RejectedRecord {
    /// 1-based row (delimited exports) or array index (JSON exports)
    pub position: usize,
    pub reason: String,
}

/// Everything one extractor produced from one export
#[derive(Debug, Clone, Serialize)]
pub struct Extraction {
    pub kind: SourceKind,
    pub mutations: Vec<MutationRecord>,
    pub sources: Vec<SourceRecord>,
    pub impacts: Vec<ImpactRecord>,
    pub tissues: Vec<TissueRecord>,
    pub rejected: Vec<RejectedRecord>,
    /// Rows skipped because they describe another gene
    pub other_gene: usize,
    /// Rows whose mutation was already emitted earlier in the same export
    pub duplicates: usize,
}

impl Extraction {
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            mutations: Vec::new(),
            sources: Vec::new(),
            impacts: Vec::new(),
            tissues: Vec::new(),
            rejected: Vec::new(),
            other_gene: 0,
            duplicates: 0,
        }
    }

    pub fn reject(&mut self, position: usize, reason: impl Into<String>) {
        self.rejected.push(RejectedRecord {
            position,
            reason: reason.into(),
        });
    }

    pub fn record_count(&self) -> usize {
        self.mutations.len() + self.sources.len() + self.impacts.len() + self.tissues.len()
    }
}
