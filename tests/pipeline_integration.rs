use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use serde_json::json;
use tempfile::tempdir;

use kinesin_import::pipeline::ingestion::ImportLog;
use kinesin_import::pipeline::processing::domain::Domain;
use kinesin_import::pipeline::processing::extract::ExtractContext;
use kinesin_import::pipeline::storage::{InMemoryStorage, SqliteStorage, Storage};
use kinesin_import::pipeline::{ImportOptions, ImportPipeline, SourceInput, SourceStatus};
use kinesin_import::types::{SourceDatabase, SourceKind, Table};

const COSMIC: &str = "Gene name,ID_sample,Primary site,Primary histology,Histology subtype 1,\
Mutation ID,Mutation CDS,Mutation AA,Mutation Description,Mutation genome position,\
FATHMM prediction,FATHMM score
KIF11,1001,breast,carcinoma,ductal_carcinoma,COSV1,c.1096G>A,p.A366T,Substitution - Missense,10:92648120-92648120,PATHOGENIC,0.97
KIF15,2001,lung,carcinoma,NS,COSV9,c.10A>G,p.K4E,Substitution - Missense,3:44000000-44000000,NEUTRAL,0.2
";

const VEP_COLUMNS: [&str; 29] = [
    "#Uploaded_variation",
    "SYMBOL",
    "Protein_position",
    "Amino_acids",
    "IMPACT",
    "SIFT",
    "PolyPhen",
    "Condel",
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

/// VEP web output with the dbNSFP columns; predictors not listed for a row are `-`
fn vep_report() -> String {
    let row = |values: &[(&str, &str)]| {
        VEP_COLUMNS
            .iter()
            .map(|column| {
                values
                    .iter()
                    .find(|(name, _)| name == column)
                    .map(|(_, value)| *value)
                    .unwrap_or("-")
            })
            .collect::<Vec<_>>()
            .join("\t")
    };
    let a366t = row(&[
        ("#Uploaded_variation", "chr10:g.92648120G>A"),
        ("SYMBOL", "KIF11"),
        ("Protein_position", "366"),
        ("Amino_acids", "A/T"),
        ("IMPACT", "MODERATE"),
        ("SIFT", "deleterious(0.01)"),
        ("PolyPhen", "probably_damaging(0.998)"),
        ("Condel", "deleterious(0.712)"),
        ("CADD_raw_rankscore", "0.81"),
        ("REVEL_rankscore", "0.64"),
    ]);
    let m1t = row(&[
        ("#Uploaded_variation", "chr10:g.92593130T>C"),
        ("SYMBOL", "KIF11"),
        ("Protein_position", "1"),
        ("Amino_acids", "M/T"),
        ("IMPACT", "HIGH"),
        ("SIFT", "deleterious(0)"),
        ("PolyPhen", "benign(0.1)"),
        ("CADD_raw_rankscore", "0.95"),
    ]);
    format!(
        "## ENSEMBL VARIANT EFFECT PREDICTOR v96\n{}\n{a366t}\n{m1t}\n",
        VEP_COLUMNS.join("\t")
    )
}

const FATHMM: &str = "#\tdbSNP ID\tProtein ID\tSubstitution\tPrediction\tScore\tWarning
1\t-\tP52732\tA366T\tCANCER\t-2.45\t
";

const CLINVAR: &str = "Name\tGene(s)\tClinical significance (Last reviewed)\tVariationID
NM_004523.3(KIF11):c.1096G>A (p.Ala366Thr)\tKIF11\tUncertain significance(Last reviewed: Jun 29, 2018)\t424242
NM_004523.3(KIF11):c.2T>C (p.Met1Thr)\tKIF11\tPathogenic (reviewed)\t65780
";

fn gdc_mutations() -> String {
    let ssm = |id: &str, symbol: &str, aa: &str, genomic: &str| {
        json!({
            "ssm_id": id,
            "genomic_dna_change": genomic,
            "mutation_subtype": "Single base substitution",
            "consequence": [{
                "transcript": {
                    "aa_change": aa,
                    "consequence_type": "missense_variant",
                    "gene": { "symbol": symbol },
                    "annotation": { "vep_impact": "MODERATE", "sift_impact": "deleterious", "polyphen_impact": "" }
                }
            }]
        })
    };
    json!([
        ssm("ssm-a366t", "KIF11", "A366T", "chr10:g.92648120G>A"),
        ssm("ssm-s950p", "KIF11", "S950P", "chr10:g.92665380T>C"),
        ssm("ssm-tp53", "TP53", "R175H", "chr17:g.7675088C>T"),
    ])
    .to_string()
}

fn gdc_occurrences() -> String {
    json!([
        { "data": {
            "ssm_id": "ssm-a366t",
            "cosmic_id": null,
            "gene_aa_change": ["KIF11 A366T"],
            "occurrence": [ { "case": { "case_id": "case-1", "primary_site": "Breast", "disease_type": "Ductal and Lobular Neoplasms" } } ]
        }}
    ])
    .to_string()
}

fn write_inputs(dir: &Path) -> Result<Vec<SourceInput>> {
    let mut inputs = Vec::new();
    let mut add = |kind: SourceKind, name: &str, contents: String| -> Result<()> {
        let path: PathBuf = dir.join(name);
        fs::write(&path, contents)?;
        inputs.push(SourceInput::new(kind, path));
        Ok(())
    };
    // Deliberately out of write order
    add(SourceKind::Clinvar, "clinvar_result.txt", CLINVAR.to_string())?;
    add(SourceKind::GdcOccurrences, "ssm_occurrences.json", gdc_occurrences())?;
    add(SourceKind::Vep, "vep_results.txt", vep_report())?;
    add(SourceKind::Cosmic, "V87_38_MUTANT.csv", COSMIC.to_string())?;
    add(SourceKind::FathmmCancer, "fathmm_results.txt", FATHMM.to_string())?;
    add(SourceKind::GdcMutations, "mutations.json", gdc_mutations())?;
    Ok(inputs)
}

#[tokio::test]
async fn test_full_import_into_sqlite() -> Result<()> {
    let temp_dir = tempdir()?;
    let inputs = write_inputs(temp_dir.path())?;
    let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::open(temp_dir.path().join("kinesin.db"))?);
    let pipeline = ImportPipeline::new(storage.clone(), ExtractContext::default())
        .with_import_log(ImportLog::open_at_root(temp_dir.path())?, "home");

    let report = pipeline.run(&inputs, ImportOptions::default()).await;
    assert!(report.is_clean(), "unexpected failures: {:?}", report.failures);

    // Sources are reported in write order whatever order they were passed in
    let order: Vec<SourceKind> = report.sources.iter().map(|s| s.kind).collect();
    assert_eq!(order, SourceKind::ALL.to_vec());

    let counts = storage.table_counts().await?;
    assert_eq!(counts.mutations, 2);
    // two GDC ssm ids, one COSMIC id, one ClinVar variation
    assert_eq!(counts.sources, 4);
    assert_eq!(counts.impacts, 2);
    assert_eq!(counts.tissues, 2);

    // COSMIC outranks GDC and supplied the missing CDS
    let a366t = storage.get_mutation("A366T").await?.unwrap();
    assert_eq!(a366t.annotation_source, SourceDatabase::Cosmic);
    assert_eq!(a366t.cds.as_deref(), Some("1096G>A"));
    assert_eq!(a366t.domain, Domain::KinesinMotor);
    let cosmic_mutations = report
        .writes
        .iter()
        .find(|w| w.table == Table::Mutation && w.source_name == "cosmic")
        .unwrap();
    assert_eq!((cosmic_mutations.inserted, cosmic_mutations.updated), (0, 1));

    let s950p = storage.get_mutation("S950P").await?.unwrap();
    assert_eq!(s950p.annotation_source, SourceDatabase::Gdc);
    assert_eq!(s950p.domain, Domain::TailBinding);

    // Every predictor filled in its own columns on the same row
    let impact = storage.get_impact("A366T").await?.unwrap();
    assert_eq!(impact.vep_impact.as_deref(), Some("MODERATE"));
    assert_eq!(impact.cosmic_fathmm_pred.as_deref(), Some("PATHOGENIC"));
    assert_eq!(impact.fathmm_cancer_pred.as_deref(), Some("CANCER"));
    assert_eq!(impact.clinvar_significance.as_deref(), Some("Uncertain significance"));
    assert_eq!(impact.median_rank.as_deref(), Some("0.712"));

    // M1T is only known to the annotation sources
    assert!(storage.get_mutation("M1T").await?.is_none());
    let vep_impacts = report
        .writes
        .iter()
        .find(|w| w.table == Table::Impact && w.source_name == "vep")
        .unwrap();
    assert_eq!(vep_impacts.skipped, 1);

    let tissues = storage.list_tissues(Some("A366T")).await?;
    let samples: Vec<&str> = tissues.iter().map(|t| t.sample_id.as_str()).collect();
    assert!(samples.contains(&"1001"));
    assert!(samples.contains(&"case-1"));

    Ok(())
}

#[tokio::test]
async fn test_rerun_is_safe() -> Result<()> {
    let temp_dir = tempdir()?;
    let inputs = write_inputs(temp_dir.path())?;
    let db_path = temp_dir.path().join("kinesin.db");

    let first_counts = {
        let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::open(&db_path)?);
        let pipeline = ImportPipeline::new(storage.clone(), ExtractContext::default())
            .with_import_log(ImportLog::open_at_root(temp_dir.path())?, "home");
        let report = pipeline.run(&inputs, ImportOptions::default()).await;
        assert!(report.is_clean());
        storage.table_counts().await?
    };

    // A fresh session over the same files. VEP and ClinVar still hold M1T rows that no mutation
    // source has supplied, so only they are read again.
    let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::open(&db_path)?);
    let pipeline = ImportPipeline::new(storage.clone(), ExtractContext::default())
        .with_import_log(ImportLog::open_at_root(temp_dir.path())?, "home");
    let second = pipeline.run(&inputs, ImportOptions::default()).await;
    assert!(second.is_clean(), "unexpected failures: {:?}", second.failures);
    for source in &second.sources {
        let expected = match source.kind {
            SourceKind::Vep | SourceKind::Clinvar => SourceStatus::Extracted,
            _ => SourceStatus::AlreadyImported,
        };
        assert_eq!(source.status, expected, "{}", source.kind);
    }
    assert_eq!(storage.table_counts().await?, first_counts);

    // Forcing a re-import writes nothing new
    let forced = pipeline.run(&inputs, ImportOptions { force: true }).await;
    assert!(forced.is_clean(), "unexpected failures: {:?}", forced.failures);
    for write in forced.writes.iter().filter(|w| w.table != Table::Impact) {
        assert_eq!(write.inserted, 0, "{write}");
    }
    assert_eq!(storage.table_counts().await?, first_counts);

    Ok(())
}

#[tokio::test]
async fn test_environments_sharing_a_data_root_import_independently() -> Result<()> {
    let temp_dir = tempdir()?;
    let inputs = write_inputs(temp_dir.path())?;
    let open = |name: &str| -> Result<(Arc<dyn Storage>, ImportPipeline)> {
        let storage: Arc<dyn Storage> =
            Arc::new(SqliteStorage::open(temp_dir.path().join(format!("kinesin_{name}.db")))?);
        let pipeline = ImportPipeline::new(storage.clone(), ExtractContext::default())
            .with_import_log(ImportLog::open_at_root(temp_dir.path())?, name);
        Ok((storage, pipeline))
    };

    let (home, home_pipeline) = open("home")?;
    assert!(home_pipeline.run(&inputs, ImportOptions::default()).await.is_clean());

    // The same files into a second database: nothing is skipped because of the home import
    let (kenobi, kenobi_pipeline) = open("kenobi")?;
    let report = kenobi_pipeline.run(&inputs, ImportOptions::default()).await;
    assert!(report
        .sources
        .iter()
        .all(|s| s.status == SourceStatus::Extracted));
    assert_eq!(kenobi.table_counts().await?, home.table_counts().await?);
    assert_eq!(kenobi.table_counts().await?.mutations, 2);

    // Each environment still remembers its own imports
    let again = home_pipeline.run(&inputs, ImportOptions::default()).await;
    let gdc = again
        .sources
        .iter()
        .find(|s| s.kind == SourceKind::GdcMutations)
        .unwrap();
    assert_eq!(gdc.status, SourceStatus::AlreadyImported);

    let log = ImportLog::open_at_root(temp_dir.path())?;
    let environments: Vec<String> = log.recent(20)?.into_iter().map(|e| e.environment).collect();
    assert!(environments.iter().any(|e| e == "home"));
    assert!(environments.iter().any(|e| e == "kenobi"));

    Ok(())
}

#[tokio::test]
async fn test_dry_run_against_memory() -> Result<()> {
    let temp_dir = tempdir()?;
    let inputs = write_inputs(temp_dir.path())?;
    let storage = Arc::new(InMemoryStorage::new());
    let pipeline = ImportPipeline::new(storage.clone(), ExtractContext::default());

    let report = pipeline.run(&inputs, ImportOptions::default()).await;
    assert!(report.is_clean());
    assert_eq!(storage.table_counts().await?.mutations, 2);
    assert!(!temp_dir.path().join("import_log").exists());

    Ok(())
}

#[tokio::test]
async fn test_storage_failure_is_reported_and_run_continues() -> Result<()> {
    let temp_dir = tempdir()?;
    let inputs = write_inputs(temp_dir.path())?;
    let storage = Arc::new(InMemoryStorage::new());
    storage.fail_writes_after(Table::Tissue, 0);
    let pipeline = ImportPipeline::new(storage.clone(), ExtractContext::default());

    let report = pipeline.run(&inputs, ImportOptions::default()).await;

    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].contains("tissue"));
    // Everything else committed, including the median pass that runs last
    let counts = storage.table_counts().await?;
    assert_eq!(counts.mutations, 2);
    // The COSMIC tissue batch rolled back; the GDC occurrence batch after it committed
    assert_eq!(counts.tissues, 1);
    assert_eq!(storage.list_tissues(None).await?[0].sample_id, "case-1");
    let impact = storage.get_impact("A366T").await?.unwrap();
    assert_eq!(impact.median_rank.as_deref(), Some("0.712"));

    Ok(())
}
