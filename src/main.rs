use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use kinesin_import::config::{Config, ResolvedEnvironment};
use kinesin_import::constants::{self, METRICS_SNAPSHOT_FILE};
use kinesin_import::export;
use kinesin_import::logging;
use kinesin_import::metrics;
use kinesin_import::pipeline::ingestion::ImportLog;
use kinesin_import::pipeline::processing::domain::{DomainMap, DomainPreset};
use kinesin_import::pipeline::processing::normalize::{from_one_letter, from_three_letter, residue_number};
use kinesin_import::pipeline::storage::{InMemoryStorage, SqliteStorage, Storage};
use kinesin_import::pipeline::{ImportOptions, ImportPipeline, SourceInput};
use kinesin_import::types::SourceKind;

#[derive(Parser)]
#[command(name = "kinesin_import")]
#[command(about = "Import KIF11 mutation annotations into the kinesin mutation database")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema and import log for an environment
    Init {
        /// Database environment (home, kenobi, ...)
        #[arg(long)]
        env: Option<String>,
    },
    /// Import the configured exports
    Import {
        /// Specific sources to import (comma-separated). Available: gdc, cosmic, vep, fathmm, clinvar, gdc_occurrences
        #[arg(long)]
        sources: Option<String>,
        /// Database environment (home, kenobi, ...)
        #[arg(long)]
        env: Option<String>,
        /// Run against an in-memory store and discard the result
        #[arg(long)]
        dry_run: bool,
        /// Re-import files that were already imported
        #[arg(long)]
        force: bool,
    },
    /// Recompute the median prediction rank for every impact row
    Median {
        #[arg(long)]
        env: Option<String>,
    },
    /// Normalize a mutation notation and report its domain
    Classify {
        /// `A366T`, `p.Ala366Thr`, or a ClinVar-style name
        id: String,
        /// Include the intrinsically disordered regions
        #[arg(long)]
        idr: bool,
        #[arg(long, value_enum, default_value_t = PresetArg::Structural)]
        preset: PresetArg,
    },
    /// Write submission lists for the prediction services
    Export {
        #[arg(value_enum)]
        format: ExportFormat,
        #[arg(long)]
        env: Option<String>,
        /// Output file; stdout when omitted
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Show table counts and recent imports
    Summary {
        #[arg(long)]
        env: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PresetArg {
    Pfam,
    Structural,
}

impl From<PresetArg> for DomainPreset {
    fn from(arg: PresetArg) -> Self {
        match arg {
            PresetArg::Pfam => DomainPreset::Pfam,
            PresetArg::Structural => DomainPreset::Structural,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Vep,
    Fathmm,
}

fn open_storage(env: &ResolvedEnvironment) -> anyhow::Result<Arc<dyn Storage>> {
    let storage = SqliteStorage::open(&env.config.path)
        .with_context(|| format!("opening {} database at {}", env.name, env.config.path.display()))?;
    Ok(Arc::new(storage))
}

fn selected_inputs(config: &Config, sources: Option<&str>) -> anyhow::Result<Vec<SourceInput>> {
    let kinds = match sources {
        Some(list) => {
            let (kinds, unknown) = constants::parse_source_list(list);
            for name in &unknown {
                warn!("Unknown source specified: {}", name);
                println!("⚠️  Unknown source: {name}");
            }
            kinds
        }
        None => SourceKind::ALL.to_vec(),
    };

    let mut inputs = Vec::new();
    for kind in kinds {
        match config.inputs.path_for(kind) {
            Some(path) => inputs.push(SourceInput::new(kind, path)),
            None if sources.is_some() => bail!("no input path configured for source '{kind}'"),
            None => info!("No input configured for {}, skipping", kind),
        }
    }
    Ok(inputs)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();
    metrics::init_metrics();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { env } => {
            let config = Config::load()?;
            let env = config.resolve_environment(env.as_deref())?;
            println!("🗄️  Initializing '{}' database at {}", env.name, env.config.path.display());
            open_storage(&env)?;
            ImportLog::open_at_root(&config.database.data_root)?;
            println!("✅ Schema and import log ready");
        }
        Commands::Import {
            sources,
            env,
            dry_run,
            force,
        } => {
            let config = Config::load()?;
            let inputs = selected_inputs(&config, sources.as_deref())?;
            if inputs.is_empty() {
                println!("⚠️  Nothing to import: no inputs configured");
                return Ok(());
            }

            let pipeline = if dry_run {
                println!("🧪 Dry run: writing to an in-memory store");
                ImportPipeline::new(Arc::new(InMemoryStorage::new()), config.extract_context())
            } else {
                let env = config.resolve_environment(env.as_deref())?;
                println!("🔄 Importing into '{}' ({})", env.name, env.config.path.display());
                ImportPipeline::new(open_storage(&env)?, config.extract_context())
                    .with_import_log(ImportLog::open_at_root(&config.database.data_root)?, env.name.clone())
            };

            let report = pipeline.run(&inputs, ImportOptions { force }).await;
            println!("\n📊 Import results:\n{report}");

            let counts = pipeline.coordinator().storage().table_counts().await?;
            println!(
                "   Tables: mutation={} source_info={} impact={} tissue={}",
                counts.mutations, counts.sources, counts.impacts, counts.tissues
            );

            let snapshot = config.database.data_root.join(METRICS_SNAPSHOT_FILE);
            match metrics::write_snapshot(&snapshot) {
                Ok(true) => info!("Metrics snapshot written to {}", snapshot.display()),
                Ok(false) => {}
                Err(e) => warn!("Failed to write metrics snapshot: {}", e),
            }

            if !report.is_clean() {
                bail!("{} failure(s) during import", report.failures.len());
            }
        }
        Commands::Median { env } => {
            let config = Config::load()?;
            let env = config.resolve_environment(env.as_deref())?;
            let pipeline = ImportPipeline::new(open_storage(&env)?, config.extract_context());
            let report = pipeline.coordinator().update_median_ranks().await?;
            println!("📈 {report}");
        }
        Commands::Classify { id, idr, preset } => {
            let mutation_id = from_one_letter(&id).or_else(|_| from_three_letter(&id))?;
            let domains = DomainMap::new(preset.into(), idr);
            let position = residue_number(&mutation_id);
            println!(
                "{} residue={} domain={}",
                mutation_id,
                position.map(|p| p.to_string()).unwrap_or_else(|| "?".to_string()),
                domains.classify_position(position)
            );
        }
        Commands::Export { format, env, output } => {
            let config = Config::load()?;
            let env = config.resolve_environment(env.as_deref())?;
            let storage = open_storage(&env)?;
            let mutations = storage.list_mutations().await?;

            let text = match format {
                ExportFormat::Vep => {
                    let mut lines = export::vep_input(&mutations).join("\n");
                    lines.push('\n');
                    lines
                }
                ExportFormat::Fathmm => format!("{}\n", export::fathmm_input(&config.gene.uniprot, &mutations)),
            };

            match output {
                Some(path) => {
                    std::fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
                    println!("💾 Wrote {}", path.display());
                }
                None => print!("{text}"),
            }
        }
        Commands::Summary { env } => {
            let config = Config::load()?;
            let env = config.resolve_environment(env.as_deref())?;
            let storage = open_storage(&env)?;
            let counts = storage.table_counts().await?;
            println!("📋 '{}' ({})", env.name, env.config.path.display());
            println!("   mutation:    {}", counts.mutations);
            println!("   source_info: {}", counts.sources);
            println!("   impact:      {}", counts.impacts);
            println!("   tissue:      {}", counts.tissues);

            let log = ImportLog::open_at_root(&config.database.data_root)?;
            let recent = log.recent(10)?;
            if !recent.is_empty() {
                println!("\n🕘 Recent imports:");
                for entry in recent {
                    println!(
                        "   {} {:<8} {:<16} records={} rejected={} {}",
                        entry.imported_at.format("%Y-%m-%d %H:%M"),
                        entry.environment,
                        entry.source,
                        entry.records,
                        entry.rejected,
                        entry.path
                    );
                }
            }
        }
    }

    Ok(())
}
