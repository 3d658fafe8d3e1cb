// Import pipeline: extraction, reconciliation, and storage

pub mod ingestion;
pub mod processing;
pub mod storage;

use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::error::{ImportError, Result};
use crate::idempotency::{compute_idempotency_key, file_sha256};
use crate::metrics::{ExtractMetrics, RunMetrics, WriteMetrics};
use crate::types::{Extraction, MutationKeyed, SourceKind};
use ingestion::{ImportEntry, ImportLog};
use processing::catalog::{UpsertCoordinator, WriteReport};
use processing::extract::{ExtractContext, ExtractorRegistry};
use storage::Storage;

/// One export file to import
#[derive(Debug, Clone)]
pub struct SourceInput {
    pub kind: SourceKind,
    pub path: PathBuf,
}

impl SourceInput {
    pub fn new(kind: SourceKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImportOptions {
    /// Re-import files the import log has already seen
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SourceStatus {
    Extracted,
    AlreadyImported,
    Failed(String),
}

/// What happened to one input before anything was written
#[derive(Debug, Clone, Serialize)]
pub struct SourceOutcome {
    pub kind: SourceKind,
    pub path: String,
    pub status: SourceStatus,
    pub records: usize,
    pub rejected: usize,
    pub other_gene: usize,
    pub duplicates: usize,
}

impl SourceOutcome {
    fn new(input: &SourceInput, status: SourceStatus) -> Self {
        Self {
            kind: input.kind,
            path: input.path.display().to_string(),
            status,
            records: 0,
            rejected: 0,
            other_gene: 0,
            duplicates: 0,
        }
    }
}

/// Result of a complete import run. Batch errors never stop the run; they land in `failures`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub sources: Vec<SourceOutcome>,
    pub writes: Vec<WriteReport>,
    pub failures: Vec<String>,
}

impl RunReport {
    fn new(run_id: String) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            finished_at: None,
            sources: Vec::new(),
            writes: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Write reports for one source, in table order
    pub fn writes_for(&self, source_name: &str) -> Vec<&WriteReport> {
        self.writes
            .iter()
            .filter(|w| w.source_name == source_name)
            .collect()
    }

    fn absorb(&mut self, kind: SourceKind, outcome: Result<(WriteReport, usize)>, batches: &mut BatchOutcomes) {
        match outcome {
            Ok((mut write, unknown)) => {
                if unknown > 0 {
                    WriteMetrics::record_rows(write.table, &write.source_name, "skipped", unknown);
                    write.skipped += unknown;
                    batches.incomplete.insert(kind);
                }
                self.writes.push(write);
            }
            Err(e) if e.is_batch_fatal() => {
                error!(source = %kind, error = %e, "❌ Batch rolled back");
                batches.failed.insert(kind);
                self.failures.push(e.to_string());
            }
            Err(e) => {
                error!(source = %kind, error = %e, "❌ Source abandoned, remaining tables skipped");
                batches.failed.insert(kind);
                batches.abandoned.insert(kind);
                self.failures.push(format!("{kind}: {e}"));
            }
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run {}", self.run_id)?;
        for source in &self.sources {
            let status = match &source.status {
                SourceStatus::Extracted => "extracted".to_string(),
                SourceStatus::AlreadyImported => "already imported".to_string(),
                SourceStatus::Failed(reason) => format!("failed: {reason}"),
            };
            writeln!(
                f,
                "  {:<16} {} (records={} rejected={} other_gene={} duplicates={})",
                source.kind.name(),
                status,
                source.records,
                source.rejected,
                source.other_gene,
                source.duplicates
            )?;
        }
        for write in &self.writes {
            writeln!(f, "  {write}")?;
        }
        for failure in &self.failures {
            writeln!(f, "  ❌ {failure}")?;
        }
        Ok(())
    }
}

/// Per-source results of the table writes for one run
#[derive(Debug, Default)]
pub struct BatchOutcomes {
    /// Sources with at least one failed batch
    pub failed: HashSet<SourceKind>,
    /// Sources that hit a non-batch error; their later tables were not attempted
    pub abandoned: HashSet<SourceKind>,
    /// Sources with rows dropped because their mutation is not catalogued yet
    pub incomplete: HashSet<SourceKind>,
}

/// Import log plus the database environment its keys are scoped to
struct LogTarget {
    log: Mutex<ImportLog>,
    environment: String,
}

/// Drives extraction and the ordered table writes for one storage session
pub struct ImportPipeline {
    registry: ExtractorRegistry,
    coordinator: UpsertCoordinator,
    ctx: ExtractContext,
    import_log: Option<LogTarget>,
}

impl ImportPipeline {
    pub fn new(storage: Arc<dyn Storage>, ctx: ExtractContext) -> Self {
        Self {
            registry: ExtractorRegistry::new(),
            coordinator: UpsertCoordinator::new(storage),
            ctx,
            import_log: None,
        }
    }

    /// Skip files already imported into `environment` and record new imports.
    /// Several environments may share one log; each keeps its own entries.
    pub fn with_import_log(mut self, log: ImportLog, environment: impl Into<String>) -> Self {
        self.import_log = Some(LogTarget {
            log: Mutex::new(log),
            environment: environment.into(),
        });
        self
    }

    fn environment(&self) -> &str {
        self.import_log
            .as_ref()
            .map(|target| target.environment.as_str())
            .unwrap_or_default()
    }

    pub fn coordinator(&self) -> &UpsertCoordinator {
        &self.coordinator
    }

    pub fn context(&self) -> &ExtractContext {
        &self.ctx
    }

    /// Parse one export file without writing anything
    pub fn extract_file(&self, kind: SourceKind, path: &Path) -> Result<Extraction> {
        let file = File::open(path).map_err(|e| {
            ImportError::Config(format!("cannot open {} input {}: {e}", kind, path.display()))
        })?;
        let mut reader = BufReader::new(file);
        self.registry.extract(kind, &mut reader, &self.ctx)
    }

    fn logged_import(&self, key: &str) -> Result<Option<ImportEntry>> {
        match &self.import_log {
            Some(target) => {
                let log = target
                    .log
                    .lock()
                    .map_err(|e| ImportError::Config(format!("import log lock poisoned: {e}")))?;
                log.find(key)
            }
            None => Ok(None),
        }
    }

    fn record_import(&self, entry: &ImportEntry) -> Result<()> {
        if let Some(target) = &self.import_log {
            let log = target
                .log
                .lock()
                .map_err(|e| ImportError::Config(format!("import log lock poisoned: {e}")))?;
            log.record(entry)?;
        }
        Ok(())
    }

    /// Import every input, then refresh median ranks.
    ///
    /// Inputs are processed in write order regardless of how they are passed: mutation-bearing
    /// sources first, then provenance, predictions and tissue context.
    #[instrument(skip(self, inputs, options), fields(inputs = inputs.len()))]
    pub async fn run(&self, inputs: &[SourceInput], options: ImportOptions) -> RunReport {
        let run_id = Uuid::new_v4().to_string();
        let t_run = std::time::Instant::now();
        info!(run_id = %run_id, "🚀 Starting import run");
        let mut report = RunReport::new(run_id.clone());

        let mut ordered: Vec<&SourceInput> = inputs.iter().collect();
        ordered.sort_by_key(|input| SourceKind::ALL.iter().position(|k| *k == input.kind));

        let mut extractions = Vec::new();
        let mut pending_entries = Vec::new();
        for input in ordered {
            match self.prepare(input, &run_id, options) {
                Ok(Some((extraction, entry))) => {
                    let mut outcome = SourceOutcome::new(input, SourceStatus::Extracted);
                    outcome.records = extraction.record_count();
                    outcome.rejected = extraction.rejected.len();
                    outcome.other_gene = extraction.other_gene;
                    outcome.duplicates = extraction.duplicates;
                    report.sources.push(outcome);
                    pending_entries.push(entry);
                    extractions.push(extraction);
                }
                Ok(None) => {
                    info!(source = %input.kind, path = %input.path.display(), "⏭️  Already imported, skipping");
                    report
                        .sources
                        .push(SourceOutcome::new(input, SourceStatus::AlreadyImported));
                }
                Err(e) => {
                    error!(source = %input.kind, error = %e, "❌ Extraction failed");
                    ExtractMetrics::record_source_failed(input.kind.name());
                    report.failures.push(format!("{}: {e}", input.kind));
                    report
                        .sources
                        .push(SourceOutcome::new(input, SourceStatus::Failed(e.to_string())));
                }
            }
        }

        let batches = self.write_extractions(&extractions, &mut report).await;

        match self.coordinator.update_median_ranks().await {
            Ok(write) => report.writes.push(write),
            Err(e) => {
                error!(error = %e, "❌ Median rank update failed");
                report.failures.push(e.to_string());
            }
        }

        for (extraction, entry) in extractions.iter().zip(pending_entries) {
            if batches.failed.contains(&extraction.kind) {
                warn!(source = %extraction.kind, "Not marking source as imported after failed batches");
                continue;
            }
            if batches.incomplete.contains(&extraction.kind) {
                info!(
                    source = %extraction.kind,
                    "Not marking source as imported: some rows await their mutation"
                );
                continue;
            }
            if let Err(e) = self.record_import(&entry) {
                warn!(source = %extraction.kind, error = %e, "Failed to record import");
            }
        }

        report.finished_at = Some(Utc::now());
        RunMetrics::record_run(t_run.elapsed().as_secs_f64(), report.failures.len());
        info!(
            run_id = %report.run_id,
            writes = report.writes.len(),
            failures = report.failures.len(),
            "✅ Import run finished"
        );
        report
    }

    /// Fingerprint and extract one input. `None` when the file was already imported.
    fn prepare(
        &self,
        input: &SourceInput,
        run_id: &str,
        options: ImportOptions,
    ) -> Result<Option<(Extraction, ImportEntry)>> {
        let sha256 = file_sha256(&input.path).map_err(|e| {
            ImportError::Config(format!("cannot read {} input {}: {e}", input.kind, input.path.display()))
        })?;
        let key = compute_idempotency_key(input.kind.name(), &self.ctx.gene, self.environment(), &sha256);

        if !options.force && self.logged_import(&key)?.is_some() {
            return Ok(None);
        }

        info!(source = %input.kind, path = %input.path.display(), "📥 Extracting");
        let extraction = self.extract_file(input.kind, &input.path)?;
        ExtractMetrics::record_extracted(input.kind.name(), extraction.record_count());
        ExtractMetrics::record_rejected(input.kind.name(), extraction.rejected.len());

        let entry = ImportEntry {
            idempotency_key: key,
            run_id: run_id.to_string(),
            source: input.kind.name().to_string(),
            environment: self.environment().to_string(),
            path: input.path.display().to_string(),
            sha256,
            imported_at: Utc::now(),
            records: extraction.record_count(),
            rejected: extraction.rejected.len(),
        };
        Ok(Some((extraction, entry)))
    }

    /// Records whose mutation is persisted, plus how many were dropped.
    /// Mutation-bearing sources pass through untouched so ordering errors still surface.
    async fn annotation_rows<T: MutationKeyed + Clone>(
        &self,
        kind: SourceKind,
        rows: &[T],
    ) -> Result<(Vec<T>, usize)> {
        if kind.carries_mutations() {
            return Ok((rows.to_vec(), 0));
        }
        let (known, unknown) = self.coordinator.partition_known(rows).await?;
        if !unknown.is_empty() {
            debug!(
                source = %kind,
                unknown = unknown.len(),
                first = %unknown[0].mutation_id(),
                "Dropping rows for mutations not in the catalogue"
            );
        }
        Ok((known, unknown.len()))
    }

    /// Write all extractions table by table
    pub async fn write_extractions(&self, extractions: &[Extraction], report: &mut RunReport) -> BatchOutcomes {
        let mut batches = BatchOutcomes::default();

        for ex in extractions.iter().filter(|e| e.kind.carries_mutations()) {
            let outcome = self
                .coordinator
                .upsert_mutations(ex.kind.name(), &ex.mutations)
                .await
                .map(|write| (write, 0));
            report.absorb(ex.kind, outcome, &mut batches);
        }

        for ex in extractions.iter().filter(|e| !e.sources.is_empty()) {
            if batches.abandoned.contains(&ex.kind) {
                continue;
            }
            let outcome = match self.annotation_rows(ex.kind, &ex.sources).await {
                Ok((rows, unknown)) => self
                    .coordinator
                    .insert_sources(ex.kind.name(), &rows)
                    .await
                    .map(|write| (write, unknown)),
                Err(e) => Err(e),
            };
            report.absorb(ex.kind, outcome, &mut batches);
        }

        for ex in extractions.iter().filter(|e| !e.impacts.is_empty()) {
            if batches.abandoned.contains(&ex.kind) {
                continue;
            }
            let outcome = match self.annotation_rows(ex.kind, &ex.impacts).await {
                Ok((rows, unknown)) => self
                    .coordinator
                    .upsert_impacts(ex.kind.name(), &rows)
                    .await
                    .map(|write| (write, unknown)),
                Err(e) => Err(e),
            };
            report.absorb(ex.kind, outcome, &mut batches);
        }

        for ex in extractions.iter().filter(|e| !e.tissues.is_empty()) {
            if batches.abandoned.contains(&ex.kind) {
                continue;
            }
            let outcome = match self.annotation_rows(ex.kind, &ex.tissues).await {
                Ok((rows, unknown)) => self
                    .coordinator
                    .insert_tissues(ex.kind.name(), &rows)
                    .await
                    .map(|write| (write, unknown)),
                Err(e) => Err(e),
            };
            report.absorb(ex.kind, outcome, &mut batches);
        }

        batches
    }
}
