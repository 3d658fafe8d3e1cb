use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::precedence::{reconcile, Resolution};
use crate::error::{ImportError, Result};
use crate::metrics::WriteMetrics;
use crate::pipeline::processing::aggregate::refresh_median_ranks;
use crate::pipeline::storage::{BatchFailure, MutationWrite, Storage};
use crate::types::{
    ImpactRecord, MutationKeyed, MutationRecord, SourceRecord, Table, TissueRecord,
};

/// Source name used for writes the importer makes on its own behalf
pub const AGGREGATE_SOURCE: &str = "median";

/// Per-table, per-source outcome of one batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteReport {
    pub table: Table,
    pub source_name: String,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub duplicates: usize,
    pub skipped: usize,
}

impl WriteReport {
    pub fn new(table: Table, source_name: &str) -> Self {
        Self {
            table,
            source_name: source_name.to_string(),
            inserted: 0,
            updated: 0,
            unchanged: 0,
            duplicates: 0,
            skipped: 0,
        }
    }

    pub fn written(&self) -> usize {
        self.inserted + self.updated
    }

    fn publish(&self) {
        WriteMetrics::record_rows(self.table, &self.source_name, "inserted", self.inserted);
        WriteMetrics::record_rows(self.table, &self.source_name, "updated", self.updated);
        WriteMetrics::record_rows(self.table, &self.source_name, "unchanged", self.unchanged);
        WriteMetrics::record_rows(self.table, &self.source_name, "duplicate", self.duplicates);
        WriteMetrics::record_rows(self.table, &self.source_name, "skipped", self.skipped);
        info!(
            table = %self.table,
            source = %self.source_name,
            inserted = self.inserted,
            updated = self.updated,
            unchanged = self.unchanged,
            duplicates = self.duplicates,
            skipped = self.skipped,
            "Batch written"
        );
    }
}

impl fmt::Display for WriteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<12} {:<8} inserted={} updated={} unchanged={} duplicates={} skipped={}",
            self.table.to_string(),
            self.source_name,
            self.inserted,
            self.updated,
            self.unchanged,
            self.duplicates,
            self.skipped
        )
    }
}

/// Records that fail these checks are skipped and counted, never written
fn validate_mutation(record: &MutationRecord) -> std::result::Result<(), String> {
    if record.protein_change.trim().is_empty() {
        return Err("empty protein change".to_string());
    }
    if record.gene.trim().is_empty() {
        return Err(format!("mutation {} has no gene", record.protein_change));
    }
    Ok(())
}

fn validate_key<T: MutationKeyed>(record: &T, secondary: Option<&str>) -> std::result::Result<(), String> {
    if record.mutation_id().trim().is_empty() {
        return Err("empty mutation id".to_string());
    }
    if secondary.is_some_and(|key| key.trim().is_empty()) {
        return Err(format!("row for {} has an empty key", record.mutation_id()));
    }
    Ok(())
}

/// Writes per-source record batches into storage.
///
/// Mutations must be written before the rows that reference them. Each call is one table batch:
/// it either commits entirely or leaves storage untouched.
pub struct UpsertCoordinator {
    storage: Arc<dyn Storage>,
}

impl UpsertCoordinator {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    fn storage_error(table: Table, source_name: &str, failure: BatchFailure) -> ImportError {
        WriteMetrics::record_batch_failed(table, source_name);
        ImportError::Storage {
            table,
            source_name: source_name.to_string(),
            completed: failure.completed,
            message: failure.message,
        }
    }

    /// Fail before touching storage if any row references a mutation that is not persisted
    async fn require_mutations<T: MutationKeyed>(
        &self,
        table: Table,
        source_name: &str,
        records: &[T],
    ) -> Result<()> {
        let mut ids: Vec<String> = records.iter().map(|r| r.mutation_id().to_string()).collect();
        ids.sort();
        ids.dedup();

        let existing = self.storage.existing_mutation_ids(&ids).await?;
        let missing: Vec<&String> = ids.iter().filter(|id| !existing.contains(*id)).collect();
        if let Some(first) = missing.first() {
            WriteMetrics::record_batch_failed(table, source_name);
            return Err(ImportError::OutOfOrderWrite {
                table,
                source_name: source_name.to_string(),
                mutation_id: first.to_string(),
                missing: missing.len(),
            });
        }
        Ok(())
    }

    /// Split records into those whose mutation is persisted and those whose mutation is not
    pub async fn partition_known<T: MutationKeyed + Clone>(&self, records: &[T]) -> Result<(Vec<T>, Vec<T>)> {
        let ids: Vec<String> = records
            .iter()
            .map(|r| r.mutation_id().to_string())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let existing = self.storage.existing_mutation_ids(&ids).await?;
        Ok(records
            .iter()
            .cloned()
            .partition(|r| existing.contains(r.mutation_id())))
    }

    /// Insert new mutations and reconcile known ones by source precedence
    pub async fn upsert_mutations(&self, source_name: &str, records: &[MutationRecord]) -> Result<WriteReport> {
        let mut report = WriteReport::new(Table::Mutation, source_name);

        let mut valid = Vec::with_capacity(records.len());
        for record in records {
            match validate_mutation(record) {
                Ok(()) => valid.push(record),
                Err(reason) => {
                    warn!(source = %source_name, reason = %reason, "Skipping malformed mutation");
                    report.skipped += 1;
                }
            }
        }

        let ids: Vec<String> = valid.iter().map(|r| r.protein_change.clone()).collect();
        let stored = self.storage.find_mutations(&ids).await?;

        // Rows already reconciled in this batch, in first-seen order
        let mut order: Vec<String> = Vec::new();
        let mut pending: HashMap<String, MutationRecord> = HashMap::new();
        let mut seen: HashSet<String> = HashSet::new();

        for incoming in valid {
            let id = &incoming.protein_change;
            if !seen.insert(id.clone()) {
                report.duplicates += 1;
            }
            let current = pending.get(id).or_else(|| stored.get(id));
            match reconcile(current, incoming) {
                Resolution::Unchanged => {
                    debug!(mutation = %id, "Mutation unchanged");
                }
                resolution => {
                    if let Some(record) = resolution.record() {
                        if !pending.contains_key(id) {
                            order.push(id.clone());
                        }
                        pending.insert(id.clone(), record.clone());
                    }
                }
            }
        }

        let mut writes = Vec::with_capacity(order.len());
        for id in &order {
            let Some(record) = pending.remove(id) else { continue };
            if stored.contains_key(id) {
                report.updated += 1;
                writes.push(MutationWrite::Update(record));
            } else {
                report.inserted += 1;
                writes.push(MutationWrite::Insert(record));
            }
        }
        report.unchanged = seen.len() - order.len();

        if !writes.is_empty() {
            self.storage
                .write_mutations(&writes)
                .await
                .map_err(|failure| Self::storage_error(Table::Mutation, source_name, failure))?;
        }

        report.publish();
        Ok(report)
    }

    /// Append provenance rows; repeated `(mutation_id, source_id)` pairs are counted as duplicates
    pub async fn insert_sources(&self, source_name: &str, records: &[SourceRecord]) -> Result<WriteReport> {
        let mut report = WriteReport::new(Table::SourceInfo, source_name);
        let rows = self.valid_rows(&mut report, records, |r| Some(r.source_id.as_str()));
        self.require_mutations(Table::SourceInfo, source_name, &rows).await?;

        if !rows.is_empty() {
            let counts = self
                .storage
                .insert_sources(&rows)
                .await
                .map_err(|failure| Self::storage_error(Table::SourceInfo, source_name, failure))?;
            report.inserted = counts.inserted;
            report.duplicates += counts.duplicates;
        }

        report.publish();
        Ok(report)
    }

    /// Create impact rows on first prediction, then update only the columns each batch carries
    pub async fn upsert_impacts(&self, source_name: &str, records: &[ImpactRecord]) -> Result<WriteReport> {
        let mut report = WriteReport::new(Table::Impact, source_name);
        let valid = self.valid_rows(&mut report, records, |_| None);

        // Later rows for the same mutation merge into the first
        let mut merged: Vec<ImpactRecord> = Vec::with_capacity(valid.len());
        let mut index: HashMap<String, usize> = HashMap::new();
        for record in valid {
            match index.get(&record.mutation_id) {
                Some(&i) => {
                    merged[i].merge_from(&record);
                    report.duplicates += 1;
                }
                None => {
                    index.insert(record.mutation_id.clone(), merged.len());
                    merged.push(record);
                }
            }
        }

        self.require_mutations(Table::Impact, source_name, &merged).await?;

        if !merged.is_empty() {
            let counts = self
                .storage
                .upsert_impacts(&merged)
                .await
                .map_err(|failure| Self::storage_error(Table::Impact, source_name, failure))?;
            report.inserted = counts.inserted;
            report.updated = counts.updated;
            report.unchanged = counts.unchanged;
        }

        report.publish();
        Ok(report)
    }

    /// Append tissue observations; repeated `(mutation_id, sample_id)` pairs are suppressed
    pub async fn insert_tissues(&self, source_name: &str, records: &[TissueRecord]) -> Result<WriteReport> {
        let mut report = WriteReport::new(Table::Tissue, source_name);
        let rows = self.valid_rows(&mut report, records, |r| Some(r.sample_id.as_str()));
        self.require_mutations(Table::Tissue, source_name, &rows).await?;

        if !rows.is_empty() {
            let counts = self
                .storage
                .insert_tissues(&rows)
                .await
                .map_err(|failure| Self::storage_error(Table::Tissue, source_name, failure))?;
            report.inserted = counts.inserted;
            report.duplicates += counts.duplicates;
        }

        report.publish();
        Ok(report)
    }

    /// Recompute the aggregate rank for every persisted impact row in one batch
    pub async fn update_median_ranks(&self) -> Result<WriteReport> {
        let mut report = WriteReport::new(Table::Impact, AGGREGATE_SOURCE);
        let impacts = self.storage.list_impacts().await?;
        let updates = refresh_median_ranks(&impacts);
        report.unchanged = impacts.len() - updates.len();

        if !updates.is_empty() {
            let counts = self
                .storage
                .upsert_impacts(&updates)
                .await
                .map_err(|failure| Self::storage_error(Table::Impact, AGGREGATE_SOURCE, failure))?;
            report.updated = counts.updated;
            report.unchanged += counts.unchanged;
        }

        report.publish();
        Ok(report)
    }

    fn valid_rows<T, F>(&self, report: &mut WriteReport, records: &[T], secondary: F) -> Vec<T>
    where
        T: MutationKeyed + Clone,
        F: Fn(&T) -> Option<&str>,
    {
        records
            .iter()
            .filter(|record| match validate_key(*record, secondary(*record)) {
                Ok(()) => true,
                Err(reason) => {
                    warn!(
                        table = %report.table,
                        source = %report.source_name,
                        reason = %reason,
                        "Skipping malformed row"
                    );
                    report.skipped += 1;
                    false
                }
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processing::extract::ExtractContext;
    use crate::pipeline::storage::InMemoryStorage;
    use crate::types::SourceDatabase;

    fn coordinator() -> (UpsertCoordinator, Arc<InMemoryStorage>) {
        let storage = Arc::new(InMemoryStorage::new());
        (UpsertCoordinator::new(storage.clone()), storage)
    }

    fn mutation(id: &str, source: SourceDatabase) -> MutationRecord {
        ExtractContext::default().mutation(id, source)
    }

    fn tissue(mutation_id: &str, sample_id: &str) -> TissueRecord {
        TissueRecord {
            mutation_id: mutation_id.to_string(),
            sample_id: sample_id.to_string(),
            tissue_type: Some("breast".to_string()),
            cancer_type: None,
        }
    }

    #[tokio::test]
    async fn test_double_submission_is_idempotent() {
        let (coordinator, storage) = coordinator();
        let batch = vec![
            mutation("A366T", SourceDatabase::Cosmic),
            mutation("S950P", SourceDatabase::Cosmic),
        ];

        let first = coordinator.upsert_mutations("COSMIC", &batch).await.unwrap();
        let second = coordinator.upsert_mutations("COSMIC", &batch).await.unwrap();

        assert_eq!(first.inserted, 2);
        assert_eq!((second.inserted, second.updated, second.unchanged), (0, 0, 2));
        assert_eq!(storage.table_counts().await.unwrap().mutations, 2);
    }

    #[tokio::test]
    async fn test_out_of_order_dependent_write_persists_nothing() {
        let (coordinator, storage) = coordinator();
        coordinator
            .upsert_mutations("GDC", &[mutation("A366T", SourceDatabase::Gdc)])
            .await
            .unwrap();

        let err = coordinator
            .insert_tissues("COSMIC", &[tissue("A366T", "1"), tissue("M1T", "2")])
            .await
            .unwrap_err();
        match err {
            ImportError::OutOfOrderWrite { table, mutation_id, missing, .. } => {
                assert_eq!(table, Table::Tissue);
                assert_eq!(mutation_id, "M1T");
                assert_eq!(missing, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(storage.list_tissues(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_tissue_pairs_are_suppressed() {
        let (coordinator, _) = coordinator();
        coordinator
            .upsert_mutations("COSMIC", &[mutation("A366T", SourceDatabase::Cosmic)])
            .await
            .unwrap();

        let report = coordinator
            .insert_tissues("COSMIC", &[tissue("A366T", "1"), tissue("A366T", "1"), tissue("A366T", "2")])
            .await
            .unwrap();
        assert_eq!((report.inserted, report.duplicates), (2, 1));
    }

    #[tokio::test]
    async fn test_malformed_rows_are_skipped_not_fatal() {
        let (coordinator, _) = coordinator();
        let mut blank = mutation("A366T", SourceDatabase::Gdc);
        blank.protein_change = String::new();

        let report = coordinator
            .upsert_mutations("GDC", &[blank, mutation("S950P", SourceDatabase::Gdc)])
            .await
            .unwrap();
        assert_eq!((report.inserted, report.skipped), (1, 1));
    }

    #[tokio::test]
    async fn test_storage_fault_reports_table_and_progress() {
        let (coordinator, storage) = coordinator();
        storage.fail_writes_after(Table::Mutation, 1);

        let err = coordinator
            .upsert_mutations(
                "GDC",
                &[mutation("A366T", SourceDatabase::Gdc), mutation("S950P", SourceDatabase::Gdc)],
            )
            .await
            .unwrap_err();
        match err {
            ImportError::Storage { table, source_name, completed, .. } => {
                assert_eq!(table, Table::Mutation);
                assert_eq!(source_name, "GDC");
                assert_eq!(completed, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(storage.table_counts().await.unwrap().mutations, 0);
    }

    #[tokio::test]
    async fn test_partition_and_median() {
        let (coordinator, storage) = coordinator();
        coordinator
            .upsert_mutations("GDC", &[mutation("A366T", SourceDatabase::Gdc)])
            .await
            .unwrap();

        let mut known = ImpactRecord::new("A366T");
        known.cadd_rank = Some("5".to_string());
        known.revel_rank = Some("7".to_string());
        known.condel = Some("1".to_string());
        known.fathmm_rank = Some("NA".to_string());
        let unknown = ImpactRecord::new("M1T");

        let (present, absent) = coordinator.partition_known(&[known, unknown]).await.unwrap();
        assert_eq!(present.len(), 1);
        assert_eq!(absent[0].mutation_id, "M1T");

        coordinator.upsert_impacts("VEP", &present).await.unwrap();
        let report = coordinator.update_median_ranks().await.unwrap();
        assert_eq!(report.updated, 1);

        let stored = storage.get_impact("A366T").await.unwrap().unwrap();
        assert_eq!(stored.median_rank.as_deref(), Some("5"));

        // Nothing left to do on a second pass
        let again = coordinator.update_median_ranks().await.unwrap();
        assert_eq!((again.updated, again.unchanged), (0, 1));
    }
}
