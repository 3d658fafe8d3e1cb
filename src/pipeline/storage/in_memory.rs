use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use super::{
    BatchFailure, BatchResult, ImpactWriteCounts, InsertCounts, MutationWrite, Storage,
    TableCounts,
};
use crate::error::{ImportError, Result};
use crate::types::{ImpactRecord, MutationRecord, SourceRecord, Table, TissueRecord};

#[derive(Debug, Clone, Default)]
struct Tables {
    mutations: BTreeMap<String, MutationRecord>,
    sources: Vec<SourceRecord>,
    impacts: BTreeMap<String, ImpactRecord>,
    tissues: Vec<TissueRecord>,
}

impl Tables {
    fn require_mutation(&self, mutation_id: &str, completed: usize) -> BatchResult<()> {
        if self.mutations.contains_key(mutation_id) {
            Ok(())
        } else {
            Err(BatchFailure::new(
                completed,
                format!("FOREIGN KEY constraint failed: mutation '{}'", mutation_id),
            ))
        }
    }
}

/// In-memory storage for tests and dry runs.
///
/// Batches run against a copy of the tables that replaces the live set only on success, and
/// foreign keys are enforced the same way the SQLite schema enforces them.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    tables: Arc<Mutex<Tables>>,
    fault: Arc<Mutex<Option<(Table, usize)>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next batch against `table` fail once `rows` rows have been applied
    pub fn fail_writes_after(&self, table: Table, rows: usize) {
        if let Ok(mut fault) = self.fault.lock() {
            *fault = Some((table, rows));
        }
    }

    fn read(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables.lock().map_err(|e| ImportError::Database {
            message: format!("in-memory tables poisoned: {}", e),
        })
    }

    fn injected_fault(&self, table: Table) -> Option<usize> {
        let mut fault = self.fault.lock().ok()?;
        match *fault {
            Some((t, rows)) if t == table => {
                *fault = None;
                Some(rows)
            }
            _ => None,
        }
    }

    /// Run `apply` for each row against a scratch copy, committing only if every row succeeds
    fn transaction<T, R, F>(&self, table: Table, rows: &[R], mut acc: T, mut apply: F) -> BatchResult<T>
    where
        F: FnMut(&mut Tables, &R, usize, &mut T) -> BatchResult<()>,
    {
        let mut live = self
            .tables
            .lock()
            .map_err(|e| BatchFailure::new(0, format!("in-memory tables poisoned: {}", e)))?;
        let fail_at = self.injected_fault(table);
        let mut scratch = live.clone();

        for (i, row) in rows.iter().enumerate() {
            if fail_at == Some(i) {
                return Err(BatchFailure::new(i, format!("injected fault in {} batch", table)));
            }
            apply(&mut scratch, row, i, &mut acc)?;
        }

        *live = scratch;
        debug!("Committed {} row(s) into {}", rows.len(), table);
        Ok(acc)
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn get_mutation(&self, mutation_id: &str) -> Result<Option<MutationRecord>> {
        Ok(self.read()?.mutations.get(mutation_id).cloned())
    }

    async fn find_mutations(&self, mutation_ids: &[String]) -> Result<HashMap<String, MutationRecord>> {
        let tables = self.read()?;
        Ok(mutation_ids
            .iter()
            .filter_map(|id| tables.mutations.get(id).map(|m| (id.clone(), m.clone())))
            .collect())
    }

    async fn existing_mutation_ids(&self, mutation_ids: &[String]) -> Result<HashSet<String>> {
        let tables = self.read()?;
        Ok(mutation_ids
            .iter()
            .filter(|id| tables.mutations.contains_key(*id))
            .cloned()
            .collect())
    }

    async fn list_mutations(&self) -> Result<Vec<MutationRecord>> {
        Ok(self.read()?.mutations.values().cloned().collect())
    }

    async fn write_mutations(&self, writes: &[MutationWrite]) -> BatchResult<usize> {
        self.transaction(Table::Mutation, writes, 0, |tables, write, i, applied| {
            let record = write.record();
            let exists = tables.mutations.contains_key(&record.protein_change);
            match write {
                MutationWrite::Insert(_) if exists => {
                    return Err(BatchFailure::new(
                        i,
                        format!("UNIQUE constraint failed: mutation.protein_change '{}'", record.protein_change),
                    ));
                }
                MutationWrite::Update(_) if !exists => {
                    return Err(BatchFailure::new(
                        i,
                        format!("no mutation '{}' to update", record.protein_change),
                    ));
                }
                _ => {}
            }
            tables
                .mutations
                .insert(record.protein_change.clone(), record.clone());
            *applied += 1;
            Ok(())
        })
    }

    async fn insert_sources(&self, rows: &[SourceRecord]) -> BatchResult<InsertCounts> {
        self.transaction(Table::SourceInfo, rows, InsertCounts::default(), |tables, row, i, counts| {
            tables.require_mutation(&row.mutation_id, i)?;
            let duplicate = tables
                .sources
                .iter()
                .any(|s| s.mutation_id == row.mutation_id && s.source_id == row.source_id);
            if duplicate {
                counts.duplicates += 1;
            } else {
                tables.sources.push(row.clone());
                counts.inserted += 1;
            }
            Ok(())
        })
    }

    async fn list_sources(&self, mutation_id: Option<&str>) -> Result<Vec<SourceRecord>> {
        let tables = self.read()?;
        Ok(tables
            .sources
            .iter()
            .filter(|s| mutation_id.map_or(true, |id| s.mutation_id == id))
            .cloned()
            .collect())
    }

    async fn upsert_impacts(&self, rows: &[ImpactRecord]) -> BatchResult<ImpactWriteCounts> {
        self.transaction(Table::Impact, rows, ImpactWriteCounts::default(), |tables, row, i, counts| {
            tables.require_mutation(&row.mutation_id, i)?;
            match tables.impacts.get_mut(&row.mutation_id) {
                Some(existing) => {
                    if existing.merge_from(row) {
                        counts.updated += 1;
                    } else {
                        counts.unchanged += 1;
                    }
                }
                None => {
                    tables.impacts.insert(row.mutation_id.clone(), row.clone());
                    counts.inserted += 1;
                }
            }
            Ok(())
        })
    }

    async fn get_impact(&self, mutation_id: &str) -> Result<Option<ImpactRecord>> {
        Ok(self.read()?.impacts.get(mutation_id).cloned())
    }

    async fn list_impacts(&self) -> Result<Vec<ImpactRecord>> {
        Ok(self.read()?.impacts.values().cloned().collect())
    }

    async fn insert_tissues(&self, rows: &[TissueRecord]) -> BatchResult<InsertCounts> {
        self.transaction(Table::Tissue, rows, InsertCounts::default(), |tables, row, i, counts| {
            tables.require_mutation(&row.mutation_id, i)?;
            let duplicate = tables
                .tissues
                .iter()
                .any(|t| t.mutation_id == row.mutation_id && t.sample_id == row.sample_id);
            if duplicate {
                counts.duplicates += 1;
            } else {
                tables.tissues.push(row.clone());
                counts.inserted += 1;
            }
            Ok(())
        })
    }

    async fn list_tissues(&self, mutation_id: Option<&str>) -> Result<Vec<TissueRecord>> {
        let tables = self.read()?;
        Ok(tables
            .tissues
            .iter()
            .filter(|t| mutation_id.map_or(true, |id| t.mutation_id == id))
            .cloned()
            .collect())
    }

    async fn table_counts(&self) -> Result<TableCounts> {
        let tables = self.read()?;
        Ok(TableCounts {
            mutations: tables.mutations.len(),
            sources: tables.sources.len(),
            impacts: tables.impacts.len(),
            tissues: tables.tissues.len(),
        })
    }
}
