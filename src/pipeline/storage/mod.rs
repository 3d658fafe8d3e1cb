//! Persistence for the four mutation tables.
//!
//! Every batch write is all-or-nothing: on failure the implementation rolls back and reports how
//! many rows it had applied before the fault.

pub mod in_memory;
pub mod sqlite;

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::error::Result;
use crate::types::{ImpactRecord, MutationRecord, SourceRecord, TissueRecord};

pub use in_memory::InMemoryStorage;
pub use sqlite::SqliteStorage;

/// A mutation row to write, already reconciled against what the store holds
#[derive(Debug, Clone, PartialEq)]
pub enum MutationWrite {
    Insert(MutationRecord),
    Update(MutationRecord),
}

impl MutationWrite {
    pub fn record(&self) -> &MutationRecord {
        match self {
            MutationWrite::Insert(record) | MutationWrite::Update(record) => record,
        }
    }
}

/// A batch that was rolled back
#[derive(Debug, Clone, Error)]
#[error("batch rolled back after {completed} row(s): {message}")]
pub struct BatchFailure {
    pub completed: usize,
    pub message: String,
}

impl BatchFailure {
    pub fn new(completed: usize, message: impl Into<String>) -> Self {
        Self {
            completed,
            message: message.into(),
        }
    }
}

pub type BatchResult<T> = std::result::Result<T, BatchFailure>;

/// Outcome of an append-only batch (source, tissue)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InsertCounts {
    pub inserted: usize,
    pub duplicates: usize,
}

/// Outcome of an impact batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImpactWriteCounts {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub mutations: usize,
    pub sources: usize,
    pub impacts: usize,
    pub tissues: usize,
}

/// Storage trait for the mutation catalogue
#[async_trait]
pub trait Storage: Send + Sync {
    // Mutation
    async fn get_mutation(&self, mutation_id: &str) -> Result<Option<MutationRecord>>;
    async fn find_mutations(&self, mutation_ids: &[String]) -> Result<HashMap<String, MutationRecord>>;
    async fn existing_mutation_ids(&self, mutation_ids: &[String]) -> Result<HashSet<String>>;
    async fn list_mutations(&self) -> Result<Vec<MutationRecord>>;
    async fn write_mutations(&self, writes: &[MutationWrite]) -> BatchResult<usize>;

    // Source
    async fn insert_sources(&self, rows: &[SourceRecord]) -> BatchResult<InsertCounts>;
    async fn list_sources(&self, mutation_id: Option<&str>) -> Result<Vec<SourceRecord>>;

    // Impact
    async fn upsert_impacts(&self, rows: &[ImpactRecord]) -> BatchResult<ImpactWriteCounts>;
    async fn get_impact(&self, mutation_id: &str) -> Result<Option<ImpactRecord>>;
    async fn list_impacts(&self) -> Result<Vec<ImpactRecord>>;

    // Tissue
    async fn insert_tissues(&self, rows: &[TissueRecord]) -> BatchResult<InsertCounts>;
    async fn list_tissues(&self, mutation_id: Option<&str>) -> Result<Vec<TissueRecord>>;

    async fn table_counts(&self) -> Result<TableCounts>;
}
