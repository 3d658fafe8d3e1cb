use async_trait::async_trait;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, Transaction};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use super::{
    BatchFailure, BatchResult, ImpactWriteCounts, InsertCounts, MutationWrite, Storage,
    TableCounts,
};
use crate::error::{ImportError, Result};
use crate::pipeline::processing::domain::Domain;
use crate::types::{
    Consequence, ImpactRecord, MutationClass, MutationRecord, SourceDatabase, SourceRecord,
    TissueRecord,
};

const MIGRATION_001: &str = include_str!("../../../migrations/001_create_mutation_tables.sql");

const MUTATION_COLUMNS: &str = "protein_change, residue_number, genomic_coordinate, coding_flag, cds, \
     mutation_class, consequence, gene, organism, domain, annotation_source";

impl ToSql for Domain {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.label()))
    }
}

impl FromSql for Domain {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let label = value.as_str()?;
        Domain::from_label(label)
            .ok_or_else(|| FromSqlError::Other(format!("unknown domain '{}'", label).into()))
    }
}

impl ToSql for SourceDatabase {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for SourceDatabase {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let label = value.as_str()?;
        SourceDatabase::from_label(label)
            .ok_or_else(|| FromSqlError::Other(format!("unknown source database '{}'", label).into()))
    }
}

fn mutation_from_row(row: &Row<'_>) -> rusqlite::Result<MutationRecord> {
    Ok(MutationRecord {
        protein_change: row.get(0)?,
        residue_number: row.get(1)?,
        genomic_coordinate: row.get(2)?,
        coding: row.get(3)?,
        cds: row.get(4)?,
        mutation_class: row.get::<_, Option<String>>(5)?.map(MutationClass::from),
        consequence: row.get::<_, Option<String>>(6)?.map(Consequence::from),
        gene: row.get(7)?,
        organism: row.get(8)?,
        domain: row.get(9)?,
        annotation_source: row.get(10)?,
    })
}

fn impact_from_row(row: &Row<'_>) -> rusqlite::Result<ImpactRecord> {
    let mut impact = ImpactRecord::new(row.get::<_, String>(0)?);
    for (i, slot) in impact.values_mut().into_iter().enumerate() {
        *slot = row.get(i + 1)?;
    }
    Ok(impact)
}

fn impact_select() -> String {
    format!("SELECT mutation_id, {} FROM impact", ImpactRecord::COLUMNS.join(", "))
}

fn impact_params(impact: &ImpactRecord) -> Vec<Option<&str>> {
    let mut values = vec![Some(impact.mutation_id.as_str())];
    values.extend(impact.values());
    values
}

/// SQLite-backed storage. One connection per run, released when the storage is dropped.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open (creating if needed) the database file and apply migrations
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        info!("Opening mutation database at {}", path.display());
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(MIGRATION_001)
            .map_err(|e| ImportError::Database {
                message: format!("Failed to run migrations: {e}"),
            })?;
        debug!("Mutation schema ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| ImportError::Database {
            message: format!("connection lock poisoned: {e}"),
        })
    }

    /// Run `apply` for every row inside one transaction; any error rolls the batch back
    fn batch<T, R, F>(&self, rows: &[R], mut acc: T, mut apply: F) -> BatchResult<T>
    where
        F: FnMut(&Transaction<'_>, &R, &mut T) -> std::result::Result<(), String>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| BatchFailure::new(0, format!("connection lock poisoned: {e}")))?;
        let tx = conn
            .transaction()
            .map_err(|e| BatchFailure::new(0, e.to_string()))?;

        for (i, row) in rows.iter().enumerate() {
            // dropping `tx` without commit rolls back
            apply(&tx, row, &mut acc).map_err(|message| BatchFailure::new(i, message))?;
        }

        tx.commit()
            .map_err(|e| BatchFailure::new(rows.len(), e.to_string()))?;
        Ok(acc)
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn get_mutation(&self, mutation_id: &str) -> Result<Option<MutationRecord>> {
        let conn = self.connection()?;
        let sql = format!("SELECT {MUTATION_COLUMNS} FROM mutation WHERE protein_change = ?1");
        Ok(conn
            .query_row(&sql, params![mutation_id], mutation_from_row)
            .optional()?)
    }

    async fn find_mutations(&self, mutation_ids: &[String]) -> Result<HashMap<String, MutationRecord>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MUTATION_COLUMNS} FROM mutation WHERE protein_change = ?1"
        ))?;
        let mut found = HashMap::new();
        for id in mutation_ids {
            if let Some(record) = stmt.query_row(params![id], mutation_from_row).optional()? {
                found.insert(id.clone(), record);
            }
        }
        Ok(found)
    }

    async fn existing_mutation_ids(&self, mutation_ids: &[String]) -> Result<HashSet<String>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare("SELECT 1 FROM mutation WHERE protein_change = ?1")?;
        let mut existing = HashSet::new();
        for id in mutation_ids {
            if stmt.exists(params![id])? {
                existing.insert(id.clone());
            }
        }
        Ok(existing)
    }

    async fn list_mutations(&self) -> Result<Vec<MutationRecord>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MUTATION_COLUMNS} FROM mutation ORDER BY protein_change"
        ))?;
        let rows = stmt.query_map([], mutation_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn write_mutations(&self, writes: &[MutationWrite]) -> BatchResult<usize> {
        let insert = format!("INSERT INTO mutation ({MUTATION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)");
        let update = "UPDATE mutation SET residue_number = ?2, genomic_coordinate = ?3, coding_flag = ?4, \
                      cds = ?5, mutation_class = ?6, consequence = ?7, gene = ?8, organism = ?9, \
                      domain = ?10, annotation_source = ?11 WHERE protein_change = ?1";

        self.batch(writes, 0, |tx, write, applied| {
            let m = write.record();
            let mutation_class = m.mutation_class.as_ref().map(MutationClass::as_str);
            let consequence = m.consequence.as_ref().map(Consequence::as_str);
            let values = params![
                m.protein_change,
                m.residue_number,
                m.genomic_coordinate,
                m.coding,
                m.cds,
                mutation_class,
                consequence,
                m.gene,
                m.organism,
                m.domain,
                m.annotation_source,
            ];
            let changed = match write {
                MutationWrite::Insert(_) => tx.execute(&insert, values),
                MutationWrite::Update(_) => tx.execute(update, values),
            }
            .map_err(|e| e.to_string())?;
            if changed == 0 {
                return Err(format!("no mutation '{}' to update", m.protein_change));
            }
            *applied += 1;
            Ok(())
        })
    }

    async fn insert_sources(&self, rows: &[SourceRecord]) -> BatchResult<InsertCounts> {
        self.batch(rows, InsertCounts::default(), |tx, row, counts| {
            let changed = tx
                .execute(
                    "INSERT OR IGNORE INTO source_info (source_id, source_database, mutation_id) VALUES (?1, ?2, ?3)",
                    params![row.source_id, row.source_database, row.mutation_id],
                )
                .map_err(|e| e.to_string())?;
            if changed == 0 {
                counts.duplicates += 1;
            } else {
                counts.inserted += 1;
            }
            Ok(())
        })
    }

    async fn list_sources(&self, mutation_id: Option<&str>) -> Result<Vec<SourceRecord>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT source_id, source_database, mutation_id FROM source_info
             WHERE ?1 IS NULL OR mutation_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![mutation_id], |row| {
            Ok(SourceRecord {
                source_id: row.get(0)?,
                source_database: row.get(1)?,
                mutation_id: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn upsert_impacts(&self, rows: &[ImpactRecord]) -> BatchResult<ImpactWriteCounts> {
        let select = format!("{} WHERE mutation_id = ?1", impact_select());
        let placeholders: Vec<String> = (1..=ImpactRecord::COLUMNS.len() + 1)
            .map(|i| format!("?{i}"))
            .collect();
        let insert = format!(
            "INSERT INTO impact (mutation_id, {}) VALUES ({})",
            ImpactRecord::COLUMNS.join(", "),
            placeholders.join(", ")
        );
        let assignments: Vec<String> = ImpactRecord::COLUMNS
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{column} = ?{}", i + 2))
            .collect();
        let update = format!(
            "UPDATE impact SET {} WHERE mutation_id = ?1",
            assignments.join(", ")
        );

        self.batch(rows, ImpactWriteCounts::default(), |tx, row, counts| {
            let existing = tx
                .query_row(&select, params![row.mutation_id], impact_from_row)
                .optional()
                .map_err(|e| e.to_string())?;
            match existing {
                None => {
                    tx.execute(&insert, params_from_iter(impact_params(row)))
                        .map_err(|e| e.to_string())?;
                    counts.inserted += 1;
                }
                Some(mut stored) => {
                    if stored.merge_from(row) {
                        tx.execute(&update, params_from_iter(impact_params(&stored)))
                            .map_err(|e| e.to_string())?;
                        counts.updated += 1;
                    } else {
                        counts.unchanged += 1;
                    }
                }
            }
            Ok(())
        })
    }

    async fn get_impact(&self, mutation_id: &str) -> Result<Option<ImpactRecord>> {
        let conn = self.connection()?;
        let sql = format!("{} WHERE mutation_id = ?1", impact_select());
        Ok(conn
            .query_row(&sql, params![mutation_id], impact_from_row)
            .optional()?)
    }

    async fn list_impacts(&self) -> Result<Vec<ImpactRecord>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!("{} ORDER BY mutation_id", impact_select()))?;
        let rows = stmt.query_map([], impact_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn insert_tissues(&self, rows: &[TissueRecord]) -> BatchResult<InsertCounts> {
        self.batch(rows, InsertCounts::default(), |tx, row, counts| {
            let changed = tx
                .execute(
                    "INSERT OR IGNORE INTO tissue (mutation_id, sample_id, tissue_type, cancer_type) VALUES (?1, ?2, ?3, ?4)",
                    params![row.mutation_id, row.sample_id, row.tissue_type, row.cancer_type],
                )
                .map_err(|e| e.to_string())?;
            if changed == 0 {
                counts.duplicates += 1;
            } else {
                counts.inserted += 1;
            }
            Ok(())
        })
    }

    async fn list_tissues(&self, mutation_id: Option<&str>) -> Result<Vec<TissueRecord>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT mutation_id, sample_id, tissue_type, cancer_type FROM tissue
             WHERE ?1 IS NULL OR mutation_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![mutation_id], |row| {
            Ok(TissueRecord {
                mutation_id: row.get(0)?,
                sample_id: row.get(1)?,
                tissue_type: row.get(2)?,
                cancer_type: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn table_counts(&self) -> Result<TableCounts> {
        let conn = self.connection()?;
        let count = |table: &str| -> Result<usize> {
            let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
            Ok(n as usize)
        };
        Ok(TableCounts {
            mutations: count("mutation")?,
            sources: count("source_info")?,
            impacts: count("impact")?,
            tissues: count("tissue")?,
        })
    }
}
