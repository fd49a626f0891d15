use std::{
    collections::{BTreeMap, HashMap, HashSet},
    io,
    sync::{Arc, Mutex, MutexGuard},
};

use arrow::{
    array::{Array, ArrayRef, RecordBatch},
    compute::{concat_batches, kernels::interleave::interleave},
    datatypes::{Field, Schema, SchemaRef},
    row::{OwnedRow, RowConverter, Rows, SortField},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deltalake::datafusion::{dataframe::DataFrame, datasource::MemTable, prelude::SessionContext};
use ulid::Ulid;

use super::{
    EngineError, MergeClause, MergePredicate, MergeSummary, OptimizeOptions, OptimizeSummary,
    SnapshotInfo, TableDescription, TableEngine, TableMetadata, VacuumOptions, WriteMode,
    WriteOptions,
};
use crate::{catalog::StorageBackend, observability::log_debug};

const LOCATION_PREFIX: &str = "memory://";
/// Retention applied when a vacuum does not name one.
const DEFAULT_RETENTION_HOURS: u64 = 168;
/// Target file size applied when an optimize does not name one.
const DEFAULT_TARGET_SIZE: u64 = 100 * 1024 * 1024;

type Tables = Arc<Mutex<BTreeMap<String, StoredTable>>>;

#[derive(Debug)]
struct DataFile {
    path: String,
    batch: RecordBatch,
    size: usize,
}

impl DataFile {
    fn new(batch: RecordBatch) -> Self {
        Self {
            path: format!("part-{}.arrow", Ulid::new()),
            size: batch.get_array_memory_size(),
            batch,
        }
    }
}

#[derive(Debug)]
struct RemovedFile {
    path: String,
    removed_at: DateTime<Utc>,
}

#[derive(Debug)]
struct StoredTable {
    schema: SchemaRef,
    version: i64,
    metadata: TableMetadata,
    files: Vec<DataFile>,
    removed: Vec<RemovedFile>,
}

impl StoredTable {
    fn create(schema: &Schema, options: &WriteOptions) -> Self {
        let fields = schema
            .fields()
            .iter()
            .map(|field| Field::new(field.name(), field.data_type().clone(), true))
            .collect::<Vec<_>>();
        Self {
            schema: Arc::new(Schema::new(fields)),
            version: -1,
            metadata: TableMetadata {
                id: Ulid::new().to_string(),
                name: None,
                description: options.description.clone(),
                created_time: Some(Utc::now().timestamp_millis()),
                configuration: options.configuration.clone(),
            },
            files: Vec::new(),
            removed: Vec::new(),
        }
    }

    /// Reorder `batch` into the table's column order.
    fn align(&self, location: &str, batch: &RecordBatch) -> Result<RecordBatch, EngineError> {
        if !crate::schema::conforms(&self.schema, batch) {
            return Err(EngineError::SchemaMismatch {
                location: location.to_string(),
            });
        }
        let columns = self
            .schema
            .fields()
            .iter()
            .map(|field| {
                batch
                    .column_by_name(field.name())
                    .cloned()
                    .ok_or_else(|| EngineError::SchemaMismatch {
                        location: location.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RecordBatch::try_new(Arc::clone(&self.schema), columns)?)
    }

    fn contents(&self) -> Result<RecordBatch, EngineError> {
        Ok(concat_batches(
            &self.schema,
            self.files.iter().map(|file| &file.batch),
        )?)
    }

    fn retire_all(&mut self) {
        let now = Utc::now();
        self.removed
            .extend(self.files.drain(..).map(|file| RemovedFile {
                path: file.path,
                removed_at: now,
            }));
    }

    fn commit(&mut self, batch: RecordBatch) {
        if batch.num_rows() > 0 {
            self.files.push(DataFile::new(batch));
        }
        self.version += 1;
    }
}

/// Non-durable [`TableEngine`] test double keeping committed batches in
/// process memory.
///
/// It mirrors the engine contract closely enough for unit and integration
/// tests and for [`LakeManager::in_memory`](crate::LakeManager::in_memory):
/// every commit bumps the table version and every batch is one data file.
/// Its optimize and vacuum only reshuffle in-memory batches; durable
/// compaction and retention cleanup belong to [`DeltaEngine`](super::DeltaEngine).
/// Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryEngine {
    tables: Tables,
}

impl MemoryEngine {
    /// Empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage backend addressing this engine's tables.
    pub fn storage(&self) -> MemoryStorage {
        MemoryStorage {
            tables: Arc::clone(&self.tables),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, StoredTable>> {
        self.tables
            .lock()
            .expect("memory engine table map should not be poisoned")
    }
}

fn not_found(location: &str) -> EngineError {
    EngineError::TableNotFound {
        location: location.to_string(),
    }
}

fn key_rows(
    converter: &RowConverter,
    batch: &RecordBatch,
    indices: &[usize],
) -> Result<Rows, EngineError> {
    let columns = indices
        .iter()
        .map(|idx| Arc::clone(batch.column(*idx)))
        .collect::<Vec<ArrayRef>>();
    Ok(converter.convert_columns(&columns)?)
}

#[async_trait]
impl TableEngine for MemoryEngine {
    async fn write(
        &self,
        location: &str,
        batch: RecordBatch,
        mode: WriteMode,
        options: &WriteOptions,
    ) -> Result<(), EngineError> {
        let mut tables = self.lock();
        let table = tables
            .entry(location.to_string())
            .or_insert_with(|| StoredTable::create(&batch.schema(), options));
        let batch = table.align(location, &batch)?;
        if mode == WriteMode::Overwrite {
            table.retire_all();
        }
        table.commit(batch);
        log_debug!(
            component = "memory",
            event = "memory_write_committed",
            location = %location,
            mode = ?mode,
            version = table.version,
        );
        Ok(())
    }

    async fn merge(
        &self,
        location: &str,
        batch: RecordBatch,
        predicate: &MergePredicate,
        clauses: &[MergeClause],
    ) -> Result<MergeSummary, EngineError> {
        if predicate.columns.is_empty() {
            return Err(EngineError::InvalidPredicate(
                "merge requires at least one key column".to_string(),
            ));
        }
        let mut tables = self.lock();
        let table = tables.get_mut(location).ok_or_else(|| not_found(location))?;
        let source = table.align(location, &batch)?;
        let target = table.contents()?;

        let key_indices = predicate
            .columns
            .iter()
            .map(|column| {
                table
                    .schema
                    .index_of(column)
                    .map_err(|_| EngineError::InvalidPredicate(format!("unknown column {column}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let converter = RowConverter::new(
            key_indices
                .iter()
                .map(|idx| SortField::new(table.schema.field(*idx).data_type().clone()))
                .collect(),
        )?;
        let target_keys = key_rows(&converter, &target, &key_indices)?;
        let source_keys = key_rows(&converter, &source, &key_indices)?;

        // Later source rows win when keys repeat.
        let source_by_key = source_keys
            .iter()
            .enumerate()
            .map(|(idx, row)| (row.owned(), idx))
            .collect::<HashMap<OwnedRow, usize>>();
        let update = clauses.contains(&MergeClause::MatchedUpdateAll);
        let delete = clauses.contains(&MergeClause::MatchedDelete);
        let insert = clauses.contains(&MergeClause::NotMatchedInsertAll);
        let delete_unmatched = clauses.contains(&MergeClause::NotMatchedBySourceDelete);

        let mut summary = MergeSummary {
            source_rows: source.num_rows(),
            ..MergeSummary::default()
        };
        // (0, row) picks a target row, (1, row) a source row.
        let mut picks = Vec::with_capacity(target.num_rows() + source.num_rows());
        let mut target_seen = HashSet::with_capacity(target.num_rows());
        for (row_idx, row) in target_keys.iter().enumerate() {
            let key = row.owned();
            match source_by_key.get(&key) {
                Some(&source_idx) if update => {
                    picks.push((1, source_idx));
                    summary.rows_updated += 1;
                }
                Some(_) if delete => summary.rows_deleted += 1,
                None if delete_unmatched => summary.rows_deleted += 1,
                _ => {
                    picks.push((0, row_idx));
                    summary.rows_copied += 1;
                }
            }
            target_seen.insert(key);
        }
        if insert {
            for (row_idx, row) in source_keys.iter().enumerate() {
                let key = row.owned();
                if target_seen.contains(&key) || source_by_key.get(&key) != Some(&row_idx) {
                    continue;
                }
                picks.push((1, row_idx));
                summary.rows_inserted += 1;
            }
        }

        let columns = (0..table.schema.fields().len())
            .map(|idx| {
                let values: [&dyn Array; 2] =
                    [target.column(idx).as_ref(), source.column(idx).as_ref()];
                interleave(&values, &picks)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let merged = RecordBatch::try_new(Arc::clone(&table.schema), columns)?;
        table.retire_all();
        table.commit(merged);
        log_debug!(
            component = "memory",
            event = "memory_merge_committed",
            location = %location,
            version = table.version,
            inserted = summary.rows_inserted,
            updated = summary.rows_updated,
            deleted = summary.rows_deleted,
        );
        Ok(summary)
    }

    async fn read(&self, location: &str) -> Result<Vec<RecordBatch>, EngineError> {
        let tables = self.lock();
        let table = tables.get(location).ok_or_else(|| not_found(location))?;
        Ok(table.files.iter().map(|file| file.batch.clone()).collect())
    }

    async fn scan(&self, location: &str) -> Result<DataFrame, EngineError> {
        let (schema, batches) = {
            let tables = self.lock();
            let table = tables.get(location).ok_or_else(|| not_found(location))?;
            let batches = table
                .files
                .iter()
                .map(|file| file.batch.clone())
                .collect::<Vec<_>>();
            (Arc::clone(&table.schema), batches)
        };
        let provider = MemTable::try_new(schema, vec![batches])?;
        Ok(SessionContext::new().read_table(Arc::new(provider))?)
    }

    async fn describe(&self, location: &str) -> Result<TableDescription, EngineError> {
        let tables = self.lock();
        let table = tables.get(location).ok_or_else(|| not_found(location))?;
        Ok(TableDescription {
            schema: Arc::clone(&table.schema),
            metadata: table.metadata.clone(),
        })
    }

    async fn snapshot_info(&self, location: &str) -> Result<SnapshotInfo, EngineError> {
        let tables = self.lock();
        let table = tables.get(location).ok_or_else(|| not_found(location))?;
        Ok(SnapshotInfo {
            version: table.version,
            metadata: table.metadata.clone(),
            file_count: table.files.len(),
        })
    }

    async fn optimize(
        &self,
        location: &str,
        options: &OptimizeOptions,
    ) -> Result<OptimizeSummary, EngineError> {
        let mut tables = self.lock();
        let table = tables.get_mut(location).ok_or_else(|| not_found(location))?;
        let target_size = options.target_size.unwrap_or(DEFAULT_TARGET_SIZE);
        let (small, large): (Vec<_>, Vec<_>) = table
            .files
            .drain(..)
            .partition(|file| (file.size as u64) < target_size);
        table.files = large;
        if small.len() < 2 {
            table.files.extend(small);
            return Ok(OptimizeSummary::default());
        }

        let compacted = concat_batches(&table.schema, small.iter().map(|file| &file.batch))?;
        let compacted = DataFile::new(compacted);
        let now = Utc::now();
        let summary = OptimizeSummary {
            files_added: 1,
            files_removed: small.len() as u64,
            bytes_added: compacted.size as i64,
            bytes_removed: small.iter().map(|file| file.size as i64).sum(),
            partitions_optimized: 1,
        };
        table
            .removed
            .extend(small.into_iter().map(|file| RemovedFile {
                path: file.path,
                removed_at: now,
            }));
        table.files.push(compacted);
        table.version += 1;
        log_debug!(
            component = "memory",
            event = "memory_optimize_committed",
            location = %location,
            files_removed = summary.files_removed,
            max_concurrent_tasks = ?options.max_concurrent_tasks,
        );
        Ok(summary)
    }

    async fn vacuum(
        &self,
        location: &str,
        options: &VacuumOptions,
    ) -> Result<Vec<String>, EngineError> {
        let retention_hours = options.retention_hours.unwrap_or(DEFAULT_RETENTION_HOURS);
        if options.enforce_retention_duration && retention_hours < DEFAULT_RETENTION_HOURS {
            return Err(EngineError::RetentionTooShort {
                requested_hours: retention_hours,
                minimum_hours: DEFAULT_RETENTION_HOURS,
            });
        }
        let mut tables = self.lock();
        let table = tables.get_mut(location).ok_or_else(|| not_found(location))?;
        let retention =
            chrono::Duration::try_hours(i64::try_from(retention_hours).unwrap_or(i64::MAX))
                .unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(retention)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let (expired, kept): (Vec<_>, Vec<_>) = table
            .removed
            .drain(..)
            .partition(|file| file.removed_at <= cutoff);
        table.removed = kept;
        Ok(expired.into_iter().map(|file| file.path).collect())
    }
}

/// [`StorageBackend`] over the tables of a [`MemoryEngine`].
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    tables: Tables,
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    fn root(&self) -> String {
        LOCATION_PREFIX.to_string()
    }

    fn table_uri(&self, name: &str) -> String {
        format!("{LOCATION_PREFIX}{name}")
    }

    async fn discover(&self) -> io::Result<Vec<String>> {
        let tables = self
            .tables
            .lock()
            .expect("memory engine table map should not be poisoned");
        Ok(tables
            .keys()
            .filter_map(|location| location.strip_prefix(LOCATION_PREFIX))
            .map(str::to_string)
            .collect())
    }

    async fn delete_table_storage(&self, name: &str) -> io::Result<()> {
        self.tables
            .lock()
            .expect("memory engine table map should not be poisoned")
            .remove(&self.table_uri(name));
        Ok(())
    }
}
