//! Seam to the external table-storage engine.
//!
//! The transaction log, conflict detection, file compaction and retention
//! cleanup all live behind [`TableEngine`]. [`DeltaEngine`] drives Delta Lake
//! tables through `deltalake`. [`MemoryEngine`] is a non-durable test double
//! keeping committed batches in process.

mod delta;
mod memory;

use std::collections::HashMap;

use arrow::{array::RecordBatch, datatypes::SchemaRef};
use async_trait::async_trait;
use deltalake::datafusion::{dataframe::DataFrame, error::DataFusionError};
use parquet::file::properties::WriterProperties;
use thiserror::Error;

pub use delta::DeltaEngine;
pub use memory::{MemoryEngine, MemoryStorage};

/// Errors reported by a [`TableEngine`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// No committed table exists at the location.
    #[error("no table found at {location}")]
    TableNotFound {
        /// Table location.
        location: String,
    },
    /// Failure inside the Delta Lake engine.
    #[error("delta error: {0}")]
    Delta(#[from] deltalake::DeltaTableError),
    /// Failure while planning or executing a DataFusion query.
    #[error("datafusion error: {0}")]
    DataFusion(#[from] DataFusionError),
    /// Failure while manipulating Arrow data.
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    /// The merge predicate cannot be evaluated.
    #[error("invalid merge predicate: {0}")]
    InvalidPredicate(String),
    /// The vacuum retention window is shorter than the enforced minimum.
    #[error("retention of {requested_hours}h is below the enforced minimum of {minimum_hours}h")]
    RetentionTooShort {
        /// Requested window.
        requested_hours: u64,
        /// Minimum accepted while retention is enforced.
        minimum_hours: u64,
    },
    /// A batch does not fit the committed table layout.
    #[error("batch schema does not match the table at {location}")]
    SchemaMismatch {
        /// Table location.
        location: String,
    },
}

impl EngineError {
    /// Whether this error reports a table without committed data.
    pub fn is_table_not_found(&self) -> bool {
        matches!(self, EngineError::TableNotFound { .. })
    }
}

/// How a write combines with committed data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Add rows next to the committed ones.
    Append,
    /// Replace every committed row.
    Overwrite,
}

/// Engine-specific knobs attached to a write.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Free-text table description; the dispatcher stores the primary key here.
    pub description: Option<String>,
    /// Parquet writer tuning.
    pub writer_properties: Option<WriterProperties>,
    /// Target size of data files produced by the write, in bytes.
    pub target_file_size: Option<usize>,
    /// Table configuration recorded when the write creates the table.
    pub configuration: HashMap<String, Option<String>>,
}

impl WriteOptions {
    /// Set the free-text description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the Parquet writer properties.
    #[must_use]
    pub fn writer_properties(mut self, properties: WriterProperties) -> Self {
        self.writer_properties = Some(properties);
        self
    }

    /// Set the target data file size.
    #[must_use]
    pub fn target_file_size(mut self, bytes: usize) -> Self {
        self.target_file_size = Some(bytes);
        self
    }

    /// Add a table configuration entry.
    #[must_use]
    pub fn configuration(mut self, key: impl Into<String>, value: Option<String>) -> Self {
        self.configuration.insert(key.into(), value);
        self
    }
}

/// Equality join between the source batch and the target table over key columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePredicate {
    /// Key columns, in declared order.
    pub columns: Vec<String>,
    /// Alias of the incoming batch.
    pub source_alias: String,
    /// Alias of the committed table.
    pub target_alias: String,
}

impl MergePredicate {
    /// Source alias used by the dispatcher.
    pub const SOURCE_ALIAS: &'static str = "s";
    /// Target alias used by the dispatcher.
    pub const TARGET_ALIAS: &'static str = "t";

    /// Join over `columns` with the `s` / `t` aliases.
    pub fn over<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            source_alias: Self::SOURCE_ALIAS.to_string(),
            target_alias: Self::TARGET_ALIAS.to_string(),
        }
    }

    /// SQL form, e.g. `s.a = t.a AND s.b = t.b`.
    pub fn to_sql(&self) -> String {
        self.columns
            .iter()
            .map(|column| {
                format!(
                    "{}.{column} = {}.{column}",
                    self.source_alias, self.target_alias
                )
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

/// One action of a merge, keyed on whether the predicate matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeClause {
    /// Matched target rows take every column from the source row.
    MatchedUpdateAll,
    /// Matched target rows are deleted.
    MatchedDelete,
    /// Source rows without a target match are inserted.
    NotMatchedInsertAll,
    /// Target rows without a source match are deleted.
    NotMatchedBySourceDelete,
}

/// Row counts reported by a merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Rows in the source batch.
    pub source_rows: usize,
    /// Rows inserted into the target.
    pub rows_inserted: usize,
    /// Target rows rewritten with source values.
    pub rows_updated: usize,
    /// Target rows deleted.
    pub rows_deleted: usize,
    /// Target rows carried over unchanged into rewritten files.
    pub rows_copied: usize,
}

/// Compaction request passed through to the engine.
#[derive(Debug, Clone, Default)]
pub struct OptimizeOptions {
    /// Desired size of compacted files, in bytes.
    pub target_size: Option<u64>,
    /// Upper bound on the engine's internal parallelism.
    pub max_concurrent_tasks: Option<usize>,
    /// Parquet writer tuning for rewritten files.
    pub writer_properties: Option<WriterProperties>,
}

/// What a compaction did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimizeSummary {
    /// Files written.
    pub files_added: u64,
    /// Files logically removed.
    pub files_removed: u64,
    /// Bytes written.
    pub bytes_added: i64,
    /// Bytes logically removed.
    pub bytes_removed: i64,
    /// Partitions touched.
    pub partitions_optimized: u64,
}

/// Retention cleanup request passed through to the engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct VacuumOptions {
    /// Retention window in hours; `None` keeps the engine default.
    pub retention_hours: Option<u64>,
    /// Reject windows shorter than the engine's safety default.
    pub enforce_retention_duration: bool,
}

/// Descriptive metadata the engine keeps for a table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableMetadata {
    /// Engine-assigned table id.
    pub id: String,
    /// Engine-side table name, if any.
    pub name: Option<String>,
    /// Free-text description.
    pub description: Option<String>,
    /// Creation time in milliseconds since the epoch.
    pub created_time: Option<i64>,
    /// Table configuration.
    pub configuration: HashMap<String, Option<String>>,
}

/// Schema and metadata recovered from a committed table.
#[derive(Debug, Clone)]
pub struct TableDescription {
    /// Schema of the committed table.
    pub schema: SchemaRef,
    /// Engine metadata, including the description holding the primary key.
    pub metadata: TableMetadata,
}

/// Current state of a committed table.
#[derive(Debug, Clone)]
pub struct SnapshotInfo {
    /// Current version number.
    pub version: i64,
    /// Engine metadata.
    pub metadata: TableMetadata,
    /// Number of data files referenced by the current version.
    pub file_count: usize,
}

/// Capabilities required from the external table-storage engine.
///
/// Every method addresses a table by the location handed out by the storage
/// backend. Methods touching committed data must report
/// [`EngineError::TableNotFound`] when nothing was ever committed there.
#[async_trait]
pub trait TableEngine: Send + Sync {
    /// Commit `batch` at `location`, creating the table on first write.
    async fn write(
        &self,
        location: &str,
        batch: RecordBatch,
        mode: WriteMode,
        options: &WriteOptions,
    ) -> Result<(), EngineError>;

    /// Merge `batch` into the committed table using `predicate` and `clauses`.
    async fn merge(
        &self,
        location: &str,
        batch: RecordBatch,
        predicate: &MergePredicate,
        clauses: &[MergeClause],
    ) -> Result<MergeSummary, EngineError>;

    /// Materialise every committed row.
    async fn read(&self, location: &str) -> Result<Vec<RecordBatch>, EngineError>;

    /// Deferred-execution view over the committed rows.
    async fn scan(&self, location: &str) -> Result<DataFrame, EngineError>;

    /// Schema and metadata of the committed table.
    async fn describe(&self, location: &str) -> Result<TableDescription, EngineError>;

    /// Version, metadata and file count of the committed table.
    async fn snapshot_info(&self, location: &str) -> Result<SnapshotInfo, EngineError>;

    /// Compact small files toward the target size.
    async fn optimize(
        &self,
        location: &str,
        options: &OptimizeOptions,
    ) -> Result<OptimizeSummary, EngineError>;

    /// Delete files no retained version references; returns the deleted paths.
    async fn vacuum(
        &self,
        location: &str,
        options: &VacuumOptions,
    ) -> Result<Vec<String>, EngineError>;
}
