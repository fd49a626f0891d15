use std::{collections::HashMap, sync::Arc};

use arrow::array::RecordBatch;
use async_trait::async_trait;
use deltalake::{
    datafusion::{dataframe::DataFrame, datasource::TableProvider, prelude::SessionContext},
    kernel::Metadata,
    protocol::SaveMode,
    DeltaOps, DeltaTable, DeltaTableError,
};

use super::{
    EngineError, MergeClause, MergePredicate, MergeSummary, OptimizeOptions, OptimizeSummary,
    SnapshotInfo, TableDescription, TableEngine, TableMetadata, VacuumOptions, WriteMode,
    WriteOptions,
};
use crate::observability::log_debug;

/// [`TableEngine`] over Delta Lake tables.
///
/// Locations are table URIs (local paths or object-store URLs). The storage
/// options given at construction are passed to every table open, which is
/// where object-store credentials go.
#[derive(Debug, Clone, Default)]
pub struct DeltaEngine {
    storage_options: HashMap<String, String>,
}

impl DeltaEngine {
    /// Engine without storage options; enough for local paths.
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine passing `storage_options` to the object store of every table.
    pub fn with_storage_options(storage_options: HashMap<String, String>) -> Self {
        Self { storage_options }
    }

    /// Options forwarded to the object store.
    pub fn storage_options(&self) -> &HashMap<String, String> {
        &self.storage_options
    }

    async fn open(&self, location: &str) -> Result<DeltaTable, EngineError> {
        deltalake::open_table_with_storage_options(location, self.storage_options.clone())
            .await
            .map_err(|err| classify(location, err))
    }

    async fn ops(&self, location: &str) -> Result<DeltaOps, EngineError> {
        DeltaOps::try_from_uri_with_storage_options(location, self.storage_options.clone())
            .await
            .map_err(EngineError::from)
    }
}

fn classify(location: &str, err: DeltaTableError) -> EngineError {
    match err {
        DeltaTableError::NotATable(_) | DeltaTableError::InvalidTableLocation(_) => {
            EngineError::TableNotFound {
                location: location.to_string(),
            }
        }
        other => EngineError::Delta(other),
    }
}

fn table_metadata(metadata: &Metadata) -> TableMetadata {
    TableMetadata {
        id: metadata.id.clone(),
        name: metadata.name.clone(),
        description: metadata.description.clone(),
        created_time: metadata.created_time,
        configuration: metadata.configuration.clone(),
    }
}

#[async_trait]
impl TableEngine for DeltaEngine {
    async fn write(
        &self,
        location: &str,
        batch: RecordBatch,
        mode: WriteMode,
        options: &WriteOptions,
    ) -> Result<(), EngineError> {
        let save_mode = match mode {
            WriteMode::Append => SaveMode::Append,
            WriteMode::Overwrite => SaveMode::Overwrite,
        };
        let rows = batch.num_rows();
        let mut builder = self
            .ops(location)
            .await?
            .write(vec![batch])
            .with_save_mode(save_mode);
        if let Some(description) = &options.description {
            builder = builder.with_description(description.clone());
        }
        if let Some(properties) = &options.writer_properties {
            builder = builder.with_writer_properties(properties.clone());
        }
        if let Some(size) = options.target_file_size {
            builder = builder.with_target_file_size(size);
        }
        if !options.configuration.is_empty() {
            builder = builder.with_configuration(options.configuration.clone());
        }
        let table = builder.await?;
        log_debug!(
            component = "delta",
            event = "delta_write_committed",
            location = %location,
            mode = ?mode,
            rows,
            version = table.version(),
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
        let table = self.open(location).await?;
        let columns = batch
            .schema()
            .fields()
            .iter()
            .map(|field| field.name().clone())
            .collect::<Vec<_>>();
        let source = SessionContext::new().read_batch(batch)?;
        let alias = predicate.source_alias.as_str();

        let mut builder = DeltaOps(table)
            .merge(source, predicate.to_sql())
            .with_source_alias(alias)
            .with_target_alias(predicate.target_alias.as_str());
        for clause in clauses {
            builder = match clause {
                MergeClause::MatchedUpdateAll => builder.when_matched_update(|update| {
                    columns.iter().fold(update, |update, column| {
                        update.update(column.as_str(), format!("{alias}.{column}"))
                    })
                })?,
                MergeClause::MatchedDelete => builder.when_matched_delete(|delete| delete)?,
                MergeClause::NotMatchedInsertAll => builder.when_not_matched_insert(|insert| {
                    columns.iter().fold(insert, |insert, column| {
                        insert.set(column.as_str(), format!("{alias}.{column}"))
                    })
                })?,
                MergeClause::NotMatchedBySourceDelete => {
                    builder.when_not_matched_by_source_delete(|delete| delete)?
                }
            };
        }

        let (table, metrics) = builder.await?;
        log_debug!(
            component = "delta",
            event = "delta_merge_committed",
            location = %location,
            version = table.version(),
            inserted = metrics.num_target_rows_inserted,
            updated = metrics.num_target_rows_updated,
            deleted = metrics.num_target_rows_deleted,
        );
        Ok(MergeSummary {
            source_rows: metrics.num_source_rows,
            rows_inserted: metrics.num_target_rows_inserted,
            rows_updated: metrics.num_target_rows_updated,
            rows_deleted: metrics.num_target_rows_deleted,
            rows_copied: metrics.num_target_rows_copied,
        })
    }

    async fn read(&self, location: &str) -> Result<Vec<RecordBatch>, EngineError> {
        let frame = self.scan(location).await?;
        Ok(frame.collect().await?)
    }

    async fn scan(&self, location: &str) -> Result<DataFrame, EngineError> {
        let table = self.open(location).await?;
        Ok(SessionContext::new().read_table(Arc::new(table))?)
    }

    async fn describe(&self, location: &str) -> Result<TableDescription, EngineError> {
        let table = self.open(location).await?;
        let metadata = table_metadata(table.metadata()?);
        let schema = TableProvider::schema(&table);
        Ok(TableDescription { schema, metadata })
    }

    async fn snapshot_info(&self, location: &str) -> Result<SnapshotInfo, EngineError> {
        let table = self.open(location).await?;
        Ok(SnapshotInfo {
            version: table.version(),
            metadata: table_metadata(table.metadata()?),
            file_count: table.get_files_count(),
        })
    }

    async fn optimize(
        &self,
        location: &str,
        options: &OptimizeOptions,
    ) -> Result<OptimizeSummary, EngineError> {
        let table = self.open(location).await?;
        let mut builder = DeltaOps(table).optimize();
        if let Some(size) = options.target_size {
            builder = builder.with_target_size(i64::try_from(size).unwrap_or(i64::MAX));
        }
        if let Some(tasks) = options.max_concurrent_tasks {
            builder = builder.with_max_concurrent_tasks(tasks);
        }
        if let Some(properties) = &options.writer_properties {
            builder = builder.with_writer_properties(properties.clone());
        }
        let (_, metrics) = builder.await?;
        Ok(OptimizeSummary {
            files_added: metrics.num_files_added,
            files_removed: metrics.num_files_removed,
            bytes_added: metrics.files_added.total_size,
            bytes_removed: metrics.files_removed.total_size,
            partitions_optimized: metrics.partitions_optimized,
        })
    }

    async fn vacuum(
        &self,
        location: &str,
        options: &VacuumOptions,
    ) -> Result<Vec<String>, EngineError> {
        let table = self.open(location).await?;
        let mut builder = DeltaOps(table)
            .vacuum()
            .with_enforce_retention_duration(options.enforce_retention_duration)
            .with_dry_run(false);
        if let Some(hours) = options.retention_hours {
            let period = chrono::Duration::try_hours(i64::try_from(hours).unwrap_or(i64::MAX))
                .unwrap_or(chrono::Duration::MAX);
            builder = builder.with_retention_period(period);
        }
        let (_, metrics) = builder.await?;
        Ok(metrics.files_deleted)
    }
}
