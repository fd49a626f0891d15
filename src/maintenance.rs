//! Compaction, retention cleanup, inspection and removal of declared tables.

use std::sync::Arc;

use arrow::datatypes::SchemaRef;

use crate::{
    catalog::{StorageBackend, TableDefinition},
    engine::{OptimizeOptions, OptimizeSummary, TableEngine, TableMetadata, VacuumOptions},
    error::LakeError,
    observability::{log_error, log_info},
    schema::PrimaryKey,
};

/// Snapshot of a declared table as seen by the catalog and the engine.
#[derive(Debug, Clone)]
pub struct TableInfo {
    /// Table name.
    pub name: String,
    /// Whether the engine holds committed data for the table.
    pub exists: bool,
    /// Current engine version, `None` before the first write.
    pub version: Option<i64>,
    /// Engine metadata, `None` before the first write.
    pub metadata: Option<TableMetadata>,
    /// Data files referenced by the current version.
    pub file_count: usize,
    /// Declared schema.
    pub schema: SchemaRef,
    /// Declared primary key.
    pub primary_key: PrimaryKey,
}

#[derive(Clone)]
pub(crate) struct MaintenanceDispatcher {
    engine: Arc<dyn TableEngine>,
    storage: Arc<dyn StorageBackend>,
}

impl MaintenanceDispatcher {
    pub(crate) fn new(engine: Arc<dyn TableEngine>, storage: Arc<dyn StorageBackend>) -> Self {
        Self { engine, storage }
    }

    pub(crate) async fn optimize(
        &self,
        definition: &TableDefinition,
        options: &OptimizeOptions,
    ) -> Result<OptimizeSummary, LakeError> {
        let summary = self
            .engine
            .optimize(&self.storage.table_uri(definition.name()), options)
            .await
            .map_err(|source| LakeError::engine(definition.name(), source))?;
        log_info!(
            component = "maintenance",
            event = "table_optimized",
            table = %definition.name(),
            target_size = ?options.target_size,
            files_added = summary.files_added,
            files_removed = summary.files_removed,
        );
        Ok(summary)
    }

    pub(crate) async fn vacuum(
        &self,
        definition: &TableDefinition,
        options: &VacuumOptions,
    ) -> Result<Vec<String>, LakeError> {
        let deleted = self
            .engine
            .vacuum(&self.storage.table_uri(definition.name()), options)
            .await
            .map_err(|source| LakeError::engine(definition.name(), source))?;
        log_info!(
            component = "maintenance",
            event = "table_vacuumed",
            table = %definition.name(),
            retention_hours = ?options.retention_hours,
            enforce_retention_duration = options.enforce_retention_duration,
            files_deleted = deleted.len(),
        );
        Ok(deleted)
    }

    pub(crate) async fn info(&self, definition: &TableDefinition) -> Result<TableInfo, LakeError> {
        let mut info = TableInfo {
            name: definition.name().to_string(),
            exists: false,
            version: None,
            metadata: None,
            file_count: 0,
            schema: Arc::clone(definition.schema()),
            primary_key: definition.primary_key().clone(),
        };
        match self
            .engine
            .snapshot_info(&self.storage.table_uri(definition.name()))
            .await
        {
            Ok(snapshot) => {
                info.exists = true;
                info.version = Some(snapshot.version);
                info.metadata = Some(snapshot.metadata);
                info.file_count = snapshot.file_count;
            }
            Err(source) if source.is_table_not_found() => {}
            Err(source) => return Err(LakeError::engine(definition.name(), source)),
        }
        Ok(info)
    }

    /// Remove every file of the table. The caller drops the catalog entry afterwards.
    pub(crate) async fn delete_storage(&self, definition: &TableDefinition) -> Result<(), LakeError> {
        let location = self.storage.table_uri(definition.name());
        if let Err(source) = self.storage.delete_table_storage(definition.name()).await {
            log_error!(
                component = "maintenance",
                event = "table_delete_failed",
                table = %definition.name(),
                location = %location,
                error = %source,
            );
            return Err(LakeError::Storage { location, source });
        }
        Ok(())
    }
}
