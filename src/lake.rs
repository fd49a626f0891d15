//! The [`LakeManager`] facade: input validation and existence checks in front
//! of the catalog and the dispatchers.

use std::{path::Path, sync::Arc};

use arrow::{array::RecordBatch, datatypes::SchemaRef};
use deltalake::datafusion::dataframe::DataFrame;

use crate::{
    catalog::{Catalog, LocalStorage, StorageBackend, TableDefinition},
    engine::{
        DeltaEngine, MemoryEngine, MergeSummary, OptimizeOptions, OptimizeSummary,
        TableEngine, VacuumOptions, WriteOptions,
    },
    error::LakeError,
    maintenance::{MaintenanceDispatcher, TableInfo},
    observability::log_info,
    option::LakeOptions,
    read::ReadDispatcher,
    schema::PrimaryKey,
    write::{MergeCondition, WriteDispatcher},
};

/// A table name doubles as one path segment under the lake root.
fn validate_table_name(name: &str) -> Result<&str, LakeError> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || name.contains(['/', '\\'])
        || Path::new(name).is_absolute()
    {
        return Err(LakeError::InvalidTableName);
    }
    Ok(name)
}

/// Manages a lake of named tables with declared schemas and primary keys.
///
/// Every operation validates its input and checks that the table is (or, for
/// [`create_table`](Self::create_table), is not) declared before anything else
/// runs, so a rejected call leaves catalog and storage untouched. Storage for
/// a table is created by its first successful write.
///
/// # Example
/// ```no_run
/// use arrow::datatypes::DataType;
/// use tablelake::{LakeManager, MergeCondition, TableSchema};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut lake = LakeManager::open("data").await?;
///     let schema = TableSchema::new()
///         .column("id", DataType::Int32)
///         .column("v", DataType::Utf8)
///         .build()?;
///     lake.create_table("events", schema, "id")?;
///
///     let batch = lake.read_table("events").await?;
///     lake.merge_table("events", batch, MergeCondition::Upsert, None)
///         .await?;
///     Ok(())
/// }
/// ```
pub struct LakeManager {
    options: LakeOptions,
    catalog: Catalog,
    reads: ReadDispatcher,
    writes: WriteDispatcher,
    maintenance: MaintenanceDispatcher,
}

impl LakeManager {
    /// Open a lake of Delta tables under a local directory, creating it if
    /// needed, and rebuild the catalog from the tables found there.
    pub async fn open(options: impl Into<LakeOptions>) -> Result<Self, LakeError> {
        let options = options.into();
        options.validate()?;
        let engine = DeltaEngine::with_storage_options(options.storage_options.clone());
        let storage = LocalStorage::new(options.base_path.clone());
        Self::with_backend(options, Arc::new(engine), Arc::new(storage)).await
    }

    /// Non-durable lake over the in-process test engine.
    pub async fn in_memory() -> Result<Self, LakeError> {
        let engine = MemoryEngine::new();
        let storage = engine.storage();
        Self::with_backend(
            LakeOptions::from("memory"),
            Arc::new(engine),
            Arc::new(storage),
        )
        .await
    }

    /// Lake over an arbitrary engine and storage backend pairing.
    pub async fn with_backend(
        options: LakeOptions,
        engine: Arc<dyn TableEngine>,
        storage: Arc<dyn StorageBackend>,
    ) -> Result<Self, LakeError> {
        options.validate()?;
        storage
            .prepare()
            .await
            .map_err(|source| LakeError::Storage {
                location: storage.root(),
                source,
            })?;
        let mut catalog = Catalog::new();
        catalog.rebuild(storage.as_ref(), engine.as_ref()).await?;

        let reads = ReadDispatcher::new(Arc::clone(&engine), Arc::clone(&storage));
        let writes = WriteDispatcher::new(
            Arc::clone(&engine),
            Arc::clone(&storage),
            options.write_options.clone(),
        );
        let maintenance = MaintenanceDispatcher::new(engine, storage);
        Ok(Self {
            options,
            catalog,
            reads,
            writes,
            maintenance,
        })
    }

    /// Configuration the lake was opened with.
    pub fn options(&self) -> &LakeOptions {
        &self.options
    }

    /// Declared tables.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn existing(&self, name: &str) -> Result<&TableDefinition, LakeError> {
        self.catalog.lookup(validate_table_name(name)?)
    }

    /// Declare a table. `primary_key` accepts a column name, a comma-joined
    /// list or an array of names.
    pub fn create_table(
        &mut self,
        name: &str,
        schema: SchemaRef,
        primary_key: impl Into<PrimaryKey>,
    ) -> Result<(), LakeError> {
        let name = validate_table_name(name)?;
        let primary_key = primary_key.into();
        if self.catalog.contains(name) {
            return Err(LakeError::DuplicateTable {
                name: name.to_string(),
            });
        }
        primary_key.check_against(&schema)?;

        let definition = self.catalog.create(name, schema, primary_key)?;
        log_info!(
            component = "catalog",
            event = "table_created",
            table = %definition.name(),
            primary_key = %definition.primary_key(),
            columns = definition.schema().fields().len(),
        );
        Ok(())
    }

    /// Append `batch` to a declared table.
    pub async fn append_table(
        &self,
        name: &str,
        batch: RecordBatch,
        options: Option<WriteOptions>,
    ) -> Result<(), LakeError> {
        let definition = self.existing(name)?;
        self.writes.append(definition, batch, options).await
    }

    /// Merge `batch` into a declared table, matching rows on the primary key.
    ///
    /// `condition` is a [`MergeCondition`] or one of the names `update`,
    /// `insert`, `delete`, `upsert`, `upsert_delete`. On a table that never
    /// received data, `insert` and `upsert` append the whole batch while the
    /// other conditions fail with [`LakeError::MergeUnavailable`].
    pub async fn merge_table<C>(
        &self,
        name: &str,
        batch: RecordBatch,
        condition: C,
        options: Option<WriteOptions>,
    ) -> Result<MergeSummary, LakeError>
    where
        C: TryInto<MergeCondition>,
        C::Error: Into<LakeError>,
    {
        let name = validate_table_name(name)?;
        let condition = condition.try_into().map_err(Into::<LakeError>::into)?;
        let definition = self.catalog.lookup(name)?;
        self.writes
            .merge(definition, batch, condition, options)
            .await
    }

    /// Replace the contents of a declared table with `batch`.
    pub async fn overwrite_table(
        &self,
        name: &str,
        batch: RecordBatch,
        options: Option<WriteOptions>,
    ) -> Result<(), LakeError> {
        let definition = self.existing(name)?;
        self.writes.overwrite(definition, batch, options).await
    }

    /// Every committed row, materialised into one batch. A table without
    /// committed data yields an empty batch of the declared schema.
    pub async fn read_table(&self, name: &str) -> Result<RecordBatch, LakeError> {
        let definition = self.existing(name)?;
        self.reads.read(definition).await
    }

    /// Deferred-execution frame over a declared table. A table without
    /// committed data yields an empty frame of the declared schema.
    pub async fn scan_table(&self, name: &str) -> Result<DataFrame, LakeError> {
        let definition = self.existing(name)?;
        self.reads.scan(definition).await
    }

    /// Compact small files of a declared table. A missing target size falls
    /// back to [`LakeOptions::default_target_size`].
    pub async fn optimize_table(
        &self,
        name: &str,
        options: Option<OptimizeOptions>,
    ) -> Result<OptimizeSummary, LakeError> {
        let definition = self.existing(name)?;
        let options = self.options.optimize_options(options);
        self.maintenance.optimize(definition, &options).await
    }

    /// Delete files of a declared table that no retained version references.
    ///
    /// Irreversible. With retention not enforced, windows shorter than the
    /// engine's safety default are accepted and may remove files that readers
    /// of older versions still need.
    pub async fn vacuum_table(
        &self,
        name: &str,
        options: Option<VacuumOptions>,
    ) -> Result<Vec<String>, LakeError> {
        let definition = self.existing(name)?;
        let options = self.options.vacuum_options(options);
        self.maintenance.vacuum(definition, &options).await
    }

    /// Catalog and engine view of a declared table.
    pub async fn table_info(&self, name: &str) -> Result<TableInfo, LakeError> {
        let definition = self.existing(name)?;
        self.maintenance.info(definition).await
    }

    /// [`table_info`](Self::table_info) for every declared table, sorted by name.
    pub async fn list_tables(&self) -> Result<Vec<TableInfo>, LakeError> {
        let mut infos = Vec::with_capacity(self.catalog.len());
        for name in self.catalog.names() {
            let definition = self.catalog.lookup(name)?;
            infos.push(self.maintenance.info(definition).await?);
        }
        Ok(infos)
    }

    /// Declared schema of a table.
    pub fn table_schema(&self, name: &str) -> Result<SchemaRef, LakeError> {
        Ok(Arc::clone(self.existing(name)?.schema()))
    }

    /// Remove a declared table and all of its files. Irreversible.
    pub async fn delete_table(&mut self, name: &str) -> Result<(), LakeError> {
        let definition = self.existing(name)?;
        self.maintenance.delete_storage(definition).await?;
        let definition = self.catalog.remove(name)?;
        log_info!(
            component = "catalog",
            event = "table_deleted",
            table = %definition.name(),
        );
        Ok(())
    }
}
