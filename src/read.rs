//! Eager and lazy reads of declared tables.

use std::sync::Arc;

use arrow::{array::RecordBatch, compute::concat_batches, datatypes::SchemaRef};
use deltalake::datafusion::{dataframe::DataFrame, datasource::MemTable, prelude::SessionContext};

use crate::{
    catalog::{StorageBackend, TableDefinition},
    engine::{EngineError, TableEngine},
    error::LakeError,
};

/// Reads fall back to an empty result of the declared schema while a table
/// has no committed data.
#[derive(Clone)]
pub(crate) struct ReadDispatcher {
    engine: Arc<dyn TableEngine>,
    storage: Arc<dyn StorageBackend>,
}

impl ReadDispatcher {
    pub(crate) fn new(engine: Arc<dyn TableEngine>, storage: Arc<dyn StorageBackend>) -> Self {
        Self { engine, storage }
    }

    pub(crate) async fn read(&self, definition: &TableDefinition) -> Result<RecordBatch, LakeError> {
        let name = definition.name();
        let batches = match self.engine.read(&self.storage.table_uri(name)).await {
            Ok(batches) => batches,
            Err(source) if source.is_table_not_found() => Vec::new(),
            Err(source) => return Err(LakeError::engine(name, source)),
        };
        let schema = batches
            .first()
            .map(RecordBatch::schema)
            .unwrap_or_else(|| Arc::clone(definition.schema()));
        concat_batches(&schema, &batches).map_err(|err| LakeError::engine(name, err.into()))
    }

    pub(crate) async fn scan(&self, definition: &TableDefinition) -> Result<DataFrame, LakeError> {
        let name = definition.name();
        match self.engine.scan(&self.storage.table_uri(name)).await {
            Ok(frame) => Ok(frame),
            Err(source) if source.is_table_not_found() => {
                empty_frame(Arc::clone(definition.schema()))
                    .map_err(|source| LakeError::engine(name, source))
            }
            Err(source) => Err(LakeError::engine(name, source)),
        }
    }
}

fn empty_frame(schema: SchemaRef) -> Result<DataFrame, EngineError> {
    let provider = MemTable::try_new(schema, vec![Vec::new()])?;
    Ok(SessionContext::new().read_table(Arc::new(provider))?)
}
