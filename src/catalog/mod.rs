//! In-memory catalog of declared tables and the storage backends it is
//! rebuilt from.

mod storage;

use std::collections::BTreeMap;

use arrow::datatypes::SchemaRef;

pub use storage::{LocalStorage, StorageBackend};

use crate::{
    engine::TableEngine,
    error::LakeError,
    observability::{log_debug, log_info, log_warn},
    schema::PrimaryKey,
};

/// A declared table: name, schema and primary key. Immutable once created.
#[derive(Debug, Clone)]
pub struct TableDefinition {
    name: String,
    schema: SchemaRef,
    primary_key: PrimaryKey,
}

impl TableDefinition {
    pub(crate) fn new(name: impl Into<String>, schema: SchemaRef, primary_key: PrimaryKey) -> Self {
        Self {
            name: name.into(),
            schema,
            primary_key,
        }
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared schema.
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Declared primary key.
    pub fn primary_key(&self) -> &PrimaryKey {
        &self.primary_key
    }
}

/// Table definitions keyed by name.
///
/// Not synchronized: one process owns the catalog of a storage root.
#[derive(Debug, Default)]
pub struct Catalog {
    tables: BTreeMap<String, TableDefinition>,
}

impl Catalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a table. Storage is only created by the first write.
    pub fn create(
        &mut self,
        name: &str,
        schema: SchemaRef,
        primary_key: PrimaryKey,
    ) -> Result<&TableDefinition, LakeError> {
        if self.tables.contains_key(name) {
            return Err(LakeError::DuplicateTable {
                name: name.to_string(),
            });
        }
        let definition = TableDefinition::new(name, schema, primary_key);
        Ok(self.tables.entry(name.to_string()).or_insert(definition))
    }

    /// Definition of `name`.
    pub fn lookup(&self, name: &str) -> Result<&TableDefinition, LakeError> {
        self.tables.get(name).ok_or_else(|| LakeError::UnknownTable {
            name: name.to_string(),
        })
    }

    /// Drop the definition of `name`.
    pub fn remove(&mut self, name: &str) -> Result<TableDefinition, LakeError> {
        self.tables.remove(name).ok_or_else(|| LakeError::UnknownTable {
            name: name.to_string(),
        })
    }

    /// Whether `name` is declared.
    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Declared names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Number of declared tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Whether no table is declared.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Re-declare every committed table found under the storage root.
    ///
    /// The primary key is recovered from the engine-side description; a table
    /// without one comes back with an empty key. Candidates the engine cannot
    /// open are skipped. Names already declared are left untouched.
    pub async fn rebuild(
        &mut self,
        storage: &dyn StorageBackend,
        engine: &dyn TableEngine,
    ) -> Result<usize, LakeError> {
        let candidates = storage.discover().await.map_err(|source| LakeError::Storage {
            location: storage.root(),
            source,
        })?;

        let mut restored = 0;
        for name in candidates {
            if self.tables.contains_key(&name) {
                continue;
            }
            let description = match engine.describe(&storage.table_uri(&name)).await {
                Ok(description) => description,
                Err(err) => {
                    log_debug!(
                        component = "catalog",
                        event = "table_skipped_on_rebuild",
                        table = %name,
                        error = %err,
                    );
                    continue;
                }
            };
            let primary_key = description
                .metadata
                .description
                .as_deref()
                .map(PrimaryKey::parse)
                .unwrap_or_default();
            if primary_key.is_empty() {
                log_warn!(
                    component = "catalog",
                    event = "primary_key_missing_on_rebuild",
                    table = %name,
                );
            }
            self.tables.insert(
                name.clone(),
                TableDefinition::new(name, description.schema, primary_key),
            );
            restored += 1;
        }

        log_info!(
            component = "catalog",
            event = "catalog_rebuilt",
            root = %storage.root(),
            restored,
            total = self.tables.len(),
        );
        Ok(restored)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::{
        array::{Int32Array, RecordBatch},
        datatypes::{DataType, Field, Schema, SchemaRef},
    };

    use super::Catalog;
    use crate::{
        engine::{MemoryEngine, TableEngine, WriteMode, WriteOptions},
        error::LakeError,
        schema::PrimaryKey,
    };

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("a", DataType::Int32, true),
            Field::new("b", DataType::Int32, true),
        ]))
    }

    #[test]
    fn create_then_lookup_returns_declared_definition() {
        let mut catalog = Catalog::new();
        catalog
            .create("t", schema(), PrimaryKey::from(["a", "b"]))
            .expect("create");

        let definition = catalog.lookup("t").expect("lookup");
        assert_eq!(definition.schema(), &schema());
        assert_eq!(definition.primary_key().composite(), "a,b");
    }

    #[test]
    fn duplicate_create_keeps_the_first_definition() {
        let mut catalog = Catalog::new();
        catalog
            .create("t", schema(), PrimaryKey::from("a"))
            .expect("create");
        let err = catalog
            .create("t", schema(), PrimaryKey::from("b"))
            .unwrap_err();
        assert!(matches!(err, LakeError::DuplicateTable { .. }));
        assert_eq!(
            catalog.lookup("t").expect("lookup").primary_key().composite(),
            "a"
        );
    }

    #[test]
    fn remove_forgets_the_table() {
        let mut catalog = Catalog::new();
        catalog
            .create("t", schema(), PrimaryKey::from("a"))
            .expect("create");
        catalog.remove("t").expect("remove");
        assert!(matches!(
            catalog.lookup("t"),
            Err(LakeError::UnknownTable { .. })
        ));
        assert!(matches!(
            catalog.remove("t"),
            Err(LakeError::UnknownTable { .. })
        ));
    }

    #[tokio::test]
    async fn rebuild_recovers_key_from_description() {
        let engine = MemoryEngine::new();
        let storage = engine.storage();
        let batch = RecordBatch::try_new(
            schema(),
            vec![
                Arc::new(Int32Array::from(vec![1])),
                Arc::new(Int32Array::from(vec![2])),
            ],
        )
        .expect("batch");
        engine
            .write(
                "memory://keyed",
                batch.clone(),
                WriteMode::Append,
                &WriteOptions::default().description("a,b"),
            )
            .await
            .expect("write keyed");
        engine
            .write(
                "memory://bare",
                batch,
                WriteMode::Append,
                &WriteOptions::default(),
            )
            .await
            .expect("write bare");

        let mut catalog = Catalog::new();
        let restored = catalog.rebuild(&storage, &engine).await.expect("rebuild");
        assert_eq!(restored, 2);
        assert_eq!(
            catalog.lookup("keyed").expect("keyed").primary_key().columns(),
            &["a".to_string(), "b".to_string()]
        );
        assert!(catalog
            .lookup("bare")
            .expect("bare")
            .primary_key()
            .is_empty());
    }
}
