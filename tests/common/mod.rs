//! Common test utilities for integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use arrow::{
    array::{Int32Array, RecordBatch, StringArray},
    compute::cast,
    datatypes::{DataType, SchemaRef},
};
use async_trait::async_trait;
use deltalake::datafusion::dataframe::DataFrame;
use tablelake::{
    engine::{
        MergeClause, MergePredicate, SnapshotInfo, TableDescription, WriteMode,
    },
    EngineError, LakeManager, LakeOptions, MemoryEngine, MergeSummary, OptimizeOptions,
    OptimizeSummary, TableEngine, TableSchema, VacuumOptions, WriteOptions,
};

/// One engine call observed by [`SpyEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Write {
        mode: WriteMode,
        rows: usize,
        description: Option<String>,
    },
    Merge {
        predicate: String,
        clauses: Vec<MergeClause>,
        rows: usize,
    },
    Read,
    Scan,
    Describe,
    SnapshotInfo,
    Optimize,
    Vacuum,
}

impl Call {
    pub fn is_write(&self) -> bool {
        matches!(self, Call::Write { .. } | Call::Merge { .. })
    }
}

/// [`MemoryEngine`] wrapper recording every call it receives.
#[derive(Clone, Default)]
pub struct SpyEngine {
    inner: MemoryEngine,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl SpyEngine {
    pub fn new(inner: MemoryEngine) -> Self {
        Self {
            inner,
            calls: Arc::default(),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("calls").clone()
    }

    pub fn write_calls(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_write).collect()
    }

    pub fn clear(&self) {
        self.calls.lock().expect("calls").clear();
    }

    fn record(&self, call: Call) {
        self.calls.lock().expect("calls").push(call);
    }
}

#[async_trait]
impl TableEngine for SpyEngine {
    async fn write(
        &self,
        location: &str,
        batch: RecordBatch,
        mode: WriteMode,
        options: &WriteOptions,
    ) -> Result<(), EngineError> {
        self.record(Call::Write {
            mode,
            rows: batch.num_rows(),
            description: options.description.clone(),
        });
        self.inner.write(location, batch, mode, options).await
    }

    async fn merge(
        &self,
        location: &str,
        batch: RecordBatch,
        predicate: &MergePredicate,
        clauses: &[MergeClause],
    ) -> Result<MergeSummary, EngineError> {
        self.record(Call::Merge {
            predicate: predicate.to_sql(),
            clauses: clauses.to_vec(),
            rows: batch.num_rows(),
        });
        self.inner.merge(location, batch, predicate, clauses).await
    }

    async fn read(&self, location: &str) -> Result<Vec<RecordBatch>, EngineError> {
        self.record(Call::Read);
        self.inner.read(location).await
    }

    async fn scan(&self, location: &str) -> Result<DataFrame, EngineError> {
        self.record(Call::Scan);
        self.inner.scan(location).await
    }

    async fn describe(&self, location: &str) -> Result<TableDescription, EngineError> {
        self.record(Call::Describe);
        self.inner.describe(location).await
    }

    async fn snapshot_info(&self, location: &str) -> Result<SnapshotInfo, EngineError> {
        self.record(Call::SnapshotInfo);
        self.inner.snapshot_info(location).await
    }

    async fn optimize(
        &self,
        location: &str,
        options: &OptimizeOptions,
    ) -> Result<OptimizeSummary, EngineError> {
        self.record(Call::Optimize);
        self.inner.optimize(location, options).await
    }

    async fn vacuum(
        &self,
        location: &str,
        options: &VacuumOptions,
    ) -> Result<Vec<String>, EngineError> {
        self.record(Call::Vacuum);
        self.inner.vacuum(location, options).await
    }
}

/// In-memory lake whose engine calls are recorded by the returned spy.
pub async fn spy_lake(engine: MemoryEngine) -> (LakeManager, SpyEngine) {
    let storage = engine.storage();
    let spy = SpyEngine::new(engine);
    let lake = LakeManager::with_backend(
        LakeOptions::from("memory"),
        Arc::new(spy.clone()),
        Arc::new(storage),
    )
    .await
    .expect("in-memory lake");
    (lake, spy)
}

/// `{id: Int32, v: Utf8}`.
pub fn id_value_schema() -> SchemaRef {
    TableSchema::new()
        .column("id", DataType::Int32)
        .column("v", DataType::Utf8)
        .build()
        .expect("schema")
}

pub fn id_value_batch(rows: &[(i32, &str)]) -> RecordBatch {
    RecordBatch::try_new(
        id_value_schema(),
        vec![
            Arc::new(Int32Array::from(
                rows.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from(
                rows.iter().map(|(_, v)| *v).collect::<Vec<_>>(),
            )),
        ],
    )
    .expect("record batch")
}

/// `(id, v)` pairs of a batch, sorted by id. Types are cast so engine-specific
/// string and integer layouts compare the same.
pub fn id_value_rows(batch: &RecordBatch) -> Vec<(i64, String)> {
    let ids = cast(
        batch.column_by_name("id").expect("id column"),
        &DataType::Int64,
    )
    .expect("cast id");
    let values = cast(batch.column_by_name("v").expect("v column"), &DataType::Utf8)
        .expect("cast v");
    let ids = ids
        .as_any()
        .downcast_ref::<arrow::array::Int64Array>()
        .expect("ids");
    let values = values
        .as_any()
        .downcast_ref::<StringArray>()
        .expect("values");
    let mut rows = (0..batch.num_rows())
        .map(|idx| (ids.value(idx), values.value(idx).to_string()))
        .collect::<Vec<_>>();
    rows.sort();
    rows
}

pub fn expected(rows: &[(i64, &str)]) -> Vec<(i64, String)> {
    rows.iter().map(|(id, v)| (*id, v.to_string())).collect()
}
