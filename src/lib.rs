#![deny(missing_docs)]
//! Table catalog and write dispatch over transactional table storage.
//!
//! tablelake declares named tables with an Arrow schema and a primary key,
//! checks every write against the declared schema and hands appends, merges,
//! overwrites, compaction and retention cleanup to a table engine. The
//! transaction log, conflict detection and file management live in
//! [`engine::DeltaEngine`], which drives Delta Lake tables.
//!
//! Merges match rows on the primary key. A merge into a declared table that
//! never received data appends the batch for `insert` and `upsert` and fails
//! with [`LakeError::MergeUnavailable`] for the other conditions.

pub(crate) mod observability;

/// Declared tables and the storage backends they live on.
pub mod catalog;

/// Seam to the table-storage engine and its implementations.
pub mod engine;

/// Error types.
pub mod error;

/// The lake facade.
pub mod lake;

/// Compaction, retention cleanup and table inspection.
pub mod maintenance;

/// Lake configuration.
pub mod option;

mod read;

/// Declared schemas and primary keys.
pub mod schema;

/// Merge conditions and write dispatch.
pub mod write;

pub use crate::{
    catalog::{Catalog, LocalStorage, StorageBackend, TableDefinition},
    engine::{
        DeltaEngine, EngineError, MemoryEngine, MemoryStorage, MergeSummary, OptimizeOptions,
        OptimizeSummary, TableEngine, VacuumOptions, WriteOptions,
    },
    error::LakeError,
    lake::LakeManager,
    maintenance::TableInfo,
    option::LakeOptions,
    schema::{PrimaryKey, TableSchema},
    write::MergeCondition,
};
