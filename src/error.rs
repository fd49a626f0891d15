use crate::{engine::EngineError, write::MergeCondition};

/// Errors returned by [`LakeManager`](crate::LakeManager) operations.
#[derive(Debug, thiserror::Error)]
pub enum LakeError {
    /// The lake root was empty or whitespace.
    #[error("base path cannot be empty")]
    InvalidBasePath,
    /// The table name was blank, `.`, `..`, absolute or held a path separator.
    #[error("table name must be a single non-empty path segment")]
    InvalidTableName,
    /// The declared schema cannot back a table.
    #[error("invalid table schema: {reason}")]
    InvalidSchema {
        /// What is wrong with the schema.
        reason: String,
    },
    /// The declared primary key is empty or names unknown columns.
    #[error("invalid primary key: {reason}")]
    InvalidPrimaryKey {
        /// What is wrong with the key.
        reason: String,
    },
    /// A table with this name is already declared.
    #[error("table {name} already exists")]
    DuplicateTable {
        /// Table name.
        name: String,
    },
    /// No table with this name is declared.
    #[error("table {name} does not exist")]
    UnknownTable {
        /// Table name.
        name: String,
    },
    /// The batch columns or types disagree with the declared schema.
    #[error("batch does not match the schema of table {table}")]
    SchemaMismatch {
        /// Table name.
        table: String,
    },
    /// The merge condition string is not one of the known conditions.
    #[error(
        "invalid merge condition {value:?}, expected one of update, insert, delete, upsert, \
         upsert_delete"
    )]
    InvalidMergeCondition {
        /// Rejected input.
        value: String,
    },
    /// The merge condition needs committed data and the table has none.
    #[error(
        "no committed data found for table {table}; check that the table holds data or that the \
         merge condition ({condition}) is correct"
    )]
    MergeUnavailable {
        /// Table name.
        table: String,
        /// Requested merge condition.
        condition: MergeCondition,
        /// Engine report that the table is missing.
        #[source]
        source: EngineError,
    },
    /// The engine failed while merging.
    #[error("merge into table {table} failed: {source}")]
    MergeFailed {
        /// Table name.
        table: String,
        /// Underlying engine failure.
        #[source]
        source: EngineError,
    },
    /// The engine failed outside of a merge.
    #[error("engine error on table {table}: {source}")]
    Engine {
        /// Table name.
        table: String,
        /// Underlying engine failure.
        #[source]
        source: EngineError,
    },
    /// The storage backend failed to list or delete table files.
    #[error("storage error at {location}: {source}")]
    Storage {
        /// Root or table location involved.
        location: String,
        /// Underlying IO failure.
        #[source]
        source: std::io::Error,
    },
}

impl LakeError {
    pub(crate) fn engine(table: &str, source: EngineError) -> Self {
        LakeError::Engine {
            table: table.to_string(),
            source,
        }
    }
}

impl From<std::convert::Infallible> for LakeError {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}
