//! Schema-checked append / merge / overwrite dispatch to the table engine.

use std::{fmt, str::FromStr, sync::Arc};

use arrow::array::RecordBatch;

use crate::{
    catalog::{StorageBackend, TableDefinition},
    engine::{MergeClause, MergePredicate, MergeSummary, TableEngine, WriteMode, WriteOptions},
    error::LakeError,
    observability::{log_debug, log_info},
    schema,
};

/// Which combination of matched / not-matched actions a merge performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeCondition {
    /// Overwrite matched target rows with source values.
    Update,
    /// Insert source rows that match no target row.
    Insert,
    /// Delete matched target rows.
    Delete,
    /// Update matched rows and insert unmatched source rows.
    Upsert,
    /// Upsert, then delete target rows absent from the source.
    UpsertDelete,
}

impl MergeCondition {
    /// Every condition, in declaration order.
    pub const ALL: [MergeCondition; 5] = [
        MergeCondition::Update,
        MergeCondition::Insert,
        MergeCondition::Delete,
        MergeCondition::Upsert,
        MergeCondition::UpsertDelete,
    ];

    /// Name accepted by [`FromStr`].
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeCondition::Update => "update",
            MergeCondition::Insert => "insert",
            MergeCondition::Delete => "delete",
            MergeCondition::Upsert => "upsert",
            MergeCondition::UpsertDelete => "upsert_delete",
        }
    }

    /// Engine merge actions implementing the condition.
    pub fn clauses(&self) -> &'static [MergeClause] {
        match self {
            MergeCondition::Update => &[MergeClause::MatchedUpdateAll],
            MergeCondition::Insert => &[MergeClause::NotMatchedInsertAll],
            MergeCondition::Delete => &[MergeClause::MatchedDelete],
            MergeCondition::Upsert => &[
                MergeClause::MatchedUpdateAll,
                MergeClause::NotMatchedInsertAll,
            ],
            MergeCondition::UpsertDelete => &[
                MergeClause::MatchedUpdateAll,
                MergeClause::NotMatchedInsertAll,
                MergeClause::NotMatchedBySourceDelete,
            ],
        }
    }

    /// Whether a merge into a table without committed data degrades to an append.
    ///
    /// With nothing to match against every source row is "not matched", so
    /// only conditions that insert unmatched rows have a meaning there.
    pub fn appends_without_target(&self) -> bool {
        matches!(self, MergeCondition::Insert | MergeCondition::Upsert)
    }
}

impl fmt::Display for MergeCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeCondition {
    type Err = LakeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        MergeCondition::ALL
            .into_iter()
            .find(|condition| condition.as_str() == value)
            .ok_or_else(|| LakeError::InvalidMergeCondition {
                value: value.to_string(),
            })
    }
}

impl TryFrom<&str> for MergeCondition {
    type Error = LakeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Routes writes for declared tables to the engine.
///
/// Every write is checked against the declared schema first and carries the
/// composite primary key as the table description, so rebuilds can recover it.
#[derive(Clone)]
pub(crate) struct WriteDispatcher {
    engine: Arc<dyn TableEngine>,
    storage: Arc<dyn StorageBackend>,
    defaults: WriteOptions,
}

impl WriteDispatcher {
    pub(crate) fn new(
        engine: Arc<dyn TableEngine>,
        storage: Arc<dyn StorageBackend>,
        defaults: WriteOptions,
    ) -> Self {
        Self {
            engine,
            storage,
            defaults,
        }
    }

    fn check(definition: &TableDefinition, batch: &RecordBatch) -> Result<(), LakeError> {
        if schema::conforms(definition.schema(), batch) {
            Ok(())
        } else {
            Err(LakeError::SchemaMismatch {
                table: definition.name().to_string(),
            })
        }
    }

    fn keyed_options(
        &self,
        definition: &TableDefinition,
        options: Option<WriteOptions>,
    ) -> WriteOptions {
        let mut options = options.unwrap_or_else(|| self.defaults.clone());
        options.description = Some(definition.primary_key().composite());
        options
    }

    async fn write(
        &self,
        definition: &TableDefinition,
        batch: RecordBatch,
        mode: WriteMode,
        options: &WriteOptions,
    ) -> Result<(), LakeError> {
        let rows = batch.num_rows();
        self.engine
            .write(
                &self.storage.table_uri(definition.name()),
                batch,
                mode,
                options,
            )
            .await
            .map_err(|source| LakeError::engine(definition.name(), source))?;
        log_debug!(
            component = "write",
            event = "write_dispatched",
            table = %definition.name(),
            mode = ?mode,
            rows,
        );
        Ok(())
    }

    pub(crate) async fn append(
        &self,
        definition: &TableDefinition,
        batch: RecordBatch,
        options: Option<WriteOptions>,
    ) -> Result<(), LakeError> {
        Self::check(definition, &batch)?;
        let options = self.keyed_options(definition, options);
        self.write(definition, batch, WriteMode::Append, &options)
            .await
    }

    pub(crate) async fn overwrite(
        &self,
        definition: &TableDefinition,
        batch: RecordBatch,
        options: Option<WriteOptions>,
    ) -> Result<(), LakeError> {
        Self::check(definition, &batch)?;
        let options = self.keyed_options(definition, options);
        self.write(definition, batch, WriteMode::Overwrite, &options)
            .await
    }

    pub(crate) async fn merge(
        &self,
        definition: &TableDefinition,
        batch: RecordBatch,
        condition: MergeCondition,
        options: Option<WriteOptions>,
    ) -> Result<MergeSummary, LakeError> {
        Self::check(definition, &batch)?;
        let options = self.keyed_options(definition, options);
        let predicate = MergePredicate::over(definition.primary_key().columns().iter().cloned());
        let location = self.storage.table_uri(definition.name());

        // Keep the batch around only when a missing table could turn the merge into an append.
        let fallback = condition.appends_without_target().then(|| batch.clone());
        match self
            .engine
            .merge(&location, batch, &predicate, condition.clauses())
            .await
        {
            Ok(summary) => {
                log_debug!(
                    component = "write",
                    event = "merge_dispatched",
                    table = %definition.name(),
                    condition = %condition,
                    predicate = %predicate.to_sql(),
                    inserted = summary.rows_inserted,
                    updated = summary.rows_updated,
                    deleted = summary.rows_deleted,
                );
                Ok(summary)
            }
            Err(source) if source.is_table_not_found() => match fallback {
                Some(batch) => {
                    let rows = batch.num_rows();
                    log_info!(
                        component = "write",
                        event = "merge_fallback_append",
                        table = %definition.name(),
                        condition = %condition,
                        rows,
                    );
                    self.write(definition, batch, WriteMode::Append, &options)
                        .await?;
                    Ok(MergeSummary {
                        source_rows: rows,
                        rows_inserted: rows,
                        ..MergeSummary::default()
                    })
                }
                None => Err(LakeError::MergeUnavailable {
                    table: definition.name().to_string(),
                    condition,
                    source,
                }),
            },
            Err(source) => Err(LakeError::MergeFailed {
                table: definition.name().to_string(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::MergeCondition;
    use crate::{engine::MergeClause, error::LakeError};

    #[test]
    fn parses_every_condition_name() {
        for condition in MergeCondition::ALL {
            assert_eq!(
                MergeCondition::from_str(condition.as_str()).expect("parse"),
                condition
            );
        }
        assert_eq!(
            MergeCondition::from_str("upsert_delete").expect("parse"),
            MergeCondition::UpsertDelete
        );
    }

    #[test]
    fn rejects_unknown_condition() {
        let err = MergeCondition::from_str("replace").unwrap_err();
        assert!(matches!(
            err,
            LakeError::InvalidMergeCondition { ref value } if value == "replace"
        ));
        assert!(MergeCondition::from_str("Upsert").is_err());
    }

    #[test]
    fn upsert_delete_reconciles_both_sides() {
        assert_eq!(
            MergeCondition::UpsertDelete.clauses(),
            &[
                MergeClause::MatchedUpdateAll,
                MergeClause::NotMatchedInsertAll,
                MergeClause::NotMatchedBySourceDelete,
            ]
        );
    }

    #[test]
    fn only_inserting_conditions_fall_back_to_append() {
        let appending = MergeCondition::ALL
            .into_iter()
            .filter(MergeCondition::appends_without_target)
            .collect::<Vec<_>>();
        assert_eq!(
            appending,
            vec![MergeCondition::Insert, MergeCondition::Upsert]
        );
    }
}
