//! Cascading save orchestration
//!
//! A cascading save persists a record together with the related records
//! reachable through the selected relations, inside one transaction:
//!
//! 1. relations whose key lives on the record itself (`ParentOwnsKey`) are
//!    saved first and their keys copied onto the record;
//! 2. the record is saved;
//! 3. every other selected relation, in declaration order, is linked and
//!    saved; collections are reconciled against the stored rows and the rows
//!    that disappeared are deleted once every element saved.
//!
//! The first failure stops the walk. Storage state is undone by rolling
//! back the transaction. In memory, generated keys and stored snapshots of
//! every record in the graph are put back to what they were before the
//! save, so the same graph can be corrected and saved again.

use std::fmt;

use async_trait::async_trait;
use tracing::debug;

use super::selector::SaveSelector;
use crate::backends::{Connection, Transaction};
use crate::error::{ModelError, ModelResult, OrmResult};
use crate::model::{Record, RelationValue};
use crate::relationships::{link, reconcile, unlink, Cardinality, LinkDirection, RelationDescriptor};
use crate::transaction::finish;

/// States of the outermost cascading save
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavePhase {
    Pending,
    RootSaving,
    RootSaved,
    RelationsProcessing,
    Committed,
    RolledBack,
}

impl fmt::Display for SavePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SavePhase::Pending => "PENDING",
            SavePhase::RootSaving => "ROOT_SAVING",
            SavePhase::RootSaved => "ROOT_SAVED",
            SavePhase::RelationsProcessing => "RELATIONS_PROCESSING",
            SavePhase::Committed => "COMMITTED",
            SavePhase::RolledBack => "ROLLED_BACK",
        };
        f.write_str(name)
    }
}

fn enter(record: &Record, phase: SavePhase) {
    debug!("Cascading save of '{}': {}", record.model_name(), phase);
}

/// Saving a record together with its related records
#[async_trait]
pub trait CascadeSave {
    /// Save inside a new transaction, committed only if everything saved.
    ///
    /// Without a selector only the record itself is saved. Returns
    /// `Ok(false)` when some record failed validation; errors are returned
    /// after the rollback.
    async fn save_with_related(
        &mut self,
        conn: &dyn Connection,
        run_validation: bool,
        selector: Option<&SaveSelector>,
    ) -> OrmResult<bool>;

    /// Save inside an already open transaction, which stays open
    async fn save_with_related_in(
        &mut self,
        tx: &mut dyn Transaction,
        run_validation: bool,
        selector: Option<&SaveSelector>,
    ) -> OrmResult<bool>;
}

#[async_trait]
impl CascadeSave for Record {
    async fn save_with_related(
        &mut self,
        conn: &dyn Connection,
        run_validation: bool,
        selector: Option<&SaveSelector>,
    ) -> OrmResult<bool> {
        enter(self, SavePhase::Pending);
        // Relation metadata and value shapes are checked before anything is written
        self.check_shapes(selector)?;
        let state = self.stored_state();

        let mut tx = conn.begin().await?;
        let outcome = self
            .save_with_related_in(tx.as_mut(), run_validation, selector)
            .await;
        let result = finish(tx, outcome).await;

        match &result {
            Ok(true) => enter(self, SavePhase::Committed),
            _ => {
                // Keys and stored snapshots written during the walk no longer
                // describe storage
                self.restore_stored_state(state);
                enter(self, SavePhase::RolledBack);
            }
        }
        result
    }

    async fn save_with_related_in(
        &mut self,
        tx: &mut dyn Transaction,
        run_validation: bool,
        selector: Option<&SaveSelector>,
    ) -> OrmResult<bool> {
        let relations = self.registry().resolve_relations(self.model_name())?;
        let (mut attributes, selected) = match selector {
            Some(selector) => {
                let partition = selector.partition(&relations)?;
                (partition.attributes, partition.relations)
            }
            None => (None, Vec::new()),
        };

        let mut owned = Vec::new();
        let mut dependent = Vec::new();
        for (relation, sub) in selected {
            let target = self.registry().schema(&relation.target)?;
            let direction = LinkDirection::resolve(self.schema(), &target, relation)?;
            match (direction, relation.cardinality) {
                (LinkDirection::ParentOwnsKey, Cardinality::One) => owned.push((relation, sub)),
                (LinkDirection::ParentOwnsKey, Cardinality::Many) => {
                    return Err(ModelError::Link(format!(
                        "collection relation '{}' cannot hold the key of '{}'",
                        relation.name,
                        self.model_name()
                    )))
                }
                (LinkDirection::RelatedOwnsKey, _) => dependent.push((relation, sub)),
            }
        }

        let mut orphans = Vec::new();
        for (relation, sub) in owned {
            let Some(value) = self.take_relation(&relation.name) else {
                debug!("Relation '{}' not populated, skipped", relation.name);
                continue;
            };
            let (value, outcome) = self
                .save_owned(tx, relation, value, run_validation, sub.as_ref())
                .await;
            self.populate_relation(&relation.name, value);

            match outcome? {
                OwnedOutcome::Failed => return Ok(false),
                OwnedOutcome::Linked => {}
                OwnedOutcome::Cleared(orphan) => orphans.extend(orphan),
            }
            if let Some(names) = attributes.as_mut() {
                for column in relation.link.local_columns() {
                    if !names.iter().any(|n| n == column) {
                        names.push(column.to_string());
                    }
                }
            }
        }

        enter(self, SavePhase::RootSaving);
        if !self.save(tx, run_validation, attributes.as_deref()).await? {
            return Ok(false);
        }
        enter(self, SavePhase::RootSaved);

        if !dependent.is_empty() {
            enter(self, SavePhase::RelationsProcessing);
        }
        for (relation, sub) in dependent {
            let Some(value) = self.take_relation(&relation.name) else {
                debug!("Relation '{}' not populated, skipped", relation.name);
                continue;
            };
            let (value, outcome) = self
                .save_dependent(tx, relation, value, run_validation, sub.as_ref())
                .await;
            self.populate_relation(&relation.name, value);
            if !outcome? {
                return Ok(false);
            }
        }

        for mut orphan in orphans {
            debug!(
                "Deleting '{}' {} no longer referenced by '{}'",
                orphan.model_name(),
                orphan.primary_key(),
                self.model_name()
            );
            orphan.delete(tx).await?;
        }
        Ok(true)
    }
}

enum OwnedOutcome {
    Failed,
    Linked,
    /// Key cleared; the previously referenced record, if any, is deleted
    /// after the root save
    Cleared(Option<Record>),
}

impl Record {
    /// Check that every selected relation value matches its cardinality,
    /// down through the records a save would cascade into
    fn check_shapes(&self, selector: Option<&SaveSelector>) -> ModelResult<()> {
        let relations = self.registry().resolve_relations(self.model_name())?;
        let Some(selector) = selector else {
            return Ok(());
        };
        for (relation, sub) in selector.partition(&relations)?.relations {
            let related: Vec<&Record> = match (self.relation(&relation.name), relation.cardinality) {
                (None, _) => continue,
                (Some(RelationValue::One(record)), Cardinality::One) => {
                    record.iter().map(|r| &**r).collect()
                }
                (Some(RelationValue::Many(records)), Cardinality::Many) => records.iter().collect(),
                _ => return Err(shape_mismatch(relation)),
            };
            for record in related {
                if record.schema().is_cascading() {
                    record.check_shapes(sub.as_ref())?;
                }
            }
        }
        Ok(())
    }

    /// Save a related record that holds the key of this record, then copy
    /// its key onto this record. The relation value is handed back so the
    /// caller can restore it whatever the outcome.
    async fn save_owned(
        &mut self,
        tx: &mut dyn Transaction,
        relation: &RelationDescriptor,
        value: RelationValue,
        run_validation: bool,
        sub: Option<&SaveSelector>,
    ) -> (RelationValue, ModelResult<OwnedOutcome>) {
        match value {
            RelationValue::One(Some(mut related)) => {
                let outcome = match save_related(&mut related, tx, run_validation, sub, &[]).await {
                    Ok(true) => link(self, &mut related, relation).map(|_| OwnedOutcome::Linked),
                    Ok(false) => Ok(OwnedOutcome::Failed),
                    Err(err) => Err(err),
                };
                (RelationValue::One(Some(related)), outcome)
            }
            RelationValue::One(None) => {
                let outcome = match self.find_related_one(tx, &relation.name).await {
                    Ok(previous) => unlink(self, relation).map(|_| OwnedOutcome::Cleared(previous)),
                    Err(err) => Err(err),
                };
                (RelationValue::One(None), outcome)
            }
            many @ RelationValue::Many(_) => (many, Err(shape_mismatch(relation))),
        }
    }

    /// Save a relation whose records hold the key of this record
    async fn save_dependent(
        &mut self,
        tx: &mut dyn Transaction,
        relation: &RelationDescriptor,
        mut value: RelationValue,
        run_validation: bool,
        sub: Option<&SaveSelector>,
    ) -> (RelationValue, ModelResult<bool>) {
        let outcome = match (&mut value, relation.cardinality) {
            (RelationValue::One(Some(related)), Cardinality::One) => {
                self.save_dependent_one(tx, relation, related, run_validation, sub).await
            }
            (RelationValue::One(None), Cardinality::One) => self.delete_stored_one(tx, relation).await,
            (RelationValue::Many(records), Cardinality::Many) => {
                self.save_dependent_many(tx, relation, records, run_validation, sub).await
            }
            _ => Err(shape_mismatch(relation)),
        };
        (value, outcome)
    }

    async fn save_dependent_one(
        &mut self,
        tx: &mut dyn Transaction,
        relation: &RelationDescriptor,
        related: &mut Record,
        run_validation: bool,
        sub: Option<&SaveSelector>,
    ) -> ModelResult<bool> {
        link(self, related, relation)?;
        let linked = relation.link.related_columns();
        save_related(related, tx, run_validation, sub, &linked).await
    }

    async fn delete_stored_one(
        &self,
        tx: &mut dyn Transaction,
        relation: &RelationDescriptor,
    ) -> ModelResult<bool> {
        if let Some(mut previous) = self.find_related_one(tx, &relation.name).await? {
            debug!(
                "Deleting '{}' {} cleared from '{}'",
                previous.model_name(),
                previous.primary_key(),
                relation.name
            );
            previous.delete(tx).await?;
        }
        Ok(true)
    }

    async fn save_dependent_many(
        &mut self,
        tx: &mut dyn Transaction,
        relation: &RelationDescriptor,
        records: &mut [Record],
        run_validation: bool,
        sub: Option<&SaveSelector>,
    ) -> ModelResult<bool> {
        let removed = reconcile(self, tx, &relation.name, records).await?;
        let linked = relation.link.related_columns();

        for related in records.iter_mut() {
            link(self, related, relation)?;
            if !save_related(related, tx, run_validation, sub, &linked).await? {
                return Ok(false);
            }
        }

        for mut record in removed {
            debug!(
                "Deleting '{}' {} removed from '{}'",
                record.model_name(),
                record.primary_key(),
                relation.name
            );
            record.delete(tx).await?;
        }
        Ok(true)
    }
}

/// Save one related record, cascading when its model allows it.
///
/// `linked` columns are always written, even under a restriction.
async fn save_related(
    related: &mut Record,
    tx: &mut dyn Transaction,
    run_validation: bool,
    sub: Option<&SaveSelector>,
    linked: &[&str],
) -> ModelResult<bool> {
    let sub = sub.map(|selector| selector.with_linked_columns(linked.iter().copied()));

    if related.schema().is_cascading() {
        return related
            .save_with_related_in(tx, run_validation, sub.as_ref())
            .await;
    }

    let attributes = match &sub {
        Some(selector) => {
            let relations = related.registry().resolve_relations(related.model_name())?;
            selector.partition(&relations)?.attributes
        }
        None => None,
    };
    related.save(tx, run_validation, attributes.as_deref()).await
}

fn shape_mismatch(relation: &RelationDescriptor) -> ModelError {
    ModelError::Reflection(format!(
        "relation '{}' holds a value of the wrong cardinality",
        relation.name
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_names() {
        assert_eq!(SavePhase::Pending.to_string(), "PENDING");
        assert_eq!(SavePhase::RelationsProcessing.to_string(), "RELATIONS_PROCESSING");
        assert_eq!(SavePhase::RolledBack.to_string(), "ROLLED_BACK");
    }
}
