//! To-many batch loading.
//!
//! Each continuation of the plan is loaded with one
//! `WHERE <fk> IN (<owner keys>)` statement over the owners hydrated one
//! level up. Children are attached with a hash join: the owners are the build
//! side (keyed by primary key), each child row finds its owner there by foreign key.

use super::assembler::batch_statement;
use super::hydrate::Hydrator;
use super::identity::{InstanceId, KeyValue};
use super::plan::{JoinPlan, NodeId};
use super::{run_statement, StatementKind};
use crate::config::PrefetchConfig;
use crate::executor::{LifeError, LifeExecutor, Row};
use crate::schema::Schema;
use sea_query::Value;
use std::collections::HashMap;

pub(crate) struct BatchFetcher<'a, E: ?Sized> {
    pub(crate) schema: &'a Schema,
    pub(crate) plan: &'a JoinPlan,
    pub(crate) executor: &'a E,
    pub(crate) config: PrefetchConfig,
}

impl<E: LifeExecutor + ?Sized> BatchFetcher<'_, E> {
    /// Load every continuation below the frontier of `start`, depth first, in
    /// declaration order.
    pub(crate) fn run(&self, hydrator: &mut Hydrator<'_>, start: NodeId) -> Result<(), LifeError> {
        for continuation in self.plan.continuations(start) {
            self.fetch(hydrator, continuation)?;
        }
        Ok(())
    }

    fn fetch(&self, hydrator: &mut Hydrator<'_>, continuation: NodeId) -> Result<(), LifeError> {
        let node = self.plan.node(continuation);
        let (Some(owner_node), Some(relation)) = (node.parent, node.relation) else {
            return Ok(());
        };
        let def = self.schema.relation_def(relation);

        let owners: Vec<InstanceId> = hydrator.instances_at(owner_node).to_vec();
        if owners.is_empty() {
            log::trace!(
                "skipping `{}`: no owners were hydrated",
                self.schema.relation_label(relation)
            );
            #[cfg(feature = "metrics")]
            crate::metrics::METRICS.record_skipped_batch();
            return Ok(());
        }

        // build side; the IN list binds the owners' decoded key values
        let pk_index = self.schema.entity(def.from).primary_key_index();
        let mut owner_by_key: HashMap<KeyValue, InstanceId> = HashMap::with_capacity(owners.len());
        let mut keys: Vec<Value> = Vec::with_capacity(owners.len());
        for owner in &owners {
            let instance = hydrator.map().get(*owner);
            owner_by_key.insert(instance.key().clone(), *owner);
            keys.push(instance.values()[pk_index].clone());
            hydrator.map_mut().init_many(*owner, relation.slot());
        }

        let child_def = self.schema.entity(node.entity);
        let fk_index = child_def.column_index(&def.fk_column).ok_or_else(|| {
            LifeError::DataIntegrity(format!(
                "foreign key `{}` is not a column of `{}`",
                def.fk_column, child_def.name
            ))
        })?;

        let chunk_size = self.config.chunk_size(keys.len());
        for chunk in keys.chunks(chunk_size) {
            let statement = batch_statement(self.schema, self.plan, continuation, chunk)?;
            log::debug!(
                "loading `{}` for {} owner(s)",
                self.schema.relation_label(relation),
                chunk.len()
            );
            let rows = run_statement(self.executor, &statement, StatementKind::Batch)?;
            let children = hydrator.hydrate(self.plan, continuation, &statement, &rows)?;

            // match side
            for (row, child) in rows.iter().zip(children) {
                let owner = owner_of(&owner_by_key, row, fk_index)?;
                hydrator.map_mut().push_many(owner, relation.slot(), child);
            }
        }

        self.run(hydrator, continuation)
    }
}

/// Owner of one child row, found through the child's foreign key.
fn owner_of(
    owner_by_key: &HashMap<KeyValue, InstanceId>,
    row: &Row,
    fk_index: usize,
) -> Result<InstanceId, LifeError> {
    // the continuation is the first alias of its statement
    let value = row
        .get(fk_index)
        .ok_or_else(|| LifeError::DataIntegrity(format!("row has no column {fk_index}")))?;
    let key = KeyValue::from_value(value)?
        .ok_or_else(|| LifeError::DataIntegrity("child row has a NULL foreign key".to_string()))?;
    owner_by_key.get(&key).copied().ok_or_else(|| {
        LifeError::DataIntegrity(format!("child row references unrequested owner {key:?}"))
    })
}
