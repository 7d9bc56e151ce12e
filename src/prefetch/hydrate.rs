//! Row hydration.
//!
//! Cuts flat rows back into per-alias column groups, resolves each group
//! through the identity map and wires the to-one links implied by the plan.

use super::identity::{IdentityMap, InstanceId, KeyValue};
use super::plan::{JoinPlan, NodeId};
use crate::executor::{LifeError, Row};
use crate::query::statement::Statement;
use crate::schema::{EntityId, Schema};
use sea_query::Value;
use std::collections::{HashMap, HashSet};

/// Distinct instances seen at one plan node, in first-seen order.
#[derive(Debug, Default)]
struct NodeInstances {
    order: Vec<InstanceId>,
    seen: HashSet<InstanceId>,
}

impl NodeInstances {
    fn record(&mut self, id: InstanceId) {
        if self.seen.insert(id) {
            self.order.push(id);
        }
    }
}

/// Per-fetch hydration state: the identity map plus, for every plan node, the
/// instances hydrated there. The latter are the owner sets of to-many batches.
#[derive(Debug)]
pub(crate) struct Hydrator<'s> {
    schema: &'s Schema,
    map: IdentityMap,
    at_node: HashMap<NodeId, NodeInstances>,
    created: usize,
}

impl<'s> Hydrator<'s> {
    pub(crate) fn new(schema: &'s Schema) -> Self {
        Self {
            schema,
            map: IdentityMap::new(),
            at_node: HashMap::new(),
            created: 0,
        }
    }

    /// Hydrate `rows` of `statement`, which was assembled from the frontier
    /// starting at `start`.
    ///
    /// Returns, per row, the instance at the statement root.
    pub(crate) fn hydrate(
        &mut self,
        plan: &JoinPlan,
        start: NodeId,
        statement: &Statement,
        rows: &[Row],
    ) -> Result<Vec<InstanceId>, LifeError> {
        let frontier = plan.frontier(start);
        let mut ranges = Vec::with_capacity(frontier.len());
        for id in &frontier {
            let alias = &plan.node(*id).alias;
            let range = statement.manifest.range(alias).ok_or_else(|| {
                LifeError::DataIntegrity(format!("alias `{alias}` is missing from the column manifest"))
            })?;
            ranges.push(range);
        }

        let mut roots = Vec::with_capacity(rows.len());
        let mut row_instances: Vec<Option<InstanceId>> = vec![None; frontier.len()];
        for (index, row) in rows.iter().enumerate() {
            if row.len() != statement.manifest.len() {
                return Err(LifeError::DataIntegrity(format!(
                    "row {index} has {} values but the statement selects {} columns",
                    row.len(),
                    statement.manifest.len()
                )));
            }

            row_instances.iter_mut().for_each(|slot| *slot = None);
            for (position, id) in frontier.iter().enumerate() {
                let node = plan.node(*id);
                let values = &row.values()[ranges[position].clone()];
                let instance = self.resolve_group(node.entity, *id, values)?;
                row_instances[position] = instance;

                let (Some(parent), Some(relation)) = (node.parent, node.relation) else {
                    continue;
                };
                // the parent precedes its children in the frontier
                let Some(parent_position) = frontier[..position].iter().position(|p| *p == parent) else {
                    continue;
                };
                if let Some(owner) = row_instances[parent_position] {
                    self.map.set_one(owner, relation.slot(), instance);
                }
            }

            match row_instances.first().copied().flatten() {
                Some(root) => roots.push(root),
                None => {
                    return Err(LifeError::DataIntegrity(format!(
                        "row {index} has a NULL primary key for `{}`",
                        statement.root.table
                    )))
                }
            }
        }
        Ok(roots)
    }

    /// Resolve one alias's column group. `None` on an outer-join miss.
    fn resolve_group(
        &mut self,
        entity: EntityId,
        node: NodeId,
        values: &[Value],
    ) -> Result<Option<InstanceId>, LifeError> {
        let def = self.schema.entity(entity);
        let Some(key) = KeyValue::from_value(&values[def.primary_key_index()])? else {
            return Ok(None);
        };
        let (id, created) = self.map.resolve(entity, key, values, def.relations.len());
        if self.map.get(id).entity() != entity {
            return Err(LifeError::DataIntegrity(format!(
                "identity map entry {} does not belong to `{}`",
                id.index(),
                def.name
            )));
        }
        if created {
            self.created += 1;
        }
        self.at_node.entry(node).or_default().record(id);
        Ok(Some(id))
    }

    /// Distinct instances hydrated at `node`, in first-seen order.
    pub(crate) fn instances_at(&self, node: NodeId) -> &[InstanceId] {
        self.at_node.get(&node).map_or(&[], |n| n.order.as_slice())
    }

    pub(crate) fn map(&self) -> &IdentityMap {
        &self.map
    }

    pub(crate) fn map_mut(&mut self) -> &mut IdentityMap {
        &mut self.map
    }

    /// Instances created so far (reused identities are not counted).
    pub(crate) fn created(&self) -> usize {
        self.created
    }

    pub(crate) fn into_map(self) -> IdentityMap {
        self.map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefetch::assembler::assemble;
    use crate::prefetch::identity::Link;

    fn int(v: i32) -> Value {
        Value::Int(Some(v))
    }

    fn text(v: &str) -> Value {
        Value::String(Some(v.to_string()))
    }

    #[test]
    fn test_hydrate_shares_identity_and_wires_links() {
        let mut b = Schema::builder();
        let user = b.entity("User", "users", "id", &["id", "username"]).unwrap();
        let blog = b.entity("Blog", "blog", "pk", &["pk", "user_id", "title"]).unwrap();
        let blog_user = b.belongs_to(blog, "user", user, "user_id", None).unwrap();
        let schema = b.build();

        let mut plan = JoinPlan::new(&schema, blog);
        let user_node = plan.declare(&schema, &[blog_user.into()]).unwrap();
        let statement = assemble(&schema, &plan, NodeId::ROOT, None, &[], None).unwrap();

        let rows = vec![
            Row::new(vec![int(1), int(10), text("b1"), int(10), text("alice")]),
            Row::new(vec![int(2), int(10), text("b2"), int(10), text("alice")]),
            Row::new(vec![int(3), Value::Int(None), text("b3"), Value::Int(None), Value::String(None)]),
        ];

        let mut hydrator = Hydrator::new(&schema);
        let roots = hydrator.hydrate(&plan, NodeId::ROOT, &statement, &rows).unwrap();
        assert_eq!(roots.len(), 3);
        assert_eq!(hydrator.created(), 4);
        assert_eq!(hydrator.instances_at(user_node).len(), 1);

        let map = hydrator.map();
        let alice = hydrator.instances_at(user_node)[0];
        assert_eq!(map.get(roots[0]).link(0), Some(&Link::One(Some(alice))));
        assert_eq!(map.get(roots[1]).link(0), Some(&Link::One(Some(alice))));
        assert_eq!(map.get(roots[2]).link(0), Some(&Link::One(None)));
        assert_eq!(map.get(alice).values()[1], text("alice"));
    }

    #[test]
    fn test_hydrate_rejects_malformed_rows() {
        let mut b = Schema::builder();
        let user = b.entity("User", "users", "id", &["id", "username"]).unwrap();
        let schema = b.build();
        let plan = JoinPlan::new(&schema, user);
        let statement = assemble(&schema, &plan, NodeId::ROOT, None, &[], None).unwrap();
        let mut hydrator = Hydrator::new(&schema);

        let short = vec![Row::new(vec![int(1)])];
        let err = hydrator.hydrate(&plan, NodeId::ROOT, &statement, &short).unwrap_err();
        assert!(matches!(err, LifeError::DataIntegrity(_)));

        let null_root = vec![Row::new(vec![Value::Int(None), text("ghost")])];
        let err = hydrator.hydrate(&plan, NodeId::ROOT, &statement, &null_root).unwrap_err();
        assert!(matches!(err, LifeError::DataIntegrity(_)));

        let float_key = vec![Row::new(vec![Value::Double(Some(1.5)), text("x")])];
        let err = hydrator.hydrate(&plan, NodeId::ROOT, &statement, &float_key).unwrap_err();
        assert!(matches!(err, LifeError::DataIntegrity(_)));
    }
}
