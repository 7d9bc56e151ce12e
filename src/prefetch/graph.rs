//! The hydrated object graph handed back to callers.

use super::identity::{IdentityMap, InstanceId, KeyValue, Link};
use crate::error::ConfigurationError;
use crate::executor::LifeError;
use crate::schema::{EntityDef, EntityId, RelationId, Schema};
use sea_query::Value;

/// Result of one fetch: every hydrated instance plus the root instances in
/// the order the store returned them, each listed once.
#[derive(Debug)]
pub struct Fetched<'s> {
    schema: &'s Schema,
    map: IdentityMap,
    roots: Vec<InstanceId>,
}

impl<'s> Fetched<'s> {
    pub(crate) fn new(schema: &'s Schema, map: IdentityMap, roots: Vec<InstanceId>) -> Self {
        Self { schema, map, roots }
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn first(&self) -> Option<InstanceRef<'_>> {
        self.roots.first().map(|id| self.get(*id))
    }

    pub fn iter(&self) -> impl Iterator<Item = InstanceRef<'_>> {
        self.roots.iter().map(|id| self.get(*id))
    }

    /// Any instance of this fetch, root or related.
    pub fn get(&self, id: InstanceId) -> InstanceRef<'_> {
        InstanceRef {
            schema: self.schema,
            map: &self.map,
            id,
        }
    }

    pub fn roots(&self) -> &[InstanceId] {
        &self.roots
    }

    /// Distinct instances across the whole graph.
    pub fn instance_count(&self) -> usize {
        self.map.len()
    }

    pub fn schema(&self) -> &'s Schema {
        self.schema
    }
}

/// Result of [`SelectPlus::get`](crate::SelectPlus::get): one root instance
/// plus everything loaded under it.
#[derive(Debug)]
pub struct FetchedOne<'s> {
    fetched: Fetched<'s>,
    root: InstanceId,
}

impl<'s> FetchedOne<'s> {
    /// `None` when the fetch matched no root row.
    pub(crate) fn from_fetched(fetched: Fetched<'s>) -> Option<Self> {
        let root = *fetched.roots.first()?;
        Some(Self { fetched, root })
    }

    pub fn instance(&self) -> InstanceRef<'_> {
        self.fetched.get(self.root)
    }

    /// The whole graph, for looking up related instances by id.
    pub fn graph(&self) -> &Fetched<'s> {
        &self.fetched
    }

    pub fn into_inner(self) -> Fetched<'s> {
        self.fetched
    }
}

/// Borrowed view of one instance.
#[derive(Debug, Clone, Copy)]
pub struct InstanceRef<'a> {
    schema: &'a Schema,
    map: &'a IdentityMap,
    id: InstanceId,
}

impl<'a> InstanceRef<'a> {
    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn entity(&self) -> EntityId {
        self.map.get(self.id).entity()
    }

    pub fn entity_def(&self) -> &'a EntityDef {
        self.schema.entity(self.entity())
    }

    pub fn key(&self) -> &'a KeyValue {
        self.map.get(self.id).key()
    }

    pub fn values(&self) -> &'a [Value] {
        self.map.get(self.id).values()
    }

    /// Column value by name; `None` if the entity has no such column.
    pub fn value(&self, column: &str) -> Option<&'a Value> {
        let index = self.entity_def().column_index(column)?;
        self.values().get(index)
    }

    pub fn text(&self, column: &str) -> Option<&'a str> {
        match self.value(column)? {
            Value::String(Some(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn int(&self, column: &str) -> Option<i64> {
        match KeyValue::from_value(self.value(column)?) {
            Ok(Some(KeyValue::Int(i))) => Some(i),
            _ => None,
        }
    }

    /// Follow a to-one relation. `Ok(None)` when the foreign key is NULL or
    /// matched no row.
    ///
    /// # Errors
    ///
    /// `LifeError::NotLoaded` when the relation was not part of the fetch,
    /// `LifeError::Configuration` when it belongs to another entity.
    pub fn one(&self, relation: RelationId) -> Result<Option<InstanceRef<'a>>, LifeError> {
        match self.link(relation)? {
            Link::One(target) => Ok(target.map(|id| self.at(id))),
            Link::Many(_) => Err(LifeError::Other(format!(
                "`{}` is a to-many relation",
                self.schema.relation_label(relation)
            ))),
            Link::Unloaded => Err(self.not_loaded(relation)),
        }
    }

    /// Follow a to-many relation, in the order the store returned the rows.
    ///
    /// # Errors
    ///
    /// Same as [`InstanceRef::one`].
    pub fn many(&self, relation: RelationId) -> Result<Vec<InstanceRef<'a>>, LifeError> {
        match self.link(relation)? {
            Link::Many(children) => Ok(children.iter().map(|id| self.at(*id)).collect()),
            Link::One(_) => Err(LifeError::Other(format!(
                "`{}` is a to-one relation",
                self.schema.relation_label(relation)
            ))),
            Link::Unloaded => Err(self.not_loaded(relation)),
        }
    }

    pub fn one_by_name(&self, name: &str) -> Result<Option<InstanceRef<'a>>, LifeError> {
        self.one(self.relation_named(name)?)
    }

    pub fn many_by_name(&self, name: &str) -> Result<Vec<InstanceRef<'a>>, LifeError> {
        self.many(self.relation_named(name)?)
    }

    /// Whether both refer to the very same instance of one fetch.
    pub fn same_instance(&self, other: &InstanceRef<'_>) -> bool {
        std::ptr::eq(self.map, other.map) && self.id == other.id
    }

    fn link(&self, relation: RelationId) -> Result<&'a Link, LifeError> {
        if relation.entity() != self.entity() {
            return Err(ConfigurationError::ForeignRelation {
                entity: self.entity_def().name.clone(),
                relation: self.schema.relation_label(relation),
            }
            .into());
        }
        self.map
            .get(self.id)
            .link(relation.slot())
            .ok_or_else(|| self.not_loaded(relation))
    }

    fn relation_named(&self, name: &str) -> Result<RelationId, LifeError> {
        self.schema.relation(self.entity(), name).ok_or_else(|| {
            ConfigurationError::ForeignRelation {
                entity: self.entity_def().name.clone(),
                relation: name.to_string(),
            }
            .into()
        })
    }

    fn not_loaded(&self, relation: RelationId) -> LifeError {
        LifeError::NotLoaded {
            entity: self.entity_def().name.clone(),
            relation: self.schema.relation_def(relation).name.clone(),
        }
    }

    fn at(&self, id: InstanceId) -> InstanceRef<'a> {
        InstanceRef {
            schema: self.schema,
            map: self.map,
            id,
        }
    }
}
