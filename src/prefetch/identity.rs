//! Identity map for one fetch operation.
//!
//! Identity is `(entity, primary key)`. Two rows yielding the same pair resolve
//! to the same [`InstanceId`]; the later row's columns are dropped since an
//! identical primary key implies identical content. The map is created per
//! fetch, filled by hydration and batch attachment, and moves into the
//! returned [`Fetched`](super::graph::Fetched) graph.

use crate::executor::LifeError;
use crate::schema::EntityId;
use sea_query::Value;
use std::collections::{HashMap, HashSet};

/// Hashable primary key value, used for identity and owner lookup only.
///
/// All signed and unsigned integer widths collapse into `Int` when they fit,
/// so an `int4` foreign key matches an `int8` primary key. Statements bind the
/// decoded [`Value`] instead, which keeps the column's own type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyValue {
    Int(i64),
    Unsigned(u64),
    Text(String),
    Bytes(Vec<u8>),
    Bool(bool),
    Char(char),
}

impl KeyValue {
    /// `Ok(None)` for SQL NULL.
    ///
    /// # Errors
    ///
    /// Returns `LifeError::DataIntegrity` for values that cannot serve as an
    /// identity (floating point, JSON).
    pub fn from_value(value: &Value) -> Result<Option<Self>, LifeError> {
        let key = match value {
            Value::TinyInt(v) => v.map(|i| KeyValue::Int(i64::from(i))),
            Value::SmallInt(v) => v.map(|i| KeyValue::Int(i64::from(i))),
            Value::Int(v) => v.map(|i| KeyValue::Int(i64::from(i))),
            Value::BigInt(v) => v.map(KeyValue::Int),
            Value::TinyUnsigned(v) => v.map(|u| KeyValue::Int(i64::from(u))),
            Value::SmallUnsigned(v) => v.map(|u| KeyValue::Int(i64::from(u))),
            Value::Unsigned(v) => v.map(|u| KeyValue::Int(i64::from(u))),
            Value::BigUnsigned(v) => v.map(|u| match i64::try_from(u) {
                Ok(i) => KeyValue::Int(i),
                Err(_) => KeyValue::Unsigned(u),
            }),
            Value::String(v) => v.as_ref().map(|s| KeyValue::Text(s.clone())),
            Value::Bytes(v) => v.as_ref().map(|b| KeyValue::Bytes(b.clone())),
            Value::Bool(v) => v.map(KeyValue::Bool),
            Value::Char(v) => v.map(KeyValue::Char),
            other if is_null(other) => None,
            other => {
                return Err(LifeError::DataIntegrity(format!(
                    "value {other:?} cannot be used as a primary key"
                )))
            }
        };
        Ok(key)
    }
}

/// SQL NULL of any type.
pub(crate) fn is_null(value: &Value) -> bool {
    matches!(
        value,
        Value::Bool(None)
            | Value::TinyInt(None)
            | Value::SmallInt(None)
            | Value::Int(None)
            | Value::BigInt(None)
            | Value::TinyUnsigned(None)
            | Value::SmallUnsigned(None)
            | Value::Unsigned(None)
            | Value::BigUnsigned(None)
            | Value::Float(None)
            | Value::Double(None)
            | Value::String(None)
            | Value::Char(None)
            | Value::Bytes(None)
            | Value::Json(None)
    )
}

/// Handle to one hydrated instance inside a fetch result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(usize);

impl InstanceId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// State of one relation slot on an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link {
    /// The fetch did not include this relation
    Unloaded,
    /// To-one reference; `None` when the foreign key matched nothing
    One(Option<InstanceId>),
    /// Fully resolved to-many collection in store order
    Many(Vec<InstanceId>),
}

/// A materialized row of one entity.
#[derive(Debug, Clone)]
pub struct Instance {
    entity: EntityId,
    key: KeyValue,
    values: Vec<Value>,
    links: Vec<Link>,
}

impl Instance {
    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn key(&self) -> &KeyValue {
        &self.key
    }

    /// Column values in the entity's column order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn link(&self, slot: usize) -> Option<&Link> {
        self.links.get(slot)
    }
}

#[derive(Debug, Default)]
pub struct IdentityMap {
    instances: Vec<Instance>,
    index: HashMap<(EntityId, KeyValue), InstanceId>,
    // (owner, slot, child) already in a collection
    members: HashSet<(InstanceId, usize, InstanceId)>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn lookup(&self, entity: EntityId, key: &KeyValue) -> Option<InstanceId> {
        self.index.get(&(entity, key.clone())).copied()
    }

    /// Return the instance for `(entity, key)`, inserting one built from
    /// `values` if absent. The flag is `true` when a new instance was created.
    pub fn resolve(
        &mut self,
        entity: EntityId,
        key: KeyValue,
        values: &[Value],
        slots: usize,
    ) -> (InstanceId, bool) {
        if let Some(id) = self.lookup(entity, &key) {
            return (id, false);
        }
        let id = InstanceId(self.instances.len());
        self.instances.push(Instance {
            entity,
            key: key.clone(),
            values: values.to_vec(),
            links: vec![Link::Unloaded; slots],
        });
        self.index.insert((entity, key), id);
        (id, true)
    }

    pub fn get(&self, id: InstanceId) -> &Instance {
        &self.instances[id.0]
    }

    pub fn instances(&self) -> impl Iterator<Item = (InstanceId, &Instance)> {
        self.instances.iter().enumerate().map(|(i, inst)| (InstanceId(i), inst))
    }

    /// Wire a to-one slot. A resolved reference is never downgraded to a miss.
    pub(crate) fn set_one(&mut self, owner: InstanceId, slot: usize, target: Option<InstanceId>) {
        let link = &mut self.instances[owner.0].links[slot];
        match (&*link, target) {
            (Link::One(Some(_)), None) => {}
            _ => *link = Link::One(target),
        }
    }

    /// Turn a slot into an empty collection unless it already is one.
    pub(crate) fn init_many(&mut self, owner: InstanceId, slot: usize) {
        let link = &mut self.instances[owner.0].links[slot];
        if !matches!(link, Link::Many(_)) {
            *link = Link::Many(Vec::new());
        }
    }

    /// Append `child` to a collection. Two continuations over the same
    /// relation fill one slot, so a child already present is skipped.
    pub(crate) fn push_many(&mut self, owner: InstanceId, slot: usize, child: InstanceId) {
        if !self.members.insert((owner, slot, child)) {
            return;
        }
        let link = &mut self.instances[owner.0].links[slot];
        match link {
            Link::Many(children) => children.push(child),
            _ => *link = Link::Many(vec![child]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_value_integer_widths_collapse() {
        let a = KeyValue::from_value(&Value::Int(Some(7))).unwrap();
        let b = KeyValue::from_value(&Value::BigInt(Some(7))).unwrap();
        let c = KeyValue::from_value(&Value::SmallUnsigned(Some(7))).unwrap();
        assert_eq!(a, Some(KeyValue::Int(7)));
        assert_eq!(a, b);
        assert_eq!(b, c);

        let big = KeyValue::from_value(&Value::BigUnsigned(Some(u64::MAX))).unwrap();
        assert_eq!(big, Some(KeyValue::Unsigned(u64::MAX)));
    }

    #[test]
    fn test_key_value_nulls() {
        assert_eq!(KeyValue::from_value(&Value::Int(None)).unwrap(), None);
        assert_eq!(KeyValue::from_value(&Value::String(None)).unwrap(), None);
        assert_eq!(KeyValue::from_value(&Value::Double(None)).unwrap(), None);
    }

    #[test]
    fn test_key_value_rejects_floats() {
        let err = KeyValue::from_value(&Value::Double(Some(1.5))).unwrap_err();
        assert!(matches!(err, LifeError::DataIntegrity(_)));
    }

    #[test]
    fn test_key_value_text_and_bytes() {
        let text = KeyValue::from_value(&Value::String(Some("abc".to_string()))).unwrap();
        assert_eq!(text, Some(KeyValue::Text("abc".to_string())));
        let bytes = KeyValue::from_value(&Value::Bytes(Some(vec![1, 2]))).unwrap();
        assert_eq!(bytes, Some(KeyValue::Bytes(vec![1, 2])));
    }

    #[test]
    fn test_resolve_shares_identity() {
        let mut map = IdentityMap::new();
        let user = EntityId(0);
        let blog = EntityId(1);

        let (first, created) = map.resolve(
            user,
            KeyValue::Int(1),
            &[Value::Int(Some(1)), Value::String(Some("alice".to_string()))],
            1,
        );
        assert!(created);

        let (again, created) = map.resolve(
            user,
            KeyValue::Int(1),
            &[Value::Int(Some(1)), Value::String(Some("ignored".to_string()))],
            1,
        );
        assert!(!created);
        assert_eq!(first, again);
        assert_eq!(map.get(first).values()[1], Value::String(Some("alice".to_string())));

        // same key, other entity: distinct instance
        let (other, created) = map.resolve(blog, KeyValue::Int(1), &[Value::Int(Some(1))], 0);
        assert!(created);
        assert_ne!(first, other);
        assert_eq!(map.len(), 2);
        assert_eq!(map.lookup(blog, &KeyValue::Int(1)), Some(other));
    }

    #[test]
    fn test_links() {
        let mut map = IdentityMap::new();
        let (parent, _) = map.resolve(EntityId(0), KeyValue::Int(1), &[], 2);
        let (child, _) = map.resolve(EntityId(0), KeyValue::Int(2), &[], 2);

        assert_eq!(map.get(parent).link(0), Some(&Link::Unloaded));

        map.set_one(child, 0, Some(parent));
        map.set_one(child, 0, None);
        assert_eq!(map.get(child).link(0), Some(&Link::One(Some(parent))));

        map.set_one(parent, 0, None);
        assert_eq!(map.get(parent).link(0), Some(&Link::One(None)));

        map.init_many(parent, 1);
        map.push_many(parent, 1, child);
        map.push_many(parent, 1, child);
        map.init_many(parent, 1);
        assert_eq!(map.get(parent).link(1), Some(&Link::Many(vec![child])));
    }

    #[test]
    fn test_push_many_keeps_order_for_large_collections() {
        let mut map = IdentityMap::new();
        let (owner, _) = map.resolve(EntityId(0), KeyValue::Int(0), &[], 1);
        let children: Vec<InstanceId> = (1..=50_000)
            .map(|i| map.resolve(EntityId(1), KeyValue::Int(i), &[], 0).0)
            .collect();

        map.init_many(owner, 0);
        for child in &children {
            map.push_many(owner, 0, *child);
        }
        // a second continuation over the same slot adds nothing
        for child in children.iter().rev() {
            map.push_many(owner, 0, *child);
        }
        assert_eq!(map.get(owner).link(0), Some(&Link::Many(children)));
    }
}
