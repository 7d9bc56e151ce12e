//! Relation edges between entities.
//!
//! A relation is registered once, as a `BelongsTo` edge on the entity that holds
//! the foreign key. Its optional inverse is a `HasMany` edge on the referenced
//! entity over the same column. Every relation owns a fixed slot on its entity,
//! so hydrated instances store their links by slot rather than by name.

use super::entity::EntityId;

/// Type of relationship between entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationType {
    /// Many-to-one: the source row carries the foreign key (to-one edge)
    BelongsTo,
    /// One-to-many: the target rows carry the foreign key back (to-many edge)
    HasMany,
}

impl RelationType {
    pub fn is_to_one(self) -> bool {
        matches!(self, RelationType::BelongsTo)
    }

    pub fn is_to_many(self) -> bool {
        matches!(self, RelationType::HasMany)
    }
}

/// Statically resolved handle to a relation: owning entity plus slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationId {
    pub(crate) entity: EntityId,
    pub(crate) slot: usize,
}

impl RelationId {
    /// Entity exposing this relation as an attribute.
    pub fn entity(self) -> EntityId {
        self.entity
    }

    /// Link slot on the owning entity's instances.
    pub fn slot(self) -> usize {
        self.slot
    }
}

/// Defines one directed relation edge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDef {
    /// Attribute name on `from` instances (e.g. `user`, `blog_set`)
    pub name: String,
    /// Type of relationship
    pub rel_type: RelationType,
    /// Entity exposing the attribute
    pub from: EntityId,
    /// Entity the attribute points at
    pub to: EntityId,
    /// Foreign key column. Lives on `from` for `BelongsTo`, on `to` for `HasMany`.
    pub fk_column: String,
    /// The inverse edge over the same foreign key, when one was registered
    pub reverse: Option<RelationId>,
}

impl RelationDef {
    /// Entity whose table holds the foreign key column.
    pub fn fk_owner(&self) -> EntityId {
        match self.rel_type {
            RelationType::BelongsTo => self.from,
            RelationType::HasMany => self.to,
        }
    }

    pub fn is_self_referential(&self) -> bool {
        self.from == self.to
    }
}
