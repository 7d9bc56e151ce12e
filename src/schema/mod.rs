//! Entity and relation metadata.
//!
//! - **Entity**: table, ordered columns, single-column primary key
//! - **Relation**: `BelongsTo` (to-one) edges and their `HasMany` (to-many) inverses
//!
//! The prefetch planner only reads this registry; it is never mutated once built.

pub mod entity;
#[doc(inline)]
pub use entity::{EntityDef, EntityId, Schema, SchemaBuilder};

pub mod relation;
#[doc(inline)]
pub use relation::{RelationDef, RelationId, RelationType};
