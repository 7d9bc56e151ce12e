//! # Lifeguard Prefetch
//!
//! Eager loading for relational queries: declare fetch paths through foreign
//! key relations and get back a fully populated object graph from a fixed,
//! small number of statements.
//!
//! - to-one paths (`Blog -> User`, `Category -> parent -> parent`) are joined
//!   into the root statement
//! - every distinct to-many edge (`User -> blog_set`) costs one batched
//!   `IN (...)` statement, however many rows come back
//! - instances are shared by `(entity, primary key)` within one fetch
//!
//! Start from a [`Schema`], build a [`SelectPlus`], run it against any
//! [`LifeExecutor`] ([`postgres::MayPostgresExecutor`], or the in-memory
//! `MockStore` behind the `mock` feature) and read the result through
//! [`Fetched`].

pub mod config;
pub mod error;
pub mod executor;
pub mod metrics;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod postgres;
pub mod prefetch;
pub mod query;
pub mod schema;

pub use config::{DatabaseConfig, PrefetchConfig};
pub use error::ConfigurationError;
pub use executor::{CountingExecutor, LifeError, LifeExecutor, Row};
#[cfg(any(test, feature = "mock"))]
pub use mock::MockStore;
pub use prefetch::{Fetched, FetchedOne, InstanceId, InstanceRef, JoinPlan, KeyValue, NodeId, PathStep};
pub use query::{col, root, ColumnRef, Filter, SelectPlus, Statement};
pub use schema::{EntityDef, EntityId, RelationDef, RelationId, RelationType, Schema, SchemaBuilder};
