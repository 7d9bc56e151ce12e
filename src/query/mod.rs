//! Query building for prefetch fetches.
//!
//! # Architecture
//!
//! - **Filter**: caller-facing expression tree over root or joined columns
//!   (`Filter`, `col`, `root`)
//! - **Statement**: the abstract SELECT handed to executors, rendered through
//!   sea-query (`Statement`, `ColumnManifest`)
//! - **Select**: the chainable builder that declares fetch paths and runs the
//!   fetch (`SelectPlus`)
//!
//! # Examples
//!
//! ```no_run
//! use lifeguard_prefetch::{col, root, LifeExecutor, Schema, SelectPlus};
//! use sea_query::Order;
//!
//! # fn demo(schema: &Schema, executor: &dyn LifeExecutor) -> Result<(), lifeguard_prefetch::LifeError> {
//! let blog = schema.entity_by_name("Blog").unwrap();
//! let user = schema.relation(blog, "user").unwrap();
//!
//! let blogs = SelectPlus::new(schema, blog)
//!     .plus([user])
//!     .filter(col("users", "username").eq("alice"))
//!     .order_by(root("pk"), Order::Asc)
//!     .all(executor)?;
//!
//! for blog in blogs.iter() {
//!     let author = blog.one(user)?.unwrap();
//!     println!("{:?} by {:?}", blog.text("title"), author.text("username"));
//! }
//! # Ok(())
//! # }
//! ```

pub mod filter;
#[doc(inline)]
pub use filter::{col, root, ColumnRef, CompareOp, Filter, Source};

pub mod statement;
#[doc(inline)]
pub use statement::{ColumnManifest, Join, QualifiedColumn, Statement, TableAlias};

pub mod select;
#[doc(inline)]
pub use select::SelectPlus;
