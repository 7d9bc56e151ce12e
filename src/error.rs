//! Plan-compile time errors.
//!
//! Every variant here is raised before a single statement reaches the store:
//! a failing path declaration or an unresolvable filter reference never turns
//! into a half-hydrated graph.

use std::fmt;

/// Non-retryable error raised while building a schema, declaring fetch paths
/// or assembling statements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// `plus` was called with no relation at all
    EmptyPath,
    /// A path step does not start where the previous step ended
    BrokenPath {
        /// Zero-based step index inside the declared path
        position: usize,
        /// Entity the step had to start from
        expected: String,
        /// Entity the step's relation actually starts from
        found: String,
    },
    /// An explicit alias is already bound to another join
    AliasConflict {
        alias: String,
        /// Table the alias is already bound to
        bound_table: String,
        /// Table the new join wanted to bind it to
        requested_table: String,
    },
    /// A bare table reference matches more than one unaliased join
    AmbiguousReference { table: String, candidates: usize },
    /// A reference names neither a joined alias nor a joined table
    UnknownReference { handle: String, reason: String },
    /// The referenced table has no such column
    UnknownColumn { table: String, column: String },
    /// The relation handle does not belong to the instance's entity
    ForeignRelation { entity: String, relation: String },
    /// Entity or relation registration was rejected
    InvalidSchema(String),
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationError::EmptyPath => write!(f, "fetch path must contain at least one relation"),
            ConfigurationError::BrokenPath {
                position,
                expected,
                found,
            } => write!(
                f,
                "fetch path step {position} starts at `{found}` but the previous step ends at `{expected}`"
            ),
            ConfigurationError::AliasConflict {
                alias,
                bound_table,
                requested_table,
            } => {
                if bound_table == requested_table {
                    write!(f, "alias `{alias}` is already used by another join of `{bound_table}`")
                } else {
                    write!(
                        f,
                        "alias `{alias}` is bound to `{bound_table}` and cannot also name `{requested_table}`"
                    )
                }
            }
            ConfigurationError::AmbiguousReference { table, candidates } => write!(
                f,
                "reference to `{table}` is ambiguous: joined {candidates} times without an explicit alias"
            ),
            ConfigurationError::UnknownReference { handle, reason } => {
                write!(f, "unknown reference `{handle}`: {reason}")
            }
            ConfigurationError::UnknownColumn { table, column } => {
                write!(f, "table `{table}` has no column `{column}`")
            }
            ConfigurationError::ForeignRelation { entity, relation } => {
                write!(f, "relation `{relation}` is not declared on `{entity}`")
            }
            ConfigurationError::InvalidSchema(msg) => write!(f, "invalid schema: {msg}"),
        }
    }
}

impl std::error::Error for ConfigurationError {}
