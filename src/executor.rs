//! `LifeExecutor` Module
//!
//! Provides the `LifeExecutor` trait that abstracts statement execution for the
//! prefetch engine, the crate-wide `LifeError`, and `CountingExecutor`, a
//! wrapper that counts every statement it forwards.
//!
//! The engine never writes SQL text itself. It hands an abstract [`Statement`]
//! to the executor, which renders it (see [`Statement::to_sql`]) or evaluates it
//! directly, and gets back rows laid out in the statement's column manifest
//! order.

use crate::error::ConfigurationError;
use crate::query::statement::Statement;
use may_postgres::Error as PostgresError;
use sea_query::Value;
use std::cell::{Cell, RefCell};
use std::fmt;

/// `LifeExecutor` error type
#[derive(Debug)]
pub enum LifeError {
    /// `PostgreSQL` error from `may_postgres`
    PostgresError(PostgresError),
    /// Plan-compile time error; raised before any statement is issued
    Configuration(ConfigurationError),
    /// Rows contradict the schema or the identity map
    DataIntegrity(String),
    /// Statement execution error reported by a non-Postgres store
    QueryError(String),
    /// Row parsing/conversion error
    ParseError(String),
    /// `get` matched no root row
    NotFound(String),
    /// A relation was read that the fetch did not eager load
    NotLoaded { entity: String, relation: String },
    /// Other execution errors
    Other(String),
}

impl LifeError {
    /// Configuration errors are raised at plan-compile time and never retried.
    pub fn is_configuration(&self) -> bool {
        matches!(self, LifeError::Configuration(_))
    }

    /// Store errors are passed through untouched; retry policy belongs to the caller.
    pub fn is_transient(&self) -> bool {
        matches!(self, LifeError::PostgresError(_) | LifeError::QueryError(_))
    }
}

impl fmt::Display for LifeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifeError::PostgresError(e) => {
                write!(f, "PostgreSQL error: {e}")
            }
            LifeError::Configuration(e) => {
                write!(f, "Configuration error: {e}")
            }
            LifeError::DataIntegrity(s) => {
                write!(f, "Data integrity error: {s}")
            }
            LifeError::QueryError(s) => {
                write!(f, "Query error: {s}")
            }
            LifeError::ParseError(s) => {
                write!(f, "Parse error: {s}")
            }
            LifeError::NotFound(s) => {
                write!(f, "Not found: {s}")
            }
            LifeError::NotLoaded { entity, relation } => {
                write!(f, "Relation `{entity}.{relation}` was not eager loaded")
            }
            LifeError::Other(s) => {
                write!(f, "Execution error: {s}")
            }
        }
    }
}

impl std::error::Error for LifeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LifeError::PostgresError(e) => Some(e),
            LifeError::Configuration(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PostgresError> for LifeError {
    fn from(err: PostgresError) -> Self {
        LifeError::PostgresError(err)
    }
}

impl From<ConfigurationError> for LifeError {
    fn from(err: ConfigurationError) -> Self {
        LifeError::Configuration(err)
    }
}

/// One result row, addressable by position in the statement's column manifest.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

/// Trait for executing prefetch statements
///
/// Implementations run one abstract [`Statement`] and return its rows in store
/// order, each row holding exactly `statement.manifest.len()` values. The call
/// is a synchronous, possibly blocking boundary; cancellation and timeouts
/// belong to the implementation.
///
/// # Examples
///
/// ```no_run
/// use lifeguard_prefetch::{LifeExecutor, LifeError, Row, Statement};
///
/// struct Empty;
///
/// impl LifeExecutor for Empty {
///     fn query_rows(&self, _statement: &Statement) -> Result<Vec<Row>, LifeError> {
///         Ok(Vec::new())
///     }
/// }
/// ```
pub trait LifeExecutor {
    /// Execute a statement and return all rows
    ///
    /// # Errors
    ///
    /// Returns `LifeError` if the store rejects or fails the statement.
    fn query_rows(&self, statement: &Statement) -> Result<Vec<Row>, LifeError>;
}

impl<E: LifeExecutor + ?Sized> LifeExecutor for &E {
    fn query_rows(&self, statement: &Statement) -> Result<Vec<Row>, LifeError> {
        (**self).query_rows(statement)
    }
}

/// Executor wrapper that counts statements and keeps their rendered SQL.
///
/// ```no_run
/// # use lifeguard_prefetch::{CountingExecutor, MockStore, Schema};
/// # let schema = Schema::builder().build();
/// let db = CountingExecutor::new(MockStore::new(&schema));
/// // ... run fetches against `&db` ...
/// assert_eq!(db.recent_sql_count(), 1);
/// ```
pub struct CountingExecutor<E> {
    inner: E,
    count: Cell<usize>,
    log: RefCell<Vec<String>>,
}

impl<E: LifeExecutor> CountingExecutor<E> {
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            count: Cell::new(0),
            log: RefCell::new(Vec::new()),
        }
    }

    /// Statements issued since creation or the last reset.
    pub fn sql_count(&self) -> usize {
        self.count.get()
    }

    /// Returns the statement count and resets it to zero.
    pub fn recent_sql_count(&self) -> usize {
        self.count.replace(0)
    }

    pub fn reset(&self) {
        self.count.set(0);
        self.log.borrow_mut().clear();
    }

    /// Rendered PostgreSQL text of every statement issued so far.
    pub fn statements(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut E {
        &mut self.inner
    }

    pub fn into_inner(self) -> E {
        self.inner
    }
}

impl<E: LifeExecutor> LifeExecutor for CountingExecutor<E> {
    fn query_rows(&self, statement: &Statement) -> Result<Vec<Row>, LifeError> {
        self.count.set(self.count.get() + 1);
        let (sql, _) = statement.to_sql();
        self.log.borrow_mut().push(sql);
        self.inner.query_rows(statement)
    }
}
