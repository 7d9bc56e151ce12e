//! PostgreSQL row cursor backed by `may_postgres`.
//!
//! Statements are rendered with sea-query's `PostgresQueryBuilder`, parameters
//! are bound through [`with_converted_params`] and result columns are decoded
//! by their PostgreSQL type. The executor is blocking and coroutine-friendly;
//! connection lifecycle and retries stay with the caller.

pub mod connection;
#[doc(inline)]
pub use connection::{connect, validate_connection_string, ConnectionError};

pub mod params;
#[doc(inline)]
pub use params::{decode_row, with_converted_params};

use crate::config::DatabaseConfig;
use crate::executor::{LifeError, LifeExecutor, Row};
use crate::query::statement::Statement;
use may_postgres::Client;

/// [`LifeExecutor`] over one `may_postgres` client.
///
/// ```no_run
/// use lifeguard_prefetch::postgres::MayPostgresExecutor;
/// use lifeguard_prefetch::DatabaseConfig;
///
/// let executor = MayPostgresExecutor::from_config(&DatabaseConfig::load()?)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct MayPostgresExecutor {
    client: Client,
}

impl MayPostgresExecutor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect with the `[database]` settings.
    pub fn from_config(config: &DatabaseConfig) -> Result<Self, ConnectionError> {
        Ok(Self::new(connect(&config.url)?))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn into_inner(self) -> Client {
        self.client
    }
}

impl LifeExecutor for MayPostgresExecutor {
    fn query_rows(&self, statement: &Statement) -> Result<Vec<Row>, LifeError> {
        let (sql, values) = statement.to_sql();
        log::trace!("{sql}");
        let rows = with_converted_params(&values, |params| {
            self.client.query(sql.as_str(), params).map_err(LifeError::PostgresError)
        })?;
        rows.iter().map(decode_row).collect()
    }
}
