//! Eager loading along declared fetch paths.
//!
//! A fetch runs in a fixed order:
//!
//! 1. **Root statement**: the to-one frontier of the plan root, compiled by
//!    [`assembler`] into one SELECT with `LEFT JOIN`s
//! 2. **Hydration**: rows are cut per alias and resolved through the
//!    per-fetch [`identity::IdentityMap`] ([`hydrate`])
//! 3. **Batches**: every to-many edge costs one `IN (...)` statement over the
//!    owners hydrated one level up, depth first ([`batch`])
//!
//! With no chunking configured a fetch issues exactly `1 + k` statements for
//! `k` distinct to-many edges, whatever the number of rows. Any error aborts
//! the fetch and drops the partial graph.

pub mod assembler;
pub(crate) mod batch;
pub mod graph;
pub(crate) mod hydrate;
pub mod identity;
pub mod plan;

#[doc(inline)]
pub use graph::{Fetched, FetchedOne, InstanceRef};
#[doc(inline)]
pub use identity::{IdentityMap, Instance, InstanceId, KeyValue, Link};
#[doc(inline)]
pub use plan::{JoinPlan, NodeId, PathStep, PlanNode};

use crate::config::PrefetchConfig;
use crate::executor::{LifeError, LifeExecutor, Row};
use crate::query::statement::Statement;
use crate::schema::Schema;
use batch::BatchFetcher;
use hydrate::Hydrator;
use std::collections::HashSet;
#[cfg(feature = "metrics")]
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StatementKind {
    Root,
    Batch,
}

impl StatementKind {
    fn as_str(self) -> &'static str {
        match self {
            StatementKind::Root => "root",
            StatementKind::Batch => "batch",
        }
    }
}

/// Send one statement to the store.
pub(crate) fn run_statement<E: LifeExecutor + ?Sized>(
    executor: &E,
    statement: &Statement,
    kind: StatementKind,
) -> Result<Vec<Row>, LifeError> {
    #[cfg(feature = "tracing")]
    let _span = crate::metrics::tracing_helpers::statement_span(
        kind.as_str(),
        &statement.root.table,
        statement.joins.len(),
    )
    .entered();

    log::debug!(
        "{} statement on `{}` AS `{}`: {} join(s), {} column(s)",
        kind.as_str(),
        statement.root.table,
        statement.root.alias,
        statement.joins.len(),
        statement.manifest.len()
    );

    #[cfg(feature = "metrics")]
    let start = Instant::now();
    let result = executor.query_rows(statement);
    #[cfg(feature = "metrics")]
    crate::metrics::METRICS.record_statement(kind.as_str(), start.elapsed(), result.is_ok());

    if let Err(e) = &result {
        log::debug!("{} statement on `{}` failed: {e}", kind.as_str(), statement.root.table);
    }
    result
}

/// Run a fetch: `statement` is the assembled root statement of `plan`.
pub(crate) fn execute<'s, E: LifeExecutor + ?Sized>(
    schema: &'s Schema,
    plan: &JoinPlan,
    statement: &Statement,
    executor: &E,
    config: PrefetchConfig,
) -> Result<Fetched<'s>, LifeError> {
    #[cfg(feature = "tracing")]
    let _span =
        crate::metrics::tracing_helpers::fetch_span(&plan.root().table, plan.to_many_count()).entered();

    let mut hydrator = Hydrator::new(schema);
    let rows = run_statement(executor, statement, StatementKind::Root)?;
    let per_row = hydrator.hydrate(plan, NodeId::ROOT, statement, &rows)?;

    let mut seen = HashSet::with_capacity(per_row.len());
    let roots: Vec<InstanceId> = per_row.into_iter().filter(|id| seen.insert(*id)).collect();

    BatchFetcher {
        schema,
        plan,
        executor,
        config,
    }
    .run(&mut hydrator, NodeId::ROOT)?;

    log::debug!(
        "fetched {} `{}` row(s), {} instance(s) in total",
        roots.len(),
        plan.root().table,
        hydrator.created()
    );
    #[cfg(feature = "metrics")]
    crate::metrics::METRICS.record_hydrated(hydrator.created());

    Ok(Fetched::new(schema, hydrator.into_map(), roots))
}
