use tracing::Span;

/// Span around one statement sent to the store.
pub fn statement_span(kind: &'static str, table: &str, joins: usize) -> Span {
    tracing::debug_span!("prefetch.statement", kind, table, joins)
}

/// Span around a whole fetch: root statement plus every batch.
pub fn fetch_span(root: &str, to_many_edges: usize) -> Span {
    tracing::info_span!("prefetch.fetch", root, to_many_edges)
}

/// Span around dialing PostgreSQL for an executor.
pub fn connect_span() -> Span {
    tracing::info_span!("prefetch.connect")
}
