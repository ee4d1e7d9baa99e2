//! Tracing spans for query resolution, SQL execution and transactions.
//!
//! Only compiled with the `tracing` feature. Callers enter the span for the
//! duration of the operation:
//!
//! ```ignore
//! let _span = tracing_helpers::execute_query_span(sql).entered();
//! ```

use tracing::Span;

/// Span for materializing a query against `table` with `conditions` recorded
pub fn resolve_query_span(table: &str, conditions: usize) -> Span {
    tracing::debug_span!("tidepool.resolve_query", table = %table, conditions)
}

/// Span for one SQL statement
pub fn execute_query_span(sql: &str) -> Span {
    tracing::debug_span!("tidepool.execute_query", db.statement = %sql)
}

pub fn begin_transaction_span() -> Span {
    tracing::info_span!("tidepool.begin_transaction")
}

pub fn commit_transaction_span() -> Span {
    tracing::info_span!("tidepool.commit_transaction")
}

pub fn rollback_transaction_span() -> Span {
    tracing::info_span!("tidepool.rollback_transaction")
}

/// Span for opening a connection
pub fn acquire_connection_span() -> Span {
    tracing::info_span!("tidepool.acquire_connection")
}

/// Span for applying or reverting one migration
pub fn migration_span(version: i64, direction: &str) -> Span {
    tracing::info_span!("tidepool.migration", version, direction = %direction)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(span: &Span) -> Option<&'static str> {
        span.metadata().map(|metadata| metadata.name())
    }

    #[test]
    fn test_spans_are_recorded_under_a_subscriber() {
        let _guard = tracing::subscriber::set_default(tracing_subscriber::registry());

        let span = resolve_query_span("authors", 3);
        assert!(!span.is_disabled());
        assert_eq!(name(&span), Some("tidepool.resolve_query"));

        assert_eq!(name(&execute_query_span("SELECT 1")), Some("tidepool.execute_query"));
        assert_eq!(name(&migration_span(20240101000000, "up")), Some("tidepool.migration"));
    }

    #[test]
    fn test_spans_are_disabled_without_subscriber() {
        assert!(begin_transaction_span().is_disabled());
    }
}
