//! Process-wide table mapping native engine error codes to [`ErrorKind`]s.
//!
//! Adapters register their codes once at start-up (see
//! [`crate::sql::postgres::register_error_kinds`] and
//! [`crate::memory::register_error_kinds`]). The table is append-only: each
//! registration swaps in a new immutable snapshot, so lookups never observe a
//! partially updated map and only hold the lock long enough to clone an `Arc`.

use crate::error::{EngineError, ErrorKind};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

type Snapshot = Arc<HashMap<String, ErrorKind>>;

static REGISTRY: Lazy<RwLock<Snapshot>> = Lazy::new(|| RwLock::new(Arc::new(HashMap::new())));

/// Kind returned when no registration matches
pub const DEFAULT_KIND: ErrorKind = ErrorKind::InvalidCommand;

/// Associate a native error code with an error kind.
///
/// Registering the same code again replaces the previous kind.
pub fn register(code: impl Into<String>, kind: ErrorKind) {
    let code = code.into();
    let mut guard = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    let mut next = HashMap::clone(&guard);
    log::debug!("registering error kind {kind:?} for native code '{code}'");
    next.insert(code, kind);
    *guard = Arc::new(next);
}

/// Current registrations
pub fn snapshot() -> Snapshot {
    Arc::clone(&REGISTRY.read().unwrap_or_else(PoisonError::into_inner))
}

/// Kind registered for the error's native code, or [`DEFAULT_KIND`]
pub fn kind_for(error: &EngineError) -> ErrorKind {
    snapshot().get(&error.code).copied().unwrap_or(DEFAULT_KIND)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unregistered_code_falls_back_to_default() {
        let err = EngineError::new("registry-test.never-registered", "boom");
        assert_eq!(kind_for(&err), ErrorKind::InvalidCommand);
    }

    #[test]
    fn test_register_and_lookup() {
        register("registry-test.check", ErrorKind::CheckConstraintViolation);
        let err = EngineError::new("registry-test.check", "violates check");
        assert_eq!(kind_for(&err), ErrorKind::CheckConstraintViolation);
    }

    #[test]
    fn test_reregistering_replaces_kind() {
        register("registry-test.replace", ErrorKind::NotNullConstraintViolation);
        register("registry-test.replace", ErrorKind::UniqueConstraintViolation);
        let err = EngineError::new("registry-test.replace", "dup");
        assert_eq!(kind_for(&err), ErrorKind::UniqueConstraintViolation);
    }

    #[test]
    fn test_snapshot_is_not_affected_by_later_registration() {
        let before = snapshot();
        register("registry-test.later", ErrorKind::ForeignKeyConstraintViolation);
        assert!(!before.contains_key("registry-test.later"));
        assert!(snapshot().contains_key("registry-test.later"));
    }
}
