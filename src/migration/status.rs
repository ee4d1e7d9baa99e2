//! Migration status tracking

use crate::migration::{MigrationFile, MigrationRecord};

/// Applied and pending migrations
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    /// Applied migrations (from database), oldest first
    pub applied: Vec<MigrationRecord>,
    /// Pending migrations (from file system), oldest first
    pub pending: Vec<MigrationFile>,
}

impl MigrationStatus {
    #[must_use]
    pub fn new(applied: Vec<MigrationRecord>, pending: Vec<MigrationFile>) -> Self {
        Self { applied, pending }
    }

    #[must_use]
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }

    #[must_use]
    pub fn latest_applied_version(&self) -> Option<i64> {
        self.applied.iter().map(|m| m.version).max()
    }

    #[must_use]
    pub fn next_pending_version(&self) -> Option<i64> {
        self.pending.first().map(|m| m.version)
    }
}
