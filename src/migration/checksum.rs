//! Checksum calculation for migration files

use crate::migration::MigrationError;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

/// Hexadecimal SHA-256 of migration content
pub fn checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Calculate SHA-256 checksum of a migration file
///
/// Used to detect migration files edited after being applied.
pub fn calculate_checksum(migration_file_path: &Path) -> Result<String, MigrationError> {
    let content = fs::read_to_string(migration_file_path).map_err(|e| {
        MigrationError::FileNotFound(format!(
            "Failed to read migration file {}: {e}",
            migration_file_path.display()
        ))
    })?;
    Ok(checksum(&content))
}

/// Validate checksum against stored value
pub fn validate_checksum(
    version: i64,
    name: &str,
    stored_checksum: &str,
    current_checksum: &str,
) -> Result<(), MigrationError> {
    if stored_checksum == current_checksum {
        Ok(())
    } else {
        Err(MigrationError::ChecksumMismatch {
            version,
            name: name.to_string(),
            stored: stored_checksum.to_string(),
            current: current_checksum.to_string(),
        })
    }
}
