//! Migration file discovery and parsing

use crate::migration::checksum::checksum;
use crate::migration::MigrationError;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

const UP_MARKER: &str = "-- migrate:up";
const DOWN_MARKER: &str = "-- migrate:down";

/// A discovered migration file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    pub path: PathBuf,
    /// Migration version (timestamp: YYYYMMDDHHMMSS)
    pub version: i64,
    pub name: String,
    /// SHA-256 checksum of the whole file
    pub checksum: String,
    /// SQL under `-- migrate:up`
    pub up: String,
    /// SQL under `-- migrate:down`, empty when absent
    pub down: String,
}

impl MigrationFile {
    /// Read and parse a migration file
    pub fn load(path: &Path) -> Result<Self, MigrationError> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| MigrationError::InvalidFormat(format!("Invalid filename: {}", path.display())))?;
        let (version, name) = Self::parse_filename(filename)?;

        let content = fs::read_to_string(path).map_err(|e| {
            MigrationError::FileNotFound(format!("Failed to read {}: {e}", path.display()))
        })?;
        let (up, down) = split_sections(&content).ok_or_else(|| {
            MigrationError::InvalidFormat(format!("{filename} has no '{UP_MARKER}' section"))
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            version,
            name,
            checksum: checksum(&content),
            up,
            down,
        })
    }

    /// Parse migration file name to extract version and name
    ///
    /// Expected format: `m{YYYYMMDDHHMMSS}_{name}.sql`, e.g.
    /// `m20240120120000_create_users.sql` gives `(20240120120000, "create_users")`.
    pub fn parse_filename(filename: &str) -> Result<(i64, String), MigrationError> {
        let re = Regex::new(r"^m(\d{14})_(\w+)\.sql$")
            .map_err(|e| MigrationError::InvalidFormat(format!("Invalid regex: {e}")))?;

        let invalid = || {
            MigrationError::InvalidFormat(format!(
                "Migration file name '{filename}' does not match expected pattern: m{{YYYYMMDDHHMMSS}}_{{name}}.sql"
            ))
        };
        let caps = re.captures(filename).ok_or_else(invalid)?;
        let (version, name) = match (caps.get(1), caps.get(2)) {
            (Some(version), Some(name)) => (version.as_str(), name.as_str()),
            _ => return Err(invalid()),
        };
        let version = version.parse::<i64>().map_err(|_| invalid())?;

        Ok((version, name.to_string()))
    }
}

/// Split content into its up and down SQL.
///
/// Returns `None` without an up marker. Text before the up marker is ignored.
pub fn split_sections(content: &str) -> Option<(String, String)> {
    let (_, rest) = content.split_once(UP_MARKER)?;
    let (up, down) = rest.split_once(DOWN_MARKER).unwrap_or((rest, ""));
    Some((up.trim().to_string(), down.trim().to_string()))
}

/// Discover all migration files in a directory
///
/// Scans for `*.sql` files, parses them and returns them sorted by version
/// (oldest first). Two files with the same version are an error.
pub fn discover_migrations(migrations_dir: &Path) -> Result<Vec<MigrationFile>, MigrationError> {
    if !migrations_dir.is_dir() {
        return Err(MigrationError::FileNotFound(
            migrations_dir.to_string_lossy().to_string(),
        ));
    }

    let entries = fs::read_dir(migrations_dir).map_err(|e| {
        MigrationError::FileNotFound(format!(
            "Failed to read migrations directory {}: {e}",
            migrations_dir.display()
        ))
    })?;

    let mut migrations = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| MigrationError::FileNotFound(format!("Failed to read directory entry: {e}")))?
            .path();

        if path.extension().and_then(|s| s.to_str()) != Some("sql") {
            continue;
        }
        migrations.push(MigrationFile::load(&path)?);
    }

    migrations.sort_by_key(|m| m.version);
    if let Some(pair) = migrations.windows(2).find(|w| w[0].version == w[1].version) {
        return Err(MigrationError::InvalidFormat(format!(
            "Duplicate migration version {} ({} and {})",
            pair[0].version, pair[0].name, pair[1].name
        )));
    }

    Ok(migrations)
}
