//! `MigrationRecord`: one row of the `tidepool_migrations` state table

use crate::migration::MigrationError;
use crate::record::Record;
use chrono::{DateTime, NaiveDateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub checksum: String,
    pub applied_at: DateTime<Utc>,
}

fn parse_applied_at(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .map(|naive| naive.and_utc())
}

impl MigrationRecord {
    /// Build a record from a decoded state table row
    pub fn from_record(row: &Record) -> Result<Self, MigrationError> {
        let field = |name: &str| {
            row.get(name).ok_or_else(|| {
                MigrationError::InvalidFormat(format!("state table row is missing '{name}'"))
            })
        };
        let text = |name: &str| {
            field(name)?.as_str().map(str::to_string).ok_or_else(|| {
                MigrationError::InvalidFormat(format!("state table column '{name}' is not text"))
            })
        };

        let version = field("version")?.as_i64().ok_or_else(|| {
            MigrationError::InvalidFormat("state table column 'version' is not an integer".into())
        })?;
        let applied_at = text("applied_at")?;
        let applied_at = parse_applied_at(&applied_at).ok_or_else(|| {
            MigrationError::InvalidFormat(format!(
                "Failed to parse timestamp '{applied_at}': unrecognized format"
            ))
        })?;

        Ok(Self {
            version,
            name: text("name")?,
            checksum: text("checksum")?,
            applied_at,
        })
    }
}
