//! Conversion between entities and records.

use crate::error::ModelError;
use crate::record::{Record, Value};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;

/// Domain object stored by a [`Repository`](crate::Repository).
///
/// Only the identity is required. Entities that keep timestamps expose them
/// through `created_at_mut` / `updated_at_mut` and the repository fills them
/// in on create and update.
///
/// # Example
///
/// ```
/// use chrono::{DateTime, Utc};
/// use serde::{Deserialize, Serialize};
/// use tidepool::{Entity, Value};
///
/// #[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// struct User {
///     id: Option<i64>,
///     name: String,
///     #[serde(default)]
///     updated_at: Option<DateTime<Utc>>,
/// }
///
/// impl Entity for User {
///     fn id(&self) -> Option<Value> {
///         self.id.map(Value::from)
///     }
///
///     fn updated_at_mut(&mut self) -> Option<&mut Option<DateTime<Utc>>> {
///         Some(&mut self.updated_at)
///     }
/// }
/// ```
pub trait Entity: Clone + Send + Sync {
    /// Identity value, `None` until the entity is persisted
    fn id(&self) -> Option<Value>;

    fn created_at_mut(&mut self) -> Option<&mut Option<DateTime<Utc>>> {
        None
    }

    fn updated_at_mut(&mut self) -> Option<&mut Option<DateTime<Utc>>> {
        None
    }
}

/// Describes how one entity type is stored
pub trait Mapping: Send + Sync {
    type Entity;

    /// Table name
    fn name(&self) -> &str;

    /// Identity column
    fn identity(&self) -> &str;

    fn serialize(&self, entity: &Self::Entity) -> Result<Record, ModelError>;

    fn deserialize(&self, records: Vec<Record>) -> Result<Vec<Self::Entity>, ModelError>;
}

/// [`Mapping`] for any serde (de)serializable entity.
///
/// Fields map one to one onto columns. Extra columns in a record (joined
/// `table.column` keys, for instance) are ignored on the way back unless the
/// entity denies unknown fields.
pub struct SerdeMapping<E> {
    name: String,
    identity: String,
    _entity: PhantomData<fn() -> E>,
}

impl<E> SerdeMapping<E> {
    /// Mapping for `table` with the identity column `id`
    pub fn new(table: impl Into<String>) -> Self {
        Self::with_identity(table, "id")
    }

    pub fn with_identity(table: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            name: table.into(),
            identity: identity.into(),
            _entity: PhantomData,
        }
    }
}

impl<E> Clone for SerdeMapping<E> {
    fn clone(&self) -> Self {
        Self::with_identity(self.name.clone(), self.identity.clone())
    }
}

impl<E> fmt::Debug for SerdeMapping<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerdeMapping")
            .field("name", &self.name)
            .field("identity", &self.identity)
            .finish()
    }
}

impl<E> Mapping for SerdeMapping<E>
where
    E: Serialize + DeserializeOwned,
{
    type Entity = E;

    fn name(&self) -> &str {
        &self.name
    }

    fn identity(&self) -> &str {
        &self.identity
    }

    fn serialize(&self, entity: &E) -> Result<Record, ModelError> {
        match serde_json::to_value(entity)? {
            Value::Object(record) => Ok(record),
            other => Err(ModelError::Mapping(format!(
                "entity for '{}' must serialize to an object, got {other}",
                self.name
            ))),
        }
    }

    fn deserialize(&self, records: Vec<Record>) -> Result<Vec<E>, ModelError> {
        records
            .into_iter()
            .map(|record| serde_json::from_value(Value::Object(record)).map_err(ModelError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Post {
        id: Option<i64>,
        title: String,
    }

    #[test]
    fn test_serialize_to_record() {
        let mapping = SerdeMapping::<Post>::new("posts");
        let record = mapping
            .serialize(&Post { id: None, title: "hello".into() })
            .unwrap();
        assert_eq!(record["id"], Value::Null);
        assert_eq!(record["title"], json!("hello"));
    }

    #[test]
    fn test_deserialize_ignores_joined_columns() {
        let mapping = SerdeMapping::<Post>::new("posts");
        let record = crate::record::record([
            ("id", json!(1)),
            ("title", json!("hello")),
            ("comments.body", json!("nice")),
        ]);
        let posts = mapping.deserialize(vec![record]).unwrap();
        assert_eq!(posts, vec![Post { id: Some(1), title: "hello".into() }]);
    }

    #[test]
    fn test_deserialize_reports_mapping_error() {
        let mapping = SerdeMapping::<Post>::new("posts");
        let record = crate::record::record([("id", json!("not a number"))]);
        let err = mapping.deserialize(vec![record]).unwrap_err();
        assert!(matches!(err, ModelError::Mapping(_)));
    }

    #[test]
    fn test_non_object_entity_is_rejected() {
        let mapping = SerdeMapping::<i64>::new("numbers");
        assert!(matches!(mapping.serialize(&3), Err(ModelError::Mapping(_))));
    }
}
