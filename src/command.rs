//! Writes against a scoped collection.

use crate::collection::Collection;
use crate::error::{registry, ModelError};
use crate::mapping::Mapping;
use crate::scope::Scope;

/// Performs one write per call against an already scoped [`Collection`].
///
/// Engine failures are translated through the [error registry](registry):
/// a registered native code becomes the matching constraint violation,
/// anything else becomes [`ModelError::InvalidCommand`]. The engine message
/// is kept in both cases.
#[derive(Debug, Clone)]
pub struct Command<S, M> {
    collection: Collection<S, M>,
}

impl<S, M> Command<S, M>
where
    S: Scope,
    M: Mapping,
{
    pub fn new(collection: Collection<S, M>) -> Self {
        Self { collection }
    }

    pub fn create(&self, entity: &M::Entity) -> Result<M::Entity, ModelError> {
        log::debug!("create in '{}'", self.collection.table_name());
        self.collection.insert(entity).map_err(translate)
    }

    pub fn update(&self, entity: &M::Entity) -> Result<M::Entity, ModelError> {
        log::debug!("update in '{}'", self.collection.table_name());
        self.collection.update(entity).map_err(translate)
    }

    pub fn delete(&self) -> Result<u64, ModelError> {
        log::debug!("delete from '{}'", self.collection.table_name());
        self.collection.delete().map_err(translate)
    }

    /// Alias for [`delete`](Self::delete)
    pub fn clear(&self) -> Result<u64, ModelError> {
        self.delete()
    }
}

/// Map an engine error to its registered kind; other errors pass through
pub fn translate(err: ModelError) -> ModelError {
    match err {
        ModelError::Engine(engine) => {
            let kind = registry::kind_for(&engine);
            log::debug!("translated engine error {engine} into {kind:?}");
            kind.into_error(engine.message)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EngineError, ErrorKind};

    #[test]
    fn test_translate_registered_code() {
        registry::register("command-test.check", ErrorKind::CheckConstraintViolation);
        let err = translate(ModelError::Engine(EngineError::new(
            "command-test.check",
            "age must be positive",
        )));
        assert_eq!(
            err,
            ModelError::CheckConstraintViolation("age must be positive".to_string())
        );
    }

    #[test]
    fn test_translate_unknown_code_is_invalid_command() {
        let err = translate(ModelError::Engine(EngineError::new("command-test.unknown", "nope")));
        assert_eq!(err, ModelError::InvalidCommand("nope".to_string()));
    }

    #[test]
    fn test_translate_passes_other_errors_through() {
        let err = translate(ModelError::Mapping("bad".into()));
        assert_eq!(err, ModelError::Mapping("bad".into()));
    }
}
