//! Domain-layer errors.
//!
//! Rule violations detected by pure domain logic (path invariants, value
//! parsing). Handlers surface these as protocol `error` frames at the
//! boundary, so the `Display` text is the user-facing prose with no
//! layer prefixes. Repository failures are a different type (`RepoError`
//! in the engine); this one never carries I/O.

use thiserror::Error;

use crate::DirectionParseError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Input failed a structural check (empty name, missing steps).
    #[error("{0}")]
    Validation(String),

    /// A rule of the world model was violated (non-adjacent rooms, a step
    /// crossing maps, a recorded direction that disagrees with geometry).
    #[error("{0}")]
    Constraint(String),

    /// A referenced entity is not part of the model being checked.
    #[error("Unknown {entity}: {id}")]
    UnknownEntity { entity: &'static str, id: String },

    /// A value failed to parse into a domain type.
    #[error("{0}")]
    Parse(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn constraint(msg: impl Into<String>) -> Self {
        Self::Constraint(msg.into())
    }

    pub fn unknown_entity(entity: &'static str, id: impl Into<String>) -> Self {
        Self::UnknownEntity {
            entity,
            id: id.into(),
        }
    }
}

impl From<DirectionParseError> for DomainError {
    fn from(err: DirectionParseError) -> Self {
        Self::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_text_is_the_bare_prose() {
        let err = DomainError::constraint("Those rooms are not adjacent");
        assert_eq!(err.to_string(), "Those rooms are not adjacent");

        let err = DomainError::validation("A path needs a name");
        assert_eq!(err.to_string(), "A path needs a name");
    }

    #[test]
    fn unknown_entity_names_what_was_missing() {
        let err = DomainError::unknown_entity("room", "r-17");
        assert!(matches!(err, DomainError::UnknownEntity { .. }));
        assert_eq!(err.to_string(), "Unknown room: r-17");
    }

    #[test]
    fn direction_parse_errors_convert() {
        let parse_err = "widdershins".parse::<crate::Direction>().unwrap_err();
        let err: DomainError = parse_err.into();
        assert!(matches!(err, DomainError::Parse(_)));
        assert!(err.to_string().contains("widdershins"));
    }
}
