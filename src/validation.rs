//! Checks on data entering the graph, applied before any storage access.
//!
//! Arguments that only select existing records (deletes, lookups) are not
//! checked, so anything that loads can also be addressed.

use std::collections::HashSet;

use crate::error::{MemoryError, Result};
use crate::graph::{Entity, ObservationInput, Relation};

// Validation constants
const MAX_NAME_LENGTH: usize = 256;
const MAX_TYPE_LENGTH: usize = 128;
const MAX_OBSERVATION_LENGTH: usize = 4096;

fn invalid(msg: String) -> MemoryError {
    MemoryError::InvalidArgument(msg)
}

/// Entity names and relation endpoints: non-empty, bounded, no control characters
pub fn validate_name(name: &str, field: &str) -> Result<()> {
    if name.is_empty() {
        return Err(invalid(format!("{} cannot be empty", field)));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(invalid(format!("{} too long (max {} chars)", field, MAX_NAME_LENGTH)));
    }
    if name.chars().any(char::is_control) {
        return Err(invalid(format!("{} contains invalid characters", field)));
    }
    Ok(())
}

/// Types are free text, but still non-empty and single-line
pub fn validate_type(type_str: &str, field: &str) -> Result<()> {
    if type_str.is_empty() {
        return Err(invalid(format!("{} cannot be empty", field)));
    }
    if type_str.len() > MAX_TYPE_LENGTH {
        return Err(invalid(format!("{} too long (max {} chars)", field, MAX_TYPE_LENGTH)));
    }
    if type_str.chars().any(char::is_control) {
        return Err(invalid(format!("{} contains invalid characters", field)));
    }
    Ok(())
}

pub fn validate_observation(obs: &str) -> Result<()> {
    if obs.len() > MAX_OBSERVATION_LENGTH {
        return Err(invalid(format!(
            "Observation too long (max {} chars)",
            MAX_OBSERVATION_LENGTH
        )));
    }
    if obs.contains('\0') {
        return Err(invalid("Observation contains null bytes".to_string()));
    }
    Ok(())
}

pub fn validate_entity(entity: &Entity) -> Result<()> {
    validate_name(&entity.name, "Entity name")?;
    validate_type(&entity.entity_type, "Entity type")?;
    let mut seen = HashSet::new();
    for obs in &entity.observations {
        validate_observation(obs)?;
        if !seen.insert(obs.as_str()) {
            return Err(invalid(format!(
                "Entity '{}' lists observation '{}' more than once",
                entity.name, obs
            )));
        }
    }
    Ok(())
}

pub fn validate_relation(rel: &Relation) -> Result<()> {
    validate_name(&rel.from, "From entity")?;
    validate_name(&rel.to, "To entity")?;
    validate_type(&rel.relation_type, "Relation type")
}

/// Only the new contents are checked; the entity name just selects a record.
pub fn validate_observation_input(input: &ObservationInput) -> Result<()> {
    input.contents.iter().try_for_each(|obs| validate_observation(obs))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(name: &str, entity_type: &str, observations: &[&str]) -> Entity {
        Entity {
            name: name.to_string(),
            entity_type: entity_type.to_string(),
            observations: observations.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn message(result: Result<()>) -> String {
        match result {
            Err(MemoryError::InvalidArgument(msg)) => msg,
            other => panic!("expected InvalidArgument, got {:?}", other),
        }
    }

    #[test]
    fn accepts_free_text_types() {
        assert!(validate_entity(&entity("Alice", "software engineer", &["a", "b"])).is_ok());
    }

    #[test]
    fn rejects_empty_name() {
        assert!(message(validate_entity(&entity("", "person", &[]))).contains("cannot be empty"));
    }

    #[test]
    fn rejects_long_name() {
        let long = "A".repeat(MAX_NAME_LENGTH + 1);
        assert!(message(validate_name(&long, "Entity name")).contains("too long"));
    }

    #[test]
    fn rejects_control_characters() {
        assert!(message(validate_name("Alice\0Bob", "Entity name")).contains("invalid characters"));
        assert!(message(validate_type("per\nson", "Entity type")).contains("invalid characters"));
    }

    #[test]
    fn rejects_long_observation() {
        let long = "A".repeat(MAX_OBSERVATION_LENGTH + 1);
        assert!(message(validate_observation(&long)).contains("too long"));
    }

    #[test]
    fn rejects_duplicate_observations_in_one_entity() {
        let msg = message(validate_entity(&entity("Alice", "person", &["x", "x"])));
        assert!(msg.contains("more than once"));
    }

    #[test]
    fn relation_endpoints_are_checked() {
        let rel = Relation {
            from: "Alice".to_string(),
            to: String::new(),
            relation_type: "knows".to_string(),
        };
        assert!(message(validate_relation(&rel)).contains("To entity"));
    }
}
