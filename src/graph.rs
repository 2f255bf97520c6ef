use std::collections::HashSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Entity in the knowledge graph
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Entity {
    /// Unique name of the entity (serves as ID)
    pub name: String,

    /// Type of entity (person, organization, concept, etc.)
    #[serde(rename = "entityType")]
    pub entity_type: String,

    /// Observations (facts) about the entity, no duplicates
    pub observations: Vec<String>,
}

impl Entity {
    /// Case-insensitive substring match against name, type and observations.
    /// `needle` must already be lowercased.
    fn matches(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle)
            || self.entity_type.to_lowercase().contains(needle)
            || self
                .observations
                .iter()
                .any(|obs| obs.to_lowercase().contains(needle))
    }
}

/// Directed relation between two entities
///
/// Endpoints are plain names; they are not required to exist.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub struct Relation {
    /// Source entity name
    pub from: String,

    /// Target entity name
    pub to: String,

    /// Type of relation (works_at, knows, related_to, etc.)
    #[serde(rename = "relationType")]
    pub relation_type: String,
}

impl Relation {
    pub fn touches(&self, names: &HashSet<&str>) -> bool {
        names.contains(self.from.as_str()) || names.contains(self.to.as_str())
    }
}

/// Complete knowledge graph
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub struct KnowledgeGraph {
    pub entities: Vec<Entity>,
    pub relations: Vec<Relation>,
}

impl KnowledgeGraph {
    pub fn entity_mut(&mut self, name: &str) -> Option<&mut Entity> {
        self.entities.iter_mut().find(|e| e.name == name)
    }

    /// Entities matching `query` (case-insensitive) plus the relations among them.
    pub fn search(&self, query: &str) -> KnowledgeGraph {
        let needle = query.to_lowercase();
        self.subgraph(|e| e.matches(&needle))
    }

    /// Entities whose name is in `names` plus the relations among them.
    pub fn open(&self, names: &[String]) -> KnowledgeGraph {
        let wanted: HashSet<&str> = names.iter().map(String::as_str).collect();
        self.subgraph(|e| wanted.contains(e.name.as_str()))
    }

    /// Keeps selected entities and only relations with both endpoints selected.
    fn subgraph(&self, mut select: impl FnMut(&Entity) -> bool) -> KnowledgeGraph {
        let entities: Vec<Entity> = self.entities.iter().filter(|e| select(e)).cloned().collect();
        let names: HashSet<&str> = entities.iter().map(|e| e.name.as_str()).collect();
        let relations = self
            .relations
            .iter()
            .filter(|r| names.contains(r.from.as_str()) && names.contains(r.to.as_str()))
            .cloned()
            .collect();
        KnowledgeGraph {
            entities,
            relations,
        }
    }
}

/// Input for adding observations to an entity
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ObservationInput {
    #[serde(rename = "entityName")]
    pub entity_name: String,
    pub contents: Vec<String>,
}

/// Result of adding observations
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ObservationResult {
    #[serde(rename = "entityName")]
    pub entity_name: String,
    #[serde(rename = "addedObservations")]
    pub added_observations: Vec<String>,
}

/// Input for deleting observations from an entity
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ObservationDeletion {
    #[serde(rename = "entityName")]
    pub entity_name: String,
    pub observations: Vec<String>,
}
