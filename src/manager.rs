use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{MemoryError, Result};
use crate::graph::{
    Entity, KnowledgeGraph, ObservationDeletion, ObservationInput, ObservationResult, Relation,
};
use crate::storage::{GraphStorage, JsonlStorage};
use crate::validation;

/// Manager for knowledge graph operations
///
/// Every call loads the full graph from storage, works on that snapshot and,
/// for mutations, writes the full graph back. Mutations are serialized within
/// the process so concurrent tool calls cannot lose each other's updates.
pub struct KnowledgeGraphManager {
    storage: Arc<dyn GraphStorage>,
    write_lock: Mutex<()>,
}

impl KnowledgeGraphManager {
    /// Create manager over a line-delimited JSON file at `path`
    pub fn new(path: PathBuf) -> Result<Self> {
        Ok(Self::with_storage(Arc::new(JsonlStorage::new(path)?)))
    }

    pub fn with_storage(storage: Arc<dyn GraphStorage>) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    /// Run a storage cycle on the blocking pool, off the async workers.
    async fn blocking<T: Send + 'static>(
        &self,
        cycle: impl FnOnce(&dyn GraphStorage) -> Result<T> + Send + 'static,
    ) -> Result<T> {
        let storage = Arc::clone(&self.storage);
        match tokio::task::spawn_blocking(move || cycle(storage.as_ref())).await {
            Ok(result) => result,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(err) => Err(MemoryError::storage("<blocking task>", std::io::Error::other(err))),
        }
    }

    /// Load, let `mutate` edit the snapshot, save if it reports a change.
    async fn mutate<T: Send + 'static>(
        &self,
        mutate: impl FnOnce(&mut KnowledgeGraph) -> Result<(T, bool)> + Send + 'static,
    ) -> Result<T> {
        let _guard = self.write_lock.lock().await;
        self.blocking(move |storage| {
            let mut graph = storage.load()?;
            let (out, changed) = mutate(&mut graph)?;
            if changed {
                storage.save(&graph)?;
            }
            Ok(out)
        })
        .await
    }

    /// Create entities (returns only newly created entities)
    pub async fn create_entities(&self, entities: Vec<Entity>) -> Result<Vec<Entity>> {
        entities.iter().try_for_each(validation::validate_entity)?;

        let created = self
            .mutate(move |graph| {
                let mut names: HashSet<String> =
                    graph.entities.iter().map(|e| e.name.clone()).collect();
                let new_entities: Vec<Entity> = entities
                    .into_iter()
                    .filter(|e| names.insert(e.name.clone()))
                    .collect();
                graph.entities.extend(new_entities.iter().cloned());
                let changed = !new_entities.is_empty();
                Ok((new_entities, changed))
            })
            .await?;

        tracing::debug!(count = created.len(), "Created entities");
        Ok(created)
    }

    /// Create relations (returns only newly created relations)
    ///
    /// Endpoints are not checked against existing entities.
    pub async fn create_relations(&self, relations: Vec<Relation>) -> Result<Vec<Relation>> {
        relations.iter().try_for_each(validation::validate_relation)?;

        let created = self
            .mutate(move |graph| {
                let mut existing: HashSet<Relation> = graph.relations.iter().cloned().collect();
                let new_relations: Vec<Relation> = relations
                    .into_iter()
                    .filter(|r| existing.insert(r.clone()))
                    .collect();
                graph.relations.extend(new_relations.iter().cloned());
                let changed = !new_relations.is_empty();
                Ok((new_relations, changed))
            })
            .await?;

        tracing::debug!(count = created.len(), "Created relations");
        Ok(created)
    }

    /// Add observations to multiple entities (batch operation)
    ///
    /// Fails with `EntityNotFound` if any named entity is missing; nothing is saved then.
    pub async fn add_observations(
        &self,
        inputs: Vec<ObservationInput>,
    ) -> Result<Vec<ObservationResult>> {
        inputs.iter().try_for_each(validation::validate_observation_input)?;

        self.mutate(move |graph| {
            let mut results = Vec::with_capacity(inputs.len());
            for input in inputs {
                let entity = graph
                    .entity_mut(&input.entity_name)
                    .ok_or_else(|| MemoryError::EntityNotFound(input.entity_name.clone()))?;

                let mut added = Vec::new();
                for obs in input.contents {
                    if !entity.observations.contains(&obs) {
                        entity.observations.push(obs.clone());
                        added.push(obs);
                    }
                }

                results.push(ObservationResult {
                    entity_name: input.entity_name,
                    added_observations: added,
                });
            }
            let changed = results.iter().any(|r| !r.added_observations.is_empty());
            Ok((results, changed))
        })
        .await
    }

    /// Delete entities and every relation touching them; unknown names are ignored
    pub async fn delete_entities(&self, names: Vec<String>) -> Result<usize> {
        let count = self
            .mutate(move |graph| {
                let doomed: HashSet<&str> = names.iter().map(String::as_str).collect();
                let entities_before = graph.entities.len();
                let relations_before = graph.relations.len();

                graph.entities.retain(|e| !doomed.contains(e.name.as_str()));
                graph.relations.retain(|r| !r.touches(&doomed));

                let removed = entities_before - graph.entities.len();
                let changed = removed > 0 || relations_before != graph.relations.len();
                Ok((removed, changed))
            })
            .await?;

        tracing::debug!(count, "Deleted entities");
        Ok(count)
    }

    /// Delete observations from multiple entities (batch operation)
    ///
    /// Deletions naming a missing entity are skipped.
    pub async fn delete_observations(&self, deletions: Vec<ObservationDeletion>) -> Result<()> {
        self.mutate(move |graph| {
            let mut changed = false;
            for deletion in &deletions {
                let Some(entity) = graph.entity_mut(&deletion.entity_name) else {
                    continue;
                };
                let before = entity.observations.len();
                entity
                    .observations
                    .retain(|obs| !deletion.observations.contains(obs));
                changed |= before != entity.observations.len();
            }
            Ok(((), changed))
        })
        .await
    }

    /// Delete relations matching the given triples exactly; unknown triples are ignored
    pub async fn delete_relations(&self, relations: Vec<Relation>) -> Result<usize> {
        let count = self
            .mutate(move |graph| {
                let doomed: HashSet<&Relation> = relations.iter().collect();
                let before = graph.relations.len();
                graph.relations.retain(|r| !doomed.contains(r));
                let removed = before - graph.relations.len();
                Ok((removed, removed > 0))
            })
            .await?;

        tracing::debug!(count, "Deleted relations");
        Ok(count)
    }

    /// Read entire knowledge graph
    pub async fn read_graph(&self) -> Result<KnowledgeGraph> {
        self.blocking(|storage| storage.load()).await
    }

    /// Case-insensitive substring search over names, types and observations
    pub async fn search_nodes(&self, query: String) -> Result<KnowledgeGraph> {
        tracing::debug!(query = %query, "Searching nodes");
        let result = self
            .blocking(move |storage| Ok(storage.load()?.search(&query)))
            .await?;
        tracing::debug!(
            entities = result.entities.len(),
            relations = result.relations.len(),
            "Searched nodes"
        );
        Ok(result)
    }

    /// Open specific nodes by names
    pub async fn open_nodes(&self, names: Vec<String>) -> Result<KnowledgeGraph> {
        self.blocking(move |storage| Ok(storage.load()?.open(&names)))
            .await
    }
}
