//! Persistence for the knowledge graph.
//!
//! The on-disk format is one JSON record per line, tagged by a `type` field:
//!
//! ```text
//! {"type":"entity","name":"Alice","entityType":"person","observations":["likes tea"]}
//! {"type":"relation","from":"Alice","to":"Bob","relationType":"knows"}
//! ```
//!
//! Entities are written first, then relations, each in graph order. Blank
//! lines are ignored on read.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use serde_json::Value;

use crate::error::{MemoryError, Result};
use crate::graph::{Entity, KnowledgeGraph, Relation};

/// Full load/save cycle over some backing store.
pub trait GraphStorage: Send + Sync {
    /// Read the whole graph. A missing backing store yields an empty graph.
    fn load(&self) -> Result<KnowledgeGraph>;

    /// Replace the whole persisted graph.
    fn save(&self, graph: &KnowledgeGraph) -> Result<()>;
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum RecordRef<'a> {
    Entity(&'a Entity),
    Relation(&'a Relation),
}

/// serde_json's message without its " at line L column C" suffix; the
/// position it reports is relative to the single line being parsed.
fn json_reason(err: &serde_json::Error) -> String {
    let msg = err.to_string();
    if err.line() == 0 {
        return msg;
    }
    let suffix = format!(" at line {} column {}", err.line(), err.column());
    match msg.strip_suffix(&suffix) {
        Some(bare) => format!("{} (column {})", bare, err.column()),
        None => msg,
    }
}

/// Parse the line-oriented representation.
///
/// Invalid JSON and `entity`/`relation` records of the wrong shape are fatal.
/// Lines with any other `type` are skipped. Duplicate entities and relations
/// keep their first copy and repeated observations are dropped, so files
/// written by older tools still load and can be repaired through the API.
pub fn parse_graph(text: &str) -> Result<KnowledgeGraph> {
    let mut graph = KnowledgeGraph::default();
    let mut names = HashSet::new();
    let mut triples = HashSet::new();

    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let line_no = idx + 1;
        let malformed = |err: serde_json::Error| MemoryError::MalformedRecord {
            line: line_no,
            reason: json_reason(&err),
        };

        let value: Value = serde_json::from_str(line).map_err(malformed)?;
        let record_type = value.get("type").and_then(Value::as_str).map(str::to_owned);
        match record_type.as_deref() {
            Some("entity") => {
                let mut entity: Entity = serde_json::from_value(value).map_err(malformed)?;
                if !names.insert(entity.name.clone()) {
                    tracing::warn!(line = line_no, name = %entity.name, "Skipping duplicate entity");
                    continue;
                }
                let mut seen = HashSet::new();
                let before = entity.observations.len();
                entity.observations.retain(|obs| seen.insert(obs.clone()));
                if entity.observations.len() != before {
                    tracing::warn!(line = line_no, name = %entity.name, "Dropped repeated observations");
                }
                graph.entities.push(entity);
            }
            Some("relation") => {
                let relation: Relation = serde_json::from_value(value).map_err(malformed)?;
                if !triples.insert(relation.clone()) {
                    tracing::warn!(
                        line = line_no,
                        from = %relation.from,
                        to = %relation.to,
                        relation_type = %relation.relation_type,
                        "Skipping duplicate relation"
                    );
                    continue;
                }
                graph.relations.push(relation);
            }
            other => {
                tracing::debug!(line = line_no, record_type = ?other, "Skipping unknown record");
            }
        }
    }

    Ok(graph)
}

/// Serialize entities then relations, one record per line, no trailing newline.
pub fn serialize_graph(graph: &KnowledgeGraph) -> serde_json::Result<String> {
    let records = graph
        .entities
        .iter()
        .map(RecordRef::Entity)
        .chain(graph.relations.iter().map(RecordRef::Relation));

    let mut lines = Vec::with_capacity(graph.entities.len() + graph.relations.len());
    for record in records {
        lines.push(serde_json::to_string(&record)?);
    }
    Ok(lines.join("\n"))
}

/// File-backed storage. Every save rewrites the whole file via temp file + rename.
#[derive(Debug, Clone)]
pub struct JsonlStorage {
    path: PathBuf,
}

impl JsonlStorage {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if path.file_name().is_none() {
            return Err(MemoryError::InvalidArgument(format!(
                "Memory file path '{}' has no file name",
                path.display()
            )));
        }
        if path.is_dir() {
            return Err(MemoryError::InvalidArgument(format!(
                "Memory file path '{}' is a directory",
                path.display()
            )));
        }
        Ok(Self { path })
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn write_atomic(&self, contents: &[u8]) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.temp_path();
        let written = (|| {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(contents)?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)
        })();

        if written.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        written
    }
}

impl GraphStorage for JsonlStorage {
    fn load(&self) -> Result<KnowledgeGraph> {
        match fs::read_to_string(&self.path) {
            Ok(text) => parse_graph(&text),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "Memory file missing, starting empty");
                Ok(KnowledgeGraph::default())
            }
            Err(err) => Err(MemoryError::storage(&self.path, err)),
        }
    }

    fn save(&self, graph: &KnowledgeGraph) -> Result<()> {
        let text = serialize_graph(graph).map_err(|e| MemoryError::storage(&self.path, e.into()))?;
        self.write_atomic(text.as_bytes())
            .map_err(|e| MemoryError::storage(&self.path, e))?;

        tracing::debug!(
            path = %self.path.display(),
            entities = graph.entities.len(),
            relations = graph.relations.len(),
            "Knowledge graph saved"
        );
        Ok(())
    }
}

/// In-process storage holding the serialized text, for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    contents: Mutex<Option<String>>,
    saves: AtomicUsize,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing serialized contents.
    pub fn with_contents(text: impl Into<String>) -> Self {
        Self {
            contents: Mutex::new(Some(text.into())),
            saves: AtomicUsize::new(0),
        }
    }

    /// Current serialized contents, `None` until the first save.
    pub fn contents(&self) -> Option<String> {
        self.contents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of completed saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl GraphStorage for InMemoryStorage {
    fn load(&self) -> Result<KnowledgeGraph> {
        match self.contents() {
            Some(text) => parse_graph(&text),
            None => Ok(KnowledgeGraph::default()),
        }
    }

    fn save(&self, graph: &KnowledgeGraph) -> Result<()> {
        let text = serialize_graph(graph)
            .map_err(|e| MemoryError::storage("<memory>", e.into()))?;
        *self.contents.lock().unwrap_or_else(PoisonError::into_inner) = Some(text);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
