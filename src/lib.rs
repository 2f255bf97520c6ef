//! Persistent knowledge graph of named entities and typed relations,
//! stored as one JSON record per line and served over MCP.

pub mod config;
pub mod error;
pub mod graph;
pub mod logging;
pub mod manager;
pub mod storage;
pub mod validation;

pub use error::MemoryError;
pub use graph::{Entity, KnowledgeGraph, ObservationDeletion, ObservationInput, Relation};
pub use manager::KnowledgeGraphManager;
