//! Embedding rebuild engine for Inkling.
//!
//! Drives asynchronous, resumable re-embedding of sources, notes and
//! insights against a SQLite content store, tracking per-job progress for
//! polling clients.

pub mod chunker;
pub mod collect;
pub mod engine;
pub mod errors;
pub mod jobs;
pub mod provider;
pub mod rebuild;
pub mod storage;
pub mod vectorize;

pub use inkling_core::EmbedSettings;

pub use chunker::Chunk;
pub use collect::{CollectedItems, collect_items, estimate_items};
pub use engine::EmbedEngine;
pub use errors::{EmbedError, EmbedResult};
pub use jobs::{JobStatus, JobTracker, JobView, RebuildJob};
pub use provider::{EmbeddingProvider, OllamaEmbedder};
pub use rebuild::{ItemKind, RebuildAccepted, RebuildMode, RebuildRequest, SingleEmbedReport};
pub use storage::{ContentStore, InsightRecord, NoteRecord, SourceRecord};
