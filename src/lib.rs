// Patitas — animal-rescue ingestion engine
// Extracts structured rescue events from social posts and receipt scans via
// a vision model, resolves their timing, and reconciles them idempotently
// into a header-driven tabular store.

pub mod atoms;
pub mod engine;

pub use atoms::error::{RescueError, RescueResult};
pub use atoms::types::{
    Animal, AnimalProfile, AnimalStatus, Decoded, EventRecord, EventTuple, ExpenseCategory,
    ExpenseRecord, Interaction, LocationKind, Post, ReceiptFields, RelationKind, StoredFile,
};
pub use engine::codec::NameRules;
pub use engine::config::Config;
pub use engine::extraction::{Extractor, OpenAiVision, VisionModel};
pub use engine::ingest::{BatchRunner, BatchSummary, HttpMediaSource, MediaSource};
pub use engine::store::{Mutation, SqliteStore, Table, TabularStore};
