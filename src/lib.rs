// Competency Catalog Importer - Core Library
// Exposes the import pipeline for the CLI, embedders, and tests

pub mod config;
pub mod context;
pub mod db;
pub mod decoder;
pub mod entities;
pub mod error;
pub mod importer;
pub mod levels;
pub mod parser;
pub mod resolver;
pub mod stats;
pub mod store;

// Re-export commonly used types
pub use config::ImporterConfig;
pub use context::{AuditContext, Clock};
pub use db::{get_events_for_entity, insert_event, setup_database, Event, SqliteStore};
pub use decoder::{decode, normalize_field, DecodedText, SourceEncoding};
pub use entities::{
    Framework, FrameworkDraft, FrameworkId,
    Node, NodeDraft, NodeId, NodeRole, Parent,
    Scale, ScaleConfiguration, ScaleId,
};
pub use error::{ConfigError, FrameworkError, ImportError, RowError, StoreError, StoreResult};
pub use importer::{CsvOptions, Importer, NewFramework};
pub use levels::{provision_default_levels, provision_level, LevelScheme, LevelSpec, Provisioned, DEFAULT_PREFIX};
pub use parser::{Column, DelimitedSource, Delimiter, Record};
pub use resolver::{upsert_competency, CompetencyOptions, CompetencyRow, HierarchyResolver, UpsertOutcome};
pub use stats::{ImportMode, ImportResult, ImportStats, LevelMap, MAX_LEVEL};
pub use store::{MemoryStore, RecordStore, ScaleLookup};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
