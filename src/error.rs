// 🚨 Error types for the competency importer
//
// Fatal errors abort a whole import run. Per-row problems never show up here:
// the resolver turns them into log lines and error counts.

use std::path::PathBuf;

use thiserror::Error;

use crate::entities::{FrameworkId, NodeId, ScaleId};

/// Errors raised by a record store implementation
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// (framework, external id) must be unique; the caller is expected to check first
    #[error("external id {external_id} already exists in framework {framework_id}")]
    DuplicateExternalId {
        framework_id: FrameworkId,
        external_id: String,
    },

    #[error("framework id number {0} already exists")]
    DuplicateFramework(String),

    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    #[error("framework {0} not found")]
    FrameworkNotFound(FrameworkId),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors that abort an entire import run
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("could not read {}: {source}", path.display())]
    FileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no source file was provided")]
    NoSourceFile,

    #[error("unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("unsupported delimiter: {0}")]
    UnsupportedDelimiter(String),

    #[error("required columns not found: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("malformed CSV header: {0}")]
    Csv(#[from] csv::Error),

    #[error("competency framework {0} does not exist")]
    FrameworkNotFound(FrameworkId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why a single row could not be applied. Captured into the run log and
/// error counter; never propagated past the resolver.
#[derive(Error, Debug)]
pub enum RowError {
    #[error("row has no external id")]
    MissingExternalId,

    #[error("unrecognized level {parent} for competency {external_id}")]
    UnrecognizedLevel { external_id: String, parent: String },

    #[error("parent level {parent} not available for competency {external_id}")]
    ParentUnavailable { external_id: String, parent: String },

    #[error("external id {0} already belongs to a level")]
    ExternalIdIsLevel(String),

    #[error("external id {0} already belongs to a competency")]
    ExternalIdIsCompetency(String),

    #[error("unreadable record: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from framework creation
#[derive(Error, Debug)]
pub enum FrameworkError {
    #[error("a competency framework with id number {0} already exists")]
    DuplicateId(String),

    #[error("scale {0} does not exist")]
    ScaleNotFound(ScaleId),

    #[error("scale {scale_id} has {values} value(s); at least 2 are required")]
    ScaleTooSmall { scale_id: ScaleId, values: usize },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors loading the TOML configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
