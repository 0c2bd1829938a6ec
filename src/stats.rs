// 📊 Statistics / Result aggregation for one import run

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entities::{FrameworkId, NodeId};

/// Level external id -> internal node id, for the levels known to a run
pub type LevelMap = BTreeMap<String, NodeId>;

/// Highest canonical level number; buckets 0..=MAX_LEVEL always exist
pub const MAX_LEVEL: u32 = 5;

// ============================================================================
// COUNTERS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportStats {
    /// Rows considered by the run (rows of the other kind are not counted)
    pub total: usize,
    pub created: usize,
    /// Rows that resolved to an existing node, mutated or not
    pub skipped: usize,
    /// Subset of `skipped`: existing nodes rewritten because overwrite was on
    pub updated: usize,
    pub errors: usize,
    pub by_level: BTreeMap<u32, usize>,
}

impl Default for ImportStats {
    fn default() -> Self {
        ImportStats {
            total: 0,
            created: 0,
            skipped: 0,
            updated: 0,
            errors: 0,
            by_level: (0..=MAX_LEVEL).map(|level| (level, 0)).collect(),
        }
    }
}

impl ImportStats {
    pub fn new() -> Self {
        ImportStats::default()
    }

    /// Count a row under its numeric level tag (out-of-range tags get their own bucket)
    pub fn record_row(&mut self, level: u32) {
        self.total += 1;
        *self.by_level.entry(level).or_insert(0) += 1;
    }

    pub fn record_created(&mut self) {
        self.created += 1;
    }

    pub fn record_skipped(&mut self) {
        self.skipped += 1;
    }

    pub fn record_updated(&mut self) {
        self.skipped += 1;
        self.updated += 1;
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    pub fn level_count(&self, level: u32) -> usize {
        self.by_level.get(&level).copied().unwrap_or(0)
    }

    /// created + skipped + errors
    pub fn processed(&self) -> usize {
        self.created + self.skipped + self.errors
    }

    pub fn summary_line(&self) -> String {
        format!(
            "Import finished. Total: {} | Created: {} | Skipped: {} | Errors: {}",
            self.total, self.created, self.skipped, self.errors
        )
    }
}

// ============================================================================
// RESULT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    Levels,
    DefaultLevels,
    Competencies,
}

impl ImportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportMode::Levels => "levels",
            ImportMode::DefaultLevels => "default_levels",
            ImportMode::Competencies => "competencies",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportResult {
    pub run_id: String,
    pub mode: ImportMode,
    pub framework_id: FrameworkId,
    pub stats: ImportStats,
    /// Ordered, human-readable audit log; display is up to the caller
    pub messages: Vec<String>,
    /// SHA-256 of the raw input file, when one was read
    pub source_sha256: Option<String>,
}

impl ImportResult {
    pub fn new(mode: ImportMode, framework_id: FrameworkId) -> Self {
        ImportResult {
            run_id: uuid::Uuid::new_v4().to_string(),
            mode,
            framework_id,
            stats: ImportStats::new(),
            messages: Vec::new(),
            source_sha256: None,
        }
    }

    pub fn log(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    /// Level runs succeed when they leave at least one level behind and hit
    /// no errors; competency runs when at least one competency was created.
    pub fn is_success(&self) -> bool {
        match self.mode {
            ImportMode::Levels | ImportMode::DefaultLevels => {
                self.stats.errors == 0 && self.stats.created + self.stats.skipped > 0
            }
            ImportMode::Competencies => self.stats.created > 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_stats_have_all_canonical_buckets() {
        let stats = ImportStats::new();
        assert_eq!(stats.by_level.len(), 6);
        assert!(stats.by_level.values().all(|&c| c == 0));
    }

    #[test]
    fn test_out_of_range_level_gets_own_bucket() {
        let mut stats = ImportStats::new();
        stats.record_row(7);
        stats.record_row(2);

        assert_eq!(stats.total, 2);
        assert_eq!(stats.level_count(7), 1);
        assert_eq!(stats.level_count(2), 1);
        assert_eq!(stats.by_level.len(), 7);
    }

    #[test]
    fn test_update_counts_as_skipped() {
        let mut stats = ImportStats::new();
        stats.record_created();
        stats.record_skipped();
        stats.record_updated();
        stats.record_error();

        assert_eq!(stats.skipped, 2);
        assert_eq!(stats.updated, 1);
        assert_eq!(stats.processed(), 4);
        assert_eq!(
            stats.summary_line(),
            "Import finished. Total: 0 | Created: 1 | Skipped: 2 | Errors: 1"
        );
    }

    #[test]
    fn test_success_predicates() {
        let mut levels = ImportResult::new(ImportMode::Levels, 1);
        assert!(!levels.is_success());
        levels.stats.record_skipped();
        assert!(levels.is_success());
        levels.stats.record_error();
        assert!(!levels.is_success());

        let mut comps = ImportResult::new(ImportMode::Competencies, 1);
        comps.stats.record_skipped();
        assert!(!comps.is_success());
        comps.stats.record_created();
        assert!(comps.is_success());
    }
}
