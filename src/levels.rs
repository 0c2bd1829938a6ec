// 🪜 Levels - canonical level identifiers and the Level Provisioner
//
// A framework with prefix P has up to six canonical levels:
//   P-NIVEL-1 .. P-NIVEL-5   proficiency tiers
//   P-SIN-NIVEL              "unassigned"
// and level CSV rows hang from the framework-root sentinel P-PRINCIPAL.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::context::AuditContext;
use crate::entities::{FrameworkId, NodeDraft, NodeId};
use crate::error::RowError;
use crate::stats::{ImportMode, ImportResult, LevelMap, MAX_LEVEL};
use crate::store::RecordStore;

pub const DEFAULT_PREFIX: &str = "RENEC";

/// Severity-tiered description for a level number (0 = unassigned)
pub fn level_description(level: u32) -> &'static str {
    match level {
        0 => "Competencies with no assigned level",
        1 => "Basic level competencies - programmed, routine performance",
        2 => "Intermediate level competencies - programmed performance with the ability to respond to contingencies",
        3 => "Advanced level competencies - variable performance, supervising others",
        4 => "Superior level competencies - variable performance, responsible for the work of others and for resources",
        _ => "Specialized level competencies - highly specialized performance",
    }
}

// ============================================================================
// LEVEL SCHEME
// ============================================================================

/// What it takes to create one level node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSpec {
    pub external_id: String,
    pub name: String,
    pub description: String,
}

/// External-id conventions for one framework prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelScheme {
    prefix: String,
}

impl Default for LevelScheme {
    fn default() -> Self {
        LevelScheme::new(DEFAULT_PREFIX)
    }
}

impl LevelScheme {
    pub fn new(prefix: &str) -> Self {
        LevelScheme {
            prefix: prefix.trim().to_string(),
        }
    }

    /// Parent id carried by level rows in a level CSV
    pub fn root_id(&self) -> String {
        format!("{}-PRINCIPAL", self.prefix)
    }

    pub fn level_id(&self, level: u32) -> String {
        format!("{}-NIVEL-{}", self.prefix, level)
    }

    pub fn unassigned_id(&self) -> String {
        format!("{}-SIN-NIVEL", self.prefix)
    }

    fn numbered_suffix<'a>(&self, external_id: &'a str) -> Option<&'a str> {
        external_id
            .strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_prefix("-NIVEL-"))
    }

    /// Statistics bucket for a parent id: `P-NIVEL-<n>` -> n, anything else -> 0
    pub fn level_tag(&self, external_id: &str) -> u32 {
        self.numbered_suffix(external_id)
            .and_then(|n| n.parse::<u32>().ok())
            .unwrap_or(0)
    }

    /// True for ids following either canonical level pattern
    pub fn is_level_id(&self, external_id: &str) -> bool {
        external_id == self.unassigned_id() || self.numbered_suffix(external_id).is_some()
    }

    /// Name and description for a level referenced but not yet created.
    /// None when the id follows no recognized pattern.
    pub fn spec_for(&self, external_id: &str) -> Option<LevelSpec> {
        if external_id == self.unassigned_id() {
            return Some(self.unassigned_spec());
        }

        let level = self.numbered_suffix(external_id)?.parse::<u32>().ok()?;
        Some(LevelSpec {
            external_id: external_id.to_string(),
            name: format!("{} Level {}", self.prefix, level),
            description: level_description(level).to_string(),
        })
    }

    fn unassigned_spec(&self) -> LevelSpec {
        LevelSpec {
            external_id: self.unassigned_id(),
            name: format!("{} Unassigned", self.prefix),
            description: level_description(0).to_string(),
        }
    }

    /// Either all six canonical levels (unassigned first) or just the unassigned one
    pub fn canonical_levels(&self, all_levels: bool) -> Vec<LevelSpec> {
        let mut specs = vec![self.unassigned_spec()];
        if all_levels {
            specs.extend((1..=MAX_LEVEL).filter_map(|n| self.spec_for(&self.level_id(n))));
        }
        specs
    }
}

// ============================================================================
// LEVEL PROVISIONER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    Created(NodeId),
    AlreadyExists(NodeId),
}

impl Provisioned {
    pub fn id(&self) -> NodeId {
        match self {
            Provisioned::Created(id) | Provisioned::AlreadyExists(id) => *id,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Provisioned::Created(_))
    }
}

/// Create a level unless one with the same external id already exists in
/// the framework. An id already taken by a competency is never reused as a level.
pub fn provision_level<S: RecordStore + ?Sized>(
    store: &mut S,
    ctx: &AuditContext,
    framework_id: FrameworkId,
    spec: &LevelSpec,
) -> Result<Provisioned, RowError> {
    if let Some(existing) = store.find(framework_id, &spec.external_id)? {
        if !existing.is_level() {
            return Err(RowError::ExternalIdIsCompetency(spec.external_id.clone()));
        }
        debug!(external_id = %spec.external_id, id = existing.id, "level already exists");
        return Ok(Provisioned::AlreadyExists(existing.id));
    }

    let draft = NodeDraft::level(framework_id, &spec.external_id, &spec.name, &spec.description);
    let id = store.create(&draft, ctx)?;
    debug!(external_id = %spec.external_id, id, "level created");
    Ok(Provisioned::Created(id))
}

/// Provision one level, updating the level map, counters and log in one place
pub(crate) fn provision_and_record<S: RecordStore + ?Sized>(
    store: &mut S,
    ctx: &AuditContext,
    framework_id: FrameworkId,
    spec: &LevelSpec,
    levels: &mut LevelMap,
    result: &mut ImportResult,
) {
    match provision_level(store, ctx, framework_id, spec) {
        Ok(Provisioned::Created(id)) => {
            levels.insert(spec.external_id.clone(), id);
            result.stats.record_created();
            result.log(format!("Level {} created with ID: {}", spec.name, id));
        }
        Ok(Provisioned::AlreadyExists(id)) => {
            levels.insert(spec.external_id.clone(), id);
            result.stats.record_skipped();
            result.log(format!("Level {} already exists, skipped.", spec.name));
        }
        Err(e) => {
            warn!(external_id = %spec.external_id, error = %e, "level creation failed");
            result.stats.record_error();
            result.log(format!("Error creating level {}: {}", spec.name, e));
        }
    }
}

/// Bootstrap the canonical levels of a framework.
///
/// Running it twice is harmless: the second run reports every level as skipped.
pub fn provision_default_levels<S: RecordStore + ?Sized>(
    store: &mut S,
    ctx: &AuditContext,
    scheme: &LevelScheme,
    framework_id: FrameworkId,
    all_levels: bool,
) -> (LevelMap, ImportResult) {
    let mut levels = LevelMap::new();
    let mut result = ImportResult::new(ImportMode::DefaultLevels, framework_id);

    for spec in scheme.canonical_levels(all_levels) {
        result.stats.record_row(scheme.level_tag(&spec.external_id));
        provision_and_record(store, ctx, framework_id, &spec, &mut levels, &mut result);
    }

    (levels, result)
}
