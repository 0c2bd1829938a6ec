// 🧭 Hierarchy Resolver
//
// Walks the record stream once. Each row is decided on its own, sharing only
// the running level map and the result being accumulated:
//
//   structural?  -> level mode handles it, competency mode skips it
//   parent id    -> level map -> (optionally) auto-provisioned level
//   external id  -> create / leave untouched / overwrite
//
// A row that cannot be applied is logged and counted; the stream goes on.

use tracing::{debug, warn};

use crate::context::AuditContext;
use crate::decoder::normalize_field;
use crate::entities::{FrameworkId, NodeDraft, NodeId, Parent};
use crate::error::RowError;
use crate::levels::{provision_and_record, provision_level, LevelScheme, LevelSpec, Provisioned};
use crate::parser::{Column, Record};
use crate::stats::{ImportResult, LevelMap};
use crate::store::RecordStore;

// ============================================================================
// OPTIONS / OUTCOMES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompetencyOptions {
    /// Rewrite name/description/parent of competencies that already exist
    pub overwrite: bool,
    /// Provision levels referenced by a row but not yet known
    pub create_missing_levels: bool,
}

impl Default for CompetencyOptions {
    fn default() -> Self {
        CompetencyOptions {
            overwrite: false,
            create_missing_levels: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created(NodeId),
    /// Existed and overwrite was off
    Unchanged(NodeId),
    /// Existed and was rewritten in place
    Updated(NodeId),
}

impl UpsertOutcome {
    pub fn id(&self) -> NodeId {
        match self {
            UpsertOutcome::Created(id) | UpsertOutcome::Unchanged(id) | UpsertOutcome::Updated(id) => *id,
        }
    }
}

/// The trimmed, normalized values of one competency row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompetencyRow {
    pub parent_external_id: String,
    pub external_id: String,
    pub short_name: String,
    pub description: String,
}

impl CompetencyRow {
    pub fn from_record(record: &Record) -> Self {
        CompetencyRow {
            parent_external_id: record.get(Column::ParentExternalId).trim().to_string(),
            external_id: record.get(Column::ExternalId).trim().to_string(),
            short_name: normalize_field(record.get(Column::ShortName).trim()),
            description: normalize_field(record.get(Column::Description).trim()),
        }
    }
}

// ============================================================================
// COMPETENCY UPSERT
// ============================================================================

/// Create the competency, or resolve it to the existing node with the same
/// external id (rewriting it first when `overwrite` is set).
pub fn upsert_competency<S: RecordStore + ?Sized>(
    store: &mut S,
    ctx: &AuditContext,
    framework_id: FrameworkId,
    parent_id: NodeId,
    row: &CompetencyRow,
    overwrite: bool,
) -> Result<UpsertOutcome, RowError> {
    let Some(mut existing) = store.find(framework_id, &row.external_id)? else {
        let draft = NodeDraft::competency(
            framework_id,
            parent_id,
            &row.external_id,
            &row.short_name,
            &row.description,
        );
        return Ok(UpsertOutcome::Created(store.create(&draft, ctx)?));
    };

    if existing.is_level() {
        return Err(RowError::ExternalIdIsLevel(row.external_id.clone()));
    }
    if !overwrite {
        return Ok(UpsertOutcome::Unchanged(existing.id));
    }

    existing.short_name = row.short_name.clone();
    existing.description = row.description.clone();
    existing.parent = Parent::Node(parent_id);
    store.update(&existing, ctx)?;

    Ok(UpsertOutcome::Updated(existing.id))
}

// ============================================================================
// RESOLVER
// ============================================================================

pub struct HierarchyResolver<'a, S: RecordStore + ?Sized> {
    store: &'a mut S,
    ctx: &'a AuditContext,
    scheme: &'a LevelScheme,
    framework_id: FrameworkId,
}

impl<'a, S: RecordStore + ?Sized> HierarchyResolver<'a, S> {
    pub fn new(
        store: &'a mut S,
        ctx: &'a AuditContext,
        scheme: &'a LevelScheme,
        framework_id: FrameworkId,
    ) -> Self {
        HierarchyResolver {
            store,
            ctx,
            scheme,
            framework_id,
        }
    }

    /// Level mode: only structural rows hanging from the framework root count
    pub fn resolve_levels<I>(&mut self, records: I, levels: &mut LevelMap, result: &mut ImportResult)
    where
        I: IntoIterator<Item = Result<Record, csv::Error>>,
    {
        let root_id = self.scheme.root_id();

        for record in records {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    self.record_unreadable(e, result);
                    continue;
                }
            };

            if !record.is_structural() || record.get(Column::ParentExternalId).trim() != root_id {
                continue;
            }

            let spec = LevelSpec {
                external_id: record.get(Column::ExternalId).trim().to_string(),
                name: record.get(Column::ShortName).trim().to_string(),
                description: record.get(Column::Description).trim().to_string(),
            };
            result.stats.record_row(self.scheme.level_tag(&spec.external_id));

            if spec.external_id.is_empty() {
                self.record_row_error(&RowError::MissingExternalId, record.line, result);
                continue;
            }

            provision_and_record(&mut *self.store, self.ctx, self.framework_id, &spec, levels, result);
        }

        result.log(result.stats.summary_line());
    }

    /// Competency mode: structural rows are skipped, every other row is upserted
    pub fn resolve_competencies<I>(
        &mut self,
        records: I,
        levels: &mut LevelMap,
        options: CompetencyOptions,
        result: &mut ImportResult,
    ) where
        I: IntoIterator<Item = Result<Record, csv::Error>>,
    {
        for record in records {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    self.record_unreadable(e, result);
                    continue;
                }
            };

            if record.is_structural() {
                continue;
            }

            let row = CompetencyRow::from_record(&record);
            result.stats.record_row(self.scheme.level_tag(&row.parent_external_id));

            if row.external_id.is_empty() {
                self.record_row_error(&RowError::MissingExternalId, record.line, result);
                continue;
            }

            let Some(parent_id) = self.resolve_parent(&row, record.line, levels, options, result) else {
                continue;
            };

            match upsert_competency(
                &mut *self.store,
                self.ctx,
                self.framework_id,
                parent_id,
                &row,
                options.overwrite,
            ) {
                Ok(UpsertOutcome::Created(id)) => {
                    debug!(external_id = %row.external_id, id, "competency created");
                    result.stats.record_created();
                }
                Ok(UpsertOutcome::Unchanged(id)) => {
                    debug!(external_id = %row.external_id, id, "competency exists, left untouched");
                    result.stats.record_skipped();
                }
                Ok(UpsertOutcome::Updated(id)) => {
                    debug!(external_id = %row.external_id, id, "competency overwritten");
                    result.stats.record_updated();
                }
                Err(e) => {
                    warn!(external_id = %row.external_id, error = %e, "competency upsert failed");
                    result.stats.record_error();
                    result.log(format!("Error creating competency {}: {}", row.external_id, e));
                }
            }
        }

        result.log(result.stats.summary_line());
    }

    /// Internal id of the row's parent level, provisioning it when allowed.
    /// None means the row was already logged and counted as an error.
    fn resolve_parent(
        &mut self,
        row: &CompetencyRow,
        line: u64,
        levels: &mut LevelMap,
        options: CompetencyOptions,
        result: &mut ImportResult,
    ) -> Option<NodeId> {
        let parent = &row.parent_external_id;
        if let Some(&id) = levels.get(parent) {
            return Some(id);
        }

        if !options.create_missing_levels {
            let error = RowError::ParentUnavailable {
                external_id: row.external_id.clone(),
                parent: parent.clone(),
            };
            self.record_row_error(&error, line, result);
            return None;
        }

        let Some(spec) = self.scheme.spec_for(parent) else {
            let error = RowError::UnrecognizedLevel {
                external_id: row.external_id.clone(),
                parent: parent.clone(),
            };
            self.record_row_error(&error, line, result);
            return None;
        };

        match provision_level(&mut *self.store, self.ctx, self.framework_id, &spec) {
            Ok(provisioned) => {
                let id = provisioned.id();
                levels.insert(parent.clone(), id);
                match provisioned {
                    Provisioned::Created(_) => {
                        result.log(format!("Level {} created automatically with ID: {}", spec.name, id))
                    }
                    Provisioned::AlreadyExists(_) => {
                        result.log(format!("Level {} found in framework with ID: {}", spec.name, id))
                    }
                }
                Some(id)
            }
            Err(e) => {
                self.record_row_error(&e, line, result);
                None
            }
        }
    }

    fn record_row_error(&self, error: &RowError, line: u64, result: &mut ImportResult) {
        warn!(line, error = %error, "row rejected");
        result.stats.record_error();
        result.log(format!("Error at line {}: {}", line, error));
    }

    /// A record the CSV reader could not produce still counts as a processed row
    fn record_unreadable(&self, error: csv::Error, result: &mut ImportResult) {
        let line = error.position().map(|p| p.line()).unwrap_or(0);
        result.stats.record_row(0);
        self.record_row_error(&RowError::from(error), line, result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{FrameworkDraft, ScaleConfiguration};
    use crate::parser::{Delimiter, DelimitedSource};
    use crate::stats::ImportMode;
    use crate::store::MemoryStore;

    const HEADER: &str = "Número ID paterno,Número ID,Nombre_corto,Descripción,Es estructura";

    struct Fixture {
        store: MemoryStore,
        ctx: AuditContext,
        scheme: LevelScheme,
        fw: FrameworkId,
    }

    impl Fixture {
        fn new() -> Self {
            let mut store = MemoryStore::new();
            let ctx = AuditContext::new(3);
            let fw = store
                .create_framework(
                    &FrameworkDraft {
                        short_name: "X".to_string(),
                        external_id: "X-PRINCIPAL".to_string(),
                        description: String::new(),
                        scale_configuration: ScaleConfiguration {
                            scale_id: 1,
                            min_proficiency_id: 3,
                            default_id: 3,
                        },
                    },
                    &ctx,
                )
                .unwrap();
            Fixture {
                store,
                ctx,
                scheme: LevelScheme::new("X"),
                fw,
            }
        }

        fn competencies(&mut self, rows: &[&str], levels: &mut LevelMap, options: CompetencyOptions) -> ImportResult {
            let source = source(rows);
            let mut result = ImportResult::new(ImportMode::Competencies, self.fw);
            HierarchyResolver::new(&mut self.store, &self.ctx, &self.scheme, self.fw)
                .resolve_competencies(source.records(), levels, options, &mut result);
            result
        }

        fn levels(&mut self, rows: &[&str], levels: &mut LevelMap) -> ImportResult {
            let source = source(rows);
            let mut result = ImportResult::new(ImportMode::Levels, self.fw);
            HierarchyResolver::new(&mut self.store, &self.ctx, &self.scheme, self.fw)
                .resolve_levels(source.records(), levels, &mut result);
            result
        }
    }

    fn source(rows: &[&str]) -> DelimitedSource {
        let mut text = String::from(HEADER);
        for row in rows {
            text.push('\n');
            text.push_str(row);
        }
        DelimitedSource::new(text, Delimiter::Comma).unwrap()
    }

    #[test]
    fn test_statistics_by_level() {
        let mut fx = Fixture::new();
        let mut levels = LevelMap::new();
        let result = fx.competencies(
            &[
                "X-PRINCIPAL,X-NIVEL-1,Level 1,,1",
                "X-PRINCIPAL,X-NIVEL-2,Level 2,,1",
                "X-NIVEL-1,EC0001,One,d,0",
                "X-NIVEL-2,EC0002,Two,d,0",
                "X-NIVEL-2,EC0003,Three,d,0",
            ],
            &mut levels,
            CompetencyOptions::default(),
        );

        assert_eq!(result.stats.total, 3);
        assert_eq!(result.stats.level_count(0), 0);
        assert_eq!(result.stats.level_count(1), 1);
        assert_eq!(result.stats.level_count(2), 2);
        assert_eq!(result.stats.processed(), 3);
        assert_eq!(result.stats.created, 3);
        assert_eq!(
            result.messages.last().unwrap(),
            "Import finished. Total: 3 | Created: 3 | Skipped: 0 | Errors: 0"
        );
    }

    #[test]
    fn test_auto_created_level_is_reused() {
        let mut fx = Fixture::new();
        let mut levels = LevelMap::new();
        let result = fx.competencies(
            &["X-NIVEL-3,EC0001,One,d,0", "X-NIVEL-3,EC0002,Two,d,0"],
            &mut levels,
            CompetencyOptions::default(),
        );

        let level_ids: Vec<_> = fx
            .store
            .levels(fx.fw)
            .unwrap()
            .into_iter()
            .map(|n| n.external_id)
            .collect();
        assert_eq!(level_ids, vec!["X-NIVEL-3"]);

        let level_id = levels["X-NIVEL-3"];
        assert_eq!(fx.store.children(level_id).len(), 2);
        assert_eq!(result.stats.created, 2);
        assert_eq!(
            result
                .messages
                .iter()
                .filter(|m| m.contains("created automatically"))
                .count(),
            1
        );
    }

    #[test]
    fn test_auto_creation_disabled() {
        let mut fx = Fixture::new();
        let mut levels = LevelMap::new();
        let result = fx.competencies(
            &["X-NIVEL-3,EC0001,One,d,0"],
            &mut levels,
            CompetencyOptions {
                overwrite: false,
                create_missing_levels: false,
            },
        );

        assert_eq!(fx.store.count(), 0);
        assert_eq!(result.stats.errors, 1);
        assert_eq!(result.stats.total, 1);
        assert_eq!(
            result.messages[0],
            "Error at line 2: parent level X-NIVEL-3 not available for competency EC0001"
        );
    }

    #[test]
    fn test_unrecognized_level_is_row_error() {
        let mut fx = Fixture::new();
        let mut levels = LevelMap::new();
        let result = fx.competencies(
            &["X-OTRO,EC0001,One,d,0", "X-NIVEL-1,EC0002,Two,d,0"],
            &mut levels,
            CompetencyOptions::default(),
        );

        assert_eq!(result.stats.errors, 1);
        assert_eq!(result.stats.created, 1);
        assert_eq!(
            result.messages[0],
            "Error at line 2: unrecognized level X-OTRO for competency EC0001"
        );
    }

    #[test]
    fn test_level_already_in_store_but_not_in_map() {
        let mut fx = Fixture::new();
        let spec = fx.scheme.spec_for("X-NIVEL-1").unwrap();
        let existing = provision_level(&mut fx.store, &fx.ctx, fx.fw, &spec).unwrap().id();

        let mut levels = LevelMap::new();
        let result = fx.competencies(&["X-NIVEL-1,EC0001,One,d,0"], &mut levels, CompetencyOptions::default());

        assert_eq!(levels["X-NIVEL-1"], existing);
        assert_eq!(fx.store.levels(fx.fw).unwrap().len(), 1);
        assert!(result.messages[0].contains("found in framework"));
    }

    #[test]
    fn test_parent_id_held_by_competency_is_row_error() {
        let mut fx = Fixture::new();
        let mut levels = LevelMap::new();
        let result = fx.competencies(
            &["X-NIVEL-1,X-NIVEL-2,Odd,d,0", "X-NIVEL-2,EC0001,Child,d,0"],
            &mut levels,
            CompetencyOptions::default(),
        );

        assert!(!fx.store.find(fx.fw, "X-NIVEL-2").unwrap().unwrap().is_level());
        assert!(fx.store.find(fx.fw, "EC0001").unwrap().is_none());
        assert!(!levels.contains_key("X-NIVEL-2"));
        assert_eq!(result.stats.created, 1);
        assert_eq!(result.stats.errors, 1);
        assert!(result
            .messages
            .iter()
            .any(|m| m == "Error at line 3: external id X-NIVEL-2 already belongs to a competency"));
    }

    #[test]
    fn test_rerun_without_overwrite_skips_everything() {
        let mut fx = Fixture::new();
        let rows = ["X-NIVEL-1,EC0001,One,d,0", "X-NIVEL-2,EC0002,Two,d,0"];

        let mut levels = LevelMap::new();
        fx.competencies(&rows, &mut levels, CompetencyOptions::default());
        let before = fx.store.count();

        let second = fx.competencies(&rows, &mut levels, CompetencyOptions::default());
        assert_eq!(fx.store.count(), before);
        assert_eq!(second.stats.created, 0);
        assert_eq!(second.stats.skipped, 2);
        assert_eq!(second.stats.updated, 0);
    }

    #[test]
    fn test_overwrite_updates_in_place_but_counts_skipped() {
        let mut fx = Fixture::new();
        let options = CompetencyOptions {
            overwrite: true,
            create_missing_levels: true,
        };
        let mut levels = LevelMap::new();
        fx.competencies(&["X-NIVEL-1,EC0001,Old name,old,0"], &mut levels, options);

        let second = fx.competencies(&["X-NIVEL-2,EC0001,New \"name\",new,0"], &mut levels, options);
        assert_eq!(second.stats.created, 0);
        assert_eq!(second.stats.skipped, 1);
        assert_eq!(second.stats.updated, 1);

        let node = fx.store.find(fx.fw, "EC0001").unwrap().unwrap();
        assert_eq!(node.short_name, "New 'name'");
        assert_eq!(node.description, "new");
        assert_eq!(node.parent_id(), Some(levels["X-NIVEL-2"]));
    }

    #[test]
    fn test_fields_are_trimmed_and_normalized() {
        let mut fx = Fixture::new();
        let mut levels = LevelMap::new();
        fx.competencies(
            &["  X-NIVEL-1 ,  EC0009 ,\"Say \"\"hi\"\"\",  spaced  ,0"],
            &mut levels,
            CompetencyOptions::default(),
        );

        let node = fx.store.find(fx.fw, "EC0009").unwrap().unwrap();
        assert_eq!(node.short_name, "Say 'hi'");
        assert_eq!(node.description, "spaced");
        assert!(levels.contains_key("X-NIVEL-1"));
    }

    #[test]
    fn test_competency_cannot_take_over_a_level() {
        let mut fx = Fixture::new();
        let mut levels = LevelMap::new();
        let result = fx.competencies(
            &["X-NIVEL-1,X-NIVEL-1,Clash,d,0"],
            &mut levels,
            CompetencyOptions {
                overwrite: true,
                create_missing_levels: true,
            },
        );

        assert_eq!(result.stats.errors, 1);
        assert!(fx.store.find(fx.fw, "X-NIVEL-1").unwrap().unwrap().is_level());
    }

    #[test]
    fn test_missing_external_id_is_row_error() {
        let mut fx = Fixture::new();
        let mut levels = LevelMap::new();
        let result = fx.competencies(&["X-NIVEL-1,  ,Nameless,d,0"], &mut levels, CompetencyOptions::default());

        assert_eq!(result.stats.errors, 1);
        assert_eq!(fx.store.count(), 0);
        assert!(result.messages[0].starts_with("Error at line 2"));
    }

    #[test]
    fn test_level_mode_filters_rows() {
        let mut fx = Fixture::new();
        let mut levels = LevelMap::new();
        let result = fx.levels(
            &[
                "X-PRINCIPAL,X-NIVEL-1,Nivel 1,Basico,1",
                "X-PRINCIPAL,X-SIN-NIVEL,Sin nivel,,1",
                "X-NIVEL-1,X-SUB,Nested structure,,1",
                "X-NIVEL-1,EC0001,Competency,,0",
            ],
            &mut levels,
        );

        assert_eq!(result.stats.total, 2);
        assert_eq!(result.stats.created, 2);
        assert_eq!(levels.len(), 2);
        assert_eq!(fx.store.count(), 2);
        assert_eq!(fx.store.find(fx.fw, "X-NIVEL-1").unwrap().unwrap().short_name, "Nivel 1");
    }

    #[test]
    fn test_level_mode_rerun_skips_and_fills_map() {
        let mut fx = Fixture::new();
        let rows = ["X-PRINCIPAL,X-NIVEL-1,Nivel 1,Basico,1"];
        let mut first = LevelMap::new();
        fx.levels(&rows, &mut first);

        let mut second = LevelMap::new();
        let result = fx.levels(&rows, &mut second);
        assert_eq!(result.stats.skipped, 1);
        assert_eq!(result.stats.created, 0);
        assert_eq!(first, second);
        assert!(result.messages[0].contains("already exists"));
    }
}
