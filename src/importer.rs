// 📥 Import Orchestrator
//
// decode -> parse -> resolve -> persist, for one file and one mode.
//
// Anything that prevents the run from starting (unreadable file, missing
// columns, unknown framework) comes back as a single `ImportError`; once rows
// are flowing, problems are per-row and end up in the result's log.

use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::{info, info_span, warn};

use crate::context::AuditContext;
use crate::decoder::{decode, SourceEncoding};
use crate::entities::{FrameworkDraft, FrameworkId, ScaleConfiguration, ScaleId};
use crate::error::{FrameworkError, ImportError};
use crate::levels::{provision_default_levels, LevelScheme};
use crate::parser::{DelimitedSource, Delimiter};
use crate::resolver::{CompetencyOptions, HierarchyResolver};
use crate::stats::{ImportMode, ImportResult, LevelMap};
use crate::store::{RecordStore, ScaleLookup};

/// How to read an input file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CsvOptions {
    pub encoding: SourceEncoding,
    pub delimiter: Delimiter,
}

/// Fields for a new framework
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFramework {
    pub name: String,
    pub external_id: String,
    pub description: String,
    pub scale_id: ScaleId,
}

/// Decoded + validated input, ready to be resolved
struct LoadedSource {
    source: DelimitedSource,
    sha256: String,
    lossy: bool,
}

fn load_source(path: &Path, csv: &CsvOptions) -> Result<LoadedSource, ImportError> {
    let bytes = fs::read(path).map_err(|source| ImportError::FileUnreadable {
        path: path.to_path_buf(),
        source,
    })?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let sha256 = format!("{:x}", hasher.finalize());

    let decoded = decode(&bytes, csv.encoding);
    let source = DelimitedSource::new(decoded.text, csv.delimiter)?;

    Ok(LoadedSource {
        source,
        sha256,
        lossy: decoded.lossy,
    })
}

fn note_provenance(result: &mut ImportResult, loaded: &LoadedSource, csv: &CsvOptions) {
    result.source_sha256 = Some(loaded.sha256.clone());
    if loaded.lossy {
        warn!(encoding = %csv.encoding, "input contained bytes not valid in the declared encoding");
        result.log(format!(
            "Warning: some bytes are not valid {} and were replaced",
            csv.encoding
        ));
    }
}

// ============================================================================
// IMPORTER
// ============================================================================

/// Entry point used by the CLI (or any other front end)
pub struct Importer<'a, S: ?Sized> {
    store: &'a mut S,
    ctx: AuditContext,
    scheme: LevelScheme,
}

impl<'a, S: RecordStore + ?Sized> Importer<'a, S> {
    pub fn new(store: &'a mut S, ctx: AuditContext, scheme: LevelScheme) -> Self {
        Importer { store, ctx, scheme }
    }

    fn require_framework(&self, framework_id: FrameworkId) -> Result<(), ImportError> {
        match self.store.framework(framework_id)? {
            Some(_) => Ok(()),
            None => Err(ImportError::FrameworkNotFound(framework_id)),
        }
    }

    /// Canonical levels already present in the framework, keyed by external id
    pub fn existing_levels(&self, framework_id: FrameworkId) -> Result<LevelMap, ImportError> {
        self.require_framework(framework_id)?;

        Ok(self
            .store
            .levels(framework_id)?
            .into_iter()
            .filter(|node| self.scheme.is_level_id(&node.external_id))
            .map(|node| (node.external_id, node.id))
            .collect())
    }

    /// Bootstrap all six canonical levels, or only the unassigned one
    pub fn provision_default_levels(
        &mut self,
        framework_id: FrameworkId,
        all_levels: bool,
    ) -> Result<(LevelMap, ImportResult), ImportError> {
        let span = info_span!("import", mode = "default_levels", framework_id);
        let _guard = span.enter();

        self.require_framework(framework_id)?;
        let (levels, result) =
            provision_default_levels(&mut *self.store, &self.ctx, &self.scheme, framework_id, all_levels);

        info!(
            run_id = %result.run_id,
            created = result.stats.created,
            skipped = result.stats.skipped,
            errors = result.stats.errors,
            "default levels provisioned"
        );
        Ok((levels, result))
    }

    /// Level import. With `create_defaults` the file is ignored and the
    /// canonical levels are provisioned instead.
    pub fn import_levels(
        &mut self,
        file: Option<&Path>,
        framework_id: FrameworkId,
        csv: &CsvOptions,
        create_defaults: bool,
    ) -> Result<(LevelMap, ImportResult), ImportError> {
        if create_defaults {
            return self.provision_default_levels(framework_id, true);
        }

        let mut result = ImportResult::new(ImportMode::Levels, framework_id);
        let span = info_span!("import", run_id = %result.run_id, mode = "levels", framework_id);
        let _guard = span.enter();

        self.require_framework(framework_id)?;
        let path = file.ok_or(ImportError::NoSourceFile)?;
        let loaded = load_source(path, csv)?;
        note_provenance(&mut result, &loaded, csv);

        let mut levels = LevelMap::new();
        HierarchyResolver::new(&mut *self.store, &self.ctx, &self.scheme, framework_id)
            .resolve_levels(loaded.source.records(), &mut levels, &mut result);

        info!(
            file = %path.display(),
            created = result.stats.created,
            skipped = result.stats.skipped,
            errors = result.stats.errors,
            "level import finished"
        );
        Ok((levels, result))
    }

    /// Competency import against the given map of known levels
    pub fn import_competencies(
        &mut self,
        file: &Path,
        framework_id: FrameworkId,
        existing_levels: &LevelMap,
        csv: &CsvOptions,
        options: CompetencyOptions,
    ) -> Result<ImportResult, ImportError> {
        let mut result = ImportResult::new(ImportMode::Competencies, framework_id);
        let span = info_span!("import", run_id = %result.run_id, mode = "competencies", framework_id);
        let _guard = span.enter();

        self.require_framework(framework_id)?;
        let loaded = load_source(file, csv)?;
        note_provenance(&mut result, &loaded, csv);

        let mut levels = existing_levels.clone();
        HierarchyResolver::new(&mut *self.store, &self.ctx, &self.scheme, framework_id)
            .resolve_competencies(loaded.source.records(), &mut levels, options, &mut result);

        info!(
            file = %file.display(),
            total = result.stats.total,
            created = result.stats.created,
            skipped = result.stats.skipped,
            errors = result.stats.errors,
            "competency import finished"
        );
        Ok(result)
    }
}

impl<'a, S: RecordStore + ScaleLookup + ?Sized> Importer<'a, S> {
    /// Create a framework bound to an existing scale of at least two values
    pub fn create_framework(&mut self, request: &NewFramework) -> Result<FrameworkId, FrameworkError> {
        if self.store.framework_exists(&request.external_id)? {
            return Err(FrameworkError::DuplicateId(request.external_id.clone()));
        }

        let scale = self
            .store
            .get_scale(request.scale_id)?
            .ok_or(FrameworkError::ScaleNotFound(request.scale_id))?;
        if scale.values.len() < 2 {
            return Err(FrameworkError::ScaleTooSmall {
                scale_id: scale.id,
                values: scale.values.len(),
            });
        }

        let draft = FrameworkDraft {
            short_name: request.name.clone(),
            external_id: request.external_id.clone(),
            description: request.description.clone(),
            scale_configuration: ScaleConfiguration::for_scale(&scale),
        };
        let id = self.store.create_framework(&draft, &self.ctx)?;

        info!(framework_id = id, external_id = %request.external_id, "framework created");
        Ok(id)
    }
}
