//! Registry loaders with overlay merging and mtime-based hot reload.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use tracing::{info, warn};

use conductor_protocol::{
    CallTargetKind, CapabilityRegistry, EntryStatus, EntrypointRuntime, OpDefinition, OpRegistry,
    OpRuntime, SkillDefinition, SkillRegistry,
};

use crate::entry::{
    ActorPolicy, ChannelPolicy, OpRegistryView, OpRuntimeEntry, SkillRegistryView,
    SkillRuntimeEntry,
};
use crate::error::RegistryError;
use crate::overlay::{validate_overlay, AllowDeny, OverlayFile, OverlayOverride};
use crate::pipeline::{validate_pipeline, PipelineLookup};
use crate::validation::{validate_op_registry, validate_skill_registry, RegistryIndex};

/// Resolver for in-process native handlers.
///
/// The loader consults this when deciding whether to keep a disabled entry:
/// a disabled native entry whose handler cannot resolve in the current
/// process is dropped from the view with a warning.
pub trait NativeCatalog: Send + Sync {
    fn resolves(&self, module: &str, handler: &str) -> bool;
}

type RegistryResult<T> = Result<T, RegistryError>;

struct Cached<V> {
    view: Arc<V>,
    mtimes: BTreeMap<PathBuf, SystemTime>,
}

/// Loader for the skill registry.
///
/// Also reads the op registry so pipeline step targets can be resolved and
/// statically validated at load time.
pub struct SkillRegistryLoader {
    skill_path: PathBuf,
    op_path: PathBuf,
    capability_path: PathBuf,
    overlay_paths: Vec<PathBuf>,
    native_catalog: Option<Arc<dyn NativeCatalog>>,
    cache: Mutex<Option<Cached<SkillRegistryView>>>,
}

impl SkillRegistryLoader {
    pub fn new(
        skill_path: impl Into<PathBuf>,
        op_path: impl Into<PathBuf>,
        capability_path: impl Into<PathBuf>,
        overlay_paths: Vec<PathBuf>,
    ) -> Self {
        Self {
            skill_path: skill_path.into(),
            op_path: op_path.into(),
            capability_path: capability_path.into(),
            overlay_paths,
            native_catalog: None,
            cache: Mutex::new(None),
        }
    }

    pub fn with_native_catalog(mut self, catalog: Arc<dyn NativeCatalog>) -> Self {
        self.native_catalog = Some(catalog);
        self
    }

    /// Force a load and publish a fresh view.
    pub fn load(&self) -> RegistryResult<Arc<SkillRegistryView>> {
        let view = Arc::new(self.load_view()?);
        let mtimes = current_mtimes(self.watched_paths());
        let mut cache = lock_cache(&self.cache);
        *cache = Some(Cached {
            view: Arc::clone(&view),
            mtimes,
        });
        Ok(view)
    }

    /// Current view, reloading first if any watched file changed.
    pub fn view(&self) -> RegistryResult<Arc<SkillRegistryView>> {
        {
            let cache = lock_cache(&self.cache);
            if let Some(cached) = cache.as_ref() {
                if cached.mtimes == current_mtimes(self.watched_paths()) {
                    return Ok(Arc::clone(&cached.view));
                }
            }
        }
        info!(path = %self.skill_path.display(), "reloading skill registry");
        self.load()
    }

    /// List skills, optionally filtered by status and capability.
    pub fn list_skills(
        &self,
        status: Option<EntryStatus>,
        capability: Option<&str>,
    ) -> RegistryResult<Vec<Arc<SkillRuntimeEntry>>> {
        let view = self.view()?;
        Ok(view
            .skills
            .iter()
            .filter(|skill| status.map_or(true, |s| skill.status == s))
            .filter(|skill| {
                capability.map_or(true, |cap| {
                    skill
                        .definition
                        .capabilities()
                        .iter()
                        .any(|c| c.as_str() == cap)
                })
            })
            .cloned()
            .collect())
    }

    /// Resolve a skill by name and optional version.
    pub fn get_skill(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> RegistryResult<Arc<SkillRuntimeEntry>> {
        let view = self.view()?;
        let mut matches: Vec<&Arc<SkillRuntimeEntry>> = view
            .skills
            .iter()
            .filter(|skill| skill.definition.name() == name)
            .collect();
        if let Some(version) = version {
            matches.retain(|skill| skill.definition.version() == version);
        }
        match matches.len() {
            0 => Err(RegistryError::SkillNotFound {
                name: name.to_string(),
                version: version.unwrap_or("*").to_string(),
            }),
            1 => Ok(Arc::clone(matches[0])),
            _ => Err(RegistryError::AmbiguousVersion {
                kind: CallTargetKind::Skill,
                name: name.to_string(),
            }),
        }
    }

    fn watched_paths(&self) -> Vec<&Path> {
        let mut paths = vec![
            self.skill_path.as_path(),
            self.op_path.as_path(),
            self.capability_path.as_path(),
        ];
        paths.extend(self.overlay_paths.iter().map(PathBuf::as_path));
        paths
    }

    fn load_view(&self) -> RegistryResult<SkillRegistryView> {
        let registry: SkillRegistry = read_json(&self.skill_path)?;
        let op_registry: OpRegistry = read_json(&self.op_path)?;
        let capability_ids = load_capability_ids(&self.capability_path)?;

        let op_errors = validate_op_registry(&op_registry, &capability_ids);
        if !op_errors.is_empty() {
            return Err(RegistryError::ValidationFailed { errors: op_errors });
        }
        let skill_errors = validate_skill_registry(&registry, &capability_ids);
        if !skill_errors.is_empty() {
            return Err(RegistryError::ValidationFailed {
                errors: skill_errors,
            });
        }

        let index = RegistryIndex::from_skills(&registry);
        let overrides = load_overrides(&self.overlay_paths, &index, "skill")?;

        let mut entries = Vec::with_capacity(registry.skills.len());
        for skill in &registry.skills {
            let skill = self.check_pipeline(skill, &registry, &op_registry)?;
            let entry = apply_skill_overrides(skill, &overrides);
            if self.should_skip(&entry) {
                continue;
            }
            entries.push(Arc::new(entry));
        }
        Ok(SkillRegistryView {
            registry_version: registry.registry_version.clone(),
            skills: entries,
        })
    }

    /// Statically validate a pipeline skill and reconcile its declared
    /// capabilities with the computed closure.
    fn check_pipeline(
        &self,
        skill: &SkillDefinition,
        registry: &SkillRegistry,
        op_registry: &OpRegistry,
    ) -> RegistryResult<SkillDefinition> {
        let pipeline = match skill {
            SkillDefinition::Pipeline(pipeline) => pipeline,
            SkillDefinition::Logic(_) => return Ok(skill.clone()),
        };
        let lookup = PipelineLookup::new(&registry.skills, &op_registry.ops);
        let (errors, closure) = validate_pipeline(pipeline, &lookup);
        if !errors.is_empty() {
            return Err(RegistryError::PipelineValidationFailed { errors });
        }

        let declared: BTreeSet<_> = pipeline.capabilities.iter().cloned().collect();
        if !pipeline.capabilities.is_empty() {
            if declared != closure {
                return Err(RegistryError::PipelineValidationFailed {
                    errors: vec![format!(
                        "pipeline capability mismatch for {}: declared {declared:?} vs computed {closure:?}",
                        pipeline.name
                    )],
                });
            }
            return Ok(skill.clone());
        }

        let mut filled = pipeline.clone();
        filled.capabilities = closure.into_iter().collect();
        Ok(SkillDefinition::Pipeline(filled))
    }

    fn should_skip(&self, entry: &SkillRuntimeEntry) -> bool {
        if entry.status != EntryStatus::Disabled {
            return false;
        }
        let entrypoint = match &entry.definition {
            SkillDefinition::Logic(def) => &def.entrypoint,
            SkillDefinition::Pipeline(_) => return false,
        };
        if entrypoint.runtime != EntrypointRuntime::Native {
            return false;
        }
        let resolvable = match (&entrypoint.module, &entrypoint.handler) {
            (Some(module), Some(handler)) => self
                .native_catalog
                .as_ref()
                .is_some_and(|catalog| catalog.resolves(module, handler)),
            _ => false,
        };
        if !resolvable {
            warn!(
                skill = entry.definition.name(),
                "skipping disabled skill with unresolvable native entrypoint"
            );
        }
        !resolvable
    }
}

/// Loader for the op registry.
pub struct OpRegistryLoader {
    op_path: PathBuf,
    capability_path: PathBuf,
    overlay_paths: Vec<PathBuf>,
    native_catalog: Option<Arc<dyn NativeCatalog>>,
    cache: Mutex<Option<Cached<OpRegistryView>>>,
}

impl OpRegistryLoader {
    pub fn new(
        op_path: impl Into<PathBuf>,
        capability_path: impl Into<PathBuf>,
        overlay_paths: Vec<PathBuf>,
    ) -> Self {
        Self {
            op_path: op_path.into(),
            capability_path: capability_path.into(),
            overlay_paths,
            native_catalog: None,
            cache: Mutex::new(None),
        }
    }

    pub fn with_native_catalog(mut self, catalog: Arc<dyn NativeCatalog>) -> Self {
        self.native_catalog = Some(catalog);
        self
    }

    pub fn load(&self) -> RegistryResult<Arc<OpRegistryView>> {
        let view = Arc::new(self.load_view()?);
        let mtimes = current_mtimes(self.watched_paths());
        let mut cache = lock_cache(&self.cache);
        *cache = Some(Cached {
            view: Arc::clone(&view),
            mtimes,
        });
        Ok(view)
    }

    pub fn view(&self) -> RegistryResult<Arc<OpRegistryView>> {
        {
            let cache = lock_cache(&self.cache);
            if let Some(cached) = cache.as_ref() {
                if cached.mtimes == current_mtimes(self.watched_paths()) {
                    return Ok(Arc::clone(&cached.view));
                }
            }
        }
        info!(path = %self.op_path.display(), "reloading op registry");
        self.load()
    }

    pub fn list_ops(
        &self,
        status: Option<EntryStatus>,
        capability: Option<&str>,
    ) -> RegistryResult<Vec<Arc<OpRuntimeEntry>>> {
        let view = self.view()?;
        Ok(view
            .ops
            .iter()
            .filter(|op| status.map_or(true, |s| op.status == s))
            .filter(|op| {
                capability.map_or(true, |cap| {
                    op.definition.capabilities.iter().any(|c| c.as_str() == cap)
                })
            })
            .cloned()
            .collect())
    }

    pub fn get_op(&self, name: &str, version: Option<&str>) -> RegistryResult<Arc<OpRuntimeEntry>> {
        let view = self.view()?;
        let mut matches: Vec<&Arc<OpRuntimeEntry>> = view
            .ops
            .iter()
            .filter(|op| op.definition.name == name)
            .collect();
        if let Some(version) = version {
            matches.retain(|op| op.definition.version == version);
        }
        match matches.len() {
            0 => Err(RegistryError::OpNotFound {
                name: name.to_string(),
                version: version.unwrap_or("*").to_string(),
            }),
            1 => Ok(Arc::clone(matches[0])),
            _ => Err(RegistryError::AmbiguousVersion {
                kind: CallTargetKind::Op,
                name: name.to_string(),
            }),
        }
    }

    fn watched_paths(&self) -> Vec<&Path> {
        let mut paths = vec![self.op_path.as_path(), self.capability_path.as_path()];
        paths.extend(self.overlay_paths.iter().map(PathBuf::as_path));
        paths
    }

    fn load_view(&self) -> RegistryResult<OpRegistryView> {
        let registry: OpRegistry = read_json(&self.op_path)?;
        let capability_ids = load_capability_ids(&self.capability_path)?;

        let errors = validate_op_registry(&registry, &capability_ids);
        if !errors.is_empty() {
            return Err(RegistryError::ValidationFailed { errors });
        }

        let index = RegistryIndex::from_ops(&registry);
        let overrides = load_overrides(&self.overlay_paths, &index, "op")?;

        let mut entries = Vec::with_capacity(registry.ops.len());
        for op in &registry.ops {
            let entry = apply_op_overrides(op, &overrides);
            if self.should_skip(&entry) {
                continue;
            }
            entries.push(Arc::new(entry));
        }
        Ok(OpRegistryView {
            registry_version: registry.registry_version.clone(),
            ops: entries,
        })
    }

    fn should_skip(&self, entry: &OpRuntimeEntry) -> bool {
        if entry.status != EntryStatus::Disabled {
            return false;
        }
        if entry.definition.runtime != OpRuntime::Native {
            return false;
        }
        let resolvable = match (&entry.definition.module, &entry.definition.handler) {
            (Some(module), Some(handler)) => self
                .native_catalog
                .as_ref()
                .is_some_and(|catalog| catalog.resolves(module, handler)),
            _ => false,
        };
        if !resolvable {
            warn!(
                op = entry.definition.name.as_str(),
                "skipping disabled op with unresolvable native handler"
            );
        }
        !resolvable
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

fn lock_cache<T>(cache: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    // A poisoned cache only means another reader panicked mid-swap; the
    // cached data itself is still a consistent Arc.
    match cache.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn current_mtimes(paths: Vec<&Path>) -> BTreeMap<PathBuf, SystemTime> {
    let mut mtimes = BTreeMap::new();
    for path in paths {
        if let Ok(metadata) = fs::metadata(path) {
            if let Ok(mtime) = metadata.modified() {
                mtimes.insert(path.to_path_buf(), mtime);
            }
        }
    }
    mtimes
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> RegistryResult<T> {
    if !path.exists() {
        return Err(RegistryError::FileNotFound(path.to_path_buf()));
    }
    let contents = fs::read_to_string(path).map_err(|source| RegistryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|err| RegistryError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

fn load_capability_ids(path: &Path) -> RegistryResult<BTreeSet<String>> {
    let registry: CapabilityRegistry = read_json(path)?;
    Ok(registry.capabilities.into_iter().map(|cap| cap.id).collect())
}

fn load_overrides(
    overlay_paths: &[PathBuf],
    index: &RegistryIndex,
    entry_label: &str,
) -> RegistryResult<Vec<OverlayOverride>> {
    let mut overrides = Vec::new();
    for path in overlay_paths {
        if !path.exists() {
            continue;
        }
        let contents = fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.clone(),
            source,
        })?;
        let overlay: OverlayFile =
            serde_yaml::from_str(&contents).map_err(|err| RegistryError::OverlayValidationFailed {
                path: path.clone(),
                errors: vec![err.to_string()],
            })?;
        let errors = validate_overlay(&overlay, index, entry_label);
        if !errors.is_empty() {
            return Err(RegistryError::OverlayValidationFailed {
                path: path.clone(),
                errors,
            });
        }
        overrides.extend(overlay.overrides);
    }
    Ok(overrides)
}

fn allow_deny_to_channels(lists: &AllowDeny) -> ChannelPolicy {
    ChannelPolicy {
        allow: lists.allow.iter().cloned().collect(),
        deny: lists.deny.iter().cloned().collect(),
    }
}

fn allow_deny_to_actors(lists: &AllowDeny) -> ActorPolicy {
    ActorPolicy {
        allow: lists.allow.iter().cloned().collect(),
        deny: lists.deny.iter().cloned().collect(),
    }
}

fn apply_skill_overrides(
    skill: SkillDefinition,
    overrides: &[OverlayOverride],
) -> SkillRuntimeEntry {
    let mut status = skill.status();
    let mut autonomy = skill.autonomy();
    let mut rate_limit = skill.rate_limit();
    let mut channels = None;
    let mut actors = None;

    for entry in overrides {
        if entry.name != skill.name() {
            continue;
        }
        if entry.version.as_deref().is_some_and(|v| v != skill.version()) {
            continue;
        }
        if let Some(next) = entry.status {
            status = next.into();
        }
        if let Some(next) = entry.autonomy {
            autonomy = next;
        }
        if let Some(next) = entry.rate_limit {
            rate_limit = Some(next);
        }
        if let Some(lists) = &entry.channels {
            channels = Some(allow_deny_to_channels(lists));
        }
        if let Some(lists) = &entry.actors {
            actors = Some(allow_deny_to_actors(lists));
        }
    }

    SkillRuntimeEntry {
        definition: skill,
        status,
        autonomy,
        rate_limit,
        channels,
        actors,
    }
}

fn apply_op_overrides(op: &OpDefinition, overrides: &[OverlayOverride]) -> OpRuntimeEntry {
    let mut status = op.status;
    let mut autonomy = op.autonomy;
    let mut rate_limit = op.rate_limit;
    let mut channels = None;
    let mut actors = None;

    for entry in overrides {
        if entry.name != op.name {
            continue;
        }
        if entry.version.as_deref().is_some_and(|v| v != op.version) {
            continue;
        }
        if let Some(next) = entry.status {
            status = next.into();
        }
        if let Some(next) = entry.autonomy {
            autonomy = next;
        }
        if let Some(next) = entry.rate_limit {
            rate_limit = Some(next);
        }
        if let Some(lists) = &entry.channels {
            channels = Some(allow_deny_to_channels(lists));
        }
        if let Some(lists) = &entry.actors {
            actors = Some(allow_deny_to_actors(lists));
        }
    }

    OpRuntimeEntry {
        definition: op.clone(),
        status,
        autonomy,
        rate_limit,
        channels,
        actors,
    }
}
