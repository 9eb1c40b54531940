//! Module graph loader.
//!
//! A [`Module`] starts out knowing only where it lives. [`Module::parse`]
//! reads its `go.mod`, wires its requirements (workspace uses, shared host
//! entries, package cache locations, replacements) and attaches the
//! resolver shared by the whole graph.

pub mod cache;
pub mod modfile;
pub mod work;

use crate::config::toml_config::GeneratorConfig;
use crate::modules::cache::ModCache;
use crate::modules::modfile::{ModFile, Replace, ReplaceTarget};
use crate::modules::work::Work;
use crate::services::{self, Service};
use crate::sources::Sources;
use crate::types::builtin::BuiltinRegistry;
use crate::types::flight::ChainId;
use crate::types::model::Type;
use crate::types::Types;
use crate::utils::error::{GenError, Result};
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Collaborators shared by every module of one run.
#[derive(Debug)]
pub struct Env {
    pub builtins: Arc<BuiltinRegistry>,
    pub cache: ModCache,
}

impl Env {
    pub fn new(builtins: BuiltinRegistry, cache: ModCache) -> Arc<Self> {
        Arc::new(Self {
            builtins: Arc::new(builtins),
            cache,
        })
    }
}

#[derive(Default)]
struct ModuleState {
    parsed: bool,
    path: String,
    version: String,
    go: Option<String>,
    requires: Vec<Arc<Module>>,
    replace: Option<Arc<Module>>,
    sources: Option<Arc<Sources>>,
    types: Option<Arc<Types>>,
}

pub struct Module {
    dir: PathBuf,
    env: Arc<Env>,
    work: Option<Arc<Work>>,
    parse_lock: Mutex<()>,
    state: RwLock<ModuleState>,
    lookups: DashMap<String, Arc<Module>>,
    services: OnceCell<Arc<Vec<Service>>>,
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Module")
            .field("dir", &self.dir)
            .field("path", &state.path)
            .field("version", &state.version)
            .field("parsed", &state.parsed)
            .field("requires", &state.requires.len())
            .finish()
    }
}

impl Module {
    fn unparsed(
        dir: PathBuf,
        path: String,
        version: String,
        env: Arc<Env>,
        work: Option<Arc<Work>>,
    ) -> Arc<Module> {
        Arc::new(Module {
            dir,
            env,
            work,
            parse_lock: Mutex::new(()),
            state: RwLock::new(ModuleState {
                path,
                version,
                ..ModuleState::default()
            }),
            lookups: DashMap::new(),
            services: OnceCell::new(),
        })
    }

    /// Module rooted at the directory of `decl_file` (a `go.mod`).
    pub fn new(decl_file: impl AsRef<Path>, env: Arc<Env>) -> Result<Arc<Module>> {
        let dir = decl_dir(decl_file.as_ref())?;
        Ok(Module::unparsed(dir, String::new(), String::new(), env, None))
    }

    /// Module declared by `decl_file`, which must be a `use` of the workspace.
    pub fn new_with_work(
        decl_file: impl AsRef<Path>,
        work_file: impl AsRef<Path>,
        env: Arc<Env>,
    ) -> Result<Arc<Module>> {
        let dir = decl_dir(decl_file.as_ref())?;
        let work = Work::load(work_file, env)?;
        work.use_by_dir(&dir).ok_or_else(|| {
            GenError::not_found(
                format!("workspace use in {}", work.file().display()),
                dir.display().to_string(),
            )
        })
    }

    pub(crate) fn in_workspace(
        dir: PathBuf,
        path: String,
        env: Arc<Env>,
        work: Arc<Work>,
    ) -> Arc<Module> {
        Module::unparsed(dir, path, String::new(), env, Some(work))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn env(&self) -> &Arc<Env> {
        &self.env
    }

    pub fn work(&self) -> Option<&Arc<Work>> {
        self.work.as_ref()
    }

    pub fn path(&self) -> String {
        self.state.read().path.clone()
    }

    pub fn version(&self) -> String {
        self.state.read().version.clone()
    }

    pub fn go_version(&self) -> Option<String> {
        self.state.read().go.clone()
    }

    pub fn is_parsed(&self) -> bool {
        self.state.read().parsed
    }

    pub fn requires(&self) -> Vec<Arc<Module>> {
        self.state.read().requires.clone()
    }

    pub fn replace(&self) -> Option<Arc<Module>> {
        self.state.read().replace.clone()
    }

    /// The module actually providing this one's packages.
    pub fn resolved(self: &Arc<Self>) -> Arc<Module> {
        self.replace().unwrap_or_else(|| self.clone())
    }

    pub fn sources(self: &Arc<Self>) -> Result<Arc<Sources>> {
        let target = self.resolved();
        let sources = target.state.read().sources.clone();
        sources.ok_or_else(|| self.not_parsed())
    }

    pub fn types(&self) -> Result<Arc<Types>> {
        let types = self.state.read().types.clone();
        types.ok_or_else(|| self.not_parsed())
    }

    fn not_parsed(&self) -> GenError {
        GenError::module(self.label(), GenError::resolve("module is not parsed"))
    }

    fn label(&self) -> String {
        let state = self.state.read();
        match (state.path.is_empty(), state.version.is_empty()) {
            (true, _) => self.dir.display().to_string(),
            (false, true) => state.path.clone(),
            (false, false) => format!("{}@{}", state.path, state.version),
        }
    }

    /// Reads the declaration and wires requirements. Idempotent.
    ///
    /// `host` is the module this one is required by; its requirement entries
    /// and resolver are shared.
    pub fn parse(self: &Arc<Self>, host: Option<&Arc<Module>>) -> Result<()> {
        let _guard = self.parse_lock.lock();
        if self.state.read().parsed {
            return Ok(());
        }
        self.parse_locked(host)
            .map_err(|e| GenError::module(self.label(), e))
    }

    fn parse_locked(self: &Arc<Self>, host: Option<&Arc<Module>>) -> Result<()> {
        if let Some(replace) = self.replace() {
            replace.parse(host)?;
            let types = replace.types()?;
            let mut state = self.state.write();
            state.types = Some(types);
            state.parsed = true;
            return Ok(());
        }

        let modfile = ModFile::read(&self.dir.join("go.mod"))?;
        tracing::debug!("Parsing module {} at {}", modfile.module, self.dir.display());

        let host_requires = host.map(|h| h.requires()).unwrap_or_default();
        let work_replaces: &[Replace] = self.work.as_ref().map(|w| w.replaces()).unwrap_or_default();

        let mut requires = Vec::with_capacity(modfile.requires.len());
        for require in &modfile.requires {
            if let Some(used) = self.work.as_ref().and_then(|w| w.use_by_path(&require.path)) {
                requires.push(used);
                continue;
            }
            if let Some(shared) = host_requires.iter().find(|m| m.path() == require.path) {
                requires.push(shared.clone());
                continue;
            }

            let dir = self.env.cache.dir(&require.path, &require.version);
            let module = Module::unparsed(
                dir,
                require.path.clone(),
                require.version.clone(),
                self.env.clone(),
                self.work.clone(),
            );

            let replace = match (
                work_replaces.iter().find(|r| r.matches(&require.path, &require.version)),
                self.work.as_ref(),
            ) {
                (Some(replace), Some(work)) => Some((replace, work.dir().to_path_buf())),
                _ => modfile
                    .replaces
                    .iter()
                    .find(|r| r.matches(&require.path, &require.version))
                    .map(|replace| (replace, self.dir.clone())),
            };
            if let Some((replace, base)) = replace {
                let target = self.locate_replacement(replace, &base)?;
                tracing::debug!("Replacing {} with {}", require.path, target.dir.display());
                module.state.write().replace = Some(target);
            }
            requires.push(module);
        }
        requires.sort_by(|a, b| by_path_segments_desc(&a.path(), &b.path()));

        let types = match host {
            Some(host) => host.types()?,
            None => Arc::new(Types::new(self.env.builtins.clone())),
        };
        let sources = Arc::new(Sources::new(modfile.module.clone(), self.dir.clone()));

        let mut state = self.state.write();
        state.path = modfile.module;
        state.go = modfile.go;
        state.requires = requires;
        state.types = Some(types);
        state.sources = Some(sources);
        state.parsed = true;
        Ok(())
    }

    fn locate_replacement(&self, replace: &Replace, base: &Path) -> Result<Arc<Module>> {
        let (dir, version) = match &replace.target {
            ReplaceTarget::Dir(dir) if dir.is_absolute() => (dir.clone(), String::new()),
            ReplaceTarget::Dir(dir) => (base.join(dir), String::new()),
            ReplaceTarget::Module { path, version } => {
                (self.env.cache.dir(path, version), version.clone())
            }
        };
        let modfile = ModFile::read(&dir.join("go.mod"))
            .map_err(|e| GenError::module(format!("replacement of {}", replace.path), e))?;
        Ok(Module::unparsed(
            dir,
            modfile.module,
            version,
            self.env.clone(),
            self.work.clone(),
        ))
    }

    /// Finds the module providing package `path`, searching requirements
    /// depth-first before this module itself.
    pub fn find_module_by_path(self: &Arc<Self>, path: &str) -> Result<Arc<Module>> {
        if let Some(found) = self.lookups.get(path) {
            return Ok(found.clone());
        }
        self.parse(None)?;

        let mut visited = HashSet::new();
        let found = self
            .find_in(path, &mut visited)?
            .ok_or_else(|| GenError::not_found("module", path))?;
        self.lookups.insert(path.to_string(), found.clone());
        Ok(found)
    }

    fn find_in(
        self: &Arc<Self>,
        path: &str,
        visited: &mut HashSet<String>,
    ) -> Result<Option<Arc<Module>>> {
        let own_path = self.path();
        visited.insert(own_path.clone());
        let target = self.resolved();

        for require in target.requires() {
            let require_path = require.path();
            if visited.contains(&require_path) {
                continue;
            }
            if let Err(err) = require.parse(Some(&target)) {
                if provides(&require_path, path) {
                    return Err(err);
                }
                tracing::warn!("Skipping {} while looking up {}: {}", require_path, path, err);
                visited.insert(require_path);
                continue;
            }
            if let Some(found) = require.find_in(path, visited)? {
                return Ok(Some(found));
            }
        }

        if provides(&own_path, path) {
            return Ok(Some(target));
        }
        Ok(None)
    }

    /// Resolves the named type `path.name` against this module's graph.
    pub fn parse_type(self: &Arc<Self>, path: &str, name: &str) -> Result<Type> {
        self.parse(None)?;
        self.types()?.resolve_named(self, path, name, ChainId::next())
    }

    /// Services declared under the configured services directory, discovered once.
    pub fn services(self: &Arc<Self>, config: &GeneratorConfig) -> Result<Arc<Vec<Service>>> {
        self.services
            .get_or_try_init(|| services::discover(self, config).map(Arc::new))
            .cloned()
    }
}

fn decl_dir(decl_file: &Path) -> Result<PathBuf> {
    if !decl_file.is_file() {
        return Err(GenError::not_found("go.mod", decl_file.display().to_string()));
    }
    let decl_file = decl_file
        .canonicalize()
        .map_err(|e| GenError::file(decl_file, e))?;
    Ok(decl_file
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("/")))
}

/// Whether module `module_path` contains package `path`.
fn provides(module_path: &str, path: &str) -> bool {
    !module_path.is_empty()
        && (path == module_path
            || path
                .strip_prefix(module_path)
                .is_some_and(|rest| rest.starts_with('/')))
}

/// Descending by path segments, so `a/b/c` is visited before `a/b`.
fn by_path_segments_desc(a: &str, b: &str) -> Ordering {
    let a = a.split('/');
    let b = b.split('/');
    b.cmp(a)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provides() {
        assert!(provides("example.com/app", "example.com/app"));
        assert!(provides("example.com/app", "example.com/app/users"));
        assert!(!provides("example.com/app", "example.com/application"));
        assert!(!provides("", "example.com/app"));
    }

    #[test]
    fn test_requirement_order() {
        let mut paths = vec![
            "github.com/acme/lib",
            "golang.org/x/sync",
            "github.com/acme/lib/v2",
            "github.com/acme/errors",
        ];
        paths.sort_by(|a, b| by_path_segments_desc(a, b));
        assert_eq!(
            paths,
            vec![
                "golang.org/x/sync",
                "github.com/acme/lib/v2",
                "github.com/acme/lib",
                "github.com/acme/errors",
            ]
        );
    }
}
