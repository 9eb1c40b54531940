use crate::modules::modfile::{ModFile, Replace, WorkFile};
use crate::modules::{Env, Module};
use crate::utils::error::{GenError, Result};
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A `go.work` overlay: local modules that take precedence over requires.
///
/// Use modules keep an `Arc` back to their workspace, so a workspace and its
/// modules live until the generation run ends.
#[derive(Debug)]
pub struct Work {
    file: PathBuf,
    dir: PathBuf,
    env: Arc<Env>,
    parsed: OnceCell<WorkState>,
}

#[derive(Debug)]
struct WorkState {
    uses: Vec<Arc<Module>>,
    replaces: Vec<Replace>,
}

impl Work {
    /// Loads and parses the workspace declared by `file`.
    pub fn load(file: impl AsRef<Path>, env: Arc<Env>) -> Result<Arc<Work>> {
        let file = file.as_ref();
        if !file.is_file() {
            return Err(GenError::not_found("go.work", file.display().to_string()));
        }
        let file = file.canonicalize().map_err(|e| GenError::file(file, e))?;
        let dir = file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));

        let work = Arc::new(Work {
            file,
            dir,
            env,
            parsed: OnceCell::new(),
        });
        work.parse()?;
        Ok(work)
    }

    /// Idempotent.
    pub fn parse(self: &Arc<Self>) -> Result<()> {
        self.parsed
            .get_or_try_init(|| {
                let declared = WorkFile::read(&self.file)?;
                let mut uses = Vec::with_capacity(declared.uses.len());
                for dir in &declared.uses {
                    let dir = self.dir.join(dir);
                    let dir = dir.canonicalize().map_err(|_| {
                        GenError::not_found("workspace use", dir.display().to_string())
                    })?;
                    let modfile = ModFile::read(&dir.join("go.mod"))?;
                    tracing::debug!("Workspace uses {} at {}", modfile.module, dir.display());
                    uses.push(Module::in_workspace(
                        dir,
                        modfile.module,
                        self.env.clone(),
                        self.clone(),
                    ));
                }
                Ok(WorkState {
                    uses,
                    replaces: declared.replaces,
                })
            })
            .map(|_| ())
            .map_err(|e| GenError::module(self.file.display().to_string(), e))
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn uses(&self) -> &[Arc<Module>] {
        self.parsed.get().map(|s| s.uses.as_slice()).unwrap_or_default()
    }

    pub fn replaces(&self) -> &[Replace] {
        self.parsed
            .get()
            .map(|s| s.replaces.as_slice())
            .unwrap_or_default()
    }

    pub fn use_by_path(&self, path: &str) -> Option<Arc<Module>> {
        self.uses().iter().find(|m| m.path() == path).cloned()
    }

    pub fn use_by_dir(&self, dir: &Path) -> Option<Arc<Module>> {
        self.uses().iter().find(|m| m.dir() == dir).cloned()
    }
}
