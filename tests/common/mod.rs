#![allow(dead_code)]

use fngen::domain::ports::Storage;
use fngen::modules::cache::ModCache;
use fngen::modules::Env;
use fngen::types::builtin::BuiltinRegistry;
use fngen::utils::error::{GenError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

pub const APP: &str = "example.com/app";

/// A throwaway directory holding Go projects and a private module cache.
pub struct Fixture {
    dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        relative
            .split('/')
            .fold(self.root().to_path_buf(), |dir, segment| dir.join(segment))
    }

    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn cache(&self) -> ModCache {
        ModCache::new(self.path("gomodcache"))
    }

    /// Writes a module into the private cache as `path@version`.
    pub fn cached_module(&self, path: &str, version: &str, files: &[(&str, &str)]) -> PathBuf {
        let dir = self.cache().dir(path, version);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("go.mod"), format!("module {}\n\ngo 1.21\n", path)).unwrap();
        for (relative, content) in files {
            let file = relative.split('/').fold(dir.clone(), |dir, s| dir.join(s));
            std::fs::create_dir_all(file.parent().unwrap()).unwrap();
            std::fs::write(file, content).unwrap();
        }
        dir
    }

    pub fn env(&self) -> Arc<Env> {
        Env::new(BuiltinRegistry::with_defaults(), self.cache())
    }

    /// Minimal `example.com/app` module at `<root>/app`.
    pub fn app(&self, requires: &str) -> PathBuf {
        self.write(
            "app/go.mod",
            &format!("module {}\n\ngo 1.21\n{}", APP, requires),
        )
    }
}

/// Storage keeping written files in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    writes: Arc<AtomicUsize>,
}

impl MemoryStorage {
    /// Number of `write_file` calls so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.files.lock().keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn content(&self, path: &str) -> Option<String> {
        self.files
            .lock()
            .get(path)
            .map(|data| String::from_utf8_lossy(data).into_owned())
    }
}

impl Storage for MemoryStorage {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        self.files
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| GenError::not_found("file", path))
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.files.lock().insert(path.to_string(), data.to_vec());
        Ok(())
    }
}

pub const USERS_DOC: &str = r#"// Package users manages accounts.
// @service users
// @title Users
package users
"#;

pub const USERS_MODELS: &str = r#"package users

import "time"

type User struct {
	Id       string    `json:"id"`
	Nickname string    `json:"nickname"`
	Created  time.Time `json:"created"`
}

type GetUserParam struct {
	Id string `json:"id"`
}
"#;

pub const USERS_GET: &str = r#"package users

import "context"

// getUser
// @fn get
// @readonly
// @title Get user
func getUser(ctx context.Context, param GetUserParam) (result *User, err error) {
	return
}
"#;
