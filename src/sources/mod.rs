//! Lazy, cached access to the Go packages of one module.

pub mod ast;
pub mod syntax;

use crate::sources::ast::{GoFile, Imports, TypeDecl};
use crate::utils::error::{GenError, Result};
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A type declaration found in a package, with what is needed to resolve it.
#[derive(Debug, Clone)]
pub struct TypeSpec {
    /// Import path of the declaring package.
    pub path: String,
    pub decl: TypeDecl,
    pub imports: Arc<Imports>,
    pub file: PathBuf,
}

/// One source file, parsed on first access.
#[derive(Debug)]
pub struct SourceFile {
    filename: PathBuf,
    parsed: OnceCell<Arc<GoFile>>,
    imports: OnceCell<Arc<Imports>>,
}

impl SourceFile {
    fn new(filename: PathBuf) -> Self {
        Self {
            filename,
            parsed: OnceCell::new(),
            imports: OnceCell::new(),
        }
    }

    pub fn filename(&self) -> &Path {
        &self.filename
    }

    pub fn file(&self) -> Result<Arc<GoFile>> {
        self.parsed
            .get_or_try_init(|| {
                let source = std::fs::read_to_string(&self.filename)
                    .map_err(|e| GenError::file(&self.filename, e))?;
                tracing::debug!("Parsing {}", self.filename.display());
                syntax::parse_file(&self.filename, &source).map(Arc::new)
            })
            .cloned()
    }

    /// Shared import table, so type specs from one file do not copy it.
    pub fn imports(&self) -> Result<Arc<Imports>> {
        self.imports
            .get_or_try_init(|| self.file().map(|file| Arc::new(file.imports.clone())))
            .cloned()
    }
}

/// The parsable files of one package directory.
#[derive(Debug)]
pub struct PackageDir {
    pub path: String,
    pub dir: PathBuf,
    files: Vec<SourceFile>,
}

impl PackageDir {
    fn scan(path: &str, dir: &Path) -> Result<Self> {
        let entries = std::fs::read_dir(dir).map_err(|e| GenError::file(dir, e))?;
        let mut filenames = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| GenError::file(dir, e))?;
            let filename = entry.path();
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            if is_source_file(&filename) {
                filenames.push(filename);
            }
        }
        filenames.sort();

        Ok(Self {
            path: path.to_string(),
            dir: dir.to_path_buf(),
            files: filenames.into_iter().map(SourceFile::new).collect(),
        })
    }

    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }
}

fn is_source_file(filename: &Path) -> bool {
    let Some(name) = filename.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.ends_with(".go")
        && !name.ends_with("_test.go")
        && !name.starts_with('.')
        && !name.starts_with('_')
}

/// Source reader bound to one module (import path + directory).
#[derive(Debug)]
pub struct Sources {
    path: String,
    dir: PathBuf,
    readers: DashMap<String, Arc<PackageDir>>,
}

impl Sources {
    pub fn new(path: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            dir: dir.into(),
            readers: DashMap::new(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Maps an import path inside this module to its directory.
    pub fn destination_path(&self, path: &str) -> Result<PathBuf> {
        if path == self.path {
            return Ok(self.dir.clone());
        }
        let sub = path
            .strip_prefix(self.path.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| GenError::SourceError {
                file: self.dir.clone(),
                message: format!("{} is not a package of module {}", path, self.path),
            })?;
        Ok(sub.split('/').fold(self.dir.clone(), |dir, segment| dir.join(segment)))
    }

    fn package(&self, path: &str) -> Result<Arc<PackageDir>> {
        if let Some(reader) = self.readers.get(path) {
            return Ok(reader.clone());
        }
        let dir = self.destination_path(path)?;
        let scanned = Arc::new(PackageDir::scan(path, &dir)?);
        // a concurrent scan may have won, keep whichever landed first
        let reader = self
            .readers
            .entry(path.to_string())
            .or_insert(scanned)
            .clone();
        Ok(reader)
    }

    /// Visits every parsable file of a package, stopping at the first error.
    /// Each file is parsed once per `Sources`; later visits share it.
    pub fn read_dir<F>(&self, path: &str, mut visit: F) -> Result<()>
    where
        F: FnMut(&SourceFile) -> Result<()>,
    {
        let reader = self.package(path)?;
        for source in reader.files() {
            visit(source)?;
        }
        Ok(())
    }

    /// Finds the top-level type declaration `name` in package `path`.
    pub fn find_type_spec(&self, path: &str, name: &str) -> Result<TypeSpec> {
        let reader = self.package(path)?;
        for source in reader.files() {
            let file = source.file()?;
            if let Some(decl) = file.find_type(name) {
                return Ok(TypeSpec {
                    path: path.to_string(),
                    decl: decl.clone(),
                    imports: source.imports()?,
                    file: source.filename().to_path_buf(),
                });
            }
        }
        Err(GenError::not_found("type", format!("{}.{}", path, name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_destination_path() {
        let sources = Sources::new("example.com/app", "/work/app");
        assert_eq!(
            sources.destination_path("example.com/app/modules/users").unwrap(),
            PathBuf::from("/work/app/modules/users")
        );
        assert_eq!(
            sources.destination_path("example.com/app").unwrap(),
            PathBuf::from("/work/app")
        );
        assert!(sources.destination_path("example.com/application").is_err());
        assert!(sources.destination_path("other.com/app").is_err());
    }

    #[test]
    fn test_read_dir_skips_tests_and_caches() {
        let temp = TempDir::new().unwrap();
        let pkg = temp.path().join("models");
        write(&pkg, "a.go", "package models\n\ntype A struct{}\n");
        write(&pkg, "b.go", "package models\n\ntype B struct{}\n");
        write(&pkg, "a_test.go", "package models\n\ntype T struct{}\n");
        write(&pkg, "notes.txt", "not go");

        let sources = Sources::new("example.com/app", temp.path());
        let mut seen = Vec::new();
        let mut files = Vec::new();
        sources
            .read_dir("example.com/app/models", |source| {
                let file = source.file()?;
                assert_eq!(file.package, "models");
                seen.push(source.filename().file_name().unwrap().to_string_lossy().to_string());
                files.push((file, source.imports()?));
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, vec!["a.go", "b.go"]);

        let mut again = Vec::new();
        sources
            .read_dir("example.com/app/models", |source| {
                again.push((source.file()?, source.imports()?));
                Ok(())
            })
            .unwrap();
        assert_eq!(again.len(), 2);
        for ((file, imports), (file_again, imports_again)) in files.iter().zip(&again) {
            assert!(Arc::ptr_eq(file, file_again));
            assert!(Arc::ptr_eq(imports, imports_again));
        }

        let first = sources.package("example.com/app/models").unwrap();
        let second = sources.package("example.com/app/models").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        let parsed_once = first.files()[0].file().unwrap();
        let parsed_twice = first.files()[0].file().unwrap();
        assert!(Arc::ptr_eq(&parsed_once, &parsed_twice));
    }

    #[test]
    fn test_find_type_spec_uses_group_doc() {
        let temp = TempDir::new().unwrap();
        let pkg = temp.path().join("models");
        write(
            &pkg,
            "types.go",
            "package models\n\n// @title shared\ntype (\n\tA struct{}\n\tB struct{}\n)\n",
        );

        let sources = Sources::new("example.com/app", temp.path());
        let spec = sources.find_type_spec("example.com/app/models", "B").unwrap();
        assert_eq!(spec.decl.name, "B");
        assert_eq!(spec.decl.effective_doc(), "@title shared");

        let err = sources
            .find_type_spec("example.com/app/models", "Missing")
            .unwrap_err();
        assert!(matches!(err, GenError::NotFound { .. }));
    }
}
