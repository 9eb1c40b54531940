use crate::domain::ports::Storage;
use crate::utils::error::{GenError, Result};
use std::path::PathBuf;

/// Storage rooted at the module directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }
}

impl Storage for LocalStorage {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.base_path.join(path);
        tokio::fs::read(&full_path)
            .await
            .map_err(|e| GenError::file(full_path, e))
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.base_path.join(path);

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| GenError::file(parent, e))?;
        }

        tokio::fs::write(&full_path, data)
            .await
            .map_err(|e| GenError::file(full_path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path());

        storage
            .write_file("modules/users/fns.go", b"package users\n")
            .await
            .unwrap();

        let data = storage.read_file("modules/users/fns.go").await.unwrap();
        assert_eq!(data, b"package users\n");
    }

    #[tokio::test]
    async fn test_read_missing_file_names_path() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path());

        let err = storage.read_file("missing.go").await.unwrap_err();
        assert!(err.to_string().contains("missing.go"));
    }
}
