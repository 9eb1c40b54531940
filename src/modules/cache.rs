use std::path::{Path, PathBuf};

/// Location of the shared module download cache (`GOMODCACHE`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModCache {
    root: PathBuf,
}

impl ModCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `GOMODCACHE`, else the first `GOPATH` entry + `pkg/mod`, else `~/go/pkg/mod`.
    pub fn from_env() -> Self {
        if let Some(root) = std::env::var_os("GOMODCACHE").filter(|v| !v.is_empty()) {
            return Self::new(root);
        }
        if let Some(gopath) = std::env::var_os("GOPATH").filter(|v| !v.is_empty()) {
            if let Some(first) = std::env::split_paths(&gopath).next() {
                return Self::new(first.join("pkg").join("mod"));
            }
        }
        let home = dirs::home_dir().unwrap_or_default();
        Self::new(home.join("go").join("pkg").join("mod"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of `path@version` inside the cache.
    pub fn dir(&self, path: &str, version: &str) -> PathBuf {
        let escaped = format!("{}@{}", escape(path), escape(version));
        escaped
            .split('/')
            .fold(self.root.clone(), |dir, segment| dir.join(segment))
    }
}

/// Module cache case escaping: every uppercase letter becomes `!` + lowercase.
pub fn escape(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        if c.is_ascii_uppercase() {
            out.push('!');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape("github.com/BurntSushi/toml"), "github.com/!burnt!sushi/toml");
        assert_eq!(escape("golang.org/x/sync"), "golang.org/x/sync");
    }

    #[test]
    fn test_dir() {
        let cache = ModCache::new("/gopath/pkg/mod");
        assert_eq!(
            cache.dir("github.com/Acme/lib", "v1.2.0"),
            PathBuf::from("/gopath/pkg/mod/github.com/!acme/lib@v1.2.0")
        );
    }
}
