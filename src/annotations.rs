//! Annotations embedded in doc comments.
//!
//! ```text
//! // getUser returns one user.
//! // @fn get
//! // @authorization
//! // @description >>>
//! // multi-line
//! // text
//! // <<<
//! ```

use crate::utils::error::{GenError, Result};
use serde::Serialize;

const BLOCK_OPEN: &str = ">>>";
const BLOCK_CLOSE: &str = "<<<";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Annotation {
    pub name: String,
    pub params: Vec<String>,
}

impl Annotation {
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }
}

/// Ordered annotations of one comment plus its free-text description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Annotations {
    entries: Vec<Annotation>,
    description: String,
}

impl Annotations {
    pub fn parse(doc: &str) -> Result<Self> {
        let mut entries: Vec<Annotation> = Vec::new();
        let mut description = Vec::new();
        let mut lines = doc.lines();

        while let Some(line) = lines.next() {
            let trimmed = line.trim();
            let Some(body) = trimmed.strip_prefix('@') else {
                if entries.is_empty() {
                    description.push(trimmed);
                }
                continue;
            };

            let mut parts = body.split_whitespace();
            let name = parts.next().unwrap_or_default().to_string();
            if name.is_empty() {
                return Err(GenError::AnnotationError {
                    message: format!("annotation without a name: {:?}", trimmed),
                });
            }
            if entries.iter().any(|entry| entry.name == name) {
                return Err(GenError::AnnotationError {
                    message: format!("duplicate annotation @{}", name),
                });
            }

            let rest: Vec<&str> = parts.collect();
            let params = if rest.first() == Some(&BLOCK_OPEN) {
                let mut block = Vec::new();
                let mut closed = false;
                for inner in lines.by_ref() {
                    if inner.trim() == BLOCK_CLOSE {
                        closed = true;
                        break;
                    }
                    block.push(inner.trim_end());
                }
                if !closed {
                    return Err(GenError::AnnotationError {
                        message: format!("@{} block is not closed with {}", name, BLOCK_CLOSE),
                    });
                }
                vec![block.join("\n")]
            } else {
                rest.into_iter().map(str::to_string).collect()
            };

            entries.push(Annotation { name, params });
        }

        while description.last().is_some_and(|line| line.is_empty()) {
            description.pop();
        }

        Ok(Self {
            entries,
            description: description.join("\n"),
        })
    }

    pub fn get(&self, name: &str) -> Option<&Annotation> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// First parameter of `name`, if the annotation is present and has one.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|entry| entry.param(0))
    }

    /// All parameters of `name` joined by spaces, for free-text annotations
    /// such as `@title Get user`.
    pub fn text(&self, name: &str) -> Option<String> {
        self.get(name).map(|entry| entry.params.join(" "))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Annotation> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line_and_block_forms() {
        let doc = "getUser returns one user.\n@fn get\n@authorization\n@description >>>\nfirst line\n  second line\n<<<\n@errors a b";
        let annotations = Annotations::parse(doc).unwrap();

        assert_eq!(annotations.description(), "getUser returns one user.");
        assert_eq!(annotations.value("fn"), Some("get"));
        assert!(annotations.contains("authorization"));
        assert_eq!(annotations.get("authorization").unwrap().params.len(), 0);
        assert_eq!(
            annotations.value("description"),
            Some("first line\n  second line")
        );
        assert_eq!(annotations.get("errors").unwrap().params, vec!["a", "b"]);
        assert_eq!(annotations.text("errors").as_deref(), Some("a b"));
        assert_eq!(annotations.text("authorization").as_deref(), Some(""));
        let names: Vec<&str> = annotations.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["fn", "authorization", "description", "errors"]);
    }

    #[test]
    fn test_duplicate_annotation_fails() {
        let err = Annotations::parse("@fn a\n@fn b").unwrap_err();
        assert!(err.to_string().contains("duplicate annotation @fn"));
    }

    #[test]
    fn test_unclosed_block_fails() {
        assert!(Annotations::parse("@description >>>\nnever closed").is_err());
    }

    #[test]
    fn test_plain_comment_has_no_annotations() {
        let annotations = Annotations::parse("just words\n\n").unwrap();
        assert!(annotations.is_empty());
        assert_eq!(annotations.description(), "just words");
    }
}
