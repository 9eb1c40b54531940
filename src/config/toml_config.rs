use crate::utils::error::{GenError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// File name looked up in the project directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "fngen.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub generator: GeneratorSection,
    pub conventions: Conventions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorSection {
    /// Directory (relative to the module root) holding one package per service.
    pub services_dir: String,
    /// Generated file written into every service package.
    pub service_file: String,
    /// Generated file written into the services directory.
    pub deploy_file: String,
    /// Maximum units running at once inside a step, 0 means unbounded.
    pub concurrency: usize,
    pub abort_timeout_secs: u64,
}

impl Default for GeneratorSection {
    fn default() -> Self {
        Self {
            services_dir: "modules".to_string(),
            service_file: "fns.go".to_string(),
            deploy_file: "services.go".to_string(),
            concurrency: 0,
            abort_timeout_secs: 10,
        }
    }
}

/// Structural conventions used to recognize framework types in signatures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Conventions {
    /// Import path of the service framework the generated code targets.
    pub framework: String,
    /// `path.Name` of types accepted as the leading context parameter.
    pub context_types: Vec<String>,
    /// `path.Name` of types accepted as the trailing error result, besides `error`.
    pub error_types: Vec<String>,
}

impl Default for Conventions {
    fn default() -> Self {
        Self {
            framework: "github.com/aacfactory/fns".to_string(),
            context_types: vec![
                "context.Context".to_string(),
                "github.com/aacfactory/fns/context.Context".to_string(),
            ],
            error_types: vec!["github.com/aacfactory/errors.CodeError".to_string()],
        }
    }
}

fn split_qualified(value: &str) -> Option<(&str, &str)> {
    value.rsplit_once('.')
}

impl Conventions {
    fn matches(list: &[String], path: &str, name: &str) -> bool {
        list.iter()
            .filter_map(|entry| split_qualified(entry))
            .any(|(p, n)| p == path && n == name)
    }

    pub fn is_context(&self, path: &str, name: &str) -> bool {
        Self::matches(&self.context_types, path, name)
    }

    pub fn is_error(&self, path: &str, name: &str) -> bool {
        Self::matches(&self.error_types, path, name)
    }

    /// Import paths every generated service file needs.
    pub fn service_imports(&self) -> Vec<String> {
        vec![
            "context".to_string(),
            format!("{}/runtime", self.framework),
            format!("{}/services", self.framework),
        ]
    }
}

impl GeneratorConfig {
    /// Loads the config file, falling back to defaults when it does not exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("No generator config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::from_file(path)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| GenError::file(path.as_ref(), e))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| GenError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` references with environment values, leaving unknown ones intact.
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| GenError::ConfigError {
            message: format!("invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn abort_timeout(&self) -> Duration {
        Duration::from_secs(self.generator.abort_timeout_secs)
    }

    /// `None` when steps may fan out without a cap.
    pub fn concurrency(&self) -> Option<usize> {
        match self.generator.concurrency {
            0 => None,
            n => Some(n),
        }
    }
}

impl Validate for GeneratorConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_path("generator.services_dir", &self.generator.services_dir)?;
        validation::validate_go_file_name("generator.service_file", &self.generator.service_file)?;
        validation::validate_go_file_name("generator.deploy_file", &self.generator.deploy_file)?;
        validation::validate_range(
            "generator.abort_timeout_secs",
            self.generator.abort_timeout_secs,
            1,
            3600,
        )?;
        validation::validate_non_empty_string("conventions.framework", &self.conventions.framework)?;

        if self.conventions.context_types.is_empty() {
            return Err(GenError::InvalidConfigValueError {
                field: "conventions.context_types".to_string(),
                value: "[]".to_string(),
                reason: "At least one context type is required".to_string(),
            });
        }
        for value in &self.conventions.context_types {
            validation::validate_qualified_name("conventions.context_types", value)?;
        }
        for value in &self.conventions.error_types {
            validation::validate_qualified_name("conventions.error_types", value)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_partial_toml_config() {
        let toml_content = r#"
[generator]
services_dir = "services"
concurrency = 4
"#;

        let config = GeneratorConfig::from_toml_str(toml_content).unwrap();

        assert_eq!(config.generator.services_dir, "services");
        assert_eq!(config.generator.service_file, "fns.go");
        assert_eq!(config.concurrency(), Some(4));
        assert!(config.conventions.is_context("context", "Context"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("FNGEN_TEST_FRAMEWORK", "example.com/framework");

        let toml_content = r#"
[conventions]
framework = "${FNGEN_TEST_FRAMEWORK}"
context_types = ["context.Context"]
"#;

        let config = GeneratorConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.conventions.framework, "example.com/framework");
        assert_eq!(
            config.conventions.service_imports()[1],
            "example.com/framework/runtime"
        );

        std::env::remove_var("FNGEN_TEST_FRAMEWORK");
    }

    #[test]
    fn test_config_validation() {
        let toml_content = r#"
[generator]
service_file = "fns.txt"
"#;

        let config = GeneratorConfig::from_toml_str(toml_content).unwrap();
        assert!(config.validate().is_err());

        let config = GeneratorConfig::from_toml_str("[conventions]\ncontext_types = []\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[generator]\ndeploy_file = \"deploys.go\"\n")
            .unwrap();

        let config = GeneratorConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.generator.deploy_file, "deploys.go");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = GeneratorConfig::load_or_default("/nonexistent/fngen.toml").unwrap();
        assert_eq!(config.generator.services_dir, "modules");
        assert_eq!(config.concurrency(), None);
    }
}
