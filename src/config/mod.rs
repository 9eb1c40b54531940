pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
use crate::utils::error::Result;
#[cfg(feature = "cli")]
use crate::utils::validation::{self, Validate};
#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "fngen")]
#[command(about = "Generates service registration code for annotated Go functions")]
pub struct CliConfig {
    /// Project directory containing go.mod
    #[arg(default_value = ".")]
    pub project_dir: PathBuf,

    #[arg(long, help = "Workspace file (go.work) the project is a use of")]
    pub work: Option<PathBuf>,

    #[arg(long, help = "Generator config file, defaults to <project>/fngen.toml")]
    pub config: Option<PathBuf>,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Log CPU and memory usage at every step")]
    pub monitor: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub log_json: bool,

    #[arg(long, help = "Write the resolved service model as JSON to this file")]
    pub dump: Option<PathBuf>,

    #[arg(long, help = "Maximum units running at once, overrides the config file")]
    pub concurrency: Option<usize>,
}

#[cfg(feature = "cli")]
impl CliConfig {
    pub fn mod_file(&self) -> PathBuf {
        self.project_dir.join("go.mod")
    }

    pub fn config_file(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| self.project_dir.join(toml_config::DEFAULT_CONFIG_FILE))
    }
}

#[cfg(feature = "cli")]
impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_path("project_dir", &self.project_dir.to_string_lossy())?;
        if let Some(work) = &self.work {
            validation::validate_path("work", &work.to_string_lossy())?;
        }
        if let Some(dump) = &self.dump {
            validation::validate_path("dump", &dump.to_string_lossy())?;
        }
        if let Some(concurrency) = self.concurrency {
            validation::validate_range("concurrency", concurrency, 0, 4096)?;
        }
        Ok(())
    }
}

#[cfg(all(test, feature = "cli"))]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cli_arguments() {
        let config = CliConfig::parse_from([
            "fngen",
            "./app",
            "--work",
            "../go.work",
            "--concurrency",
            "8",
            "-v",
        ]);
        assert_eq!(config.project_dir, PathBuf::from("./app"));
        assert_eq!(config.mod_file(), PathBuf::from("./app/go.mod"));
        assert_eq!(config.config_file(), PathBuf::from("./app/fngen.toml"));
        assert_eq!(config.concurrency, Some(8));
        assert!(config.verbose);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_excessive_concurrency() {
        let config = CliConfig::parse_from(["fngen", "--concurrency", "100000"]);
        assert!(config.validate().is_err());
    }
}
