pub mod annotations;
pub mod config;
pub mod core;
pub mod domain;
pub mod modules;
pub mod services;
pub mod sources;
pub mod types;
pub mod utils;
pub mod writer;

pub use config::cli::LocalStorage;
pub use config::toml_config::GeneratorConfig;
#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use crate::core::{Generator, Process, Project};
pub use modules::Module;
pub use types::model::Type;
pub use utils::error::{GenError, Result};
