//! The generator action: load the module graph, discover services and run
//! the `parse` / `write` / `deploys` process.

use crate::config::toml_config::GeneratorConfig;
use crate::core::process::{Process, Running};
use crate::domain::model::{Summary, UnitResult};
use crate::domain::ports::{Storage, Unit};
use crate::modules::cache::ModCache;
use crate::modules::{Env, Module};
use crate::services::{Function, Service};
use crate::types::builtin::BuiltinRegistry;
use crate::types::model::Type;
use crate::utils::error::{GenError, Result};
use crate::writer::{self, Writer};
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

pub const STEP_PARSE: &str = "parse";
pub const STEP_WRITE: &str = "write";
pub const STEP_DEPLOYS: &str = "deploys";

/// Where the project lives and how its dependencies are located.
#[derive(Debug, Clone)]
pub struct Project {
    pub mod_file: PathBuf,
    pub work_file: Option<PathBuf>,
    pub cache: ModCache,
}

impl Project {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            mod_file: dir.as_ref().join("go.mod"),
            work_file: None,
            cache: ModCache::from_env(),
        }
    }

    pub fn with_work(mut self, work_file: Option<PathBuf>) -> Self {
        self.work_file = work_file;
        self
    }

    pub fn with_cache(mut self, cache: ModCache) -> Self {
        self.cache = cache;
        self
    }
}

fn builtins(config: &GeneratorConfig) -> BuiltinRegistry {
    let mut registry = BuiltinRegistry::with_defaults();
    for qualified in &config.conventions.error_types {
        if let Some((path, name)) = qualified.rsplit_once('.') {
            registry.register_error(path, name);
        }
    }
    registry
}

pub struct Generator<S: Storage + 'static> {
    module: Arc<Module>,
    services: Arc<Vec<Service>>,
    config: Arc<GeneratorConfig>,
    storage: Arc<S>,
    writer: Arc<Writer>,
}

impl<S: Storage + 'static> Generator<S> {
    /// Loads and parses the module graph and discovers services. Blocking.
    pub fn load(project: Project, config: GeneratorConfig, storage: S) -> Result<Self> {
        let env = Env::new(builtins(&config), project.cache);
        let module = match &project.work_file {
            Some(work_file) => Module::new_with_work(&project.mod_file, work_file, env)?,
            None => Module::new(&project.mod_file, env)?,
        };
        module.parse(None)?;
        tracing::info!(
            "📦 Loaded module {} ({} requirements)",
            module.path(),
            module.requires().len()
        );

        let services = module.services(&config)?;
        tracing::debug!(
            "{} functions across {} services",
            services.iter().map(|s| s.functions.len()).sum::<usize>(),
            services.len()
        );

        Ok(Self {
            module,
            services,
            config: Arc::new(config),
            storage: Arc::new(storage),
            writer: Arc::new(Writer::new()?),
        })
    }

    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Builds the three-step process. Steps with nothing to do are still
    /// added so numbering stays stable.
    pub fn process(&self) -> Process {
        let mut process = Process::new().with_concurrency(self.config.concurrency());

        let parse: Vec<Arc<dyn Unit>> = self
            .services
            .iter()
            .flat_map(|service| service.functions.iter())
            .map(|function| {
                Arc::new(ParseUnit {
                    function: function.clone(),
                    config: self.config.clone(),
                }) as Arc<dyn Unit>
            })
            .collect();
        process.add(STEP_PARSE, parse);

        let write: Vec<Arc<dyn Unit>> = (0..self.services.len())
            .map(|index| {
                Arc::new(WriteUnit {
                    index,
                    services: self.services.clone(),
                    root: self.module.dir().to_path_buf(),
                    config: self.config.clone(),
                    storage: self.storage.clone(),
                    writer: self.writer.clone(),
                }) as Arc<dyn Unit>
            })
            .collect();
        process.add(STEP_WRITE, write);

        let deploys: Arc<dyn Unit> = Arc::new(DeploysUnit {
            module_path: self.module.path(),
            services: self.services.clone(),
            root: self.module.dir().to_path_buf(),
            config: self.config.clone(),
            storage: self.storage.clone(),
            writer: self.writer.clone(),
        });
        process.add(STEP_DEPLOYS, vec![deploys]);

        process
    }

    /// Starts the process under `cancel`.
    pub fn start(&self, cancel: &CancellationToken, monitor: bool) -> Running {
        self.process().with_monitoring(monitor).start(cancel)
    }

    /// JSON of the resolved service model. Functions that were not parsed
    /// have no param or result.
    pub fn dump(&self) -> Result<String> {
        let services: Vec<ServiceDump<'_>> = self.services.iter().map(ServiceDump::from).collect();
        let dump = ModelDump {
            module: self.module.path(),
            version: self.module.version(),
            types_parsed: self.module.types()?.parsed_count(),
            services,
        };
        Ok(serde_json::to_string_pretty(&dump)?)
    }
}

/// Drains `running`, calling `on_result` for every result.
pub async fn collect(mut running: Running, mut on_result: impl FnMut(&UnitResult)) -> Summary {
    let started = Instant::now();
    let mut summary = Summary::default();
    while let Some(result) = running.recv().await {
        summary.record(&result);
        on_result(&result);
    }
    summary.elapsed = started.elapsed();
    summary
}

struct ParseUnit {
    function: Arc<Function>,
    config: Arc<GeneratorConfig>,
}

#[async_trait]
impl Unit for ParseUnit {
    fn name(&self) -> String {
        self.function.id()
    }

    async fn handle(&self, _cancel: &CancellationToken) -> Result<String> {
        let function = self.function.clone();
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || -> Result<String> {
            function.parse(&config.conventions)?;
            Ok(function.name.clone())
        })
        .await
        .map_err(|e| GenError::UnitInterrupted {
            unit: self.function.id(),
            message: e.to_string(),
        })?
    }
}

struct WriteUnit<S: Storage> {
    index: usize,
    services: Arc<Vec<Service>>,
    root: PathBuf,
    config: Arc<GeneratorConfig>,
    storage: Arc<S>,
    writer: Arc<Writer>,
}

#[async_trait]
impl<S: Storage + 'static> Unit for WriteUnit<S> {
    fn name(&self) -> String {
        self.services
            .get(self.index)
            .map(|service| service.name.clone())
            .unwrap_or_default()
    }

    async fn handle(&self, _cancel: &CancellationToken) -> Result<String> {
        let service = self.services.get(self.index).ok_or_else(|| GenError::ServiceError {
            service: self.index.to_string(),
            message: "service index out of range".to_string(),
        })?;
        writer::write_service(
            self.storage.as_ref(),
            &self.writer,
            &self.root,
            service,
            &self.config,
        )
        .await
    }
}

struct DeploysUnit<S: Storage> {
    module_path: String,
    services: Arc<Vec<Service>>,
    root: PathBuf,
    config: Arc<GeneratorConfig>,
    storage: Arc<S>,
    writer: Arc<Writer>,
}

#[async_trait]
impl<S: Storage + 'static> Unit for DeploysUnit<S> {
    fn name(&self) -> String {
        self.config.generator.deploy_file.clone()
    }

    async fn handle(&self, _cancel: &CancellationToken) -> Result<String> {
        writer::write_deploys(
            self.storage.as_ref(),
            &self.writer,
            &self.module_path,
            &self.root,
            &self.services,
            &self.config,
        )
        .await
    }
}

#[derive(Serialize)]
struct ModelDump<'a> {
    module: String,
    version: String,
    types_parsed: usize,
    services: Vec<ServiceDump<'a>>,
}

#[derive(Serialize)]
struct ServiceDump<'a> {
    name: &'a str,
    path: &'a str,
    package: &'a str,
    title: &'a str,
    description: &'a str,
    internal: bool,
    components: Vec<&'a str>,
    functions: Vec<FunctionDump<'a>>,
}

impl<'a> From<&'a Service> for ServiceDump<'a> {
    fn from(service: &'a Service) -> Self {
        Self {
            name: &service.name,
            path: &service.path,
            package: &service.package,
            title: &service.title,
            description: &service.description,
            internal: service.internal,
            components: service.components.iter().map(|c| c.name.as_str()).collect(),
            functions: service
                .functions
                .iter()
                .map(|function| FunctionDump::from(function.as_ref()))
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct FunctionDump<'a> {
    ident: &'a str,
    name: &'a str,
    title: &'a str,
    readonly: bool,
    internal: bool,
    deprecated: bool,
    param: Option<&'a Type>,
    result: Option<&'a Type>,
}

impl<'a> From<&'a Function> for FunctionDump<'a> {
    fn from(function: &'a Function) -> Self {
        let signature = function.signature();
        Self {
            ident: &function.ident,
            name: &function.name,
            title: &function.options.title,
            readonly: function.options.readonly,
            internal: function.options.internal,
            deprecated: function.options.deprecated,
            param: signature.and_then(|s| s.param.as_ref()).map(|f| &f.ty),
            result: signature.and_then(|s| s.result.as_ref()).map(|f| &f.ty),
        }
    }
}
