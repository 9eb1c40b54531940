//! Go source emission through minijinja templates.

use crate::config::toml_config::GeneratorConfig;
use crate::domain::ports::Storage;
use crate::services::{Service, ServiceImports};
use crate::sources::ast::Import;
use crate::utils::error::{GenError, Result};
use minijinja::Environment;
use serde::Serialize;
use std::path::Path;

const SERVICE_TEMPLATE: &str = "service.go";
const DEPLOYS_TEMPLATE: &str = "deploys.go";

#[derive(Debug, Serialize)]
struct ImportView {
    alias: Option<String>,
    path: String,
}

impl From<Import> for ImportView {
    fn from(import: Import) -> Self {
        Self {
            alias: import.alias,
            path: import.path,
        }
    }
}

#[derive(Debug, Serialize)]
struct FunctionView {
    ident: String,
    name: String,
    proxy_ident: String,
    handler_ident: String,
    const_ident: String,
    title: String,
    param: Option<String>,
    result: Option<String>,
    readonly: bool,
    internal: bool,
    deprecated: bool,
    authorization: bool,
    validation: bool,
}

#[derive(Debug, Serialize)]
struct ServiceView {
    package: String,
    name: String,
    internal: bool,
    imports: Vec<ImportView>,
    functions: Vec<FunctionView>,
    components: Vec<String>,
}

#[derive(Debug, Serialize)]
struct DeployEntry {
    alias: Option<String>,
}

#[derive(Debug, Serialize)]
struct DeploysView {
    package: String,
    imports: Vec<ImportView>,
    services: Vec<DeployEntry>,
}

/// Renders service and deploy files.
pub struct Writer {
    env: Environment<'static>,
}

impl Writer {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_keep_trailing_newline(true);
        env.add_template(SERVICE_TEMPLATE, include_str!("../../templates/service.go.j2"))?;
        env.add_template(DEPLOYS_TEMPLATE, include_str!("../../templates/deploys.go.j2"))?;
        Ok(Self { env })
    }

    /// Renders the generated file of one service. Every function must have
    /// been parsed.
    pub fn render_service(&self, service: &Service) -> Result<String> {
        let mut functions = Vec::with_capacity(service.functions.len());
        for function in &service.functions {
            let signature = function.signature().ok_or_else(|| GenError::ServiceError {
                service: service.name.clone(),
                message: format!("function {} was not parsed", function.ident),
            })?;
            functions.push(FunctionView {
                ident: function.ident.clone(),
                name: function.name.clone(),
                proxy_ident: function.proxy_ident.clone(),
                handler_ident: function.handler_ident.clone(),
                const_ident: function.const_ident.clone(),
                title: function.options.title.clone(),
                param: signature
                    .param
                    .as_ref()
                    .map(|param| service.render_type(function, &param.expr)),
                result: signature
                    .result
                    .as_ref()
                    .map(|result| service.render_type(function, &result.expr)),
                readonly: function.options.readonly,
                internal: function.options.internal,
                deprecated: function.options.deprecated,
                authorization: function.options.authorization,
                validation: function.options.validation,
            });
        }

        let view = ServiceView {
            package: service.package.clone(),
            name: service.name.clone(),
            internal: service.internal,
            imports: service.imports.sorted().into_iter().map(ImportView::from).collect(),
            functions,
            components: service.components.iter().map(|c| c.ident.clone()).collect(),
        };
        let template = self.env.get_template(SERVICE_TEMPLATE)?;
        Ok(template.render(&view)?)
    }

    /// Renders the file registering every service, in package `package`
    /// with import path `path`.
    pub fn render_deploys(
        &self,
        package: &str,
        path: &str,
        framework: &str,
        services: &[Service],
    ) -> Result<String> {
        let mut imports = ServiceImports::default();
        imports.add(&format!("{}/services", framework), None);

        let mut entries = Vec::with_capacity(services.len());
        for service in services {
            let alias = if service.path == path {
                None
            } else {
                Some(imports.add(&service.path, Some(&service.package)))
            };
            entries.push(DeployEntry { alias });
        }

        let view = DeploysView {
            package: package.to_string(),
            imports: imports.sorted().into_iter().map(ImportView::from).collect(),
            services: entries,
        };
        let template = self.env.get_template(DEPLOYS_TEMPLATE)?;
        Ok(template.render(&view)?)
    }
}

/// Path of `file` relative to the module root, `/`-separated for storage.
fn relative(root: &Path, dir: &Path, file: &str) -> String {
    let dir = dir.strip_prefix(root).unwrap_or(dir);
    let mut segments: Vec<String> = dir
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    segments.push(file.to_string());
    segments.join("/")
}

/// Writes `content` unless `target` already holds exactly that. A file that
/// cannot be read is simply rewritten.
async fn store<S: Storage>(storage: &S, target: &str, content: &str) -> Result<()> {
    if let Ok(existing) = storage.read_file(target).await {
        if existing == content.as_bytes() {
            tracing::debug!("Unchanged {}", target);
            return Ok(());
        }
    }
    storage.write_file(target, content.as_bytes()).await?;
    tracing::debug!("Wrote {}", target);
    Ok(())
}

/// Renders and stores one service file, returning its storage path.
pub async fn write_service<S: Storage>(
    storage: &S,
    writer: &Writer,
    root: &Path,
    service: &Service,
    config: &GeneratorConfig,
) -> Result<String> {
    let content = writer.render_service(service)?;
    let target = relative(root, &service.dir, &config.generator.service_file);
    store(storage, &target, &content).await?;
    Ok(target)
}

/// Renders and stores the deploy file into the services directory.
pub async fn write_deploys<S: Storage>(
    storage: &S,
    writer: &Writer,
    module_path: &str,
    root: &Path,
    services: &[Service],
    config: &GeneratorConfig,
) -> Result<String> {
    let services_dir = root.join(&config.generator.services_dir);
    let package_path = format!(
        "{}/{}",
        module_path,
        config.generator.services_dir.trim_matches('/')
    );
    let package = services
        .iter()
        .find(|s| s.path == package_path)
        .map(|s| s.package.clone())
        .unwrap_or_else(|| crate::sources::ast::implied_package_name(&package_path));

    let content =
        writer.render_deploys(&package, &package_path, &config.conventions.framework, services)?;
    let target = relative(root, &services_dir, &config.generator.deploy_file);
    store(storage, &target, &content).await?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative() {
        assert_eq!(
            relative(Path::new("/w/app"), Path::new("/w/app/modules/users"), "fns.go"),
            "modules/users/fns.go"
        );
        assert_eq!(relative(Path::new("/w/app"), Path::new("/w/app"), "x.go"), "x.go");
    }

    #[test]
    fn test_render_deploys() {
        let writer = Writer::new().unwrap();
        let content = writer
            .render_deploys("modules", "example.com/app/modules", "github.com/aacfactory/fns", &[])
            .unwrap();
        assert!(content.contains("package modules"));
        assert!(content.contains("\"github.com/aacfactory/fns/services\""));
        assert!(content.contains("func Services() (v []services.Service) {"));
    }
}
