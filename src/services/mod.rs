//! Service discovery: packages under the services directory whose package
//! doc carries `@service`.

pub mod function;

use crate::annotations::Annotations;
use crate::config::toml_config::GeneratorConfig;
use crate::modules::Module;
use crate::sources::ast::{implied_package_name, GoFile, Import, Imports};
use crate::utils::error::{GenError, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use function::{FuncField, Function, Signature, FN_ANNOTATION};

pub const SERVICE_ANNOTATION: &str = "service";
pub const COMPONENT_ANNOTATION: &str = "component";

/// A type exposed to the service runtime with `@component`.
#[derive(Debug, Clone, Serialize)]
pub struct Component {
    pub ident: String,
    pub name: String,
}

/// Import table of a generated file. Every path has one unique alias.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServiceImports {
    entries: Vec<Import>,
}

impl ServiceImports {
    /// Adds `path`, renaming its alias when another path already uses it.
    /// Returns the alias the path is referred to by.
    pub fn add(&mut self, path: &str, preferred: Option<&str>) -> String {
        if let Some(existing) = self.entries.iter().find(|i| i.path == path) {
            return existing.name();
        }
        let base = preferred
            .map(str::to_string)
            .unwrap_or_else(|| implied_package_name(path));
        let mut alias = base.clone();
        let mut counter = 1;
        while self.entries.iter().any(|i| i.name() == alias) {
            alias = format!("{}{}", base, counter);
            counter += 1;
        }

        let explicit = alias != implied_package_name(path);
        self.entries.push(Import {
            path: path.to_string(),
            alias: explicit.then(|| alias.clone()),
        });
        alias
    }

    pub fn alias_of(&self, path: &str) -> Option<String> {
        self.entries.iter().find(|i| i.path == path).map(Import::name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Import> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Paths sorted the way `gofmt` groups them: standard library first.
    pub fn sorted(&self) -> Vec<Import> {
        let mut entries = self.entries.clone();
        entries.sort_by(|a, b| {
            let std_a = !a.path.split('/').next().unwrap_or_default().contains('.');
            let std_b = !b.path.split('/').next().unwrap_or_default().contains('.');
            std_b.cmp(&std_a).then_with(|| a.path.cmp(&b.path))
        });
        entries
    }
}

/// One `@service` package.
#[derive(Debug)]
pub struct Service {
    pub dir: PathBuf,
    pub path: String,
    /// Go package name of the service package.
    pub package: String,
    pub name: String,
    pub internal: bool,
    pub title: String,
    pub description: String,
    pub annotations: Annotations,
    pub imports: ServiceImports,
    pub functions: Vec<Arc<Function>>,
    pub components: Vec<Component>,
}

impl Service {
    /// Renders a signature expression with qualifiers mapped to this
    /// service's import aliases.
    pub fn render_type(&self, function: &Function, expr: &crate::sources::ast::TypeExpr) -> String {
        expr.render_with(&|qualifier| {
            function
                .imports
                .find(qualifier)
                .and_then(|import| self.imports.alias_of(&import.path))
                .unwrap_or_else(|| qualifier.to_string())
        })
    }
}

/// Scans `<module>/<services_dir>` recursively for service packages.
pub fn discover(module: &Arc<Module>, config: &GeneratorConfig) -> Result<Vec<Service>> {
    module.parse(None)?;
    let root = module.dir().join(&config.generator.services_dir);
    if !root.is_dir() {
        return Err(GenError::not_found(
            "services directory",
            root.display().to_string(),
        ));
    }

    let mut dirs = Vec::new();
    collect_dirs(&root, &mut dirs)?;

    let module_path = module.path();
    let mut services = Vec::new();
    for dir in dirs {
        let relative = dir.strip_prefix(module.dir()).unwrap_or(&dir);
        let path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .fold(module_path.clone(), |path, segment| format!("{}/{}", path, segment));
        if let Some(service) = load_service(module, config, &dir, &path)? {
            services.push(service);
        }
    }

    services.sort_by(|a, b| a.name.cmp(&b.name));
    if let Some(pair) = services.windows(2).find(|pair| pair[0].name == pair[1].name) {
        return Err(GenError::ServiceError {
            service: pair[0].name.clone(),
            message: format!("declared by both {} and {}", pair[0].path, pair[1].path),
        });
    }

    tracing::info!("🔎 Discovered {} services", services.len());
    Ok(services)
}

fn collect_dirs(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    out.push(dir.to_path_buf());
    let mut children = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| GenError::file(dir, e))? {
        let entry = entry.map_err(|e| GenError::file(dir, e))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') || name.starts_with('_') || name == "testdata" {
            continue;
        }
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            children.push(entry.path());
        }
    }
    children.sort();
    for child in children {
        collect_dirs(&child, out)?;
    }
    Ok(())
}

fn has_sources(dir: &Path) -> Result<bool> {
    for entry in std::fs::read_dir(dir).map_err(|e| GenError::file(dir, e))? {
        let entry = entry.map_err(|e| GenError::file(dir, e))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.ends_with(".go") && !name.ends_with("_test.go") {
            return Ok(true);
        }
    }
    Ok(false)
}

fn load_service(
    module: &Arc<Module>,
    config: &GeneratorConfig,
    dir: &Path,
    path: &str,
) -> Result<Option<Service>> {
    if !has_sources(dir)? {
        return Ok(None);
    }
    let sources = module.sources()?;
    let generated: HashSet<&str> = [
        config.generator.service_file.as_str(),
        config.generator.deploy_file.as_str(),
    ]
    .into_iter()
    .collect();

    let mut files: Vec<(Arc<GoFile>, Arc<Imports>, PathBuf)> = Vec::new();
    sources.read_dir(path, |source| {
        let name = source
            .filename()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !generated.contains(name.as_str()) {
            files.push((source.file()?, source.imports()?, source.filename().to_path_buf()));
        }
        Ok(())
    })?;

    let Some(doc) = files
        .iter()
        .map(|(file, _, _)| file.doc.as_str())
        .find(|doc| doc.lines().any(|l| l.trim_start().starts_with("@service")))
    else {
        return Ok(None);
    };
    let annotations = Annotations::parse(doc).map_err(|e| GenError::ServiceError {
        service: path.to_string(),
        message: e.to_string(),
    })?;
    let name = match annotations.value(SERVICE_ANNOTATION) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => {
            return Err(GenError::ServiceError {
                service: path.to_string(),
                message: "@service requires a service name".to_string(),
            });
        }
    };
    let package = files
        .first()
        .map(|(file, _, _)| file.package.clone())
        .unwrap_or_default();
    tracing::debug!("Loading service {} from {}", name, path);

    let mut functions = Vec::new();
    let mut components = Vec::new();
    for (file, imports, filename) in &files {
        for decl in &file.funcs {
            if !decl.doc.lines().any(|l| l.trim_start().starts_with("@fn")) {
                continue;
            }
            let fn_annotations = Annotations::parse(&decl.doc).map_err(|e| {
                GenError::function(format!("{}.{}", path, decl.name), e.to_string())
            })?;
            if !fn_annotations.contains(FN_ANNOTATION) {
                continue;
            }
            functions.push(Arc::new(Function::new(
                module.clone(),
                &name,
                path,
                filename.clone(),
                decl.clone(),
                imports.clone(),
                fn_annotations,
            )?));
        }
        for decl in &file.types {
            let doc = decl.effective_doc();
            if !doc.lines().any(|l| l.trim_start().starts_with("@component")) {
                continue;
            }
            let type_annotations = Annotations::parse(doc)?;
            let component_name = type_annotations
                .value(COMPONENT_ANNOTATION)
                .unwrap_or(&decl.name)
                .to_string();
            components.push(Component {
                ident: decl.name.clone(),
                name: component_name,
            });
        }
    }

    functions.sort_by(|a, b| a.ident.cmp(&b.ident));
    components.sort_by(|a, b| a.ident.cmp(&b.ident));
    ensure_unique(&name, functions.iter().map(|f| f.name.as_str()), "function")?;
    ensure_unique(&name, components.iter().map(|c| c.name.as_str()), "component")?;

    let mut imports = ServiceImports::default();
    for fixed in config.conventions.service_imports() {
        imports.add(&fixed, None);
    }
    for function in &functions {
        for qualifier in function.qualifiers() {
            if let Some(import) = function.imports.find(qualifier) {
                imports.add(&import.path, import.alias.as_deref());
            }
        }
    }

    Ok(Some(Service {
        dir: dir.to_path_buf(),
        path: path.to_string(),
        package,
        name,
        internal: annotations.contains("internal"),
        title: annotations.text("title").unwrap_or_default(),
        description: annotations
            .text("description")
            .unwrap_or_else(|| annotations.description().to_string()),
        annotations,
        imports,
        functions,
        components,
    }))
}

fn ensure_unique<'a>(service: &str, names: impl Iterator<Item = &'a str>, what: &str) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(GenError::ServiceError {
                service: service.to_string(),
                message: format!("duplicate {} name {}", what, name),
            });
        }
    }
    Ok(())
}
