use crate::annotations::Annotations;
use crate::config::toml_config::Conventions;
use crate::modules::Module;
use crate::sources::ast::{FuncDecl, Imports, ParamDecl, TypeExpr};
use crate::types::flight::ChainId;
use crate::types::model::Type;
use crate::types::{is_exported, TypeScope};
use crate::utils::error::{GenError, Result};
use heck::{ToLowerCamelCase, ToUpperCamelCase};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Annotation marking a function for generation.
pub const FN_ANNOTATION: &str = "fn";

/// A named parameter or result of a function signature.
#[derive(Debug, Clone, Serialize)]
pub struct FuncField {
    pub name: String,
    pub expr: TypeExpr,
    pub ty: Type,
}

#[derive(Debug, Clone, Serialize)]
pub struct Signature {
    pub param: Option<FuncField>,
    pub result: Option<FuncField>,
}

/// Options read from the function's annotations.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FunctionOptions {
    pub title: String,
    pub description: String,
    pub readonly: bool,
    pub internal: bool,
    pub deprecated: bool,
    pub authorization: bool,
    pub validation: bool,
}

impl FunctionOptions {
    fn from_annotations(annotations: &Annotations) -> Self {
        Self {
            title: annotations.text("title").unwrap_or_default(),
            description: annotations
                .text("description")
                .unwrap_or_else(|| annotations.description().to_string()),
            readonly: annotations.contains("readonly"),
            internal: annotations.contains("internal"),
            deprecated: annotations.contains("deprecated"),
            authorization: annotations.contains("authorization"),
            validation: annotations.contains("validation"),
        }
    }
}

/// An annotated function selected for generation.
#[derive(Debug)]
pub struct Function {
    pub service: String,
    /// Import path of the declaring package.
    pub path: String,
    pub file: PathBuf,
    pub ident: String,
    /// Exposed name, the `@fn` value.
    pub name: String,
    pub proxy_ident: String,
    pub handler_ident: String,
    pub const_ident: String,
    pub options: FunctionOptions,
    pub annotations: Annotations,
    pub decl: FuncDecl,
    pub imports: Arc<Imports>,
    module: Arc<Module>,
    parsed: OnceCell<Signature>,
}

impl Function {
    /// Builds a candidate from a declaration carrying `@fn`.
    pub fn new(
        module: Arc<Module>,
        service: &str,
        path: &str,
        file: PathBuf,
        decl: FuncDecl,
        imports: Arc<Imports>,
        annotations: Annotations,
    ) -> Result<Self> {
        let id = format!("{}.{}", path, decl.name);
        if is_exported(&decl.name) {
            return Err(GenError::function(id, "annotated functions must be unexported"));
        }
        let name = match annotations.value(FN_ANNOTATION) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => return Err(GenError::function(id, "@fn requires a function name")),
        };

        let ident = decl.name.clone();
        let proxy_ident = ident.to_upper_camel_case();
        let handler_stem = ident.to_lower_camel_case();
        Ok(Self {
            service: service.to_string(),
            path: path.to_string(),
            file,
            handler_ident: format!("_{}Fn", handler_stem),
            const_ident: format!("_{}FnName", handler_stem),
            proxy_ident,
            ident,
            name,
            options: FunctionOptions::from_annotations(&annotations),
            annotations,
            decl,
            imports,
            module,
            parsed: OnceCell::new(),
        })
    }

    pub fn id(&self) -> String {
        format!("{}.{}", self.path, self.ident)
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.parsed.get()
    }

    /// Validates the declaration shape and resolves the param and result
    /// types. Runs once; later calls return the stored signature.
    pub fn parse(&self, conventions: &Conventions) -> Result<&Signature> {
        self.parsed.get_or_try_init(|| self.parse_signature(conventions))
    }

    fn parse_signature(&self, conventions: &Conventions) -> Result<Signature> {
        let id = self.id();
        let decl = &self.decl;
        if decl.has_type_params {
            return Err(GenError::function(id, "generic functions are not supported"));
        }

        let (context, param) = match decl.params.as_slice() {
            [context] => (context, None),
            [context, param] => (context, Some(param)),
            params => {
                return Err(GenError::function(
                    id,
                    format!("expects one or two parameters, found {}", params.len()),
                ));
            }
        };
        if !self.matches(&context.ty, |path, name| conventions.is_context(path, name)) {
            return Err(GenError::function(
                id,
                format!("first parameter must be a context, found {}", context.ty),
            ));
        }

        let (result, error) = match decl.results.as_slice() {
            [error] => (None, error),
            [result, error] => (Some(result), error),
            results => {
                return Err(GenError::function(
                    id,
                    format!("expects one or two results, found {}", results.len()),
                ));
            }
        };
        let is_error =
            |path: &str, name: &str| (path.is_empty() && name == "error") || conventions.is_error(path, name);
        if !self.matches(&error.ty, is_error) {
            return Err(GenError::function(
                id,
                format!("last result must be an error, found {}", error.ty),
            ));
        }

        let types = self.module.types()?;
        let chain = ChainId::next();
        let scope = TypeScope::new(&self.module, &self.path, &self.imports, chain);
        let resolve = |decl: &ParamDecl, fallback: &str| -> Result<FuncField> {
            if decl.variadic {
                return Err(GenError::function(self.id(), "variadic parameters are not supported"));
            }
            let ty = types.parse_expr(&decl.ty, &scope).map_err(|e| GenError::TypeError {
                path: self.path.clone(),
                name: format!("{}({})", self.ident, fallback),
                source: Box::new(e),
            })?;
            Ok(FuncField {
                name: decl.name.clone().unwrap_or_else(|| fallback.to_string()),
                expr: decl.ty.clone(),
                ty,
            })
        };

        let signature = Signature {
            param: param.map(|p| resolve(p, "param")).transpose()?,
            result: result.map(|r| resolve(r, "result")).transpose()?,
        };
        tracing::debug!("Parsed function {}", self.id());
        Ok(signature)
    }

    /// Structural match of a `pkg.Name` / `Name` expression against a
    /// predicate on `(import path, name)`. Pointers are not accepted.
    fn matches(&self, expr: &TypeExpr, predicate: impl Fn(&str, &str) -> bool) -> bool {
        match expr {
            TypeExpr::Qualified { package, name } => self
                .imports
                .find(package)
                .is_some_and(|import| predicate(&import.path, name)),
            TypeExpr::Ident { name } => predicate("", name) || predicate(&self.path, name),
            _ => false,
        }
    }

    /// Import qualifiers the generated code needs for this signature.
    pub fn qualifiers(&self) -> Vec<&str> {
        let params = self.decl.params.iter().skip(1);
        let results = self
            .decl
            .results
            .iter()
            .take(self.decl.results.len().saturating_sub(1));

        let mut out = Vec::new();
        for decl in params.chain(results) {
            for qualifier in decl.ty.qualifiers() {
                if !out.contains(&qualifier) {
                    out.push(qualifier);
                }
            }
        }
        out
    }
}
