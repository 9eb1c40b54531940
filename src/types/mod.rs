//! Type resolution engine.
//!
//! One [`Types`] instance is shared by every module reachable from a root,
//! so `(path, name)` identity holds graph-wide.

pub mod builtin;
pub mod flight;
pub mod model;
pub mod paradigm;

use crate::annotations::Annotations;
use crate::modules::Module;
use crate::sources::ast::{FieldDecl, Imports, TypeExpr};
use crate::sources::TypeSpec;
use crate::types::builtin::BuiltinRegistry;
use crate::types::flight::{ChainId, Flight, FlightCache};
use crate::types::model::{
    is_basic, InterfaceType, IdentType, Paradigm, ParadigmElement, StructField, StructType, Tags,
    Type, TypeName,
};
use crate::utils::error::{GenError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub use model::Kind;

/// Where a type expression is being resolved.
#[derive(Clone)]
pub struct TypeScope<'a> {
    /// Module owning the file the expression appears in.
    pub module: &'a Arc<Module>,
    /// Package path of that file.
    pub path: &'a str,
    pub imports: &'a Imports,
    /// Generic parameters visible in the enclosing declaration.
    pub generics: &'a [Paradigm],
    pub chain: ChainId,
}

impl<'a> TypeScope<'a> {
    pub fn new(
        module: &'a Arc<Module>,
        path: &'a str,
        imports: &'a Imports,
        chain: ChainId,
    ) -> Self {
        Self {
            module,
            path,
            imports,
            generics: &[],
            chain,
        }
    }

    fn with_generics(&self, generics: &'a [Paradigm]) -> Self {
        Self {
            generics,
            ..self.clone()
        }
    }
}

pub struct Types {
    builtins: Arc<BuiltinRegistry>,
    cache: FlightCache<TypeName, Type>,
    parsed: AtomicUsize,
}

impl Types {
    pub fn new(builtins: Arc<BuiltinRegistry>) -> Self {
        Self {
            builtins,
            cache: FlightCache::new(),
            parsed: AtomicUsize::new(0),
        }
    }

    /// Number of declarations actually parsed (cache misses).
    pub fn parsed_count(&self) -> usize {
        self.parsed.load(Ordering::Relaxed)
    }

    pub fn cached(&self, path: &str, name: &str) -> Option<Type> {
        self.cache.get(&TypeName::new(path, name))
    }

    /// Resolves `path.name` as seen from `module`.
    pub fn resolve_named(
        &self,
        module: &Arc<Module>,
        path: &str,
        name: &str,
        chain: ChainId,
    ) -> Result<Type> {
        if let Some(builtin) = self.builtins.get(path, name) {
            return Ok(builtin);
        }
        if let Some(ready) = self.cached(path, name) {
            return Ok(ready);
        }
        let owner = match module.find_module_by_path(path) {
            Ok(owner) => owner,
            Err(GenError::NotFound { .. }) if is_standard_library(path) => {
                return Err(GenError::resolve(format!(
                    "{}.{} is a standard library type without a builtin shape",
                    path, name
                )));
            }
            Err(err) => return Err(err),
        };
        let spec = owner.sources()?.find_type_spec(path, name)?;
        self.parse_type(&spec, &owner, chain)
    }

    /// Resolves a located declaration, at most once per `(path, name)`.
    pub fn parse_type(&self, spec: &TypeSpec, owner: &Arc<Module>, chain: ChainId) -> Result<Type> {
        let key = TypeName::new(&spec.path, &spec.decl.name);
        if let Some(builtin) = self.builtins.get(&key.path, &key.name) {
            return Ok(builtin);
        }

        let flight = self.cache.get_or_compute(&key, chain, || {
            let scope = TypeScope::new(owner, &spec.path, &spec.imports, chain);
            self.parse_spec(spec, &scope).map_err(|e| GenError::TypeError {
                path: key.path.clone(),
                name: key.name.clone(),
                source: Box::new(e),
            })
        })?;

        Ok(match flight {
            Flight::Ready(ty) => ty,
            Flight::Cycle => Type::Reference(key),
        })
    }

    fn parse_spec(&self, spec: &TypeSpec, scope: &TypeScope<'_>) -> Result<Type> {
        self.parsed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Resolving type {}.{}", spec.path, spec.decl.name);

        let decl = &spec.decl;
        let name = TypeName::new(&spec.path, &decl.name);
        let annotations = Annotations::parse(decl.effective_doc())?;

        // Constraints may name sibling parameters (`S ~[]E`), so every
        // parameter is in scope before any constraint is resolved.
        let declared: Vec<Paradigm> = decl
            .params
            .iter()
            .map(|param| Paradigm {
                name: param.name.clone(),
                constraints: Vec::new(),
            })
            .collect();
        let constraint_scope = scope.with_generics(&declared);
        let mut paradigms = Vec::with_capacity(decl.params.len());
        for param in &decl.params {
            let constraints = param
                .constraints
                .iter()
                .map(|constraint| self.parse_constraint(constraint, &constraint_scope))
                .collect::<Result<Vec<_>>>()?;
            paradigms.push(Paradigm {
                name: param.name.clone(),
                constraints,
            });
        }
        let scope = scope.with_generics(&paradigms);

        let ty = match &decl.expr {
            TypeExpr::Struct { fields } => {
                let fields = self.parse_struct_fields(fields, &scope)?;
                Type::Struct(Arc::new(StructType {
                    name,
                    annotations,
                    paradigms,
                    fields,
                }))
            }
            TypeExpr::Interface { .. } => Type::Interface(Arc::new(InterfaceType {
                name,
                annotations,
            })),
            expr => {
                let target = self.parse_expr(expr, &scope)?;
                Type::Ident(Arc::new(IdentType {
                    name,
                    annotations,
                    paradigms,
                    target,
                }))
            }
        };
        Ok(ty)
    }

    fn parse_constraint(&self, expr: &TypeExpr, scope: &TypeScope<'_>) -> Result<Type> {
        match expr {
            TypeExpr::Ident { name } if name == "comparable" => Ok(Type::basic(name.as_str())),
            _ => self.parse_expr(expr, scope),
        }
    }

    /// Resolves one type expression in `scope`.
    pub fn parse_expr(&self, expr: &TypeExpr, scope: &TypeScope<'_>) -> Result<Type> {
        match expr {
            TypeExpr::Ident { name } => {
                if let Some(paradigm) = scope.generics.iter().find(|p| &p.name == name) {
                    return Ok(Type::ParadigmElement(Arc::new(ParadigmElement {
                        name: paradigm.name.clone(),
                        constraints: paradigm.constraints.clone(),
                    })));
                }
                if name == "any" {
                    return Ok(Type::Any);
                }
                if is_basic(name) {
                    return Ok(Type::basic(name.as_str()));
                }
                self.resolve_named(scope.module, scope.path, name, scope.chain)
            }
            TypeExpr::Qualified { package, name } => {
                let import = scope.imports.find(package).ok_or_else(|| {
                    GenError::resolve(format!("{}.{}: package {} is not imported", package, name, package))
                })?;
                self.resolve_named(scope.module, &import.path, name, scope.chain)
            }
            TypeExpr::Pointer { target } => match self.parse_expr(target, scope)? {
                pointer @ Type::Pointer { .. } => Ok(pointer),
                target => Ok(Type::Pointer {
                    target: Box::new(target),
                }),
            },
            TypeExpr::Slice { element } | TypeExpr::Array { element, .. } => Ok(Type::Array {
                element: Box::new(self.parse_expr(element, scope)?),
            }),
            TypeExpr::Map { key, value } => {
                let key = self.parse_expr(key, scope)?;
                if !key.is_basic() {
                    return Err(GenError::MapKeyError {
                        key: key.to_string(),
                    });
                }
                Ok(Type::Map {
                    key: Box::new(key),
                    value: Box::new(self.parse_expr(value, scope)?),
                })
            }
            TypeExpr::Generic { base, args } => {
                let base = self.parse_expr(base, scope)?;
                let args = args
                    .iter()
                    .map(|arg| self.parse_expr(arg, scope))
                    .collect::<Result<Vec<_>>>()?;
                paradigm::instantiate(base, args)
            }
            TypeExpr::Struct { fields } => Ok(Type::Struct(Arc::new(StructType {
                name: TypeName::new(scope.path, ""),
                annotations: Annotations::default(),
                paradigms: Vec::new(),
                fields: self.parse_struct_fields(fields, scope)?,
            }))),
            TypeExpr::Interface { empty: true } => Ok(Type::Any),
            TypeExpr::Interface { empty: false } => Ok(Type::Interface(Arc::new(InterfaceType {
                name: TypeName::new(scope.path, ""),
                annotations: Annotations::default(),
            }))),
            TypeExpr::Unsupported { kind, text } => Err(GenError::resolve(format!(
                "unsupported type expression {} ({})",
                text, kind
            ))),
        }
    }

    fn parse_struct_fields(
        &self,
        fields: &[FieldDecl],
        scope: &TypeScope<'_>,
    ) -> Result<Vec<StructField>> {
        let mut out = Vec::with_capacity(fields.len());
        for (index, field) in fields.iter().enumerate() {
            let label = if field.names.is_empty() {
                field.ty.to_string()
            } else {
                field.names.join(", ")
            };
            let wrap = |source: GenError| GenError::FieldError {
                field: label.clone(),
                index,
                source: Box::new(source),
            };

            let name = match field.names.as_slice() {
                [] => {
                    if !is_exported(embedded_name(&field.ty)) {
                        continue;
                    }
                    String::new()
                }
                [name] => {
                    if !is_exported(name) {
                        continue;
                    }
                    name.clone()
                }
                names => {
                    if !names.iter().any(|name| is_exported(name)) {
                        continue;
                    }
                    return Err(wrap(GenError::resolve(
                        "one field declaration must declare exactly one name",
                    )));
                }
            };

            let ty = self.parse_expr(&field.ty, scope).map_err(wrap)?;
            let annotations = Annotations::parse(&field.doc).map_err(wrap)?;
            out.push(StructField {
                name,
                ty,
                tags: field.tag.as_deref().map(Tags::parse).unwrap_or_default(),
                annotations,
            });
        }
        Ok(out)
    }
}

pub fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_uppercase())
}

/// Name an embedded field is known by: the type name without package or pointer.
fn embedded_name(expr: &TypeExpr) -> &str {
    match expr {
        TypeExpr::Ident { name } | TypeExpr::Qualified { name, .. } => name,
        TypeExpr::Pointer { target } => embedded_name(target),
        TypeExpr::Generic { base, .. } => embedded_name(base),
        _ => "",
    }
}

/// Standard library packages have no dot in their first path segment.
fn is_standard_library(path: &str) -> bool {
    !path.split('/').next().unwrap_or_default().contains('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exported_names() {
        assert!(is_exported("User"));
        assert!(!is_exported("user"));
        assert!(!is_exported("_User"));
        assert!(!is_exported(""));
    }

    #[test]
    fn test_embedded_name() {
        let expr = TypeExpr::Pointer {
            target: Box::new(TypeExpr::qualified("models", "Base")),
        };
        assert_eq!(embedded_name(&expr), "Base");
    }

    #[test]
    fn test_standard_library_paths() {
        assert!(is_standard_library("time"));
        assert!(is_standard_library("net/http"));
        assert!(!is_standard_library("github.com/acme/app"));
        assert!(!is_standard_library("example.com/app/users"));
    }
}
