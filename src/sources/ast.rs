//! Owned declaration model lowered from Go syntax trees.
//!
//! Only the declaration shapes the generator cares about are kept: imports,
//! type declarations and top-level functions. Function bodies are dropped.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// One import line of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Import {
    pub path: String,
    /// Explicit alias, `None` when the package name is implied by the path.
    pub alias: Option<String>,
}

impl Import {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            alias: None,
        }
    }

    /// Name this import is referred to by inside the file.
    pub fn name(&self) -> String {
        match &self.alias {
            Some(alias) => alias.clone(),
            None => implied_package_name(&self.path),
        }
    }
}

/// Package name implied by an import path: the last segment, skipping a
/// major version suffix (`/v2`) and trimming `go-` prefixes and `.vN` suffixes.
pub fn implied_package_name(path: &str) -> String {
    let mut segments = path.rsplit('/');
    let mut last = segments.next().unwrap_or(path);
    if is_major_version(last) {
        if let Some(previous) = segments.next() {
            last = previous;
        }
    }
    let last = last.strip_prefix("go-").unwrap_or(last);
    let last = match last.rsplit_once(".v") {
        Some((head, tail)) if tail.chars().all(|c| c.is_ascii_digit()) && !tail.is_empty() => head,
        _ => last,
    };
    last.replace(['-', '.'], "_")
}

fn is_major_version(segment: &str) -> bool {
    segment.len() > 1
        && segment.starts_with('v')
        && segment[1..].chars().all(|c| c.is_ascii_digit())
}

/// Import table of one file.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Imports {
    entries: Vec<Import>,
}

impl Imports {
    pub fn new(entries: Vec<Import>) -> Self {
        Self { entries }
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

    /// Finds the import a package qualifier (`pkg` in `pkg.Name`) refers to.
    pub fn find(&self, qualifier: &str) -> Option<&Import> {
        self.entries.iter().find(|import| import.name() == qualifier)
    }
}

/// Type expression as written in source.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "expr", rename_all = "snake_case")]
pub enum TypeExpr {
    Ident { name: String },
    Qualified { package: String, name: String },
    Pointer { target: Box<TypeExpr> },
    Slice { element: Box<TypeExpr> },
    Array { length: String, element: Box<TypeExpr> },
    Map { key: Box<TypeExpr>, value: Box<TypeExpr> },
    Generic { base: Box<TypeExpr>, args: Vec<TypeExpr> },
    Struct { fields: Vec<FieldDecl> },
    Interface { empty: bool },
    /// Shapes the generator does not model (channels, function types, ...).
    Unsupported { kind: String, text: String },
}

impl TypeExpr {
    pub fn ident(name: impl Into<String>) -> Self {
        TypeExpr::Ident { name: name.into() }
    }

    pub fn qualified(package: impl Into<String>, name: impl Into<String>) -> Self {
        TypeExpr::Qualified {
            package: package.into(),
            name: name.into(),
        }
    }

    /// Package qualifiers referenced anywhere inside this expression.
    pub fn qualifiers(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_qualifiers(&mut out);
        out
    }

    fn collect_qualifiers<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            TypeExpr::Qualified { package, .. } => {
                if !out.contains(&package.as_str()) {
                    out.push(package);
                }
            }
            TypeExpr::Pointer { target } => target.collect_qualifiers(out),
            TypeExpr::Slice { element } | TypeExpr::Array { element, .. } => {
                element.collect_qualifiers(out)
            }
            TypeExpr::Map { key, value } => {
                key.collect_qualifiers(out);
                value.collect_qualifiers(out);
            }
            TypeExpr::Generic { base, args } => {
                base.collect_qualifiers(out);
                for arg in args {
                    arg.collect_qualifiers(out);
                }
            }
            TypeExpr::Struct { fields } => {
                for field in fields {
                    field.ty.collect_qualifiers(out);
                }
            }
            TypeExpr::Ident { .. } | TypeExpr::Interface { .. } | TypeExpr::Unsupported { .. } => {}
        }
    }

    /// Renders the expression with package qualifiers mapped through `rename`.
    pub fn render_with(&self, rename: &dyn Fn(&str) -> String) -> String {
        match self {
            TypeExpr::Ident { name } => name.clone(),
            TypeExpr::Qualified { package, name } => format!("{}.{}", rename(package), name),
            TypeExpr::Pointer { target } => format!("*{}", target.render_with(rename)),
            TypeExpr::Slice { element } => format!("[]{}", element.render_with(rename)),
            TypeExpr::Array { length, element } => {
                format!("[{}]{}", length, element.render_with(rename))
            }
            TypeExpr::Map { key, value } => format!(
                "map[{}]{}",
                key.render_with(rename),
                value.render_with(rename)
            ),
            TypeExpr::Generic { base, args } => {
                let args: Vec<String> = args.iter().map(|arg| arg.render_with(rename)).collect();
                format!("{}[{}]", base.render_with(rename), args.join(", "))
            }
            TypeExpr::Struct { fields } => {
                let fields: Vec<String> = fields
                    .iter()
                    .map(|field| {
                        let ty = field.ty.render_with(rename);
                        if field.names.is_empty() {
                            ty
                        } else {
                            format!("{} {}", field.names.join(", "), ty)
                        }
                    })
                    .collect();
                format!("struct{{ {} }}", fields.join("; "))
            }
            TypeExpr::Interface { empty: true } => "interface{}".to_string(),
            TypeExpr::Interface { empty: false } => "interface{ ... }".to_string(),
            TypeExpr::Unsupported { text, .. } => text.clone(),
        }
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_with(&|package| package.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDecl {
    /// Empty for embedded fields.
    pub names: Vec<String>,
    pub ty: TypeExpr,
    /// Raw tag text without the surrounding quotes.
    pub tag: Option<String>,
    pub doc: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeParam {
    pub name: String,
    /// Union members of the constraint (`~int | ~string` has two).
    pub constraints: Vec<TypeExpr>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeDecl {
    pub name: String,
    pub params: Vec<TypeParam>,
    pub expr: TypeExpr,
    pub doc: String,
    /// Doc attached to the enclosing `type ( ... )` group.
    pub group_doc: String,
    /// `type A = B`
    pub alias: bool,
}

impl TypeDecl {
    /// Own doc, or the group doc when the declaration has none.
    pub fn effective_doc(&self) -> &str {
        if self.doc.trim().is_empty() {
            &self.group_doc
        } else {
            &self.doc
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamDecl {
    pub name: Option<String>,
    pub ty: TypeExpr,
    pub variadic: bool,
}

/// Top-level function without receiver.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FuncDecl {
    pub name: String,
    pub doc: String,
    pub has_type_params: bool,
    pub params: Vec<ParamDecl>,
    pub results: Vec<ParamDecl>,
    pub line: usize,
}

/// One parsed Go source file.
#[derive(Debug, Clone, Serialize)]
pub struct GoFile {
    pub path: PathBuf,
    pub package: String,
    pub doc: String,
    pub imports: Imports,
    pub types: Vec<TypeDecl>,
    pub funcs: Vec<FuncDecl>,
}

impl GoFile {
    pub fn find_type(&self, name: &str) -> Option<&TypeDecl> {
        self.types.iter().find(|decl| decl.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_implied_package_name() {
        assert_eq!(implied_package_name("context"), "context");
        assert_eq!(implied_package_name("github.com/acme/app/users"), "users");
        assert_eq!(implied_package_name("github.com/acme/lib/v2"), "lib");
        assert_eq!(implied_package_name("gopkg.in/yaml.v3"), "yaml");
        assert_eq!(implied_package_name("github.com/acme/go-redis"), "redis");
    }

    #[test]
    fn test_imports_find_by_alias_and_name() {
        let imports = Imports::new(vec![
            Import::new("github.com/acme/app/users"),
            Import {
                path: "github.com/acme/app/models".to_string(),
                alias: Some("m".to_string()),
            },
        ]);
        assert_eq!(imports.find("users").unwrap().path, "github.com/acme/app/users");
        assert_eq!(imports.find("m").unwrap().path, "github.com/acme/app/models");
        assert!(imports.find("models").is_none());
    }

    #[test]
    fn test_render_with_renamed_qualifiers() {
        let expr = TypeExpr::Generic {
            base: Box::new(TypeExpr::qualified("models", "Pager")),
            args: vec![TypeExpr::Pointer {
                target: Box::new(TypeExpr::qualified("users", "User")),
            }],
        };
        assert_eq!(expr.to_string(), "models.Pager[*users.User]");
        assert_eq!(expr.qualifiers(), vec!["models", "users"]);

        let rendered = expr.render_with(&|package| format!("{}1", package));
        assert_eq!(rendered, "models1.Pager[*users1.User]");
    }
}
