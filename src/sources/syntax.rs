//! Lowers tree-sitter Go syntax trees into the owned [`GoFile`] model.

use crate::sources::ast::{
    FieldDecl, FuncDecl, GoFile, Import, Imports, ParamDecl, TypeDecl, TypeExpr, TypeParam,
};
use crate::utils::error::{GenError, Result};
use std::path::Path;
use tree_sitter::{Node, Parser};

/// Parses one Go source file.
pub fn parse_file(path: &Path, source: &str) -> Result<GoFile> {
    let mut parser = Parser::new();
    let language: tree_sitter::Language = tree_sitter_go::LANGUAGE.into();
    parser
        .set_language(&language)
        .map_err(|e| GenError::SourceError {
            file: path.to_path_buf(),
            message: format!("go grammar unavailable: {}", e),
        })?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| GenError::SourceError {
            file: path.to_path_buf(),
            message: "parser returned no tree".to_string(),
        })?;

    let root = tree.root_node();
    if root.has_error() {
        let line = first_error(root)
            .map(|node| node.start_position().row + 1)
            .unwrap_or(0);
        return Err(GenError::SourceError {
            file: path.to_path_buf(),
            message: format!("syntax error near line {}", line),
        });
    }

    let lowering = Lowering {
        src: source.as_bytes(),
    };
    Ok(lowering.file(path, root))
}

fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children.into_iter().find_map(first_error)
}

struct Lowering<'s> {
    src: &'s [u8],
}

impl<'s> Lowering<'s> {
    fn text(&self, node: Node<'_>) -> String {
        node.utf8_text(self.src).unwrap_or("").to_string()
    }

    fn field_text(&self, node: Node<'_>, field: &str) -> String {
        node.child_by_field_name(field)
            .map(|child| self.text(child))
            .unwrap_or_default()
    }

    fn file(&self, path: &Path, root: Node<'_>) -> GoFile {
        let mut file = GoFile {
            path: path.to_path_buf(),
            package: String::new(),
            doc: String::new(),
            imports: Imports::default(),
            types: Vec::new(),
            funcs: Vec::new(),
        };
        let mut imports = Vec::new();

        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            match child.kind() {
                "package_clause" => {
                    file.doc = self.doc_of(child);
                    let mut inner = child.walk();
                    if let Some(name) = child
                        .named_children(&mut inner)
                        .find(|n| n.kind() == "package_identifier")
                    {
                        file.package = self.text(name);
                    };
                }
                "import_declaration" => self.imports(child, &mut imports),
                "type_declaration" => self.type_declaration(child, &mut file.types),
                "function_declaration" => file.funcs.push(self.function(child)),
                _ => {}
            }
        }

        file.imports = Imports::new(imports);
        file
    }

    /// Contiguous comment lines directly above `node`, markers stripped.
    fn doc_of(&self, node: Node<'_>) -> String {
        let mut lines: Vec<String> = Vec::new();
        let mut expected_row = node.start_position().row;
        let mut current = node.prev_sibling();

        while let Some(comment) = current {
            if comment.kind() != "comment" {
                break;
            }
            if comment.end_position().row + 1 < expected_row {
                break;
            }
            // trailing comment of the previous line
            if let Some(previous) = comment.prev_sibling() {
                if previous.end_position().row == comment.start_position().row {
                    break;
                }
            }
            lines.push(self.text(comment));
            expected_row = comment.start_position().row;
            current = comment.prev_sibling();
        }

        lines.reverse();
        clean_comment(&lines)
    }

    fn imports(&self, node: Node<'_>, out: &mut Vec<Import>) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "import_spec" => out.push(self.import_spec(child)),
                "import_spec_list" => {
                    let mut inner = child.walk();
                    for spec in child.named_children(&mut inner) {
                        if spec.kind() == "import_spec" {
                            out.push(self.import_spec(spec));
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn import_spec(&self, node: Node<'_>) -> Import {
        let path = unquote(&self.field_text(node, "path"));
        let alias = node
            .child_by_field_name("name")
            .map(|name| self.text(name))
            .filter(|name| !name.is_empty());
        Import { path, alias }
    }

    fn type_declaration(&self, node: Node<'_>, out: &mut Vec<TypeDecl>) {
        let group_doc = self.doc_of(node);
        let mut cursor = node.walk();
        for spec in node.named_children(&mut cursor) {
            let alias = match spec.kind() {
                "type_spec" => false,
                "type_alias" => true,
                _ => continue,
            };
            let expr = spec
                .child_by_field_name("type")
                .map(|ty| self.lower_type(ty))
                .unwrap_or_else(|| TypeExpr::Unsupported {
                    kind: "missing".to_string(),
                    text: self.text(spec),
                });
            let params = spec
                .child_by_field_name("type_parameters")
                .map(|list| self.type_params(list))
                .unwrap_or_default();
            out.push(TypeDecl {
                name: self.field_text(spec, "name"),
                params,
                expr,
                doc: self.doc_of(spec),
                group_doc: group_doc.clone(),
                alias,
            });
        }
    }

    fn type_params(&self, list: Node<'_>) -> Vec<TypeParam> {
        let mut params = Vec::new();
        let mut cursor = list.walk();
        for decl in list.named_children(&mut cursor) {
            if decl.kind() != "type_parameter_declaration" {
                continue;
            }
            let constraints = decl
                .child_by_field_name("type")
                .map(|constraint| self.union(constraint))
                .unwrap_or_default();
            let mut names = decl.walk();
            for name in decl.children_by_field_name("name", &mut names) {
                params.push(TypeParam {
                    name: self.text(name),
                    constraints: constraints.clone(),
                });
            }
        }
        params
    }

    /// Members of a constraint union, each lowered on its own.
    fn union(&self, node: Node<'_>) -> Vec<TypeExpr> {
        match node.kind() {
            "type_constraint" | "type_elem" | "union_type" => {
                let mut cursor = node.walk();
                let members: Vec<Node<'_>> = node
                    .named_children(&mut cursor)
                    .filter(|n| n.kind() != "comment")
                    .collect();
                members.into_iter().flat_map(|member| self.union(member)).collect()
            }
            _ => vec![self.lower_type(node)],
        }
    }

    fn first_named<'t>(&self, node: Node<'t>) -> Option<Node<'t>> {
        let mut cursor = node.walk();
        let found = node
            .named_children(&mut cursor)
            .find(|child| child.kind() != "comment");
        found
    }

    fn lower_inner(&self, node: Node<'_>) -> TypeExpr {
        match self.first_named(node) {
            Some(inner) => self.lower_type(inner),
            None => self.unsupported(node),
        }
    }

    fn lower_field(&self, node: Node<'_>, field: &str) -> TypeExpr {
        match node.child_by_field_name(field) {
            Some(child) => self.lower_type(child),
            None => self.unsupported(node),
        }
    }

    fn unsupported(&self, node: Node<'_>) -> TypeExpr {
        TypeExpr::Unsupported {
            kind: node.kind().to_string(),
            text: self.text(node),
        }
    }

    fn lower_type(&self, node: Node<'_>) -> TypeExpr {
        match node.kind() {
            "type_identifier" | "identifier" | "package_identifier" => TypeExpr::ident(self.text(node)),
            "qualified_type" => TypeExpr::qualified(
                self.field_text(node, "package"),
                self.field_text(node, "name"),
            ),
            "pointer_type" => TypeExpr::Pointer {
                target: Box::new(self.lower_inner(node)),
            },
            "slice_type" => TypeExpr::Slice {
                element: Box::new(self.lower_field(node, "element")),
            },
            "array_type" => TypeExpr::Array {
                length: self.field_text(node, "length"),
                element: Box::new(self.lower_field(node, "element")),
            },
            "implicit_length_array_type" => TypeExpr::Array {
                length: "...".to_string(),
                element: Box::new(self.lower_field(node, "element")),
            },
            "map_type" => TypeExpr::Map {
                key: Box::new(self.lower_field(node, "key")),
                value: Box::new(self.lower_field(node, "value")),
            },
            "generic_type" => {
                let base = self.lower_field(node, "type");
                let mut args = Vec::new();
                if let Some(arguments) = node.child_by_field_name("type_arguments") {
                    let mut cursor = arguments.walk();
                    for arg in arguments.named_children(&mut cursor) {
                        match arg.kind() {
                            "comment" => {}
                            "type_elem" => args.push(self.lower_inner(arg)),
                            _ => args.push(self.lower_type(arg)),
                        }
                    }
                }
                TypeExpr::Generic {
                    base: Box::new(base),
                    args,
                }
            }
            "struct_type" => {
                let mut cursor = node.walk();
                let list = node
                    .named_children(&mut cursor)
                    .find(|child| child.kind() == "field_declaration_list");
                TypeExpr::Struct {
                    fields: list.map(|list| self.fields(list)).unwrap_or_default(),
                }
            }
            "interface_type" => TypeExpr::Interface {
                empty: self.first_named(node).is_none(),
            },
            "parenthesized_type" | "negated_type" | "type_elem" => self.lower_inner(node),
            _ => self.unsupported(node),
        }
    }

    fn fields(&self, list: Node<'_>) -> Vec<FieldDecl> {
        let mut fields = Vec::new();
        let mut cursor = list.walk();
        for decl in list.named_children(&mut cursor) {
            if decl.kind() != "field_declaration" {
                continue;
            }

            let mut names_cursor = decl.walk();
            let names: Vec<String> = decl
                .children_by_field_name("name", &mut names_cursor)
                .map(|name| self.text(name))
                .collect();

            let mut ty = self.lower_field(decl, "type");
            if names.is_empty() {
                let mut children = decl.walk();
                let embedded_pointer = decl.children(&mut children).any(|child| child.kind() == "*");
                if embedded_pointer {
                    ty = TypeExpr::Pointer {
                        target: Box::new(ty),
                    };
                }
            }

            let tag = decl
                .child_by_field_name("tag")
                .map(|tag| unquote(&self.text(tag)));

            fields.push(FieldDecl {
                names,
                ty,
                tag,
                doc: self.doc_of(decl),
            });
        }
        fields
    }

    fn function(&self, node: Node<'_>) -> FuncDecl {
        let params = node
            .child_by_field_name("parameters")
            .map(|list| self.params(list))
            .unwrap_or_default();
        let results = match node.child_by_field_name("result") {
            Some(result) if result.kind() == "parameter_list" => self.params(result),
            Some(result) => vec![ParamDecl {
                name: None,
                ty: self.lower_type(result),
                variadic: false,
            }],
            None => Vec::new(),
        };

        FuncDecl {
            name: self.field_text(node, "name"),
            doc: self.doc_of(node),
            has_type_params: node.child_by_field_name("type_parameters").is_some(),
            params,
            results,
            line: node.start_position().row + 1,
        }
    }

    fn params(&self, list: Node<'_>) -> Vec<ParamDecl> {
        let mut params = Vec::new();
        let mut cursor = list.walk();
        for decl in list.named_children(&mut cursor) {
            let variadic = match decl.kind() {
                "parameter_declaration" => false,
                "variadic_parameter_declaration" => true,
                _ => continue,
            };
            let ty = self.lower_field(decl, "type");
            let mut names_cursor = decl.walk();
            let names: Vec<String> = decl
                .children_by_field_name("name", &mut names_cursor)
                .map(|name| self.text(name))
                .collect();

            if names.is_empty() {
                params.push(ParamDecl {
                    name: None,
                    ty,
                    variadic,
                });
            } else {
                for name in names {
                    params.push(ParamDecl {
                        name: Some(name),
                        ty: ty.clone(),
                        variadic,
                    });
                }
            }
        }
        params
    }
}

/// Strips `"..."` or `` `...` `` quoting.
fn unquote(text: &str) -> String {
    let text = text.trim();
    if text.len() >= 2 && text.starts_with('`') && text.ends_with('`') {
        return text[1..text.len() - 1].to_string();
    }
    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        return text[1..text.len() - 1]
            .replace("\\\"", "\"")
            .replace("\\\\", "\\");
    }
    text.to_string()
}

/// Removes comment markers; compiler directives (`//go:generate`) are dropped.
fn clean_comment(lines: &[String]) -> String {
    let mut out: Vec<String> = Vec::new();
    for raw in lines {
        if let Some(body) = raw.strip_prefix("//") {
            if body.starts_with("go:") {
                continue;
            }
            out.push(body.strip_prefix(' ').unwrap_or(body).trim_end().to_string());
        } else if let Some(body) = raw.strip_prefix("/*") {
            let body = body.strip_suffix("*/").unwrap_or(body);
            for line in body.lines() {
                let line = line.trim();
                let line = line.strip_prefix('*').map(str::trim_start).unwrap_or(line);
                out.push(line.to_string());
            }
        }
    }
    while out.first().is_some_and(|line| line.is_empty()) {
        out.remove(0);
    }
    while out.last().is_some_and(|line| line.is_empty()) {
        out.pop();
    }
    out.join("\n")
}
