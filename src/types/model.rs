use crate::annotations::Annotations;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Go basic type keywords, resolved without any module lookup.
pub const BASIC_TYPES: &[&str] = &[
    "bool", "string", "int", "int8", "int16", "int32", "int64", "uint", "uint8", "uint16",
    "uint32", "uint64", "uintptr", "byte", "rune", "float32", "float64", "complex64",
    "complex128", "error",
];

pub fn is_basic(name: &str) -> bool {
    BASIC_TYPES.contains(&name)
}

/// Identity of a named type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TypeName {
    pub path: String,
    pub name: String,
}

impl TypeName {
    pub fn new(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
        }
    }

    /// Anonymous (inline) types have no identity.
    pub fn is_anonymous(&self) -> bool {
        self.name.is_empty()
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}.{}", self.path, self.name)
        }
    }
}

/// One `key:"value"` pair of a struct tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Tags(Vec<Tag>);

impl Tags {
    /// Parses Go struct tag syntax; malformed trailing input is ignored like `reflect.StructTag`.
    pub fn parse(raw: &str) -> Self {
        let mut tags = Vec::new();
        let mut rest = raw.trim_start();

        while !rest.is_empty() {
            let key_end = rest
                .find(|c: char| c == ':' || c == '"' || c.is_whitespace() || c.is_control())
                .unwrap_or(rest.len());
            if key_end == 0 || !rest[key_end..].starts_with(":\"") {
                break;
            }
            let key = &rest[..key_end];
            let value_start = key_end + 2;

            let mut escaped = false;
            let mut value_end = None;
            for (offset, c) in rest[value_start..].char_indices() {
                match c {
                    '\\' if !escaped => escaped = true,
                    '"' if !escaped => {
                        value_end = Some(value_start + offset);
                        break;
                    }
                    _ => escaped = false,
                }
            }
            let Some(value_end) = value_end else {
                break;
            };

            tags.push(Tag {
                key: key.to_string(),
                value: rest[value_start..value_end].replace("\\\"", "\""),
            });
            rest = rest[value_end + 1..].trim_start();
        }

        Tags(tags)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|tag| tag.key == key)
            .map(|tag| tag.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Kind tag of a [`Type`]. `StructField` tags the members of a struct
/// rather than a [`Type`] variant; an embedded member is a `StructField`
/// with an empty name wrapping the embedded type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Basic,
    Builtin,
    Ident,
    Interface,
    Struct,
    StructField,
    Pointer,
    Array,
    Map,
    Any,
    Paradigm,
    ParadigmElement,
    Reference,
}

/// A declared generic parameter and its constraint union.
#[derive(Debug, Clone, Serialize)]
pub struct Paradigm {
    pub name: String,
    pub constraints: Vec<Type>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuiltinType {
    pub name: TypeName,
    pub annotations: Annotations,
    /// Documented shape used by schema emitters, e.g. `date-time`.
    pub format: String,
    pub underlying: Type,
}

#[derive(Debug, Clone, Serialize)]
pub struct IdentType {
    pub name: TypeName,
    pub annotations: Annotations,
    pub paradigms: Vec<Paradigm>,
    pub target: Type,
}

#[derive(Debug, Clone, Serialize)]
pub struct InterfaceType {
    pub name: TypeName,
    pub annotations: Annotations,
}

#[derive(Debug, Clone, Serialize)]
pub struct StructField {
    /// Empty for embedded fields.
    pub name: String,
    pub ty: Type,
    pub tags: Tags,
    pub annotations: Annotations,
}

impl StructField {
    pub fn kind(&self) -> Kind {
        Kind::StructField
    }

    pub fn is_embedded(&self) -> bool {
        self.name.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StructType {
    pub name: TypeName,
    pub annotations: Annotations,
    pub paradigms: Vec<Paradigm>,
    pub fields: Vec<StructField>,
}

impl StructType {
    pub fn field(&self, name: &str) -> Option<&StructField> {
        self.fields.iter().find(|field| field.name == name)
    }
}

/// A generic parameter bound to a type.
#[derive(Debug, Clone, Serialize)]
pub struct ParadigmArg {
    pub name: String,
    pub ty: Type,
}

/// A generic instantiation such as `Pager[User]`.
#[derive(Debug, Clone, Serialize)]
pub struct ParadigmType {
    pub base: Type,
    pub args: Vec<ParadigmArg>,
    /// Fully specialized form; `None` while an argument is still a parameter
    /// of an enclosing generic declaration.
    pub packed: Option<Type>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParadigmElement {
    pub name: String,
    pub constraints: Vec<Type>,
}

/// Resolved type shape.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Type {
    Basic { name: String },
    Builtin(Arc<BuiltinType>),
    Ident(Arc<IdentType>),
    Interface(Arc<InterfaceType>),
    Struct(Arc<StructType>),
    Pointer { target: Box<Type> },
    Array { element: Box<Type> },
    Map { key: Box<Type>, value: Box<Type> },
    Any,
    Paradigm(Arc<ParadigmType>),
    ParadigmElement(Arc<ParadigmElement>),
    /// Cycle marker: resolve by key instead of expanding.
    Reference(TypeName),
}

impl Type {
    pub fn basic(name: impl Into<String>) -> Self {
        Type::Basic { name: name.into() }
    }

    pub fn kind(&self) -> Kind {
        match self {
            Type::Basic { .. } => Kind::Basic,
            Type::Builtin(_) => Kind::Builtin,
            Type::Ident(_) => Kind::Ident,
            Type::Interface(_) => Kind::Interface,
            Type::Struct(_) => Kind::Struct,
            Type::Pointer { .. } => Kind::Pointer,
            Type::Array { .. } => Kind::Array,
            Type::Map { .. } => Kind::Map,
            Type::Any => Kind::Any,
            Type::Paradigm(_) => Kind::Paradigm,
            Type::ParadigmElement(_) => Kind::ParadigmElement,
            Type::Reference(_) => Kind::Reference,
        }
    }

    /// Identity of named types.
    pub fn name(&self) -> Option<&TypeName> {
        match self {
            Type::Builtin(t) => Some(&t.name),
            Type::Ident(t) => Some(&t.name),
            Type::Interface(t) => Some(&t.name),
            Type::Struct(t) if !t.name.is_anonymous() => Some(&t.name),
            Type::Reference(name) => Some(name),
            _ => None,
        }
    }

    pub fn annotations(&self) -> Option<&Annotations> {
        match self {
            Type::Builtin(t) => Some(&t.annotations),
            Type::Ident(t) => Some(&t.annotations),
            Type::Interface(t) => Some(&t.annotations),
            Type::Struct(t) => Some(&t.annotations),
            _ => None,
        }
    }

    /// Declared generic parameters of a generic declaration.
    pub fn paradigms(&self) -> &[Paradigm] {
        match self {
            Type::Struct(t) => &t.paradigms,
            Type::Ident(t) => &t.paradigms,
            _ => &[],
        }
    }

    /// True for basic types and named types whose underlying type is basic.
    pub fn is_basic(&self) -> bool {
        match self {
            Type::Basic { .. } => true,
            Type::Ident(t) => t.paradigms.is_empty() && t.target.is_basic(),
            _ => false,
        }
    }

    pub fn as_struct(&self) -> Option<&Arc<StructType>> {
        match self {
            Type::Struct(t) => Some(t),
            _ => None,
        }
    }

    /// Follows pointers and specializations to the concrete shape.
    pub fn concrete(&self) -> &Type {
        match self {
            Type::Pointer { target } => target.concrete(),
            Type::Paradigm(p) => match &p.packed {
                Some(packed) => packed.concrete(),
                None => self,
            },
            _ => self,
        }
    }

    /// Whether identical named types share one allocation.
    pub fn same_instance(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Struct(a), Type::Struct(b)) => Arc::ptr_eq(a, b),
            (Type::Ident(a), Type::Ident(b)) => Arc::ptr_eq(a, b),
            (Type::Interface(a), Type::Interface(b)) => Arc::ptr_eq(a, b),
            (Type::Builtin(a), Type::Builtin(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Basic { name } => write!(f, "{}", name),
            Type::Any => write!(f, "any"),
            Type::Pointer { target } => write!(f, "*{}", target),
            Type::Array { element } => write!(f, "[]{}", element),
            Type::Map { key, value } => write!(f, "map[{}]{}", key, value),
            Type::Paradigm(p) => {
                let args: Vec<String> = p.args.iter().map(|arg| arg.ty.to_string()).collect();
                write!(f, "{}[{}]", p.base, args.join(", "))
            }
            Type::ParadigmElement(e) => write!(f, "{}", e.name),
            Type::Struct(t) if t.name.is_anonymous() => write!(f, "struct{{...}}"),
            Type::Interface(t) if t.name.is_anonymous() => write!(f, "interface{{...}}"),
            other => match other.name() {
                Some(name) => write!(f, "{}", name),
                None => write!(f, "{:?}", other.kind()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_parse() {
        let tags = Tags::parse(r#"json:"id,omitempty" validate:"required" desc:"say \"hi\"""#);
        assert_eq!(tags.get("json"), Some("id,omitempty"));
        assert_eq!(tags.get("validate"), Some("required"));
        assert_eq!(tags.get("desc"), Some(r#"say "hi""#));
        assert_eq!(tags.get("xml"), None);
        assert_eq!(tags.iter().count(), 3);
    }

    #[test]
    fn test_tags_malformed_tail_is_ignored() {
        let tags = Tags::parse(r#"json:"name" broken"#);
        assert_eq!(tags.get("json"), Some("name"));
        assert_eq!(tags.iter().count(), 1);
    }

    #[test]
    fn test_basic_and_display() {
        let map = Type::Map {
            key: Box::new(Type::basic("string")),
            value: Box::new(Type::Array {
                element: Box::new(Type::Reference(TypeName::new("example.com/app", "User"))),
            }),
        };
        assert_eq!(map.to_string(), "map[string][]example.com/app.User");
        assert_eq!(map.kind(), Kind::Map);
        assert!(Type::basic("int64").is_basic());
        assert!(!Type::Any.is_basic());

        let named = Type::Ident(Arc::new(IdentType {
            name: TypeName::new("example.com/app", "Status"),
            annotations: Annotations::default(),
            paradigms: Vec::new(),
            target: Type::basic("string"),
        }));
        assert!(named.is_basic());
    }
}
