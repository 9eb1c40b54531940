//! Generic instantiation ("paradigm packing").
//!
//! Substitutions travel down the recursion as an explicit [`Bindings`]
//! value. Packing never touches the generic declaration: it builds a new
//! concrete type for every instantiation. An instantiation whose arguments
//! still mention enclosing parameters stays unpacked until the enclosing
//! generic is itself packed.

use crate::types::model::{
    IdentType, ParadigmArg, ParadigmType, StructField, StructType, Type,
};
use crate::utils::error::{GenError, Result};
use std::sync::Arc;

/// Active parameter substitutions, innermost instantiation last.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    entries: Vec<(String, Type)>,
}

impl Bindings {
    pub fn new(args: &[ParadigmArg]) -> Self {
        Self {
            entries: args
                .iter()
                .map(|arg| (arg.name.clone(), arg.ty.clone()))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Type> {
        self.entries
            .iter()
            .rev()
            .find(|(bound, _)| bound == name)
            .map(|(_, ty)| ty)
    }
}

/// Builds the `Paradigm` node for `base[args...]` and packs it when every
/// argument is concrete.
pub fn instantiate(base: Type, args: Vec<Type>) -> Result<Type> {
    let declared = base.paradigms();
    if !matches!(base, Type::Reference(_)) && declared.len() != args.len() {
        return Err(GenError::resolve(format!(
            "{} expects {} type arguments, got {}",
            base,
            declared.len(),
            args.len()
        )));
    }

    let args: Vec<ParadigmArg> = args
        .into_iter()
        .enumerate()
        .map(|(index, ty)| ParadigmArg {
            name: declared
                .get(index)
                .map(|paradigm| paradigm.name.clone())
                .unwrap_or_default(),
            ty,
        })
        .collect();
    let packed = pack(&base, &args)?;

    Ok(Type::Paradigm(Arc::new(ParadigmType { base, args, packed })))
}

/// Specializes `base` with `args`. Returns `None` when an argument is still
/// a parameter of an enclosing generic.
pub fn pack(base: &Type, args: &[ParadigmArg]) -> Result<Option<Type>> {
    if matches!(base, Type::Reference(_)) || args.iter().any(|arg| has_free_elements(&arg.ty)) {
        return Ok(None);
    }
    let bindings = Bindings::new(args);

    let packed = match base {
        Type::Struct(generic) => {
            let fields = generic
                .fields
                .iter()
                .enumerate()
                .map(|(index, field)| {
                    let ty = substitute(&field.ty, &bindings).map_err(|e| GenError::FieldError {
                        field: field.name.clone(),
                        index,
                        source: Box::new(e),
                    })?;
                    Ok(StructField {
                        name: field.name.clone(),
                        ty,
                        tags: field.tags.clone(),
                        annotations: field.annotations.clone(),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Type::Struct(Arc::new(StructType {
                name: generic.name.clone(),
                annotations: generic.annotations.clone(),
                paradigms: Vec::new(),
                fields,
            }))
        }
        Type::Ident(generic) => Type::Ident(Arc::new(IdentType {
            name: generic.name.clone(),
            annotations: generic.annotations.clone(),
            paradigms: Vec::new(),
            target: substitute(&generic.target, &bindings)?,
        })),
        other => {
            return Err(GenError::resolve(format!("{} is not a generic type", other)));
        }
    };

    Ok(Some(packed))
}

/// Replaces parameter references in `ty` with their bound types.
pub fn substitute(ty: &Type, bindings: &Bindings) -> Result<Type> {
    match ty {
        Type::ParadigmElement(element) => bindings
            .get(&element.name)
            .cloned()
            .ok_or_else(|| GenError::PackMissed {
                name: element.name.clone(),
            }),
        Type::Pointer { target } => Ok(Type::Pointer {
            target: Box::new(substitute(target, bindings)?),
        }),
        Type::Array { element } => Ok(Type::Array {
            element: Box::new(substitute(element, bindings)?),
        }),
        Type::Map { key, value } => Ok(Type::Map {
            key: Box::new(substitute(key, bindings)?),
            value: Box::new(substitute(value, bindings)?),
        }),
        Type::Struct(inline) if inline.name.is_anonymous() => {
            let fields = inline
                .fields
                .iter()
                .map(|field| {
                    Ok(StructField {
                        name: field.name.clone(),
                        ty: substitute(&field.ty, bindings)?,
                        tags: field.tags.clone(),
                        annotations: field.annotations.clone(),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Type::Struct(Arc::new(StructType {
                name: inline.name.clone(),
                annotations: inline.annotations.clone(),
                paradigms: Vec::new(),
                fields,
            })))
        }
        Type::Paradigm(nested) if nested.packed.is_none() => {
            let args = nested
                .args
                .iter()
                .map(|arg| {
                    Ok(ParadigmArg {
                        name: arg.name.clone(),
                        ty: substitute(&arg.ty, bindings)?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let packed = pack(&nested.base, &args)?;
            Ok(Type::Paradigm(Arc::new(ParadigmType {
                base: nested.base.clone(),
                args,
                packed,
            })))
        }
        other => Ok(other.clone()),
    }
}

/// True when `ty` mentions a generic parameter that is not bound yet.
pub fn has_free_elements(ty: &Type) -> bool {
    match ty {
        Type::ParadigmElement(_) => true,
        Type::Pointer { target } => has_free_elements(target),
        Type::Array { element } => has_free_elements(element),
        Type::Map { key, value } => has_free_elements(key) || has_free_elements(value),
        Type::Struct(inline) if inline.name.is_anonymous() => {
            inline.fields.iter().any(|field| has_free_elements(&field.ty))
        }
        Type::Paradigm(nested) => {
            nested.packed.is_none() && nested.args.iter().any(|arg| has_free_elements(&arg.ty))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::Annotations;
    use crate::types::model::{Paradigm, ParadigmElement, Tags, TypeName};

    fn element(name: &str) -> Type {
        Type::ParadigmElement(Arc::new(ParadigmElement {
            name: name.to_string(),
            constraints: vec![Type::Any],
        }))
    }

    fn field(name: &str, ty: Type) -> StructField {
        StructField {
            name: name.to_string(),
            ty,
            tags: Tags::default(),
            annotations: Annotations::default(),
        }
    }

    fn generic_struct(name: &str, params: &[&str], fields: Vec<StructField>) -> Type {
        Type::Struct(Arc::new(StructType {
            name: TypeName::new("example.com/app/models", name),
            annotations: Annotations::default(),
            paradigms: params
                .iter()
                .map(|p| Paradigm {
                    name: p.to_string(),
                    constraints: vec![Type::Any],
                })
                .collect(),
            fields,
        }))
    }

    fn user() -> Type {
        Type::Struct(Arc::new(StructType {
            name: TypeName::new("example.com/app/users", "User"),
            annotations: Annotations::default(),
            paradigms: Vec::new(),
            fields: vec![field("Id", Type::basic("string"))],
        }))
    }

    #[test]
    fn test_pack_pager_of_user() {
        let pager = generic_struct(
            "Pager",
            &["E"],
            vec![
                field("No", Type::basic("int")),
                field("Items", Type::Array { element: Box::new(element("E")) }),
            ],
        );

        let packed = instantiate(pager, vec![user()]).unwrap();
        let Type::Paradigm(paradigm) = &packed else {
            panic!("expected paradigm");
        };
        assert_eq!(paradigm.args[0].name, "E");

        let concrete = packed.concrete().as_struct().unwrap();
        let Type::Array { element } = &concrete.field("Items").unwrap().ty else {
            panic!("expected array");
        };
        assert_eq!(element.to_string(), "example.com/app/users.User");
        assert!(concrete.paradigms.is_empty());
    }

    #[test]
    fn test_nested_generic_is_deferred_then_packed() {
        let wrapper = generic_struct("Wrapper", &["T"], vec![field("Value", element("T"))]);
        // Wrapper[E] inside a generic body: E is not bound yet
        let nested = instantiate(wrapper, vec![element("E")]).unwrap();
        let Type::Paradigm(inner) = &nested else {
            panic!("expected paradigm");
        };
        assert!(inner.packed.is_none());
        assert!(has_free_elements(&nested));

        let page = generic_struct("Page", &["E"], vec![field("Meta", nested.clone())]);
        let packed = instantiate(page, vec![Type::basic("string")]).unwrap();

        let meta = &packed.concrete().as_struct().unwrap().field("Meta").unwrap().ty;
        let value = &meta.concrete().as_struct().unwrap().field("Value").unwrap().ty;
        assert_eq!(value.to_string(), "string");
    }

    #[test]
    fn test_missing_binding_is_pack_missed() {
        let err = substitute(&element("K"), &Bindings::default()).unwrap_err();
        assert!(matches!(err, GenError::PackMissed { ref name } if name == "K"));
    }

    #[test]
    fn test_argument_count_mismatch() {
        let pager = generic_struct("Pager", &["E"], vec![field("Items", element("E"))]);
        let err = instantiate(pager, vec![user(), user()]).unwrap_err();
        assert!(err.to_string().contains("expects 1 type arguments"));
    }
}
