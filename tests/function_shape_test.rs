mod common;

use common::{Fixture, USERS_DOC, USERS_MODELS};
use fngen::config::toml_config::GeneratorConfig;
use fngen::modules::Module;
use fngen::services::{Function, Service};
use fngen::types::Kind;
use fngen::utils::error::Result;
use std::sync::Arc;

fn discover(fixture: &Fixture, source: &str) -> Result<Arc<Vec<Service>>> {
    let mod_file = fixture.app("");
    fixture.write("app/modules/users/doc.go", USERS_DOC);
    fixture.write("app/modules/users/models.go", USERS_MODELS);
    fixture.write("app/modules/users/fns_impl.go", source);
    let module = Module::new(&mod_file, fixture.env())?;
    module.services(&GeneratorConfig::default())
}

fn only_function(fixture: &Fixture, source: &str) -> Arc<Function> {
    let services = discover(fixture, source).unwrap();
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].functions.len(), 1);
    services[0].functions[0].clone()
}

fn shape(signature: &str) -> String {
    format!(
        "package users\n\nimport \"context\"\n\n// @fn probe\n{} {{\n\treturn\n}}\n",
        signature
    )
}

#[test]
fn test_context_and_error_only() {
    let fixture = Fixture::new();
    let function = only_function(&fixture, &shape("func x(ctx context.Context) (err error)"));
    let signature = function.parse(&GeneratorConfig::default().conventions).unwrap();
    assert!(signature.param.is_none());
    assert!(signature.result.is_none());
}

#[test]
fn test_exported_candidate_is_rejected() {
    let fixture = Fixture::new();
    let err = discover(&fixture, &shape("func X(ctx context.Context) (err error)")).unwrap_err();
    assert!(err.to_string().contains("must be unexported"));
}

#[test]
fn test_missing_context_is_rejected() {
    let fixture = Fixture::new();
    let function = only_function(&fixture, &shape("func x(a, b int) (err error)"));
    let err = function
        .parse(&GeneratorConfig::default().conventions)
        .unwrap_err();
    assert!(err.to_string().contains("first parameter must be a context"));
}

#[test]
fn test_too_many_results_are_rejected() {
    let fixture = Fixture::new();
    let function = only_function(&fixture, &shape("func x(ctx context.Context) (int, string, error)"));
    let err = function
        .parse(&GeneratorConfig::default().conventions)
        .unwrap_err();
    assert!(err.to_string().contains("expects one or two results"));
}

#[test]
fn test_error_must_come_last() {
    let fixture = Fixture::new();
    let function = only_function(&fixture, &shape("func x(ctx context.Context) (err error, n int)"));
    let err = function
        .parse(&GeneratorConfig::default().conventions)
        .unwrap_err();
    assert!(err.to_string().contains("last result must be an error"));
}

#[test]
fn test_generic_function_is_rejected() {
    let fixture = Fixture::new();
    let function = only_function(&fixture, &shape("func x[T any](ctx context.Context, param T) (err error)"));
    let err = function
        .parse(&GeneratorConfig::default().conventions)
        .unwrap_err();
    assert!(err.to_string().contains("generic functions are not supported"));
}

#[test]
fn test_param_and_result_types_resolve() {
    let fixture = Fixture::new();
    let function = only_function(&fixture, &shape(
        "func x(ctx context.Context, param GetUserParam) (result *User, err error)",
    ));
    assert_eq!(function.name, "probe");
    assert_eq!(function.proxy_ident, "X");
    assert_eq!(function.handler_ident, "_xFn");
    assert_eq!(function.const_ident, "_xFnName");

    let signature = function.parse(&GeneratorConfig::default().conventions).unwrap();
    let param = signature.param.as_ref().unwrap();
    assert_eq!(param.name, "param");
    assert_eq!(param.ty.kind(), Kind::Struct);

    let result = signature.result.as_ref().unwrap();
    assert_eq!(result.ty.kind(), Kind::Pointer);
    let user = result.ty.concrete().as_struct().unwrap();
    assert_eq!(user.field("Created").unwrap().ty.kind(), Kind::Builtin);
}

#[test]
fn test_framework_error_type_is_accepted() {
    let source = r#"package users

import (
	"context"

	"github.com/aacfactory/errors"
)

// @fn probe
func x(ctx context.Context) (err errors.CodeError) {
	return
}
"#;
    let fixture = Fixture::new();
    let function = only_function(&fixture, source);
    assert!(function.parse(&GeneratorConfig::default().conventions).is_ok());
}

#[test]
fn test_duplicate_function_names_are_rejected() {
    let source = r#"package users

import "context"

// @fn same
func a(ctx context.Context) (err error) {
	return
}

// @fn same
func b(ctx context.Context) (err error) {
	return
}
"#;
    let fixture = Fixture::new();
    let err = discover(&fixture, source).unwrap_err();
    assert!(err.to_string().contains("duplicate function name same"));
}
