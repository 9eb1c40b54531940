mod common;

use anyhow::Result;
use common::{Fixture, MemoryStorage, USERS_DOC, USERS_GET, USERS_MODELS};
use fngen::config::toml_config::GeneratorConfig;
use fngen::core::generate::{self, Generator, Project};
use fngen::LocalStorage;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const POSTS_DOC: &str = r#"// @service posts
package posts
"#;

const POSTS_FNS: &str = r#"package posts

import (
	"context"

	"example.com/app/modules/users"
)

type Post struct {
	Title  string
	Author users.User
}

// @fn list
// @authorization
func listPosts(ctx context.Context, param users.GetUserParam) (result []Post, err error) {
	return
}

// @fn ping
// @internal
func ping(ctx context.Context) (err error) {
	return
}
"#;

fn scaffold(fixture: &Fixture) -> Project {
    fixture.app("");
    fixture.write("app/modules/users/doc.go", USERS_DOC);
    fixture.write("app/modules/users/models.go", USERS_MODELS);
    fixture.write("app/modules/users/get.go", USERS_GET);
    Project::new(fixture.path("app")).with_cache(fixture.cache())
}

#[tokio::test]
async fn test_generates_one_file_per_service_and_deploys() -> Result<()> {
    let fixture = Fixture::new();
    let project = scaffold(&fixture);
    let storage = MemoryStorage::default();

    let generator = Generator::load(project, GeneratorConfig::default(), storage.clone())?;
    assert_eq!(generator.services().len(), 1);

    let mut seen = Vec::new();
    let running = generator.start(&CancellationToken::new(), false);
    let summary = generate::collect(running, |result| {
        seen.push((result.step.clone(), result.unit.clone()));
    })
    .await;

    assert_eq!(summary.failed, 0);
    assert_eq!(summary.aborted, 0);
    assert_eq!(summary.succeeded, 3);
    assert!(summary.is_success());
    assert_eq!(
        seen,
        vec![
            ("parse".to_string(), "example.com/app/modules/users.getUser".to_string()),
            ("write".to_string(), "users".to_string()),
            ("deploys".to_string(), "services.go".to_string()),
        ]
    );

    assert_eq!(
        storage.paths(),
        vec!["modules/services.go".to_string(), "modules/users/fns.go".to_string()]
    );

    let service = storage.content("modules/users/fns.go").unwrap();
    assert!(service.starts_with("// NOTE: this file has been automatically generated"));
    assert!(service.contains("package users"));
    assert!(service.contains("_name = \"users\""));
    assert!(service.contains("_getUserFnName = \"get\""));
    assert!(service.contains("// GetUser Get user"));
    assert!(service.contains(
        "func GetUser(ctx context.Context, param GetUserParam) (result *User, err error) {"
    ));
    assert!(service.contains("func (fn *_getUserFn) Readonly() bool {\n\treturn true\n}"));
    assert!(service.contains("func (fn *_getUserFn) Internal() bool {\n\treturn false\n}"));
    assert!(service.contains("services.NewAbstract(\n\t\t\t_name,\n\t\t\tfalse,\n"));
    assert!(!service.contains("True"));
    assert!(!service.contains("False"));
    assert!(service.contains("\"github.com/aacfactory/fns/services\""));

    let deploys = storage.content("modules/services.go").unwrap();
    assert!(deploys.contains("package modules"));
    assert!(deploys.contains("\"example.com/app/modules/users\""));
    assert!(deploys.contains("users.Service(),"));
    Ok(())
}

#[tokio::test]
async fn test_cross_service_imports_are_rendered() {
    let fixture = Fixture::new();
    let project = scaffold(&fixture);
    fixture.write("app/modules/posts/doc.go", POSTS_DOC);
    fixture.write("app/modules/posts/fns_impl.go", POSTS_FNS);
    let storage = MemoryStorage::default();

    let generator = Generator::load(project, GeneratorConfig::default(), storage.clone()).unwrap();
    let names: Vec<&str> = generator.services().iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["posts", "users"]);

    let summary = generate::collect(generator.start(&CancellationToken::new(), false), |_| {}).await;
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.succeeded, 3 + 2 + 1);

    let posts = storage.content("modules/posts/fns.go").unwrap();
    assert!(posts.contains("\"example.com/app/modules/users\""));
    assert!(posts.contains(
        "func ListPosts(ctx context.Context, param users.GetUserParam) (result []Post, err error) {"
    ));
    assert!(posts.contains("func Ping(ctx context.Context) (err error) {"));
    assert!(posts.contains("services.Authorize(r)"));

    let deploys = storage.content("modules/services.go").unwrap();
    let posts_at = deploys.find("posts.Service(),").unwrap();
    let users_at = deploys.find("users.Service(),").unwrap();
    assert!(posts_at < users_at);

    let dump: serde_json::Value = serde_json::from_str(&generator.dump().unwrap()).unwrap();
    assert_eq!(dump["module"], "example.com/app");
    let list = &dump["services"][0]["functions"][0];
    assert_eq!(list["name"], "list");
    assert_eq!(list["result"]["kind"], "array");
    assert_eq!(list["param"]["kind"], "struct");
}

#[tokio::test]
async fn test_invalid_function_stops_before_writing() {
    let fixture = Fixture::new();
    let project = scaffold(&fixture);
    fixture.write(
        "app/modules/users/broken.go",
        "package users\n\nimport \"context\"\n\n// @fn broken\nfunc broken(ctx context.Context) (int, string, error) {\n\treturn 0, \"\", nil\n}\n",
    );
    let storage = MemoryStorage::default();

    let generator = Generator::load(project, GeneratorConfig::default(), storage.clone()).unwrap();
    let mut failures = Vec::new();
    let summary = generate::collect(generator.start(&CancellationToken::new(), false), |result| {
        if let Err(err) = &result.outcome {
            failures.push((result.unit.clone(), err.to_string()));
        }
    })
    .await;

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.succeeded, 1);
    assert!(!summary.is_success());
    assert_eq!(failures[0].0, "example.com/app/modules/users.broken");
    assert!(failures[0].1.contains("expects one or two results"));
    assert!(storage.paths().is_empty());
}

#[tokio::test]
async fn test_cancelled_run_reports_abort() {
    let fixture = Fixture::new();
    let project = scaffold(&fixture);
    let storage = MemoryStorage::default();
    let generator = Generator::load(project, GeneratorConfig::default(), storage.clone()).unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let running = generator.start(&cancel, false);
    running.abort(Duration::from_secs(1)).await.unwrap();

    let summary = generate::collect(running, |_| {}).await;
    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.aborted, 1);
    assert!(storage.paths().is_empty());
}

#[tokio::test]
async fn test_writes_to_disk_and_regenerates() {
    let fixture = Fixture::new();
    let root = fixture.path("app");

    for _ in 0..2 {
        let project = scaffold(&fixture);
        let generator =
            Generator::load(project, GeneratorConfig::default(), LocalStorage::new(&root)).unwrap();
        let summary = generate::collect(generator.start(&CancellationToken::new(), false), |_| {}).await;
        assert!(summary.is_success());
    }

    assert!(root.join("modules").join("users").join("fns.go").is_file());
    assert!(root.join("modules").join("services.go").is_file());
}

#[tokio::test]
async fn test_unchanged_files_are_not_rewritten() {
    let fixture = Fixture::new();
    let storage = MemoryStorage::default();

    for _ in 0..2 {
        let generator =
            Generator::load(scaffold(&fixture), GeneratorConfig::default(), storage.clone()).unwrap();
        let summary = generate::collect(generator.start(&CancellationToken::new(), false), |_| {}).await;
        assert!(summary.is_success());
        assert_eq!(storage.writes(), 2);
    }

    fixture.write("app/modules/posts/doc.go", POSTS_DOC);
    fixture.write("app/modules/posts/fns_impl.go", POSTS_FNS);
    let generator =
        Generator::load(scaffold(&fixture), GeneratorConfig::default(), storage.clone()).unwrap();
    let summary = generate::collect(generator.start(&CancellationToken::new(), false), |_| {}).await;
    assert!(summary.is_success());
    // new posts file plus the deploy file listing it; users is untouched
    assert_eq!(storage.writes(), 4);
}

#[test]
fn test_missing_services_directory_fails_to_load() {
    let fixture = Fixture::new();
    fixture.app("");
    let project = Project::new(fixture.path("app")).with_cache(fixture.cache());

    let err = Generator::load(project, GeneratorConfig::default(), MemoryStorage::default())
        .err()
        .unwrap();
    assert!(err.to_string().contains("services directory not found"));
}
