use super::*;
use crate::config::ServerConfig;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request};
use cacd_core::archive::bundle::write_zip;
use cacd_core::archive::BundleEntry;
use cacd_core::memory_bank::CUSTOM_COMMANDS_DIR;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    _dir: TempDir,
    state: AppState,
    router: Router,
}

fn app() -> TestApp {
    let dir = TempDir::new().unwrap();
    let config = ServerConfig::with_data_dir(dir.path().to_path_buf());
    let state = AppState::new(&config).unwrap();
    let router = create_router(state.clone());
    TestApp {
        _dir: dir,
        state,
        router,
    }
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    async fn json(&self, method: Method, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header("X-USER-ID", "tester")
            .body(Body::from(body.to_string()))
            .unwrap();
        let (status, bytes) = self.send(request).await;
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn get(&self, uri: &str) -> (StatusCode, Vec<u8>) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn upload(&self, uri: &str, data: Vec<u8>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/zip")
            .body(Body::from(data))
            .unwrap();
        let (status, bytes) = self.send(request).await;
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn create_project(&self, name: &str, origin: &str) -> u64 {
        let (status, body) = self
            .json(
                Method::POST,
                "/api/projects",
                json!({"name": name, "origin": origin}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["id"].as_u64().unwrap()
    }
}

#[tokio::test]
async fn test_health_check() {
    let app = app();
    let (status, body) = app.get("/api/health").await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "cacd");
}

#[tokio::test]
async fn test_project_lifecycle_and_error_statuses() {
    let app = app();
    let id = app.create_project("alpha", "git@alpha").await;

    let (status, body) = app
        .json(
            Method::POST,
            "/api/projects",
            json!({"name": "other", "origin": "git@alpha"}),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().is_some());

    let (status, _) = app.get("/api/projects/by_origin?origin=git@alpha").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get("/api/projects/by_origin?origin=nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.get(&format!("/api/projects/{}/history", id)).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["history"][0]["action"], "create_project");
    assert_eq!(body["history"][0]["user_id"], "tester");
}

#[tokio::test]
async fn test_export_import_and_merge() {
    let app = app();
    let id = app.create_project("alpha", "git@alpha").await;
    let (status, _) = app
        .json(
            Method::POST,
            "/api/tasks",
            json!({"task_id": "t1", "command": "build", "project_id": id, "context": "ctx"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, archive) = app.get(&format!("/api/projects/{}/export", id)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, imported) = app
        .upload("/api/projects/import?origin=git@beta&name=beta", archive.clone())
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", imported);
    assert_eq!(imported["name"], "beta");

    let (status, _) = app
        .upload("/api/projects/import?origin=git@beta", archive.clone())
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let target = app.create_project("gamma", "git@gamma").await;
    let (status, report) = app
        .upload(
            &format!("/api/projects/{}/merge?dry_run=true", target),
            archive.clone(),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", report);
    assert_eq!(report["summary"]["tasks"]["added"], 1);
    assert_eq!(report["report"]["dry_run"], true);

    let (status, _) = app
        .upload(&format!("/api/projects/{}/merge", target), b"not a zip".to_vec())
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_archive_with_invalid_records_is_rejected() {
    let app = app();
    let target = app.create_project("alpha", "git@alpha").await;
    let bad = write_zip(vec![BundleEntry::new("tasks.json", r#"[{"id": "t1"}]"#)]).unwrap();

    let (status, body) = app
        .upload("/api/projects/import?origin=git@broken", bad.clone())
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("tasks.json entry 0"));
    let (status, _) = app.get("/api/projects/by_origin?origin=git@broken").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .upload(&format!("/api/projects/{}/merge?dry_run=false", target), bad)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let records = app
        .state
        .store
        .list_records(cacd_core::EntityKind::Tasks, Some(cacd_core::ProjectId(target)))
        .unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn test_snapshot_and_rollback() {
    let app = app();
    let id = app.create_project("alpha", "git@alpha").await;

    let (status, snapshot) = app
        .json(
            Method::POST,
            &format!("/api/projects/{}/snapshots", id),
            json!({"reason": "before"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let snapshot_id = snapshot["id"].as_str().unwrap().to_string();

    app.json(
        Method::POST,
        "/api/tasks",
        json!({"task_id": "late", "command": "c", "project_id": id}),
    )
    .await;

    let (status, report) = app
        .json(
            Method::POST,
            &format!("/api/projects/{}/snapshots/{}/rollback", id, snapshot_id),
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", report);
    assert_eq!(report["restored"]["tasks"], 0);

    let (status, _) = app
        .json(
            Method::POST,
            &format!(
                "/api/projects/{}/snapshots/{}/rollback",
                id,
                uuid::Uuid::new_v4()
            ),
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_docs_versions_and_rollback() {
    let app = app();
    let id = app.create_project("alpha", "git@alpha").await;
    let base = format!("/api/projects/{}/docs", id);

    let (status, doc) = app
        .json(Method::POST, &base, json!({"type": "readme", "content": "v1"}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let doc_id = doc["id"].as_u64().unwrap();

    app.json(
        Method::PUT,
        &format!("{}/{}", base, doc_id),
        json!({"content": "v2"}),
    )
    .await;

    let (status, body) = app.get(&format!("{}/{}/versions", base, doc_id)).await;
    assert_eq!(status, StatusCode::OK);
    let versions: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(versions["versions"].as_array().unwrap().len(), 2);

    let (status, doc) = app
        .json(
            Method::POST,
            &format!("{}/{}/rollback", base, doc_id),
            json!({"version": 1}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc["content"], "v1");

    let (status, _) = app
        .json(
            Method::POST,
            &format!("{}/{}/rollback", base, doc_id),
            json!({"version": 9}),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_task_completion_and_context() {
    let app = app();
    let (status, task) = app
        .json(
            Method::POST,
            "/api/tasks",
            json!({"task_id": "g1", "command": "lint", "context": "global"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(task["status"], "pending");

    let (status, done) = app
        .json(Method::POST, "/api/tasks/g1/complete", json!({"result": "ok"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["task"]["status"], "done");
    assert!(done["report"].is_null());

    let (status, body) = app.get("/api/context/g1").await;
    assert_eq!(status, StatusCode::OK);
    let context: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(context["data"], "global");

    let (status, _) = app.get("/api/context/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, report) = app
        .json(
            Method::POST,
            "/api/generate_report",
            json!({"task_id": "g1", "summary": "all good"}),
        )
        .await;
    assert_eq!(report["report"], "Report for task g1: all good");
}

#[tokio::test]
async fn test_rules_apply_list_delete() {
    let app = app();
    let (status, body) = app
        .json(
            Method::POST,
            "/api/rules",
            json!([{"meta": {"description": "Use tabs", "alwaysApply": true}, "body": "Tabs."}]),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["results"][0]["path"], "Use_tabs.mdc");

    let (status, _) = app
        .json(
            Method::POST,
            "/api/rules",
            json!([{"meta": {"alwaysApply": true}, "body": "no description"}]),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = app.get("/api/rules").await;
    let listed: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(listed["rules"].as_array().unwrap().len(), 1);

    let request = Request::builder()
        .method(Method::DELETE)
        .uri("/api/rules?path=Use_tabs.mdc")
        .body(Body::empty())
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_memory_bank_merge_defaults_to_dry_run() {
    let app = app();
    app.state.bank.write_text("notes.md", "old").unwrap();
    let incoming = write_zip(vec![
        BundleEntry::new("notes.md", "new"),
        BundleEntry::new("extra.md", "x"),
    ])
    .unwrap();

    let (status, body) = app.upload("/api/memory-bank/merge", incoming.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dry_run"], true);
    assert_eq!(body["changes"], json!(["NEW: extra.md", "CHANGED: notes.md"]));
    assert_eq!(app.state.bank.read_text("notes.md").unwrap(), "old");

    let (status, _) = app
        .upload("/api/memory-bank/merge?dry_run=false", incoming)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.state.bank.read_text("notes.md").unwrap(), "new");
}

#[tokio::test]
async fn test_federation_push_pull() {
    let app = app();
    let (status, _) = app
        .upload(
            "/api/federation/acme/files/knowledge/guide.md",
            b"# Guide".to_vec(),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/federation/acme/files/knowledge_packages/guide.md")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get(header::CONTENT_TYPE).unwrap();
    assert!(content_type.to_str().unwrap().starts_with("text/"));

    let (status, body) = app.get("/api/federation/acme/knowledge/guide.md").await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["content"], "# Guide");

    let (status, _) = app.get("/api/federation/acme/files/widgets").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.get("/api/federation/acme/backlog").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_custom_command_runs_action() {
    let app = app();
    app.state
        .bank
        .write_text(
            &format!("{}/greet.yaml", CUSTOM_COMMANDS_DIR),
            "description: Greet\nparameters:\n  - name: msg\n    type: string\n    required: true\naction: echo_action\n",
        )
        .unwrap();

    let (status, body) = app
        .json(Method::POST, "/api/custom_command/greet", json!({"msg": "hi"}))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["action"], "echo_action");

    let (status, _) = app
        .json(Method::POST, "/api/custom_command/greet", json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .json(Method::POST, "/api/custom_command/unknown", json!({}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
