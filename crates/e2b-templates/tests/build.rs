use std::sync::{Arc, Mutex};
use std::time::Duration;

use e2b_core::Error;
use e2b_templates::{
    BuildOptions, TemplateBuilder, TemplateOptions, TemplateUpdate, TemplatesClient,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn template_options(server: &MockServer) -> TemplateOptions {
    TemplateOptions::new()
        .with_api_key("test-key")
        .with_api_url(server.uri())
        .with_request_timeout(Duration::from_secs(5))
}

#[tokio::test]
async fn build_runs_all_three_phases_and_replays_logs() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v3/templates"))
        .and(header("X-API-Key", "test-key"))
        .and(body_partial_json(json!({
            "alias": "my-template",
            "cpuCount": 2,
            "memoryMB": 1024
        })))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({
            "templateID": "tpl-1",
            "buildID": "bld-1",
            "aliases": ["my-template"],
            "public": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v2/templates/tpl-1/builds/bld-1"))
        .and(body_partial_json(json!({
            "fromImage": "python:3.11",
            "steps": [{"type": "RUN", "args": ["pip install numpy"]}]
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    // First poll: still building, one log entry. Second poll (offset 1):
    // ready with another entry.
    Mock::given(method("GET"))
        .and(path("/templates/tpl-1/builds/bld-1/status"))
        .and(query_param("logsOffset", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "templateID": "tpl-1",
            "buildID": "bld-1",
            "status": "ready",
            "logEntries": [{"level": "info", "message": "done"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/templates/tpl-1/builds/bld-1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "templateID": "tpl-1",
            "buildID": "bld-1",
            "status": "building",
            "logEntries": [{"level": "info", "message": "pulling base image"}]
        })))
        .mount(&server)
        .await;

    let logs: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = logs.clone();

    let info = TemplateBuilder::new()
        .from_image("python:3.11")
        .run_cmd("pip install numpy")
        .build(
            "my-template",
            BuildOptions::new()
                .with_poll_interval(Duration::from_millis(10))
                .on_logs(move |entry| sink.lock().unwrap().push(entry.message)),
            template_options(&server),
        )
        .await
        .unwrap();

    assert_eq!(info.template_id, "tpl-1");
    assert_eq!(info.build_id, "bld-1");
    assert_eq!(*logs.lock().unwrap(), vec!["pulling base image", "done"]);
}

#[tokio::test]
async fn failed_build_reports_the_reason() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/templates/tpl-2/builds/bld-2/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "error",
            "logEntries": [],
            "reason": {"message": "step 3 failed: exit status 1"}
        })))
        .mount(&server)
        .await;

    let client = TemplatesClient::new(template_options(&server)).unwrap();
    let err = client
        .wait_for_build("tpl-2", "bld-2", &BuildOptions::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("step 3 failed"));
}

#[tokio::test]
async fn client_requires_some_credential() {
    std::env::remove_var("E2B_API_KEY");
    std::env::remove_var("E2B_ACCESS_TOKEN");
    let err = TemplatesClient::new(TemplateOptions::new().with_api_url("http://localhost:3000"))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[tokio::test]
async fn alias_403_means_exists_without_access() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/templates/aliases/taken"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/templates/aliases/free"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = TemplatesClient::new(template_options(&server)).unwrap();
    assert!(client.alias_exists("taken").await.unwrap());
    assert!(!client.alias_exists("free").await.unwrap());
}

#[tokio::test]
async fn file_upload_link_reports_cache_state() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/templates/tpl-3/files/abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "present": false,
            "url": "https://upload.example/abc123"
        })))
        .mount(&server)
        .await;

    let client = TemplatesClient::new(template_options(&server)).unwrap();
    let upload = client.get_file_upload_link("tpl-3", "abc123").await.unwrap();
    assert!(!upload.present);
    assert_eq!(upload.url.as_deref(), Some("https://upload.example/abc123"));
}

#[tokio::test]
async fn template_crud_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/templates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "templateID": "tpl-4",
            "aliases": ["base"],
            "buildID": "bld-9",
            "buildStatus": "ready",
            "cpuCount": 2,
            "memoryMB": 1024,
            "public": true
        }])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/templates/tpl-4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "templateID": "tpl-4",
            "aliases": ["base"],
            "builds": [{"buildID": "bld-9", "status": "ready"}],
            "public": true
        })))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/templates/tpl-4"))
        .and(body_partial_json(json!({"public": false})))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/templates/tpl-4"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let client = TemplatesClient::new(template_options(&server)).unwrap();
    let templates = client.list_templates().await.unwrap();
    assert_eq!(templates.len(), 1);
    assert_eq!(templates[0].template_id, "tpl-4");

    let template = client.get_template("tpl-4").await.unwrap();
    assert_eq!(template.builds.len(), 1);

    client
        .update_template(
            "tpl-4",
            &TemplateUpdate {
                public: Some(false),
            },
        )
        .await
        .unwrap();
    client.delete_template("tpl-4").await.unwrap();
}
