use std::collections::HashMap;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine as _;
use e2b::{
    list_all, CommandOptions, Error, RunCodeOptions, Sandbox, SandboxListOptions, SandboxOptions,
    SandboxQuery, SandboxState, UrlOptions,
};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use wiremock::matchers::{body_partial_json, header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn frame(flags: u8, payload: &[u8]) -> Vec<u8> {
    let mut framed = vec![flags];
    framed.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    framed.extend_from_slice(payload);
    framed
}

fn stream_body(messages: &[Value]) -> Vec<u8> {
    let mut body = Vec::new();
    for message in messages {
        body.extend(frame(0, message.to_string().as_bytes()));
    }
    body.extend(frame(0b0000_0010, b"{}"));
    body
}

async fn mount_create(server: &MockServer, response: Value) {
    Mock::given(method("POST"))
        .and(path("/sandboxes"))
        .and(header("X-API-Key", "test-key"))
        .respond_with(ResponseTemplate::new(201).set_body_json(response))
        .mount(server)
        .await;
}

fn options(server: &MockServer) -> SandboxOptions {
    SandboxOptions::new()
        .with_api_key("test-key")
        .with_api_url(server.uri())
        .with_sandbox_url(server.uri())
}

#[tokio::test]
async fn create_builds_handle_from_control_plane_response() {
    let server = MockServer::start().await;
    mount_create(
        &server,
        json!({
            "sandboxID": "sbx-1",
            "templateID": "code-interpreter-v1",
            "clientID": "client",
            "envdVersion": "0.4.1",
            "envdAccessToken": "envd-tok",
            "trafficAccessToken": "traffic-tok",
            "domain": "sandbox.e2b.app"
        }),
    )
    .await;

    let sandbox = Sandbox::create(options(&server)).await.unwrap();
    assert_eq!(sandbox.id(), "sbx-1");
    // The control-plane domain overrides the configured one.
    assert_eq!(sandbox.domain(), "sandbox.e2b.app");
    assert_eq!(sandbox.envd_version(), "0.4.1");
    assert_eq!(sandbox.traffic_access_token(), Some("traffic-tok"));
    assert_eq!(sandbox.get_host(3000), "3000-sbx-1.sandbox.e2b.app");
}

#[tokio::test]
async fn create_without_api_key_is_invalid_argument() {
    std::env::remove_var("E2B_API_KEY");
    let server = MockServer::start().await;
    let err = Sandbox::create(
        SandboxOptions::new()
            .with_api_url(server.uri())
            // An empty key counts as missing.
            .with_api_key(""),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[tokio::test]
async fn close_is_idempotent_and_gates_every_facade() {
    let server = MockServer::start().await;
    mount_create(
        &server,
        json!({"sandboxID": "sbx-2", "envdVersion": "0.4.0"}),
    )
    .await;
    Mock::given(method("DELETE"))
        .and(path("/sandboxes/sbx-2"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let sandbox = Sandbox::create(options(&server)).await.unwrap();
    sandbox.close().await.unwrap();
    assert!(sandbox.is_closed());
    // Second close is a no-op (the DELETE mock expects exactly one call).
    sandbox.close().await.unwrap();

    assert!(matches!(
        sandbox.run_code("x = 1", RunCodeOptions::new()).await,
        Err(Error::SandboxClosed)
    ));
    assert!(matches!(
        sandbox.commands().run("ls", CommandOptions::new()).await,
        Err(Error::SandboxClosed)
    ));
    assert!(matches!(
        sandbox
            .files()
            .read("/x", e2b::FsOptions::new())
            .await,
        Err(Error::SandboxClosed)
    ));
    assert!(matches!(sandbox.get_info().await, Err(Error::SandboxClosed)));
}

#[tokio::test]
async fn connect_resumes_and_maps_404_to_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sandboxes/sbx-3/connect"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sandboxID": "sbx-3",
            "envdVersion": "0.3.1",
            "envdAccessToken": "tok"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sandboxes/missing/connect"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let sandbox = Sandbox::connect("sbx-3", options(&server)).await.unwrap();
    assert_eq!(sandbox.id(), "sbx-3");
    assert_eq!(sandbox.envd_version(), "0.3.1");

    let err = Sandbox::connect("missing", options(&server))
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = Sandbox::connect("", options(&server)).await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[tokio::test]
async fn pause_409_and_kill_404_count_as_success() {
    let server = MockServer::start().await;
    mount_create(
        &server,
        json!({"sandboxID": "sbx-4", "envdVersion": "0.4.0"}),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/sandboxes/sbx-4/pause"))
        .respond_with(ResponseTemplate::new(409))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/sandboxes/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let sandbox = Sandbox::create(options(&server)).await.unwrap();
    sandbox.pause().await.unwrap();

    Sandbox::kill_by_id(
        "gone",
        SandboxOptions::new()
            .with_api_key("test-key")
            .with_api_url(server.uri()),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn set_timeout_updates_config_snapshot() {
    let server = MockServer::start().await;
    mount_create(
        &server,
        json!({"sandboxID": "sbx-5", "envdVersion": "0.4.0"}),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/sandboxes/sbx-5/timeout"))
        .and(body_partial_json(json!({"timeout": 600})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let sandbox = Sandbox::create(options(&server)).await.unwrap();
    assert_eq!(sandbox.timeout(), Duration::from_secs(300));
    sandbox.set_timeout(Duration::from_secs(600)).await.unwrap();
    assert_eq!(sandbox.timeout(), Duration::from_secs(600));
}

#[tokio::test]
async fn metrics_pass_time_range_as_unix_seconds() {
    let server = MockServer::start().await;
    mount_create(
        &server,
        json!({"sandboxID": "sbx-6", "envdVersion": "0.4.0"}),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/sandboxes/sbx-6/metrics"))
        .and(query_param("start", "1700000000"))
        .and(query_param("end", "1700000060"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "cpuCount": 2, "cpuUsedPct": 12.5,
            "memUsed": 100, "memTotal": 1024,
            "diskUsed": 10, "diskTotal": 512,
            "timestampUnix": 1700000030
        }])))
        .mount(&server)
        .await;

    let sandbox = Sandbox::create(options(&server)).await.unwrap();
    let metrics = sandbox
        .get_metrics(
            e2b::MetricsOptions::new()
                .with_start(chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap())
                .with_end(chrono::DateTime::from_timestamp(1_700_000_060, 0).unwrap()),
        )
        .await
        .unwrap();
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0].cpu_used_pct, 12.5);
}

#[tokio::test]
async fn commands_run_through_the_public_handle() {
    let server = MockServer::start().await;
    mount_create(
        &server,
        json!({"sandboxID": "sbx-7", "envdVersion": "0.4.0", "envdAccessToken": "tok"}),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/process.Process/Start"))
        .and(header("X-Access-Token", "tok"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            stream_body(&[
                json!({"event": {"start": {"pid": 9}}}),
                json!({"event": {"data": {"stdout": "aGk="}}}),
                json!({"event": {"end": {"exitCode": 0}}}),
            ]),
            "application/connect+json",
        ))
        .mount(&server)
        .await;

    let sandbox = Sandbox::create(options(&server)).await.unwrap();
    let result = sandbox
        .commands()
        .run("echo -n hi", CommandOptions::new())
        .await
        .unwrap();
    assert_eq!(result.stdout, "hi");
    assert_eq!(result.exit_code, 0);
}

#[tokio::test]
async fn download_url_is_signed_bit_exactly() {
    let server = MockServer::start().await;
    mount_create(
        &server,
        json!({
            "sandboxID": "sbx-8",
            "envdVersion": "0.4.0",
            "envdAccessToken": "T",
            "domain": "e2b.app"
        }),
    )
    .await;

    let sandbox = Sandbox::create(options(&server)).await.unwrap();
    let url = sandbox
        .download_url("/p/f.txt", UrlOptions::new())
        .unwrap();

    let parsed = url::Url::parse(&url).unwrap();
    assert_eq!(parsed.scheme(), "https");
    assert_eq!(parsed.host_str(), Some("49983-sbx-8.e2b.app"));
    assert_eq!(parsed.path(), "/files");

    let pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    let expected_signature = format!(
        "v1_{}",
        STANDARD_NO_PAD.encode(Sha256::digest("/p/f.txt:read::T".as_bytes()))
    );
    assert_eq!(
        pairs,
        vec![
            ("path".to_string(), "/p/f.txt".to_string()),
            ("signature".to_string(), expected_signature),
        ]
    );
}

#[tokio::test]
async fn upload_url_signs_write_and_expiration() {
    let server = MockServer::start().await;
    mount_create(
        &server,
        json!({
            "sandboxID": "sbx-9",
            "envdVersion": "0.4.0",
            "envdAccessToken": "T"
        }),
    )
    .await;

    let sandbox = Sandbox::create(options(&server)).await.unwrap();
    let url = sandbox
        .upload_url(
            "/up.bin",
            UrlOptions::new()
                .with_user("root")
                .with_signature_expiration(3600),
        )
        .unwrap();

    let parsed = url::Url::parse(&url).unwrap();
    let pairs: HashMap<String, String> = parsed
        .query_pairs()
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    assert_eq!(pairs["path"], "/up.bin");
    assert_eq!(pairs["username"], "root");
    let expiration: i64 = pairs["signature_expiration"].parse().unwrap();
    assert!(expiration > chrono::Utc::now().timestamp());
    let expected = format!(
        "v1_{}",
        STANDARD_NO_PAD.encode(Sha256::digest(
            format!("/up.bin:write:root:T:{expiration}").as_bytes()
        ))
    );
    assert_eq!(pairs["signature"], expected);
}

#[tokio::test]
async fn pre_0_4_envd_defaults_the_url_user() {
    let server = MockServer::start().await;
    mount_create(
        &server,
        json!({
            "sandboxID": "sbx-10",
            "envdVersion": "0.3.0",
            "envdAccessToken": "T"
        }),
    )
    .await;

    let sandbox = Sandbox::create(options(&server)).await.unwrap();
    let url = sandbox.download_url("/f", UrlOptions::new()).unwrap();
    let parsed = url::Url::parse(&url).unwrap();
    let pairs: HashMap<String, String> = parsed
        .query_pairs()
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    assert_eq!(pairs["username"], "user");
    let expected = format!(
        "v1_{}",
        STANDARD_NO_PAD.encode(Sha256::digest("/f:read:user:T".as_bytes()))
    );
    assert_eq!(pairs["signature"], expected);
}

#[tokio::test]
async fn debug_mode_short_circuits_the_control_plane() {
    let sandbox = Sandbox::create(SandboxOptions::new().with_debug(true))
        .await
        .unwrap();
    assert_eq!(sandbox.id(), "debug_sandbox_id");
    assert_eq!(sandbox.envd_version(), "99.99.99");
    assert_eq!(sandbox.get_host(49999), "localhost:49999");

    // No access token in debug mode: the URL carries no signature.
    let url = sandbox.download_url("/f", UrlOptions::new()).unwrap();
    assert!(url.starts_with("http://localhost:49983/files"));
    assert!(!url.contains("signature"));

    // Nothing listens locally, which reads as "not running".
    assert!(!sandbox.is_running().await.unwrap());

    sandbox.close().await.unwrap();
}

#[tokio::test]
async fn pagination_concatenates_pages_until_token_runs_out() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/sandboxes"))
        .and(query_param("next_token", "t1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"sandboxID": "sbx-b", "state": "paused"}])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/sandboxes"))
        .and(query_param_is_missing("next_token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"sandboxID": "sbx-a", "state": "running"}]))
                .insert_header("X-Next-Token", "t1"),
        )
        .mount(&server)
        .await;

    let list_options = || {
        SandboxListOptions::new()
            .with_api_key("test-key")
            .with_api_url(server.uri())
            .with_query(SandboxQuery {
                metadata: HashMap::new(),
                state: vec![SandboxState::Running, SandboxState::Paused],
            })
    };

    // Page by page.
    let mut paginator = e2b::list(list_options()).unwrap();
    assert!(paginator.has_next());
    let first = paginator.next_items().await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].sandbox_id, "sbx-a");
    assert!(paginator.has_next());
    let second = paginator.next_items().await.unwrap();
    assert_eq!(second[0].sandbox_id, "sbx-b");
    assert!(!paginator.has_next());
    assert!(paginator.next_items().await.unwrap().is_empty());

    // list_all equals the concatenation of the pages.
    let all = list_all(list_options()).await.unwrap();
    let ids: Vec<&str> = all.iter().map(|info| info.sandbox_id.as_str()).collect();
    assert_eq!(ids, ["sbx-a", "sbx-b"]);
}
