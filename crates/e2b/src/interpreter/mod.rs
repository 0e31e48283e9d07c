//! Client for the in-sandbox code interpreter (Jupyter port).
//!
//! `POST /execute` answers with newline-delimited JSON; each line is one
//! event. The stream is read on the caller's task and folded into an
//! [`Execution`].

pub mod charts;
mod execution;
mod options;

pub use execution::{
    Context, EnvVars, Execution, ExecutionError, ExecutionResult, Logs, OutputMessage,
};
pub use options::{ContextOptions, RunCodeOptions};

use std::time::Duration;

use e2b_core::consts::{HEADER_ACCESS_TOKEN, HEADER_TRAFFIC_TOKEN, USER_AGENT as SDK_USER_AGENT};
use e2b_core::{Error, Result};
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use url::Url;

use charts::Chart;

/// A single NDJSON line can carry an inline image; cap it at 10 MiB.
const MAX_LINE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Serialize)]
struct ExecuteRequest<'a> {
    code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    context_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
    #[serde(skip_serializing_if = "env_vars_is_empty")]
    env_vars: &'a EnvVars,
}

fn env_vars_is_empty(env_vars: &&EnvVars) -> bool {
    env_vars.is_empty()
}

#[derive(Serialize)]
struct CreateContextRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cwd: Option<&'a str>,
}

/// One line of the execution stream.
#[derive(Debug, Default, Deserialize)]
struct StreamEvent {
    #[serde(rename = "type", default)]
    event_type: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    timestamp: i64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    value: String,
    #[serde(default)]
    traceback: String,
    #[serde(default)]
    execution_count: i32,
    #[serde(default)]
    is_main_result: bool,
    #[serde(default)]
    html: String,
    #[serde(default)]
    markdown: String,
    #[serde(default)]
    svg: String,
    #[serde(default)]
    png: String,
    #[serde(default)]
    jpeg: String,
    #[serde(default)]
    pdf: String,
    #[serde(default)]
    latex: String,
    #[serde(default)]
    json: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    javascript: String,
    #[serde(default)]
    data: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    chart: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    extra: Option<serde_json::Map<String, serde_json::Value>>,
}

/// HTTP client for the interpreter endpoint of one sandbox.
#[derive(Clone, Debug)]
pub(crate) struct InterpreterClient {
    http: reqwest::Client,
    base_url: Url,
    access_token: Option<String>,
    traffic_token: Option<String>,
    default_request_timeout: Duration,
}

impl InterpreterClient {
    pub fn new(
        http: reqwest::Client,
        base_url: Url,
        access_token: Option<String>,
        traffic_token: Option<String>,
        default_request_timeout: Duration,
    ) -> Self {
        InterpreterClient {
            http,
            base_url,
            access_token,
            traffic_token,
            default_request_timeout,
        }
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static(SDK_USER_AGENT));
        if let Some(token) = self.access_token.as_deref() {
            if let Ok(value) = HeaderValue::from_str(token) {
                headers.insert(HEADER_ACCESS_TOKEN, value);
            }
        }
        if let Some(token) = self.traffic_token.as_deref() {
            if let Ok(value) = HeaderValue::from_str(token) {
                headers.insert(HEADER_TRAFFIC_TOKEN, value);
            }
        }
        headers
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|err| Error::invalid_argument(format!("invalid interpreter path: {err}")))
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&(impl Serialize + ?Sized)>,
        timeout: Option<Duration>,
    ) -> Result<(u16, Vec<u8>)> {
        let mut request = self
            .http
            .request(method, self.url(path)?)
            .headers(self.headers());
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                Error::RequestTimeout
            } else {
                Error::transport(format!("request failed: {err}"))
            }
        })?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|err| Error::transport(format!("failed to read response body: {err}")))?;
        Ok((status, body.to_vec()))
    }

    fn request_timeout(&self, requested: Option<Duration>) -> Option<Duration> {
        crate::commands::effective_timeout(requested, self.default_request_timeout)
    }

    /// Evaluates a code fragment and folds the event stream into an
    /// [`Execution`]. Blocks on the caller's task until the stream closes.
    pub async fn run_code(&self, code: &str, options: &RunCodeOptions) -> Result<Execution> {
        if options.language.is_some() && options.context.is_some() {
            return Err(Error::invalid_argument(
                "cannot provide both language and context",
            ));
        }

        // The code-execution deadline is separate from the sandbox lifetime:
        // unset means 60 s, zero disables it.
        let deadline = match options.timeout {
            None => Some(crate::consts::DEFAULT_CODE_EXECUTION_TIMEOUT),
            Some(timeout) if timeout.is_zero() => None,
            Some(timeout) => Some(timeout),
        };

        let execute = self.execute_stream(code, options);
        match deadline {
            Some(deadline) => tokio::time::timeout(deadline, execute)
                .await
                .map_err(|_| Error::ExecutionTimeout)?,
            None => execute.await,
        }
    }

    async fn execute_stream(&self, code: &str, options: &RunCodeOptions) -> Result<Execution> {
        let request = ExecuteRequest {
            code,
            context_id: options.context.as_ref().map(|context| context.id.as_str()),
            language: options.language.as_deref(),
            env_vars: &options.env_vars,
        };

        let mut http_request = self
            .http
            .post(self.url("/execute")?)
            .headers(self.headers())
            .json(&request);
        // An explicit request timeout bounds the whole streaming response;
        // most callers rely on the execution deadline instead.
        if let Some(request_timeout) = options.request_timeout {
            http_request = http_request.timeout(request_timeout);
        }
        let response = http_request
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    Error::RequestTimeout
                } else {
                    Error::transport(format!("request failed: {err}"))
                }
            })?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.bytes().await.unwrap_or_default();
            return Err(Error::from_http_status(
                status,
                String::from_utf8_lossy(&body).into_owned(),
            ));
        }

        let mut execution = Execution::default();
        let mut body = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = body.next().await {
            let chunk = chunk
                .map_err(|err| Error::transport(format!("error reading stream: {err}")))?;
            buffer.extend_from_slice(&chunk);

            while let Some(newline) = buffer.iter().position(|byte| *byte == b'\n') {
                let line: Vec<u8> = buffer.drain(..=newline).collect();
                handle_line(&line[..newline], &mut execution, options);
            }
            if buffer.len() > MAX_LINE_BYTES {
                return Err(Error::transport("execution stream line exceeds 10 MiB"));
            }
        }
        // Trailing line without a newline.
        if !buffer.is_empty() {
            handle_line(&buffer, &mut execution, options);
        }

        Ok(execution)
    }

    pub async fn create_context(&self, options: &ContextOptions) -> Result<Context> {
        let request = CreateContextRequest {
            language: options.language.as_deref(),
            cwd: options.cwd.as_deref(),
        };
        let (status, body) = self
            .request(
                Method::POST,
                "/contexts",
                Some(&request),
                self.request_timeout(options.request_timeout),
            )
            .await?;
        match status {
            200 | 201 => serde_json::from_slice(&body).map_err(|err| {
                Error::transport(format!("failed to parse context response: {err}"))
            }),
            _ => Err(http_error(status, &body)),
        }
    }

    pub async fn list_contexts(&self) -> Result<Vec<Context>> {
        let (status, body) = self
            .request(Method::GET, "/contexts", None::<&()>, self.request_timeout(None))
            .await?;
        match status {
            200 => serde_json::from_slice(&body).map_err(|err| {
                Error::transport(format!("failed to parse contexts response: {err}"))
            }),
            _ => Err(http_error(status, &body)),
        }
    }

    pub async fn remove_context(&self, context_id: &str) -> Result<()> {
        if context_id.is_empty() {
            return Err(Error::invalid_argument("context ID is required"));
        }
        let (status, body) = self
            .request(
                Method::DELETE,
                &format!("/contexts/{context_id}"),
                None::<&()>,
                self.request_timeout(None),
            )
            .await?;
        match status {
            200 | 204 => Ok(()),
            _ => Err(http_error(status, &body)),
        }
    }

    /// Restarts a context, clearing its state.
    pub async fn restart_context(&self, context_id: &str) -> Result<()> {
        if context_id.is_empty() {
            return Err(Error::invalid_argument("context ID is required"));
        }
        let (status, body) = self
            .request(
                Method::POST,
                &format!("/contexts/{context_id}/restart"),
                None::<&()>,
                self.request_timeout(None),
            )
            .await?;
        match status {
            200 | 204 => Ok(()),
            _ => Err(http_error(status, &body)),
        }
    }
}

fn http_error(status: u16, body: &[u8]) -> Error {
    Error::from_http_status(status, String::from_utf8_lossy(body).into_owned())
}

/// Parses one stream line and applies it to the execution.
/// Lines that are not valid JSON are skipped to preserve liveness.
fn handle_line(line: &[u8], execution: &mut Execution, options: &RunCodeOptions) {
    if line.is_empty() {
        return;
    }
    let event: StreamEvent = match serde_json::from_slice(line) {
        Ok(event) => event,
        Err(err) => {
            tracing::debug!(target = "e2b::interpreter", %err, "skipping undecodable line");
            return;
        }
    };
    apply_event(event, execution, options);
}

fn apply_event(event: StreamEvent, execution: &mut Execution, options: &RunCodeOptions) {
    match event.event_type.as_str() {
        "result" => {
            let chart = event
                .chart
                .as_ref()
                .and_then(Chart::decode);
            let result = ExecutionResult {
                text: event.text,
                html: event.html,
                markdown: event.markdown,
                svg: event.svg,
                png: event.png,
                jpeg: event.jpeg,
                pdf: event.pdf,
                latex: event.latex,
                json: event.json,
                javascript: event.javascript,
                data: event.data,
                chart,
                is_main_result: event.is_main_result,
                extra: event.extra,
            };
            if let Some(handler) = &options.on_result {
                handler(&result);
            }
            execution.results.push(result);
        }
        "stdout" => {
            execution.logs.stdout.push(event.text.clone());
            if let Some(handler) = &options.on_stdout {
                handler(OutputMessage {
                    line: event.text,
                    timestamp: event.timestamp,
                    error: false,
                });
            }
        }
        "stderr" => {
            execution.logs.stderr.push(event.text.clone());
            if let Some(handler) = &options.on_stderr {
                handler(OutputMessage {
                    line: event.text,
                    timestamp: event.timestamp,
                    error: true,
                });
            }
        }
        "error" => {
            let error = ExecutionError {
                name: event.name,
                value: event.value,
                traceback: event.traceback,
            };
            if let Some(handler) = &options.on_error {
                handler(&error);
            }
            execution.error = Some(error);
        }
        "number_of_executions" => {
            execution.execution_count = event.execution_count;
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(line: &str, execution: &mut Execution) {
        handle_line(line.as_bytes(), execution, &RunCodeOptions::new());
    }

    #[test]
    fn stream_events_fold_into_execution() {
        let mut execution = Execution::default();
        apply(r#"{"type":"stdout","text":"hi","timestamp":1}"#, &mut execution);
        apply(r#"{"type":"stderr","text":"warn","timestamp":2}"#, &mut execution);
        apply(r#"{"type":"result","text":"2","is_main_result":true}"#, &mut execution);
        apply(r#"{"type":"number_of_executions","execution_count":3}"#, &mut execution);

        assert_eq!(execution.logs.stdout, vec!["hi"]);
        assert_eq!(execution.logs.stderr, vec!["warn"]);
        assert_eq!(execution.text(), "2");
        assert_eq!(execution.execution_count, 3);
        assert!(execution.error.is_none());
    }

    #[test]
    fn error_event_populates_error_field() {
        let mut execution = Execution::default();
        apply(
            r#"{"type":"error","name":"ZeroDivisionError","value":"division by zero","traceback":"..."}"#,
            &mut execution,
        );
        let error = execution.error.unwrap();
        assert_eq!(error.name, "ZeroDivisionError");
        assert_eq!(error.value, "division by zero");
    }

    #[test]
    fn undecodable_lines_are_skipped() {
        let mut execution = Execution::default();
        apply("not json at all", &mut execution);
        apply(r#"{"type":"stdout","text":"still works"}"#, &mut execution);
        assert_eq!(execution.logs.stdout, vec!["still works"]);
    }

    #[test]
    fn chart_decoder_failure_drops_chart_silently() {
        let mut execution = Execution::default();
        // "type" missing inside the chart mapping: decode fails, result stays.
        apply(
            r#"{"type":"result","text":"plot","chart":{"title":"no type"}}"#,
            &mut execution,
        );
        assert_eq!(execution.results.len(), 1);
        assert!(execution.results[0].chart.is_none());
        assert_eq!(execution.results[0].text, "plot");
    }

    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> InterpreterClient {
        InterpreterClient::new(
            reqwest::Client::new(),
            Url::parse(&server.uri()).unwrap(),
            Some("envd-token".to_string()),
            None,
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn run_code_happy_path() {
        let server = MockServer::start().await;
        let body = concat!(
            "{\"type\":\"stdout\",\"text\":\"hi\",\"timestamp\":1}\n",
            "{\"type\":\"result\",\"text\":\"2\",\"is_main_result\":true}\n",
            "{\"type\":\"number_of_executions\",\"execution_count\":3}\n",
        );
        Mock::given(method("POST"))
            .and(path("/execute"))
            .and(header("X-Access-Token", "envd-token"))
            .and(body_partial_json(serde_json::json!({"code": "x=1+1; x"})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
            .expect(1)
            .mount(&server)
            .await;

        let execution = client(&server)
            .run_code("x=1+1; x", &RunCodeOptions::new())
            .await
            .unwrap();

        assert_eq!(execution.logs.stdout, vec!["hi"]);
        assert_eq!(execution.text(), "2");
        assert_eq!(execution.execution_count, 3);
        assert!(execution.error.is_none());
    }

    #[tokio::test]
    async fn run_code_execution_error_is_a_field_not_an_err() {
        let server = MockServer::start().await;
        let body = "{\"type\":\"error\",\"name\":\"ZeroDivisionError\",\"value\":\"division by zero\",\"traceback\":\"...\"}\n";
        Mock::given(method("POST"))
            .and(path("/execute"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
            .mount(&server)
            .await;

        let execution = client(&server)
            .run_code("1/0", &RunCodeOptions::new())
            .await
            .unwrap();
        let error = execution.error.expect("execution error");
        assert_eq!(error.name, "ZeroDivisionError");
    }

    #[tokio::test]
    async fn run_code_deadline_yields_execution_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/execute"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("{\"type\":\"stdout\",\"text\":\"late\"}\n", "application/x-ndjson")
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .run_code(
                "import time; time.sleep(100)",
                &RunCodeOptions::new().with_timeout(Duration::from_millis(100)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ExecutionTimeout));
    }

    #[tokio::test]
    async fn run_code_rejects_language_and_context_together() {
        let server = MockServer::start().await;
        let options = RunCodeOptions::new()
            .with_language("python")
            .with_context(Context {
                id: "ctx".into(),
                language: "python".into(),
                cwd: String::new(),
            });
        let err = client(&server)
            .run_code("x", &options)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn run_code_translates_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/execute"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = client(&server)
            .run_code("x", &RunCodeOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RateLimit(_)));
    }

    #[tokio::test]
    async fn context_crud_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/contexts"))
            .and(body_partial_json(serde_json::json!({"language": "python"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(
                serde_json::json!({"id": "ctx-1", "language": "python", "cwd": "/home/user"}),
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/contexts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!([{"id": "ctx-1", "language": "python", "cwd": "/home/user"}]),
            ))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/contexts/ctx-1/restart"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/contexts/ctx-1"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = client(&server);
        let context = client
            .create_context(&ContextOptions::new().with_language("python"))
            .await
            .unwrap();
        assert_eq!(context.id, "ctx-1");
        assert_eq!(client.list_contexts().await.unwrap().len(), 1);
        client.restart_context("ctx-1").await.unwrap();
        client.remove_context("ctx-1").await.unwrap();
        assert!(matches!(
            client.remove_context("").await.unwrap_err(),
            Error::InvalidArgument(_)
        ));
    }

    #[test]
    fn callbacks_observe_events_in_order() {
        use std::sync::{Arc, Mutex};
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_out = seen.clone();
        let options = RunCodeOptions::new()
            .on_stdout(move |message| seen_out.lock().unwrap().push(message.line));

        let mut execution = Execution::default();
        for line in [
            r#"{"type":"stdout","text":"a"}"#,
            r#"{"type":"stdout","text":"b"}"#,
        ] {
            handle_line(line.as_bytes(), &mut execution, &options);
        }
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(execution.logs.stdout, vec!["a", "b"]);
    }
}
