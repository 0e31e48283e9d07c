//! Command execution over the envd process service.

pub(crate) mod handle;
mod options;
mod types;

pub use handle::CommandHandle;
pub use options::{CommandOptions, ConnectOptions, OutputHandler, RequestOptions};
pub use types::{CommandResult, ProcessInfo};

use std::cmp::Ordering;
use std::time::Duration;

use e2b_core::{CommandExitError, Code, Error, EventStream, Result, RpcTransport};
use e2b_core::version::ENVD_VERSION_STDIN_DISABLE;

use crate::envd::decode_bytes;
use crate::envd::process::{
    ConnectRequest, ConnectResponse, Empty, ListRequest, ListResponse, ProcessConfig,
    ProcessInput, ProcessSelector, ProcessStreamMessage, SendInputRequest, SendSignalRequest,
    StartRequest, StartResponse, RPC_CONNECT, RPC_LIST, RPC_SEND_INPUT, RPC_SEND_SIGNAL,
    RPC_START, SIGNAL_SIGKILL,
};
use crate::envd::encode_bytes;
use crate::sandbox::SharedState;
use handle::Callbacks;
pub(crate) use options::DEFAULT_COMMAND_TIMEOUT;

/// Command execution facade of a sandbox.
#[derive(Clone, Debug)]
pub struct Commands {
    rpc: RpcTransport,
    shared: SharedState,
    default_request_timeout: Duration,
}

impl Commands {
    pub(crate) fn new(
        rpc: RpcTransport,
        shared: SharedState,
        default_request_timeout: Duration,
    ) -> Self {
        Commands {
            rpc,
            shared,
            default_request_timeout,
        }
    }

    fn request_timeout(&self, requested: Option<Duration>) -> Option<Duration> {
        effective_timeout(requested, self.default_request_timeout)
    }

    /// Runs a command and waits for it to finish.
    ///
    /// A non-zero exit code surfaces as [`Error::CommandExit`].
    pub async fn run(&self, cmd: impl Into<String>, options: CommandOptions) -> Result<CommandResult> {
        let handle = self.start(cmd.into(), options).await?;
        handle.wait().await
    }

    /// Starts a command in the background and returns its handle.
    pub async fn run_background(
        &self,
        cmd: impl Into<String>,
        options: CommandOptions,
    ) -> Result<CommandHandle> {
        self.start(cmd.into(), options).await
    }

    async fn start(&self, cmd: String, options: CommandOptions) -> Result<CommandHandle> {
        self.shared.ensure_open()?;

        if options.stdin == Some(false)
            && self.rpc.compare_version(ENVD_VERSION_STDIN_DISABLE) == Ordering::Less
        {
            return Err(Error::invalid_argument(format!(
                "disabling stdin requires envd version >= {ENVD_VERSION_STDIN_DISABLE} (current: {})",
                self.rpc.envd_version(),
            )));
        }

        // The command runs through a login shell, matching the other SDKs.
        let request = StartRequest {
            process: ProcessConfig {
                cmd: "/bin/bash".to_string(),
                args: vec!["-l".to_string(), "-c".to_string(), cmd],
                envs: options.envs.clone(),
                cwd: options.cwd.clone(),
            },
            pty: None,
            stdin: options.stdin,
            tag: options.tag.clone(),
        };

        let stream = self
            .rpc
            .server_stream::<_, StartResponse>(RPC_START, &request, options.user.as_deref())
            .await
            .map_err(Error::from)?;

        let timeout = options.timeout.unwrap_or(DEFAULT_COMMAND_TIMEOUT);
        match initialize_stream(stream).await? {
            StreamInit::Completed(result) => Ok(CommandHandle::completed(result)),
            StreamInit::Started {
                pid,
                stream,
                early_stdout,
                early_stderr,
            } => Ok(CommandHandle::spawn(
                self.rpc.clone(),
                pid,
                stream,
                Callbacks {
                    on_stdout: options.on_stdout.clone(),
                    on_stderr: options.on_stderr.clone(),
                    on_pty: None,
                },
                Some(timeout),
                false,
                early_stdout,
                early_stderr,
            )),
        }
    }

    /// Re-attaches to a running command by pid.
    pub async fn connect(&self, pid: u32, options: ConnectOptions) -> Result<CommandHandle> {
        self.shared.ensure_open()?;

        let request = ConnectRequest {
            process: ProcessSelector { pid },
        };
        let mut stream = self
            .rpc
            .server_stream::<_, ConnectResponse>(RPC_CONNECT, &request, None)
            .await
            .map_err(Error::from)?;

        let started = stream.receive().await.map_err(Error::from)?;
        let start = started
            .and_then(ProcessStreamMessage::into_event)
            .and_then(|event| event.start);
        let Some(start) = start else {
            return Err(Error::transport(
                "failed to connect to process: no start event received",
            ));
        };

        let timeout = options.timeout.unwrap_or(DEFAULT_COMMAND_TIMEOUT);
        Ok(CommandHandle::spawn(
            self.rpc.clone(),
            start.pid,
            stream,
            Callbacks {
                on_stdout: options.on_stdout.clone(),
                on_stderr: options.on_stderr.clone(),
                on_pty: None,
            },
            Some(timeout),
            false,
            Vec::new(),
            Vec::new(),
        ))
    }

    /// Lists running commands and PTY sessions.
    pub async fn list(&self, options: RequestOptions) -> Result<Vec<ProcessInfo>> {
        self.shared.ensure_open()?;
        let response: ListResponse = self
            .rpc
            .unary(
                RPC_LIST,
                &ListRequest {},
                None,
                self.request_timeout(options.request_timeout),
            )
            .await
            .map_err(Error::from)?;
        Ok(response.processes.into_iter().map(Into::into).collect())
    }

    /// Kills a command with SIGKILL. Returns `Ok(false)` when the process
    /// was not found.
    pub async fn kill(&self, pid: u32, options: RequestOptions) -> Result<bool> {
        self.shared.ensure_open()?;
        send_sigkill(
            &self.rpc,
            pid,
            self.request_timeout(options.request_timeout),
        )
        .await
    }

    /// Sends data to a command's stdin.
    pub async fn send_stdin(
        &self,
        pid: u32,
        data: impl AsRef<[u8]>,
        options: RequestOptions,
    ) -> Result<()> {
        self.shared.ensure_open()?;
        let request = SendInputRequest {
            process: ProcessSelector { pid },
            input: ProcessInput {
                stdin: Some(encode_bytes(data.as_ref())),
                pty: None,
            },
        };
        self.rpc
            .unary::<_, Empty>(
                RPC_SEND_INPUT,
                &request,
                None,
                self.request_timeout(options.request_timeout),
            )
            .await
            .map_err(Error::from)?;
        Ok(())
    }
}

/// Resolves a per-call timeout against the sandbox default; zero disables
/// the deadline.
pub(crate) fn effective_timeout(
    requested: Option<Duration>,
    default: Duration,
) -> Option<Duration> {
    let timeout = requested.unwrap_or(default);
    if timeout.is_zero() {
        None
    } else {
        Some(timeout)
    }
}

/// SIGKILLs `pid`; a `not_found` code means the process was already gone.
pub(crate) async fn send_sigkill(
    rpc: &RpcTransport,
    pid: u32,
    timeout: Option<Duration>,
) -> Result<bool> {
    let request = SendSignalRequest {
        process: ProcessSelector { pid },
        signal: SIGNAL_SIGKILL,
    };
    match rpc
        .unary::<_, Empty>(RPC_SEND_SIGNAL, &request, None, timeout)
        .await
    {
        Ok(_) => Ok(true),
        Err(err) if err.code() == Some(Code::NotFound) => Ok(false),
        Err(err) => Err(err.into()),
    }
}

pub(crate) enum StreamInit<M> {
    Started {
        pid: u32,
        stream: EventStream<M>,
        early_stdout: Vec<u8>,
        early_stderr: Vec<u8>,
    },
    Completed(CommandResult),
}

/// Reads stream events until the start event, buffering any data the server
/// delivers early.
///
/// At most 100 events are consumed. A stream that closes with buffered data
/// but no start or end event is the fast-command completion path and
/// synthesizes an exit-0 result; an end event before start publishes its
/// real exit code (non-zero becomes [`Error::CommandExit`]).
pub(crate) async fn initialize_stream<M: ProcessStreamMessage>(
    mut stream: EventStream<M>,
) -> Result<StreamInit<M>> {
    const MAX_INIT_EVENTS: usize = 100;

    let mut early_stdout: Vec<u8> = Vec::new();
    let mut early_stderr: Vec<u8> = Vec::new();
    let mut event_count = 0usize;

    while event_count < MAX_INIT_EVENTS {
        let received = stream.receive().await;
        let message = match received {
            Ok(message) => message,
            Err(err) => {
                if event_count > 0 && (!early_stdout.is_empty() || !early_stderr.is_empty()) {
                    return Ok(StreamInit::Completed(synthesized(early_stdout, early_stderr)));
                }
                return Err(err.into());
            }
        };

        let Some(message) = message else {
            // Stream closed before a start event.
            if event_count > 0 && (!early_stdout.is_empty() || !early_stderr.is_empty()) {
                return Ok(StreamInit::Completed(synthesized(early_stdout, early_stderr)));
            }
            return Err(Error::transport(format!(
                "failed to start process: stream ended after {event_count} events with no output"
            )));
        };

        event_count += 1;
        let Some(event) = message.into_event() else {
            continue;
        };

        if let Some(start) = event.start {
            return Ok(StreamInit::Started {
                pid: start.pid,
                stream,
                early_stdout,
                early_stderr,
            });
        }

        if let Some(data) = event.data {
            if let Some(chunk) = data.stdout.as_deref().and_then(decode_bytes) {
                early_stdout.extend_from_slice(&chunk);
            }
            if let Some(chunk) = data.stderr.as_deref().and_then(decode_bytes) {
                early_stderr.extend_from_slice(&chunk);
            }
            if let Some(chunk) = data.pty.as_deref().and_then(decode_bytes) {
                early_stdout.extend_from_slice(&chunk);
            }
            continue;
        }

        if let Some(end) = event.end {
            let result = CommandResult {
                stdout: String::from_utf8_lossy(&early_stdout).into_owned(),
                stderr: String::from_utf8_lossy(&early_stderr).into_owned(),
                exit_code: end.exit_code,
                error: end.error.unwrap_or_default(),
            };
            if result.exit_code != 0 {
                return Err(CommandExitError {
                    stdout: result.stdout,
                    stderr: result.stderr,
                    exit_code: result.exit_code,
                    error: result.error,
                }
                .into());
            }
            return Ok(StreamInit::Completed(result));
        }

        // Keepalives don't carry state.
    }

    Err(Error::transport(format!(
        "failed to start process: received {MAX_INIT_EVENTS} events but no start event"
    )))
}

fn synthesized(stdout: Vec<u8>, stderr: Vec<u8>) -> CommandResult {
    CommandResult {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code: 0,
        error: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use serde_json::{json, Value};
    use url::Url;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const END_STREAM: u8 = 0b0000_0010;

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
        body.extend(frame(END_STREAM, b"{}"));
        body
    }

    fn commands(server: &MockServer) -> Commands {
        let rpc = RpcTransport::new(
            reqwest::Client::new(),
            Url::parse(&server.uri()).unwrap(),
            None,
            None,
            "0.4.0",
        );
        Commands::new(rpc, SharedState::new(Duration::from_secs(60)), Duration::from_secs(5))
    }

    async fn mount_start(server: &MockServer, messages: &[Value]) {
        Mock::given(method("POST"))
            .and(path("/process.Process/Start"))
            .and(header("Keepalive-Ping-Interval", "50"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(stream_body(messages), "application/connect+json"),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn wait_surfaces_nonzero_exit_as_command_exit() {
        let server = MockServer::start().await;
        mount_start(
            &server,
            &[
                json!({"event": {"start": {"pid": 7}}}),
                json!({"event": {"end": {"exitCode": 2, "error": "oops"}}}),
            ],
        )
        .await;

        let err = commands(&server)
            .run("false", CommandOptions::new())
            .await
            .unwrap_err();
        match err {
            Error::CommandExit(exit) => {
                assert_eq!(exit.exit_code, 2);
                assert_eq!(exit.error, "oops");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn fast_command_without_start_event_synthesizes_exit_zero() {
        let server = MockServer::start().await;
        mount_start(
            &server,
            &[
                json!({"event": {"data": {"stdout": "YQo="}}}),
                json!({"event": {"data": {"stdout": "Ygo="}}}),
            ],
        )
        .await;

        let handle = commands(&server)
            .run_background("echo a; echo b", CommandOptions::new())
            .await
            .unwrap();
        assert_eq!(handle.pid(), 0);
        let result = handle.wait().await.unwrap();
        assert_eq!(result.stdout, "a\nb\n");
        assert_eq!(result.stderr, "");
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test]
    async fn kill_of_missing_process_returns_false() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/process.Process/SendSignal"))
            .respond_with(ResponseTemplate::new(404).set_body_json(
                json!({"code": "not_found", "message": "process 99 not found"}),
            ))
            .mount(&server)
            .await;

        let killed = commands(&server)
            .kill(99, RequestOptions::new())
            .await
            .unwrap();
        assert!(!killed);
    }

    #[tokio::test]
    async fn output_callbacks_preserve_server_order_and_accumulate() {
        let server = MockServer::start().await;
        mount_start(
            &server,
            &[
                json!({"event": {"start": {"pid": 3}}}),
                json!({"event": {"data": {"stdout": "YQo="}}}),
                json!({"event": {"data": {"stderr": "ZXJy"}}}),
                json!({"event": {"data": {"stdout": "Ygo="}}}),
                json!({"event": {"keepalive": {}}}),
                json!({"event": {"end": {"exitCode": 0}}}),
            ],
        )
        .await;

        let stdout_chunks: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let stderr_chunks: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let out = stdout_chunks.clone();
        let errs = stderr_chunks.clone();

        let result = commands(&server)
            .run(
                "echo a; echo err >&2; echo b",
                CommandOptions::new()
                    .on_stdout(move |chunk| out.lock().unwrap().push(chunk))
                    .on_stderr(move |chunk| errs.lock().unwrap().push(chunk)),
            )
            .await
            .unwrap();

        assert_eq!(*stdout_chunks.lock().unwrap(), vec!["a\n", "b\n"]);
        assert_eq!(*stderr_chunks.lock().unwrap(), vec!["err"]);
        // Accumulated output is the byte concatenation of the chunks.
        assert_eq!(result.stdout, "a\nb\n");
        assert_eq!(result.stderr, "err");
    }

    #[tokio::test]
    async fn early_data_before_start_is_replayed_in_order() {
        let server = MockServer::start().await;
        mount_start(
            &server,
            &[
                json!({"event": {"data": {"stdout": "ZWFybHkg"}}}),
                json!({"event": {"start": {"pid": 11}}}),
                json!({"event": {"data": {"stdout": "bGF0ZQo="}}}),
                json!({"event": {"end": {"exitCode": 0}}}),
            ],
        )
        .await;

        let chunks: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = chunks.clone();
        let handle = commands(&server)
            .run_background(
                "echo early; echo late",
                CommandOptions::new().on_stdout(move |chunk| sink.lock().unwrap().push(chunk)),
            )
            .await
            .unwrap();
        assert_eq!(handle.pid(), 11);

        let result = handle.wait().await.unwrap();
        assert_eq!(result.stdout, "early late\n");
        assert_eq!(*chunks.lock().unwrap(), vec!["early ", "late\n"]);
    }

    #[tokio::test]
    async fn start_request_uses_login_shell() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/process.Process/Start"))
            .and(body_partial_json(json!({
                "process": {"cmd": "/bin/bash", "args": ["-l", "-c", "ls -la"]}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                stream_body(&[
                    json!({"event": {"start": {"pid": 1}}}),
                    json!({"event": {"end": {"exitCode": 0}}}),
                ]),
                "application/connect+json",
            ))
            .expect(1)
            .mount(&server)
            .await;

        commands(&server)
            .run("ls -la", CommandOptions::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn stdin_disable_requires_modern_envd() {
        let server = MockServer::start().await;
        let rpc = RpcTransport::new(
            reqwest::Client::new(),
            Url::parse(&server.uri()).unwrap(),
            None,
            None,
            "0.2.0",
        );
        let commands = Commands::new(
            rpc,
            SharedState::new(Duration::from_secs(60)),
            Duration::from_secs(5),
        );
        let err = commands
            .run("cat", CommandOptions::new().with_stdin(false))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn connect_reattaches_by_pid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/process.Process/Connect"))
            .and(body_partial_json(json!({"process": {"pid": 42}})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                stream_body(&[
                    json!({"event": {"start": {"pid": 42}}}),
                    json!({"event": {"data": {"stdout": "aGk="}}}),
                    json!({"event": {"end": {"exitCode": 0}}}),
                ]),
                "application/connect+json",
            ))
            .mount(&server)
            .await;

        let handle = commands(&server)
            .connect(42, ConnectOptions::new())
            .await
            .unwrap();
        assert_eq!(handle.pid(), 42);
        assert_eq!(handle.wait().await.unwrap().stdout, "hi");
    }

    #[tokio::test]
    async fn list_maps_process_info() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/process.Process/List"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "processes": [
                    {"pid": 1, "tag": "start-cmd", "config": {"cmd": "/bin/bash", "args": ["-l"], "cwd": "/home/user"}},
                    {"pid": 2}
                ]
            })))
            .mount(&server)
            .await;

        let processes = commands(&server).list(RequestOptions::new()).await.unwrap();
        assert_eq!(processes.len(), 2);
        assert_eq!(processes[0].pid, 1);
        assert_eq!(processes[0].tag, "start-cmd");
        assert_eq!(processes[0].cwd, "/home/user");
        assert_eq!(processes[1].cmd, "");
    }

    #[tokio::test]
    async fn send_stdin_encodes_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/process.Process/SendInput"))
            .and(body_partial_json(json!({
                "process": {"pid": 1},
                "input": {"stdin": "aGk="}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        commands(&server)
            .send_stdin(1, "hi", RequestOptions::new())
            .await
            .unwrap();
    }
}
