//! Pseudo-terminal sessions over the envd process service.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use e2b_core::{Error, Result, RpcTransport};

use crate::commands::handle::Callbacks;
use crate::commands::{
    effective_timeout, initialize_stream, send_sigkill, CommandHandle, RequestOptions, StreamInit,
    DEFAULT_COMMAND_TIMEOUT,
};
use crate::envd::encode_bytes;
use crate::envd::process::{
    ConnectRequest, ConnectResponse, Empty, ProcessConfig, ProcessInput, ProcessSelector,
    ProcessStreamMessage, Pty as PtyMessage, PtySize as PtySizeMessage, SendInputRequest,
    StartRequest, StartResponse, UpdateRequest, RPC_CONNECT, RPC_SEND_INPUT, RPC_START,
    RPC_UPDATE,
};
use crate::sandbox::SharedState;

/// Callback invoked with each raw PTY output chunk.
///
/// PTY data is a byte stream (escape sequences included) and is not decoded
/// as UTF-8 by the SDK.
pub type PtyOutputHandler = Arc<dyn Fn(Bytes) + Send + Sync>;

/// Terminal dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtySize {
    pub rows: u32,
    pub cols: u32,
}

/// Options for creating a PTY.
#[derive(Clone, Default)]
pub struct PtyOptions {
    pub(crate) user: Option<String>,
    pub(crate) cwd: Option<String>,
    pub(crate) envs: HashMap<String, String>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) on_stdout: Option<PtyOutputHandler>,
}

impl PtyOptions {
    pub fn new() -> Self {
        PtyOptions::default()
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_envs(mut self, envs: HashMap<String, String>) -> Self {
        self.envs = envs;
        self
    }

    /// Lifetime of the PTY connection. Zero disables the limit. Defaults to
    /// 60 seconds.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Terminal output callback; receives raw bytes.
    pub fn on_stdout(mut self, handler: impl Fn(Bytes) + Send + Sync + 'static) -> Self {
        self.on_stdout = Some(Arc::new(handler));
        self
    }
}

/// Options for attaching to an existing PTY.
#[derive(Clone, Default)]
pub struct PtyConnectOptions {
    pub(crate) timeout: Option<Duration>,
    pub(crate) on_stdout: Option<PtyOutputHandler>,
}

impl PtyConnectOptions {
    pub fn new() -> Self {
        PtyConnectOptions::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn on_stdout(mut self, handler: impl Fn(Bytes) + Send + Sync + 'static) -> Self {
        self.on_stdout = Some(Arc::new(handler));
        self
    }
}

/// PTY facade of a sandbox.
#[derive(Clone, Debug)]
pub struct Pty {
    rpc: RpcTransport,
    shared: SharedState,
    default_request_timeout: Duration,
}

impl Pty {
    pub(crate) fn new(
        rpc: RpcTransport,
        shared: SharedState,
        default_request_timeout: Duration,
    ) -> Self {
        Pty {
            rpc,
            shared,
            default_request_timeout,
        }
    }

    fn request_timeout(&self, requested: Option<Duration>) -> Option<Duration> {
        effective_timeout(requested, self.default_request_timeout)
    }

    /// Starts an interactive login shell attached to a terminal of the given
    /// size.
    pub async fn create(&self, size: PtySize, options: PtyOptions) -> Result<CommandHandle> {
        self.shared.ensure_open()?;

        let mut envs = options.envs.clone();
        envs.entry("TERM".to_string())
            .or_insert_with(|| "xterm-256color".to_string());
        envs.entry("LANG".to_string())
            .or_insert_with(|| "C.UTF-8".to_string());
        envs.entry("LC_ALL".to_string())
            .or_insert_with(|| "C.UTF-8".to_string());

        let request = StartRequest {
            process: ProcessConfig {
                cmd: "/bin/bash".to_string(),
                args: vec!["-i".to_string(), "-l".to_string()],
                envs,
                cwd: options.cwd.clone(),
            },
            pty: Some(PtyMessage {
                size: PtySizeMessage {
                    cols: size.cols,
                    rows: size.rows,
                },
            }),
            stdin: None,
            tag: None,
        };

        let stream = self
            .rpc
            .server_stream::<_, StartResponse>(RPC_START, &request, options.user.as_deref())
            .await
            .map_err(Error::from)?;

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
                    on_stdout: None,
                    on_stderr: None,
                    on_pty: options.on_stdout.clone(),
                },
                Some(options.timeout.unwrap_or(DEFAULT_COMMAND_TIMEOUT)),
                true,
                early_stdout,
                early_stderr,
            )),
        }
    }

    /// Attaches to a running PTY by pid.
    pub async fn connect(&self, pid: u32, options: PtyConnectOptions) -> Result<CommandHandle> {
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
        if start.is_none() {
            return Err(Error::transport(
                "failed to connect to pty: no start event received",
            ));
        }

        Ok(CommandHandle::spawn(
            self.rpc.clone(),
            pid,
            stream,
            Callbacks {
                on_stdout: None,
                on_stderr: None,
                on_pty: options.on_stdout.clone(),
            },
            Some(options.timeout.unwrap_or(DEFAULT_COMMAND_TIMEOUT)),
            true,
            Vec::new(),
            Vec::new(),
        ))
    }

    /// Kills a PTY with SIGKILL. Returns `Ok(false)` when it was not found.
    pub async fn kill(&self, pid: u32, options: RequestOptions) -> Result<bool> {
        self.shared.ensure_open()?;
        send_sigkill(
            &self.rpc,
            pid,
            self.request_timeout(options.request_timeout),
        )
        .await
    }

    /// Sends raw bytes to the PTY input.
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
                stdin: None,
                pty: Some(encode_bytes(data.as_ref())),
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

    /// Resizes the terminal, e.g. after the local window changed.
    pub async fn resize(&self, pid: u32, size: PtySize, options: RequestOptions) -> Result<()> {
        self.shared.ensure_open()?;
        let request = UpdateRequest {
            process: ProcessSelector { pid },
            pty: Some(PtyMessage {
                size: PtySizeMessage {
                    cols: size.cols,
                    rows: size.rows,
                },
            }),
        };
        self.rpc
            .unary::<_, Empty>(
                RPC_UPDATE,
                &request,
                None,
                self.request_timeout(options.request_timeout),
            )
            .await
            .map_err(Error::from)?;
        Ok(())
    }
}
