//! The sandbox handle: lifecycle, sub-facades, URLs, and the
//! code-interpreter entry points.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use e2b_core::consts::{HEADER_ACCESS_TOKEN, USER_AGENT as SDK_USER_AGENT};
use e2b_core::version::ENVD_VERSION_DEFAULT_USER;
use e2b_core::{compare_versions, Error, Result, RpcTransport};
use parking_lot::RwLock;
use reqwest::header::USER_AGENT;
use url::Url;

use crate::api::models::{
    CreateSandboxRequest, CreateSandboxResponse, NetworkRequest, SandboxInfo, SandboxMetrics,
};
use crate::api::ApiClient;
use crate::commands::Commands;
use crate::config::{ResolvedConfig, SandboxOptions};
use crate::consts;
use crate::filesystem::{Files, FsOptions};
use crate::interpreter::{
    Context, ContextOptions, Execution, InterpreterClient, RunCodeOptions,
};
use crate::pty::Pty;
use crate::signature::get_signature;

const MCP_TOKEN_PATH: &str = "/etc/mcp-gateway/.token";

/// State shared between the sandbox and its sub-facades, guarded by a
/// read-write lock. Every facade entry point takes the read side to check
/// `closed`.
#[derive(Clone, Debug)]
pub(crate) struct SharedState(Arc<RwLock<SharedInner>>);

#[derive(Debug)]
struct SharedInner {
    closed: bool,
    timeout: Duration,
}

impl SharedState {
    pub(crate) fn new(timeout: Duration) -> Self {
        SharedState(Arc::new(RwLock::new(SharedInner {
            closed: false,
            timeout,
        })))
    }

    pub fn ensure_open(&self) -> Result<()> {
        if self.0.read().closed {
            Err(Error::SandboxClosed)
        } else {
            Ok(())
        }
    }

    pub fn is_closed(&self) -> bool {
        self.0.read().closed
    }

    /// Marks the sandbox closed; returns whether this call was the first.
    fn close(&self) -> bool {
        let mut inner = self.0.write();
        if inner.closed {
            false
        } else {
            inner.closed = true;
            true
        }
    }

    fn timeout(&self) -> Duration {
        self.0.read().timeout
    }

    fn set_timeout(&self, timeout: Duration) {
        self.0.write().timeout = timeout;
    }
}

/// Options for signed upload/download URLs.
#[derive(Debug, Clone, Default)]
pub struct UrlOptions {
    pub(crate) user: Option<String>,
    pub(crate) signature_expiration_secs: Option<i64>,
}

impl UrlOptions {
    pub fn new() -> Self {
        UrlOptions::default()
    }

    /// User for path resolution on the server.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Signature lifetime in seconds; unset or zero means no expiry.
    pub fn with_signature_expiration(mut self, seconds: i64) -> Self {
        self.signature_expiration_secs = Some(seconds);
        self
    }
}

/// Options for metrics queries.
#[derive(Debug, Clone, Default)]
pub struct MetricsOptions {
    pub(crate) start: Option<DateTime<Utc>>,
    pub(crate) end: Option<DateTime<Utc>>,
}

impl MetricsOptions {
    pub fn new() -> Self {
        MetricsOptions::default()
    }

    pub fn with_start(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    pub fn with_end(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }
}

/// A cloud sandbox: a short-lived Linux VM with an envd agent and a
/// stateful code interpreter.
///
/// Created by [`Sandbox::create`] or [`Sandbox::connect`]; released by
/// [`Sandbox::close`]. Once closed, every operation fails with
/// [`Error::SandboxClosed`].
#[derive(Debug)]
pub struct Sandbox {
    id: String,
    domain: String,
    debug: bool,
    envd_version: String,
    access_token: Option<String>,
    traffic_access_token: Option<String>,
    request_timeout: Duration,
    http: reqwest::Client,
    api: ApiClient,
    interpreter: InterpreterClient,
    files: Files,
    commands: Commands,
    pty: Pty,
    shared: SharedState,
}

impl Sandbox {
    /// Creates a new sandbox on the control plane.
    ///
    /// In debug mode no control-plane call is made and a synthetic handle
    /// against `localhost` is returned.
    pub async fn create(options: SandboxOptions) -> Result<Sandbox> {
        let config = options.resolve()?;

        if config.debug {
            return Self::build(
                &config,
                consts::DEBUG_SANDBOX_ID.to_string(),
                config.domain.clone(),
                consts::ENVD_DEBUG_FALLBACK_VERSION.to_string(),
                None,
                None,
            );
        }

        let api = Self::api_client(&config)?;
        api.require_api_key()?;

        let request = CreateSandboxRequest {
            template_id: config.template.clone(),
            timeout: config.timeout.as_secs(),
            metadata: config.metadata.clone(),
            env_vars: config.env_vars.clone(),
            secure: config.secure,
            allow_internet_access: config.allow_internet_access,
            auto_pause: config.auto_pause,
            network: config.network.as_ref().map(|network| NetworkRequest {
                allow_out: network.allow_out.clone(),
                deny_out: network.deny_out.clone(),
                allow_public_traffic: network.allow_public_traffic,
                mask_request_host: network.mask_request_host.clone(),
            }),
            mcp: config.mcp.clone(),
        };

        let response = api.create_sandbox(&request).await?;
        Self::from_response(&config, response)
    }

    /// Connects to an existing sandbox, resuming it if paused.
    pub async fn connect(sandbox_id: impl Into<String>, options: SandboxOptions) -> Result<Sandbox> {
        let sandbox_id = sandbox_id.into();
        if sandbox_id.is_empty() {
            return Err(Error::invalid_argument("sandbox ID is required"));
        }

        let config = options.resolve()?;

        if config.debug {
            return Self::build(
                &config,
                sandbox_id,
                config.domain.clone(),
                consts::ENVD_DEBUG_FALLBACK_VERSION.to_string(),
                None,
                None,
            );
        }

        let api = Self::api_client(&config)?;
        api.require_api_key()?;

        let response = api.connect_sandbox(&sandbox_id, config.timeout).await?;
        let mut response = response;
        response.sandbox_id = sandbox_id;
        Self::from_response(&config, response)
    }

    fn from_response(config: &ResolvedConfig, response: CreateSandboxResponse) -> Result<Sandbox> {
        // The control plane may route the sandbox to another domain.
        let domain = response
            .domain
            .filter(|domain| !domain.is_empty())
            .unwrap_or_else(|| config.domain.clone());
        Self::build(
            config,
            response.sandbox_id,
            domain,
            response.envd_version,
            response.envd_access_token,
            response.traffic_access_token,
        )
    }

    fn api_client(config: &ResolvedConfig) -> Result<ApiClient> {
        Ok(ApiClient::new(
            config.http_client()?,
            config.api_url.clone(),
            config.api_key.clone(),
            config.access_token.clone(),
            config.request_timeout,
        ))
    }

    fn build(
        config: &ResolvedConfig,
        id: String,
        domain: String,
        envd_version: String,
        access_token: Option<String>,
        traffic_access_token: Option<String>,
    ) -> Result<Sandbox> {
        let http = config.http_client()?;
        let api = Self::api_client(config)?;
        let shared = SharedState::new(config.timeout);

        let scheme = if config.debug { "http" } else { "https" };
        let host = |port: u16| {
            if config.debug {
                format!("localhost:{port}")
            } else {
                format!("{port}-{id}.{domain}")
            }
        };

        let envd_url = match &config.sandbox_url {
            Some(url) => url.clone(),
            None => parse_url(&format!("{scheme}://{}", host(consts::ENVD_PORT)))?,
        };
        let jupyter_url = parse_url(&format!("{scheme}://{}", host(consts::JUPYTER_PORT)))?;

        let rpc = RpcTransport::new(
            http.clone(),
            envd_url,
            access_token.clone(),
            traffic_access_token.clone(),
            envd_version.clone(),
        );
        let interpreter = InterpreterClient::new(
            http.clone(),
            jupyter_url,
            access_token.clone(),
            traffic_access_token.clone(),
            config.request_timeout,
        );

        let files = Files::new(
            rpc.clone(),
            http.clone(),
            shared.clone(),
            config.request_timeout,
        );
        let commands = Commands::new(rpc.clone(), shared.clone(), config.request_timeout);
        let pty = Pty::new(rpc, shared.clone(), config.request_timeout);

        Ok(Sandbox {
            id,
            domain,
            debug: config.debug,
            envd_version,
            access_token,
            traffic_access_token,
            request_timeout: config.request_timeout,
            http,
            api,
            interpreter,
            files,
            commands,
            pty,
            shared,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn envd_version(&self) -> &str {
        &self.envd_version
    }

    pub fn traffic_access_token(&self) -> Option<&str> {
        self.traffic_access_token.as_deref()
    }

    /// Filesystem facade.
    pub fn files(&self) -> &Files {
        &self.files
    }

    /// Command execution facade.
    pub fn commands(&self) -> &Commands {
        &self.commands
    }

    /// Pseudo-terminal facade.
    pub fn pty(&self) -> &Pty {
        &self.pty
    }

    /// Host serving `port` of this sandbox: `{port}-{id}.{domain}`, or
    /// `localhost:{port}` in debug mode.
    pub fn get_host(&self, port: u16) -> String {
        if self.debug {
            format!("localhost:{port}")
        } else {
            format!("{port}-{}.{}", self.id, self.domain)
        }
    }

    fn compare_version(&self, target: &str) -> Ordering {
        compare_versions(&self.envd_version, target)
    }

    /// Evaluates code in the sandbox's stateful interpreter.
    ///
    /// Errors raised by the evaluated code populate `execution.error`; only
    /// transport problems and the execution deadline produce an `Err`.
    pub async fn run_code(
        &self,
        code: impl AsRef<str>,
        options: RunCodeOptions,
    ) -> Result<Execution> {
        self.shared.ensure_open()?;
        self.interpreter.run_code(code.as_ref(), &options).await
    }

    /// Creates an isolated execution context.
    pub async fn create_context(&self, options: ContextOptions) -> Result<Context> {
        self.shared.ensure_open()?;
        self.interpreter.create_context(&options).await
    }

    pub async fn list_contexts(&self) -> Result<Vec<Context>> {
        self.shared.ensure_open()?;
        self.interpreter.list_contexts().await
    }

    pub async fn remove_context(&self, context_id: impl AsRef<str>) -> Result<()> {
        self.shared.ensure_open()?;
        self.interpreter.remove_context(context_id.as_ref()).await
    }

    /// Restarts a context, clearing its state.
    pub async fn restart_context(&self, context_id: impl AsRef<str>) -> Result<()> {
        self.shared.ensure_open()?;
        self.interpreter.restart_context(context_id.as_ref()).await
    }

    /// Extends or reduces the sandbox lifetime.
    pub async fn set_timeout(&self, timeout: Duration) -> Result<()> {
        if !self.debug {
            self.api.set_sandbox_timeout(&self.id, timeout).await?;
        }
        self.shared.set_timeout(timeout);
        Ok(())
    }

    /// The configured sandbox lifetime.
    pub fn timeout(&self) -> Duration {
        self.shared.timeout()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Closes the handle and best-effort terminates the sandbox.
    /// Idempotent: the second call is a no-op.
    pub async fn close(&self) -> Result<()> {
        if !self.shared.close() {
            return Ok(());
        }
        if !self.debug && !self.id.is_empty() && self.api.has_api_key() {
            if let Err(err) = self.api.kill_sandbox(&self.id).await {
                tracing::warn!(target = "e2b::sandbox", %err, "best-effort kill failed");
            }
        }
        Ok(())
    }

    /// Probes the envd health endpoint. Connection failures and 502 mean
    /// the sandbox is not running.
    pub async fn is_running(&self) -> Result<bool> {
        if self.shared.is_closed() {
            return Ok(false);
        }

        let scheme = if self.debug { "http" } else { "https" };
        let url = parse_url(&format!(
            "{scheme}://{}/health",
            self.get_host(consts::ENVD_PORT)
        ))?;

        let mut request = self
            .http
            .get(url)
            .header(USER_AGENT, SDK_USER_AGENT)
            .timeout(self.request_timeout);
        if let Some(token) = self.access_token.as_deref() {
            request = request.header(HEADER_ACCESS_TOKEN, token);
        }

        let response = match request.send().await {
            Ok(response) => response,
            // A connection error most likely means the sandbox is gone.
            Err(_) => return Ok(false),
        };
        match response.status().as_u16() {
            200 => Ok(true),
            502 => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(Error::api(status, body))
            }
        }
    }

    /// Reads the MCP gateway token from inside the sandbox.
    pub async fn get_mcp_token(&self) -> Result<String> {
        self.shared.ensure_open()?;
        let content = self.files.read(MCP_TOKEN_PATH, FsOptions::new()).await?;
        let token = content.trim().to_string();
        if token.is_empty() {
            return Err(Error::transport("MCP token is empty"));
        }
        Ok(token)
    }

    /// Control-plane information about this sandbox.
    pub async fn get_info(&self) -> Result<SandboxInfo> {
        self.shared.ensure_open()?;
        self.api.get_sandbox_info(&self.id).await
    }

    /// Resource usage metrics, optionally bounded to a time range.
    pub async fn get_metrics(&self, options: MetricsOptions) -> Result<Vec<SandboxMetrics>> {
        self.shared.ensure_open()?;
        self.api
            .get_sandbox_metrics(&self.id, options.start, options.end)
            .await
    }

    /// Pauses this sandbox; resume it later with [`Sandbox::connect`].
    pub async fn pause(&self) -> Result<()> {
        self.shared.ensure_open()?;
        if self.debug {
            return Ok(());
        }
        self.api.pause_sandbox(&self.id).await
    }

    /// URL for uploading a file via a multipart POST.
    ///
    /// With an envd access token present the URL carries a `write`
    /// signature, optionally expiring.
    pub fn upload_url(&self, path: impl AsRef<str>, options: UrlOptions) -> Result<String> {
        self.signed_file_url(path.as_ref(), "write", &options)
    }

    /// URL for downloading a file.
    pub fn download_url(&self, path: impl AsRef<str>, options: UrlOptions) -> Result<String> {
        self.signed_file_url(path.as_ref(), "read", &options)
    }

    fn signed_file_url(&self, path: &str, operation: &str, options: &UrlOptions) -> Result<String> {
        // envd < 0.4.0 has no default user.
        let user = match options.user.as_deref() {
            Some(user) if !user.is_empty() => user.to_string(),
            _ if self.compare_version(ENVD_VERSION_DEFAULT_USER) == Ordering::Less => {
                "user".to_string()
            }
            _ => String::new(),
        };

        let scheme = if self.debug { "http" } else { "https" };
        let mut url = parse_url(&format!(
            "{scheme}://{}/files",
            self.get_host(consts::ENVD_PORT)
        ))?;

        {
            let mut query = url.query_pairs_mut();
            if !path.is_empty() {
                query.append_pair("path", path);
            }
            if let Some(token) = self.access_token.as_deref() {
                let (signature, expiration) = get_signature(
                    path,
                    operation,
                    &user,
                    token,
                    options.signature_expiration_secs,
                );
                query.append_pair("signature", &signature);
                if expiration > 0 {
                    query.append_pair("signature_expiration", &expiration.to_string());
                }
            }
            if !user.is_empty() {
                query.append_pair("username", &user);
            }
        }

        Ok(url.to_string())
    }

    /// Terminates a sandbox by ID without constructing a handle.
    pub async fn kill_by_id(sandbox_id: impl AsRef<str>, options: SandboxOptions) -> Result<()> {
        let config = options.resolve()?;
        if config.debug {
            return Ok(());
        }
        let api = Self::api_client(&config)?;
        api.require_api_key()?;
        api.kill_sandbox(sandbox_id.as_ref()).await
    }

    /// Pauses a sandbox by ID without constructing a handle.
    pub async fn pause_by_id(sandbox_id: impl AsRef<str>, options: SandboxOptions) -> Result<()> {
        let config = options.resolve()?;
        if config.debug {
            return Ok(());
        }
        let api = Self::api_client(&config)?;
        api.require_api_key()?;
        api.pause_sandbox(sandbox_id.as_ref()).await
    }

    /// Fetches sandbox information by ID.
    pub async fn info_by_id(
        sandbox_id: impl AsRef<str>,
        options: SandboxOptions,
    ) -> Result<SandboxInfo> {
        let config = options.resolve()?;
        let api = Self::api_client(&config)?;
        api.require_api_key()?;
        api.get_sandbox_info(sandbox_id.as_ref()).await
    }

    /// Fetches sandbox metrics by ID.
    pub async fn metrics_by_id(
        sandbox_id: impl AsRef<str>,
        metrics: MetricsOptions,
        options: SandboxOptions,
    ) -> Result<Vec<SandboxMetrics>> {
        let config = options.resolve()?;
        let api = Self::api_client(&config)?;
        api.require_api_key()?;
        api.get_sandbox_metrics(sandbox_id.as_ref(), metrics.start, metrics.end)
            .await
    }
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|err| Error::invalid_argument(format!("invalid URL: {err}")))
}
