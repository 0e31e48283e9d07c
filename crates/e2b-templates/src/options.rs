use std::sync::Arc;
use std::time::Duration;

use e2b_core::{Error, Result};
use url::Url;

use crate::types::BuildLogEntry;

const DEFAULT_DOMAIN: &str = "e2b.app";
const DEBUG_API_URL: &str = "http://localhost:3000";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Default machine shape of a template build.
pub const DEFAULT_TEMPLATE_CPU: u32 = 2;
pub const DEFAULT_TEMPLATE_MEMORY_MB: u64 = 1024;

/// Default interval between build status polls.
pub const DEFAULT_BUILD_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Connection options for the template API.
///
/// Unset fields fall back to `E2B_API_KEY`, `E2B_ACCESS_TOKEN`,
/// `E2B_DOMAIN`, `E2B_API_URL`, and `E2B_DEBUG`.
#[derive(Clone, Default)]
pub struct TemplateOptions {
    pub(crate) api_key: Option<String>,
    pub(crate) access_token: Option<String>,
    pub(crate) domain: Option<String>,
    pub(crate) api_url: Option<String>,
    pub(crate) http_client: Option<reqwest::Client>,
    pub(crate) request_timeout: Option<Duration>,
    pub(crate) debug: Option<bool>,
}

impl TemplateOptions {
    pub fn new() -> Self {
        TemplateOptions::default()
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = Some(url.into());
        self
    }

    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = Some(debug);
        self
    }

    pub(crate) fn resolve(self) -> Result<ResolvedTemplateConfig> {
        let api_key = self
            .api_key
            .filter(|key| !key.is_empty())
            .or_else(|| non_empty_env("E2B_API_KEY"));
        let access_token = self
            .access_token
            .filter(|token| !token.is_empty())
            .or_else(|| non_empty_env("E2B_ACCESS_TOKEN"));
        let domain = self
            .domain
            .filter(|domain| domain != DEFAULT_DOMAIN)
            .or_else(|| non_empty_env("E2B_DOMAIN"))
            .unwrap_or_else(|| DEFAULT_DOMAIN.to_string());
        let debug = self
            .debug
            .unwrap_or_else(|| std::env::var("E2B_DEBUG").as_deref() == Ok("true"));
        let api_url = self
            .api_url
            .or_else(|| non_empty_env("E2B_API_URL"))
            .unwrap_or_else(|| {
                if debug {
                    DEBUG_API_URL.to_string()
                } else {
                    format!("https://api.{domain}")
                }
            });
        let api_url = Url::parse(&api_url)
            .map_err(|err| Error::invalid_argument(format!("invalid API URL: {err}")))?;

        let http = match self.http_client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .build()
                .map_err(|err| Error::transport(format!("failed to build http client: {err}")))?,
        };

        Ok(ResolvedTemplateConfig {
            api_key,
            access_token,
            api_url,
            http,
            request_timeout: self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
        })
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

pub(crate) struct ResolvedTemplateConfig {
    pub api_key: Option<String>,
    pub access_token: Option<String>,
    pub api_url: Url,
    pub http: reqwest::Client,
    pub request_timeout: Duration,
}

/// Callback invoked with each new build log entry during a build wait.
pub type BuildLogHandler = Arc<dyn Fn(BuildLogEntry) + Send + Sync>;

/// Options for running a template build.
#[derive(Clone)]
pub struct BuildOptions {
    pub(crate) cpu_count: u32,
    pub(crate) memory_mb: u64,
    pub(crate) team_id: Option<String>,
    pub(crate) poll_interval: Duration,
    pub(crate) on_logs: Option<BuildLogHandler>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            cpu_count: DEFAULT_TEMPLATE_CPU,
            memory_mb: DEFAULT_TEMPLATE_MEMORY_MB,
            team_id: None,
            poll_interval: DEFAULT_BUILD_POLL_INTERVAL,
            on_logs: None,
        }
    }
}

impl BuildOptions {
    pub fn new() -> Self {
        BuildOptions::default()
    }

    /// CPU cores of the build sandbox. Defaults to 2.
    pub fn with_cpu_count(mut self, cpu_count: u32) -> Self {
        self.cpu_count = cpu_count;
        self
    }

    /// Memory of the build sandbox in MiB. Defaults to 1024.
    pub fn with_memory_mb(mut self, memory_mb: u64) -> Self {
        self.memory_mb = memory_mb;
        self
    }

    pub fn with_team_id(mut self, team_id: impl Into<String>) -> Self {
        self.team_id = Some(team_id.into());
        self
    }

    /// Status poll interval. Defaults to 200 ms.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn on_logs(mut self, handler: impl Fn(BuildLogEntry) + Send + Sync + 'static) -> Self {
        self.on_logs = Some(Arc::new(handler));
        self
    }
}

/// Options for a RUN step.
#[derive(Debug, Clone, Default)]
pub struct StepOptions {
    pub(crate) user: Option<String>,
    pub(crate) force: bool,
}

impl StepOptions {
    pub fn new() -> Self {
        StepOptions::default()
    }

    /// User the step runs as.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Rebuild this layer regardless of cache.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// Options for a COPY step.
#[derive(Debug, Clone, Default)]
pub struct CopyOptions {
    pub(crate) user: Option<String>,
    pub(crate) mode: Option<u32>,
    pub(crate) force_upload: bool,
}

impl CopyOptions {
    pub fn new() -> Self {
        CopyOptions::default()
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// File mode of the copied files, e.g. `0o755`.
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Re-upload even when the layer files are cached.
    pub fn with_force_upload(mut self, force: bool) -> Self {
        self.force_upload = force;
        self
    }
}
