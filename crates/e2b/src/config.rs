use std::collections::HashMap;
use std::time::Duration;

use e2b_core::{Error, Result};
use serde_json::Map;
use url::Url;

use crate::consts;

/// Outbound network policy for a sandbox.
#[derive(Debug, Clone, Default)]
pub struct NetworkOptions {
    pub allow_out: Vec<String>,
    pub deny_out: Vec<String>,
    pub allow_public_traffic: bool,
    pub mask_request_host: Option<String>,
}

/// Options for creating or connecting to a sandbox.
///
/// Unset fields fall back to the `E2B_API_KEY`, `E2B_ACCESS_TOKEN`,
/// `E2B_DOMAIN`, `E2B_API_URL`, `E2B_SANDBOX_URL`, and `E2B_DEBUG`
/// environment variables, then to the SDK defaults.
#[derive(Clone, Default)]
pub struct SandboxOptions {
    pub(crate) api_key: Option<String>,
    pub(crate) access_token: Option<String>,
    pub(crate) domain: Option<String>,
    pub(crate) api_url: Option<String>,
    pub(crate) sandbox_url: Option<String>,
    pub(crate) template: Option<String>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) request_timeout: Option<Duration>,
    pub(crate) http_client: Option<reqwest::Client>,
    pub(crate) debug: Option<bool>,
    pub(crate) secure: Option<bool>,
    pub(crate) allow_internet_access: Option<bool>,
    pub(crate) auto_pause: bool,
    pub(crate) metadata: HashMap<String, String>,
    pub(crate) env_vars: HashMap<String, String>,
    pub(crate) network: Option<NetworkOptions>,
    pub(crate) mcp: Option<Map<String, serde_json::Value>>,
}

impl SandboxOptions {
    pub fn new() -> Self {
        SandboxOptions::default()
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

    pub fn with_sandbox_url(mut self, url: impl Into<String>) -> Self {
        self.sandbox_url = Some(url.into());
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    /// Sandbox lifetime. Defaults to 5 minutes.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Deadline for unary requests. Defaults to 60 seconds.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Debug mode targets a locally running stack over plain HTTP and skips
    /// the control plane.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = Some(debug);
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = Some(secure);
        self
    }

    pub fn with_allow_internet_access(mut self, allow: bool) -> Self {
        self.allow_internet_access = Some(allow);
        self
    }

    /// Pause the sandbox on timeout instead of killing it.
    pub fn with_auto_pause(mut self, auto_pause: bool) -> Self {
        self.auto_pause = auto_pause;
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_env_vars(mut self, env_vars: HashMap<String, String>) -> Self {
        self.env_vars = env_vars;
        self
    }

    pub fn with_network(mut self, network: NetworkOptions) -> Self {
        self.network = Some(network);
        self
    }

    pub fn with_mcp(mut self, mcp: Map<String, serde_json::Value>) -> Self {
        self.mcp = Some(mcp);
        self
    }

    pub(crate) fn resolve(self) -> Result<ResolvedConfig> {
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
            .filter(|d| d != consts::DEFAULT_DOMAIN)
            .or_else(|| non_empty_env("E2B_DOMAIN"))
            .unwrap_or_else(|| consts::DEFAULT_DOMAIN.to_string());
        let debug = self
            .debug
            .unwrap_or_else(|| std::env::var("E2B_DEBUG").as_deref() == Ok("true"));

        let api_url = self
            .api_url
            .or_else(|| non_empty_env("E2B_API_URL"))
            .unwrap_or_else(|| {
                if debug {
                    consts::DEBUG_API_URL.to_string()
                } else {
                    format!("https://api.{domain}")
                }
            });
        let api_url = Url::parse(&api_url)
            .map_err(|err| Error::invalid_argument(format!("invalid API URL: {err}")))?;

        let sandbox_url = self
            .sandbox_url
            .or_else(|| non_empty_env("E2B_SANDBOX_URL"))
            .map(|raw| {
                Url::parse(&raw)
                    .map_err(|err| Error::invalid_argument(format!("invalid sandbox URL: {err}")))
            })
            .transpose()?;

        let request_timeout = self
            .request_timeout
            .unwrap_or(consts::DEFAULT_REQUEST_TIMEOUT);

        Ok(ResolvedConfig {
            api_key,
            access_token,
            domain,
            api_url,
            sandbox_url,
            template: self
                .template
                .unwrap_or_else(|| consts::DEFAULT_TEMPLATE.to_string()),
            timeout: self.timeout.unwrap_or(consts::DEFAULT_SANDBOX_TIMEOUT),
            request_timeout,
            http_client: self.http_client,
            debug,
            secure: self.secure.unwrap_or(true),
            allow_internet_access: self.allow_internet_access.unwrap_or(true),
            auto_pause: self.auto_pause,
            metadata: self.metadata,
            env_vars: self.env_vars,
            network: self.network,
            mcp: self.mcp,
        })
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Configuration snapshot after option and environment resolution.
#[derive(Clone)]
pub(crate) struct ResolvedConfig {
    pub api_key: Option<String>,
    pub access_token: Option<String>,
    pub domain: String,
    pub api_url: Url,
    pub sandbox_url: Option<Url>,
    pub template: String,
    pub timeout: Duration,
    pub request_timeout: Duration,
    pub http_client: Option<reqwest::Client>,
    pub debug: bool,
    pub secure: bool,
    pub allow_internet_access: bool,
    pub auto_pause: bool,
    pub metadata: HashMap<String, String>,
    pub env_vars: HashMap<String, String>,
    pub network: Option<NetworkOptions>,
    pub mcp: Option<Map<String, serde_json::Value>>,
}

impl ResolvedConfig {
    /// Client for control-plane and file HTTP calls, honoring a
    /// caller-supplied client.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        if let Some(client) = &self.http_client {
            return Ok(client.clone());
        }
        reqwest::Client::builder()
            .build()
            .map_err(|err| Error::transport(format!("failed to build http client: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve() {
        let cfg = SandboxOptions::new()
            .with_api_key("k")
            .resolve()
            .unwrap();
        assert_eq!(cfg.template, consts::DEFAULT_TEMPLATE);
        assert_eq!(cfg.timeout, consts::DEFAULT_SANDBOX_TIMEOUT);
        assert_eq!(cfg.request_timeout, consts::DEFAULT_REQUEST_TIMEOUT);
        assert!(cfg.secure);
        assert!(cfg.allow_internet_access);
        assert!(!cfg.auto_pause);
        assert_eq!(cfg.api_url.as_str(), "https://api.e2b.app/");
    }

    #[test]
    fn debug_mode_targets_localhost() {
        let cfg = SandboxOptions::new()
            .with_debug(true)
            .resolve()
            .unwrap();
        assert!(cfg.debug);
        assert_eq!(cfg.api_url.as_str(), "http://localhost:3000/");
    }

    #[test]
    fn explicit_api_url_wins() {
        let cfg = SandboxOptions::new()
            .with_api_key("k")
            .with_api_url("https://api.internal.test")
            .resolve()
            .unwrap();
        assert_eq!(cfg.api_url.host_str(), Some("api.internal.test"));
    }
}
