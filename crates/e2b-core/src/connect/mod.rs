//! Connect-protocol RPC client for the in-sandbox envd services.
//!
//! envd exposes its Process and Filesystem services over the Connect
//! protocol with the gRPC-Web envelope. Unary calls are plain JSON POSTs to
//! `/<package>.<Service>/<Method>`; server streams deliver enveloped JSON
//! frames terminated by an end-of-stream frame that may carry an error.

mod codes;
mod stream;

pub use codes::{Code, ConnectError, RpcError};
pub(crate) use codes::WireError;
pub use stream::EventStream;

use std::cmp::Ordering;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::consts;
use crate::errors::Error;
use crate::version::{compare_versions, ENVD_VERSION_DEFAULT_USER};
use stream::{envelope, map_reqwest_error};

const CONNECT_PROTOCOL_HEADER: &str = "Connect-Protocol-Version";
const CONTENT_TYPE_JSON: &str = "application/json";
const CONTENT_TYPE_CONNECT_JSON: &str = "application/connect+json";

/// Transport bundle shared by the Commands, Files, and Pty facades.
///
/// Packages the HTTP client, the envd base URL, both access tokens, and the
/// envd version the header rules and feature gates are keyed on.
#[derive(Clone, Debug)]
pub struct RpcTransport {
    http: reqwest::Client,
    base_url: Url,
    access_token: Option<String>,
    traffic_token: Option<String>,
    envd_version: String,
}

impl RpcTransport {
    pub fn new(
        http: reqwest::Client,
        base_url: Url,
        access_token: Option<String>,
        traffic_token: Option<String>,
        envd_version: impl Into<String>,
    ) -> Self {
        RpcTransport {
            http,
            base_url,
            access_token,
            traffic_token,
            envd_version: envd_version.into(),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn envd_version(&self) -> &str {
        &self.envd_version
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn traffic_token(&self) -> Option<&str> {
        self.traffic_token.as_deref()
    }

    /// Compares the envd version against a feature threshold.
    pub fn compare_version(&self, target: &str) -> Ordering {
        compare_versions(&self.envd_version, target)
    }

    /// Header set for unary calls: user agent, access tokens, and Basic auth
    /// when a user is given or the envd predates the default user.
    pub fn unary_headers(&self, user: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(consts::USER_AGENT));
        if let Some(token) = self.access_token.as_deref() {
            if let Ok(value) = HeaderValue::from_str(token) {
                headers.insert(consts::HEADER_ACCESS_TOKEN, value);
            }
        }
        if let Some(token) = self.traffic_token.as_deref() {
            if let Ok(value) = HeaderValue::from_str(token) {
                headers.insert(consts::HEADER_TRAFFIC_TOKEN, value);
            }
        }

        // envd < 0.4.0 has no default user, so one has to be supplied.
        let effective_user = match user {
            Some(user) if !user.is_empty() => Some(user.to_string()),
            _ if self.compare_version(ENVD_VERSION_DEFAULT_USER) == Ordering::Less => {
                Some("user".to_string())
            }
            _ => None,
        };
        if let Some(user) = effective_user {
            let encoded = B64.encode(format!("{user}:"));
            if let Ok(value) = HeaderValue::from_str(&format!("Basic {encoded}")) {
                headers.insert(AUTHORIZATION, value);
            }
        }

        headers
    }

    /// Header set for streaming calls: the unary set plus the keepalive ping
    /// interval.
    pub fn streaming_headers(&self, user: Option<&str>) -> HeaderMap {
        let mut headers = self.unary_headers(user);
        headers.insert(
            consts::KEEPALIVE_PING_HEADER,
            HeaderValue::from(consts::KEEPALIVE_PING_INTERVAL_SEC),
        );
        headers
    }

    /// Performs a unary RPC, e.g. `unary("process.Process/SendSignal", …)`.
    pub async fn unary<Req, Resp>(
        &self,
        rpc: &str,
        message: &Req,
        user: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<Resp, RpcError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let url = self.rpc_url(rpc)?;
        let mut request = self
            .http
            .post(url)
            .headers(self.unary_headers(user))
            .header(CONTENT_TYPE, CONTENT_TYPE_JSON)
            .header(CONNECT_PROTOCOL_HEADER, "1")
            .json(message);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|err| RpcError::Transport(map_reqwest_error(err)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(decode_error(status.as_u16(), &body));
        }

        response.json::<Resp>().await.map_err(|err| {
            RpcError::Transport(Error::transport(format!("rpc response decode: {err}")))
        })
    }

    /// Opens a server-streaming RPC and returns the event reader.
    ///
    /// The stream stays open until the server ends it or the reader is
    /// dropped; per-call deadlines are the caller's concern.
    pub async fn server_stream<Req, Resp>(
        &self,
        rpc: &str,
        message: &Req,
        user: Option<&str>,
    ) -> Result<EventStream<Resp>, RpcError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let url = self.rpc_url(rpc)?;
        let payload = serde_json::to_vec(message).map_err(|err| {
            RpcError::Transport(Error::transport(format!("rpc request encode: {err}")))
        })?;

        tracing::debug!(target = "e2b::rpc", rpc, "opening server stream");

        let response = self
            .http
            .post(url)
            .headers(self.streaming_headers(user))
            .header(CONTENT_TYPE, CONTENT_TYPE_CONNECT_JSON)
            .header(CONNECT_PROTOCOL_HEADER, "1")
            .body(envelope(&payload))
            .send()
            .await
            .map_err(|err| RpcError::Transport(map_reqwest_error(err)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(decode_error(status.as_u16(), &body));
        }

        Ok(EventStream::new(response))
    }

    fn rpc_url(&self, rpc: &str) -> Result<Url, RpcError> {
        self.base_url.join(&format!("/{rpc}")).map_err(|err| {
            RpcError::Transport(Error::transport(format!("invalid rpc url: {err}")))
        })
    }
}

/// Decodes a non-2xx response into either a server-reported Connect error or
/// a transport error carrying status and body.
fn decode_error(status: u16, body: &str) -> RpcError {
    if let Ok(wire) = serde_json::from_str::<WireError>(body) {
        if !wire.code.is_empty() {
            return RpcError::Connect(wire.into());
        }
    }
    RpcError::Transport(Error::api(status, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(envd_version: &str, access: Option<&str>) -> RpcTransport {
        RpcTransport::new(
            reqwest::Client::new(),
            Url::parse("https://49983-sbx.e2b.app").unwrap(),
            access.map(str::to_string),
            None,
            envd_version,
        )
    }

    #[test]
    fn unary_headers_modern_envd_without_user() {
        let headers = transport("0.4.0", Some("tok")).unary_headers(None);
        assert_eq!(headers.get("X-Access-Token").unwrap(), "tok");
        assert!(headers.get(AUTHORIZATION).is_none());
        assert!(headers
            .get(USER_AGENT)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("e2b-rust-sdk/"));
    }

    #[test]
    fn unary_headers_old_envd_defaults_basic_user() {
        let headers = transport("0.3.0", None).unary_headers(None);
        let auth = headers.get(AUTHORIZATION).unwrap().to_str().unwrap();
        assert_eq!(auth, format!("Basic {}", B64.encode("user:")));
    }

    #[test]
    fn unary_headers_explicit_user_wins() {
        let headers = transport("99.99.99", None).unary_headers(Some("root"));
        let auth = headers.get(AUTHORIZATION).unwrap().to_str().unwrap();
        assert_eq!(auth, format!("Basic {}", B64.encode("root:")));
    }

    #[test]
    fn streaming_headers_add_keepalive() {
        let headers = transport("0.4.0", None).streaming_headers(None);
        assert_eq!(headers.get("Keepalive-Ping-Interval").unwrap(), "50");
    }

    #[test]
    fn decode_error_prefers_connect_code() {
        let err = decode_error(404, r#"{"code":"not_found","message":"no pid"}"#);
        assert_eq!(err.code(), Some(Code::NotFound));

        let err = decode_error(500, "plain text");
        assert!(matches!(err, RpcError::Transport(Error::Api { status: 500, .. })));
    }
}
