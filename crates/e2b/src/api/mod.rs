//! Control-plane REST client.

pub(crate) mod list;
pub(crate) mod models;

use std::time::Duration;

use chrono::{DateTime, Utc};
use e2b_core::consts::USER_AGENT as SDK_USER_AGENT;
use e2b_core::{Error, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use models::{
    ConnectSandboxRequest, CreateSandboxRequest, CreateSandboxResponse, SandboxInfo,
    SandboxMetrics, SetTimeoutRequest,
};

/// Authenticated client for `https://api.<domain>`.
#[derive(Clone, Debug)]
pub(crate) struct ApiClient {
    http: reqwest::Client,
    api_url: Url,
    api_key: Option<String>,
    access_token: Option<String>,
    request_timeout: Duration,
}

impl ApiClient {
    pub fn new(
        http: reqwest::Client,
        api_url: Url,
        api_key: Option<String>,
        access_token: Option<String>,
        request_timeout: Duration,
    ) -> Self {
        ApiClient {
            http,
            api_url,
            api_key,
            access_token,
            request_timeout,
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn require_api_key(&self) -> Result<()> {
        if self.api_key.is_none() {
            return Err(Error::invalid_argument(
                "API key is required (use with_api_key or set E2B_API_KEY)",
            ));
        }
        Ok(())
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static(SDK_USER_AGENT));
        if let Some(key) = self.api_key.as_deref() {
            if let Ok(value) = HeaderValue::from_str(key) {
                headers.insert("x-api-key", value);
            }
        }
        if let Some(token) = self.access_token.as_deref() {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
                headers.insert(AUTHORIZATION, value);
            }
        }
        headers
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.api_url
            .join(path)
            .map_err(|err| Error::invalid_argument(format!("invalid API path: {err}")))
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&(impl Serialize + ?Sized)>,
    ) -> Result<reqwest::Response> {
        let mut request = self
            .http
            .request(method, url)
            .headers(self.headers())
            .timeout(self.request_timeout);
        if let Some(body) = body {
            request = request.json(body);
        }
        request.send().await.map_err(|err| {
            if err.is_timeout() {
                Error::RequestTimeout
            } else {
                Error::transport(format!("request failed: {err}"))
            }
        })
    }

    async fn read_body(response: reqwest::Response) -> (StatusCode, String) {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        (status, body)
    }

    fn decode<T: DeserializeOwned>(body: &str) -> Result<T> {
        serde_json::from_str(body)
            .map_err(|err| Error::transport(format!("failed to parse response: {err}")))
    }

    pub async fn create_sandbox(
        &self,
        request: &CreateSandboxRequest,
    ) -> Result<CreateSandboxResponse> {
        let url = self.url("/sandboxes")?;
        let response = self.send(Method::POST, url, Some(request)).await?;
        let (status, body) = Self::read_body(response).await;
        match status.as_u16() {
            200 | 201 => Self::decode(&body),
            code => Err(Error::api(code, body)),
        }
    }

    pub async fn connect_sandbox(
        &self,
        sandbox_id: &str,
        timeout: Duration,
    ) -> Result<CreateSandboxResponse> {
        let url = self.url(&format!("/sandboxes/{sandbox_id}/connect"))?;
        let request = ConnectSandboxRequest {
            timeout: timeout.as_secs(),
        };
        let response = self.send(Method::POST, url, Some(&request)).await?;
        let (status, body) = Self::read_body(response).await;
        match status.as_u16() {
            200 | 201 => Self::decode(&body),
            404 => Err(Error::not_found(format!("sandbox {sandbox_id} not found"))),
            code => Err(Error::api(code, body)),
        }
    }

    /// Terminates a sandbox. 204 is success and 404 means it is already gone.
    pub async fn kill_sandbox(&self, sandbox_id: &str) -> Result<()> {
        let url = self.url(&format!("/sandboxes/{sandbox_id}"))?;
        let response = self.send(Method::DELETE, url, None::<&()>).await?;
        let (status, body) = Self::read_body(response).await;
        match status.as_u16() {
            204 | 404 => Ok(()),
            code => Err(Error::api(code, body)),
        }
    }

    /// Pauses a sandbox. A 409 means it is already paused and counts as
    /// success.
    pub async fn pause_sandbox(&self, sandbox_id: &str) -> Result<()> {
        let url = self.url(&format!("/sandboxes/{sandbox_id}/pause"))?;
        let response = self.send(Method::POST, url, None::<&()>).await?;
        let (status, body) = Self::read_body(response).await;
        match status.as_u16() {
            200 | 204 | 409 => Ok(()),
            404 => Err(Error::not_found(format!("sandbox {sandbox_id} not found"))),
            code => Err(Error::api(code, body)),
        }
    }

    pub async fn set_sandbox_timeout(&self, sandbox_id: &str, timeout: Duration) -> Result<()> {
        let url = self.url(&format!("/sandboxes/{sandbox_id}/timeout"))?;
        let request = SetTimeoutRequest {
            timeout: timeout.as_secs(),
        };
        let response = self.send(Method::POST, url, Some(&request)).await?;
        let (status, body) = Self::read_body(response).await;
        match status.as_u16() {
            200 | 204 => Ok(()),
            404 => Err(Error::not_found(format!("sandbox {sandbox_id} not found"))),
            code => Err(Error::api(code, body)),
        }
    }

    pub async fn get_sandbox_info(&self, sandbox_id: &str) -> Result<SandboxInfo> {
        let url = self.url(&format!("/sandboxes/{sandbox_id}"))?;
        let response = self.send(Method::GET, url, None::<&()>).await?;
        let (status, body) = Self::read_body(response).await;
        match status.as_u16() {
            200 => Self::decode(&body),
            404 => Err(Error::not_found(format!("sandbox {sandbox_id} not found"))),
            code => Err(Error::api(code, body)),
        }
    }

    pub async fn get_sandbox_metrics(
        &self,
        sandbox_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<SandboxMetrics>> {
        let mut url = self.url(&format!("/sandboxes/{sandbox_id}/metrics"))?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(start) = start {
                query.append_pair("start", &start.timestamp().to_string());
            }
            if let Some(end) = end {
                query.append_pair("end", &end.timestamp().to_string());
            }
        }
        let response = self.send(Method::GET, url, None::<&()>).await?;
        let (status, body) = Self::read_body(response).await;
        match status.as_u16() {
            200 => Self::decode(&body),
            404 => Err(Error::not_found(format!("sandbox {sandbox_id} not found"))),
            code => Err(Error::api(code, body)),
        }
    }

    /// One page of `GET /v2/sandboxes`. The next-page token travels in the
    /// `X-Next-Token` response header.
    pub async fn list_sandboxes_page(
        &self,
        query: &list::SandboxQuery,
        limit: u32,
        next_token: Option<&str>,
    ) -> Result<(Vec<SandboxInfo>, Option<String>)> {
        let mut url = self.url("/v2/sandboxes")?;
        {
            let mut pairs = url.query_pairs_mut();
            if limit > 0 {
                pairs.append_pair("limit", &limit.to_string());
            }
            if let Some(token) = next_token {
                pairs.append_pair("next_token", token);
            }
            for (key, value) in &query.metadata {
                pairs.append_pair("metadata", &format!("{key}={value}"));
            }
            if !query.state.is_empty() {
                let states: Vec<&str> = query.state.iter().map(|s| s.as_str()).collect();
                pairs.append_pair("state", &states.join(","));
            }
        }

        let response = self.send(Method::GET, url, None::<&()>).await?;
        let token = response
            .headers()
            .get("X-Next-Token")
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        let (status, body) = Self::read_body(response).await;
        if status.as_u16() != 200 {
            return Err(Error::api(status.as_u16(), body));
        }
        Ok((Self::decode(&body)?, token))
    }
}
