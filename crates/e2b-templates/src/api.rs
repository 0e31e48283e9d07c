//! REST client for the template build service.

use std::time::Duration;

use e2b_core::consts::USER_AGENT as SDK_USER_AGENT;
use e2b_core::{Error, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::options::{BuildOptions, TemplateOptions};
use crate::types::{
    BuildInfo, BuildStatus, FileUploadInfo, RequestBuildBody, TemplateBuildInfo,
    TemplateBuildSpec, TemplateInfo, TemplateUpdate, TemplateWithBuilds,
};

/// Authenticated client for the `/templates` surface of the control plane.
#[derive(Clone, Debug)]
pub struct TemplatesClient {
    http: reqwest::Client,
    api_url: Url,
    api_key: Option<String>,
    access_token: Option<String>,
    request_timeout: Duration,
}

impl TemplatesClient {
    pub fn new(options: TemplateOptions) -> Result<Self> {
        let config = options.resolve()?;
        let client = TemplatesClient {
            http: config.http,
            api_url: config.api_url,
            api_key: config.api_key,
            access_token: config.access_token,
            request_timeout: config.request_timeout,
        };
        client.require_auth()?;
        Ok(client)
    }

    fn require_auth(&self) -> Result<()> {
        if self.api_key.is_none() && self.access_token.is_none() {
            return Err(Error::invalid_argument(
                "API key or access token is required",
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

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&(impl Serialize + ?Sized)>,
    ) -> Result<(u16, Vec<u8>)> {
        let url = self
            .api_url
            .join(path)
            .map_err(|err| Error::invalid_argument(format!("invalid API path: {err}")))?;
        let mut request = self
            .http
            .request(method, url)
            .headers(self.headers())
            .timeout(self.request_timeout);
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
            .map_err(|err| Error::transport(format!("failed to read response: {err}")))?;
        Ok((status, body.to_vec()))
    }

    fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
        serde_json::from_slice(body)
            .map_err(|err| Error::transport(format!("failed to parse response: {err}")))
    }

    /// Phase 1: reserves a template/build slot.
    pub async fn request_build(
        &self,
        alias: &str,
        options: &BuildOptions,
    ) -> Result<BuildInfo> {
        let body = RequestBuildBody {
            alias,
            cpu_count: options.cpu_count,
            memory_mb: options.memory_mb,
            team_id: options.team_id.as_deref(),
        };
        let (status, body) = self.send(Method::POST, "/v3/templates", Some(&body)).await?;
        match status {
            200 | 201 | 202 => Self::decode(&body),
            _ => Err(Error::api(status, String::from_utf8_lossy(&body))),
        }
    }

    /// Phase 2: submits the build specification.
    pub async fn trigger_build(
        &self,
        template_id: &str,
        build_id: &str,
        spec: &TemplateBuildSpec,
    ) -> Result<()> {
        let path = format!("/v2/templates/{template_id}/builds/{build_id}");
        let (status, body) = self.send(Method::POST, &path, Some(spec)).await?;
        match status {
            200 | 202 | 204 => Ok(()),
            _ => Err(Error::api(status, String::from_utf8_lossy(&body))),
        }
    }

    /// Fetches build status, with logs starting at `logs_offset`.
    pub async fn get_build_status(
        &self,
        template_id: &str,
        build_id: &str,
        logs_offset: usize,
    ) -> Result<TemplateBuildInfo> {
        let mut path = format!("/templates/{template_id}/builds/{build_id}/status");
        if logs_offset > 0 {
            path = format!("{path}?logsOffset={logs_offset}");
        }
        let (status, body) = self.send(Method::GET, &path, None::<&()>).await?;
        match status {
            200 => Self::decode(&body),
            _ => Err(Error::api(status, String::from_utf8_lossy(&body))),
        }
    }

    /// Phase 3: polls until the build reaches a terminal state, replaying
    /// each new log entry to the caller.
    pub async fn wait_for_build(
        &self,
        template_id: &str,
        build_id: &str,
        options: &BuildOptions,
    ) -> Result<()> {
        let mut logs_offset = 0usize;
        loop {
            let status = self
                .get_build_status(template_id, build_id, logs_offset)
                .await?;

            logs_offset += status.log_entries.len();
            if let Some(handler) = &options.on_logs {
                for entry in status.log_entries {
                    handler(entry);
                }
            }

            tracing::debug!(
                target = "e2b::templates",
                template_id,
                build_id,
                status = ?status.status,
                logs_offset,
                "build status poll"
            );

            match status.status {
                BuildStatus::Ready => return Ok(()),
                BuildStatus::Error => {
                    let message = status
                        .reason
                        .map(|reason| reason.message)
                        .unwrap_or_else(|| "build failed".to_string());
                    return Err(Error::transport(format!("template build failed: {message}")));
                }
                BuildStatus::Building | BuildStatus::Waiting => {}
            }

            tokio::time::sleep(options.poll_interval).await;
        }
    }

    /// Asks whether a COPY layer's files are cached, returning an upload
    /// URL when they are not.
    pub async fn get_file_upload_link(
        &self,
        template_id: &str,
        files_hash: &str,
    ) -> Result<FileUploadInfo> {
        let path = format!("/templates/{template_id}/files/{files_hash}");
        let (status, body) = self.send(Method::GET, &path, None::<&()>).await?;
        match status {
            200 | 201 => Self::decode(&body),
            _ => Err(Error::api(status, String::from_utf8_lossy(&body))),
        }
    }

    /// Checks whether an alias is taken. A 403 means it exists but belongs
    /// to someone else.
    pub async fn alias_exists(&self, alias: &str) -> Result<bool> {
        let path = format!("/templates/aliases/{alias}");
        let (status, body) = self.send(Method::GET, &path, None::<&()>).await?;
        match status {
            200 | 403 => Ok(true),
            404 => Ok(false),
            _ => Err(Error::api(status, String::from_utf8_lossy(&body))),
        }
    }

    pub async fn list_templates(&self) -> Result<Vec<TemplateInfo>> {
        let (status, body) = self.send(Method::GET, "/templates", None::<&()>).await?;
        match status {
            200 => Self::decode(&body),
            _ => Err(Error::api(status, String::from_utf8_lossy(&body))),
        }
    }

    pub async fn get_template(&self, template_id: &str) -> Result<TemplateWithBuilds> {
        let path = format!("/templates/{template_id}");
        let (status, body) = self.send(Method::GET, &path, None::<&()>).await?;
        match status {
            200 => Self::decode(&body),
            404 => Err(Error::not_found(format!(
                "template {template_id} not found"
            ))),
            _ => Err(Error::api(status, String::from_utf8_lossy(&body))),
        }
    }

    pub async fn delete_template(&self, template_id: &str) -> Result<()> {
        let path = format!("/templates/{template_id}");
        let (status, body) = self.send(Method::DELETE, &path, None::<&()>).await?;
        match status {
            200 | 204 => Ok(()),
            404 => Err(Error::not_found(format!(
                "template {template_id} not found"
            ))),
            _ => Err(Error::api(status, String::from_utf8_lossy(&body))),
        }
    }

    pub async fn update_template(&self, template_id: &str, update: &TemplateUpdate) -> Result<()> {
        let path = format!("/templates/{template_id}");
        let (status, body) = self.send(Method::PATCH, &path, Some(update)).await?;
        match status {
            200 | 204 => Ok(()),
            404 => Err(Error::not_found(format!(
                "template {template_id} not found"
            ))),
            _ => Err(Error::api(status, String::from_utf8_lossy(&body))),
        }
    }
}
