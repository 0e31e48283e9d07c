use std::collections::HashMap;
use std::time::Duration;

use e2b_core::Result;

use super::models::{SandboxInfo, SandboxState};
use super::ApiClient;
use crate::config::SandboxOptions;

/// Filter for sandbox listings.
#[derive(Debug, Clone, Default)]
pub struct SandboxQuery {
    pub metadata: HashMap<String, String>,
    pub state: Vec<SandboxState>,
}

/// Options for listing sandboxes.
#[derive(Clone, Default)]
pub struct ListOptions {
    pub(crate) sandbox: SandboxOptions,
    pub(crate) query: SandboxQuery,
    pub(crate) limit: Option<u32>,
}

impl ListOptions {
    pub fn new() -> Self {
        ListOptions::default()
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.sandbox = self.sandbox.with_api_key(key);
        self
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.sandbox = self.sandbox.with_api_url(url);
        self
    }

    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.sandbox = self.sandbox.with_http_client(client);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.sandbox = self.sandbox.with_request_timeout(timeout);
        self
    }

    pub fn with_query(mut self, query: SandboxQuery) -> Self {
        self.query = query;
        self
    }

    /// Page size. Defaults to 25.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Paginated access to `GET /v2/sandboxes`.
///
/// `has_next` stays true until a page comes back without an `X-Next-Token`
/// header.
pub struct SandboxPaginator {
    api: ApiClient,
    query: SandboxQuery,
    limit: u32,
    next_token: Option<String>,
    has_next: bool,
}

impl SandboxPaginator {
    pub fn has_next(&self) -> bool {
        self.has_next
    }

    /// Fetches the next page. Returns an empty page once exhausted.
    pub async fn next_items(&mut self) -> Result<Vec<SandboxInfo>> {
        if !self.has_next {
            return Ok(Vec::new());
        }

        let (items, token) = self
            .api
            .list_sandboxes_page(&self.query, self.limit, self.next_token.as_deref())
            .await?;
        self.has_next = token.is_some();
        self.next_token = token;
        Ok(items)
    }
}

/// Creates a paginator over the caller's sandboxes.
pub fn list(options: ListOptions) -> Result<SandboxPaginator> {
    let limit = options.limit.unwrap_or(25);
    let config = options.sandbox.resolve()?;
    let api = ApiClient::new(
        config.http_client()?,
        config.api_url.clone(),
        config.api_key.clone(),
        config.access_token.clone(),
        config.request_timeout,
    );
    api.require_api_key()?;
    Ok(SandboxPaginator {
        api,
        query: options.query,
        limit,
        next_token: None,
        has_next: true,
    })
}

/// Fetches every page and concatenates the results in order.
pub async fn list_all(options: ListOptions) -> Result<Vec<SandboxInfo>> {
    let mut paginator = list(options)?;
    let mut all = Vec::new();
    while paginator.has_next() {
        all.extend(paginator.next_items().await?);
    }
    Ok(all)
}
