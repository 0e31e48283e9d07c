use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a sandbox on the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxState {
    Running,
    Paused,
}

impl SandboxState {
    pub fn as_str(self) -> &'static str {
        match self {
            SandboxState::Running => "running",
            SandboxState::Paused => "paused",
        }
    }
}

/// Control-plane view of a sandbox.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxInfo {
    #[serde(rename = "sandboxID")]
    pub sandbox_id: String,
    #[serde(rename = "templateID", default)]
    pub template_id: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(rename = "clientID", default)]
    pub client_id: String,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cpu_count: u32,
    #[serde(rename = "memoryMB", default)]
    pub memory_mb: u64,
    #[serde(rename = "diskSizeMB", default)]
    pub disk_size_mb: u64,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default = "default_state")]
    pub state: SandboxState,
    #[serde(default)]
    pub envd_version: String,
}

fn default_state() -> SandboxState {
    SandboxState::Running
}

/// Resource usage sample for a sandbox.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxMetrics {
    #[serde(default)]
    pub cpu_count: u32,
    #[serde(default)]
    pub cpu_used_pct: f64,
    #[serde(default)]
    pub mem_used: i64,
    #[serde(default)]
    pub mem_total: i64,
    #[serde(default)]
    pub disk_used: i64,
    #[serde(default)]
    pub disk_total: i64,
    #[serde(default)]
    pub timestamp_unix: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NetworkRequest {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allow_out: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deny_out: Vec<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub allow_public_traffic: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask_request_host: Option<String>,
}

#[derive(Serialize)]
pub(crate) struct CreateSandboxRequest {
    #[serde(rename = "templateID")]
    pub template_id: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub timeout: u64,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    #[serde(rename = "envVars", skip_serializing_if = "HashMap::is_empty")]
    pub env_vars: HashMap<String, String>,
    pub secure: bool,
    pub allow_internet_access: bool,
    #[serde(rename = "autoPause")]
    pub auto_pause: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mcp: Option<serde_json::Map<String, serde_json::Value>>,
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateSandboxResponse {
    #[serde(rename = "sandboxID", default)]
    pub sandbox_id: String,
    #[serde(rename = "envdVersion", default)]
    pub envd_version: String,
    #[serde(rename = "envdAccessToken", default)]
    pub envd_access_token: Option<String>,
    #[serde(rename = "trafficAccessToken", default)]
    pub traffic_access_token: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
}

#[derive(Serialize)]
pub(crate) struct ConnectSandboxRequest {
    #[serde(skip_serializing_if = "is_zero")]
    pub timeout: u64,
}

#[derive(Serialize)]
pub(crate) struct SetTimeoutRequest {
    pub timeout: u64,
}
