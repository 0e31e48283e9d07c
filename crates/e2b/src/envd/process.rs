use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const RPC_START: &str = "process.Process/Start";
pub const RPC_CONNECT: &str = "process.Process/Connect";
pub const RPC_LIST: &str = "process.Process/List";
pub const RPC_UPDATE: &str = "process.Process/Update";
pub const RPC_SEND_INPUT: &str = "process.Process/SendInput";
pub const RPC_SEND_SIGNAL: &str = "process.Process/SendSignal";

pub const SIGNAL_SIGKILL: &str = "SIGNAL_SIGKILL";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessConfig {
    pub cmd: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub envs: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PtySize {
    pub cols: u32,
    pub rows: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Pty {
    pub size: PtySize,
}

#[derive(Serialize)]
pub struct StartRequest {
    pub process: ProcessConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pty: Option<Pty>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdin: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// Selects a process by pid (the only selector envd supports).
#[derive(Serialize)]
pub struct ProcessSelector {
    pub pid: u32,
}

#[derive(Serialize)]
pub struct ConnectRequest {
    pub process: ProcessSelector,
}

#[derive(Serialize)]
pub struct ListRequest {}

#[derive(Deserialize)]
pub struct ListResponse {
    #[serde(default)]
    pub processes: Vec<ProcessInfoMessage>,
}

#[derive(Deserialize)]
pub struct ProcessInfoMessage {
    #[serde(default)]
    pub pid: u32,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub config: Option<ProcessConfig>,
}

/// Process input oneof: exactly one of `stdin` or `pty`, base64 encoded.
#[derive(Serialize)]
pub struct ProcessInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pty: Option<String>,
}

#[derive(Serialize)]
pub struct SendInputRequest {
    pub process: ProcessSelector,
    pub input: ProcessInput,
}

#[derive(Serialize)]
pub struct SendSignalRequest {
    pub process: ProcessSelector,
    pub signal: &'static str,
}

#[derive(Serialize)]
pub struct UpdateRequest {
    pub process: ProcessSelector,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pty: Option<Pty>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Empty {}

#[derive(Debug, Default, Deserialize)]
pub struct StartEvent {
    #[serde(default)]
    pub pid: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct DataEvent {
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub stderr: Option<String>,
    #[serde(default)]
    pub pty: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndEvent {
    #[serde(default)]
    pub exit_code: i32,
    #[allow(dead_code)]
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Process event oneof.
#[derive(Debug, Default, Deserialize)]
pub struct ProcessEvent {
    #[serde(default)]
    pub start: Option<StartEvent>,
    #[serde(default)]
    pub data: Option<DataEvent>,
    #[serde(default)]
    pub end: Option<EndEvent>,
    #[allow(dead_code)]
    #[serde(default)]
    pub keepalive: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StartResponse {
    #[serde(default)]
    pub event: Option<ProcessEvent>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConnectResponse {
    #[serde(default)]
    pub event: Option<ProcessEvent>,
}

/// The two concrete stream message types the command pump consumes.
pub trait ProcessStreamMessage: serde::de::DeserializeOwned + Send + 'static {
    fn into_event(self) -> Option<ProcessEvent>;
}

impl ProcessStreamMessage for StartResponse {
    fn into_event(self) -> Option<ProcessEvent> {
        self.event
    }
}

impl ProcessStreamMessage for ConnectResponse {
    fn into_event(self) -> Option<ProcessEvent> {
        self.event
    }
}
