use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub const RPC_LIST_DIR: &str = "filesystem.Filesystem/ListDir";
pub const RPC_STAT: &str = "filesystem.Filesystem/Stat";
pub const RPC_MAKE_DIR: &str = "filesystem.Filesystem/MakeDir";
pub const RPC_MOVE: &str = "filesystem.Filesystem/Move";
pub const RPC_REMOVE: &str = "filesystem.Filesystem/Remove";
pub const RPC_WATCH_DIR: &str = "filesystem.Filesystem/WatchDir";
pub const RPC_CREATE_WATCHER: &str = "filesystem.Filesystem/CreateWatcher";
pub const RPC_GET_WATCHER_EVENTS: &str = "filesystem.Filesystem/GetWatcherEvents";
pub const RPC_REMOVE_WATCHER: &str = "filesystem.Filesystem/RemoveWatcher";

#[derive(Serialize)]
pub struct ListDirRequest {
    pub path: String,
    pub depth: u32,
}

#[derive(Deserialize)]
pub struct ListDirResponse {
    #[serde(default)]
    pub entries: Vec<EntryInfoMessage>,
}

#[derive(Serialize)]
pub struct StatRequest {
    pub path: String,
}

#[derive(Deserialize)]
pub struct StatResponse {
    #[serde(default)]
    pub entry: Option<EntryInfoMessage>,
}

#[derive(Serialize)]
pub struct MakeDirRequest {
    pub path: String,
}

#[derive(Default, Deserialize)]
pub struct MakeDirResponse {
    #[allow(dead_code)]
    #[serde(default)]
    pub entry: Option<EntryInfoMessage>,
}

#[derive(Serialize)]
pub struct MoveRequest {
    pub source: String,
    pub destination: String,
}

#[derive(Deserialize)]
pub struct MoveResponse {
    #[serde(default)]
    pub entry: Option<EntryInfoMessage>,
}

#[derive(Serialize)]
pub struct RemoveRequest {
    pub path: String,
}

#[derive(Default, Deserialize)]
pub struct RemoveResponse {}

#[derive(Serialize)]
pub struct WatchDirRequest {
    pub path: String,
    pub recursive: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWatcherRequest {
    pub path: String,
    pub recursive: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWatcherResponse {
    #[serde(default)]
    pub watcher_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetWatcherEventsRequest {
    pub watcher_id: String,
}

#[derive(Deserialize)]
pub struct GetWatcherEventsResponse {
    #[serde(default)]
    pub events: Vec<FilesystemEventMessage>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveWatcherRequest {
    pub watcher_id: String,
}

#[derive(Default, Deserialize)]
pub struct RemoveWatcherResponse {}

/// Watch stream event oneof.
#[derive(Debug, Default, Deserialize)]
pub struct WatchDirResponse {
    #[serde(default)]
    pub start: Option<serde_json::Value>,
    #[serde(default)]
    pub filesystem: Option<FilesystemEventMessage>,
    #[allow(dead_code)]
    #[serde(default)]
    pub keepalive: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilesystemEventMessage {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub event_type: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryInfoMessage {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub file_type: String,
    #[serde(default)]
    pub path: String,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub size: i64,
    #[serde(default)]
    pub mode: u32,
    #[serde(default)]
    pub permissions: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub modified_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub symlink_target: Option<String>,
}

/// protoJSON renders int64 as a string; accept both shapes.
fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}
