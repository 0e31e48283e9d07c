use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::envd::filesystem::{EntryInfoMessage, FilesystemEventMessage};

/// Kind of a filesystem object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    File,
    Dir,
}

impl FileType {
    fn from_wire(wire: &str) -> Option<Self> {
        match wire {
            "FILE_TYPE_FILE" => Some(FileType::File),
            "FILE_TYPE_DIRECTORY" => Some(FileType::Dir),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FileType::File => "file",
            FileType::Dir => "dir",
        }
    }
}

/// Kind of a filesystem change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Create,
    Write,
    Remove,
    Rename,
    Chmod,
}

impl EventType {
    fn from_wire(wire: &str) -> Option<Self> {
        match wire {
            "EVENT_TYPE_CREATE" => Some(EventType::Create),
            "EVENT_TYPE_WRITE" => Some(EventType::Write),
            "EVENT_TYPE_REMOVE" => Some(EventType::Remove),
            "EVENT_TYPE_RENAME" => Some(EventType::Rename),
            "EVENT_TYPE_CHMOD" => Some(EventType::Chmod),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Create => "create",
            EventType::Write => "write",
            EventType::Remove => "remove",
            EventType::Rename => "rename",
            EventType::Chmod => "chmod",
        }
    }
}

/// Metadata about a file or directory.
#[derive(Debug, Clone)]
pub struct EntryInfo {
    pub name: String,
    pub entry_type: FileType,
    pub path: String,
    /// Size in bytes; 0 for directories.
    pub size: i64,
    /// Mode and permission bits.
    pub mode: u32,
    /// Permission string, e.g. `rwxr-xr-x`.
    pub permissions: String,
    pub owner: String,
    pub group: String,
    pub modified_time: Option<DateTime<Utc>>,
    /// Target of the symlink, when the entry is one.
    pub symlink_target: Option<String>,
}

impl EntryInfo {
    /// Entries with a type the SDK does not know are dropped.
    pub(crate) fn from_wire(message: EntryInfoMessage) -> Option<Self> {
        let entry_type = FileType::from_wire(&message.file_type)?;
        Some(EntryInfo {
            name: message.name,
            entry_type,
            path: message.path,
            size: message.size,
            mode: message.mode,
            permissions: message.permissions,
            owner: message.owner,
            group: message.group,
            modified_time: message.modified_time,
            symlink_target: message.symlink_target,
        })
    }
}

/// A filesystem change observed by a watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilesystemEvent {
    pub name: String,
    pub event_type: EventType,
}

impl FilesystemEvent {
    pub(crate) fn from_wire(message: FilesystemEventMessage) -> Option<Self> {
        let event_type = EventType::from_wire(&message.event_type)?;
        Some(FilesystemEvent {
            name: message.name,
            event_type,
        })
    }
}

/// Record returned by the file upload endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct WriteInfo {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub entry_type: String,
    #[serde(default)]
    pub path: String,
}

/// One file in a multi-file upload.
#[derive(Debug, Clone)]
pub struct WriteEntry {
    pub path: String,
    pub data: Vec<u8>,
}

impl WriteEntry {
    pub fn new(path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        WriteEntry {
            path: path.into(),
            data: data.into(),
        }
    }
}
