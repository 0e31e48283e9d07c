pub use crate::commands::{CommandOptions, CommandResult, ConnectOptions, RequestOptions};
pub use crate::config::{NetworkOptions, SandboxOptions};
pub use crate::filesystem::{
    FilesystemEvent, FsOptions, ListOptions, WatchOptions, WriteEntry,
};
pub use crate::interpreter::{ContextOptions, Execution, RunCodeOptions};
pub use crate::pty::{PtyConnectOptions, PtyOptions, PtySize};
pub use crate::sandbox::{MetricsOptions, Sandbox, UrlOptions};
pub use crate::{Error, Result};
