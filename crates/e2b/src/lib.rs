//! Client SDK for E2B cloud sandboxes.
//!
//! A [`Sandbox`] is a short-lived Linux VM created through the control
//! plane. The handle exposes three facades for in-sandbox work — `files`,
//! `commands`, and `pty` — plus the stateful code interpreter via
//! [`Sandbox::run_code`].
//!
//! ```no_run
//! use e2b::{Sandbox, SandboxOptions, RunCodeOptions};
//!
//! # async fn demo() -> e2b::Result<()> {
//! let sandbox = Sandbox::create(SandboxOptions::new()).await?;
//! let execution = sandbox.run_code("x = 1 + 1; x", RunCodeOptions::new()).await?;
//! assert_eq!(execution.text(), "2");
//! sandbox.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! Errors raised by evaluated user code never surface as `Err`; they land
//! in `execution.error`. Everything else follows the taxonomy in
//! [`e2b_core::Error`].

pub(crate) mod api;
pub mod commands;
pub mod config;
pub mod consts;
pub(crate) mod envd;
pub mod filesystem;
pub mod interpreter;
pub mod prelude;
pub mod pty;
pub mod sandbox;
pub(crate) mod signature;

pub use e2b_core::{Code, CommandExitError, ConnectError, Error, Result, RpcError};

pub use api::list::{list, list_all, ListOptions as SandboxListOptions, SandboxPaginator, SandboxQuery};
pub use api::models::{SandboxInfo, SandboxMetrics, SandboxState};
pub use commands::{
    CommandHandle, CommandOptions, CommandResult, Commands, ConnectOptions, ProcessInfo,
    RequestOptions,
};
pub use config::{NetworkOptions, SandboxOptions};
pub use filesystem::{
    EntryInfo, EventType, FileType, Files, FilesystemEvent, FsOptions, ListOptions, WatchHandle,
    WatchOptions, WriteEntry, WriteInfo,
};
pub use interpreter::{
    Context, ContextOptions, Execution, ExecutionError, ExecutionResult, Logs, OutputMessage,
    RunCodeOptions,
};
pub use interpreter::charts::{Chart, ScaleType};
pub use pty::{Pty, PtyConnectOptions, PtyOptions, PtySize};
pub use sandbox::{MetricsOptions, Sandbox, UrlOptions};
