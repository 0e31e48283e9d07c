use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Callback invoked with each stdout/stderr chunk of a command.
pub type OutputHandler = Arc<dyn Fn(String) + Send + Sync>;

/// Default lifetime of a command stream.
pub(crate) const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Options for starting a command.
#[derive(Clone, Default)]
pub struct CommandOptions {
    pub(crate) cwd: Option<String>,
    pub(crate) envs: HashMap<String, String>,
    pub(crate) user: Option<String>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) request_timeout: Option<Duration>,
    pub(crate) stdin: Option<bool>,
    pub(crate) tag: Option<String>,
    pub(crate) on_stdout: Option<OutputHandler>,
    pub(crate) on_stderr: Option<OutputHandler>,
}

impl CommandOptions {
    pub fn new() -> Self {
        CommandOptions::default()
    }

    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Overrides the sandbox-level environment variables for this command.
    pub fn with_envs(mut self, envs: HashMap<String, String>) -> Self {
        self.envs = envs;
        self
    }

    /// User the command runs as (Basic-auth user on the stream).
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Lifetime of the command connection. Zero disables the limit.
    /// Defaults to 60 seconds.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Enables or disables stdin. Disabling stdin requires envd >= 0.3.0.
    pub fn with_stdin(mut self, stdin: bool) -> Self {
        self.stdin = Some(stdin);
        self
    }

    /// Tags the command, e.g. to identify a template start command.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn on_stdout(mut self, handler: impl Fn(String) + Send + Sync + 'static) -> Self {
        self.on_stdout = Some(Arc::new(handler));
        self
    }

    pub fn on_stderr(mut self, handler: impl Fn(String) + Send + Sync + 'static) -> Self {
        self.on_stderr = Some(Arc::new(handler));
        self
    }
}

/// Options for re-attaching to a running command.
#[derive(Clone, Default)]
pub struct ConnectOptions {
    pub(crate) timeout: Option<Duration>,
    pub(crate) on_stdout: Option<OutputHandler>,
    pub(crate) on_stderr: Option<OutputHandler>,
}

impl ConnectOptions {
    pub fn new() -> Self {
        ConnectOptions::default()
    }

    /// Lifetime of the connection. Zero disables the limit. Defaults to 60
    /// seconds.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn on_stdout(mut self, handler: impl Fn(String) + Send + Sync + 'static) -> Self {
        self.on_stdout = Some(Arc::new(handler));
        self
    }

    pub fn on_stderr(mut self, handler: impl Fn(String) + Send + Sync + 'static) -> Self {
        self.on_stderr = Some(Arc::new(handler));
        self
    }
}

/// Options for unary command requests (list, kill, send_stdin).
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestOptions {
    pub(crate) request_timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn new() -> Self {
        RequestOptions::default()
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}
