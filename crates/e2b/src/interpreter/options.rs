use std::sync::Arc;
use std::time::Duration;

use super::execution::{Context, EnvVars, ExecutionError, ExecutionResult, OutputMessage};

pub type OutputMessageHandler = Arc<dyn Fn(OutputMessage) + Send + Sync>;
pub type ResultHandler = Arc<dyn Fn(&ExecutionResult) + Send + Sync>;
pub type ExecutionErrorHandler = Arc<dyn Fn(&ExecutionError) + Send + Sync>;

/// Options for `run_code`.
#[derive(Clone, Default)]
pub struct RunCodeOptions {
    pub(crate) language: Option<String>,
    pub(crate) context: Option<Context>,
    pub(crate) env_vars: EnvVars,
    pub(crate) timeout: Option<Duration>,
    pub(crate) request_timeout: Option<Duration>,
    pub(crate) on_stdout: Option<OutputMessageHandler>,
    pub(crate) on_stderr: Option<OutputMessageHandler>,
    pub(crate) on_result: Option<ResultHandler>,
    pub(crate) on_error: Option<ExecutionErrorHandler>,
}

impl RunCodeOptions {
    pub fn new() -> Self {
        RunCodeOptions::default()
    }

    /// Language to evaluate the code as. Mutually exclusive with
    /// [`with_context`](Self::with_context).
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Execution context to evaluate in. Mutually exclusive with
    /// [`with_language`](Self::with_language).
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_env_vars(mut self, env_vars: EnvVars) -> Self {
        self.env_vars = env_vars;
        self
    }

    /// Code-execution deadline, distinct from the sandbox lifetime.
    /// Unset means 60 seconds; zero disables the deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn on_stdout(mut self, handler: impl Fn(OutputMessage) + Send + Sync + 'static) -> Self {
        self.on_stdout = Some(Arc::new(handler));
        self
    }

    pub fn on_stderr(mut self, handler: impl Fn(OutputMessage) + Send + Sync + 'static) -> Self {
        self.on_stderr = Some(Arc::new(handler));
        self
    }

    pub fn on_result(mut self, handler: impl Fn(&ExecutionResult) + Send + Sync + 'static) -> Self {
        self.on_result = Some(Arc::new(handler));
        self
    }

    pub fn on_error(mut self, handler: impl Fn(&ExecutionError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(handler));
        self
    }
}

/// Options for creating an execution context.
#[derive(Clone, Default)]
pub struct ContextOptions {
    pub(crate) language: Option<String>,
    pub(crate) cwd: Option<String>,
    pub(crate) request_timeout: Option<Duration>,
}

impl ContextOptions {
    pub fn new() -> Self {
        ContextOptions::default()
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}
