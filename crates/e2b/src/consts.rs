use std::time::Duration;

/// Base domain for the hosted control plane and sandbox traffic.
pub const DEFAULT_DOMAIN: &str = "e2b.app";

/// Template used when none is configured.
pub const DEFAULT_TEMPLATE: &str = "code-interpreter-v1";

/// Port the in-sandbox envd agent listens on.
pub const ENVD_PORT: u16 = 49983;

/// Port the code-interpreter (Jupyter) server listens on.
pub const JUPYTER_PORT: u16 = 49999;

/// Default sandbox lifetime.
pub const DEFAULT_SANDBOX_TIMEOUT: Duration = Duration::from_secs(300);

/// Default deadline for unary HTTP and RPC requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Default deadline for a single `run_code` call.
pub const DEFAULT_CODE_EXECUTION_TIMEOUT: Duration = Duration::from_secs(60);

/// Control-plane URL used in debug mode.
pub const DEBUG_API_URL: &str = "http://localhost:3000";

/// Sandbox ID reported by the synthetic debug handle.
pub const DEBUG_SANDBOX_ID: &str = "debug_sandbox_id";

/// envd version assumed in debug mode, where no control plane reports one.
pub const ENVD_DEBUG_FALLBACK_VERSION: &str = "99.99.99";

/// Languages understood by the code interpreter.
pub mod language {
    pub const PYTHON: &str = "python";
    pub const JAVASCRIPT: &str = "javascript";
    pub const TYPESCRIPT: &str = "typescript";
    pub const R: &str = "r";
    pub const JAVA: &str = "java";
    pub const BASH: &str = "bash";
}
