use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by every surface of the SDK.
///
/// All variants carry owned data only, so terminal errors published by a
/// background pump can be observed by multiple waiters.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Caller error: missing API key, conflicting options, depth < 1,
    /// a feature gated behind a newer envd version, and similar.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Sandbox, context, file, process, or watcher is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation attempted on a closed sandbox.
    #[error("sandbox is closed")]
    SandboxClosed,

    /// HTTP or RPC deadline exceeded (also mapped from 502).
    #[error("request timeout exceeded")]
    RequestTimeout,

    /// Code-execution deadline exceeded in `run_code`.
    #[error("execution timeout exceeded")]
    ExecutionTimeout,

    #[error("rate limited: {0}")]
    RateLimit(String),

    #[error("sandbox unavailable: {0}")]
    SandboxUnavailable(String),

    #[error("authentication error: {0}")]
    Authentication(String),

    #[error("not enough disk space: {0}")]
    OutOfDisk(String),

    /// Unmapped control-plane or envd HTTP error.
    #[error("sandbox error status {status}, {body}")]
    Api { status: u16, body: String },

    /// RPC error with a code the taxonomy does not single out.
    #[error("rpc error ({code}): {message}")]
    Rpc { code: String, message: String },

    /// Process finished with a non-zero exit code.
    #[error(transparent)]
    CommandExit(#[from] CommandExitError),

    /// Connection, body, or decode failure below the protocol layer.
    #[error("{0}")]
    Transport(String),
}

impl Error {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    pub fn rate_limit(msg: impl Into<String>) -> Self {
        Error::RateLimit(msg.into())
    }

    pub fn sandbox_unavailable(msg: impl Into<String>) -> Self {
        Error::SandboxUnavailable(msg.into())
    }

    pub fn authentication(msg: impl Into<String>) -> Self {
        Error::Authentication(msg.into())
    }

    pub fn out_of_disk(msg: impl Into<String>) -> Self {
        Error::OutOfDisk(msg.into())
    }

    pub fn api(status: u16, body: impl Into<String>) -> Self {
        Error::Api {
            status,
            body: body.into(),
        }
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Error::Transport(msg.into())
    }

    /// Translates an envd file-HTTP status into the taxonomy.
    ///
    /// 400 invalid-argument, 401 authentication, 404 not-found, 429
    /// rate-limited, 502 request-timeout, 507 out-of-disk; anything else
    /// surfaces status and body.
    pub fn from_http_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            400 => Error::InvalidArgument(body),
            401 => Error::Authentication(body),
            404 => Error::NotFound(body),
            429 => Error::RateLimit(body),
            502 => Error::RequestTimeout,
            507 => Error::OutOfDisk(body),
            _ => Error::Api { status, body },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::RequestTimeout | Error::ExecutionTimeout)
    }
}

/// Returned from `CommandHandle::wait` when the process exits non-zero.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("command exited with code {exit_code} and error:\n{stderr}")]
pub struct CommandExitError {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_translation() {
        assert!(matches!(
            Error::from_http_status(400, "bad"),
            Error::InvalidArgument(_)
        ));
        assert!(matches!(
            Error::from_http_status(401, "no"),
            Error::Authentication(_)
        ));
        assert!(Error::from_http_status(404, "missing").is_not_found());
        assert!(matches!(
            Error::from_http_status(429, "slow down"),
            Error::RateLimit(_)
        ));
        assert!(Error::from_http_status(502, "gateway").is_timeout());
        assert!(matches!(
            Error::from_http_status(507, "full"),
            Error::OutOfDisk(_)
        ));
        match Error::from_http_status(500, "boom") {
            Error::Api { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn timeout_errors_match_by_kind() {
        assert!(Error::RequestTimeout.is_timeout());
        assert!(Error::ExecutionTimeout.is_timeout());
        assert!(!Error::SandboxClosed.is_timeout());
        // The two timeout kinds stay distinguishable.
        assert!(!matches!(Error::ExecutionTimeout, Error::RequestTimeout));
    }

    #[test]
    fn command_exit_display_includes_code_and_stderr() {
        let err = CommandExitError {
            stdout: String::new(),
            stderr: "oops".into(),
            exit_code: 2,
            error: "exit status 2".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("code 2"));
        assert!(msg.contains("oops"));
    }
}
