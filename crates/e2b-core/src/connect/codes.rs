use serde::Deserialize;

use crate::errors::Error;

/// RPC error codes carried by the Connect protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    Canceled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl Code {
    pub fn from_str(code: &str) -> Self {
        match code {
            "canceled" => Code::Canceled,
            "invalid_argument" => Code::InvalidArgument,
            "deadline_exceeded" => Code::DeadlineExceeded,
            "not_found" => Code::NotFound,
            "already_exists" => Code::AlreadyExists,
            "permission_denied" => Code::PermissionDenied,
            "resource_exhausted" => Code::ResourceExhausted,
            "failed_precondition" => Code::FailedPrecondition,
            "aborted" => Code::Aborted,
            "out_of_range" => Code::OutOfRange,
            "unimplemented" => Code::Unimplemented,
            "internal" => Code::Internal,
            "unavailable" => Code::Unavailable,
            "data_loss" => Code::DataLoss,
            "unauthenticated" => Code::Unauthenticated,
            _ => Code::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Code::Canceled => "canceled",
            Code::Unknown => "unknown",
            Code::InvalidArgument => "invalid_argument",
            Code::DeadlineExceeded => "deadline_exceeded",
            Code::NotFound => "not_found",
            Code::AlreadyExists => "already_exists",
            Code::PermissionDenied => "permission_denied",
            Code::ResourceExhausted => "resource_exhausted",
            Code::FailedPrecondition => "failed_precondition",
            Code::Aborted => "aborted",
            Code::OutOfRange => "out_of_range",
            Code::Unimplemented => "unimplemented",
            Code::Internal => "internal",
            Code::Unavailable => "unavailable",
            Code::DataLoss => "data_loss",
            Code::Unauthenticated => "unauthenticated",
        }
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error reported by the server inside the Connect protocol.
#[derive(Debug, Clone, thiserror::Error)]
#[error("rpc error ({code}): {message}")]
pub struct ConnectError {
    pub code: Code,
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WireError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

impl From<WireError> for ConnectError {
    fn from(wire: WireError) -> Self {
        ConnectError {
            code: Code::from_str(&wire.code),
            message: wire.message,
        }
    }
}

/// Failure of an RPC call: either a server-reported Connect error (with a
/// code callers may branch on, e.g. `AlreadyExists`) or a transport-level
/// failure already expressed in the SDK taxonomy.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RpcError {
    #[error(transparent)]
    Connect(ConnectError),
    #[error(transparent)]
    Transport(Error),
}

impl RpcError {
    /// The Connect code, if the server produced one.
    pub fn code(&self) -> Option<Code> {
        match self {
            RpcError::Connect(err) => Some(err.code),
            RpcError::Transport(_) => None,
        }
    }
}

impl From<RpcError> for Error {
    /// Connect codes collapse into the SDK taxonomy: `NotFound`,
    /// `InvalidArgument`, `DeadlineExceeded`, `Unavailable`, and
    /// `ResourceExhausted` get their dedicated kinds, everything else keeps
    /// its code string.
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Transport(err) => err,
            RpcError::Connect(err) => match err.code {
                Code::NotFound => Error::NotFound(err.message),
                Code::InvalidArgument => Error::InvalidArgument(err.message),
                Code::DeadlineExceeded => Error::RequestTimeout,
                Code::Unavailable => Error::SandboxUnavailable(err.message),
                Code::ResourceExhausted => Error::RateLimit(err.message),
                code => Error::Rpc {
                    code: code.as_str().to_string(),
                    message: err.message,
                },
            },
        }
    }
}
