pub use crate::connect::{Code, ConnectError, EventStream, RpcError, RpcTransport};
pub use crate::errors::{CommandExitError, Error, Result};
pub use crate::version::{
    compare_versions, ENVD_VERSION_DEFAULT_USER, ENVD_VERSION_RECURSIVE_WATCH,
    ENVD_VERSION_STDIN_DISABLE,
};
