use std::sync::Arc;
use std::time::Duration;

use e2b_core::Error;

/// Options shared by unary filesystem operations.
#[derive(Clone, Default)]
pub struct FsOptions {
    pub(crate) user: Option<String>,
    pub(crate) request_timeout: Option<Duration>,
}

impl FsOptions {
    pub fn new() -> Self {
        FsOptions::default()
    }

    /// User the operation runs as; affects relative-path resolution and
    /// ownership of created files.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

/// Options for directory listing.
#[derive(Clone)]
pub struct ListOptions {
    pub(crate) user: Option<String>,
    pub(crate) request_timeout: Option<Duration>,
    pub(crate) depth: u32,
}

impl Default for ListOptions {
    fn default() -> Self {
        ListOptions {
            user: None,
            request_timeout: None,
            depth: 1,
        }
    }
}

impl ListOptions {
    pub fn new() -> Self {
        ListOptions::default()
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Listing depth; 1 returns immediate children only.
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }
}

/// Callback invoked when a watch pump exits, with its terminal error.
pub type WatchExitHandler = Arc<dyn Fn(Option<Error>) + Send + Sync>;

/// Options for directory watching.
#[derive(Clone, Default)]
pub struct WatchOptions {
    pub(crate) user: Option<String>,
    pub(crate) request_timeout: Option<Duration>,
    pub(crate) recursive: bool,
    pub(crate) on_exit: Option<WatchExitHandler>,
}

impl WatchOptions {
    pub fn new() -> Self {
        WatchOptions::default()
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Watch the whole subtree. Requires envd >= 0.1.4.
    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn on_exit(mut self, handler: impl Fn(Option<Error>) + Send + Sync + 'static) -> Self {
        self.on_exit = Some(Arc::new(handler));
        self
    }
}
