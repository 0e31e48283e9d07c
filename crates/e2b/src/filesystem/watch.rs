//! Directory watchers: a streaming watcher backed by the `WatchDir` server
//! stream, and a poll-based watcher backed by the watcher-id unary RPCs.

use std::cmp::Ordering;
use std::sync::Arc;

use e2b_core::version::ENVD_VERSION_RECURSIVE_WATCH;
use e2b_core::{Error, EventStream, Result};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::options::{WatchExitHandler, WatchOptions};
use super::types::FilesystemEvent;
use super::{FsOptions, Files};
use crate::commands::effective_timeout;
use crate::envd::filesystem::{
    CreateWatcherRequest, CreateWatcherResponse, GetWatcherEventsRequest,
    GetWatcherEventsResponse, RemoveWatcherRequest, RemoveWatcherResponse, WatchDirRequest,
    WatchDirResponse, RPC_CREATE_WATCHER, RPC_GET_WATCHER_EVENTS, RPC_REMOVE_WATCHER,
    RPC_WATCH_DIR,
};

/// Callback invoked with each filesystem event of a streaming watch.
pub type WatchEventHandler = Arc<dyn Fn(FilesystemEvent) + Send + Sync>;

#[derive(Default, Debug)]
struct WatchState {
    stopped: bool,
    err: Option<Error>,
}

/// Handle to a streaming directory watch.
#[derive(Debug)]
pub struct WatchHandle {
    cancel: CancellationToken,
    done: watch::Receiver<bool>,
    state: Arc<Mutex<WatchState>>,
}

impl WatchHandle {
    /// Stops the watch and blocks until the event pump has exited.
    /// Idempotent; later calls return once the pump is gone.
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock();
            if state.stopped {
                drop(state);
                let mut done = self.done.clone();
                let _ = done.wait_for(|done| *done).await;
                return;
            }
            state.stopped = true;
        }
        self.cancel.cancel();
        let mut done = self.done.clone();
        let _ = done.wait_for(|done| *done).await;
    }

    /// Waits for the watch to terminate and returns the error that ended
    /// it, if any.
    pub async fn wait(&self) -> Result<()> {
        let mut done = self.done.clone();
        let _ = done.wait_for(|done| *done).await;
        match &self.state.lock().err {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }
}

impl Files {
    /// Watches a directory; `on_event` runs on the watch pump for every
    /// filesystem event.
    ///
    /// Recursive watching requires envd >= 0.1.4. The stream stays open
    /// until [`WatchHandle::stop`] or a server-side termination.
    pub async fn watch_dir(
        &self,
        path: impl Into<String>,
        on_event: impl Fn(FilesystemEvent) + Send + Sync + 'static,
        options: WatchOptions,
    ) -> Result<WatchHandle> {
        self.shared().ensure_open()?;

        if options.recursive
            && self.rpc().compare_version(ENVD_VERSION_RECURSIVE_WATCH) == Ordering::Less
        {
            return Err(Error::invalid_argument(format!(
                "recursive watch requires envd version >= {ENVD_VERSION_RECURSIVE_WATCH} (current: {})",
                self.rpc().envd_version(),
            )));
        }

        let request = WatchDirRequest {
            path: path.into(),
            recursive: options.recursive,
        };
        let mut stream = self
            .rpc()
            .server_stream::<_, WatchDirResponse>(
                RPC_WATCH_DIR,
                &request,
                options.user.as_deref(),
            )
            .await
            .map_err(Error::from)?;

        // The server acknowledges the watch with a start event before any
        // filesystem events flow.
        match stream.receive().await {
            Ok(Some(message)) if message.start.is_some() => {}
            Ok(Some(_)) => {
                return Err(Error::transport("expected start event on watch stream"));
            }
            Ok(None) => {
                return Err(Error::transport("watch stream closed before start event"));
            }
            Err(err) => return Err(err.into()),
        }

        let state = Arc::new(Mutex::new(WatchState::default()));
        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);

        tokio::spawn(watch_pump(
            stream,
            Arc::new(on_event),
            options.on_exit.clone(),
            state.clone(),
            cancel.clone(),
            done_tx,
        ));

        Ok(WatchHandle {
            cancel,
            done: done_rx,
            state,
        })
    }

    /// Creates a poll-based watcher and returns its server-issued id.
    pub async fn create_watcher(
        &self,
        path: impl Into<String>,
        options: WatchOptions,
    ) -> Result<String> {
        self.shared().ensure_open()?;

        if options.recursive
            && self.rpc().compare_version(ENVD_VERSION_RECURSIVE_WATCH) == Ordering::Less
        {
            return Err(Error::invalid_argument(format!(
                "recursive watch requires envd version >= {ENVD_VERSION_RECURSIVE_WATCH} (current: {})",
                self.rpc().envd_version(),
            )));
        }

        let request = CreateWatcherRequest {
            path: path.into(),
            recursive: options.recursive,
        };
        let response: CreateWatcherResponse = self
            .rpc()
            .unary(
                RPC_CREATE_WATCHER,
                &request,
                options.user.as_deref(),
                effective_timeout(options.request_timeout, self.default_request_timeout()),
            )
            .await
            .map_err(Error::from)?;
        Ok(response.watcher_id)
    }

    /// Drains the events a poll-based watcher has accumulated.
    pub async fn get_watcher_events(
        &self,
        watcher_id: impl Into<String>,
        options: FsOptions,
    ) -> Result<Vec<FilesystemEvent>> {
        self.shared().ensure_open()?;
        let request = GetWatcherEventsRequest {
            watcher_id: watcher_id.into(),
        };
        let response: GetWatcherEventsResponse = self
            .rpc()
            .unary(
                RPC_GET_WATCHER_EVENTS,
                &request,
                options.user.as_deref(),
                effective_timeout(options.request_timeout, self.default_request_timeout()),
            )
            .await
            .map_err(Error::from)?;
        Ok(response
            .events
            .into_iter()
            .filter_map(FilesystemEvent::from_wire)
            .collect())
    }

    /// Tears down a poll-based watcher.
    pub async fn remove_watcher(
        &self,
        watcher_id: impl Into<String>,
        options: FsOptions,
    ) -> Result<()> {
        self.shared().ensure_open()?;
        let request = RemoveWatcherRequest {
            watcher_id: watcher_id.into(),
        };
        self.rpc()
            .unary::<_, RemoveWatcherResponse>(
                RPC_REMOVE_WATCHER,
                &request,
                options.user.as_deref(),
                effective_timeout(options.request_timeout, self.default_request_timeout()),
            )
            .await
            .map_err(Error::from)?;
        Ok(())
    }
}

async fn watch_pump(
    mut stream: EventStream<WatchDirResponse>,
    on_event: WatchEventHandler,
    on_exit: Option<WatchExitHandler>,
    state: Arc<Mutex<WatchState>>,
    cancel: CancellationToken,
    done_tx: watch::Sender<bool>,
) {
    let terminal = loop {
        tokio::select! {
            _ = cancel.cancelled() => break None,
            received = stream.receive() => match received {
                Ok(Some(message)) => {
                    if let Some(event) = message.filesystem.and_then(FilesystemEvent::from_wire) {
                        on_event(event);
                    }
                    // Keepalives and stray start events carry nothing.
                }
                Ok(None) => break None,
                Err(err) => break Some(Error::from(err)),
            }
        }
    };

    if let Some(err) = &terminal {
        tracing::debug!(target = "e2b::watch", %err, "watch stream ended");
        state.lock().err = Some(err.clone());
    }
    if let Some(handler) = &on_exit {
        handler(terminal);
    }
    let _ = done_tx.send(true);
}
