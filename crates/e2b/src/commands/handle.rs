use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use e2b_core::{CommandExitError, Error, EventStream, Result, RpcTransport};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::options::OutputHandler;
use super::send_sigkill;
use super::types::CommandResult;
use crate::envd::decode_bytes;
use crate::envd::process::{DataEvent, EndEvent, ProcessEvent, ProcessStreamMessage};
use crate::pty::PtyOutputHandler;

/// Output callbacks attached to a handle's event pump.
#[derive(Clone, Default)]
pub(crate) struct Callbacks {
    pub on_stdout: Option<OutputHandler>,
    pub on_stderr: Option<OutputHandler>,
    pub on_pty: Option<PtyOutputHandler>,
}

#[derive(Default)]
struct HandleInner {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    result: Option<CommandResult>,
    err: Option<Error>,
    canceled: bool,
}

impl HandleInner {
    fn publish_end(&mut self, end: EndEvent) {
        self.result = Some(CommandResult {
            stdout: String::from_utf8_lossy(&self.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&self.stderr).into_owned(),
            exit_code: end.exit_code,
            error: end.error.unwrap_or_default(),
        });
    }
}

/// Handle to a live or finished remote process.
///
/// A background pump consumes the server stream and accumulates output.
/// After `done` fires exactly one of result or error is observable; `wait`
/// surfaces a non-zero exit code as [`CommandExitError`].
pub struct CommandHandle {
    pid: u32,
    is_pty: bool,
    inner: Arc<Mutex<HandleInner>>,
    done: watch::Receiver<bool>,
    cancel: CancellationToken,
    rpc: Option<RpcTransport>,
}

impl CommandHandle {
    /// Spawns the event pump for a freshly opened stream.
    ///
    /// `early_stdout`/`early_stderr` hold data the server delivered before
    /// its start event; they are replayed into the buffers and callbacks
    /// before the pump starts so ordering is preserved.
    pub(crate) fn spawn<M: ProcessStreamMessage>(
        rpc: RpcTransport,
        pid: u32,
        stream: EventStream<M>,
        callbacks: Callbacks,
        timeout: Option<Duration>,
        is_pty: bool,
        early_stdout: Vec<u8>,
        early_stderr: Vec<u8>,
    ) -> Self {
        let inner = Arc::new(Mutex::new(HandleInner::default()));
        let (done_tx, done_rx) = watch::channel(false);
        let cancel = CancellationToken::new();

        if !early_stdout.is_empty() {
            inner.lock().stdout.extend_from_slice(&early_stdout);
            if let Some(handler) = &callbacks.on_stdout {
                handler(String::from_utf8_lossy(&early_stdout).into_owned());
            }
        }
        if !early_stderr.is_empty() {
            inner.lock().stderr.extend_from_slice(&early_stderr);
            if let Some(handler) = &callbacks.on_stderr {
                handler(String::from_utf8_lossy(&early_stderr).into_owned());
            }
        }

        tokio::spawn(pump(
            stream,
            inner.clone(),
            callbacks,
            cancel.clone(),
            timeout,
            done_tx,
        ));

        CommandHandle {
            pid,
            is_pty,
            inner,
            done: done_rx,
            cancel,
            rpc: Some(rpc),
        }
    }

    /// Handle for a command that completed during stream initialization.
    pub(crate) fn completed(result: CommandResult) -> Self {
        let inner = Arc::new(Mutex::new(HandleInner {
            result: Some(result),
            ..HandleInner::default()
        }));
        let (done_tx, done_rx) = watch::channel(true);
        drop(done_tx);
        CommandHandle {
            pid: 0,
            is_pty: false,
            inner,
            done: done_rx,
            cancel: CancellationToken::new(),
            rpc: None,
        }
    }

    /// Process ID, or 0 when the stream finished before reporting one.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn is_pty(&self) -> bool {
        self.is_pty
    }

    /// Output accumulated so far.
    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.inner.lock().stdout).into_owned()
    }

    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.inner.lock().stderr).into_owned()
    }

    /// Exit code, or `None` while the command is running.
    pub fn exit_code(&self) -> Option<i32> {
        self.inner.lock().result.as_ref().map(|r| r.exit_code)
    }

    /// Error message from the end event, empty while running or on success.
    pub fn error(&self) -> String {
        self.inner
            .lock()
            .result
            .as_ref()
            .map(|r| r.error.clone())
            .unwrap_or_default()
    }

    /// Waits for the command to finish.
    ///
    /// Returns [`Error::CommandExit`] when the exit code is non-zero. A
    /// disconnected handle that never saw an end event yields `not-found`.
    pub async fn wait(&self) -> Result<CommandResult> {
        let mut done = self.done.clone();
        done.wait_for(|done| *done)
            .await
            .map_err(|_| Error::transport("command event pump vanished"))?;

        // Once the pump has exited nothing else touches the stream.
        self.cancel.cancel();

        let inner = self.inner.lock();
        if let Some(err) = &inner.err {
            return Err(err.clone());
        }
        match &inner.result {
            Some(result) if result.exit_code != 0 => Err(CommandExitError {
                stdout: result.stdout.clone(),
                stderr: result.stderr.clone(),
                exit_code: result.exit_code,
                error: result.error.clone(),
            }
            .into()),
            Some(result) => Ok(result.clone()),
            None => Err(Error::not_found("command finished without a result")),
        }
    }

    /// Kills the process with SIGKILL.
    ///
    /// Returns `Ok(false)` when the process was already gone.
    pub async fn kill(&self) -> Result<bool> {
        self.cancel.cancel();
        match &self.rpc {
            Some(rpc) if self.pid != 0 => send_sigkill(rpc, self.pid, None).await,
            _ => Ok(false),
        }
    }

    /// Stops receiving events without killing the process. The command can
    /// be re-attached later via `Commands::connect`.
    pub fn disconnect(&self) {
        self.inner.lock().canceled = true;
        self.cancel.cancel();
    }
}

async fn pump<M: ProcessStreamMessage>(
    mut stream: EventStream<M>,
    inner: Arc<Mutex<HandleInner>>,
    callbacks: Callbacks,
    cancel: CancellationToken,
    timeout: Option<Duration>,
    done_tx: watch::Sender<bool>,
) {
    let deadline = async {
        match timeout {
            Some(timeout) if !timeout.is_zero() => tokio::time::sleep(timeout).await,
            _ => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = &mut deadline => {
                let mut state = inner.lock();
                if state.result.is_none() && state.err.is_none() {
                    state.err = Some(Error::RequestTimeout);
                }
                break;
            }
            received = stream.receive() => match received {
                Ok(Some(message)) => {
                    if inner.lock().canceled {
                        break;
                    }
                    if let Some(event) = message.into_event() {
                        dispatch_event(&inner, &callbacks, event);
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    let mut state = inner.lock();
                    if state.err.is_none() && state.result.is_none() {
                        state.err = Some(Error::from(err));
                    }
                    break;
                }
            }
        }
    }

    let _ = done_tx.send(true);
}

fn dispatch_event(inner: &Arc<Mutex<HandleInner>>, callbacks: &Callbacks, event: ProcessEvent) {
    if let Some(data) = event.data {
        dispatch_data(inner, callbacks, data);
    } else if let Some(end) = event.end {
        inner.lock().publish_end(end);
    }
    // Later start events and keepalives are ignored.
}

fn dispatch_data(inner: &Arc<Mutex<HandleInner>>, callbacks: &Callbacks, data: DataEvent) {
    if let Some(chunk) = data.stdout.as_deref().and_then(decode_bytes) {
        inner.lock().stdout.extend_from_slice(&chunk);
        if let Some(handler) = &callbacks.on_stdout {
            handler(String::from_utf8_lossy(&chunk).into_owned());
        }
    }
    if let Some(chunk) = data.stderr.as_deref().and_then(decode_bytes) {
        inner.lock().stderr.extend_from_slice(&chunk);
        if let Some(handler) = &callbacks.on_stderr {
            handler(String::from_utf8_lossy(&chunk).into_owned());
        }
    }
    // PTY output is a raw byte stream; it lands in the stdout buffer and is
    // handed to the PTY callback undecoded.
    if let Some(chunk) = data.pty.as_deref().and_then(decode_bytes) {
        inner.lock().stdout.extend_from_slice(&chunk);
        if let Some(handler) = &callbacks.on_pty {
            handler(Bytes::from(chunk));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_handle_is_done_with_result() {
        let handle = CommandHandle::completed(CommandResult {
            stdout: "a\nb\n".into(),
            stderr: String::new(),
            exit_code: 0,
            error: String::new(),
        });
        assert_eq!(handle.pid(), 0);
        assert_eq!(handle.exit_code(), Some(0));
        assert_eq!(handle.stdout(), "a\nb\n");
    }

    #[tokio::test]
    async fn completed_handle_wait_returns_immediately() {
        let handle = CommandHandle::completed(CommandResult {
            stdout: "out".into(),
            ..CommandResult::default()
        });
        let result = handle.wait().await.unwrap();
        assert_eq!(result.stdout, "out");
        // wait is repeatable
        assert_eq!(handle.wait().await.unwrap().stdout, "out");
    }

    #[tokio::test]
    async fn completed_handle_nonzero_exit_surfaces_command_exit() {
        let handle = CommandHandle::completed(CommandResult {
            stderr: "oops".into(),
            exit_code: 2,
            error: "oops".into(),
            ..CommandResult::default()
        });
        match handle.wait().await {
            Err(Error::CommandExit(err)) => {
                assert_eq!(err.exit_code, 2);
                assert_eq!(err.stderr, "oops");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
