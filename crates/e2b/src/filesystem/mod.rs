//! Filesystem access: file content over the envd HTTP endpoint, metadata
//! and directory operations over the `filesystem.Filesystem` RPC service.

mod options;
mod types;
pub(crate) mod watch;

pub use options::{FsOptions, ListOptions, WatchExitHandler, WatchOptions};
pub use types::{EntryInfo, EventType, FileType, FilesystemEvent, WriteEntry, WriteInfo};
pub use watch::WatchHandle;

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use e2b_core::consts::{HEADER_ACCESS_TOKEN, HEADER_TRAFFIC_TOKEN, USER_AGENT as SDK_USER_AGENT};
use e2b_core::{Code, Error, Result, RpcTransport};
use futures_util::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use url::Url;

use crate::commands::effective_timeout;
use crate::envd::filesystem::{
    ListDirRequest, ListDirResponse, MakeDirRequest, MakeDirResponse, MoveRequest, MoveResponse,
    RemoveRequest, RemoveResponse, StatRequest, StatResponse, RPC_LIST_DIR, RPC_MAKE_DIR,
    RPC_MOVE, RPC_REMOVE, RPC_STAT,
};
use crate::sandbox::SharedState;

const FILES_PATH: &str = "/files";

/// Filesystem facade of a sandbox.
#[derive(Clone, Debug)]
pub struct Files {
    rpc: RpcTransport,
    http: reqwest::Client,
    shared: SharedState,
    default_request_timeout: Duration,
}

impl Files {
    pub(crate) fn new(
        rpc: RpcTransport,
        http: reqwest::Client,
        shared: SharedState,
        default_request_timeout: Duration,
    ) -> Self {
        Files {
            rpc,
            http,
            shared,
            default_request_timeout,
        }
    }

    fn request_timeout(&self, requested: Option<Duration>) -> Option<Duration> {
        effective_timeout(requested, self.default_request_timeout)
    }

    fn file_url(&self, path: Option<&str>, user: Option<&str>) -> Result<Url> {
        let mut url = self
            .rpc
            .base_url()
            .join(FILES_PATH)
            .map_err(|err| Error::invalid_argument(format!("invalid file URL: {err}")))?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(path) = path {
                query.append_pair("path", path);
            }
            if let Some(user) = user {
                query.append_pair("username", user);
            }
        }
        Ok(url)
    }

    fn http_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(SDK_USER_AGENT));
        if let Some(token) = self.rpc.access_token() {
            if let Ok(value) = HeaderValue::from_str(token) {
                headers.insert(HEADER_ACCESS_TOKEN, value);
            }
        }
        if let Some(token) = self.rpc.traffic_token() {
            if let Ok(value) = HeaderValue::from_str(token) {
                headers.insert(HEADER_TRAFFIC_TOKEN, value);
            }
        }
        headers
    }

    /// Reads a file as UTF-8 text (lossy).
    pub async fn read(&self, path: impl AsRef<str>, options: FsOptions) -> Result<String> {
        let bytes = self.read_bytes(path, options).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Reads a file as raw bytes.
    pub async fn read_bytes(&self, path: impl AsRef<str>, options: FsOptions) -> Result<Vec<u8>> {
        self.shared.ensure_open()?;
        let response = self.get_file(path.as_ref(), &options).await?;
        response
            .bytes()
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(|err| {
                if err.is_timeout() {
                    Error::RequestTimeout
                } else {
                    Error::transport(format!("failed to read response body: {err}"))
                }
            })
    }

    /// Streams a file download.
    ///
    /// Dropping the returned stream cancels the underlying request.
    pub async fn read_stream(
        &self,
        path: impl AsRef<str>,
        options: FsOptions,
    ) -> Result<FileStream> {
        self.shared.ensure_open()?;
        let response = self.get_file(path.as_ref(), &options).await?;
        Ok(FileStream {
            inner: Box::pin(response.bytes_stream()),
        })
    }

    async fn get_file(&self, path: &str, options: &FsOptions) -> Result<reqwest::Response> {
        let url = self.file_url(Some(path), options.user.as_deref())?;
        let mut request = self.http.get(url).headers(self.http_headers());
        if let Some(timeout) = self.request_timeout(options.request_timeout) {
            request = request.timeout(timeout);
        }
        let response = request.send().await.map_err(map_send_error)?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.bytes().await.unwrap_or_default();
            return Err(translate_http_error(status, &body));
        }
        Ok(response)
    }

    /// Writes a file, creating parent directories as needed.
    pub async fn write(
        &self,
        path: impl Into<String>,
        data: impl Into<Vec<u8>>,
        options: FsOptions,
    ) -> Result<WriteInfo> {
        let path = path.into();
        let entry = WriteEntry::new(path.clone(), data);
        let infos = self.upload(Some(&path), vec![entry], &options).await?;
        infos
            .into_iter()
            .next()
            .ok_or_else(|| Error::transport("no file information returned"))
    }

    /// Writes several files in one multipart request. The server derives
    /// each target path from the part's filename.
    pub async fn write_files(
        &self,
        files: Vec<WriteEntry>,
        options: FsOptions,
    ) -> Result<Vec<WriteInfo>> {
        if files.is_empty() {
            return Ok(Vec::new());
        }
        self.upload(None, files, &options).await
    }

    async fn upload(
        &self,
        path: Option<&str>,
        files: Vec<WriteEntry>,
        options: &FsOptions,
    ) -> Result<Vec<WriteInfo>> {
        self.shared.ensure_open()?;

        let url = self.file_url(path, options.user.as_deref())?;
        let mut form = Form::new();
        for entry in files {
            form = form.part("file", Part::bytes(entry.data).file_name(entry.path));
        }

        let mut request = self
            .http
            .post(url)
            .headers(self.http_headers())
            .multipart(form);
        if let Some(timeout) = self.request_timeout(options.request_timeout) {
            request = request.timeout(timeout);
        }
        let response = request.send().await.map_err(map_send_error)?;

        let status = response.status().as_u16();
        let body = response.bytes().await.unwrap_or_default();
        if status != 200 {
            return Err(translate_http_error(status, &body));
        }
        serde_json::from_slice(&body)
            .map_err(|err| Error::transport(format!("failed to parse upload response: {err}")))
    }

    /// Lists a directory. `depth` must be at least 1.
    pub async fn list(&self, path: impl Into<String>, options: ListOptions) -> Result<Vec<EntryInfo>> {
        self.shared.ensure_open()?;
        if options.depth < 1 {
            return Err(Error::invalid_argument("depth must be at least 1"));
        }

        let request = ListDirRequest {
            path: path.into(),
            depth: options.depth,
        };
        let response: ListDirResponse = self
            .rpc
            .unary(
                RPC_LIST_DIR,
                &request,
                options.user.as_deref(),
                self.request_timeout(options.request_timeout),
            )
            .await
            .map_err(Error::from)?;

        Ok(response
            .entries
            .into_iter()
            .filter_map(EntryInfo::from_wire)
            .collect())
    }

    /// Creates a directory (and missing parents). Returns `false` when it
    /// already exists.
    pub async fn make_dir(&self, path: impl Into<String>, options: FsOptions) -> Result<bool> {
        self.shared.ensure_open()?;
        let request = MakeDirRequest { path: path.into() };
        match self
            .rpc
            .unary::<_, MakeDirResponse>(
                RPC_MAKE_DIR,
                &request,
                options.user.as_deref(),
                self.request_timeout(options.request_timeout),
            )
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if err.code() == Some(Code::AlreadyExists) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Removes a file or directory.
    pub async fn remove(&self, path: impl Into<String>, options: FsOptions) -> Result<()> {
        self.shared.ensure_open()?;
        let request = RemoveRequest { path: path.into() };
        self.rpc
            .unary::<_, RemoveResponse>(
                RPC_REMOVE,
                &request,
                options.user.as_deref(),
                self.request_timeout(options.request_timeout),
            )
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    /// Renames or moves a file or directory.
    pub async fn rename(
        &self,
        old_path: impl Into<String>,
        new_path: impl Into<String>,
        options: FsOptions,
    ) -> Result<Option<EntryInfo>> {
        self.shared.ensure_open()?;
        let request = MoveRequest {
            source: old_path.into(),
            destination: new_path.into(),
        };
        let response: MoveResponse = self
            .rpc
            .unary(
                RPC_MOVE,
                &request,
                options.user.as_deref(),
                self.request_timeout(options.request_timeout),
            )
            .await
            .map_err(Error::from)?;
        Ok(response.entry.and_then(EntryInfo::from_wire))
    }

    /// Checks whether a path exists. A `not_found` from the server is
    /// `Ok(false)`, not an error.
    pub async fn exists(&self, path: impl Into<String>, options: FsOptions) -> Result<bool> {
        self.shared.ensure_open()?;
        let request = StatRequest { path: path.into() };
        match self
            .rpc
            .unary::<_, StatResponse>(
                RPC_STAT,
                &request,
                options.user.as_deref(),
                self.request_timeout(options.request_timeout),
            )
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if err.code() == Some(Code::NotFound) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Stats a file or directory.
    pub async fn get_info(&self, path: impl Into<String>, options: FsOptions) -> Result<EntryInfo> {
        self.shared.ensure_open()?;
        let request = StatRequest { path: path.into() };
        let response: StatResponse = self
            .rpc
            .unary(
                RPC_STAT,
                &request,
                options.user.as_deref(),
                self.request_timeout(options.request_timeout),
            )
            .await
            .map_err(Error::from)?;
        response
            .entry
            .and_then(EntryInfo::from_wire)
            .ok_or_else(|| Error::transport("no entry information returned"))
    }

    pub(crate) fn rpc(&self) -> &RpcTransport {
        &self.rpc
    }

    pub(crate) fn shared(&self) -> &SharedState {
        &self.shared
    }

    pub(crate) fn default_request_timeout(&self) -> Duration {
        self.default_request_timeout
    }
}

/// Streaming file download. Yields chunks as they arrive; dropping it
/// cancels the request.
pub struct FileStream {
    inner: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
}

impl FileStream {
    /// Convenience for callers that do not want to poll: next chunk, or
    /// `None` at end of file.
    pub async fn next_chunk(&mut self) -> Option<Result<Bytes>> {
        self.inner
            .next()
            .await
            .map(|chunk| chunk.map_err(map_send_error))
    }
}

impl Stream for FileStream {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner
            .poll_next_unpin(cx)
            .map(|chunk| chunk.map(|chunk| chunk.map_err(map_send_error)))
    }
}

fn map_send_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::RequestTimeout
    } else {
        Error::transport(format!("request failed: {err}"))
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Applies the file-HTTP error table, preferring the server's structured
/// `message` over the raw body.
fn translate_http_error(status: u16, body: &[u8]) -> Error {
    let message = serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .map(|err| err.message)
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned());
    Error::from_http_status(status, message)
}
