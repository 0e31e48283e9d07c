use std::marker::PhantomData;
use std::pin::Pin;

use bytes::{Buf, Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::codes::{RpcError, WireError};
use crate::errors::Error;

/// End-of-stream marker bit in the envelope flags.
pub(crate) const FLAG_END_STREAM: u8 = 0b0000_0010;

/// Envelope header: one flag byte plus a big-endian u32 payload length.
pub(crate) const ENVELOPE_HEADER_LEN: usize = 5;

type BodyStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

#[derive(Debug, Default, Deserialize)]
struct EndStreamResponse {
    #[serde(default)]
    error: Option<WireError>,
}

/// Reader side of a server-streaming RPC.
///
/// Decodes enveloped frames off the response body and yields one message per
/// call. `Ok(None)` means the stream finished cleanly; a server-reported
/// error in the end-of-stream frame surfaces as `RpcError::Connect`.
pub struct EventStream<T> {
    body: BodyStream,
    buf: BytesMut,
    ended: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> EventStream<T> {
    pub(crate) fn new(response: reqwest::Response) -> Self {
        EventStream {
            body: Box::pin(response.bytes_stream()),
            buf: BytesMut::new(),
            ended: false,
            _marker: PhantomData,
        }
    }

    /// Receives the next message, or `None` once the stream has ended.
    pub async fn receive(&mut self) -> Result<Option<T>, RpcError> {
        loop {
            if let Some((flags, payload)) = self.take_frame() {
                if flags & FLAG_END_STREAM != 0 {
                    self.ended = true;
                    let end: EndStreamResponse =
                        serde_json::from_slice(&payload).unwrap_or_default();
                    if let Some(err) = end.error {
                        return Err(RpcError::Connect(err.into()));
                    }
                    return Ok(None);
                }
                let message = serde_json::from_slice(&payload).map_err(|err| {
                    RpcError::Transport(Error::transport(format!("stream decode: {err}")))
                })?;
                return Ok(Some(message));
            }

            if self.ended {
                return Ok(None);
            }

            match self.body.next().await {
                Some(Ok(chunk)) => self.buf.extend_from_slice(&chunk),
                Some(Err(err)) => {
                    self.ended = true;
                    return Err(RpcError::Transport(map_reqwest_error(err)));
                }
                None => {
                    // Body closed without an end-of-stream frame. Any partial
                    // frame left in the buffer is dropped.
                    if !self.buf.is_empty() {
                        tracing::warn!(
                            target = "e2b::rpc",
                            pending = self.buf.len(),
                            "stream closed mid-frame"
                        );
                    }
                    self.ended = true;
                    return Ok(None);
                }
            }
        }
    }

    fn take_frame(&mut self) -> Option<(u8, Bytes)> {
        if self.buf.len() < ENVELOPE_HEADER_LEN {
            return None;
        }
        let flags = self.buf[0];
        let len = u32::from_be_bytes([self.buf[1], self.buf[2], self.buf[3], self.buf[4]]) as usize;
        if self.buf.len() < ENVELOPE_HEADER_LEN + len {
            return None;
        }
        self.buf.advance(ENVELOPE_HEADER_LEN);
        let payload = self.buf.split_to(len).freeze();
        Some((flags, payload))
    }
}

/// Wraps a message payload in the streaming envelope.
pub(crate) fn envelope(payload: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(ENVELOPE_HEADER_LEN + payload.len());
    framed.push(0);
    framed.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    framed.extend_from_slice(payload);
    framed
}

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::RequestTimeout
    } else {
        Error::transport(format!("request failed: {err}"))
    }
}
