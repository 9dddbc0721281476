//! Per-request response writers handed to the recorder.
//!
//! The proxy collects upstream bodies in full, so both writers buffer.
//! [`DisconnectAwareWriter`] additionally exposes a close notification
//! that fires when its [`DisconnectGuard`] is dropped, which happens when
//! axum drops the handler future after the client goes away.

use axum::body::Body;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::BytesMut;
use tokio::sync::watch;

use crate::middleware::recorder::{CloseNotifier, ResponseWriter};

#[derive(Debug)]
pub struct BufferedWriter {
    status: StatusCode,
    headers: HeaderMap,
    body: BytesMut,
    wrote_header: bool,
}

impl Default for BufferedWriter {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: BytesMut::new(),
            wrote_header: false,
        }
    }
}

impl ResponseWriter for BufferedWriter {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    // Only the first status sticks.
    fn write_header(&mut self, status: StatusCode) {
        if !self.wrote_header {
            self.status = status;
            self.wrote_header = true;
        }
    }

    fn write(&mut self, chunk: &[u8]) -> usize {
        if !self.wrote_header {
            self.write_header(StatusCode::OK);
        }
        self.body.extend_from_slice(chunk);
        chunk.len()
    }
}

impl IntoResponse for BufferedWriter {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body.freeze()));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

#[derive(Debug)]
pub struct DisconnectAwareWriter {
    inner: BufferedWriter,
    closed: watch::Receiver<bool>,
}

/// Signals a disconnect to its writer when dropped.
#[derive(Debug)]
pub struct DisconnectGuard(watch::Sender<bool>);

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        self.0.send_replace(true);
    }
}

impl DisconnectAwareWriter {
    #[must_use]
    pub fn new() -> (Self, DisconnectGuard) {
        let (tx, rx) = watch::channel(false);
        let writer = Self {
            inner: BufferedWriter::default(),
            closed: rx,
        };
        (writer, DisconnectGuard(tx))
    }
}

impl ResponseWriter for DisconnectAwareWriter {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        self.inner.write_header(status);
    }

    fn write(&mut self, chunk: &[u8]) -> usize {
        self.inner.write(chunk)
    }

    fn as_close_notifier(&self) -> Option<&dyn CloseNotifier> {
        Some(self)
    }
}

impl CloseNotifier for DisconnectAwareWriter {
    fn close_notify(&self) -> watch::Receiver<bool> {
        self.closed.clone()
    }
}

impl IntoResponse for DisconnectAwareWriter {
    fn into_response(self) -> Response {
        self.inner.into_response()
    }
}

/// The writer chosen per request, depending on `defaults.cancel_on_disconnect`.
#[derive(Debug)]
pub enum ClientWriter {
    Buffered(BufferedWriter),
    DisconnectAware(DisconnectAwareWriter),
}

impl ResponseWriter for ClientWriter {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        match self {
            Self::Buffered(w) => w.headers_mut(),
            Self::DisconnectAware(w) => w.headers_mut(),
        }
    }

    fn write_header(&mut self, status: StatusCode) {
        match self {
            Self::Buffered(w) => w.write_header(status),
            Self::DisconnectAware(w) => w.write_header(status),
        }
    }

    fn write(&mut self, chunk: &[u8]) -> usize {
        match self {
            Self::Buffered(w) => w.write(chunk),
            Self::DisconnectAware(w) => w.write(chunk),
        }
    }

    fn as_close_notifier(&self) -> Option<&dyn CloseNotifier> {
        match self {
            Self::Buffered(w) => w.as_close_notifier(),
            Self::DisconnectAware(w) => w.as_close_notifier(),
        }
    }
}

impl IntoResponse for ClientWriter {
    fn into_response(self) -> Response {
        match self {
            Self::Buffered(w) => w.into_response(),
            Self::DisconnectAware(w) => w.into_response(),
        }
    }
}
