//! Status-recording response writer wrapper.
//!
//! [`wrap`] decorates any [`ResponseWriter`] so the proxy can always hand
//! downstream code a single writer type. The one optional capability a
//! writer may carry, client-disconnect notification ([`CloseNotifier`]),
//! is probed once at wrap time and encoded in the variant returned:
//! [`Recorder::Notifying`] implements [`CloseNotifier`] and reports it via
//! [`ResponseWriter::as_close_notifier`], [`Recorder::Plain`] does neither.
//! The wrapper never buffers or rewrites headers or body.

use axum::http::{HeaderMap, StatusCode};
use tokio::sync::watch;

/// The base capability every response writer has.
pub trait ResponseWriter: Send {
    fn headers_mut(&mut self) -> &mut HeaderMap;

    fn write_header(&mut self, status: StatusCode);

    /// Append `chunk` to the body, returning the number of bytes accepted.
    fn write(&mut self, chunk: &[u8]) -> usize;

    /// Capability probe. Writers that can report client disconnects return
    /// themselves here.
    fn as_close_notifier(&self) -> Option<&dyn CloseNotifier> {
        None
    }
}

/// Client-disconnect notification.
///
/// The receiver's value flips to `true` once the client has gone away. A
/// closed channel means the same thing.
pub trait CloseNotifier {
    fn close_notify(&self) -> watch::Receiver<bool>;
}

/// Wrap `writer`, keeping its disconnect capability if and only if it has one.
pub fn wrap<W: ResponseWriter>(writer: W) -> Recorder<W> {
    match writer.as_close_notifier().map(|n| n.close_notify()) {
        Some(notify) => Recorder::Notifying(NotifyingRecorder {
            inner: PlainRecorder::new(writer),
            notify,
        }),
        None => Recorder::Plain(PlainRecorder::new(writer)),
    }
}

pub enum Recorder<W> {
    Plain(PlainRecorder<W>),
    Notifying(NotifyingRecorder<W>),
}

impl<W> Recorder<W> {
    /// Status forwarded to the inner writer, `200 OK` if none was set.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Plain(r) => r.status(),
            Self::Notifying(r) => r.inner.status(),
        }
    }

    #[must_use]
    pub fn into_inner(self) -> W {
        match self {
            Self::Plain(r) => r.into_inner(),
            Self::Notifying(r) => r.inner.into_inner(),
        }
    }
}

impl<W: ResponseWriter> ResponseWriter for Recorder<W> {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        match self {
            Self::Plain(r) => r.headers_mut(),
            Self::Notifying(r) => r.headers_mut(),
        }
    }

    fn write_header(&mut self, status: StatusCode) {
        match self {
            Self::Plain(r) => r.write_header(status),
            Self::Notifying(r) => r.write_header(status),
        }
    }

    fn write(&mut self, chunk: &[u8]) -> usize {
        match self {
            Self::Plain(r) => r.write(chunk),
            Self::Notifying(r) => r.write(chunk),
        }
    }

    fn as_close_notifier(&self) -> Option<&dyn CloseNotifier> {
        match self {
            Self::Plain(_) => None,
            Self::Notifying(r) => Some(r),
        }
    }
}

pub struct PlainRecorder<W> {
    inner: W,
    status: StatusCode,
    committed: bool,
}

impl<W> PlainRecorder<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            status: StatusCode::OK,
            committed: false,
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: ResponseWriter> ResponseWriter for PlainRecorder<W> {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    // The first header or body write fixes the status, as it does on the
    // wire.
    fn write_header(&mut self, status: StatusCode) {
        if !self.committed {
            self.status = status;
            self.committed = true;
        }
        self.inner.write_header(status);
    }

    fn write(&mut self, chunk: &[u8]) -> usize {
        self.committed = true;
        self.inner.write(chunk)
    }
}

pub struct NotifyingRecorder<W> {
    inner: PlainRecorder<W>,
    notify: watch::Receiver<bool>,
}

impl<W: ResponseWriter> ResponseWriter for NotifyingRecorder<W> {
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

impl<W> CloseNotifier for NotifyingRecorder<W> {
    fn close_notify(&self) -> watch::Receiver<bool> {
        self.notify.clone()
    }
}

/// Resolve once the client behind `notify` has disconnected.
pub async fn closed(mut notify: watch::Receiver<bool>) {
    loop {
        if *notify.borrow_and_update() {
            return;
        }
        if notify.changed().await.is_err() {
            return;
        }
    }
}
