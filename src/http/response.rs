//! Response construction and the streaming response latch.
//!
//! # Responsibilities
//! - Build plain, eager responses (HTML, text, attachments)
//! - Map request errors to status codes and the `Arkimet-Exception` header
//! - Run blocking engine jobs whose response headers are committed lazily
//!
//! # Design Decisions
//! - Headers travel on a oneshot channel, so they can only be sent once
//! - Body chunks travel on a bounded channel: a slow client applies
//!   backpressure to the engine
//! - A failure after headers pushes an error into the body stream, which
//!   aborts the connection instead of ending the body cleanly

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::stream;
use tokio::sync::{mpsc, oneshot};

use crate::error::RequestError;
use crate::observability::metrics;

/// Header carrying the failure message of a failed request.
pub const ARKIMET_EXCEPTION: &str = "arkimet-exception";

/// Body chunks buffered between the engine and the connection.
const BODY_CHANNEL_CAPACITY: usize = 16;

/// Status line and headers of a successful response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub content_type: &'static str,
    /// Suggested download name, sent as `Content-Disposition`.
    pub filename: Option<String>,
}

impl ResponseHead {
    pub fn new(content_type: &'static str) -> Self {
        Self {
            content_type,
            filename: None,
        }
    }

    pub fn attachment(content_type: &'static str, filename: impl Into<String>) -> Self {
        Self {
            content_type,
            filename: Some(filename.into()),
        }
    }

    pub fn into_response(self, body: Body) -> Response {
        let mut builder = Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, self.content_type);
        if let Some(filename) = &self.filename {
            builder = builder.header(
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={}", filename),
            );
        }
        builder
            .body(body)
            .unwrap_or_else(|e| error_response(&RequestError::Internal(e.to_string())))
    }
}

/// Eager response with a complete body.
pub fn full_response(head: ResponseHead, body: impl Into<Body>) -> Response {
    head.into_response(body.into())
}

fn status_for(err: &RequestError) -> StatusCode {
    match err {
        RequestError::NotFound(_) => StatusCode::NOT_FOUND,
        RequestError::BadRequest(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Header values only carry visible ASCII.
fn header_safe(message: &str) -> String {
    message
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { ' ' })
        .collect()
}

/// Error response: status from the error kind, message in the
/// `Arkimet-Exception` header and in the body.
pub fn error_response(err: &RequestError) -> Response {
    let message = err.to_string();
    let mut response = (
        status_for(err),
        [(header::CONTENT_TYPE, "text/plain")],
        format!("{}\n", message),
    )
        .into_response();
    if let Ok(value) = HeaderValue::from_str(&header_safe(&message)) {
        response.headers_mut().insert(ARKIMET_EXCEPTION, value);
    }
    response
}

/// How a streamed request resolved before its first byte.
#[derive(Debug)]
enum Outcome {
    Headers(ResponseHead),
    Failed(RequestError),
}

/// Shared, single-use sender of the response headers.
///
/// Cloned into engine hooks; whichever clone fires first sends the
/// headers, later calls are no-ops.
#[derive(Clone)]
pub struct HeadLatch {
    head: ResponseHead,
    tx: Arc<Mutex<Option<oneshot::Sender<Outcome>>>>,
}

impl HeadLatch {
    fn take(&self) -> Option<oneshot::Sender<Outcome>> {
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    /// Send the headers if not sent yet.
    pub fn send(&self) -> io::Result<()> {
        match self.take() {
            Some(tx) => tx
                .send(Outcome::Headers(self.head.clone()))
                .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "client went away")),
            None => Ok(()),
        }
    }

    pub fn is_sent(&self) -> bool {
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).is_none()
    }
}

/// Output side of a streamed response, used from a blocking thread.
///
/// Writing sends the headers first if needed.
pub struct ResponseWriter {
    view: &'static str,
    latch: HeadLatch,
    body: mpsc::Sender<Result<Bytes, io::Error>>,
}

impl ResponseWriter {
    pub fn latch(&self) -> HeadLatch {
        self.latch.clone()
    }

    pub fn send_headers(&self) -> io::Result<()> {
        self.latch.send()
    }

    pub fn headers_sent(&self) -> bool {
        self.latch.is_sent()
    }

    fn finish(self, result: Result<(), RequestError>) {
        let err = match result {
            Ok(()) => {
                if let Err(e) = self.send_headers() {
                    tracing::debug!(view = self.view, error = %e, "Client left before headers");
                }
                return;
            }
            Err(err) => err,
        };

        match self.latch.take() {
            Some(tx) => {
                tracing::warn!(view = self.view, error = %err, "Request failed");
                let _ = tx.send(Outcome::Failed(err));
            }
            None => {
                tracing::error!(
                    view = self.view,
                    error = %err,
                    "Request failed after response headers were sent, truncating response"
                );
                metrics::record_stream_abort(self.view);
                let _ = self.body.blocking_send(Err(io::Error::other(err.to_string())));
            }
        }
    }
}

impl Write for ResponseWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.send_headers()?;
        if buf.is_empty() {
            return Ok(0);
        }
        self.body
            .blocking_send(Ok(Bytes::copy_from_slice(buf)))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "client went away"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `job` on the blocking pool and stream what it writes.
///
/// Resolves as soon as headers are committed, or with an error response
/// if `job` fails before that.
pub async fn stream_response<F>(view: &'static str, head: ResponseHead, job: F) -> Response
where
    F: FnOnce(&mut ResponseWriter) -> Result<(), RequestError> + Send + 'static,
{
    let start = Instant::now();
    let (head_tx, head_rx) = oneshot::channel();
    let (body_tx, mut body_rx) = mpsc::channel(BODY_CHANNEL_CAPACITY);

    let mut writer = ResponseWriter {
        view,
        latch: HeadLatch {
            head,
            tx: Arc::new(Mutex::new(Some(head_tx))),
        },
        body: body_tx,
    };

    tokio::task::spawn_blocking(move || {
        let result = job(&mut writer);
        writer.finish(result);
    });

    let response = match head_rx.await {
        Ok(Outcome::Headers(head)) => {
            let body = stream::poll_fn(move |cx| body_rx.poll_recv(cx));
            head.into_response(Body::from_stream(body))
        }
        Ok(Outcome::Failed(err)) => error_response(&err),
        Err(_) => error_response(&RequestError::Internal("request handler terminated unexpectedly".into())),
    };
    tracing::debug!(view, status = %response.status(), elapsed = ?start.elapsed(), "Response committed");
    response
}
