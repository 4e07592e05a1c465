//! Per-session transport: HTTP framing around a protocol engine.
//!
//! A transport is bound to its engine once, at session creation, and is
//! closed once, at termination. Request handling runs in a spawned task so a
//! panicking handler becomes an error response instead of tearing down the
//! connection; the task is aborted if the client goes away first.

use axum::Json;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http::{HeaderMap, StatusCode, header};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use super::engine::{NotificationSink, ProtocolEngine};
use super::error::SessionError;
use crate::core::transport::jsonrpc::{
    InboundBody, InboundMessage, JsonRpcNotification, JsonRpcResponse,
};

const EVENT_STREAM: &str = "text/event-stream";
const JSON: &str = "application/json";

/// Aborts the wrapped task when dropped.
#[derive(Debug)]
pub struct AbortOnDrop<T>(pub JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl<T> Future for AbortOnDrop<T> {
    type Output = Result<T, JoinError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().0).poll(cx)
    }
}

/// Lifecycle of a session transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Uninitialized,
    Connected,
    Closed,
}

/// How responses to a POST are framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    Json,
    Sse,
}

impl ResponseMode {
    /// Pick the framing for a request with these headers.
    ///
    /// SSE is used when enabled and accepted, or when the client accepts
    /// nothing else.
    pub fn negotiate(headers: &HeaderMap, prefer_sse: bool) -> Self {
        let accept = headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let sse = accepts(accept, EVENT_STREAM);
        let json = accept.is_empty() || accepts(accept, JSON) || accepts(accept, "*/*");

        if sse && (prefer_sse || !json) {
            Self::Sse
        } else {
            Self::Json
        }
    }
}

fn accepts(accept: &str, media_type: &str) -> bool {
    accept.split(',').any(|part| {
        part.split(';')
            .next()
            .is_some_and(|m| m.trim().eq_ignore_ascii_case(media_type))
    })
}

type NotificationSender = mpsc::UnboundedSender<JsonRpcNotification>;

/// Sender half of the standalone server-to-client stream.
#[derive(Default)]
struct StreamSlot {
    sender: Mutex<Option<NotificationSender>>,
}

impl StreamSlot {
    fn sender(&self) -> std::sync::MutexGuard<'_, Option<NotificationSender>> {
        self.sender.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open the stream; fails while a previous receiver is still attached.
    fn open(&self) -> Result<mpsc::UnboundedReceiver<JsonRpcNotification>, SessionError> {
        let mut sender = self.sender();
        if sender.as_ref().is_some_and(|tx| !tx.is_closed()) {
            return Err(SessionError::StreamConflict);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *sender = Some(tx);
        Ok(rx)
    }

    fn is_open(&self) -> bool {
        self.sender().as_ref().is_some_and(|tx| !tx.is_closed())
    }

    fn close(&self) {
        self.sender().take();
    }
}

impl NotificationSink for StreamSlot {
    fn send(&self, notification: JsonRpcNotification) -> bool {
        match self.sender().as_ref() {
            Some(tx) => tx.send(notification).is_ok(),
            None => false,
        }
    }
}

/// HTTP framing for one session.
pub struct SessionTransport {
    session_id: String,
    prefer_sse: bool,
    state: Mutex<TransportState>,
    engine: OnceLock<Arc<ProtocolEngine>>,
    stream: Arc<StreamSlot>,
    closed: CancellationToken,
}

impl SessionTransport {
    /// Create an unbound transport for `session_id`.
    pub fn new(session_id: impl Into<String>, prefer_sse: bool) -> Self {
        Self {
            session_id: session_id.into(),
            prefer_sse,
            state: Mutex::new(TransportState::Uninitialized),
            engine: OnceLock::new(),
            stream: Arc::new(StreamSlot::default()),
            closed: CancellationToken::new(),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, TransportState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TransportState {
        *self.lock_state()
    }

    /// The bound engine, if connected.
    pub fn engine(&self) -> Option<&Arc<ProtocolEngine>> {
        self.engine.get()
    }

    /// Whether a standalone stream is attached.
    pub fn has_stream(&self) -> bool {
        self.stream.is_open()
    }

    /// Bind `engine` to this transport. Allowed exactly once.
    pub fn connect(&self, engine: Arc<ProtocolEngine>) -> Result<(), SessionError> {
        let mut state = self.lock_state();
        if *state != TransportState::Uninitialized {
            return Err(SessionError::AlreadyConnected);
        }
        self.engine
            .set(Arc::clone(&engine))
            .map_err(|_| SessionError::AlreadyConnected)?;
        engine.bind_notifications(self.stream.clone());
        *state = TransportState::Connected;
        Ok(())
    }

    /// End open streams and cancel in-flight work. Returns `false` if already closed.
    pub fn close(&self) -> bool {
        {
            let mut state = self.lock_state();
            if *state == TransportState::Closed {
                return false;
            }
            *state = TransportState::Closed;
        }
        self.closed.cancel();
        self.stream.close();
        true
    }

    fn live_engine(&self) -> Result<Arc<ProtocolEngine>, SessionError> {
        match self.state() {
            TransportState::Connected => self
                .engine
                .get()
                .cloned()
                .ok_or_else(|| SessionError::internal("session transport has no engine")),
            TransportState::Closed => Err(SessionError::Closed(self.session_id.clone())),
            TransportState::Uninitialized => {
                Err(SessionError::internal("session transport not connected"))
            }
        }
    }

    /// Handle a POSTed JSON-RPC message or batch.
    #[instrument(skip_all, fields(session_id = %self.session_id))]
    pub async fn handle_post(
        &self,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<Response, SessionError> {
        let engine = self.live_engine()?;
        let inbound = InboundBody::parse(&body).map_err(SessionError::Parse)?;
        if inbound.messages.is_empty() {
            return Err(SessionError::InvalidRequest("empty batch".to_string()));
        }

        let expects_response = inbound.expects_response();
        let (tx, rx) = mpsc::unbounded_channel();
        let task = AbortOnDrop(tokio::spawn(dispatch(
            engine,
            inbound.messages,
            tx,
            self.closed.clone(),
        )));

        if !expects_response {
            if let Err(e) = task.await {
                error!(session_id = %self.session_id, error = %e, "Notification handler failed");
                return Err(SessionError::internal("request handler failed"));
            }
            return Ok(StatusCode::ACCEPTED.into_response());
        }

        match ResponseMode::negotiate(headers, self.prefer_sse) {
            ResponseMode::Json => self.collect_json(task, rx, inbound.is_batch).await,
            ResponseMode::Sse => Ok(self.stream_responses(task, rx)),
        }
    }

    async fn collect_json(
        &self,
        mut task: AbortOnDrop<()>,
        mut rx: mpsc::UnboundedReceiver<JsonRpcResponse>,
        is_batch: bool,
    ) -> Result<Response, SessionError> {
        let outcome = tokio::select! {
            outcome = &mut task => outcome,
            () = self.closed.cancelled() => {
                return Err(SessionError::Closed(self.session_id.clone()));
            }
        };

        if let Err(e) = outcome {
            error!(session_id = %self.session_id, error = %e, "Request handler failed");
            return Err(SessionError::internal("request handler failed"));
        }

        let mut responses = Vec::new();
        while let Ok(response) = rx.try_recv() {
            responses.push(response);
        }

        match (is_batch, responses.pop()) {
            (false, Some(response)) => Ok(Json(response).into_response()),
            (true, Some(last)) => {
                responses.push(last);
                Ok(Json(responses).into_response())
            }
            (_, None) => Err(SessionError::Closed(self.session_id.clone())),
        }
    }

    fn stream_responses(
        &self,
        task: AbortOnDrop<()>,
        rx: mpsc::UnboundedReceiver<JsonRpcResponse>,
    ) -> Response {
        let state = ResponseStream {
            session_id: self.session_id.clone(),
            rx,
            task: Some(task),
            closed: self.closed.clone(),
        };

        let events = futures::stream::unfold(state, |mut state| async move {
            let next = tokio::select! {
                biased;
                next = state.rx.recv() => next,
                () = state.closed.cancelled() => None,
            };
            match next {
                Some(response) => Some((message_event(&response), state)),
                None => {
                    state.finish().await;
                    None
                }
            }
        });

        Sse::new(events).into_response()
    }

    /// Open the standalone server-to-client stream.
    #[instrument(skip_all, fields(session_id = %self.session_id))]
    pub fn open_stream(&self, headers: &HeaderMap) -> Result<Response, SessionError> {
        self.live_engine()?;

        let accept = headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !accepts(accept, EVENT_STREAM) {
            return Err(SessionError::NotAcceptable(EVENT_STREAM));
        }

        let rx = self.stream.open()?;
        info!("Standalone stream opened");

        let events = futures::stream::unfold(
            (rx, self.closed.clone()),
            |(mut rx, closed)| async move {
                let next = tokio::select! {
                    biased;
                    next = rx.recv() => next,
                    () = closed.cancelled() => None,
                };
                next.map(|notification| (message_event(&notification), (rx, closed)))
            },
        );

        Ok(Sse::new(events)
            .keep_alive(KeepAlive::default())
            .into_response())
    }
}

/// Run every message through the engine, sending responses as they complete.
async fn dispatch(
    engine: Arc<ProtocolEngine>,
    messages: Vec<InboundMessage>,
    out: mpsc::UnboundedSender<JsonRpcResponse>,
    closed: CancellationToken,
) {
    let work = async {
        for message in messages {
            let Some(response) = engine.handle_message(message).await else {
                continue;
            };
            if out.send(response).is_err() {
                debug!("Response receiver dropped, stopping dispatch");
                break;
            }
        }
    };

    tokio::select! {
        () = work => {}
        () = closed.cancelled() => debug!("Session closed during dispatch"),
    }
}

struct ResponseStream {
    session_id: String,
    rx: mpsc::UnboundedReceiver<JsonRpcResponse>,
    task: Option<AbortOnDrop<()>>,
    closed: CancellationToken,
}

impl ResponseStream {
    /// Reap the dispatch task. Headers are already sent, so a failure can only be logged.
    async fn finish(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        if let Err(e) = task.await {
            error!(session_id = %self.session_id, error = %e, "Request handler failed mid-stream");
        }
    }
}

fn message_event<T: serde::Serialize>(message: &T) -> Result<Event, axum::Error> {
    Event::default().event("message").json_data(message)
}
