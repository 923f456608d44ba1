// Stream connector: supervises the long-lived notification event stream
// One connection at a time, fixed-delay reconnect, watch-channel teardown

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use parking_lot::RwLock;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use url::Url;
use uuid::Uuid;

use crate::components::{
    BoxFuture, ConnectionState, NotificationRecord, NotifyError, NotifyResult, StreamSession,
    decode_handshake, decode_record,
};

mod sse;

use sse::{SseEvent, SseParser};

/// Fixed delay before the single scheduled reconnect attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Error reason recorded when the transport drops.
pub const CONNECTION_LOST: &str = "Connection lost";

const DEFAULT_BACKEND_BASE: &str = "http://localhost:8000";

/// Where and how the connector reaches the notification stream.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub backend_base: Url,
    /// Delay between losing the transport and the one scheduled reconnect.
    /// Fixed rate, no backoff, no retry cap.
    pub reconnect_delay: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            backend_base: Url::parse(DEFAULT_BACKEND_BASE).expect("default backend base is valid"),
            reconnect_delay: RECONNECT_DELAY,
        }
    }
}

impl StreamConfig {
    pub fn with_backend_base(mut self, base: Url) -> Self {
        self.backend_base = base;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Per-user stream endpoint under the backend base.
    pub fn stream_endpoint(&self, user_id: &str) -> NotifyResult<Url> {
        let mut endpoint = self.backend_base.clone();
        {
            let mut segments = endpoint.path_segments_mut().map_err(|_| NotifyError::Endpoint {
                message: format!("backend base `{}` cannot carry a path", self.backend_base),
            })?;
            segments
                .pop_if_empty()
                .extend(["api", "v1", "notifications", "stream", user_id]);
        }
        Ok(endpoint)
    }
}

/// Receives each successfully decoded record, in stream order.
///
/// Delivery is awaited inline on the connector task, so `connected` always
/// precedes any record of the same connection and records never reorder.
pub trait RecordSink: Send + Sync {
    fn deliver(&self, record: NotificationRecord) -> BoxFuture<'_, ()>;
}

/// Supervises one subscription's event-stream connection.
///
/// While alive it keeps at most one connection open, replacing a lost one
/// after the configured fixed delay, indefinitely. Dropping the connector
/// (or calling [`StreamConnector::shutdown`]) closes the connection
/// immediately and cancels any pending reconnect.
pub struct StreamConnector {
    state: Arc<RwLock<ConnectionState>>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl StreamConnector {
    /// Spawn the supervision task for `user_id`.
    ///
    /// The identifier must be non-empty; activation without a user is a
    /// configuration error surfaced to the caller rather than a silent idle
    /// connector.
    pub fn spawn(
        config: StreamConfig,
        user_id: impl Into<String>,
        sink: Arc<dyn RecordSink>,
    ) -> NotifyResult<Self> {
        let user_id = user_id.into();
        if user_id.is_empty() {
            return Err(NotifyError::Endpoint {
                message: "user id must not be empty".to_string(),
            });
        }
        let endpoint = config.stream_endpoint(&user_id)?;

        let state = Arc::new(RwLock::new(ConnectionState::default()));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(supervise(
            endpoint,
            config.reconnect_delay,
            Arc::clone(&state),
            sink,
            shutdown_rx,
        ));

        Ok(Self {
            state,
            shutdown,
            task,
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.state.read().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.read().connected
    }

    /// Tear down: close the live connection and cancel a pending reconnect.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        self.task.abort();
        self.state.write().mark_disconnected(None);
    }
}

impl Drop for StreamConnector {
    fn drop(&mut self) {
        self.shutdown();
    }
}

enum StreamEnd {
    Shutdown,
    Lost(String),
}

async fn supervise(
    endpoint: Url,
    reconnect_delay: Duration,
    state: Arc<RwLock<ConnectionState>>,
    sink: Arc<dyn RecordSink>,
    mut shutdown: watch::Receiver<bool>,
) {
    let client = reqwest::Client::new();

    loop {
        if *shutdown.borrow() {
            break;
        }

        let connection_id = Uuid::new_v4();
        match open_stream(&client, &endpoint).await {
            Ok(response) => {
                debug!(connection = %connection_id, endpoint = %endpoint, "event stream opened");
                match consume(response, &state, sink.as_ref(), &mut shutdown).await {
                    StreamEnd::Shutdown => break,
                    StreamEnd::Lost(detail) => {
                        warn!(connection = %connection_id, %detail, "event stream lost");
                        state
                            .write()
                            .mark_disconnected(Some(CONNECTION_LOST.to_string()));
                    }
                }
            }
            Err(error) => {
                warn!(connection = %connection_id, %error, "failed to open event stream");
                state
                    .write()
                    .mark_disconnected(Some(CONNECTION_LOST.to_string()));
            }
        }

        // Exactly one reconnect is scheduled per drop; teardown cancels it.
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(reconnect_delay) => {}
        }
    }

    state.write().mark_disconnected(None);
}

async fn open_stream(client: &reqwest::Client, endpoint: &Url) -> NotifyResult<reqwest::Response> {
    let response = client
        .get(endpoint.clone())
        .header(ACCEPT, "text/event-stream")
        .send()
        .await?
        .error_for_status()?;
    Ok(response)
}

async fn consume(
    response: reqwest::Response,
    state: &Arc<RwLock<ConnectionState>>,
    sink: &dyn RecordSink,
    shutdown: &mut watch::Receiver<bool>,
) -> StreamEnd {
    let mut chunks = response.bytes_stream();
    let mut parser = SseParser::new();

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => return StreamEnd::Shutdown,
            chunk = chunks.next() => match chunk {
                Some(Ok(bytes)) => {
                    for event in parser.feed(&bytes) {
                        if let Some(end) = dispatch(event, state, sink).await {
                            return end;
                        }
                    }
                }
                Some(Err(error)) => return StreamEnd::Lost(error.to_string()),
                None => return StreamEnd::Lost("stream closed by server".to_string()),
            }
        }
    }
}

async fn dispatch(
    event: SseEvent,
    state: &Arc<RwLock<ConnectionState>>,
    sink: &dyn RecordSink,
) -> Option<StreamEnd> {
    match event.name.as_str() {
        "connected" => {
            let session = match decode_handshake(&event.data) {
                Ok(handshake) => {
                    info!(
                        user_id = %handshake.user_id,
                        status = %handshake.status,
                        "event stream connected"
                    );
                    Some(StreamSession {
                        user_id: handshake.user_id,
                        connected_at: Utc::now(),
                    })
                }
                Err(error) => {
                    warn!(%error, "unreadable handshake payload");
                    None
                }
            };
            state.write().mark_connected(session);
            None
        }
        "notification" => {
            match decode_record(&event.data) {
                Ok(record) => {
                    debug!(id = %record.id, urgency = ?record.urgency, "notification received");
                    sink.deliver(record).await;
                }
                // A single bad message must not bring down the stream.
                Err(error) => warn!(%error, "dropping malformed notification payload"),
            }
            None
        }
        "ping" => {
            trace!("keepalive");
            None
        }
        "error" => Some(StreamEnd::Lost(server_error_detail(&event.data))),
        other => {
            debug!(channel = %other, "ignoring unknown stream event");
            None
        }
    }
}

fn server_error_detail(payload: &str) -> String {
    #[derive(Deserialize)]
    struct ServerError {
        error: String,
    }
    match serde_json::from_str::<ServerError>(payload) {
        Ok(detail) => detail.error,
        Err(_) => "server signalled an error".to_string(),
    }
}
