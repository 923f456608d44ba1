//! End-to-end pipeline tests against a scripted local SSE server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use deepflow_notify::{
    MemorySurface, NotificationPipeline, NotificationRecord, PermissionState,
};

const HANDSHAKE: &str = r#"{"status": "connected", "user_id": "user-1"}"#;

fn frame(event: &str, data: &str) -> String {
    format!("event: {event}\ndata: {data}\n\n")
}

fn notification_frame(id: &str, urgency: &str) -> String {
    frame(
        "notification",
        &format!(
            r#"{{"id": "{id}", "type": "task_due", "title": "Task due", "body": "X", "urgency": "{urgency}"}}"#
        ),
    )
}

/// Per-connection server behavior.
enum Script {
    /// Send the frames, then close the connection.
    SendThenClose(Vec<String>),
    /// Send the frames, then keep the connection open.
    SendThenHold(Vec<String>),
}

/// Minimal SSE server: serves one script per accepted connection, counts
/// connections.
struct SseServer {
    addr: SocketAddr,
    connections: Arc<AtomicUsize>,
}

impl SseServer {
    async fn start(scripts: Vec<Script>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        let connections = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&connections);
        tokio::spawn(async move {
            let mut scripts = scripts.into_iter();
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let script = scripts
                    .next()
                    .unwrap_or_else(|| Script::SendThenHold(Vec::new()));
                tokio::spawn(serve_connection(stream, script));
            }
        });

        Self { addr, connections }
    }

    fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

async fn serve_connection(mut stream: TcpStream, script: Script) {
    // Drain the request head before answering.
    let mut buf = [0u8; 2048];
    let _ = stream.read(&mut buf).await;

    let head = "HTTP/1.1 200 OK\r\n\
                content-type: text/event-stream\r\n\
                cache-control: no-cache\r\n\
                connection: close\r\n\r\n";
    if stream.write_all(head.as_bytes()).await.is_err() {
        return;
    }

    let (frames, hold) = match script {
        Script::SendThenClose(frames) => (frames, false),
        Script::SendThenHold(frames) => (frames, true),
    };
    for frame in frames {
        if stream.write_all(frame.as_bytes()).await.is_err() {
            return;
        }
        let _ = stream.flush().await;
    }
    if hold {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
    // Dropping the stream closes the connection.
}

async fn wait_for(what: &str, timeout: Duration, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while !condition() {
        assert!(
            Instant::now() < deadline,
            "timed out waiting for: {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

struct Harness {
    pipeline: NotificationPipeline,
    surface: Arc<MemorySurface>,
    records: Arc<parking_lot::Mutex<Vec<NotificationRecord>>>,
}

async fn harness(server: &SseServer, permission: PermissionState, reconnect: Duration) -> Harness {
    let surface = Arc::new(MemorySurface::new());
    surface.set_permission(permission);

    let records = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&records);

    let pipeline = NotificationPipeline::builder()
        .user_id("user-1")
        .backend_base(server.base_url())
        .reconnect_delay(reconnect)
        .surface(surface.clone())
        .on_record(move |record| sink.lock().push(record.clone()))
        .build()
        .await
        .expect("pipeline builds");

    Harness {
        pipeline,
        surface,
        records,
    }
}

#[tokio::test]
async fn connects_and_delivers_notifications() {
    let server = SseServer::start(vec![Script::SendThenHold(vec![
        frame("connected", HANDSHAKE),
        frame("ping", "{}"),
        notification_frame("n1", "urgent"),
    ])])
    .await;

    let h = harness(&server, PermissionState::Granted, Duration::from_secs(5)).await;
    assert!(h.pipeline.enable());

    wait_for("record delivery", Duration::from_secs(5), || {
        h.records.lock().len() == 1
    })
    .await;

    let connection = h.pipeline.connection();
    assert!(connection.connected);
    assert!(connection.last_error.is_none());
    assert_eq!(
        connection.session.map(|s| s.user_id),
        Some("user-1".to_string())
    );

    // The urgent record produced a native notification with the policy
    // defaults applied.
    let presented = h.surface.presented();
    assert_eq!(presented.len(), 1);
    let (_, spec) = &presented[0];
    assert_eq!(spec.title, "Task due");
    assert_eq!(spec.tag, "deepflow-n1");
    assert!(spec.require_interaction);
    assert!(!spec.silent);

    let records = h.records.lock();
    assert_eq!(records[0].id, "n1");
}

#[tokio::test]
async fn malformed_payload_is_dropped_without_state_change() {
    let server = SseServer::start(vec![Script::SendThenHold(vec![
        frame("connected", HANDSHAKE),
        frame("notification", "{this is not json"),
        notification_frame("n2", "normal"),
    ])])
    .await;

    let h = harness(&server, PermissionState::Granted, Duration::from_secs(5)).await;
    h.pipeline.enable();

    wait_for("good record delivery", Duration::from_secs(5), || {
        h.records.lock().len() == 1
    })
    .await;

    // Only the well-formed record came through, and the bad one neither
    // dropped the connection nor reached the callback.
    assert_eq!(h.records.lock()[0].id, "n2");
    assert!(h.pipeline.connection().connected);
    assert_eq!(server.connection_count(), 1);
    assert_eq!(h.surface.presented_count(), 1);
}

#[tokio::test]
async fn reconnects_once_after_stream_loss() {
    let delay = Duration::from_millis(500);
    let server = SseServer::start(vec![
        Script::SendThenClose(vec![frame("connected", HANDSHAKE)]),
        Script::SendThenHold(vec![frame("connected", HANDSHAKE)]),
    ])
    .await;

    let h = harness(&server, PermissionState::Granted, delay).await;
    h.pipeline.enable();

    wait_for("first connection", Duration::from_secs(5), || {
        server.connection_count() == 1
    })
    .await;

    // The handshake window may be too short to observe; the recorded loss is
    // the stable signal.
    wait_for("loss detection", Duration::from_secs(5), || {
        let state = h.pipeline.connection();
        !state.connected && state.last_error.as_deref() == Some("Connection lost")
    })
    .await;
    let lost_at = Instant::now();

    wait_for("reconnect", Duration::from_secs(5), || {
        server.connection_count() == 2
    })
    .await;
    // The reconnect happens no sooner than the configured delay. The margin
    // absorbs the polling granularity of the loss observation above.
    assert!(lost_at.elapsed() >= delay - Duration::from_millis(200));

    wait_for("reconnected state", Duration::from_secs(5), || {
        h.pipeline.connection().connected
    })
    .await;

    // Exactly one reconnect was scheduled for the one drop.
    tokio::time::sleep(delay * 3).await;
    assert_eq!(server.connection_count(), 2);
}

#[tokio::test]
async fn server_error_event_triggers_reconnect() {
    let server = SseServer::start(vec![
        Script::SendThenHold(vec![
            frame("connected", HANDSHAKE),
            frame("error", r#"{"error": "redis down"}"#),
        ]),
        Script::SendThenHold(vec![frame("connected", HANDSHAKE)]),
    ])
    .await;

    let h = harness(&server, PermissionState::Granted, Duration::from_millis(200)).await;
    h.pipeline.enable();

    // The transport is still open; the named error channel alone forces the
    // drop and the scheduled reconnect.
    wait_for("reconnect after error event", Duration::from_secs(5), || {
        server.connection_count() == 2
    })
    .await;
    wait_for("reconnected state", Duration::from_secs(5), || {
        h.pipeline.connection().connected
    })
    .await;
}

#[tokio::test]
async fn teardown_cancels_pending_reconnect() {
    let delay = Duration::from_millis(300);
    let server = SseServer::start(vec![Script::SendThenClose(vec![frame(
        "connected", HANDSHAKE,
    )])])
    .await;

    let h = harness(&server, PermissionState::Granted, delay).await;
    h.pipeline.enable();

    wait_for("loss detection", Duration::from_secs(5), || {
        server.connection_count() == 1
            && h.pipeline.connection().last_error.as_deref() == Some("Connection lost")
    })
    .await;

    // Tear down while the reconnect is pending: it must never fire.
    h.pipeline.disable();
    assert!(!h.pipeline.enabled());

    tokio::time::sleep(delay * 3).await;
    assert_eq!(server.connection_count(), 1);
}

#[tokio::test]
async fn denied_permission_still_invokes_callback() {
    let server = SseServer::start(vec![Script::SendThenHold(vec![
        frame("connected", HANDSHAKE),
        notification_frame("n1", "urgent"),
    ])])
    .await;

    let h = harness(&server, PermissionState::Denied, Duration::from_secs(5)).await;
    h.pipeline.enable();

    wait_for("record delivery", Duration::from_secs(5), || {
        h.records.lock().len() == 1
    })
    .await;

    // The callback sink is independent of presentation: no notification was
    // created, the decoded record still arrived.
    assert_eq!(h.surface.presented_count(), 0);
    assert_eq!(h.records.lock()[0].id, "n1");
}

#[tokio::test]
async fn enable_requires_a_user_id() {
    let surface = Arc::new(MemorySurface::new());
    let pipeline = NotificationPipeline::builder()
        .surface(surface)
        .build()
        .await
        .expect("pipeline builds");

    assert!(!pipeline.enable());
    assert!(!pipeline.enabled());
    assert_eq!(pipeline.connection(), Default::default());
}

#[tokio::test]
async fn enable_twice_keeps_the_existing_connection() {
    let server = SseServer::start(vec![Script::SendThenHold(vec![frame(
        "connected", HANDSHAKE,
    )])])
    .await;

    let h = harness(&server, PermissionState::Granted, Duration::from_secs(5)).await;
    assert!(h.pipeline.enable());
    wait_for("connection", Duration::from_secs(5), || {
        h.pipeline.connection().connected
    })
    .await;

    assert!(h.pipeline.enable());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.connection_count(), 1);
}
