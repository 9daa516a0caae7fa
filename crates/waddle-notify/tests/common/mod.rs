//! Test utilities for end-to-end delivery tests.
//!
//! Simulates a client's WebSocket session with a [`ChannelSink`] and a writer
//! task that records every frame it "writes".

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use waddle_notify::{
    ChannelSink, ClientId, ConnectionHandle, ConnectionId, NotificationService, NotifyConfig,
    RetryReport, WriteError,
};

/// Default timeout for test operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// A simulated connected client.
pub struct TestClient {
    pub client_id: ClientId,
    pub connection_id: ConnectionId,
    received: Arc<Mutex<Vec<String>>>,
    writer: JoinHandle<()>,
    replay: Option<JoinHandle<RetryReport>>,
}

impl TestClient {
    /// Connect `client_id` to the service and start its writer task.
    ///
    /// When `fail_writes` is set the writer reports every write as failed.
    pub fn connect(service: &NotificationService, client_id: &str, fail_writes: bool) -> Self {
        let (sink, mut outbound) = ChannelSink::channel(32);
        let handle = ConnectionHandle::new(Arc::new(sink));
        let connection_id = handle.id();
        let received = Arc::new(Mutex::new(Vec::new()));

        let frames = Arc::clone(&received);
        let writer = tokio::spawn(async move {
            while let Some(notification) = outbound.recv().await {
                if fail_writes {
                    notification.complete(Err(WriteError::transport("connection reset")));
                } else {
                    frames.lock().unwrap().push(notification.message.clone());
                    notification.complete(Ok(()));
                }
            }
        });

        let client_id = ClientId::parse(client_id).unwrap();
        let replay = service.connect(client_id.clone(), handle);

        Self {
            client_id,
            connection_id,
            received,
            writer,
            replay,
        }
    }

    /// Wait for the on-connect backlog replay, if one was started.
    pub async fn wait_for_replay(&mut self) -> Option<RetryReport> {
        let replay = self.replay.take()?;
        let report = tokio::time::timeout(DEFAULT_TIMEOUT, replay)
            .await
            .expect("replay timed out")
            .expect("replay task panicked");
        Some(report)
    }

    /// Frames written to this client so far.
    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    /// Disconnect from the service and stop the writer task.
    pub fn disconnect(self, service: &NotificationService) -> bool {
        let removed = service.disconnect(&self.client_id, self.connection_id);
        self.writer.abort();
        removed
    }
}

/// Service with on-connect replay disabled so tests control replays.
pub fn manual_retry_service() -> NotificationService {
    NotificationService::new(NotifyConfig {
        retry_on_connect: false,
        ..NotifyConfig::default()
    })
}

/// Initialize test logging once; respects `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
