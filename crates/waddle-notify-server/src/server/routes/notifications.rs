//! Notification submission, backlog inspection and manual retry routes.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use waddle_notify::{
    ClientId, DroppedMessage, PendingMessage, RetryReport, RetryStatus, SubmitOutcome,
};

use super::{notify_error_to_response, ErrorResponse};
use crate::server::AppState;

/// Create the notifications router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/notifications", post(submit_notification_handler))
        .route("/api/v1/pending", get(list_pending_handler))
        .route("/api/v1/pending/:client_id", get(get_pending_handler))
        .route("/api/v1/retry", post(retry_all_handler))
        .route("/api/v1/retry/:client_id", post(retry_client_handler))
        .with_state(state)
}

// === Request/Response Types ===

/// Request body for submitting a notification
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub client_id: Option<String>,
    pub message: Option<String>,
}

/// Every client's backlog
#[derive(Debug, Serialize)]
pub struct PendingListResponse {
    pub clients: BTreeMap<ClientId, Vec<PendingMessage>>,
    pub total: usize,
}

/// One client's backlog
#[derive(Debug, Serialize)]
pub struct ClientPendingResponse {
    pub client_id: ClientId,
    pub messages: Vec<PendingMessage>,
    pub total: usize,
}

/// Result of replaying one client's backlog
#[derive(Debug, Serialize)]
pub struct RetryResponse {
    pub client_id: ClientId,
    pub delivered: usize,
    pub dropped: Vec<DroppedMessage>,
    pub pending: usize,
    pub status: RetryStatus,
}

impl From<RetryReport> for RetryResponse {
    fn from(report: RetryReport) -> Self {
        let status = report.status();
        Self {
            client_id: report.client_id,
            delivered: report.delivered,
            dropped: report.dropped,
            pending: report.pending,
            status,
        }
    }
}

/// Result of replaying every backlog
#[derive(Debug, Serialize)]
pub struct RetryAllResponse {
    pub clients: Vec<RetryResponse>,
    pub delivered: usize,
    pub dropped: usize,
    pub total_pending: usize,
}

fn parse_path_client_id(raw: &str) -> Result<ClientId, Response> {
    ClientId::parse(raw).map_err(|e| notify_error_to_response(e).into_response())
}

// === Handlers ===

/// POST /api/v1/notifications
///
/// Deliver a notification now, or buffer it until the client is reachable.
#[instrument(skip(state, payload))]
pub async fn submit_notification_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            debug!(error = %rejection.body_text(), "Rejected malformed notification request");
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("invalid_input", &rejection.body_text())),
            )
                .into_response();
        }
    };

    let client_id = request.client_id.unwrap_or_default();
    let message = request.message.unwrap_or_default();

    match state.service.submit(&client_id, &message).await {
        Ok(outcome) => {
            let status = match &outcome {
                SubmitOutcome::Delivered { .. } => StatusCode::OK,
                SubmitOutcome::Queued { .. } => StatusCode::ACCEPTED,
                SubmitOutcome::Failed { .. } => StatusCode::BAD_GATEWAY,
            };
            (status, Json(outcome)).into_response()
        }
        Err(e) => {
            warn!(error = %e, "Rejected notification submission");
            notify_error_to_response(e).into_response()
        }
    }
}

/// GET /api/v1/pending
///
/// Snapshot of every client's backlog.
pub async fn list_pending_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let clients = state.service.pending_all();
    let total = clients.values().map(Vec::len).sum();

    (StatusCode::OK, Json(PendingListResponse { clients, total }))
}

/// GET /api/v1/pending/:client_id
///
/// Snapshot of one client's backlog, oldest first.
pub async fn get_pending_handler(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
) -> Response {
    let client_id = match parse_path_client_id(&client_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    let messages = state.service.pending_for(&client_id);
    let total = messages.len();

    (
        StatusCode::OK,
        Json(ClientPendingResponse {
            client_id,
            messages,
            total,
        }),
    )
        .into_response()
}

/// POST /api/v1/retry
///
/// Replay every backlog now.
#[instrument(skip(state))]
pub async fn retry_all_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let report = state.service.retry_all().await;
    let delivered = report.delivered();
    let dropped = report.dropped();

    (
        StatusCode::OK,
        Json(RetryAllResponse {
            clients: report.clients.into_iter().map(RetryResponse::from).collect(),
            delivered,
            dropped,
            total_pending: report.total_pending,
        }),
    )
}

/// POST /api/v1/retry/:client_id
///
/// Replay one client's backlog now. A client with no backlog reports
/// `nothing_to_do`.
#[instrument(skip(state))]
pub async fn retry_client_handler(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
) -> Response {
    let client_id = match parse_path_client_id(&client_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    let report = state.service.retry_client(&client_id).await;
    (StatusCode::OK, Json(RetryResponse::from(report))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use waddle_notify::{ChannelSink, ConnectionHandle};

    fn create_test_state() -> Arc<AppState> {
        let mut config = ServerConfig::for_tests();
        config.retry_on_connect = false;
        Arc::new(AppState::new(config))
    }

    /// Connect `client_id` with a writer that acknowledges every frame.
    fn connect_client(state: &AppState, client_id: &str) -> Arc<std::sync::Mutex<Vec<String>>> {
        let (sink, mut outbound) = ChannelSink::channel(16);
        let received = Arc::new(std::sync::Mutex::new(Vec::new()));
        let frames = Arc::clone(&received);
        tokio::spawn(async move {
            while let Some(notification) = outbound.recv().await {
                frames.lock().unwrap().push(notification.message.clone());
                notification.complete(Ok(()));
            }
        });
        state.service.connect(
            ClientId::parse(client_id).unwrap(),
            ConnectionHandle::new(Arc::new(sink)),
        );
        received
    }

    async fn send(
        state: Arc<AppState>,
        method: Method,
        uri: &str,
        body: Option<&str>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(body) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };

        let response = router(state)
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_submit_to_connected_client_returns_200() {
        let state = create_test_state();
        let received = connect_client(&state, "client1");

        let (status, json) = send(
            state,
            Method::POST,
            "/api/v1/notifications",
            Some(r#"{"client_id":"client1","message":"hello"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "delivered");
        assert_eq!(json["pending"], 0);
        assert_eq!(*received.lock().unwrap(), vec!["hello"]);
    }

    #[tokio::test]
    async fn test_submit_to_offline_client_returns_202() {
        let state = create_test_state();

        let (status, json) = send(
            Arc::clone(&state),
            Method::POST,
            "/api/v1/notifications",
            Some(r#"{"client_id":"client2","message":"hi"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(json["status"], "queued");
        assert_eq!(json["pending"], 1);
        assert_eq!(state.service.total_pending(), 1);
    }

    #[tokio::test]
    async fn test_submit_past_cap_reports_evicted_id() {
        let mut config = ServerConfig::for_tests();
        config.retry_on_connect = false;
        config.max_pending_per_client = Some(1);
        let state = Arc::new(AppState::new(config));

        let (_, first) = send(
            Arc::clone(&state),
            Method::POST,
            "/api/v1/notifications",
            Some(r#"{"client_id":"client2","message":"first"}"#),
        )
        .await;
        assert!(first.get("evicted").is_none());

        let (status, json) = send(
            Arc::clone(&state),
            Method::POST,
            "/api/v1/notifications",
            Some(r#"{"client_id":"client2","message":"second"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(json["status"], "queued");
        assert_eq!(json["pending"], 1);
        assert!(json["evicted"].is_u64());
        let left = state.service.pending_for(&ClientId::parse("client2").unwrap());
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].message, "second");
        assert_ne!(json["evicted"].as_u64(), Some(left[0].id));
    }

    #[tokio::test]
    async fn test_submit_write_failure_returns_502() {
        let state = create_test_state();
        let (sink, outbound) = ChannelSink::channel(1);
        drop(outbound);
        state.service.connect(
            ClientId::parse("client1").unwrap(),
            ConnectionHandle::new(Arc::new(sink)),
        );

        let (status, json) = send(
            Arc::clone(&state),
            Method::POST,
            "/api/v1/notifications",
            Some(r#"{"client_id":"client1","message":"hello"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "connection closed");
        assert_eq!(state.service.total_pending(), 0);
    }

    #[tokio::test]
    async fn test_submit_missing_fields_returns_400() {
        let state = create_test_state();

        let (status, json) = send(
            Arc::clone(&state),
            Method::POST,
            "/api/v1/notifications",
            Some(r#"{"message":"hello"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "invalid_input");
        assert_eq!(json["message"], "client_id is required");

        let (status, json) = send(
            Arc::clone(&state),
            Method::POST,
            "/api/v1/notifications",
            Some(r#"{"client_id":"client1","message":"  "}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["message"], "message is required");
        assert_eq!(state.service.total_pending(), 0);
    }

    #[tokio::test]
    async fn test_submit_malformed_json_returns_400() {
        let state = create_test_state();

        let (status, json) = send(
            state,
            Method::POST,
            "/api/v1/notifications",
            Some("{not json"),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "invalid_input");
    }

    #[tokio::test]
    async fn test_list_pending() {
        let state = create_test_state();
        state.service.submit("client2", "a").await.unwrap();
        state.service.submit("client2", "b").await.unwrap();
        state.service.submit("client3", "c").await.unwrap();

        let (status, json) = send(state, Method::GET, "/api/v1/pending", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total"], 3);
        assert_eq!(json["clients"]["client2"].as_array().unwrap().len(), 2);
        assert_eq!(json["clients"]["client2"][0]["message"], "a");
        assert_eq!(json["clients"]["client3"][0]["client_id"], "client3");
    }

    #[tokio::test]
    async fn test_get_pending_for_client() {
        let state = create_test_state();
        state.service.submit("client2", "hi").await.unwrap();

        let (status, json) = send(state, Method::GET, "/api/v1/pending/client2", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["client_id"], "client2");
        assert_eq!(json["total"], 1);
        assert_eq!(json["messages"][0]["message"], "hi");
        assert!(json["messages"][0]["enqueued_at"].is_string());
    }

    #[tokio::test]
    async fn test_get_pending_unknown_client_is_empty() {
        let state = create_test_state();

        let (status, json) = send(state, Method::GET, "/api/v1/pending/nobody", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total"], 0);
        assert_eq!(json["messages"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_retry_client_offline_keeps_backlog() {
        let state = create_test_state();
        state.service.submit("client2", "hi").await.unwrap();

        let (status, json) = send(state, Method::POST, "/api/v1/retry/client2", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "pending");
        assert_eq!(json["delivered"], 0);
        assert_eq!(json["pending"], 1);
    }

    #[tokio::test]
    async fn test_retry_client_after_connect_drains() {
        let state = create_test_state();
        state.service.submit("client2", "hi").await.unwrap();
        let received = connect_client(&state, "client2");

        let (status, json) =
            send(Arc::clone(&state), Method::POST, "/api/v1/retry/client2", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "drained");
        assert_eq!(json["delivered"], 1);
        assert_eq!(json["pending"], 0);
        assert_eq!(*received.lock().unwrap(), vec!["hi"]);
    }

    #[tokio::test]
    async fn test_retry_client_without_backlog_is_nothing_to_do() {
        let state = create_test_state();

        let (status, json) = send(state, Method::POST, "/api/v1/retry/idle", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "nothing_to_do");
        assert_eq!(json["client_id"], "idle");
    }

    #[tokio::test]
    async fn test_retry_all() {
        let state = create_test_state();
        state.service.submit("online", "a").await.unwrap();
        state.service.submit("offline", "b").await.unwrap();
        connect_client(&state, "online");

        let (status, json) = send(state, Method::POST, "/api/v1/retry", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["delivered"], 1);
        assert_eq!(json["total_pending"], 1);
        assert_eq!(json["clients"].as_array().unwrap().len(), 2);
    }
}
