//! HTTP surface: signal webhook, health, position view, Prometheus metrics.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;
use sigbot_position::{Position, PositionLedger};
use sigbot_telemetry::Metrics;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::admission::{Admission, AdmissionQueue};
use crate::error::{AppError, AppResult, SignalError};
use crate::signal::{SignalParser, SignalPayload};

/// Shared state for axum handlers.
#[derive(Clone)]
pub struct WebhookState {
    parser: Arc<SignalParser>,
    admission: Arc<AdmissionQueue>,
    ledger: Arc<PositionLedger>,
}

impl WebhookState {
    pub fn new(
        parser: Arc<SignalParser>,
        admission: Arc<AdmissionQueue>,
        ledger: Arc<PositionLedger>,
    ) -> Self {
        Self {
            parser,
            admission,
            ledger,
        }
    }
}

pub fn create_router(state: WebhookState) -> Router {
    Router::new()
        .route("/webhook", post(receive_signal))
        .route("/health", get(health))
        .route("/api/position", get(get_position))
        .route("/metrics", get(get_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` is cancelled.
pub async fn run_server(
    addr: SocketAddr,
    state: WebhookState,
    shutdown: CancellationToken,
) -> AppResult<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Webhook server listening");
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AppError::Server(e.to_string()))?;
    info!("Webhook server stopped");
    Ok(())
}

fn status_for(err: &SignalError) -> StatusCode {
    match err {
        SignalError::Unauthorized => StatusCode::UNAUTHORIZED,
        SignalError::MissingPipEntry(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SignalError::Malformed(_)
        | SignalError::UnknownAction(_)
        | SignalError::UnknownSymbol(_) => StatusCode::BAD_REQUEST,
    }
}

fn reject(err: &SignalError) -> Response {
    Metrics::signal_rejected(err.reason());
    warn!(reason = err.reason(), error = %err, "Signal rejected");
    (status_for(err), Json(json!({ "error": err.to_string() }))).into_response()
}

async fn receive_signal(
    State(state): State<WebhookState>,
    body: Result<Json<SignalPayload>, JsonRejection>,
) -> Response {
    let payload = match body {
        Ok(Json(payload)) => payload,
        Err(rejection) => return reject(&SignalError::Malformed(rejection.body_text())),
    };

    let command = match state.parser.parse(&payload) {
        Ok(command) => command,
        Err(e) => return reject(&e),
    };
    Metrics::signal_received(&payload.action.to_ascii_uppercase());

    let status = match state.admission.submit(command) {
        Admission::Dispatched => "dispatched",
        Admission::Queued { ahead } => {
            info!(ahead, "Signal queued behind running command");
            "queued"
        }
    };
    (StatusCode::ACCEPTED, Json(json!({ "status": status }))).into_response()
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn get_position(State(state): State<WebhookState>) -> Json<Option<Position>> {
    Json(state.ledger.current())
}

async fn get_metrics() -> Response {
    match Metrics::render() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use rust_decimal_macros::dec;
    use sigbot_core::{CommandAction, Side, StrategyCommand, Symbol};
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    use crate::config::{PipEntry, RiskPolicyConfig};

    fn state(
        policy: RiskPolicyConfig,
        pips: &[PipEntry],
    ) -> (WebhookState, mpsc::UnboundedReceiver<StrategyCommand>) {
        let (admission, rx) = AdmissionQueue::new();
        let parser = SignalParser::new("secret", [Symbol::new("BTCUSDT")], policy, pips);
        (
            WebhookState::new(
                Arc::new(parser),
                Arc::new(admission),
                Arc::new(PositionLedger::new()),
            ),
            rx,
        )
    }

    fn post_signal(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/webhook")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_signal_dispatched_then_queued() {
        let (state, mut rx) = state(RiskPolicyConfig::default(), &[]);
        let router = create_router(state);
        let body = r#"{"action":"BUY","currency":"BTCUSDT","key":"secret"}"#;

        let resp = router.clone().oneshot(post_signal(body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert_eq!(json_body(resp).await["status"], "dispatched");

        let resp = router.oneshot(post_signal(body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert_eq!(json_body(resp).await["status"], "queued");

        let cmd = rx.try_recv().unwrap();
        assert_eq!(cmd.action, CommandAction::Open(Side::Long));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_wrong_key_consumes_no_admission() {
        let (state, mut rx) = state(RiskPolicyConfig::default(), &[]);
        let admission = state.admission.clone();
        let resp = create_router(state)
            .oneshot(post_signal(
                r#"{"action":"BUY","currency":"BTCUSDT","key":"guess"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(rx.try_recv().is_err());
        assert!(!admission.is_busy());
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_are_bad_request() {
        let (state, _rx) = state(RiskPolicyConfig::default(), &[]);
        let router = create_router(state);

        let resp = router.clone().oneshot(post_signal("{not json")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = router
            .clone()
            .oneshot(post_signal(
                r#"{"action":"BUY","currency":"DOGEUSDT","key":"secret"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = router
            .oneshot(post_signal(
                r#"{"action":"HOLD","currency":"BTCUSDT","key":"secret"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_pip_entry_is_unprocessable() {
        let policy = RiskPolicyConfig::Pips {
            take_pips: dec!(20),
            loss_pips: dec!(10),
        };
        let (state, _rx) = state(policy, &[]);
        let resp = create_router(state)
            .oneshot(post_signal(
                r#"{"action":"SELL","currency":"BTCUSDT","key":"secret"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_health_and_empty_position() {
        let (state, _rx) = state(RiskPolicyConfig::default(), &[]);
        let router = create_router(state);

        let resp = router
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["status"], "ok");

        let resp = router
            .oneshot(Request::get("/api/position").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(json_body(resp).await.is_null());
    }
}
