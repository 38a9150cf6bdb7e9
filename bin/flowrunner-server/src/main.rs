//! FlowRunner Server
//!
//! Binds the runtime execution core to HTTP: inbound channel webhooks, the
//! flow-authoring CRUD surface named at the engine's external boundary
//! (§6), and the Delay Scheduler running as a background task. Outbound
//! rendering, channel-specific delivery and the authoring UI are external
//! collaborators — this binary only speaks the core's contract.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use mongodb::Client as MongoClient;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use flowrunner_common::Channel;
use flowrunner_config::AppConfig;
use flowrunner_core::{Engine, InboundWebhook, LoggingRenderer};
use flowrunner_scheduler::{DelayScheduler, DelaySchedulerConfig};
use flowrunner_store::mongo::MongoStore;
use flowrunner_store::{FlowStatus, Store};

struct AppState {
    engine: Engine,
    store: Arc<dyn Store>,
    webhook_secret: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    flowrunner_common::logging::init_logging("flowrunner-server");

    let config = AppConfig::load().context("loading configuration from environment")?;
    info!(app_env = %config.app_env, host = %config.http.host, port = config.http.port, "starting flowrunner-server");

    let mongo_client = MongoClient::with_uri_str(config.mongodb.uri())
        .await
        .context("connecting to MongoDB")?;
    let db = mongo_client.database(&config.mongodb.database);
    let store: Arc<dyn Store> = Arc::new(MongoStore::new(db));

    let scheduler_engine = Arc::new(Engine::new(store.clone(), Arc::new(LoggingRenderer)));
    let scheduler = DelayScheduler::new(DelaySchedulerConfig::from(&config.scheduler), store.clone(), scheduler_engine);
    scheduler.start().await;

    if let Err(e) = PrometheusBuilder::new().install() {
        error!(error = %e, "failed to install Prometheus metrics recorder");
    }

    let state = Arc::new(AppState {
        engine: Engine::new(store.clone(), Arc::new(LoggingRenderer)),
        store,
        webhook_secret: config.webhook_secret.clone(),
    });

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/webhook/:channel", post(inbound_webhook))
        .route("/flow/list", get(list_flows))
        .route("/flow/detail/:flow_id", get(flow_detail))
        .route("/flow/status/:flow_id", post(set_flow_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("{}:{}", config.http.host, config.http.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.context("binding HTTP listener")?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    scheduler.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// --- inbound webhook -------------------------------------------------------

/// `{sender, brand_id, user_id, channel, channel_identifier,
/// channel_account_id, message_type, message_body, status}` per §6. Fields
/// this engine doesn't consume (`user_id`, `channel_identifier`, `status`)
/// are accepted and ignored rather than rejected, so a connector upgrade
/// that adds fields doesn't break intake.
#[derive(Debug, Deserialize)]
struct WebhookPayload {
    sender: String,
    brand_id: String,
    #[serde(default)]
    channel_account_id: Option<String>,
    message_type: String,
    message_body: serde_json::Value,
    #[serde(default)]
    trigger_template_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct WebhookResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

async fn inbound_webhook(
    State(state): State<Arc<AppState>>,
    Path(channel_name): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<WebhookPayload>,
) -> impl IntoResponse {
    if let Some(expected) = &state.webhook_secret {
        let presented = headers.get("x-webhook-secret").and_then(|v| v.to_str().ok());
        if presented != Some(expected.as_str()) {
            return (StatusCode::UNAUTHORIZED, Json(WebhookResponse { status: "error", detail: Some("invalid webhook secret".to_string()) }))
                .into_response();
        }
    }

    let channel = Channel::parse(&channel_name);
    let webhook = InboundWebhook {
        brand_id: payload.brand_id,
        user_identifier: payload.sender,
        channel,
        channel_account_id: payload.channel_account_id.unwrap_or_else(|| "default".to_string()),
        message_type: payload.message_type,
        payload: payload.message_body,
        trigger_template_id: payload.trigger_template_id,
    };

    match state.engine.handle_inbound_webhook(webhook).await {
        Ok(flowrunner_core::ProcessOutcome::Processed) => {
            (StatusCode::OK, Json(WebhookResponse { status: "accepted", detail: None })).into_response()
        }
        Ok(flowrunner_core::ProcessOutcome::Dropped { reason }) => {
            (StatusCode::OK, Json(WebhookResponse { status: "dropped", detail: Some(reason) })).into_response()
        }
        Err(e) => {
            error!(error = %e, "inbound webhook processing failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(WebhookResponse { status: "error", detail: Some(e.to_string()) })).into_response()
        }
    }
}

// --- flow authoring CRUD (external interface, §6) --------------------------

fn require_user_id(headers: &HeaderMap) -> std::result::Result<String, (StatusCode, Json<serde_json::Value>)> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| (StatusCode::UNAUTHORIZED, Json(serde_json::json!({ "error": "missing x-user-id header" }))))
}

async fn list_flows(State(state): State<Arc<AppState>>, headers: HeaderMap) -> impl IntoResponse {
    let user_id = match require_user_id(&headers) {
        Ok(id) => id,
        Err(resp) => return resp.into_response(),
    };
    match state.store.list_flows_by_owner(&user_id, None).await {
        Ok(flows) => Json(flows).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({ "error": e.to_string() }))).into_response(),
    }
}

#[derive(Serialize)]
struct NodeDetail {
    #[serde(flatten)]
    node: flowrunner_store::Node,
    #[serde(rename = "transactionCount")]
    transaction_count: u64,
}

#[derive(Serialize)]
struct FlowDetail {
    #[serde(flatten)]
    flow_meta: serde_json::Value,
    nodes: Vec<NodeDetail>,
}

async fn flow_detail(State(state): State<Arc<AppState>>, Path(flow_id): Path<String>) -> impl IntoResponse {
    let flow = match state.store.get_flow(&flow_id).await {
        Ok(Some(flow)) => flow,
        Ok(None) => return (StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "flow not found" }))).into_response(),
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({ "error": e.to_string() }))).into_response(),
    };

    // transactionCount is only populated once a flow has run at least one
    // event, which requires it to have left draft (§6).
    let counts = if matches!(flow.status, FlowStatus::Published | FlowStatus::Stop) {
        match state.store.transaction_counts(&flow_id).await {
            Ok(counts) => counts,
            Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({ "error": e.to_string() }))).into_response(),
        }
    } else {
        Default::default()
    };

    let mut flow_meta = serde_json::to_value(&flow).unwrap_or(serde_json::Value::Null);
    if let Some(obj) = flow_meta.as_object_mut() {
        obj.remove("nodes");
    }
    let nodes = flow
        .nodes
        .into_iter()
        .map(|node| {
            let count = *counts.get(&node.id).unwrap_or(&0);
            NodeDetail { node, transaction_count: count }
        })
        .collect();

    Json(FlowDetail { flow_meta, nodes }).into_response()
}

#[derive(Debug, Deserialize)]
struct SetStatusRequest {
    status: String,
}

async fn set_flow_status(
    State(state): State<Arc<AppState>>,
    Path(flow_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<SetStatusRequest>,
) -> impl IntoResponse {
    let user_id = match require_user_id(&headers) {
        Ok(id) => id,
        Err(resp) => return resp.into_response(),
    };

    let target = match body.status.as_str() {
        "published" => FlowStatus::Published,
        "stop" => FlowStatus::Stop,
        "draft" => {
            return (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": "transition to draft is rejected" }))).into_response();
        }
        other => {
            return (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": format!("unknown status '{other}'") }))).into_response();
        }
    };

    let flow = match state.store.get_flow(&flow_id).await {
        Ok(Some(flow)) => flow,
        Ok(None) => return (StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "flow not found" }))).into_response(),
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({ "error": e.to_string() }))).into_response(),
    };

    if flow.user_id != user_id {
        return (StatusCode::FORBIDDEN, Json(serde_json::json!({ "error": "not the flow's author" }))).into_response();
    }

    match state.store.set_flow_status(&flow_id, target).await {
        Ok(flow) => Json(flow).into_response(),
        Err(flowrunner_store::StoreError::InvalidTransition { from, to }) => {
            (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": format!("cannot transition from {from} to {to}") }))).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({ "error": e.to_string() }))).into_response(),
    }
}
