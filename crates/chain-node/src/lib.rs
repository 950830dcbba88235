use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chain_core::{
    chain::Chain,
    sync::{ChainSnapshot, NodeRegistry},
    ChainError, Payload,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

pub mod constants;
pub mod peers;

/// One chain and one peer registry per node process. The chain lock
/// serializes appends and the reconciliation swap against each other and
/// against snapshot reads; the peer list tolerates eventual consistency
/// and has its own lock.
#[derive(Clone)]
pub struct AppState {
    pub chain: Arc<RwLock<Chain>>,
    pub peers: Arc<RwLock<NodeRegistry>>,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new() -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(constants::PEER_FETCH_TIMEOUT)
            .build()?;
        Ok(Self {
            chain: Arc::new(RwLock::new(Chain::new())),
            peers: Arc::new(RwLock::new(NodeRegistry::new())),
            http,
        })
    }
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

#[derive(Deserialize)]
struct RegisterNodes {
    nodes: Vec<String>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(Health { status: "ok" }) }))
        .route("/chain", get(get_chain))
        .route("/add_block", post(add_block))
        .route("/nodes", get(list_nodes))
        .route("/nodes/register", post(register_nodes))
        .route("/resolve", post(resolve))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn get_chain(State(state): State<AppState>) -> Json<ChainSnapshot> {
    let chain = state.chain.read().await;
    Json(ChainSnapshot::of(&chain))
}

async fn add_block(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    // The record schema is validated here so malformed submissions get a
    // 400 instead of a framework rejection.
    let payload: Payload = match serde_json::from_value(body) {
        Ok(payload) => payload,
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("missing or invalid record fields: {err}") })),
            )
        }
    };

    let mut chain = state.chain.write().await;
    let result = if matches!(payload, Payload::Identity { .. }) {
        // One identity record per id.
        chain.append_unique(payload, "id")
    } else {
        chain.append(payload)
    };

    match result {
        Ok(block) => (
            StatusCode::CREATED,
            Json(json!({
                "message": "Block added",
                "index": block.index,
                "hash": block.hash,
            })),
        ),
        Err(err @ ChainError::DuplicateRecord { .. }) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": err.to_string() })),
        ),
        // Local corruption: surfaced to the operator, appends stay refused.
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": err.to_string() })),
        ),
    }
}

async fn list_nodes(State(state): State<AppState>) -> Json<Value> {
    let peers = state.peers.read().await;
    Json(json!({ "nodes": peers.peers(), "total": peers.len() }))
}

async fn register_nodes(
    State(state): State<AppState>,
    Json(body): Json<RegisterNodes>,
) -> (StatusCode, Json<Value>) {
    if body.nodes.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "no nodes supplied" })),
        );
    }
    let mut peers = state.peers.write().await;
    for address in body.nodes {
        peers.register(address.trim_end_matches('/'));
    }
    (
        StatusCode::CREATED,
        Json(json!({ "message": "Peers registered", "total": peers.len() })),
    )
}

async fn resolve(State(state): State<AppState>) -> Json<Value> {
    let adopted = peers::run_reconciliation(&state).await;
    let length = state.chain.read().await.len();
    Json(json!({ "adopted": adopted, "length": length }))
}
