//! The JSON-over-HTTP surface, backed by one shared, lock-guarded
//! application state.
//!
//! Modeled on `astria-sequencer-relayer`'s `api.rs`: a small `AppState`
//! extracted into handlers via axum's `State`, handlers returning plain
//! `Json` bodies. Read-only endpoints take a read guard; `/update` takes a
//! write guard for its entire body, so a reader can never observe the old
//! top root removed from the forest before the new one is installed.

use std::sync::Arc;

use axum::{
    extract::State,
    routing::{
        get,
        post,
    },
    Json,
    Router,
};
use serde::Deserialize;
use serde_json::{
    json,
    Value,
};
use tokio::sync::RwLock;

use crate::{
    forest::{
        MerkleForest,
        OutputFound,
    },
    imt::{
        ChildrenView,
        Step,
    },
    proof::HierarchicalProof,
    store::PendingBuffer,
};

struct ServerState {
    forest: MerkleForest,
    pending: PendingBuffer,
}

#[derive(Clone)]
struct AppState {
    inner: Arc<RwLock<ServerState>>,
}

/// Builds the router over a forest already built from the initial batch and
/// a buffer of whatever blocks were held back for `/update`.
#[must_use]
pub fn router(forest: MerkleForest, pending: PendingBuffer) -> Router {
    let state = AppState {
        inner: Arc::new(RwLock::new(ServerState { forest, pending })),
    };
    Router::new()
        .route("/getroot", get(get_root))
        .route("/getout", get(get_out))
        .route("/getouts", get(get_outs))
        .route("/getchildren", get(get_children))
        .route("/getnumleaves", get(get_num_leaves))
        .route("/update", post(post_update))
        .route("/healthz", get(get_healthz))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct IdxRequest {
    idx: i64,
}

#[derive(Debug, Deserialize)]
struct IdxListRequest {
    idx: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct ChildrenRequest {
    root: Option<String>,
    path: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RootHexRequest {
    root: String,
}

async fn get_root(State(state): State<AppState>) -> Json<Value> {
    let guard = state.inner.read().await;
    Json(root_json(guard.forest.top_root()))
}

async fn get_out(State(state): State<AppState>, Json(req): Json<IdxRequest>) -> Json<Value> {
    let guard = state.inner.read().await;
    match guard.forest.query(req.idx) {
        Ok((found, proof)) => {
            tracing::debug!(idx = req.idx, "served /getout");
            Json(found_json(&found, &proof))
        }
        Err(err) => {
            tracing::debug!(idx = req.idx, %err, "query out of range on /getout");
            Json(failure())
        }
    }
}

async fn get_outs(State(state): State<AppState>, Json(req): Json<IdxListRequest>) -> Json<Value> {
    let guard = state.inner.read().await;
    let mut results = Vec::with_capacity(req.idx.len());
    for q in req.idx {
        match guard.forest.query(q) {
            Ok((found, proof)) => results.push(found_json(&found, &proof)),
            Err(_) => return Json(failure()),
        }
    }
    Json(json!({ "results": results }))
}

async fn get_children(State(state): State<AppState>, Json(req): Json<ChildrenRequest>) -> Json<Value> {
    let guard = state.inner.read().await;
    let root_hex = req
        .root
        .unwrap_or_else(|| hex::encode(guard.forest.top_root().0));
    let path: Vec<Step> = req
        .path
        .iter()
        .filter_map(|step| match step.as_str() {
            "l" => Some(Step::Left),
            "r" => Some(Step::Right),
            _ => None,
        })
        .collect();
    match guard.forest.children_at(&root_hex, &path) {
        Ok(view) => Json(children_json(&view)),
        Err(_) => Json(failure()),
    }
}

async fn get_num_leaves(State(state): State<AppState>, Json(req): Json<RootHexRequest>) -> Json<Value> {
    let guard = state.inner.read().await;
    match guard.forest.num_leaves(&req.root) {
        Ok(n) => Json(json!({ "data": n })),
        Err(_) => Json(failure()),
    }
}

async fn post_update(State(state): State<AppState>) -> Json<Value> {
    let mut guard = state.inner.write().await;
    let Some(block) = guard.pending.pop_front() else {
        return Json(failure());
    };
    let new_root = guard
        .forest
        .append_block(block)
        .expect("a block popped from the pending buffer is never empty");
    tracing::info!(idx = new_root.1, "applied incremental update");
    Json(root_json(new_root))
}

async fn get_healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn root_json(root: (crate::hash::Digest, u64)) -> Value {
    json!({ "root": [hex::encode(root.0), root.1] })
}

fn chain_json(chain: &crate::proof::ProofChain) -> Value {
    Value::Array(
        chain
            .as_slice()
            .iter()
            .map(|link| json!([[hex::encode(link.digest), link.idx], link.tag.as_str()]))
            .collect(),
    )
}

fn proof_json(proof: &HierarchicalProof) -> Value {
    json!([
        chain_json(&proof.out_proof),
        chain_json(&proof.tx_proof),
        chain_json(&proof.blk_proof),
    ])
}

fn found_json(found: &OutputFound, proof: &HierarchicalProof) -> Value {
    json!({
        "found": [hex::encode(&found.outkey), found.idx],
        "proof": proof_json(proof),
    })
}

fn children_json(view: &ChildrenView) -> Value {
    let (left_hash, left_data) = side_json(&view.left);
    let (right_hash, right_data) = side_json(&view.right);
    json!({ "data": [left_hash, right_hash, left_data, right_data] })
}

fn side_json(side: &Option<(crate::hash::Digest, Option<Vec<u8>>)>) -> (Option<String>, Option<String>) {
    match side {
        Some((digest, data)) => (Some(hex::encode(digest)), data.as_ref().map(hex::encode)),
        None => (None, None),
    }
}

fn failure() -> Value {
    json!({ "Failure": 0 })
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{
            Method,
            Request,
            StatusCode,
        },
    };
    use serde_json::Value;
    use tower::ServiceExt as _;

    use super::*;
    use crate::forest::OutputRecord;

    fn record(block: &str, tx: &str, outkey: &str, idx: u64) -> OutputRecord {
        OutputRecord {
            block_hash: block.to_string(),
            tx_hash: tx.to_string(),
            outkey: outkey.as_bytes().to_vec(),
            idx,
        }
    }

    fn test_router() -> Router {
        let forest = MerkleForest::build(vec![
            record("blk0", "tx0", "out0", 0),
            record("blk0", "tx0", "out1", 1),
        ])
        .expect("builds");
        let pending = PendingBuffer::from_blocks(vec![vec![record("blk1", "tx1", "out2", 2)]]);
        router(forest, pending)
    }

    async fn get_json(app: Router, method: Method, uri: &str, body: Value) -> Value {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .expect("request builds"),
            )
            .await
            .expect("request dispatches");
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body reads");
        serde_json::from_slice(&bytes).expect("body is json")
    }

    #[tokio::test]
    async fn getroot_reports_current_top_root() {
        let body = get_json(test_router(), Method::GET, "/getroot", json!({})).await;
        assert_eq!(body["root"][1], 1);
    }

    #[tokio::test]
    async fn getout_returns_failure_when_out_of_range() {
        let body = get_json(test_router(), Method::GET, "/getout", json!({ "idx": 99 })).await;
        assert_eq!(body, json!({ "Failure": 0 }));
    }

    #[tokio::test]
    async fn getout_finds_requested_index() {
        let body = get_json(test_router(), Method::GET, "/getout", json!({ "idx": 0 })).await;
        assert_eq!(body["found"][1], 0);
        assert!(body["proof"].is_array());
    }

    #[tokio::test]
    async fn update_drains_exactly_one_block_then_fails() {
        let app = test_router();
        let first = get_json(app.clone(), Method::POST, "/update", json!({})).await;
        assert_eq!(first["root"][1], 2, "newly appended output idx 2 becomes the top root idx");

        let second = get_json(app, Method::POST, "/update", json!({})).await;
        assert_eq!(second, json!({ "Failure": 0 }));
    }

    #[tokio::test]
    async fn healthz_is_always_ok() {
        let body = get_json(test_router(), Method::GET, "/healthz", json!({})).await;
        assert_eq!(body, json!({ "status": "ok" }));
    }
}
