use rct_merkle_forest::{
    api,
    config,
    forest::MerkleForest,
    store,
    telemetry,
};
use tracing::info;

#[tokio::main]
async fn main() {
    let cfg = config::get().expect("failed to read configuration");
    telemetry::init(&cfg.log).expect("failed to set up telemetry");
    info!(
        config = serde_json::to_string(&cfg).expect("serializing config to json cannot fail"),
        "starting rct-merkle-forestd"
    );

    let loaded = store::load(&cfg.db_path, &cfg.data_dir, cfg.pending_blocks)
        .expect("failed to load output records");
    info!(
        pending_blocks = loaded.pending.len(),
        "loaded output records, building initial forest"
    );

    let forest =
        MerkleForest::build(loaded.initial_records).expect("failed to build the initial forest");
    info!(
        top_root_idx = forest.top_root().1,
        "initial forest built, starting listener"
    );

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", cfg.port))
        .await
        .expect("failed to bind the listening socket");
    let app = api::router(forest, loaded.pending);
    axum::serve(listener, app)
        .await
        .expect("http server exited unexpectedly");
}
