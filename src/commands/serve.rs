use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use crawlbot_core::{config::AppConfig, Clock, SearchIndex, SearchMode, SearchRecord, SystemClock};
use crawlbot_indexclient::HttpSearchIndex;
use crawlbot_storage::Storage;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

struct ServeState {
    storage: Storage,
    index: HttpSearchIndex,
    clock: SystemClock,
}

#[derive(Deserialize)]
struct SearchParams {
    query: String,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    size: Option<u32>,
}

pub async fn run(config: AppConfig, bind: String) -> Result<()> {
    let storage = Storage::connect(&config.docstore.url).await?;
    storage.run_migrations().await?;
    let index = HttpSearchIndex::new(&config.index.url);
    let state = Arc::new(ServeState {
        storage,
        index,
        clock: SystemClock,
    });

    let app = Router::new()
        .route("/api/search", get(search_handler))
        .route("/api/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!(%bind, "search surface listening");
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn healthz_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn metrics_handler(State(state): State<Arc<ServeState>>) -> Json<Value> {
    let indexed_pages = state.index.count().await.unwrap_or(0);
    Json(json!({ "indexed_pages": indexed_pages }))
}

async fn search_handler(
    State(state): State<Arc<ServeState>>,
    Query(params): Query<SearchParams>,
) -> (StatusCode, Json<Value>) {
    let mode_str = params.mode.unwrap_or_else(|| "match".to_string());
    let mode = match SearchMode::from_str(&mode_str) {
        Ok(m) => m,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": e.to_string() })),
            )
        }
    };
    let size = params.size.unwrap_or(10);

    let results = match state.index.search(mode, &params.query, size).await {
        Ok(docs) => docs,
        Err(e) => {
            warn!(error = %e, "search against index failed");
            return (StatusCode::NOT_FOUND, Json(json!([])));
        }
    };

    let record = SearchRecord {
        keywords: params.query.clone(),
        mode: mode_str,
        size,
        results: results.iter().map(|d| d.url.clone()).collect(),
        timestamp: state.clock.now(),
    };
    if let Err(e) = state.storage.insert_search_record(&record).await {
        warn!(error = %e, "failed to record search history");
    }

    let body: Vec<Value> = results
        .into_iter()
        .map(|d| json!({ "url": d.url, "text": d.text }))
        .collect();
    (StatusCode::OK, Json(Value::Array(body)))
}
