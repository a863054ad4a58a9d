//! HTTP surface over the [`Catalog`](candela::Catalog).

use std::path::PathBuf;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use candela::{CandelaError, Timeframe};
use serde_json::{Value, json};
use tower::ServiceExt;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::state::AppState;

/// Assemble the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/series", get(list_series))
        .route("/series/:base/:quote/:tf", get(series_file))
        .route("/data/:file", get(data_file))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Status plus a link for every published file.
async fn index(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let files: serde_json::Map<String, Value> = state
        .catalog
        .list()
        .await?
        .into_iter()
        .filter(|e| e.present)
        .map(|e| {
            let link = format!("/data/{}", e.file_name);
            (e.file_name, Value::String(link))
        })
        .collect();
    Ok(Json(json!({ "status": "running", "files": files })))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let last_pass = state.latest_report().map(|r| {
        let failed: Vec<&str> = r.failures().map(|s| s.symbol.as_str()).collect();
        json!({
            "target_end_ms": r.target_end_ms,
            "symbols": r.symbols.len(),
            "rows_written": r.rows_written(),
            "failed": failed,
        })
    });
    Json(json!({
        "status": "ok",
        "synchronizer": state.reports.is_some(),
        "last_pass": last_pass,
    }))
}

async fn list_series(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<candela::CatalogEntry>>, ApiError> {
    Ok(Json(state.catalog.list().await?))
}

/// `/series/{base}/{quote}/{tf}`: the stored file, or CSV resampled from the base
/// series when no file exists for a coarser timeframe.
async fn series_file(
    State(state): State<Arc<AppState>>,
    Path((base, quote, tf)): Path<(String, String, String)>,
    req: Request,
) -> Result<Response, ApiError> {
    let timeframe: Timeframe = tf.parse()?;
    let symbol = format!("{base}/{quote}");
    let catalog = &state.catalog;

    match catalog.open(&symbol, timeframe) {
        Ok(path) => Ok(serve_path(path, req).await),
        Err(CandelaError::NotFound { .. })
            if timeframe != catalog.base_timeframe() && catalog.find_symbol(&symbol).is_some() =>
        {
            let bytes = catalog.synthesize(&symbol, timeframe).await?;
            Ok((
                [(header::CONTENT_TYPE, "text/csv")],
                Vec::clone(&bytes),
            )
                .into_response())
        }
        Err(e) => Err(e.into()),
    }
}

async fn data_file(
    State(state): State<Arc<AppState>>,
    Path(file): Path<String>,
    req: Request,
) -> Result<Response, ApiError> {
    let path = state.catalog.open_file(&file)?;
    Ok(serve_path(path, req).await)
}

async fn serve_path(path: PathBuf, req: Request) -> Response {
    ServeFile::new(path)
        .oneshot(req)
        .await
        .map(|resp| resp.map(Body::new).into_response())
        .unwrap_or_else(|never| match never {})
}
