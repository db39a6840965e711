//! # HTTP Surface
//!
//! A thin JSON request/response collaborator over the log. Two endpoints:
//!
//! - `POST /` appends the request's record and answers with the offset the
//!   log assigned.
//! - `GET /{offset}` answers with the record stored at that offset; an
//!   offset the log does not cover maps to 404.
//!
//! Handlers hold the log behind an `Arc` and call the blocking core
//! directly; the log's own locking keeps them correct. Anything beyond
//! unmarshal, delegate, marshal belongs below this layer.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::LogError;
use crate::log::Log;
use crate::record::Record;

#[derive(Debug, Serialize, Deserialize)]
pub struct ProduceRequest {
    pub record: Record,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProduceResponse {
    pub offset: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConsumeResponse {
    pub record: Record,
}

/// Builds the produce/consume router over `log`.
pub fn router(log: Arc<Log>) -> Router {
    Router::new()
        .route("/", post(produce))
        .route("/{offset}", get(consume))
        .with_state(log)
}

/// Binds `addr` and serves the router until the task is cancelled.
pub async fn serve(log: Arc<Log>, addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("failed to bind '{addr}'"))?;
    info!(addr, "log server listening");

    axum::serve(listener, router(log))
        .await
        .wrap_err("log server failed")
}

async fn produce(
    State(log): State<Arc<Log>>,
    Json(request): Json<ProduceRequest>,
) -> Result<Json<ProduceResponse>, (StatusCode, String)> {
    let mut record = request.record;
    let offset = log.append(&mut record).map_err(internal_error)?;
    Ok(Json(ProduceResponse { offset }))
}

async fn consume(
    State(log): State<Arc<Log>>,
    Path(offset): Path<u64>,
) -> Result<Json<ConsumeResponse>, (StatusCode, String)> {
    match log.read(offset) {
        Ok(record) => Ok(Json(ConsumeResponse { record })),
        Err(e) => match e.downcast_ref::<LogError>() {
            Some(LogError::OffsetOutOfRange(_)) => Err((StatusCode::NOT_FOUND, e.to_string())),
            _ => Err(internal_error(e)),
        },
    }
}

fn internal_error(e: eyre::Report) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::Request;
    use tempfile::tempdir;
    use tower::ServiceExt;

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn produce_then_consume_round_trips() {
        let dir = tempdir().unwrap();
        let log = Arc::new(Log::open(dir.path(), Config::default()).unwrap());
        let app = router(log);

        let produce = Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({"record": {"value": [1, 2, 3]}}).to_string(),
            ))
            .unwrap();
        let response = app.clone().oneshot(produce).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!({"offset": 0}));

        let consume = Request::builder()
            .uri("/0")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(consume).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"record": {"value": [1, 2, 3], "offset": 0}})
        );
    }

    #[tokio::test]
    async fn consume_unknown_offset_is_not_found() {
        let dir = tempdir().unwrap();
        let log = Arc::new(Log::open(dir.path(), Config::default()).unwrap());
        let app = router(log);

        let response = app
            .oneshot(Request::builder().uri("/9").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
