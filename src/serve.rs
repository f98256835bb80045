//! REST deployment of a fitted model.
//!
//! Two endpoints: a root health check returning a fixed greeting, and a
//! prediction endpoint taking a nested-list-encoded batch of images and
//! returning the prediction record. The server blocks the calling thread
//! and runs until externally terminated; per-request concurrency belongs
//! to axum/tokio.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use ndarray::Array4;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::wrapper::{ModelWrapper, Prediction};

/// Bind address for [`run`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServeConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Clone)]
struct AppState {
    model: Arc<dyn ModelWrapper>,
}

/// Serve `model` over HTTP until the process is terminated.
pub fn run(model: Arc<dyn ModelWrapper>, config: &ServeConfig) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", config.host, config.port))?;

    let app = router(model);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    runtime.block_on(async {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;
        log::info!("serving model on {}", addr);
        axum::serve(listener, app)
            .await
            .context("server terminated unexpectedly")
    })
}

fn router(model: Arc<dyn ModelWrapper>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/predict", post(predict))
        .with_state(AppState { model })
}

async fn health() -> &'static str {
    "Hello World"
}

/// Classify a batch of images posted as a nested numeric list (NCHW).
async fn predict(
    State(state): State<AppState>,
    Json(images): Json<Vec<Vec<Vec<Vec<f32>>>>>,
) -> Result<Json<Prediction>, (StatusCode, String)> {
    let images = decode_images(&images).map_err(|err| {
        log::debug!("rejecting predict request: {}", err);
        (StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
    })?;
    match state.model.predict(&images) {
        Ok(prediction) => Ok(Json(prediction)),
        Err(err) => {
            log::warn!("prediction failed: {:#}", err);
            Err((StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))
        }
    }
}

/// Rebuild the NCHW array a client sent as nested lists.
fn decode_images(raw: &[Vec<Vec<Vec<f32>>>]) -> Result<Array4<f32>, ModelError> {
    let samples = raw.len();
    if samples == 0 {
        return Err(ModelError::InvalidDataset("empty image batch".to_string()));
    }
    let channels = raw[0].len();
    let height = raw[0].first().map_or(0, |channel| channel.len());
    let width = raw[0]
        .first()
        .and_then(|channel| channel.first())
        .map_or(0, |row| row.len());

    let mut pixels = Vec::with_capacity(samples * channels * height * width);
    for image in raw {
        if image.len() != channels {
            return Err(ragged());
        }
        for channel in image {
            if channel.len() != height {
                return Err(ragged());
            }
            for row in channel {
                if row.len() != width {
                    return Err(ragged());
                }
                pixels.extend_from_slice(row);
            }
        }
    }
    Array4::from_shape_vec((samples, channels, height, width), pixels)
        .map_err(|err| ModelError::InvalidDataset(err.to_string()))
}

fn ragged() -> ModelError {
    ModelError::InvalidDataset("image batch is ragged; all samples must share one shape".to_string())
}
