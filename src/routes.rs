use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::error;

use crate::cache::FeedCache;
use crate::models::HomeViewModel;
use crate::view::{unavailable_view_model, HomePageService};

pub struct AppState {
    pub view: HomePageService,
    pub cache: Arc<FeedCache>,
    pub refresh_tx: mpsc::Sender<()>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/refresh", post(refresh))
        .route("/refresh/status", get(refresh_status))
        .route("/health", get(health))
        .with_state(state)
}

// Custom error type. The response body never carries the underlying error;
// the rendering layer only ever sees the generic failure model.
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(unavailable_view_model()),
        )
            .into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        AppError(err.into())
    }
}

#[derive(Deserialize)]
pub struct HomeQuery {
    pub category: Option<String>,
    /// Feed URL, base64- or percent-encoded
    pub feed: Option<String>,
    /// Feed slug; wins over `feed` when both are present
    pub slug: Option<String>,
    #[serde(default)]
    pub page: usize,
}

#[derive(Serialize)]
pub struct RefreshStatus {
    pub refreshing: bool,
}

// Route handlers
pub async fn index(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HomeQuery>,
) -> Json<HomeViewModel> {
    let model = if query.slug.is_some() {
        state
            .view
            .home_view_model_by_slug(query.category.as_deref(), query.slug.as_deref(), query.page)
            .await
    } else {
        state
            .view
            .home_view_model(query.category.as_deref(), query.feed.as_deref(), query.page)
            .await
    };
    Json(model)
}

pub async fn refresh(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    state
        .refresh_tx
        .send(())
        .await
        .map_err(|_| anyhow::anyhow!("refresh worker is not running"))?;

    Ok((
        StatusCode::ACCEPTED,
        Json(RefreshStatus { refreshing: true }),
    ))
}

pub async fn refresh_status(State(state): State<Arc<AppState>>) -> Json<RefreshStatus> {
    Json(RefreshStatus {
        refreshing: state.cache.is_rebuilding(),
    })
}

pub async fn health() -> impl IntoResponse {
    "OK"
}
