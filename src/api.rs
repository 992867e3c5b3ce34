use crate::classifier::Classifier;
use crate::service::PredictionService;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub service: PredictionService,
    pub tree_count: usize,
}

impl AppState {
    pub fn new(service: PredictionService, tree_count: usize) -> Self {
        Self {
            service,
            tree_count,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum RequestError {
    #[error("request body must be a JSON object")]
    NotAnObject,
    #[error("no URL provided")]
    MissingUrl,
    #[error("'url' must be a non-empty string")]
    InvalidUrl,
    #[error("'urls' must be a non-empty list of strings")]
    InvalidUrls,
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, PartialEq)]
pub enum PredictRequest {
    Single(String),
    Batch(Vec<String>),
}

impl PredictRequest {
    /// `urls` wins when both keys are present
    pub fn parse(body: &[u8]) -> Result<Self, RequestError> {
        let value: Value = serde_json::from_slice(body).map_err(|_| RequestError::NotAnObject)?;
        let object = value.as_object().ok_or(RequestError::NotAnObject)?;

        if let Some(urls) = object.get("urls") {
            let list = urls.as_array().ok_or(RequestError::InvalidUrls)?;
            if list.is_empty() {
                return Err(RequestError::InvalidUrls);
            }
            let urls = list
                .iter()
                .map(|u| u.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or(RequestError::InvalidUrls)?;
            return Ok(PredictRequest::Batch(urls));
        }

        match object.get("url") {
            Some(Value::String(url)) if !url.trim().is_empty() => {
                Ok(PredictRequest::Single(url.clone()))
            }
            Some(_) => Err(RequestError::InvalidUrl),
            None => Err(RequestError::MissingUrl),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/predict", post(predict))
        .route("/health", get(health))
        .layer(cors)
        .with_state(state)
}

async fn predict(State(state): State<AppState>, body: Bytes) -> Response {
    let request = match PredictRequest::parse(&body) {
        Ok(request) => request,
        Err(e) => {
            log::info!("Rejected predict request: {e}");
            return e.into_response();
        }
    };

    match request {
        PredictRequest::Single(url) => match state.service.predict_one(&url).await {
            Ok(response) => {
                log::info!("{} -> {}", url, response.result.label);
                Json(response).into_response()
            }
            Err(e) => {
                log::warn!("Prediction failed for {url}: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": e.to_string() })),
                )
                    .into_response()
            }
        },
        PredictRequest::Batch(urls) => {
            let responses = state.service.predict_batch(&urls).await;
            let unsafe_count = responses.iter().filter(|r| !r.result.is_safe()).count();
            log::info!("Batch of {} URLs, {} not safe", responses.len(), unsafe_count);
            Json(responses).into_response()
        }
    }
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let classifier: &dyn Classifier = state.service.classifier();
    Json(json!({
        "status": "ok",
        "features": classifier.n_features(),
        "trees": state.tree_count,
    }))
}

/// Router over a ready service; used by `main` and the tests
pub fn app(service: PredictionService, tree_count: usize) -> Router {
    router(AppState::new(service, tree_count))
}
