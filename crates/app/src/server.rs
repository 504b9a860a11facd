use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use pdf_rag_core::{Document, DocumentStore, ErrorKind, QueryAnswer, RagError};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

pub struct AppState {
    pub store: DocumentStore,
    /// Documents ingested by `serve --preload`, reported on the status route.
    pub preloaded: Vec<String>,
}

impl AppState {
    pub fn new(store: DocumentStore) -> Self {
        Self {
            store,
            preloaded: Vec::new(),
        }
    }

    pub fn with_preloaded(mut self, doc_ids: Vec<String>) -> Self {
        self.preloaded = doc_ids;
        self
    }
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        match err.kind() {
            ErrorKind::NotFound => ApiError::NotFound(err.to_string()),
            ErrorKind::InvalidInput => ApiError::BadRequest(err.to_string()),
            ErrorKind::Internal => {
                error!(error = %err, "request failed");
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    pub doc_id: String,
    #[serde(default)]
    pub top_k: Option<usize>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/upload", post(upload))
        .route("/documents", get(list_documents))
        .route("/documents/:doc_id", delete(delete_document))
        .route("/query", post(query))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn status(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "service": "pdf-rag",
        "version": env!("CARGO_PKG_VERSION"),
        "documents": state.store.document_count().await,
        "preloaded_doc_ids": state.preloaded,
    }))
}

async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Document>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::BadRequest(err.to_string()))?
    {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|err| ApiError::BadRequest(err.to_string()))?;

        let document = state.store.add_document(&filename, &bytes).await?;
        info!(doc_id = %document.doc_id, filename = %document.filename, "uploaded");
        return Ok(Json(document));
    }

    Err(ApiError::BadRequest("multipart body has no file field".to_string()))
}

async fn list_documents(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "documents": state.store.list_documents().await }))
}

async fn query(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryAnswer>, ApiError> {
    let answer = state
        .store
        .query(&request.question, &request.doc_id, request.top_k)
        .await?;
    Ok(Json(answer))
}

async fn delete_document(
    State(state): State<Arc<AppState>>,
    Path(doc_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !state.store.delete_document(&doc_id).await? {
        return Err(ApiError::NotFound(format!("document not found: {doc_id}")));
    }
    Ok(Json(json!({ "status": "deleted", "doc_id": doc_id })))
}
