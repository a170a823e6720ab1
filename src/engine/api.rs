//! Wardgate API Module
//! Reference permissions endpoint for local development and integration tests.
//! Holds the document in memory; it is not a persistence engine.

use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::{Arc, RwLock};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::engine::rbac::error::LoadError;
use crate::engine::rbac::wire;

pub const PERMISSIONS_PATH: &str = "/system-settings/permissions";

#[derive(Clone)]
pub struct ApiState {
    document: Arc<RwLock<Value>>,
    /// When set, writes must carry `Authorization: Bearer <token>`
    admin_token: Option<String>,
}

impl Default for ApiState {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiState {
    pub fn new() -> Self {
        Self {
            document: Arc::new(RwLock::new(json!({}))),
            admin_token: None,
        }
    }

    pub fn with_admin_token(mut self, token: &str) -> Self {
        self.admin_token = Some(token.to_string());
        self
    }

    /// Seed the stored document
    pub fn with_document(self, document: Value) -> Self {
        *self.document.write().unwrap_or_else(|p| p.into_inner()) = document;
        self
    }

    pub fn document(&self) -> Value {
        self.document
            .read()
            .map(|d| d.clone())
            .unwrap_or_else(|p| p.into_inner().clone())
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        get_permissions,
        replace_permissions,
    ),
    tags(
        (name = "permissions", description = "Role permission matrix"),
    )
)]
pub struct ApiDoc;

pub fn create_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(PERMISSIONS_PATH, get(get_permissions).post(replace_permissions))
        .route("/api/health", get(health_check))
        .route("/api/openapi.json", get(openapi_json))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[utoipa::path(
    get,
    path = "/system-settings/permissions",
    responses(
        (status = 200, description = "Permission matrix keyed by role; empty means use defaults", body = Value)
    ),
    tag = "permissions"
)]
async fn get_permissions(State(state): State<ApiState>) -> Json<Value> {
    Json(state.document())
}

#[utoipa::path(
    post,
    path = "/system-settings/permissions",
    request_body = Value,
    responses(
        (status = 200, description = "Matrix replaced", body = Value),
        (status = 400, description = "Malformed or empty matrix", body = Value),
        (status = 401, description = "Missing or wrong admin token", body = Value)
    ),
    tag = "permissions"
)]
async fn replace_permissions(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if let Some(expected) = &state.admin_token {
        let presented = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if presented != Some(expected.as_str()) {
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({ "success": false, "error": "unauthorized" })),
            ));
        }
    }

    match wire::decode_value(body.clone()) {
        Ok(_) => {
            let roles = body.as_object().map(|o| o.len()).unwrap_or(0);
            *state.document.write().unwrap_or_else(|p| p.into_inner()) = body;
            tracing::info!(roles, "permission document replaced");
            Ok(Json(json!({ "success": true, "roles": roles })))
        }
        Err(err @ (LoadError::Malformed(_) | LoadError::Empty)) => Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "error": err.to_string() })),
        )),
        Err(err) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "success": false, "error": err.to_string() })),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn read_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post(body: &Value, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(PERMISSIONS_PATH)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_empty_document_by_default() {
        let app = create_router(ApiState::new());
        let request = Request::builder()
            .uri(PERMISSIONS_PATH)
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await, json!({}));
    }

    #[tokio::test]
    async fn test_post_replaces_document() {
        let state = ApiState::new();
        let app = create_router(state.clone());
        let body = json!({
            "nurse": [{"module": "vitals", "create": true, "read": true, "update": true, "delete": false}]
        });

        let response = app.oneshot(post(&body, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["success"], json!(true));
        assert_eq!(state.document(), body);
    }

    #[tokio::test]
    async fn test_post_rejects_bad_documents() {
        let state = ApiState::new();
        let app = create_router(state.clone());

        let response = app.clone().oneshot(post(&json!({}), None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(post(&json!({"nurse": "everything"}), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.document(), json!({}));
    }

    #[tokio::test]
    async fn test_admin_token_required() {
        let state = ApiState::new().with_admin_token("s3cret");
        let app = create_router(state.clone());
        let body = json!({"doctor": [{"module": "billing", "action": "read", "allowed": true}]});

        let response = app.clone().oneshot(post(&body, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app.oneshot(post(&body, Some("s3cret"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.document(), body);
    }
}
