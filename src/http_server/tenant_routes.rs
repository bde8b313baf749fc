//! # Tenant Routes
//!
//! `GET /?user=<id>` lists a user's tenants, `POST /` creates one.
//! Every response is JSON; any provisioning failure is a 500.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::control_plane::{
    errors::{ControlPlaneError, ErrorKind, ErrorResponse},
    store::TenantStore,
    tenant::CreateTenantRequest,
};

const JSON_CONTENT_TYPE: &str = "application/json";

/// Shared request state
#[derive(Clone)]
pub struct TenantRoutesState {
    store: Arc<dyn TenantStore>,
}

impl TenantRoutesState {
    pub fn new(store: Arc<dyn TenantStore>) -> Self {
        Self { store }
    }
}

/// Build the tenant routes with CORS for `allowed_origins`
pub fn tenant_routes(store: Arc<dyn TenantStore>, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/", get(list_tenants).post(create_tenant))
        .layer(middleware::map_response(json_content_type))
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(TenantRoutesState::new(store))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring unusable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_credentials(true)
}

async fn json_content_type(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
    response
}

/// List the tenants of exactly one `user`
async fn list_tenants(
    State(state): State<TenantRoutesState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let users: Vec<&str> = params
        .iter()
        .filter(|(key, _)| key == "user")
        .map(|(_, value)| value.as_str())
        .collect();

    let [user_id] = users.as_slice() else {
        warn!(count = users.len(), "[400]: 'user' parameter missing or repeated");
        return StatusCode::BAD_REQUEST.into_response();
    };

    match state.store.tenants_for_user(user_id).await {
        Ok(tenants) => (StatusCode::OK, Json(tenants)).into_response(),
        Err(e) => error_response(e),
    }
}

/// Create a tenant unless the user already owns one with that name
async fn create_tenant(
    State(state): State<TenantRoutesState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if body.is_empty() || !declares_json(&headers) {
        warn!("[400]: request body missing or not declared as JSON");
        return bad_request("Request body must be JSON with a JSON content type");
    }

    let request: CreateTenantRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "[400]: malformed create tenant body");
            return bad_request(&e.to_string());
        }
    };
    if request.user_id.is_empty() {
        return bad_request("UserId must not be empty");
    }

    let owned = match state.store.tenants_for_user(&request.user_id).await {
        Ok(tenants) => tenants,
        Err(e) => return error_response(e),
    };
    if owned.iter().any(|t| t.database_id == request.tenant_id) {
        return error_response(ControlPlaneError::TenantNameExists {
            user_id: request.user_id,
            database_id: request.tenant_id,
        });
    }

    match state
        .store
        .create_tenant(&request.tenant_id, &request.user_id)
        .await
    {
        Ok(tenant) => (StatusCode::CREATED, Json(tenant)).into_response(),
        Err(e) => error_response(e),
    }
}

fn declares_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains(JSON_CONTENT_TYPE))
}

fn bad_request(message: &str) -> Response {
    let body = ErrorResponse {
        error: message.to_string(),
        code: "BAD_REQUEST",
        status: 400,
    };
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

/// Convert error to HTTP response
fn error_response(err: ControlPlaneError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    match err.kind() {
        // Already raised on the alert target by the provisioner
        ErrorKind::PostCommitInconsistency => {}
        _ if status.is_server_error() => {
            error!(kind = ?err.kind(), error = %err, "[{}]: tenant request failed", status.as_u16())
        }
        _ => warn!(kind = ?err.kind(), error = %err, "[{}]: tenant request rejected", status.as_u16()),
    }

    (status, Json(ErrorResponse::from(&err))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::control_plane::catalog::MemoryCatalog;
    use crate::control_plane::database_server::MemoryDatabaseServer;
    use crate::control_plane::provisioning::TenantProvisioner;
    use crate::control_plane::store::MemoryTenantStore;

    fn app_with(store: Arc<dyn TenantStore>) -> Router {
        tenant_routes(store, &["http://localhost:3000".to_string()])
    }

    fn app() -> Router {
        app_with(Arc::new(MemoryTenantStore::new()))
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn post_json(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_get_requires_user() {
        let response = app().oneshot(get("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_rejects_repeated_user() {
        let response = app().oneshot(get("/?user=u1&user=u2")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_empty_list() {
        let response = app().oneshot(get("/?user=randomUserId")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            JSON_CONTENT_TYPE
        );
        assert_eq!(body_json(response).await, json!([]));
    }

    #[tokio::test]
    async fn test_post_without_content_type() {
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .body(Body::from(r#"{"TenantId":"random-tenant","UserId":"random|userId"}"#))
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_post_without_body() {
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_post_malformed_body() {
        let app = app();

        let response = app.clone().oneshot(post_json(json!({"TenantId": "acme"}))).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json; charset=utf-8")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_post_invalid_tenant_name() {
        let response = app()
            .oneshot(post_json(json!({"TenantId": "", "UserId": "u1"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "INVALID_TENANT_NAME");
    }

    #[tokio::test]
    async fn test_create_list_and_duplicate_scenario() {
        let app = app();
        let body = json!({"TenantId": "acme", "UserId": "u1"});

        let response = app.clone().oneshot(post_json(body.clone())).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json(response).await, json!({"id": 1, "databaseId": "acme"}));

        let response = app.clone().oneshot(post_json(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app.clone().oneshot(get("/?user=u1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!([{"id": 1, "databaseId": "acme"}]));

        let response = app.oneshot(get("/?user=u1&user=u2")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_provisioning_failure_is_500() {
        let server = MemoryDatabaseServer::with_template("template_tenantdb");
        server.add_database("acme");
        let provisioner = TenantProvisioner::new(MemoryCatalog::new(), server, "template_tenantdb");
        let app = app_with(Arc::new(provisioner));

        let response = app
            .clone()
            .oneshot(post_json(json!({"TenantId": "acme", "UserId": "u1"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["code"], "PROVISIONING_FAILED");

        let response = app.oneshot(get("/?user=u1")).await.unwrap();
        assert_eq!(body_json(response).await, json!([]));
    }

    #[tokio::test]
    async fn test_catalog_lookup_failure_is_500() {
        let store = MemoryTenantStore::new();
        store.catalog().refuse_connections(true);

        let response = app_with(Arc::new(store))
            .oneshot(get("/?user=u1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/")
            .header("origin", "http://localhost:3000")
            .header("access-control-request-method", "POST")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .unwrap(),
            "http://localhost:3000"
        );
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-credentials")
                .unwrap(),
            "true"
        );
    }
}
