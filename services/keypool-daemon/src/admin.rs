//! Admin API for pool management
//!
//! Serves on the same listener as `/health` and `/metrics`. Responses never
//! contain secrets: credentials are shown by id, name and masked preview.
//!
//! Endpoints:
//! - GET    /admin/pool                   pool status summary
//! - GET    /admin/credentials            list credentials
//! - POST   /admin/credentials            add a credential `{secret, name?}`
//! - DELETE /admin/credentials/{id}       remove a credential
//! - POST   /admin/credentials/active     manual selection `{index}`
//! - PUT    /admin/strategy               switch strategy `{strategy}`
//! - GET    /admin/endpoints              list endpoints
//! - POST   /admin/endpoints              add an endpoint `{url}`
//! - DELETE /admin/endpoints              remove an endpoint `{url}`
//! - POST   /admin/endpoints/select       manual endpoint switch `{url}`
//! - PUT    /admin/endpoints/strategy     endpoint strategy `{strategy}`
//! - POST   /admin/refresh                probe every credential and endpoint
//! - POST   /admin/refresh/active         probe the active credential

use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use serde::Deserialize;
use tracing::{info, warn};

use keypool::{EndpointStrategy, PoolCoordinator, SwitchStrategy};

/// Shared state for admin API handlers.
#[derive(Clone)]
pub struct AdminState {
    coordinator: Arc<PoolCoordinator>,
    default_endpoint: Arc<str>,
}

impl AdminState {
    pub fn new(coordinator: Arc<PoolCoordinator>, default_endpoint: &str) -> Self {
        Self {
            coordinator,
            default_endpoint: Arc::from(default_endpoint),
        }
    }
}

/// Build the admin axum router.
pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/pool", get(pool_status))
        .route(
            "/admin/credentials",
            get(list_credentials).post(add_credential),
        )
        .route("/admin/credentials/active", post(set_active))
        .route("/admin/credentials/{id}", delete(remove_credential))
        .route("/admin/strategy", put(set_strategy))
        .route(
            "/admin/endpoints",
            get(list_endpoints)
                .post(add_endpoint)
                .delete(remove_endpoint),
        )
        .route("/admin/endpoints/select", post(select_endpoint))
        .route("/admin/endpoints/strategy", put(set_endpoint_strategy))
        .route("/admin/refresh", post(refresh_all))
        .route("/admin/refresh/active", post(refresh_active))
        .with_state(state)
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response {
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// Map a pool error to its HTTP status.
fn status_for(error: &keypool::Error) -> StatusCode {
    use keypool::Error;
    match error {
        Error::DuplicateCredential | Error::DuplicateEndpoint(_) => StatusCode::CONFLICT,
        Error::UnknownCredential(_) | Error::UnknownEndpoint(_) => StatusCode::NOT_FOUND,
        Error::InvalidCredential(_)
        | Error::InvalidEndpoint(_)
        | Error::IndexOutOfRange { .. }
        | Error::PoolEmpty => StatusCode::BAD_REQUEST,
        Error::PoolWouldBeEmpty
        | Error::CannotRemoveActive(_)
        | Error::EndpointSetWouldBeEmpty(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::AllExhausted => StatusCode::SERVICE_UNAVAILABLE,
        Error::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: keypool::Error) -> Response {
    let status = status_for(&error);
    if status.is_server_error() {
        warn!(error = %error, "admin request failed");
    }
    json_response(status, serde_json::json!({ "error": error.to_string() }))
}

fn parse_switch_strategy(name: &str) -> Option<SwitchStrategy> {
    SwitchStrategy::ALL.into_iter().find(|s| s.label() == name)
}

fn parse_endpoint_strategy(name: &str) -> Option<EndpointStrategy> {
    [EndpointStrategy::Manual, EndpointStrategy::UseFastest]
        .into_iter()
        .find(|s| s.label() == name)
}

fn unknown_strategy(name: &str, valid: &[&str]) -> Response {
    json_response(
        StatusCode::BAD_REQUEST,
        serde_json::json!({
            "error": format!("unknown strategy: {name}"),
            "valid": valid,
        }),
    )
}

/// GET /admin/pool
async fn pool_status(State(state): State<AdminState>) -> impl IntoResponse {
    json_response(StatusCode::OK, state.coordinator.status().await)
}

/// GET /admin/credentials
async fn list_credentials(State(state): State<AdminState>) -> impl IntoResponse {
    let credentials = state.coordinator.credentials().await;
    let strategy = state.coordinator.strategy().await;
    json_response(
        StatusCode::OK,
        serde_json::json!({
            "strategy": strategy,
            "credentials": credentials,
        }),
    )
}

#[derive(Deserialize)]
struct AddCredentialRequest {
    secret: String,
    #[serde(default)]
    name: Option<String>,
}

/// POST /admin/credentials
async fn add_credential(
    State(state): State<AdminState>,
    axum::Json(body): axum::Json<AddCredentialRequest>,
) -> impl IntoResponse {
    match state.coordinator.add_credential(body.secret, body.name).await {
        Ok(view) => {
            info!(credential_id = %view.id, "credential added via admin api");
            json_response(StatusCode::CREATED, serde_json::json!(view))
        }
        Err(e) => error_response(e),
    }
}

/// DELETE /admin/credentials/{id}
async fn remove_credential(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.coordinator.remove_credential(&id).await {
        Ok(()) => {
            info!(credential_id = %id, "credential removed via admin api");
            json_response(
                StatusCode::OK,
                serde_json::json!({ "id": id, "status": "removed" }),
            )
        }
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
struct SetActiveRequest {
    index: usize,
}

/// POST /admin/credentials/active
async fn set_active(
    State(state): State<AdminState>,
    axum::Json(body): axum::Json<SetActiveRequest>,
) -> impl IntoResponse {
    match state.coordinator.set_active(body.index).await {
        Ok(view) => json_response(StatusCode::OK, serde_json::json!(view)),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
struct StrategyRequest {
    strategy: String,
}

/// PUT /admin/strategy
async fn set_strategy(
    State(state): State<AdminState>,
    axum::Json(body): axum::Json<StrategyRequest>,
) -> impl IntoResponse {
    let Some(strategy) = parse_switch_strategy(&body.strategy) else {
        let valid: Vec<&str> = SwitchStrategy::ALL.iter().map(|s| s.label()).collect();
        return unknown_strategy(&body.strategy, &valid);
    };
    state.coordinator.set_strategy(strategy).await;
    json_response(
        StatusCode::OK,
        serde_json::json!({ "strategy": strategy }),
    )
}

/// GET /admin/endpoints
async fn list_endpoints(State(state): State<AdminState>) -> impl IntoResponse {
    let listing = state.coordinator.endpoints().await;
    let current = state
        .coordinator
        .current_endpoint(&state.default_endpoint)
        .await;
    json_response(
        StatusCode::OK,
        serde_json::json!({
            "strategy": listing.strategy,
            "selected": listing.selected,
            "current": current,
            "endpoints": listing.endpoints,
        }),
    )
}

#[derive(Deserialize)]
struct EndpointRequest {
    url: String,
}

/// POST /admin/endpoints
async fn add_endpoint(
    State(state): State<AdminState>,
    axum::Json(body): axum::Json<EndpointRequest>,
) -> impl IntoResponse {
    match state.coordinator.add_endpoint(&body.url).await {
        Ok(endpoint) => json_response(StatusCode::CREATED, serde_json::json!(endpoint)),
        Err(e) => error_response(e),
    }
}

/// DELETE /admin/endpoints
async fn remove_endpoint(
    State(state): State<AdminState>,
    axum::Json(body): axum::Json<EndpointRequest>,
) -> impl IntoResponse {
    match state.coordinator.remove_endpoint(&body.url).await {
        Ok(()) => json_response(
            StatusCode::OK,
            serde_json::json!({ "url": body.url, "status": "removed" }),
        ),
        Err(e) => error_response(e),
    }
}

/// POST /admin/endpoints/select
async fn select_endpoint(
    State(state): State<AdminState>,
    axum::Json(body): axum::Json<EndpointRequest>,
) -> impl IntoResponse {
    match state.coordinator.select_endpoint(&body.url).await {
        Ok(()) => json_response(
            StatusCode::OK,
            serde_json::json!({ "selected": body.url }),
        ),
        Err(e) => error_response(e),
    }
}

/// PUT /admin/endpoints/strategy
async fn set_endpoint_strategy(
    State(state): State<AdminState>,
    axum::Json(body): axum::Json<StrategyRequest>,
) -> impl IntoResponse {
    let Some(strategy) = parse_endpoint_strategy(&body.strategy) else {
        return unknown_strategy(&body.strategy, &["manual", "use_fastest"]);
    };
    state.coordinator.set_endpoint_strategy(strategy).await;
    let selected = state.coordinator.endpoints().await.selected;
    json_response(
        StatusCode::OK,
        serde_json::json!({ "strategy": strategy, "selected": selected }),
    )
}

/// POST /admin/refresh
///
/// Always 200: individual probe failures are part of the report.
async fn refresh_all(State(state): State<AdminState>) -> impl IntoResponse {
    let report = state.coordinator.refresh_all().await;
    json_response(StatusCode::OK, serde_json::json!(report))
}

/// POST /admin/refresh/active
async fn refresh_active(State(state): State<AdminState>) -> impl IntoResponse {
    match state.coordinator.refresh_active().await {
        Ok(report) => json_response(StatusCode::OK, serde_json::json!(report)),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use keypool::{Collaborators, EndpointSet, KeyPool, MemoryStore, TracingNotifier};
    use probe::{LatencyProbe, ProbeError, ProbeFuture, QuotaProbe, QuotaReading};
    use std::time::Duration;
    use tower::ServiceExt;

    /// Reports a fixed usage for every secret except `fk-revoked`.
    struct FixedQuota {
        total_used: u64,
    }

    impl QuotaProbe for FixedQuota {
        fn check<'a>(&'a self, secret: &'a str) -> ProbeFuture<'a, QuotaReading> {
            Box::pin(async move {
                if secret == "fk-revoked" {
                    return Err(ProbeError::Auth("HTTP 401".into()));
                }
                Ok(QuotaReading {
                    total_allowance: 1000,
                    total_used: self.total_used,
                })
            })
        }
    }

    /// Every endpoint answers in 50ms.
    struct FixedLatency;

    impl LatencyProbe for FixedLatency {
        fn check<'a>(&'a self, _url: &'a str, _timeout: Duration) -> ProbeFuture<'a, Duration> {
            Box::pin(async { Ok(Duration::from_millis(50)) })
        }
    }

    fn test_coordinator(total_used: u64) -> Arc<PoolCoordinator> {
        Arc::new(PoolCoordinator::new(
            KeyPool::new(SwitchStrategy::Manual),
            EndpointSet::default(),
            Collaborators {
                quota_probe: Arc::new(FixedQuota { total_used }),
                latency_probe: Arc::new(FixedLatency),
                store: Arc::new(MemoryStore::new()),
                notifier: Arc::new(TracingNotifier),
            },
            Duration::from_secs(5),
        ))
    }

    fn app(coordinator: Arc<PoolCoordinator>) -> Router {
        build_admin_router(AdminState::new(coordinator, "https://default.example.com"))
    }

    async fn send(
        app: Router,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header(axum::http::header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app.oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn list_credentials_empty_pool() {
        let (status, json) = send(app(test_coordinator(0)), "GET", "/admin/credentials", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["credentials"], serde_json::json!([]));
        assert_eq!(json["strategy"], "manual");
    }

    #[tokio::test]
    async fn add_credential_returns_masked_view() {
        let coordinator = test_coordinator(0);
        let (status, json) = send(
            app(coordinator.clone()),
            "POST",
            "/admin/credentials",
            Some(serde_json::json!({ "secret": "fk-abcdefghijklmnop", "name": "primary" })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["name"], "primary");
        assert_eq!(json["active"], true);
        assert_eq!(json["secret_preview"], "fk-a...mnop");
        assert!(!json.to_string().contains("fk-abcdefghijklmnop"));
        assert_eq!(coordinator.credentials().await.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_credential_is_conflict() {
        let coordinator = test_coordinator(0);
        let body = serde_json::json!({ "secret": "fk-one" });
        send(app(coordinator.clone()), "POST", "/admin/credentials", Some(body.clone())).await;

        let (status, json) = send(app(coordinator), "POST", "/admin/credentials", Some(body)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(json["error"].as_str().unwrap().contains("already present"));
    }

    #[tokio::test]
    async fn remove_unknown_credential_is_not_found() {
        let (status, _) = send(
            app(test_coordinator(0)),
            "DELETE",
            "/admin/credentials/no-such-id",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn remove_last_credential_is_unprocessable() {
        let coordinator = test_coordinator(0);
        let view = coordinator.add_credential("fk-only".into(), None).await.unwrap();

        let uri = format!("/admin/credentials/{}", view.id);
        let (status, _) = send(app(coordinator.clone()), "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(coordinator.credentials().await.len(), 1);
    }

    #[tokio::test]
    async fn remove_credential_succeeds_with_successor() {
        let coordinator = test_coordinator(0);
        let first = coordinator.add_credential("fk-one".into(), None).await.unwrap();
        coordinator.add_credential("fk-two".into(), None).await.unwrap();

        let uri = format!("/admin/credentials/{}", first.id);
        let (status, json) = send(app(coordinator.clone()), "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "removed");

        let credentials = coordinator.credentials().await;
        assert_eq!(credentials.len(), 1);
        assert!(credentials[0].active);
    }

    #[tokio::test]
    async fn set_active_out_of_range_is_bad_request() {
        let coordinator = test_coordinator(0);
        coordinator.add_credential("fk-one".into(), None).await.unwrap();

        let (status, json) = send(
            app(coordinator),
            "POST",
            "/admin/credentials/active",
            Some(serde_json::json!({ "index": 3 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("out of range"));
    }

    #[tokio::test]
    async fn set_active_switches_credential() {
        let coordinator = test_coordinator(0);
        coordinator.add_credential("fk-one".into(), None).await.unwrap();
        coordinator.add_credential("fk-two".into(), None).await.unwrap();

        let (status, json) = send(
            app(coordinator.clone()),
            "POST",
            "/admin/credentials/active",
            Some(serde_json::json!({ "index": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["active"], true);

        let selected = coordinator.select().await.unwrap();
        assert_eq!(selected.secret.expose(), "fk-two");
    }

    #[tokio::test]
    async fn set_strategy_accepts_every_label() {
        let coordinator = test_coordinator(0);
        for strategy in SwitchStrategy::ALL {
            let (status, json) = send(
                app(coordinator.clone()),
                "PUT",
                "/admin/strategy",
                Some(serde_json::json!({ "strategy": strategy.label() })),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(json["strategy"], strategy.label());
            assert_eq!(coordinator.strategy().await, strategy);
        }
    }

    #[tokio::test]
    async fn set_strategy_rejects_unknown_label() {
        let (status, json) = send(
            app(test_coordinator(0)),
            "PUT",
            "/admin/strategy",
            Some(serde_json::json!({ "strategy": "random" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["valid"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn endpoints_lifecycle() {
        let coordinator = test_coordinator(0);

        let (status, json) = send(app(coordinator.clone()), "GET", "/admin/endpoints", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["current"], "https://default.example.com");

        let (status, json) = send(
            app(coordinator.clone()),
            "POST",
            "/admin/endpoints",
            Some(serde_json::json!({ "url": "https://eu.example.com/" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["url"], "https://eu.example.com");

        send(
            app(coordinator.clone()),
            "POST",
            "/admin/endpoints",
            Some(serde_json::json!({ "url": "https://us.example.com" })),
        )
        .await;

        let (status, _) = send(
            app(coordinator.clone()),
            "POST",
            "/admin/endpoints/select",
            Some(serde_json::json!({ "url": "https://us.example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, json) = send(app(coordinator.clone()), "GET", "/admin/endpoints", None).await;
        assert_eq!(json["selected"], "https://us.example.com");
        assert_eq!(json["current"], "https://us.example.com");
        assert_eq!(json["endpoints"].as_array().unwrap().len(), 2);

        let (status, _) = send(
            app(coordinator.clone()),
            "DELETE",
            "/admin/endpoints",
            Some(serde_json::json!({ "url": "https://us.example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            coordinator.current_endpoint("https://default.example.com").await,
            "https://eu.example.com"
        );
    }

    #[tokio::test]
    async fn endpoint_errors_map_to_statuses() {
        let coordinator = test_coordinator(0);
        coordinator.add_endpoint("https://eu.example.com").await.unwrap();

        let cases = [
            ("POST", "/admin/endpoints", "not-a-url", StatusCode::BAD_REQUEST),
            ("POST", "/admin/endpoints", "https://eu.example.com", StatusCode::CONFLICT),
            ("POST", "/admin/endpoints/select", "https://nowhere.example.com", StatusCode::NOT_FOUND),
            ("DELETE", "/admin/endpoints", "https://eu.example.com", StatusCode::UNPROCESSABLE_ENTITY),
        ];
        for (method, uri, url, expected) in cases {
            let (status, _) = send(
                app(coordinator.clone()),
                method,
                uri,
                Some(serde_json::json!({ "url": url })),
            )
            .await;
            assert_eq!(status, expected, "{method} {uri} {url}");
        }
    }

    #[tokio::test]
    async fn endpoint_strategy_use_fastest_after_refresh() {
        let coordinator = test_coordinator(0);
        coordinator.add_endpoint("https://eu.example.com").await.unwrap();
        coordinator.refresh_all().await;

        let (status, json) = send(
            app(coordinator),
            "PUT",
            "/admin/endpoints/strategy",
            Some(serde_json::json!({ "strategy": "use_fastest" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["strategy"], "use_fastest");
        assert_eq!(json["selected"], "https://eu.example.com");
    }

    #[tokio::test]
    async fn endpoint_strategy_rejects_unknown_label() {
        let (status, _) = send(
            app(test_coordinator(0)),
            "PUT",
            "/admin/endpoints/strategy",
            Some(serde_json::json!({ "strategy": "use_slowest" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn refresh_all_reports_each_probe() {
        let coordinator = test_coordinator(100);
        coordinator.add_credential("fk-good".into(), None).await.unwrap();
        coordinator.add_credential("fk-revoked".into(), None).await.unwrap();
        coordinator.add_endpoint("https://eu.example.com").await.unwrap();

        let (status, json) = send(app(coordinator), "POST", "/admin/refresh", None).await;
        assert_eq!(status, StatusCode::OK);

        let credentials = json["credentials"].as_array().unwrap();
        assert_eq!(credentials.len(), 2);
        assert_eq!(credentials[0]["outcome"], "ok");
        assert_eq!(credentials[0]["remaining"], 900);
        assert_eq!(credentials[1]["outcome"], "failed");
        assert_eq!(credentials[1]["kind"], "auth");

        let endpoints = json["endpoints"].as_array().unwrap();
        assert_eq!(endpoints[0]["status"], "online");
        assert_eq!(endpoints[0]["latency_ms"], 50);
        assert_eq!(json["state"]["state"], "healthy");
    }

    #[tokio::test]
    async fn refresh_active_on_empty_pool_is_bad_request() {
        let (status, _) = send(app(test_coordinator(0)), "POST", "/admin/refresh/active", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn pool_status_never_contains_secrets() {
        let coordinator = test_coordinator(100);
        coordinator
            .add_credential("fk-super-secret-1234".into(), Some("main".into()))
            .await
            .unwrap();
        coordinator.refresh_active().await.unwrap();

        let (status, json) = send(app(coordinator), "GET", "/admin/pool", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["credentials_available"], 1);
        assert!(!json.to_string().contains("fk-super-secret-1234"));
    }

    #[test]
    fn error_status_mapping() {
        use keypool::Error;
        assert_eq!(status_for(&Error::DuplicateCredential), StatusCode::CONFLICT);
        assert_eq!(status_for(&Error::PoolWouldBeEmpty), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            status_for(&Error::CannotRemoveActive("a".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(status_for(&Error::AllExhausted), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            status_for(&Error::Store("disk full".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
