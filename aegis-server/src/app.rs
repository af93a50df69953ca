use aegis_core::database::ports::roles::RolesRepository;
use axum::{
    Json, Router,
    extract::State,
    http::{HeaderName, HeaderValue, Method, StatusCode},
    routing::get,
};
use serde_json::{Value, json};
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{debug, error, warn};

use crate::{AppState, routes};

/// Full application router with state attached.
pub fn create_app(state: AppState) -> Router {
    let versioned_api = routes::create_api_router(state.clone());
    let cors_layer = build_cors_layer(&state);
    let request_timeout = state.config().server.request_timeout;

    Router::new()
        .route("/ping", get(ping_handler))
        .route("/health", get(health_handler))
        .merge(versioned_api)
        // Outermost first: CORS, tracing, then the request deadline.
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}

/// Permissive in dev mode, an allow-list otherwise.
fn build_cors_layer(state: &AppState) -> CorsLayer {
    let config = state.config();
    if config.dev_mode {
        return CorsLayer::permissive();
    }

    let cors = &config.cors;
    let origins: Vec<HeaderValue> = cors
        .allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    let methods: Vec<Method> = cors
        .allowed_methods
        .iter()
        .filter_map(|method| Method::from_bytes(method.as_bytes()).ok())
        .collect();
    let headers: Vec<HeaderName> = cors
        .allowed_headers
        .iter()
        .filter_map(|name| HeaderName::from_bytes(name.as_bytes()).ok())
        .collect();

    let layer = CorsLayer::new()
        .allow_methods(AllowMethods::list(methods))
        .allow_headers(AllowHeaders::list(headers));

    if origins.is_empty() {
        // Credentials cannot be combined with a wildcard origin.
        warn!("no CORS origins configured; cross-origin requests carry no credentials");
        return layer.allow_origin(AllowOrigin::any());
    }

    let layer = layer.allow_origin(AllowOrigin::list(origins));
    if cors.allow_credentials {
        layer.allow_credentials(true)
    } else {
        layer
    }
}

async fn ping_handler() -> Json<Value> {
    debug!("ping");
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health_handler(
    State(state): State<AppState>,
) -> (StatusCode, Json<Value>) {
    let mut health = json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "checks": {}
    });
    let mut unhealthy = false;

    match state.unit_of_work.roles.list_roles().await {
        Ok(roles) => {
            health["checks"]["store"] = json!({
                "status": "healthy",
                "roles": roles.len(),
            });
        }
        Err(err) => {
            error!(error = %err, "health check: store unavailable");
            health["checks"]["store"] = json!({
                "status": "unhealthy",
                "error": "store unavailable",
            });
            unhealthy = true;
        }
    }

    let stats = state.notifications.stats();
    health["checks"]["notifications"] = json!({
        "status": if state.notifications.is_running() { "healthy" } else { "stopped" },
        "delivered": stats.delivered,
        "failed": stats.failed,
        "dropped": stats.dropped,
    });

    if unhealthy {
        health["status"] = json!("unhealthy");
        (StatusCode::SERVICE_UNAVAILABLE, Json(health))
    } else {
        (StatusCode::OK, Json(health))
    }
}
