/// HTTP server setup and routing
use crate::{
    context::AppContext,
    error::{CredError, CredResult},
};
use axum::{
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    response::Json,
    routing::get,
    Router,
};
use chrono::Utc;
use serde_json::json;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// Build the main application router
pub fn build_router(ctx: AppContext) -> Router {
    let cors = cors_layer(&ctx.config.cors.origins);

    Router::new()
        .route("/health", get(health_check))
        .route("/time", get(server_time))
        .merge(crate::api::routes())
        .with_state(ctx)
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .fallback(not_found)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() || origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match o.parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!(origin = %o, "ignoring unparsable CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Health check handler
async fn health_check(State(ctx): State<AppContext>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "store": {
            "provider": ctx.manager.provider_name(),
            "status": ctx.manager.status().to_string(),
            "registered": ctx.manager.registry().names(),
        },
        "uptime_seconds": ctx.started.elapsed().as_secs(),
    }))
}

/// Current server time, for clients checking token clock skew
async fn server_time() -> Json<serde_json::Value> {
    let now = Utc::now();
    Json(json!({
        "time": now.to_rfc3339(),
        "unix": now.timestamp(),
    }))
}

/// 404 handler
async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "status": "error",
            "error": "NotFound",
            "message": "Endpoint not found"
        })),
    )
}

/// Start the HTTP server; the store is closed once the listener stops
pub async fn serve(ctx: AppContext) -> CredResult<()> {
    let addr = ctx.config.addr();
    let manager = ctx.manager.clone();

    info!("Keystead listening on {}", addr);
    info!("   Store provider: {}", manager.provider_name());

    let app = build_router(ctx);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| CredError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| CredError::Internal(format!("Server error: {}", e)));

    manager.close().await?;
    served
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
