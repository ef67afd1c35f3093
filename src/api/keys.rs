/// Key pair endpoints
use crate::{context::AppContext, error::CredResult, keys::KeyPair};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

/// Build key routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/keys", get(list_keys))
        .route("/keys/:kid", get(get_key).delete(delete_key))
}

#[derive(Debug, Default, Deserialize)]
pub struct KeyQuery {
    /// Exact public key PEM to look up
    pub pubkey: Option<String>,
}

async fn list_keys(
    State(ctx): State<AppContext>,
    Query(query): Query<KeyQuery>,
) -> CredResult<Json<Vec<KeyPair>>> {
    match query.pubkey.filter(|p| !p.is_empty()) {
        Some(pem) => Ok(Json(vec![ctx.manager.get_key_by_pub(pem.as_bytes()).await?])),
        None => Ok(Json(ctx.manager.load_all_keys().await?)),
    }
}

async fn get_key(
    State(ctx): State<AppContext>,
    Path(kid): Path<String>,
) -> CredResult<Json<KeyPair>> {
    Ok(Json(ctx.manager.load_key(&kid).await?))
}

async fn delete_key(
    State(ctx): State<AppContext>,
    Path(kid): Path<String>,
) -> CredResult<StatusCode> {
    ctx.manager.delete_key(&kid).await?;
    Ok(StatusCode::NO_CONTENT)
}
