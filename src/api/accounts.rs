/// Account endpoints
use crate::{
    account::{Account, AccountPatch, CreateAccountRequest},
    context::AppContext,
    error::{CredError, CredResult},
    keys::KeyPair,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

/// Build account routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/accounts", get(list_accounts).post(create_account))
        .route(
            "/accounts/:uid",
            get(get_account).put(update_account).delete(delete_account),
        )
        .route("/accounts/:uid/keys", get(get_account_key).post(create_account_key))
        .route(
            "/accounts/:uid/tokens",
            get(get_account_token).head(has_account_token),
        )
        .route("/tokens", get(find_token))
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateAccountParams {
    /// Skip key pair issuance
    #[serde(default)]
    pub nokey: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedAccount {
    pub account: Account,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<KeyPair>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub uid: String,
    pub token: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    pub email: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EmailTokenResponse {
    pub email: String,
    pub token: String,
}

async fn list_accounts(State(ctx): State<AppContext>) -> CredResult<Json<Vec<Account>>> {
    Ok(Json(ctx.manager.load_all_accounts().await?))
}

async fn create_account(
    State(ctx): State<AppContext>,
    Query(params): Query<CreateAccountParams>,
    Json(req): Json<CreateAccountRequest>,
) -> CredResult<(StatusCode, Json<CreatedAccount>)> {
    let created = if params.nokey {
        let uid = ctx
            .manager
            .create_account(&req.email, &req.name, &req.password)
            .await?;
        CreatedAccount {
            account: ctx.manager.load_account(&uid).await?,
            key: None,
        }
    } else {
        let (account, key) = ctx
            .manager
            .create_account_with_key(&req.email, &req.name, &req.password)
            .await?;
        CreatedAccount {
            account,
            key: Some(key),
        }
    };

    tracing::info!(uid = ?created.account.uid, with_key = !params.nokey, "account created");
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_account(
    State(ctx): State<AppContext>,
    Path(uid): Path<String>,
) -> CredResult<Json<Account>> {
    Ok(Json(ctx.manager.load_account(&uid).await?))
}

async fn update_account(
    State(ctx): State<AppContext>,
    Path(uid): Path<String>,
    Json(patch): Json<AccountPatch>,
) -> CredResult<Json<Account>> {
    Ok(Json(ctx.manager.update_account(&uid, patch).await?))
}

async fn delete_account(
    State(ctx): State<AppContext>,
    Path(uid): Path<String>,
) -> CredResult<StatusCode> {
    ctx.manager.delete_account(&uid).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_account_key(
    State(ctx): State<AppContext>,
    Path(uid): Path<String>,
) -> CredResult<Json<KeyPair>> {
    Ok(Json(ctx.manager.get_key_by_account_id(&uid).await?))
}

/// Issue the key pair for an account created with `nokey`, or after a failed
/// issuance
async fn create_account_key(
    State(ctx): State<AppContext>,
    Path(uid): Path<String>,
) -> CredResult<(StatusCode, Json<KeyPair>)> {
    let key = ctx.manager.create_key(&uid).await?;
    Ok((StatusCode::CREATED, Json(key)))
}

async fn get_account_token(
    State(ctx): State<AppContext>,
    Path(uid): Path<String>,
) -> CredResult<Json<TokenResponse>> {
    let token = ctx.manager.get_token_by_account_id(&uid).await?;
    Ok(Json(TokenResponse { uid, token }))
}

/// 200 when a token is recorded for the account, 404 otherwise
async fn has_account_token(
    State(ctx): State<AppContext>,
    Path(uid): Path<String>,
) -> CredResult<StatusCode> {
    if ctx.manager.exist_token(&uid).await? {
        Ok(StatusCode::OK)
    } else {
        Err(CredError::TokenNotFound)
    }
}

/// Last recorded token of the live account owning `email`
async fn find_token(
    State(ctx): State<AppContext>,
    Query(query): Query<TokenQuery>,
) -> CredResult<Json<EmailTokenResponse>> {
    let email = query
        .email
        .filter(|e| !e.is_empty())
        .ok_or(CredError::NilArgument("email"))?;
    let token = ctx.manager.get_token_by_email(&email).await?;
    Ok(Json(EmailTokenResponse { email, token }))
}
