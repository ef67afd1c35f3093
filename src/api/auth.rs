/// Authentication and token endpoints
use crate::{
    account::{Account, AuthenticateRequest},
    api::middleware::extract_token,
    context::AppContext,
    error::{CredError, CredResult},
};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Form, Json, Router,
};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};

/// Build authentication routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/authenticate", post(authenticate))
        .route("/jwt/token/validate", get(validate_token).post(validate_token))
        .route("/jwt/token/:uid", post(issue_token))
}

#[derive(Debug, Default, Deserialize)]
pub struct TokenParams {
    #[serde(default)]
    pub jwt: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IssuedToken {
    pub uid: String,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidatedToken {
    pub valid: bool,
    pub sub: String,
    pub exp: i64,
}

/// Check email and password; responds with the account, never its hash
async fn authenticate(
    State(ctx): State<AppContext>,
    Form(req): Form<AuthenticateRequest>,
) -> CredResult<Json<Account>> {
    if req.email.is_empty() {
        return Err(CredError::NilArgument("email"));
    }
    if req.password.is_empty() {
        return Err(CredError::NilArgument("password"));
    }

    Ok(Json(ctx.manager.authenticate(&req.email, &req.password).await?))
}

async fn issue_token(
    State(ctx): State<AppContext>,
    Path(uid): Path<String>,
) -> CredResult<(StatusCode, Json<IssuedToken>)> {
    let token = ctx.manager.create_token(&uid).await?;
    Ok((StatusCode::CREATED, Json(IssuedToken { uid, token })))
}

/// Every verification failure surfaces as 403 "forbidden"
async fn validate_token(
    State(ctx): State<AppContext>,
    Query(query): Query<TokenParams>,
    headers: HeaderMap,
    jar: CookieJar,
    form: Option<Form<TokenParams>>,
) -> CredResult<Json<ValidatedToken>> {
    let form_jwt = form.and_then(|Form(params)| params.jwt);
    let token = extract_token(form_jwt.as_deref(), query.jwt.as_deref(), &headers, &jar)
        .ok_or(CredError::NilArgument("jwt"))?;

    let claims = ctx.manager.validate_token(&token).await.map_err(|e| {
        if e.is_not_found() {
            // a missing verification key is an authentication failure to callers
            CredError::Unauthorized
        } else {
            e
        }
    })?;

    Ok(Json(ValidatedToken {
        valid: true,
        sub: claims.sub,
        exp: claims.exp,
    }))
}
