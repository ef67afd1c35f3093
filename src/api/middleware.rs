/// Token extraction for the validation endpoint
use axum::http::HeaderMap;
use axum_extra::extract::CookieJar;

/// Name of the form field, query parameter and cookie carrying a token
pub const TOKEN_PARAM: &str = "jwt";

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// First token found, in order: form field, query parameter, bearer header,
/// cookie
pub fn extract_token(
    form: Option<&str>,
    query: Option<&str>,
    headers: &HeaderMap,
    jar: &CookieJar,
) -> Option<String> {
    let non_empty = |s: Option<&str>| s.filter(|v| !v.is_empty()).map(str::to_string);

    non_empty(form)
        .or_else(|| non_empty(query))
        .or_else(|| extract_bearer_token(headers))
        .or_else(|| non_empty(jar.get(TOKEN_PARAM).map(|c| c.value())))
}
