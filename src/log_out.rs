//! The log-out endpoint, which invalidates the authentication cookies.

use axum::{
    Json,
    response::{IntoResponse, Response},
};
use axum_extra::extract::PrivateCookieJar;
use serde_json::json;

use crate::auth_cookie::invalidate_auth_cookie;

/// A route handler that invalidates the auth cookies.
///
/// Always responds with 200: logging out an already logged-out client is
/// harmless.
pub async fn post_log_out(jar: PrivateCookieJar) -> Response {
    let jar = invalidate_auth_cookie(jar);

    (jar, Json(json!({"message": "Logged out successfully."}))).into_response()
}
