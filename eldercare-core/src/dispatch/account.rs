//! Request and response bodies for the account endpoints

use serde::{Deserialize, Serialize};

pub(crate) const LOGIN_PATH: &str = "/api/Account/login";
pub(crate) const REGISTER_PATH: &str = "/api/Account/register";
pub(crate) const RECENT_HEART_RATE_PATH: &str = "/api/HeartRate/getRecentHeartRate";

/// Body for POST /api/Account/login
#[derive(Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// Body for POST /api/Account/register
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    /// Date string as the backend expects it (e.g. `1950-04-12`)
    pub date_of_birth: String,
}

/// Successful login/registration response
#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

/// Error body the backend sends on rejected registrations
#[derive(Deserialize)]
struct ErrorResponse {
    message: String,
}

/// Pull the bearer token out of a login/registration response.
pub(crate) fn extract_token(body: &str) -> Option<String> {
    serde_json::from_str::<TokenResponse>(body)
        .ok()
        .map(|r| r.token)
        .filter(|t| !t.is_empty())
}

/// Pull the human-readable message out of an error response.
pub(crate) fn extract_error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .map(|r| r.message)
}
