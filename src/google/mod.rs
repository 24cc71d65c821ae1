//! Google API clients: OAuth credentials, Calendar, Drive and Gemini.

pub mod auth;
mod callback;
pub mod calendar;
pub mod drive;
pub mod gemini;

pub use auth::{OAuthCredentials, StaticToken};
pub use calendar::GoogleCalendarClient;
pub use drive::GoogleDriveClient;
pub use gemini::GeminiClient;

use crate::error::{AppError, Result};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Timeout for Calendar and Drive requests.
const API_TIMEOUT: Duration = Duration::from_secs(60);

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Turn a request failure into a provider error naming the service.
fn send_error(service: &str, e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::Provider(format!("{} request timed out", service))
    } else if e.is_connect() {
        AppError::Provider(format!("Cannot connect to {}", service))
    } else {
        AppError::Provider(format!("Failed to send {} request: {}", service, e))
    }
}

/// Check the status and return the raw body. A 401 means the token is bad.
async fn read_text(service: &str, response: reqwest::Response) -> Result<String> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::Authentication(format!(
            "{} rejected the access token: {}",
            service, body
        )));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::Provider(format!(
            "{} API error {}: {}",
            service, status, body
        )));
    }

    response.text().await.map_err(|e| send_error(service, e))
}

async fn read_json<T: DeserializeOwned>(service: &str, response: reqwest::Response) -> Result<T> {
    let body = read_text(service, response).await?;
    serde_json::from_str(&body)
        .map_err(|e| AppError::Provider(format!("Failed to parse {} response: {}", service, e)))
}
