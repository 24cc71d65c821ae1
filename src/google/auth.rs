//! OAuth credentials for the Calendar and Drive APIs.
//!
//! The token is cached as JSON next to the client secrets file. An expired
//! token is refreshed; with no usable token the installed-app consent flow
//! (PKCE, CSRF state) runs once through a loopback redirect.

use super::callback::CallbackServer;
use super::API_TIMEOUT;
use crate::error::{AppError, Result};
use crate::ports::CredentialProvider;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use oauth2::basic::{BasicClient, BasicErrorResponse, BasicTokenResponse};
use oauth2::url::Url;
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, CsrfToken, EndpointNotSet, EndpointSet,
    PkceCodeChallenge, RedirectUrl, RefreshToken, RequestTokenError, Scope, TokenResponse,
    TokenUrl,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, info};

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Seconds before expiry at which a token is treated as stale.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// How long the consent flow waits for the browser redirect.
const CONSENT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(300);

type GoogleOAuthClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// A pre-issued access token, used as-is.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    installed: Option<InstalledApp>,
    web: Option<InstalledApp>,
}

/// One section of a Google client secrets file.
#[derive(Debug, Clone, Deserialize)]
struct InstalledApp {
    client_id: String,
    client_secret: String,
    #[serde(default = "default_auth_uri")]
    auth_uri: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl InstalledApp {
    fn oauth_client(
        &self,
        redirect_uri: Option<String>,
    ) -> std::result::Result<GoogleOAuthClient, String> {
        let client = BasicClient::new(ClientId::new(self.client_id.clone()))
            .set_client_secret(oauth2::ClientSecret::new(self.client_secret.clone()))
            .set_auth_uri(AuthUrl::new(self.auth_uri.clone()).map_err(|e| e.to_string())?)
            .set_token_uri(TokenUrl::new(self.token_uri.clone()).map_err(|e| e.to_string())?)
            .set_auth_type(AuthType::RequestBody);

        match redirect_uri {
            Some(uri) => {
                let redirect = RedirectUrl::new(uri).map_err(|e| e.to_string())?;
                Ok(client.set_redirect_uri(redirect))
            }
            None => Ok(client),
        }
    }
}

/// Token as cached on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

impl StoredToken {
    /// Usable at `now`. Tokens without an expiry are trusted.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => expiry > now + Duration::seconds(EXPIRY_MARGIN_SECS),
            None => true,
        }
    }

    fn from_response(response: &BasicTokenResponse, previous_refresh: Option<String>) -> Self {
        Self {
            access_token: response.access_token().secret().clone(),
            refresh_token: response
                .refresh_token()
                .map(|t| t.secret().clone())
                .or(previous_refresh),
            expiry: response
                .expires_in()
                .and_then(|d| Duration::from_std(d).ok())
                .map(|d| Utc::now() + d),
        }
    }
}

/// Token provider backed by a client secrets file and a cached token.
pub struct OAuthCredentials {
    credentials_path: PathBuf,
    token_path: PathBuf,
    scopes: Vec<String>,
    http: reqwest::Client,
    cached: Mutex<Option<StoredToken>>,
}

impl OAuthCredentials {
    pub fn new(credentials_path: PathBuf, token_path: PathBuf, scopes: Vec<String>) -> Result<Self> {
        // Token endpoints must not redirect.
        let http = reqwest::Client::builder()
            .timeout(API_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            credentials_path,
            token_path,
            scopes,
            http,
            cached: Mutex::new(None),
        })
    }

    fn auth_error(&self, reason: impl std::fmt::Display) -> AppError {
        AppError::Authentication(format!("{} (token: {})", reason, self.token_path.display()))
    }

    fn token_error<RE>(&self, e: RequestTokenError<RE, BasicErrorResponse>) -> AppError
    where
        RE: std::error::Error + 'static,
    {
        match e {
            RequestTokenError::ServerResponse(response) => {
                self.auth_error(format!("token endpoint rejected the request: {}", response))
            }
            other => {
                let detail = std::error::Error::source(&other)
                    .map(|source| format!(": {}", source))
                    .unwrap_or_default();
                self.auth_error(format!("token request failed: {}{}", other, detail))
            }
        }
    }

    fn load_secret(&self) -> Result<InstalledApp> {
        let content = std::fs::read_to_string(&self.credentials_path)?;
        let file: ClientSecretsFile = serde_json::from_str(&content).map_err(|e| {
            self.auth_error(format!(
                "cannot parse client secrets {}: {}",
                self.credentials_path.display(),
                e
            ))
        })?;

        file.installed
            .or(file.web)
            .ok_or_else(|| self.auth_error("client secrets have no 'installed' or 'web' section"))
    }

    fn load_token(&self) -> Result<Option<StoredToken>> {
        if !self.token_path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.token_path)?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| self.auth_error(format!("cached token is unreadable: {}", e)))
    }

    fn save_token(&self, token: &StoredToken) -> Result<()> {
        let content = serde_json::to_string_pretty(token)?;
        std::fs::write(&self.token_path, content)?;
        debug!("Saved token to {}", self.token_path.display());
        Ok(())
    }

    async fn refresh(&self, app: &InstalledApp, refresh_token: &str) -> Result<StoredToken> {
        info!("Refreshing access token");
        let client = app
            .oauth_client(None)
            .map_err(|e| self.auth_error(format!("invalid client secrets: {}", e)))?;

        let response = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| self.token_error(e))?;

        Ok(StoredToken::from_response(
            &response,
            Some(refresh_token.to_string()),
        ))
    }

    /// Installed-app consent: print the URL, wait for the redirect on a
    /// loopback port, exchange the code.
    async fn authorize(&self, app: &InstalledApp) -> Result<StoredToken> {
        let state = CsrfToken::new_random();
        let server = CallbackServer::start(state.secret().clone()).await?;
        let client = app
            .oauth_client(Some(server.redirect_uri()))
            .map_err(|e| self.auth_error(format!("invalid client secrets: {}", e)))?;

        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
        let url = consent_url(&client, &self.scopes, state, challenge);

        println!("Open this URL in your browser to authorize access:\n\n  {}\n", url);
        info!("Waiting for authorization on {}", server.redirect_uri());

        let code = server
            .wait_for_code(CONSENT_TIMEOUT)
            .await
            .map_err(|reason| self.auth_error(reason))?;

        let response = client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(verifier)
            .request_async(&self.http)
            .await
            .map_err(|e| self.token_error(e))?;

        Ok(StoredToken::from_response(&response, None))
    }
}

#[async_trait]
impl CredentialProvider for OAuthCredentials {
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if cached.is_none() {
            *cached = self.load_token()?;
        }
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(token.access_token.clone());
        }

        let app = self.load_secret()?;
        let refresh_token = cached.as_ref().and_then(|t| t.refresh_token.clone());
        let token = match refresh_token {
            Some(refresh_token) => self.refresh(&app, &refresh_token).await?,
            None => self.authorize(&app).await?,
        };

        self.save_token(&token)?;
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }
}

/// Offline access with a forced consent prompt, so a refresh token is issued.
fn consent_url(
    client: &GoogleOAuthClient,
    scopes: &[String],
    state: CsrfToken,
    challenge: PkceCodeChallenge,
) -> Url {
    let (url, _) = client
        .authorize_url(move || state)
        .add_scopes(scopes.iter().cloned().map(Scope::new))
        .add_extra_param("access_type", "offline")
        .add_extra_param("prompt", "consent")
        .set_pkce_challenge(challenge)
        .url();
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn app() -> InstalledApp {
        InstalledApp {
            client_id: "client-123".to_string(),
            client_secret: "shh".to_string(),
            auth_uri: DEFAULT_AUTH_URI.to_string(),
            token_uri: DEFAULT_TOKEN_URI.to_string(),
        }
    }

    #[test]
    fn test_consent_url_carries_scopes_state_and_pkce() {
        let scopes = vec![
            "https://www.googleapis.com/auth/calendar.readonly".to_string(),
            "https://www.googleapis.com/auth/drive.readonly".to_string(),
        ];
        let client = app()
            .oauth_client(Some("http://127.0.0.1:4242/callback".to_string()))
            .unwrap();
        let (challenge, _verifier) = PkceCodeChallenge::new_random_sha256();
        let url = consent_url(
            &client,
            &scopes,
            CsrfToken::new("state-abc".to_string()),
            challenge,
        );
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let value = |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .unwrap_or_default()
        };

        assert_eq!(value("client_id"), "client-123");
        assert_eq!(value("access_type"), "offline");
        assert_eq!(value("state"), "state-abc");
        assert_eq!(value("code_challenge_method"), "S256");
        assert!(!value("code_challenge").is_empty());
        assert_eq!(value("redirect_uri"), "http://127.0.0.1:4242/callback");
        assert!(value("scope").contains("calendar.readonly"));
        assert!(value("scope").contains("drive.readonly"));
    }

    #[test]
    fn test_invalid_token_uri_is_rejected() {
        let mut app = app();
        app.token_uri = "not a url".to_string();
        assert!(app.oauth_client(None).is_err());
    }

    #[test]
    fn test_token_freshness() {
        let now = Utc::now();
        let token = |expiry| StoredToken {
            access_token: "t".to_string(),
            refresh_token: None,
            expiry,
        };

        assert!(token(None).is_fresh(now));
        assert!(token(Some(now + Duration::hours(1))).is_fresh(now));
        assert!(!token(Some(now + Duration::seconds(10))).is_fresh(now));
        assert!(!token(Some(now - Duration::hours(1))).is_fresh(now));
    }

    #[tokio::test]
    async fn test_fresh_cached_token_is_used_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("creds.json.token.json");
        let token = StoredToken {
            access_token: "ya29.cached".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            expiry: Some(Utc::now() + Duration::hours(1)),
        };
        std::fs::write(&token_path, serde_json::to_string(&token).unwrap()).unwrap();

        let creds =
            OAuthCredentials::new(dir.path().join("creds.json"), token_path, vec![]).unwrap();
        assert_eq!(creds.access_token().await.unwrap(), "ya29.cached");
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_and_saved() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.new",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let creds_path = dir.path().join("creds.json");
        let token_path = dir.path().join("creds.json.token.json");
        std::fs::write(
            &creds_path,
            serde_json::json!({
                "installed": {
                    "client_id": "client-123",
                    "client_secret": "shh",
                    "token_uri": format!("{}/token", server.uri())
                }
            })
            .to_string(),
        )
        .unwrap();
        let expired = StoredToken {
            access_token: "ya29.old".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            expiry: Some(Utc::now() - Duration::hours(1)),
        };
        std::fs::write(&token_path, serde_json::to_string(&expired).unwrap()).unwrap();

        let creds = OAuthCredentials::new(creds_path, token_path.clone(), vec![]).unwrap();
        assert_eq!(creds.access_token().await.unwrap(), "ya29.new");
        // Served from memory the second time.
        assert_eq!(creds.access_token().await.unwrap(), "ya29.new");

        let saved: StoredToken =
            serde_json::from_str(&std::fs::read_to_string(&token_path).unwrap()).unwrap();
        assert_eq!(saved.access_token, "ya29.new");
        assert_eq!(saved.refresh_token.as_deref(), Some("1//refresh"));
    }

    #[tokio::test]
    async fn test_rejected_refresh_is_an_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Token has been expired or revoked."
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let creds_path = dir.path().join("creds.json");
        let token_path = dir.path().join("creds.json.token.json");
        std::fs::write(
            &creds_path,
            serde_json::json!({
                "web": {
                    "client_id": "c",
                    "client_secret": "s",
                    "token_uri": format!("{}/token", server.uri())
                }
            })
            .to_string(),
        )
        .unwrap();
        std::fs::write(
            &token_path,
            r#"{"access_token":"old","refresh_token":"r","expiry":"2000-01-01T00:00:00Z"}"#,
        )
        .unwrap();

        let creds = OAuthCredentials::new(creds_path, token_path, vec![]).unwrap();
        let err = creds.access_token().await.unwrap_err();
        assert!(matches!(err, AppError::Authentication(ref m) if m.contains("invalid_grant")));
        assert_eq!(err.exit_code(), 3);
    }
}
