//! Loopback server that receives the OAuth consent redirect.

use crate::error::Result;
use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, warn};

const CALLBACK_PATH: &str = "/callback";

const SUCCESS_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Authorization Complete</title></head>
<body><h1>Authorization Complete</h1><p>You can close this window and return to cadence.</p></body>
</html>"#;

const FAILURE_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Authorization Failed</title></head>
<body><h1>Authorization Failed</h1><p>Invalid or unexpected callback parameters.</p></body>
</html>"#;

type CallbackOutcome = std::result::Result<String, String>;

#[derive(Debug, Default, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

#[derive(Clone)]
struct CallbackState {
    expected_state: String,
    sender: mpsc::Sender<CallbackOutcome>,
}

/// Serves `GET /callback` on an ephemeral 127.0.0.1 port until dropped.
pub struct CallbackServer {
    port: u16,
    receiver: mpsc::Receiver<CallbackOutcome>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl CallbackServer {
    /// Start listening. Only a redirect carrying `expected_state` is accepted.
    pub async fn start(expected_state: impl Into<String>) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();

        let (sender, receiver) = mpsc::channel(1);
        let app = Router::new()
            .route(CALLBACK_PATH, get(handle_callback))
            .with_state(CallbackState {
                expected_state: expected_state.into(),
                sender,
            });

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
            {
                error!("OAuth callback server error: {}", e);
            }
        });

        Ok(Self {
            port,
            receiver,
            shutdown: Some(shutdown_tx),
        })
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}{}", self.port, CALLBACK_PATH)
    }

    /// Wait for the first valid redirect and return its authorization code.
    pub async fn wait_for_code(mut self, timeout: Duration) -> CallbackOutcome {
        match tokio::time::timeout(timeout, self.receiver.recv()).await {
            Ok(Some(outcome)) => outcome,
            Ok(None) => Err("callback server stopped".to_string()),
            Err(_) => Err(format!(
                "no authorization received within {}s",
                timeout.as_secs()
            )),
        }
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn handle_callback(
    State(state): State<CallbackState>,
    Query(params): Query<CallbackParams>,
) -> Html<&'static str> {
    match callback_outcome(&params, &state.expected_state) {
        Some(outcome) => {
            let page = if outcome.is_ok() {
                SUCCESS_PAGE
            } else {
                FAILURE_PAGE
            };
            let _ = state.sender.try_send(outcome);
            Html(page)
        }
        None => {
            warn!("Ignoring OAuth callback with a missing or unexpected state");
            Html(FAILURE_PAGE)
        }
    }
}

/// `None` when the redirect cannot be trusted and must be ignored.
fn callback_outcome(params: &CallbackParams, expected_state: &str) -> Option<CallbackOutcome> {
    if params.state.as_deref() != Some(expected_state) {
        return None;
    }
    if let Some(ref reason) = params.error {
        return Some(Err(format!("consent was denied: {}", reason)));
    }
    params.code.clone().map(Ok)
}
