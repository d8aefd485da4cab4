//! Sign-in flows: personal access token, and the OAuth authorization-code
//! round trip through an external code-exchange service.
//!
//! ```text
//! Idle -> Redirecting -> AwaitingCallback -> Exchanging -> Authenticated
//!                                                      \-> Failed
//! ```
//!
//! Nothing is retried; a failed flow must be started again from `begin_oauth`.

use crate::config::OAuthConfig;
use crate::github::{GitHubClient, GitHubError, UserIdentity};
use crate::session::Session;
use crate::store::StoreError;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

pub const OAUTH_STATE_KEY: &str = "gh_oauth_state";
pub const OAUTH_STATE_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Please enter a token.")]
    EmptyToken,

    #[error("OAuth is not configured: missing {0}")]
    NotConfigured(&'static str),

    #[error("Invalid OAuth state. Please start the login again.")]
    InvalidState,

    #[error("No authorization code in the callback.")]
    MissingCode,

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The provider or the exchange service reported a failure
    #[error("{0}")]
    Provider(String),

    #[error(transparent)]
    GitHub(#[from] GitHubError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum OAuthPhase {
    Idle,
    Redirecting,
    AwaitingCallback,
    Exchanging,
    Authenticated,
    Failed(String),
}

// Response of the code-exchange service
#[derive(Debug, Deserialize)]
struct ExchangeResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl ExchangeResponse {
    fn error_message(&self) -> Option<String> {
        self.error_description.clone().or_else(|| self.error.clone())
    }
}

pub struct AuthFlow<'a> {
    client: &'a GitHubClient,
    session: &'a Session,
    oauth: &'a OAuthConfig,
    phase: OAuthPhase,
}

impl<'a> AuthFlow<'a> {
    pub fn new(client: &'a GitHubClient, session: &'a Session, oauth: &'a OAuthConfig) -> Self {
        Self {
            client,
            session,
            oauth,
            phase: OAuthPhase::Idle,
        }
    }

    pub fn phase(&self) -> &OAuthPhase {
        &self.phase
    }

    /// Validate the persisted token, if any. An invalid or unreachable token
    /// logs the user out; this never surfaces an error.
    pub async fn init(&mut self) -> bool {
        let Some(token) = self.session.token() else {
            return false;
        };

        match self.client.get_identity(&token).await {
            Ok(user) => match self.session.authenticate(&token, user) {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "could not persist validated token");
                    false
                }
            },
            Err(e) => {
                warn!(error = %e, "stored token is no longer valid, logging out");
                if let Err(e) = self.logout() {
                    warn!(error = %e, "logout after failed validation did not complete");
                }
                false
            }
        }
    }

    /// Sign in with a personal access token. Nothing is stored on failure.
    pub async fn login_with_token(&mut self, token: &str) -> Result<UserIdentity, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::EmptyToken);
        }

        let user = self.client.get_identity(token).await?;
        self.session.authenticate(token, user.clone())?;
        info!(login = %user.login, "signed in with personal access token");
        Ok(user)
    }

    /// Start the OAuth round trip: persist a fresh state and return the URL
    /// the user agent must visit.
    pub fn begin_oauth(&mut self) -> Result<Url, AuthError> {
        let oauth = self.oauth;
        if oauth.client_id.is_empty() {
            return Err(AuthError::NotConfigured("oauth.client_id"));
        }
        if oauth.exchange_url.is_empty() {
            return Err(AuthError::NotConfigured("oauth.exchange_url"));
        }

        self.phase = OAuthPhase::Redirecting;
        let state = generate_state();
        if let Err(e) = self.session.store().set(OAUTH_STATE_KEY, &state) {
            return Err(self.fail(e.into()));
        }

        let url = match Url::parse_with_params(
            &oauth.authorize_url,
            &[
                ("client_id", oauth.client_id.as_str()),
                ("redirect_uri", oauth.redirect_uri.as_str()),
                ("scope", oauth.scope.as_str()),
                ("state", state.as_str()),
            ],
        ) {
            Ok(url) => url,
            Err(e) => return Err(self.fail(e.into())),
        };

        self.phase = OAuthPhase::AwaitingCallback;
        debug!("OAuth flow started");
        Ok(url)
    }

    /// Finish the flow from the full redirect URL the provider sent back.
    pub async fn handle_callback_url(&mut self, callback: &str) -> Result<UserIdentity, AuthError> {
        let url = match Url::parse(callback.trim()) {
            Ok(url) => url,
            Err(e) => {
                // Still burn the pending state; the round trip is over either way
                if let Err(e) = self.take_state() {
                    warn!(error = %e, "could not discard pending OAuth state");
                }
                return Err(self.fail(e.into()));
            }
        };

        let mut code = None;
        let mut state = None;
        let mut error = None;
        let mut error_description = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                "error_description" => error_description = Some(value.into_owned()),
                _ => {}
            }
        }

        if let Some(error) = error {
            self.verify_state(state.as_deref())?;
            return Err(self.fail(AuthError::Provider(error_description.unwrap_or(error))));
        }

        self.complete_oauth(code.as_deref(), state.as_deref()).await
    }

    /// Verify `state`, exchange `code` for a token and sign in.
    pub async fn complete_oauth(
        &mut self,
        code: Option<&str>,
        state: Option<&str>,
    ) -> Result<UserIdentity, AuthError> {
        self.verify_state(state)?;

        let Some(code) = code.filter(|c| !c.is_empty()) else {
            return Err(self.fail(AuthError::MissingCode));
        };

        self.phase = OAuthPhase::Exchanging;
        let result = self.exchange_and_sign_in(code).await;
        match result {
            Ok(user) => {
                self.phase = OAuthPhase::Authenticated;
                info!(login = %user.login, "signed in with OAuth");
                Ok(user)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Drop the token, the user and any pending OAuth state. Safe to repeat.
    pub fn logout(&mut self) -> Result<(), AuthError> {
        // Attempt both removals; report the first failure
        let cleared = self.session.clear();
        let removed = self.session.store().remove(OAUTH_STATE_KEY);
        self.phase = OAuthPhase::Idle;
        cleared?;
        removed?;
        info!("signed out");
        Ok(())
    }

    /// One comparison per stored state: it is deleted whatever the outcome.
    fn verify_state(&mut self, returned: Option<&str>) -> Result<(), AuthError> {
        let expected = match self.take_state() {
            Ok(expected) => expected,
            Err(e) => return Err(self.fail(e.into())),
        };

        match (expected, returned) {
            (Some(expected), Some(returned)) if expected == returned => Ok(()),
            _ => {
                warn!("OAuth callback state mismatch");
                Err(self.fail(AuthError::InvalidState))
            }
        }
    }

    fn take_state(&self) -> Result<Option<String>, StoreError> {
        let store = self.session.store();
        let expected = store.get(OAUTH_STATE_KEY);
        let removed = store.remove(OAUTH_STATE_KEY);
        let expected = expected?;
        removed?;
        Ok(expected)
    }

    async fn exchange_and_sign_in(&self, code: &str) -> Result<UserIdentity, AuthError> {
        let token = self.exchange_code(code).await?;
        let user = self.client.get_identity(&token).await?;
        self.session.authenticate(&token, user.clone())?;
        Ok(user)
    }

    async fn exchange_code(&self, code: &str) -> Result<String, AuthError> {
        let response = self
            .client
            .http()
            .post(&self.oauth.exchange_url)
            .header("Accept", "application/json")
            .json(&json!({ "code": code }))
            .send()
            .await?;

        let status = response.status();
        let body: Option<ExchangeResponse> = response.json().await.ok();

        if !status.is_success() {
            let message = body
                .and_then(|b| b.error_message())
                .unwrap_or_else(|| format!("Token exchange failed ({})", status));
            return Err(AuthError::Provider(message));
        }

        let body = body.ok_or_else(|| {
            AuthError::Provider("Token exchange returned an unreadable response".to_string())
        })?;

        if let Some(message) = body.error_message() {
            return Err(AuthError::Provider(message));
        }

        body.access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::Provider("Token exchange returned no access token".to_string()))
    }

    fn fail(&mut self, error: AuthError) -> AuthError {
        self.phase = OAuthPhase::Failed(error.to_string());
        error
    }
}

/// Random CSRF state drawn from the OS generator, `[A-Za-z0-9]{32}`.
pub fn generate_state() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(OAUTH_STATE_LEN)
        .map(char::from)
        .collect()
}
