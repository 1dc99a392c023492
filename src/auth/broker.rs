use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::core::errors::PlatformError;
use crate::core::http::{self, TOKEN_TIMEOUT};

/// Tokens are treated as expired this long before the server says so.
pub const REFRESH_BUFFER_SECS: i64 = 60;

const GRANT_FORM: [(&str, &str); 2] = [
    ("grant_type", "client_credentials"),
    ("scope", "api/access"),
];

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Clone)]
pub struct ClientCredentials {
    client_id: String,
    client_secret: String,
}

impl ClientCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"****")
            .finish()
    }
}

/// An issued bearer credential. Never mutated; a refresh swaps in a new one.
#[derive(Clone)]
pub struct Credential {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// True while `now` is still at or before `expires_at - 60s`.
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        now <= self.expires_at - Duration::seconds(REFRESH_BUFFER_SECS)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"****")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<i64>,
}

/// Owns the single client-credentials token shared by every caller.
///
/// The cache mutex is held across a refresh, so callers arriving while a
/// grant is in flight wait for it and then reuse the fresh token instead of
/// issuing their own.
pub struct CredentialBroker {
    client: Client,
    token_url: String,
    credentials: ClientCredentials,
    cached: Mutex<Option<Arc<Credential>>>,
    clock: Clock,
}

impl CredentialBroker {
    pub fn new(client: Client, token_url: impl Into<String>, credentials: ClientCredentials) -> Self {
        Self {
            client,
            token_url: token_url.into(),
            credentials,
            cached: Mutex::new(None),
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Returns a bearer token that is valid for at least the refresh buffer,
    /// performing a grant first when the cached one is missing or stale.
    pub async fn ensure_valid(&self, cancel: &CancellationToken) -> Result<String, PlatformError> {
        let mut cached = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PlatformError::Cancelled),
            guard = self.cached.lock() => guard,
        };

        let now = (self.clock)();
        if let Some(credential) = cached.as_ref() {
            if credential.is_usable_at(now) {
                return Ok(credential.access_token.clone());
            }
            tracing::debug!("Access token expires at {}, refreshing", credential.expires_at);
        }

        let fresh = Arc::new(self.request_grant(cancel).await?);
        let token = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(token)
    }

    pub async fn current(&self) -> Option<Arc<Credential>> {
        self.cached.lock().await.clone()
    }

    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    async fn request_grant(&self, cancel: &CancellationToken) -> Result<Credential, PlatformError> {
        let request = self
            .client
            .post(&self.token_url)
            .basic_auth(&self.credentials.client_id, Some(&self.credentials.client_secret))
            .form(&GRANT_FORM);

        let reply = http::send(request, TOKEN_TIMEOUT, cancel).await?;
        if !reply.is_success() {
            let reason = reply.detail().unwrap_or_else(|| reply.body.clone());
            return Err(PlatformError::Auth(format!(
                "token endpoint returned {}: {}",
                reply.status, reason
            )));
        }

        let parsed: TokenResponse = serde_json::from_str(&reply.body)
            .map_err(|e| PlatformError::Auth(format!("malformed token response: {}", e)))?;
        let credential = parse_credential(parsed, (self.clock)())?;
        tracing::info!(
            "Obtained {} access token valid until {}",
            credential.token_type,
            credential.expires_at
        );
        Ok(credential)
    }
}

fn parse_credential(parsed: TokenResponse, now: DateTime<Utc>) -> Result<Credential, PlatformError> {
    let access_token = parsed
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| PlatformError::Auth("token response missing access_token".to_string()))?;
    let expires_in = parsed
        .expires_in
        .ok_or_else(|| PlatformError::Auth("token response missing expires_in".to_string()))?;

    Ok(Credential {
        access_token,
        token_type: parsed.token_type.unwrap_or_else(|| "Bearer".to_string()),
        expires_at: now + Duration::seconds(expires_in),
    })
}
