//! Short-lived OAuth access tokens
//!
//! Google Vertex AI authenticates with access tokens obtained from a service
//! account through the JWT bearer grant: a claim set signed with the account's
//! RSA key is exchanged at the token endpoint. The token is cached with its
//! expiry; because clocks and latency differ, a request can still arrive with
//! an expired token. [`send_with_token_refresh`] handles that case by
//! refreshing once and resubmitting once.

use super::http::{HttpTransport, Payload};
use crate::config::ExpiryDetector;
use crate::core_types::RequestResponse;
use crate::error::{ManagerError, ManagerResult};
use crate::logging::{log_debug, log_info, log_warn};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::RwLock;

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Tokens are treated as expired this long before their actual expiry.
const EXPIRY_MARGIN_SECS: i64 = 30;

/// Lifetime requested for the signed assertion.
const ASSERTION_LIFETIME_SECS: i64 = 3600;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_MARGIN_SECS) >= self.expires_at
    }
}

/// The fields of a service account key file needed for the JWT bearer grant.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    /// Parse a service account key file as downloaded from Google Cloud.
    pub fn from_json(json: &str) -> ManagerResult<Self> {
        let key: Self = serde_json::from_str(json).map_err(|e| {
            ManagerError::configuration_error(format!("Invalid service account JSON: {e}"))
        })?;
        if key.client_email.is_empty() || key.private_key.is_empty() {
            return Err(ManagerError::configuration_error(
                "Service account JSON needs client_email and private_key",
            ));
        }
        Ok(key)
    }

    pub fn token_uri(&self) -> &str {
        self.token_uri
            .as_deref()
            .filter(|uri| !uri.is_empty())
            .unwrap_or(DEFAULT_TOKEN_URI)
    }
}

/// Claim set of the signed assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

/// Service account token source with an in-process cache.
///
/// Concurrent callers that all see an expired token refresh independently;
/// the token endpoint tolerates that.
pub struct AccessTokenSource {
    client: reqwest::Client,
    account: ServiceAccountKey,
    signing_key: EncodingKey,
    scope: String,
    cached: RwLock<Option<AccessToken>>,
}

impl fmt::Debug for AccessTokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessTokenSource")
            .field("account", &self.account)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl AccessTokenSource {
    /// # Errors
    ///
    /// Returns [`ManagerError::ConfigurationError`] if the private key is not
    /// an RSA key in PEM format.
    pub fn new(
        client: reqwest::Client,
        account: ServiceAccountKey,
        scope: impl Into<String>,
    ) -> ManagerResult<Self> {
        let signing_key = EncodingKey::from_rsa_pem(account.private_key.as_bytes()).map_err(|e| {
            ManagerError::configuration_error(format!("Invalid RSA private key (PEM): {e}"))
        })?;
        Ok(Self {
            client,
            account,
            signing_key,
            scope: scope.into(),
            cached: RwLock::new(None),
        })
    }

    pub fn token_uri(&self) -> &str {
        self.account.token_uri()
    }

    /// Claims for an assertion issued at `now`.
    pub fn claims(&self, now: DateTime<Utc>) -> AssertionClaims {
        AssertionClaims {
            iss: self.account.client_email.clone(),
            scope: self.scope.clone(),
            aud: self.token_uri().to_string(),
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
        }
    }

    /// RS256 signed assertion for the JWT bearer grant.
    pub fn signed_assertion(&self, now: DateTime<Utc>) -> ManagerResult<String> {
        let mut header = Header::new(Algorithm::RS256);
        header.typ = Some("JWT".to_string());
        encode(&header, &self.claims(now), &self.signing_key)
            .map_err(|e| ManagerError::configuration_error(format!("Failed to sign JWT: {e}")))
    }

    /// Cached token, or a fresh one when none is cached or it has expired.
    pub async fn access_token(&self) -> ManagerResult<String> {
        if let Some(token) = self.cached.read().await.as_ref() {
            if !token.is_expired(Utc::now()) {
                return Ok(token.token.clone());
            }
        }
        self.refresh().await
    }

    /// Exchange a freshly signed assertion for a new token and cache it.
    pub async fn refresh(&self) -> ManagerResult<String> {
        let token_uri = self.token_uri();
        log_debug!(token_uri = %token_uri, client_email = %self.account.client_email, "Requesting access token");

        let assertion = self.signed_assertion(Utc::now())?;
        let form = [("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())];

        let response = self
            .client
            .post(token_uri)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                ManagerError::transport_error(
                    format!("Access token request failed: {e}"),
                    Some(Box::new(e)),
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ManagerError::transport_error(
                format!("Token endpoint returned {status}: {text}"),
                None,
            ));
        }

        let parsed: TokenResponse = response.json().await.map_err(|e| {
            ManagerError::transport_error(
                format!("Token endpoint answer could not be parsed: {e}"),
                Some(Box::new(e)),
            )
        })?;

        let token = AccessToken {
            token: parsed.access_token,
            expires_at: Utc::now() + Duration::seconds(parsed.expires_in.max(0)),
        };
        let value = token.token.clone();
        *self.cached.write().await = Some(token);
        log_info!(token_uri = %token_uri, "Access token refreshed");
        Ok(value)
    }
}

/// Replace the bearer token in `headers`.
pub fn with_bearer(mut headers: HeaderMap, token: &str) -> ManagerResult<HeaderMap> {
    let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
        ManagerError::configuration_error(format!("Invalid access token format: {e}"))
    })?;
    headers.insert(AUTHORIZATION, value);
    Ok(headers)
}

/// Send `payload`; when the failure is diagnosed as an expired access token,
/// refresh the token and resubmit exactly once.
///
/// A second expiry failure after the refresh is terminal and reported as a
/// transport failure (code `0`).
pub async fn send_with_token_refresh(
    transport: &HttpTransport,
    tokens: &AccessTokenSource,
    detector: &ExpiryDetector,
    payload: &Payload,
    headers: HeaderMap,
) -> RequestResponse {
    let first = transport.execute(payload, headers.clone()).await;
    if !is_expiry(detector, &first) {
        return first;
    }

    log_warn!(url = %payload.url, "Access token rejected as expired, refreshing once");
    let token = match tokens.refresh().await {
        Ok(token) => token,
        Err(e) => {
            return RequestResponse::error(0, e.user_message(), e.to_string(), None);
        }
    };
    let headers = match with_bearer(headers, &token) {
        Ok(headers) => headers,
        Err(e) => return RequestResponse::error(0, e.user_message(), e.to_string(), None),
    };

    let second = transport.execute(payload, headers).await;
    if is_expiry(detector, &second) {
        let e = ManagerError::transport_error(
            "Access token still rejected after refresh",
            None,
        );
        return RequestResponse::error(
            0,
            e.user_message(),
            e.to_string(),
            second.error_body().map(str::to_string),
        );
    }
    second
}

fn is_expiry(detector: &ExpiryDetector, response: &RequestResponse) -> bool {
    match response {
        RequestResponse::Error { code, body, .. } => detector.matches(*code, body.as_deref()),
        RequestResponse::Success { .. } => false,
    }
}
