//! Credential providers for the supported grant mechanisms
//!
//! [`TokenProvider`] turns its static grant configuration into credentials:
//! static keys wrap without a network round trip, password and
//! authorization-code grants go through the token endpoint with Basic auth.
//! [`RestrictedProvider`] layers a claim-subset restriction over any parent
//! source; its refresh path always re-derives the restriction, so a restricted
//! credential can never widen back to the parent scope.

use super::credential::Credential;
use super::{AuthError, CredentialSource};
use crate::config::{ClientConfig, ConfigError};
use crate::error::sanitize_error_detail;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

/// Grant mechanism and its static material
#[derive(Debug, Clone)]
pub enum Grant {
    /// Pre-issued access key, wrapped without a network round trip
    StaticKey { key: String },
    /// Resource-owner password exchange (client-credentials style)
    PasswordExchange { username: String, password: String },
    /// One-shot authorization code exchange
    AuthorizationCode { code: String },
}

/// Token exchange request body
#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    grant_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<&'a str>,
}

impl<'a> TokenRequest<'a> {
    fn password(username: &'a str, password: &'a str) -> Self {
        Self {
            grant_type: "password",
            username: Some(username),
            password: Some(password),
            client_id: None,
            code: None,
            refresh_token: None,
        }
    }

    fn authorization_code(client_id: &'a str, code: &'a str) -> Self {
        Self {
            grant_type: "authorization_code",
            username: None,
            password: None,
            client_id: Some(client_id),
            code: Some(code),
            refresh_token: None,
        }
    }

    fn refresh(client_id: &'a str, refresh_token: &'a str) -> Self {
        Self {
            grant_type: "refresh_token",
            username: None,
            password: None,
            client_id: Some(client_id),
            code: None,
            refresh_token: Some(refresh_token),
        }
    }
}

/// Token exchange response body
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: i64,
}

/// Restriction request body
#[derive(Debug, Serialize)]
struct RestrictRequest<'a> {
    scope: Vec<&'a str>,
}

/// Restriction response body; expiry is inherited from the caller
#[derive(Debug, Deserialize)]
struct RestrictResponse {
    access_token: String,
}

/// Credential provider backed by a single grant
pub struct TokenProvider {
    grant: Grant,
    token_url: Url,
    restrict_url: Url,
    client_id: String,
    client_secret: String,
    http: reqwest::Client,
    current: Mutex<Option<Credential>>,
}

impl TokenProvider {
    pub fn new(
        grant: Grant,
        token_url: Url,
        restrict_url: Url,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            grant,
            token_url,
            restrict_url,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            http: reqwest::Client::new(),
            current: Mutex::new(None),
        }
    }

    /// Build a provider from client configuration, selecting the grant from
    /// the configured material (static key wins when present).
    pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
        let grant = if let Some(key) = config.access_key() {
            Grant::StaticKey { key }
        } else if let Some(username) = &config.auth.username {
            Grant::PasswordExchange {
                username: username.clone(),
                password: config.password()?,
            }
        } else {
            return Err(ConfigError::InvalidConfig(
                "no grant material configured (auth.key_env or auth.username/password_env)"
                    .to_string(),
            ));
        };

        let token_url = Url::parse(&config.auth.token_url)
            .map_err(|e| ConfigError::InvalidConfig(format!("auth.token_url: {e}")))?;
        let restrict_url = Url::parse(&config.auth.restrict_url)
            .map_err(|e| ConfigError::InvalidConfig(format!("auth.restrict_url: {e}")))?;

        Ok(Self::new(
            grant,
            token_url,
            restrict_url,
            config.auth.client_id.clone(),
            config.client_secret()?,
        ))
    }

    /// Seed the provider with an already-issued credential (e.g. one carried
    /// over from a previous session).
    pub fn with_credential(self, credential: Credential) -> Self {
        Self {
            current: Mutex::new(Some(credential)),
            ..self
        }
    }

    /// Exchange the grant material for a fresh credential.
    pub async fn issue(&self) -> Result<Credential, AuthError> {
        match &self.grant {
            Grant::StaticKey { key } => Ok(Credential::key(key.clone())),
            Grant::PasswordExchange { username, password } => {
                self.exchange(&TokenRequest::password(username, password)).await
            }
            Grant::AuthorizationCode { code } => {
                self.exchange(&TokenRequest::authorization_code(&self.client_id, code))
                    .await
            }
        }
    }

    /// Exchange `current`'s refresh secret for a new token/secret pair.
    pub async fn refresh_credential(&self, current: &Credential) -> Result<Credential, AuthError> {
        let secret = current.refresh_secret().ok_or(AuthError::NonRenewable)?;
        self.exchange(&TokenRequest::refresh(&self.client_id, secret)).await
    }

    /// Narrow this provider to a claim subset. The returned provider derives
    /// its credentials from this one and re-derives them after every parent
    /// refresh, keeping the claim set fixed. Callers keeping their own handle
    /// to the provider clone the `Arc` first.
    pub fn restrict(
        self: Arc<Self>,
        claims: impl IntoIterator<Item = impl Into<String>>,
    ) -> RestrictedProvider {
        let restrict_url = self.restrict_url.clone();
        let http = self.http.clone();
        RestrictedProvider::new(self as Arc<dyn CredentialSource>, claims, restrict_url, http)
    }

    async fn exchange(&self, request: &TokenRequest<'_>) -> Result<Credential, AuthError> {
        debug!(grant_type = request.grant_type, "exchanging grant for token");
        let response = self
            .http
            .post(self.token_url.clone())
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .json(request)
            .send()
            .await
            .map_err(AuthError::Exchange)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::RemoteRejected {
                status,
                detail: sanitize_error_detail(&body),
            });
        }

        let body: TokenResponse = response.json().await.map_err(AuthError::Exchange)?;
        let expires_at = Utc::now() + Duration::seconds(body.expires_in);
        Credential::bearer(body.access_token, Some(expires_at), body.refresh_token)
    }
}

#[async_trait]
impl CredentialSource for TokenProvider {
    async fn credential(&self) -> Result<Credential, AuthError> {
        // The lock is held across the exchange: concurrent callers hitting an
        // expiring credential converge on the single refresh the first caller
        // performs.
        let mut current = self.current.lock().await;
        match &*current {
            Some(credential) if !credential.is_expired() => Ok(credential.clone()),
            Some(credential) if credential.can_refresh() => {
                let fresh = self.refresh_credential(credential).await?;
                *current = Some(fresh.clone());
                Ok(fresh)
            }
            Some(_) => Err(AuthError::Expired),
            None => {
                let fresh = self.issue().await?;
                *current = Some(fresh.clone());
                Ok(fresh)
            }
        }
    }

    async fn refresh(&self) -> Result<Credential, AuthError> {
        let mut current = self.current.lock().await;
        let fresh = match &*current {
            Some(credential) => self.refresh_credential(credential).await?,
            None => self.issue().await?,
        };
        *current = Some(fresh.clone());
        Ok(fresh)
    }
}

/// Credential source scoped to a claim subset of its parent
///
/// Holds a non-owning reference to the parent source. Both the derive path and
/// the refresh path go through the parent first and then re-apply the same
/// restriction, so N refresh cycles leave the effective claim set unchanged.
pub struct RestrictedProvider {
    parent: Arc<dyn CredentialSource>,
    claims: BTreeSet<String>,
    restrict_url: Url,
    http: reqwest::Client,
    current: Mutex<Option<Credential>>,
}

impl RestrictedProvider {
    pub fn new(
        parent: Arc<dyn CredentialSource>,
        claims: impl IntoIterator<Item = impl Into<String>>,
        restrict_url: Url,
        http: reqwest::Client,
    ) -> Self {
        Self {
            parent,
            claims: claims.into_iter().map(Into::into).collect(),
            restrict_url,
            http,
            current: Mutex::new(None),
        }
    }

    /// The claim set this provider is pinned to
    pub fn claims(&self) -> &BTreeSet<String> {
        &self.claims
    }

    /// Narrow further. Restrictions chain: the child re-derives through this
    /// provider, which re-derives through its own parent.
    pub fn restrict(
        self: Arc<Self>,
        claims: impl IntoIterator<Item = impl Into<String>>,
    ) -> RestrictedProvider {
        let restrict_url = self.restrict_url.clone();
        let http = self.http.clone();
        RestrictedProvider::new(self as Arc<dyn CredentialSource>, claims, restrict_url, http)
    }

    async fn derive(&self, parent: &Credential) -> Result<Credential, AuthError> {
        let request = RestrictRequest {
            scope: self.claims.iter().map(String::as_str).collect(),
        };
        debug!(claims = ?self.claims, "deriving restricted credential");
        let response = self
            .http
            .post(self.restrict_url.clone())
            .header(reqwest::header::AUTHORIZATION, parent.header_form())
            .json(&request)
            .send()
            .await
            .map_err(AuthError::Exchange)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::RemoteRejected {
                status,
                detail: sanitize_error_detail(&body),
            });
        }

        let body: RestrictResponse = response.json().await.map_err(AuthError::Exchange)?;
        Credential::derived(body.access_token, parent.expires_at(), parent.can_refresh())
    }
}

#[async_trait]
impl CredentialSource for RestrictedProvider {
    async fn credential(&self) -> Result<Credential, AuthError> {
        let mut current = self.current.lock().await;
        if let Some(credential) = &*current {
            if !credential.is_expired() {
                return Ok(credential.clone());
            }
        }
        let parent = self.parent.credential().await?;
        let derived = self.derive(&parent).await?;
        *current = Some(derived.clone());
        Ok(derived)
    }

    async fn refresh(&self) -> Result<Credential, AuthError> {
        let mut current = self.current.lock().await;
        let parent = self.parent.refresh().await?;
        let derived = self.derive(&parent).await?;
        *current = Some(derived.clone());
        Ok(derived)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_urls() -> (Url, Url) {
        (
            Url::parse("https://account.example.com/token").unwrap(),
            Url::parse("https://account.example.com/restrict").unwrap(),
        )
    }

    #[tokio::test]
    async fn test_static_key_issue_is_local() {
        let (token_url, restrict_url) = test_urls();
        let provider = TokenProvider::new(
            Grant::StaticKey {
                key: "app-key".to_string(),
            },
            token_url,
            restrict_url,
            "client",
            "secret",
        );

        // No server behind the URLs: issuing must still succeed
        let credential = provider.issue().await.unwrap();
        assert_eq!(credential.header_form(), "Key app-key");
        assert!(!credential.can_refresh());
    }

    #[tokio::test]
    async fn test_static_key_refresh_is_non_renewable() {
        let (token_url, restrict_url) = test_urls();
        let provider = TokenProvider::new(
            Grant::StaticKey {
                key: "app-key".to_string(),
            },
            token_url,
            restrict_url,
            "client",
            "secret",
        );
        let credential = provider.issue().await.unwrap();
        let err = provider.refresh_credential(&credential).await.unwrap_err();
        assert!(matches!(err, AuthError::NonRenewable));
    }

    #[test]
    fn test_token_request_password_body() {
        let request = TokenRequest::password("alice", "pw");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "grant_type": "password",
                "username": "alice",
                "password": "pw",
            })
        );
    }

    #[test]
    fn test_token_request_refresh_body() {
        let request = TokenRequest::refresh("client-1", "refresh-secret");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "grant_type": "refresh_token",
                "client_id": "client-1",
                "refresh_token": "refresh-secret",
            })
        );
    }

    #[test]
    fn test_token_response_optional_refresh_token() {
        let body: TokenResponse =
            serde_json::from_str(r#"{"access_token": "tok", "expires_in": 3600}"#).unwrap();
        assert_eq!(body.access_token, "tok");
        assert!(body.refresh_token.is_none());
    }

    #[test]
    fn test_restricted_claims_are_deduplicated_and_ordered() {
        let (_, restrict_url) = test_urls();
        let (token_url, _) = test_urls();
        let parent = Arc::new(TokenProvider::new(
            Grant::StaticKey {
                key: "k".to_string(),
            },
            token_url,
            restrict_url,
            "client",
            "secret",
        ));
        let restricted = parent.restrict(["devices:read", "apps:read", "devices:read"]);
        let claims: Vec<&str> = restricted.claims().iter().map(String::as_str).collect();
        assert_eq!(claims, vec!["apps:read", "devices:read"]);
    }
}
