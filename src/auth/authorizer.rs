//! Outbound request authorization
//!
//! The authorizer sits between any outbound call and its transport. It asks
//! the configured [`CredentialSource`] for a valid credential, which performs
//! at most one refresh round trip per call, and attaches the header form. An
//! authorizer without a source passes calls through untouched (anonymous).

use super::{AuthError, CredentialSource};
use std::sync::Arc;

/// An outbound call that can carry an authorization header
pub trait AuthorizedRequest {
    /// Attach the authorization header value, replacing any existing one.
    fn set_authorization(&mut self, header_value: &str);
}

impl AuthorizedRequest for reqwest::header::HeaderMap {
    fn set_authorization(&mut self, header_value: &str) {
        // Token material is ASCII by construction; a header form that fails
        // to encode would mean a corrupted credential, not a caller error.
        if let Ok(value) = reqwest::header::HeaderValue::from_str(header_value) {
            self.insert(reqwest::header::AUTHORIZATION, value);
        }
    }
}

impl<T: AuthorizedRequest> AuthorizedRequest for &mut T {
    fn set_authorization(&mut self, header_value: &str) {
        (**self).set_authorization(header_value);
    }
}

/// Injects authorization into outbound calls, refreshing stale credentials
#[derive(Clone, Default)]
pub struct RequestAuthorizer {
    source: Option<Arc<dyn CredentialSource>>,
}

impl RequestAuthorizer {
    pub fn new(source: Arc<dyn CredentialSource>) -> Self {
        Self {
            source: Some(source),
        }
    }

    /// Authorizer for anonymous calls: every call passes through unchanged.
    pub fn anonymous() -> Self {
        Self { source: None }
    }

    /// Authorize one outbound call.
    ///
    /// The source resolves the credential: an expired-but-renewable one costs
    /// exactly one refresh round trip (refresh failures propagate, they are
    /// not retried); an expired non-renewable one fails with
    /// [`AuthError::Expired`] and zero network calls. The call is returned
    /// unmodified apart from the authorization header.
    pub async fn authorize<C: AuthorizedRequest>(&self, mut call: C) -> Result<C, AuthError> {
        let Some(source) = &self.source else {
            return Ok(call);
        };
        let credential = source.credential().await?;
        call.set_authorization(credential.header_form());
        Ok(call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthError, Credential};
    use crate::testing::mocks::MockCredentialSource;
    use chrono::{Duration, Utc};
    use reqwest::header::{HeaderMap, AUTHORIZATION};
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_anonymous_call_passes_through() {
        let authorizer = RequestAuthorizer::anonymous();
        let headers = authorizer.authorize(HeaderMap::new()).await.unwrap();
        assert!(headers.is_empty());
    }

    #[tokio::test]
    async fn test_fresh_credential_attaches_header() {
        let source = Arc::new(MockCredentialSource::new(Credential::key("app-key")));
        let authorizer = RequestAuthorizer::new(source);

        let headers = authorizer.authorize(HeaderMap::new()).await.unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Key app-key");
    }

    #[tokio::test]
    async fn test_expired_non_renewable_fails_without_refresh() {
        // Expires inside the skew window: already stale, not renewable
        let credential =
            Credential::bearer("tok", Some(Utc::now() + Duration::seconds(5)), None).unwrap();
        let source = Arc::new(MockCredentialSource::new(credential));
        let authorizer = RequestAuthorizer::new(source.clone());

        let err = authorizer.authorize(HeaderMap::new()).await.unwrap_err();
        assert!(matches!(err, AuthError::Expired));
        assert_eq!(source.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_authorize_is_idempotent() {
        let source = Arc::new(MockCredentialSource::new(Credential::key("app-key")));
        let authorizer = RequestAuthorizer::new(source);

        let headers = authorizer.authorize(HeaderMap::new()).await.unwrap();
        let headers = authorizer.authorize(headers).await.unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Key app-key");
    }
}
