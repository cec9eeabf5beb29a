//! Credential lifecycle: acquisition, expiry, refresh, and scope restriction
//!
//! Every outbound call the SDK makes is authorized by a [`Credential`] obtained
//! from a [`CredentialSource`]. [`TokenProvider`] implements the grant
//! mechanisms (static key, password exchange, authorization code);
//! [`RestrictedProvider`] narrows an existing source to a claim subset while
//! keeping the narrowed scope stable across refresh cycles.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub mod authorizer;
pub mod credential;
pub mod provider;

pub use authorizer::{AuthorizedRequest, RequestAuthorizer};
pub use credential::{Credential, EXPIRY_SKEW_SECS};
pub use provider::{Grant, RestrictedProvider, TokenProvider};

/// Authorization errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// A credential must be issued with its expiry strictly in the future
    #[error("credential was already expired when issued (expired at {0})")]
    IssuedExpired(DateTime<Utc>),
    /// The credential is past its expiry and no refresh path exists
    #[error("credential expired and cannot be refreshed")]
    Expired,
    /// Refresh was requested on a credential that carries no refresh capability
    #[error("credential is not renewable")]
    NonRenewable,
    /// The token endpoint answered with a non-success status
    #[error("token endpoint rejected the request ({status}): {detail}")]
    RemoteRejected { status: u16, detail: String },
    /// The token exchange itself failed (network, TLS, malformed body)
    #[error("token exchange failed")]
    Exchange(#[source] reqwest::Error),
}

/// Strategy for obtaining and renewing credentials
///
/// Implementations own their current credential and coalesce concurrent
/// refreshes: callers waiting on the internal lock observe the credential the
/// winning caller stored instead of starting their own round trip.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Return a valid credential, issuing or refreshing as needed.
    ///
    /// An expired credential with no refresh path yields
    /// [`AuthError::Expired`] without any network traffic.
    async fn credential(&self) -> Result<Credential, AuthError>;

    /// Force a refresh cycle regardless of the cached credential's state.
    async fn refresh(&self) -> Result<Credential, AuthError>;
}
