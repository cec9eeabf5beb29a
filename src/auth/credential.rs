//! Bearer credential value object
//!
//! A [`Credential`] is immutable once issued. Replacement happens through its
//! provider: `refresh` produces a successor with a rotated refresh secret,
//! `restrict` produces a narrower-scoped sibling. Expiry is checked against a
//! fixed skew so callers stop using a token shortly before the remote side
//! would reject it.

use super::AuthError;
use chrono::{DateTime, Duration, Utc};

/// Seconds before literal expiry at which a credential is treated as expired
pub const EXPIRY_SKEW_SECS: i64 = 30;

/// A bearer token plus the metadata needed to decide when to stop using it
#[derive(Clone, PartialEq)]
pub struct Credential {
    raw_token: String,
    header_form: String,
    expires_at: Option<DateTime<Utc>>,
    renewable: bool,
    refresh_secret: Option<String>,
}

impl Credential {
    /// Create a bearer credential from a token exchange response.
    ///
    /// `expires_at` of `None` means the credential never expires. Renewability
    /// follows from the presence of a refresh secret.
    pub fn bearer(
        raw_token: impl Into<String>,
        expires_at: Option<DateTime<Utc>>,
        refresh_secret: Option<String>,
    ) -> Result<Self, AuthError> {
        let raw_token = raw_token.into();
        let header_form = format!("Bearer {raw_token}");
        let renewable = refresh_secret.is_some();
        Self::checked(raw_token, header_form, expires_at, renewable, refresh_secret)
    }

    /// Wrap a static access key. Key credentials never expire and are never
    /// renewable.
    pub fn key(raw_token: impl Into<String>) -> Self {
        let raw_token = raw_token.into();
        let header_form = format!("Key {raw_token}");
        Self {
            raw_token,
            header_form,
            expires_at: None,
            renewable: false,
            refresh_secret: None,
        }
    }

    /// Create a credential derived from a parent (scope restriction). The
    /// derived credential inherits the parent's expiry and renews through the
    /// parent chain rather than through a refresh secret of its own.
    pub(crate) fn derived(
        raw_token: impl Into<String>,
        expires_at: Option<DateTime<Utc>>,
        renewable: bool,
    ) -> Result<Self, AuthError> {
        let raw_token = raw_token.into();
        let header_form = format!("Bearer {raw_token}");
        Self::checked(raw_token, header_form, expires_at, renewable, None)
    }

    fn checked(
        raw_token: String,
        header_form: String,
        expires_at: Option<DateTime<Utc>>,
        renewable: bool,
        refresh_secret: Option<String>,
    ) -> Result<Self, AuthError> {
        if let Some(expires_at) = expires_at {
            if expires_at <= Utc::now() {
                return Err(AuthError::IssuedExpired(expires_at));
            }
        }
        Ok(Self {
            raw_token,
            header_form,
            expires_at,
            renewable,
            refresh_secret,
        })
    }

    /// The raw token, as sent to brokers that take it as a connection password
    pub fn raw_token(&self) -> &str {
        &self.raw_token
    }

    /// The authorization header value, e.g. `Bearer <token>` or `Key <token>`
    pub fn header_form(&self) -> &str {
        &self.header_form
    }

    /// Expiry instant; `None` means the credential never expires
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Whether a refresh path exists for this credential
    pub fn can_refresh(&self) -> bool {
        self.renewable
    }

    pub(crate) fn refresh_secret(&self) -> Option<&str> {
        self.refresh_secret.as_deref()
    }

    /// True once `now + skew` has reached the expiry instant. Never true for
    /// credentials without an expiry.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub(crate) fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now + Duration::seconds(EXPIRY_SKEW_SECS) >= expires_at,
            None => false,
        }
    }
}

// Token material stays out of debug output.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scheme = self.header_form.split(' ').next().unwrap_or("?");
        f.debug_struct("Credential")
            .field("scheme", &scheme)
            .field("expires_at", &self.expires_at)
            .field("renewable", &self.renewable)
            .finish()
    }
}
