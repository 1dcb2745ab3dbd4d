// ABOUTME: Token model entities: clients, authorizations, access tokens, and authorization codes
// ABOUTME: Carries the expiry and ownership invariants the issuer and validator rely on
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oauth2-provider-core contributors

//! The authorization data model.
//!
//! All expiry arithmetic is wall-clock based and takes `now` explicitly;
//! callers obtain it from an injected [`crate::config::Clock`].

use crate::scope::Scope;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// The four grant types this core dispatches on, plus extension types.
///
/// Static mapping from the wire string; extension grant types are the
/// URI-shaped identifiers RFC 6749 §4.5 permits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GrantType {
    /// `password` — resource-owner credentials
    Password,
    /// `authorization_code` — front-channel code exchange
    AuthorizationCode,
    /// `refresh_token`
    RefreshToken,
    /// `client_credentials` — confidential clients only
    ClientCredentials,
    /// Any other grant-type identifier, handled by a registered extension
    Extension(String),
}

impl GrantType {
    /// Map a wire string onto a grant type
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "password" => Self::Password,
            "authorization_code" => Self::AuthorizationCode,
            "refresh_token" => Self::RefreshToken,
            "client_credentials" => Self::ClientCredentials,
            other => Self::Extension(other.to_owned()),
        }
    }

    /// The wire representation
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Password => "password",
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
            Self::ClientCredentials => "client_credentials",
            Self::Extension(raw) => raw,
        }
    }
}

/// Shared expiry behavior for time-bounded credentials
pub trait TokenExpiry {
    /// When this credential stops being valid, if it expires at all
    fn expiry(&self) -> Option<DateTime<Utc>>;

    /// Whether the credential has expired as of `now`
    fn expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry().is_some_and(|at| at < now)
    }

    /// Seconds until expiry: 0 at and after the expiry instant, never
    /// negative; `None` for credentials without an expiry
    fn expires_in(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expiry()
            .map(|at| (at.timestamp() - now.timestamp()).max(0))
    }
}

/// A registered application.
///
/// Created by an external registration process; read-only to this core.
/// The identifier is globally unique and immutable once issued.
#[derive(Debug, Clone)]
pub struct Client {
    /// Internal id
    pub id: Uuid,
    /// OAuth client identifier, presented as `client_id`
    pub identifier: String,
    /// Shared secret, presented as `client_secret`
    pub secret: String,
    /// Human-readable client name
    pub name: String,
    /// Optional redirect-URI restriction for the authorization-code flow
    pub redirect_uri: Option<String>,
    /// Confidential clients hold their secret privately and may use the
    /// client_credentials grant; public clients may not
    pub confidential: bool,
    /// When this client was registered
    pub created_at: DateTime<Utc>,
}

impl Client {
    /// Whether this client may use the given grant type.
    ///
    /// Only `client_credentials` is restricted (to confidential clients);
    /// the standard grant types and arbitrary extension identifiers are
    /// always allowed.
    #[must_use]
    pub fn allows_grant_type(&self, grant_type: &str) -> bool {
        match GrantType::parse(grant_type) {
            GrantType::ClientCredentials => self.confidential,
            _ => true,
        }
    }

    /// Whether a redirect to `uri` is permitted.
    ///
    /// A syntactically invalid URI is never allowed. Without a configured
    /// restriction (or with an empty one) any absolute URI passes; with one,
    /// scheme, host, and port must match the configured URI. Paths are not
    /// compared.
    #[must_use]
    pub fn allows_redirection(&self, uri: &str) -> bool {
        let Ok(supplied) = Url::parse(uri) else {
            return false;
        };

        match self.redirect_uri.as_deref() {
            None | Some("") => true,
            Some(configured) => {
                let Ok(configured) = Url::parse(configured) else {
                    return false;
                };
                supplied.scheme() == configured.scheme()
                    && supplied.host_str() == configured.host_str()
                    && supplied.port_or_known_default() == configured.port_or_known_default()
            }
        }
    }
}

/// Who consented to an authorization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceOwner {
    /// A resource owner authenticated by the surrounding application
    User(Uuid),
    /// The client itself, acting as its own owner (client_credentials grant)
    Client(String),
}

/// The durable grant linking a resource owner to a client for a scope.
///
/// Never mutated after creation except through expiry passing.
#[derive(Debug, Clone)]
pub struct Authorization {
    /// Internal id, referenced by access tokens and authorization codes
    pub id: Uuid,
    /// OAuth identifier of the granted client
    pub client_id: String,
    /// The consenting owner
    pub owner: ResourceOwner,
    /// Granted capabilities
    pub scope: Scope,
    /// Optional expiry ceiling; access tokens never outlive it
    pub expires_at: Option<DateTime<Utc>>,
    /// When the grant was made
    pub created_at: DateTime<Utc>,
}

impl TokenExpiry for Authorization {
    fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }
}

impl Authorization {
    /// An authorization is fresh while it has not expired
    #[must_use]
    pub fn fresh(&self, now: DateTime<Utc>) -> bool {
        !self.expired(now)
    }
}

/// A bearer credential.
///
/// Immutable after creation: refreshing issues a new token on the same
/// authorization and leaves this record untouched.
#[derive(Debug, Clone)]
pub struct AccessToken {
    /// Opaque unique token string
    pub token: String,
    /// Opaque unique refresh token; absent for client_credentials issuance
    pub refresh_token: Option<String>,
    /// The authorization this token was issued under
    pub authorization_id: Uuid,
    /// OAuth identifier of the client the token was issued to
    pub client_id: String,
    /// Expiry, capped by the authorization's expiry when that is set
    pub expires_at: Option<DateTime<Utc>>,
    /// When the token was issued
    pub created_at: DateTime<Utc>,
}

impl TokenExpiry for AccessToken {
    fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }
}

impl AccessToken {
    /// A token can be refreshed iff it carries a non-empty refresh token and
    /// its authorization is still fresh
    #[must_use]
    pub fn refreshable(&self, authorization: &Authorization, now: DateTime<Utc>) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
            && authorization.fresh(now)
    }

    /// The success-response body for this token: `access_token` always,
    /// `expires_in` only when an expiry exists, `refresh_token` only when
    /// non-empty
    #[must_use]
    pub fn payload(&self, now: DateTime<Utc>) -> TokenPayload {
        TokenPayload {
            access_token: self.token.clone(),
            expires_in: self.expires_in(now),
            refresh_token: self
                .refresh_token
                .clone()
                .filter(|token| !token.is_empty()),
            state: None,
        }
    }
}

/// Serialized form of an issued token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPayload {
    /// The bearer token string
    pub access_token: String,
    /// Seconds until expiry, omitted for non-expiring tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    /// Refresh token, omitted when the grant carries none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Echo of the caller's `state` parameter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// A short-lived, single-use exchange token bound to a redirect URI.
///
/// Created at the end of the front-channel authorization step; destroyed
/// atomically by a successful claim.
#[derive(Debug, Clone)]
pub struct AuthorizationCode {
    /// Opaque unique code string
    pub code: String,
    /// The authorization this code will convert into a token
    pub authorization_id: Uuid,
    /// OAuth identifier of the client the code was issued to; a claim by any
    /// other client fails like an unknown code
    pub client_id: String,
    /// The redirect URI the front-channel step used; claims must present it
    pub redirect_uri: String,
    /// Codes always expire (one minute by default)
    pub expires_at: DateTime<Utc>,
    /// When the code was issued
    pub created_at: DateTime<Utc>,
}

impl TokenExpiry for AuthorizationCode {
    fn expiry(&self) -> Option<DateTime<Utc>> {
        Some(self.expires_at)
    }
}

impl AuthorizationCode {
    /// Claimable while not expired
    #[must_use]
    pub fn fresh(&self, now: DateTime<Utc>) -> bool {
        !self.expired(now)
    }
}
