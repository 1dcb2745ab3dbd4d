// ABOUTME: Bearer-token validation for protected resource requests
// ABOUTME: Conflicting token sources fail before lookup; absent and expired tokens are externally identical

// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oauth2-provider-core contributors

use crate::config::SharedClock;
use crate::models::{AccessToken, Authorization, TokenExpiry};
use crate::scope::ScopeMatcher;
use crate::storage::{AccessTokenStore, AuthorizationStore};
use http::StatusCode;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;

/// Why a protected-resource request was rejected
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResourceError {
    /// The parameter and the header both carried a token and they differ
    #[error("request supplied conflicting access tokens")]
    ConflictingTokens,
    /// No valid token: absent, unknown, or expired
    #[error("authentication required to access this resource")]
    AuthenticationRequired,
    /// Valid token, but the granted scope does not cover the resource
    #[error("granted scope does not cover '{required}'")]
    InsufficientScope {
        /// The capability the resource demanded
        required: String,
    },
    /// Backend failure during validation
    #[error("storage failure during token validation: {context}")]
    Storage {
        /// Backend-specific context for logs
        context: String,
    },
}

impl ResourceError {
    /// HTTP status this rejection maps to
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::ConflictingTokens => StatusCode::BAD_REQUEST,
            Self::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            Self::InsufficientScope { .. } => StatusCode::FORBIDDEN,
            Self::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Standard error code for `WWW-Authenticate` / error bodies, when one exists
    #[must_use]
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::ConflictingTokens => Some("invalid_request"),
            Self::AuthenticationRequired => Some("invalid_token"),
            Self::InsufficientScope { .. } => Some("insufficient_scope"),
            Self::Storage { .. } => None,
        }
    }
}

/// A request to a protected resource, carrying its candidate token sources.
///
/// Validation results are memoized per request: however many times the
/// application consults the validator while serving one request, storage is
/// queried at most once.
pub struct ResourceRequest {
    oauth_token_param: Option<String>,
    authorization_header: Option<String>,
    outcome: OnceCell<Result<AuthenticatedRequest, ResourceError>>,
}

impl ResourceRequest {
    /// Build from the transport's `oauth_token` parameter and `Authorization`
    /// header, either of which may be absent
    #[must_use]
    pub fn new(oauth_token_param: Option<String>, authorization_header: Option<String>) -> Self {
        Self {
            oauth_token_param,
            authorization_header,
            outcome: OnceCell::new(),
        }
    }

    /// The token this request presents, decided without touching storage.
    ///
    /// # Errors
    /// [`ResourceError::ConflictingTokens`] when the parameter and the header
    /// disagree.
    pub fn presented_token(&self) -> Result<Option<&str>, ResourceError> {
        let from_param = self.oauth_token_param.as_deref().filter(|t| !t.is_empty());
        let from_header = self
            .authorization_header
            .as_deref()
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty());

        match (from_param, from_header) {
            (Some(a), Some(b)) if a != b => Err(ResourceError::ConflictingTokens),
            (Some(token), _) | (None, Some(token)) => Ok(Some(token)),
            (None, None) => Ok(None),
        }
    }
}

/// A successfully validated request
#[derive(Debug, Clone)]
pub struct AuthenticatedRequest {
    /// The presented token's stored record
    pub access_token: AccessToken,
    /// The authorization the token was issued under
    pub authorization: Authorization,
}

/// Validates bearer tokens against storage for protected resources
pub struct ResourceValidator {
    access_tokens: Arc<dyn AccessTokenStore>,
    authorizations: Arc<dyn AuthorizationStore>,
    scope_matcher: Arc<dyn ScopeMatcher>,
    clock: SharedClock,
}

impl ResourceValidator {
    /// Create a validator with the given scope policy
    #[must_use]
    pub fn new(
        access_tokens: Arc<dyn AccessTokenStore>,
        authorizations: Arc<dyn AuthorizationStore>,
        scope_matcher: Arc<dyn ScopeMatcher>,
        clock: SharedClock,
    ) -> Self {
        Self {
            access_tokens,
            authorizations,
            scope_matcher,
            clock,
        }
    }

    /// Validate the request's token without a scope requirement.
    ///
    /// Repeated calls on the same [`ResourceRequest`] reuse the first
    /// outcome instead of querying storage again.
    ///
    /// # Errors
    /// Any [`ResourceError`] variant except `InsufficientScope`.
    pub async fn authenticate(
        &self,
        request: &ResourceRequest,
    ) -> Result<AuthenticatedRequest, ResourceError> {
        request
            .outcome
            .get_or_init(|| self.validate(request))
            .await
            .clone()
    }

    /// Validate the token and require one capability from its scope
    ///
    /// # Errors
    /// Any [`ResourceError`] variant.
    pub async fn authenticate_with_scope(
        &self,
        request: &ResourceRequest,
        required: &str,
    ) -> Result<AuthenticatedRequest, ResourceError> {
        let authenticated = self.authenticate(request).await?;
        if !self
            .scope_matcher
            .satisfies(&authenticated.authorization.scope, required)
        {
            tracing::warn!(
                client_id = %authenticated.access_token.client_id,
                required = %required,
                granted = %authenticated.authorization.scope,
                "resource access denied: insufficient scope"
            );
            return Err(ResourceError::InsufficientScope {
                required: required.to_owned(),
            });
        }
        Ok(authenticated)
    }

    async fn validate(
        &self,
        request: &ResourceRequest,
    ) -> Result<AuthenticatedRequest, ResourceError> {
        // The conflict check must reject before any storage access
        let Some(token) = request.presented_token()? else {
            tracing::debug!("resource request presented no access token");
            return Err(ResourceError::AuthenticationRequired);
        };

        let found = self
            .access_tokens
            .find_by_token(token)
            .await
            .map_err(|error| ResourceError::Storage {
                context: error.to_string(),
            })?;

        let Some(access_token) = found else {
            tracing::warn!("resource request presented an unknown access token");
            return Err(ResourceError::AuthenticationRequired);
        };

        let now = self.clock.now();
        if access_token.expired(now) {
            // Externally identical to an unknown token, but logged apart
            tracing::warn!(
                client_id = %access_token.client_id,
                expired_at = ?access_token.expires_at,
                "resource request presented an expired access token"
            );
            return Err(ResourceError::AuthenticationRequired);
        }

        let authorization = self
            .authorizations
            .get_authorization(access_token.authorization_id)
            .await
            .map_err(|error| ResourceError::Storage {
                context: error.to_string(),
            })?
            .ok_or_else(|| {
                tracing::error!(
                    authorization_id = %access_token.authorization_id,
                    "access token references a missing authorization"
                );
                ResourceError::AuthenticationRequired
            })?;

        if !authorization.fresh(now) {
            tracing::warn!(
                client_id = %access_token.client_id,
                "resource request presented a token under an expired authorization"
            );
            return Err(ResourceError::AuthenticationRequired);
        }

        Ok(AuthenticatedRequest {
            access_token,
            authorization,
        })
    }
}
