// ABOUTME: Credential issuer: random token generation, expiry capping, code claims, refresh
// ABOUTME: Uniqueness collisions from storage are retried locally with a bounded attempt count
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oauth2-provider-core contributors

use crate::config::{ProviderConfig, SharedClock};
use crate::errors::{AppError, AppResult};
use crate::models::{AccessToken, Authorization, AuthorizationCode, ResourceOwner};
use crate::scope::Scope;
use crate::storage::{
    AccessTokenStore, AuthorizationCodeStore, AuthorizationStore, StorageError,
};
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::Arc;
use uuid::Uuid;

/// Issues access tokens, refresh tokens, and authorization codes.
///
/// Storage and clock are injected; the issuer itself keeps no state between
/// requests and is safe to share across concurrent handlers.
pub struct CredentialIssuer {
    authorizations: Arc<dyn AuthorizationStore>,
    access_tokens: Arc<dyn AccessTokenStore>,
    codes: Arc<dyn AuthorizationCodeStore>,
    config: ProviderConfig,
    clock: SharedClock,
    rng: SystemRandom,
}

impl CredentialIssuer {
    /// Create an issuer over the given stores
    #[must_use]
    pub fn new(
        authorizations: Arc<dyn AuthorizationStore>,
        access_tokens: Arc<dyn AccessTokenStore>,
        codes: Arc<dyn AuthorizationCodeStore>,
        config: ProviderConfig,
        clock: SharedClock,
    ) -> Self {
        Self {
            authorizations,
            access_tokens,
            codes,
            config,
            clock,
            rng: SystemRandom::new(),
        }
    }

    /// Current instant from the injected clock
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Create and persist a new authorization for a successful grant
    ///
    /// # Errors
    /// Returns an error if the storage write fails.
    pub async fn grant_authorization(
        &self,
        owner: ResourceOwner,
        client_id: &str,
        scope: Scope,
        expires_at: Option<DateTime<Utc>>,
    ) -> AppResult<Authorization> {
        let authorization = Authorization {
            id: Uuid::new_v4(),
            client_id: client_id.to_owned(),
            owner,
            scope,
            expires_at,
            created_at: self.now(),
        };
        self.authorizations.store_authorization(&authorization).await?;
        tracing::debug!(client_id = %client_id, authorization_id = %authorization.id, "authorization created");
        Ok(authorization)
    }

    /// Issue a new access token under `authorization`.
    ///
    /// The expiry is `now + configured lifespan`, capped by the
    /// authorization's own expiry when that is set. `with_refresh = false`
    /// issues a token with no refresh token (client_credentials issuance).
    ///
    /// # Errors
    /// Returns an error if storage keeps rejecting generated tokens as
    /// non-unique after the configured attempt bound, or on any other
    /// storage failure.
    pub async fn issue_access_token(
        &self,
        authorization: &Authorization,
        with_refresh: bool,
    ) -> AppResult<AccessToken> {
        let now = self.now();
        let mut expires_at = self
            .config
            .access_token_lifespan
            .map(|lifespan| now + lifespan);

        // A token never outlives its authorization
        if let Some(ceiling) = authorization.expires_at {
            expires_at = Some(expires_at.map_or(ceiling, |at| at.min(ceiling)));
        }

        for attempt in 1..=self.config.max_generation_attempts {
            let token = AccessToken {
                token: self.random_token()?,
                refresh_token: if with_refresh {
                    Some(self.random_token()?)
                } else {
                    None
                },
                authorization_id: authorization.id,
                client_id: authorization.client_id.clone(),
                expires_at,
                created_at: now,
            };

            match self.access_tokens.store_token(&token).await {
                Ok(()) => {
                    tracing::info!(
                        client_id = %token.client_id,
                        authorization_id = %token.authorization_id,
                        expires_at = ?token.expires_at,
                        "access token issued"
                    );
                    return Ok(token);
                }
                Err(StorageError::Conflict { constraint }) => {
                    tracing::warn!(%constraint, attempt, "token collision, regenerating");
                }
                Err(other) => return Err(other.into()),
            }
        }

        Err(AppError::internal(format!(
            "token generation exhausted {} uniqueness retries",
            self.config.max_generation_attempts
        )))
    }

    /// Issue a new single-use authorization code bound to `redirect_uri`
    ///
    /// # Errors
    /// Same failure modes as [`Self::issue_access_token`].
    pub async fn issue_authorization_code(
        &self,
        authorization: &Authorization,
        redirect_uri: &str,
    ) -> AppResult<AuthorizationCode> {
        let now = self.now();
        let expires_at = now + self.config.authorization_code_lifespan;

        for attempt in 1..=self.config.max_generation_attempts {
            let code = AuthorizationCode {
                code: self.random_token()?,
                authorization_id: authorization.id,
                client_id: authorization.client_id.clone(),
                redirect_uri: redirect_uri.to_owned(),
                expires_at,
                created_at: now,
            };

            match self.codes.store_code(&code).await {
                Ok(()) => {
                    tracing::info!(
                        client_id = %authorization.client_id,
                        authorization_id = %authorization.id,
                        "authorization code issued"
                    );
                    return Ok(code);
                }
                Err(StorageError::Conflict { constraint }) => {
                    tracing::warn!(%constraint, attempt, "code collision, regenerating");
                }
                Err(other) => return Err(other.into()),
            }
        }

        Err(AppError::internal(format!(
            "code generation exhausted {} uniqueness retries",
            self.config.max_generation_attempts
        )))
    }

    /// Claim an authorization code for `client_id` and convert it into an
    /// access token.
    ///
    /// The storage claim is atomic and the client match is part of its
    /// predicate: a mismatched redirect URI, a claim by a client other than
    /// the one the code was issued to, an expired code, and an unknown code
    /// all come back as `None` with no side effect, indistinguishable to the
    /// caller.
    ///
    /// # Errors
    /// Returns an error only on storage failure.
    pub async fn claim_code(
        &self,
        code: &str,
        redirect_uri: &str,
        client_id: &str,
    ) -> AppResult<Option<AccessToken>> {
        let now = self.now();
        let Some(claimed) = self.codes.claim(code, redirect_uri, client_id, now).await? else {
            tracing::warn!(
                client_id = %client_id,
                "authorization code claim failed: unknown, expired, wrong client, or redirect mismatch"
            );
            return Ok(None);
        };

        let Some(authorization) = self
            .authorizations
            .get_authorization(claimed.authorization_id)
            .await?
        else {
            // The code referenced a grant that no longer exists; treat like
            // any other failed claim on the wire
            tracing::error!(
                authorization_id = %claimed.authorization_id,
                "claimed code references a missing authorization"
            );
            return Ok(None);
        };

        let token = self.issue_access_token(&authorization, true).await?;
        Ok(Some(token))
    }

    /// Exchange a refresh token for a new access token on the same
    /// authorization.
    ///
    /// Fails (`None`) when the refresh token is unknown, when the owning
    /// client does not match `client_id`, or when the token is not
    /// refreshable. The old token is never mutated; it continues toward its
    /// own expiry.
    ///
    /// # Errors
    /// Returns an error only on storage failure.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        client_id: &str,
    ) -> AppResult<Option<AccessToken>> {
        let now = self.now();
        let Some(existing) = self.access_tokens.find_by_refresh_token(refresh_token).await? else {
            tracing::warn!(client_id = %client_id, "refresh failed: no token matches the supplied refresh token");
            return Ok(None);
        };

        if existing.client_id != client_id {
            tracing::warn!(
                client_id = %client_id,
                owning_client = %existing.client_id,
                "refresh failed: token belongs to another client"
            );
            return Ok(None);
        }

        let Some(authorization) = self
            .authorizations
            .get_authorization(existing.authorization_id)
            .await?
        else {
            tracing::error!(
                authorization_id = %existing.authorization_id,
                "refresh failed: token references a missing authorization"
            );
            return Ok(None);
        };

        if !existing.refreshable(&authorization, now) {
            tracing::warn!(client_id = %client_id, "refresh failed: token is not refreshable");
            return Ok(None);
        }

        let token = self.issue_access_token(&authorization, true).await?;
        tracing::info!(
            client_id = %client_id,
            expires_at = ?token.expires_at,
            "session refreshed"
        );
        Ok(Some(token))
    }

    /// Generate a cryptographically random, URL-safe opaque token string
    fn random_token(&self) -> AppResult<String> {
        let mut bytes = vec![0u8; self.config.token_length_bytes];
        self.rng.fill(&mut bytes).map_err(|_| {
            AppError::internal("system RNG failure, cannot generate secure random bytes")
        })?;
        Ok(general_purpose::URL_SAFE_NO_PAD.encode(&bytes))
    }
}
