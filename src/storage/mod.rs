// ABOUTME: Implementation-agnostic repository contracts consumed by the core
// ABOUTME: Storage owns uniqueness enforcement and atomic claim-and-delete for codes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oauth2-provider-core contributors

//! Storage contracts.
//!
//! The core never speaks a query language; it interacts with persistence
//! only through these traits. Backends must enforce uniqueness constraints
//! at the storage boundary ([`StorageError::Conflict`] is the reject-on-write
//! signal the issuer's retry loop understands) and must make
//! [`AuthorizationCodeStore::claim`] an indivisible claim-and-delete.

pub mod memory;

use crate::models::{AccessToken, Authorization, AuthorizationCode, Client};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

pub use memory::MemoryStore;

/// Errors surfaced by storage backends
#[derive(Debug, Error)]
pub enum StorageError {
    /// A uniqueness constraint rejected a write
    #[error("unique constraint violated on {constraint}")]
    Conflict {
        /// Name of the violated constraint
        constraint: &'static str,
    },
    /// Any other backend failure
    #[error("storage query failed: {context}")]
    Query {
        /// Backend-specific context for logs
        context: String,
    },
}

impl From<StorageError> for crate::errors::AppError {
    fn from(error: StorageError) -> Self {
        Self::storage(error.to_string())
    }
}

/// Read access to registered clients
#[async_trait]
pub trait ClientStore: Send + Sync {
    /// Exact match on identifier and secret.
    ///
    /// An absent result must not distinguish "unknown identifier" from
    /// "wrong secret".
    async fn find_by_credentials(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<Option<Client>, StorageError>;

    /// Lookup by identifier alone
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<Client>, StorageError>;
}

/// Durable authorization grants
#[async_trait]
pub trait AuthorizationStore: Send + Sync {
    /// Persist a new authorization
    async fn store_authorization(&self, authorization: &Authorization) -> Result<(), StorageError>;

    /// Lookup by id
    async fn get_authorization(&self, id: Uuid) -> Result<Option<Authorization>, StorageError>;
}

/// Issued bearer credentials
#[async_trait]
pub trait AccessTokenStore: Send + Sync {
    /// Persist a new token; uniqueness of both the token and refresh-token
    /// strings is enforced here, rejected writes come back as
    /// [`StorageError::Conflict`]
    async fn store_token(&self, token: &AccessToken) -> Result<(), StorageError>;

    /// Lookup by bearer token string
    async fn find_by_token(&self, token: &str) -> Result<Option<AccessToken>, StorageError>;

    /// Lookup by refresh token string
    async fn find_by_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<Option<AccessToken>, StorageError>;
}

/// Single-use authorization codes
#[async_trait]
pub trait AuthorizationCodeStore: Send + Sync {
    /// Persist a new code
    async fn store_code(&self, code: &AuthorizationCode) -> Result<(), StorageError>;

    /// Atomic claim-and-delete.
    ///
    /// Returns the code only when the (code, redirect_uri, client_id) triple
    /// matches and the code is fresh as of `now`, removing it in the same
    /// operation so no concurrent claim can succeed against it. A
    /// redirect-URI mismatch, a claim by the wrong client, an expired code,
    /// and an unknown code are indistinguishable (`None`), and none of them
    /// destroy the stored code.
    async fn claim(
        &self,
        code: &str,
        redirect_uri: &str,
        client_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AuthorizationCode>, StorageError>;
}

/// Resource-owner credential verification, delegated to the application
#[async_trait]
pub trait ResourceOwnerStore: Send + Sync {
    /// Authenticate a resource owner; `None` for any credential failure
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<Uuid>, StorageError>;
}
