// ABOUTME: Main library entry point for the OAuth2 provider core
// ABOUTME: Exposes the credential issuer, token endpoint pipeline, and resource validator
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oauth2-provider-core contributors

#![deny(unsafe_code)]

//! # OAuth2 Provider Core
//!
//! The storage- and framework-agnostic core of an OAuth2 authorization
//! server: the token/authorization data model, the credential issuer, the
//! grant-type dispatcher behind the token endpoint, and the bearer-token
//! validator for protected resources.
//!
//! The embedding application supplies the edges: an HTTP transport that
//! parses requests into [`token_endpoint::TokenRequest`] /
//! [`resource::ResourceRequest`] and renders the outcomes, and a storage
//! backend implementing the [`storage`] traits (the bundled
//! [`storage::MemoryStore`] is the reference backend for tests and demos).
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use oauth2_provider_core::config::{ProviderConfig, SystemClock};
//! use oauth2_provider_core::errors::AppResult;
//! use oauth2_provider_core::issuer::CredentialIssuer;
//! use oauth2_provider_core::storage::MemoryStore;
//! use oauth2_provider_core::token_endpoint::{TokenEndpoint, TokenRequest};
//!
//! #[tokio::main]
//! async fn main() -> AppResult<()> {
//!     let store = Arc::new(MemoryStore::new());
//!     let issuer = Arc::new(CredentialIssuer::new(
//!         store.clone(),
//!         store.clone(),
//!         store.clone(),
//!         ProviderConfig::default(),
//!         Arc::new(SystemClock),
//!     ));
//!     let endpoint = TokenEndpoint::new(store.clone(), store, issuer);
//!
//!     let response = endpoint
//!         .handle(&TokenRequest::post(HashMap::from([
//!             ("grant_type".into(), "client_credentials".into()),
//!             ("client_id".into(), "my-app".into()),
//!             ("client_secret".into(), "s3cret".into()),
//!         ])))
//!         .await?;
//!     println!("{}", response.status);
//!     Ok(())
//! }
//! ```

/// Provider tuning knobs and the injectable clock
pub mod config;

/// Application error types and HTTP status mapping
pub mod errors;

/// Credential issuer: tokens, refresh tokens, and authorization codes
pub mod issuer;

/// Structured logging initialization
pub mod logging;

/// Core protocol data model
pub mod models;

/// Bearer-token validation for protected resources
pub mod resource;

/// Scope sets and the pluggable scope-matching policy
pub mod scope;

/// Storage contracts and the in-memory reference backend
pub mod storage;

/// Token endpoint pipeline and grant dispatch
pub mod token_endpoint;

pub use config::{Clock, ProviderConfig, SharedClock, SystemClock};
pub use errors::{AppError, AppResult, ErrorCode};
pub use issuer::CredentialIssuer;
pub use models::{
    AccessToken, Authorization, AuthorizationCode, Client, GrantType, ResourceOwner, TokenExpiry,
    TokenPayload,
};
pub use resource::{AuthenticatedRequest, ResourceError, ResourceRequest, ResourceValidator};
pub use scope::{ExactScopeMatcher, Scope, ScopeMatcher};
pub use storage::{
    AccessTokenStore, AuthorizationCodeStore, AuthorizationStore, ClientStore, MemoryStore,
    ResourceOwnerStore, StorageError,
};
pub use token_endpoint::{
    GrantDecision, GrantHandler, ProtocolError, TokenEndpoint, TokenRequest, TokenResponse,
    TokenResponseBody,
};
