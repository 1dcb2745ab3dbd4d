// ABOUTME: Integration tests for protected-resource token validation
// ABOUTME: Covers conflicting token sources, 401/403 separation, and per-request memoization
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oauth2-provider-core contributors

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use async_trait::async_trait;
use chrono::Duration;
use common::{FixedClock, TestProvider};
use http::StatusCode;
use oauth2_provider_core::models::{AccessToken, ResourceOwner};
use oauth2_provider_core::Clock;
use oauth2_provider_core::resource::{ResourceError, ResourceRequest, ResourceValidator};
use oauth2_provider_core::scope::{ExactScopeMatcher, Scope};
use oauth2_provider_core::storage::{AccessTokenStore, MemoryStore, StorageError};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Wrapper store counting token lookups so tests can assert on query volume
struct CountingStore {
    inner: Arc<MemoryStore>,
    lookups: AtomicU32,
}

impl CountingStore {
    fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            lookups: AtomicU32::new(0),
        }
    }

    fn lookup_count(&self) -> u32 {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccessTokenStore for CountingStore {
    async fn store_token(&self, token: &AccessToken) -> Result<(), StorageError> {
        self.inner.store_token(token).await
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<AccessToken>, StorageError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.find_by_token(token).await
    }

    async fn find_by_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<Option<AccessToken>, StorageError> {
        self.inner.find_by_refresh_token(refresh_token).await
    }
}

/// A provider whose validator runs through a counting token store
struct CountingFixture {
    provider: TestProvider,
    tokens: Arc<CountingStore>,
    validator: ResourceValidator,
}

impl CountingFixture {
    fn new() -> Self {
        let provider = TestProvider::new();
        let tokens = Arc::new(CountingStore::new(provider.store.clone()));
        let validator = ResourceValidator::new(
            tokens.clone(),
            provider.store.clone(),
            Arc::new(ExactScopeMatcher),
            provider.clock.clone(),
        );
        Self {
            provider,
            tokens,
            validator,
        }
    }

    async fn issue_token(&self, scope: &str, expires_in: Option<Duration>) -> AccessToken {
        let authorization = self
            .provider
            .issuer
            .grant_authorization(
                ResourceOwner::User(Uuid::new_v4()),
                "app-1",
                Scope::parse(scope),
                expires_in.map(|d| self.provider.clock.now() + d),
            )
            .await
            .unwrap();
        self.provider
            .issuer
            .issue_access_token(&authorization, true)
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn test_conflicting_sources_rejected_before_any_lookup() {
    let fixture = CountingFixture::new();
    let token = fixture.issue_token("read", None).await;

    // Real token in the param, different (also real-looking) token in the header
    let request = ResourceRequest::new(
        Some(token.token.clone()),
        Some("Bearer a-different-token".into()),
    );
    let error = fixture.validator.authenticate(&request).await.unwrap_err();

    assert_eq!(error, ResourceError::ConflictingTokens);
    assert_eq!(error.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error.error_code(), Some("invalid_request"));
    assert_eq!(fixture.tokens.lookup_count(), 0);
}

#[tokio::test]
async fn test_valid_token_from_either_source() {
    let fixture = CountingFixture::new();
    let token = fixture.issue_token("read", None).await;

    let via_param = ResourceRequest::new(Some(token.token.clone()), None);
    let authenticated = fixture.validator.authenticate(&via_param).await.unwrap();
    assert_eq!(authenticated.access_token.token, token.token);

    let via_header = ResourceRequest::new(None, Some(format!("Bearer {}", token.token)));
    let authenticated = fixture.validator.authenticate(&via_header).await.unwrap();
    assert_eq!(authenticated.access_token.token, token.token);

    // Agreeing sources are not a conflict
    let both = ResourceRequest::new(
        Some(token.token.clone()),
        Some(format!("Bearer {}", token.token)),
    );
    assert!(fixture.validator.authenticate(&both).await.is_ok());
}

#[tokio::test]
async fn test_absent_unknown_and_expired_are_externally_identical() {
    let fixture = CountingFixture::new();
    let token = fixture.issue_token("read", Some(Duration::hours(1))).await;

    let absent = ResourceRequest::new(None, None);
    let unknown = ResourceRequest::new(Some("never-issued".into()), None);
    assert_eq!(
        fixture.validator.authenticate(&absent).await.unwrap_err(),
        ResourceError::AuthenticationRequired
    );
    assert_eq!(
        fixture.validator.authenticate(&unknown).await.unwrap_err(),
        ResourceError::AuthenticationRequired
    );

    // Still valid now, identical rejection once the authorization lapses
    let live = ResourceRequest::new(Some(token.token.clone()), None);
    assert!(fixture.validator.authenticate(&live).await.is_ok());

    fixture.provider.clock.advance(Duration::hours(2));
    let lapsed = ResourceRequest::new(Some(token.token.clone()), None);
    let error = fixture.validator.authenticate(&lapsed).await.unwrap_err();
    assert_eq!(error, ResourceError::AuthenticationRequired);
    assert_eq!(error.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error.error_code(), Some("invalid_token"));
}

#[tokio::test]
async fn test_expired_token_rejected_even_under_fresh_authorization() {
    let provider = TestProvider::new();
    let clock: &Arc<FixedClock> = &provider.clock;
    let authorization = provider
        .issuer
        .grant_authorization(
            ResourceOwner::User(Uuid::new_v4()),
            "app-1",
            Scope::parse("read"),
            None,
        )
        .await
        .unwrap();
    let token = provider
        .issuer
        .issue_access_token(&authorization, true)
        .await
        .unwrap();

    // Past the 30-day token lifespan, authorization itself never expires
    clock.advance(Duration::days(31));
    let request = ResourceRequest::new(Some(token.token), None);
    assert_eq!(
        provider.validator.authenticate(&request).await.unwrap_err(),
        ResourceError::AuthenticationRequired
    );
}

#[tokio::test]
async fn test_scope_enforcement_is_distinct_from_authentication() {
    let fixture = CountingFixture::new();
    let token = fixture.issue_token("activities:read", None).await;

    let request = ResourceRequest::new(Some(token.token.clone()), None);
    assert!(fixture
        .validator
        .authenticate_with_scope(&request, "activities:read")
        .await
        .is_ok());

    let request = ResourceRequest::new(Some(token.token), None);
    let error = fixture
        .validator
        .authenticate_with_scope(&request, "activities:write")
        .await
        .unwrap_err();
    assert_eq!(
        error,
        ResourceError::InsufficientScope {
            required: "activities:write".into()
        }
    );
    assert_eq!(error.status(), StatusCode::FORBIDDEN);
    assert_eq!(error.error_code(), Some("insufficient_scope"));
}

#[tokio::test]
async fn test_validation_is_memoized_per_request() {
    let fixture = CountingFixture::new();
    let token = fixture.issue_token("read write", None).await;

    let request = ResourceRequest::new(Some(token.token), None);
    fixture.validator.authenticate(&request).await.unwrap();
    fixture.validator.authenticate(&request).await.unwrap();
    fixture
        .validator
        .authenticate_with_scope(&request, "read")
        .await
        .unwrap();
    fixture
        .validator
        .authenticate_with_scope(&request, "write")
        .await
        .unwrap();

    // One storage query serves every check on this request
    assert_eq!(fixture.tokens.lookup_count(), 1);
}

#[tokio::test]
async fn test_failed_validation_is_memoized_too() {
    let fixture = CountingFixture::new();

    let request = ResourceRequest::new(Some("never-issued".into()), None);
    let _ = fixture.validator.authenticate(&request).await;
    let _ = fixture.validator.authenticate(&request).await;
    assert_eq!(fixture.tokens.lookup_count(), 1);
}
