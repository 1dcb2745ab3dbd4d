// ABOUTME: Shared test utilities and fixtures for integration tests
// ABOUTME: Provides a controllable clock, seeded stores, and provider wiring helpers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oauth2-provider-core contributors
#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use oauth2_provider_core::config::{Clock, ProviderConfig};
use oauth2_provider_core::issuer::CredentialIssuer;
use oauth2_provider_core::models::Client;
use oauth2_provider_core::resource::ResourceValidator;
use oauth2_provider_core::scope::ExactScopeMatcher;
use oauth2_provider_core::storage::MemoryStore;
use oauth2_provider_core::token_endpoint::{TokenEndpoint, TokenRequest};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once};
use uuid::Uuid;

static INIT_LOGGER: Once = Once::new();

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("warn")
            .with_test_writer()
            .try_init();
    });
}

/// A clock the tests can move by hand
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn at(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(now),
        })
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

pub fn confidential_client(identifier: &str, secret: &str, redirect_uri: Option<&str>) -> Client {
    Client {
        id: Uuid::new_v4(),
        identifier: identifier.to_owned(),
        secret: secret.to_owned(),
        name: format!("Test Client {identifier}"),
        redirect_uri: redirect_uri.map(str::to_owned),
        confidential: true,
        created_at: Utc::now(),
    }
}

pub fn public_client(identifier: &str, secret: &str) -> Client {
    Client {
        confidential: false,
        ..confidential_client(identifier, secret, None)
    }
}

/// Fully wired provider over a seeded in-memory store
pub struct TestProvider {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<FixedClock>,
    pub issuer: Arc<CredentialIssuer>,
    pub endpoint: TokenEndpoint,
    pub validator: ResourceValidator,
}

impl TestProvider {
    pub fn new() -> Self {
        Self::with_config(ProviderConfig::default())
    }

    pub fn with_config(config: ProviderConfig) -> Self {
        init_test_logging();
        let store = Arc::new(MemoryStore::new());
        let clock = FixedClock::at(Utc::now());
        let issuer = Arc::new(CredentialIssuer::new(
            store.clone(),
            store.clone(),
            store.clone(),
            config,
            clock.clone(),
        ));
        let endpoint = TokenEndpoint::new(store.clone(), store.clone(), issuer.clone());
        let validator = ResourceValidator::new(
            store.clone(),
            store.clone(),
            Arc::new(ExactScopeMatcher),
            clock.clone(),
        );
        Self {
            store,
            clock,
            issuer,
            endpoint,
            validator,
        }
    }

    /// Seed the default confidential client and resource owner most tests use
    pub fn seed_defaults(&self) -> Uuid {
        self.store.add_client(confidential_client(
            "app-1",
            "s3cret",
            Some("https://app.example.com/cb"),
        ));
        self.store.add_resource_owner("alice", "wonderland")
    }
}

/// Build a POST token request from literal parameter pairs
pub fn token_post(params: &[(&str, &str)]) -> TokenRequest {
    TokenRequest::post(
        params
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect::<HashMap<_, _>>(),
    )
}

/// The standard password-grant request against the seeded defaults
pub fn password_request() -> TokenRequest {
    token_post(&[
        ("grant_type", "password"),
        ("client_id", "app-1"),
        ("client_secret", "s3cret"),
        ("username", "alice"),
        ("password", "wonderland"),
    ])
}
