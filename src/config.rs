// ABOUTME: Explicit provider configuration and clock abstraction
// ABOUTME: Components receive lifespans, issuance bounds, and time as injected dependencies
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oauth2-provider-core contributors

//! Provider configuration.
//!
//! There is no global configuration singleton: the issuer, dispatcher, and
//! validator each take their configuration and clock at construction.

use chrono::{DateTime, Duration, Utc};
use std::env;
use std::sync::Arc;

/// Wall-clock source, injected so tests can pin time
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Shared clock handle
pub type SharedClock = Arc<dyn Clock>;

/// Configuration for credential issuance
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Access token lifespan from issuance; `None` issues non-expiring tokens
    /// (still capped by the authorization's expiry when set)
    pub access_token_lifespan: Option<Duration>,
    /// Authorization code lifespan; codes only need to survive one redirect
    pub authorization_code_lifespan: Duration,
    /// Random bytes per generated token string (base64url-encoded on top)
    pub token_length_bytes: usize,
    /// How many times issuance retries a uniqueness collision before giving up
    pub max_generation_attempts: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            // One month, matching the protocol default for bearer credentials
            access_token_lifespan: Some(Duration::days(30)),
            authorization_code_lifespan: Duration::minutes(1),
            token_length_bytes: 32,
            max_generation_attempts: 5,
        }
    }
}

impl ProviderConfig {
    /// Create configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let access_token_lifespan = env::var("OAUTH2_ACCESS_TOKEN_LIFESPAN_SECS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .map_or(defaults.access_token_lifespan, |secs| {
                if secs <= 0 {
                    None
                } else {
                    Some(Duration::seconds(secs))
                }
            });

        let authorization_code_lifespan = env::var("OAUTH2_AUTH_CODE_LIFESPAN_SECS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|secs| *secs > 0)
            .map_or(defaults.authorization_code_lifespan, Duration::seconds);

        let max_generation_attempts = env::var("OAUTH2_MAX_TOKEN_GENERATION_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.max_generation_attempts);

        Self {
            access_token_lifespan,
            authorization_code_lifespan,
            max_generation_attempts,
            ..defaults
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_protocol_lifespans() {
        let config = ProviderConfig::default();
        assert_eq!(config.access_token_lifespan, Some(Duration::days(30)));
        assert_eq!(config.authorization_code_lifespan, Duration::minutes(1));
        assert!(config.max_generation_attempts > 0);
    }

    #[test]
    fn test_system_clock_advances() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
