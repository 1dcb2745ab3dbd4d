// ABOUTME: In-memory storage backend over sharded concurrent maps
// ABOUTME: Reference semantics for real backends; backs the test suite and demos
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oauth2-provider-core contributors

use super::{
    AccessTokenStore, AuthorizationCodeStore, AuthorizationStore, ClientStore, ResourceOwnerStore,
    StorageError,
};
use crate::models::{AccessToken, Authorization, AuthorizationCode, Client};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use subtle::ConstantTimeEq;
use uuid::Uuid;

struct OwnerRecord {
    id: Uuid,
    password: String,
}

/// In-process store implementing every repository contract.
///
/// `DashMap` gives sharded locking, and the entry API makes uniqueness
/// checks and code claims atomic, which is exactly the contract real
/// backends must honor with constraints and transactions.
#[derive(Default)]
pub struct MemoryStore {
    clients: DashMap<String, Client>,
    authorizations: DashMap<Uuid, Authorization>,
    access_tokens: DashMap<String, AccessToken>,
    // refresh token -> access token key
    refresh_index: DashMap<String, String>,
    codes: DashMap<String, AuthorizationCode>,
    owners: DashMap<String, OwnerRecord>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client (stands in for the out-of-scope registration flow)
    pub fn add_client(&self, client: Client) {
        self.clients.insert(client.identifier.clone(), client);
    }

    /// Register a resource owner with password credentials
    pub fn add_resource_owner(&self, username: &str, password: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.owners.insert(
            username.to_owned(),
            OwnerRecord {
                id,
                password: password.to_owned(),
            },
        );
        id
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[async_trait]
impl ClientStore for MemoryStore {
    async fn find_by_credentials(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<Option<Client>, StorageError> {
        Ok(self
            .clients
            .get(identifier)
            .filter(|client| constant_time_eq(&client.secret, secret))
            .map(|entry| entry.clone()))
    }

    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<Client>, StorageError> {
        Ok(self.clients.get(identifier).map(|entry| entry.clone()))
    }
}

#[async_trait]
impl AuthorizationStore for MemoryStore {
    async fn store_authorization(&self, authorization: &Authorization) -> Result<(), StorageError> {
        match self.authorizations.entry(authorization.id) {
            Entry::Occupied(_) => Err(StorageError::Conflict {
                constraint: "authorizations.id",
            }),
            Entry::Vacant(slot) => {
                slot.insert(authorization.clone());
                Ok(())
            }
        }
    }

    async fn get_authorization(&self, id: Uuid) -> Result<Option<Authorization>, StorageError> {
        Ok(self.authorizations.get(&id).map(|entry| entry.clone()))
    }
}

#[async_trait]
impl AccessTokenStore for MemoryStore {
    async fn store_token(&self, token: &AccessToken) -> Result<(), StorageError> {
        let refresh = token
            .refresh_token
            .as_deref()
            .filter(|value| !value.is_empty());

        if let Some(refresh) = refresh {
            match self.refresh_index.entry(refresh.to_owned()) {
                Entry::Occupied(_) => {
                    return Err(StorageError::Conflict {
                        constraint: "access_tokens.refresh_token",
                    })
                }
                Entry::Vacant(slot) => {
                    slot.insert(token.token.clone());
                }
            }
        }

        match self.access_tokens.entry(token.token.clone()) {
            Entry::Occupied(_) => {
                // Roll back the refresh index reservation
                if let Some(refresh) = refresh {
                    self.refresh_index.remove(refresh);
                }
                Err(StorageError::Conflict {
                    constraint: "access_tokens.token",
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(token.clone());
                Ok(())
            }
        }
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<AccessToken>, StorageError> {
        Ok(self.access_tokens.get(token).map(|entry| entry.clone()))
    }

    async fn find_by_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<Option<AccessToken>, StorageError> {
        let Some(key) = self
            .refresh_index
            .get(refresh_token)
            .map(|entry| entry.clone())
        else {
            return Ok(None);
        };
        Ok(self.access_tokens.get(&key).map(|entry| entry.clone()))
    }
}

#[async_trait]
impl AuthorizationCodeStore for MemoryStore {
    async fn store_code(&self, code: &AuthorizationCode) -> Result<(), StorageError> {
        match self.codes.entry(code.code.clone()) {
            Entry::Occupied(_) => Err(StorageError::Conflict {
                constraint: "authorization_codes.code",
            }),
            Entry::Vacant(slot) => {
                slot.insert(code.clone());
                Ok(())
            }
        }
    }

    async fn claim(
        &self,
        code: &str,
        redirect_uri: &str,
        client_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AuthorizationCode>, StorageError> {
        // remove_if holds the shard lock across check and delete, so at most
        // one concurrent claim can win; the client match is part of the same
        // predicate so a wrong-client attempt never destroys the code
        Ok(self
            .codes
            .remove_if(code, |_, stored| {
                stored.redirect_uri == redirect_uri
                    && stored.client_id == client_id
                    && stored.fresh(now)
            })
            .map(|(_, stored)| stored))
    }
}

#[async_trait]
impl ResourceOwnerStore for MemoryStore {
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<Uuid>, StorageError> {
        Ok(self
            .owners
            .get(username)
            .filter(|record| constant_time_eq(&record.password, password))
            .map(|record| record.id))
    }
}
