// ABOUTME: Token endpoint pipeline: client authentication, grant dispatch, response shaping
// ABOUTME: Wire errors stay within the five standard codes; internal failures bubble as AppError

// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oauth2-provider-core contributors

use crate::errors::AppResult;
use crate::issuer::CredentialIssuer;
use crate::models::{Client, GrantType, ResourceOwner, TokenPayload};
use crate::scope::Scope;
use crate::storage::{ClientStore, ResourceOwnerStore};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use http::{header, HeaderName, HeaderValue, Method, StatusCode};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Tokens issued here must never end up in shared caches
pub const CACHE_CONTROL_VALUE: &str = "no-cache, no-store, max-age=0, must-revalidate";

/// A token-endpoint request, already parsed out of the transport.
///
/// The embedding framework decodes the form body (and any Authorization
/// header) and hands over plain strings; the pipeline never touches raw HTTP.
#[derive(Debug, Clone)]
pub struct TokenRequest {
    /// HTTP method of the incoming request
    pub method: Method,
    /// Decoded body/query parameters
    pub params: HashMap<String, String>,
    /// Raw `Authorization` header value, if any
    pub authorization_header: Option<String>,
}

impl TokenRequest {
    /// A POST request carrying the given parameters
    #[must_use]
    pub fn post(params: HashMap<String, String>) -> Self {
        Self {
            method: Method::POST,
            params,
            authorization_header: None,
        }
    }

    /// Attach an `Authorization` header value
    #[must_use]
    pub fn with_authorization_header(mut self, value: impl Into<String>) -> Self {
        self.authorization_header = Some(value.into());
        self
    }

    // Key presence decides whether a parameter was supplied; an empty value
    // is a supplied-but-wrong credential, not a missing one
    fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// Protocol-level rejection, serialized verbatim into the response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProtocolError {
    /// One of the five standard error codes
    pub error: &'static str,
    /// Human-readable detail, safe for the wire
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl ProtocolError {
    #[must_use]
    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self {
            error: "invalid_request",
            error_description: Some(description.into()),
        }
    }

    #[must_use]
    pub fn invalid_client() -> Self {
        Self {
            error: "invalid_client",
            error_description: Some("client credentials are invalid".into()),
        }
    }

    #[must_use]
    pub fn unauthorized_client() -> Self {
        Self {
            error: "unauthorized_client",
            error_description: Some("client is not allowed to use this grant type".into()),
        }
    }

    #[must_use]
    pub fn unsupported_grant_type() -> Self {
        Self {
            error: "unsupported_grant_type",
            error_description: Some("the grant type is not supported by this provider".into()),
        }
    }

    #[must_use]
    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self {
            error: "invalid_grant",
            error_description: Some(description.into()),
        }
    }

    /// Missing-parameter rejection with singular/plural phrasing
    #[must_use]
    pub fn missing_params(names: &[&str]) -> Self {
        let quoted = names
            .iter()
            .map(|name| format!("'{name}'"))
            .collect::<Vec<_>>()
            .join(", ");
        let noun = if names.len() == 1 { "parameter" } else { "parameters" };
        Self::invalid_request(format!("missing {quoted} {noun}"))
    }

    /// HTTP status this rejection maps to
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self.error {
            "invalid_client" => StatusCode::UNAUTHORIZED,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// Outcome of a token-endpoint request, ready for the transport to render
#[derive(Debug, Clone)]
pub struct TokenResponse {
    /// HTTP status to send
    pub status: StatusCode,
    /// JSON body, if this outcome carries one
    pub body: Option<TokenResponseBody>,
}

/// The two body shapes the endpoint produces
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum TokenResponseBody {
    /// Issued credentials
    Success(TokenPayload),
    /// Protocol rejection
    Error(ProtocolError),
}

impl TokenResponse {
    fn success(payload: TokenPayload) -> Self {
        Self {
            status: StatusCode::OK,
            body: Some(TokenResponseBody::Success(payload)),
        }
    }

    fn error(error: ProtocolError) -> Self {
        Self {
            status: error.status(),
            body: Some(TokenResponseBody::Error(error)),
        }
    }

    fn method_not_allowed() -> Self {
        Self {
            status: StatusCode::METHOD_NOT_ALLOWED,
            body: None,
        }
    }

    /// Headers the transport must attach to this response
    #[must_use]
    pub fn headers(&self) -> Vec<(HeaderName, HeaderValue)> {
        if self.status == StatusCode::METHOD_NOT_ALLOWED {
            return vec![(header::ALLOW, HeaderValue::from_static("POST"))];
        }
        vec![
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            ),
            (
                header::CACHE_CONTROL,
                HeaderValue::from_static(CACHE_CONTROL_VALUE),
            ),
        ]
    }

    /// Serialize the body to its wire form
    ///
    /// # Errors
    /// Returns an error if JSON serialization fails.
    pub fn body_json(&self) -> serde_json::Result<Option<String>> {
        self.body
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
    }

    /// The protocol error carried by this response, if it is a rejection
    #[must_use]
    pub fn protocol_error(&self) -> Option<&ProtocolError> {
        match &self.body {
            Some(TokenResponseBody::Error(error)) => Some(error),
            _ => None,
        }
    }
}

/// What a custom grant handler decided for an authenticated client
#[derive(Debug)]
pub enum GrantDecision {
    /// Issue credentials for this owner and scope
    Granted {
        /// Who the resulting authorization belongs to
        owner: ResourceOwner,
        /// Capabilities to grant
        scope: Scope,
        /// Optional hard expiry for the authorization itself
        expires_at: Option<DateTime<Utc>>,
        /// Whether the issued token carries a refresh token
        with_refresh: bool,
    },
    /// Reject with a protocol error
    Denied(ProtocolError),
}

/// Handler for an extension grant type, registered by its URI
#[async_trait]
pub trait GrantHandler: Send + Sync {
    /// Decide the grant for an already-authenticated client.
    ///
    /// # Errors
    /// Internal failures only; protocol rejections go through
    /// [`GrantDecision::Denied`].
    async fn authorize(
        &self,
        client: &Client,
        params: &HashMap<String, String>,
    ) -> AppResult<GrantDecision>;
}

/// The token endpoint: authenticates clients and dispatches grant types.
///
/// Dispatch is a static match over [`GrantType`] with an explicit registry
/// for extension grants; there is no reflective handler lookup.
pub struct TokenEndpoint {
    clients: Arc<dyn ClientStore>,
    resource_owners: Arc<dyn ResourceOwnerStore>,
    issuer: Arc<CredentialIssuer>,
    custom_grants: HashMap<String, Arc<dyn GrantHandler>>,
}

impl TokenEndpoint {
    /// Create an endpoint with no custom grants registered
    #[must_use]
    pub fn new(
        clients: Arc<dyn ClientStore>,
        resource_owners: Arc<dyn ResourceOwnerStore>,
        issuer: Arc<CredentialIssuer>,
    ) -> Self {
        Self {
            clients,
            resource_owners,
            issuer,
            custom_grants: HashMap::new(),
        }
    }

    /// Register a handler for an extension grant type
    #[must_use]
    pub fn register_grant(
        mut self,
        grant_type: impl Into<String>,
        handler: Arc<dyn GrantHandler>,
    ) -> Self {
        self.custom_grants.insert(grant_type.into(), handler);
        self
    }

    /// Run the full token-endpoint pipeline for one request.
    ///
    /// Every protocol-level outcome, success or rejection, comes back as
    /// `Ok(TokenResponse)`. An `Err` means an internal failure (storage,
    /// RNG); the transport renders those as its own 5xx without leaking
    /// detail onto the wire.
    ///
    /// # Errors
    /// Internal failures only, as described above.
    pub async fn handle(&self, request: &TokenRequest) -> AppResult<TokenResponse> {
        if request.method != Method::POST {
            tracing::warn!(method = %request.method, "token endpoint rejected non-POST request");
            return Ok(TokenResponse::method_not_allowed());
        }

        // Basic-auth credentials take precedence over body parameters
        let basic = request
            .authorization_header
            .as_deref()
            .and_then(decode_basic_credentials);
        let (client_id, client_secret) = match &basic {
            Some((id, secret)) => (Some(id.as_str()), Some(secret.as_str())),
            None => (request.param("client_id"), request.param("client_secret")),
        };

        let grant_type = request.param("grant_type");
        if let Some(grant_type) = grant_type {
            if !self.supports(grant_type) {
                tracing::warn!(grant_type = %grant_type, "unsupported grant type requested");
                return Ok(TokenResponse::error(ProtocolError::unsupported_grant_type()));
            }
        }

        let mut missing = Vec::new();
        if grant_type.is_none() {
            missing.push("grant_type");
        }
        if client_id.is_none() {
            missing.push("client_id");
        }
        if client_secret.is_none() {
            missing.push("client_secret");
        }
        if !missing.is_empty() {
            return Ok(TokenResponse::error(ProtocolError::missing_params(&missing)));
        }
        let (grant_type, client_id, client_secret) = (
            grant_type.unwrap_or_default(),
            client_id.unwrap_or_default(),
            client_secret.unwrap_or_default(),
        );

        let Some(client) = self
            .clients
            .find_by_credentials(client_id, client_secret)
            .await?
        else {
            tracing::warn!(client_id = %client_id, "client authentication failed");
            return Ok(TokenResponse::error(ProtocolError::invalid_client()));
        };

        if !client.allows_grant_type(grant_type) {
            tracing::warn!(client_id = %client.identifier, grant_type = %grant_type, "grant type not allowed for client");
            return Ok(TokenResponse::error(ProtocolError::unauthorized_client()));
        }

        match self.dispatch(&client, grant_type, request).await? {
            Ok(payload) => {
                let payload = TokenPayload {
                    state: request.param("state").map(str::to_owned),
                    ..payload
                };
                Ok(TokenResponse::success(payload))
            }
            Err(error) => Ok(TokenResponse::error(error)),
        }
    }

    fn supports(&self, grant_type: &str) -> bool {
        match GrantType::parse(grant_type) {
            GrantType::Extension(uri) => self.custom_grants.contains_key(&uri),
            _ => true,
        }
    }

    async fn dispatch(
        &self,
        client: &Client,
        grant_type: &str,
        request: &TokenRequest,
    ) -> AppResult<Result<TokenPayload, ProtocolError>> {
        match GrantType::parse(grant_type) {
            GrantType::Password => self.handle_password(client, request).await,
            GrantType::AuthorizationCode => self.handle_authorization_code(client, request).await,
            GrantType::RefreshToken => self.handle_refresh_token(client, request).await,
            GrantType::ClientCredentials => self.handle_client_credentials(client, request).await,
            GrantType::Extension(uri) => self.handle_custom(client, &uri, request).await,
        }
    }

    async fn handle_password(
        &self,
        client: &Client,
        request: &TokenRequest,
    ) -> AppResult<Result<TokenPayload, ProtocolError>> {
        let mut missing = Vec::new();
        if request.param("username").is_none() {
            missing.push("username");
        }
        if request.param("password").is_none() {
            missing.push("password");
        }
        if !missing.is_empty() {
            return Ok(Err(ProtocolError::missing_params(&missing)));
        }
        let username = request.param("username").unwrap_or_default();
        let password = request.param("password").unwrap_or_default();

        let Some(owner_id) = self.resource_owners.authenticate(username, password).await? else {
            tracing::warn!(client_id = %client.identifier, "resource owner authentication failed");
            return Ok(Err(ProtocolError::invalid_grant(
                "resource owner credentials are invalid",
            )));
        };

        let scope = request.param("scope").map(Scope::parse).unwrap_or_default();
        let authorization = self
            .issuer
            .grant_authorization(ResourceOwner::User(owner_id), &client.identifier, scope, None)
            .await?;
        let token = self.issuer.issue_access_token(&authorization, true).await?;
        Ok(Ok(token.payload(self.issuer.now())))
    }

    async fn handle_authorization_code(
        &self,
        client: &Client,
        request: &TokenRequest,
    ) -> AppResult<Result<TokenPayload, ProtocolError>> {
        let mut missing = Vec::new();
        if request.param("code").is_none() {
            missing.push("code");
        }
        if request.param("redirect_uri").is_none() {
            missing.push("redirect_uri");
        }
        if !missing.is_empty() {
            return Ok(Err(ProtocolError::missing_params(&missing)));
        }
        let code = request.param("code").unwrap_or_default();
        let redirect_uri = request.param("redirect_uri").unwrap_or_default();

        match self
            .issuer
            .claim_code(code, redirect_uri, &client.identifier)
            .await?
        {
            Some(token) => Ok(Ok(token.payload(self.issuer.now()))),
            None => {
                tracing::warn!(client_id = %client.identifier, "authorization code exchange failed");
                Ok(Err(ProtocolError::invalid_grant(
                    "the authorization code is invalid or expired",
                )))
            }
        }
    }

    async fn handle_refresh_token(
        &self,
        client: &Client,
        request: &TokenRequest,
    ) -> AppResult<Result<TokenPayload, ProtocolError>> {
        let Some(refresh_token) = request.param("refresh_token") else {
            return Ok(Err(ProtocolError::missing_params(&["refresh_token"])));
        };

        match self.issuer.refresh(refresh_token, &client.identifier).await? {
            Some(token) => Ok(Ok(token.payload(self.issuer.now()))),
            None => Ok(Err(ProtocolError::invalid_grant(
                "the refresh token is invalid or expired",
            ))),
        }
    }

    async fn handle_client_credentials(
        &self,
        client: &Client,
        request: &TokenRequest,
    ) -> AppResult<Result<TokenPayload, ProtocolError>> {
        let scope = request.param("scope").map(Scope::parse).unwrap_or_default();
        let authorization = self
            .issuer
            .grant_authorization(
                ResourceOwner::Client(client.identifier.clone()),
                &client.identifier,
                scope,
                None,
            )
            .await?;
        // The client can always re-authenticate, so no refresh token
        let token = self.issuer.issue_access_token(&authorization, false).await?;
        Ok(Ok(token.payload(self.issuer.now())))
    }

    async fn handle_custom(
        &self,
        client: &Client,
        grant_type: &str,
        request: &TokenRequest,
    ) -> AppResult<Result<TokenPayload, ProtocolError>> {
        // supports() already checked registration
        let Some(handler) = self.custom_grants.get(grant_type) else {
            return Ok(Err(ProtocolError::unsupported_grant_type()));
        };

        match handler.authorize(client, &request.params).await? {
            GrantDecision::Granted {
                owner,
                scope,
                expires_at,
                with_refresh,
            } => {
                let authorization = self
                    .issuer
                    .grant_authorization(owner, &client.identifier, scope, expires_at)
                    .await?;
                let token = self
                    .issuer
                    .issue_access_token(&authorization, with_refresh)
                    .await?;
                Ok(Ok(token.payload(self.issuer.now())))
            }
            GrantDecision::Denied(error) => {
                tracing::warn!(client_id = %client.identifier, grant_type = %grant_type, error = %error.error, "custom grant denied");
                Ok(Err(error))
            }
        }
    }
}

/// Unpack `Authorization: Basic <base64(id:secret)>`; anything malformed is
/// ignored rather than rejected, leaving the body parameters in effect
fn decode_basic_credentials(header_value: &str) -> Option<(String, String)> {
    let encoded = header_value.strip_prefix("Basic ")?.trim();
    let decoded = general_purpose::STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (id, secret) = decoded.split_once(':')?;
    Some((id.to_owned(), secret.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_param_phrasing() {
        assert_eq!(
            ProtocolError::missing_params(&["grant_type"]).error_description,
            Some("missing 'grant_type' parameter".into())
        );
        assert_eq!(
            ProtocolError::missing_params(&["client_id", "client_secret"]).error_description,
            Some("missing 'client_id', 'client_secret' parameters".into())
        );
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(ProtocolError::invalid_client().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ProtocolError::invalid_request("x").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ProtocolError::unsupported_grant_type().status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_basic_header_decoding() {
        let encoded = general_purpose::STANDARD.encode("app-1:s3cret");
        let decoded = decode_basic_credentials(&format!("Basic {encoded}"));
        assert_eq!(decoded, Some(("app-1".into(), "s3cret".into())));

        assert!(decode_basic_credentials("Bearer abc").is_none());
        assert!(decode_basic_credentials("Basic !!!not-base64!!!").is_none());
        let no_colon = general_purpose::STANDARD.encode("just-a-name");
        assert!(decode_basic_credentials(&format!("Basic {no_colon}")).is_none());
    }

    #[test]
    fn test_response_headers() {
        let ok = TokenResponse::success(TokenPayload {
            access_token: "t".into(),
            expires_in: None,
            refresh_token: None,
            state: None,
        });
        let names: Vec<_> = ok.headers().into_iter().map(|(name, _)| name).collect();
        assert!(names.contains(&header::CONTENT_TYPE));
        assert!(names.contains(&header::CACHE_CONTROL));

        let rejected = TokenResponse::method_not_allowed();
        let headers = rejected.headers();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].0, header::ALLOW);
        assert_eq!(headers[0].1, HeaderValue::from_static("POST"));
    }
}
