//! Identity and customer-profile collaborators.

use std::collections::HashMap;

use async_trait::async_trait;
use common::UserId;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::config::CollaboratorConfig;
use crate::error::{Result, SagaError};

/// Resolves a bearer token to the caller's internal user id.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, bearer_token: &str) -> Result<UserId>;
}

/// Display fields of a customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerProfile {
    pub full_name: String,
    pub email: Option<String>,
}

/// Looks up customer display fields.
#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    /// Returns `None` when the user has no profile.
    async fn lookup(&self, user_id: UserId, bearer_token: &str) -> Result<Option<CustomerProfile>>;
}

#[derive(Debug, Deserialize)]
struct AuthEnvelope {
    data: AuthUser,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserProfileBody {
    full_name: String,
    #[serde(default)]
    email: Option<String>,
}

fn build_client(config: &CollaboratorConfig) -> Result<Client> {
    Client::builder()
        .timeout(config.timeout)
        .build()
        .map_err(|e| SagaError::Configuration(e.to_string()))
}

/// Asks the auth service who owns a token: `GET {auth}/api/auth/user`.
#[derive(Debug, Clone)]
pub struct HttpIdentityResolver {
    client: Client,
    endpoint: String,
}

impl HttpIdentityResolver {
    pub fn new(config: &CollaboratorConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config)?,
            endpoint: format!("{}/api/auth/user", config.auth_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl IdentityResolver for HttpIdentityResolver {
    async fn resolve(&self, bearer_token: &str) -> Result<UserId> {
        let response = self
            .client
            .get(&self.endpoint)
            .bearer_auth(bearer_token)
            .send()
            .await
            .map_err(|e| SagaError::UpstreamUnavailable(format!("auth service: {e}")))?;

        match response.status() {
            status if status.is_success() => {
                let envelope: AuthEnvelope = response.json().await.map_err(|e| {
                    SagaError::UpstreamUnavailable(format!("auth service response: {e}"))
                })?;
                Ok(UserId::new(envelope.data.id))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SagaError::Unauthenticated(
                "token rejected by auth service".to_string(),
            )),
            status => Err(SagaError::UpstreamUnavailable(format!(
                "auth service responded with {status}"
            ))),
        }
    }
}

/// Fixed token table, for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityResolver {
    tokens: HashMap<String, UserId>,
    fallback: Option<UserId>,
}

impl StaticIdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves every non-empty token to `user_id`.
    pub fn accept_any(user_id: UserId) -> Self {
        Self {
            tokens: HashMap::new(),
            fallback: Some(user_id),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>, user_id: UserId) -> Self {
        self.tokens.insert(token.into(), user_id);
        self
    }
}

#[async_trait]
impl IdentityResolver for StaticIdentityResolver {
    async fn resolve(&self, bearer_token: &str) -> Result<UserId> {
        if bearer_token.is_empty() {
            return Err(SagaError::Unauthenticated("missing token".to_string()));
        }
        self.tokens
            .get(bearer_token)
            .copied()
            .or(self.fallback)
            .ok_or_else(|| SagaError::Unauthenticated("unknown token".to_string()))
    }
}

/// Reads profiles from the user service: `GET {user}/api/users/user/{id}`.
#[derive(Debug, Clone)]
pub struct HttpCustomerDirectory {
    client: Client,
    base_url: String,
}

impl HttpCustomerDirectory {
    pub fn new(config: &CollaboratorConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config)?,
            base_url: config.user_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl CustomerDirectory for HttpCustomerDirectory {
    async fn lookup(&self, user_id: UserId, bearer_token: &str) -> Result<Option<CustomerProfile>> {
        let response = self
            .client
            .get(format!("{}/api/users/user/{user_id}", self.base_url))
            .bearer_auth(bearer_token)
            .send()
            .await
            .map_err(|e| SagaError::UpstreamUnavailable(format!("user service: {e}")))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body: UserProfileBody = response.json().await.map_err(|e| {
                    SagaError::UpstreamUnavailable(format!("user service response: {e}"))
                })?;
                Ok(Some(CustomerProfile {
                    full_name: body.full_name,
                    email: body.email,
                }))
            }
            status => Err(SagaError::UpstreamUnavailable(format!(
                "user service responded with {status}"
            ))),
        }
    }
}

/// Fixed profile table, for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct StaticCustomerDirectory {
    profiles: HashMap<UserId, CustomerProfile>,
}

impl StaticCustomerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(mut self, user_id: UserId, profile: CustomerProfile) -> Self {
        self.profiles.insert(user_id, profile);
        self
    }
}

#[async_trait]
impl CustomerDirectory for StaticCustomerDirectory {
    async fn lookup(&self, user_id: UserId, _bearer_token: &str) -> Result<Option<CustomerProfile>> {
        Ok(self.profiles.get(&user_id).cloned())
    }
}
