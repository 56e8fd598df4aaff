use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::Identity;

#[derive(Debug, Error)]
pub enum AuthError {
    /// The credential was rejected by the verifier
    #[error("Invalid credentials")]
    InvalidCredentials,
    /// The verifier could not be reached or took too long
    #[error("Identity verifier is unavailable: {0}")]
    Upstream(String),
}

/// Verifies an opaque credential with the external login service,
/// yielding the stable display identity it belongs to.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, credential: &str) -> Result<Identity, AuthError>;
}

/// An [IdentityVerifier] backed by a remote login service.
pub struct RemoteVerifier {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    username: String,
}

impl RemoteVerifier {
    /// How long a verification request may take before it is abandoned
    const TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(endpoint: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Self::TIMEOUT)
                .build()
                .expect("http client is built"),
            endpoint,
        }
    }
}

#[async_trait]
impl IdentityVerifier for RemoteVerifier {
    async fn verify(&self, credential: &str) -> Result<Identity, AuthError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "token": credential }))
            .send()
            .await
            .map_err(|e| AuthError::Upstream(e.to_string()))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(AuthError::InvalidCredentials);
        }

        let body: VerifyResponse = response
            .error_for_status()
            .map_err(|e| AuthError::Upstream(e.to_string()))?
            .json()
            .await
            .map_err(|e| AuthError::Upstream(e.to_string()))?;

        Ok(body.username)
    }
}

/// An [IdentityVerifier] that accepts any non-empty credential and uses
/// it as the display identity verbatim. Only meant for local development
/// when no login service is configured.
pub struct InsecureVerifier;

#[async_trait]
impl IdentityVerifier for InsecureVerifier {
    async fn verify(&self, credential: &str) -> Result<Identity, AuthError> {
        let trimmed = credential.trim();

        if trimmed.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        Ok(trimmed.to_string())
    }
}
