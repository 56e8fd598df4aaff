use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::{PlayableTrack, Track};

#[derive(Debug, Error)]
pub enum InputError {
    /// The catalog knows the track but could not produce a playable URL
    #[error("Track could not be resolved")]
    ResolutionFailed,
    #[error("Catalog search failed: {0}")]
    SearchFailed(String),
    /// The catalog service could not be reached or took too long
    #[error("Catalog is unavailable: {0}")]
    Unavailable(String),
}

/// Resolves track identifiers into playable URLs and searches the
/// external catalog.
///
/// Implementations can be slow, so they must never be called while a
/// room's lock is held. Results are applied to a room afterwards, as a
/// plain state mutation.
#[async_trait]
pub trait TrackSource: Send + Sync {
    async fn resolve(&self, track_id: &str) -> Result<PlayableTrack, InputError>;

    async fn search(&self, query: &str) -> Result<Vec<Track>, InputError>;
}

/// A [TrackSource] backed by a remote catalog service.
pub struct RemoteTrackSource {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteTrackSource {
    /// How long a catalog request may take before it is abandoned
    const TIMEOUT: Duration = Duration::from_secs(10);

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
impl TrackSource for RemoteTrackSource {
    async fn resolve(&self, track_id: &str) -> Result<PlayableTrack, InputError> {
        let response = self
            .client
            .get(format!("{}/stream", self.endpoint))
            .query(&[("id", track_id)])
            .send()
            .await
            .map_err(|e| InputError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(InputError::ResolutionFailed);
        }

        response.json().await.map_err(|_| InputError::ResolutionFailed)
    }

    async fn search(&self, query: &str) -> Result<Vec<Track>, InputError> {
        let response = self
            .client
            .get(format!("{}/search", self.endpoint))
            .query(&[("query", query)])
            .send()
            .await
            .map_err(|e| InputError::Unavailable(e.to_string()))?;

        response
            .error_for_status()
            .map_err(|e| InputError::SearchFailed(e.to_string()))?
            .json()
            .await
            .map_err(|e| InputError::SearchFailed(e.to_string()))
    }
}

/// A [TrackSource] used when no catalog service is configured.
pub struct UnconfiguredTrackSource;

#[async_trait]
impl TrackSource for UnconfiguredTrackSource {
    async fn resolve(&self, _track_id: &str) -> Result<PlayableTrack, InputError> {
        Err(InputError::Unavailable("no catalog configured".to_string()))
    }

    async fn search(&self, _query: &str) -> Result<Vec<Track>, InputError> {
        Err(InputError::Unavailable("no catalog configured".to_string()))
    }
}
