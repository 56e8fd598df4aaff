use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Identity;

/// A single entry in a room's queue.
///
/// Immutable once queued. Replacing a track means removing it and
/// adding a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    /// Provider-specific identifier, opaque to the room core
    pub id: String,
    pub title: String,
    pub author: String,
    pub artwork: Option<String>,
    /// Length in seconds, if the provider reports one
    pub duration: Option<f32>,
    #[serde(default)]
    pub requested_by: Option<Identity>,
}

/// A track resolved into something a client can actually play
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayableTrack {
    pub url: String,
    pub title: String,
    pub author: String,
}

/// A single entry in a room's chat log. Append-only, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub user: Identity,
    pub message: String,
    /// Assigned by the server at receipt, non-decreasing within a room
    pub timestamp: DateTime<Utc>,
}

/// The full observable state of a room, sent to clients after a mutation
#[derive(Debug, Clone, PartialEq)]
pub struct RoomSnapshot {
    pub queue: Vec<Track>,
    pub current: Option<usize>,
    pub chat: Vec<ChatMessage>,
    pub host: Option<Identity>,
}
