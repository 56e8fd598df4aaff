//! All payloads that are sent to clients are defined here
//! along with the conversions from their collab counterparts

use std::sync::Arc;

use chrono::{DateTime, Utc};
use gramophone_collab::{
    ChatMessage as CollabChatMessage, CollabEvent, Identity, Room as CollabRoom,
    Track as CollabTrack,
};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    id: String,
    title: String,
    author: String,
    artwork: Option<String>,
    duration: Option<f32>,
    requested_by: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    user: String,
    message: String,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    id: String,
    host: Option<String>,
    members: Vec<String>,
    queue: Vec<Track>,
    current: Option<usize>,
}

/// Events sent to clients over the gateway socket
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
#[serde(rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// The authoritative room state after a mutation
    RoomSnapshot {
        queue: Vec<Track>,
        current: Option<usize>,
        chat: Vec<ChatMessage>,
        host: Option<String>,
        is_host: bool,
    },
    /// A new chat message, appended to the client's local log
    ChatMessage {
        user: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
    /// Someone else joined the room
    MemberJoined { identity: String },
    /// A command from this connection was not applied.
    /// Only ever sent to the connection that issued the command.
    CommandFailed { reason: String },
}

impl ServerEvent {
    /// Converts a collab event into the wire event seen by a specific
    /// recipient. Snapshots differ per recipient because of `isHost`.
    pub fn from_collab(event: &CollabEvent, recipient: &Identity) -> Self {
        match event {
            CollabEvent::RoomUpdate { snapshot, .. } => Self::RoomSnapshot {
                queue: snapshot.queue.to_serialized(),
                current: snapshot.current,
                chat: snapshot.chat.to_serialized(),
                host: snapshot.host.clone(),
                is_host: snapshot.host.as_ref() == Some(recipient),
            },
            CollabEvent::ChatMessage { message, .. } => Self::ChatMessage {
                user: message.user.clone(),
                message: message.message.clone(),
                timestamp: message.timestamp,
            },
            CollabEvent::MemberJoined { identity, .. } => Self::MemberJoined {
                identity: identity.clone(),
            },
        }
    }
}

/// Helper trait to convert any type into a serialized version
pub trait ToSerialized<T>
where
    T: Serialize,
{
    fn to_serialized(&self) -> T;
}

impl<I, O> ToSerialized<Vec<O>> for Vec<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Vec<O> {
        self.iter().map(|x| x.to_serialized()).collect()
    }
}

impl ToSerialized<Track> for CollabTrack {
    fn to_serialized(&self) -> Track {
        Track {
            id: self.id.clone(),
            title: self.title.clone(),
            author: self.author.clone(),
            artwork: self.artwork.clone(),
            duration: self.duration,
            requested_by: self.requested_by.clone(),
        }
    }
}

impl ToSerialized<ChatMessage> for CollabChatMessage {
    fn to_serialized(&self) -> ChatMessage {
        ChatMessage {
            user: self.user.clone(),
            message: self.message.clone(),
            timestamp: self.timestamp,
        }
    }
}

impl ToSerialized<Room> for Arc<CollabRoom> {
    fn to_serialized(&self) -> Room {
        let snapshot = self.snapshot();

        Room {
            id: self.id().clone(),
            host: snapshot.host,
            members: self.members(),
            queue: snapshot.queue.to_serialized(),
            current: snapshot.current,
        }
    }
}
