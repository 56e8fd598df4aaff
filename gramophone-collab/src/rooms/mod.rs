mod room;

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use log::info;
use thiserror::Error;

use crate::{util::random_string, CollabContext};

pub use room::*;

/// The length of generated room identifiers
const ROOM_ID_LENGTH: usize = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoomError {
    #[error("Room not found")]
    RoomNotFound,
    #[error("User is not a member of this room")]
    UserNotInRoom,
    #[error("Only the host can control playback")]
    NotHost,
    #[error("Queue index {0} is out of bounds")]
    IndexOutOfBounds(usize),
    #[error("Chat message is empty")]
    EmptyMessage,
}

/// Creates, looks up, and removes rooms.
pub struct RoomManager {
    context: CollabContext,
}

impl RoomManager {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Creates a new empty room under a fresh identifier.
    /// Identifier collisions are retried against the registry.
    pub fn create_room(&self) -> Arc<Room> {
        loop {
            let id = random_string(ROOM_ID_LENGTH);

            if let Entry::Vacant(slot) = self.context.rooms.entry(id.clone()) {
                let room = Arc::new(Room::new(&self.context, id));
                slot.insert(room.clone());

                info!("Created room {}", room.id());
                return room;
            }
        }
    }

    /// Returns the room with the given id, if it exists
    pub fn room_by_id(&self, id: &str) -> Result<Arc<Room>, RoomError> {
        self.context
            .rooms
            .get(id)
            .map(|r| r.clone())
            .ok_or(RoomError::RoomNotFound)
    }

    /// Removes a room from the registry. Does nothing if it is already gone.
    pub fn remove(&self, id: &str) {
        self.context.rooms.remove(id);
    }

    /// All rooms currently in the registry
    pub fn list_all(&self) -> Vec<Arc<Room>> {
        self.context.rooms.iter().map(|r| r.clone()).collect()
    }
}
