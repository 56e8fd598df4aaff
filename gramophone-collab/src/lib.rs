mod auth;
mod events;
mod input;
mod rooms;
mod track;
mod util;

use std::sync::Arc;

use dashmap::DashMap;

pub use auth::*;
pub use events::*;
pub use input::*;
pub use rooms::*;
pub use track::*;

/// A verified, stable display identity obtained from the external verifier.
pub type Identity = String;

/// The gramophone collab system, facilitating room management, playback control, and chat.
pub struct Collab {
    pub rooms: RoomManager,
    pub auth: Arc<dyn IdentityVerifier>,
    pub tracks: Arc<dyn TrackSource>,

    events: Events,
}

/// A type passed to various components of the collab system, to access state and emit events.
#[derive(Clone)]
pub struct CollabContext {
    pub rooms: Arc<DashMap<RoomId, Arc<Room>>>,
    events: Events,
}

impl Collab {
    pub fn new(auth: Arc<dyn IdentityVerifier>, tracks: Arc<dyn TrackSource>) -> Self {
        let events = Events::default();

        let context = CollabContext {
            rooms: Default::default(),
            events: events.clone(),
        };

        Self {
            rooms: RoomManager::new(&context),
            auth,
            tracks,
            events,
        }
    }

    /// Returns a receiver for the events emitted by this collab system
    pub fn events(&self) -> EventReceiver {
        self.events.receiver()
    }
}

impl CollabContext {
    pub(crate) fn emit(&self, event: CollabEvent, to: Recipients) {
        self.events.emit(event, to)
    }
}
