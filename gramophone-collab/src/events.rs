use crossbeam::channel::{unbounded, Receiver, Sender};

use crate::{ChatMessage, Identity, RoomId, RoomSnapshot};

type Message = (CollabEvent, Recipients);

pub type EventReceiver = Receiver<Message>;

/// Which members of a room an event should be delivered to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipients {
    AllMembers,
    Except(Identity),
    Only(Identity),
}

/// Events emitted by the room state machine.
///
/// Events are emitted while the room's lock is held, so the order they
/// appear on the channel is the order the room applied its operations.
#[derive(Debug, Clone)]
pub enum CollabEvent {
    /// The authoritative state of a room changed
    RoomUpdate {
        room_id: RoomId,
        snapshot: RoomSnapshot,
    },
    /// A chat message was appended to a room's log
    ChatMessage {
        room_id: RoomId,
        message: ChatMessage,
    },
    /// An identity became a member of a room
    MemberJoined { room_id: RoomId, identity: Identity },
}

impl CollabEvent {
    /// The room this event belongs to
    pub fn room_id(&self) -> &RoomId {
        match self {
            CollabEvent::RoomUpdate { room_id, .. }
            | CollabEvent::ChatMessage { room_id, .. }
            | CollabEvent::MemberJoined { room_id, .. } => room_id,
        }
    }
}

/// A cloneable handle to the collab event channel.
#[derive(Debug, Clone)]
pub struct Events {
    sender: Sender<Message>,
    receiver: Receiver<Message>,
}

impl Events {
    pub fn emit(&self, event: CollabEvent, to: Recipients) {
        self.sender.send((event, to)).expect("event channel is open");
    }

    pub fn receiver(&self) -> EventReceiver {
        self.receiver.clone()
    }
}

impl Default for Events {
    fn default() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }
}
