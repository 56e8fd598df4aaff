use chrono::Utc;
use log::info;
use parking_lot::Mutex;

use crate::{
    ChatMessage, CollabContext, CollabEvent, Identity, Recipients, RoomError, RoomSnapshot, Track,
};

pub type RoomId = String;

/// A gramophone room, containing members, a shared queue, and a chat log.
///
/// Every operation takes the room's lock for its full duration, so
/// operations on the same room are strictly serialized while different
/// rooms proceed independently. Operations never block on anything but
/// the lock itself; anything slow (resolving tracks, verifying
/// credentials) happens before the room is entered.
pub struct Room {
    context: CollabContext,
    id: RoomId,
    state: Mutex<RoomState>,
}

#[derive(Default)]
struct RoomState {
    host: Option<Identity>,
    /// Members in join order. The order decides host succession.
    members: Vec<Identity>,
    queue: Vec<Track>,
    /// Invariant: `None` iff the queue is empty, otherwise a valid index
    current: Option<usize>,
    chat: Vec<ChatMessage>,
}

impl Room {
    pub(crate) fn new(context: &CollabContext, id: RoomId) -> Self {
        Self {
            context: context.clone(),
            id,
            state: Default::default(),
        }
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    /// The full observable state of the room
    pub fn snapshot(&self) -> RoomSnapshot {
        self.state.lock().snapshot()
    }

    /// The current members, in join order
    pub fn members(&self) -> Vec<Identity> {
        self.state.lock().members.clone()
    }

    pub fn host(&self) -> Option<Identity> {
        self.state.lock().host.clone()
    }

    /// Adds an identity to the room. The first joiner becomes host.
    /// Joining twice with the same identity does not duplicate membership.
    pub fn join(&self, identity: Identity) -> Result<RoomSnapshot, RoomError> {
        let mut state = self.state.lock();

        // The room may have been deleted between lookup and join
        if !self.context.rooms.contains_key(&self.id) {
            return Err(RoomError::RoomNotFound);
        }

        let rejoining = state.members.contains(&identity);

        if !rejoining {
            state.members.push(identity.clone());

            if state.host.is_none() {
                state.host = Some(identity.clone());
            }
        }

        let snapshot = state.snapshot();

        if rejoining {
            // Nothing changed for the other members, only refresh the rejoiner
            self.context.emit(
                CollabEvent::RoomUpdate {
                    room_id: self.id.clone(),
                    snapshot: snapshot.clone(),
                },
                Recipients::Only(identity),
            );
        } else {
            info!("{} joined room {}", identity, self.id);

            self.context.emit(
                CollabEvent::RoomUpdate {
                    room_id: self.id.clone(),
                    snapshot: snapshot.clone(),
                },
                Recipients::AllMembers,
            );

            self.context.emit(
                CollabEvent::MemberJoined {
                    room_id: self.id.clone(),
                    identity: identity.clone(),
                },
                Recipients::Except(identity),
            );
        }

        Ok(snapshot)
    }

    /// Removes an identity from the room. If the host leaves, the
    /// earliest-joined remaining member becomes host. A room with no
    /// members left is deleted from the registry.
    pub fn leave(&self, identity: &Identity) {
        let mut state = self.state.lock();

        let member_count = state.members.len();
        state.members.retain(|m| m != identity);

        if state.members.len() == member_count {
            return;
        }

        info!("{} left room {}", identity, self.id);

        if state.host.as_ref() == Some(identity) {
            state.host = state.members.first().cloned();
        }

        if state.members.is_empty() {
            // Removed while still holding the state lock, so a join
            // cannot slip in between emptiness and deletion. Lock order
            // is the same as in `join`, state lock before registry.
            self.context.rooms.remove(&self.id);

            info!("Room {} is empty and was deleted", self.id);
            return;
        }

        self.emit_update(&state);
    }

    /// Appends a track to the end of the queue. Any member may do this.
    /// The first track added to an empty queue becomes the current
    /// selection, without implying that playback starts.
    pub fn add_to_queue(&self, identity: &Identity, track: Track) -> Result<(), RoomError> {
        let mut state = self.state.lock();
        state.ensure_member(identity)?;

        state.queue.push(track);

        if state.current.is_none() {
            state.current = Some(0);
        }

        self.emit_update(&state);
        Ok(())
    }

    /// Removes the queue entry at `index`. Any member may do this.
    /// Out of range indices are rejected before anything is mutated.
    pub fn remove_from_queue(&self, identity: &Identity, index: usize) -> Result<(), RoomError> {
        let mut state = self.state.lock();
        state.ensure_member(identity)?;

        if index >= state.queue.len() {
            return Err(RoomError::IndexOutOfBounds(index));
        }

        state.queue.remove(index);

        if state.queue.is_empty() {
            state.current = None;
        } else if let Some(current) = state.current {
            if current >= state.queue.len() {
                state.current = Some(state.queue.len() - 1);
            }
        }

        self.emit_update(&state);
        Ok(())
    }

    /// Moves the current selection to the next track, wrapping around at
    /// the end of the queue. Host only. Does nothing if the queue is empty.
    pub fn next(&self, identity: &Identity) -> Result<(), RoomError> {
        let mut state = self.state.lock();
        state.ensure_member(identity)?;
        state.ensure_host(identity)?;

        if state.queue.is_empty() {
            return Ok(());
        }

        let length = state.queue.len();
        state.current = state.current.map(|c| (c + 1) % length);

        self.emit_update(&state);
        Ok(())
    }

    /// Moves the current selection to the previous track, wrapping around
    /// at the start of the queue. Host only. Does nothing if the queue is empty.
    pub fn previous(&self, identity: &Identity) -> Result<(), RoomError> {
        let mut state = self.state.lock();
        state.ensure_member(identity)?;
        state.ensure_host(identity)?;

        if state.queue.is_empty() {
            return Ok(());
        }

        let length = state.queue.len();
        state.current = state.current.map(|c| (c + length - 1) % length);

        self.emit_update(&state);
        Ok(())
    }

    /// Appends a chat message with a server-assigned timestamp and
    /// broadcasts just the message, not a full snapshot.
    pub fn post_chat(&self, identity: &Identity, text: &str) -> Result<ChatMessage, RoomError> {
        let mut state = self.state.lock();
        state.ensure_member(identity)?;

        let trimmed = text.trim();

        if trimmed.is_empty() {
            return Err(RoomError::EmptyMessage);
        }

        // Clamp against the last message so the log stays non-decreasing
        // even if the wall clock steps backwards
        let mut timestamp = Utc::now();

        if let Some(last) = state.chat.last() {
            timestamp = timestamp.max(last.timestamp);
        }

        let message = ChatMessage {
            user: identity.clone(),
            message: trimmed.to_string(),
            timestamp,
        };

        state.chat.push(message.clone());

        self.context.emit(
            CollabEvent::ChatMessage {
                room_id: self.id.clone(),
                message: message.clone(),
            },
            Recipients::AllMembers,
        );

        Ok(message)
    }

    fn emit_update(&self, state: &RoomState) {
        self.context.emit(
            CollabEvent::RoomUpdate {
                room_id: self.id.clone(),
                snapshot: state.snapshot(),
            },
            Recipients::AllMembers,
        );
    }
}

impl RoomState {
    fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            queue: self.queue.clone(),
            current: self.current,
            chat: self.chat.clone(),
            host: self.host.clone(),
        }
    }

    fn ensure_member(&self, identity: &Identity) -> Result<(), RoomError> {
        if self.members.contains(identity) {
            Ok(())
        } else {
            Err(RoomError::UserNotInRoom)
        }
    }

    fn ensure_host(&self, identity: &Identity) -> Result<(), RoomError> {
        if self.host.as_ref() == Some(identity) {
            Ok(())
        } else {
            Err(RoomError::NotHost)
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::{EventReceiver, Events, RoomManager};

    fn setup() -> (RoomManager, EventReceiver) {
        let events = Events::default();
        let context = CollabContext {
            rooms: Default::default(),
            events: events.clone(),
        };

        (RoomManager::new(&context), events.receiver())
    }

    fn track(id: &str) -> Track {
        Track {
            id: id.to_string(),
            title: format!("Track {}", id),
            author: "Some Artist".to_string(),
            artwork: None,
            duration: Some(180.0),
            requested_by: None,
        }
    }

    fn drain(receiver: &EventReceiver) -> Vec<(CollabEvent, Recipients)> {
        receiver.try_iter().collect()
    }

    fn joined_room(manager: &RoomManager, members: &[&str]) -> Arc<Room> {
        let room = manager.create_room();

        for member in members {
            room.join(member.to_string()).expect("member joins");
        }

        room
    }

    #[test]
    fn test_first_joiner_becomes_host() {
        let (manager, _events) = setup();
        let room = manager.create_room();

        let snapshot = room.join("alice".to_string()).expect("alice joins");

        assert_eq!(snapshot.host.as_deref(), Some("alice"));

        room.join("bob".to_string()).expect("bob joins");

        assert_eq!(
            room.host().as_deref(),
            Some("alice"),
            "host should not change when more members join"
        );
    }

    #[test]
    fn test_join_is_idempotent() {
        let (manager, events) = setup();
        let room = joined_room(&manager, &["alice"]);

        drain(&events);

        room.join("alice".to_string()).expect("alice rejoins");

        assert_eq!(room.members(), vec!["alice".to_string()]);

        let emitted = drain(&events);
        assert_eq!(emitted.len(), 1, "a rejoin should only refresh the rejoiner");
        assert_eq!(emitted[0].1, Recipients::Only("alice".to_string()));
    }

    #[test]
    fn test_join_notifies_existing_members() {
        let (manager, events) = setup();
        let room = joined_room(&manager, &["alice"]);

        drain(&events);

        room.join("bob".to_string()).expect("bob joins");

        let emitted = drain(&events);

        assert!(matches!(
            &emitted[..],
            [
                (CollabEvent::RoomUpdate { .. }, Recipients::AllMembers),
                (CollabEvent::MemberJoined { .. }, Recipients::Except(except)),
            ] if except.as_str() == "bob"
        ));
    }

    #[test]
    fn test_join_deleted_room() {
        let (manager, _events) = setup();
        let room = manager.create_room();

        manager.remove(room.id());

        assert_eq!(
            room.join("alice".to_string()).err(),
            Some(RoomError::RoomNotFound)
        );
    }

    #[test]
    fn test_join_after_last_member_leaves() {
        let (manager, _events) = setup();
        let room = joined_room(&manager, &["alice"]);

        room.leave(&"alice".to_string());

        assert_eq!(
            manager.room_by_id(room.id()).err(),
            Some(RoomError::RoomNotFound),
            "the room is gone the moment it empties"
        );
        assert_eq!(
            room.join("bob".to_string()).err(),
            Some(RoomError::RoomNotFound),
            "a retained handle cannot revive a deleted room"
        );
    }

    #[test]
    fn test_current_is_valid_for_all_queue_mutations() {
        let (manager, _events) = setup();
        let room = joined_room(&manager, &["alice"]);
        let alice = "alice".to_string();

        let assert_invariant = |room: &Room| {
            let snapshot = room.snapshot();

            match snapshot.current {
                None => assert!(snapshot.queue.is_empty(), "current is None only when empty"),
                Some(current) => assert!(current < snapshot.queue.len(), "current is in bounds"),
            }
        };

        assert_invariant(&room);

        for id in ["a", "b", "c", "d"] {
            room.add_to_queue(&alice, track(id)).expect("track is added");
            assert_invariant(&room);
        }

        for index in [3, 0, 1, 0] {
            room.remove_from_queue(&alice, index).expect("track is removed");
            assert_invariant(&room);
        }

        assert_eq!(room.snapshot().current, None, "empty queue has no selection");
    }

    #[test]
    fn test_enqueue_selects_first_track() {
        let (manager, _events) = setup();
        let room = joined_room(&manager, &["alice"]);
        let alice = "alice".to_string();

        assert_eq!(room.snapshot().current, None);

        room.add_to_queue(&alice, track("a")).expect("track is added");
        assert_eq!(room.snapshot().current, Some(0));

        room.add_to_queue(&alice, track("b")).expect("track is added");
        assert_eq!(
            room.snapshot().current,
            Some(0),
            "adding more tracks should not move the selection"
        );
    }

    #[test]
    fn test_advance_and_retreat_are_cyclic() {
        let (manager, _events) = setup();
        let room = joined_room(&manager, &["alice"]);
        let alice = "alice".to_string();

        for id in ["a", "b", "c"] {
            room.add_to_queue(&alice, track(id)).expect("track is added");
        }

        for _ in 0..3 {
            room.next(&alice).expect("host advances");
        }

        assert_eq!(
            room.snapshot().current,
            Some(0),
            "advancing N times should return to the start"
        );

        for _ in 0..3 {
            room.previous(&alice).expect("host retreats");
        }

        assert_eq!(
            room.snapshot().current,
            Some(0),
            "retreating N times should return to the start"
        );

        room.previous(&alice).expect("host retreats");
        assert_eq!(room.snapshot().current, Some(2), "retreat wraps to the end");
    }

    #[test]
    fn test_only_host_controls_playback() {
        let (manager, events) = setup();
        let room = joined_room(&manager, &["alice", "bob"]);
        let alice = "alice".to_string();
        let bob = "bob".to_string();

        room.add_to_queue(&alice, track("a")).expect("track is added");
        room.add_to_queue(&alice, track("b")).expect("track is added");

        drain(&events);

        assert_eq!(room.next(&bob).err(), Some(RoomError::NotHost));
        assert_eq!(room.previous(&bob).err(), Some(RoomError::NotHost));
        assert_eq!(room.snapshot().current, Some(0), "current is unchanged");
        assert!(
            drain(&events).is_empty(),
            "a rejected control should not broadcast"
        );

        room.next(&alice).expect("host advances");
        assert_eq!(room.snapshot().current, Some(1));
    }

    #[test]
    fn test_control_scenario() {
        let (manager, _events) = setup();
        let room = manager.create_room();
        let alice = "alice".to_string();
        let bob = "bob".to_string();

        room.join(alice.clone()).expect("alice joins");
        room.add_to_queue(&alice, track("t1")).expect("track is added");
        assert_eq!(room.snapshot().current, Some(0));

        room.join(bob.clone()).expect("bob joins");
        assert_eq!(room.next(&bob).err(), Some(RoomError::NotHost));
        assert_eq!(room.snapshot().current, Some(0));

        room.next(&alice).expect("host advances");
        assert_eq!(
            room.snapshot().current,
            Some(0),
            "advancing a one track queue wraps in place"
        );

        room.add_to_queue(&alice, track("t2")).expect("track is added");

        room.next(&alice).expect("host advances");
        assert_eq!(room.snapshot().current, Some(1));

        room.next(&alice).expect("host advances");
        assert_eq!(room.snapshot().current, Some(0), "advance wraps to the start");
    }

    #[test]
    fn test_dequeue_clamps_current() {
        let (manager, _events) = setup();
        let room = joined_room(&manager, &["alice"]);
        let alice = "alice".to_string();

        for id in ["t1", "t2", "t3"] {
            room.add_to_queue(&alice, track(id)).expect("track is added");
        }

        room.next(&alice).expect("host advances");
        room.next(&alice).expect("host advances");
        assert_eq!(room.snapshot().current, Some(2));

        room.remove_from_queue(&alice, 0).expect("track is removed");

        let snapshot = room.snapshot();
        assert_eq!(snapshot.queue.len(), 2);
        assert_eq!(
            snapshot.current,
            Some(1),
            "current should clamp to the last valid index"
        );
        assert_eq!(snapshot.queue[1].id, "t3");
    }

    #[test]
    fn test_dequeue_out_of_range() {
        let (manager, events) = setup();
        let room = joined_room(&manager, &["alice"]);
        let alice = "alice".to_string();

        drain(&events);

        assert_eq!(
            room.remove_from_queue(&alice, 0).err(),
            Some(RoomError::IndexOutOfBounds(0))
        );

        assert_eq!(room.snapshot().queue.len(), 0, "state is unchanged");
        assert!(
            drain(&events).is_empty(),
            "a rejected removal should not broadcast"
        );
    }

    #[test]
    fn test_non_member_cannot_mutate() {
        let (manager, _events) = setup();
        let room = joined_room(&manager, &["alice"]);
        let mallory = "mallory".to_string();

        assert_eq!(
            room.add_to_queue(&mallory, track("a")).err(),
            Some(RoomError::UserNotInRoom)
        );
        assert_eq!(
            room.post_chat(&mallory, "hello").err(),
            Some(RoomError::UserNotInRoom)
        );
    }

    #[test]
    fn test_host_succession() {
        let (manager, _events) = setup();
        let room = joined_room(&manager, &["a", "b", "c"]);
        let id = room.id().clone();

        assert_eq!(room.host().as_deref(), Some("a"));

        room.leave(&"a".to_string());
        assert_eq!(
            room.host().as_deref(),
            Some("b"),
            "the earliest joined member becomes host"
        );

        room.leave(&"b".to_string());
        assert_eq!(room.host().as_deref(), Some("c"));

        room.leave(&"c".to_string());
        assert_eq!(
            manager.room_by_id(&id).err(),
            Some(RoomError::RoomNotFound),
            "an empty room is deleted"
        );
    }

    #[test]
    fn test_leaving_empty_room_does_not_broadcast() {
        let (manager, events) = setup();
        let room = joined_room(&manager, &["alice"]);

        drain(&events);

        room.leave(&"alice".to_string());

        assert!(
            drain(&events).is_empty(),
            "there is no one left to broadcast to"
        );
    }

    #[test]
    fn test_leave_broadcasts_to_remaining_members() {
        let (manager, events) = setup();
        let room = joined_room(&manager, &["alice", "bob"]);

        drain(&events);

        room.leave(&"alice".to_string());

        let emitted = drain(&events);

        assert!(matches!(
            &emitted[..],
            [(CollabEvent::RoomUpdate { snapshot, .. }, Recipients::AllMembers)]
                if snapshot.host.as_deref() == Some("bob")
        ));

        room.leave(&"alice".to_string());
        assert!(
            drain(&events).is_empty(),
            "leaving twice should do nothing the second time"
        );
    }

    #[test]
    fn test_chat_is_ordered_and_trimmed() {
        let (manager, events) = setup();
        let room = joined_room(&manager, &["alice", "bob"]);
        let alice = "alice".to_string();
        let bob = "bob".to_string();

        drain(&events);

        room.post_chat(&alice, "  hello  ").expect("message is posted");
        room.post_chat(&bob, "hi").expect("message is posted");
        room.post_chat(&alice, "how are you").expect("message is posted");

        let chat = room.snapshot().chat;

        assert_eq!(chat.len(), 3);
        assert_eq!(chat[0].message, "hello", "messages are trimmed");
        assert!(
            chat.windows(2).all(|w| w[0].timestamp <= w[1].timestamp),
            "timestamps are non-decreasing"
        );

        let emitted = drain(&events);
        assert_eq!(
            emitted.len(),
            3,
            "each message is broadcast individually, without snapshots"
        );
        assert!(emitted
            .iter()
            .all(|(e, _)| matches!(e, CollabEvent::ChatMessage { .. })));
    }

    #[test]
    fn test_empty_chat_is_rejected() {
        let (manager, events) = setup();
        let room = joined_room(&manager, &["alice"]);
        let alice = "alice".to_string();

        drain(&events);

        assert_eq!(
            room.post_chat(&alice, "   ").err(),
            Some(RoomError::EmptyMessage)
        );
        assert!(room.snapshot().chat.is_empty());
        assert!(drain(&events).is_empty(), "nothing should be broadcast");
    }

    #[test]
    fn test_duplicate_tracks_are_allowed() {
        let (manager, _events) = setup();
        let room = joined_room(&manager, &["alice"]);
        let alice = "alice".to_string();

        room.add_to_queue(&alice, track("a")).expect("track is added");
        room.add_to_queue(&alice, track("a")).expect("duplicate is added");

        assert_eq!(room.snapshot().queue.len(), 2);
    }
}
