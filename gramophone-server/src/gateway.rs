use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use gramophone_collab::{CollabEvent, EventReceiver, Identity, Recipients, Room, RoomId, Track};
use log::{debug, warn};
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

use crate::{context::ServerContext, serialized::ServerEvent, Router};

pub type ConnectionId = u64;

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Commands clients send over the gateway socket
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "type")]
#[serde(rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientCommand {
    /// Bind an identity to the connection without joining a room
    Authenticate { credential: String },
    /// Authenticate and join a room in one step
    Join { credential: String, room_id: RoomId },
    Enqueue { track: Track },
    Dequeue { index: usize },
    Advance,
    Retreat,
    PostChat { text: String },
    Leave,
}

/// Tracks which connections are bound to which room, and delivers
/// events to them in the order the room applied its operations.
pub struct Gateway {
    connections: Mutex<Vec<GatewayConnection>>,
}

struct GatewayConnection {
    id: ConnectionId,
    identity: Identity,
    room_id: RoomId,
    sender: UnboundedSender<ServerEvent>,
}

impl Gateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connections: Default::default(),
        })
    }

    /// Fans a collab event out to every connection it concerns
    pub fn publish(&self, event: &CollabEvent, to: &Recipients) {
        let connections = self.connections.lock();

        for connection in connections.iter().filter(|c| c.concerns(event, to)) {
            let message = ServerEvent::from_collab(event, &connection.identity);

            // Failure means the socket is closing and will clean up after itself
            connection.sender.send(message).ok();
        }
    }

    fn bind(
        &self,
        id: ConnectionId,
        identity: Identity,
        room_id: RoomId,
        sender: UnboundedSender<ServerEvent>,
    ) {
        self.connections.lock().push(GatewayConnection {
            id,
            identity,
            room_id,
            sender,
        });
    }

    fn unbind(&self, id: ConnectionId) {
        self.connections.lock().retain(|c| c.id != id);
    }
}

impl GatewayConnection {
    fn concerns(&self, event: &CollabEvent, to: &Recipients) -> bool {
        if &self.room_id != event.room_id() {
            return false;
        }

        match to {
            Recipients::AllMembers => true,
            Recipients::Except(identity) => &self.identity != identity,
            Recipients::Only(identity) => &self.identity == identity,
        }
    }
}

/// Drains the collab event channel and fans events out to sockets
pub async fn run_fanout(gateway: Arc<Gateway>, receiver: EventReceiver) {
    while let Ok((event, to)) = {
        let receiver = receiver.clone();
        tokio::task::spawn_blocking(move || receiver.recv())
            .await
            .expect("fanout task is not cancelled")
    } {
        gateway.publish(&event, &to);
    }
}

/// The room binding of a single gateway connection.
///
/// No identity and no room is an unbound connection, an identity alone
/// is an authenticated one, and both means the connection is in a room.
#[derive(Default)]
struct Binding {
    identity: Option<Identity>,
    room_id: Option<RoomId>,
}

async fn gateway_handler(ws: WebSocketUpgrade, State(context): State<ServerContext>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, context))
}

async fn handle_socket(socket: WebSocket, context: ServerContext) {
    let id = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    let (mut sink, mut stream) = socket.split();
    let (sender, mut outbox) = unbounded_channel::<ServerEvent>();

    // Outgoing events are written by a separate task so inbound commands
    // and broadcasts reach the socket in a single ordered stream
    let writer = tokio::spawn(async move {
        while let Some(event) = outbox.recv().await {
            let text = serde_json::to_string(&event).expect("event serializes");

            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut binding = Binding::default();

    while let Some(Ok(message)) = stream.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let command = match serde_json::from_str::<ClientCommand>(&text) {
            Ok(command) => command,
            Err(err) => {
                debug!("Connection {} sent an unparseable command: {}", id, err);
                continue;
            }
        };

        dispatch(id, command, &mut binding, &context, &sender).await;
    }

    // The transport is gone, which counts as leaving
    disconnect(id, &mut binding, &context);
    writer.abort();
}

async fn dispatch(
    id: ConnectionId,
    command: ClientCommand,
    binding: &mut Binding,
    context: &ServerContext,
    sender: &UnboundedSender<ServerEvent>,
) {
    match command {
        ClientCommand::Authenticate { credential } => {
            if binding.room_id.is_some() {
                fail(sender, "Already in a room");
                return;
            }

            match context.collab.auth.verify(&credential).await {
                Ok(identity) => binding.identity = Some(identity),
                Err(err) => {
                    warn!("Connection {} failed to authenticate: {}", id, err);
                    fail(sender, &err.to_string());
                }
            }
        }

        ClientCommand::Join {
            credential,
            room_id,
        } => {
            if binding.room_id.is_some() {
                fail(sender, "Already in a room");
                return;
            }

            let identity = match context.collab.auth.verify(&credential).await {
                Ok(identity) => identity,
                Err(err) => {
                    warn!("Connection {} failed to authenticate: {}", id, err);
                    fail(sender, &err.to_string());
                    return;
                }
            };

            let room = match context.collab.rooms.room_by_id(&room_id) {
                Ok(room) => room,
                Err(err) => {
                    fail(sender, &err.to_string());
                    return;
                }
            };

            // Bind before joining so the post-join broadcast reaches this
            // connection as well
            context
                .gateway
                .bind(id, identity.clone(), room_id.clone(), sender.clone());

            if let Err(err) = room.join(identity.clone()) {
                context.gateway.unbind(id);
                fail(sender, &err.to_string());
                return;
            }

            binding.identity = Some(identity);
            binding.room_id = Some(room_id);
        }

        ClientCommand::Enqueue { track } => {
            let Some((identity, room)) = bound_room(binding, context) else {
                drop_command(id, "enqueue");
                return;
            };

            // The server decides who a track is attributed to
            let track = Track {
                requested_by: Some(identity.clone()),
                ..track
            };

            if let Err(err) = room.add_to_queue(&identity, track) {
                fail(sender, &err.to_string());
            }
        }

        ClientCommand::Dequeue { index } => {
            let Some((identity, room)) = bound_room(binding, context) else {
                drop_command(id, "dequeue");
                return;
            };

            if let Err(err) = room.remove_from_queue(&identity, index) {
                fail(sender, &err.to_string());
            }
        }

        ClientCommand::Advance => {
            let Some((identity, room)) = bound_room(binding, context) else {
                drop_command(id, "advance");
                return;
            };

            if let Err(err) = room.next(&identity) {
                fail(sender, &err.to_string());
            }
        }

        ClientCommand::Retreat => {
            let Some((identity, room)) = bound_room(binding, context) else {
                drop_command(id, "retreat");
                return;
            };

            if let Err(err) = room.previous(&identity) {
                fail(sender, &err.to_string());
            }
        }

        ClientCommand::PostChat { text } => {
            let Some((identity, room)) = bound_room(binding, context) else {
                drop_command(id, "post-chat");
                return;
            };

            if let Err(err) = room.post_chat(&identity, &text) {
                fail(sender, &err.to_string());
            }
        }

        ClientCommand::Leave => disconnect(id, binding, context),
    }
}

/// Resolves a binding into its identity and room, if the connection is
/// in one and the room still exists
fn bound_room(binding: &Binding, context: &ServerContext) -> Option<(Identity, Arc<Room>)> {
    let identity = binding.identity.clone()?;
    let room_id = binding.room_id.as_ref()?;
    let room = context.collab.rooms.room_by_id(room_id).ok()?;

    Some((identity, room))
}

fn disconnect(id: ConnectionId, binding: &mut Binding, context: &ServerContext) {
    // Unbind first so the leave broadcast does not reach this connection
    context.gateway.unbind(id);

    if let Some((identity, room)) = bound_room(binding, context) {
        room.leave(&identity);
    }

    *binding = Binding::default();
}

fn drop_command(id: ConnectionId, command: &str) {
    debug!(
        "Connection {} sent {} while not in a room, ignoring",
        id, command
    );
}

fn fail(sender: &UnboundedSender<ServerEvent>, reason: &str) {
    sender
        .send(ServerEvent::CommandFailed {
            reason: reason.to_string(),
        })
        .ok();
}

pub fn router() -> Router {
    Router::new().route("/", get(gateway_handler))
}
