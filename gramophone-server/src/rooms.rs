use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json,
};
use serde::Serialize;

use crate::{
    context::ServerContext,
    errors::ServerResult,
    serialized::{Room, ToSerialized},
    Router,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewRoomResult {
    room_id: String,
}

/// Creates a room and returns its identifier. Joining happens over the
/// gateway socket, independently of this request.
async fn create_room(State(context): State<ServerContext>) -> Json<NewRoomResult> {
    let room = context.collab.rooms.create_room();

    Json(NewRoomResult {
        room_id: room.id().clone(),
    })
}

async fn room(
    State(context): State<ServerContext>,
    Path(id): Path<String>,
) -> ServerResult<Json<Room>> {
    let room = context.collab.rooms.room_by_id(&id)?;

    Ok(Json(room.to_serialized()))
}

async fn list_rooms(State(context): State<ServerContext>) -> Json<Vec<Room>> {
    let rooms: Vec<_> = context
        .collab
        .rooms
        .list_all()
        .into_iter()
        .map(|r| r.to_serialized())
        .collect();

    Json(rooms)
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_rooms))
        .route("/", post(create_room))
        .route("/:id", get(room))
}
