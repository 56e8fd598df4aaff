use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json,
};
use gramophone_collab::PlayableTrack;
use serde::Deserialize;

use crate::{
    context::ServerContext,
    errors::ServerResult,
    serialized::{ToSerialized, Track},
    Router,
};

#[derive(Debug, Deserialize)]
struct SearchQuery {
    query: String,
}

/// Searches the external catalog for tracks matching a query.
/// This never touches room state, so a slow or failing catalog cannot
/// affect anyone's room.
async fn search(
    State(context): State<ServerContext>,
    Query(params): Query<SearchQuery>,
) -> ServerResult<Json<Vec<Track>>> {
    let results = context.collab.tracks.search(&params.query).await?;

    Ok(Json(results.to_serialized()))
}

/// Resolves a track into a playable URL right before playback
async fn resolve(
    State(context): State<ServerContext>,
    Path(id): Path<String>,
) -> ServerResult<Json<PlayableTrack>> {
    let resolved = context.collab.tracks.resolve(&id).await?;

    Ok(Json(resolved))
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(search))
        .route("/:id/stream", get(resolve))
}
