mod context;
mod errors;
mod gateway;
mod rooms;
mod serialized;
mod tracks;

pub mod logging;

use std::{
    env,
    net::{Ipv6Addr, SocketAddr},
    sync::Arc,
};

use axum::{routing::get, Json};
use gramophone_collab::Collab;
use log::info;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::{context::ServerContext, gateway::Gateway};

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 9050;

pub type Router = axum::Router<ServerContext>;

/// Starts the gramophone server
pub async fn run_server(collab: Arc<Collab>) {
    let port = env::var("GRAMOPHONE_SERVER_PORT")
        .map(|x| x.parse::<u16>().expect("Port must be a number"))
        .unwrap_or(DEFAULT_PORT);

    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, port).into();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let gateway = Gateway::new();

    tokio::spawn(gateway::run_fanout(gateway.clone(), collab.events()));

    let context = ServerContext { collab, gateway };

    let version_one_router = Router::new()
        .nest("/gateway", gateway::router())
        .nest("/rooms", rooms::router())
        .nest("/tracks", tracks::router())
        .route("/health", get(health));

    let root_router = Router::new()
        .nest("/v1", version_one_router)
        .layer(cors)
        .with_state(context);

    let listener = TcpListener::bind(&addr).await.expect("listens on address");

    info!("Listening on port {}", port);

    axum::serve(listener, root_router.into_make_service())
        .await
        .expect("server runs");
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
