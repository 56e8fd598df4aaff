use std::sync::Arc;

use axum::extract::FromRef;
use gramophone_collab::Collab;

use crate::gateway::Gateway;

#[derive(Clone, FromRef)]
pub struct ServerContext {
    pub collab: Arc<Collab>,
    pub gateway: Arc<Gateway>,
}
