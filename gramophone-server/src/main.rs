use std::{env, sync::Arc};

use gramophone_collab::{
    Collab, IdentityVerifier, InsecureVerifier, RemoteTrackSource, RemoteVerifier, TrackSource,
    UnconfiguredTrackSource,
};
use gramophone_server::{logging, run_server};
use log::{info, warn};

#[tokio::main]
async fn main() {
    logging::init_logger();

    let auth: Arc<dyn IdentityVerifier> = match env::var("GRAMOPHONE_AUTH_URL") {
        Ok(url) => Arc::new(RemoteVerifier::new(url)),
        Err(_) => {
            warn!("GRAMOPHONE_AUTH_URL is not set, credentials are used as display names verbatim");
            Arc::new(InsecureVerifier)
        }
    };

    let tracks: Arc<dyn TrackSource> = match env::var("GRAMOPHONE_CATALOG_URL") {
        Ok(url) => Arc::new(RemoteTrackSource::new(url)),
        Err(_) => {
            warn!("GRAMOPHONE_CATALOG_URL is not set, track search and resolution are disabled");
            Arc::new(UnconfiguredTrackSource)
        }
    };

    let collab = Arc::new(Collab::new(auth, tracks));

    info!("Initialized successfully.");
    run_server(collab).await
}
