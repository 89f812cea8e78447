use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use durak_server::{
    GameServer, ServerConfig, logging,
    routes::{self, AppState},
};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    logging::init();

    let config = ServerConfig::from_env()?;
    config.validate()?;

    let state = Arc::new(AppState::new(GameServer::new(config.game.clone())));
    let app = routes::router(state);

    info!("Durak server listening on {}", config.bind);
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
