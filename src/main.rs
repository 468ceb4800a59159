mod app;
mod config;
mod db;
mod error;
mod state;
mod storage;
mod telemetry;
mod users;

use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    telemetry::init_tracing();

    let app_state = AppState::init().await?;
    tracing::info!(storage = ?app_state.config.storage, "state initialized");
    let db = app_state.db.clone();

    let app = app::build_app(app_state);
    let served = app::serve(app).await;

    db.close().await;
    tracing::info!("postgres pool closed");
    served
}
