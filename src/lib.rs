pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use crate::core::{config::Settings, state::AppState, telemetry};
use crate::repositories::store::{GradingStore, PgGradingStore};
use crate::services::paper_checking::PaperChecker;
use crate::services::storage::storage_from_settings;

/// Settings, telemetry, database and the grading pipeline shared by both binaries.
async fn build_state() -> anyhow::Result<AppState> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let db_pool = db::init_pool(&settings).await?;
    db::run_migrations(&db_pool).await?;

    let store: Arc<dyn GradingStore> = Arc::new(PgGradingStore::new(db_pool));
    let storage = storage_from_settings(&settings).await?;
    let checker = PaperChecker::from_settings(&settings, store.clone(), storage.clone())?;

    Ok(AppState::new(settings, store, storage, checker))
}

pub async fn run() -> anyhow::Result<()> {
    let state = build_state().await?;

    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        addr = %state.settings().server_addr(),
        environment = %state.settings().runtime().environment.as_str(),
        inline_dispatch = state.settings().grading().inline_dispatch,
        "Papercheck API listening"
    );

    axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await?;

    tracing::info!("Papercheck API stopped");
    Ok(())
}

pub async fn run_worker() -> anyhow::Result<()> {
    let state = build_state().await?;
    tasks::scheduler::run(state).await
}
