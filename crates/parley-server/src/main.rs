use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();
    init_tracing(args.json_logs);

    let config = config::Config::load(&args.config)?;
    ensure_data_dirs(&config);

    let db = parley_db::create_pool(&config.database.url, config.database.max_connections).await?;
    parley_db::run_migrations(&db).await?;

    let state = parley_core::AppState::new(db, config.app_config());
    let app = parley_api::build_router()
        .merge(parley_ws::gateway_router(config.gateway_limits()))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(
        engine = ?parley_db::active_database_engine(),
        "Parley listening on {} (gateway at /gateway)",
        config.server.bind_address
    );

    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutting down (ctrl-c)...");
    };

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    state.db.close().await;
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("parley=info,tower_http=debug"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Creates the parent directory of a file-backed SQLite database.
fn ensure_data_dirs(config: &config::Config) {
    if let Some(db_path) = config
        .database
        .url
        .strip_prefix("sqlite://")
        .and_then(|s| s.split('?').next())
    {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    tracing::warn!("Could not create directory '{}': {}", parent.display(), e);
                }
            }
        }
    }
}
