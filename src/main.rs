use anyhow::Result;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // --- .env first, so RUST_LOG and the credential can come from it ---
    // A missing .env file is fine; the variables may come from the process.
    let _ = dotenvy::dotenv();

    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config ---
    let (cfg, command) = config::AppConfig::from_env_and_args()?;
    tracing::info!("Starting blob-archive with config: {:?}", cfg);

    // --- Run the command ---
    routes::routes::dispatch(&cfg, command).await
}
