//! Online judge submission pipeline worker.
//!
//! Loads configuration and the language table, connects to the job store,
//! and drives the compile/run worker loop until killed. Mirrors the
//! teacher's `main.rs` startup sequence (dotenv, tracing-subscriber with
//! `EnvFilter`, then hand off to the loop).

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use ojcore::sandbox::DockerLauncher;
use ojcore::store::JobStore;
use ojcore::{config, languages, pipeline};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config::init().context("failed to initialize configuration")?;
    languages::init_languages().context("failed to load language table")?;

    tracing::info!("connecting to job store at {}", config.store_url);
    let mut store = JobStore::connect(&config.store_url)
        .await
        .context("failed to connect to job store")?;

    let launcher = DockerLauncher::new(config);

    tracing::info!(
        judge_image = %config.judge_image,
        compile_timeout_secs = config.compile_timeout_secs,
        run_timeout_secs = config.run_timeout_secs,
        "starting submission pipeline worker"
    );

    pipeline::run_worker(&mut store, &launcher, config).await
}
