use anyhow::{Context, Result};
use facegate_core::{EmbeddingProvider, OnnxProvider};
use facegate_hw::{Camera, FrameSource};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod enrollment;
mod gate;
mod match_loop;
mod page;
mod server;
#[cfg(test)]
mod testing;

use config::Config;
use enrollment::EnrollmentStore;
use gate::TokenSigner;
use match_loop::LoopSettings;
use server::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facegated starting");

    let config = Config::load().context("failed to load configuration")?;
    tracing::info!(
        listen = %config.listen_addr,
        camera = %config.camera_device,
        camera_enabled = config.camera_enabled,
        model_dir = %config.model_dir.display(),
        threshold = config.match_threshold,
        trigger_percentage = config.trigger_percentage,
        "configuration loaded"
    );

    let model_dir = config.model_dir.clone();
    let camera_device = config.camera_device.clone();
    let camera_enabled = config.camera_enabled;
    let warmup_frames = config.warmup_frames;

    let engine = engine::spawn_engine(
        Box::new(move || {
            OnnxProvider::load(&model_dir).map(|p| Box::new(p) as Box<dyn EmbeddingProvider>)
        }),
        Box::new(move || {
            if !camera_enabled {
                return Ok(None);
            }
            let camera = Camera::open(&camera_device)?;
            camera.warm_up(warmup_frames)?;
            Ok(Some(Box::new(camera) as Box<dyn FrameSource>))
        }),
    )
    .context("failed to start engine")?;

    let signer = Arc::new(match config.cookie_secret.as_deref() {
        Some(secret) => TokenSigner::from_secret(secret),
        None => {
            tracing::info!("no cookie secret configured; verification cookies end with this process");
            TokenSigner::random()
        }
    });
    let store = Arc::new(EnrollmentStore::new(config.enrollment_label.clone()));

    let session = match_loop::spawn_match_loop(
        engine.clone(),
        store.clone(),
        signer.clone(),
        LoopSettings {
            interval: config.poll_interval(),
            detect_timeout: config.detect_timeout(),
            redirect_delay: config.redirect_delay(),
            threshold: config.match_threshold,
            policy: config.trigger_policy(),
        },
    );

    let state = Arc::new(AppState {
        engine,
        store,
        session: session.client(),
        signer,
        cookie_secure: config.cookie_secure,
    });

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "facegated ready");

    axum::serve(listener, server::router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
        })
        .await
        .context("http server failed")?;

    tracing::info!("facegated shutting down");
    session.shutdown().await;

    Ok(())
}
