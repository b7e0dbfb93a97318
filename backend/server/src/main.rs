mod api;
mod config;
mod error;
mod session;
mod ws;

use common::{Chain, Wallet};
use onchain_img_contract::{Artifact, ContractError};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    let mut sigterm =
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(e) => {
                tracing::warn!("Failed to register SIGTERM handler: {}", e);
                let _ = ctrl_c.await;
                tracing::info!("Received SIGINT, shutting down...");
                return;
            }
        };
    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, shutting down..."),
        _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down..."),
    }
}

fn load_artifact(path: &std::path::Path) -> anyhow::Result<Artifact> {
    match Artifact::load(path) {
        Ok(artifact) => Ok(artifact),
        Err(ContractError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!("No artifact at {}, compiling", path.display());
            let artifact = Artifact::compile();
            artifact.save(path)?;
            Ok(artifact)
        }
        Err(e) => Err(e.into()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("server=info".parse()?)
                .add_directive("common=info".parse()?),
        )
        .init();

    let config = config::Config::from_env()?;
    tracing::info!("Starting server on {}", config.listen_addr);

    let artifact = load_artifact(&config.artifact_path)?;
    tracing::info!("Loaded artifact {} v{}", artifact.contract, artifact.version);

    let chain = Chain::open(&config.chain).await?;
    let wallet = match &config.wallet_private_key {
        Some(seed) => Wallet::from_hex(seed)?,
        None => {
            tracing::warn!("WALLET_PRIVATE_KEY not set, wallet is locked");
            Wallet::locked()
        }
    };

    let session = Arc::new(session::Session::new(wallet, chain, config.amount));
    match session.connect().await {
        Ok(pubkey) => {
            if let Some(sats) = config.faucet_sats {
                session.fund_from_faucet(sats).await?;
            }
            tracing::info!("Session ready for {}", pubkey);
        }
        Err(e) => tracing::error!("{}", e),
    }

    let state = api::AppState { session };
    let app = api::router(state, config.max_image_bytes).layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!("Server listening on {}", config.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped.");
    Ok(())
}
