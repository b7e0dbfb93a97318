mod config;
mod deploy;

use common::{Chain, Wallet};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("deployer=info".parse()?)
                .add_directive("common=info".parse()?),
        )
        .init();

    let config = config::Config::from_env()?;
    let chain = Chain::open(&config.chain).await?;
    let wallet = Wallet::from_hex(&config.private_key)?;

    let deployment = deploy::run(&config, &chain, &wallet).await?;

    tracing::info!("OnchainImg contract was successfully deployed!");
    tracing::info!("TXID: {}", deployment.txid);
    tracing::info!("scriptHash: {}", deployment.script_hash);
    Ok(())
}
