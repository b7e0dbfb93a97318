use anyhow::Context;
use common::ChainBackend;
use std::path::PathBuf;

pub struct Config {
    pub listen_addr: String,
    /// Hex seed for the session wallet. Without it the wallet stays locked.
    pub wallet_private_key: Option<String>,
    pub amount: u64,
    pub artifact_path: PathBuf,
    pub chain: ChainBackend,
    pub faucet_sats: Option<u64>,
    pub max_image_bytes: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            listen_addr: std::env::var("LISTEN_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:3000".into()),
            wallet_private_key: std::env::var("WALLET_PRIVATE_KEY").ok(),
            amount: parse_var("DEPLOY_AMOUNT")?.unwrap_or(1),
            artifact_path: std::env::var("ARTIFACT_PATH")
                .unwrap_or_else(|_| "artifacts/onchainImg.json".into())
                .into(),
            chain: ChainBackend::from_env(),
            faucet_sats: parse_var("FAUCET_SATS")?,
            max_image_bytes: parse_var("MAX_IMAGE_BYTES")?.unwrap_or(1024 * 1024),
        })
    }
}

fn parse_var<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => Ok(Some(
            raw.trim()
                .parse()
                .with_context(|| format!("invalid {}", name))?,
        )),
        Err(_) => Ok(None),
    }
}
