use anyhow::Context;
use common::ChainBackend;
use std::path::PathBuf;

pub struct Config {
    /// Hex seed of the key that owns and funds the contract.
    pub private_key: String,
    /// Satoshis locked in the contract.
    pub amount: u64,
    pub script_hash_file: PathBuf,
    pub artifact_path: PathBuf,
    pub chain: ChainBackend,
    /// Devnet faucet top-up used when the deployer's key holds nothing.
    pub faucet_sats: Option<u64>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            private_key: std::env::var("DEPLOYER_PRIVATE_KEY")
                .context("DEPLOYER_PRIVATE_KEY must be set")?,
            amount: parse_var("DEPLOY_AMOUNT")?.unwrap_or(1),
            script_hash_file: std::env::var("SCRIPT_HASH_FILE")
                .unwrap_or_else(|_| ".scriptHash".into())
                .into(),
            artifact_path: std::env::var("ARTIFACT_PATH")
                .unwrap_or_else(|_| "artifacts/onchainImg.json".into())
                .into(),
            chain: ChainBackend::from_env(),
            faucet_sats: parse_var("FAUCET_SATS")?,
        })
    }
}

fn parse_var(name: &str) -> anyhow::Result<Option<u64>> {
    match std::env::var(name) {
        Ok(value) => Ok(Some(
            value
                .parse()
                .with_context(|| format!("{name} must be an integer, got {value:?}"))?,
        )),
        Err(_) => Ok(None),
    }
}
