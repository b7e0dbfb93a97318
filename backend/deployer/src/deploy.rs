use anyhow::{bail, Context};
use common::{Chain, ContractInstance, Deployment, Wallet};
use onchain_img_contract::{Artifact, OnchainImg};

use crate::config::Config;

/// Compile, fund and deploy a fresh `OnchainImg` with an empty image, then
/// record its script hash.
pub async fn run(config: &Config, chain: &Chain, wallet: &Wallet) -> anyhow::Result<Deployment> {
    let artifact = Artifact::compile();
    artifact
        .save(&config.artifact_path)
        .with_context(|| format!("writing {}", config.artifact_path.display()))?;
    tracing::info!("Artifact written to {}", config.artifact_path.display());

    let auth = wallet.request_auth().await;
    if !auth.is_authenticated {
        bail!("Auth error: {}", auth.error.unwrap_or_default());
    }
    let pubkey = wallet.default_pub_key().await?;

    if let Some(sats) = config.faucet_sats {
        let script = wallet.p2pk_script().await?;
        if chain.unspent_for_script(&script).await?.is_empty() {
            chain.faucet(script, sats).await?;
        }
    }

    let instance = ContractInstance::new(OnchainImg::new(pubkey, Vec::new()));
    let deployment = instance.deploy(wallet, chain, config.amount).await?;

    std::fs::write(&config.script_hash_file, &deployment.script_hash)
        .with_context(|| format!("writing {}", config.script_hash_file.display()))?;

    Ok(deployment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ChainBackend;

    fn config(dir: &std::path::Path, faucet_sats: Option<u64>) -> Config {
        Config {
            private_key: "22".repeat(32),
            amount: 1,
            script_hash_file: dir.join(".scriptHash"),
            artifact_path: dir.join("artifacts/onchainImg.json"),
            chain: ChainBackend::Memory,
            faucet_sats,
        }
    }

    fn temp_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("deployer-{}-{}", std::process::id(), name));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_deploy_writes_script_hash_and_artifact() {
        let dir = temp_dir("ok");
        let config = config(&dir, Some(100));
        let chain = Chain::in_memory();
        let wallet = Wallet::from_hex(&config.private_key).unwrap();

        let deployment = run(&config, &chain, &wallet).await.unwrap();

        let written = std::fs::read_to_string(&config.script_hash_file).unwrap();
        assert_eq!(written, deployment.script_hash);
        let locking = deployment.instance.contract().locking_script();
        assert_eq!(written, common::script_hash(&hex::encode(&locking)).unwrap());
        assert!(Artifact::load(&config.artifact_path).is_ok());
        assert!(deployment.instance.contract().img_raw_bytes().is_empty());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_deploy_without_funds_fails() {
        let dir = temp_dir("poor");
        let config = config(&dir, None);
        let chain = Chain::in_memory();
        let wallet = Wallet::from_hex(&config.private_key).unwrap();

        assert!(run(&config, &chain, &wallet).await.is_err());
        assert!(!config.script_hash_file.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_deploy_with_locked_wallet_fails_before_broadcast() {
        let dir = temp_dir("locked");
        let config = config(&dir, Some(100));
        let chain = Chain::in_memory();

        let err = run(&config, &chain, &Wallet::locked()).await.unwrap_err();
        assert!(err.to_string().starts_with("Auth error"));
        assert_eq!(chain.accepted_count().await.unwrap(), 0);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
