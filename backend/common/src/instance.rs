//! Client-side mirror of a deployed `OnchainImg`: the current state plus the
//! output holding it. Instances are never mutated after a call; a successful
//! deploy or update hands back the successor.

use onchain_img_contract::{OnchainImg, SigHashType, Transition};
use thiserror::Error;

use crate::chain::{Chain, ChainError};
use crate::script_hash::{script_hash, ScriptHashError};
use crate::tx::{Outpoint, Transaction, TxIn, TxOut, Txid, Utxo};
use crate::wallet::{Wallet, WalletError};

#[derive(Debug, Error)]
pub enum InstanceError {
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    ScriptHash(#[from] ScriptHashError),
    #[error("deploy amount must be at least 1")]
    ZeroAmount,
    #[error("insufficient funds: need {needed}, wallet holds {available}")]
    InsufficientFunds { needed: u64, available: u64 },
    #[error("instance is not deployed")]
    NotDeployed,
    #[error("instance is already deployed at {0}")]
    AlreadyDeployed(Outpoint),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractInstance {
    contract: OnchainImg,
    utxo: Option<Utxo>,
}

#[derive(Debug, Clone)]
pub struct Deployment {
    pub tx: Transaction,
    pub txid: Txid,
    /// Script hash of the deployed locking script.
    pub script_hash: String,
    pub instance: ContractInstance,
}

#[derive(Debug, Clone)]
pub struct CallResult {
    pub tx: Transaction,
    pub txid: Txid,
    pub next: ContractInstance,
}

impl ContractInstance {
    pub fn new(contract: OnchainImg) -> Self {
        Self {
            contract,
            utxo: None,
        }
    }

    pub fn contract(&self) -> &OnchainImg {
        &self.contract
    }

    pub fn utxo(&self) -> Option<&Utxo> {
        self.utxo.as_ref()
    }

    pub fn outpoint(&self) -> Option<Outpoint> {
        self.utxo.as_ref().map(|utxo| utxo.outpoint)
    }

    /// Value locked in the contract, 0 before deployment.
    pub fn balance(&self) -> u64 {
        self.utxo.as_ref().map_or(0, |utxo| utxo.output.value)
    }

    /// Template for the successor state.
    pub fn next(&self) -> OnchainImg {
        self.contract.clone()
    }

    pub fn img_to_base64_url(&self) -> Option<String> {
        self.contract.img_to_base64_url()
    }

    /// Fund the contract with `amount` from the wallet's outputs. Output 0
    /// holds the contract, output 1 (if any) the change.
    pub async fn deploy(
        self,
        wallet: &Wallet,
        chain: &Chain,
        amount: u64,
    ) -> Result<Deployment, InstanceError> {
        if let Some(utxo) = &self.utxo {
            return Err(InstanceError::AlreadyDeployed(utxo.outpoint));
        }
        if amount == 0 {
            return Err(InstanceError::ZeroAmount);
        }
        let change_script = wallet.p2pk_script().await?;

        let mut selected = Vec::new();
        let mut total: u64 = 0;
        for utxo in chain.unspent_for_script(&change_script).await? {
            if total >= amount {
                break;
            }
            total = total.saturating_add(utxo.output.value);
            selected.push(utxo);
        }
        if total < amount {
            return Err(InstanceError::InsufficientFunds {
                needed: amount,
                available: total,
            });
        }

        let locking_script = self.contract.locking_script();
        let script_hash = script_hash(&hex::encode(&locking_script))?;
        let contract_output = TxOut {
            value: amount,
            script: locking_script,
        };
        let mut outputs = vec![contract_output.clone()];
        if total > amount {
            outputs.push(TxOut {
                value: total - amount,
                script: change_script,
            });
        }

        let inputs = selected
            .iter()
            .map(|utxo| TxIn {
                prev: utxo.outpoint,
                unlocking: Vec::new(),
            })
            .collect();
        let mut tx = Transaction::new(inputs, outputs);
        for (index, utxo) in selected.iter().enumerate() {
            let preimage = tx.sighash_preimage(index, &utxo.output, SigHashType::All);
            let sig = wallet.sign(&preimage, SigHashType::All).await?;
            tx.inputs[index].unlocking = sig.to_bytes().to_vec();
        }

        let txid = chain.broadcast(&tx).await?;
        tracing::info!("Deployed OnchainImg at {}:0 (scriptHash {})", txid, script_hash);

        Ok(Deployment {
            tx,
            txid,
            script_hash,
            instance: ContractInstance {
                contract: self.contract,
                utxo: Some(Utxo {
                    outpoint: Outpoint::new(txid, 0),
                    output: contract_output,
                }),
            },
        })
    }

    /// Call `update_img`: spend the tracked output into a single output
    /// holding the new image and the same value, signed under SINGLE.
    pub async fn update_img(
        &self,
        img_raw_bytes: Vec<u8>,
        wallet: &Wallet,
        chain: &Chain,
    ) -> Result<CallResult, InstanceError> {
        let utxo = self.utxo.as_ref().ok_or(InstanceError::NotDeployed)?;

        let next = self.next().with_img(img_raw_bytes.clone());
        let next_output = TxOut {
            value: utxo.output.value,
            script: next.locking_script(),
        };
        let mut tx = Transaction::new(
            vec![TxIn {
                prev: utxo.outpoint,
                unlocking: Vec::new(),
            }],
            vec![next_output.clone()],
        );

        let preimage = tx.sighash_preimage(0, &utxo.output, SigHashType::Single);
        let sig = wallet.sign(&preimage, SigHashType::Single).await?;
        tx.inputs[0].unlocking = Transition::UpdateImg { img_raw_bytes, sig }.encode();

        let txid = chain.broadcast(&tx).await?;
        tracing::info!("updateImg {} -> {}:0", utxo.outpoint, txid);

        Ok(CallResult {
            tx,
            txid,
            next: ContractInstance {
                contract: next,
                utxo: Some(Utxo {
                    outpoint: Outpoint::new(txid, 0),
                    output: next_output,
                }),
            },
        })
    }
}
