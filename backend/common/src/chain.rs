//! Devnet chain: a UTXO set plus the validation `broadcast` runs before
//! accepting a transaction. Backed by process memory or by Valkey so the
//! deployer and the server can share one chain.

use onchain_img_contract::script::is_onchain_img;
use onchain_img_contract::{ContractError, OnchainImg, Transition, TxSignature};
use redis::AsyncCommands;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::tx::{Outpoint, Transaction, TxIn, TxOut, Txid, Utxo};
use crate::valkey;
use crate::wallet::parse_p2pk;

/// Atomically checks that every spent field exists, removes them, adds the
/// created outputs and bumps the accepted counter. Returns 0 on success or
/// the 1-based position of the first missing input.
const COMMIT_SCRIPT: &str = r#"
local n = tonumber(ARGV[1])
for i = 2, n + 1 do
  if redis.call('HEXISTS', KEYS[1], ARGV[i]) == 0 then
    return i - 1
  end
end
for i = 2, n + 1 do
  redis.call('HDEL', KEYS[1], ARGV[i])
end
for i = n + 2, #ARGV, 2 do
  redis.call('HSET', KEYS[1], ARGV[i], ARGV[i + 1])
end
redis.call('INCR', KEYS[2])
return 0
"#;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("transaction has no inputs")]
    NoInputs,
    #[error("transaction has no outputs")]
    NoOutputs,
    #[error("coinbase transactions cannot be broadcast")]
    CoinbaseNotAllowed,
    #[error("input {0} is spent twice")]
    DuplicateInput(Outpoint),
    #[error("input {0} is missing or already spent")]
    MissingInput(Outpoint),
    #[error("input {index} has an unknown locking script")]
    UnknownScript { index: usize },
    #[error("input {index} rejected: {source}")]
    ScriptRejected {
        index: usize,
        #[source]
        source: ContractError,
    },
    #[error("value overflow")]
    ValueOverflow,
    #[error("outputs ({outputs}) exceed inputs ({inputs})")]
    InsufficientInputValue { inputs: u64, outputs: u64 },
    #[error("corrupt utxo entry {field}: {reason}")]
    Corrupt { field: String, reason: String },
    #[error("valkey: {0}")]
    Valkey(#[from] redis::RedisError),
}

/// Where the chain keeps its UTXO set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainBackend {
    Memory,
    Valkey(String),
}

impl ChainBackend {
    /// `CHAIN_BACKEND` (`valkey` or `memory`, default `valkey`) and `VALKEY_URL`.
    pub fn from_env() -> Self {
        match std::env::var("CHAIN_BACKEND").as_deref() {
            Ok("memory") => ChainBackend::Memory,
            _ => ChainBackend::Valkey(
                std::env::var("VALKEY_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into()),
            ),
        }
    }
}

#[derive(Default)]
struct MemoryState {
    utxos: HashMap<Outpoint, TxOut>,
    accepted: u64,
}

enum UtxoStore {
    Memory(Mutex<MemoryState>),
    Valkey {
        con: redis::aio::MultiplexedConnection,
        commit: redis::Script,
    },
}

impl UtxoStore {
    async fn get(&self, outpoint: &Outpoint) -> Result<Option<TxOut>, ChainError> {
        match self {
            UtxoStore::Memory(state) => Ok(state.lock().await.utxos.get(outpoint).cloned()),
            UtxoStore::Valkey { con, .. } => {
                let field = valkey::utxo_field(outpoint);
                let encoded: Option<String> = con.clone().hget(valkey::UTXO_SET, &field).await?;
                encoded.map(|entry| decode_entry(&field, &entry)).transpose()
            }
        }
    }

    async fn all(&self) -> Result<Vec<Utxo>, ChainError> {
        match self {
            UtxoStore::Memory(state) => Ok(state
                .lock()
                .await
                .utxos
                .iter()
                .map(|(outpoint, output)| Utxo {
                    outpoint: *outpoint,
                    output: output.clone(),
                })
                .collect()),
            UtxoStore::Valkey { con, .. } => {
                let entries: HashMap<String, String> =
                    con.clone().hgetall(valkey::UTXO_SET).await?;
                entries
                    .into_iter()
                    .map(|(field, entry)| {
                        let outpoint = field.parse().map_err(|e: ContractError| {
                            ChainError::Corrupt {
                                field: field.clone(),
                                reason: e.to_string(),
                            }
                        })?;
                        Ok(Utxo {
                            outpoint,
                            output: decode_entry(&field, &entry)?,
                        })
                    })
                    .collect()
            }
        }
    }

    /// Spend `spent` and add `created` as one step.
    async fn commit(
        &self,
        spent: &[Outpoint],
        created: Vec<(Outpoint, TxOut)>,
    ) -> Result<(), ChainError> {
        match self {
            UtxoStore::Memory(state) => {
                let mut state = state.lock().await;
                if let Some(missing) = spent.iter().find(|op| !state.utxos.contains_key(*op)) {
                    return Err(ChainError::MissingInput(*missing));
                }
                for outpoint in spent {
                    state.utxos.remove(outpoint);
                }
                state.utxos.extend(created);
                state.accepted += 1;
                Ok(())
            }
            UtxoStore::Valkey { con, commit } => {
                let mut invocation = commit.prepare_invoke();
                invocation
                    .key(valkey::UTXO_SET)
                    .key(valkey::ACCEPTED_TX_COUNT)
                    .arg(spent.len());
                for outpoint in spent {
                    invocation.arg(valkey::utxo_field(outpoint));
                }
                for (outpoint, output) in &created {
                    invocation
                        .arg(valkey::utxo_field(outpoint))
                        .arg(hex::encode(output.encode()));
                }
                let missing: usize = invocation.invoke_async(&mut con.clone()).await?;
                match missing {
                    0 => Ok(()),
                    n => Err(spent
                        .get(n - 1)
                        .map(|op| ChainError::MissingInput(*op))
                        .unwrap_or_else(|| ChainError::Corrupt {
                            field: valkey::UTXO_SET.into(),
                            reason: format!("commit reported input {n} of {}", spent.len()),
                        })),
                }
            }
        }
    }

    async fn accepted(&self) -> Result<u64, ChainError> {
        match self {
            UtxoStore::Memory(state) => Ok(state.lock().await.accepted),
            UtxoStore::Valkey { con, .. } => {
                let count: Option<u64> = con.clone().get(valkey::ACCEPTED_TX_COUNT).await?;
                Ok(count.unwrap_or(0))
            }
        }
    }
}

fn decode_entry(field: &str, encoded: &str) -> Result<TxOut, ChainError> {
    let corrupt = |reason: String| ChainError::Corrupt {
        field: field.to_string(),
        reason,
    };
    let bytes = hex::decode(encoded).map_err(|e| corrupt(e.to_string()))?;
    TxOut::decode(&bytes).map_err(|e| corrupt(e.to_string()))
}

pub struct Chain {
    store: UtxoStore,
}

impl Chain {
    pub fn in_memory() -> Self {
        Self {
            store: UtxoStore::Memory(Mutex::new(MemoryState::default())),
        }
    }

    pub async fn connect(valkey_url: &str) -> Result<Self, ChainError> {
        let client = redis::Client::open(valkey_url)?;
        let con = client.get_multiplexed_async_connection().await?;
        Ok(Self {
            store: UtxoStore::Valkey {
                con,
                commit: redis::Script::new(COMMIT_SCRIPT),
            },
        })
    }

    pub async fn open(backend: &ChainBackend) -> Result<Self, ChainError> {
        match backend {
            ChainBackend::Memory => Ok(Self::in_memory()),
            ChainBackend::Valkey(url) => Self::connect(url).await,
        }
    }

    pub async fn utxo(&self, outpoint: &Outpoint) -> Result<Option<TxOut>, ChainError> {
        self.store.get(outpoint).await
    }

    /// Unspent outputs locked by exactly `script`, sorted by outpoint.
    pub async fn unspent_for_script(&self, script: &[u8]) -> Result<Vec<Utxo>, ChainError> {
        let mut utxos: Vec<Utxo> = self
            .store
            .all()
            .await?
            .into_iter()
            .filter(|utxo| utxo.output.script == script)
            .collect();
        utxos.sort_by_key(|utxo| utxo.outpoint);
        Ok(utxos)
    }

    /// Mint `value` to `script`. Devnet only.
    pub async fn faucet(&self, script: Vec<u8>, value: u64) -> Result<Outpoint, ChainError> {
        let tx = Transaction::coinbase(vec![TxOut { value, script }], rand::random());
        let outpoint = Outpoint::new(tx.txid(), 0);
        self.store
            .commit(&[], vec![(outpoint, tx.outputs[0].clone())])
            .await?;
        tracing::info!("Faucet minted {} to {}", value, outpoint);
        Ok(outpoint)
    }

    pub async fn accepted_count(&self) -> Result<u64, ChainError> {
        self.store.accepted().await
    }

    /// Validate and apply a transaction. Single attempt, no retry.
    pub async fn broadcast(&self, tx: &Transaction) -> Result<Txid, ChainError> {
        if tx.inputs.is_empty() {
            return Err(ChainError::NoInputs);
        }
        if tx.outputs.is_empty() {
            return Err(ChainError::NoOutputs);
        }
        let mut seen = HashSet::new();
        for input in &tx.inputs {
            if input.prev.is_null() {
                return Err(ChainError::CoinbaseNotAllowed);
            }
            if !seen.insert(input.prev) {
                return Err(ChainError::DuplicateInput(input.prev));
            }
        }

        let mut input_value: u64 = 0;
        for (index, input) in tx.inputs.iter().enumerate() {
            let prev = self
                .store
                .get(&input.prev)
                .await?
                .ok_or(ChainError::MissingInput(input.prev))?;
            verify_input(tx, index, input, &prev)?;
            input_value = input_value
                .checked_add(prev.value)
                .ok_or(ChainError::ValueOverflow)?;
        }

        let output_value = tx.total_output_value().ok_or(ChainError::ValueOverflow)?;
        if output_value > input_value {
            return Err(ChainError::InsufficientInputValue {
                inputs: input_value,
                outputs: output_value,
            });
        }

        let txid = tx.txid();
        let spent: Vec<Outpoint> = tx.inputs.iter().map(|input| input.prev).collect();
        let created = tx
            .outputs
            .iter()
            .enumerate()
            .map(|(vout, output)| (Outpoint::new(txid, vout as u32), output.clone()))
            .collect();
        // Inputs are re-checked inside the commit; a concurrent spend loses here.
        self.store.commit(&spent, created).await?;

        tracing::info!(
            "Accepted tx {} ({} inputs, {} outputs, fee {})",
            txid,
            tx.inputs.len(),
            tx.outputs.len(),
            input_value - output_value
        );
        Ok(txid)
    }
}

fn verify_input(tx: &Transaction, index: usize, input: &TxIn, prev: &TxOut) -> Result<(), ChainError> {
    let rejected = |source: ContractError| ChainError::ScriptRejected { index, source };

    if let Some(owner) = parse_p2pk(&prev.script) {
        let sig = TxSignature::from_bytes(&input.unlocking).map_err(rejected)?;
        let preimage = tx.sighash_preimage(index, prev, sig.sighash);
        return sig.verify(&owner, &preimage).map_err(rejected);
    }

    if is_onchain_img(&prev.script) {
        let contract = OnchainImg::from_locking_script(&prev.script).map_err(rejected)?;
        let call = Transition::decode(&input.unlocking).map_err(rejected)?;
        let ctx = tx.script_context(index, prev, call.sighash_type());
        contract.apply(call, &ctx).map_err(rejected)?;
        return Ok(());
    }

    Err(ChainError::UnknownScript { index })
}
