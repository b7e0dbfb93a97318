pub mod chain;
pub mod instance;
pub mod script_hash;
pub mod tx;
pub mod valkey;
pub mod wallet;

pub use chain::{Chain, ChainBackend, ChainError};
pub use instance::{CallResult, ContractInstance, Deployment, InstanceError};
pub use script_hash::{script_hash, ScriptHashError};
pub use tx::{Outpoint, Transaction, TxIn, TxOut, Txid, Utxo};
pub use wallet::{AuthResponse, Wallet, WalletError};
