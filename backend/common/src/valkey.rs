use crate::tx::Outpoint;

/// Valkey hash holding the devnet UTXO set (`txid:vout` -> encoded output hex).
pub const UTXO_SET: &str = "utxo_set";

/// Valkey counter of transactions accepted by `broadcast` and the faucet.
pub const ACCEPTED_TX_COUNT: &str = "accepted_tx_count";

/// Field name of an outpoint inside [`UTXO_SET`].
pub fn utxo_field(outpoint: &Outpoint) -> String {
    outpoint.to_string()
}
