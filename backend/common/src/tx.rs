use onchain_img_contract::context::{write_varint, Reader};
use onchain_img_contract::{hash256, serialize_output, ContractError, ScriptContext, SigHashType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Transaction id. Stored in internal byte order, displayed reversed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Txid(pub [u8; 32]);

impl Txid {
    /// Outpoints with this id mark coinbase inputs.
    pub const NULL: Txid = Txid([0u8; 32]);
}

impl fmt::Display for Txid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rev = self.0;
        rev.reverse();
        f.write_str(&hex::encode(rev))
    }
}

impl fmt::Debug for Txid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Txid({self})")
    }
}

impl FromStr for Txid {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes =
            hex::decode(s).map_err(|e| ContractError::Malformed(format!("txid hex: {e}")))?;
        let mut raw: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ContractError::Malformed("txid must be 32 bytes".into()))?;
        raw.reverse();
        Ok(Self(raw))
    }
}

impl TryFrom<String> for Txid {
    type Error = ContractError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Txid> for String {
    fn from(txid: Txid) -> Self {
        txid.to_string()
    }
}

/// Reference to one output of a transaction, `txid:vout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Outpoint {
    pub txid: Txid,
    pub vout: u32,
}

impl Outpoint {
    pub fn new(txid: Txid, vout: u32) -> Self {
        Self { txid, vout }
    }

    pub fn is_null(&self) -> bool {
        self.txid == Txid::NULL && self.vout == u32::MAX
    }

    fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.txid.0);
        buf.extend_from_slice(&self.vout.to_le_bytes());
    }
}

impl fmt::Display for Outpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

impl FromStr for Outpoint {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (txid, vout) = s
            .split_once(':')
            .ok_or_else(|| ContractError::Malformed(format!("outpoint {s:?} lacks ':'")))?;
        let vout = vout
            .parse()
            .map_err(|e| ContractError::Malformed(format!("outpoint index: {e}")))?;
        Ok(Self::new(txid.parse()?, vout))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIn {
    pub prev: Outpoint,
    pub unlocking: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOut {
    pub value: u64,
    pub script: Vec<u8>,
}

impl TxOut {
    pub fn encode(&self) -> Vec<u8> {
        serialize_output(self.value, &self.script)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ContractError> {
        let mut reader = Reader::new(bytes);
        let out = Self::read(&mut reader)?;
        reader.finish()?;
        Ok(out)
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, ContractError> {
        let value = reader.u64_le()?;
        let script = reader.var_bytes()?.to_vec();
        Ok(Self { value, script })
    }
}

/// An unspent output together with where it lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub outpoint: Outpoint,
    pub output: TxOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub locktime: u32,
}

impl Transaction {
    pub fn new(inputs: Vec<TxIn>, outputs: Vec<TxOut>) -> Self {
        Self {
            version: 1,
            inputs,
            outputs,
            locktime: 0,
        }
    }

    /// Mint outputs from nothing. `nonce` keeps coinbase txids distinct.
    pub fn coinbase(outputs: Vec<TxOut>, nonce: u64) -> Self {
        Self::new(
            vec![TxIn {
                prev: Outpoint::new(Txid::NULL, u32::MAX),
                unlocking: nonce.to_le_bytes().to_vec(),
            }],
            outputs,
        )
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].prev.is_null()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.version.to_le_bytes());
        write_varint(&mut buf, self.inputs.len() as u64);
        for input in &self.inputs {
            input.prev.write(&mut buf);
            write_varint(&mut buf, input.unlocking.len() as u64);
            buf.extend_from_slice(&input.unlocking);
        }
        write_varint(&mut buf, self.outputs.len() as u64);
        for output in &self.outputs {
            buf.extend_from_slice(&output.encode());
        }
        buf.extend_from_slice(&self.locktime.to_le_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ContractError> {
        let mut reader = Reader::new(bytes);
        let version = reader.u32_le()?;

        let n_in = reader.varint()?;
        let mut inputs = Vec::new();
        for _ in 0..n_in {
            let txid = Txid(reader.array()?);
            let vout = reader.u32_le()?;
            let unlocking = reader.var_bytes()?.to_vec();
            inputs.push(TxIn {
                prev: Outpoint::new(txid, vout),
                unlocking,
            });
        }

        let n_out = reader.varint()?;
        let mut outputs = Vec::new();
        for _ in 0..n_out {
            outputs.push(TxOut::read(&mut reader)?);
        }

        let locktime = reader.u32_le()?;
        reader.finish()?;
        Ok(Self {
            version,
            inputs,
            outputs,
            locktime,
        })
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.encode())
    }

    pub fn from_hex(s: &str) -> Result<Self, ContractError> {
        let bytes = hex::decode(s).map_err(|e| ContractError::Malformed(format!("tx hex: {e}")))?;
        Self::decode(&bytes)
    }

    pub fn txid(&self) -> Txid {
        Txid(hash256(&self.encode()))
    }

    pub fn total_output_value(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, out| acc.checked_add(out.value))
    }

    fn hash_prevouts(&self) -> [u8; 32] {
        let mut buf = Vec::with_capacity(self.inputs.len() * 36);
        for input in &self.inputs {
            input.prev.write(&mut buf);
        }
        hash256(&buf)
    }

    /// `hashOutputs` for input `index` under `flag`.
    pub fn hash_outputs(&self, index: usize, flag: SigHashType) -> [u8; 32] {
        match flag {
            SigHashType::All => {
                let mut buf = Vec::new();
                for output in &self.outputs {
                    buf.extend_from_slice(&output.encode());
                }
                hash256(&buf)
            }
            SigHashType::Single => match self.outputs.get(index) {
                Some(output) => hash256(&output.encode()),
                None => [0u8; 32],
            },
        }
    }

    /// Bytes a signature for input `index` commits to. Unlocking scripts are
    /// never part of the preimage, so inputs can be signed in any order.
    pub fn sighash_preimage(&self, index: usize, prev_out: &TxOut, flag: SigHashType) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&self.hash_prevouts());
        if let Some(input) = self.inputs.get(index) {
            input.prev.write(&mut buf);
        }
        write_varint(&mut buf, prev_out.script.len() as u64);
        buf.extend_from_slice(&prev_out.script);
        buf.extend_from_slice(&prev_out.value.to_le_bytes());
        buf.extend_from_slice(&self.hash_outputs(index, flag));
        buf.extend_from_slice(&self.locktime.to_le_bytes());
        buf.extend_from_slice(&(flag.to_byte() as u32).to_le_bytes());
        buf
    }

    pub fn script_context(&self, index: usize, prev_out: &TxOut, flag: SigHashType) -> ScriptContext {
        ScriptContext {
            utxo_value: prev_out.value,
            hash_outputs: self.hash_outputs(index, flag),
            preimage: self.sighash_preimage(index, prev_out, flag),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Transaction {
        Transaction::new(
            vec![TxIn {
                prev: Outpoint::new(Txid([9u8; 32]), 1),
                unlocking: vec![1, 2, 3],
            }],
            vec![
                TxOut {
                    value: 1,
                    script: vec![0xaa],
                },
                TxOut {
                    value: 99,
                    script: vec![0xbb; 300],
                },
            ],
        )
    }

    #[test]
    fn test_decode_restores_transaction() {
        let tx = sample();
        assert_eq!(Transaction::from_hex(&tx.to_hex()).unwrap(), tx);
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let mut bytes = sample().encode();
        bytes.push(0);
        assert!(Transaction::decode(&bytes).is_err());
    }

    #[test]
    fn test_txid_display_is_reversed() {
        let mut raw = [0u8; 32];
        raw[0] = 0x01;
        let txid = Txid(raw);
        let shown = txid.to_string();
        assert!(shown.ends_with("01"));
        assert_eq!(shown.parse::<Txid>().unwrap(), txid);
    }

    #[test]
    fn test_outpoint_parse() {
        let outpoint = Outpoint::new(sample().txid(), 0);
        let parsed: Outpoint = outpoint.to_string().parse().unwrap();
        assert_eq!(parsed, outpoint);
        assert!("abc".parse::<Outpoint>().is_err());
    }

    #[test]
    fn test_txid_covers_unlocking_scripts() {
        let tx = sample();
        let mut other = tx.clone();
        other.inputs[0].unlocking.push(4);
        assert_ne!(tx.txid(), other.txid());
    }

    #[test]
    fn test_single_commits_to_own_output_only() {
        let tx = sample();
        let prev = TxOut {
            value: 100,
            script: vec![0xcc],
        };
        let before = tx.sighash_preimage(0, &prev, SigHashType::Single);

        let mut changed = tx.clone();
        changed.outputs[1].value = 50;
        assert_eq!(before, changed.sighash_preimage(0, &prev, SigHashType::Single));
        assert_ne!(
            tx.sighash_preimage(0, &prev, SigHashType::All),
            changed.sighash_preimage(0, &prev, SigHashType::All)
        );

        changed.outputs[0].value = 2;
        assert_ne!(before, changed.sighash_preimage(0, &prev, SigHashType::Single));
    }

    #[test]
    fn test_single_without_matching_output() {
        let tx = sample();
        assert_eq!(tx.hash_outputs(5, SigHashType::Single), [0u8; 32]);
    }

    #[test]
    fn test_coinbase() {
        let tx = Transaction::coinbase(vec![], 7);
        assert!(tx.is_coinbase());
        assert!(!sample().is_coinbase());
        assert_ne!(tx.txid(), Transaction::coinbase(vec![], 8).txid());
    }
}
