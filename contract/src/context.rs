use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ContractError;

/// Signature hash flag carried as the last byte of every transaction signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SigHashType {
    /// Commits to every output of the transaction.
    All,
    /// Commits only to the output sharing the signed input's index.
    Single,
}

impl SigHashType {
    pub fn to_byte(self) -> u8 {
        match self {
            SigHashType::All => 0x41,
            SigHashType::Single => 0x43,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self, ContractError> {
        match byte {
            0x41 => Ok(SigHashType::All),
            0x43 => Ok(SigHashType::Single),
            other => Err(ContractError::Malformed(format!(
                "unknown sighash flag 0x{other:02x}"
            ))),
        }
    }
}

/// What a contract input can observe about the transaction spending it.
#[derive(Debug, Clone)]
pub struct ScriptContext {
    /// Value locked in the output being spent.
    pub utxo_value: u64,
    /// `hashOutputs` field of the preimage for the flag in use.
    pub hash_outputs: [u8; 32],
    /// Full signature-hash preimage; signatures commit to `hash256(preimage)`.
    pub preimage: Vec<u8>,
}

/// Double SHA-256.
pub fn hash256(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    Sha256::digest(first).into()
}

/// Append a Bitcoin-style compact-size integer.
pub fn write_varint(buf: &mut Vec<u8>, n: u64) {
    match n {
        0..=0xfc => buf.push(n as u8),
        0xfd..=0xffff => {
            buf.push(0xfd);
            buf.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            buf.push(0xfe);
            buf.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            buf.push(0xff);
            buf.extend_from_slice(&n.to_le_bytes());
        }
    }
}

/// Byte cursor used by every decoder in the workspace.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], ContractError> {
        if self.remaining() < n {
            return Err(ContractError::Malformed(format!(
                "need {n} bytes at offset {}, have {}",
                self.pos,
                self.remaining()
            )));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn array<const N: usize>(&mut self) -> Result<[u8; N], ContractError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, ContractError> {
        Ok(self.take(1)?[0])
    }

    pub fn u32_le(&mut self) -> Result<u32, ContractError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn u64_le(&mut self) -> Result<u64, ContractError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    pub fn varint(&mut self) -> Result<u64, ContractError> {
        match self.u8()? {
            0xfd => Ok(u16::from_le_bytes(self.array()?) as u64),
            0xfe => Ok(self.u32_le()? as u64),
            0xff => self.u64_le(),
            n => Ok(n as u64),
        }
    }

    /// Compact-size length followed by that many bytes.
    pub fn var_bytes(&mut self) -> Result<&'a [u8], ContractError> {
        let len = self.varint()?;
        let len = usize::try_from(len)
            .map_err(|_| ContractError::Malformed(format!("length {len} too large")))?;
        self.take(len)
    }

    pub fn finish(self) -> Result<(), ContractError> {
        if self.remaining() != 0 {
            return Err(ContractError::Malformed(format!(
                "{} trailing bytes",
                self.remaining()
            )));
        }
        Ok(())
    }
}

/// Serialized form of a transaction output: `value || compact-size(len) || script`.
pub fn serialize_output(value: u64, script: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + 9 + script.len());
    buf.extend_from_slice(&value.to_le_bytes());
    write_varint(&mut buf, script.len() as u64);
    buf.extend_from_slice(script);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_boundaries() {
        for n in [0u64, 0xfc, 0xfd, 0xffff, 0x1_0000, 0xffff_ffff, 0x1_0000_0000] {
            let mut buf = Vec::new();
            write_varint(&mut buf, n);
            let mut reader = Reader::new(&buf);
            assert_eq!(reader.varint().unwrap(), n);
            reader.finish().unwrap();
        }
    }

    #[test]
    fn test_varint_widths() {
        let mut buf = Vec::new();
        write_varint(&mut buf, 0xfc);
        assert_eq!(buf.len(), 1);
        buf.clear();
        write_varint(&mut buf, 0xfd);
        assert_eq!(buf, vec![0xfd, 0xfd, 0x00]);
    }

    #[test]
    fn test_reader_short_input() {
        let mut reader = Reader::new(&[1, 2]);
        assert!(reader.take(3).is_err());
    }

    #[test]
    fn test_sighash_flag_bytes() {
        assert_eq!(SigHashType::from_byte(0x43).unwrap(), SigHashType::Single);
        assert_eq!(SigHashType::All.to_byte(), 0x41);
        assert!(SigHashType::from_byte(0x01).is_err());
    }

    #[test]
    fn test_hash256_empty() {
        assert_eq!(
            hex::encode(hash256(b"")),
            "5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456"
        );
    }
}
