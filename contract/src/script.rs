//! Locking and unlocking script layouts for `OnchainImg`.
//!
//! Locking script: `CODE || OP_RETURN || pubkey(32) || compact-size(len) || img`.
//! The code section is fixed by the artifact; everything after `OP_RETURN`
//! is contract state.
//!
//! Unlocking script: `method index || arguments`, see [`Transition`].

use crate::context::{write_varint, Reader};
use crate::crypto::{PubKey, TxSignature};
use crate::{ContractError, SigHashType};

/// Code section shared by every `OnchainImg` instance.
pub const CODE: &[u8] = b"\x04OIMG\x01\x00update_img\xad";

/// Separates code from serialized state.
pub const OP_RETURN: u8 = 0x6a;

/// Method index of `update_img` in the unlocking script.
pub const UPDATE_IMG_INDEX: u8 = 0;

/// Encode contract state into a full locking script.
pub fn encode_locking_script(pubkey: &PubKey, img_raw_bytes: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(CODE.len() + 1 + 32 + 9 + img_raw_bytes.len());
    script.extend_from_slice(CODE);
    script.push(OP_RETURN);
    script.extend_from_slice(&pubkey.0);
    write_varint(&mut script, img_raw_bytes.len() as u64);
    script.extend_from_slice(img_raw_bytes);
    script
}

/// Whether a locking script carries the `OnchainImg` code section.
pub fn is_onchain_img(script: &[u8]) -> bool {
    script.len() > CODE.len() && script.starts_with(CODE) && script[CODE.len()] == OP_RETURN
}

/// Split a locking script back into `(pubkey, img_raw_bytes)`.
pub fn decode_locking_script(script: &[u8]) -> Result<(PubKey, Vec<u8>), ContractError> {
    if !is_onchain_img(script) {
        return Err(ContractError::NotOnchainImg);
    }
    let mut reader = Reader::new(&script[CODE.len() + 1..]);
    let pubkey = PubKey(reader.array()?);
    let img = reader.var_bytes()?.to_vec();
    reader.finish()?;
    Ok((pubkey, img))
}

/// A call against the contract, as carried in the unlocking script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    UpdateImg {
        img_raw_bytes: Vec<u8>,
        sig: TxSignature,
    },
}

impl Transition {
    /// Signature-hash policy the method is declared with.
    pub fn sighash_type(&self) -> SigHashType {
        match self {
            Transition::UpdateImg { .. } => SigHashType::Single,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Transition::UpdateImg { img_raw_bytes, sig } => {
                let mut buf = Vec::with_capacity(1 + 9 + img_raw_bytes.len() + 65);
                buf.push(UPDATE_IMG_INDEX);
                write_varint(&mut buf, img_raw_bytes.len() as u64);
                buf.extend_from_slice(img_raw_bytes);
                buf.extend_from_slice(&sig.to_bytes());
                buf
            }
        }
    }

    pub fn decode(unlocking: &[u8]) -> Result<Self, ContractError> {
        let mut reader = Reader::new(unlocking);
        match reader.u8()? {
            UPDATE_IMG_INDEX => {
                let img_raw_bytes = reader.var_bytes()?.to_vec();
                let sig = TxSignature::from_bytes(reader.take(crate::crypto::TX_SIGNATURE_LEN)?)?;
                reader.finish()?;
                Ok(Transition::UpdateImg { img_raw_bytes, sig })
            }
            other => Err(ContractError::UnknownMethod(other)),
        }
    }
}
