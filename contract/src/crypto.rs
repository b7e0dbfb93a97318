//! Ed25519 key and signature wrappers shared by the contract and its callers.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::context::{hash256, SigHashType};
use crate::ContractError;

/// Raw 32-byte Ed25519 public key, hex in JSON and `Display`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PubKey(pub [u8; 32]);

impl PubKey {
    pub fn from_hex(s: &str) -> Result<Self, ContractError> {
        let bytes = hex::decode(s)
            .map_err(|e| ContractError::Malformed(format!("public key hex: {e}")))?;
        let raw: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ContractError::InvalidPublicKey)?;
        Ok(Self(raw))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn verifying_key(&self) -> Result<VerifyingKey, ContractError> {
        VerifyingKey::from_bytes(&self.0).map_err(|_| ContractError::InvalidPublicKey)
    }
}

impl From<VerifyingKey> for PubKey {
    fn from(key: VerifyingKey) -> Self {
        Self(key.to_bytes())
    }
}

impl TryFrom<String> for PubKey {
    type Error = ContractError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<PubKey> for String {
    fn from(key: PubKey) -> Self {
        key.to_hex()
    }
}

impl fmt::Display for PubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PubKey({})", self.to_hex())
    }
}

/// Length of an encoded transaction signature (Ed25519 + sighash flag).
pub const TX_SIGNATURE_LEN: usize = 65;

/// A signature over `hash256(preimage)` tagged with the sighash flag it was made under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxSignature {
    pub signature: [u8; 64],
    pub sighash: SigHashType,
}

impl TxSignature {
    /// Sign a sighash preimage.
    pub fn sign(key: &SigningKey, preimage: &[u8], sighash: SigHashType) -> Self {
        let digest = hash256(preimage);
        Self {
            signature: key.sign(&digest).to_bytes(),
            sighash,
        }
    }

    /// Check the signature against `hash256(preimage)`.
    pub fn verify(&self, pubkey: &PubKey, preimage: &[u8]) -> Result<(), ContractError> {
        let key = pubkey.verifying_key()?;
        let digest = hash256(preimage);
        key.verify(&digest, &Signature::from_bytes(&self.signature))
            .map_err(|_| ContractError::SignatureInvalid)
    }

    pub fn to_bytes(&self) -> [u8; TX_SIGNATURE_LEN] {
        let mut out = [0u8; TX_SIGNATURE_LEN];
        out[..64].copy_from_slice(&self.signature);
        out[64] = self.sighash.to_byte();
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ContractError> {
        if bytes.len() != TX_SIGNATURE_LEN {
            return Err(ContractError::Malformed(format!(
                "signature must be {TX_SIGNATURE_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let mut signature = [0u8; 64];
        signature.copy_from_slice(&bytes[..64]);
        Ok(Self {
            signature,
            sighash: SigHashType::from_byte(bytes[64])?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_sign_and_verify() {
        let key = SigningKey::generate(&mut OsRng);
        let pubkey = PubKey::from(key.verifying_key());
        let sig = TxSignature::sign(&key, b"preimage", SigHashType::Single);
        assert!(sig.verify(&pubkey, b"preimage").is_ok());
        assert!(matches!(
            sig.verify(&pubkey, b"other"),
            Err(ContractError::SignatureInvalid)
        ));
    }

    #[test]
    fn test_signature_bytes_carry_flag() {
        let key = SigningKey::generate(&mut OsRng);
        let sig = TxSignature::sign(&key, b"x", SigHashType::All);
        let decoded = TxSignature::from_bytes(&sig.to_bytes()).unwrap();
        assert_eq!(decoded, sig);
        assert!(TxSignature::from_bytes(&sig.to_bytes()[..64]).is_err());
    }

    #[test]
    fn test_pubkey_hex() {
        let key = SigningKey::generate(&mut OsRng);
        let pubkey = PubKey::from(key.verifying_key());
        assert_eq!(PubKey::from_hex(&pubkey.to_hex()).unwrap(), pubkey);
        assert!(PubKey::from_hex("abcd").is_err());
        let json = serde_json::to_string(&pubkey).unwrap();
        assert_eq!(json, format!("\"{}\"", pubkey.to_hex()));
    }
}
