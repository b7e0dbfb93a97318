//! `OnchainImg`: a stateful contract that keeps an image in its own locking
//! script. The owner key is fixed at deployment; the image is replaced by
//! `update_img`, which must re-create the contract in a single output carrying
//! the same locked value.

pub mod artifact;
pub mod context;
pub mod crypto;
mod error;
pub mod script;

use base64::Engine;
use serde::{Deserialize, Serialize};

pub use artifact::Artifact;
pub use context::{hash256, serialize_output, ScriptContext, SigHashType};
pub use crypto::{PubKey, TxSignature};
pub use error::ContractError;
pub use script::Transition;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnchainImg {
    pubkey: PubKey,
    #[serde(with = "hex_bytes")]
    img_raw_bytes: Vec<u8>,
}

impl OnchainImg {
    pub fn new(pubkey: PubKey, img_raw_bytes: Vec<u8>) -> Self {
        Self {
            pubkey,
            img_raw_bytes,
        }
    }

    /// Rebuild the contract from an on-chain locking script.
    pub fn from_locking_script(script: &[u8]) -> Result<Self, ContractError> {
        let (pubkey, img_raw_bytes) = script::decode_locking_script(script)?;
        Ok(Self::new(pubkey, img_raw_bytes))
    }

    pub fn pubkey(&self) -> &PubKey {
        &self.pubkey
    }

    pub fn img_raw_bytes(&self) -> &[u8] {
        &self.img_raw_bytes
    }

    pub fn locking_script(&self) -> Vec<u8> {
        script::encode_locking_script(&self.pubkey, &self.img_raw_bytes)
    }

    /// Successor state with the owner key carried over.
    pub fn with_img(&self, img_raw_bytes: Vec<u8>) -> Self {
        Self::new(self.pubkey, img_raw_bytes)
    }

    /// Serialized output re-creating this state with `amount` locked.
    pub fn build_state_output(&self, amount: u64) -> Vec<u8> {
        serialize_output(amount, &self.locking_script())
    }

    /// Run a transition against the spending transaction's context and
    /// return the state it commits to.
    pub fn apply(&self, call: Transition, ctx: &ScriptContext) -> Result<Self, ContractError> {
        match call {
            Transition::UpdateImg { img_raw_bytes, sig } => {
                self.update_img(img_raw_bytes, &sig, ctx)
            }
        }
    }

    fn update_img(
        &self,
        img_raw_bytes: Vec<u8>,
        sig: &TxSignature,
        ctx: &ScriptContext,
    ) -> Result<Self, ContractError> {
        if sig.sighash != SigHashType::Single {
            return Err(ContractError::SigHashMismatch {
                expected: SigHashType::Single,
                actual: sig.sighash,
            });
        }
        sig.verify(&self.pubkey, &ctx.preimage)?;

        let next = self.with_img(img_raw_bytes);
        // Locked value is carried forward unchanged.
        let output = next.build_state_output(ctx.utxo_value);
        if ctx.hash_outputs != hash256(&output) {
            return Err(ContractError::HashOutputsMismatch);
        }
        Ok(next)
    }

    /// `data:` URL for the current image, `None` when no image is stored.
    pub fn img_to_base64_url(&self) -> Option<String> {
        if self.img_raw_bytes.is_empty() {
            return None;
        }
        Some(format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&self.img_raw_bytes)
        ))
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    /// Context the way a spending transaction with one state output would present it.
    fn context_for(next: &OnchainImg, value: u64, carried: u64) -> ScriptContext {
        let mut preimage = b"preimage:".to_vec();
        preimage.extend_from_slice(&value.to_le_bytes());
        ScriptContext {
            utxo_value: value,
            hash_outputs: hash256(&next.build_state_output(carried)),
            preimage,
        }
    }

    fn owner() -> (SigningKey, OnchainImg) {
        let key = SigningKey::generate(&mut OsRng);
        let contract = OnchainImg::new(PubKey::from(key.verifying_key()), vec![]);
        (key, contract)
    }

    fn call(key: &SigningKey, img: &[u8], ctx: &ScriptContext, flag: SigHashType) -> Transition {
        Transition::UpdateImg {
            img_raw_bytes: img.to_vec(),
            sig: TxSignature::sign(key, &ctx.preimage, flag),
        }
    }

    #[test]
    fn test_update_img_replaces_image_keeps_owner() {
        let (key, contract) = owner();
        let new_img = b"0123456789".to_vec();
        let ctx = context_for(&contract.with_img(new_img.clone()), 1, 1);

        let next = contract
            .apply(call(&key, &new_img, &ctx, SigHashType::Single), &ctx)
            .unwrap();
        assert_eq!(next.img_raw_bytes(), new_img.as_slice());
        assert_eq!(next.pubkey(), contract.pubkey());
    }

    #[test]
    fn test_update_img_rejects_wrong_key() {
        let (_, contract) = owner();
        let intruder = SigningKey::generate(&mut OsRng);
        let ctx = context_for(&contract.with_img(b"x".to_vec()), 1, 1);

        let result = contract.apply(call(&intruder, b"x", &ctx, SigHashType::Single), &ctx);
        assert!(matches!(result, Err(ContractError::SignatureInvalid)));
        assert!(contract.img_raw_bytes().is_empty());
    }

    #[test]
    fn test_update_img_rejects_changed_value() {
        let (key, contract) = owner();
        let ctx = context_for(&contract.with_img(b"x".to_vec()), 5, 4);

        let result = contract.apply(call(&key, b"x", &ctx, SigHashType::Single), &ctx);
        assert!(matches!(result, Err(ContractError::HashOutputsMismatch)));
    }

    #[test]
    fn test_update_img_rejects_output_for_other_image() {
        let (key, contract) = owner();
        let ctx = context_for(&contract.with_img(b"committed".to_vec()), 1, 1);

        let result = contract.apply(call(&key, b"claimed", &ctx, SigHashType::Single), &ctx);
        assert!(matches!(result, Err(ContractError::HashOutputsMismatch)));
    }

    #[test]
    fn test_update_img_requires_single() {
        let (key, contract) = owner();
        let ctx = context_for(&contract.with_img(b"x".to_vec()), 1, 1);

        let result = contract.apply(call(&key, b"x", &ctx, SigHashType::All), &ctx);
        assert!(matches!(
            result,
            Err(ContractError::SigHashMismatch {
                actual: SigHashType::All,
                ..
            })
        ));
    }

    #[test]
    fn test_locking_script_roundtrip_preserves_state() {
        let (_, contract) = owner();
        let next = contract.with_img(vec![1, 2, 3]);
        assert_eq!(OnchainImg::from_locking_script(&next.locking_script()).unwrap(), next);
    }

    #[test]
    fn test_img_to_base64_url() {
        let (_, contract) = owner();
        assert_eq!(contract.img_to_base64_url(), None);
        let with_img = contract.with_img(b"hello".to_vec());
        assert_eq!(
            with_img.img_to_base64_url().as_deref(),
            Some("data:image/png;base64,aGVsbG8=")
        );
    }

    #[test]
    fn test_json_uses_hex() {
        let contract = OnchainImg::new(PubKey([1u8; 32]), vec![0xab, 0xcd]);
        let json = serde_json::to_value(&contract).unwrap();
        assert_eq!(json["img_raw_bytes"], "abcd");
        let back: OnchainImg = serde_json::from_value(json).unwrap();
        assert_eq!(back, contract);
    }
}
