//! Wallet signer: owns the key material and signs sighash preimages.

use ed25519_dalek::SigningKey;
use onchain_img_contract::{PubKey, SigHashType, TxSignature};
use rand::rngs::OsRng;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// `0x20` push of a 32-byte key followed by `OP_CHECKSIG`.
pub const P2PK_PUSH: u8 = 0x20;
pub const OP_CHECKSIG: u8 = 0xac;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("wallet is not authenticated")]
    NotAuthenticated,
    #[error("invalid private key: {0}")]
    InvalidKey(String),
}

/// Result of an authentication request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthResponse {
    pub is_authenticated: bool,
    pub error: Option<String>,
}

/// Pay-to-public-key locking script for `pubkey`.
pub fn p2pk_script(pubkey: &PubKey) -> Vec<u8> {
    let mut script = Vec::with_capacity(34);
    script.push(P2PK_PUSH);
    script.extend_from_slice(&pubkey.0);
    script.push(OP_CHECKSIG);
    script
}

/// Owner key of a pay-to-public-key script, if it is one.
pub fn parse_p2pk(script: &[u8]) -> Option<PubKey> {
    if script.len() != 34 || script[0] != P2PK_PUSH || script[33] != OP_CHECKSIG {
        return None;
    }
    let mut raw = [0u8; 32];
    raw.copy_from_slice(&script[1..33]);
    Some(PubKey(raw))
}

pub struct Wallet {
    key: Option<SigningKey>,
    authenticated: AtomicBool,
}

impl Wallet {
    pub fn new(key: SigningKey) -> Self {
        Self {
            key: Some(key),
            authenticated: AtomicBool::new(false),
        }
    }

    /// A wallet with no key loaded; every auth request fails.
    pub fn locked() -> Self {
        Self {
            key: None,
            authenticated: AtomicBool::new(false),
        }
    }

    pub fn generate() -> Self {
        Self::new(SigningKey::generate(&mut OsRng))
    }

    /// Load from a 32-byte seed in hex.
    pub fn from_hex(seed_hex: &str) -> Result<Self, WalletError> {
        let bytes =
            hex::decode(seed_hex.trim()).map_err(|e| WalletError::InvalidKey(e.to_string()))?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| WalletError::InvalidKey(format!("expected 32 bytes, got {}", v.len())))?;
        Ok(Self::new(SigningKey::from_bytes(&seed)))
    }

    pub async fn request_auth(&self) -> AuthResponse {
        match &self.key {
            Some(_) => {
                self.authenticated.store(true, Ordering::SeqCst);
                AuthResponse {
                    is_authenticated: true,
                    error: None,
                }
            }
            None => AuthResponse {
                is_authenticated: false,
                error: Some("no key loaded".into()),
            },
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    fn authed_key(&self) -> Result<&SigningKey, WalletError> {
        match &self.key {
            Some(key) if self.is_authenticated() => Ok(key),
            _ => Err(WalletError::NotAuthenticated),
        }
    }

    pub async fn default_pub_key(&self) -> Result<PubKey, WalletError> {
        Ok(PubKey::from(self.authed_key()?.verifying_key()))
    }

    pub async fn p2pk_script(&self) -> Result<Vec<u8>, WalletError> {
        Ok(p2pk_script(&self.default_pub_key().await?))
    }

    pub async fn sign(
        &self,
        preimage: &[u8],
        sighash: SigHashType,
    ) -> Result<TxSignature, WalletError> {
        Ok(TxSignature::sign(self.authed_key()?, preimage, sighash))
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "Wallet({})", PubKey::from(key.verifying_key())),
            None => f.write_str("Wallet(locked)"),
        }
    }
}
