use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContractError {
    #[error("malformed encoding: {0}")]
    Malformed(String),

    #[error("not an OnchainImg locking script")]
    NotOnchainImg,

    #[error("unknown method index {0}")]
    UnknownMethod(u8),

    #[error("method requires sighash {expected:?}, signature carries {actual:?}")]
    SigHashMismatch {
        expected: crate::SigHashType,
        actual: crate::SigHashType,
    },

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("signature check failed")]
    SignatureInvalid,

    #[error("hashOutputs mismatch")]
    HashOutputsMismatch,

    #[error("artifact mismatch: {0}")]
    ArtifactMismatch(String),

    #[error("artifact io: {0}")]
    Io(#[from] std::io::Error),

    #[error("artifact json: {0}")]
    Json(#[from] serde_json::Error),
}
