use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScriptHashError {
    #[error("scriptPubKeyHex is not of even length")]
    OddLength,
    #[error("scriptPubKeyHex is not hex: {0}")]
    InvalidHex(String),
}

/// Script hash used to subscribe to a locking script: the SHA-256 of the
/// script bytes, byte order reversed, as hex.
pub fn script_hash(script_pub_key_hex: &str) -> Result<String, ScriptHashError> {
    let script = hex::decode(script_pub_key_hex).map_err(|e| match e {
        hex::FromHexError::OddLength => ScriptHashError::OddLength,
        other => ScriptHashError::InvalidHex(other.to_string()),
    })?;
    let mut digest: [u8; 32] = Sha256::digest(&script).into();
    digest.reverse();
    Ok(hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_script() {
        // sha256("") = e3b0c442...b855, reversed
        assert_eq!(
            script_hash("").unwrap(),
            "55b852781b9995a44c939b64e441ae2724b96f99c8f4fb9a141cfc9842c4b0e3"
        );
    }

    #[test]
    fn test_matches_reversed_digest() {
        let script = "76a91489abcdefabbaabbaabbaabbaabbaabbaabbaabba88ac";
        let mut expected: [u8; 32] = Sha256::digest(hex::decode(script).unwrap()).into();
        expected.reverse();
        assert_eq!(script_hash(script).unwrap(), hex::encode(expected));
    }

    #[test]
    fn test_odd_length_rejected() {
        assert_eq!(script_hash("abc"), Err(ScriptHashError::OddLength));
    }

    #[test]
    fn test_non_hex_rejected() {
        assert!(matches!(
            script_hash("zz"),
            Err(ScriptHashError::InvalidHex(_))
        ));
    }
}
