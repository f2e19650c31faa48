//! Multi-algorithm integrity verification for cached payloads (C4).

use base64::Engine as _;
use sha2::{Digest as Sha2Digest, Sha256, Sha384, Sha512};
use sha3::{Sha3_256, Sha3_384, Sha3_512};

use wis2gc_common::{IntegrityBlock, Wis2Error};

fn digest(method: &str, bytes: &[u8]) -> Result<Vec<u8>, Wis2Error> {
    Ok(match method {
        "sha256" => Sha256::digest(bytes).to_vec(),
        "sha384" => Sha384::digest(bytes).to_vec(),
        "sha512" => Sha512::digest(bytes).to_vec(),
        "sha3-256" => Sha3_256::digest(bytes).to_vec(),
        "sha3-384" => Sha3_384::digest(bytes).to_vec(),
        "sha3-512" => Sha3_512::digest(bytes).to_vec(),
        other => return Err(Wis2Error::UnsupportedHash(other.to_string())),
    })
}

/// Verify `bytes` against `block`, accepting either base64 or lowercase-hex
/// encodings of the digest.
pub fn verify(bytes: &[u8], block: &IntegrityBlock) -> Result<(), Wis2Error> {
    let raw = digest(&block.method, bytes)?;
    let b64 = base64::engine::general_purpose::STANDARD.encode(&raw);
    let hex_digest = hex::encode(&raw);

    if block.value == b64 || block.value == hex_digest {
        Ok(())
    } else {
        Err(Wis2Error::ChecksumFailed {
            method: block.method.clone(),
        })
    }
}

/// Return `block` unchanged if present; otherwise compute a SHA-512 digest
/// of `bytes` and return a freshly generated block.
pub fn ensure(bytes: &[u8], block: Option<&IntegrityBlock>) -> IntegrityBlock {
    if let Some(b) = block {
        return b.clone();
    }
    let raw = Sha512::digest(bytes);
    IntegrityBlock {
        method: "sha512".to_string(),
        value: base64::engine::general_purpose::STANDARD.encode(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_accepts_base64_digest() {
        let block = ensure(b"hello", None);
        assert_eq!(block.method, "sha512");
        assert!(verify(b"hello", &block).is_ok());
    }

    #[test]
    fn verify_accepts_hex_digest() {
        let raw = Sha256::digest(b"hello");
        let block = IntegrityBlock {
            method: "sha256".to_string(),
            value: hex::encode(raw),
        };
        assert!(verify(b"hello", &block).is_ok());
    }

    #[test]
    fn verify_rejects_mismatched_digest() {
        let block = IntegrityBlock {
            method: "sha256".to_string(),
            value: "deadbeef".to_string(),
        };
        let err = verify(b"hello", &block).unwrap_err();
        assert!(matches!(err, Wis2Error::ChecksumFailed { .. }));
    }

    #[test]
    fn verify_rejects_unsupported_method() {
        let block = IntegrityBlock {
            method: "md5".to_string(),
            value: "whatever".to_string(),
        };
        let err = verify(b"hello", &block).unwrap_err();
        assert!(matches!(err, Wis2Error::UnsupportedHash(_)));
    }

    #[test]
    fn ensure_generated_block_is_always_valid() {
        let block = ensure(b"some bytes", None);
        assert!(verify(b"some bytes", &block).is_ok());
    }

    #[test]
    fn ensure_passes_through_existing_block() {
        let existing = IntegrityBlock {
            method: "sha384".to_string(),
            value: "irrelevant".to_string(),
        };
        let out = ensure(b"bytes", Some(&existing));
        assert_eq!(out, existing);
    }
}
