//! Signature primitives behind a small provider trait, so verification logic
//! does not depend on a particular crypto backend.

use log::warn;
use p256::ecdsa::signature::hazmat::PrehashVerifier;
use p256::ecdsa::{Signature, VerifyingKey};
use p256::pkcs8::EncodePublicKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Invalid public key data")]
    InvalidPublicKey,
    #[error("Unable to encode public key: {0}")]
    Encoding(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum Curve {
    #[serde(rename = "secp256r1", alias = "prime256v1", alias = "P-256")]
    Secp256r1,
}

impl Curve {
    pub fn name(&self) -> &'static str {
        return match self {
            Curve::Secp256r1 => "secp256r1",
        };
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum DigestAlgorithm {
    #[serde(rename = "sha256", alias = "SHA-256")]
    Sha256,
}

impl DigestAlgorithm {
    pub fn name(&self) -> &'static str {
        return match self {
            DigestAlgorithm::Sha256 => "SHA-256",
        };
    }

    /// Digest over the concatenation of `parts`.
    pub fn digest<'a, I: IntoIterator<Item = &'a [u8]>>(&self, parts: I) -> Vec<u8> {
        return match self {
            DigestAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                for part in parts {
                    hasher.update(part);
                }
                hasher.finalize().to_vec()
            }
        };
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFormat {
    Der,  /* X.509 SubjectPublicKeyInfo */
    Sec1, /* uncompressed point */
}

pub trait CryptoProvider {
    /// Converts a public key as exported by the meter into `format`.
    fn public_key_from_blob(
        &self,
        curve: Curve,
        digest: DigestAlgorithm,
        blob: &[u8],
        format: KeyFormat,
    ) -> Result<Vec<u8>, CryptoError>;

    /// Checks `signature` over an already computed `digest_bytes`.
    fn verify_signed_digest(
        &self,
        curve: Curve,
        digest: DigestAlgorithm,
        public_key: &[u8],
        signature: &[u8],
        digest_bytes: &[u8],
    ) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EcdsaProvider;

impl EcdsaProvider {
    /* meters export the bare X||Y coordinates without the SEC1 tag */
    fn verifying_key(blob: &[u8]) -> Result<VerifyingKey, CryptoError> {
        let key = match blob.len() {
            64 => {
                let mut sec1 = Vec::with_capacity(65);
                sec1.push(0x04);
                sec1.extend_from_slice(blob);
                VerifyingKey::from_sec1_bytes(&sec1)
            }
            _ => VerifyingKey::from_sec1_bytes(blob),
        };

        return key.map_err(|_| CryptoError::InvalidPublicKey);
    }

    fn signature(blob: &[u8]) -> Option<Signature> {
        if blob.len() == 64 {
            if let Ok(signature) = Signature::from_slice(blob) {
                return Some(signature);
            }
        }

        return Signature::from_der(trim_der_padding(blob)).ok();
    }
}

/// A DER signature read from registers may carry a trailing pad byte. Cut the
/// data to the length declared by the outer SEQUENCE.
fn trim_der_padding(blob: &[u8]) -> &[u8] {
    if blob.len() >= 2 && blob[0] == 0x30 && blob[1] < 0x80 {
        let declared = 2 + blob[1] as usize;
        if declared <= blob.len() {
            return &blob[..declared];
        }
    }

    return blob;
}

impl CryptoProvider for EcdsaProvider {
    fn public_key_from_blob(
        &self,
        curve: Curve,
        _digest: DigestAlgorithm,
        blob: &[u8],
        format: KeyFormat,
    ) -> Result<Vec<u8>, CryptoError> {
        let key = match curve {
            Curve::Secp256r1 => Self::verifying_key(blob)?,
        };

        return match format {
            KeyFormat::Sec1 => Ok(key.to_encoded_point(false).as_bytes().to_vec()),
            KeyFormat::Der => key
                .to_public_key_der()
                .map(|doc| doc.as_bytes().to_vec())
                .map_err(|e| CryptoError::Encoding(format!("{e}"))),
        };
    }

    fn verify_signed_digest(
        &self,
        curve: Curve,
        _digest: DigestAlgorithm,
        public_key: &[u8],
        signature: &[u8],
        digest_bytes: &[u8],
    ) -> bool {
        let key = match curve {
            Curve::Secp256r1 => Self::verifying_key(public_key),
        };

        let key = match key {
            Ok(k) => k,
            Err(e) => {
                warn!("Rejecting signature: {e}");
                return false;
            }
        };

        let signature = match Self::signature(signature) {
            Some(s) => s,
            None => {
                warn!("Rejecting signature: unable to parse {} bytes", signature.len());
                return false;
            }
        };

        return key.verify_prehash(digest_bytes, &signature).is_ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::signature::hazmat::PrehashSigner;
    use p256::ecdsa::SigningKey;

    fn key_pair() -> (SigningKey, Vec<u8>) {
        let signing = SigningKey::from_slice(&[0x17; 32]).unwrap();
        let point = signing.verifying_key().to_encoded_point(false);
        /* drop the SEC1 tag, like the meter does */
        let blob = point.as_bytes()[1..].to_vec();
        return (signing, blob);
    }

    #[test]
    fn test_verify_raw_and_der_signatures() {
        let (signing, public_key) = key_pair();
        let digest = DigestAlgorithm::Sha256.digest([b"snapshot".as_slice()]);
        let signature: Signature = signing.sign_prehash(&digest).unwrap();
        let provider = EcdsaProvider;

        let raw = signature.to_bytes().to_vec();
        assert!(provider.verify_signed_digest(Curve::Secp256r1, DigestAlgorithm::Sha256, &public_key, &raw, &digest));

        let mut der = signature.to_der().as_bytes().to_vec();
        assert!(provider.verify_signed_digest(Curve::Secp256r1, DigestAlgorithm::Sha256, &public_key, &der, &digest));
        der.push(0);
        assert!(provider.verify_signed_digest(Curve::Secp256r1, DigestAlgorithm::Sha256, &public_key, &der, &digest));

        let other = DigestAlgorithm::Sha256.digest([b"tampered".as_slice()]);
        assert!(!provider.verify_signed_digest(Curve::Secp256r1, DigestAlgorithm::Sha256, &public_key, &raw, &other));
    }

    #[test]
    fn test_garbage_is_rejected() {
        let (_, public_key) = key_pair();
        let digest = DigestAlgorithm::Sha256.digest([b"x".as_slice()]);
        let provider = EcdsaProvider;

        assert!(!provider.verify_signed_digest(Curve::Secp256r1, DigestAlgorithm::Sha256, &[1, 2, 3], &[0; 64], &digest));
        assert!(!provider.verify_signed_digest(Curve::Secp256r1, DigestAlgorithm::Sha256, &public_key, &[0x30, 0x01], &digest));
    }

    #[test]
    fn test_public_key_formats() {
        let (_, public_key) = key_pair();
        let provider = EcdsaProvider;

        let sec1 = provider
            .public_key_from_blob(Curve::Secp256r1, DigestAlgorithm::Sha256, &public_key, KeyFormat::Sec1)
            .unwrap();
        assert_eq!(sec1.len(), 65);
        assert_eq!(&sec1[1..], public_key.as_slice());

        let der = provider
            .public_key_from_blob(Curve::Secp256r1, DigestAlgorithm::Sha256, &public_key, KeyFormat::Der)
            .unwrap();
        /* SubjectPublicKeyInfo for P-256 with uncompressed point */
        assert_eq!(der.len(), 91);
        assert_eq!(der[0], 0x30);
        assert!(der.ends_with(&public_key));

        assert!(provider
            .public_key_from_blob(Curve::Secp256r1, DigestAlgorithm::Sha256, &[0; 10], KeyFormat::Der)
            .is_err());
    }

    #[test]
    fn test_sha256_digest() {
        let digest = DigestAlgorithm::Sha256.digest([b"ab".as_slice(), b"c".as_slice()]);
        assert_eq!(hex::encode(digest), "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
    }
}
