use crate::error::SignError;
use crate::header::{ImageSignature, SIGNATURE_LEN};
use k256::ecdsa::signature::Signer as _;
use k256::ecdsa::{Signature, SigningKey};
use k256::pkcs8::DecodePrivateKey;
use std::path::{Path, PathBuf};

/// Location of a PEM-encoded private key.
///
/// The key is only read when a signature is requested, so a missing file
/// surfaces as a [`SignError`] rather than failing up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyHandle {
    path: PathBuf,
}

impl KeyHandle {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_pem(&self) -> Result<String, SignError> {
        if !self.path.exists() {
            return Err(SignError::KeyNotFound(self.path.clone()));
        }
        let raw = std::fs::read(&self.path)
            .map_err(|e| SignError::KeyUnreadable(self.path.clone(), e))?;
        String::from_utf8(raw)
            .map_err(|_| SignError::KeyParse(self.path.clone(), "key file is not valid UTF-8".into()))
    }
}

/// Produces the signature embedded in an image header.
///
/// Implementations must be deterministic: the same payload and key always
/// give the same bytes, otherwise re-patching an image is not idempotent.
pub trait Signer {
    fn sign(&self, payload: &[u8], key: &KeyHandle) -> Result<ImageSignature, SignError>;
}

/// ECDSA over secp256k1 with SHA-256 and RFC 6979 nonces.
///
/// The signature is the fixed-width `r || s` pair, 32 bytes each.
#[derive(Debug, Clone, Copy, Default)]
pub struct Secp256k1Signer;

impl Secp256k1Signer {
    /// Accepts PKCS#8 (`BEGIN PRIVATE KEY`) and SEC1 (`BEGIN EC PRIVATE KEY`).
    pub fn load_key(key: &KeyHandle) -> Result<SigningKey, SignError> {
        let pem = key.read_pem()?;
        if let Ok(sk) = SigningKey::from_pkcs8_pem(&pem) {
            return Ok(sk);
        }
        let secret = k256::SecretKey::from_sec1_pem(&pem)
            .map_err(|e| SignError::KeyParse(key.path().to_path_buf(), e.to_string()))?;
        Ok(SigningKey::from(secret))
    }
}

impl Signer for Secp256k1Signer {
    fn sign(&self, payload: &[u8], key: &KeyHandle) -> Result<ImageSignature, SignError> {
        let sk = Self::load_key(key)?;
        let sig: Signature = sk
            .try_sign(payload)
            .map_err(|e| SignError::Primitive(e.to_string()))?;
        log::debug!(
            "signed {} payload bytes with {}",
            payload.len(),
            key.path().display()
        );
        Ok(ImageSignature::from_bytes(normalize_signature(&sig.to_bytes())))
    }
}

/// Fits a raw signature into the 64-byte header slot.
///
/// Shorter input is zero-padded on the right, longer input is cut. A cut
/// signature no longer verifies; this only exists so the slot always fills.
pub fn normalize_signature(raw: &[u8]) -> [u8; SIGNATURE_LEN] {
    let mut out = [0u8; SIGNATURE_LEN];
    let n = raw.len().min(SIGNATURE_LEN);
    out[..n].copy_from_slice(&raw[..n]);
    if raw.len() != SIGNATURE_LEN {
        log::warn!(
            "signature is {} bytes, normalized to {SIGNATURE_LEN}",
            raw.len()
        );
    }
    out
}

/// Signs `payload` if a key was supplied.
///
/// Failures are logged and handed back so the caller can choose to carry on
/// unsigned.
pub(crate) fn sign_optional(
    signer: &dyn Signer,
    payload: &[u8],
    key: Option<&KeyHandle>,
) -> SignOutcome {
    match key {
        None => SignOutcome::NotRequested,
        Some(key) => {
            log::info!("Generating signature using private key: {}", key.path().display());
            match signer.sign(payload, key) {
                Ok(sig) => SignOutcome::Signed(sig),
                Err(e) => {
                    log::warn!("Failed to generate signature: {e}");
                    SignOutcome::Failed(e)
                }
            }
        }
    }
}

/// What happened to the signature step of an operation.
#[derive(Debug)]
pub enum SignOutcome {
    NotRequested,
    Signed(ImageSignature),
    Failed(SignError),
}

impl SignOutcome {
    pub fn signature(&self) -> Option<&ImageSignature> {
        match self {
            SignOutcome::Signed(sig) => Some(sig),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&SignError> {
        match self {
            SignOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}
