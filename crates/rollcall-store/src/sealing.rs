//! At-rest protection for face templates.
//!
//! Blob layout: tag byte `0` followed by plain template bytes, or tag byte `1`
//! followed by a 96-bit nonce and the AES-256-GCM ciphertext.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

const TAG_PLAIN: u8 = 0;
const TAG_SEALED: u8 = 1;
const NONCE_LEN: usize = 12;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SealError {
    #[error("template blob is empty")]
    Empty,
    #[error("unknown template blob tag {0}")]
    UnknownTag(u8),
    #[error("template is sealed but no template key is configured")]
    KeyRequired,
    #[error("template could not be decrypted (wrong key or corrupted blob)")]
    Decrypt,
    #[error("template encryption failed")]
    Encrypt,
}

/// AES-256-GCM cipher keyed by SHA-256 of an operator secret.
#[derive(Clone)]
pub struct TemplateCipher {
    cipher: Aes256Gcm,
}

impl TemplateCipher {
    pub fn from_secret(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        let key = Key::<Aes256Gcm>::from_slice(&digest);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    fn seal(&self, plain: &[u8]) -> Result<Vec<u8>, SealError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plain)
            .map_err(|_| SealError::Encrypt)?;

        let mut out = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
        out.push(TAG_SEALED);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, SealError> {
        if sealed.len() < NONCE_LEN {
            return Err(SealError::Decrypt);
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| SealError::Decrypt)
    }
}

/// Wrap template bytes for storage, sealing them when a cipher is configured.
pub fn pack(cipher: Option<&TemplateCipher>, plain: &[u8]) -> Result<Vec<u8>, SealError> {
    match cipher {
        Some(c) => c.seal(plain),
        None => {
            let mut out = Vec::with_capacity(plain.len() + 1);
            out.push(TAG_PLAIN);
            out.extend_from_slice(plain);
            Ok(out)
        }
    }
}

/// Recover template bytes from a stored blob.
pub fn unpack(cipher: Option<&TemplateCipher>, blob: &[u8]) -> Result<Vec<u8>, SealError> {
    let (&tag, body) = blob.split_first().ok_or(SealError::Empty)?;
    match tag {
        TAG_PLAIN => Ok(body.to_vec()),
        TAG_SEALED => cipher.ok_or(SealError::KeyRequired)?.open(body),
        other => Err(SealError::UnknownTag(other)),
    }
}
