//! ECDH + ChaCha20-Poly1305 encryption primitives
//!
//! One shape everywhere: derive a symmetric key from an X25519 shared secret
//! (SHA-256 of the DH output) and encrypt with ChaCha20-Poly1305, prepending
//! the random 12-byte nonce to the ciphertext. Sealed envelopes additionally
//! carry the fresh ephemeral public key so the recipient can run ECDH.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};

use veilmesh_core::SealedEnvelope;

use crate::keys::{hash, EncryptionKeypair};
use crate::padding::{pad_bucket, unpad, PadError};

/// Nonce length for ChaCha20-Poly1305
const NONCE_LEN: usize = 12;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed")]
    DecryptionFailed,
    #[error("Invalid key")]
    InvalidKey,
    #[error("Ciphertext too short")]
    CiphertextTooShort,
    #[error("Padding error: {0}")]
    Padding(#[from] PadError),
}

fn derive_key(our_secret: &[u8; 32], their_public: &[u8; 32]) -> [u8; 32] {
    let secret = StaticSecret::from(*our_secret);
    let public = PublicKey::from(*their_public);
    let shared = secret.diffie_hellman(&public);
    hash(shared.as_bytes())
}

/// Encrypt `plaintext` for a recipient: X25519 ECDH with the sender's secret,
/// then ChaCha20-Poly1305. Returns `nonce(12) || ciphertext`.
pub fn encrypt_to(
    recipient_pubkey: &[u8; 32],
    sender_secret: &[u8; 32],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let key = derive_key(sender_secret, recipient_pubkey);
    encrypt_symmetric(&key, plaintext)
}

/// Decrypt `nonce(12) || ciphertext` produced by [`encrypt_to`].
pub fn decrypt_from(
    sender_pubkey: &[u8; 32],
    recipient_secret: &[u8; 32],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let key = derive_key(recipient_secret, sender_pubkey);
    decrypt_symmetric(&key, ciphertext)
}

/// Encrypt with a raw symmetric key. Returns `nonce(12) || ciphertext`.
pub fn encrypt_symmetric(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let cipher =
        ChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::InvalidKey)?;
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut result = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Decrypt `nonce(12) || ciphertext` with a raw symmetric key.
pub fn decrypt_symmetric(key: &[u8; 32], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < NONCE_LEN {
        return Err(CryptoError::CiphertextTooShort);
    }
    let nonce = Nonce::from_slice(&data[..NONCE_LEN]);
    let cipher =
        ChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::InvalidKey)?;
    cipher
        .decrypt(nonce, &data[NONCE_LEN..])
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Seal plaintext for a recipient with a fresh ephemeral keypair.
///
/// The plaintext is bucket-padded first so the ciphertext length leaks only
/// a coarse size class. Each call uses a new ephemeral key, giving forward
/// secrecy per message at this layer.
pub fn seal_envelope(
    recipient_pubkey: &[u8; 32],
    plaintext: &[u8],
) -> Result<SealedEnvelope, CryptoError> {
    let padded = pad_bucket(plaintext);
    let ephemeral = EncryptionKeypair::generate();
    let ciphertext = encrypt_to(recipient_pubkey, &ephemeral.secret_key_bytes(), &padded)?;
    Ok(SealedEnvelope {
        ephemeral_pubkey: ephemeral.public_key_bytes(),
        ciphertext,
    })
}

/// Open a sealed envelope with our encryption secret.
pub fn open_envelope(
    our_secret: &[u8; 32],
    envelope: &SealedEnvelope,
) -> Result<Vec<u8>, CryptoError> {
    let padded = decrypt_from(&envelope.ephemeral_pubkey, our_secret, &envelope.ciphertext)?;
    Ok(unpad(&padded)?)
}
