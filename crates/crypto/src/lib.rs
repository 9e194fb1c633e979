//! VeilMesh Cryptography
//!
//! X25519 ECDH + ChaCha20-Poly1305 sealed envelopes, Ed25519 identity
//! signing, size padding, and per-peer hash-ratchet sessions.

mod keys;
mod padding;
mod sealed;
mod session;
mod sign;

pub use keys::{hash, EncryptionKeypair, Identity, SigningKeypair};
pub use padding::{pad_bucket, pad_to_target, unpad, PadError, PAD_BUCKETS};
pub use sealed::{
    decrypt_from, decrypt_symmetric, encrypt_symmetric, encrypt_to, open_envelope, seal_envelope,
    CryptoError,
};
pub use session::{RatchetMessage, SessionError, SessionInit, SessionManager};
pub use sign::{sign_data, sign_relay_announcement, verify_relay_announcement, verify_signature};
