//! Per-peer ratchet sessions
//!
//! A lightweight Signal-style layer: sessions are established with a triple
//! Diffie-Hellman handshake (identity x identity, ephemeral x identity,
//! ephemeral x prekey) and every message advances a hash chain, so a
//! compromised message key cannot decrypt earlier traffic. This forward
//! secrecy is independent of the onion layers' per-layer ephemeral keys.
//!
//! Sessions expire after a configurable idle TTL; `prune_expired` must be
//! called periodically or the session table grows without bound.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use thiserror::Error;

use veilmesh_core::NodeId;

use crate::keys::{hash, EncryptionKeypair};
use crate::sealed::{decrypt_symmetric, encrypt_symmetric, CryptoError};

/// Maximum number of chain steps a decryptor will skip forward to reach a
/// message number. Bounds the work a peer can force with a huge counter.
const MAX_SKIP: u32 = 64;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No session with peer {0}")]
    NoSession(NodeId),
    #[error("Message number {number} behind chain position {position}")]
    StaleMessage { number: u32, position: u32 },
    #[error("Message number {number} too far ahead of chain position {position}")]
    SkipTooLarge { number: u32, position: u32 },
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Handshake material the initiator sends to the responder.
#[derive(Debug, Clone)]
pub struct SessionInit {
    pub ephemeral_pubkey: [u8; 32],
}

/// A message produced by the ratchet: chain position plus AEAD ciphertext.
#[derive(Debug, Clone)]
pub struct RatchetMessage {
    pub message_number: u32,
    pub ciphertext: Vec<u8>,
}

struct Session {
    chain_key: [u8; 32],
    message_number: u32,
    /// Keys derived while skipping over not-yet-arrived messages, kept so
    /// late arrivals within the window still decrypt. Each key decrypts once.
    skipped: HashMap<u32, [u8; 32]>,
    last_used: Instant,
}

impl Session {
    fn new(root: [u8; 32]) -> Self {
        Self {
            chain_key: root,
            message_number: 0,
            skipped: HashMap::new(),
            last_used: Instant::now(),
        }
    }

    fn message_key(&self) -> [u8; 32] {
        let mut input = Vec::with_capacity(32 + 3);
        input.extend_from_slice(&self.chain_key);
        input.extend_from_slice(b"msg");
        hash(&input)
    }

    fn advance(&mut self) {
        let mut input = Vec::with_capacity(32 + 5);
        input.extend_from_slice(&self.chain_key);
        input.extend_from_slice(b"chain");
        self.chain_key = hash(&input);
        self.message_number += 1;
    }
}

/// Manages ratchet sessions for all remote peers of one identity.
pub struct SessionManager {
    identity: EncryptionKeypair,
    prekey: EncryptionKeypair,
    sessions: HashMap<NodeId, Session>,
}

impl SessionManager {
    pub fn new(identity: EncryptionKeypair) -> Self {
        Self {
            identity,
            prekey: EncryptionKeypair::generate(),
            sessions: HashMap::new(),
        }
    }

    /// The prekey other nodes use when initiating a session with us.
    pub fn prekey_public(&self) -> [u8; 32] {
        self.prekey.public_key_bytes()
    }

    /// Initiate a session with a peer, given their published keys.
    /// Returns the handshake material to transmit.
    pub fn start_session(
        &mut self,
        peer: NodeId,
        their_identity: &[u8; 32],
        their_prekey: &[u8; 32],
    ) -> SessionInit {
        let ephemeral = EncryptionKeypair::generate();

        let dh1 = self.identity.diffie_hellman(their_identity);
        let dh2 = ephemeral.diffie_hellman(their_identity);
        let dh3 = ephemeral.diffie_hellman(their_prekey);
        let root = combine_secrets(&dh1, &dh2, &dh3);

        self.sessions.insert(peer, Session::new(root));
        SessionInit {
            ephemeral_pubkey: ephemeral.public_key_bytes(),
        }
    }

    /// Accept a session initiated by a peer.
    pub fn accept_session(
        &mut self,
        peer: NodeId,
        their_identity: &[u8; 32],
        their_ephemeral: &[u8; 32],
    ) {
        let dh1 = self.identity.diffie_hellman(their_identity);
        let dh2 = self.identity.diffie_hellman(their_ephemeral);
        let dh3 = self.prekey.diffie_hellman(their_ephemeral);
        let root = combine_secrets(&dh1, &dh2, &dh3);

        self.sessions.insert(peer, Session::new(root));
    }

    pub fn has_session(&self, peer: &NodeId) -> bool {
        self.sessions.contains_key(peer)
    }

    /// Encrypt under the current message key and advance the chain.
    pub fn encrypt(&mut self, peer: &NodeId, plaintext: &[u8]) -> Result<RatchetMessage, SessionError> {
        let session = self
            .sessions
            .get_mut(peer)
            .ok_or(SessionError::NoSession(*peer))?;

        let key = session.message_key();
        let ciphertext = encrypt_symmetric(&key, plaintext)?;
        let message_number = session.message_number;
        session.advance();
        session.last_used = Instant::now();

        Ok(RatchetMessage {
            message_number,
            ciphertext,
        })
    }

    /// Decrypt a message, tolerating out-of-order delivery within a bounded
    /// window: keys for skipped message numbers are retained until the
    /// message arrives. Each retained key decrypts once; a second delivery
    /// of the same number is rejected.
    pub fn decrypt(&mut self, peer: &NodeId, message: &RatchetMessage) -> Result<Vec<u8>, SessionError> {
        let session = self
            .sessions
            .get_mut(peer)
            .ok_or(SessionError::NoSession(*peer))?;

        if message.message_number < session.message_number {
            let key = session.skipped.remove(&message.message_number).ok_or(
                SessionError::StaleMessage {
                    number: message.message_number,
                    position: session.message_number,
                },
            )?;
            let plaintext = decrypt_symmetric(&key, &message.ciphertext)?;
            session.last_used = Instant::now();
            return Ok(plaintext);
        }
        if message.message_number - session.message_number > MAX_SKIP {
            return Err(SessionError::SkipTooLarge {
                number: message.message_number,
                position: session.message_number,
            });
        }

        while session.message_number < message.message_number {
            session.skipped.insert(session.message_number, session.message_key());
            session.advance();
        }
        // Bound the cache: forget the oldest keys past the skip window
        while session.skipped.len() > MAX_SKIP as usize {
            if let Some(oldest) = session.skipped.keys().min().copied() {
                session.skipped.remove(&oldest);
            }
        }

        let key = session.message_key();
        let plaintext = decrypt_symmetric(&key, &message.ciphertext)?;
        session.advance();
        session.last_used = Instant::now();
        Ok(plaintext)
    }

    /// Drop sessions idle past the TTL. Returns how many were removed.
    pub fn prune_expired(&mut self, ttl: Duration) -> usize {
        let before = self.sessions.len();
        let now = Instant::now();
        self.sessions
            .retain(|_, s| now.duration_since(s.last_used) < ttl);
        before - self.sessions.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

fn combine_secrets(dh1: &[u8; 32], dh2: &[u8; 32], dh3: &[u8; 32]) -> [u8; 32] {
    let mut combined = Vec::with_capacity(96);
    combined.extend_from_slice(dh1);
    combined.extend_from_slice(dh2);
    combined.extend_from_slice(dh3);
    hash(&combined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use veilmesh_core::NODE_ID_LEN;

    fn node(n: u8) -> NodeId {
        NodeId::from_bytes([n; NODE_ID_LEN])
    }

    fn establish() -> (SessionManager, SessionManager) {
        let alice_keys = EncryptionKeypair::generate();
        let bob_keys = EncryptionKeypair::generate();
        let alice_pub = alice_keys.public_key_bytes();
        let bob_pub = bob_keys.public_key_bytes();

        let mut alice = SessionManager::new(alice_keys);
        let mut bob = SessionManager::new(bob_keys);

        let init = alice.start_session(node(2), &bob_pub, &bob.prekey_public());
        bob.accept_session(node(1), &alice_pub, &init.ephemeral_pubkey);

        (alice, bob)
    }

    #[test]
    fn test_session_roundtrip() {
        let (mut alice, mut bob) = establish();

        let msg = alice.encrypt(&node(2), b"hello bob").unwrap();
        let plain = bob.decrypt(&node(1), &msg).unwrap();
        assert_eq!(plain, b"hello bob");
    }

    #[test]
    fn test_chain_advances_per_message() {
        let (mut alice, mut bob) = establish();

        let m0 = alice.encrypt(&node(2), b"first").unwrap();
        let m1 = alice.encrypt(&node(2), b"second").unwrap();
        assert_eq!(m0.message_number, 0);
        assert_eq!(m1.message_number, 1);

        assert_eq!(bob.decrypt(&node(1), &m0).unwrap(), b"first");
        assert_eq!(bob.decrypt(&node(1), &m1).unwrap(), b"second");
    }

    #[test]
    fn test_decrypt_skips_lost_messages() {
        let (mut alice, mut bob) = establish();

        let _lost = alice.encrypt(&node(2), b"lost in transit").unwrap();
        let delivered = alice.encrypt(&node(2), b"made it").unwrap();

        assert_eq!(bob.decrypt(&node(1), &delivered).unwrap(), b"made it");
    }

    #[test]
    fn test_out_of_order_delivery_decrypts() {
        let (mut alice, mut bob) = establish();

        let m0 = alice.encrypt(&node(2), b"first").unwrap();
        let m1 = alice.encrypt(&node(2), b"second").unwrap();

        // Later message first; the skipped key is retained for m0
        assert_eq!(bob.decrypt(&node(1), &m1).unwrap(), b"second");
        assert_eq!(bob.decrypt(&node(1), &m0).unwrap(), b"first");
    }

    #[test]
    fn test_replayed_message_rejected() {
        let (mut alice, mut bob) = establish();

        let m0 = alice.encrypt(&node(2), b"first").unwrap();
        let m1 = alice.encrypt(&node(2), b"second").unwrap();

        bob.decrypt(&node(1), &m1).unwrap();
        bob.decrypt(&node(1), &m0).unwrap();
        // m0's retained key was consumed by the first delivery
        assert!(matches!(
            bob.decrypt(&node(1), &m0),
            Err(SessionError::StaleMessage { .. })
        ));
    }

    #[test]
    fn test_skip_bound_enforced() {
        let (_alice, mut bob) = establish();

        let forged = RatchetMessage {
            message_number: MAX_SKIP + 1,
            ciphertext: vec![0u8; 32],
        };
        assert!(matches!(
            bob.decrypt(&node(1), &forged),
            Err(SessionError::SkipTooLarge { .. })
        ));
    }

    #[test]
    fn test_no_session_errors() {
        let mut manager = SessionManager::new(EncryptionKeypair::generate());
        assert!(matches!(
            manager.encrypt(&node(9), b"hi"),
            Err(SessionError::NoSession(_))
        ));
    }

    #[test]
    fn test_prune_expired_sessions() {
        let (mut alice, _bob) = establish();
        assert_eq!(alice.session_count(), 1);

        assert_eq!(alice.prune_expired(Duration::from_secs(3600)), 0);
        assert_eq!(alice.session_count(), 1);

        assert_eq!(alice.prune_expired(Duration::ZERO), 1);
        assert_eq!(alice.session_count(), 0);
    }
}
