use ed25519_dalek::{Signature, Signer, Verifier, VerifyingKey};

use veilmesh_core::{now_millis, NodeId, PublicKey, RelayAnnouncement};

use crate::keys::{Identity, SigningKeypair};

/// Sign data with a signing keypair
pub fn sign_data(keypair: &SigningKeypair, data: &[u8]) -> [u8; 64] {
    let signature: Signature = keypair.signing_key.sign(data);
    signature.to_bytes()
}

/// Verify a signature
pub fn verify_signature(pubkey: &PublicKey, data: &[u8], signature: &[u8; 64]) -> bool {
    let verifying_key = match VerifyingKey::from_bytes(pubkey) {
        Ok(vk) => vk,
        Err(_) => return false,
    };
    let signature = Signature::from_bytes(signature);
    verifying_key.verify(data, &signature).is_ok()
}

/// Build a signed relay announcement for the local identity.
///
/// Receivers verify the signature before admitting the node to their relay
/// registry, so an attacker cannot announce relays under someone else's id.
pub fn sign_relay_announcement(identity: &Identity, address: Option<String>) -> RelayAnnouncement {
    let node_id = identity.node_id();
    let encryption_key = identity.encryption.public_key_bytes();
    let signing_key = identity.signing.public_key_bytes();
    let timestamp = now_millis();
    let data = RelayAnnouncement::signable_data(&node_id, &encryption_key, &signing_key, timestamp);
    let signature = sign_data(&identity.signing, &data);
    RelayAnnouncement {
        node_id,
        encryption_key,
        signing_key,
        address,
        timestamp,
        signature,
    }
}

/// Verify a relay announcement's signature and id binding.
///
/// The announced node_id must match the encryption key it claims, otherwise
/// a valid signature could still graft a key onto a foreign id.
pub fn verify_relay_announcement(announcement: &RelayAnnouncement) -> bool {
    if announcement.node_id != NodeId::from_public_key(&announcement.encryption_key) {
        return false;
    }
    let data = RelayAnnouncement::signable_data(
        &announcement.node_id,
        &announcement.encryption_key,
        &announcement.signing_key,
        announcement.timestamp,
    );
    verify_signature(&announcement.signing_key, &data, &announcement.signature)
}
