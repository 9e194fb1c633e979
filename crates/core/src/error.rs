use thiserror::Error;

/// Errors shared across the overlay crates.
#[derive(Error, Debug)]
pub enum VeilMeshError {
    #[error("Frame serialization failed: {0}")]
    FrameEncode(#[from] serde_json::Error),

    #[error("Layer serialization failed: {0}")]
    LayerEncode(#[from] bincode::Error),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    #[error("Peer not connected: {0}")]
    PeerNotConnected(String),

    #[error("Payload too large: {size} bytes exceeds pad target {target}")]
    PayloadTooLarge { size: usize, target: usize },
}

pub type Result<T> = std::result::Result<T, VeilMeshError>;
