//! Size padding for traffic-analysis resistance
//!
//! Two schemes share one wire format: `[len: u32 LE][data][random fill]`.
//!
//! * `pad_to_target` pads to one fixed size (onion payloads, so an observer
//!   cannot infer content from layer size).
//! * `pad_bucket` pads to the smallest power-of-2 bucket that fits (sealed
//!   envelope interiors, so ciphertext length leaks only a coarse class).
//!
//! A binary length prefix replaces a sentinel delimiter: a sentinel can
//! collide with message bytes, the prefix cannot.

use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

/// Length-prefix overhead in bytes
const PREFIX_LEN: usize = 4;

/// Power-of-2 bucket sizes for end-to-end message padding
pub const PAD_BUCKETS: [usize; 7] = [64, 128, 256, 512, 1024, 2048, 4096];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PadError {
    #[error("Message of {size} bytes exceeds pad target {target}")]
    TooLarge { size: usize, target: usize },
    #[error("Padded message too short")]
    TooShort,
    #[error("Length prefix {len} exceeds padded size {available}")]
    CorruptPrefix { len: usize, available: usize },
}

/// Pad `data` to exactly `target` bytes.
///
/// Oversized input is a hard error, not a silent truncation: truncating
/// would corrupt the message undetectably at the far end.
pub fn pad_to_target(data: &[u8], target: usize) -> Result<Vec<u8>, PadError> {
    if data.len() + PREFIX_LEN > target {
        return Err(PadError::TooLarge {
            size: data.len(),
            target,
        });
    }

    let mut padded = Vec::with_capacity(target);
    padded.extend_from_slice(&(data.len() as u32).to_le_bytes());
    padded.extend_from_slice(data);

    let mut fill = vec![0u8; target - padded.len()];
    OsRng.fill_bytes(&mut fill);
    padded.extend_from_slice(&fill);

    Ok(padded)
}

/// Pad `data` to the smallest bucket that fits.
///
/// Beyond the largest bucket no padding is added (the length prefix is still
/// applied); such messages leak their approximate size.
pub fn pad_bucket(data: &[u8]) -> Vec<u8> {
    let needed = data.len() + PREFIX_LEN;
    let target = PAD_BUCKETS
        .iter()
        .copied()
        .find(|&b| b >= needed)
        .unwrap_or(needed);
    // Infallible: target >= needed by construction
    pad_to_target(data, target).expect("bucket target always fits")
}

/// Strip padding applied by either scheme.
pub fn unpad(padded: &[u8]) -> Result<Vec<u8>, PadError> {
    if padded.len() < PREFIX_LEN {
        return Err(PadError::TooShort);
    }
    let len = u32::from_le_bytes([padded[0], padded[1], padded[2], padded[3]]) as usize;
    let available = padded.len() - PREFIX_LEN;
    if len > available {
        return Err(PadError::CorruptPrefix { len, available });
    }
    Ok(padded[PREFIX_LEN..PREFIX_LEN + len].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_unpad_roundtrip() {
        let msg = b"hello, veilmesh";
        let padded = pad_to_target(msg, 1024).unwrap();
        assert_eq!(padded.len(), 1024);
        assert_eq!(unpad(&padded).unwrap(), msg);
    }

    #[test]
    fn test_pad_empty_message() {
        let padded = pad_to_target(b"", 64).unwrap();
        assert_eq!(padded.len(), 64);
        assert!(unpad(&padded).unwrap().is_empty());
    }

    #[test]
    fn test_pad_exact_fit() {
        let msg = vec![7u8; 1020];
        let padded = pad_to_target(&msg, 1024).unwrap();
        assert_eq!(padded.len(), 1024);
        assert_eq!(unpad(&padded).unwrap(), msg);
    }

    #[test]
    fn test_oversized_message_is_error_not_truncation() {
        let msg = vec![1u8; 1025];
        let result = pad_to_target(&msg, 1024);
        assert_eq!(
            result,
            Err(PadError::TooLarge {
                size: 1025,
                target: 1024
            })
        );
    }

    #[test]
    fn test_bucket_padding_picks_smallest_fit() {
        assert_eq!(pad_bucket(&[0u8; 10]).len(), 64);
        assert_eq!(pad_bucket(&[0u8; 60]).len(), 64);
        assert_eq!(pad_bucket(&[0u8; 61]).len(), 128);
        assert_eq!(pad_bucket(&[0u8; 1000]).len(), 1024);
    }

    #[test]
    fn test_bucket_padding_beyond_largest_bucket() {
        let msg = vec![3u8; 5000];
        let padded = pad_bucket(&msg);
        assert_eq!(padded.len(), 5000 + 4);
        assert_eq!(unpad(&padded).unwrap(), msg);
    }

    #[test]
    fn test_bucket_padding_roundtrip() {
        for size in [0usize, 1, 63, 64, 100, 4092] {
            let msg = vec![9u8; size];
            assert_eq!(unpad(&pad_bucket(&msg)).unwrap(), msg);
        }
    }

    #[test]
    fn test_unpad_rejects_short_input() {
        assert_eq!(unpad(&[1, 2]), Err(PadError::TooShort));
    }

    #[test]
    fn test_unpad_rejects_corrupt_prefix() {
        let mut padded = pad_to_target(b"hi", 64).unwrap();
        // Claim a length longer than the buffer
        padded[0] = 0xFF;
        padded[1] = 0xFF;
        assert!(matches!(
            unpad(&padded),
            Err(PadError::CorruptPrefix { .. })
        ));
    }

    #[test]
    fn test_padding_is_random() {
        let a = pad_to_target(b"same message", 256).unwrap();
        let b = pad_to_target(b"same message", 256).unwrap();
        // Same prefix and data, different random fill
        assert_eq!(&a[..16], &b[..16]);
        assert_ne!(a, b);
    }
}
