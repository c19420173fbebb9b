//! On-disk frame layouts and their codec.
//!
//! Pure byte layout and length arithmetic: no I/O, no crypto, no
//! interpretation of payload contents. All integers are big-endian. The
//! layouts are bit-exact for interoperability with existing on-disk blobs:
//!
//! ```text
//! Plain:          <payload bytes>
//! Authenticated:  <hmac:32> <len:u32 BE> <payload:len>
//! Sealed:         <nonce:12> <tag:16> <len:u32 BE> <ciphertext:len>
//! ```
//!
//! The MAC covers the payload only, and AES-GCM authenticates the
//! ciphertext only (the length prefix is outside both); existing blobs were
//! written that way.

// Binary format code uses small constant casts that are safe
#![allow(clippy::cast_possible_truncation)]

use super::{BlobMode, StorageError, StorageResult};

/// Size of the HMAC-SHA-256 field in authenticated frames.
pub const MAC_SIZE: usize = 32;

/// Size of the AES-GCM nonce field in sealed frames.
pub const NONCE_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag field in sealed frames.
pub const TAG_SIZE: usize = 16;

/// Size of the big-endian payload length prefix.
pub const LEN_PREFIX_SIZE: usize = 4;

/// Fixed overhead of an authenticated frame: mac(32) + len(4).
pub const AUTHENTICATED_OVERHEAD: usize = MAC_SIZE + LEN_PREFIX_SIZE;

/// Fixed overhead of a sealed frame: nonce(12) + tag(16) + len(4).
pub const SEALED_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE + LEN_PREFIX_SIZE;

/// Parsed view of an authenticated frame.
#[derive(Debug, PartialEq, Eq)]
pub struct AuthenticatedFrame<'a> {
    /// HMAC-SHA-256 over the payload.
    pub mac: [u8; MAC_SIZE],
    /// The stored payload.
    pub payload: &'a [u8],
}

/// Parsed view of a sealed frame.
#[derive(Debug, PartialEq, Eq)]
pub struct SealedFrame<'a> {
    /// AES-GCM nonce the payload was sealed under.
    pub nonce: [u8; NONCE_SIZE],
    /// AES-GCM authentication tag.
    pub tag: [u8; TAG_SIZE],
    /// The ciphertext; same length as the plaintext.
    pub ciphertext: &'a [u8],
}

/// Assembles an authenticated frame.
///
/// The caller guarantees `payload.len()` fits the `u32` length prefix; the
/// store enforces its configured maximum before encoding.
#[must_use]
pub fn encode_authenticated(mac: &[u8; MAC_SIZE], payload: &[u8]) -> Vec<u8> {
    debug_assert!(payload.len() <= u32::MAX as usize);
    let mut frame = Vec::with_capacity(AUTHENTICATED_OVERHEAD + payload.len());
    frame.extend_from_slice(mac);
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Assembles a sealed frame.
#[must_use]
pub fn encode_sealed(nonce: &[u8; NONCE_SIZE], tag: &[u8; TAG_SIZE], ciphertext: &[u8]) -> Vec<u8> {
    debug_assert!(ciphertext.len() <= u32::MAX as usize);
    let mut frame = Vec::with_capacity(SEALED_OVERHEAD + ciphertext.len());
    frame.extend_from_slice(nonce);
    frame.extend_from_slice(tag);
    frame.extend_from_slice(&(ciphertext.len() as u32).to_be_bytes());
    frame.extend_from_slice(ciphertext);
    frame
}

/// Splits an authenticated frame into its fields.
///
/// # Errors
///
/// Returns [`StorageError::Malformed`] if the frame is shorter than the
/// fixed overhead or the length prefix disagrees with the remaining byte
/// count.
pub fn parse_authenticated(bytes: &[u8]) -> StorageResult<AuthenticatedFrame<'_>> {
    if bytes.len() < AUTHENTICATED_OVERHEAD {
        return Err(StorageError::malformed(format!(
            "authenticated frame is {} bytes, shorter than the {AUTHENTICATED_OVERHEAD}-byte header",
            bytes.len()
        )));
    }

    let mut mac = [0u8; MAC_SIZE];
    mac.copy_from_slice(&bytes[..MAC_SIZE]);

    let declared = read_len_prefix(&bytes[MAC_SIZE..AUTHENTICATED_OVERHEAD]);
    let payload = &bytes[AUTHENTICATED_OVERHEAD..];
    if declared as usize != payload.len() {
        return Err(StorageError::malformed(format!(
            "authenticated frame declares {declared} payload bytes but carries {}",
            payload.len()
        )));
    }

    Ok(AuthenticatedFrame { mac, payload })
}

/// Splits a sealed frame into its fields.
///
/// # Errors
///
/// Returns [`StorageError::Malformed`] if the frame is shorter than the
/// fixed overhead or the length prefix disagrees with the remaining byte
/// count.
pub fn parse_sealed(bytes: &[u8]) -> StorageResult<SealedFrame<'_>> {
    if bytes.len() < SEALED_OVERHEAD {
        return Err(StorageError::malformed(format!(
            "sealed frame is {} bytes, shorter than the {SEALED_OVERHEAD}-byte header",
            bytes.len()
        )));
    }

    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&bytes[..NONCE_SIZE]);
    let mut tag = [0u8; TAG_SIZE];
    tag.copy_from_slice(&bytes[NONCE_SIZE..NONCE_SIZE + TAG_SIZE]);

    let declared = read_len_prefix(&bytes[NONCE_SIZE + TAG_SIZE..SEALED_OVERHEAD]);
    let ciphertext = &bytes[SEALED_OVERHEAD..];
    if declared as usize != ciphertext.len() {
        return Err(StorageError::malformed(format!(
            "sealed frame declares {declared} ciphertext bytes but carries {}",
            ciphertext.len()
        )));
    }

    Ok(SealedFrame {
        nonce,
        tag,
        ciphertext,
    })
}

/// Computes the payload length of a frame from its total on-disk size.
///
/// This is the fixed-overhead inverse used by `size`: the caller passes the
/// file length and gets back how many payload bytes the frame holds.
///
/// # Errors
///
/// Returns [`StorageError::Malformed`] if the file is shorter than the
/// mode's fixed overhead.
pub fn payload_len(mode: BlobMode, frame_len: u64) -> StorageResult<u64> {
    let overhead = match mode {
        BlobMode::Plain => return Ok(frame_len),
        BlobMode::Authenticated => AUTHENTICATED_OVERHEAD as u64,
        BlobMode::Sealed => SEALED_OVERHEAD as u64,
    };
    frame_len.checked_sub(overhead).ok_or_else(|| {
        StorageError::malformed(format!(
            "{frame_len}-byte file is shorter than the {overhead}-byte frame header"
        ))
    })
}

fn read_len_prefix(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authenticated_layout() {
        let mac = [0xAB; MAC_SIZE];
        let frame = encode_authenticated(&mac, b"hello");

        assert_eq!(frame.len(), 32 + 4 + 5);
        assert_eq!(&frame[..32], &[0xAB; 32]);
        assert_eq!(&frame[32..36], &[0, 0, 0, 5]);
        assert_eq!(&frame[36..], b"hello");

        let parsed = parse_authenticated(&frame).unwrap();
        assert_eq!(parsed.mac, mac);
        assert_eq!(parsed.payload, b"hello");
    }

    #[test]
    fn test_sealed_layout() {
        let nonce = [0x01; NONCE_SIZE];
        let tag = [0x02; TAG_SIZE];
        let frame = encode_sealed(&nonce, &tag, &[0xCC; 3]);

        assert_eq!(frame.len(), 12 + 16 + 4 + 3);
        assert_eq!(&frame[..12], &[0x01; 12]);
        assert_eq!(&frame[12..28], &[0x02; 16]);
        assert_eq!(&frame[28..32], &[0, 0, 0, 3]);
        assert_eq!(&frame[32..], &[0xCC; 3]);

        let parsed = parse_sealed(&frame).unwrap();
        assert_eq!(parsed.nonce, nonce);
        assert_eq!(parsed.tag, tag);
        assert_eq!(parsed.ciphertext, &[0xCC; 3]);
    }

    #[test]
    fn test_length_prefix_is_big_endian() {
        let frame = encode_authenticated(&[0; MAC_SIZE], &[0u8; 0x0102]);
        assert_eq!(&frame[32..36], &[0x00, 0x00, 0x01, 0x02]);
    }

    #[test]
    fn test_parse_rejects_short_frames() {
        assert!(matches!(
            parse_authenticated(&[0u8; AUTHENTICATED_OVERHEAD - 1]),
            Err(StorageError::Malformed { .. })
        ));
        assert!(matches!(
            parse_sealed(&[0u8; SEALED_OVERHEAD - 1]),
            Err(StorageError::Malformed { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_length_disagreement() {
        let mut frame = encode_authenticated(&[0; MAC_SIZE], b"abcd");
        frame[35] = 9; // declares 9 bytes, carries 4
        assert!(matches!(
            parse_authenticated(&frame),
            Err(StorageError::Malformed { .. })
        ));

        let mut frame = encode_sealed(&[0; NONCE_SIZE], &[0; TAG_SIZE], b"abcd");
        frame.truncate(frame.len() - 1); // carries 3, still declares 4
        assert!(matches!(
            parse_sealed(&frame),
            Err(StorageError::Malformed { .. })
        ));
    }

    #[test]
    fn test_payload_len_inverse() {
        assert_eq!(payload_len(BlobMode::Plain, 5).unwrap(), 5);
        assert_eq!(payload_len(BlobMode::Authenticated, 46).unwrap(), 10);
        assert_eq!(payload_len(BlobMode::Sealed, 32).unwrap(), 0);
        assert_eq!(payload_len(BlobMode::Sealed, 48).unwrap(), 16);

        assert!(matches!(
            payload_len(BlobMode::Authenticated, 35),
            Err(StorageError::Malformed { .. })
        ));
        assert!(matches!(
            payload_len(BlobMode::Sealed, 31),
            Err(StorageError::Malformed { .. })
        ));
    }

    #[test]
    fn test_empty_payload_frames() {
        let frame = encode_authenticated(&[0; MAC_SIZE], b"");
        assert_eq!(frame.len(), AUTHENTICATED_OVERHEAD);
        assert!(parse_authenticated(&frame).unwrap().payload.is_empty());
    }
}
