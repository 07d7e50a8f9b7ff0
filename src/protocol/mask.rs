//! Payload masking (RFC 6455 section 5.3).
//!
//! The 32-bit masking key is applied most-significant byte first: payload
//! byte `i` is XORed with byte `i % 4` of the key's big-endian encoding.

/// Split a 32-bit mask key into the byte order used on the wire.
#[inline]
#[must_use]
pub const fn mask_key_bytes(key: u32) -> [u8; 4] {
    key.to_be_bytes()
}

/// Scalar byte-by-byte XOR masking.
#[inline]
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

/// Word-at-a-time masking, four bytes per step.
///
/// Produces the same output as [`apply_mask`].
#[inline]
pub fn apply_mask_fast(data: &mut [u8], mask: [u8; 4]) {
    let mask_u32 = u32::from_ne_bytes(mask);
    let mut chunks = data.chunks_exact_mut(4);

    for chunk in &mut chunks {
        let val = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        chunk.copy_from_slice(&(val ^ mask_u32).to_ne_bytes());
    }

    for (i, byte) in chunks.into_remainder().iter_mut().enumerate() {
        *byte ^= mask[i];
    }
}
