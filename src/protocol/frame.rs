//! WebSocket frame parsing and serialization (RFC 6455 subset).
//!
//! Supported on the wire: 7-bit and 16-bit payload lengths, masked and
//! unmasked payloads. A 64-bit extended length is rejected with
//! [`Error::PayloadTooLarge`] before any length byte is read.
//!
//! Outgoing frames are always final and unmasked, with the fixed first byte
//! [`DATA_FRAME_HEADER`]. The close frame is the encoding of an empty payload
//! with its first byte patched to [`CLOSE_FRAME_HEADER`]. That byte carries
//! opcode nibble `0x9`, so a receiver decoding by opcode (this crate
//! included) sees an empty ping rather than a close; only an incoming
//! `0x8` nibble is treated as close.

use crate::error::{Error, Result};
use crate::protocol::OpCode;
use crate::protocol::mask::{apply_mask_fast, mask_key_bytes};

/// Largest payload expressible with the 16-bit extended length field.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// First byte of every outgoing data frame: FIN set, opcode nibble `0x1`.
pub const DATA_FRAME_HEADER: u8 = 0b1000_0001;

/// First byte of the outgoing close frame, `0b1000_1001`.
pub const CLOSE_FRAME_HEADER: u8 = 137;

/// Length marker announcing a 16-bit extended payload length.
const LEN_16: u8 = 126;

/// Length marker announcing a 64-bit extended payload length.
const LEN_64: u8 = 127;

#[derive(Debug, Clone, Copy)]
struct FrameHeader {
    fin: bool,
    opcode: OpCode,
    mask_key: Option<u32>,
    payload_len: usize,
    header_len: usize,
}

/// Parse the frame header, bounds-checking every read.
///
/// A close opcode short-circuits after the first byte.
fn parse_header(buf: &[u8]) -> Result<FrameHeader> {
    let Some(&byte0) = buf.first() else {
        return Err(Error::Truncated { needed: 2 });
    };

    // Reserved bits (0x70) carry no meaning without extensions and are ignored.
    let fin = (byte0 & 0x80) != 0;
    let opcode = OpCode::from_u8(byte0);

    if opcode == OpCode::Close {
        return Ok(FrameHeader {
            fin,
            opcode,
            mask_key: None,
            payload_len: 0,
            header_len: 1,
        });
    }

    let Some(&byte1) = buf.get(1) else {
        return Err(Error::Truncated { needed: 1 });
    };

    let masked = (byte1 & 0x80) != 0;
    let (payload_len, mut offset) = match byte1 & 0x7F {
        LEN_64 => return Err(Error::PayloadTooLarge),
        LEN_16 => {
            let ext = read_array::<2>(buf, 2)?;
            (u16::from_be_bytes(ext) as usize, 4)
        }
        len => (len as usize, 2),
    };

    let mask_key = if masked {
        let key = u32::from_be_bytes(read_array::<4>(buf, offset)?);
        offset += 4;
        Some(key)
    } else {
        None
    };

    Ok(FrameHeader {
        fin,
        opcode,
        mask_key,
        payload_len,
        header_len: offset,
    })
}

/// Copy `N` bytes starting at `offset`, or report how many are missing.
#[inline]
fn read_array<const N: usize>(buf: &[u8], offset: usize) -> Result<[u8; N]> {
    let end = offset + N;
    match buf.get(offset..end) {
        Some(bytes) => {
            let mut out = [0u8; N];
            out.copy_from_slice(bytes);
            Ok(out)
        }
        None => Err(Error::Truncated {
            needed: end - buf.len(),
        }),
    }
}

/// A decoded WebSocket frame.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
/// |I|S|S|S|  (4)  |A|     (7)     |             (16)              |
/// |N|V|V|V|       |S|             |   (if payload len==126)       |
/// | |1|2|3|       |K|             |                               |
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |                 Masking key (if MASK set)                     |
/// +---------------------------------------------------------------+
/// |                     Payload data                              |
/// +---------------------------------------------------------------+
/// ```
///
/// `payload_length` always equals `payload().len()`. For a close frame only
/// the first byte is inspected, so its length is zero and its payload empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment flag. Parsed but not enforced.
    pub fin: bool,
    /// Frame opcode.
    pub opcode: OpCode,
    /// Whether the payload was masked on the wire.
    pub masked: bool,
    /// Masking key, most significant byte first on the wire.
    pub mask_key: Option<u32>,
    /// Payload length in bytes.
    pub payload_length: u64,
    payload: Vec<u8>,
}

impl Frame {
    /// Create an unmasked frame.
    #[must_use]
    pub fn new(fin: bool, opcode: OpCode, payload: Vec<u8>) -> Self {
        Self {
            fin,
            opcode,
            masked: false,
            mask_key: None,
            payload_length: payload.len() as u64,
            payload,
        }
    }

    /// Get the (unmasked) payload bytes.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Take ownership of the payload.
    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Parse a frame from the start of `buf`.
    ///
    /// Returns the frame and the number of bytes it occupied. A close frame
    /// consumes the whole buffer since nothing after it is meaningful.
    ///
    /// ## Errors
    ///
    /// - `Error::Truncated` if `buf` ends before the frame does
    /// - `Error::PayloadTooLarge` if the frame uses a 64-bit length
    pub fn parse(buf: &[u8]) -> Result<(Self, usize)> {
        let header = parse_header(buf)?;

        if header.opcode == OpCode::Close {
            return Ok((Frame::new(header.fin, OpCode::Close, Vec::new()), buf.len()));
        }

        let payload_start = header.header_len;
        let payload_end = payload_start + header.payload_len;
        let Some(raw) = buf.get(payload_start..payload_end) else {
            return Err(Error::Truncated {
                needed: payload_end - buf.len(),
            });
        };

        let mut payload = raw.to_vec();
        if let Some(key) = header.mask_key {
            apply_mask_fast(&mut payload, mask_key_bytes(key));
        }

        let frame = Frame {
            fin: header.fin,
            opcode: header.opcode,
            masked: header.mask_key.is_some(),
            mask_key: header.mask_key,
            payload_length: header.payload_len as u64,
            payload,
        };

        Ok((frame, payload_end))
    }

    /// Serialize this frame, masking the payload when `mask_key` is given.
    ///
    /// This is the general serializer (any opcode, FIN flag, optional mask);
    /// connections send through [`encode`] instead.
    ///
    /// # Errors
    ///
    /// Returns `Error::FrameTooLarge` if the payload exceeds [`MAX_PAYLOAD_LEN`].
    pub fn to_wire(&self, mask_key: Option<u32>) -> Result<Vec<u8>> {
        let len = check_len(self.payload.len())?;

        let mut buf = Vec::with_capacity(self.wire_size(mask_key.is_some()));
        let mut byte0 = self.opcode.as_u8();
        if self.fin {
            byte0 |= 0x80;
        }
        buf.push(byte0);

        let mask_bit = if mask_key.is_some() { 0x80 } else { 0x00 };
        write_length(&mut buf, len, mask_bit);

        match mask_key {
            Some(key) => {
                let mask = mask_key_bytes(key);
                buf.extend_from_slice(&mask);
                let start = buf.len();
                buf.extend_from_slice(&self.payload);
                apply_mask_fast(&mut buf[start..], mask);
            }
            None => buf.extend_from_slice(&self.payload),
        }

        Ok(buf)
    }

    /// Calculate the size needed to write this frame.
    #[must_use]
    pub fn wire_size(&self, masked: bool) -> usize {
        let mask_size = if masked { 4 } else { 0 };
        header_size(self.payload.len()) + mask_size + self.payload.len()
    }
}

/// Outcome of decoding one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// Application payload, unmasked. Text and binary are not distinguished.
    Payload(Vec<u8>),
    /// The peer sent a close frame; the socket should be ended.
    Close,
}

/// Decode one complete frame held in `buf`.
///
/// # Errors
///
/// - `Error::PayloadTooLarge` for a 64-bit payload length
/// - `Error::Truncated` if the buffer is shorter than the frame
pub fn decode(buf: &[u8]) -> Result<Decoded> {
    let (frame, _) = Frame::parse(buf)?;
    Ok(match frame.opcode {
        OpCode::Close => Decoded::Close,
        _ => Decoded::Payload(frame.into_payload()),
    })
}

/// Encode `payload` as a final, unmasked frame with first byte
/// [`DATA_FRAME_HEADER`].
///
/// # Errors
///
/// Returns `Error::FrameTooLarge` if the payload exceeds [`MAX_PAYLOAD_LEN`].
pub fn encode(payload: &[u8]) -> Result<Vec<u8>> {
    let len = check_len(payload.len())?;
    Ok(encode_checked(payload, len))
}

/// Build the close frame: an encoded empty payload with byte 0 set to
/// [`CLOSE_FRAME_HEADER`].
#[must_use]
pub fn close_frame() -> Vec<u8> {
    let mut frame = encode_checked(&[], 0);
    frame[0] = CLOSE_FRAME_HEADER;
    frame
}

fn encode_checked(payload: &[u8], len: u16) -> Vec<u8> {
    let mut buf = Vec::with_capacity(header_size(payload.len()) + payload.len());
    buf.push(DATA_FRAME_HEADER);
    write_length(&mut buf, len, 0x00);
    buf.extend_from_slice(payload);
    buf
}

fn check_len(len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| Error::FrameTooLarge {
        size: len,
        max: MAX_PAYLOAD_LEN,
    })
}

fn write_length(buf: &mut Vec<u8>, len: u16, mask_bit: u8) {
    if len < u16::from(LEN_16) {
        buf.push(len as u8 | mask_bit);
    } else {
        buf.push(LEN_16 | mask_bit);
        buf.extend_from_slice(&len.to_be_bytes());
    }
}

#[inline]
fn header_size(payload_len: usize) -> usize {
    if payload_len < LEN_16 as usize { 2 } else { 4 }
}
