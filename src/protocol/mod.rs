//! WebSocket protocol core: framing, masking and the opening handshake.

pub mod frame;
pub mod handshake;
pub mod http;
pub mod mask;
pub mod opcode;

pub use frame::{Decoded, Frame, MAX_PAYLOAD_LEN, close_frame, decode, encode};
pub use handshake::{ClientHandshake, WS_GUID, compute_accept_key, generate_nonce};
pub use http::{Headers, RequestHead, ResponseHead};
pub use mask::{apply_mask, apply_mask_fast, mask_key_bytes};
pub use opcode::OpCode;
