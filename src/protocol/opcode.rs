//! WebSocket frame opcodes as defined in RFC 6455.

/// WebSocket frame opcode.
///
/// Defines the interpretation of the payload data. Every 4-bit value maps to
/// a variant; values without a defined meaning are kept as [`OpCode::Reserved`]
/// so a frame header can always be represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    /// Continuation frame (0x0).
    Continuation,

    /// Text frame (0x1).
    Text,

    /// Binary frame (0x2).
    Binary,

    /// Close frame (0x8).
    ///
    /// Signals closure; the payload is ignored.
    Close,

    /// Ping frame (0x9).
    Ping,

    /// Pong frame (0xA).
    Pong,

    /// Reserved opcode (0x3-0x7, 0xB-0xF).
    Reserved(u8),
}

impl OpCode {
    /// Create an OpCode from the low nibble of `byte`.
    #[inline]
    #[must_use]
    pub const fn from_u8(byte: u8) -> Self {
        match byte & 0x0F {
            0x0 => OpCode::Continuation,
            0x1 => OpCode::Text,
            0x2 => OpCode::Binary,
            0x8 => OpCode::Close,
            0x9 => OpCode::Ping,
            0xA => OpCode::Pong,
            other => OpCode::Reserved(other),
        }
    }

    /// Convert OpCode to raw byte value.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            OpCode::Continuation => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
            OpCode::Reserved(byte) => byte & 0x0F,
        }
    }

    /// Get human-readable name for this opcode.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            OpCode::Continuation => "Continuation",
            OpCode::Text => "Text",
            OpCode::Binary => "Binary",
            OpCode::Close => "Close",
            OpCode::Ping => "Ping",
            OpCode::Pong => "Pong",
            OpCode::Reserved(_) => "Reserved",
        }
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpCode::Reserved(byte) => write!(f, "Reserved({byte:#x})"),
            _ => write!(f, "{}", self.name()),
        }
    }
}
