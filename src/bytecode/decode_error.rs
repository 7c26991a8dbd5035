use std::fmt;
use std::io;

use thiserror::Error;

use crate::bytecode::op::OpTag;

/// Field being read when the stream ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Magic,
    Opcode,
    Mode,
    Page,
    X,
    Y,
    Width,
    Height,
    StringRef,
    Narrow,
    Float,
    JumpAddress,
    StringLength,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Magic => "magic header",
            Field::Opcode => "opcode",
            Field::Mode => "box mode",
            Field::Page => "page number",
            Field::X => "box x",
            Field::Y => "box y",
            Field::Width => "box width",
            Field::Height => "box height",
            Field::StringRef => "string reference",
            Field::Narrow => "integer operand",
            Field::Float => "float operand",
            Field::JumpAddress => "jump address",
            Field::StringLength => "string length",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum DecodeErrorKind {
    /// Fewer bytes left than the record needs.
    #[error("stream truncated while reading {0}")]
    Truncated(Field),

    /// `STRDATA` length prefix points past the end of the stream.
    #[error("string length {declared} exceeds the {available} bytes left in the stream")]
    MalformedLength { declared: u64, available: u64 },

    #[error("bad magic: expected {expected:#010x}, found {found:#010x}")]
    BadMagic { expected: u32, found: u32 },

    /// Only raised under the strict unknown-opcode policy.
    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u32),

    #[error("i/o error: {0}")]
    Io(#[source] io::Error),
}

/// A failed decode.
///
/// `offset` is the byte position where the failing record (or the header)
/// starts; `opcode` is set once the record's opcode has been read.
#[derive(Debug)]
pub struct DecodeError {
    pub offset: u64,
    pub opcode: Option<OpTag>,
    pub kind: DecodeErrorKind,
}

impl DecodeError {
    pub fn new(offset: u64, opcode: Option<OpTag>, kind: DecodeErrorKind) -> Self {
        Self {
            offset,
            opcode,
            kind,
        }
    }

    pub fn is_truncation(&self) -> bool {
        matches!(
            self.kind,
            DecodeErrorKind::Truncated(_) | DecodeErrorKind::MalformedLength { .. }
        )
    }
}

impl fmt::Display for DecodeError {
    /// Formats as `decode error at byte N (OPCODE): reason`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "decode error at byte {}", self.offset)?;
        if let Some(tag) = self.opcode {
            write!(f, " ({})", tag)?;
        }
        write!(f, ": {}", self.kind)
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::op::Opcode;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_display_with_opcode() {
        let err = DecodeError::new(
            12,
            Some(OpTag::Known(Opcode::RdBox)),
            DecodeErrorKind::Truncated(Field::Height),
        );
        assert_eq!(
            err.to_string(),
            "decode error at byte 12 (RDBOX): stream truncated while reading box height"
        );
        assert!(err.is_truncation());
    }

    #[test]
    fn test_display_without_opcode() {
        let err = DecodeError::new(
            0,
            None,
            DecodeErrorKind::BadMagic {
                expected: 0xb011377a,
                found: 0,
            },
        );
        assert_eq!(
            err.to_string(),
            "decode error at byte 0: bad magic: expected 0xb011377a, found 0x00000000"
        );
        assert!(!err.is_truncation());
    }
}
