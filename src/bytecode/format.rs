//! Wire-format contract between the bytecode producer and this decoder.
//!
//! Field widths are not implied by the instruction set; they are fixed by
//! whoever emits the bytes. [`FormatSpec::default`] matches the layout
//! compiler that ships alongside the editor.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Header written by the layout compiler in front of every program.
pub const LEGACY_MAGIC: u32 = 0xB011_377A;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    Big,
    Little,
}

impl ByteOrder {
    /// Unsigned value of `bytes` (at most 8).
    pub fn read_uint(self, bytes: &[u8]) -> u64 {
        let fold = |acc: u64, b: &u8| (acc << 8) | u64::from(*b);
        match self {
            ByteOrder::Big => bytes.iter().fold(0, fold),
            ByteOrder::Little => bytes.iter().rev().fold(0, fold),
        }
    }

    /// Append the low `width` bytes of `value`.
    pub fn write_uint(self, value: u64, width: usize, out: &mut Vec<u8>) {
        match self {
            ByteOrder::Big => out.extend_from_slice(&value.to_be_bytes()[8 - width..]),
            ByteOrder::Little => out.extend_from_slice(&value.to_le_bytes()[..width]),
        }
    }
}

/// Width of an integer field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Width {
    U8,
    U16,
    U32,
}

impl Width {
    pub fn bytes(self) -> usize {
        match self {
            Width::U8 => 1,
            Width::U16 => 2,
            Width::U32 => 4,
        }
    }

    pub fn max_value(self) -> u64 {
        match self {
            Width::U8 => u64::from(u8::MAX),
            Width::U16 => u64::from(u16::MAX),
            Width::U32 => u64::from(u32::MAX),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FloatWidth {
    F32,
    F64,
}

impl FloatWidth {
    pub fn bytes(self) -> usize {
        match self {
            FloatWidth::F32 => 4,
            FloatWidth::F64 => 8,
        }
    }
}

/// What to do with an opcode value the instruction set does not define.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownOpcodePolicy {
    /// Keep it as an operand-less instruction and continue.
    Lenient,
    /// Fail the decode.
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatSpec {
    pub byte_order: ByteOrder,
    pub opcode: Width,
    /// Modes, page numbers, argument counts, indices and amounts.
    pub narrow: Width,
    pub string_ref: Width,
    pub jump: Width,
    /// `STRDATA` length prefix.
    pub string_len: Width,
    pub float: FloatWidth,
    /// Expected 4-byte header, if any.
    pub magic: Option<u32>,
    pub unknown_opcodes: UnknownOpcodePolicy,
}

impl Default for FormatSpec {
    fn default() -> Self {
        Self {
            byte_order: ByteOrder::Big,
            opcode: Width::U8,
            narrow: Width::U8,
            string_ref: Width::U16,
            jump: Width::U16,
            string_len: Width::U16,
            float: FloatWidth::F32,
            magic: None,
            unknown_opcodes: UnknownOpcodePolicy::Lenient,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read format file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid format description: {0}")]
    Json(#[from] serde_json::Error),
}

impl FormatSpec {
    /// Default widths with the compiler's magic header expected.
    pub fn legacy() -> Self {
        Self {
            magic: Some(LEGACY_MAGIC),
            ..Self::default()
        }
    }

    pub fn with_magic(mut self, magic: Option<u32>) -> Self {
        self.magic = magic;
        self
    }

    pub fn strict(mut self) -> Self {
        self.unknown_opcodes = UnknownOpcodePolicy::Strict;
        self
    }

    pub fn little_endian(mut self) -> Self {
        self.byte_order = ByteOrder::Little;
        self
    }

    /// Parse a JSON format description. Missing fields keep their defaults.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }
}
