//! Fixed metadata for the instruction set and the PDF read modes.
//!
//! All tables are built once on first use. A malformed table is a bug in
//! this file, so construction panics instead of returning an error.

use std::fmt;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::bytecode::op::{BoxKind, OpTag, Opcode, opcode_rows};
use crate::util::table::{ContigKey, ContigMap, StaticMap};

/// Operand layout an opcode carries on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandShape {
    Empty,
    Narrow,
    Float,
    StringRef,
    Jump,
    Rectangle,
    Page,
    File,
    Call,
    VarIndex,
    /// Length-prefixed bytes, only for `STRDATA`.
    StringData,
}

impl OperandShape {
    pub fn box_kind(self) -> Option<BoxKind> {
        match self {
            OperandShape::Rectangle => Some(BoxKind::Rectangle),
            OperandShape::Page => Some(BoxKind::Page),
            OperandShape::File => Some(BoxKind::File),
            _ => None,
        }
    }
}

/// Effect on the variable stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackEffect {
    /// Pops, then pushes.
    Fixed(u8, u8),
    /// Pops the call's argument count, pushes the return value.
    Call,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeInfo {
    /// Value of the opcode field on the wire.
    pub code: u32,
    pub mnemonic: &'static str,
    pub shape: OperandShape,
    pub effect: StackEffect,
}

impl ContigKey for Opcode {
    fn to_index(self) -> usize {
        self.index()
    }
}

// =============================================================================
// Read modes
// =============================================================================

/// How text is extracted from a box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ReadMode {
    Default,
    Layout,
    Raw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadModeInfo {
    pub name: &'static str,
    pub label: &'static str,
    /// Extra flag handed to `pdftotext`.
    pub pdftotext_flag: Option<&'static str>,
}

impl ContigKey for ReadMode {
    fn to_index(self) -> usize {
        self as usize
    }
}

impl ReadMode {
    pub const ALL: [ReadMode; 3] = [ReadMode::Default, ReadMode::Layout, ReadMode::Raw];

    /// Mode for a raw operand value, `None` when out of range.
    pub fn from_raw(raw: u32) -> Option<ReadMode> {
        Self::ALL.get(raw as usize).copied()
    }

    pub fn info(self) -> &'static ReadModeInfo {
        match READ_MODE_INFO.get(self) {
            Some(info) => info,
            None => unreachable!("read mode table covers every mode"),
        }
    }
}

impl fmt::Display for ReadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.info().name)
    }
}

// =============================================================================
// Tables
// =============================================================================

lazy_static! {
    static ref OPCODE_INFO: ContigMap<Opcode, OpcodeInfo> =
        ContigMap::new(opcode_rows()).expect("opcode table must cover a dense range");

    static ref OPCODE_BY_CODE: StaticMap<u32, Opcode> = StaticMap::new(
        OPCODE_INFO.iter().map(|(op, info)| (info.code, op)).collect::<Vec<_>>()
    )
    .expect("opcode wire codes must be unique");

    static ref OPCODE_BY_MNEMONIC: StaticMap<&'static str, Opcode> = StaticMap::new(
        OPCODE_INFO.iter().map(|(op, info)| (info.mnemonic, op)).collect::<Vec<_>>()
    )
    .expect("opcode mnemonics must be unique");

    static ref READ_MODE_INFO: ContigMap<ReadMode, ReadModeInfo> = ContigMap::new(vec![
        (ReadMode::Default, ReadModeInfo { name: "DEFAULT", label: "Default", pdftotext_flag: None }),
        (ReadMode::Layout, ReadModeInfo { name: "LAYOUT", label: "Layout", pdftotext_flag: Some("-layout") }),
        (ReadMode::Raw, ReadModeInfo { name: "RAW", label: "Grezza", pdftotext_flag: Some("-raw") }),
    ])
    .expect("read mode table must cover a dense range");
}

impl Opcode {
    pub fn info(self) -> &'static OpcodeInfo {
        match OPCODE_INFO.get(self) {
            Some(info) => info,
            None => unreachable!("opcode table covers every opcode"),
        }
    }

    pub fn code(self) -> u32 {
        self.info().code
    }

    pub fn mnemonic(self) -> &'static str {
        self.info().mnemonic
    }

    pub fn shape(self) -> OperandShape {
        self.info().shape
    }

    pub fn effect(self) -> StackEffect {
        self.info().effect
    }

    pub fn is_jump(self) -> bool {
        self.shape() == OperandShape::Jump
    }

    /// Resolve a wire code. Codes are sparse (`HLT` is `0xFF`).
    pub fn from_code(code: u32) -> Option<Opcode> {
        OPCODE_BY_CODE.get(&code).copied()
    }

    /// Resolve a mnemonic, case-insensitively.
    pub fn from_mnemonic(name: &str) -> Option<Opcode> {
        OPCODE_BY_MNEMONIC
            .get(name)
            .or_else(|| OPCODE_BY_MNEMONIC.get(name.to_ascii_uppercase().as_str()))
            .copied()
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

impl fmt::Display for OpTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpTag::Known(op) => write!(f, "{}", op),
            OpTag::Unknown(code) => write!(f, "OP_{:#04x}", code),
        }
    }
}
