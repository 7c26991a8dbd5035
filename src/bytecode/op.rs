use serde::{Deserialize, Serialize};

use crate::bytecode::info::{OperandShape, StackEffect};

// =============================================================================
// OPCODE - instruction tags
// =============================================================================

/// Declares [`Opcode`] together with its metadata rows so the two cannot
/// drift apart. Variants get dense discriminants in declaration order.
macro_rules! opcodes {
    ($( $(#[$doc:meta])* $variant:ident = $code:literal, $mnemonic:literal, $shape:expr, $effect:expr; )*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[repr(u8)]
        pub enum Opcode {
            $( $(#[$doc])* $variant, )*
        }

        impl Opcode {
            /// Every opcode, in dense index order.
            pub const ALL: &'static [Opcode] = &[ $( Opcode::$variant, )* ];
        }

        pub(crate) fn opcode_rows() -> Vec<(Opcode, crate::bytecode::info::OpcodeInfo)> {
            vec![ $(
                (
                    Opcode::$variant,
                    crate::bytecode::info::OpcodeInfo {
                        code: $code,
                        mnemonic: $mnemonic,
                        shape: $shape,
                        effect: $effect,
                    },
                ),
            )* ]
        }
    };
}

use OperandShape as S;
use StackEffect::{Call as DynCall, Fixed};

opcodes! {
    Nop         = 0x00, "NOP",         S::Empty,       Fixed(0, 0);
    /// Read the text inside a rectangle; resets the content stack.
    RdBox       = 0x01, "RDBOX",       S::Rectangle,   Fixed(0, 0);
    /// Read a whole page; resets the content stack.
    RdPage      = 0x02, "RDPAGE",      S::Page,        Fixed(0, 0);
    /// Read the whole file; resets the content stack.
    RdFile      = 0x03, "RDFILE",      S::File,        Fixed(0, 0);
    /// Pop, move the current box by the given spacer.
    MvBox       = 0x04, "MVBOX",       S::Narrow,      Fixed(1, 0);
    /// Pop `arg_count` arguments, push the return value.
    Call        = 0x05, "CALL",        S::Call,        DynCall;
    /// Abort with the referenced message.
    Error       = 0x06, "ERROR",       S::StringRef,   Fixed(0, 0);
    ParseNum    = 0x07, "PARSENUM",    S::Empty,       Fixed(1, 1);
    ParseInt    = 0x08, "PARSEINT",    S::Empty,       Fixed(1, 1);
    Eq          = 0x09, "EQ",          S::Empty,       Fixed(2, 1);
    Neq         = 0x0a, "NEQ",         S::Empty,       Fixed(2, 1);
    And         = 0x0b, "AND",         S::Empty,       Fixed(2, 1);
    Or          = 0x0c, "OR",          S::Empty,       Fixed(2, 1);
    Neg         = 0x0d, "NEG",         S::Empty,       Fixed(1, 1);
    Not         = 0x0e, "NOT",         S::Empty,       Fixed(1, 1);
    Add         = 0x0f, "ADD",         S::Empty,       Fixed(2, 1);
    Sub         = 0x10, "SUB",         S::Empty,       Fixed(2, 1);
    Mul         = 0x11, "MUL",         S::Empty,       Fixed(2, 1);
    Div         = 0x12, "DIV",         S::Empty,       Fixed(2, 1);
    Gt          = 0x13, "GT",          S::Empty,       Fixed(2, 1);
    Lt          = 0x14, "LT",          S::Empty,       Fixed(2, 1);
    Geq         = 0x15, "GEQ",         S::Empty,       Fixed(2, 1);
    Leq         = 0x16, "LEQ",         S::Empty,       Fixed(2, 1);
    Max         = 0x17, "MAX",         S::Empty,       Fixed(2, 1);
    Min         = 0x18, "MIN",         S::Empty,       Fixed(2, 1);
    /// Pop an index, select `name[index]`.
    SelVar      = 0x19, "SELVAR",      S::StringRef,   Fixed(1, 0);
    SelVarIdx   = 0x1a, "SELVARIDX",   S::VarIndex,    Fixed(0, 0);
    SelGlobal   = 0x1b, "SELGLOBAL",   S::StringRef,   Fixed(0, 0);
    SetDebug    = 0x1c, "SETDEBUG",    S::Empty,       Fixed(0, 0);
    Clear       = 0x1d, "CLEAR",       S::Empty,       Fixed(0, 0);
    Append      = 0x1e, "APPEND",      S::Empty,       Fixed(1, 0);
    SetVar      = 0x1f, "SETVAR",      S::Empty,       Fixed(1, 0);
    ResetVar    = 0x20, "RESETVAR",    S::Empty,       Fixed(0, 0);
    CopyContent = 0x21, "COPYCONTENT", S::Empty,       Fixed(0, 1);
    PushInt     = 0x22, "PUSHINT",     S::Narrow,      Fixed(0, 1);
    PushFloat   = 0x23, "PUSHFLOAT",   S::Float,       Fixed(0, 1);
    PushStr     = 0x24, "PUSHSTR",     S::StringRef,   Fixed(0, 1);
    PushVar     = 0x25, "PUSHVAR",     S::Empty,       Fixed(0, 1);
    Jmp         = 0x26, "JMP",         S::Jump,        Fixed(0, 0);
    /// Pop, jump if zero.
    Jz          = 0x27, "JZ",          S::Jump,        Fixed(1, 0);
    /// Pop, jump if not zero.
    Jnz         = 0x28, "JNZ",         S::Jump,        Fixed(1, 0);
    /// Jump if the top of the content stack is at its last token.
    Jte         = 0x29, "JTE",         S::Jump,        Fixed(0, 0);
    IncTop      = 0x2a, "INCTOP",      S::Empty,       Fixed(1, 0);
    Inc         = 0x2b, "INC",         S::Narrow,      Fixed(0, 0);
    DecTop      = 0x2c, "DECTOP",      S::Empty,       Fixed(1, 0);
    Dec         = 0x2d, "DEC",         S::Narrow,      Fixed(0, 0);
    IsSet       = 0x2e, "ISSET",       S::Empty,       Fixed(0, 1);
    Size        = 0x2f, "SIZE",        S::Empty,       Fixed(0, 1);
    PushContent = 0x30, "PUSHCONTENT", S::Empty,       Fixed(0, 0);
    NextLine    = 0x31, "NEXTLINE",    S::Empty,       Fixed(0, 0);
    NextToken   = 0x32, "NEXTTOKEN",   S::Empty,       Fixed(0, 0);
    PopContent  = 0x33, "POPCONTENT",  S::Empty,       Fixed(0, 0);
    NextPage    = 0x34, "NEXTPAGE",    S::Empty,       Fixed(0, 0);
    /// Push 1 when at end of file.
    Ate         = 0x35, "ATE",         S::Empty,       Fixed(0, 1);
    /// String constant declaration. Consumed by the decoder, never executed.
    StrData     = 0x36, "STRDATA",     S::StringData,  Fixed(0, 0);
    Hlt         = 0xff, "HLT",         S::Empty,       Fixed(0, 0);
}

impl Opcode {
    /// Dense position of this opcode, `0..Opcode::ALL.len()`.
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Opcode field of a decoded instruction.
///
/// `Unknown` keeps the raw wire code of an opcode this crate does not model;
/// it is only produced under the lenient unknown-opcode policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpTag {
    Known(Opcode),
    Unknown(u32),
}

impl OpTag {
    pub fn opcode(self) -> Option<Opcode> {
        match self {
            OpTag::Known(op) => Some(op),
            OpTag::Unknown(_) => None,
        }
    }
}

impl From<Opcode> for OpTag {
    fn from(op: Opcode) -> Self {
        OpTag::Known(op)
    }
}

// =============================================================================
// OPERANDS
// =============================================================================

/// Index into a program's string constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StringRef(pub u32);

impl StringRef {
    /// "No string", the all-ones value of a 16-bit reference field.
    ///
    /// The marker is fixed at `0xFFFF` regardless of the configured width.
    /// With 16-bit or wider references, index `0xFFFF` always reads as absent,
    /// so string tables stop at `0xFFFF` entries. With 8-bit references the
    /// marker cannot be written at all and every value is a real index.
    pub const ABSENT: StringRef = StringRef(0xFFFF);

    pub fn is_absent(self) -> bool {
        self == Self::ABSENT
    }

    /// Index into the string table, or `None` for [`StringRef::ABSENT`].
    pub fn index(self) -> Option<usize> {
        if self.is_absent() {
            None
        } else {
            Some(self.0 as usize)
        }
    }
}

/// Absolute instruction index used as a jump target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JumpAddress(pub u32);

impl JumpAddress {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoxKind {
    Rectangle,
    Page,
    File,
}

/// Placement read by `RDBOX`, `RDPAGE` and `RDFILE`.
///
/// `mode` is kept raw; see [`ReadMode::from_raw`](crate::bytecode::info::ReadMode::from_raw).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BoxDescriptor {
    Rectangle {
        mode: u32,
        page: u32,
        x: f64,
        y: f64,
        w: f64,
        h: f64,
    },
    Page {
        mode: u32,
        page: u32,
    },
    File {
        mode: u32,
    },
}

impl BoxDescriptor {
    pub fn kind(&self) -> BoxKind {
        match self {
            BoxDescriptor::Rectangle { .. } => BoxKind::Rectangle,
            BoxDescriptor::Page { .. } => BoxKind::Page,
            BoxDescriptor::File { .. } => BoxKind::File,
        }
    }

    pub fn mode(&self) -> u32 {
        match *self {
            BoxDescriptor::Rectangle { mode, .. }
            | BoxDescriptor::Page { mode, .. }
            | BoxDescriptor::File { mode } => mode,
        }
    }

    pub fn page(&self) -> Option<u32> {
        match *self {
            BoxDescriptor::Rectangle { page, .. } | BoxDescriptor::Page { page, .. } => Some(page),
            BoxDescriptor::File { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallDescriptor {
    pub name: StringRef,
    pub arg_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VarIndex {
    pub name: StringRef,
    pub index: u32,
}

/// Typed payload of an instruction. The opcode decides which variant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Empty,
    /// Count, index, amount or slot.
    Narrow(u32),
    Float(f64),
    Str(StringRef),
    Jump(JumpAddress),
    Box(BoxDescriptor),
    Call(CallDescriptor),
    VarIndex(VarIndex),
}

impl Operand {
    /// String reference carried by this operand, if any.
    pub fn string_ref(&self) -> Option<StringRef> {
        match *self {
            Operand::Str(r) => Some(r),
            Operand::Call(call) => Some(call.name),
            Operand::VarIndex(var) => Some(var.name),
            _ => None,
        }
    }

    pub fn jump_target(&self) -> Option<JumpAddress> {
        match *self {
            Operand::Jump(addr) => Some(addr),
            _ => None,
        }
    }
}

// =============================================================================
// INSTRUCTION
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub tag: OpTag,
    pub operand: Operand,
}

impl Instruction {
    pub fn new(op: Opcode, operand: Operand) -> Self {
        Self {
            tag: OpTag::Known(op),
            operand,
        }
    }

    /// Operand-less instruction.
    pub fn bare(op: Opcode) -> Self {
        Self::new(op, Operand::Empty)
    }

    pub fn opcode(&self) -> Option<Opcode> {
        self.tag.opcode()
    }

    pub fn is(&self, op: Opcode) -> bool {
        self.tag == OpTag::Known(op)
    }
}
