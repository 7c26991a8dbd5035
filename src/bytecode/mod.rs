pub mod check;
pub mod decode;
pub mod decode_error;
pub mod disasm;
pub mod encode;
pub mod format;
pub mod info;
pub mod ir;
pub mod op;

pub use check::{CheckError, check_program};
pub use decode::{Decoder, decode, decode_bytes, decode_with};
pub use decode_error::{DecodeError, DecodeErrorKind};
pub use encode::{EncodeError, encode, encode_with};
pub use format::FormatSpec;
pub use info::ReadMode;
pub use ir::{BuildError, Program, ProgramBuilder};
pub use op::{Instruction, OpTag, Opcode, Operand};
