use std::io::{ErrorKind, Read};

use tracing::{debug, trace, warn};

use crate::bytecode::decode_error::{DecodeError, DecodeErrorKind, Field};
use crate::bytecode::format::{FloatWidth, FormatSpec, UnknownOpcodePolicy, Width};
use crate::bytecode::info::OperandShape;
use crate::bytecode::ir::Program;
use crate::bytecode::op::{
    BoxDescriptor, CallDescriptor, Instruction, JumpAddress, OpTag, Opcode, Operand, StringRef,
    VarIndex,
};

/// Decode a program using the default [`FormatSpec`].
pub fn decode<R: Read>(reader: R) -> Result<Program, DecodeError> {
    Decoder::new(reader).decode()
}

pub fn decode_with<R: Read>(reader: R, spec: &FormatSpec) -> Result<Program, DecodeError> {
    Decoder::with_spec(reader, *spec).decode()
}

pub fn decode_bytes(bytes: &[u8]) -> Result<Program, DecodeError> {
    decode(bytes)
}

/// One record: either an executable instruction or a string constant.
enum Record {
    Instruction(Instruction),
    String(String),
}

/// Single forward pass over a byte source.
///
/// No lookahead: each record reads exactly the bytes its opcode's operand
/// shape needs. Running out of input is only a clean end between records.
pub struct Decoder<R> {
    reader: R,
    spec: FormatSpec,
    offset: u64,
}

impl<R: Read> Decoder<R> {
    pub fn new(reader: R) -> Self {
        Self::with_spec(reader, FormatSpec::default())
    }

    pub fn with_spec(reader: R, spec: FormatSpec) -> Self {
        Self {
            reader,
            spec,
            offset: 0,
        }
    }

    /// Bytes consumed so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn decode(mut self) -> Result<Program, DecodeError> {
        self.read_header()?;

        let mut instructions = Vec::new();
        let mut strings = Vec::new();

        while let Some((start, code)) = self.next_opcode()? {
            let op = match Opcode::from_code(code) {
                Some(op) => op,
                None => {
                    let tag = OpTag::Unknown(code);
                    match self.spec.unknown_opcodes {
                        UnknownOpcodePolicy::Strict => {
                            return Err(DecodeError::new(
                                start,
                                Some(tag),
                                DecodeErrorKind::UnknownOpcode(code),
                            ));
                        }
                        UnknownOpcodePolicy::Lenient => {
                            warn!(offset = start, code, "unknown opcode, decoding without operand");
                            instructions.push(Instruction {
                                tag,
                                operand: Operand::Empty,
                            });
                            continue;
                        }
                    }
                }
            };

            let record = self
                .read_record(op)
                .map_err(|kind| DecodeError::new(start, Some(OpTag::Known(op)), kind))?;
            trace!(offset = start, opcode = %op, "decoded record");

            match record {
                Record::Instruction(instruction) => instructions.push(instruction),
                Record::String(text) => strings.push(text),
            }
        }

        debug!(
            instructions = instructions.len(),
            strings = strings.len(),
            bytes = self.offset,
            "decoded program"
        );
        Ok(Program::from_parts(instructions, strings))
    }

    fn read_header(&mut self) -> Result<(), DecodeError> {
        let Some(expected) = self.spec.magic else {
            return Ok(());
        };
        let found = self
            .read_uint(Width::U32, Field::Magic)
            .map_err(|kind| DecodeError::new(0, None, kind))? as u32;
        if found != expected {
            return Err(DecodeError::new(
                0,
                None,
                DecodeErrorKind::BadMagic { expected, found },
            ));
        }
        Ok(())
    }

    /// Start offset and raw code of the next record, `None` at end of input.
    fn next_opcode(&mut self) -> Result<Option<(u64, u32)>, DecodeError> {
        let start = self.offset;
        let width = self.spec.opcode.bytes();
        let mut buf = [0u8; 4];

        // End of input is checked on the first opcode byte, before any value
        // is formed from it.
        loop {
            match self.reader.read(&mut buf[..1]) {
                Ok(0) => return Ok(None),
                Ok(_) => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(DecodeError::new(start, None, DecodeErrorKind::Io(e))),
            }
        }
        self.offset += 1;

        if width > 1 {
            self.fill(&mut buf[1..width], Field::Opcode)
                .map_err(|kind| DecodeError::new(start, None, kind))?;
        }

        let code = self.spec.byte_order.read_uint(&buf[..width]) as u32;
        Ok(Some((start, code)))
    }

    fn read_record(&mut self, op: Opcode) -> Result<Record, DecodeErrorKind> {
        let operand = match op.shape() {
            OperandShape::Empty => Operand::Empty,
            OperandShape::Narrow => Operand::Narrow(self.read_narrow(Field::Narrow)?),
            OperandShape::Float => Operand::Float(self.read_float()?),
            OperandShape::StringRef => Operand::Str(self.read_string_ref()?),
            OperandShape::Jump => {
                let addr = self.read_uint(self.spec.jump, Field::JumpAddress)?;
                Operand::Jump(JumpAddress(addr as u32))
            }
            OperandShape::Rectangle => {
                let mode = self.read_narrow(Field::Mode)?;
                let page = self.read_narrow(Field::Page)?;
                let x = self.read_float_field(Field::X)?;
                let y = self.read_float_field(Field::Y)?;
                let w = self.read_float_field(Field::Width)?;
                let h = self.read_float_field(Field::Height)?;
                Operand::Box(BoxDescriptor::Rectangle {
                    mode,
                    page,
                    x,
                    y,
                    w,
                    h,
                })
            }
            OperandShape::Page => {
                let mode = self.read_narrow(Field::Mode)?;
                let page = self.read_narrow(Field::Page)?;
                Operand::Box(BoxDescriptor::Page { mode, page })
            }
            OperandShape::File => Operand::Box(BoxDescriptor::File {
                mode: self.read_narrow(Field::Mode)?,
            }),
            OperandShape::Call => {
                let name = self.read_string_ref()?;
                let arg_count = self.read_narrow(Field::Narrow)?;
                Operand::Call(CallDescriptor { name, arg_count })
            }
            OperandShape::VarIndex => {
                let name = self.read_string_ref()?;
                let index = self.read_narrow(Field::Narrow)?;
                Operand::VarIndex(VarIndex { name, index })
            }
            OperandShape::StringData => return Ok(Record::String(self.read_string_data()?)),
        };
        Ok(Record::Instruction(Instruction::new(op, operand)))
    }

    // =========================================================================
    // Field readers
    // =========================================================================

    fn fill(&mut self, buf: &mut [u8], field: Field) -> Result<(), DecodeErrorKind> {
        match self.reader.read_exact(buf) {
            Ok(()) => {
                self.offset += buf.len() as u64;
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(DecodeErrorKind::Truncated(field)),
            Err(e) => Err(DecodeErrorKind::Io(e)),
        }
    }

    fn read_uint(&mut self, width: Width, field: Field) -> Result<u64, DecodeErrorKind> {
        let mut buf = [0u8; 4];
        let buf = &mut buf[..width.bytes()];
        self.fill(buf, field)?;
        Ok(self.spec.byte_order.read_uint(buf))
    }

    fn read_narrow(&mut self, field: Field) -> Result<u32, DecodeErrorKind> {
        Ok(self.read_uint(self.spec.narrow, field)? as u32)
    }

    fn read_string_ref(&mut self) -> Result<StringRef, DecodeErrorKind> {
        Ok(StringRef(
            self.read_uint(self.spec.string_ref, Field::StringRef)? as u32,
        ))
    }

    fn read_float(&mut self) -> Result<f64, DecodeErrorKind> {
        self.read_float_field(Field::Float)
    }

    fn read_float_field(&mut self, field: Field) -> Result<f64, DecodeErrorKind> {
        let mut buf = [0u8; 8];
        let buf = &mut buf[..self.spec.float.bytes()];
        self.fill(buf, field)?;
        let bits = self.spec.byte_order.read_uint(buf);
        Ok(match self.spec.float {
            FloatWidth::F32 => f64::from(f32::from_bits(bits as u32)),
            FloatWidth::F64 => f64::from_bits(bits),
        })
    }

    fn read_string_data(&mut self) -> Result<String, DecodeErrorKind> {
        let declared = self.read_uint(self.spec.string_len, Field::StringLength)?;

        // `take` bounds the allocation by what the stream really holds, not
        // by the declared length.
        let mut bytes = Vec::new();
        let got = self
            .reader
            .by_ref()
            .take(declared)
            .read_to_end(&mut bytes)
            .map_err(DecodeErrorKind::Io)? as u64;
        self.offset += got;

        if got < declared {
            return Err(DecodeErrorKind::MalformedLength {
                declared,
                available: got,
            });
        }

        match String::from_utf8(bytes) {
            Ok(text) => Ok(text),
            Err(e) => {
                warn!(offset = self.offset, "string constant is not valid UTF-8, decoding lossily");
                Ok(String::from_utf8_lossy(e.as_bytes()).into_owned())
            }
        }
    }
}
