use thiserror::Error;
use tracing::debug;

use crate::bytecode::decode_error::Field;
use crate::bytecode::format::{FloatWidth, FormatSpec, Width};
use crate::bytecode::info::OperandShape;
use crate::bytecode::ir::Program;
use crate::bytecode::op::{BoxDescriptor, Instruction, OpTag, Opcode, Operand, StringRef};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    #[error("instruction {ip} ({tag}): {field} value {value} does not fit in {bytes} byte(s)")]
    FieldOverflow {
        ip: usize,
        tag: OpTag,
        field: Field,
        value: u64,
        bytes: usize,
    },

    #[error("instruction {ip} ({tag}): operand {operand:?} does not match the opcode")]
    OperandMismatch {
        ip: usize,
        tag: OpTag,
        operand: Operand,
    },

    #[error("instruction {ip} ({tag}): {field} value {value} is not exact as a 4-byte float")]
    FloatNarrowing {
        ip: usize,
        tag: OpTag,
        field: Field,
        value: f64,
    },

    #[error("string {index} is {len} bytes long, the length prefix allows at most {max}")]
    StringTooLong { index: usize, len: usize, max: u64 },

    #[error("{count} strings cannot be addressed, at most {max} references fit below the absent marker")]
    TooManyStrings { count: usize, max: u64 },
}

/// Encode with the default [`FormatSpec`].
pub fn encode(program: &Program) -> Result<Vec<u8>, EncodeError> {
    encode_with(program, &FormatSpec::default())
}

/// Serialise a program: optional header, the instructions in order, then one
/// `STRDATA` record per string constant.
///
/// Floats are written at the configured width. Under [`FloatWidth::F32`] a
/// value that does not survive the narrowing unchanged is an error, so what
/// decodes back is always the program that was encoded.
pub fn encode_with(program: &Program, spec: &FormatSpec) -> Result<Vec<u8>, EncodeError> {
    let max = addressable_strings(spec);
    if program.strings().len() as u64 > max {
        return Err(EncodeError::TooManyStrings {
            count: program.strings().len(),
            max,
        });
    }

    let mut encoder = Encoder {
        spec: *spec,
        out: Vec::new(),
    };

    if let Some(magic) = spec.magic {
        spec.byte_order
            .write_uint(u64::from(magic), 4, &mut encoder.out);
    }

    for (ip, instruction) in program.instructions().iter().enumerate() {
        encoder.instruction(ip, instruction)?;
    }

    for (index, text) in program.strings().iter().enumerate() {
        encoder.string(index, text)?;
    }

    debug!(
        instructions = program.len(),
        strings = program.strings().len(),
        bytes = encoder.out.len(),
        "encoded program"
    );
    Ok(encoder.out)
}

/// String indices the reference field can hold without reaching
/// [`StringRef::ABSENT`].
fn addressable_strings(spec: &FormatSpec) -> u64 {
    (spec.string_ref.max_value() + 1).min(u64::from(StringRef::ABSENT.0))
}

struct Encoder {
    spec: FormatSpec,
    out: Vec<u8>,
}

/// Location used in overflow errors.
struct Site {
    ip: usize,
    tag: OpTag,
}

impl Encoder {
    fn uint(&mut self, site: &Site, field: Field, width: Width, value: u64) -> Result<(), EncodeError> {
        if value > width.max_value() {
            return Err(EncodeError::FieldOverflow {
                ip: site.ip,
                tag: site.tag,
                field,
                value,
                bytes: width.bytes(),
            });
        }
        self.spec
            .byte_order
            .write_uint(value, width.bytes(), &mut self.out);
        Ok(())
    }

    fn narrow(&mut self, site: &Site, field: Field, value: u32) -> Result<(), EncodeError> {
        self.uint(site, field, self.spec.narrow, u64::from(value))
    }

    fn float(&mut self, site: &Site, field: Field, value: f64) -> Result<(), EncodeError> {
        let (bits, width) = match self.spec.float {
            FloatWidth::F32 => {
                let narrow = value as f32;
                // NaN never compares equal; any NaN payload reads back as NaN.
                if !value.is_nan() && f64::from(narrow) != value {
                    return Err(EncodeError::FloatNarrowing {
                        ip: site.ip,
                        tag: site.tag,
                        field,
                        value,
                    });
                }
                (u64::from(narrow.to_bits()), 4)
            }
            FloatWidth::F64 => (value.to_bits(), 8),
        };
        self.spec.byte_order.write_uint(bits, width, &mut self.out);
        Ok(())
    }

    fn instruction(&mut self, ip: usize, instruction: &Instruction) -> Result<(), EncodeError> {
        let site = Site {
            ip,
            tag: instruction.tag,
        };
        let mismatch = || EncodeError::OperandMismatch {
            ip,
            tag: instruction.tag,
            operand: instruction.operand,
        };

        let op = match instruction.tag {
            OpTag::Known(op) => op,
            OpTag::Unknown(code) => {
                if instruction.operand != Operand::Empty {
                    return Err(mismatch());
                }
                return self.uint(&site, Field::Opcode, self.spec.opcode, u64::from(code));
            }
        };
        if op == Opcode::StrData {
            return Err(mismatch());
        }

        self.uint(&site, Field::Opcode, self.spec.opcode, u64::from(op.code()))?;

        match (op.shape(), instruction.operand) {
            (OperandShape::Empty, Operand::Empty) => {}
            (OperandShape::Narrow, Operand::Narrow(n)) => self.narrow(&site, Field::Narrow, n)?,
            (OperandShape::Float, Operand::Float(v)) => self.float(&site, Field::Float, v)?,
            (OperandShape::StringRef, Operand::Str(r)) => {
                self.uint(&site, Field::StringRef, self.spec.string_ref, u64::from(r.0))?
            }
            (OperandShape::Jump, Operand::Jump(addr)) => {
                self.uint(&site, Field::JumpAddress, self.spec.jump, u64::from(addr.0))?
            }
            (
                OperandShape::Rectangle,
                Operand::Box(BoxDescriptor::Rectangle {
                    mode,
                    page,
                    x,
                    y,
                    w,
                    h,
                }),
            ) => {
                self.narrow(&site, Field::Mode, mode)?;
                self.narrow(&site, Field::Page, page)?;
                self.float(&site, Field::X, x)?;
                self.float(&site, Field::Y, y)?;
                self.float(&site, Field::Width, w)?;
                self.float(&site, Field::Height, h)?;
            }
            (OperandShape::Page, Operand::Box(BoxDescriptor::Page { mode, page })) => {
                self.narrow(&site, Field::Mode, mode)?;
                self.narrow(&site, Field::Page, page)?;
            }
            (OperandShape::File, Operand::Box(BoxDescriptor::File { mode })) => {
                self.narrow(&site, Field::Mode, mode)?;
            }
            (OperandShape::Call, Operand::Call(call)) => {
                self.uint(&site, Field::StringRef, self.spec.string_ref, u64::from(call.name.0))?;
                self.narrow(&site, Field::Narrow, call.arg_count)?;
            }
            (OperandShape::VarIndex, Operand::VarIndex(var)) => {
                self.uint(&site, Field::StringRef, self.spec.string_ref, u64::from(var.name.0))?;
                self.narrow(&site, Field::Narrow, var.index)?;
            }
            _ => return Err(mismatch()),
        }
        Ok(())
    }

    fn string(&mut self, index: usize, text: &str) -> Result<(), EncodeError> {
        let max = self.spec.string_len.max_value();
        if text.len() as u64 > max {
            return Err(EncodeError::StringTooLong {
                index,
                len: text.len(),
                max,
            });
        }
        let site = Site {
            ip: index,
            tag: OpTag::Known(Opcode::StrData),
        };
        self.uint(
            &site,
            Field::Opcode,
            self.spec.opcode,
            u64::from(Opcode::StrData.code()),
        )?;
        self.uint(&site, Field::StringLength, self.spec.string_len, text.len() as u64)?;
        self.out.extend_from_slice(text.as_bytes());
        Ok(())
    }
}
