use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bytecode::op::{Instruction, JumpAddress, StringRef};
use crate::util::intern::{StringPool, Symbol};

/// A decoded bytecode program.
///
/// Instruction indices are jump targets and string indices follow the order
/// of `STRDATA` records; neither changes after construction, so the program
/// only exposes read access.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    instructions: Vec<Instruction>,
    strings: Vec<String>,
}

impl Program {
    pub(crate) fn from_parts(instructions: Vec<Instruction>, strings: Vec<String>) -> Self {
        Self {
            instructions,
            strings,
        }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    pub fn instruction(&self, addr: JumpAddress) -> Option<&Instruction> {
        self.instructions.get(addr.index())
    }

    /// Text of a string reference.
    ///
    /// [`StringRef::ABSENT`] reads as the empty string; an index past the
    /// string table is `None`.
    pub fn string(&self, r: StringRef) -> Option<&str> {
        match r.index() {
            None => Some(""),
            Some(i) => self.strings.get(i).map(String::as_str),
        }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Intern every string constant, returning one symbol per string index.
    pub fn intern_strings(&self, pool: &mut StringPool) -> Vec<Symbol> {
        self.strings.iter().map(|s| pool.intern(s)).collect()
    }

    /// Compact binary snapshot of the decoded form.
    pub fn to_postcard(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    pub fn from_postcard(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

/// Raised when the string table cannot take another entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("string table is full ({max} entries), cannot add {text:?}")]
    TooManyStrings { max: usize, text: String },
}

/// Assembles a [`Program`] by hand, e.g. for fixtures or re-encoding.
#[derive(Debug, Clone, Default)]
pub struct ProgramBuilder {
    instructions: Vec<Instruction>,
    strings: IndexSet<String, ahash::RandomState>,
}

impl ProgramBuilder {
    /// Indices `0..MAX_STRINGS` stay below [`StringRef::ABSENT`].
    pub const MAX_STRINGS: usize = StringRef::ABSENT.0 as usize;

    pub fn new() -> Self {
        Self::default()
    }

    /// Append an instruction and return its address.
    pub fn push(&mut self, instruction: Instruction) -> JumpAddress {
        self.instructions.push(instruction);
        JumpAddress((self.instructions.len() - 1) as u32)
    }

    /// Address the next pushed instruction will get.
    pub fn next_address(&self) -> JumpAddress {
        JumpAddress(self.instructions.len() as u32)
    }

    /// Mutable access for back-patching a forward jump.
    pub fn instruction_mut(&mut self, addr: JumpAddress) -> Option<&mut Instruction> {
        self.instructions.get_mut(addr.index())
    }

    /// Reference to `text`, reusing an existing entry.
    /// The empty string maps to [`StringRef::ABSENT`].
    pub fn add_string(&mut self, text: &str) -> Result<StringRef, BuildError> {
        if text.is_empty() {
            return Ok(StringRef::ABSENT);
        }
        if let Some(i) = self.strings.get_index_of(text) {
            return Ok(StringRef(i as u32));
        }
        if self.strings.len() >= Self::MAX_STRINGS {
            return Err(BuildError::TooManyStrings {
                max: Self::MAX_STRINGS,
                text: text.to_string(),
            });
        }
        let (i, _) = self.strings.insert_full(text.to_string());
        Ok(StringRef(i as u32))
    }

    pub fn build(self) -> Program {
        Program::from_parts(self.instructions, self.strings.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::op::{CallDescriptor, Opcode, Operand};
    use pretty_assertions::assert_eq;

    fn sample() -> Program {
        let mut b = ProgramBuilder::new();
        let name = b.add_string("totale").unwrap();
        let fun = b.add_string("num").unwrap();
        b.push(Instruction::new(Opcode::PushStr, Operand::Str(name)));
        b.push(Instruction::new(
            Opcode::Call,
            Operand::Call(CallDescriptor {
                name: fun,
                arg_count: 1,
            }),
        ));
        b.push(Instruction::new(Opcode::PushFloat, Operand::Float(1.5)));
        b.push(Instruction::bare(Opcode::Hlt));
        b.build()
    }

    #[test]
    fn test_add_string_dedups() {
        let mut b = ProgramBuilder::new();
        assert_eq!(b.add_string("a"), Ok(StringRef(0)));
        assert_eq!(b.add_string("b"), Ok(StringRef(1)));
        assert_eq!(b.add_string("a"), Ok(StringRef(0)));
        assert_eq!(b.add_string(""), Ok(StringRef::ABSENT));
        assert_eq!(b.build().strings(), ["a", "b"]);
    }

    #[test]
    fn test_string_table_stops_below_absent() {
        let mut b = ProgramBuilder::new();
        for i in 0..ProgramBuilder::MAX_STRINGS {
            let r = b.add_string(&format!("s{}", i)).unwrap();
            assert!(!r.is_absent());
        }
        assert_eq!(b.add_string("s0"), Ok(StringRef(0)));
        assert_eq!(
            b.add_string("one more"),
            Err(BuildError::TooManyStrings {
                max: 0xFFFF,
                text: "one more".to_string(),
            })
        );
        assert_eq!(b.add_string(""), Ok(StringRef::ABSENT));

        let program = b.build();
        assert_eq!(program.strings().len(), 0xFFFF);
        assert_eq!(program.string(StringRef(0xFFFE)), Some("s65534"));
    }

    #[test]
    fn test_string_lookup() {
        let program = sample();
        assert_eq!(program.string(StringRef(0)), Some("totale"));
        assert_eq!(program.string(StringRef::ABSENT), Some(""));
        assert_eq!(program.string(StringRef(9)), None);
    }

    #[test]
    fn test_instruction_lookup() {
        let program = sample();
        assert_eq!(program.len(), 4);
        assert!(program.instruction(JumpAddress(3)).unwrap().is(Opcode::Hlt));
        assert!(program.instruction(JumpAddress(4)).is_none());
    }

    #[test]
    fn test_back_patch() {
        let mut b = ProgramBuilder::new();
        let jmp = b.push(Instruction::new(Opcode::Jmp, Operand::Jump(JumpAddress(0))));
        b.push(Instruction::bare(Opcode::Nop));
        let target = b.next_address();
        b.push(Instruction::bare(Opcode::Hlt));
        b.instruction_mut(jmp).unwrap().operand = Operand::Jump(target);

        let program = b.build();
        assert_eq!(
            program.instructions()[0].operand.jump_target(),
            Some(JumpAddress(2))
        );
    }

    #[test]
    fn test_intern_strings() {
        let program = sample();
        let mut pool = StringPool::new();
        pool.intern("num");
        let symbols = program.intern_strings(&mut pool);
        assert_eq!(symbols.len(), 2);
        assert_eq!(pool.resolve(symbols[0]), "totale");
        assert_eq!(pool.lookup("num"), Some(symbols[1]));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_postcard_snapshot() {
        let program = sample();
        let bytes = program.to_postcard().unwrap();
        assert_eq!(Program::from_postcard(&bytes).unwrap(), program);
    }
}
