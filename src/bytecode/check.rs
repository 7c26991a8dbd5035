use thiserror::Error;
use tracing::debug;

use crate::bytecode::info::StackEffect;
use crate::bytecode::ir::Program;
use crate::bytecode::op::{OpTag, Operand};

/// A reference or stack problem an executor would hit at run time.
///
/// The decoder accepts these programs; callers that want to fail early run
/// [`check_program`] on the result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckError {
    #[error("string reference {reference} out of range at ip={ip} ({len} strings)")]
    StringOutOfRange { ip: usize, reference: u32, len: usize },

    #[error("jump target {target} out of range at ip={ip} ({len} instructions)")]
    JumpOutOfRange { ip: usize, target: u32, len: usize },

    #[error("stack underflow at ip={ip}, op={tag}, needed {needed} items")]
    StackUnderflow { ip: usize, tag: OpTag, needed: u32 },
}

/// Every string reference and jump address must land inside the program.
pub fn check_references(program: &Program) -> Result<(), CheckError> {
    let strings = program.strings().len();
    let len = program.len();

    for (ip, instruction) in program.instructions().iter().enumerate() {
        if let Some(r) = instruction.operand.string_ref() {
            if let Some(index) = r.index() {
                if index >= strings {
                    return Err(CheckError::StringOutOfRange {
                        ip,
                        reference: r.0,
                        len: strings,
                    });
                }
            }
        }
        if let Some(target) = instruction.operand.jump_target() {
            if target.index() >= len {
                return Err(CheckError::JumpOutOfRange {
                    ip,
                    target: target.0,
                    len,
                });
            }
        }
    }
    Ok(())
}

/// Returns (pops, pushes) on the variable stack, or None if unknown.
fn effect(tag: OpTag, operand: &Operand) -> Option<(u32, u32)> {
    let op = tag.opcode()?;
    match op.effect() {
        StackEffect::Fixed(pops, pushes) => Some((u32::from(pops), u32::from(pushes))),
        StackEffect::Call => match operand {
            Operand::Call(call) => Some((call.arg_count, 1)),
            _ => None,
        },
    }
}

/// Check variable-stack effects with a given initial height.
///
/// NOTE: this is a linear scan of straight-line code. It stops at the first
/// jump or jump target, and at unknown opcodes, because the height there
/// depends on control flow.
pub fn check_stack_with_initial(program: &Program, initial_height: u32) -> Result<(), CheckError> {
    let mut targets = vec![false; program.len()];
    for instruction in program.instructions() {
        if let Some(target) = instruction.operand.jump_target() {
            if let Some(slot) = targets.get_mut(target.index()) {
                *slot = true;
            }
        }
    }

    let mut h = initial_height;
    for (ip, instruction) in program.instructions().iter().enumerate() {
        if targets[ip] {
            debug!(ip, "stack check stopped at jump target");
            return Ok(());
        }
        let Some((pops, pushes)) = effect(instruction.tag, &instruction.operand) else {
            return Ok(());
        };
        h = h.checked_sub(pops).ok_or(CheckError::StackUnderflow {
            ip,
            tag: instruction.tag,
            needed: pops,
        })?;
        h += pushes;

        if instruction.operand.jump_target().is_some() {
            debug!(ip, "stack check stopped at jump");
            return Ok(());
        }
    }
    Ok(())
}

/// Check stack effects starting from an empty stack.
pub fn check_stack(program: &Program) -> Result<(), CheckError> {
    check_stack_with_initial(program, 0)
}

/// References first, then stack effects.
pub fn check_program(program: &Program) -> Result<(), CheckError> {
    check_references(program)?;
    check_stack(program)
}
