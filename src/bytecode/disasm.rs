use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write as _;

use crate::bytecode::info::{ReadMode, StackEffect};
use crate::bytecode::ir::Program;
use crate::bytecode::op::{BoxDescriptor, Instruction, Operand, StringRef};

/// Print disassembly of a decoded program
pub fn print_program(program: &Program) {
    println!("════════════════════════════════════════");
    println!(" program");
    println!(
        " {} instructions, {} strings",
        program.len(),
        program.strings().len()
    );
    println!("════════════════════════════════════════");
    print!("{}", disassemble_to_string(program));
    println!();
    print_strings(program);
}

/// Print the string constant table
pub fn print_strings(program: &Program) {
    if program.strings().is_empty() {
        return;
    }
    println!("-- strings ({}) --", program.strings().len());
    for (i, s) in program.strings().iter().enumerate() {
        println!("  #{:<4} {:?}", i, s);
    }
}

fn collect_jump_targets(program: &Program) -> Vec<usize> {
    let mut targets = Vec::new();

    for instruction in program.instructions() {
        if let Some(target) = instruction.operand.jump_target() {
            let target = target.index();
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
    }

    targets
}

/// Return disassembly as a String
pub fn disassemble_to_string(program: &Program) -> String {
    let mut output = String::new();
    let jump_targets = collect_jump_targets(program);

    for (ip, instruction) in program.instructions().iter().enumerate() {
        if jump_targets.contains(&ip) {
            output.push_str("      ┌──────────────────────────────────\n");
        }

        let _ = write!(output, "{:04} ", ip);

        if jump_targets.contains(&ip) {
            output.push_str("► ");
        } else {
            output.push_str("  ");
        }

        output.push_str(&format_instruction(program, ip, instruction));
        output.push('\n');
    }

    output
}

const COMMENT_COLUMN: usize = 44;

/// One listing line without the address column.
pub fn format_instruction(program: &Program, ip: usize, instruction: &Instruction) -> String {
    let name = instruction.tag.to_string();
    let operand = format_operand(program, ip, &instruction.operand);
    let comment = stack_comment(instruction);

    let mut line = if operand.is_empty() {
        name
    } else {
        format!("{:<12}{}", name, operand)
    };
    if let Some(comment) = comment {
        let pad = COMMENT_COLUMN.saturating_sub(line.chars().count()).max(1);
        let _ = write!(line, "{:pad$}; {}", "", comment);
    }
    line
}

fn format_string_ref(program: &Program, r: StringRef) -> String {
    if r.is_absent() {
        return "<none>".to_string();
    }
    match program.string(r) {
        Some(s) => format!("{:?}", s),
        None => format!("#{} <out of range>", r.0),
    }
}

fn format_mode(mode: u32) -> String {
    match ReadMode::from_raw(mode) {
        Some(m) => m.to_string(),
        None => format!("mode{}", mode),
    }
}

fn format_operand(program: &Program, ip: usize, operand: &Operand) -> String {
    match *operand {
        Operand::Empty => String::new(),
        Operand::Narrow(n) => n.to_string(),
        Operand::Float(v) => format!("{:?}", v),
        Operand::Str(r) => format_string_ref(program, r),
        Operand::Jump(addr) => {
            let direction = if addr.index() <= ip { "↑" } else { "↓" };
            format!("{:04} {}", addr.0, direction)
        }
        Operand::Box(BoxDescriptor::Rectangle {
            mode,
            page,
            x,
            y,
            w,
            h,
        }) => format!(
            "{} page={} x={} y={} w={} h={}",
            format_mode(mode),
            page,
            x,
            y,
            w,
            h
        ),
        Operand::Box(BoxDescriptor::Page { mode, page }) => {
            format!("{} page={}", format_mode(mode), page)
        }
        Operand::Box(BoxDescriptor::File { mode }) => format_mode(mode),
        Operand::Call(call) => format!(
            "{} args={}",
            format_string_ref(program, call.name),
            call.arg_count
        ),
        Operand::VarIndex(var) => {
            format!("{}[{}]", format_string_ref(program, var.name), var.index)
        }
    }
}

/// Stack effect as `( pops -- pushes )`, omitted for no-ops on the stack.
fn stack_comment(instruction: &Instruction) -> Option<String> {
    let op = instruction.opcode()?;
    let (pops, pushes) = match (op.effect(), &instruction.operand) {
        (StackEffect::Fixed(0, 0), _) => return None,
        (StackEffect::Fixed(pops, pushes), _) => (u32::from(pops), u32::from(pushes)),
        (StackEffect::Call, Operand::Call(call)) => (call.arg_count, 1),
        (StackEffect::Call, _) => return None,
    };
    Some(format!("( {} -- {} )", pops, pushes))
}

// =============================================================================
// Compact mode (optional - for less verbose output)
// =============================================================================

/// Print compact disassembly (raw operands, no string resolution)
pub fn print_compact(program: &Program) {
    println!("-- program ({} ops) --", program.len());
    for (ip, instruction) in program.instructions().iter().enumerate() {
        println!("  {:04}  {} {:?}", ip, instruction.tag, instruction.operand);
    }
    println!();
}

// =============================================================================
// Statistics
// =============================================================================

/// Print bytecode statistics
pub fn print_stats(program: &Program) {
    println!("=== BYTECODE STATISTICS ===\n");

    let total_ops = program.len();
    let string_bytes: usize = program.strings().iter().map(String::len).sum();

    println!("Instructions:     {}", total_ops);
    println!("Strings:          {}", program.strings().len());
    println!("String bytes:     {}", string_bytes);
    println!("Jump targets:     {}", collect_jump_targets(program).len());
    println!("Pages:            {}", referenced_pages(program).len());
    println!();

    let modes = read_mode_usage(program);
    if !modes.is_empty() {
        println!("Read modes:");
        for (label, count) in &modes {
            println!("  {:<20} {:>4}", label, count);
        }
        println!();
    }

    let op_counts = count_ops(program);

    println!("Op frequency:");
    let mut counts: Vec<_> = op_counts.iter().collect();
    counts.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));

    for (op, count) in counts.iter().take(10) {
        let pct = (**count as f64 / total_ops as f64) * 100.0;
        println!("  {:<14} {:>4} ({:>5.1}%)", op, count, pct);
    }
}

/// Distinct page numbers named by box operands, in ascending order.
fn referenced_pages(program: &Program) -> BTreeSet<u32> {
    program
        .instructions()
        .iter()
        .filter_map(|instruction| match instruction.operand {
            Operand::Box(b) => b.page(),
            _ => None,
        })
        .collect()
}

/// Box operands per read mode, labelled with the pdftotext flag they imply.
fn read_mode_usage(program: &Program) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
    for instruction in program.instructions() {
        if let Operand::Box(b) = instruction.operand {
            *counts.entry(b.mode()).or_insert(0) += 1;
        }
    }
    counts
        .into_iter()
        .map(|(mode, count)| (mode_label(mode), count))
        .collect()
}

fn mode_label(mode: u32) -> String {
    let Some(info) = ReadMode::from_raw(mode).map(ReadMode::info) else {
        return format!("mode{}", mode);
    };
    match info.pdftotext_flag {
        Some(flag) => format!("{} ({})", info.label, flag),
        None => info.label.to_string(),
    }
}

fn count_ops(program: &Program) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for instruction in program.instructions() {
        *counts.entry(instruction.tag.to_string()).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::ir::ProgramBuilder;
    use crate::bytecode::op::{CallDescriptor, JumpAddress, OpTag, Opcode, VarIndex};
    use pretty_assertions::assert_eq;

    fn sample() -> Program {
        let mut b = ProgramBuilder::new();
        let total = b.add_string("totale").unwrap();
        let fun = b.add_string("num").unwrap();
        b.push(Instruction::new(
            Opcode::RdBox,
            Operand::Box(BoxDescriptor::Rectangle {
                mode: 1,
                page: 0,
                x: 0.5,
                y: 0.25,
                w: 0.125,
                h: 0.0625,
            }),
        ));
        b.push(Instruction::new(Opcode::PushStr, Operand::Str(total)));
        b.push(Instruction::new(
            Opcode::Call,
            Operand::Call(CallDescriptor {
                name: fun,
                arg_count: 1,
            }),
        ));
        b.push(Instruction::new(
            Opcode::SelVarIdx,
            Operand::VarIndex(VarIndex {
                name: total,
                index: 2,
            }),
        ));
        b.push(Instruction::new(Opcode::Jmp, Operand::Jump(JumpAddress(5))));
        b.push(Instruction::bare(Opcode::Hlt));
        b.build()
    }

    #[test]
    fn test_disassemble_lines() {
        let output = disassemble_to_string(&sample());
        let lines: Vec<_> = output.lines().collect();

        assert_eq!(lines.len(), 7);
        assert!(lines[0].starts_with("0000   RDBOX       LAYOUT page=0 x=0.5"));
        assert!(lines[1].contains("PUSHSTR     \"totale\""));
        assert!(lines[1].ends_with("; ( 0 -- 1 )"));
        assert!(lines[2].contains("CALL        \"num\" args=1"));
        assert!(lines[2].ends_with("; ( 1 -- 1 )"));
        assert!(lines[3].contains("\"totale\"[2]"));
        assert!(lines[4].contains("JMP         0005 ↓"));
        assert!(lines[5].contains("┌"));
        assert_eq!(lines[6], "0005 ► HLT");
    }

    #[test]
    fn test_backward_jump_arrow() {
        let mut b = ProgramBuilder::new();
        b.push(Instruction::bare(Opcode::NextLine));
        b.push(Instruction::new(Opcode::Jte, Operand::Jump(JumpAddress(0))));
        let output = disassemble_to_string(&b.build());
        assert!(output.contains("JTE         0000 ↑"));
        assert!(output.starts_with("      ┌"));
    }

    #[test]
    fn test_unresolved_strings() {
        let mut b = ProgramBuilder::new();
        b.push(Instruction::new(Opcode::Error, Operand::Str(StringRef(4))));
        b.push(Instruction::new(Opcode::SelGlobal, Operand::Str(StringRef::ABSENT)));
        let output = disassemble_to_string(&b.build());
        assert!(output.contains("ERROR       #4 <out of range>"));
        assert!(output.contains("SELGLOBAL   <none>"));
    }

    #[test]
    fn test_unknown_opcode_listing() {
        let mut b = ProgramBuilder::new();
        b.push(Instruction {
            tag: OpTag::Unknown(0x70),
            operand: Operand::Empty,
        });
        assert_eq!(disassemble_to_string(&b.build()), "0000   OP_0x70\n");
    }

    #[test]
    fn test_op_counts() {
        let mut b = ProgramBuilder::new();
        for _ in 0..3 {
            b.push(Instruction::new(Opcode::PushInt, Operand::Narrow(1)));
        }
        b.push(Instruction::bare(Opcode::Add));
        b.push(Instruction::bare(Opcode::Add));

        let counts = count_ops(&b.build());
        assert_eq!(counts.get("PUSHINT"), Some(&3));
        assert_eq!(counts.get("ADD"), Some(&2));
        assert_eq!(counts.get("HLT"), None);
    }

    #[test]
    fn test_unknown_read_mode() {
        assert_eq!(format_mode(2), "RAW");
        assert_eq!(format_mode(9), "mode9");
    }

    #[test]
    fn test_read_mode_usage() {
        let mut b = ProgramBuilder::new();
        b.push(Instruction::new(
            Opcode::RdPage,
            Operand::Box(BoxDescriptor::Page { mode: 2, page: 4 }),
        ));
        b.push(Instruction::new(
            Opcode::RdFile,
            Operand::Box(BoxDescriptor::File { mode: 0 }),
        ));
        b.push(Instruction::new(
            Opcode::RdPage,
            Operand::Box(BoxDescriptor::Page { mode: 2, page: 1 }),
        ));
        b.push(Instruction::new(
            Opcode::RdFile,
            Operand::Box(BoxDescriptor::File { mode: 7 }),
        ));
        let program = b.build();

        assert_eq!(
            read_mode_usage(&program),
            vec![
                ("Default".to_string(), 1),
                ("Grezza (-raw)".to_string(), 2),
                ("mode7".to_string(), 1),
            ]
        );
        assert_eq!(
            referenced_pages(&program).into_iter().collect::<Vec<_>>(),
            vec![1, 4]
        );
    }

    #[test]
    fn test_rectangle_counts_toward_pages() {
        let program = sample();
        assert_eq!(read_mode_usage(&program), vec![("Layout (-layout)".to_string(), 1)]);
        assert_eq!(referenced_pages(&program).len(), 1);
    }
}
