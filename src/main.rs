use std::{fs, path::Path, process};

use argh::FromArgs;
use tracing_subscriber::EnvFilter;

use bls_bytecode::bytecode::{
    FormatSpec, Program, check_program, decode_with,
    disasm::{print_compact, print_program, print_stats},
    format::LEGACY_MAGIC,
};

/// Decode a compiled layout bytecode file and print its disassembly.
#[derive(FromArgs)]
struct Arguments {
    /// the bytecode file to read
    #[argh(positional)]
    file: String,

    /// JSON file describing field widths, byte order and header
    #[argh(option, short = 'f')]
    format: Option<String>,

    /// expect the legacy 4-byte magic header
    #[argh(switch)]
    magic: bool,

    /// reject opcodes that are not in the table
    #[argh(switch)]
    strict: bool,

    /// read multi-byte fields little-endian
    #[argh(switch)]
    little_endian: bool,

    /// print raw operands, one instruction per line
    #[argh(switch, short = 'c')]
    compact: bool,

    /// print opcode statistics instead of the listing
    #[argh(switch, short = 's')]
    stats: bool,

    /// validate string references, jump targets and stack effects
    #[argh(switch)]
    check: bool,

    /// write a postcard snapshot of the decoded program to this path
    #[argh(option)]
    snapshot: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("BLSDUMP_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let arguments: Arguments = argh::from_env();

    let spec = format_spec(&arguments);
    let program = load(&arguments.file, &spec);

    if arguments.check {
        if let Err(e) = check_program(&program) {
            eprintln!("Check failed: {}", e);
            process::exit(1);
        }
    }

    if arguments.stats {
        print_stats(&program);
    } else if arguments.compact {
        print_compact(&program);
    } else {
        print_program(&program);
    }

    if let Some(path) = &arguments.snapshot {
        write_snapshot(&program, Path::new(path));
    }
}

fn format_spec(arguments: &Arguments) -> FormatSpec {
    let mut spec = match &arguments.format {
        Some(path) => match FormatSpec::from_json_file(path) {
            Ok(spec) => spec,
            Err(e) => {
                eprintln!("Invalid format description: {}", e);
                process::exit(1);
            }
        },
        None => FormatSpec::default(),
    };

    if arguments.magic {
        spec = spec.with_magic(Some(LEGACY_MAGIC));
    }
    if arguments.strict {
        spec = spec.strict();
    }
    if arguments.little_endian {
        spec = spec.little_endian();
    }
    spec
}

fn load(filename: &str, spec: &FormatSpec) -> Program {
    let file = match fs::File::open(filename) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Failed to read '{}': {}", filename, e);
            process::exit(1);
        }
    };

    match decode_with(std::io::BufReader::new(file), spec) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("{}: {}", filename, e);
            process::exit(1);
        }
    }
}

fn write_snapshot(program: &Program, path: &Path) {
    let bytes = match program.to_postcard() {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Snapshot error: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = fs::write(path, bytes) {
        eprintln!("Failed to write '{}': {}", path.display(), e);
        process::exit(1);
    }
}
