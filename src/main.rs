// File: src/main.rs
//
// Main entry point for the loomscript VM. Handles command-line argument
// parsing and dispatches to the appropriate subcommand (run, asm-dump).

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser as ClapParser, Subcommand};
use colored::Colorize;

use loomscript::assembler;
use loomscript::vm::{Vm, VmConfig};

#[derive(ClapParser)]
#[command(
    name = "loom",
    about = "loomscript: a stack-based bytecode VM",
    version = env!("CARGO_PKG_VERSION"),
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
#[command(arg_required_else_help = true)]
enum Commands {
    /// Assemble and run a .lbc bootstrap file
    Run {
        /// Path to the .lbc file
        file: PathBuf,

        /// Print each dispatched instruction to stderr as it runs
        #[arg(long)]
        trace: bool,

        /// Operand stack capacity to pre-allocate
        #[arg(long, default_value_t = 256)]
        stack_capacity: usize,

        /// Maximum number of nested calls before raising an error
        #[arg(long, default_value_t = 1024)]
        max_call_depth: usize,
    },

    /// Assemble a .lbc file and print its parsed instruction stream
    AsmDump {
        /// Path to the .lbc file
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { file, trace, stack_capacity, max_call_depth } => {
            run(file, trace, stack_capacity, max_call_depth)
        }
        Commands::AsmDump { file } => asm_dump(file),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{}: {message}", "error".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn run(file: PathBuf, trace: bool, stack_capacity: usize, max_call_depth: usize) -> Result<(), String> {
    let source = fs::read_to_string(&file).map_err(|e| format!("failed to read {}: {e}", file.display()))?;
    let bootstrap = assembler::assemble(&source).map_err(|e| e.to_string())?;

    let config = VmConfig { stack_capacity, max_call_depth, trace };
    let mut vm = Vm::new(config);
    vm.run(bootstrap).map_err(|e| e.to_string())
}

fn asm_dump(file: PathBuf) -> Result<(), String> {
    let source = fs::read_to_string(&file).map_err(|e| format!("failed to read {}: {e}", file.display()))?;
    let bootstrap = assembler::assemble(&source).map_err(|e| e.to_string())?;
    for (i, instr) in bootstrap.instructions.iter().enumerate() {
        println!("{i:04} {:?}", instr.op);
    }
    Ok(())
}
