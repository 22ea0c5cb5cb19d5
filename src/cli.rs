//! The `upp` command line: check, build and run `.upp` files.
//!
//! Exit status: `0` on success, `1` on compile errors or IO failures;
//! `run` exits with the VM's wire exit code.

use std::path::PathBuf;
use std::process::exit;

use clap::{Parser, Subcommand};
use upp_base::identifier_pool;
use upp_compile::{collect_diagnostics, Compilation, Compiler, StdHost};
use upp_source::SourceCode;

#[derive(Parser)]
#[command(name = "upp", version, about = "Compiler and VM for the Upp language")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse and analyse without building bytecode.
    Check {
        file: PathBuf,
        /// Emit diagnostics as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Compile to bytecode.
    Build {
        file: PathBuf,
        #[arg(long)]
        json: bool,
        /// Print the generated instruction list.
        #[arg(long)]
        disassemble: bool,
    },
    /// Compile and execute; the process exits with the VM's exit code.
    Run {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

pub fn run() -> i32 {
    let cli = Cli::parse();
    match cli.command {
        Command::Check { file, json } => {
            let (code, compilation) = match compile(&file, false) {
                Ok(result) => result,
                Err(status) => return status,
            };
            report(&code, &compilation, json);
            if compilation.is_clean() {
                0
            } else {
                1
            }
        }
        Command::Build {
            file,
            json,
            disassemble,
        } => {
            let (code, compilation) = match compile(&file, true) {
                Ok(result) => result,
                Err(status) => return status,
            };
            report(&code, &compilation, json);
            if !compilation.is_clean() {
                return 1;
            }
            if disassemble {
                if let Some(program) = &compilation.program {
                    let mut out = String::new();
                    program.append_to_string(&mut out);
                    print!("{out}");
                }
            }
            0
        }
        Command::Run { file, json } => {
            let (code, compilation) = match compile(&file, true) {
                Ok(result) => result,
                Err(status) => return status,
            };
            report(&code, &compilation, json);
            let Some(program) = &compilation.program else {
                return 1;
            };
            let mut host = StdHost;
            let exit_code = Compiler::execute(program, &mut host);
            exit(exit_code.code());
        }
    }
}

fn compile(file: &PathBuf, build: bool) -> Result<(SourceCode, Compilation), i32> {
    let text = match std::fs::read_to_string(file) {
        Ok(text) => text,
        Err(error) => {
            eprintln!("error: cannot read {}: {error}", file.display());
            return Err(1);
        }
    };
    let mut code = SourceCode::from_text(&text, identifier_pool());
    let compilation = Compiler::compile(&mut code, build);
    Ok((code, compilation))
}

fn report(code: &SourceCode, compilation: &Compilation, json: bool) {
    let diagnostics = collect_diagnostics(code, compilation);
    if json {
        match serde_json::to_string_pretty(&diagnostics) {
            Ok(rendered) => println!("{rendered}"),
            Err(error) => eprintln!("error: cannot serialise diagnostics: {error}"),
        }
        return;
    }
    for diagnostic in &diagnostics {
        eprintln!("{}", diagnostic.display_line());
    }
}
