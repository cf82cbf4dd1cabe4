// src/main.rs

use clap::Parser;
use pascalc::diagnostics::{codes, DiagnosticBag};
use pascalc::driver::{CompileOptions, Compiler};
use std::fs;
use std::path::PathBuf;
use std::process::{self, Command};

/// An LLVM-based compiler for a Pascal dialect.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Source file to compile.
    #[arg(required_unless_present = "explain")]
    input_file: Option<PathBuf>,

    /// Output path. Defaults to the input's stem (`hello.pas` -> `hello`).
    #[arg(short, long)]
    output_file: Option<PathBuf>,

    /// Write LLVM IR instead of an executable.
    #[arg(long, short = 'S')]
    emit_llvm: bool,

    /// Optimization level handed to clang.
    #[arg(short = 'O', default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=3))]
    opt_level: u8,

    /// Predefine a conditional symbol for `{$ifdef}`.
    #[arg(short = 'D', value_name = "SYMBOL")]
    defines: Vec<String>,

    /// Add a directory to the `uses` search path.
    #[arg(short = 'I', value_name = "DIR")]
    include: Vec<PathBuf>,

    /// Log compiler phases (same as RUST_LOG=debug).
    #[arg(short, long)]
    verbose: bool,

    /// Print the long explanation of a diagnostic code and exit.
    #[arg(long, value_name = "CODE")]
    explain: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    if let Some(code) = &cli.explain {
        return match codes::lookup(code) {
            Some(entry) => {
                println!("{}: {}\n\n{}", entry.code, entry.title, entry.explanation);
                Ok(())
            }
            None => Err(format!("no explanation for `{}`", code).into()),
        };
    }

    let Some(input_path) = cli.input_file else {
        return Err("no input file".into());
    };
    let output_path = match cli.output_file {
        Some(path) => path,
        None => input_path
            .file_stem()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("a.out")),
    };

    let options = CompileOptions { defines: cli.defines, search_paths: cli.include };
    let mut compiler = Compiler::new(options);
    let result = compiler.compile_file(&input_path);

    let mut diagnostics = DiagnosticBag::new();
    for (file, text) in compiler.sources() {
        diagnostics.add_source(file.clone(), text.clone());
    }
    for note in compiler.notes() {
        diagnostics.report(note.clone());
    }

    let llvm_ir = match result {
        Ok(ir) => {
            diagnostics.print();
            ir
        }
        Err(errors) => {
            eprintln!("Compilation of '{}' failed with {} error(s).", input_path.display(), errors.len());
            diagnostics.extend_errors(&errors);
            diagnostics.print();
            process::exit(1);
        }
    };

    if cli.emit_llvm {
        fs::write(&output_path, llvm_ir)?;
        println!("Generated LLVM IR at '{}'", output_path.display());
        return Ok(());
    }

    let ll_file = tempfile::Builder::new().suffix(".ll").tempfile()?;
    fs::write(ll_file.path(), llvm_ir)?;

    log::debug!("invoking clang -O{} on {}", cli.opt_level, ll_file.path().display());
    let clang_status = Command::new("clang")
        .arg(format!("-O{}", cli.opt_level))
        .arg(ll_file.path())
        .arg("-o")
        .arg(&output_path)
        .status()?;

    if !clang_status.success() {
        return Err(format!("clang failed with status: {}", clang_status).into());
    }

    println!("Compiled executable at '{}'", output_path.display());
    Ok(())
}
