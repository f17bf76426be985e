//! The `quill` binary: compile, run, or disassemble scripts, or drop into
//! the REPL when invoked with no arguments.

mod repl;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use miette::{IntoDiagnostic, miette};
use quill::lexer::Token;
use quill::{Program, Value, Vm, compile, disassemble, stdlib};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "quill",
    about = "The Quill scripting engine",
    after_help = "With no arguments, enters the REPL."
)]
struct Args {
    /// Compile only, writing bytecode (and xref) files
    #[arg(short = 'c', long = "compile", conflicts_with_all = ["run", "unassemble"])]
    compile: bool,

    /// Run source or bytecode (the default action)
    #[arg(short = 'r', long = "run")]
    run: bool,

    /// Show disassembly only
    #[arg(short = 'u', long = "unassemble", conflicts_with = "run")]
    unassemble: bool,

    /// Source files, concatenated in order
    #[arg(short = 's', long = "source", num_args = 1..)]
    source: Vec<PathBuf>,

    /// Bytecode file (output for --compile, input otherwise)
    #[arg(short = 'b', long = "bytecode")]
    bytecode: Option<PathBuf>,

    /// Cross-reference file (output for --compile, optional input otherwise)
    #[arg(short = 'x', long = "xref")]
    xref: Option<PathBuf>,
}

/// Read one source file, skipping a `#!` shebang line if present.
fn read_source_file(path: &Path) -> miette::Result<String> {
    let text = fs::read_to_string(path)
        .map_err(|e| miette!("Cannot open \"{}\": {e}", path.display()))?;
    if let Some(rest) = text.strip_prefix('#') {
        if !rest.starts_with('!') {
            return Err(miette!("No '!' after '#' in shebang of {}", path.display()));
        }
        return Ok(rest
            .split_once('\n')
            .map(|(_, body)| body.to_string())
            .unwrap_or_default());
    }
    Ok(text)
}

fn sibling_with_extension(source: &Path, extension: &str) -> PathBuf {
    source.with_extension(extension)
}

fn write_binary(vm: &Vm, source: &Path, bytecode: Option<&Path>, xref: Option<&Path>) -> miette::Result<()> {
    let bytecode_path =
        bytecode.map_or_else(|| sibling_with_extension(source, "bin"), Path::to_path_buf);
    fs::write(&bytecode_path, vm.program().code()).into_diagnostic()?;
    println!("Bytecode written to: {}", bytecode_path.display());

    let xref_path = xref.map_or_else(|| sibling_with_extension(source, "xref"), Path::to_path_buf);
    fs::write(&xref_path, vm.program().xref_bytes()).into_diagnostic()?;
    println!("Cross reference written to: {}", xref_path.display());
    Ok(())
}

fn main() -> ExitCode {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .try_init();

    let args = Args::parse();
    match run_cli(args) {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            ExitCode::FAILURE
        }
    }
}

fn run_cli(args: Args) -> miette::Result<ExitCode> {
    if !args.compile
        && !args.run
        && !args.unassemble
        && args.source.is_empty()
        && args.bytecode.is_none()
    {
        repl::run()?;
        return Ok(ExitCode::SUCCESS);
    }

    let mut vm = Vm::new();
    stdlib::install(&mut vm).map_err(|_| miette!("standard library installation failed"))?;

    if !args.source.is_empty() {
        let mut source = String::new();
        for path in &args.source {
            source.push_str(&read_source_file(path)?);
        }
        let mut token = Token::default();
        compile(&source, &mut token, vm.program_mut()).into_diagnostic()?;
        tracing::debug!(
            bytes = vm.program().len(),
            files = args.source.len(),
            "compiled"
        );
    }

    if args.compile {
        let Some(last) = args.source.last() else {
            return Err(miette!("Require source files"));
        };
        write_binary(&vm, last, args.bytecode.as_deref(), args.xref.as_deref())?;
        return Ok(ExitCode::SUCCESS);
    }

    if args.source.is_empty() {
        let Some(bytecode_path) = &args.bytecode else {
            return Err(miette!(
                "If no source files specified, bytecode file is required"
            ));
        };
        let code = fs::read(bytecode_path).into_diagnostic()?;
        let xref = match &args.xref {
            Some(path) => Program::xref_from_bytes(&fs::read(path).into_diagnostic()?),
            None => Vec::new(),
        };
        *vm.program_mut() = Program::from_parts(code, xref);
    }

    if args.unassemble {
        print!("{}", disassemble(vm.program()));
        return Ok(ExitCode::SUCCESS);
    }

    match vm.run() {
        Ok(Value::Number(n)) => Ok(ExitCode::from(n as i32 as u8)),
        Ok(Value::Boolean(b)) => Ok(if b { ExitCode::SUCCESS } else { ExitCode::FAILURE }),
        Ok(_) => Ok(ExitCode::SUCCESS),
        Err(error) => {
            eprintln!("Runtime Error: {}", vm.display_value(error));
            Ok(ExitCode::FAILURE)
        }
    }
}
