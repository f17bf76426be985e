//! Interactive session: lines are appended to one growing source buffer and
//! compiled incrementally into the same VM, so bindings persist between
//! lines. A line that fails to compile or throws uncaught is rolled back as
//! if it were never entered.

use miette::{IntoDiagnostic, miette};
use nu_ansi_term::Color;
use quill::lexer::Token;
use quill::{Value, Vm, compile, disassemble, stdlib};
use reedline::{DefaultPrompt, DefaultPromptSegment, FileBackedHistory, Reedline, Signal};

fn history_path() -> Option<std::path::PathBuf> {
    dirs::data_dir().map(|dir| dir.join("quill").join("history.txt"))
}

pub fn run() -> miette::Result<()> {
    let mut editor = Reedline::create();
    if let Some(path) = history_path() {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Ok(history) = FileBackedHistory::with_file(200, path) {
            editor = editor.with_history(Box::new(history));
        }
    }
    let prompt = DefaultPrompt::new(
        DefaultPromptSegment::Basic("quill".to_string()),
        DefaultPromptSegment::Empty,
    );

    let mut vm = Vm::new();
    stdlib::install(&mut vm).map_err(|_| miette!("standard library installation failed"))?;
    let mut source = String::new();
    let mut token = Token::default();

    println!("Quill REPL. Type '/?' for more information.");
    loop {
        let line = match editor.read_line(&prompt).into_diagnostic()? {
            Signal::Success(line) => line,
            Signal::CtrlC => continue,
            Signal::CtrlD => return Ok(()),
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(command) = trimmed.strip_prefix('/') {
            match command {
                "?" => {
                    println!("Enter script statements or one of:");
                    println!("  /?   show this help");
                    println!("  /d   dump VM state");
                    println!("  /q   quit");
                    println!("  /u   disassemble the session bytecode");
                }
                "d" => print!("{}", vm.dump_state()),
                "q" => {
                    println!("Bye.");
                    return Ok(());
                }
                "u" => print!("{}", disassemble(vm.program())),
                other => println!("Unknown command \"/{other}\""),
            }
            continue;
        }

        // snapshot for rollback; a failed line must leave no trace, or the
        // next line would resume inside its leftovers
        let source_len = source.len();
        let token_backup = token;
        let code_len = vm.program().len();
        let xref_len = vm.program().xref().len();
        let pc = vm.pc();

        source.push_str(&line);
        source.push('\n');

        let mut rollback = false;
        match compile(&source, &mut token, vm.program_mut()) {
            Ok(()) => match vm.run() {
                Ok(Value::Null) => {}
                Ok(value) => println!("{}", vm.display_value(value)),
                Err(error) => {
                    println!(
                        "{} {}",
                        Color::Red.paint("Runtime Error:"),
                        vm.display_value(error)
                    );
                    rollback = true;
                }
            },
            Err(error) => {
                println!("{} {error}", Color::Red.paint("Compile Error:"));
                rollback = true;
            }
        }
        if rollback {
            source.truncate(source_len);
            token = token_backup;
            vm.program_mut().truncate(code_len, xref_len);
            vm.set_pc(pc);
        }
    }
}
