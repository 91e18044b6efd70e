use std::{
    io::{stdin, stdout, Write},
    path::PathBuf,
    process::ExitCode,
};

use clap::Parser;

use interpreter::{InterpretError, Interpreter};

#[derive(clap::Parser)]
struct Args {
    file: Option<PathBuf>,
}

const EXIT_COMPILE_ERROR: u8 = 65;
const EXIT_RUNTIME_ERROR: u8 = 70;
const EXIT_IO_ERROR: u8 = 74;

fn run_file(path: PathBuf, interpreter: &mut Interpreter) -> ExitCode {
    let source = match std::fs::read_to_string(&path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("could not read {}: {}", path.display(), e);
            return ExitCode::from(EXIT_IO_ERROR);
        }
    };

    match interpreter.run_source(&source) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}

fn exit_code(error: &InterpretError) -> u8 {
    match error {
        e if e.is_compile_error() => EXIT_COMPILE_ERROR,
        InterpretError::Internal(_) => EXIT_IO_ERROR,
        _ => EXIT_RUNTIME_ERROR,
    }
}

fn run_prompt(interpreter: &mut Interpreter) -> anyhow::Result<()> {
    loop {
        print!("> ");
        stdout().flush()?;
        let mut line = String::new();
        if stdin().read_line(&mut line)? == 0 {
            println!();
            return Ok(());
        }
        if let Err(e) = interpreter.run_source(&line) {
            println!("{}", e);
        }
    }
}

fn main() -> anyhow::Result<ExitCode> {
    env_logger::init();
    let args = Args::parse();

    let mut interpreter = Interpreter::default();

    match args.file {
        Some(file) => {
            log::debug!("Running {}", file.display());
            Ok(run_file(file, &mut interpreter))
        }
        None => {
            run_prompt(&mut interpreter)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
