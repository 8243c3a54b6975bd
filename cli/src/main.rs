use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use loom_core::driver;
use loom_core::errors::Error;
use nu_ansi_term::Color;
use reedline::{DefaultPrompt, DefaultPromptSegment, FileBackedHistory, Reedline, Signal};

/// loom - a small dynamically-typed scripting language
#[derive(Parser, Debug)]
#[command(name = "loom")]
struct Args {
    /// Script to execute. If omitted, starts a line-oriented REPL.
    script: Option<PathBuf>,
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).with_target(false).init();
}

fn report(err: Error) {
    let report: miette::Report = err.into();
    eprintln!("{report:?}");
}

fn run_file(path: &PathBuf) -> ExitCode {
    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{}", Color::Red.paint(format!("couldn't read {}: {e}", path.display())));
            return ExitCode::FAILURE;
        }
    };
    match driver::run(&source) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            report(err);
            ExitCode::FAILURE
        }
    }
}

/// A history file under the user's data directory, so REPL history
/// survives across sessions the way the example CLI this is built from
/// keeps its own.
fn history_path() -> Option<PathBuf> {
    let mut dir = dirs::data_dir()?;
    dir.push("loom");
    std::fs::create_dir_all(&dir).ok()?;
    dir.push("history.txt");
    Some(dir)
}

fn run_repl() -> ExitCode {
    let mut editor = match history_path().and_then(|path| FileBackedHistory::with_file(1000, path).ok()) {
        Some(history) => Reedline::create().with_history(Box::new(history)),
        None => Reedline::create(),
    };
    let prompt = DefaultPrompt::new(
        DefaultPromptSegment::Basic("loom> ".to_string()),
        DefaultPromptSegment::Empty,
    );

    loop {
        match editor.read_line(&prompt) {
            Ok(Signal::Success(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match driver::run(&line) {
                    Ok(value) => println!("{}", Color::Green.paint(value.to_string())),
                    Err(err) => report(err),
                }
            }
            Ok(Signal::CtrlD) | Ok(Signal::CtrlC) => return ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("{}", Color::Red.paint(format!("line editor error: {e}")));
                return ExitCode::FAILURE;
            }
        }
    }
}

fn main() -> ExitCode {
    init_logging();
    let args = Args::parse();
    match args.script {
        Some(path) => run_file(&path),
        None => run_repl(),
    }
}
