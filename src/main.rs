use anyhow::{Context, Result};
use argh::FromArgs;
use env_logger::Env;
use std::fs::File;
use std::io::{self, BufReader, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;
use teamshell::Interpreter;
use teamshell::io_adapters::{InteractiveSource, ReaderSource};
use teamshell::job_control::install_signal_forwarding;

#[derive(FromArgs)]
/// A small shell with pipelines, redirections and background jobs.
struct Args {
    #[argh(option, short = 'c')]
    /// run a single command line and exit with its status
    command: Option<String>,

    #[argh(option, default = "String::from(\"teamshell\")")]
    /// prefix of the interactive prompt
    prompt: String,

    #[argh(positional)]
    /// script to read commands from instead of standard input
    script: Option<PathBuf>,
}

fn run(args: Args) -> Result<i32> {
    install_signal_forwarding()?;
    let mut shell = Interpreter::default();

    if let Some(line) = args.command {
        return shell.run(&mut ReaderSource::new(line.as_bytes()));
    }
    if let Some(path) = args.script {
        let file = File::open(&path).with_context(|| format!("{}", path.display()))?;
        return shell.run(&mut ReaderSource::new(BufReader::new(file)));
    }
    if io::stdin().is_terminal() {
        shell.run(&mut InteractiveSource::new(args.prompt)?)
    } else {
        shell.run(&mut ReaderSource::new(io::stdin().lock()))
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().filter_or("TEAMSHELL_LOG", "warn")).init();
    let args: Args = argh::from_env();

    match run(args) {
        Ok(code) => ExitCode::from((code & 0xff) as u8),
        Err(e) => {
            eprintln!("teamshell: {e:#}");
            ExitCode::FAILURE
        }
    }
}
