use crate::command::{CommandFactory, Completion, ExitCode};
use crate::expand::expand_arguments;
use crate::io_adapters::{BuiltinStreams, LineSource};
use crate::job_control::JobControl;
use crate::parser::{self, CommandLine};
use crate::process::SHELL_NAME;
use crate::registry::BuiltinRegistry;
use anyhow::{Context, Result};
use log::debug;
use nix::unistd::Pid;
use std::env;
use std::io::Write;
use std::path::PathBuf;

/// What the read loop should do after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading; the line finished with this status.
    Continue(ExitCode),
    /// `exit` was entered.
    Exit,
}

/// The shell driver: turns input lines into executed commands.
///
/// `exit`, `cd` and `pwd` change or report the state of the shell process
/// itself, so they are handled here for single-stage lines and never reach
/// the registry. Everything else goes through the [`CommandFactory`].
///
/// Example
/// ```no_run
/// use teamshell::Interpreter;
/// use teamshell::io_adapters::ReaderSource;
///
/// let mut sh = Interpreter::default();
/// let mut script = ReaderSource::new("ls -l | sort\n".as_bytes());
/// let status = sh.run(&mut script).unwrap();
/// assert_eq!(status, 0);
/// ```
pub struct Interpreter<'r> {
    jobs: JobControl,
    registry: &'r BuiltinRegistry,
    last_status: ExitCode,
}

impl<'r> Interpreter<'r> {
    pub fn new(jobs: JobControl, registry: &'r BuiltinRegistry) -> Self {
        Self {
            jobs,
            registry,
            last_status: 0,
        }
    }

    pub fn jobs(&self) -> &JobControl {
        &self.jobs
    }

    /// Status of the most recent line that ran something.
    pub fn last_status(&self) -> ExitCode {
        self.last_status
    }

    /// Reads and executes lines until `exit` or end of input.
    ///
    /// Returns 0 after `exit`, otherwise the status of the last line.
    pub fn run(&mut self, source: &mut dyn LineSource) -> Result<ExitCode> {
        loop {
            self.report_finished_jobs();
            let Some(line) = source.next_line()? else {
                return Ok(self.last_status);
            };
            match self.handle_line(&line) {
                Flow::Exit => return Ok(0),
                Flow::Continue(code) => self.last_status = code,
            }
        }
    }

    /// Executes one line. Errors are reported on standard error and turn
    /// into status 1.
    pub fn handle_line(&mut self, line: &str) -> Flow {
        match self.dispatch(line) {
            Ok(flow) => flow,
            Err(e) => {
                eprintln!("{SHELL_NAME}: {e:#}");
                Flow::Continue(1)
            }
        }
    }

    /// Prints `[Done] <pgid>` for background groups that have finished.
    pub fn report_finished_jobs(&self) -> Vec<Pid> {
        let finished = self.jobs.reap_background();
        for pgid in &finished {
            println!("[Done] {pgid}");
        }
        finished
    }

    fn dispatch(&mut self, line: &str) -> Result<Flow> {
        let Some(mut pipeline) = parser::parse_line(line) else {
            return Ok(Flow::Continue(self.last_status));
        };
        for stage in pipeline.stages_mut() {
            expand_arguments(stage);
        }
        let background = pipeline.background();
        debug!(
            "{} stage(s), background={background}: {:?}",
            pipeline.len(),
            pipeline.stages()
        );

        if let [stage] = pipeline.stages() {
            if let Some(flow) = self.special_command(stage)? {
                return Ok(flow);
            }
        }

        let command = CommandFactory::new(self.registry).create(pipeline);
        match command.execute(background, &self.jobs)? {
            Completion::Exited(code) => Ok(Flow::Continue(code)),
            Completion::Detached(pgid) => {
                println!("[Background] {pgid}");
                Ok(Flow::Continue(0))
            }
        }
    }

    fn special_command(&mut self, cl: &CommandLine) -> Result<Option<Flow>> {
        let flow = match cl.program() {
            "exit" => Flow::Exit,
            "cd" => {
                change_dir(cl.args().first().map(String::as_str))?;
                Flow::Continue(0)
            }
            "pwd" => {
                let cwd = env::current_dir().context("pwd")?;
                let mut streams = BuiltinStreams::open(cl).context("pwd")?;
                writeln!(streams.stdout, "{}", cwd.display())?;
                streams.stdout.flush()?;
                Flow::Continue(0)
            }
            _ => return Ok(None),
        };
        Ok(Some(flow))
    }
}

impl Default for Interpreter<'static> {
    /// Driver bound to the signal-forwarding foreground group and the
    /// builtins shipped with the shell.
    fn default() -> Self {
        Self::new(JobControl::default(), BuiltinRegistry::global())
    }
}

/// `cd` without an operand goes to `$HOME`, or `/` when it is unset.
fn change_dir(target: Option<&str>) -> Result<()> {
    let target = match target {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => env::var_os("HOME")
            .filter(|home| !home.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/")),
    };
    env::set_current_dir(&target).with_context(|| format!("cd: {}", target.display()))?;
    debug!("cwd is now {}", target.display());
    Ok(())
}
