//! The execution unit handed from the factory to the driver.

use crate::job_control::JobControl;
use crate::parser::{CommandLine, Pipeline};
use crate::process;
use crate::registry::{BuiltinFn, BuiltinRegistry};
use anyhow::Result;
use log::debug;
use nix::unistd::Pid;
use std::fmt;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells and many command-line tools.
pub type ExitCode = i32;

/// How a command finished from the shell's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The command ran in the foreground and ended with this status.
    Exited(ExitCode),
    /// The command was detached; this is its process group.
    Detached(Pid),
}

impl Completion {
    /// Status to report to the caller. Detaching counts as success.
    pub fn code(self) -> ExitCode {
        match self {
            Completion::Exited(code) => code,
            Completion::Detached(_) => 0,
        }
    }
}

/// A single external program.
#[derive(Debug, Clone)]
pub struct SimpleCommand {
    line: CommandLine,
}

impl SimpleCommand {
    pub fn new(line: CommandLine) -> Self {
        Self { line }
    }

    pub fn line(&self) -> &CommandLine {
        &self.line
    }

    pub fn execute(&self, background: bool, jobs: &JobControl) -> Result<Completion> {
        process::launch(std::slice::from_ref(&self.line), background, jobs)
    }
}

/// Two or more external programs connected by pipes.
#[derive(Debug, Clone)]
pub struct PipelineCommand {
    stages: Vec<CommandLine>,
}

impl PipelineCommand {
    pub fn new(stages: Vec<CommandLine>) -> Self {
        Self { stages }
    }

    pub fn stages(&self) -> &[CommandLine] {
        &self.stages
    }

    pub fn execute(&self, background: bool, jobs: &JobControl) -> Result<Completion> {
        process::launch(&self.stages, background, jobs)
    }
}

/// A registry handler bound to the command line it will be called with.
#[derive(Clone)]
pub struct BuiltinCommand {
    handler: BuiltinFn,
    line: CommandLine,
}

impl BuiltinCommand {
    pub fn new(handler: BuiltinFn, line: CommandLine) -> Self {
        Self { handler, line }
    }

    pub fn line(&self) -> &CommandLine {
        &self.line
    }

    /// Runs the handler in-process. Builtins never detach.
    pub fn execute(&self) -> Completion {
        debug!("builtin {}", self.line.program());
        Completion::Exited((self.handler)(&self.line))
    }
}

impl fmt::Debug for BuiltinCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinCommand")
            .field("line", &self.line)
            .finish_non_exhaustive()
    }
}

/// Anything the driver can execute.
#[derive(Debug, Clone)]
pub enum Command {
    Simple(SimpleCommand),
    Pipeline(PipelineCommand),
    Builtin(BuiltinCommand),
}

impl Command {
    pub fn execute(&self, background: bool, jobs: &JobControl) -> Result<Completion> {
        match self {
            Command::Simple(cmd) => cmd.execute(background, jobs),
            Command::Pipeline(cmd) => cmd.execute(background, jobs),
            Command::Builtin(cmd) => Ok(cmd.execute()),
        }
    }
}

/// Chooses the [`Command`] variant for a parsed pipeline.
///
/// Only a single-stage pipeline may resolve to a builtin. Stages of a longer
/// pipeline always run as external programs, even when a builtin of the same
/// name exists.
pub struct CommandFactory<'a> {
    registry: &'a BuiltinRegistry,
}

impl<'a> CommandFactory<'a> {
    pub fn new(registry: &'a BuiltinRegistry) -> Self {
        Self { registry }
    }

    pub fn create(&self, pipeline: Pipeline) -> Command {
        let mut stages = pipeline.into_stages();
        if stages.len() > 1 {
            return Command::Pipeline(PipelineCommand::new(stages));
        }

        let line = stages.remove(0);
        match self.registry.lookup(line.program()) {
            Some(handler) => Command::Builtin(BuiltinCommand::new(handler, line)),
            None => Command::Simple(SimpleCommand::new(line)),
        }
    }
}

impl Default for CommandFactory<'static> {
    fn default() -> Self {
        Self::new(BuiltinRegistry::global())
    }
}
