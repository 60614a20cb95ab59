use crate::parser::CommandLine;
use anyhow::{Context, Result};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::fs::File;
use std::io::{self, BufRead, Read, Write};
use std::process::Stdio;

/// Abstraction over a readable input stream that can also be converted into
/// a [`Stdio`] handle for spawning external processes.
pub trait Stdin: Read {
    /// Convert this input into a [`Stdio`] handle suitable for `std::process::Command`.
    fn stdio(self: Box<Self>) -> Stdio;
}

/// Abstraction over a writable output stream that can also be converted into
/// a [`Stdio`] handle for spawning external processes.
pub trait Stdout: Write {
    /// Convert this output into a [`Stdio`] handle suitable for `std::process::Command`.
    fn stdio(self: Box<Self>) -> Stdio;
}

impl Stdin for File {
    fn stdio(self: Box<Self>) -> Stdio {
        (*self).into()
    }
}

impl Stdout for File {
    fn stdio(self: Box<Self>) -> Stdio {
        (*self).into()
    }
}

/// The shell's own standard input, handed to children as-is.
struct InheritedStdin(io::Stdin);

impl Read for InheritedStdin {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl Stdin for InheritedStdin {
    fn stdio(self: Box<Self>) -> Stdio {
        Stdio::inherit()
    }
}

/// The shell's own standard output, handed to children as-is.
struct InheritedStdout(io::Stdout);

impl Write for InheritedStdout {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl Stdout for InheritedStdout {
    fn stdio(self: Box<Self>) -> Stdio {
        Stdio::inherit()
    }
}

/// Standard streams of a builtin, honouring the redirections of its stage.
pub struct BuiltinStreams {
    pub stdin: Box<dyn Stdin>,
    pub stdout: Box<dyn Stdout>,
}

impl BuiltinStreams {
    /// Opens `input_file` for reading and creates/truncates `output_file`,
    /// falling back to the shell's own streams.
    pub fn open(cl: &CommandLine) -> Result<Self> {
        let stdin: Box<dyn Stdin> = match &cl.input_file {
            Some(path) => Box::new(File::open(path).with_context(|| format!("{path}"))?),
            None => Box::new(InheritedStdin(io::stdin())),
        };
        let stdout: Box<dyn Stdout> = match &cl.output_file {
            Some(path) => Box::new(File::create(path).with_context(|| format!("{path}"))?),
            None => Box::new(InheritedStdout(io::stdout())),
        };
        Ok(Self { stdin, stdout })
    }
}

/// Provider of successive input lines.
///
/// `Ok(None)` signals end of input, which is distinct from an empty line.
pub trait LineSource {
    fn next_line(&mut self) -> Result<Option<String>>;
}

/// Reads lines from any buffered reader without prompting: scripts, pipes,
/// `-c` strings.
pub struct ReaderSource<R> {
    reader: R,
}

impl<R: BufRead> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: BufRead> LineSource for ReaderSource<R> {
    fn next_line(&mut self) -> Result<Option<String>> {
        let mut buf = Vec::new();
        if self.reader.read_until(b'\n', &mut buf).context("reading input")? == 0 {
            return Ok(None);
        }
        // invalid UTF-8 is replaced with U+FFFD
        let line = String::from_utf8_lossy(&buf);
        Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
    }
}

/// Interactive terminal input with line editing and in-memory history.
///
/// The prompt shows the current directory, e.g. `teamshell:/tmp> `.
pub struct InteractiveSource {
    editor: DefaultEditor,
    prompt_name: String,
}

impl InteractiveSource {
    pub fn new(prompt_name: impl Into<String>) -> Result<Self> {
        Ok(Self {
            editor: DefaultEditor::new().context("initialising line editor")?,
            prompt_name: prompt_name.into(),
        })
    }

    fn prompt(&self) -> String {
        let cwd = std::env::current_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        format!("{}:{}> ", self.prompt_name, cwd)
    }
}

impl LineSource for InteractiveSource {
    fn next_line(&mut self) -> Result<Option<String>> {
        match self.editor.readline(&self.prompt()) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    self.editor
                        .add_history_entry(line.as_str())
                        .context("recording history")?;
                }
                Ok(Some(line))
            }
            // Ctrl-C at the prompt discards the line
            Err(ReadlineError::Interrupted) => Ok(Some(String::new())),
            Err(ReadlineError::Eof) => Ok(None),
            Err(err) => Err(err).context("reading input"),
        }
    }
}
