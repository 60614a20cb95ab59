use crate::lexer::{self, Token};

/// Parsed form of a single pipeline stage.
///
/// This is what every downstream piece consumes: the command factory, the
/// process orchestrator and builtin handlers. `argv[0]` is the program name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandLine {
    /// Program name followed by its arguments.
    pub argv: Vec<String>,
    /// Whether `&` appeared in this stage.
    pub background: bool,
    /// File to attach to standard input (`< file`).
    pub input_file: Option<String>,
    /// File to create/truncate and attach to standard output (`> file`).
    pub output_file: Option<String>,
}

impl CommandLine {
    /// Convenience constructor for a foreground command without redirections.
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// The program name, i.e. `argv[0]`.
    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }

    /// Everything after the program name.
    pub fn args(&self) -> &[String] {
        self.argv.get(1..).unwrap_or_default()
    }
}

/// An ordered, non-empty sequence of stages connected by pipes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    stages: Vec<CommandLine>,
}

impl Pipeline {
    /// Wraps already parsed stages. Returns `None` for an empty sequence.
    pub fn new(stages: Vec<CommandLine>) -> Option<Self> {
        if stages.is_empty() {
            None
        } else {
            Some(Self { stages })
        }
    }

    pub fn stages(&self) -> &[CommandLine] {
        &self.stages
    }

    pub fn stages_mut(&mut self) -> &mut [CommandLine] {
        &mut self.stages
    }

    pub fn into_stages(self) -> Vec<CommandLine> {
        self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// A pipeline runs detached if any one of its stages asked for it.
    pub fn background(&self) -> bool {
        self.stages.iter().any(|stage| stage.background)
    }
}

/// Builds a [`CommandLine`] out of one stage's text.
///
/// Redirection targets overwrite earlier ones, so the last `<` and the last `>`
/// win. An empty target clears the redirection. Returns `None` when the stage
/// has no words at all, e.g. a lone `&` or `> out`.
pub fn parse_stage(stage: &str) -> Option<CommandLine> {
    let mut cl = CommandLine::default();

    for token in lexer::tokenize_stage(stage) {
        match token {
            Token::Word(word) => cl.argv.push(word),
            Token::Background => cl.background = true,
            Token::RedirectLeft(target) => cl.input_file = non_empty(target),
            Token::RedirectRight(target) => cl.output_file = non_empty(target),
        }
    }

    if cl.argv.is_empty() { None } else { Some(cl) }
}

fn non_empty(target: String) -> Option<String> {
    if target.is_empty() { None } else { Some(target) }
}

/// Splits and parses a whole input line.
///
/// Returns `None` for lines with nothing to run.
pub fn parse_line(line: &str) -> Option<Pipeline> {
    let stages = lexer::split_pipeline(line)
        .iter()
        .filter_map(|stage| parse_stage(stage))
        .collect();
    Pipeline::new(stages)
}
