//! Lexical analysis for the shell: splitting a line into pipeline stages and
//! breaking a single stage into tokens.
//!
//! Quoting is deliberately simple. A quote opens with `"` or `'` and runs to the
//! next occurrence of the same character; there is no nesting and no escape
//! processing. An unterminated quote is not an error, it just swallows the rest
//! of the input.

/// Represents a token resulting from lexical analysis of one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A literal word destined for `argv`. Never empty.
    Word(String),
    /// The background marker, `&`.
    Background,
    /// Input redirection `<` together with its target. The target may be empty
    /// when nothing usable follows the operator.
    RedirectLeft(String),
    /// Output redirection `>` together with its target.
    RedirectRight(String),
}

fn is_quote(ch: char) -> bool {
    ch == '"' || ch == '\''
}

/// Splits a line into pipeline stages at unquoted `|` characters.
///
/// `||` is kept as part of the current stage and never splits. Each stage is
/// trimmed and stages that trim to nothing are dropped, so a blank line yields
/// an empty vector.
pub fn split_pipeline(line: &str) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    let mut stages = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut pos = 0;

    while pos < chars.len() {
        let ch = chars[pos];
        pos += 1;

        if let Some(q) = quote {
            if ch == q {
                quote = None;
            }
            current.push(ch);
            continue;
        }

        match ch {
            c if is_quote(c) => {
                quote = Some(c);
                current.push(c);
            }
            '|' if chars.get(pos) == Some(&'|') => {
                // logical-or: both characters stay in the stage
                current.push_str("||");
                pos += 1;
            }
            '|' => push_stage(&mut stages, std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    push_stage(&mut stages, current);

    stages
}

fn push_stage(stages: &mut Vec<String>, raw: String) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        stages.push(trimmed.to_string());
    }
}

struct StageScanner {
    input: Vec<char>,
    pos: usize,
}

impl StageScanner {
    fn new(stage: &str) -> Self {
        StageScanner {
            input: stage.chars().collect(),
            pos: 0,
        }
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    /// Reads one quoted or bare token starting at the current position.
    fn read_token(&mut self) -> String {
        match self.peek_char() {
            Some(q) if is_quote(q) => {
                self.read_char();
                let mut token = String::new();
                while let Some(ch) = self.read_char() {
                    if ch == q {
                        break;
                    }
                    token.push(ch);
                }
                token
            }
            _ => {
                let mut token = String::new();
                while let Some(ch) = self.peek_char() {
                    if ch.is_whitespace() || matches!(ch, '<' | '>' | '&') {
                        break;
                    }
                    token.push(ch);
                    self.pos += 1;
                }
                token
            }
        }
    }

    /// Reads the target of a redirection operator that was just consumed.
    ///
    /// Returns `None` when the operator is the last thing in the stage, which
    /// ends tokenization.
    fn read_redirect_target(&mut self) -> Option<String> {
        self.skip_whitespace();
        self.peek_char()?;
        Some(self.read_token())
    }

    fn make_tokens(mut self) -> Vec<Token> {
        let mut out = Vec::new();

        loop {
            self.skip_whitespace();
            let Some(ch) = self.peek_char() else { break };

            match ch {
                '&' => {
                    self.read_char();
                    out.push(Token::Background);
                }
                '<' => {
                    self.read_char();
                    match self.read_redirect_target() {
                        Some(target) => out.push(Token::RedirectLeft(target)),
                        None => break,
                    }
                }
                '>' => {
                    self.read_char();
                    match self.read_redirect_target() {
                        Some(target) => out.push(Token::RedirectRight(target)),
                        None => break,
                    }
                }
                _ => {
                    let word = self.read_token();
                    if !word.is_empty() {
                        out.push(Token::Word(word));
                    }
                }
            }
        }

        out
    }
}

/// Breaks one pipeline stage into tokens.
///
/// At every position the recognised forms are, in priority order: `&`, `<`
/// followed by a target, `>` followed by a target, a quoted word, and a bare
/// word running up to whitespace or one of `< > &`. Quoted words keep every
/// character between the quotes literally, including operators and spaces.
pub fn tokenize_stage(stage: &str) -> Vec<Token> {
    StageScanner::new(stage).make_tokens()
}
