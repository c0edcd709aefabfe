use argh::FromArgs;

pub const DEFAULT_PROMPT: &str = "osh> ";
/// Longest accepted input line, counting the line terminator.
pub const DEFAULT_MAX_LINE: usize = 80;

#[derive(FromArgs, Debug)]
/// Interactive shell with output/input redirection, a single pipe, `&` and `!!`.
pub struct Args {
    #[argh(option, default = "DEFAULT_PROMPT.to_string()")]
    /// prompt printed before each input line.
    pub prompt: String,

    #[argh(option, default = "DEFAULT_MAX_LINE")]
    /// maximum accepted line length, counting the line terminator.
    pub max_line: usize,

    #[argh(switch)]
    /// terminate the shell when a process or a pipe cannot be created.
    pub strict: bool,
}

/// Settings a [`Session`](crate::Session) runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub prompt: String,
    pub max_line_len: usize,
    /// Process and pipe creation failures end the session with their exit code.
    pub strict: bool,
}

impl Config {
    /// Longest line content accepted, i.e. without the terminator.
    pub fn max_content_len(&self) -> usize {
        self.max_line_len.saturating_sub(1)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_string(),
            max_line_len: DEFAULT_MAX_LINE,
            strict: false,
        }
    }
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            prompt: args.prompt,
            max_line_len: args.max_line,
            strict: args.strict,
        }
    }
}
