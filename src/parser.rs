use crate::lexer::Token;

/// The single redirection or pipe decision attached to a command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redirect {
    /// Plain command, standard streams are inherited.
    None,
    /// Input redirection (`<`): the file's contents are run as a new command line.
    ///
    /// An empty path means the operator had no operand.
    Input(String),
    /// Output redirection (`>`): standard output goes to a created or truncated file.
    ///
    /// An empty path means the operator had no operand.
    Output(String),
    /// Pipe (`|`): the argument vector is split into two commands at this index.
    Pipe(usize),
}

/// A fully parsed command line: its arguments plus exactly one [`Redirect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// Program name followed by its arguments. Operators and their operands are excluded.
    pub argv: Vec<String>,
    pub redirect: Redirect,
}

impl CommandLine {
    /// Returns the left and right halves of a piped command line.
    ///
    /// `None` for any redirect other than [`Redirect::Pipe`].
    pub fn pipeline_halves(&self) -> Option<(&[String], &[String])> {
        match self.redirect {
            Redirect::Pipe(at) => Some(self.argv.split_at(at.min(self.argv.len()))),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.argv.is_empty()
    }
}

struct CommandBuilder {
    tokens: std::vec::IntoIter<Token>,
    argv: Vec<String>,
    redirect: Redirect,
}

impl CommandBuilder {
    fn from(tokens: Vec<Token>) -> Self {
        CommandBuilder {
            tokens: tokens.into_iter(),
            argv: Vec::new(),
            redirect: Redirect::None,
        }
    }

    fn build(mut self) -> CommandLine {
        while let Some(token) = self.tokens.next() {
            match token {
                Token::RedirectRight if self.redirect == Redirect::None => {
                    self.redirect = Redirect::Output(self.operand());
                    break;
                }
                Token::RedirectLeft if self.redirect == Redirect::None => {
                    self.redirect = Redirect::Input(self.operand());
                    break;
                }
                Token::PipeOp if self.redirect == Redirect::None => {
                    self.redirect = Redirect::Pipe(self.argv.len());
                }
                // Only the first operator counts; later ones are ordinary words.
                other => self.argv.push(token_text(other)),
            }
        }

        CommandLine {
            argv: self.argv,
            redirect: self.redirect,
        }
    }

    /// Consumes the token following a redirection operator.
    fn operand(&mut self) -> String {
        self.tokens.next().map(token_text).unwrap_or_default()
    }
}

fn token_text(token: Token) -> String {
    match token {
        Token::Word(w) => w,
        Token::PipeOp => "|".to_string(),
        Token::RedirectLeft => "<".to_string(),
        Token::RedirectRight => ">".to_string(),
    }
}

/// Builds a [`CommandLine`] from the tokenizer's output.
///
/// Scanning is left to right. `>` and `<` take the next token as their path
/// and stop argument collection. `|` records its position and keeps
/// collecting, so the argument vector holds both pipeline halves with a gap
/// at the recorded index.
pub fn construct_command(tokens: Vec<Token>) -> CommandLine {
    CommandBuilder::from(tokens).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::split_into_tokens;

    fn parse(line: &str) -> CommandLine {
        construct_command(split_into_tokens(line))
    }

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_plain_command() {
        let cmd = parse("ls -la /tmp");
        assert_eq!(cmd.argv, args(&["ls", "-la", "/tmp"]));
        assert_eq!(cmd.redirect, Redirect::None);
        assert!(cmd.pipeline_halves().is_none());
    }

    #[test]
    fn test_output_redirect() {
        let cmd = parse("echo hi > out.txt");
        assert_eq!(cmd.argv, args(&["echo", "hi"]));
        assert_eq!(cmd.redirect, Redirect::Output("out.txt".to_string()));
    }

    #[test]
    fn test_redirect_stops_argument_collection() {
        let cmd = parse("echo hi > out.txt trailing words");
        assert_eq!(cmd.argv, args(&["echo", "hi"]));
        assert_eq!(cmd.redirect, Redirect::Output("out.txt".to_string()));
    }

    #[test]
    fn test_input_redirect() {
        let cmd = parse("wc -l < in.txt");
        assert_eq!(cmd.argv, args(&["wc", "-l"]));
        assert_eq!(cmd.redirect, Redirect::Input("in.txt".to_string()));
    }

    #[test]
    fn test_missing_operand_gives_empty_path() {
        assert_eq!(parse("echo hi >").redirect, Redirect::Output(String::new()));
        assert_eq!(parse("cat <").redirect, Redirect::Input(String::new()));
    }

    #[test]
    fn test_pipe_records_gap_and_keeps_collecting() {
        let cmd = parse("ls | wc -l");
        assert_eq!(cmd.argv, args(&["ls", "wc", "-l"]));
        assert_eq!(cmd.redirect, Redirect::Pipe(1));

        let (left, right) = cmd.pipeline_halves().unwrap();
        assert_eq!(left, &args(&["ls"])[..]);
        assert_eq!(right, &args(&["wc", "-l"])[..]);
    }

    #[test]
    fn test_pipe_with_missing_halves() {
        let cmd = parse("| wc");
        let (left, right) = cmd.pipeline_halves().unwrap();
        assert!(left.is_empty());
        assert_eq!(right, &args(&["wc"])[..]);

        let cmd = parse("ls |");
        let (left, right) = cmd.pipeline_halves().unwrap();
        assert_eq!(left, &args(&["ls"])[..]);
        assert!(right.is_empty());
    }

    #[test]
    fn test_first_operator_wins() {
        let cmd = parse("ls | wc > out");
        assert_eq!(cmd.redirect, Redirect::Pipe(1));
        assert_eq!(cmd.argv, args(&["ls", "wc", ">", "out"]));

        let cmd = parse("a | b | c");
        assert_eq!(cmd.redirect, Redirect::Pipe(1));
        assert_eq!(cmd.argv, args(&["a", "b", "|", "c"]));
    }

    #[test]
    fn test_empty_line() {
        let cmd = parse("");
        assert!(cmd.is_empty());
        assert_eq!(cmd.redirect, Redirect::None);
    }
}
