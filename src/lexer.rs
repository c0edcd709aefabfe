//! A module implementing lexical analysis (tokenization) of a single command line.

/// Represents a token resulting from lexical analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Any run of non-delimiter characters that is not an operator.
    Word(String),
    /// The pipe operator, `|`.
    PipeOp,
    /// Input redirection symbol, `<`.
    RedirectLeft,
    /// Output redirection symbol, `>`.
    RedirectRight,
}

impl Token {
    fn classify(word: String) -> Token {
        match word.as_str() {
            "|" => Token::PipeOp,
            "<" => Token::RedirectLeft,
            ">" => Token::RedirectRight,
            _ => Token::Word(word),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Start,
    ReadingWord,
}

struct LexingFSM<'a> {
    input: std::str::Chars<'a>,
    state: LexingState,
    buffer: String,
}

impl<'a> LexingFSM<'a> {
    fn new(line: &'a str) -> Self {
        LexingFSM {
            input: line.chars(),
            state: LexingState::Start,
            buffer: String::new(),
        }
    }

    /// Walks the input once, emitting a token every time a word is closed by a
    /// delimiter or by the end of input.
    fn make_tokens(mut self) -> Vec<Token> {
        let mut out = Vec::new();

        while let Some(ch) = self.input.next() {
            match (self.state, is_delimiter(ch)) {
                (LexingState::Start, true) => {}
                (LexingState::Start, false) => {
                    self.buffer.push(ch);
                    self.state = LexingState::ReadingWord;
                }
                (LexingState::ReadingWord, true) => {
                    self.finish_word(&mut out);
                    self.state = LexingState::Start;
                }
                (LexingState::ReadingWord, false) => self.buffer.push(ch),
            }
        }

        self.finish_word(&mut out);
        out
    }

    fn finish_word(&mut self, out: &mut Vec<Token>) {
        if !self.buffer.is_empty() {
            out.push(Token::classify(std::mem::take(&mut self.buffer)));
        }
    }
}

fn is_delimiter(ch: char) -> bool {
    matches!(ch, ' ' | '\t')
}

/// Splits `line` on runs of spaces and tabs.
///
/// Words exactly equal to `<`, `>` or `|` come back as operator tokens; every
/// other word is returned verbatim as [`Token::Word`]. Empty or blank input
/// yields an empty vector.
pub fn split_into_tokens(line: &str) -> Vec<Token> {
    LexingFSM::new(line).make_tokens()
}
