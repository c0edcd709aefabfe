use crate::error::ShellError;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::collections::VecDeque;

/// Result of asking a [`LineSource`] for the next line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A complete line, terminator already stripped.
    Line(String),
    /// The user pressed Ctrl-C; the partial line is discarded.
    Interrupted,
    /// No more input.
    Eof,
}

/// Where the session loop gets its input lines from.
pub trait LineSource {
    /// Shows `prompt` and blocks until one line is available.
    fn read_line(&mut self, prompt: &str) -> Result<ReadOutcome, ShellError>;
}

/// Interactive console input backed by `rustyline`.
///
/// The editor's own history is left empty: the shell keeps only its single
/// `!!` slot.
pub struct EditorSource {
    editor: DefaultEditor,
}

impl EditorSource {
    pub fn new() -> rustyline::Result<Self> {
        Ok(Self {
            editor: DefaultEditor::new()?,
        })
    }
}

impl LineSource for EditorSource {
    fn read_line(&mut self, prompt: &str) -> Result<ReadOutcome, ShellError> {
        match self.editor.readline(prompt) {
            Ok(line) => Ok(ReadOutcome::Line(line)),
            Err(ReadlineError::Interrupted) => Ok(ReadOutcome::Interrupted),
            Err(ReadlineError::Eof) => Ok(ReadOutcome::Eof),
            Err(err) => Err(ShellError::Input(err.to_string())),
        }
    }
}

/// Memory-backed line source that replays a fixed script.
///
/// Prompts are recorded instead of printed so callers can inspect them.
#[derive(Debug, Default)]
pub struct MemLines {
    lines: VecDeque<String>,
    prompts: Vec<String>,
}

impl MemLines {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            prompts: Vec::new(),
        }
    }

    /// Prompts shown so far, one per read.
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    /// Lines that were never read.
    pub fn remaining(&self) -> usize {
        self.lines.len()
    }
}

impl LineSource for MemLines {
    fn read_line(&mut self, prompt: &str) -> Result<ReadOutcome, ShellError> {
        self.prompts.push(prompt.to_string());
        Ok(match self.lines.pop_front() {
            Some(line) => ReadOutcome::Line(line),
            None => ReadOutcome::Eof,
        })
    }
}
