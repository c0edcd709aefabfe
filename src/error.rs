use crate::command::ExitCode;
use std::io;
use thiserror::Error;
use tracing::warn;

/// Status returned by a strict session when a child process could not be created.
pub const PROCESS_CREATION_EXIT_CODE: ExitCode = 255;
/// Status returned by a strict session when the pipe between two stages could not be created.
pub const PIPE_CREATION_EXIT_CODE: ExitCode = 1;
/// Status recorded for a pipeline stage whose program could not be executed.
pub const EXEC_FAILURE_EXIT_CODE: ExitCode = 127;

/// Errors surfaced while dispatching a single command line.
///
/// None of these are fatal to the interactive loop unless the session runs in
/// strict mode, see [`ShellError::exit_code`].
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("failed to create process for {program}: {source}")]
    ProcessCreation {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("pipe creation failed: {0}")]
    PipeCreation(#[source] io::Error),

    #[error("cannot open {}: {source}", display_path(.path))]
    FileOpen {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to wait for child: {0}")]
    Wait(#[source] io::Error),

    #[error("{program}: {reason}")]
    Exec { program: String, reason: String },

    #[error("missing command")]
    EmptyCommand,

    #[error("line too long ({len} characters, at most {max} allowed)")]
    LineTooLong { len: usize, max: usize },

    #[error("failed to read input: {0}")]
    Input(String),
}

impl ShellError {
    /// The status a strict session terminates with, for the error kinds that end it.
    pub fn exit_code(&self) -> Option<ExitCode> {
        match self {
            ShellError::ProcessCreation { .. } => Some(PROCESS_CREATION_EXIT_CODE),
            ShellError::PipeCreation(_) => Some(PIPE_CREATION_EXIT_CODE),
            _ => None,
        }
    }
}

/// Prints `err` as a one-line diagnostic on stderr and logs it.
pub fn report(err: &ShellError) {
    warn!(error = %err, "command failed");
    eprintln!("osh: {}", err);
}

fn display_path(path: &str) -> &str {
    if path.is_empty() { "<missing path>" } else { path }
}
