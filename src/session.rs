use crate::command::ExitCode;
use crate::config::Config;
use crate::env::Environment;
use crate::error::{ShellError, report};
use crate::io_adapters::{LineSource, ReadOutcome};
use crate::launcher::{Job, Launcher};
use crate::lexer::split_into_tokens;
use crate::parser::{Redirect, construct_command};
use std::io::Write;
use std::process::Stdio;
use tracing::{debug, info, warn};

const EXIT_DIRECTIVE: &str = "exit";
const REPEAT_DIRECTIVE: &str = "!!";
const BACKGROUND_MARKER: char = '&';

/// What [`Session::dispatch`] did with a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Blank line, nothing to do.
    Empty,
    /// The exit directive was seen; the loop should stop.
    Exit,
    /// `!!` arrived before any command was entered.
    NoHistory,
    /// A foreground job ran to completion with this exit code.
    Foreground(ExitCode),
    /// A background job was started with these process ids.
    Background(Vec<u32>),
}

/// The single remembered command line that `!!` repeats.
#[derive(Debug, Default, Clone)]
pub struct History {
    last: Option<String>,
}

impl History {
    pub fn record(&mut self, line: &str) {
        self.last = Some(line.to_string());
    }

    pub fn last(&self) -> Option<&str> {
        self.last.as_deref()
    }
}

/// Interactive prompt/read/dispatch loop.
///
/// Owns every piece of state that outlives a single line: the history slot,
/// the environment children are started in, and the table of background jobs.
/// Shell notices such as `No commands in history.` are written to `out`.
pub struct Session<W: Write> {
    config: Config,
    env: Environment,
    history: History,
    jobs: Vec<Job>,
    out: W,
}

impl<W: Write> Session<W> {
    pub fn new(config: Config, out: W) -> Self {
        Self::with_environment(config, Environment::new(), out)
    }

    pub fn with_environment(config: Config, env: Environment, out: W) -> Self {
        Self {
            config,
            env,
            history: History::default(),
            jobs: Vec::new(),
            out,
        }
    }

    pub fn history(&self) -> Option<&str> {
        self.history.last()
    }

    /// Number of background jobs not reaped yet.
    pub fn background_jobs(&self) -> usize {
        self.jobs.len()
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// Runs the loop until the exit directive or end of input.
    ///
    /// Dispatch errors are reported and the loop goes on, except for process
    /// and pipe creation failures in strict mode, which end it with their
    /// exit code. Only a failing line source is returned as an error.
    pub fn run(&mut self, source: &mut dyn LineSource) -> Result<ExitCode, ShellError> {
        loop {
            self.reap_background();

            let line = match source.read_line(&self.config.prompt)? {
                ReadOutcome::Line(line) => line,
                ReadOutcome::Interrupted => continue,
                ReadOutcome::Eof => return Ok(0),
            };

            match self.dispatch(&line) {
                Ok(Dispatch::Exit) => return Ok(0),
                Ok(outcome) => debug!(?outcome, "dispatched"),
                Err(err) => {
                    report(&err);
                    if let Some(code) = err.exit_code().filter(|_| self.config.strict) {
                        return Ok(code);
                    }
                }
            }
        }
    }

    /// Interprets one raw input line.
    ///
    /// Every line except `!!` is stored in the history slot before anything
    /// else happens, so lines that go on to fail can still be repeated.
    pub fn dispatch(&mut self, raw: &str) -> Result<Dispatch, ShellError> {
        let raw = raw.trim_end_matches(['\n', '\r']);
        let len = raw.chars().count();
        if len > self.config.max_content_len() {
            return Err(ShellError::LineTooLong {
                len,
                max: self.config.max_content_len(),
            });
        }
        if raw.trim().is_empty() {
            return Ok(Dispatch::Empty);
        }

        let line = if raw.trim() == REPEAT_DIRECTIVE {
            match self.history.last() {
                Some(last) => last.to_string(),
                None => {
                    self.notice("No commands in history.");
                    return Ok(Dispatch::NoHistory);
                }
            }
        } else {
            self.history.record(raw);
            raw.to_string()
        };

        let (line, background) = take_background_marker(&line);
        let command = construct_command(split_into_tokens(&line));
        debug!(?command, background, "parsed");

        if command.argv.first().map(String::as_str) == Some(EXIT_DIRECTIVE) {
            return Ok(Dispatch::Exit);
        }
        if command.is_empty() && command.redirect == Redirect::None {
            return Ok(Dispatch::Empty);
        }

        let job = Launcher::new(&self.env).spawn(&command, Stdio::inherit(), &mut self.out)?;
        if background {
            let pids = job.pids();
            info!(job = job.label(), ?pids, "started in background");
            self.jobs.push(job);
            Ok(Dispatch::Background(pids))
        } else {
            let code = job.wait().map_err(ShellError::Wait)?;
            debug!(code, "foreground job finished");
            Ok(Dispatch::Foreground(code))
        }
    }

    /// Collects background jobs that have finished, without blocking.
    ///
    /// A job that cannot be polled stays in the table and is retried next time.
    pub fn reap_background(&mut self) {
        self.jobs.retain_mut(|job| match job.try_reap() {
            Ok(Some(code)) => {
                info!(job = job.label(), code, "background job finished");
                false
            }
            Ok(None) => true,
            Err(err) => {
                warn!(job = job.label(), %err, "failed to poll background job");
                true
            }
        });
    }

    fn notice(&mut self, message: &str) {
        if let Err(err) = writeln!(self.out, "{}", message).and_then(|_| self.out.flush()) {
            debug!(%err, "failed to write notice");
        }
    }
}

/// Replaces the first `&` with a space and reports whether there was one.
fn take_background_marker(line: &str) -> (String, bool) {
    if line.contains(BACKGROUND_MARKER) {
        (line.replacen(BACKGROUND_MARKER, " ", 1), true)
    } else {
        (line.to_string(), false)
    }
}
