//! Turns a parsed [`CommandLine`] into running child processes.

use crate::command::{ExitCode, exit_code_of};
use crate::env::Environment;
use crate::error::{EXEC_FAILURE_EXIT_CODE, ShellError, report};
use crate::external::resolve_program;
use crate::lexer::split_into_tokens;
use crate::parser::{CommandLine, Redirect, construct_command};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use tracing::debug;

/// One process slot of a job.
#[derive(Debug)]
enum Stage {
    Running(Child),
    /// The stage's program could not be executed; holds the status it reports.
    Failed(ExitCode),
}

/// The processes spawned for one command line.
///
/// A pipeline job holds two stages, left stage first; every other job holds one.
#[derive(Debug)]
pub struct Job {
    label: String,
    stages: Vec<Stage>,
}

impl Job {
    fn new(label: String, stages: Vec<Stage>) -> Self {
        Self { label, stages }
    }

    /// Space-joined argument vector the job was started from.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Process ids of the stages that were actually started.
    pub fn pids(&self) -> Vec<u32> {
        self.stages
            .iter()
            .filter_map(|stage| match stage {
                Stage::Running(child) => Some(child.id()),
                Stage::Failed(_) => None,
            })
            .collect()
    }

    /// Blocks until every stage has exited and returns the last stage's code.
    ///
    /// All stages are waited on even if one wait fails; the first failure is
    /// returned afterwards.
    pub fn wait(mut self) -> io::Result<ExitCode> {
        let mut code = 0;
        let mut first_err = None;
        for stage in &mut self.stages {
            match stage {
                Stage::Running(child) => match child.wait() {
                    Ok(status) => {
                        code = exit_code_of(status);
                        debug!(pid = child.id(), code, "child exited");
                    }
                    Err(err) => {
                        debug!(pid = child.id(), %err, "wait failed");
                        first_err.get_or_insert(err);
                    }
                },
                Stage::Failed(failed) => code = *failed,
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(code),
        }
    }

    /// Reaps whatever stages have finished without blocking.
    ///
    /// Returns the last stage's code once all of them are gone.
    pub fn try_reap(&mut self) -> io::Result<Option<ExitCode>> {
        let mut last = None;
        for stage in &mut self.stages {
            let code = match stage {
                Stage::Running(child) => match child.try_wait()? {
                    Some(status) => exit_code_of(status),
                    None => return Ok(None),
                },
                Stage::Failed(code) => *code,
            };
            last = Some(code);
        }
        Ok(last)
    }
}

/// Spawns commands inside a given [`Environment`].
pub struct Launcher<'a> {
    env: &'a Environment,
}

impl<'a> Launcher<'a> {
    pub fn new(env: &'a Environment) -> Self {
        Self { env }
    }

    /// Starts `line` and returns its running [`Job`] without waiting for it.
    ///
    /// `stdout` is where the last stage writes when the line has no output
    /// redirect. Informational notices (`Output saved to ...`) go to `notices`.
    pub fn spawn(
        &self,
        line: &CommandLine,
        stdout: Stdio,
        notices: &mut dyn Write,
    ) -> Result<Job, ShellError> {
        match &line.redirect {
            Redirect::None => self.spawn_plain(&line.argv, stdout),
            Redirect::Output(path) => {
                notify(notices, format_args!("Output saved to ./{}", path));
                let program = self.resolve(&line.argv)?;
                let file = open_for_output(path)?;
                let child = self.spawn_child(&program, &line.argv, Stdio::inherit(), file.into())?;
                Ok(Job::new(line.argv.join(" "), vec![Stage::Running(child)]))
            }
            Redirect::Input(path) => {
                notify(notices, format_args!("Reading from file: ./{}", path));
                let replacement = read_command_file(path)?;
                if replacement.redirect != Redirect::None {
                    debug!(redirect = ?replacement.redirect, "ignoring redirect in command file");
                }
                self.spawn_plain(&replacement.argv, stdout)
            }
            Redirect::Pipe(_) => {
                let (left, right) = line.pipeline_halves().ok_or(ShellError::EmptyCommand)?;
                self.spawn_pipeline(left, right, stdout)
            }
        }
    }

    fn spawn_plain(&self, argv: &[String], stdout: Stdio) -> Result<Job, ShellError> {
        let program = self.resolve(argv)?;
        let child = self.spawn_child(&program, argv, Stdio::inherit(), stdout)?;
        Ok(Job::new(argv.join(" "), vec![Stage::Running(child)]))
    }

    /// Starts both halves of a pipe.
    ///
    /// A half whose program cannot be executed is reported and recorded as
    /// [`EXEC_FAILURE_EXIT_CODE`]; its pipe end is closed, so the other half
    /// still runs and sees end of file or a broken pipe.
    fn spawn_pipeline(
        &self,
        left: &[String],
        right: &[String],
        stdout: Stdio,
    ) -> Result<Job, ShellError> {
        if left.is_empty() || right.is_empty() {
            return Err(ShellError::EmptyCommand);
        }

        let (reader, writer) = io::pipe().map_err(ShellError::PipeCreation)?;

        // Each Command owns its end of the pipe and is dropped right after
        // spawning, so the parent keeps no copy of either descriptor.
        let producer = self.spawn_stage(left, Stdio::inherit(), writer.into())?;
        let consumer = match self.spawn_stage(right, reader.into(), stdout) {
            Ok(stage) => stage,
            Err(err) => {
                // The read end is closed by now, so the producer cannot block forever.
                if let Stage::Running(mut child) = producer {
                    if let Err(wait_err) = child.wait() {
                        debug!(pid = child.id(), %wait_err, "failed to reap pipe producer");
                    }
                }
                return Err(err);
            }
        };

        let label = format!("{} | {}", left.join(" "), right.join(" "));
        Ok(Job::new(label, vec![producer, consumer]))
    }

    fn spawn_stage(&self, argv: &[String], stdin: Stdio, stdout: Stdio) -> Result<Stage, ShellError> {
        let started = self
            .resolve(argv)
            .and_then(|program| self.spawn_child(&program, argv, stdin, stdout));
        match started {
            Ok(child) => Ok(Stage::Running(child)),
            Err(err @ ShellError::Exec { .. }) => {
                report(&err);
                Ok(Stage::Failed(EXEC_FAILURE_EXIT_CODE))
            }
            Err(err) => Err(err),
        }
    }

    fn resolve(&self, argv: &[String]) -> Result<PathBuf, ShellError> {
        let name = argv.first().ok_or(ShellError::EmptyCommand)?;
        resolve_program(self.env, name)
    }

    fn spawn_child(
        &self,
        program: &Path,
        argv: &[String],
        stdin: Stdio,
        stdout: Stdio,
    ) -> Result<Child, ShellError> {
        let child = Command::new(program)
            .args(&argv[1..])
            .stdin(stdin)
            .stdout(stdout)
            .envs(self.env.vars.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&self.env.current_dir)
            .spawn()
            .map_err(|source| spawn_error(&argv[0], source))?;
        debug!(pid = child.id(), program = %program.display(), args = ?&argv[1..], "spawned");
        Ok(child)
    }
}

/// Classifies a failed `spawn`.
///
/// Only fork-time resource exhaustion (EAGAIN, ENOMEM) and errors std raises
/// before forking, which carry no OS code, mean the process could not be
/// created. Anything else came back from the child's exec and is an exec failure.
fn spawn_error(program: &str, source: io::Error) -> ShellError {
    let creation_failed = match source.raw_os_error() {
        Some(_) => matches!(
            source.kind(),
            io::ErrorKind::WouldBlock | io::ErrorKind::OutOfMemory
        ),
        None => true,
    };
    if creation_failed {
        ShellError::ProcessCreation {
            program: program.to_string(),
            source,
        }
    } else {
        ShellError::Exec {
            program: program.to_string(),
            reason: source.to_string(),
        }
    }
}

/// Opens an output redirect target: read-write, created if absent, truncated if present.
fn open_for_output(path: &str) -> Result<File, ShellError> {
    let mut options = OpenOptions::new();
    options.read(true).write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o644);
    }
    options.open(path).map_err(|source| ShellError::FileOpen {
        path: path.to_string(),
        source,
    })
}

/// Reads an input redirect target and parses its contents as a command line.
fn read_command_file(path: &str) -> Result<CommandLine, ShellError> {
    let contents = fs::read_to_string(path).map_err(|source| ShellError::FileOpen {
        path: path.to_string(),
        source,
    })?;
    let line = contents.strip_suffix('\n').unwrap_or(&contents);
    let line = line.strip_suffix('\r').unwrap_or(line);
    Ok(construct_command(split_into_tokens(line)))
}

fn notify(notices: &mut dyn Write, message: std::fmt::Arguments<'_>) {
    if let Err(err) = writeln!(notices, "{}", message).and_then(|_| notices.flush()) {
        debug!(%err, "failed to write notice");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::{Duration, Instant};
    use tempfile::{NamedTempFile, TempDir};

    fn test_env(dir: &Path) -> Environment {
        let mut env = Environment {
            vars: HashMap::new(),
            current_dir: dir.to_path_buf(),
        };
        env.set_var("PATH", "/bin:/usr/bin");
        env
    }

    fn parse(line: &str) -> CommandLine {
        construct_command(split_into_tokens(line))
    }

    /// Runs `line` to completion with the last stage writing into a temp file.
    fn run_captured(env: &Environment, line: &str) -> Result<(ExitCode, String, String), ShellError> {
        let capture = NamedTempFile::new().unwrap();
        let mut notices = Vec::new();
        let stdout = capture.reopen().unwrap();
        let job = Launcher::new(env).spawn(&parse(line), stdout.into(), &mut notices)?;
        let code = job.wait().unwrap();
        let out = fs::read_to_string(capture.path()).unwrap();
        Ok((code, out, String::from_utf8(notices).unwrap()))
    }

    #[test]
    fn test_plain_command_output_and_status() {
        let dir = TempDir::new().unwrap();
        let env = test_env(dir.path());

        let (code, out, notices) = run_captured(&env, "echo hello world").unwrap();
        assert_eq!(code, 0);
        assert_eq!(out, "hello world\n");
        assert!(notices.is_empty());

        let (code, _, _) = run_captured(&env, "false").unwrap();
        assert_ne!(code, 0);
    }

    #[test]
    fn test_children_start_in_environment_directory() {
        let dir = TempDir::new().unwrap();
        let env = test_env(dir.path());

        let (_, out, _) = run_captured(&env, "pwd").unwrap();
        let reported = fs::canonicalize(out.trim_end()).unwrap();
        assert_eq!(reported, fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn test_unknown_command_is_exec_error() {
        let dir = TempDir::new().unwrap();
        let env = test_env(dir.path());

        match run_captured(&env, "no-such-program-osh --flag") {
            Err(ShellError::Exec { program, reason }) => {
                assert_eq!(program, "no-such-program-osh");
                assert_eq!(reason, "command not found");
            }
            other => panic!("expected Exec error, got {:?}", other.map(|r| r.0)),
        }
    }

    #[test]
    fn test_output_redirect_creates_and_truncates() {
        let dir = TempDir::new().unwrap();
        let env = test_env(dir.path());
        let target = dir.path().join("out.txt");
        fs::write(&target, "old content that is longer than the new one\n").unwrap();

        let line = format!("echo hi > {}", target.display());
        let (code, captured, notices) = run_captured(&env, &line).unwrap();

        assert_eq!(code, 0);
        assert!(captured.is_empty(), "stdout went to the console: {:?}", captured);
        assert_eq!(fs::read_to_string(&target).unwrap(), "hi\n");
        assert_eq!(notices, format!("Output saved to ./{}\n", target.display()));
    }

    #[test]
    fn test_output_redirect_to_bad_directory_spawns_nothing() {
        let dir = TempDir::new().unwrap();
        let env = test_env(dir.path());
        let target = dir.path().join("missing").join("out.txt");

        let line = format!("echo hi > {}", target.display());
        match run_captured(&env, &line) {
            Err(ShellError::FileOpen { path, .. }) => assert_eq!(path, target.display().to_string()),
            other => panic!("expected FileOpen error, got {:?}", other.map(|r| r.0)),
        }
        assert!(!target.exists());
    }

    #[test]
    fn test_output_redirect_without_operand() {
        let dir = TempDir::new().unwrap();
        let env = test_env(dir.path());

        match run_captured(&env, "echo hi >") {
            Err(ShellError::FileOpen { path, .. }) => assert!(path.is_empty()),
            other => panic!("expected FileOpen error, got {:?}", other.map(|r| r.0)),
        }
    }

    #[test]
    fn test_input_redirect_runs_file_contents() {
        let dir = TempDir::new().unwrap();
        let env = test_env(dir.path());
        let script = dir.path().join("cmd.txt");
        fs::write(&script, "echo from the file\n").unwrap();

        let line = format!("cat < {}", script.display());
        let (code, out, notices) = run_captured(&env, &line).unwrap();

        assert_eq!(code, 0);
        assert_eq!(out, "from the file\n");
        assert_eq!(notices, format!("Reading from file: ./{}\n", script.display()));
    }

    #[test]
    fn test_input_redirect_missing_file() {
        let dir = TempDir::new().unwrap();
        let env = test_env(dir.path());

        let line = format!("cat < {}", dir.path().join("nope").display());
        assert!(matches!(
            run_captured(&env, &line),
            Err(ShellError::FileOpen { .. })
        ));
    }

    #[test]
    fn test_pipe_connects_both_stages() {
        let dir = TempDir::new().unwrap();
        let env = test_env(dir.path());

        let (code, out, _) = run_captured(&env, "echo hello pipe | tr a-z A-Z").unwrap();
        assert_eq!(code, 0);
        assert_eq!(out, "HELLO PIPE\n");
    }

    #[test]
    fn test_pipe_reader_sees_end_of_file() {
        let dir = TempDir::new().unwrap();
        let env = test_env(dir.path());

        // `wc` only finishes once every write end of the pipe is closed.
        let started = Instant::now();
        let (code, out, _) = run_captured(&env, "echo one | wc -l").unwrap();
        assert_eq!(code, 0);
        assert_eq!(out.trim(), "1");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_pipe_job_has_two_children() {
        let dir = TempDir::new().unwrap();
        let env = test_env(dir.path());
        let mut notices = Vec::new();

        let job = Launcher::new(&env)
            .spawn(&parse("true | true"), Stdio::null(), &mut notices)
            .unwrap();
        assert_eq!(job.pids().len(), 2);
        assert_eq!(job.label(), "true | true");
        assert_eq!(job.wait().unwrap(), 0);
    }

    #[test]
    fn test_pipe_with_missing_half_is_rejected() {
        let dir = TempDir::new().unwrap();
        let env = test_env(dir.path());

        assert!(matches!(
            run_captured(&env, "echo hi |"),
            Err(ShellError::EmptyCommand)
        ));
        assert!(matches!(
            run_captured(&env, "| wc -l"),
            Err(ShellError::EmptyCommand)
        ));
    }

    #[test]
    fn test_pipe_unknown_left_stage_still_runs_right() {
        let dir = TempDir::new().unwrap();
        let env = test_env(dir.path());

        let (code, out, _) = run_captured(&env, "no-such-program-osh | wc -l").unwrap();
        assert_eq!(code, 0);
        assert_eq!(out.trim(), "0");

        let marker = dir.path().join("marker");
        let line = format!("no-such-program-osh | touch {}", marker.display());
        let (code, _, _) = run_captured(&env, &line).unwrap();
        assert_eq!(code, 0);
        assert!(marker.exists());
    }

    #[test]
    fn test_pipe_unknown_right_stage_still_runs_left() {
        let dir = TempDir::new().unwrap();
        let env = test_env(dir.path());

        let (code, out, _) = run_captured(&env, "echo hi | no-such-program-osh").unwrap();
        assert_eq!(code, EXEC_FAILURE_EXIT_CODE);
        assert!(out.is_empty());

        let marker = dir.path().join("marker");
        let line = format!("touch {} | no-such-program-osh", marker.display());
        let (code, _, _) = run_captured(&env, &line).unwrap();
        assert_eq!(code, EXEC_FAILURE_EXIT_CODE);
        assert!(marker.exists());
    }

    #[test]
    fn test_bad_executable_format_is_exec_error() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let env = test_env(dir.path());
        let bad = dir.path().join("badexe");
        fs::write(&bad, b"\x7fELF but not really a program\n").unwrap();
        fs::set_permissions(&bad, fs::Permissions::from_mode(0o755)).unwrap();

        let line = bad.display().to_string();
        match run_captured(&env, &line) {
            Err(ShellError::Exec { program, reason }) => {
                assert_eq!(program, line);
                assert_ne!(reason, "command not found");
            }
            other => panic!("expected Exec error, got {:?}", other.map(|r| r.0)),
        }

        // as a pipe stage it only fails its own half
        let (code, out, _) = run_captured(&env, &format!("{} | wc -l", line)).unwrap();
        assert_eq!(code, 0);
        assert_eq!(out.trim(), "0");
    }

    #[test]
    fn test_refused_spawn_is_process_creation_error() {
        let dir = TempDir::new().unwrap();
        let mut env = test_env(dir.path());
        env.set_var("OSH_BROKEN", "nul\0inside");

        assert!(matches!(
            run_captured(&env, "true"),
            Err(ShellError::ProcessCreation { .. })
        ));
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_spawn_error_classification() {
        let fork = spawn_error("ls", io::Error::from(io::ErrorKind::WouldBlock));
        assert!(matches!(fork, ShellError::ProcessCreation { .. }));

        // EAGAIN and ENOMEM as reported by fork
        for errno in [11, 12] {
            let err = spawn_error("ls", io::Error::from_raw_os_error(errno));
            assert!(matches!(err, ShellError::ProcessCreation { .. }), "errno {}", errno);
        }

        // ENOEXEC, EACCES and ENOENT come back from exec
        for errno in [8, 13, 2] {
            let err = spawn_error("ls", io::Error::from_raw_os_error(errno));
            assert!(matches!(err, ShellError::Exec { .. }), "errno {}", errno);
        }
    }

    #[test]
    fn test_wait_reaps_every_stage_and_reports_last() {
        let first = Command::new("/bin/sh").args(["-c", "exit 5"]).spawn().unwrap();
        let last = Command::new("/bin/sh").args(["-c", "exit 3"]).spawn().unwrap();
        let pids = vec![first.id(), last.id()];
        let job = Job::new(
            "sh | sh".to_string(),
            vec![Stage::Running(first), Stage::Running(last)],
        );
        assert_eq!(job.pids(), pids);
        assert_eq!(job.wait().unwrap(), 3);

        let child = Command::new("/bin/sh").args(["-c", "exit 4"]).spawn().unwrap();
        let pid = child.id();
        let job = Job::new(
            "missing | sh".to_string(),
            vec![Stage::Failed(EXEC_FAILURE_EXIT_CODE), Stage::Running(child)],
        );
        assert_eq!(job.pids(), vec![pid]);
        assert_eq!(job.wait().unwrap(), 4);

        let job = Job::new("sh".to_string(), vec![Stage::Failed(EXEC_FAILURE_EXIT_CODE)]);
        assert_eq!(job.wait().unwrap(), EXEC_FAILURE_EXIT_CODE);
    }

    #[test]
    fn test_try_reap_polls_without_blocking() {
        let dir = TempDir::new().unwrap();
        let env = test_env(dir.path());
        let mut notices = Vec::new();

        let mut job = Launcher::new(&env)
            .spawn(&parse("sleep 1"), Stdio::null(), &mut notices)
            .unwrap();
        assert_eq!(job.try_reap().unwrap(), None);

        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            if let Some(code) = job.try_reap().unwrap() {
                assert_eq!(code, 0);
                break;
            }
            assert!(Instant::now() < deadline, "sleep never finished");
            std::thread::sleep(Duration::from_millis(50));
        }
    }
}
