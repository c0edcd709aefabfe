use crate::env::Environment;
use crate::error::ShellError;
use std::borrow::Cow;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Resolves `program` to an executable path using the session's `PATH`.
///
/// Returns [`ShellError::Exec`] with a "command not found" reason when nothing matches.
pub fn resolve_program(env: &Environment, program: &str) -> Result<PathBuf, ShellError> {
    let search_paths = env.get_var("PATH").unwrap_or_default();
    find_command_path(OsStr::new(&search_paths), Path::new(program))
        .map(Cow::into_owned)
        .ok_or_else(|| ShellError::Exec {
            program: program.to_string(),
            reason: "command not found".to_string(),
        })
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it names a file.
/// - Relative with multiple components (e.g., `bin/sh`): returns it if it names a file.
/// - `./foo` on Unix or any `./`-prefixed path on other platforms: returns it if it names a file.
/// - Single path component (no separators): search each directory in `search_paths` (PATH)
///   and return the first match.
/// - Empty path: returns `None`.
pub fn find_command_path<'a>(search_paths: &OsStr, path: &'a Path) -> Option<Cow<'a, Path>> {
    if path.is_absolute() {
        return find_by_path(path).map(Cow::Borrowed);
    }

    let search_in_current_dir = cfg!(not(unix)) || path.starts_with("./");
    if search_in_current_dir && path.is_file() {
        return Some(Cow::Borrowed(path));
    }

    let mut components = path.components();
    let first = components.next();
    let second = components.next();
    match (first, second) {
        (None, None) => None,
        (Some(x), None) => find_in_path(search_paths, x.as_os_str()).map(Cow::Owned),
        _ => find_by_path(path).map(Cow::Borrowed),
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths)
        .map(|dir| dir.join(cmd))
        .find(|candidate| candidate.is_file())
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if path.is_file() { Some(path) } else { None }
}
