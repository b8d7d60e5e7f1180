//! Shell discovery and child environment.

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::path::Path;

use crate::identity::ResolvedIdentity;

/// Shell names searched on `PATH` when neither argv nor `SHELL` is given.
pub const SHELL_CANDIDATES: &[&str] = &["bash", "sh", "ksh", "zsh", "csh", "ash"];

/// Used when nothing else can be found.
pub const FALLBACK_SHELL: &str = "/bin/sh";

/// Prepended to the child's `PATH`.
pub const SYSTEM_PATH: &[&str] = &[
    "/bin",
    "/sbin",
    "/usr/bin",
    "/usr/sbin",
    "/usr/local/bin",
    "/usr/local/sbin",
];

/// Flags that stop bash from reading profile and rc files.
const BASH_QUIET_FLAGS: &[&str] = &["--noprofile", "--norc"];

/// Search `PATH` for the first available shell.
///
/// Candidates are tried in [`SHELL_CANDIDATES`] order; for each name the
/// `PATH` entries are tried left to right.
pub fn search_path(path_var: &str) -> Option<String> {
    for name in SHELL_CANDIDATES {
        for dir in path_var.split(':') {
            let dir = dir.trim();
            if dir.is_empty() {
                continue;
            }
            let candidate = Path::new(dir).join(name);
            if candidate.is_file() {
                return Some(candidate.to_string_lossy().into_owned());
            }
        }
    }
    None
}

/// Pick the shell to run: `SHELL` if set, else a `PATH` search.
pub fn find_shell(shell_var: Option<&str>, path_var: Option<&str>) -> Option<String> {
    if let Some(shell) = shell_var.filter(|s| !s.is_empty()) {
        return Some(shell.to_string());
    }
    path_var.and_then(search_path)
}

/// Turn a caller-supplied argv (possibly empty) into the argv to execute.
///
/// An empty argv means "default shell", falling back to [`FALLBACK_SHELL`].
/// When the program is bash, profile and rc loading is switched off.
pub fn resolve_argv(argv: &[String], shell_var: Option<&str>, path_var: Option<&str>) -> Vec<String> {
    let mut argv = argv.to_vec();
    if argv.is_empty() {
        let shell = find_shell(shell_var, path_var).unwrap_or_else(|| FALLBACK_SHELL.to_string());
        argv.push(shell);
    }

    if program_name(&argv[0]) == "bash" {
        let flags = BASH_QUIET_FLAGS.iter().map(|f| f.to_string());
        argv.splice(1..1, flags);
    }
    argv
}

/// Resolve argv against this process's own `SHELL` and `PATH`.
pub fn resolve_argv_from_env(argv: &[String]) -> Vec<String> {
    let shell = std::env::var("SHELL").ok();
    let path = std::env::var("PATH").ok();
    resolve_argv(argv, shell.as_deref(), path.as_deref())
}

fn program_name(program: &str) -> &str {
    program.rsplit('/').next().unwrap_or(program)
}

/// Build the environment for a child from `base`.
///
/// History goes to `/dev/null`, [`SYSTEM_PATH`] is put in front of `PATH`,
/// `TERM` is set when given, and a target identity contributes `USER`,
/// `HOME` and `LOGNAME`.
pub fn child_env<I, K, V>(
    base: I,
    term: Option<&str>,
    identity: Option<&ResolvedIdentity>,
) -> BTreeMap<OsString, OsString>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<OsString>,
    V: Into<OsString>,
{
    let mut env: BTreeMap<OsString, OsString> = base
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect();

    env.insert("HISTFILE".into(), "/dev/null".into());

    let mut path = OsString::from(SYSTEM_PATH.join(":"));
    if let Some(existing) = env.get(OsStr::new("PATH")).filter(|p| !p.is_empty()) {
        path.push(":");
        path.push(existing);
    }
    env.insert("PATH".into(), path);

    if let Some(term) = term {
        env.insert("TERM".into(), term.into());
    }

    if let Some(id) = identity {
        env.insert("USER".into(), id.name.clone().into());
        env.insert("LOGNAME".into(), id.name.clone().into());
        env.insert("HOME".into(), id.home.clone().into_os_string());
    }
    env
}
