use crate::env::Environment;
use std::borrow::Cow;
use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// What a child process starts with, copied out of the [`Environment`].
///
/// Taken once per pipeline; spawning never locks the shared environment.
#[derive(Debug, Clone)]
pub(crate) struct LaunchContext {
    vars: HashMap<String, String>,
    current_dir: PathBuf,
    search_paths: String,
}

impl LaunchContext {
    pub(crate) fn from_env(env: &Environment) -> Self {
        Self {
            vars: env.vars.clone(),
            current_dir: env.current_dir.clone(),
            search_paths: env.get_var("PATH").unwrap_or_default(),
        }
    }
}

/// Command that is not a builtin, resolved to an executable on disk.
pub(crate) struct ExternalCommand {
    name: String,
    program: PathBuf,
    args: Vec<OsString>,
}

impl ExternalCommand {
    /// Resolve `name` through the context's PATH.
    ///
    /// Returns `None` when no executable matches.
    pub(crate) fn resolve(ctx: &LaunchContext, name: &str, args: &[String]) -> Option<Self> {
        let program = find_command_path(OsStr::new(&ctx.search_paths), Path::new(name))?;
        Some(Self {
            name: name.to_string(),
            program: program.into_owned(),
            args: args.iter().map(OsString::from).collect(),
        })
    }

    pub(crate) fn program(&self) -> &Path {
        &self.program
    }

    /// Build the process with the given standard streams.
    ///
    /// `argv[0]` is the name the user typed, not the resolved path.
    pub(crate) fn command(
        &self,
        ctx: &LaunchContext,
        stdin: Stdio,
        stdout: Stdio,
        stderr: Stdio,
    ) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(ctx.vars.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&ctx.current_dir)
            .stdin(stdin)
            .stdout(stdout)
            .stderr(stderr);
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.arg0(&self.name);
        }
        cmd
    }
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it is an executable file.
/// - Relative with multiple components (e.g., `bin/sh`) or `./foo`: returns it if it
///   is an executable file.
/// - Single path component (no separators): search each directory in `search_paths`
///   (PATH) and return the first executable, non-directory match.
/// - Empty path: returns `None`.
///
/// Returns either a borrowed reference to the provided `path` or an owned `PathBuf`
/// when the result is discovered via PATH lookup.
pub fn find_command_path<'a>(search_paths: &OsStr, path: &'a Path) -> Option<Cow<'a, Path>> {
    if path.is_absolute() {
        return find_by_path(path).map(Cow::Borrowed);
    }

    let mut components = path.components();
    let first = components.next();
    let second = components.next();
    match (first, second) {
        // Empty path -> not found
        (None, _) => None,
        (Some(std::path::Component::Normal(x)), None) => {
            find_in_path(search_paths, x).map(Cow::Owned)
        }
        _ => find_by_path(path).map(Cow::Borrowed),
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths)
        .map(|dir| dir.join(cmd))
        .find(|path| is_executable(path))
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if is_executable(path) { Some(path) } else { None }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| !m.is_dir() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.metadata().map(|m| !m.is_dir()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[cfg(unix)]
    fn osstr(s: &str) -> &OsStr {
        OsStr::new(s)
    }

    #[cfg(unix)]
    fn make_executable(path: &Path) {
        use std::os::unix::fs::PermissionsExt;
        fs::write(path, "#!/bin/sh\n").unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    #[cfg(unix)]
    fn absolute_existing_true() {
        let path = Path::new("/bin/sh");
        let found = find_command_path(osstr("/bin"), path).expect("Expected to find /bin/sh");
        assert_eq!(found.as_ref(), path);
    }

    #[test]
    #[cfg(unix)]
    fn absolute_nonexisting() {
        let path = Path::new("/bin/nonexisting");
        assert!(find_command_path(osstr("/bin"), path).is_none());
    }

    #[test]
    #[cfg(unix)]
    fn single_component_found_in_path() {
        let found = find_command_path(osstr("/nonexistent:/bin"), Path::new("sh"))
            .expect("Expected to find 'sh' in /bin via PATH search");
        assert_eq!(found.as_ref(), Path::new("/bin/sh"));
    }

    #[test]
    #[cfg(unix)]
    fn single_component_not_found_in_path() {
        assert!(find_command_path(osstr("/bin"), Path::new("nonexisting")).is_none());
    }

    #[test]
    #[cfg(unix)]
    fn skips_directories_and_non_executables() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        fs::create_dir(first.path().join("tool")).unwrap();
        fs::write(second.path().join("tool"), "not executable").unwrap();

        let paths = std::env::join_paths([first.path(), second.path()]).unwrap();
        assert!(find_command_path(&paths, Path::new("tool")).is_none());

        let third = tempfile::tempdir().unwrap();
        make_executable(&third.path().join("tool"));
        let paths = std::env::join_paths([first.path(), second.path(), third.path()]).unwrap();
        let found = find_command_path(&paths, Path::new("tool")).unwrap();
        assert_eq!(found.as_ref(), third.path().join("tool"));
    }

    #[test]
    #[cfg(unix)]
    fn multiple_components_checked_directly() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("bin")).unwrap();
        let tool = dir.path().join("bin").join("tool");
        make_executable(&tool);

        let found = find_command_path(osstr("/does/not/matter"), &tool).unwrap();
        assert_eq!(found.as_ref(), tool.as_path());
    }

    #[test]
    fn empty_path_is_none() {
        assert!(find_command_path(OsStr::new("/bin"), Path::new("")).is_none());
    }

    #[test]
    #[cfg(unix)]
    fn resolve_uses_environment_path() {
        let mut env = Environment::new();
        env.set_var("PATH", "/bin:/usr/bin");
        let ctx = LaunchContext::from_env(&env);
        env.set_var("PATH", "/nonexistent");

        let cmd = ExternalCommand::resolve(&ctx, "sh", &["-c".to_string()]).unwrap();
        assert!(cmd.program().ends_with("sh"));
        assert!(ExternalCommand::resolve(&ctx, "definitely-not-a-command-42", &[]).is_none());
    }
}
