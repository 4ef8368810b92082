use crate::command::{CommandFactory, ExecutableCommand, ExitCode};
use crate::env::Environment;
use crate::error::ShellError;
use crate::external::find_command_path;
use anyhow::{Context, Result};
use argh::{EarlyExit, FromArgs};
use std::collections::HashMap;
use std::env;
use std::ffi::OsStr;
use std::fs;
use std::io::{Read, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process without spawning a child process.
pub(crate) trait BuiltinCommand: Sized + FromArgs + 'static {
    /// Canonical name of the command, e.g. "echo" or "cd".
    fn name() -> &'static str;

    /// Executes the command using provided IO streams and environment.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(
        self: Box<Self>,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        T::execute(*self, stdin, stdout, env)
    }
}

/// Result of argument parsing that did not produce a command: `--help` output or
/// a usage error.
struct InvalidArgs {
    output: String,
    is_error: bool,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(
        self: Box<Self>,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        if self.is_error {
            return Err(anyhow::anyhow!(self.output.trim_end().to_string()));
        }
        stdout.write_all(self.output.as_bytes())?;
        Ok(0)
    }
}

/// Factory for a [`BuiltinCommand`] type.
struct Factory<T> {
    _phantom: PhantomData<fn() -> T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T: BuiltinCommand> CommandFactory for Factory<T> {
    fn name(&self) -> &'static str {
        T::name()
    }

    fn create(&self, args: &[&str]) -> Box<dyn ExecutableCommand> {
        match T::from_args(&[T::name()], args) {
            Ok(cmd) => Box::new(cmd),
            Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
                output,
                is_error: status.is_err(),
            }),
        }
    }
}

/// Name → factory mapping for in-process commands.
///
/// Built once at startup; adding a built-in is a call to [`register`](Self::register).
pub struct BuiltinRegistry {
    factories: HashMap<&'static str, Box<dyn CommandFactory>>,
}

impl BuiltinRegistry {
    /// An empty registry. See [`Default`] for the standard set of built-ins.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn register(&mut self, factory: Box<dyn CommandFactory>) {
        self.factories.insert(factory.name(), factory);
    }

    fn register_builtin<T: BuiltinCommand>(&mut self) {
        self.register(Box::new(Factory::<T>::default()));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Run the built-in `name` with `args` against the given streams.
    ///
    /// Failures of the built-in itself are written to `stderr` and turned into a
    /// non-zero exit code; only an unknown name is an error.
    pub fn dispatch(
        &self,
        name: &str,
        args: &[String],
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode, ShellError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| ShellError::CommandNotFound(name.to_string()))?;
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        match factory.create(&args).execute(stdin, stdout, env) {
            Ok(code) => Ok(code),
            Err(e) => {
                tracing::debug!("builtin {} failed: {:#}", name, e);
                writeln!(stderr, "{}", e)?;
                Ok(1)
            }
        }
    }
}

impl Default for BuiltinRegistry {
    /// Registry with `echo`, `exit`, `type`, `pwd`, `cd` and `history`.
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register_builtin::<Echo>();
        registry.register_builtin::<Exit>();
        registry.register_builtin::<Type>();
        registry.register_builtin::<Pwd>();
        registry.register_builtin::<Cd>();
        registry.register_builtin::<History>();
        registry
    }
}

#[derive(FromArgs)]
/// Print the current working directory to standard output.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        writeln!(stdout, "{}", env.current_dir.to_string_lossy())?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, changes to the directory specified by the HOME environment variable.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory. `~`, `$HOME` and no argument mean $HOME.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let target = match self.target.as_deref() {
            Some(t) if !t.is_empty() && t != "~" && t != "$HOME" => PathBuf::from(t),
            _ => match env.get_var("HOME") {
                Some(home) => PathBuf::from(home),
                None => return Err(anyhow::anyhow!("cd: HOME not set")),
            },
        };

        let new_dir = if target.is_absolute() {
            target.clone()
        } else {
            env.current_dir.join(&target)
        };

        let canonical = match fs::canonicalize(&new_dir) {
            Ok(dir) if dir.is_dir() => dir,
            _ => {
                return Err(anyhow::anyhow!(
                    "cd: {}: No such file or directory",
                    target.display()
                ));
            }
        };

        env::set_current_dir(&canonical)
            .with_context(|| format!("cd: can't chdir to {}", canonical.display()))?;
        env.current_dir = canonical;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Exit the shell, saving history to the history file.
pub struct Exit {
    #[argh(positional, greedy)]
    /// exit status; non-numeric values are treated as 0
    pub args: Vec<String>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let code = self
            .args
            .first()
            .and_then(|a| a.parse::<ExitCode>().ok())
            .unwrap_or(0);
        env.exit_requested = Some(code);
        Ok(code)
    }
}

#[derive(FromArgs)]
/// write the arguments to standard output, separated by spaces.
/// by default, a trailing newline is printed.
pub struct Echo {
    #[argh(switch, short = 'n')]
    /// do not output the trailing newline.
    pub no_newline: bool,

    #[argh(positional, greedy)]
    /// values to print as-is, separated by spaces.
    pub args: Vec<String>,
}

impl BuiltinCommand for Echo {
    fn name() -> &'static str {
        "echo"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        let s = self.args.join(" ");
        if self.no_newline {
            write!(stdout, "{}", s)?;
        } else {
            writeln!(stdout, "{}", s)?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Describe how each name would be interpreted as a command.
pub struct Type {
    #[argh(positional, greedy)]
    /// command names to look up
    pub names: Vec<String>,
}

impl BuiltinCommand for Type {
    fn name() -> &'static str {
        "type"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let search_paths = env.get_var("PATH").unwrap_or_default();
        let mut code = 0;
        for name in &self.names {
            if env.is_builtin(name) {
                writeln!(stdout, "{} is a shell builtin", name)?;
            } else if let Some(path) =
                find_command_path(OsStr::new(&search_paths), Path::new(name))
            {
                writeln!(stdout, "{} is {}", name, path.display())?;
            } else {
                writeln!(stdout, "{}: not found", name)?;
                code = 1;
            }
        }
        Ok(code)
    }
}

#[derive(FromArgs)]
/// Display or manipulate the history list.
pub struct History {
    #[argh(option, short = 'r')]
    /// append the contents of FILE to the history list
    pub read: Option<String>,

    #[argh(option, short = 'w')]
    /// write the whole history list to FILE, replacing its contents
    pub write: Option<String>,

    #[argh(option, short = 'a')]
    /// append the entries added since the last append to FILE
    pub append: Option<String>,

    #[argh(positional)]
    /// list only the last N entries
    pub count: Option<usize>,
}

impl BuiltinCommand for History {
    fn name() -> &'static str {
        "history"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        if let Some(path) = &self.read {
            env.history.load_from(Path::new(path))?;
        } else if let Some(path) = &self.write {
            env.history.overwrite_to(Path::new(path))?;
        } else if let Some(path) = &self.append {
            env.history.append_new_to(Path::new(path))?;
        } else if env.history.is_empty() {
            writeln!(stdout, "No commands in history.")?;
        } else {
            for line in env.history.listing(self.count.unwrap_or(0)) {
                writeln!(stdout, "{}", line)?;
            }
        }
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::{Mutex, MutexGuard, OnceLock};

    fn lock_current_dir() -> MutexGuard<'static, ()> {
        static MUTEX: OnceLock<Mutex<()>> = OnceLock::new();
        MUTEX
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn test_env() -> Environment {
        let mut env = Environment::new();
        env.builtin_names = BuiltinRegistry::default().names();
        env
    }

    fn run(name: &str, args: &[&str], env: &mut Environment) -> (ExitCode, String, String) {
        let registry = BuiltinRegistry::default();
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let (mut out, mut err) = (Vec::new(), Vec::new());
        let code = registry
            .dispatch(name, &args, &mut Cursor::new(Vec::new()), &mut out, &mut err, env)
            .unwrap();
        (
            code,
            String::from_utf8(out).unwrap(),
            String::from_utf8(err).unwrap(),
        )
    }

    #[test]
    fn test_pwd_prints_current_dir() {
        let mut env = test_env();
        let expected = format!("{}\n", env.current_dir.to_string_lossy());
        let (code, out, _) = run("pwd", &[], &mut env);
        assert_eq!(code, 0);
        assert_eq!(out, expected);
    }

    #[test]
    fn test_echo_with_and_without_newline() {
        let mut env = test_env();
        assert_eq!(run("echo", &["hello", "world"], &mut env).1, "hello world\n");
        assert_eq!(run("echo", &["-n", "foo", "bar"], &mut env).1, "foo bar");
        assert_eq!(run("echo", &[], &mut env).1, "\n");
    }

    #[test]
    fn test_cd_to_absolute_path_and_home() {
        let _lock = lock_current_dir();
        let orig = env::current_dir().unwrap();
        let temp = tempfile::tempdir().unwrap();
        let canonical_temp = fs::canonicalize(temp.path()).unwrap();

        let mut shell_env = test_env();
        let target = canonical_temp.to_string_lossy().to_string();
        let (code, _, _) = run("cd", &[target.as_str()], &mut shell_env);
        assert_eq!(code, 0);
        assert_eq!(shell_env.current_dir, canonical_temp);

        shell_env.current_dir = orig.clone();
        shell_env.set_var("HOME", target.clone());
        let (code, _, _) = run("cd", &["~"], &mut shell_env);
        assert_eq!(code, 0);
        assert_eq!(shell_env.current_dir, canonical_temp);

        shell_env.current_dir = orig.clone();
        let (code, _, _) = run("cd", &["$HOME"], &mut shell_env);
        assert_eq!(code, 0);
        assert_eq!(shell_env.current_dir, canonical_temp);

        env::set_current_dir(orig).expect("failed to restore cwd");
    }

    #[test]
    fn test_cd_nonexistent_path_reports_on_stderr() {
        let _lock = lock_current_dir();
        let orig = env::current_dir().unwrap();
        let mut shell_env = test_env();

        let (code, out, err) = run("cd", &["/nonexistent_dir_for_cd_test"], &mut shell_env);
        assert_eq!(code, 1);
        assert!(out.is_empty());
        assert_eq!(err, "cd: /nonexistent_dir_for_cd_test: No such file or directory\n");
        assert_eq!(env::current_dir().unwrap(), orig);
    }

    #[test]
    fn test_exit_records_requested_code() {
        let mut env = test_env();
        run("exit", &["3"], &mut env);
        assert_eq!(env.exit_requested, Some(3));

        let mut env = test_env();
        run("exit", &["abc"], &mut env);
        assert_eq!(env.exit_requested, Some(0));
    }

    #[test]
    #[cfg(unix)]
    fn test_type_reports_builtins_paths_and_missing() {
        let mut env = test_env();
        env.set_var("PATH", "/bin");
        let (code, out, _) = run("type", &["echo", "sh", "nonexistent_cmd_42"], &mut env);
        assert_eq!(code, 1);
        assert_eq!(
            out,
            "echo is a shell builtin\nsh is /bin/sh\nnonexistent_cmd_42: not found\n"
        );
    }

    #[test]
    fn test_history_listing_and_persistence() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("hist");
        let file_arg = file.to_string_lossy().to_string();

        let mut env = test_env();
        env.history.add("ls");
        env.history.add("pwd");
        env.history.add("history 2");

        let (_, out, _) = run("history", &["2"], &mut env);
        assert_eq!(out, "    2 pwd\n    3 history 2\n");

        run("history", &["-a", file_arg.as_str()], &mut env);
        run("history", &["-a", file_arg.as_str()], &mut env);
        assert_eq!(fs::read_to_string(&file)?, "ls\npwd\nhistory 2\n");

        let mut fresh = test_env();
        run("history", &["-r", file_arg.as_str()], &mut fresh);
        assert_eq!(fresh.history.len(), 3);
        Ok(())
    }

    #[test]
    fn test_history_listing_when_empty() {
        let mut env = test_env();
        let (code, out, _) = run("history", &[], &mut env);
        assert_eq!(code, 0);
        assert_eq!(out, "No commands in history.\n");
    }

    #[test]
    fn test_bad_arguments_are_reported() {
        let mut env = test_env();
        let (code, out, err) = run("history", &["not-a-number"], &mut env);
        assert_eq!(code, 1);
        assert!(out.is_empty());
        assert!(!err.is_empty());
    }

    #[test]
    fn test_unknown_builtin_is_not_found() {
        let registry = BuiltinRegistry::default();
        let mut env = test_env();
        let res = registry.dispatch(
            "nope",
            &[],
            &mut Cursor::new(Vec::new()),
            &mut Vec::new(),
            &mut Vec::new(),
            &mut env,
        );
        assert!(matches!(res, Err(ShellError::CommandNotFound(_))));
    }

    #[test]
    fn test_registry_names_sorted() {
        assert_eq!(
            BuiltinRegistry::default().names(),
            vec!["cd", "echo", "exit", "history", "pwd", "type"]
        );
    }
}
