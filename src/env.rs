use crate::command::ExitCode;
use crate::history::HistoryStore;
use std::collections::HashMap;
use std::env as stdenv;
use std::path::PathBuf;

/// Mutable, user-level view of the shell state shared with built-in commands.
///
/// The environment contains:
/// - `vars`: environment variables visible to executed commands.
/// - `current_dir`: the working directory for command execution.
/// - `history`: every line submitted during this session (and loaded ones).
/// - `histfile`: where history is persisted on exit, if anywhere.
/// - `exit_requested`: set by `exit`; the interactive loop terminates when present.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Key-value store of environment variables (e.g., PATH, HOME).
    pub vars: HashMap<String, String>,
    /// The current working directory for command execution.
    pub current_dir: PathBuf,
    /// Session history, shared with the line editor for recall.
    pub history: HistoryStore,
    /// History file read at startup and appended to on exit.
    pub histfile: Option<PathBuf>,
    /// Names of the registered built-ins, used by `type`.
    pub builtin_names: Vec<&'static str>,
    /// Exit code requested by the `exit` built-in.
    pub exit_requested: Option<ExitCode>,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    ///
    /// This copies variables from `std::env::vars()` and initializes `current_dir`
    /// from `std::env::current_dir()`. History starts out empty.
    pub fn new() -> Self {
        let vars = stdenv::vars().collect();
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            vars,
            current_dir,
            history: HistoryStore::default(),
            histfile: None,
            builtin_names: Vec::new(),
            exit_requested: None,
        }
    }

    /// Get the value of an environment variable.
    ///
    /// Looks up the key in `self.vars` first, falling back to `std::env::var`.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .cloned()
            .or_else(|| stdenv::var(key).ok())
    }

    /// Set or override an environment variable in `self.vars`.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.builtin_names.contains(&name)
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_set_and_get_var() {
        let mut env = Environment {
            vars: HashMap::new(),
            ..Environment::new()
        };

        assert_eq!(env.get_var("SOME_RANDOM_ENV_VAR_12345"), None);

        env.set_var("KEY", "VALUE");

        assert_eq!(env.get_var("KEY"), Some("VALUE".to_string()));
    }

    #[test]
    fn test_env_reads_from_process_env() {
        let env = Environment::new();
        assert!(env.get_var("PATH").is_some());
        assert!(env.history.is_empty());
        assert_eq!(env.exit_requested, None);
    }

    #[test]
    fn test_env_builtin_lookup() {
        let mut env = Environment::new();
        env.builtin_names = vec!["echo", "cd"];
        assert!(env.is_builtin("cd"));
        assert!(!env.is_builtin("ls"));
    }
}
