use crate::env::Environment;
use anyhow::Result;
use std::io::{Read, Write};

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells and many command-line tools.
pub type ExitCode = i32;

/// Object-safe trait for a command that runs inside the shell process.
///
/// Built-ins implement it through a blanket impl; it is what the
/// [`BuiltinRegistry`](crate::BuiltinRegistry) hands to a pipeline stage.
pub trait ExecutableCommand {
    /// Executes the command against the given streams and shell environment.
    fn execute(
        self: Box<Self>,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode>;
}

/// Factory that creates a command instance from its arguments.
///
/// One factory is registered per built-in name. Factories are shared between
/// the concurrently running stages of a pipeline, hence the `Send + Sync` bound.
pub trait CommandFactory: Send + Sync {
    /// Name the command is registered under, e.g. "echo".
    fn name(&self) -> &'static str;

    /// Create a command for the provided arguments (without the command name).
    fn create(&self, args: &[&str]) -> Box<dyn ExecutableCommand>;
}

/// How a pipeline stage is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    /// Dispatched in-process through the built-in registry.
    Builtin,
    /// Resolved through PATH and spawned as a child process.
    External,
}

/// One command of a pipeline, with quoting already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub name: String,
    pub args: Vec<String>,
    pub kind: StageKind,
}

impl Stage {
    /// Build a stage from a full argv, where `argv[0]` is the command name.
    ///
    /// An empty argv yields a stage with an empty name, which the executor skips.
    pub fn from_argv(mut argv: Vec<String>, kind: StageKind) -> Self {
        let name = if argv.is_empty() {
            String::new()
        } else {
            argv.remove(0)
        };
        Self {
            name,
            args: argv,
            kind,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }
}
