use crate::builtin::BuiltinRegistry;
use crate::command::{ExitCode, Stage, StageKind};
use crate::completion::CompletionIndex;
use crate::editor::{LineEditor, ReadOutcome};
use crate::env::Environment;
use crate::error::ShellError;
use crate::executor::{ErrorOutput, PipelineExecutor, PipelineIo, StageInput, StageOutput};
use crate::io_adapters::MemWriter;
use crate::parser::parse_line;
use std::ffi::OsStr;
use std::path::PathBuf;

const PROMPT: &str = "$ ";

/// A minimal interactive shell.
///
/// The interpreter owns the [`Environment`] (including history), the built-in
/// registry and the completion index. Lines are split into pipeline stages,
/// routed to built-ins or PATH executables, and run concurrently.
///
/// Example
/// ```
/// use minishell::Interpreter;
/// use minishell::io_adapters::MemWriter;
///
/// let mut sh = Interpreter::default();
/// let (out, err) = (MemWriter::new(), MemWriter::new());
/// sh.execute_line_with_output("echo 'hello   world'", &out, &err).unwrap();
/// assert_eq!(out.to_string_lossy(), "hello   world\n");
/// ```
pub struct Interpreter {
    env: Environment,
    builtins: BuiltinRegistry,
    completions: CompletionIndex,
}

impl Interpreter {
    /// Create an interpreter around a custom set of built-ins.
    ///
    /// The completion index is filled from the built-in names and PATH.
    pub fn new(builtins: BuiltinRegistry) -> Self {
        let mut env = Environment::new();
        env.builtin_names = builtins.names();

        let mut completions = CompletionIndex::new();
        let search_paths = env.get_var("PATH").unwrap_or_default();
        completions.populate(builtins.names(), OsStr::new(&search_paths));

        Self {
            env,
            builtins,
            completions,
        }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    /// Use `path` as the history file and load whatever it already holds.
    ///
    /// An unreadable file leaves the history empty.
    pub fn load_history(&mut self, path: PathBuf) {
        match self.env.history.load_from(&path) {
            Ok(n) => tracing::debug!("loaded {} history entries from {}", n, path.display()),
            Err(e) => tracing::debug!("ignoring history file: {}", e),
        }
        self.env.histfile = Some(path);
    }

    /// Append the entries added this session to the history file, if any.
    pub fn persist_history(&mut self) {
        let Some(path) = self.env.histfile.clone() else {
            return;
        };
        match self.env.history.append_new_to(&path) {
            Ok(()) => tracing::debug!("history appended to {}", path.display()),
            Err(e) => eprintln!("{}", e),
        }
    }

    /// Exit code requested by the `exit` built-in, if it ran.
    pub fn exit_requested(&self) -> Option<ExitCode> {
        self.env.exit_requested
    }

    /// Run one line against the shell's own standard streams.
    pub fn execute_line(&mut self, line: &str) -> Result<(), ShellError> {
        self.execute(line, PipelineIo::inherit())
    }

    /// Run one line with stdout and stderr captured instead of inherited.
    ///
    /// Redirections on the line still take precedence over the captures.
    pub fn execute_line_with_output(
        &mut self,
        line: &str,
        stdout: &MemWriter,
        stderr: &MemWriter,
    ) -> Result<(), ShellError> {
        let io = PipelineIo {
            stdin: StageInput::Null,
            stdout: StageOutput::Capture(stdout.clone()),
            stderr: ErrorOutput::Capture(stderr.clone()),
            last_stderr: None,
        };
        self.execute(line, io)
    }

    /// Run a single line non-interactively and turn the outcome into an exit code.
    pub fn run_command(&mut self, line: &str) -> ExitCode {
        match self.execute_line(line) {
            Ok(()) => self.env.exit_requested.unwrap_or(0),
            Err(e) => {
                eprintln!("{}", e);
                exit_code_of(&e)
            }
        }
    }

    fn execute(&mut self, line: &str, mut io: PipelineIo) -> Result<(), ShellError> {
        let parsed = parse_line(line)?;
        if parsed.is_empty() {
            return Ok(());
        }

        let stages: Vec<Stage> = parsed
            .stages
            .into_iter()
            .map(|argv| {
                let kind = match argv.first() {
                    Some(name) if self.builtins.contains(name) => StageKind::Builtin,
                    _ => StageKind::External,
                };
                Stage::from_argv(argv, kind)
            })
            .collect();

        // Targets are created before anything runs; a failure aborts the line.
        if let Some(spec) = &parsed.stdout {
            io.stdout = StageOutput::File(spec.open(&self.env.current_dir)?);
        }
        if let Some(spec) = &parsed.stderr {
            io.last_stderr = Some(ErrorOutput::File(spec.open(&self.env.current_dir)?));
        }

        tracing::debug!("running {} stage(s)", stages.len());
        PipelineExecutor::new(&self.builtins).run(stages, io, &mut self.env)
    }

    /// The interactive read-eval-print loop.
    ///
    /// Returns the code the process should exit with. History is appended to the
    /// history file on `exit` and at end of input, but not on Ctrl-C.
    pub fn repl(&mut self) -> anyhow::Result<ExitCode> {
        loop {
            let outcome =
                LineEditor::new(PROMPT, &self.env.history, &self.completions).read_from_terminal()?;

            match outcome {
                ReadOutcome::Line(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    self.env.history.add(line);
                    if let Err(e) = self.execute_line(line) {
                        eprintln!("{}", e);
                    }
                    if let Some(code) = self.env.exit_requested {
                        self.persist_history();
                        return Ok(code);
                    }
                }
                ReadOutcome::Eof => {
                    self.persist_history();
                    return Ok(0);
                }
                ReadOutcome::Interrupted => return Ok(0),
            }
        }
    }
}

impl Default for Interpreter {
    /// Interpreter with the standard built-ins: `echo`, `exit`, `type`, `pwd`,
    /// `cd` and `history`.
    fn default() -> Self {
        Self::new(BuiltinRegistry::default())
    }
}

fn exit_code_of(err: &ShellError) -> ExitCode {
    match err {
        ShellError::CommandNotFound(_) => 127,
        ShellError::ExitStatus { status, .. } => status.code().unwrap_or(1),
        _ => 1,
    }
}
