//! Concurrent execution of pipelines.
//!
//! Every stage runs on its own scoped thread. Adjacent stages are linked by
//! zero-capacity [connectors](crate::io_adapters::connector); external stages
//! talk to their child process through OS pipes plus small pump threads that copy
//! between the pipe and the connector.

use crate::builtin::BuiltinRegistry;
use crate::command::{Stage, StageKind};
use crate::env::Environment;
use crate::error::ShellError;
use crate::external::{ExternalCommand, LaunchContext};
use crate::io_adapters::{ConnectorReader, ConnectorWriter, MemWriter, connector};
use std::fs::File;
use std::io::{self, Read, Write};
use std::process::Stdio;
use std::sync::mpsc;
use std::sync::{Condvar, Mutex, PoisonError};
use std::thread;

/// Where a stage reads from.
pub enum StageInput {
    /// The shell's own stdin.
    Inherit,
    /// Nothing; reads see end-of-stream immediately.
    Null,
    /// The previous stage of the pipeline.
    Pipe(ConnectorReader),
}

/// Where a stage writes its standard output.
pub enum StageOutput {
    /// The shell's own stdout.
    Inherit,
    /// A redirection target.
    File(File),
    /// The next stage of the pipeline.
    Pipe(ConnectorWriter),
    /// An in-memory buffer.
    Capture(MemWriter),
}

/// Where a stage writes its diagnostics.
pub enum ErrorOutput {
    Inherit,
    File(File),
    Capture(MemWriter),
}

impl ErrorOutput {
    fn try_clone(&self) -> io::Result<Self> {
        Ok(match self {
            Self::Inherit => Self::Inherit,
            Self::File(f) => Self::File(f.try_clone()?),
            Self::Capture(m) => Self::Capture(m.clone()),
        })
    }
}

/// The outer streams of one pipeline run.
pub struct PipelineIo {
    /// Input of the first stage.
    pub stdin: StageInput,
    /// Output of the last stage.
    pub stdout: StageOutput,
    /// Diagnostics of every stage but the last.
    pub stderr: ErrorOutput,
    /// Diagnostics of the last stage; defaults to `stderr`.
    pub last_stderr: Option<ErrorOutput>,
}

impl PipelineIo {
    /// The shell's own standard streams.
    pub fn inherit() -> Self {
        Self {
            stdin: StageInput::Inherit,
            stdout: StageOutput::Inherit,
            stderr: ErrorOutput::Inherit,
            last_stderr: None,
        }
    }
}

/// Runs a sequence of stages with their streams wired together.
pub struct PipelineExecutor<'a> {
    builtins: &'a BuiltinRegistry,
}

impl<'a> PipelineExecutor<'a> {
    pub fn new(builtins: &'a BuiltinRegistry) -> Self {
        Self { builtins }
    }

    /// Run every stage concurrently and return the first error reported.
    ///
    /// Stages with an empty name are dropped before wiring. A single remaining
    /// stage runs on the calling thread without any connector.
    pub fn run(
        &self,
        stages: Vec<Stage>,
        io: PipelineIo,
        env: &mut Environment,
    ) -> Result<(), ShellError> {
        let stages: Vec<Stage> = stages.into_iter().filter(|s| !s.is_empty()).collect();
        let n = stages.len();
        if n == 0 {
            return Ok(());
        }

        let PipelineIo {
            stdin,
            stdout,
            stderr,
            last_stderr,
        } = io;
        let last_stderr = match last_stderr {
            Some(e) => e,
            None => stderr.try_clone()?,
        };

        let launch = LaunchContext::from_env(env);
        let turns = EnvTurns::new(env);
        let ctx = StageContext {
            builtins: self.builtins,
            turns: &turns,
            launch: &launch,
        };

        // Built-ins get the environment in pipeline order.
        let mut builtin_turns = stages.iter().scan(0, |next, stage| {
            let turn = *next;
            if stage.kind == StageKind::Builtin {
                *next += 1;
            }
            Some(turn)
        });

        if n == 1 {
            let stage = StageRun {
                index: 0,
                turn: 0,
                is_last: true,
                input: stdin,
                output: stdout,
                stderr: last_stderr,
            };
            return stage.run(&stages[0], &ctx);
        }

        let mut runs = Vec::with_capacity(n);
        let mut input = stdin;
        for index in 0..n - 1 {
            let (writer, reader) = connector();
            runs.push(StageRun {
                index,
                turn: builtin_turns.next().unwrap_or(0),
                is_last: false,
                input,
                output: StageOutput::Pipe(writer),
                stderr: stderr.try_clone()?,
            });
            input = StageInput::Pipe(reader);
        }
        runs.push(StageRun {
            index: n - 1,
            turn: builtin_turns.next().unwrap_or(0),
            is_last: true,
            input,
            output: stdout,
            stderr: last_stderr,
        });

        let (done_tx, done_rx) = mpsc::channel();
        let ctx = &ctx;
        thread::scope(|scope| {
            for (run, stage) in runs.into_iter().zip(&stages) {
                let done_tx = done_tx.clone();
                scope.spawn(move || {
                    let index = run.index;
                    let result = run.run(stage, ctx);
                    // The receiver outlives every stage.
                    let _ = done_tx.send((index, result));
                });
            }
            drop(done_tx);

            let mut first_error = None;
            for (index, result) in done_rx.iter().take(n) {
                tracing::trace!("stage {} finished: {:?}", index, result);
                if let Err(e) = result {
                    first_error.get_or_insert(e);
                }
            }
            first_error.map_or(Ok(()), Err)
        })
    }
}

/// Serializes built-in access to the environment in pipeline order.
///
/// A built-in waits for every built-in before it to finish, so a built-in that
/// reads its input never holds the environment while an upstream built-in
/// still needs it.
struct EnvTurns<'e> {
    state: Mutex<TurnState<'e>>,
    turn_passed: Condvar,
}

struct TurnState<'e> {
    next: usize,
    env: &'e mut Environment,
}

impl<'e> EnvTurns<'e> {
    fn new(env: &'e mut Environment) -> Self {
        Self {
            state: Mutex::new(TurnState { next: 0, env }),
            turn_passed: Condvar::new(),
        }
    }

    /// Wait for `turn`, run `f` with the environment, then pass the turn on.
    fn with_env<T>(&self, turn: usize, f: impl FnOnce(&mut Environment) -> T) -> T {
        // Dropped after the guard below, also when `f` panics.
        let _pass = TurnPass { turns: self };
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        while state.next != turn {
            state = self
                .turn_passed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        f(&mut *state.env)
    }
}

struct TurnPass<'a, 'e> {
    turns: &'a EnvTurns<'e>,
}

impl Drop for TurnPass<'_, '_> {
    fn drop(&mut self) {
        let mut state = self.turns.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.next += 1;
        drop(state);
        self.turns.turn_passed.notify_all();
    }
}

/// Shared, read-only inputs of every stage in one run.
struct StageContext<'a, 'e> {
    builtins: &'a BuiltinRegistry,
    turns: &'a EnvTurns<'e>,
    launch: &'a LaunchContext,
}

/// One stage together with the streams it owns.
struct StageRun {
    index: usize,
    /// Position among the built-in stages; unused by external stages.
    turn: usize,
    is_last: bool,
    input: StageInput,
    output: StageOutput,
    stderr: ErrorOutput,
}

impl StageRun {
    /// Consumes the stage's streams; dropping them closes any connector ends
    /// exactly once, whatever the outcome.
    fn run(self, stage: &Stage, ctx: &StageContext<'_, '_>) -> Result<(), ShellError> {
        match stage.kind {
            StageKind::Builtin => {
                self.run_builtin(stage, ctx);
                Ok(())
            }
            StageKind::External => self.run_external(stage, ctx.launch),
        }
    }

    fn run_builtin(self, stage: &Stage, ctx: &StageContext<'_, '_>) {
        let StageRun {
            index,
            turn,
            is_last,
            mut input,
            output,
            stderr,
        } = self;

        // Output is buffered while the environment is locked so that two
        // built-ins in one pipeline never wait on each other's connector.
        let (mut out, mut err) = (Vec::new(), Vec::new());
        let result = ctx.turns.with_env(turn, |env| {
            let mut reader = InputReader::new(&mut input);
            ctx.builtins
                .dispatch(&stage.name, &stage.args, &mut reader, &mut out, &mut err, env)
        });
        match result {
            Ok(code) => tracing::debug!("stage {} ({}) exited with {}", index, stage.name, code),
            Err(e) => {
                let _ = writeln!(err, "{}", e);
            }
        }

        if let Err(e) = write_output(output, &out) {
            tracing::debug!("stage {} ({}): {}", index, stage.name, e);
        }
        if !err.is_empty() {
            if let Err(e) = write_error(stderr, &err) {
                tracing::debug!("stage {} ({}): {}", index, stage.name, e);
            }
        }

        if is_last {
            if let StageInput::Pipe(mut reader) = input {
                match reader.drain() {
                    Ok(n) if n > 0 => tracing::trace!("drained {} unread bytes", n),
                    Ok(_) => {}
                    Err(e) => tracing::debug!("drain failed: {}", e),
                }
            }
        }
    }

    fn run_external(self, stage: &Stage, launch: &LaunchContext) -> Result<(), ShellError> {
        let StageRun {
            index,
            input,
            output,
            stderr,
            ..
        } = self;

        let Some(external) = ExternalCommand::resolve(launch, &stage.name, &stage.args) else {
            // Closing both ends here keeps neighbouring stages from blocking.
            drop(output);
            drop(input);
            return Err(ShellError::CommandNotFound(stage.name.clone()));
        };

        let (stdin_stdio, mut stdin_pump) = match input {
            StageInput::Inherit => (Stdio::inherit(), None),
            StageInput::Null => (Stdio::null(), None),
            StageInput::Pipe(reader) => (Stdio::piped(), Some(reader)),
        };
        let (stdout_stdio, mut stdout_pump): (Stdio, Option<Box<dyn Write + Send>>) = match output
        {
            StageOutput::Inherit => (Stdio::inherit(), None),
            StageOutput::File(f) => (Stdio::from(f), None),
            StageOutput::Pipe(w) => (Stdio::piped(), Some(Box::new(w) as Box<dyn Write + Send>)),
            StageOutput::Capture(m) => (Stdio::piped(), Some(Box::new(m) as Box<dyn Write + Send>)),
        };
        let (stderr_stdio, mut stderr_pump) = match stderr {
            ErrorOutput::Inherit => (Stdio::inherit(), None),
            ErrorOutput::File(f) => (Stdio::from(f), None),
            ErrorOutput::Capture(m) => (Stdio::piped(), Some(m)),
        };

        tracing::debug!(
            "stage {}: spawning {} {:?}",
            index,
            external.program().display(),
            stage.args
        );
        let spawned = external
            .command(launch, stdin_stdio, stdout_stdio, stderr_stdio)
            .spawn();
        let mut child = spawned.map_err(|source| ShellError::Spawn {
            name: stage.name.clone(),
            source,
        })?;

        let child_stdin = child.stdin.take();
        let child_stdout = child.stdout.take();
        let child_stderr = child.stderr.take();

        let status = thread::scope(|scope| {
            if let (Some(mut reader), Some(mut pipe)) = (stdin_pump.take(), child_stdin) {
                scope.spawn(move || {
                    // The child may exit without reading everything.
                    if let Err(e) = io::copy(&mut reader, &mut pipe) {
                        tracing::trace!("stdin pump stopped: {}", e);
                    }
                });
            }
            if let (Some(mut writer), Some(mut pipe)) = (stdout_pump.take(), child_stdout) {
                scope.spawn(move || {
                    if let Err(e) = io::copy(&mut pipe, &mut writer) {
                        tracing::trace!("stdout pump stopped: {}", e);
                    }
                });
            }
            if let (Some(mut writer), Some(mut pipe)) = (stderr_pump.take(), child_stderr) {
                scope.spawn(move || {
                    let _ = io::copy(&mut pipe, &mut writer);
                });
            }
            child.wait()
        })
        .map_err(|source| ShellError::Spawn {
            name: stage.name.clone(),
            source,
        })?;

        tracing::debug!("stage {} ({}) exited with {}", index, stage.name, status);
        if status.success() || killed_by_broken_pipe(&status) {
            Ok(())
        } else {
            Err(ShellError::ExitStatus {
                name: stage.name.clone(),
                status,
            })
        }
    }
}

/// A writer whose reader went away is not a failed command.
#[cfg(unix)]
fn killed_by_broken_pipe(status: &std::process::ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;
    const SIGPIPE: i32 = 13;
    status.signal() == Some(SIGPIPE)
}

#[cfg(not(unix))]
fn killed_by_broken_pipe(_status: &std::process::ExitStatus) -> bool {
    false
}

/// Reader view of a [`StageInput`] for in-process commands.
struct InputReader<'a> {
    input: &'a mut StageInput,
}

impl<'a> InputReader<'a> {
    fn new(input: &'a mut StageInput) -> Self {
        Self { input }
    }
}

impl Read for InputReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut *self.input {
            StageInput::Inherit => io::stdin().read(buf),
            StageInput::Null => Ok(0),
            StageInput::Pipe(reader) => reader.read(buf),
        }
    }
}

fn write_output(output: StageOutput, data: &[u8]) -> io::Result<()> {
    match output {
        StageOutput::Inherit => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(data)?;
            stdout.flush()
        }
        StageOutput::File(mut f) => f.write_all(data),
        StageOutput::Pipe(mut w) => w.write_all(data),
        StageOutput::Capture(mut m) => m.write_all(data),
    }
}

fn write_error(stderr: ErrorOutput, data: &[u8]) -> io::Result<()> {
    match stderr {
        ErrorOutput::Inherit => io::stderr().lock().write_all(data),
        ErrorOutput::File(mut f) => f.write_all(data),
        ErrorOutput::Capture(mut m) => m.write_all(data),
    }
}
