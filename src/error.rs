use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

/// Errors surfaced to the interactive loop.
///
/// None of these terminate the shell; the loop prints them as a single line on
/// stderr and reads the next line.
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    /// No built-in and no executable on PATH matches the name.
    #[error("{0}: command not found")]
    CommandNotFound(String),

    /// The executable was found but could not be started.
    #[error("{name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },

    /// The process ran but did not exit successfully.
    #[error("{name}: {status}")]
    ExitStatus { name: String, status: ExitStatus },

    /// A redirection target could not be opened.
    #[error("{}: {source}", path.display())]
    Redirection {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A redirection operator was not followed by a file name.
    #[error("syntax error: expected a file name after `{0}`")]
    MissingRedirectTarget(String),

    /// Reading or writing the history file failed.
    #[error("history: {}: {source}", path.display())]
    HistoryIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}
