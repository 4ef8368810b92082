use crate::error::ShellError;
use crate::lexer::{split_pipeline, tokenize};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Which standard stream a redirection replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectStream {
    Stdout,
    Stderr,
}

/// An output redirection such as `> out.txt` or `2>> err.log`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectSpec {
    pub stream: RedirectStream,
    pub target: PathBuf,
    /// `>>` appends instead of truncating.
    pub append: bool,
}

impl RedirectSpec {
    /// Create (or open for append) the target, relative to `base_dir`.
    pub fn open(&self, base_dir: &Path) -> Result<File, ShellError> {
        let path = base_dir.join(&self.target);
        let mut options = OpenOptions::new();
        options.create(true);
        if self.append {
            options.append(true);
        } else {
            options.write(true).truncate(true);
        }
        options
            .open(&path)
            .map_err(|source| ShellError::Redirection { path, source })
    }
}

/// A raw input line broken into pipeline stages.
///
/// Redirections are taken from the final stage only and never appear in any argv.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CommandLine {
    /// Full argv per stage; `argv[0]` is the command name. May contain empty argvs.
    pub stages: Vec<Vec<String>>,
    pub stdout: Option<RedirectSpec>,
    pub stderr: Option<RedirectSpec>,
}

impl CommandLine {
    pub fn is_empty(&self) -> bool {
        self.stages.iter().all(Vec::is_empty)
    }
}

/// Split on unquoted `|`, tokenize every stage and pull the redirections out of
/// the last one.
pub fn parse_line(line: &str) -> Result<CommandLine, ShellError> {
    let mut stages: Vec<Vec<String>> = split_pipeline(line)
        .iter()
        .map(|segment| tokenize(segment).1)
        .collect();

    let mut parsed = CommandLine::default();
    if let Some(last) = stages.pop() {
        let (argv, stdout, stderr) = extract_redirections(last)?;
        stages.push(argv);
        parsed.stdout = stdout;
        parsed.stderr = stderr;
    }
    parsed.stages = stages;
    Ok(parsed)
}

/// Remove `>`, `1>`, `2>`, `>>`, `1>>` and `2>>` together with their targets
/// from `argv`, scanning left to right.
///
/// A later redirection of the same stream replaces an earlier one.
pub fn extract_redirections(
    argv: Vec<String>,
) -> Result<(Vec<String>, Option<RedirectSpec>, Option<RedirectSpec>), ShellError> {
    let mut kept = Vec::with_capacity(argv.len());
    let (mut stdout, mut stderr) = (None, None);
    let mut tokens = argv.into_iter();

    while let Some(token) = tokens.next() {
        let (stream, append) = match token.as_str() {
            ">" | "1>" => (RedirectStream::Stdout, false),
            ">>" | "1>>" => (RedirectStream::Stdout, true),
            "2>" => (RedirectStream::Stderr, false),
            "2>>" => (RedirectStream::Stderr, true),
            _ => {
                kept.push(token);
                continue;
            }
        };
        let target = tokens
            .next()
            .ok_or_else(|| ShellError::MissingRedirectTarget(token.clone()))?;
        let spec = RedirectSpec {
            stream,
            target: PathBuf::from(target),
            append,
        };
        match stream {
            RedirectStream::Stdout => stdout = Some(spec),
            RedirectStream::Stderr => stderr = Some(spec),
        }
    }

    Ok((kept, stdout, stderr))
}
