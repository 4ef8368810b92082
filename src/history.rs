use crate::error::ShellError;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Ordered, append-only log of submitted command lines.
///
/// Entries before `last_appended` are already present in the persistent log, so
/// [`append_new_to`](Self::append_new_to) only ever writes the tail.
#[derive(Debug, Clone, Default)]
pub struct HistoryStore {
    entries: Vec<String>,
    last_appended: usize,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, line: impl Into<String>) {
        self.entries.push(line.into());
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    /// Index of the first entry not yet written by `append_new_to`.
    pub fn checkpoint(&self) -> usize {
        self.last_appended
    }

    /// Append every non-empty line of `path` and mark all entries as persisted.
    ///
    /// A missing file is a valid empty history and loads nothing.
    pub fn load_from(&mut self, path: &Path) -> Result<usize, ShellError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("no history file at {}", path.display());
                return Ok(0);
            }
            Err(source) => {
                return Err(ShellError::HistoryIo {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let before = self.entries.len();
        self.entries
            .extend(content.split('\n').filter(|l| !l.is_empty()).map(String::from));
        self.last_appended = self.entries.len();
        Ok(self.entries.len() - before)
    }

    /// Replace the contents of `path` with every entry, one per line.
    pub fn overwrite_to(&self, path: &Path) -> Result<(), ShellError> {
        let file = fs::File::create(path).map_err(|source| ShellError::HistoryIo {
            path: path.to_path_buf(),
            source,
        })?;
        write_lines(file, &self.entries).map_err(|source| ShellError::HistoryIo {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Append the entries added since the last append, then advance the checkpoint.
    pub fn append_new_to(&mut self, path: &Path) -> Result<(), ShellError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| ShellError::HistoryIo {
                path: path.to_path_buf(),
                source,
            })?;
        write_lines(file, &self.entries[self.last_appended..]).map_err(|source| {
            ShellError::HistoryIo {
                path: path.to_path_buf(),
                source,
            }
        })?;
        self.last_appended = self.entries.len();
        Ok(())
    }

    /// Render entries as `"    {n} {line}"`, 1-based.
    ///
    /// `count == 0` lists everything, otherwise only the most recent `count` entries.
    pub fn listing(&self, count: usize) -> Vec<String> {
        let start = if count == 0 {
            0
        } else {
            self.entries.len().saturating_sub(count)
        };
        self.entries[start..]
            .iter()
            .enumerate()
            .map(|(i, line)| format!("    {} {}", start + i + 1, line))
            .collect()
    }
}

fn write_lines(file: fs::File, lines: &[String]) -> io::Result<()> {
    let mut writer = BufWriter::new(file);
    for line in lines {
        writeln!(writer, "{}", line)?;
    }
    writer.flush()
}
