//! Raw-mode line editor.
//!
//! The editor is driven byte by byte from any [`Read`] source and echoes to any
//! [`Write`] sink, so the same loop serves the terminal and the tests. Only the
//! keys a minimal shell needs are understood: printable ASCII, backspace,
//! Enter, Tab, Ctrl-C and the Up/Down arrows.

use crate::completion::{CompletionIndex, longest_common_prefix};
use crate::history::HistoryStore;
use std::io::{self, IsTerminal, Read, Write};

const CTRL_C: u8 = 0x03;
const BACKSPACE: u8 = 0x08;
const TAB: u8 = b'\t';
const ESC: u8 = 0x1b;
const DEL: u8 = 0x7f;

const BELL: &str = "\x07";
const CLEAR_LINE: &str = "\r\x1b[K";

/// How a call to [`LineEditor::read_line`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Enter was pressed, or input ended after some text was typed.
    Line(String),
    /// Ctrl-C.
    Interrupted,
    /// Input ended on an empty buffer.
    Eof,
}

/// Puts the terminal into raw mode for as long as it lives.
///
/// Does nothing when stdin is not a terminal.
pub struct RawModeGuard {
    enabled: bool,
}

impl RawModeGuard {
    pub fn acquire() -> io::Result<Self> {
        if !io::stdin().is_terminal() {
            return Ok(Self { enabled: false });
        }
        crossterm::terminal::enable_raw_mode()?;
        Ok(Self { enabled: true })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.enabled {
            if let Err(e) = crossterm::terminal::disable_raw_mode() {
                tracing::warn!("failed to restore terminal mode: {}", e);
            }
        }
    }
}

/// Reads one line at a time, with history recall and tab completion.
pub struct LineEditor<'a> {
    prompt: &'a str,
    history: &'a HistoryStore,
    completions: &'a CompletionIndex,
}

#[derive(Default)]
struct TabState {
    last_buffer: Option<String>,
}

struct LineState {
    buffer: String,
    history_index: usize,
    tab: TabState,
}

impl<'a> LineEditor<'a> {
    pub fn new(prompt: &'a str, history: &'a HistoryStore, completions: &'a CompletionIndex) -> Self {
        Self {
            prompt,
            history,
            completions,
        }
    }

    /// Read a line from the process's stdin with the terminal in raw mode.
    ///
    /// The terminal is restored before this returns, whatever the outcome.
    pub fn read_from_terminal(&self) -> io::Result<ReadOutcome> {
        let _guard = RawModeGuard::acquire()?;
        let mut input = unbuffered_stdin()?;
        self.read_line(&mut input, &mut io::stdout().lock())
    }

    /// Print the prompt and process `input` until a line is complete.
    pub fn read_line<R: Read, W: Write>(&self, input: &mut R, output: &mut W) -> io::Result<ReadOutcome> {
        let mut state = LineState {
            buffer: String::new(),
            history_index: self.history.len(),
            tab: TabState::default(),
        };
        write!(output, "{}", self.prompt)?;
        output.flush()?;

        loop {
            let Some(byte) = next_byte(input)? else {
                write!(output, "\r\n")?;
                output.flush()?;
                if state.buffer.is_empty() {
                    return Ok(ReadOutcome::Eof);
                }
                return Ok(ReadOutcome::Line(state.buffer));
            };

            if byte != TAB {
                state.tab = TabState::default();
            }

            match byte {
                b'\r' | b'\n' => {
                    write!(output, "\r\n")?;
                    output.flush()?;
                    return Ok(ReadOutcome::Line(state.buffer));
                }
                CTRL_C => {
                    write!(output, "^C\r\n")?;
                    output.flush()?;
                    return Ok(ReadOutcome::Interrupted);
                }
                DEL | BACKSPACE => {
                    if state.buffer.pop().is_some() {
                        self.redraw(&state, output)?;
                    }
                }
                TAB => self.complete(&mut state, output)?,
                ESC => self.escape_sequence(&mut state, input, output)?,
                0x20..=0x7e => {
                    state.buffer.push(char::from(byte));
                    output.write_all(&[byte])?;
                }
                _ => {}
            }
            output.flush()?;
        }
    }

    fn escape_sequence<R: Read, W: Write>(
        &self,
        state: &mut LineState,
        input: &mut R,
        output: &mut W,
    ) -> io::Result<()> {
        if next_byte(input)? != Some(b'[') {
            return Ok(());
        }
        match next_byte(input)? {
            Some(b'A') => self.history_up(state, output),
            Some(b'B') => self.history_down(state, output),
            _ => Ok(()),
        }
    }

    fn history_up<W: Write>(&self, state: &mut LineState, output: &mut W) -> io::Result<()> {
        if state.history_index == 0 {
            return Ok(());
        }
        state.history_index -= 1;
        if let Some(entry) = self.history.get(state.history_index) {
            state.buffer = entry.to_string();
        }
        self.redraw(state, output)
    }

    fn history_down<W: Write>(&self, state: &mut LineState, output: &mut W) -> io::Result<()> {
        if state.history_index + 1 < self.history.len() {
            state.history_index += 1;
            if let Some(entry) = self.history.get(state.history_index) {
                state.buffer = entry.to_string();
            }
        } else {
            state.history_index = self.history.len();
            state.buffer.clear();
        }
        self.redraw(state, output)
    }

    fn complete<W: Write>(&self, state: &mut LineState, output: &mut W) -> io::Result<()> {
        let mut matches = self.completions.completions(&state.buffer);
        if matches.is_empty() {
            tracing::trace!("no completion for {:?}", state.buffer);
            return output.write_all(BELL.as_bytes());
        }

        let common = longest_common_prefix(&matches);
        if let Some(extra) = common.strip_prefix(state.buffer.as_str()).filter(|e| !e.is_empty()) {
            let mut extra = extra.to_string();
            if matches.len() == 1 {
                extra.push(' ');
            }
            state.buffer.push_str(&extra);
            state.tab = TabState::default();
            return output.write_all(extra.as_bytes());
        }

        if matches.len() == 1 {
            state.buffer.push(' ');
            state.tab = TabState::default();
            return output.write_all(b" ");
        }

        if state.tab.last_buffer.as_deref() == Some(state.buffer.as_str()) {
            matches.sort();
            tracing::trace!("listing {} completions", matches.len());
            write!(output, "\r\n{}\r\n", matches.join("  "))?;
            state.tab = TabState::default();
            write!(output, "{}{}", self.prompt, state.buffer)
        } else {
            state.tab.last_buffer = Some(state.buffer.clone());
            output.write_all(BELL.as_bytes())
        }
    }

    fn redraw<W: Write>(&self, state: &LineState, output: &mut W) -> io::Result<()> {
        write!(output, "{}{}{}", CLEAR_LINE, self.prompt, state.buffer)
    }
}

/// A handle on fd 0 that bypasses std's stdin buffer, so bytes after the
/// current line stay in the kernel for whatever runs next.
#[cfg(unix)]
fn unbuffered_stdin() -> io::Result<std::fs::File> {
    use std::os::fd::AsFd;
    Ok(std::fs::File::from(io::stdin().as_fd().try_clone_to_owned()?))
}

#[cfg(not(unix))]
fn unbuffered_stdin() -> io::Result<io::StdinLock<'static>> {
    Ok(io::stdin().lock())
}

fn next_byte<R: Read>(input: &mut R) -> io::Result<Option<u8>> {
    let mut byte = [0u8; 1];
    loop {
        match input.read(&mut byte) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(byte[0])),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}
