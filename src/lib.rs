//! A small interactive shell.
//!
//! This crate provides the building blocks of an interactive command line: a
//! quote-aware tokenizer, a pipeline executor that mixes built-in commands with
//! spawned processes over synchronous byte streams, and a raw-mode line editor
//! with history recall and trie-based tab completion.
//!
//! The main entry point is [`Interpreter`], which owns the shell state and can
//! either execute single lines or drive the interactive loop. The public modules
//! expose the individual pieces so they can be embedded and tested on their own.

mod builtin;
pub mod command;
pub mod completion;
pub mod editor;
pub mod env;
pub mod error;
pub mod executor;
mod external;
pub mod history;
mod interpreter;
pub mod io_adapters;
pub mod lexer;
pub mod parser;

pub use builtin::BuiltinRegistry;
pub use error::ShellError;
pub use external::find_command_path;
/// Just a convenient re-export of the interactive command runner.
///
/// See [`Interpreter`] for the high-level API and examples.
pub use interpreter::Interpreter;
