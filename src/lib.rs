//! Core of a small job-control shell: a parser that turns an input line into
//! a [`Job`] of piped [`Command`]s with redirections, and an executor that
//! runs the job as one process group, in the foreground or in the background.
//!
//! ```no_run
//! use jsh::{execute, parse, State};
//!
//! let mut state = State::default();
//! let job = parse("ls -la | wc -l > count.txt", " ").unwrap();
//! let execution = execute(&mut state, job).unwrap();
//! println!("exit {:?}", execution.code());
//! ```

pub mod builtin;
pub mod config;
pub mod error;
pub mod eval;
pub mod global;
pub mod job;
pub mod parser;
pub mod search;
pub mod shell;
pub mod signals;
pub mod tokenize;
pub mod types;

pub use config::Config;
pub use error::{ExecError, SyntaxError};
pub use eval::{execute, Execution};
pub use global::State;
pub use job::{JobId, JobRegistry};
pub use parser::parse;
pub use shell::Shell;
pub use types::{Command, Job};
