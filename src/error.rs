use std::{ffi, io};

use thiserror::Error;

/// Child exit status for a program that could not be found.
pub const EXIT_NOT_FOUND: i32 = 127;
/// Child exit status for any other failure before program replacement.
pub const EXIT_CANNOT_EXEC: i32 = 126;

/// Malformed input line. Nothing from the line is executed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyntaxError {
	#[error("syntax error: `{operator}` needs a file name")]
	MissingRedirectTarget { operator: String },
}

pub type ParseResult<T> = Result<T, SyntaxError>;

/// Failures the parent observes while running a pipeline.
#[derive(Debug, Error)]
pub enum ExecError {
	#[error("cannot create pipe: {0}")]
	Pipe(#[source] nix::Error),
	#[error("cannot spawn stage {stage}: {source}")]
	Spawn { stage: usize, #[source] source: nix::Error },
	#[error("wait failed: {0}")]
	Wait(#[source] nix::Error),
}

/// Failures inside a forked child, before or during program replacement.
///
/// The parent only ever sees these through the child's exit status.
#[derive(Debug, Error)]
pub enum ChildError {
	#[error("{path}: {source}")]
	Redirection { path: String, #[source] source: io::Error },
	#[error("command not found: {name}")]
	CommandNotFound { name: String },
	#[error("{name}: {source}")]
	NotExecutable { name: String, #[source] source: nix::Error },
	#[error("missing command name")]
	EmptyCommand,
	#[error("nul character in argument: {0}")]
	Nul(#[from] ffi::NulError),
	#[error("cannot rebind stream: {0}")]
	Dup(#[source] nix::Error),
}

impl ChildError {
	pub fn exit_code(&self) -> i32 {
		match *self {
			ChildError::CommandNotFound { .. } => EXIT_NOT_FOUND,
			_ => EXIT_CANNOT_EXEC,
		}
	}
}

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("cannot read config: {0}")]
	Io(#[from] io::Error),
	#[error("invalid config: {0}")]
	Toml(#[from] toml::de::Error),
}
