use std::fs;
use std::io::{self, Write};

use tracing::warn;

use crate::builtin::{Builtins, Flow};
use crate::config::Config;
use crate::error::SyntaxError;
use crate::eval::{self, Execution};
use crate::global::State;
use crate::job::{State as JobState, WaitStatusExt};
use crate::parser;
use crate::types::Command;

/// One interactive session: state carried between lines plus the
/// builtin table.
pub struct Shell {
	pub state: State,
	builtins: Builtins,
	last_code: i32,
}

impl Shell {
	pub fn new(config: Config) -> Shell {
		Shell { state: State::new(config), builtins: Builtins::new(), last_code: 0 }
	}

	pub fn prompt(&self) -> &str {
		&self.state.config.prompt
	}

	pub fn last_code(&self) -> i32 {
		self.last_code
	}

	/// Opens the output target a builtin writes to, if its command line
	/// redirects standard output.
	fn builtin_output(command: &Command) -> io::Result<Option<fs::File>> {
		let path = match command.output_redirect.last() {
			Some(path) => path,
			None => return Ok(None),
		};
		let mut options = fs::OpenOptions::new();
		options.write(true).create(true);
		if command.append {
			options.append(true);
		} else {
			options.truncate(true);
		}
		options.open(path).map(Some)
	}

	/// Parses and runs one input line. A lone command naming a builtin runs
	/// in this process; everything else goes to the pipeline executor.
	pub fn run_line(&mut self, line: &str, out: &mut dyn Write) -> Result<Flow, SyntaxError> {
		let job = parser::parse(line, &self.state.config.delimiters)?;
		if job.is_empty() {
			return Ok(Flow::Continue(self.last_code));
		}

		if let Some(command) = job.single_command().filter(|_| !job.background) {
			if command.name().map_or(false, |name| self.builtins.is_builtin(name)) {
				let flow = match Shell::builtin_output(command) {
					Ok(Some(mut file)) => self.builtins.invoke(&mut self.state, &command.arguments, &mut file),
					Ok(None) => self.builtins.invoke(&mut self.state, &command.arguments, out),
					Err(e) => {
						let _ = writeln!(out, "jsh: {}", e);
						Some(Flow::Continue(1))
					},
				};
				let flow = flow.unwrap_or(Flow::Continue(1));
				self.last_code = flow.code();
				return Ok(flow);
			}
		}

		self.last_code = match eval::execute(&mut self.state, job) {
			Ok(Execution::Background(id)) => {
				if let Some(entry) = self.state.jobs.get(id) {
					let pgid = entry.group.pgid.map_or(0, |p| p.as_raw());
					let _ = writeln!(out, "[{}] {}", id, pgid);
				}
				0
			},
			Ok(Execution::Stopped(id)) => {
				let entry = self.state.jobs.get(id);
				if let Some(entry) = entry {
					let _ = writeln!(out, "[{}] {}\t{}", id, entry.group.state(), entry.job);
				}
				entry.and_then(|e| e.group.statuses().into_iter().find_map(|s| match s.state() {
					JobState::Stopped => s.code(),
					_ => None,
				})).unwrap_or(1)
			},
			Ok(execution) => execution.code().unwrap_or(0),
			Err(e) => {
				warn!(error = %e, "pipeline failed");
				let _ = writeln!(out, "jsh: {}", e);
				1
			},
		};
		Ok(Flow::Continue(self.last_code))
	}
}
