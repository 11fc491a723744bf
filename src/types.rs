use std::fmt;

/// Which standard stream(s) a redirection operator rebinds.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RedirectKind { Input, Output, Error, Both }

impl RedirectKind {
	/// Recognizes a redirection operator token, returning the stream it
	/// targets and whether it appends.
	pub fn from_operator(token: &str) -> Option<(RedirectKind, bool)> {
		match token {
			"<" => Some((RedirectKind::Input, false)),
			">" | "1>" => Some((RedirectKind::Output, false)),
			">>" | "1>>" => Some((RedirectKind::Output, true)),
			"2>" => Some((RedirectKind::Error, false)),
			"2>>" => Some((RedirectKind::Error, true)),
			"&>" => Some((RedirectKind::Both, false)),
			"&>>" => Some((RedirectKind::Both, true)),
			_ => None,
		}
	}
}

/// One pipeline stage.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Command {
	/// `arguments[0]` is the program name. Empty only for a null stage
	/// such as the gap in `ls | | wc`.
	pub arguments: Vec<String>,
	pub input_redirect: Option<String>,
	pub output_redirect: Vec<String>,
	/// Open output targets in append mode instead of truncating.
	pub append: bool,
	pub error_redirect: Vec<String>,
	pub error_append: bool,
}

impl Command {
	pub fn name(&self) -> Option<&str> {
		self.arguments.first().map(String::as_str)
	}

	pub fn has_redirects(&self) -> bool {
		self.input_redirect.is_some() || !self.output_redirect.is_empty() || !self.error_redirect.is_empty()
	}

	pub(crate) fn redirect(&mut self, kind: RedirectKind, append: bool, target: &str) {
		match kind {
			RedirectKind::Input => self.input_redirect = Some(target.to_owned()),
			RedirectKind::Output => {
				self.output_redirect.push(target.to_owned());
				self.append |= append;
			},
			RedirectKind::Error => {
				self.error_redirect.push(target.to_owned());
				self.error_append |= append;
			},
			RedirectKind::Both => {
				self.redirect(RedirectKind::Output, append, target);
				self.redirect(RedirectKind::Error, append, target);
			},
		}
	}
}

impl fmt::Display for Command {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", self.arguments.join(" "))?;
		if let Some(ref path) = self.input_redirect {
			write!(f, " < {}", path)?;
		}
		let out_op = if self.append { ">>" } else { ">" };
		for path in &self.output_redirect {
			write!(f, " {} {}", out_op, path)?;
		}
		let err_op = if self.error_append { "2>>" } else { "2>" };
		for path in &self.error_redirect {
			write!(f, " {} {}", err_op, path)?;
		}
		Ok(())
	}
}

/// One input line: the pipeline stages plus the background marker.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Job {
	pub commands: Vec<Command>,
	pub background: bool,
}

impl Job {
	/// Nothing to run; produced by a blank line.
	pub fn is_empty(&self) -> bool {
		self.commands.is_empty()
	}

	/// A lone stage with no pipe, the only shape the REPL may route to a builtin.
	pub fn single_command(&self) -> Option<&Command> {
		match self.commands.as_slice() {
			[command] => Some(command),
			_ => None,
		}
	}
}

impl fmt::Display for Job {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		for (i, command) in self.commands.iter().enumerate() {
			if i > 0 {
				write!(f, " | ")?;
			}
			write!(f, "{}", command)?;
		}
		if self.background {
			write!(f, " &")?;
		}
		Ok(())
	}
}
