use std::collections::HashMap;

use nix::sys::signal::{self, SigHandler, Signal};

/// Signals an interactive shell ignores so that only the foreground job
/// sees them. Children restore their defaults before program replacement.
pub const JOB_CONTROL_SIGNALS: [Signal; 5] = [
	Signal::SIGINT,
	Signal::SIGQUIT,
	Signal::SIGTSTP,
	Signal::SIGTTIN,
	Signal::SIGTTOU,
];

/// Signal dispositions for the shell process, built once at start-up.
#[derive(Debug, Clone)]
pub struct SignalTable {
	handlers: HashMap<Signal, SigHandler>,
}

impl SignalTable {
	pub fn new() -> SignalTable {
		SignalTable { handlers: HashMap::new() }
	}

	/// Ignore the job-control signals.
	pub fn interactive() -> SignalTable {
		let mut table = SignalTable::new();
		for &sig in JOB_CONTROL_SIGNALS.iter() {
			table.insert(sig, SigHandler::SigIgn);
		}
		table
	}

	pub fn insert(&mut self, sig: Signal, handler: SigHandler) {
		self.handlers.insert(sig, handler);
	}

	pub fn handler(&self, sig: Signal) -> Option<SigHandler> {
		self.handlers.get(&sig).cloned()
	}

	pub fn install(&self) -> nix::Result<()> {
		for (&sig, &handler) in self.handlers.iter() {
			unsafe { signal::signal(sig, handler) }?;
		}
		Ok(())
	}
}

impl Default for SignalTable {
	fn default() -> SignalTable {
		SignalTable::new()
	}
}

/// Restores default dispositions in a freshly forked child. Ignored
/// signals would otherwise stay ignored across exec. SIGPIPE is included
/// because the Rust runtime ignores it in every process it starts.
pub fn reset_in_child() {
	for &sig in JOB_CONTROL_SIGNALS.iter().chain(&[Signal::SIGPIPE]) {
		let _ = unsafe { signal::signal(sig, SigHandler::SigDfl) };
	}
}
