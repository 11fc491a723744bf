use std::io;
use std::io::BufRead;
use std::io::Write;
use std::process::ExitCode;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use jsh::builtin::Flow;
use jsh::signals::SignalTable;
use jsh::{Config, Shell};

fn main() -> ExitCode {
	tracing_subscriber::registry()
		.with(fmt::layer().with_writer(io::stderr))
		.with(EnvFilter::from_default_env())
		.init();

	let config = Config::load();
	let interactive = config.job_control && jsh::job::Terminal::acquire().is_some();
	if interactive {
		if let Err(e) = SignalTable::interactive().install() {
			tracing::warn!(error = %e, "cannot install signal handlers");
		}
	}

	let mut shell = Shell::new(config);
	let mut stdout = io::stdout();
	let stdin = io::stdin();
	let mut stdin_locked = stdin.lock();
	loop {
		let _ = stdout.write_all(shell.prompt().as_bytes());
		let _ = stdout.flush();
		let mut line = String::new();
		match stdin_locked.read_line(&mut line) {
			Ok(0) => break,
			Ok(_) => {},
			Err(e) => {
				eprintln!("jsh: {}", e);
				break;
			},
		}
		match shell.run_line(&line, &mut stdout) {
			Ok(Flow::Exit(code)) => return ExitCode::from(code as u8),
			Ok(Flow::Continue(_)) => {},
			Err(e) => eprintln!("jsh: {}", e),
		}
	}
	ExitCode::from(shell.last_code() as u8)
}
