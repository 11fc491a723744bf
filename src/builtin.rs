use std::collections::HashMap;
use std::env;
use std::io::Write;
use std::path::PathBuf;

use crate::global::State;
use crate::job::{JobId, State as JobState, WaitStatusExt};

/// Whether the shell keeps reading lines after a builtin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
	Continue(i32),
	Exit(i32),
}

impl Flow {
	pub fn code(self) -> i32 {
		match self {
			Flow::Continue(code) | Flow::Exit(code) => code,
		}
	}
}

pub type Builtin = fn(&mut State, &[String], &mut dyn Write) -> Flow;

fn fail(out: &mut dyn Write, name: &str, msg: &dyn std::fmt::Display) -> Flow {
	let _ = writeln!(out, "{}: {}", name, msg);
	Flow::Continue(1)
}

pub fn builtin_cd(_: &mut State, args: &[String], out: &mut dyn Write) -> Flow {
	let target = match args.get(1) {
		Some(dir) => PathBuf::from(dir),
		None => match env::var_os("HOME") {
			Some(home) => PathBuf::from(home),
			None => return fail(out, "cd", &"HOME not set"),
		},
	};
	match env::set_current_dir(&target) {
		Ok(()) => Flow::Continue(0),
		Err(e) => fail(out, "cd", &format_args!("{}: {}", target.display(), e)),
	}
}

pub fn builtin_exit(_: &mut State, args: &[String], out: &mut dyn Write) -> Flow {
	match args.get(1).map(|s| s.parse::<i32>()) {
		None => Flow::Exit(0),
		Some(Ok(code)) => Flow::Exit(code),
		Some(Err(_)) => fail(out, "exit", &"numeric argument required"),
	}
}

pub fn builtin_rehash(state: &mut State, _: &[String], _: &mut dyn Write) -> Flow {
	state.search_cache.rehash();
	Flow::Continue(0)
}

/// Lists background jobs, then forgets the ones reported as done.
pub fn builtin_jobs(state: &mut State, _: &[String], out: &mut dyn Write) -> Flow {
	state.jobs.refresh();
	let mut finished = vec![];
	for entry in state.jobs.iter() {
		let job_state = entry.group.state();
		let _ = writeln!(out, "[{}] {}\t{}", entry.id, job_state, entry.job);
		if job_state == JobState::Terminated {
			finished.push(entry.id);
		}
	}
	for id in finished {
		state.jobs.remove(id);
	}
	Flow::Continue(0)
}

fn parse_job_id(arg: &str) -> Option<JobId> {
	arg.trim_start_matches('%').parse().ok().map(JobId)
}

/// Reaps one background job, or all of them, and removes what finished
/// from the registry. Stopped jobs stay registered. The code is that of the
/// last job's last stage, or 128 + signal for a stopped job.
pub fn builtin_wait(state: &mut State, args: &[String], out: &mut dyn Write) -> Flow {
	let ids = match args.get(1) {
		Some(arg) => match parse_job_id(arg) {
			Some(id) if state.jobs.get(id).is_some() => vec![id],
			_ => return fail(out, "wait", &format_args!("{}: no such job", arg)),
		},
		None => state.jobs.ids(),
	};
	let mut code = 0;
	for id in ids {
		match state.jobs.wait(id) {
			Some(Ok(entry)) if entry.group.is_stopped() => {
				code = entry.group.statuses().into_iter()
					.find(|s| s.state() == JobState::Stopped)
					.and_then(|s| s.code())
					.unwrap_or(1);
				continue;
			},
			Some(Ok(entry)) => {
				code = entry.group.processes.last().and_then(|pr| pr.status.code()).unwrap_or(0);
			},
			Some(Err(e)) => {
				let _ = writeln!(out, "wait: job {}: {}", id, e);
				code = 1;
			},
			None => {},
		}
		state.jobs.remove(id);
	}
	Flow::Continue(code)
}

/// Builtin name to implementation, built once at start-up.
pub struct Builtins {
	table: HashMap<&'static str, Builtin>,
}

impl Builtins {
	pub fn new() -> Builtins {
		let mut table: HashMap<&'static str, Builtin> = HashMap::new();
		table.insert("cd", builtin_cd);
		table.insert("exit", builtin_exit);
		table.insert("jobs", builtin_jobs);
		table.insert("rehash", builtin_rehash);
		table.insert("wait", builtin_wait);
		Builtins { table: table }
	}

	pub fn is_builtin(&self, name: &str) -> bool {
		self.table.contains_key(name)
	}

	pub fn lookup(&self, name: &str) -> Option<Builtin> {
		self.table.get(name).cloned()
	}

	/// Runs `args[0]` if it names a builtin.
	pub fn invoke(&self, state: &mut State, args: &[String], out: &mut dyn Write) -> Option<Flow> {
		let builtin = self.lookup(args.first()?)?;
		Some(builtin(state, args, out))
	}
}

impl Default for Builtins {
	fn default() -> Builtins {
		Builtins::new()
	}
}
