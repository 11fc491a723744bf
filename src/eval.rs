use std::convert::Infallible;
use std::ffi::CString;
use std::fs;
use std::io::{self, Write};
use std::os::fd::{AsRawFd, IntoRawFd, OwnedFd, RawFd};

use nix::errno::Errno;
use nix::fcntl::{self, FcntlArg, FdFlag, OFlag};
use nix::sys::wait::WaitStatus;
use nix::unistd::{self, ForkResult};
use tracing::{debug, error, info, trace, warn};

use crate::error::{ChildError, ExecError};
use crate::global::State;
use crate::job::{GroupBuilder, JobId, Terminal, WaitStatusExt};
use crate::search::SearchCache;
use crate::signals;
use crate::types::{Command, Job};

/// What running a job produced.
#[derive(Debug, PartialEq, Eq)]
pub enum Execution {
	/// The job had no commands.
	Nothing,
	/// Foreground job: one status per spawned stage, in spawn order.
	Done(Vec<WaitStatus>),
	Background(JobId),
	/// Foreground job one of whose stages was stopped. It has been moved
	/// into the job registry.
	Stopped(JobId),
}

impl Execution {
	/// Exit code of the last stage, as a shell's `$?` would report it.
	pub fn code(&self) -> Option<i32> {
		match *self {
			Execution::Done(ref statuses) => statuses.last().and_then(|s| s.code()),
			_ => None,
		}
	}

	pub fn background_id(&self) -> Option<JobId> {
		match *self {
			Execution::Background(id) => Some(id),
			_ => None,
		}
	}

	pub fn stopped_id(&self) -> Option<JobId> {
		match *self {
			Execution::Stopped(id) => Some(id),
			_ => None,
		}
	}
}

/// One pipe between adjacent stages. Each end is closed when taken or
/// when the pipe is dropped.
struct Pipe {
	read: Option<OwnedFd>,
	write: Option<OwnedFd>,
}

impl Pipe {
	fn new() -> nix::Result<Pipe> {
		let (read, write) = unistd::pipe2(OFlag::O_CLOEXEC)?;
		Ok(Pipe { read: Some(read), write: Some(write) })
	}
}

fn raw(fd: &Option<OwnedFd>) -> Option<RawFd> {
	fd.as_ref().map(|fd| fd.as_raw_fd())
}

/// How one stage's standard streams are wired, fixed before the fork.
struct Plumbing<'a> {
	stdin: Option<RawFd>,
	stdout: Option<RawFd>,
	is_first: bool,
	is_last: bool,
	terminal: Option<&'a Terminal>,
}

fn open_target(path: &str, options: &fs::OpenOptions) -> Result<RawFd, ChildError> {
	match options.open(path) {
		Ok(file) => Ok(file.into_raw_fd()),
		Err(e) => Err(ChildError::Redirection { path: path.to_owned(), source: e }),
	}
}

fn rebind(fd: RawFd, to: RawFd) -> Result<(), ChildError> {
	if fd == to {
		// The stream was closed and the open reused its number. Files opened
		// through std are close-on-exec.
		fcntl::fcntl(fd, FcntlArg::F_SETFD(FdFlag::empty())).map_err(ChildError::Dup)?;
		return Ok(());
	}
	unistd::dup2(fd, to).map_err(ChildError::Dup)?;
	let _ = unistd::close(fd);
	Ok(())
}

/// Opens every target in order, each created and truncated or appended,
/// and binds `to` to the last one.
fn redirect_out(paths: &[String], append: bool, to: RawFd) -> Result<(), ChildError> {
	let mut options = fs::OpenOptions::new();
	options.write(true).create(true);
	if append {
		options.append(true);
	} else {
		options.truncate(true);
	}
	let mut last = None;
	for path in paths {
		let fd = open_target(path, &options)?;
		if let Some(prev) = last.replace(fd) {
			let _ = unistd::close(prev);
		}
	}
	match last {
		Some(fd) => rebind(fd, to),
		None => Ok(()),
	}
}

fn do_exec_command(search: &SearchCache, command: &Command, plumbing: &Plumbing) -> Result<Infallible, ChildError> {
	if let Some(term) = plumbing.terminal {
		let _ = term.give_to(unistd::getpgrp());
	}
	signals::reset_in_child();

	if let Some(fd) = plumbing.stdin {
		unistd::dup2(fd, libc::STDIN_FILENO).map_err(ChildError::Dup)?;
	}
	if let Some(fd) = plumbing.stdout {
		unistd::dup2(fd, libc::STDOUT_FILENO).map_err(ChildError::Dup)?;
	}

	// Redirections on the boundary stages win over the pipe ends above.
	// Error first so later failures are reported into it, then input so a
	// missing file leaves the output targets untouched.
	// `&>` shares stdout's open file so the two streams don't clobber each
	// other's offsets.
	let shared_error = match command.error_redirect.split_last() {
		Some((last, rest)) if plumbing.is_last && command.output_redirect.last() == Some(last) => Some(rest),
		_ => None,
	};
	let error_targets = shared_error.unwrap_or(&command.error_redirect[..]);
	redirect_out(error_targets, command.error_append, libc::STDERR_FILENO)?;
	if plumbing.is_first {
		if let Some(ref path) = command.input_redirect {
			let fd = open_target(path, fs::OpenOptions::new().read(true))?;
			rebind(fd, libc::STDIN_FILENO)?;
		}
	}
	if plumbing.is_last {
		redirect_out(&command.output_redirect, command.append, libc::STDOUT_FILENO)?;
	}
	if shared_error.is_some() {
		unistd::dup2(libc::STDOUT_FILENO, libc::STDERR_FILENO).map_err(ChildError::Dup)?;
	}

	let name = command.name().ok_or(ChildError::EmptyCommand)?;
	let argv: Vec<CString> = command.arguments.iter()
		.map(|s| CString::new(s.as_str()))
		.collect::<Result<_, _>>()?;
	let r = match search.lookup(name) {
		Some(path) => unistd::execv(&path, &argv),
		// Not in the cache; it may have been installed since the last rehash.
		None => unistd::execvp(&argv[0], &argv),
	};
	r.map_err(|e| match e {
		Errno::ENOENT => ChildError::CommandNotFound { name: name.to_owned() },
		e => ChildError::NotExecutable { name: name.to_owned(), source: e },
	})
}

fn exec_command(search: &SearchCache, command: &Command, plumbing: &Plumbing) -> ! {
	let s = match do_exec_command(search, command, plumbing) {
		Ok(never) => match never {},
		Err(e) => {
			let _ = writeln!(&mut io::stderr(), "jsh: {}", e);
			e.exit_code()
		},
	};
	unsafe { libc::_exit(s) }
}

fn spawn_commands(search: &SearchCache, job: &Job, terminal: Option<&Terminal>,
                  builder: &mut GroupBuilder) -> Result<(), ExecError> {
	let n = job.commands.len();
	let mut pipes = Vec::with_capacity(n - 1);
	for _ in 1 .. n {
		pipes.push(Pipe::new().map_err(ExecError::Pipe)?);
	}

	for (i, command) in job.commands.iter().enumerate() {
		let plumbing = Plumbing {
			stdin: if i > 0 { raw(&pipes[i - 1].read) } else { None },
			stdout: if i + 1 < n { raw(&pipes[i].write) } else { None },
			is_first: i == 0,
			is_last: i + 1 == n,
			terminal: terminal,
		};
		match builder.push_fork() {
			Ok(ForkResult::Child) => exec_command(search, command, &plumbing),
			Ok(ForkResult::Parent { child }) => {
				debug!(stage = i, pid = %child, pgid = ?builder.pgid(), "spawned");
				if i == 0 {
					if let (Some(term), Some(pgid)) = (terminal, builder.pgid()) {
						if let Err(e) = term.give_to(pgid) {
							warn!(error = %e, "cannot hand terminal to job");
						}
					}
				}
			},
			Err(e) => {
				return Err(ExecError::Spawn { stage: i, source: e });
			},
		}
		// Stage i was the only reader of pipe i-1 and the only writer of
		// pipe i; holding either end open would hide end-of-stream.
		if i > 0 {
			pipes[i - 1].read.take();
		}
		if i + 1 < n {
			pipes[i].write.take();
		}
		trace!(stage = i, "closed parent pipe ends");
	}
	Ok(())
}

/// Runs a parsed job.
///
/// Foreground jobs are waited for and their per-stage statuses returned.
/// A foreground job that gets stopped is registered like a background one.
/// Background jobs are moved into the job registry and their id returned
/// without waiting. A spawn failure stops later stages from starting but
/// stages already running are still reaped or registered.
pub fn execute(state: &mut State, job: Job) -> Result<Execution, ExecError> {
	let builder = GroupBuilder::new(job.commands.len());
	execute_with(state, job, builder)
}

/// [`execute`], creating the job's processes through `builder`.
pub fn execute_with(state: &mut State, job: Job, mut builder: GroupBuilder) -> Result<Execution, ExecError> {
	if job.is_empty() {
		return Ok(Execution::Nothing);
	}

	let terminal = if state.config.job_control && !job.background {
		Terminal::acquire()
	} else {
		None
	};

	let spawned = spawn_commands(&state.search_cache, &job, terminal.as_ref(), &mut builder);
	if let Err(e) = spawned {
		error!(error = %e, "{}", job);
		if builder.is_empty() {
			if let Some(ref term) = terminal {
				let _ = term.reclaim();
			}
			return Err(e);
		}
	}
	let mut group = builder.build();

	if job.background {
		let pids = group.pids();
		let id = state.jobs.register(job, group);
		info!(%id, ?pids, "background job started");
		return Ok(Execution::Background(id));
	}

	let waited = group.wait();
	if let Some(ref term) = terminal {
		if let Err(e) = term.reclaim() {
			warn!(error = %e, "cannot reclaim terminal");
		}
	}
	waited.map_err(ExecError::Wait)?;
	if group.is_stopped() {
		let id = state.jobs.register(job, group);
		info!(%id, "job stopped");
		return Ok(Execution::Stopped(id));
	}
	Ok(Execution::Done(group.statuses()))
}
