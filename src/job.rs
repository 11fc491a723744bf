use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, IsTerminal};

use nix::errno::Errno;
use nix::sys::signal::{SigSet, SigmaskHow, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{self, ForkResult, Pid};
use tracing::{debug, warn};

use crate::types::Job;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum State { Active, Stopped, Terminated }

impl fmt::Display for State {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match *self {
			State::Active => write!(f, "Running"),
			State::Stopped => write!(f, "Stopped"),
			State::Terminated => write!(f, "Done"),
		}
	}
}

pub trait WaitStatusExt {
	fn state(self) -> State;
	/// Shell-style exit code: the exit status, or 128 + signal number.
	fn code(self) -> Option<i32>;
}

impl WaitStatusExt for WaitStatus {
	fn state(self) -> State {
		match self {
			WaitStatus::Exited(..) => State::Terminated,
			WaitStatus::Signaled(..) => State::Terminated,
			WaitStatus::Stopped(..) => State::Stopped,
			#[cfg(any(target_os = "linux", target_os = "android"))]
			WaitStatus::PtraceEvent(..) | WaitStatus::PtraceSyscall(..) => State::Stopped,
			WaitStatus::Continued(..) => State::Active,
			WaitStatus::StillAlive => State::Active,
		}
	}

	fn code(self) -> Option<i32> {
		match self {
			WaitStatus::Exited(_, code) => Some(code),
			WaitStatus::Signaled(_, sig, _) | WaitStatus::Stopped(_, sig) => Some(128 + sig as i32),
			_ => None,
		}
	}
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Process {
	pub pid: Pid,
	pub status: WaitStatus,
}

impl Process {
	fn wait(&mut self, options: Option<WaitPidFlag>) -> nix::Result<()> {
		loop {
			match waitpid(self.pid, options) {
				// Nothing changed since the last report.
				Ok(WaitStatus::StillAlive) => return Ok(()),
				Ok(status) => {
					self.status = status;
					return Ok(());
				},
				Err(Errno::EINTR) => continue,
				Err(e) => return Err(e),
			}
		}
	}
}

/// The processes of one pipeline, all in one process group led by the
/// first stage.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProcessGroup {
	pub pgid: Option<Pid>,
	pub processes: Vec<Process>,
}

impl ProcessGroup {
	pub fn state(&self) -> State {
		self.processes.iter().map(|pr| pr.status.state()).min().unwrap_or(State::Terminated)
	}

	pub fn pids(&self) -> Vec<Pid> {
		self.processes.iter().map(|pr| pr.pid).collect()
	}

	pub fn is_stopped(&self) -> bool {
		self.processes.iter().any(|pr| pr.status.state() == State::Stopped)
	}

	/// Blocks until every process has terminated, in spawn order, or until
	/// one of them is stopped. The remaining stages of a stopped group may
	/// never finish on their own, so waiting ends there. A failed wait on
	/// one process does not stop the others from being reaped; the first
	/// such failure is returned afterwards.
	pub fn wait(&mut self) -> nix::Result<()> {
		let mut first_err = None;
		for pr in self.processes.iter_mut() {
			match pr.status.state() {
				State::Terminated => continue,
				State::Stopped => break,
				State::Active => {},
			}
			if let Err(e) = pr.wait(Some(WaitPidFlag::WUNTRACED)) {
				warn!(pid = %pr.pid, error = %e, "wait failed");
				first_err.get_or_insert(e);
			} else if pr.status.state() == State::Stopped {
				debug!(pid = %pr.pid, "stopped");
				break;
			}
		}
		first_err.map_or(Ok(()), Err)
	}

	/// Polls every live process without blocking. A process that can no
	/// longer be waited for has been reaped elsewhere; its status is unknown
	/// and it is dropped from the group.
	pub fn refresh(&mut self) {
		let flags = WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;
		self.processes.retain_mut(|pr| {
			if pr.status.state() == State::Terminated {
				return true;
			}
			match pr.wait(Some(flags)) {
				Ok(()) => true,
				Err(Errno::ECHILD) => {
					warn!(pid = %pr.pid, "no longer a child, status unknown");
					false
				},
				Err(e) => {
					warn!(pid = %pr.pid, error = %e, "poll failed");
					true
				},
			}
		});
	}

	pub fn statuses(&self) -> Vec<WaitStatus> {
		self.processes.iter().map(|pr| pr.status).collect()
	}
}

/// How a [`GroupBuilder`] creates processes; [`unistd::fork`] unless
/// replaced.
pub type Fork = unsafe fn() -> nix::Result<ForkResult>;

/// Forks the processes of one group.
#[derive(Debug)]
pub struct GroupBuilder {
	imp: ProcessGroup,
	fork: Fork,
}

impl GroupBuilder {
	pub fn new(size_hint: usize) -> GroupBuilder {
		GroupBuilder::with_fork(size_hint, unistd::fork)
	}

	pub fn with_fork(size_hint: usize, fork: Fork) -> GroupBuilder {
		GroupBuilder {
			imp: ProcessGroup { pgid: None, processes: Vec::with_capacity(size_hint) },
			fork: fork,
		}
	}

	/// Forks one child into the group. Both sides call `setpgid` so the
	/// group exists whichever runs first.
	pub fn push_fork(&mut self) -> nix::Result<ForkResult> {
		let group = &mut self.imp;

		let r = unsafe { (self.fork)() }?;
		match r {
			ForkResult::Parent { child } => {
				let pgid = *group.pgid.get_or_insert(child);
				// EACCES here means the child already exec'd after joining.
				let _ = unistd::setpgid(child, pgid);
				group.processes.push(Process { pid: child, status: WaitStatus::StillAlive });
			},
			ForkResult::Child => {
				let _ = unistd::setpgid(Pid::from_raw(0), group.pgid.unwrap_or(Pid::from_raw(0)));
			},
		}
		Ok(r)
	}

	pub fn pgid(&self) -> Option<Pid> {
		self.imp.pgid
	}

	pub fn is_empty(&self) -> bool {
		self.imp.processes.is_empty()
	}

	pub fn build(self) -> ProcessGroup {
		self.imp
	}
}

/// Job number shown to the user, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(pub u32);

impl fmt::Display for JobId {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

#[derive(Debug)]
pub struct JobEntry {
	pub id: JobId,
	pub job: Job,
	pub group: ProcessGroup,
}

/// Background jobs of this shell. Entries stay until explicitly removed,
/// and ids are never reused.
#[derive(Debug)]
pub struct JobRegistry {
	next_id: u32,
	jobs: BTreeMap<JobId, JobEntry>,
}

impl JobRegistry {
	pub fn new() -> JobRegistry {
		JobRegistry { next_id: 1, jobs: BTreeMap::new() }
	}

	pub fn register(&mut self, job: Job, group: ProcessGroup) -> JobId {
		let id = JobId(self.next_id);
		self.next_id += 1;
		debug!(%id, pgid = ?group.pgid, "registered background job");
		self.jobs.insert(id, JobEntry { id: id, job: job, group: group });
		id
	}

	pub fn get(&self, id: JobId) -> Option<&JobEntry> {
		self.jobs.get(&id)
	}

	pub fn iter(&self) -> impl Iterator<Item = &JobEntry> {
		self.jobs.values()
	}

	pub fn ids(&self) -> Vec<JobId> {
		self.jobs.keys().cloned().collect()
	}

	pub fn len(&self) -> usize {
		self.jobs.len()
	}

	pub fn is_empty(&self) -> bool {
		self.jobs.is_empty()
	}

	/// Updates the status of every registered process without blocking.
	pub fn refresh(&mut self) {
		for entry in self.jobs.values_mut() {
			entry.group.refresh();
		}
	}

	/// Blocks until the job's processes are reaped and returns the entry's
	/// last known state. The entry stays registered.
	pub fn wait(&mut self, id: JobId) -> Option<nix::Result<&JobEntry>> {
		let entry = self.jobs.get_mut(&id)?;
		let result = entry.group.wait();
		let entry: &JobEntry = entry;
		Some(result.map(move |()| entry))
	}

	pub fn remove(&mut self, id: JobId) -> Option<JobEntry> {
		self.jobs.remove(&id)
	}
}

impl Default for JobRegistry {
	fn default() -> JobRegistry {
		JobRegistry::new()
	}
}

/// Runs `f` with SIGTTOU blocked in the calling thread. `tcsetpgrp` from
/// a process outside the foreground group raises SIGTTOU unless it is
/// blocked or ignored.
fn with_ttou_blocked<T, F: FnOnce() -> nix::Result<T>>(f: F) -> nix::Result<T> {
	let mut ttou = SigSet::empty();
	ttou.add(Signal::SIGTTOU);
	let old = ttou.thread_swap_mask(SigmaskHow::SIG_BLOCK)?;
	let r = f();
	old.thread_set_mask()?;
	r
}

/// The controlling terminal, when this process owns it.
#[derive(Debug)]
pub struct Terminal {
	shell_pgid: Pid,
}

impl Terminal {
	pub fn acquire() -> Option<Terminal> {
		let stdin = io::stdin();
		if !stdin.is_terminal() {
			return None;
		}
		let shell_pgid = unistd::getpgrp();
		match unistd::tcgetpgrp(&stdin) {
			Ok(fg) if fg == shell_pgid => Some(Terminal { shell_pgid: shell_pgid }),
			_ => None,
		}
	}

	pub fn give_to(&self, pgid: Pid) -> nix::Result<()> {
		with_ttou_blocked(|| unistd::tcsetpgrp(io::stdin(), pgid))
	}

	pub fn reclaim(&self) -> nix::Result<()> {
		with_ttou_blocked(|| unistd::tcsetpgrp(io::stdin(), self.shell_pgid))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::Command;

	fn job(name: &str) -> Job {
		Job {
			commands: vec![Command { arguments: vec![name.to_owned()], ..Command::default() }],
			background: true,
		}
	}

	#[test]
	fn ids_start_at_one_and_are_never_reused() {
		let mut registry = JobRegistry::new();
		let a = registry.register(job("a"), ProcessGroup::default());
		let b = registry.register(job("b"), ProcessGroup::default());
		assert_eq!((a, b), (JobId(1), JobId(2)));
		assert!(registry.remove(b).is_some());
		let c = registry.register(job("c"), ProcessGroup::default());
		assert_eq!(c, JobId(3));
		assert_eq!(registry.ids(), vec![JobId(1), JobId(3)]);
		assert_eq!(registry.get(c).map(|e| e.job.to_string()), Some("c &".to_owned()));
	}

	#[test]
	fn group_state_is_the_least_advanced_process() {
		let pid = Pid::from_raw(1);
		let group = ProcessGroup {
			pgid: Some(pid),
			processes: vec![
				Process { pid: pid, status: WaitStatus::Exited(pid, 0) },
				Process { pid: pid, status: WaitStatus::StillAlive },
			],
		};
		assert_eq!(group.state(), State::Active);
		assert_eq!(ProcessGroup::default().state(), State::Terminated);
	}

	#[test]
	fn codes_follow_shell_convention() {
		let pid = Pid::from_raw(1);
		assert_eq!(WaitStatus::Exited(pid, 3).code(), Some(3));
		assert_eq!(WaitStatus::Signaled(pid, Signal::SIGKILL, false).code(), Some(137));
		assert_eq!(WaitStatus::Stopped(pid, Signal::SIGTSTP).code(), Some(148));
		assert_eq!(WaitStatus::StillAlive.code(), None);
	}

	#[test]
	fn stopped_stage_ends_the_wait() {
		let mut builder = GroupBuilder::new(1);
		match builder.push_fork().unwrap() {
			ForkResult::Child => {
				let _ = nix::sys::signal::raise(Signal::SIGSTOP);
				unsafe { libc::_exit(0) }
			},
			ForkResult::Parent { .. } => {},
		}
		let mut group = builder.build();
		group.wait().unwrap();
		assert!(group.is_stopped());
		assert_eq!(group.state(), State::Stopped);
		// Waiting again must not block on the stopped process.
		group.wait().unwrap();

		let pgid = group.pgid.unwrap();
		nix::sys::signal::killpg(pgid, Signal::SIGKILL).unwrap();
		waitpid(pgid, None).unwrap();
	}

	#[test]
	fn refresh_drops_a_process_reaped_elsewhere() {
		let child = match unsafe { unistd::fork() }.unwrap() {
			ForkResult::Child => unsafe { libc::_exit(0) },
			ForkResult::Parent { child } => child,
		};
		waitpid(child, None).unwrap();
		let mut group = ProcessGroup {
			pgid: Some(child),
			processes: vec![Process { pid: child, status: WaitStatus::StillAlive }],
		};
		group.refresh();
		assert!(group.processes.is_empty());
		assert_eq!(group.statuses(), vec![]);
	}

	#[test]
	fn terminal_calls_run_with_ttou_blocked() {
		let before = SigSet::thread_get_mask().unwrap().contains(Signal::SIGTTOU);
		let inside = with_ttou_blocked(|| Ok(SigSet::thread_get_mask()?.contains(Signal::SIGTTOU))).unwrap();
		assert!(inside);
		assert_eq!(SigSet::thread_get_mask().unwrap().contains(Signal::SIGTTOU), before);
	}

	#[test]
	fn forked_child_joins_its_own_group_and_is_reaped() {
		let mut builder = GroupBuilder::new(1);
		match builder.push_fork().unwrap() {
			ForkResult::Child => unsafe { libc::_exit(3) },
			ForkResult::Parent { child } => {
				assert_eq!(builder.pgid(), Some(child));
			},
		}
		let mut group = builder.build();
		group.wait().unwrap();
		assert_eq!(group.state(), State::Terminated);
		assert_eq!(group.processes[0].status.code(), Some(3));
	}
}
