//! Kept in its own test binary: counting open descriptors is only
//! meaningful when no other test runs alongside.

use std::fs;

use jsh::eval::Execution;
use jsh::job::{State as JobState, WaitStatusExt};
use jsh::{execute, parse, Config, State};

fn open_fds() -> usize {
	fs::read_dir("/proc/self/fd").unwrap().count()
}

#[test]
fn foreground_pipeline_reaps_every_stage_and_leaks_no_pipes() {
	let mut state = State::new(Config { job_control: false, ..Config::default() });
	let lines = [
		"echo a | cat",
		"seq 1 100 | grep 7 | sort -r | head -n 2 | wc -l",
		"true | false | true",
		"cat /definitely/missing 2> /dev/null | wc -c",
	];
	for line in lines.iter() {
		let stages = line.split('|').count();
		let before = open_fds();
		let job = parse(line, " ").unwrap();
		match execute(&mut state, job).unwrap() {
			Execution::Done(statuses) => {
				assert_eq!(statuses.len(), stages, "{}", line);
				assert!(statuses.iter().all(|s| s.state() == JobState::Terminated), "{}", line);
			},
			other => panic!("{}: unexpected {:?}", line, other),
		}
		assert_eq!(open_fds(), before, "{}", line);
	}
}
