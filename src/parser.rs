use tracing::trace;

use crate::error::{ParseResult, SyntaxError};
use crate::tokenize;
use crate::types::*;

pub const PIPE: &str = "|";
pub const BACKGROUND: &str = "&";

struct Parser<'a> {
	tokens: &'a [String],
	i: usize,
	first_redirect: Option<usize>,
}

impl<'a> Parser<'a> {
	fn parse_redirect(&mut self, command: &mut Command) -> ParseResult<bool> {
		let tokens = self.tokens;
		let operator = &tokens[self.i];
		let (kind, append) = match RedirectKind::from_operator(operator) {
			Some(r) => r,
			None => { return Ok(false); },
		};
		let target = match tokens.get(self.i + 1) {
			Some(target) => target,
			None => {
				return Err(SyntaxError::MissingRedirectTarget { operator: operator.clone() });
			},
		};
		command.redirect(kind, append, target);
		self.first_redirect.get_or_insert(self.i);
		self.i += 2;
		Ok(true)
	}

	fn parse_command(&mut self) -> ParseResult<Command> {
		let mut command = Command::default();
		while self.i < self.tokens.len() {
			if !self.parse_redirect(&mut command)? {
				self.i += 1;
			}
		}
		// Only words before the first operator form argv; words that
		// follow a redirect target are dropped.
		let end = self.first_redirect.unwrap_or(self.tokens.len());
		command.arguments = self.tokens[.. end].to_vec();
		Ok(command)
	}
}

/// Parses the tokens of one pipeline stage.
///
/// Fails only when a redirection operator is the last token. A slice that
/// starts with an operator, or is empty, yields a command with no arguments.
pub fn parse_command(tokens: &[String]) -> ParseResult<Command> {
	let mut parser = Parser { tokens: tokens, i: 0, first_redirect: None };
	parser.parse_command()
}

/// Splits tokens into stages on `|` after stripping a trailing `&`.
pub fn parse_job(mut tokens: Vec<String>) -> ParseResult<Job> {
	let mut job = Job::default();
	if tokens.last().map_or(false, |t| t == BACKGROUND) {
		tokens.pop();
		job.background = true;
	}
	if tokens.is_empty() {
		return Ok(job);
	}
	for stage in tokens.split(|t| t == PIPE) {
		job.commands.push(parse_command(stage)?);
	}
	Ok(job)
}

/// Tokenizes and parses one input line.
pub fn parse(line: &str, delimiters: &str) -> ParseResult<Job> {
	let job = parse_job(tokenize::tokenize(line, delimiters))?;
	trace!(?job, "parsed");
	Ok(job)
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use crate::tokenize::DEFAULT_DELIMITERS;

	fn tokens(line: &str) -> Vec<String> {
		tokenize::tokenize(line, DEFAULT_DELIMITERS)
	}

	fn args(words: &[&str]) -> Vec<String> {
		words.iter().map(|w| w.to_string()).collect()
	}

	#[test]
	fn pipeline_with_output_redirect() {
		let job = parse("ls -la | grep hello > out.txt", DEFAULT_DELIMITERS).unwrap();
		assert_eq!(job, Job {
			background: false,
			commands: vec![
				Command { arguments: args(&["ls", "-la"]), ..Command::default() },
				Command { arguments: args(&["grep", "hello"]), output_redirect: args(&["out.txt"]), ..Command::default() },
			],
		});
	}

	#[test]
	fn three_stage_pipeline() {
		let job = parse("cat < file1.txt | grep thing | wc -l > outs.txt", DEFAULT_DELIMITERS).unwrap();
		assert!(!job.background);
		assert_eq!(job.commands.len(), 3);
		assert_eq!(job.commands[0].arguments, args(&["cat"]));
		assert_eq!(job.commands[0].input_redirect.as_deref(), Some("file1.txt"));
		assert_eq!(job.commands[1].arguments, args(&["grep", "thing"]));
		assert!(!job.commands[1].has_redirects());
		assert_eq!(job.commands[2].arguments, args(&["wc", "-l"]));
		assert_eq!(job.commands[2].output_redirect, args(&["outs.txt"]));
	}

	#[test]
	fn background_with_output_and_error() {
		let job = parse("ls 1> out.txt 2> error.txt &", DEFAULT_DELIMITERS).unwrap();
		assert_eq!(job, Job {
			background: true,
			commands: vec![Command {
				arguments: args(&["ls"]),
				output_redirect: args(&["out.txt"]),
				error_redirect: args(&["error.txt"]),
				..Command::default()
			}],
		});
	}

	#[test]
	fn empty_line_is_an_empty_job() {
		let job = parse("", DEFAULT_DELIMITERS).unwrap();
		assert!(job.is_empty());
		assert!(!job.background);
		assert!(parse("   ", DEFAULT_DELIMITERS).unwrap().is_empty());
	}

	#[test]
	fn lone_background_marker_has_no_commands() {
		let job = parse("&", DEFAULT_DELIMITERS).unwrap();
		assert!(job.is_empty());
		assert!(job.background);
	}

	#[rstest]
	#[case("ls >")]
	#[case("ls 1>")]
	#[case("cat <")]
	#[case("ls 2>")]
	#[case("ls &>")]
	#[case("ls >>")]
	#[case("ls > a 2>")]
	#[case("ls | wc >")]
	fn operator_without_target_is_a_syntax_error(#[case] line: &str) {
		match parse(line, DEFAULT_DELIMITERS) {
			Err(SyntaxError::MissingRedirectTarget { .. }) => {},
			other => panic!("expected syntax error for {:?}, got {:?}", line, other),
		}
	}

	#[test]
	fn trailing_operator_reports_itself() {
		assert_eq!(parse_command(&tokens("ls >")),
			Err(SyntaxError::MissingRedirectTarget { operator: ">".into() }));
	}

	#[rstest]
	#[case("cmd > f", RedirectKind::Output)]
	#[case("cmd 1> f", RedirectKind::Output)]
	#[case("cmd < f", RedirectKind::Input)]
	#[case("cmd 2> f", RedirectKind::Error)]
	#[case("cmd &> f", RedirectKind::Both)]
	fn each_operator_fills_its_field(#[case] line: &str, #[case] kind: RedirectKind) {
		let command = parse_command(&tokens(line)).unwrap();
		assert_eq!(command.arguments, args(&["cmd"]));
		let f = args(&["f"]);
		match kind {
			RedirectKind::Input => assert_eq!(command.input_redirect.as_deref(), Some("f")),
			RedirectKind::Output => assert_eq!(command.output_redirect, f),
			RedirectKind::Error => assert_eq!(command.error_redirect, f),
			RedirectKind::Both => {
				assert_eq!(command.output_redirect, f);
				assert_eq!(command.error_redirect, f);
			},
		}
		assert!(!command.append);
	}

	#[test]
	fn append_operators_set_flags() {
		let command = parse_command(&tokens("cmd >> out 2>> err")).unwrap();
		assert!(command.append);
		assert!(command.error_append);
		let command = parse_command(&tokens("cmd &>> both")).unwrap();
		assert!(command.append && command.error_append);
		assert_eq!(command.output_redirect, args(&["both"]));
	}

	#[test]
	fn words_after_a_redirect_are_dropped() {
		let command = parse_command(&tokens("grep > out.txt pattern file 2> err")).unwrap();
		assert_eq!(command.arguments, args(&["grep"]));
		assert_eq!(command.output_redirect, args(&["out.txt"]));
		assert_eq!(command.error_redirect, args(&["err"]));
	}

	#[test]
	fn leading_operator_leaves_no_arguments() {
		let command = parse_command(&tokens("> out.txt ls")).unwrap();
		assert!(command.arguments.is_empty());
		assert!(command.name().is_none());
		assert_eq!(command.output_redirect, args(&["out.txt"]));
	}

	#[test]
	fn multiple_output_targets_are_kept_in_order() {
		let command = parse_command(&tokens("echo hi > a > b")).unwrap();
		assert_eq!(command.output_redirect, args(&["a", "b"]));
	}

	#[rstest]
	#[case("ls | | grep x", 3, 1)]
	#[case("| ls", 2, 0)]
	#[case("ls |", 2, 1)]
	#[case("|", 2, 0)]
	fn empty_segments_become_null_commands(#[case] line: &str, #[case] stages: usize, #[case] empty_at: usize) {
		let job = parse(line, DEFAULT_DELIMITERS).unwrap();
		assert_eq!(job.commands.len(), stages);
		assert!(job.commands[empty_at].arguments.is_empty());
	}

	#[rstest]
	#[case("ls")]
	#[case("ls -la > out")]
	#[case("a b c d e")]
	#[case("cat < in 2> err")]
	fn no_pipe_no_marker_is_one_foreground_command(#[case] line: &str) {
		let job = parse(line, DEFAULT_DELIMITERS).unwrap();
		assert_eq!(job.commands.len(), 1);
		assert!(!job.background);
	}

	#[test]
	fn ampersand_only_counts_at_the_end() {
		let job = parse("echo & done", DEFAULT_DELIMITERS).unwrap();
		assert!(!job.background);
		assert_eq!(job.commands[0].arguments, args(&["echo", "&", "done"]));
	}
}
