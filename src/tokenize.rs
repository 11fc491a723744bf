/// Delimiters used when no configuration overrides them.
pub const DEFAULT_DELIMITERS: &str = " \t\n";

struct Tokenizer<'a> {
	line: &'a str,
	delimiters: &'a str,
	i: usize,
}

impl<'a> Tokenizer<'a> {
	fn proceed_while<F>(&mut self, f: F) where F: Fn(char) -> bool {
		while let Some(c) = self.line[self.i ..].chars().next() {
			if !f(c) { break; }
			self.i += c.len_utf8();
		}
	}

	fn skip_delimiters(&mut self) {
		let delimiters = self.delimiters;
		self.proceed_while(|c| delimiters.contains(c));
	}

	fn read_token(&mut self) -> &'a str {
		let orig = self.i;
		let delimiters = self.delimiters;
		self.proceed_while(|c| !delimiters.contains(c));
		&self.line[orig .. self.i]
	}

	fn next_token(&mut self) -> Option<&'a str> {
		self.skip_delimiters();
		let token = self.read_token();
		if token.is_empty() { None } else { Some(token) }
	}
}

/// Splits `line` into tokens on any character of `delimiters`.
///
/// Runs of delimiters collapse, so no empty token is ever produced, and a
/// trailing token is flushed at end of input. There is no quoting.
pub fn tokenize(line: &str, delimiters: &str) -> Vec<String> {
	let mut tokenizer = Tokenizer { line: line, delimiters: delimiters, i: 0 };
	let mut tokens = vec![];
	while let Some(token) = tokenizer.next_token() {
		tokens.push(token.to_owned());
	}
	tokens
}
