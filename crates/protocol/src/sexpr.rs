//! Minimal s-expression reader shared by source introspection and signature text.
//!
//! Grammar: lists in parentheses, `;` line comments, double-quoted strings with `\` escapes,
//! decimal integers, and symbols (any other run of non-space, non-paren characters, so
//! operator names like `<=>` or `[]=` read as symbols).

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sexp {
	Symbol(String),
	Str(String),
	Int(i64),
	List(Vec<Sexp>),
}

impl Sexp {
	pub fn as_symbol(&self) -> Option<&str> {
		match self {
			Self::Symbol(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_list(&self) -> Option<&[Sexp]> {
		match self {
			Self::List(items) => Some(items),
			_ => None,
		}
	}

	/// Head symbol of a non-empty list.
	pub fn head(&self) -> Option<&str> {
		self.as_list()?.first()?.as_symbol()
	}
}

impl fmt::Display for Sexp {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Symbol(s) => f.write_str(s),
			Self::Str(s) => write!(f, "{s:?}"),
			Self::Int(i) => write!(f, "{i}"),
			Self::List(items) => {
				f.write_str("(")?;
				for (idx, item) in items.iter().enumerate() {
					if idx > 0 {
						f.write_str(" ")?;
					}
					write!(f, "{item}")?;
				}
				f.write_str(")")
			}
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason} at byte {offset}")]
pub struct ParseError {
	pub offset: usize,
	pub reason: &'static str,
}

/// Reads the first form of `text`, returning it with the byte offset just past it.
pub fn read_one(text: &str) -> Result<(Sexp, usize), ParseError> {
	let mut reader = Reader { text, pos: 0 };
	reader.skip_trivia();
	if reader.pos >= text.len() {
		return Err(reader.error("expected a form"));
	}
	let form = reader.form()?;
	Ok((form, reader.pos))
}

/// Reads exactly one form; anything but trivia after it is an error.
pub fn read_all(text: &str) -> Result<Sexp, ParseError> {
	let (form, end) = read_one(text)?;
	let mut reader = Reader { text, pos: end };
	reader.skip_trivia();
	if reader.pos < text.len() {
		return Err(reader.error("trailing input"));
	}
	Ok(form)
}

struct Reader<'a> {
	text: &'a str,
	pos: usize,
}

impl Reader<'_> {
	fn error(&self, reason: &'static str) -> ParseError {
		ParseError {
			offset: self.pos,
			reason,
		}
	}

	fn peek(&self) -> Option<char> {
		self.text[self.pos..].chars().next()
	}

	fn bump(&mut self) -> Option<char> {
		let ch = self.peek()?;
		self.pos += ch.len_utf8();
		Some(ch)
	}

	fn skip_trivia(&mut self) {
		while let Some(ch) = self.peek() {
			if ch.is_whitespace() {
				self.bump();
			} else if ch == ';' {
				while let Some(ch) = self.bump() {
					if ch == '\n' {
						break;
					}
				}
			} else {
				break;
			}
		}
	}

	fn form(&mut self) -> Result<Sexp, ParseError> {
		match self.peek() {
			Some('(') => self.list(),
			Some(')') => Err(self.error("unexpected ')'")),
			Some('"') => self.string(),
			Some(_) => Ok(self.atom()),
			None => Err(self.error("unexpected end of input")),
		}
	}

	fn list(&mut self) -> Result<Sexp, ParseError> {
		self.bump();
		let mut items = Vec::new();
		loop {
			self.skip_trivia();
			match self.peek() {
				Some(')') => {
					self.bump();
					return Ok(Sexp::List(items));
				}
				None => return Err(self.error("unclosed '('")),
				Some(_) => items.push(self.form()?),
			}
		}
	}

	fn string(&mut self) -> Result<Sexp, ParseError> {
		self.bump();
		let mut out = String::new();
		loop {
			match self.bump() {
				Some('"') => return Ok(Sexp::Str(out)),
				Some('\\') => match self.bump() {
					Some('n') => out.push('\n'),
					Some('t') => out.push('\t'),
					Some(other) => out.push(other),
					None => return Err(self.error("unterminated string")),
				},
				Some(ch) => out.push(ch),
				None => return Err(self.error("unterminated string")),
			}
		}
	}

	fn atom(&mut self) -> Sexp {
		let start = self.pos;
		while let Some(ch) = self.peek() {
			if ch.is_whitespace() || matches!(ch, '(' | ')' | '"' | ';') {
				break;
			}
			self.bump();
		}
		let token = &self.text[start..self.pos];
		match token.parse::<i64>() {
			Ok(i) => Sexp::Int(i),
			Err(_) => Sexp::Symbol(token.to_string()),
		}
	}
}
