use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use covenant_runtime::{Param, ParamKind};

use crate::error::FailureKind;
use crate::introspect::Signature;

/// Argument-count contract of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Arity {
	/// Exactly `n` positional parameters.
	Fixed(usize),
	/// `min` required positional parameters followed by a variable tail.
	Variable { min: usize },
	/// Existence only; the argument count is never checked.
	Unconstrained,
}

impl Arity {
	/// Arity of a parameter list. Block parameters never count.
	pub fn from_params(params: &[Param]) -> Self {
		let mut required = 0;
		let mut variable = false;
		for param in params {
			match param.kind {
				ParamKind::Required => required += 1,
				ParamKind::Optional | ParamKind::Rest => variable = true,
				ParamKind::Block => {}
			}
		}
		if variable {
			Self::Variable { min: required }
		} else {
			Self::Fixed(required)
		}
	}

	pub fn is_constrained(self) -> bool {
		!matches!(self, Self::Unconstrained)
	}

	/// Required positional count, `None` when unconstrained.
	pub fn required(self) -> Option<usize> {
		match self {
			Self::Fixed(n) | Self::Variable { min: n } => Some(n),
			Self::Unconstrained => None,
		}
	}

	/// Whether a candidate implementation with arity `candidate` satisfies this contract.
	///
	/// `Fixed(n)` demands `Fixed(n)`; `Variable { min }` takes any constrained candidate
	/// whose required count is at least `min`.
	pub fn accepts(self, candidate: Arity) -> bool {
		match self {
			Self::Unconstrained => true,
			Self::Fixed(_) => candidate == self,
			Self::Variable { min } => candidate.required().is_some_and(|r| r >= min),
		}
	}
}

impl fmt::Display for Arity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Fixed(n) => write!(f, "{n}"),
			Self::Variable { min } => write!(f, "{min}+"),
			Self::Unconstrained => Ok(()),
		}
	}
}

/// One required operation of a protocol.
///
/// Equality and hashing use `(name, arity)`; ordering is by name with arity as tie-break.
#[derive(Clone)]
pub struct Message {
	name: Arc<str>,
	arity: Arity,
	block_expected: bool,
	protocol: Arc<str>,
}

impl Message {
	pub fn new(
		protocol: impl Into<Arc<str>>,
		name: impl Into<Arc<str>>,
		arity: Arity,
		block_expected: bool,
	) -> Self {
		Self {
			name: name.into(),
			arity,
			block_expected,
			protocol: protocol.into(),
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub(crate) fn name_arc(&self) -> &Arc<str> {
		&self.name
	}

	pub fn arity(&self) -> Arity {
		self.arity
	}

	pub fn block_expected(&self) -> bool {
		self.block_expected
	}

	/// Name of the protocol that declared this message.
	pub fn protocol(&self) -> &str {
		&self.protocol
	}

	pub fn check_arity(&self, candidate: Arity) -> bool {
		self.arity.accepts(candidate)
	}

	pub fn check_block(&self, signature: &Signature) -> bool {
		!self.block_expected || signature.accepts_block()
	}

	/// Matches a candidate's introspected arity and block acceptance.
	pub fn matches(&self, arity: Arity, has_block: bool) -> Result<(), FailureKind> {
		if !self.check_arity(arity) {
			return Err(FailureKind::ArityMismatch);
		}
		if self.block_expected && !has_block {
			return Err(FailureKind::MissingBlock);
		}
		Ok(())
	}

	/// `name(arity)` with a trailing `&` when a block is expected.
	pub fn shortcut(&self) -> String {
		let amp = if self.block_expected { "&" } else { "" };
		format!("{}({}{amp})", self.name, self.arity)
	}

	/// Canonical declaration that [`crate::Protocol::from_signature_text`] reads back.
	pub fn to_signature_text(&self) -> String {
		let mut params: Vec<String> = match self.arity {
			Arity::Unconstrained => {
				let block = if self.block_expected { " &block" } else { "" };
				return format!("(understand {}{block})", self.name);
			}
			Arity::Fixed(n) => (1..=n).map(|i| format!("x{i}")).collect(),
			Arity::Variable { min } => (1..=min)
				.map(|i| format!("x{i}"))
				.chain(std::iter::once("*rest".to_string()))
				.collect(),
		};
		if self.block_expected {
			params.push("&block".to_string());
		}
		format!("(def {} ({}))", self.name, params.join(" "))
	}
}

impl PartialEq for Message {
	fn eq(&self, other: &Self) -> bool {
		self.name == other.name && self.arity == other.arity
	}
}

impl Eq for Message {}

impl Hash for Message {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.name.hash(state);
		self.arity.hash(state);
	}
}

impl PartialOrd for Message {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for Message {
	fn cmp(&self, other: &Self) -> Ordering {
		self.name
			.cmp(&other.name)
			.then_with(|| self.arity.cmp(&other.arity))
	}
}

impl fmt::Display for Message {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}#{}", self.protocol, self.shortcut())
	}
}

impl fmt::Debug for Message {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Message({self})")
	}
}
