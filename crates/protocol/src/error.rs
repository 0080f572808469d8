use std::fmt;

use covenant_runtime::Fault;

use crate::config::ConfigError;
use crate::message::Message;

/// What went wrong for one message during a check or a contracted call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
	NotImplemented,
	ArityMismatch,
	MissingBlock,
	PreconditionFailed,
	PostconditionFailed,
}

impl fmt::Display for FailureKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::NotImplemented => "not-implemented",
			Self::ArityMismatch => "arity-mismatch",
			Self::MissingBlock => "missing-block",
			Self::PreconditionFailed => "precondition-failed",
			Self::PostconditionFailed => "postcondition-failed",
		})
	}
}

/// One failure record.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}: {detail}")]
pub struct CheckError {
	pub kind: FailureKind,
	pub message: Message,
	/// Display form of the checked class or object.
	pub subject: String,
	pub detail: String,
}

impl CheckError {
	pub fn new(
		kind: FailureKind,
		message: Message,
		subject: impl Into<String>,
		detail: impl Into<String>,
	) -> Self {
		Self {
			kind,
			message,
			subject: subject.into(),
			detail: detail.into(),
		}
	}

	/// Recovers a contract violation that travelled through dispatch as a fault.
	pub fn from_fault(fault: &Fault) -> Option<&CheckError> {
		fault.downcast_ref::<CheckError>()
	}
}

/// Aggregate of every failure record of one check.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckFailed {
	errors: Vec<CheckError>,
}

impl CheckFailed {
	pub fn new(errors: Vec<CheckError>) -> Self {
		Self { errors }
	}

	pub fn errors(&self) -> &[CheckError] {
		&self.errors
	}

	pub fn into_errors(self) -> Vec<CheckError> {
		self.errors
	}

	/// The failing messages, in check order.
	pub fn messages(&self) -> Vec<&Message> {
		self.errors.iter().map(|e| &e.message).collect()
	}

	pub fn push(&mut self, error: CheckError) {
		self.errors.push(error);
	}

	pub fn len(&self) -> usize {
		self.errors.len()
	}

	pub fn is_empty(&self) -> bool {
		self.errors.is_empty()
	}

	pub fn iter(&self) -> std::slice::Iter<'_, CheckError> {
		self.errors.iter()
	}

	/// Recovers an aggregate failure raised inside a method body.
	pub fn from_fault(fault: &Fault) -> Option<&CheckFailed> {
		fault.downcast_ref::<CheckFailed>()
	}
}

impl fmt::Display for CheckFailed {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for (idx, error) in self.errors.iter().enumerate() {
			if idx > 0 {
				f.write_str("|")?;
			}
			write!(f, "{error}")?;
		}
		Ok(())
	}
}

impl std::error::Error for CheckFailed {}

impl<'a> IntoIterator for &'a CheckFailed {
	type Item = &'a CheckError;
	type IntoIter = std::slice::Iter<'a, CheckError>;

	fn into_iter(self) -> Self::IntoIter {
		self.errors.iter()
	}
}

impl From<CheckFailed> for Fault {
	fn from(err: CheckFailed) -> Self {
		Fault::foreign(err)
	}
}

impl From<CheckError> for Fault {
	fn from(err: CheckError) -> Self {
		Fault::foreign(err)
	}
}

/// Engine error.
///
/// `DuplicateMessage` and `NotSupported` are authoring or environment errors and are raised
/// regardless of any failure policy. `Check` carries conformance failures under the `error`
/// policy.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
	#[error("a message named '{name}' was already defined in {protocol}")]
	DuplicateMessage { protocol: String, name: String },

	#[error("cannot introspect '{method}' of {owner}: no parameter metadata")]
	NotSupported { owner: String, method: String },

	#[error("'{name}' is not defined for {subject}")]
	UnknownMethod { subject: String, name: String },

	#[error("invalid signature text: {0}")]
	Signature(String),

	#[error(transparent)]
	Check(#[from] CheckFailed),

	#[error(transparent)]
	Config(#[from] ConfigError),
}

impl ProtocolError {
	/// The aggregate conformance failure, if this is one.
	pub fn check_failed(&self) -> Option<&CheckFailed> {
		match self {
			Self::Check(failed) => Some(failed),
			_ => None,
		}
	}
}

impl From<ProtocolError> for Fault {
	fn from(err: ProtocolError) -> Self {
		match err {
			ProtocolError::Check(failed) => failed.into(),
			other => Fault::raised(other.to_string()),
		}
	}
}
