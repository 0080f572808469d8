//! Conformance checking.
//!
//! # Invariants
//!
//! - Messages are checked in name order and failures are reported in that order, so the same
//!   candidate checked twice without changes yields identical records.
//!   - Enforced in: [`failures`] (iterates the sorted effective set)
//!   - Tested by: `invariants::test_check_is_deterministic`
//!   - Failure symptom: the first reported failure changes between runs.
//! - `NotSupported` aborts the whole check; every other failure accumulates.
//!   - Enforced in: `check_message` (`?` on introspection only)
//!   - Tested by: `tests::test_not_supported_aborts_check`
//!   - Failure symptom: a native method is reported as an arity mismatch.

use std::sync::Arc;

use covenant_runtime::{Reflection, Subject};

use crate::config::FailurePolicy;
use crate::contract;
use crate::engine::Engine;
use crate::error::{CheckError, CheckFailed, FailureKind, ProtocolError};
use crate::message::Arity;
use crate::protocol::{Protocol, Resolved};

/// Runs a check and applies `policy` to its records.
pub(crate) fn run(
	engine: &Engine,
	protocol: &Protocol,
	subject: &Subject,
	policy: FailurePolicy,
) -> Result<bool, ProtocolError> {
	let errors = failures(engine, protocol, subject)?;
	tracing::debug!(
		protocol = protocol.name(),
		%subject,
		failures = errors.len(),
		%policy,
		"conformance checked"
	);
	report(protocol, subject, errors, policy)
}

/// Every failure record for `subject`, in message name order.
pub(crate) fn failures(
	engine: &Engine,
	protocol: &Protocol,
	subject: &Subject,
) -> Result<Vec<CheckError>, ProtocolError> {
	let effective = protocol.resolved();
	let mut errors = Vec::new();
	for entry in &effective.entries {
		if let Some(error) = check_message(engine, subject, entry)? {
			errors.push(error);
		}
	}
	Ok(errors)
}

fn report(
	protocol: &Protocol,
	subject: &Subject,
	errors: Vec<CheckError>,
	policy: FailurePolicy,
) -> Result<bool, ProtocolError> {
	if errors.is_empty() {
		return Ok(true);
	}
	match policy {
		FailurePolicy::Raise => Err(CheckFailed::new(errors).into()),
		FailurePolicy::Warn => {
			for error in &errors {
				tracing::warn!(
					protocol = protocol.name(),
					%subject,
					kind = %error.kind,
					"{error}"
				);
			}
			Ok(false)
		}
		FailurePolicy::Silent => Ok(false),
	}
}

fn check_message(
	engine: &Engine,
	subject: &Subject,
	entry: &Resolved,
) -> Result<Option<CheckError>, ProtocolError> {
	let message = &entry.message;
	let name = message.name();
	let reflection = engine.reflection();
	let fail = |kind, detail: String| {
		Ok(Some(CheckError::new(
			kind,
			message.clone(),
			subject.to_string(),
			detail,
		)))
	};

	let Some(method) = reflection.find_method(subject, name) else {
		return fail(
			FailureKind::NotImplemented,
			not_implemented_detail(reflection, subject, name),
		);
	};

	let arity = message.arity();
	let candidate = if arity.is_constrained() {
		engine.introspector().signature(reflection, &method)?.arity
	} else {
		Arity::Unconstrained
	};
	let has_block = !message.block_expected() || {
		let defining = reflection
			.resolve_defining_owner(subject, name)
			.and_then(|owner| owner.method(name))
			.unwrap_or_else(|| Arc::clone(&method));
		message.check_block(&engine.introspector().signature(reflection, &defining)?)
	};
	if let Err(kind) = message.matches(candidate, has_block) {
		let detail = match kind {
			FailureKind::ArityMismatch => format!(
				"wrong number of arguments for protocol in method '{name}' ({candidate} for {arity}) of {subject}"
			),
			_ => {
				let target = match subject {
					Subject::Class(_) => subject.to_string(),
					Subject::Object(obj) => format!("{obj}:{}", obj.class().name()),
				};
				format!("expected a block argument for {target}")
			}
		};
		return fail(kind, detail);
	}

	if arity.is_constrained()
		&& let Some(owner) = entry.owner.upgrade()
		&& let Some(body) = owner.contract_for(name)
	{
		contract::install(engine, subject, &owner, message, body, method);
	}
	tracing::trace!(message = %message, %subject, "message satisfied");
	Ok(None)
}

fn not_implemented_detail(reflection: &dyn Reflection, subject: &Subject, name: &str) -> String {
	let mut detail = match subject {
		Subject::Class(_) => format!("method '{name}' not implemented in {subject}"),
		Subject::Object(_) => format!("method '{name}' not responding in {subject}"),
	};
	if let Some(close) = suggest(reflection.all_members(subject), name) {
		detail.push_str(&format!(" (did you mean '{close}'?)"));
	}
	detail
}

/// Closest member name within a small edit distance.
fn suggest(members: Vec<Arc<str>>, name: &str) -> Option<Arc<str>> {
	members
		.into_iter()
		.filter(|m| m.as_ref() != name)
		.min_by_key(|m| strsim::levenshtein(name, m))
		.filter(|m| strsim::levenshtein(name, m) <= 2)
}
