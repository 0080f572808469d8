//! Declared conformance.
//!
//! Asserting that a class or object conforms to a protocol checks it and, on success, records
//! the membership here instead of mutating the candidate's identity. The protocol's default
//! behaviour is mixed in at the same time.

use std::sync::Arc;

use covenant_runtime::{Subject, SubjectKey};
use parking_lot::RwLock;
use rustc_hash::FxHashMap as HashMap;

use crate::config::FailurePolicy;
use crate::engine::Engine;
use crate::error::ProtocolError;
use crate::protocol::Protocol;

#[derive(Default)]
pub(crate) struct ConformanceRegistry {
	members: RwLock<HashMap<SubjectKey, Vec<Arc<Protocol>>>>,
}

impl ConformanceRegistry {
	/// Returns false when the membership was already recorded.
	pub(crate) fn record(&self, key: SubjectKey, protocol: &Arc<Protocol>) -> bool {
		let mut members = self.members.write();
		let declared = members.entry(key).or_default();
		if declared.iter().any(|p| Arc::ptr_eq(p, protocol)) {
			return false;
		}
		declared.push(Arc::clone(protocol));
		true
	}

	pub(crate) fn declared(&self, key: SubjectKey) -> Vec<Arc<Protocol>> {
		self.members.read().get(&key).cloned().unwrap_or_default()
	}
}

impl Engine {
	/// Asserts that `subject` conforms to `protocol`.
	///
	/// Checks under the protocol's own failure policy. On success the membership is recorded
	/// and the default behaviour of the protocol (and of everything it composes) is included
	/// into the class or extended onto the object.
	pub fn conform_to(
		&self,
		subject: impl Into<Subject>,
		protocol: &Arc<Protocol>,
	) -> Result<bool, ProtocolError> {
		let subject = subject.into();
		if !protocol.check(self, subject.clone(), None)? {
			return Ok(false);
		}
		if self.conformances().record(subject.key(), protocol) {
			// Least specific first so the most specific defaults win lookup.
			for reached in protocol.protocols().iter().rev() {
				let defaults = reached.defaults();
				if defaults.is_empty() {
					continue;
				}
				match &subject {
					Subject::Class(class) => class.include(defaults),
					Subject::Object(obj) => obj.extend(defaults),
				};
			}
			tracing::debug!(protocol = protocol.name(), %subject, "conformance declared");
		}
		Ok(true)
	}

	/// Silent probe, usable on classes and instances.
	pub fn conforms_to(
		&self,
		subject: impl Into<Subject>,
		protocol: &Protocol,
	) -> Result<bool, ProtocolError> {
		protocol.check(self, subject, Some(FailurePolicy::Silent))
	}

	/// Protocols declared for `subject`, its class chain, and everything they compose.
	///
	/// Most specific declaration first, without duplicates.
	pub fn declared_conformances(&self, subject: impl Into<Subject>) -> Vec<Arc<Protocol>> {
		let subject = subject.into();
		let mut keys = Vec::new();
		if let Subject::Object(obj) = &subject {
			keys.push(SubjectKey::Object(obj.id()));
		}
		keys.extend(
			subject
				.class()
				.ancestor_classes()
				.iter()
				.map(|c| SubjectKey::Class(c.id())),
		);

		let mut out: Vec<Arc<Protocol>> = Vec::new();
		for key in keys {
			for declared in self.conformances().declared(key) {
				for reached in declared.protocols() {
					if !out.iter().any(|p| Arc::ptr_eq(p, &reached)) {
						out.push(reached);
					}
				}
			}
		}
		out
	}

	/// Whether `subject` declared conformance to `protocol`, directly or through composition.
	pub fn is_declared(&self, subject: impl Into<Subject>, protocol: &Arc<Protocol>) -> bool {
		self.declared_conformances(subject)
			.iter()
			.any(|p| Arc::ptr_eq(p, protocol))
	}
}
