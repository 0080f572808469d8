//! Protocol definitions and their effective message sets.
//!
//! # Mental Model
//!
//! A [`Protocol`] owns a [`Descriptor`] of messages it declares itself and an ordered list of
//! composed protocols. Its *effective* message set is computed by linearizing the protocol
//! graph (self first, then each composed protocol's linearization with the most recently
//! composed first, every protocol visited once), keeping the first message seen per name, and
//! sorting by name.
//!
//! # Invariants
//!
//! - A protocol's own definition of a name overrides any composed definition.
//!   - Enforced in: `Protocol::compute_effective`
//!   - Tested by: `invariants::test_override_precedence`
//!   - Failure symptom: a composing protocol's stricter arity is silently ignored.
//! - The cached effective set is never served after a structural change anywhere in the
//!   protocol graph.
//!   - Enforced in: `Protocol::touch` (global structure epoch) and `Protocol::resolved`
//!   - Tested by: `tests::test_cache_invalidated_by_composed_change`
//!   - Failure symptom: checks keep using messages a composed protocol no longer has.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwapOption;
use covenant_runtime::{Class, Method, MethodDef, Module, Subject};
use parking_lot::{Mutex, RwLock};
use regex::Regex;
use rustc_hash::FxHashSet as HashSet;

use crate::check;
use crate::config::FailurePolicy;
use crate::descriptor::Descriptor;
use crate::engine::Engine;
use crate::error::{CheckError, CheckFailed, ProtocolError};
use crate::message::{Arity, Message};

/// Bumped on every structural change of any protocol.
static STRUCTURE_EPOCH: AtomicU64 = AtomicU64::new(0);

/// What a method body declared on a protocol becomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
	/// Bodies are requirements: each one derives a message, complex ones are kept as
	/// contracts.
	#[default]
	Specification,
	/// Bodies are default behaviour mixed into conformers.
	Implementation,
}

struct State {
	descriptor: Descriptor,
	composed: Vec<Arc<Protocol>>,
	mode: Mode,
	policy: FailurePolicy,
}

/// An effective message together with the protocol that declared it.
pub(crate) struct Resolved {
	pub(crate) message: Message,
	pub(crate) owner: Weak<Protocol>,
}

pub(crate) struct Effective {
	epoch: u64,
	pub(crate) entries: Vec<Resolved>,
}

pub struct Protocol {
	name: Arc<str>,
	this: Weak<Protocol>,
	state: RwLock<State>,
	/// Default behaviour declared in implementation mode.
	defaults: Arc<Module>,
	/// Complex specification bodies, re-run as contracts at call time.
	contracts: Arc<Module>,
	effective: ArcSwapOption<Effective>,
	populate: Mutex<()>,
}

impl Protocol {
	pub(crate) fn new(name: &str, policy: FailurePolicy) -> Arc<Self> {
		let name: Arc<str> = Arc::from(name);
		Arc::new_cyclic(|this| Self {
			defaults: Module::new(Arc::clone(&name)),
			contracts: Module::new(format!("{name}(contract)")),
			state: RwLock::new(State {
				descriptor: Descriptor::new(Arc::clone(&name)),
				composed: Vec::new(),
				mode: Mode::default(),
				policy,
			}),
			name,
			this: this.clone(),
			effective: ArcSwapOption::empty(),
			populate: Mutex::new(()),
		})
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn mode(&self) -> Mode {
		self.state.read().mode
	}

	pub fn specification(&self) {
		self.state.write().mode = Mode::Specification;
	}

	pub fn implementation(&self) {
		self.state.write().mode = Mode::Implementation;
	}

	pub fn is_specification(&self) -> bool {
		self.mode() == Mode::Specification
	}

	pub fn is_implementation(&self) -> bool {
		self.mode() == Mode::Implementation
	}

	pub fn failure_policy(&self) -> FailurePolicy {
		self.state.read().policy
	}

	pub fn set_failure_policy(&self, policy: FailurePolicy) {
		self.state.write().policy = policy;
	}

	/// Module holding the default behaviour conformers receive.
	pub fn defaults(&self) -> &Arc<Module> {
		&self.defaults
	}

	/// The contract body kept for `name`, if its specification body was complex.
	pub fn contract_for(&self, name: &str) -> Option<Arc<Method>> {
		self.contracts.method(name)
	}

	/// Declares a signature-only message.
	pub fn understand(
		&self,
		name: &str,
		arity: Arity,
		block_expected: bool,
	) -> Result<(), ProtocolError> {
		self.add_message(Message::new(
			Arc::clone(&self.name),
			name,
			arity,
			block_expected,
		))
	}

	/// Alias of [`Protocol::understand`].
	pub fn declare(&self, name: &str, arity: Arity, block_expected: bool) -> Result<(), ProtocolError> {
		self.understand(name, arity, block_expected)
	}

	fn add_message(&self, message: Message) -> Result<(), ProtocolError> {
		self.state.write().descriptor.add_message(message)?;
		self.touch();
		Ok(())
	}

	/// Declares a method body according to the current [`Mode`].
	///
	/// In specification mode the body's introspected signature becomes a message; a complex
	/// body is additionally kept as the message's contract. In implementation mode the body
	/// becomes default behaviour.
	pub fn declare_method(&self, engine: &Engine, def: MethodDef) -> Result<(), ProtocolError> {
		if self.is_implementation() {
			let method = self.defaults.define(def);
			tracing::debug!(protocol = %self.name, method = method.name(), "default behaviour declared");
			return Ok(());
		}

		let name: Arc<str> = Arc::from(def.name());
		if self.state.read().descriptor.contains(&name) {
			return Err(ProtocolError::DuplicateMessage {
				protocol: self.name.to_string(),
				name: name.to_string(),
			});
		}
		let method = self.contracts.define(def);
		let signature = match engine
			.introspector()
			.signature(engine.reflection(), &method)
		{
			Ok(signature) => signature,
			Err(err) => {
				self.contracts.undefine(&name);
				return Err(err);
			}
		};
		let message = Message::new(
			Arc::clone(&self.name),
			Arc::clone(&name),
			signature.arity,
			signature.accepts_block(),
		);
		if let Err(err) = self.add_message(message) {
			self.contracts.undefine(&name);
			return Err(err);
		}
		if !signature.is_complex {
			if engine
				.introspector()
				.body_traits(engine.reflection(), &method)
				.is_none()
			{
				tracing::debug!(
					protocol = %self.name,
					method = %name,
					"body has no source and no declared traits; treated as simple, contract dropped"
				);
			}
			self.contracts.undefine(&name);
		}
		tracing::debug!(
			protocol = %self.name,
			method = %name,
			arity = %signature.arity,
			contract = signature.is_complex,
			"message declared from body"
		);
		Ok(())
	}

	/// Derives a message from an existing implementation of `name` on `subject`.
	///
	/// `block_expected` overrides the introspected block acceptance.
	pub fn inherit_signature_from(
		&self,
		engine: &Engine,
		subject: impl Into<Subject>,
		name: &str,
		block_expected: Option<bool>,
	) -> Result<(), ProtocolError> {
		let subject = subject.into();
		let reflection = engine.reflection();
		let method =
			reflection
				.find_method(&subject, name)
				.ok_or_else(|| ProtocolError::UnknownMethod {
					subject: subject.to_string(),
					name: name.to_string(),
				})?;
		let signature = engine.introspector().signature(reflection, &method)?;
		let block_expected = block_expected.unwrap_or_else(|| signature.accepts_block());
		self.add_message(Message::new(
			Arc::clone(&self.name),
			name,
			signature.arity,
			block_expected,
		))
	}

	/// Inherits the signature of every method `class` defines itself.
	pub fn infer_all(
		&self,
		engine: &Engine,
		class: &Arc<Class>,
		block_expected: Option<bool>,
	) -> Result<usize, ProtocolError> {
		let names = class.own_method_names();
		for name in &names {
			self.inherit_signature_from(engine, class, name, block_expected)?;
		}
		Ok(names.len())
	}

	/// Composes `other` into this protocol.
	///
	/// Returns false when `other` is already composed, is this protocol, or already composes
	/// this protocol.
	pub fn compose(&self, other: &Arc<Protocol>) -> bool {
		if std::ptr::eq(self, Arc::as_ptr(other))
			|| other
				.protocols()
				.iter()
				.any(|p| std::ptr::eq(self, Arc::as_ptr(p)))
		{
			tracing::debug!(protocol = %self.name, other = %other.name, "composition cycle rejected");
			return false;
		}
		{
			let mut state = self.state.write();
			if state.composed.iter().any(|p| Arc::ptr_eq(p, other)) {
				return false;
			}
			state.composed.push(Arc::clone(other));
		}
		self.touch();
		true
	}

	/// Directly composed protocols in composition order.
	pub fn composed(&self) -> Vec<Arc<Protocol>> {
		self.state.read().composed.clone()
	}

	/// This protocol followed by every protocol it reaches, in linearization order.
	pub fn protocols(&self) -> Vec<Arc<Protocol>> {
		let mut out = Vec::new();
		let mut seen = HashSet::default();
		self.linearize(&mut out, &mut seen);
		out
	}

	fn linearize(&self, out: &mut Vec<Arc<Protocol>>, seen: &mut HashSet<usize>) {
		if !seen.insert(self as *const Protocol as usize) {
			return;
		}
		if let Some(this) = self.this.upgrade() {
			out.push(this);
		}
		for composed in self.composed().iter().rev() {
			composed.linearize(out, seen);
		}
	}

	/// Messages this protocol declares itself, sorted by name.
	pub fn messages(&self) -> Vec<Message> {
		self.state.read().descriptor.messages()
	}

	/// The override-resolved, name-sorted message set.
	pub fn effective_messages(&self) -> Vec<Message> {
		self.resolved()
			.entries
			.iter()
			.map(|e| e.message.clone())
			.collect()
	}

	/// Every definition of `name` along the linearization, most specific first.
	pub fn message_candidates(&self, name: &str) -> Vec<Message> {
		self.protocols()
			.iter()
			.filter_map(|p| p.state.read().descriptor.get(name).cloned())
			.collect()
	}

	pub fn get(&self, name: &str) -> Option<Message> {
		self.resolved()
			.entries
			.iter()
			.find(|e| e.message.name() == name)
			.map(|e| e.message.clone())
	}

	/// Whether the effective set has `name`, optionally with exactly `arity`.
	pub fn understands(&self, name: &str, arity: Option<Arity>) -> bool {
		self.get(name)
			.is_some_and(|m| arity.is_none_or(|a| m.arity() == a))
	}

	/// Effective messages whose name matches `pattern`.
	pub fn grep(&self, pattern: &Regex) -> Vec<Message> {
		self.effective_messages()
			.into_iter()
			.filter(|m| pattern.is_match(m.name()))
			.collect()
	}

	pub fn len(&self) -> usize {
		self.resolved().entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Drops the cached effective set.
	pub fn reset_messages(&self) {
		self.effective.store(None);
	}

	/// Records a structural change: every cached effective set becomes stale.
	fn touch(&self) {
		STRUCTURE_EPOCH.fetch_add(1, Ordering::AcqRel);
		self.effective.store(None);
	}

	pub(crate) fn resolved(&self) -> Arc<Effective> {
		if let Some(hit) = self.fresh_cache() {
			return hit;
		}
		let _guard = self.populate.lock();
		if let Some(hit) = self.fresh_cache() {
			return hit;
		}
		let epoch = STRUCTURE_EPOCH.load(Ordering::Acquire);
		let effective = Arc::new(Effective {
			epoch,
			entries: self.compute_effective(),
		});
		self.effective.store(Some(Arc::clone(&effective)));
		tracing::debug!(
			protocol = %self.name,
			messages = effective.entries.len(),
			epoch,
			"effective messages cached"
		);
		effective
	}

	fn fresh_cache(&self) -> Option<Arc<Effective>> {
		let cached = self.effective.load_full()?;
		(cached.epoch == STRUCTURE_EPOCH.load(Ordering::Acquire)).then_some(cached)
	}

	fn compute_effective(&self) -> Vec<Resolved> {
		let mut taken: HashSet<Arc<str>> = HashSet::default();
		let mut entries = Vec::new();
		for protocol in self.protocols() {
			let owner = Arc::downgrade(&protocol);
			for message in protocol.messages() {
				if taken.insert(Arc::clone(message.name_arc())) {
					entries.push(Resolved {
						message,
						owner: owner.clone(),
					});
				}
			}
		}
		entries.sort_by(|a, b| a.message.cmp(&b.message));
		entries
	}

	/// Checks `subject`, applying `policy` or this protocol's own policy.
	///
	/// Returns `Ok(true)` on conformance. Nonconformance is `Err(ProtocolError::Check)` under
	/// [`FailurePolicy::Raise`] and `Ok(false)` otherwise.
	pub fn check(
		&self,
		engine: &Engine,
		subject: impl Into<Subject>,
		policy: Option<FailurePolicy>,
	) -> Result<bool, ProtocolError> {
		let policy = policy.unwrap_or_else(|| self.failure_policy());
		check::run(engine, self, &subject.into(), policy)
	}

	/// Raises the aggregate failure whenever a record exists, whatever the configured policy.
	pub fn check_or_throw(
		&self,
		engine: &Engine,
		subject: impl Into<Subject>,
	) -> Result<(), ProtocolError> {
		let errors = self.failing_messages(engine, subject)?;
		if errors.is_empty() {
			Ok(())
		} else {
			Err(CheckFailed::new(errors).into())
		}
	}

	/// Silent boolean check.
	pub fn probe(&self, engine: &Engine, subject: impl Into<Subject>) -> Result<bool, ProtocolError> {
		self.check(engine, subject, Some(FailurePolicy::Silent))
	}

	/// The failure records of a check, without applying any policy.
	pub fn failing_messages(
		&self,
		engine: &Engine,
		subject: impl Into<Subject>,
	) -> Result<Vec<CheckError>, ProtocolError> {
		check::failures(engine, self, &subject.into())
	}

	/// `#<Name: a(0), b(1&)>`
	pub fn inspect(&self) -> String {
		let shortcuts: Vec<String> = self
			.effective_messages()
			.iter()
			.map(Message::shortcut)
			.collect();
		format!("#<{}: {}>", self.name, shortcuts.join(", "))
	}
}

impl fmt::Display for Protocol {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let parts: Vec<String> = self
			.effective_messages()
			.iter()
			.map(Message::to_string)
			.collect();
		f.write_str(&parts.join(", "))
	}
}

impl fmt::Debug for Protocol {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.inspect())
	}
}

/// Definition-time handle passed to [`Engine::protocol`].
pub struct ProtocolScope<'a> {
	engine: &'a Engine,
	protocol: &'a Arc<Protocol>,
}

impl<'a> ProtocolScope<'a> {
	pub(crate) fn new(engine: &'a Engine, protocol: &'a Arc<Protocol>) -> Self {
		Self { engine, protocol }
	}

	pub fn engine(&self) -> &'a Engine {
		self.engine
	}

	pub fn protocol(&self) -> &'a Arc<Protocol> {
		self.protocol
	}

	pub fn understand(
		&mut self,
		name: &str,
		arity: Arity,
		block_expected: bool,
	) -> Result<&mut Self, ProtocolError> {
		self.protocol.understand(name, arity, block_expected)?;
		Ok(self)
	}

	/// Existence-only message.
	pub fn responds_to(&mut self, name: &str) -> Result<&mut Self, ProtocolError> {
		self.understand(name, Arity::Unconstrained, false)
	}

	pub fn def(&mut self, def: MethodDef) -> Result<&mut Self, ProtocolError> {
		self.protocol.declare_method(self.engine, def)?;
		Ok(self)
	}

	pub fn specification(&mut self) -> &mut Self {
		self.protocol.specification();
		self
	}

	pub fn implementation(&mut self) -> &mut Self {
		self.protocol.implementation();
		self
	}

	pub fn compose(&mut self, other: &Arc<Protocol>) -> &mut Self {
		self.protocol.compose(other);
		self
	}

	pub fn inherit(
		&mut self,
		subject: impl Into<Subject>,
		name: &str,
		block_expected: Option<bool>,
	) -> Result<&mut Self, ProtocolError> {
		self.protocol
			.inherit_signature_from(self.engine, subject, name, block_expected)?;
		Ok(self)
	}

	pub fn infer(
		&mut self,
		class: &Arc<Class>,
		block_expected: Option<bool>,
	) -> Result<&mut Self, ProtocolError> {
		self.protocol.infer_all(self.engine, class, block_expected)?;
		Ok(self)
	}

	pub fn failure_policy(&mut self, policy: FailurePolicy) -> &mut Self {
		self.protocol.set_failure_policy(policy);
		self
	}
}
