//! Contract wrappers: precondition and postcondition enforcement around real calls.
//!
//! # Role
//!
//! Once a candidate conforms to a message whose protocol kept a contract body, a
//! [`ContractWrapper`] is installed in the runtime's interception table for the candidate's
//! class (type checks) or the single object (instance checks). Every later call of that
//! method runs the contract body first, then the real implementation, then the postconditions
//! the contract body registered.
//!
//! # Mental Model
//!
//! ```text
//! call ─▶ push Frame ─▶ contract body ──precondition──▶ verdict now
//!                            │
//!                            └─postcondition──▶ parked in Frame
//!         real implementation ─▶ result
//!         take Frame's postconditions ─▶ evaluate against Outcome ─▶ pop Frame
//! ```
//!
//! Frames live on a thread-local stack. A nested wrapped call (from a precondition, a
//! postcondition, or the real implementation) pushes its own frame, so it never sees or
//! consumes an outer call's parked postconditions.
//!
//! # Invariants
//!
//! - Frames are popped on every exit path, including faults and panics.
//!   - Enforced in: `FrameGuard::drop`
//!   - Tested by: `invariants::test_contract_frames_unwind_on_failure`
//!   - Failure symptom: a later call picks up a stale frame's postconditions.
//! - Postconditions are taken only from the wrapper's own frame.
//!   - Enforced in: `FrameGuard::take_postconditions`, `FrameSink::postcondition`
//!   - Tested by: `invariants::test_reentrant_postconditions_are_isolated`
//!   - Failure symptom: an inner call evaluates (or drops) the outer call's postconditions.
//! - At most one wrapper per `(target, method)`.
//!   - Enforced in: [`covenant_runtime::InterceptTable::install_once`]
//!   - Tested by: `invariants::test_wrapping_is_idempotent`,
//!     `invariants::test_concurrent_checks_install_once`
//!   - Failure symptom: conditions evaluated twice per call.
//! - A wrapper only runs around the implementation that was checked.
//!   - Enforced in: `ContractWrapper::applies_to`
//!   - Tested by: `invariants::test_unchecked_overrides_skip_the_contract`
//!   - Failure symptom: an override in an unchecked subclass, singleton or extension fails
//!     contracts it never agreed to.

use std::cell::RefCell;
use std::sync::Arc;

use covenant_runtime::{
	Call, CallSite, ContractSink, Fault, Interceptor, Method, Outcome, Postcondition, Runtime,
	Subject, Value,
};

use crate::config::FailurePolicy;
use crate::engine::Engine;
use crate::error::{CheckError, FailureKind};
use crate::message::Message;
use crate::protocol::Protocol;

struct Frame {
	protocol: Arc<str>,
	method: Arc<str>,
	postconditions: Vec<Postcondition>,
}

thread_local! {
	static CONTRACT_STACK: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// Number of contracted calls active on this thread.
pub fn contract_depth() -> usize {
	CONTRACT_STACK.with_borrow(Vec::len)
}

/// `Protocol#method` for each contracted call active on this thread, outermost first.
pub fn active_contracts() -> Vec<String> {
	CONTRACT_STACK.with_borrow(|stack| {
		stack
			.iter()
			.map(|f| format!("{}#{}", f.protocol, f.method))
			.collect()
	})
}

/// Pushes a frame on creation and pops it (and anything above it) on drop.
struct FrameGuard {
	depth: usize,
}

impl FrameGuard {
	fn enter(protocol: &str, method: &str) -> Self {
		let depth = CONTRACT_STACK.with_borrow_mut(|stack| {
			stack.push(Frame {
				protocol: Arc::from(protocol),
				method: Arc::from(method),
				postconditions: Vec::new(),
			});
			stack.len()
		});
		Self { depth }
	}

	fn take_postconditions(&self) -> Vec<Postcondition> {
		CONTRACT_STACK.with_borrow_mut(|stack| {
			stack
				.get_mut(self.depth - 1)
				.map(|frame| std::mem::take(&mut frame.postconditions))
				.unwrap_or_default()
		})
	}
}

impl Drop for FrameGuard {
	fn drop(&mut self) {
		// Dropped outside the borrow: captured values may run arbitrary drop code.
		let popped = CONTRACT_STACK.with_borrow_mut(|stack| {
			let at = (self.depth - 1).min(stack.len());
			stack.split_off(at)
		});
		drop(popped);
	}
}

/// Contract sink bound to one frame.
struct FrameSink<'a> {
	depth: usize,
	wrapper: &'a ContractWrapper,
	receiver: &'a Value,
}

impl ContractSink for FrameSink<'_> {
	fn precondition(&mut self, holds: bool) -> Result<(), Fault> {
		if holds {
			return Ok(());
		}
		self.wrapper.violation(
			FailureKind::PreconditionFailed,
			self.receiver,
			format!("precondition failed for {}", self.receiver.type_name()),
		)
	}

	fn postcondition(&mut self, check: Postcondition) {
		CONTRACT_STACK.with_borrow_mut(|stack| {
			if let Some(frame) = stack.get_mut(self.depth - 1) {
				frame.postconditions.push(check);
			}
		});
	}
}

pub(crate) struct ContractWrapper {
	protocol: Arc<Protocol>,
	message: Message,
	contract: Arc<Method>,
	implementation: Arc<Method>,
}

impl ContractWrapper {
	/// Routes a violation through the owning protocol's current failure policy.
	fn violation(&self, kind: FailureKind, receiver: &Value, detail: String) -> Result<(), Fault> {
		let error = CheckError::new(kind, self.message.clone(), receiver.to_string(), detail);
		match self.protocol.failure_policy() {
			FailurePolicy::Raise => Err(error.into()),
			FailurePolicy::Warn => {
				tracing::warn!(protocol = self.protocol.name(), %kind, "{error}");
				Ok(())
			}
			FailurePolicy::Silent => Ok(()),
		}
	}
}

impl Interceptor for ContractWrapper {
	fn intercept(
		&self,
		runtime: &Runtime,
		site: &CallSite<'_>,
		proceed: &mut dyn FnMut() -> Result<Value, Fault>,
	) -> Result<Value, Fault> {
		let frame = FrameGuard::enter(self.protocol.name(), site.name);
		{
			let mut sink = FrameSink {
				depth: frame.depth,
				wrapper: self,
				receiver: site.receiver,
			};
			let mut call = Call::new(runtime, site.receiver, site.name, site.args, site.block)
				.with_sink(&mut sink);
			(self.contract.body())(&mut call)?;
		}

		let result = proceed()?;
		let checks = frame.take_postconditions();
		if !checks.is_empty() {
			let outcome = Outcome::new(runtime, site.receiver, site.args, &result);
			for check in checks {
				if !check(&outcome)? {
					self.violation(
						FailureKind::PostconditionFailed,
						site.receiver,
						format!(
							"postcondition failed for {}, result = {result:?}",
							site.receiver.type_name()
						),
					)?;
					break;
				}
			}
		}
		Ok(result)
	}

	fn applies_to(&self, method: &Arc<Method>) -> bool {
		Arc::ptr_eq(method, &self.implementation)
	}
}

/// Installs the contract for `message` around `implementation`, the method `subject` was
/// checked against.
///
/// Instances are wrapped individually unless a class-level wrapper already covers the
/// implementation they resolve to. Returns true when a wrapper was installed by this call.
pub(crate) fn install(
	engine: &Engine,
	subject: &Subject,
	protocol: &Arc<Protocol>,
	message: &Message,
	contract: Arc<Method>,
	implementation: Arc<Method>,
) -> bool {
	let runtime = engine.runtime();
	let name = message.name();
	if let Subject::Object(obj) = subject
		&& runtime.interceptor_for(obj, name, &implementation).is_some()
	{
		return false;
	}
	runtime.intercepts().install_once(subject.target(), name, || {
		Arc::new(ContractWrapper {
			protocol: Arc::clone(protocol),
			message: message.clone(),
			contract,
			implementation,
		}) as Arc<dyn Interceptor>
	})
}
