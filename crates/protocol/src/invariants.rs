#![allow(dead_code)]

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use covenant_runtime::{BodyTraits, Class, Fault, MethodDef, Runtime, Value};
use parking_lot::Mutex;

use crate::config::FailurePolicy;
use crate::contract::{active_contracts, contract_depth};
use crate::engine::Engine;
use crate::error::{CheckError, FailureKind};
use crate::message::Arity;

fn engine() -> Engine {
	Engine::new(Arc::new(Runtime::new()))
}

fn int(value: &Value) -> i64 {
	value.as_int().unwrap_or_default()
}

/// Class with `deposit(amount)` adding to a balance. 13 faults, 666 panics.
fn account(engine: &Engine) -> Arc<Class> {
	let class = engine.runtime().define_class("Account");
	class.define(
		MethodDef::new("deposit", |call| {
			let amount = int(&call.arg(0));
			if amount == 13 {
				return Err(Fault::raised("unlucky amount"));
			}
			if amount == 666 {
				panic!("deposit blew up");
			}
			let balance = call.this()?.update_ivar("balance", |b| {
				*b = Value::Int(int(b) + amount);
				b.clone()
			});
			Ok(balance)
		})
		.param("amount"),
	);
	class
}

/// Invariant: a check has no hidden order dependence.
///
/// The same candidate checked twice without changes MUST yield identical records, ordered by
/// message name.
pub(crate) fn inv_check_is_deterministic() {
	let engine = engine();
	let class = engine.runtime().define_class("Partial");
	class.define(MethodDef::stub("zip").param("a").param("b"));
	class.define(MethodDef::stub("map"));
	let proto = engine
		.protocol("Wide", |p| {
			p.responds_to("take")?
				.understand("zip", Arity::Fixed(1), false)?
				.understand("map", Arity::Fixed(0), true)?
				.responds_to("filter")?;
			Ok(())
		})
		.unwrap();

	let first = proto.failing_messages(&engine, &class).unwrap();
	let second = proto.failing_messages(&engine, &class).unwrap();
	assert_eq!(first, second);
	let names: Vec<&str> = first.iter().map(|e| e.message.name()).collect();
	assert_eq!(names, ["filter", "map", "take", "zip"]);
}

#[cfg_attr(test, test)]
pub(crate) fn test_check_is_deterministic() {
	inv_check_is_deterministic()
}

/// Invariant: the most specific definition of a name wins.
///
/// A protocol's own message MUST shadow a composed protocol's message of the same name, while
/// the shadowed definition stays reachable as a candidate.
pub(crate) fn inv_override_precedence() {
	let engine = engine();
	let base = engine
		.protocol("Base", |p| {
			p.understand("push", Arity::Fixed(2), false)?
				.responds_to("size")?;
			Ok(())
		})
		.unwrap();
	let derived = engine
		.protocol("Derived", |p| {
			p.compose(&base).understand("push", Arity::Fixed(1), false)?;
			Ok(())
		})
		.unwrap();

	assert_eq!(derived.get("push").map(|m| m.arity()), Some(Arity::Fixed(1)));
	assert_eq!(derived.get("push").map(|m| m.protocol().to_string()), Some("Derived".into()));
	assert!(derived.understands("size", None));
	let candidates: Vec<String> = derived
		.message_candidates("push")
		.iter()
		.map(|m| m.to_string())
		.collect();
	assert_eq!(candidates, ["Derived#push(1)", "Base#push(2)"]);
	assert_eq!(base.get("push").map(|m| m.arity()), Some(Arity::Fixed(2)));
}

#[cfg_attr(test, test)]
pub(crate) fn test_override_precedence() {
	inv_override_precedence()
}

/// Contracted `deposit(amount)`: positive amount before, growing balance after.
fn contracted_account(
	engine: &Engine,
	evaluations: &Arc<AtomicUsize>,
) -> (Arc<Class>, Arc<crate::protocol::Protocol>) {
	let class = account(engine);
	let seen = Arc::clone(evaluations);
	let proto = engine
		.protocol("Depositing", move |p| {
			p.def(
				MethodDef::new("deposit", move |call| {
					seen.fetch_add(1, Ordering::SeqCst);
					call.precondition(|c| Ok(int(&c.arg(0)) > 0))?;
					let before = int(&call.this()?.ivar("balance"));
					call.postcondition(move |o| Ok(int(o.result()) > before))?;
					Ok(Value::Nil)
				})
				.param("amount")
				.traits(BodyTraits::INVOKES),
			)?;
			Ok(())
		})
		.unwrap();
	(class, proto)
}

/// Invariant: repeated checks never stack wrappers.
///
/// Checking the same class (or its instances) again MUST NOT install a second wrapper, so the
/// contract body runs exactly once per call.
pub(crate) fn inv_wrapping_is_idempotent() {
	let engine = engine();
	let evaluations = Arc::new(AtomicUsize::new(0));
	let (class, proto) = contracted_account(&engine, &evaluations);

	for _ in 0..3 {
		assert!(proto.check(&engine, &class, None).unwrap());
	}
	let obj = engine.runtime().instantiate(&class);
	assert!(proto.check(&engine, &obj, None).unwrap());
	assert_eq!(engine.runtime().intercepts().len(), 1);

	let result = engine
		.runtime()
		.send(&obj.into(), "deposit", &[Value::Int(5)])
		.unwrap();
	assert_eq!(result, Value::Int(5));
	assert_eq!(evaluations.load(Ordering::SeqCst), 1);
}

#[cfg_attr(test, test)]
pub(crate) fn test_wrapping_is_idempotent() {
	inv_wrapping_is_idempotent()
}

/// Invariant: postconditions belong to the call that registered them.
///
/// A contracted call made while another one is active (from its implementation or from one of
/// its postconditions) MUST evaluate only its own postconditions, against its own result.
pub(crate) fn inv_reentrant_postconditions_are_isolated() {
	let engine = engine();
	let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

	let class = engine.runtime().define_class("Worker");
	let active = Arc::clone(&log);
	class.define(
		MethodDef::new("outer", |call| {
			let inner = call.send("inner", &[call.arg(0)])?;
			Ok(Value::Int(int(&inner) + 1))
		})
		.param("x"),
	);
	class.define(
		MethodDef::new("inner", move |call| {
			active.lock().push(active_contracts().join(" > "));
			Ok(Value::Int(int(&call.arg(0)) * 2))
		})
		.param("x"),
	);

	let inner_log = Arc::clone(&log);
	let inner_contract = MethodDef::new("inner", move |call| {
		let log = Arc::clone(&inner_log);
		call.postcondition(move |o| {
			log.lock().push(format!("inner:{:?}", o.result()));
			Ok(true)
		})?;
		Ok(Value::Nil)
	})
	.param("x")
	.traits(BodyTraits::INVOKES);

	// The outer postcondition itself makes a contracted call.
	let outer_log = Arc::clone(&log);
	let outer_contract = MethodDef::new("outer", move |call| {
		let log = Arc::clone(&outer_log);
		call.postcondition(move |o| {
			let nested = o.send("inner", &[Value::Int(10)])?;
			log.lock().push(format!("outer:via-inner:{nested:?}"));
			Ok(int(&nested) == 20)
		})?;
		let log = Arc::clone(&outer_log);
		call.postcondition(move |o| {
			log.lock().push(format!("outer:{:?}", o.result()));
			Ok(true)
		})?;
		Ok(Value::Nil)
	})
	.param("x")
	.traits(BodyTraits::INVOKES);

	let proto = engine
		.protocol("Nested", |p| {
			p.def(outer_contract)?.def(inner_contract)?;
			Ok(())
		})
		.unwrap();
	assert!(proto.check(&engine, &class, None).unwrap());

	let obj = engine.runtime().instantiate(&class);
	let result = engine
		.runtime()
		.send(&obj.into(), "outer", &[Value::Int(1)])
		.unwrap();
	assert_eq!(result, Value::Int(3));
	assert_eq!(
		*log.lock(),
		[
			"Nested#outer > Nested#inner",
			"inner:2",
			"Nested#outer > Nested#inner",
			"inner:20",
			"outer:via-inner:20",
			"outer:3",
		]
	);
	assert_eq!(contract_depth(), 0);
}

#[cfg_attr(test, test)]
pub(crate) fn test_reentrant_postconditions_are_isolated() {
	inv_reentrant_postconditions_are_isolated()
}

/// Invariant: contract frames never outlive their call.
///
/// A failed precondition, a faulting implementation and a panicking implementation MUST all
/// leave the frame stack as they found it.
pub(crate) fn inv_contract_frames_unwind_on_failure() {
	let engine = engine();
	let evaluations = Arc::new(AtomicUsize::new(0));
	let (class, proto) = contracted_account(&engine, &evaluations);
	proto.set_failure_policy(FailurePolicy::Raise);
	assert!(proto.check(&engine, &class, None).unwrap());
	let obj = Value::from(engine.runtime().instantiate(&class));
	let rt = engine.runtime();

	let fault = rt.send(&obj, "deposit", &[Value::Int(-1)]).unwrap_err();
	let error = CheckError::from_fault(&fault).unwrap();
	assert_eq!(error.kind, FailureKind::PreconditionFailed);
	assert_eq!(error.detail, "precondition failed for Account");
	assert_eq!(contract_depth(), 0);

	let fault = rt.send(&obj, "deposit", &[Value::Int(13)]).unwrap_err();
	assert_eq!(fault.to_string(), "unlucky amount");
	assert_eq!(contract_depth(), 0);

	let panicked = catch_unwind(AssertUnwindSafe(|| {
		let _ = rt.send(&obj, "deposit", &[Value::Int(666)]);
	}));
	assert!(panicked.is_err());
	assert_eq!(contract_depth(), 0);

	assert_eq!(rt.send(&obj, "deposit", &[Value::Int(4)]).unwrap(), Value::Int(4));
	assert!(active_contracts().is_empty());
}

#[cfg_attr(test, test)]
pub(crate) fn test_contract_frames_unwind_on_failure() {
	inv_contract_frames_unwind_on_failure()
}

/// Invariant: a contract guards only the implementation that was checked.
///
/// A subclass override, or a singleton method, reached below a wrapped class MUST run without
/// the contract until that subclass or object is checked itself.
pub(crate) fn inv_unchecked_overrides_skip_the_contract() {
	let engine = engine();
	let evaluations = Arc::new(AtomicUsize::new(0));
	let (class, proto) = contracted_account(&engine, &evaluations);
	proto.set_failure_policy(FailurePolicy::Raise);
	assert!(proto.check(&engine, &class, None).unwrap());
	let rt = engine.runtime();

	let savings = rt.define_subclass("Savings", &class);
	savings.define(MethodDef::new("deposit", |_| Ok(Value::Int(0))).param("amount"));
	let saver = Value::from(rt.instantiate(&savings));
	let loner = rt.instantiate(&class);
	loner.define_singleton(MethodDef::new("deposit", |_| Ok(Value::Int(-7))).param("amount"));
	let plain = Value::from(rt.instantiate(&class));

	assert_eq!(rt.send(&saver, "deposit", &[Value::Int(-1)]).unwrap(), Value::Int(0));
	assert_eq!(
		rt.send(&Value::from(Arc::clone(&loner)), "deposit", &[Value::Int(-1)]).unwrap(),
		Value::Int(-7)
	);
	assert_eq!(evaluations.load(Ordering::SeqCst), 0);
	let fault = rt.send(&plain, "deposit", &[Value::Int(-1)]).unwrap_err();
	assert_eq!(
		CheckError::from_fault(&fault).map(|e| e.kind),
		Some(FailureKind::PreconditionFailed)
	);
	assert_eq!(evaluations.load(Ordering::SeqCst), 1);

	assert!(proto.check(&engine, &savings, None).unwrap());
	assert!(proto.check(&engine, &loner, None).unwrap());
	assert_eq!(rt.intercepts().len(), 3);
	for receiver in [saver, Value::from(loner)] {
		let fault = rt.send(&receiver, "deposit", &[Value::Int(-1)]).unwrap_err();
		assert_eq!(
			CheckError::from_fault(&fault).map(|e| e.kind),
			Some(FailureKind::PreconditionFailed)
		);
	}
	assert_eq!(evaluations.load(Ordering::SeqCst), 3);
}

#[cfg_attr(test, test)]
pub(crate) fn test_unchecked_overrides_skip_the_contract() {
	inv_unchecked_overrides_skip_the_contract()
}

/// Invariant: concurrent checks of one candidate install one wrapper.
///
/// Checks racing on the same protocol and class MUST all pass, populate the effective set
/// consistently and leave a single wrapper, so the contract body runs once per call.
pub(crate) fn inv_concurrent_checks_install_once() {
	let engine = engine();
	let evaluations = Arc::new(AtomicUsize::new(0));
	let (class, proto) = contracted_account(&engine, &evaluations);

	let seen: Vec<usize> = std::thread::scope(|scope| {
		let handles: Vec<_> = (0..16)
			.map(|_| {
				scope.spawn(|| {
					assert!(proto.check(&engine, &class, None).unwrap());
					proto.len()
				})
			})
			.collect();
		handles.into_iter().map(|h| h.join().unwrap()).collect()
	});
	assert!(seen.iter().all(|&len| len == 1));
	assert_eq!(engine.runtime().intercepts().len(), 1);

	let obj = Value::from(engine.runtime().instantiate(&class));
	for amount in 1..=3 {
		engine
			.runtime()
			.send(&obj, "deposit", &[Value::Int(amount)])
			.unwrap();
	}
	assert_eq!(evaluations.load(Ordering::SeqCst), 3);
}

#[cfg_attr(test, test)]
pub(crate) fn test_concurrent_checks_install_once() {
	inv_concurrent_checks_install_once()
}
