use std::sync::Arc;

use covenant_protocol::covenant_runtime::{BodyTraits, Call, Class, Fault, MethodDef, Subject, Value};
use covenant_protocol::{CheckError, Engine, EngineConfig, FailureKind, FailurePolicy, Protocol};
use pretty_assertions::assert_eq;

use crate::common::{engine_with, int, items, send, set_items};

const CONFIG: &str = r#"
failure-policy = "error"

[protocols.Observing]
failure-policy = "warn"
"#;

/// Contract body: `size` of the queue passed as argument 0 is unchanged by the call.
fn size_preserving(name: &str) -> MethodDef {
	MethodDef::new(name, |call| {
		let queue = call.arg(0);
		let before = int(&call.runtime().send(&queue, "size", &[])?);
		call.postcondition(move |o| Ok(int(&o.runtime().send(&queue, "size", &[])?) == before))?;
		Ok(Value::Nil)
	})
	.param("q")
	.traits(BodyTraits::INVOKES)
}

fn observing(engine: &Engine) -> Arc<Protocol> {
	engine
		.protocol("Observing", |p| {
			p.def(size_preserving("after_enq"))?
				.def(size_preserving("after_deq"))?;
			Ok(())
		})
		.unwrap()
}

fn queue_protocol(engine: &Engine, observing: &Arc<Protocol>) -> Arc<Protocol> {
	let (checker, observers) = (engine.clone(), Arc::clone(observing));
	engine
		.protocol("Queue", |p| {
			p.def(
				MethodDef::new("observer=", move |call| {
					call.precondition(|c| {
						let Some(candidate) = Subject::from_value(&c.arg(0)) else {
							return Ok(false);
						};
						Ok(observers.probe(&checker, candidate)?)
					})?;
					Ok(Value::Nil)
				})
				.param("o")
				.traits(BodyTraits::INVOKES),
			)?
			.def(
				MethodDef::new("enq", |call| {
					call.postcondition(|o| Ok(!o.send("empty?", &[])?.truthy()))?;
					call.postcondition(|o| Ok(o.result() == o.myself()))?;
					Ok(Value::Nil)
				})
				.param("x")
				.traits(BodyTraits::INVOKES),
			)?
			.def(MethodDef::stub("size"))?
			.def(
				MethodDef::new("first", |call| {
					call.postcondition(|o| {
						let empty = int(&o.send("size", &[])?) == 0;
						Ok(empty == o.result().is_nil())
					})?;
					Ok(Value::Nil)
				})
				.traits(BodyTraits::INVOKES),
			)?
			.def(
				MethodDef::new("deq", |call| {
					call.precondition(|c| Ok(int(&c.send("size", &[])?) > 0))?;
					Ok(Value::Nil)
				})
				.traits(BodyTraits::INVOKES),
			)?
			.def(
				MethodDef::new("empty?", |call| {
					call.postcondition(|o| {
						let empty = int(&o.send("size", &[])?) == 0;
						Ok(empty == o.result().truthy())
					})?;
					Ok(Value::Nil)
				})
				.traits(BodyTraits::INVOKES),
			)?;
			Ok(())
		})
		.unwrap()
}

fn notify(call: &Call<'_>, hook: &str) -> Result<(), Fault> {
	let observer = call.ivar("observer")?;
	if !observer.is_nil() {
		call.runtime().send(&observer, hook, &[call.receiver().clone()])?;
	}
	Ok(())
}

fn queue_class(engine: &Engine) -> Arc<Class> {
	let class = engine.runtime().define_class("Q");
	class.define(
		MethodDef::new("observer=", |call| {
			call.set_ivar("observer", call.arg(0))?;
			Ok(call.arg(0))
		})
		.param("o"),
	);
	class.define(
		MethodDef::new("enq", |call| {
			let this = call.this()?;
			let mut stored = items(this);
			stored.push(call.arg(0));
			set_items(this, stored);
			notify(call, "after_enq")?;
			Ok(call.receiver().clone())
		})
		.param("x"),
	);
	class.define(MethodDef::new("deq", |call| {
		let this = call.this()?;
		let mut stored = items(this);
		let head = if stored.is_empty() {
			Value::Nil
		} else {
			stored.remove(0)
		};
		set_items(this, stored);
		notify(call, "after_deq")?;
		Ok(head)
	}));
	class.define(MethodDef::new("size", |call| {
		Ok(Value::Int(items(call.this()?).len() as i64))
	}));
	class.define(MethodDef::new("first", |call| {
		Ok(items(call.this()?).first().cloned().unwrap_or_default())
	}));
	class.define(MethodDef::new("empty?", |call| {
		Ok(Value::Bool(items(call.this()?).is_empty()))
	}));
	class
}

fn observer_class(engine: &Engine, name: &str, sneaky: bool) -> Arc<Class> {
	let class = engine.runtime().define_class(name);
	class.define(
		MethodDef::new("after_enq", move |call| {
			if sneaky {
				call.runtime().send(&call.arg(0), "deq", &[])?;
			}
			Ok(Value::Nil)
		})
		.param("q"),
	);
	class.define(MethodDef::stub("after_deq").param("q"));
	class
}

struct Setup {
	engine: Engine,
	queue: Value,
	polite: Value,
	sneaky: Value,
}

fn setup() -> Setup {
	let engine = engine_with(EngineConfig::from_toml_str(CONFIG).unwrap());
	let observing = observing(&engine);
	let queue_protocol = queue_protocol(&engine, &observing);
	assert_eq!(queue_protocol.failure_policy(), FailurePolicy::Raise);
	assert_eq!(observing.failure_policy(), FailurePolicy::Warn);

	let q = queue_class(&engine);
	assert!(engine.conform_to(&q, &queue_protocol).unwrap());
	let polite = observer_class(&engine, "O", false);
	let sneaky = observer_class(&engine, "SneakyO", true);
	assert!(engine.conform_to(&polite, &observing).unwrap());
	assert!(engine.conform_to(&sneaky, &observing).unwrap());

	let rt = engine.runtime();
	Setup {
		queue: Value::from(rt.instantiate(&q)),
		polite: Value::from(rt.instantiate(&polite)),
		sneaky: Value::from(rt.instantiate(&sneaky)),
		engine,
	}
}

fn kind_of(fault: &Fault) -> Option<FailureKind> {
	CheckError::from_fault(fault).map(|e| e.kind)
}

#[test]
fn test_queue_with_polite_observer() {
	let s = setup();
	let q = &s.queue;
	send(&s.engine, q, "observer=", &[s.polite.clone()]).unwrap();

	assert_eq!(send(&s.engine, q, "empty?", &[]).unwrap(), Value::Bool(true));
	let fault = send(&s.engine, q, "deq", &[]).unwrap_err();
	assert_eq!(kind_of(&fault), Some(FailureKind::PreconditionFailed));
	assert_eq!(send(&s.engine, q, "first", &[]).unwrap(), Value::Nil);

	assert_eq!(send(&s.engine, q, "enq", &[Value::Int(2)]).unwrap(), *q);
	assert_eq!(send(&s.engine, q, "enq", &[Value::Int(3)]).unwrap(), *q);
	assert_eq!(send(&s.engine, q, "size", &[]).unwrap(), Value::Int(2));
	assert_eq!(send(&s.engine, q, "deq", &[]).unwrap(), Value::Int(2));
	assert_eq!(send(&s.engine, q, "first", &[]).unwrap(), Value::Int(3));
}

#[test]
fn test_non_observer_rejected_by_precondition() {
	let s = setup();
	let fault = send(&s.engine, &s.queue, "observer=", &[Value::Int(1)]).unwrap_err();
	assert_eq!(kind_of(&fault), Some(FailureKind::PreconditionFailed));

	let bare = Value::from(s.engine.runtime().instantiate(s.engine.runtime().object_class()));
	let fault = send(&s.engine, &s.queue, "observer=", &[bare]).unwrap_err();
	assert_eq!(kind_of(&fault), Some(FailureKind::PreconditionFailed));
	assert!(s.queue.as_object().unwrap().ivar("observer").is_nil());
}

/// The sneaky observer dequeues from inside `enq`, so the queue is empty again when the
/// `enq` postconditions run.
#[test]
fn test_sneaky_observer_breaks_enq_postcondition() {
	let s = setup();
	let q = &s.queue;
	send(&s.engine, q, "observer=", &[s.sneaky.clone()]).unwrap();

	let fault = send(&s.engine, q, "enq", &[Value::Int(7)]).unwrap_err();
	let error = CheckError::from_fault(&fault).unwrap();
	assert_eq!(error.kind, FailureKind::PostconditionFailed);
	assert_eq!(error.message.to_string(), "Queue#enq(1)");
	assert!(error.detail.starts_with("postcondition failed for Q, result = #<Q:"));
	assert_eq!(send(&s.engine, q, "empty?", &[]).unwrap(), Value::Bool(true));
}
