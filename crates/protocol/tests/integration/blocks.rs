use std::sync::Arc;

use covenant_protocol::covenant_runtime::{Call, Fault, MethodDef, Runtime, Value};
use covenant_protocol::{Arity, Engine, FailureKind, Protocol};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use rstest::rstest;

use crate::common::{engine, items, line_of, set_items};

const EACH_SOURCE: &str = "\
(def each ()
  (for-each items (fn (item) (yield item))))
";

fn each_protocol(engine: &Engine) -> Arc<Protocol> {
	engine
		.protocol("Iterating", |p| {
			p.def(MethodDef::stub("each").block("block"))?;
			Ok(())
		})
		.unwrap()
}

/// Candidate `each` shapes.
#[derive(Debug, Clone, Copy)]
enum Each {
	/// No block parameter, never yields.
	Ignoring,
	/// Explicit block parameter, forwards it to the inner collection.
	Forwarding,
	/// No block parameter, but the source yields.
	Yielding,
	/// Explicit block parameter plus a required argument.
	ExtraArgument,
}

/// Yields every stored item to the caller's block.
fn forward(call: &mut Call<'_>) -> Result<Value, Fault> {
	for item in items(call.this()?) {
		call.yield_block(&[item])?;
	}
	Ok(Value::Nil)
}

fn candidate(engine: &Engine, shape: Each) -> Value {
	let class = engine.runtime().define_class("Bag");
	match shape {
		Each::Ignoring => {
			class.define(MethodDef::stub("each"));
		}
		Each::Forwarding => {
			class.define(MethodDef::new("each", forward).block("block"));
		}
		Each::Yielding => {
			engine.reload_source("bag.cov", EACH_SOURCE);
			class.define(
				MethodDef::new("each", forward).located("bag.cov", line_of(EACH_SOURCE, "each")),
			);
		}
		Each::ExtraArgument => {
			class.define(MethodDef::new("each", forward).param("n").block("block"));
		}
	}
	let obj = engine.runtime().instantiate(&class);
	set_items(&obj, vec![Value::Int(1), Value::Int(2)]);
	Value::from(obj)
}

#[rstest]
#[case(Each::Ignoring, Some(FailureKind::MissingBlock))]
#[case(Each::Forwarding, None)]
#[case(Each::Yielding, None)]
#[case(Each::ExtraArgument, Some(FailureKind::ArityMismatch))]
fn test_each_block_expectation(#[case] shape: Each, #[case] expected: Option<FailureKind>) {
	let engine = engine();
	let protocol = each_protocol(&engine);
	assert_eq!(protocol.inspect(), "#<Iterating: each(0&)>");

	let bag = candidate(&engine, shape);
	let obj = bag.as_object().unwrap();
	let errors = protocol.failing_messages(&engine, obj).unwrap();
	assert_eq!(errors.first().map(|e| e.kind), expected, "{shape:?}");
	assert_eq!(protocol.probe(&engine, obj.class()).unwrap(), expected.is_none());
}

#[test]
fn test_missing_block_detail_names_object_and_class() {
	let engine = engine();
	let protocol = each_protocol(&engine);
	let bag = candidate(&engine, Each::Ignoring);
	let obj = bag.as_object().unwrap();

	let errors = protocol.failing_messages(&engine, obj).unwrap();
	assert_eq!(
		errors[0].detail,
		format!("expected a block argument for {obj}:Bag")
	);
}

#[test]
fn test_block_found_on_defining_ancestor() {
	let engine = engine();
	let protocol = each_protocol(&engine);
	let base = engine.runtime().define_class("Base");
	base.define(MethodDef::stub("each").block("block"));
	let derived = engine.runtime().define_subclass("Derived", &base);

	assert!(protocol.check(&engine, &derived, None).unwrap());
}

#[test]
fn test_forwarding_each_passes_block_through() {
	let engine = engine();
	let protocol = each_protocol(&engine);
	let bag = candidate(&engine, Each::Forwarding);
	assert!(engine.conform_to(bag.as_object().unwrap(), &protocol).unwrap());

	let seen = Arc::new(Mutex::new(Vec::new()));
	let sink = Arc::clone(&seen);
	engine
		.runtime()
		.send_with_block(
			&bag,
			"each",
			&[],
			Some(Arc::new(move |_: &Runtime, args: &[Value]| -> Result<Value, Fault> {
				sink.lock().push(args[0].clone());
				Ok(Value::Nil)
			})),
		)
		.unwrap();
	assert_eq!(*seen.lock(), [Value::Int(1), Value::Int(2)]);
}

#[test]
fn test_existence_only_each_ignores_blocks() {
	let engine = engine();
	let enumerating = engine.enumerating().unwrap();
	assert_eq!(enumerating.get("each").map(|m| m.arity()), Some(Arity::Unconstrained));

	for shape in [Each::Ignoring, Each::Forwarding, Each::ExtraArgument] {
		let engine = crate::common::engine();
		let bag = candidate(&engine, shape);
		let enumerating = engine.enumerating().unwrap();
		assert!(
			enumerating.probe(&engine, bag.as_object().unwrap()).unwrap(),
			"{shape:?}"
		);
	}
}
