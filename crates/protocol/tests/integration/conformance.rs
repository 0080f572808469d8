use std::sync::Arc;

use covenant_protocol::covenant_runtime::{Class, Fault, MethodDef, Value};
use covenant_protocol::{Arity, Engine, FailureKind, FailurePolicy, Protocol};
use pretty_assertions::assert_eq;

use crate::common::{engine, line_of, send};

/// `name` required; `greet` provided as default behaviour.
fn greeting(engine: &Engine) -> Arc<Protocol> {
	engine
		.protocol("Greeting", |p| {
			p.understand("name", Arity::Fixed(0), false)?
				.implementation()
				.def(MethodDef::new("greet", |call| {
					let name = call.send("name", &[])?;
					Ok(Value::from(format!("hello, {name}")))
				}))?;
			Ok(())
		})
		.unwrap()
}

fn person(engine: &Engine) -> Arc<Class> {
	let class = engine.runtime().define_class("Person");
	class.define(MethodDef::new("name", |call| call.ivar("name")));
	class
}

fn named(engine: &Engine, class: &Arc<Class>, name: &str) -> Value {
	let obj = engine.runtime().instantiate(class);
	obj.set_ivar("name", Value::from(name));
	Value::from(obj)
}

fn names(protocols: &[Arc<Protocol>]) -> Vec<&str> {
	protocols.iter().map(|p| p.name()).collect()
}

#[test]
fn test_object_conformance_extends_only_that_object() {
	let engine = engine();
	let greeting = greeting(&engine);
	let class = person(&engine);
	let ada = named(&engine, &class, "ada");
	let bob = named(&engine, &class, "bob");

	assert!(engine.conform_to(ada.as_object().unwrap(), &greeting).unwrap());
	assert_eq!(send(&engine, &ada, "greet", &[]).unwrap(), Value::from("hello, ada"));
	let fault = send(&engine, &bob, "greet", &[]).unwrap_err();
	assert!(matches!(fault, Fault::NoMethod { ref name, .. } if name == "greet"));

	assert_eq!(names(&engine.declared_conformances(ada.as_object().unwrap())), ["Greeting"]);
	assert!(engine.declared_conformances(bob.as_object().unwrap()).is_empty());
	assert!(engine.declared_conformances(&class).is_empty());
}

#[test]
fn test_class_conformance_reaches_instances_and_subclasses() {
	let engine = engine();
	let greeting = greeting(&engine);
	let class = person(&engine);
	let child = engine.runtime().define_subclass("Child", &class);

	assert!(engine.conform_to(&class, &greeting).unwrap());
	// Registering again changes nothing.
	assert!(engine.conform_to(&class, &greeting).unwrap());
	assert_eq!(names(&engine.declared_conformances(&class)), ["Greeting"]);

	let kid = named(&engine, &child, "kim");
	assert_eq!(send(&engine, &kid, "greet", &[]).unwrap(), Value::from("hello, kim"));
	assert!(engine.is_declared(kid.as_object().unwrap(), &greeting));
	assert!(engine.is_declared(&child, &greeting));
}

#[test]
fn test_failed_conformance_records_nothing() {
	let engine = engine();
	let greeting = greeting(&engine);
	greeting.set_failure_policy(FailurePolicy::Silent);
	let mute = engine.runtime().define_class("Mute");

	assert!(!engine.conform_to(&mute, &greeting).unwrap());
	assert!(!engine.is_declared(&mute, &greeting));
	let obj = Value::from(engine.runtime().instantiate(&mute));
	assert!(send(&engine, &obj, "greet", &[]).is_err());

	greeting.set_failure_policy(FailurePolicy::Raise);
	let err = engine.conform_to(&mute, &greeting).unwrap_err();
	let failed = err.check_failed().unwrap();
	assert_eq!(failed.errors()[0].kind, FailureKind::NotImplemented);
	assert!(engine.declared_conformances(&mute).is_empty());
}

#[test]
fn test_composed_defaults_favor_the_composing_protocol() {
	let engine = engine();
	let greeting = greeting(&engine);
	let polite = engine
		.protocol("Polite", |p| {
			p.compose(&greeting)
				.implementation()
				.def(MethodDef::new("greet", |call| {
					let name = call.send("name", &[])?;
					Ok(Value::from(format!("good day, {name}")))
				}))?
				.def(MethodDef::new("farewell", |_| Ok(Value::from("goodbye"))))?;
			Ok(())
		})
		.unwrap();
	assert_eq!(polite.inspect(), "#<Polite: name(0)>");

	let class = person(&engine);
	assert!(engine.conform_to(&class, &polite).unwrap());
	let ada = named(&engine, &class, "ada");
	assert_eq!(send(&engine, &ada, "greet", &[]).unwrap(), Value::from("good day, ada"));
	assert_eq!(send(&engine, &ada, "farewell", &[]).unwrap(), Value::from("goodbye"));

	assert_eq!(names(&engine.declared_conformances(&class)), ["Polite", "Greeting"]);
	assert!(engine.is_declared(&class, &greeting));
	assert!(engine.conforms_to(&class, &greeting).unwrap());
}

#[test]
fn test_signature_text_defines_a_checkable_protocol() {
	let engine = engine();
	let text = "(protocol Sized\n  (def resize (width ?height))\n  (understand size))";
	let sized = Protocol::from_signature_text(&engine, text).unwrap();
	assert!(Arc::ptr_eq(&engine.find_protocol("Sized").unwrap(), &sized));
	assert_eq!(sized.inspect(), "#<Sized: resize(1+), size()>");
	assert_eq!(sized.to_signature_text(), "(protocol Sized\n  (def resize (x1 *rest))\n  (understand size))");

	let class = engine.runtime().define_class("Canvas");
	class.define(MethodDef::stub("size"));
	class.define(MethodDef::stub("resize").param("w").optional("h"));
	assert!(engine.conform_to(&class, &sized).unwrap());

	let rigid = engine.runtime().define_class("Fixed");
	rigid.define(MethodDef::stub("size"));
	rigid.define(MethodDef::stub("resize"));
	let errors = sized.failing_messages(&engine, &rigid).unwrap();
	assert_eq!(errors.len(), 1);
	assert_eq!(errors[0].kind, FailureKind::ArityMismatch);
}

#[test]
fn test_reloaded_source_is_analyzed_again() {
	const BEFORE: &str = "(def each ()\n  (list))\n";
	const AFTER: &str = "(def each ()\n  (yield 1))\n";

	let engine = engine();
	let iterating = engine
		.protocol("Each", |p| {
			p.understand("each", Arity::Fixed(0), true)?;
			Ok(())
		})
		.unwrap();
	assert!(!engine.reload_source("each.cov", BEFORE));
	let class = engine.runtime().define_class("Lazy");
	class.define(MethodDef::stub("each").located("each.cov", line_of(BEFORE, "each")));

	let errors = iterating.failing_messages(&engine, &class).unwrap();
	assert_eq!(errors[0].kind, FailureKind::MissingBlock);
	assert_eq!(engine.introspector().cached_sources(), 1);

	assert!(engine.reload_source("each.cov", AFTER));
	assert_eq!(engine.introspector().cached_sources(), 0);
	assert!(iterating.failing_messages(&engine, &class).unwrap().is_empty());
	assert!(iterating.check(&engine, &class, None).unwrap());
}

#[test]
fn test_protocol_names_track_bindings() {
	let engine = engine();
	let first = greeting(&engine);
	let second = greeting(&engine);
	assert!(!Arc::ptr_eq(&first, &second));
	assert!(Arc::ptr_eq(&engine.find_protocol("Greeting").unwrap(), &second));
	engine.protocol("Assignee", |_| Ok(())).unwrap();
	let names = engine.protocol_names();
	let bound: Vec<&str> = names.iter().map(AsRef::as_ref).collect();
	assert_eq!(bound, ["Assignee", "Greeting"]);
}
