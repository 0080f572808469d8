//! Common utilities for protocol integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use covenant_protocol::covenant_runtime::{Fault, ObjectRef, Runtime, Value};
use covenant_protocol::{Engine, EngineConfig};

/// Fresh engine over a fresh runtime, with a test subscriber installed once.
pub fn engine() -> Engine {
	let _ = tracing_subscriber::fmt::try_init();
	Engine::new(Arc::new(Runtime::new()))
}

pub fn engine_with(config: EngineConfig) -> Engine {
	let _ = tracing_subscriber::fmt::try_init();
	Engine::with_config(Arc::new(Runtime::new()), config)
}

pub fn int(value: &Value) -> i64 {
	value.as_int().unwrap_or_default()
}

/// 1-based line of the `(def name ...)` form in `source`.
pub fn line_of(source: &str, name: &str) -> u32 {
	let needle = format!("(def {name} ");
	source
		.lines()
		.position(|l| l.trim_start().starts_with(&needle))
		.map(|idx| idx as u32 + 1)
		.unwrap_or_else(|| panic!("no definition of {name}"))
}

/// Items stored in the receiver's `items` ivar.
pub fn items(obj: &ObjectRef) -> Vec<Value> {
	obj.ivar("items")
		.as_list()
		.map(<[Value]>::to_vec)
		.unwrap_or_default()
}

pub fn set_items(obj: &ObjectRef, items: Vec<Value>) {
	obj.set_ivar("items", Value::from(items));
}

pub fn send(engine: &Engine, receiver: &Value, name: &str, args: &[Value]) -> Result<Value, Fault> {
	engine.runtime().send(receiver, name, args)
}
