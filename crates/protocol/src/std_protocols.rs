//! Standard protocols every engine can hand out.
//!
//! Each one is created on first request and bound under its name; later requests return the
//! bound protocol. Their implementation-mode methods are mixed into conformers by
//! [`Engine::conform_to`].

use std::sync::Arc;

use covenant_runtime::{Block, Call, Fault, MethodDef, Runtime, Value};
use parking_lot::Mutex;

use crate::engine::Engine;
use crate::error::ProtocolError;
use crate::message::Arity;
use crate::protocol::{Protocol, ProtocolScope};

impl Engine {
	fn standard<F>(&self, name: &str, define: F) -> Result<Arc<Protocol>, ProtocolError>
	where
		F: FnOnce(&mut ProtocolScope<'_>) -> Result<(), ProtocolError>,
	{
		match self.find_protocol(name) {
			Some(existing) => Ok(existing),
			None => self.protocol(name, define),
		}
	}

	/// `<=>(other)` returning a negative, zero or positive integer; conformers get `<`, `<=`,
	/// `>` and `>=`.
	pub fn comparing(&self) -> Result<Arc<Protocol>, ProtocolError> {
		self.standard("Comparing", |p| {
			p.understand("<=>", Arity::Fixed(1), false)?
				.implementation()
				.def(comparison("<", |ord| ord < 0))?
				.def(comparison("<=", |ord| ord <= 0))?
				.def(comparison(">", |ord| ord > 0))?
				.def(comparison(">=", |ord| ord >= 0))?;
			Ok(())
		})
	}

	/// `each` with any arity; conformers get `map` and `to_list`.
	pub fn enumerating(&self) -> Result<Arc<Protocol>, ProtocolError> {
		self.standard("Enumerating", |p| {
			p.understand("each", Arity::Unconstrained, false)?
				.implementation()
				.def(MethodDef::new("map", map).block("block"))?
				.def(MethodDef::new("to_list", |call| {
					let items = collect_each(
						call,
						Arc::new(|_: &Runtime, args: &[Value]| -> Result<Value, Fault> {
							Ok(yielded(args))
						}),
					)?;
					Ok(Value::list(items))
				}))?;
			Ok(())
		})
	}

	/// `[](key)` and `[]=(key, value)`; conformers get `fetch(key, ?default)`.
	pub fn indexing(&self) -> Result<Arc<Protocol>, ProtocolError> {
		self.standard("Indexing", |p| {
			p.understand("[]", Arity::Fixed(1), false)?
				.understand("[]=", Arity::Fixed(2), false)?
				.implementation()
				.def(
					MethodDef::new("fetch", |call| {
						let found = call.send("[]", &[call.arg(0)])?;
						if !found.is_nil() {
							return Ok(found);
						}
						match call.args().get(1) {
							Some(default) => Ok(default.clone()),
							None => Err(Fault::raised(format!("key not found: {:?}", call.arg(0)))),
						}
					})
					.param("key")
					.optional("default"),
				)?;
			Ok(())
		})
	}

	/// `lock()` and `unlock()`; conformers get `synchronize(&block)`, which unlocks on every
	/// exit path.
	pub fn synchronizing(&self) -> Result<Arc<Protocol>, ProtocolError> {
		self.standard("Synchronizing", |p| {
			p.understand("lock", Arity::Fixed(0), false)?
				.understand("unlock", Arity::Fixed(0), false)?
				.implementation()
				.def(
					MethodDef::new("synchronize", |call| {
						call.send("lock", &[])?;
						let result = call.yield_block(&[]);
						call.send("unlock", &[])?;
						result
					})
					.block("block"),
				)?;
			Ok(())
		})
	}
}

fn comparison(name: &str, holds: fn(i64) -> bool) -> MethodDef {
	MethodDef::new(name, move |call| {
		let ord = call.send("<=>", &[call.arg(0)])?;
		let ord = ord.as_int().ok_or_else(|| {
			Fault::raised(format!(
				"comparison of {} with {:?} failed",
				call.receiver().type_name(),
				call.arg(0)
			))
		})?;
		Ok(Value::Bool(holds(ord)))
	})
	.param("other")
}

fn map(call: &mut Call<'_>) -> Result<Value, Fault> {
	let block = call.block().cloned().ok_or_else(|| Fault::NoBlock {
		name: call.name().to_string(),
	})?;
	let items = collect_each(call, block)?;
	Ok(Value::list(items))
}

/// Runs `each` on the receiver, collecting what `transform` returns for every yield.
fn collect_each(call: &Call<'_>, transform: Block) -> Result<Vec<Value>, Fault> {
	let collected = Arc::new(Mutex::new(Vec::new()));
	let sink = Arc::clone(&collected);
	let collector: Block = Arc::new(move |rt: &Runtime, args: &[Value]| -> Result<Value, Fault> {
		let value = transform(rt, args)?;
		sink.lock().push(value);
		Ok(Value::Nil)
	});
	call.runtime()
		.send_with_block(call.receiver(), "each", &[], Some(collector))?;
	let items = std::mem::take(&mut *collected.lock());
	Ok(items)
}

/// A single yielded value as itself, several as a list.
fn yielded(args: &[Value]) -> Value {
	match args {
		[single] => single.clone(),
		many => Value::list(many.iter().cloned()),
	}
}
