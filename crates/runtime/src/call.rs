use std::sync::Arc;

use crate::fault::Fault;
use crate::object::ObjectRef;
use crate::runtime::Runtime;
use crate::value::Value;

/// A block (callback) passed alongside positional arguments.
pub type Block = Arc<dyn Fn(&Runtime, &[Value]) -> Result<Value, Fault> + Send + Sync>;

/// Deferred check run after the real implementation returned.
pub type Postcondition = Box<dyn FnOnce(&Outcome<'_>) -> Result<bool, Fault>>;

/// Receiver of the conditions declared by a body that runs as a contract.
///
/// Implemented by the protocol engine; a body executed outside a contract has no sink.
pub trait ContractSink {
	/// Records the verdict of an already evaluated precondition.
	///
	/// Returning an error aborts the contract body and the call.
	fn precondition(&mut self, holds: bool) -> Result<(), Fault>;

	/// Parks a postcondition until the real implementation has produced its result.
	fn postcondition(&mut self, check: Postcondition);
}

/// Frame handed to a method body.
pub struct Call<'a> {
	runtime: &'a Runtime,
	receiver: &'a Value,
	name: &'a str,
	args: &'a [Value],
	block: Option<&'a Block>,
	sink: Option<&'a mut dyn ContractSink>,
}

impl<'a> Call<'a> {
	pub fn new(
		runtime: &'a Runtime,
		receiver: &'a Value,
		name: &'a str,
		args: &'a [Value],
		block: Option<&'a Block>,
	) -> Self {
		Self {
			runtime,
			receiver,
			name,
			args,
			block,
			sink: None,
		}
	}

	/// Attaches a contract sink; `precondition`/`postcondition` forward to it.
	pub fn with_sink(mut self, sink: &'a mut dyn ContractSink) -> Self {
		self.sink = Some(sink);
		self
	}

	pub fn runtime(&self) -> &'a Runtime {
		self.runtime
	}

	pub fn receiver(&self) -> &'a Value {
		self.receiver
	}

	/// The receiver as an object, or a fault naming the method.
	pub fn this(&self) -> Result<&'a ObjectRef, Fault> {
		self.receiver.as_object().ok_or_else(|| {
			Fault::raised(format!(
				"'{}' called on a non-object receiver {:?}",
				self.name, self.receiver
			))
		})
	}

	pub fn name(&self) -> &'a str {
		self.name
	}

	pub fn args(&self) -> &'a [Value] {
		self.args
	}

	/// Positional argument `idx`, nil when absent.
	pub fn arg(&self, idx: usize) -> Value {
		self.args.get(idx).cloned().unwrap_or_default()
	}

	pub fn block(&self) -> Option<&'a Block> {
		self.block
	}

	pub fn has_block(&self) -> bool {
		self.block.is_some()
	}

	/// Invokes the block passed to this call.
	pub fn yield_block(&self, args: &[Value]) -> Result<Value, Fault> {
		let block = self.block.ok_or_else(|| Fault::NoBlock {
			name: self.name.to_string(),
		})?;
		block(self.runtime, args)
	}

	/// Sends a message to the receiver of this call.
	pub fn send(&self, name: &str, args: &[Value]) -> Result<Value, Fault> {
		self.runtime.send(self.receiver, name, args)
	}

	/// Sends a message to the receiver, forwarding this call's block.
	pub fn send_forwarding_block(&self, name: &str, args: &[Value]) -> Result<Value, Fault> {
		self.runtime
			.send_with_block(self.receiver, name, args, self.block.cloned())
	}

	pub fn ivar(&self, name: &str) -> Result<Value, Fault> {
		Ok(self.this()?.ivar(name))
	}

	pub fn set_ivar(&self, name: &str, value: Value) -> Result<(), Fault> {
		self.this()?.set_ivar(name, value);
		Ok(())
	}

	pub fn in_contract(&self) -> bool {
		self.sink.is_some()
	}

	/// Evaluates a precondition immediately and reports it to the contract sink.
	pub fn precondition<F>(&mut self, pred: F) -> Result<(), Fault>
	where
		F: FnOnce(&Call<'a>) -> Result<bool, Fault>,
	{
		let holds = pred(&*self)?;
		match self.sink.as_deref_mut() {
			Some(sink) => sink.precondition(holds),
			None => Err(Fault::raised(format!(
				"precondition declared outside of a contract in '{}'",
				self.name
			))),
		}
	}

	/// Registers a postcondition evaluated once the real implementation returned.
	pub fn postcondition<F>(&mut self, check: F) -> Result<(), Fault>
	where
		F: FnOnce(&Outcome<'_>) -> Result<bool, Fault> + 'static,
	{
		match self.sink.as_deref_mut() {
			Some(sink) => {
				sink.postcondition(Box::new(check));
				Ok(())
			}
			None => Err(Fault::raised(format!(
				"postcondition declared outside of a contract in '{}'",
				self.name
			))),
		}
	}
}

/// What a postcondition sees after the real implementation returned.
pub struct Outcome<'a> {
	runtime: &'a Runtime,
	receiver: &'a Value,
	args: &'a [Value],
	result: &'a Value,
}

impl<'a> Outcome<'a> {
	pub fn new(
		runtime: &'a Runtime,
		receiver: &'a Value,
		args: &'a [Value],
		result: &'a Value,
	) -> Self {
		Self {
			runtime,
			receiver,
			args,
			result,
		}
	}

	/// Result of the wrapped call.
	///
	/// Distinct from any `result` method the receiver itself defines; reach that one through
	/// [`Outcome::send`].
	pub fn result(&self) -> &'a Value {
		self.result
	}

	/// The receiver of the wrapped call.
	pub fn myself(&self) -> &'a Value {
		self.receiver
	}

	pub fn args(&self) -> &'a [Value] {
		self.args
	}

	pub fn arg(&self, idx: usize) -> Value {
		self.args.get(idx).cloned().unwrap_or_default()
	}

	pub fn runtime(&self) -> &'a Runtime {
		self.runtime
	}

	/// Sends a message to the receiver of the wrapped call.
	pub fn send(&self, name: &str, args: &[Value]) -> Result<Value, Fault> {
		self.runtime.send(self.receiver, name, args)
	}
}
