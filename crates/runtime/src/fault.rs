use std::error::Error;
use std::sync::Arc;

/// Failure raised while dispatching or running a method.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Fault {
	/// The receiver has no method with this name anywhere in its ancestry.
	#[error("undefined method '{name}' for {receiver}")]
	NoMethod { name: String, receiver: String },

	/// Argument count rejected by the method's parameter metadata.
	#[error("wrong number of arguments for '{name}' (given {given}, expected {expected})")]
	WrongArity {
		name: String,
		given: usize,
		expected: String,
	},

	/// The body yielded but the caller passed no block.
	#[error("no block given (yield) in '{name}'")]
	NoBlock { name: String },

	/// Error raised by a method body.
	#[error("{0}")]
	Raised(String),

	/// Error owned by a layer above the runtime, carried through dispatch unchanged.
	#[error(transparent)]
	Foreign(Arc<dyn Error + Send + Sync>),
}

impl Fault {
	pub fn raised(message: impl Into<String>) -> Self {
		Self::Raised(message.into())
	}

	pub fn foreign<E>(err: E) -> Self
	where
		E: Error + Send + Sync + 'static,
	{
		Self::Foreign(Arc::new(err))
	}

	/// Recovers a foreign error of a concrete type.
	pub fn downcast_ref<E>(&self) -> Option<&E>
	where
		E: Error + 'static,
	{
		match self {
			Self::Foreign(err) => err.as_ref().downcast_ref::<E>(),
			_ => None,
		}
	}
}
