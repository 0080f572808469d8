//! Call interception table.
//!
//! # Role
//!
//! Layers above the runtime (the protocol engine's contract wrappers) interpose on calls by
//! registering an [`Interceptor`] for a `(target, method name)` pair. The method tables
//! themselves are never rewritten: the real implementation stays where it was defined and the
//! interceptor receives a `proceed` callback that runs it.
//!
//! # Invariants
//!
//! - At most one interceptor per `(target, name)`; [`InterceptTable::install_once`] is
//!   idempotent and serialized, so concurrent installers cannot double-wrap.
//! - Readers never block: lookups load an immutable snapshot.
//! - Dispatch skips an interceptor that declines the resolved implementation
//!   ([`Interceptor::applies_to`]), so overrides below a wrapped class run unwrapped.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use rustc_hash::FxHashMap as HashMap;

use crate::call::Block;
use crate::class::ClassId;
use crate::fault::Fault;
use crate::method::Method;
use crate::object::ObjectId;
use crate::runtime::Runtime;
use crate::value::Value;

/// Where an interceptor applies: every instance of a class (and its subclasses), or one
/// object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Target {
	Class(ClassId),
	Object(ObjectId),
}

/// The intercepted call.
pub struct CallSite<'a> {
	pub receiver: &'a Value,
	pub name: &'a str,
	pub args: &'a [Value],
	pub block: Option<&'a Block>,
}

pub trait Interceptor: Send + Sync {
	/// Runs around the real implementation. `proceed` invokes it at most once per call.
	fn intercept(
		&self,
		runtime: &Runtime,
		site: &CallSite<'_>,
		proceed: &mut dyn FnMut() -> Result<Value, Fault>,
	) -> Result<Value, Fault>;

	/// Whether this interceptor wraps `method`, the implementation the call resolved to.
	///
	/// A target whose interceptor declines is treated as unwrapped for that call.
	fn applies_to(&self, _method: &Arc<Method>) -> bool {
		true
	}
}

type Table = HashMap<Target, HashMap<Arc<str>, Arc<dyn Interceptor>>>;

#[derive(Default)]
pub struct InterceptTable {
	snap: ArcSwap<Table>,
	write: Mutex<()>,
}

impl InterceptTable {
	pub fn new() -> Self {
		Self::default()
	}

	#[inline]
	pub fn get(&self, target: Target, name: &str) -> Option<Arc<dyn Interceptor>> {
		self.snap.load().get(&target)?.get(name).cloned()
	}

	/// Installs the interceptor built by `make` unless one is already present.
	///
	/// Returns true when this call installed it.
	pub fn install_once<F>(&self, target: Target, name: &str, make: F) -> bool
	where
		F: FnOnce() -> Arc<dyn Interceptor>,
	{
		let _guard = self.write.lock();
		let current = self.snap.load_full();
		if current
			.get(&target)
			.is_some_and(|by_name| by_name.contains_key(name))
		{
			return false;
		}
		let mut next = Table::clone(&current);
		next.entry(target)
			.or_default()
			.insert(Arc::from(name), make());
		self.snap.store(Arc::new(next));
		tracing::debug!(?target, method = name, "interceptor installed");
		true
	}

	/// Removes every interceptor registered for `target`.
	pub fn clear_target(&self, target: Target) -> usize {
		let _guard = self.write.lock();
		let current = self.snap.load_full();
		let Some(by_name) = current.get(&target) else {
			return 0;
		};
		let removed = by_name.len();
		let mut next = Table::clone(&current);
		next.remove(&target);
		self.snap.store(Arc::new(next));
		removed
	}

	pub fn len(&self) -> usize {
		self.snap.load().values().map(HashMap::len).sum()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl fmt::Debug for InterceptTable {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let snap = self.snap.load();
		let mut keys: Vec<_> = snap
			.iter()
			.flat_map(|(target, by_name)| by_name.keys().map(move |name| (*target, name.clone())))
			.collect();
		keys.sort();
		f.debug_struct("InterceptTable")
			.field("installed", &keys)
			.finish()
	}
}
