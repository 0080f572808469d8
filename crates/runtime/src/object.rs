use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap as HashMap;

use crate::class::{Class, MethodTable, Module, ModuleId, Owner};
use crate::method::{Method, MethodDef};
use crate::value::Value;

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl fmt::Display for ObjectId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:#x}", self.0)
	}
}

pub type ObjectRef = Arc<Object>;

/// An instance of a class.
///
/// Instance variables are guarded by a mutex that is only held for the duration of a single
/// read or write, never across a method call.
pub struct Object {
	id: ObjectId,
	class: Arc<Class>,
	ivars: Mutex<HashMap<Arc<str>, Value>>,
	singleton: MethodTable,
	extends: RwLock<Vec<Arc<Module>>>,
}

impl Object {
	pub(crate) fn new(class: Arc<Class>) -> ObjectRef {
		Arc::new(Self {
			id: ObjectId(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed)),
			class,
			ivars: Mutex::new(HashMap::default()),
			singleton: MethodTable::default(),
			extends: RwLock::new(Vec::new()),
		})
	}

	pub fn id(&self) -> ObjectId {
		self.id
	}

	pub fn class(&self) -> &Arc<Class> {
		&self.class
	}

	/// Reads an instance variable; unset variables read as nil.
	pub fn ivar(&self, name: &str) -> Value {
		self.ivars.lock().get(name).cloned().unwrap_or_default()
	}

	pub fn set_ivar(&self, name: impl Into<Arc<str>>, value: Value) {
		self.ivars.lock().insert(name.into(), value);
	}

	/// Read-modify-write of an instance variable under one lock acquisition.
	pub fn update_ivar<R>(&self, name: &str, f: impl FnOnce(&mut Value) -> R) -> R {
		let mut ivars = self.ivars.lock();
		let slot = ivars.entry(Arc::from(name)).or_default();
		f(slot)
	}

	/// Defines a method on this object only.
	pub fn define_singleton(&self, def: MethodDef) -> Arc<Method> {
		self.singleton.define(def, Arc::from(format!("singleton({self})")))
	}

	pub(crate) fn singleton_methods(&self) -> &MethodTable {
		&self.singleton
	}

	pub fn singleton_method_names(&self) -> Vec<Arc<str>> {
		self.singleton.names()
	}

	/// Extends this object with a module. Extending twice is a no-op.
	pub fn extend(&self, module: &Arc<Module>) -> bool {
		let mut extends = self.extends.write();
		if extends.iter().any(|m| m.id() == module.id()) {
			return false;
		}
		extends.push(Arc::clone(module));
		true
	}

	pub fn is_extended_with(&self, id: ModuleId) -> bool {
		self.extends.read().iter().any(|m| m.id() == id)
	}

	/// Method resolution order: singleton table, extended modules (latest first), class
	/// ancestry.
	pub fn ancestors(self: &Arc<Self>) -> Vec<Owner> {
		let mut out = vec![Owner::Singleton(Arc::clone(self))];
		out.extend(
			self.extends
				.read()
				.iter()
				.rev()
				.map(|m| Owner::Module(Arc::clone(m))),
		);
		out.extend(self.class.ancestors());
		out
	}

	pub fn lookup(self: &Arc<Self>, name: &str) -> Option<(Owner, Arc<Method>)> {
		self.ancestors()
			.into_iter()
			.find_map(|owner| owner.method(name).map(|m| (owner, m)))
	}

	pub fn responds_to(self: &Arc<Self>, name: &str) -> bool {
		self.lookup(name).is_some()
	}
}

impl fmt::Display for Object {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#<{}:{}>", self.class.name(), self.id)
	}
}

impl fmt::Debug for Object {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(self, f)
	}
}
