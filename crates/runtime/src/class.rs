use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashMap as HashMap;

use crate::method::{Method, MethodDef};
use crate::object::ObjectRef;

static NEXT_CLASS_ID: AtomicU32 = AtomicU32::new(1);
static NEXT_MODULE_ID: AtomicU32 = AtomicU32::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(u32);

/// Name-keyed method table shared by classes, modules and singletons.
#[derive(Default)]
pub(crate) struct MethodTable {
	methods: RwLock<HashMap<Arc<str>, Arc<Method>>>,
}

impl MethodTable {
	pub(crate) fn define(&self, def: MethodDef, owner: Arc<str>) -> Arc<Method> {
		let method = Arc::new(def.into_method(owner));
		self.methods
			.write()
			.insert(Arc::from(method.name()), Arc::clone(&method));
		method
	}

	pub(crate) fn remove(&self, name: &str) -> Option<Arc<Method>> {
		self.methods.write().remove(name)
	}

	pub(crate) fn get(&self, name: &str) -> Option<Arc<Method>> {
		self.methods.read().get(name).cloned()
	}

	pub(crate) fn contains(&self, name: &str) -> bool {
		self.methods.read().contains_key(name)
	}

	/// Member names in sorted order.
	pub(crate) fn names(&self) -> Vec<Arc<str>> {
		let mut names: Vec<_> = self.methods.read().keys().cloned().collect();
		names.sort();
		names
	}
}

/// A named bag of methods, included into classes or extended onto objects.
pub struct Module {
	id: ModuleId,
	name: Arc<str>,
	methods: MethodTable,
}

impl Module {
	pub fn new(name: impl Into<Arc<str>>) -> Arc<Self> {
		Arc::new(Self {
			id: ModuleId(NEXT_MODULE_ID.fetch_add(1, Ordering::Relaxed)),
			name: name.into(),
			methods: MethodTable::default(),
		})
	}

	pub fn id(&self) -> ModuleId {
		self.id
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn define(&self, def: MethodDef) -> Arc<Method> {
		self.methods.define(def, Arc::clone(&self.name))
	}

	pub fn undefine(&self, name: &str) -> Option<Arc<Method>> {
		self.methods.remove(name)
	}

	pub fn method(&self, name: &str) -> Option<Arc<Method>> {
		self.methods.get(name)
	}

	pub fn method_names(&self) -> Vec<Arc<str>> {
		self.methods.names()
	}

	pub fn is_empty(&self) -> bool {
		self.methods.names().is_empty()
	}
}

impl fmt::Debug for Module {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Module({})", self.name)
	}
}

/// A class: own methods, included modules, optional superclass.
pub struct Class {
	id: ClassId,
	name: Arc<str>,
	superclass: Option<Arc<Class>>,
	methods: MethodTable,
	includes: RwLock<Vec<Arc<Module>>>,
}

impl Class {
	pub(crate) fn new(name: impl Into<Arc<str>>, superclass: Option<Arc<Class>>) -> Arc<Self> {
		Arc::new(Self {
			id: ClassId(NEXT_CLASS_ID.fetch_add(1, Ordering::Relaxed)),
			name: name.into(),
			superclass,
			methods: MethodTable::default(),
			includes: RwLock::new(Vec::new()),
		})
	}

	pub fn id(&self) -> ClassId {
		self.id
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn superclass(&self) -> Option<&Arc<Class>> {
		self.superclass.as_ref()
	}

	/// Adds or replaces an own method.
	pub fn define(&self, def: MethodDef) -> Arc<Method> {
		self.methods.define(def, Arc::clone(&self.name))
	}

	pub fn undefine(&self, name: &str) -> Option<Arc<Method>> {
		self.methods.remove(name)
	}

	/// Own method, ignoring ancestors.
	pub fn own_method(&self, name: &str) -> Option<Arc<Method>> {
		self.methods.get(name)
	}

	pub fn own_method_names(&self) -> Vec<Arc<str>> {
		self.methods.names()
	}

	/// Includes a module. Including the same module twice is a no-op.
	pub fn include(&self, module: &Arc<Module>) -> bool {
		let mut includes = self.includes.write();
		if includes.iter().any(|m| m.id() == module.id()) {
			return false;
		}
		includes.push(Arc::clone(module));
		true
	}

	pub fn includes_module(self: &Arc<Self>, id: ModuleId) -> bool {
		self.ancestor_classes()
			.iter()
			.any(|c| c.includes.read().iter().any(|m| m.id() == id))
	}

	/// Superclass chain starting with this class.
	pub fn ancestor_classes(self: &Arc<Self>) -> Vec<Arc<Class>> {
		let mut chain = vec![Arc::clone(self)];
		let mut cursor = self.superclass.clone();
		while let Some(class) = cursor {
			cursor = class.superclass.clone();
			chain.push(class);
		}
		chain
	}

	/// Method resolution order: each class followed by its modules, latest inclusion first.
	pub fn ancestors(self: &Arc<Self>) -> Vec<Owner> {
		let mut out = Vec::new();
		for class in self.ancestor_classes() {
			out.push(Owner::Class(Arc::clone(&class)));
			out.extend(
				class
					.includes
					.read()
					.iter()
					.rev()
					.map(|m| Owner::Module(Arc::clone(m))),
			);
		}
		out
	}

	/// Resolves a method along the ancestry, returning the defining owner.
	pub fn lookup(self: &Arc<Self>, name: &str) -> Option<(Owner, Arc<Method>)> {
		self.ancestors()
			.into_iter()
			.find_map(|owner| owner.method(name).map(|m| (owner, m)))
	}

	pub fn is_subclass_of(self: &Arc<Self>, other: &Class) -> bool {
		self.ancestor_classes().iter().any(|c| c.id == other.id)
	}
}

impl fmt::Debug for Class {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Class({})", self.name)
	}
}

impl fmt::Display for Class {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.name)
	}
}

/// Anything that owns a method table.
#[derive(Clone)]
pub enum Owner {
	Class(Arc<Class>),
	Module(Arc<Module>),
	/// The singleton table of one object.
	Singleton(ObjectRef),
}

impl Owner {
	pub fn name(&self) -> String {
		match self {
			Self::Class(c) => c.name().to_string(),
			Self::Module(m) => m.name().to_string(),
			Self::Singleton(obj) => format!("singleton({obj})"),
		}
	}

	pub fn method(&self, name: &str) -> Option<Arc<Method>> {
		match self {
			Self::Class(c) => c.methods.get(name),
			Self::Module(m) => m.methods.get(name),
			Self::Singleton(obj) => obj.singleton_methods().get(name),
		}
	}

	pub fn defines(&self, name: &str) -> bool {
		match self {
			Self::Class(c) => c.methods.contains(name),
			Self::Module(m) => m.methods.contains(name),
			Self::Singleton(obj) => obj.singleton_methods().contains(name),
		}
	}

	pub fn member_names(&self) -> Vec<Arc<str>> {
		match self {
			Self::Class(c) => c.methods.names(),
			Self::Module(m) => m.methods.names(),
			Self::Singleton(obj) => obj.singleton_methods().names(),
		}
	}
}

impl fmt::Debug for Owner {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.name())
	}
}
