use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap as HashMap;

use crate::call::{Block, Call};
use crate::class::{Class, Module, Owner};
use crate::fault::Fault;
use crate::intercept::{CallSite, InterceptTable, Interceptor, Target};
use crate::method::{Method, Param};
use crate::object::{Object, ObjectRef};
use crate::reflect::{Reflection, Subject};
use crate::source::{MethodSource, SourceMap};
use crate::value::Value;

/// Name of the root class every class defined without an explicit superclass inherits from.
pub const ROOT_CLASS: &str = "Object";

/// Class namespace, source map, interception table and dispatcher.
pub struct Runtime {
	classes: RwLock<HashMap<Arc<str>, Arc<Class>>>,
	root: Arc<Class>,
	sources: SourceMap,
	intercepts: InterceptTable,
}

impl Default for Runtime {
	fn default() -> Self {
		Self::new()
	}
}

impl Runtime {
	pub fn new() -> Self {
		let root = Class::new(ROOT_CLASS, None);
		let mut classes = HashMap::default();
		classes.insert(Arc::from(ROOT_CLASS), Arc::clone(&root));
		Self {
			classes: RwLock::new(classes),
			root,
			sources: SourceMap::new(),
			intercepts: InterceptTable::new(),
		}
	}

	/// The root class.
	pub fn object_class(&self) -> &Arc<Class> {
		&self.root
	}

	/// Defines a class under the root class. Redefining a name replaces the binding.
	pub fn define_class(&self, name: &str) -> Arc<Class> {
		self.define_subclass(name, &self.root)
	}

	pub fn define_subclass(&self, name: &str, superclass: &Arc<Class>) -> Arc<Class> {
		let class = Class::new(name, Some(Arc::clone(superclass)));
		if self
			.classes
			.write()
			.insert(Arc::from(name), Arc::clone(&class))
			.is_some()
		{
			tracing::debug!(class = name, "class binding replaced");
		}
		class
	}

	/// Defines a class that is not bound in the namespace.
	pub fn anonymous_class(&self) -> Arc<Class> {
		Class::new("#<Class>", Some(Arc::clone(&self.root)))
	}

	pub fn class(&self, name: &str) -> Option<Arc<Class>> {
		self.classes.read().get(name).cloned()
	}

	pub fn new_module(&self, name: impl Into<Arc<str>>) -> Arc<Module> {
		Module::new(name)
	}

	pub fn instantiate(&self, class: &Arc<Class>) -> ObjectRef {
		Object::new(Arc::clone(class))
	}

	pub fn sources(&self) -> &SourceMap {
		&self.sources
	}

	/// Shorthand for [`SourceMap::load`].
	pub fn load_source(&self, file: impl Into<Arc<str>>, text: impl Into<Arc<str>>) -> bool {
		self.sources.load(file, text)
	}

	pub fn intercepts(&self) -> &InterceptTable {
		&self.intercepts
	}

	/// Sends `name` to `receiver` without a block.
	pub fn send(&self, receiver: &Value, name: &str, args: &[Value]) -> Result<Value, Fault> {
		self.send_with_block(receiver, name, args, None)
	}

	/// Resolves and invokes `name` on `receiver`, running any installed interceptor around it.
	pub fn send_with_block(
		&self,
		receiver: &Value,
		name: &str,
		args: &[Value],
		block: Option<Block>,
	) -> Result<Value, Fault> {
		let no_method = || Fault::NoMethod {
			name: name.to_string(),
			receiver: format!("{receiver:?}"),
		};
		let obj = receiver.as_object().ok_or_else(no_method)?;
		let (_, method) = obj.lookup(name).ok_or_else(no_method)?;
		if !method.accepts(args.len()) {
			return Err(Fault::WrongArity {
				name: name.to_string(),
				given: args.len(),
				expected: method.expected_args(),
			});
		}

		let block = block.as_ref();
		let mut proceed = || {
			let mut call = Call::new(self, receiver, name, args, block);
			method.invoke(&mut call)
		};
		match self.interceptor_for(obj, name, &method) {
			Some(interceptor) => {
				let site = CallSite {
					receiver,
					name,
					args,
					block,
				};
				interceptor.intercept(self, &site, &mut proceed)
			}
			None => proceed(),
		}
	}

	/// Object-level interceptor first, then the class chain from most derived upward.
	///
	/// Only interceptors that wrap `method` (the resolved implementation) are considered, so an
	/// override below a wrapped class runs unwrapped.
	pub fn interceptor_for(
		&self,
		obj: &ObjectRef,
		name: &str,
		method: &Arc<Method>,
	) -> Option<Arc<dyn Interceptor>> {
		if self.intercepts.is_empty() {
			return None;
		}
		let applies = |target| {
			self.intercepts
				.get(target, name)
				.filter(|interceptor| interceptor.applies_to(method))
		};
		applies(Target::Object(obj.id())).or_else(|| {
			obj.class()
				.ancestor_classes()
				.iter()
				.find_map(|class| applies(Target::Class(class.id())))
		})
	}

	pub fn responds_to(&self, receiver: &Value, name: &str) -> bool {
		receiver
			.as_object()
			.is_some_and(|obj| obj.responds_to(name))
	}
}

impl Reflection for Runtime {
	fn own_members(&self, owner: &Owner) -> Vec<Arc<str>> {
		owner.member_names()
	}

	fn resolve_defining_owner(&self, subject: &Subject, name: &str) -> Option<Owner> {
		subject
			.ancestors()
			.into_iter()
			.find(|owner| owner.defines(name))
	}

	fn find_method(&self, subject: &Subject, name: &str) -> Option<Arc<Method>> {
		subject.lookup(name).map(|(_, method)| method)
	}

	fn parameter_metadata(&self, method: &Method) -> Option<Arc<[Param]>> {
		method.params().cloned()
	}

	fn source_of(&self, method: &Method) -> Option<MethodSource> {
		self.sources.method_source(method.location()?)
	}
}
