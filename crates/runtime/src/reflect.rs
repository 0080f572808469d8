use std::fmt;
use std::sync::Arc;

use crate::class::{Class, ClassId, Owner};
use crate::intercept::Target;
use crate::method::{Method, Param};
use crate::object::{ObjectId, ObjectRef};
use crate::source::MethodSource;
use crate::value::Value;

/// A reflection subject: a whole class, or one object.
#[derive(Clone)]
pub enum Subject {
	Class(Arc<Class>),
	Object(ObjectRef),
}

/// Identity of a [`Subject`], usable as a map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubjectKey {
	Class(ClassId),
	Object(ObjectId),
}

impl Subject {
	/// Wraps a value; only objects and classes can be subjects.
	pub fn from_value(value: &Value) -> Option<Self> {
		match value {
			Value::Object(obj) => Some(Self::Object(Arc::clone(obj))),
			Value::Class(class) => Some(Self::Class(Arc::clone(class))),
			_ => None,
		}
	}

	pub fn key(&self) -> SubjectKey {
		match self {
			Self::Class(c) => SubjectKey::Class(c.id()),
			Self::Object(o) => SubjectKey::Object(o.id()),
		}
	}

	/// Interception target matching this subject.
	pub fn target(&self) -> Target {
		match self {
			Self::Class(c) => Target::Class(c.id()),
			Self::Object(o) => Target::Object(o.id()),
		}
	}

	/// The class itself, or the object's class.
	pub fn class(&self) -> &Arc<Class> {
		match self {
			Self::Class(c) => c,
			Self::Object(o) => o.class(),
		}
	}

	pub fn ancestors(&self) -> Vec<Owner> {
		match self {
			Self::Class(c) => c.ancestors(),
			Self::Object(o) => o.ancestors(),
		}
	}

	pub fn lookup(&self, name: &str) -> Option<(Owner, Arc<Method>)> {
		match self {
			Self::Class(c) => c.lookup(name),
			Self::Object(o) => o.lookup(name),
		}
	}
}

impl From<Arc<Class>> for Subject {
	fn from(class: Arc<Class>) -> Self {
		Self::Class(class)
	}
}

impl From<&Arc<Class>> for Subject {
	fn from(class: &Arc<Class>) -> Self {
		Self::Class(Arc::clone(class))
	}
}

impl From<ObjectRef> for Subject {
	fn from(obj: ObjectRef) -> Self {
		Self::Object(obj)
	}
}

impl From<&ObjectRef> for Subject {
	fn from(obj: &ObjectRef) -> Self {
		Self::Object(Arc::clone(obj))
	}
}

impl fmt::Display for Subject {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Class(c) => f.write_str(c.name()),
			Self::Object(o) => write!(f, "{o}"),
		}
	}
}

impl fmt::Debug for Subject {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(self, f)
	}
}

/// The reflection service consulted by conformance checks and signature introspection.
pub trait Reflection: Send + Sync {
	/// Names of the methods an owner defines itself, sorted.
	fn own_members(&self, owner: &Owner) -> Vec<Arc<str>>;

	/// The first owner along the subject's ancestry that defines `name`.
	fn resolve_defining_owner(&self, subject: &Subject, name: &str) -> Option<Owner>;

	/// The method `name` as the subject would dispatch it.
	fn find_method(&self, subject: &Subject, name: &str) -> Option<Arc<Method>>;

	/// Declared parameters, or `None` when the method cannot be reflected on.
	fn parameter_metadata(&self, method: &Method) -> Option<Arc<[Param]>>;

	/// Source of the method's definition, when it has one.
	fn source_of(&self, method: &Method) -> Option<MethodSource>;

	/// Every member name the subject responds to, sorted and deduplicated.
	fn all_members(&self, subject: &Subject) -> Vec<Arc<str>> {
		let mut names: Vec<_> = subject
			.ancestors()
			.iter()
			.flat_map(|owner| self.own_members(owner))
			.collect();
		names.sort();
		names.dedup();
		names
	}
}
