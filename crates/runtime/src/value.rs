use std::fmt;
use std::sync::Arc;

use crate::class::Class;
use crate::object::ObjectRef;

/// A dynamically typed runtime value.
///
/// Objects and classes compare by identity, everything else by content.
#[derive(Clone, Default)]
pub enum Value {
	#[default]
	Nil,
	Bool(bool),
	Int(i64),
	Str(Arc<str>),
	List(Arc<[Value]>),
	Object(ObjectRef),
	Class(Arc<Class>),
}

impl Value {
	/// Builds a list value from any iterator of values.
	pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
		Self::List(items.into_iter().collect())
	}

	/// Returns false only for `nil` and `false`.
	pub fn truthy(&self) -> bool {
		!matches!(self, Self::Nil | Self::Bool(false))
	}

	pub fn is_nil(&self) -> bool {
		matches!(self, Self::Nil)
	}

	pub fn as_int(&self) -> Option<i64> {
		match self {
			Self::Int(i) => Some(*i),
			_ => None,
		}
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Self::Bool(b) => Some(*b),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::Str(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_list(&self) -> Option<&[Value]> {
		match self {
			Self::List(items) => Some(items),
			_ => None,
		}
	}

	pub fn as_object(&self) -> Option<&ObjectRef> {
		match self {
			Self::Object(obj) => Some(obj),
			_ => None,
		}
	}

	/// Name of the value's type, used in diagnostics.
	pub fn type_name(&self) -> &str {
		match self {
			Self::Nil => "NilClass",
			Self::Bool(_) => "Boolean",
			Self::Int(_) => "Integer",
			Self::Str(_) => "String",
			Self::List(_) => "List",
			Self::Object(obj) => obj.class().name(),
			Self::Class(_) => "Class",
		}
	}
}

impl PartialEq for Value {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Self::Nil, Self::Nil) => true,
			(Self::Bool(a), Self::Bool(b)) => a == b,
			(Self::Int(a), Self::Int(b)) => a == b,
			(Self::Str(a), Self::Str(b)) => a == b,
			(Self::List(a), Self::List(b)) => a == b,
			(Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
			(Self::Class(a), Self::Class(b)) => a.id() == b.id(),
			_ => false,
		}
	}
}

impl fmt::Debug for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Nil => f.write_str("nil"),
			Self::Bool(b) => write!(f, "{b}"),
			Self::Int(i) => write!(f, "{i}"),
			Self::Str(s) => write!(f, "{s:?}"),
			Self::List(items) => f.debug_list().entries(items.iter()).finish(),
			Self::Object(obj) => write!(f, "{obj}"),
			Self::Class(class) => f.write_str(class.name()),
		}
	}
}

impl fmt::Display for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Nil => Ok(()),
			Self::Str(s) => f.write_str(s),
			other => fmt::Debug::fmt(other, f),
		}
	}
}

impl From<bool> for Value {
	fn from(b: bool) -> Self {
		Self::Bool(b)
	}
}

impl From<i64> for Value {
	fn from(i: i64) -> Self {
		Self::Int(i)
	}
}

impl From<&str> for Value {
	fn from(s: &str) -> Self {
		Self::Str(Arc::from(s))
	}
}

impl From<String> for Value {
	fn from(s: String) -> Self {
		Self::Str(Arc::from(s))
	}
}

impl From<ObjectRef> for Value {
	fn from(obj: ObjectRef) -> Self {
		Self::Object(obj)
	}
}

impl From<Arc<Class>> for Value {
	fn from(class: Arc<Class>) -> Self {
		Self::Class(class)
	}
}

impl From<Vec<Value>> for Value {
	fn from(items: Vec<Value>) -> Self {
		Self::List(items.into())
	}
}
