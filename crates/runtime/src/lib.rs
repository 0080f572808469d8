//! Dynamic object model that covenant protocols are checked against.
//!
//! # Purpose
//!
//! Protocol conformance is a runtime property of dynamically defined code. This crate provides
//! the host side of that arrangement: classes and modules with mutable method tables, objects
//! with singleton methods, a message dispatcher, and the [`Reflection`] service the protocol
//! engine queries for parameter metadata and method source.
//!
//! # Mental Model
//!
//! 1. **Definition:** [`Runtime::define_class`] creates a [`Class`]; [`MethodDef`]s are added
//!    with [`Class::define`]. Modules ([`Module`]) hold shared behaviour and are included into
//!    classes or extended onto single objects.
//! 2. **Dispatch:** [`Runtime::send`] resolves a method along the receiver's ancestry, checks
//!    the argument count against the method's parameter metadata, and invokes the body with a
//!    [`Call`] frame.
//! 3. **Interception:** an [`Interceptor`] registered in the [`InterceptTable`] for the
//!    receiver's class (or the receiver itself) runs around the real body. The protocol engine
//!    installs its contract wrappers here instead of rewriting method tables.
//! 4. **Reflection:** [`Reflection`] exposes members, defining owners, parameter metadata and
//!    source text. [`Runtime`] implements it.
//!
//! # Key Types
//!
//! | Type | Role |
//! |------|------|
//! | [`Runtime`] | Class namespace, source map, interception table, dispatcher. |
//! | [`Class`] / [`Module`] / [`Object`] | Method owners. |
//! | [`Method`] | A resolved method with optional parameter metadata and source location. |
//! | [`Call`] / [`Outcome`] | Frames seen by method bodies and postconditions. |
//! | [`Subject`] | A class or an object, the unit of reflection and conformance. |
//!
//! # Concurrency
//!
//! - Method tables and instance variables sit behind `parking_lot` locks that are never held
//!   while a body runs.
//! - Interceptor reads are wait-free (atomic snapshot load); installation is serialized.

mod call;
mod class;
mod fault;
mod intercept;
mod method;
mod object;
mod reflect;
mod runtime;
mod source;
mod value;

pub use call::{Block, Call, ContractSink, Outcome, Postcondition};
pub use class::{Class, ClassId, Module, ModuleId, Owner};
pub use fault::Fault;
pub use intercept::{CallSite, InterceptTable, Interceptor, Target};
pub use method::{BodyTraits, Method, MethodBody, MethodDef, Param, ParamKind};
pub use object::{Object, ObjectId, ObjectRef};
pub use reflect::{Reflection, Subject, SubjectKey};
pub use runtime::Runtime;
pub use source::{MethodSource, SourceLocation, SourceMap};
pub use value::Value;
