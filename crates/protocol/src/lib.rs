//! Protocol conformance and design-by-contract for a dynamic object model.
//!
//! # Purpose
//!
//! A [`Protocol`] names a set of [`Message`]s (method name, arity, block expectation) that a
//! class or object must answer. Checking a candidate compares each message against the
//! candidate's real implementation through the runtime's reflection service. Protocols declared
//! with method bodies additionally keep those bodies as *contracts*: preconditions run before
//! every later call of the method, postconditions after it.
//!
//! # Mental Model
//!
//! ```text
//! Engine::protocol ─▶ ProtocolScope (understand / def / compose / inherit)
//!                          │
//!                          ▼
//!                      Protocol ── effective messages (cached, override-resolved)
//!                          │
//!     check / probe / conform_to
//!                          │
//!          ┌───────────────┼──────────────────┐
//!          ▼               ▼                  ▼
//!      existence        arity            block expectation
//!                                             │
//!                        contract body kept? ─┴─▶ ContractWrapper installed
//! ```
//!
//! # Key Types
//!
//! | Type | Role |
//! |------|------|
//! | [`Engine`] | Runtime handle, introspector, protocol namespace, conformance registry. |
//! | [`Protocol`] | Declared messages, composition, mode and failure policy. |
//! | [`Message`] / [`Arity`] | One required operation. |
//! | [`Introspector`] / [`Signature`] | Arity, block use and complexity of a method. |
//! | [`CheckError`] / [`CheckFailed`] | Failure records, one per message. |
//! | [`EngineConfig`] | Failure policies and introspection settings, loadable from TOML. |
//!
//! # Failure policies
//!
//! - `error` ([`FailurePolicy::Raise`]): nonconformance and contract violations are errors.
//! - `warn`: each record is logged at `WARN` through `tracing` and the call proceeds.
//! - `none`: records are dropped; checks simply answer `false`.

mod check;
mod config;
mod conformance;
mod contract;
mod descriptor;
mod engine;
mod error;
mod introspect;
#[cfg(any(test, doc))]
pub(crate) mod invariants;
mod message;
mod protocol;
mod sexpr;
mod signature;
mod std_protocols;

pub use config::{ConfigError, EngineConfig, FailurePolicy, IntrospectionConfig, ProtocolConfig};
pub use contract::{active_contracts, contract_depth};
pub use covenant_runtime;
pub use descriptor::Descriptor;
pub use engine::Engine;
pub use error::{CheckError, CheckFailed, FailureKind, ProtocolError};
pub use introspect::{Introspector, Signature};
pub use message::{Arity, Message};
pub use protocol::{Mode, Protocol, ProtocolScope};
pub use sexpr::{ParseError, Sexp};
