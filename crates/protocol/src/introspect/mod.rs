//! Method signature introspection.
//!
//! # Purpose
//!
//! Turns a concrete method into the facts a conformance check needs: its parameter list, its
//! arity, whether it consumes a block without declaring one, and whether its body is
//! *complex* (calls at least one other named operation).
//!
//! # Mental Model
//!
//! - Parameters come from [`Reflection::parameter_metadata`]. A method without metadata is
//!   [`ProtocolError::NotSupported`]; nothing is guessed.
//! - Body facts come from the method's source when reflection can provide it: the
//!   `(def name (params...) body...)` form starting at the method's line is read and walked.
//!   Without usable source the method's declared [`BodyTraits`] are used. With neither, the body
//!   is unknown and treated as simple with no implicit block.
//! - An implicit block (`yield` in the body) without a declared block parameter adds a
//!   synthetic trailing `&block` parameter.
//!
//! # Invariants
//!
//! - Source analysis is cached per [`SourceLocation`] until [`Introspector::flush_cache`].
//!   - Enforced in: [`Introspector::body_traits`]
//!   - Tested by: `introspect::tests::test_cache_is_per_location_until_flush`
//!   - Failure symptom: edited sources keep reporting stale complexity after a reload.

use std::sync::Arc;

use covenant_runtime::{BodyTraits, Method, MethodSource, Param, ParamKind, Reflection, SourceLocation};
use parking_lot::Mutex;
use rustc_hash::FxHashMap as HashMap;

use crate::error::ProtocolError;
use crate::message::Arity;
use crate::sexpr::{self, Sexp};


/// Heads that are structure or primitive operators rather than calls.
const NON_CALL_HEADS: &[&str] = &[
	"if", "let", "set", "do", "begin", "return", "and", "or", "not", "when", "unless", "while",
	"fn", "quote", "==", "!=", "<", ">", "<=", ">=", "+", "-", "*", "/", "%",
];

/// What introspection learned about a method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
	/// Declared parameters, plus a synthetic `&block` when the body yields without one.
	pub params: Vec<Param>,
	pub arity: Arity,
	/// The body yields to a block it does not declare.
	pub uses_implicit_block: bool,
	/// The body calls at least one other named operation.
	pub is_complex: bool,
}

impl Signature {
	pub fn has_block_param(&self) -> bool {
		self.params.iter().any(|p| p.kind == ParamKind::Block)
	}

	pub fn accepts_block(&self) -> bool {
		self.uses_implicit_block || self.has_block_param()
	}
}

pub struct Introspector {
	cache_sources: bool,
	cache: Mutex<HashMap<SourceLocation, Option<BodyTraits>>>,
}

impl Default for Introspector {
	fn default() -> Self {
		Self::new(true)
	}
}

impl Introspector {
	pub fn new(cache_sources: bool) -> Self {
		Self {
			cache_sources,
			cache: Mutex::new(HashMap::default()),
		}
	}

	pub fn signature(
		&self,
		reflection: &dyn Reflection,
		method: &Method,
	) -> Result<Signature, ProtocolError> {
		let declared =
			reflection
				.parameter_metadata(method)
				.ok_or_else(|| ProtocolError::NotSupported {
					owner: method.owner().to_string(),
					method: method.name().to_string(),
				})?;
		let mut params = declared.to_vec();
		let arity = Arity::from_params(&params);
		let traits = self.body_traits(reflection, method).unwrap_or_default();

		let explicit_block = params.iter().any(|p| p.kind == ParamKind::Block);
		let uses_implicit_block = traits.contains(BodyTraits::YIELDS) && !explicit_block;
		if uses_implicit_block {
			params.push(Param::block("block"));
		}
		Ok(Signature {
			params,
			arity,
			uses_implicit_block,
			is_complex: traits.contains(BodyTraits::INVOKES),
		})
	}

	/// Body facts from source, else from declared traits. `None` means unknown.
	pub fn body_traits(&self, reflection: &dyn Reflection, method: &Method) -> Option<BodyTraits> {
		let from_source = reflection
			.source_of(method)
			.and_then(|source| self.analyze_cached(&source, method.name()));
		from_source.or_else(|| method.traits())
	}

	fn analyze_cached(&self, source: &MethodSource, name: &str) -> Option<BodyTraits> {
		if !self.cache_sources {
			return analyze(source, name);
		}
		if let Some(hit) = self.cache.lock().get(&source.location) {
			return *hit;
		}
		let traits = analyze(source, name);
		self.cache
			.lock()
			.insert(source.location.clone(), traits);
		traits
	}

	/// Drops every cached source analysis, returning how many were dropped.
	pub fn flush_cache(&self) -> usize {
		let mut cache = self.cache.lock();
		let flushed = cache.len();
		cache.clear();
		tracing::debug!(flushed, "introspection cache flushed");
		flushed
	}

	pub fn cached_sources(&self) -> usize {
		self.cache.lock().len()
	}
}

/// Reads the definition at `source.location` and summarizes its body.
fn analyze(source: &MethodSource, name: &str) -> Option<BodyTraits> {
	let Some(text) = source.from_definition() else {
		tracing::debug!(location = %source.location, "source location past end of file");
		return None;
	};
	let form = match sexpr::read_one(text) {
		Ok((form, _)) => form,
		Err(err) => {
			tracing::debug!(location = %source.location, %err, "unreadable method source");
			return None;
		}
	};
	let items = form.as_list().filter(|_| form.head() == Some("def"))?;
	match items.get(1).and_then(Sexp::as_symbol) {
		Some(defined) if defined == name => {}
		other => {
			tracing::debug!(
				location = %source.location,
				expected = name,
				found = ?other,
				"source does not define the method"
			);
			return None;
		}
	}
	let mut traits = BodyTraits::empty();
	for form in items.iter().skip(3) {
		walk(form, &mut traits);
	}
	Some(traits)
}

fn walk(form: &Sexp, traits: &mut BodyTraits) {
	let Some(items) = form.as_list() else {
		return;
	};
	let Some((head, rest)) = items.split_first() else {
		return;
	};
	let Some(head) = head.as_symbol() else {
		items.iter().for_each(|f| walk(f, traits));
		return;
	};
	match head {
		"quote" => {}
		"yield" => {
			traits.insert(BodyTraits::YIELDS);
			rest.iter().for_each(|f| walk(f, traits));
		}
		"let" => {
			// (let ((name expr)...) body...)
			if let Some(bindings) = rest.first().and_then(Sexp::as_list) {
				for binding in bindings {
					if let Some(expr) = binding.as_list().and_then(|b| b.get(1)) {
						walk(expr, traits);
					}
				}
			}
			rest.iter().skip(1).for_each(|f| walk(f, traits));
		}
		// (fn (params...) body...)
		"fn" => rest.iter().skip(1).for_each(|f| walk(f, traits)),
		head if NON_CALL_HEADS.contains(&head) => rest.iter().for_each(|f| walk(f, traits)),
		_ => {
			traits.insert(BodyTraits::INVOKES);
			rest.iter().for_each(|f| walk(f, traits));
		}
	}
}

/// Parameter list in the `(x1 ?opt *rest &block)` notation used by signature text.
pub(crate) fn parse_param_list(form: &Sexp) -> Option<Vec<Param>> {
	form.as_list()?
		.iter()
		.map(|p| {
			let token = p.as_symbol()?;
			let param = if let Some(name) = token.strip_prefix('&') {
				Param::block(non_empty(name, "block"))
			} else if let Some(name) = token.strip_prefix('*') {
				Param::rest(non_empty(name, "rest"))
			} else if let Some(name) = token.strip_prefix('?') {
				Param::optional(non_empty(name, "opt"))
			} else {
				Param::required(token)
			};
			Some(param)
		})
		.collect()
}

fn non_empty(name: &str, fallback: &str) -> Arc<str> {
	Arc::from(if name.is_empty() { fallback } else { name })
}
