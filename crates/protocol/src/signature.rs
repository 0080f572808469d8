//! Signature text: a regenerable rendering of a protocol's effective messages.
//!
//! ```text
//! (protocol Stack
//!   (def pop ())
//!   (def push (x1))
//!   (understand size))
//! ```

use std::sync::Arc;

use covenant_runtime::ParamKind;

use crate::engine::Engine;
use crate::error::ProtocolError;
use crate::introspect::parse_param_list;
use crate::message::Arity;
use crate::protocol::Protocol;
use crate::sexpr::{self, Sexp};

/// One declaration read from signature text.
struct Decl {
	name: String,
	arity: Arity,
	block_expected: bool,
}

impl Protocol {
	/// Renders the effective messages as signature text.
	pub fn to_signature_text(&self) -> String {
		let mut out = format!("(protocol {}", self.name());
		for message in self.effective_messages() {
			out.push_str("\n  ");
			out.push_str(&message.to_signature_text());
		}
		out.push(')');
		out
	}

	/// Defines and binds a protocol from signature text.
	pub fn from_signature_text(engine: &Engine, text: &str) -> Result<Arc<Protocol>, ProtocolError> {
		let form = sexpr::read_all(text).map_err(|err| ProtocolError::Signature(err.to_string()))?;
		let items = form
			.as_list()
			.filter(|_| form.head() == Some("protocol"))
			.ok_or_else(|| invalid("expected (protocol Name ...)"))?;
		let name = items
			.get(1)
			.and_then(Sexp::as_symbol)
			.ok_or_else(|| invalid("protocol name must be a symbol"))?;
		let decls = items
			.iter()
			.skip(2)
			.map(read_decl)
			.collect::<Result<Vec<_>, _>>()?;

		engine.protocol(name, |p| {
			for decl in &decls {
				p.understand(&decl.name, decl.arity, decl.block_expected)?;
			}
			Ok(())
		})
	}
}

fn invalid(reason: &str) -> ProtocolError {
	ProtocolError::Signature(reason.to_string())
}

fn read_decl(form: &Sexp) -> Result<Decl, ProtocolError> {
	let items = form
		.as_list()
		.ok_or_else(|| invalid(&format!("expected a declaration, found {form}")))?;
	let name = items
		.get(1)
		.and_then(Sexp::as_symbol)
		.ok_or_else(|| invalid(&format!("declaration without a name: {form}")))?
		.to_string();
	match form.head() {
		Some("def") if items.len() == 3 => {
			let params = parse_param_list(&items[2])
				.ok_or_else(|| invalid(&format!("bad parameter list in {form}")))?;
			Ok(Decl {
				name,
				arity: Arity::from_params(&params),
				block_expected: params.iter().any(|p| p.kind == ParamKind::Block),
			})
		}
		Some("understand") if items.len() <= 3 => {
			let block_expected = match items.get(2) {
				None => false,
				Some(flag) if flag.as_symbol().is_some_and(|s| s.starts_with('&')) => true,
				Some(_) => return Err(invalid(&format!("unexpected flag in {form}"))),
			};
			Ok(Decl {
				name,
				arity: Arity::Unconstrained,
				block_expected,
			})
		}
		_ => Err(invalid(&format!("unknown declaration {form}"))),
	}
}
