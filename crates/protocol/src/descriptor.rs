use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap as HashMap;

use crate::error::ProtocolError;
use crate::message::Message;

/// The messages one protocol declares itself, unique by name.
#[derive(Clone)]
pub struct Descriptor {
	protocol: Arc<str>,
	messages: HashMap<Arc<str>, Message>,
}

impl Descriptor {
	pub fn new(protocol: impl Into<Arc<str>>) -> Self {
		Self {
			protocol: protocol.into(),
			messages: HashMap::default(),
		}
	}

	/// Adds a message; a second message with the same name is an authoring error.
	pub fn add_message(&mut self, message: Message) -> Result<(), ProtocolError> {
		if self.messages.contains_key(message.name()) {
			return Err(ProtocolError::DuplicateMessage {
				protocol: self.protocol.to_string(),
				name: message.name().to_string(),
			});
		}
		self.messages.insert(Arc::clone(message.name_arc()), message);
		Ok(())
	}

	/// Owned messages sorted by name.
	pub fn messages(&self) -> Vec<Message> {
		let mut out: Vec<_> = self.messages.values().cloned().collect();
		out.sort();
		out
	}

	pub fn get(&self, name: &str) -> Option<&Message> {
		self.messages.get(name)
	}

	pub fn contains(&self, name: &str) -> bool {
		self.messages.contains_key(name)
	}

	pub fn len(&self) -> usize {
		self.messages.len()
	}

	pub fn is_empty(&self) -> bool {
		self.messages.is_empty()
	}
}

impl fmt::Debug for Descriptor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#<Descriptor({})>", self.protocol)
	}
}

impl fmt::Display for Descriptor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let parts: Vec<String> = self.messages().iter().map(Message::to_string).collect();
		f.write_str(&parts.join(", "))
	}
}
