use std::path::Path;
use std::sync::Arc;

use covenant_runtime::{Reflection, Runtime};
use parking_lot::RwLock;
use rustc_hash::FxHashMap as HashMap;

use crate::config::EngineConfig;
use crate::conformance::ConformanceRegistry;
use crate::error::ProtocolError;
use crate::introspect::Introspector;
use crate::protocol::{Protocol, ProtocolScope};

/// Entry point: owns the runtime handle, the introspector, the protocol namespace and the
/// conformance registry.
///
/// Cloning is cheap; clones share all state.
#[derive(Clone)]
pub struct Engine {
	inner: Arc<EngineInner>,
}

struct EngineInner {
	runtime: Arc<Runtime>,
	config: EngineConfig,
	introspector: Introspector,
	conformances: ConformanceRegistry,
	protocols: RwLock<HashMap<Arc<str>, Arc<Protocol>>>,
}

impl Engine {
	pub fn new(runtime: Arc<Runtime>) -> Self {
		Self::with_config(runtime, EngineConfig::default())
	}

	pub fn with_config(runtime: Arc<Runtime>, config: EngineConfig) -> Self {
		Self {
			inner: Arc::new(EngineInner {
				introspector: Introspector::new(config.introspection.cache_sources),
				runtime,
				config,
				conformances: ConformanceRegistry::default(),
				protocols: RwLock::new(HashMap::default()),
			}),
		}
	}

	/// Builds an engine from a TOML config file.
	pub fn from_config_file(
		runtime: Arc<Runtime>,
		path: impl AsRef<Path>,
	) -> Result<Self, ProtocolError> {
		Ok(Self::with_config(runtime, EngineConfig::load(path)?))
	}

	pub fn runtime(&self) -> &Arc<Runtime> {
		&self.inner.runtime
	}

	/// The reflection service checks and introspection consult.
	pub fn reflection(&self) -> &dyn Reflection {
		self.inner.runtime.as_ref()
	}

	pub fn introspector(&self) -> &Introspector {
		&self.inner.introspector
	}

	pub fn config(&self) -> &EngineConfig {
		&self.inner.config
	}

	pub(crate) fn conformances(&self) -> &ConformanceRegistry {
		&self.inner.conformances
	}

	/// Defines a protocol and binds it under `name`, replacing any earlier binding.
	///
	/// The protocol's failure policy starts from the config (`protocols.<name>` or the global
	/// default). Nothing is bound when `define` fails.
	pub fn protocol<F>(&self, name: &str, define: F) -> Result<Arc<Protocol>, ProtocolError>
	where
		F: FnOnce(&mut ProtocolScope<'_>) -> Result<(), ProtocolError>,
	{
		let protocol = Protocol::new(name, self.inner.config.policy_for(name));
		define(&mut ProtocolScope::new(self, &protocol))?;
		if self
			.inner
			.protocols
			.write()
			.insert(Arc::from(name), Arc::clone(&protocol))
			.is_some()
		{
			tracing::debug!(protocol = name, "protocol binding replaced");
		}
		tracing::debug!(
			protocol = name,
			policy = %protocol.failure_policy(),
			messages = protocol.messages().len(),
			"protocol defined"
		);
		Ok(protocol)
	}

	pub fn find_protocol(&self, name: &str) -> Option<Arc<Protocol>> {
		self.inner.protocols.read().get(name).cloned()
	}

	/// Bound protocol names, sorted.
	pub fn protocol_names(&self) -> Vec<Arc<str>> {
		let mut names: Vec<_> = self.inner.protocols.read().keys().cloned().collect();
		names.sort();
		names
	}

	/// Registers (or replaces) a source file and drops stale source analysis.
	pub fn reload_source(&self, file: &str, text: impl Into<Arc<str>>) -> bool {
		let replaced = self.inner.runtime.load_source(file, text);
		if replaced {
			self.inner.introspector.flush_cache();
		}
		replaced
	}
}

impl std::fmt::Debug for Engine {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Engine")
			.field("protocols", &self.protocol_names())
			.field("config", &self.inner.config)
			.finish_non_exhaustive()
	}
}
