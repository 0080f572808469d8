//! Engine configuration.
//!
//! Loaded from TOML. Every key is optional:
//!
//! ```toml
//! failure-policy = "warn"
//!
//! [introspection]
//! cache-sources = false
//!
//! [protocols.Queue]
//! failure-policy = "none"
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How conformance and contract failures are reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailurePolicy {
	/// Raise an error carrying every failure record.
	#[default]
	#[serde(rename = "error")]
	Raise,
	/// Emit one `tracing` warning per record and report `false`.
	#[serde(rename = "warn", alias = "warning")]
	Warn,
	/// Report `false` without any output.
	#[serde(rename = "none")]
	Silent,
}

impl FailurePolicy {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Raise => "error",
			Self::Warn => "warn",
			Self::Silent => "none",
		}
	}
}

impl fmt::Display for FailurePolicy {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for FailurePolicy {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"error" => Ok(Self::Raise),
			"warn" | "warning" => Ok(Self::Warn),
			"none" => Ok(Self::Silent),
			other => Err(ConfigError::UnknownPolicy(other.to_string())),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct IntrospectionConfig {
	/// Cache source analysis per method location.
	pub cache_sources: bool,
}

impl Default for IntrospectionConfig {
	fn default() -> Self {
		Self {
			cache_sources: true,
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct ProtocolConfig {
	pub failure_policy: Option<FailurePolicy>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct EngineConfig {
	/// Policy given to protocols without an entry in `protocols`.
	pub failure_policy: FailurePolicy,
	pub introspection: IntrospectionConfig,
	/// Per-protocol overrides keyed by protocol name.
	pub protocols: BTreeMap<String, ProtocolConfig>,
}

impl EngineConfig {
	pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
		Ok(toml::from_str(text)?)
	}

	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
			path: path.to_path_buf(),
			source,
		})?;
		let config = Self::from_toml_str(&text)?;
		tracing::debug!(path = %path.display(), protocols = config.protocols.len(), "engine config loaded");
		Ok(config)
	}

	/// Default policy for a newly defined protocol.
	pub fn policy_for(&self, protocol: &str) -> FailurePolicy {
		self.protocols
			.get(protocol)
			.and_then(|p| p.failure_policy)
			.unwrap_or(self.failure_policy)
	}
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("failed to read {}: {source}", path.display())]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("invalid engine config: {0}")]
	Parse(#[from] toml::de::Error),

	#[error("unknown failure policy '{0}' (expected error, warn or none)")]
	UnknownPolicy(String),
}
