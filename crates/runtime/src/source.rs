use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap as HashMap;

/// Physical location of a method definition: file name and 1-based line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceLocation {
	pub file: Arc<str>,
	pub line: u32,
}

impl SourceLocation {
	pub fn new(file: impl Into<Arc<str>>, line: u32) -> Self {
		Self {
			file: file.into(),
			line,
		}
	}
}

impl fmt::Display for SourceLocation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.file, self.line)
	}
}

/// Source text of a method as handed out by reflection.
#[derive(Debug, Clone)]
pub struct MethodSource {
	pub location: SourceLocation,
	/// Full text of the file the method was defined in.
	pub text: Arc<str>,
}

impl MethodSource {
	/// Text from the start of the method's line to the end of the file.
	///
	/// Returns `None` when the line lies past the end of the file.
	pub fn from_definition(&self) -> Option<&str> {
		let skip = self.location.line.checked_sub(1)? as usize;
		if skip == 0 {
			return Some(&self.text);
		}
		let offset = self
			.text
			.match_indices('\n')
			.nth(skip - 1)
			.map(|(idx, _)| idx + 1)?;
		Some(&self.text[offset..])
	}
}

/// Registered source files, keyed by file name.
#[derive(Default)]
pub struct SourceMap {
	files: RwLock<HashMap<Arc<str>, Arc<str>>>,
}

impl SourceMap {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers or replaces a file. Returns true when an older version was replaced.
	pub fn load(&self, file: impl Into<Arc<str>>, text: impl Into<Arc<str>>) -> bool {
		self.files.write().insert(file.into(), text.into()).is_some()
	}

	pub fn get(&self, file: &str) -> Option<Arc<str>> {
		self.files.read().get(file).cloned()
	}

	pub fn method_source(&self, location: &SourceLocation) -> Option<MethodSource> {
		let text = self.get(&location.file)?;
		Some(MethodSource {
			location: location.clone(),
			text,
		})
	}
}
