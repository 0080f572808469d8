use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;

use crate::call::Call;
use crate::fault::Fault;
use crate::source::SourceLocation;
use crate::value::Value;

/// Executable body of a method.
pub type MethodBody = Arc<dyn Fn(&mut Call<'_>) -> Result<Value, Fault> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
	Required,
	Optional,
	Rest,
	Block,
}

/// One declared parameter of a method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Param {
	pub name: Arc<str>,
	pub kind: ParamKind,
}

impl Param {
	pub fn new(name: impl Into<Arc<str>>, kind: ParamKind) -> Self {
		Self {
			name: name.into(),
			kind,
		}
	}

	pub fn required(name: impl Into<Arc<str>>) -> Self {
		Self::new(name, ParamKind::Required)
	}

	pub fn optional(name: impl Into<Arc<str>>) -> Self {
		Self::new(name, ParamKind::Optional)
	}

	pub fn rest(name: impl Into<Arc<str>>) -> Self {
		Self::new(name, ParamKind::Rest)
	}

	pub fn block(name: impl Into<Arc<str>>) -> Self {
		Self::new(name, ParamKind::Block)
	}
}

impl fmt::Display for Param {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.kind {
			ParamKind::Required => write!(f, "{}", self.name),
			ParamKind::Optional => write!(f, "?{}", self.name),
			ParamKind::Rest => write!(f, "*{}", self.name),
			ParamKind::Block => write!(f, "&{}", self.name),
		}
	}
}

bitflags! {
	/// Statically declared facts about a method body.
	///
	/// Used by introspection when no source is available for the method.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
	pub struct BodyTraits: u8 {
		/// The body calls other named operations.
		const INVOKES = 1 << 0;
		/// The body yields to an implicit block.
		const YIELDS = 1 << 1;
	}
}

/// Definition input for a method, consumed by [`crate::Class::define`] and friends.
#[derive(Clone)]
pub struct MethodDef {
	pub(crate) name: Arc<str>,
	pub(crate) params: Option<Vec<Param>>,
	pub(crate) body: MethodBody,
	pub(crate) location: Option<SourceLocation>,
	pub(crate) traits: Option<BodyTraits>,
}

impl MethodDef {
	/// A method with (initially empty) parameter metadata.
	pub fn new<F>(name: impl Into<Arc<str>>, body: F) -> Self
	where
		F: Fn(&mut Call<'_>) -> Result<Value, Fault> + Send + Sync + 'static,
	{
		Self {
			name: name.into(),
			params: Some(Vec::new()),
			body: Arc::new(body),
			location: None,
			traits: None,
		}
	}

	/// A method whose parameters cannot be reflected on.
	pub fn native<F>(name: impl Into<Arc<str>>, body: F) -> Self
	where
		F: Fn(&mut Call<'_>) -> Result<Value, Fault> + Send + Sync + 'static,
	{
		Self {
			params: None,
			..Self::new(name, body)
		}
	}

	/// A method whose body does nothing and returns nil.
	pub fn stub(name: impl Into<Arc<str>>) -> Self {
		Self::new(name, |_| Ok(Value::Nil))
	}

	fn push_param(mut self, param: Param) -> Self {
		self.params.get_or_insert_with(Vec::new).push(param);
		self
	}

	pub fn param(self, name: impl Into<Arc<str>>) -> Self {
		self.push_param(Param::required(name))
	}

	pub fn optional(self, name: impl Into<Arc<str>>) -> Self {
		self.push_param(Param::optional(name))
	}

	pub fn rest(self, name: impl Into<Arc<str>>) -> Self {
		self.push_param(Param::rest(name))
	}

	pub fn block(self, name: impl Into<Arc<str>>) -> Self {
		self.push_param(Param::block(name))
	}

	/// Points the method at its definition in a file registered with the [`crate::SourceMap`].
	pub fn located(mut self, file: impl Into<Arc<str>>, line: u32) -> Self {
		self.location = Some(SourceLocation::new(file, line));
		self
	}

	pub fn traits(mut self, traits: BodyTraits) -> Self {
		self.traits = Some(traits);
		self
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub(crate) fn into_method(self, owner: Arc<str>) -> Method {
		Method {
			name: self.name,
			owner,
			params: self.params.map(Arc::from),
			body: self.body,
			location: self.location,
			traits: self.traits,
		}
	}
}

/// A method installed in a class, module or singleton table.
pub struct Method {
	name: Arc<str>,
	owner: Arc<str>,
	params: Option<Arc<[Param]>>,
	body: MethodBody,
	location: Option<SourceLocation>,
	traits: Option<BodyTraits>,
}

impl Method {
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Display name of the class, module or object that owns this method.
	pub fn owner(&self) -> &str {
		&self.owner
	}

	pub fn params(&self) -> Option<&Arc<[Param]>> {
		self.params.as_ref()
	}

	pub fn location(&self) -> Option<&SourceLocation> {
		self.location.as_ref()
	}

	pub fn traits(&self) -> Option<BodyTraits> {
		self.traits
	}

	pub fn body(&self) -> &MethodBody {
		&self.body
	}

	/// Checks a positional argument count against the parameter metadata.
	///
	/// Methods without metadata accept anything.
	pub fn accepts(&self, given: usize) -> bool {
		let Some(params) = &self.params else {
			return true;
		};
		let (required, optional, rest) = count_params(params);
		given >= required && (rest || given <= required + optional)
	}

	pub(crate) fn expected_args(&self) -> String {
		let Some(params) = &self.params else {
			return "any".to_string();
		};
		match count_params(params) {
			(required, _, true) => format!("{required}+"),
			(required, 0, false) => required.to_string(),
			(required, optional, false) => format!("{required}..{}", required + optional),
		}
	}

	pub(crate) fn invoke(&self, call: &mut Call<'_>) -> Result<Value, Fault> {
		(self.body)(call)
	}
}

fn count_params(params: &[Param]) -> (usize, usize, bool) {
	params
		.iter()
		.fold((0, 0, false), |(req, opt, rest), p| match p.kind {
			ParamKind::Required => (req + 1, opt, rest),
			ParamKind::Optional => (req, opt + 1, rest),
			ParamKind::Rest => (req, opt, true),
			ParamKind::Block => (req, opt, rest),
		})
}

impl fmt::Debug for Method {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Method")
			.field("name", &self.name)
			.field("owner", &self.owner)
			.field("params", &self.params)
			.field("location", &self.location)
			.field("traits", &self.traits)
			.finish_non_exhaustive()
	}
}
