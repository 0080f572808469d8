use std::io::Write as _;
use std::sync::Arc;

use covenant_protocol::covenant_runtime::{BodyTraits, Class, MethodDef, Runtime, Value};
use covenant_protocol::{
	Arity, CheckError, ConfigError, Engine, EngineConfig, FailureKind, FailurePolicy, Protocol,
	ProtocolError,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rstest::rstest;

use crate::common::{engine, engine_with, int, send};

const NAMES: [&str; 4] = ["close", "open", "read", "write"];

fn io_protocol(engine: &Engine) -> Arc<Protocol> {
	engine
		.protocol("Io", |p| {
			p.understand("open", Arity::Fixed(1), false)?
				.understand("read", Arity::Fixed(0), false)?
				.understand("write", Arity::Fixed(1), false)?
				.responds_to("close")?;
			Ok(())
		})
		.unwrap()
}

/// Candidate defining the names whose bit is set in `mask`; `skewed` gives each one an extra
/// parameter.
fn io_candidate(engine: &Engine, mask: u8, skewed: bool) -> Arc<Class> {
	let class = engine.runtime().define_class("Device");
	for (bit, name) in NAMES.into_iter().enumerate() {
		if mask & (1 << bit) == 0 {
			continue;
		}
		let mut def = MethodDef::stub(name);
		if matches!(name, "open" | "write") {
			def = def.param("arg");
		}
		if skewed {
			def = def.param("extra");
		}
		class.define(def);
	}
	class
}

proptest! {
	#[test]
	fn prop_silent_check_mirrors_raised_outcome(mask in 0u8..16, skewed in any::<bool>()) {
		let engine = engine();
		let io = io_protocol(&engine);
		let class = io_candidate(&engine, mask, skewed);

		let silent = io.check(&engine, &class, Some(FailurePolicy::Silent)).unwrap();
		let warned = io.check(&engine, &class, Some(FailurePolicy::Warn)).unwrap();
		let raised = io.check(&engine, &class, Some(FailurePolicy::Raise));
		prop_assert_eq!(silent, warned);
		match raised {
			Ok(passed) => {
				prop_assert!(passed);
				prop_assert!(silent);
			}
			Err(err) => {
				prop_assert!(!silent);
				let failed = err.check_failed().unwrap();
				let records = io.failing_messages(&engine, &class).unwrap();
				prop_assert_eq!(failed.errors(), records.as_slice());
			}
		}
	}
}

#[test]
fn test_silent_and_raised_agree_on_a_partial_candidate() {
	let engine = engine();
	let io = io_protocol(&engine);
	// open and read only.
	let class = io_candidate(&engine, 0b0110, false);

	assert!(!io.check(&engine, &class, Some(FailurePolicy::Silent)).unwrap());
	let err = io.check(&engine, &class, None).unwrap_err();
	let names: Vec<&str> = err.check_failed().unwrap().iter().map(|e| e.message.name()).collect();
	assert_eq!(names, ["close", "write"]);
	assert_eq!(
		err.to_string(),
		"Io#close(): method 'close' not implemented in Device\
		 |Io#write(1): method 'write' not implemented in Device"
	);
}

#[test]
fn test_check_or_throw_ignores_configured_policy() {
	let engine = engine();
	let io = io_protocol(&engine);
	io.set_failure_policy(FailurePolicy::Silent);
	let class = io_candidate(&engine, 0b0111, true);

	assert!(!io.check(&engine, &class, None).unwrap());
	let err = io.check_or_throw(&engine, &class).unwrap_err();
	let kinds: Vec<FailureKind> = err.check_failed().unwrap().iter().map(|e| e.kind).collect();
	assert_eq!(
		kinds,
		[FailureKind::ArityMismatch, FailureKind::ArityMismatch, FailureKind::NotImplemented]
	);

	let complete = io_candidate(&engine, 0b1111, false);
	assert!(io.check_or_throw(&engine, &complete).is_ok());
}

/// `withdraw(amount)` requiring a positive amount and a smaller balance afterwards.
fn withdrawing(engine: &Engine) -> (Arc<Protocol>, Value) {
	let protocol = engine
		.protocol("Withdrawing", |p| {
			p.def(
				MethodDef::new("withdraw", |call| {
					call.precondition(|c| Ok(int(&c.arg(0)) > 0))?;
					let before = int(&call.this()?.ivar("balance"));
					call.postcondition(move |o| Ok(int(o.result()) < before))?;
					Ok(Value::Nil)
				})
				.param("amount")
				.traits(BodyTraits::INVOKES),
			)?;
			Ok(())
		})
		.unwrap();

	let class = engine.runtime().define_class("Wallet");
	class.define(
		MethodDef::new("withdraw", |call| {
			let amount = int(&call.arg(0));
			let balance = call.this()?.update_ivar("balance", |b| {
				*b = Value::Int(int(b) - amount);
				b.clone()
			});
			Ok(balance)
		})
		.param("amount"),
	);
	assert!(engine.conform_to(&class, &protocol).unwrap());
	let wallet = engine.runtime().instantiate(&class);
	wallet.set_ivar("balance", Value::Int(10));
	(protocol, Value::from(wallet))
}

#[rstest]
#[case(FailurePolicy::Warn)]
#[case(FailurePolicy::Silent)]
fn test_lenient_policies_return_the_real_result(#[case] policy: FailurePolicy) {
	let engine = engine();
	let (protocol, wallet) = withdrawing(&engine);
	protocol.set_failure_policy(policy);

	// Precondition and postcondition both fail; the call still happens.
	assert_eq!(send(&engine, &wallet, "withdraw", &[Value::Int(-5)]).unwrap(), Value::Int(15));
	assert_eq!(send(&engine, &wallet, "withdraw", &[Value::Int(3)]).unwrap(), Value::Int(12));
}

#[test]
fn test_policy_is_read_at_call_time() {
	let engine = engine();
	let (protocol, wallet) = withdrawing(&engine);

	let fault = send(&engine, &wallet, "withdraw", &[Value::Int(0)]).unwrap_err();
	assert_eq!(
		CheckError::from_fault(&fault).map(|e| e.kind),
		Some(FailureKind::PreconditionFailed)
	);
	assert_eq!(wallet.as_object().unwrap().ivar("balance"), Value::Int(10));

	protocol.set_failure_policy(FailurePolicy::Warn);
	assert_eq!(send(&engine, &wallet, "withdraw", &[Value::Int(0)]).unwrap(), Value::Int(10));
}

#[test]
fn test_config_file_sets_protocol_policies() {
	let mut file = tempfile::NamedTempFile::new().unwrap();
	write!(
		file,
		r#"
failure-policy = "none"

[protocols.Io]
failure-policy = "error"
"#
	)
	.unwrap();

	let config = EngineConfig::load(file.path()).unwrap();
	assert_eq!(config.failure_policy, FailurePolicy::Silent);

	let _ = tracing_subscriber::fmt::try_init();
	let engine = Engine::from_config_file(Arc::new(Runtime::new()), file.path()).unwrap();
	assert_eq!(engine.config(), &config);
	let io = io_protocol(&engine);
	assert_eq!(io.failure_policy(), FailurePolicy::Raise);
	let other = engine.protocol("Other", |_| Ok(())).unwrap();
	assert_eq!(other.failure_policy(), FailurePolicy::Silent);

	let partial = io_candidate(&engine, 0, false);
	assert!(io.check(&engine, &partial, None).is_err());
}

#[test]
fn test_missing_config_file_is_a_config_error() {
	let dir = tempfile::tempdir().unwrap();
	let missing = dir.path().join("covenant.toml");

	let err = EngineConfig::load(&missing).unwrap_err();
	assert!(matches!(err, ConfigError::Io { ref path, .. } if *path == missing));

	let err = Engine::from_config_file(Arc::new(Runtime::new()), &missing).unwrap_err();
	assert!(matches!(err, ProtocolError::Config(ConfigError::Io { .. })));
}

#[test]
fn test_unknown_policy_is_rejected() {
	let err = "loud".parse::<FailurePolicy>().unwrap_err();
	assert!(matches!(err, ConfigError::UnknownPolicy(ref p) if p == "loud"));
	assert_eq!(
		err.to_string(),
		"unknown failure policy 'loud' (expected error, warn or none)"
	);

	let config = EngineConfig::from_toml_str("[protocols.Io]\nfailure-policy = \"loud\"");
	assert!(matches!(config, Err(ConfigError::Parse(_))));
}

#[test]
fn test_engine_config_governs_new_protocols() {
	let config = EngineConfig::from_toml_str("failure-policy = \"warn\"").unwrap();
	let engine = engine_with(config);
	let io = io_protocol(&engine);
	assert_eq!(io.failure_policy(), FailurePolicy::Warn);

	let class = io_candidate(&engine, 0, false);
	assert!(!engine.conform_to(&class, &io).unwrap());
	assert!(engine.declared_conformances(&class).is_empty());
}
