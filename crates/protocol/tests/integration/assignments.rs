use std::sync::Arc;

use covenant_protocol::covenant_runtime::{Class, Fault, MethodDef, Subject, Value};
use covenant_protocol::{Arity, CheckFailed, Engine, FailureKind, FailurePolicy, Protocol};
use pretty_assertions::assert_eq;

use crate::common::{engine, send};

struct World {
	engine: Engine,
	assignable: Arc<Protocol>,
	assignee: Arc<Protocol>,
	project: Arc<Class>,
	user: Arc<Class>,
	task: Arc<Class>,
	plain: Arc<Class>,
}

/// Raises the aggregate failure when `value` does not conform.
fn require(engine: &Engine, protocol: &Protocol, value: &Value) -> Result<(), Fault> {
	let subject = Subject::from_value(value)
		.ok_or_else(|| Fault::raised(format!("{value:?} cannot conform to {}", protocol.name())))?;
	protocol.check(engine, subject, Some(FailurePolicy::Raise))?;
	Ok(())
}

fn world() -> World {
	let engine = engine();
	let assignee = engine.protocol("Assignee", |_| Ok(())).unwrap();
	let assignable = engine
		.protocol("Assignable", |p| {
			p.understand("assign_to", Arity::Fixed(1), false)?;
			Ok(())
		})
		.unwrap();

	let (checker, able, ee) = (engine.clone(), Arc::clone(&assignable), Arc::clone(&assignee));
	let assignments = engine
		.protocol("Assignments", |p| {
			p.implementation().def(
				MethodDef::new("assign", move |call| {
					let (item, target) = (call.arg(0), call.arg(1));
					require(&checker, &able, &item)?;
					require(&checker, &ee, &target)?;
					call.runtime().send(&item, "assign_to", &[target])?;
					let mut assigned = call
						.ivar("assignments")?
						.as_list()
						.map(<[Value]>::to_vec)
						.unwrap_or_default();
					assigned.push(item);
					call.set_ivar("assignments", Value::from(assigned))?;
					Ok(call.receiver().clone())
				})
				.param("assignable")
				.param("assignee"),
			)?;
			Ok(())
		})
		.unwrap();

	let rt = engine.runtime();
	let task = rt.define_class("Task");
	task.define(
		MethodDef::new("assign_to", |call| {
			call.set_ivar("assignee", call.arg(0))?;
			Ok(call.arg(0))
		})
		.param("assignee"),
	);
	assert!(engine.conform_to(&task, &assignable).unwrap());

	let project = rt.define_class("Project");
	let user = rt.define_class("User");
	for class in [&project, &user] {
		assert!(engine.conform_to(class, &assignments).unwrap());
		assert!(engine.conform_to(class, &assignee).unwrap());
	}
	let plain = rt.define_class("Plain");

	World {
		engine,
		assignable,
		assignee,
		project,
		user,
		task,
		plain,
	}
}

fn new(world: &World, class: &Arc<Class>) -> Value {
	Value::from(world.engine.runtime().instantiate(class))
}

#[test]
fn test_valid_assignment_records_the_task() {
	let w = world();
	let project = new(&w, &w.project);
	let task = new(&w, &w.task);
	let user = new(&w, &w.user);

	let result = send(&w.engine, &project, "assign", &[task.clone(), user.clone()]).unwrap();
	assert_eq!(result, project);
	assert_eq!(task.as_object().unwrap().ivar("assignee"), user);
	assert_eq!(
		project.as_object().unwrap().ivar("assignments"),
		Value::list([task])
	);
}

#[test]
fn test_nonconforming_assignable_names_only_its_missing_messages() {
	let w = world();
	let project = new(&w, &w.project);
	let plain = new(&w, &w.plain);
	let task = new(&w, &w.task);

	let fault = send(&w.engine, &project, "assign", &[plain.clone(), task]).unwrap_err();
	let failed = CheckFailed::from_fault(&fault).unwrap();
	assert_eq!(failed.len(), 1);
	let error = &failed.errors()[0];
	assert_eq!(error.kind, FailureKind::NotImplemented);
	assert_eq!(error.message.to_string(), "Assignable#assign_to(1)");
	assert_eq!(error.subject, plain.to_string());
	assert_eq!(
		fault.to_string(),
		format!("Assignable#assign_to(1): method 'assign_to' not responding in {plain}")
	);
	assert!(project.as_object().unwrap().ivar("assignments").is_nil());
}

#[test]
fn test_any_object_is_an_assignee() {
	let w = world();
	let project = new(&w, &w.project);
	let task = new(&w, &w.task);
	let plain = new(&w, &w.plain);

	assert!(send(&w.engine, &project, "assign", &[task, plain]).is_ok());
	assert!(w.engine.conforms_to(&w.plain, &w.assignee).unwrap());
	assert!(!w.engine.conforms_to(&w.plain, &w.assignable).unwrap());
}

#[test]
fn test_declared_conformances_are_recorded_per_class() {
	let w = world();
	let names = |class: &Arc<Class>| -> Vec<String> {
		w.engine
			.declared_conformances(class)
			.iter()
			.map(|p| p.name().to_string())
			.collect()
	};
	assert_eq!(names(&w.project), ["Assignments", "Assignee"]);
	assert_eq!(names(&w.task), ["Assignable"]);
	assert!(names(&w.plain).is_empty());

	let task = w.engine.runtime().instantiate(&w.task);
	assert!(w.engine.is_declared(&task, &w.assignable));
	assert!(!w.engine.is_declared(&task, &w.assignee));
}
