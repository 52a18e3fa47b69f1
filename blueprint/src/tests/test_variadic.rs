use crate::argmap::Arg;
use crate::blueprint::Blueprint;
use crate::errors::BlueprintError;
use crate::registry::{ClassDef, DictDef, Factory, FieldDef, Registry};
use crate::tests::common::{fields, instance};
use crate::ty::Ty;
use crate::value::Value;
use std::sync::Arc;

fn registry_with(field: FieldDef) -> Arc<Registry> {
    let mut registry = Registry::new();
    registry.add_class(ClassDef::new("test", "Holder").field(field));
    Arc::new(registry)
}

#[test]
fn test_list_from_numbered_subarguments() {
    let registry = registry_with(FieldDef::new("xs", Ty::list(Ty::Int)));
    let mut bp = Blueprint::for_target(registry, "Holder").expect("target resolves");
    bp.apply(
        [("xs.0", Arg::castable("1")), ("xs.1", Arg::castable("2"))],
        None,
    );
    let made = bp.make().expect("make succeeds");
    assert_eq!(
        instance(&made).get("xs"),
        Some(&Value::List(vec![Value::Int(1), Value::Int(2)]))
    );
}

#[test]
fn test_sequence_constructs_a_tuple() {
    let registry = registry_with(FieldDef::new("xs", Ty::seq(Ty::Str)));
    let mut bp = Blueprint::for_target(registry, "Holder").expect("target resolves");
    bp.apply([("xs.0", Arg::castable("a"))], None);
    let made = bp.make().expect("make succeeds");
    assert_eq!(
        instance(&made).get("xs"),
        Some(&Value::Tuple(vec![Value::Str("a".to_string())]))
    );
}

#[test]
fn test_list_with_hole_is_missing() {
    let registry = registry_with(FieldDef::new("xs", Ty::list(Ty::Int)));
    let mut bp = Blueprint::for_target(registry, "Holder").expect("target resolves");
    bp.apply(
        [("xs.0", Arg::castable("1")), ("xs.2", Arg::castable("3"))],
        None,
    );
    let err = bp.make().unwrap_err();
    assert_eq!(
        err,
        BlueprintError::MissingArg(
            "Missing required arguments for parameter(s): xs.1".to_string()
        )
    );
}

#[test]
fn test_non_numeric_sequence_index_errors() {
    let registry = registry_with(FieldDef::new("xs", Ty::list(Ty::Int)));
    let mut bp = Blueprint::for_target(registry, "Holder").expect("target resolves");
    bp.apply([("xs.first", Arg::castable("1"))], None);
    let err = bp.make().unwrap_err();
    let BlueprintError::Construction(message) = err else {
        panic!("expected construction error, got {err:?}");
    };
    assert!(message.contains("integer indices"), "message: {message}");
}

#[test]
fn test_heterogeneous_tuple_bounds_indices() {
    let registry = registry_with(FieldDef::new("pt", Ty::Tuple(vec![Ty::Int, Ty::Str])));
    let mut bp = Blueprint::for_target(registry.clone(), "Holder").expect("target resolves");
    bp.apply(
        [("pt.0", Arg::castable("1")), ("pt.1", Arg::castable("a"))],
        None,
    );
    let made = bp.make().expect("make succeeds");
    assert_eq!(
        instance(&made).get("pt"),
        Some(&Value::Tuple(vec![
            Value::Int(1),
            Value::Str("a".to_string())
        ]))
    );

    let mut bp = Blueprint::for_target(registry, "Holder").expect("target resolves");
    bp.apply([("pt.2", Arg::castable("x"))], None);
    let err = bp.make().unwrap_err();
    let BlueprintError::Construction(message) = err else {
        panic!("expected construction error, got {err:?}");
    };
    assert!(message.contains("must take 2 items"), "message: {message}");
}

#[test]
fn test_single_item_tuple_error_suggests_homogeneous_form() {
    let registry = registry_with(FieldDef::new("pt", Ty::Tuple(vec![Ty::Int])));
    let mut bp = Blueprint::for_target(registry, "Holder").expect("target resolves");
    bp.apply([("pt.3", Arg::castable("1"))], None);
    let err = bp.make().unwrap_err();
    let BlueprintError::Construction(message) = err else {
        panic!("expected construction error, got {err:?}");
    };
    assert!(
        message.contains("tuple[int, ...]"),
        "message: {message}"
    );
}

#[test]
fn test_homogeneous_tuple_takes_any_indices() {
    let registry = registry_with(FieldDef::new("pt", Ty::tuple_of(Ty::Int)));
    let mut bp = Blueprint::for_target(registry, "Holder").expect("target resolves");
    bp.apply(
        [
            ("pt.0", Arg::castable("1")),
            ("pt.1", Arg::castable("2")),
            ("pt.2", Arg::castable("3")),
        ],
        None,
    );
    let made = bp.make().expect("make succeeds");
    assert_eq!(
        instance(&made).get("pt"),
        Some(&Value::Tuple(vec![
            Value::Int(1),
            Value::Int(2),
            Value::Int(3)
        ]))
    );
}

#[test]
fn test_dict_from_keyed_subarguments() {
    let registry = registry_with(FieldDef::new("named", Ty::dict(Ty::Str, Ty::Int)));
    let mut bp = Blueprint::for_target(registry, "Holder").expect("target resolves");
    bp.apply(
        [
            ("named.foo", Arg::castable("1")),
            ("named.bar", Arg::castable("2")),
        ],
        None,
    );
    let made = bp.make().expect("make succeeds");
    assert_eq!(
        instance(&made).get("named"),
        Some(&Value::Dict(fields(&[
            ("foo", Value::Int(1)),
            ("bar", Value::Int(2)),
        ])))
    );
}

#[test]
fn test_non_string_dict_keys_error_when_observed() {
    let registry = registry_with(FieldDef::new("named", Ty::dict(Ty::Int, Ty::Int)));
    let mut bp = Blueprint::for_target(registry, "Holder").expect("target resolves");
    bp.apply([("named.foo", Arg::castable("1"))], None);
    let err = bp.make().unwrap_err();
    let BlueprintError::Construction(message) = err else {
        panic!("expected construction error, got {err:?}");
    };
    assert!(message.contains("str keys"), "message: {message}");
}

#[test]
fn test_typed_dict_variadic_honors_required_flags() {
    let mut registry = Registry::new();
    registry.add_typed_dict(
        DictDef::new("Opts")
            .key("lr", Ty::Float)
            .optional_key("warmup", Ty::Int),
    );
    registry.add_class(
        ClassDef::new("test", "Job").field(FieldDef::new("opts", Ty::TypedDict("Opts".to_string()))),
    );
    let registry = Arc::new(registry);

    let mut bp = Blueprint::for_target(registry.clone(), "Job").expect("target resolves");
    bp.apply([("opts.lr", Arg::castable("0.5"))], None);
    let made = bp.make().expect("make succeeds");
    assert_eq!(
        instance(&made).get("opts"),
        Some(&Value::Dict(fields(&[("lr", Value::Float(0.5))])))
    );

    let mut bp = Blueprint::for_target(registry, "Job").expect("target resolves");
    bp.apply([("opts.warmup", Arg::castable("10"))], None);
    let err = bp.make().unwrap_err();
    assert_eq!(
        err,
        BlueprintError::MissingArg(
            "Missing required arguments for parameter(s): opts.lr".to_string()
        )
    );
}

#[test]
fn test_wildcard_cannot_modify_variadic_default() {
    let mut registry = Registry::new();
    registry.add_class(
        ClassDef::new("test", "Run").field(FieldDef::new("seed", Ty::Int).default_value(0)),
    );
    registry.add_class(
        ClassDef::new("test", "Sweep").field(
            FieldDef::new("runs", Ty::list(Ty::class("Run"))).default_value(Value::List(vec![])),
        ),
    );
    let mut bp = Blueprint::for_target(Arc::new(registry), "Sweep").expect("target resolves");
    bp.apply([("...seed", Arg::castable("7"))], None);
    let err = bp.make().unwrap_err();
    let BlueprintError::Construction(message) = err else {
        panic!("expected construction error, got {err:?}");
    };
    assert!(message.contains("opaque"), "message: {message}");
    assert!(message.contains("runs.(variadic).seed"), "message: {message}");
}

#[test]
fn test_empty_container_default_is_exempt_from_the_audit() {
    let mut registry = Registry::new();
    registry.add_class(
        ClassDef::new("test", "Run").field(FieldDef::new("seed", Ty::Int).default_value(0)),
    );
    registry.add_class(
        ClassDef::new("test", "Sweep")
            .field(FieldDef::new("main_run", Ty::class("Run")))
            .field(
                FieldDef::new("runs", Ty::list(Ty::class("Run")))
                    .default_factory(Factory::Container(Ty::list(Ty::class("Run")))),
            ),
    );
    let mut bp = Blueprint::for_target(Arc::new(registry), "Sweep").expect("target resolves");
    // The wildcard reaches `main_run.seed`; the bare-constructor default on
    // `runs` opts out of the audit instead of erroring.
    bp.apply([("...seed", Arg::castable("7"))], None);
    let made = bp.make().expect("make succeeds");
    let sweep = instance(&made);
    assert_eq!(sweep.get("runs"), Some(&Value::List(vec![])));
    assert_eq!(
        instance(sweep.get("main_run").expect("main_run")).get("seed"),
        Some(&Value::Int(7))
    );
}
