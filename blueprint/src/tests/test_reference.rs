use crate::argmap::Arg;
use crate::blueprint::Blueprint;
use crate::errors::BlueprintError;
use crate::registry::{ClassDef, FieldDef, Registry};
use crate::tests::common::{instance, simple_registry};
use crate::ty::Ty;
use crate::value::Value;
use std::sync::Arc;

#[test]
fn test_blueprint_reference() {
    let registry = simple_registry();

    let mut bp = Blueprint::for_target(registry.clone(), "Main").expect("target resolves");
    bp.apply([("a", Arg::value("foo")), ("b", Arg::reference("a"))], None);
    let made = bp.make().expect("make succeeds");
    let main = instance(&made);
    assert_eq!(main.get("a"), Some(&Value::Str("foo".to_string())));
    assert_eq!(main.get("b"), Some(&Value::Str("foo".to_string())));

    let mut bp = Blueprint::for_target(registry.clone(), "Main").expect("target resolves");
    let made = bp
        .make_from_argv(&["a=foo", "b@=a"], false)
        .expect("make succeeds");
    let main = instance(&made);
    assert_eq!(main.get("a"), Some(&Value::Str("foo".to_string())));
    assert_eq!(main.get("b"), Some(&Value::Str("foo".to_string())));

    let mut bp = Blueprint::for_target(registry, "Main").expect("target resolves");
    bp.apply([("a", Arg::value("foo")), ("b", Arg::reference("c"))], None);
    let err = bp.make().unwrap_err();
    let BlueprintError::InvalidArg(message) = err else {
        panic!("expected invalid arg, got {err:?}");
    };
    assert!(
        message.contains("Invalid reference target \"c\" for b"),
        "message: {message}"
    );
}

fn nested_registry() -> Arc<Registry> {
    let mut registry = Registry::new();
    registry.add_class(ClassDef::new("test", "C").field(FieldDef::new("c", Ty::Int)));
    registry.add_class(
        ClassDef::new("test", "B")
            .field(FieldDef::new("b", Ty::Int))
            .field(FieldDef::new("c", Ty::class("C"))),
    );
    registry.add_class(
        ClassDef::new("test", "A")
            .field(FieldDef::new("a", Ty::Int))
            .field(FieldDef::new("b", Ty::class("B"))),
    );
    Arc::new(registry)
}

#[test]
fn test_blueprint_reference_nested() {
    let mut bp = Blueprint::for_target(nested_registry(), "A").expect("target resolves");
    let made = bp
        .make_from_argv(&["a@=b.b", "b.c.c@=a", "b.b=5"], false)
        .expect("make succeeds");
    let a = instance(&made);
    assert_eq!(a.get("a"), Some(&Value::Int(5)));
    let b = instance(a.get("b").expect("b"));
    assert_eq!(b.get("b"), Some(&Value::Int(5)));
    let c = instance(b.get("c").expect("c"));
    assert_eq!(c.get("c"), Some(&Value::Int(5)));
}

fn name_chain_registry() -> Arc<Registry> {
    let mut registry = Registry::new();
    registry.add_class(ClassDef::new("test", "Leaf").field(FieldDef::new("name", Ty::Str)));
    registry.add_class(
        ClassDef::new("test", "Mid")
            .field(FieldDef::new("name", Ty::Str))
            .field(FieldDef::new("b", Ty::class("Leaf"))),
    );
    registry.add_class(
        ClassDef::new("test", "Root")
            .field(FieldDef::new("name", Ty::Str))
            .field(FieldDef::new("a", Ty::class("Mid"))),
    );
    Arc::new(registry)
}

#[test]
fn test_blueprint_reference_wildcard() {
    let mut bp = Blueprint::for_target(name_chain_registry(), "Root").expect("target resolves");
    let made = bp
        .make_from_argv(&["...name@=name", "name=foo"], false)
        .expect("make succeeds");
    let root = instance(&made);
    assert_eq!(root.get("name"), Some(&Value::Str("foo".to_string())));
    let mid = instance(root.get("a").expect("a"));
    assert_eq!(mid.get("name"), Some(&Value::Str("foo".to_string())));
    let leaf = instance(mid.get("b").expect("b"));
    assert_eq!(leaf.get("name"), Some(&Value::Str("foo".to_string())));
}

#[test]
fn test_blueprint_reference_wildcard_to_deep_target() {
    let mut bp = Blueprint::for_target(name_chain_registry(), "Root").expect("target resolves");
    let made = bp
        .make_from_argv(&["...name@=a.b.name", "a.b.name=foo"], false)
        .expect("make succeeds");
    let root = instance(&made);
    assert_eq!(root.get("name"), Some(&Value::Str("foo".to_string())));
    let mid = instance(root.get("a").expect("a"));
    assert_eq!(mid.get("name"), Some(&Value::Str("foo".to_string())));
}

#[test]
fn test_reference_transparency_for_nonstring_values() {
    let mut registry = Registry::new();
    registry.add_class(
        ClassDef::new("test", "Pair")
            .field(FieldDef::new("x", Ty::Int))
            .field(FieldDef::new("y", Ty::Int)),
    );
    let mut bp = Blueprint::for_target(Arc::new(registry), "Pair").expect("target resolves");
    bp.apply([("x", Arg::value(42)), ("y", Arg::reference("x"))], None);
    let made = bp.make().expect("make succeeds");
    let pair = instance(&made);
    assert_eq!(pair.get("x"), pair.get("y"));
    assert_eq!(pair.get("y"), Some(&Value::Int(42)));
}

#[test]
fn test_reference_cycle_is_fatal() {
    let mut bp = Blueprint::for_target(simple_registry(), "Main").expect("target resolves");
    bp.apply([("a", Arg::reference("b")), ("b", Arg::reference("a"))], None);
    let err = bp.make().unwrap_err();
    let BlueprintError::Construction(message) = err else {
        panic!("expected construction error, got {err:?}");
    };
    assert!(message.contains("Reference cycle"), "message: {message}");
}
