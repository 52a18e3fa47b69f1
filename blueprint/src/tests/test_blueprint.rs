use crate::argmap::Arg;
use crate::blueprint::Blueprint;
use crate::errors::BlueprintError;
use crate::registry::{ClassDef, Factory, FieldDef, FunctionDef, ParamKind, Registry, SigParam};
use crate::tests::common::{instance, ml_registry, simple_registry};
use crate::ty::Ty;
use crate::value::Value;
use std::sync::Arc;

#[test]
fn test_make_simple_target() {
    let mut bp = Blueprint::for_target(simple_registry(), "Main").expect("target resolves");
    bp.apply([("a", Arg::value("foo")), ("b", Arg::value("bar"))], None);
    let made = bp.make().expect("make succeeds");
    let main = instance(&made);
    assert_eq!(main.get("a"), Some(&Value::Str("foo".to_string())));
    assert_eq!(main.get("b"), Some(&Value::Str("bar".to_string())));
}

#[test]
fn test_castable_strings_are_coerced() {
    let mut registry = Registry::new();
    registry.add_class(
        ClassDef::new("test", "Train")
            .field(FieldDef::new("lr", Ty::Float))
            .field(FieldDef::new("steps", Ty::Int).default_value(100))
            .field(FieldDef::new("resume", Ty::Bool).default_value(false)),
    );
    let mut bp = Blueprint::for_target(Arc::new(registry), "Train").expect("target resolves");
    bp.apply(
        [("lr", Arg::castable("0.1")), ("resume", Arg::castable("true"))],
        None,
    );
    let made = bp.make().expect("make succeeds");
    let train = instance(&made);
    assert_eq!(train.get("lr"), Some(&Value::Float(0.1)));
    assert_eq!(train.get("steps"), Some(&Value::Int(100)));
    assert_eq!(train.get("resume"), Some(&Value::Bool(true)));
}

#[test]
fn test_missing_required_argument() {
    let mut bp = Blueprint::for_target(simple_registry(), "Main").expect("target resolves");
    bp.apply([("a", Arg::value("foo"))], None);
    let err = bp.make().unwrap_err();
    assert_eq!(
        err,
        BlueprintError::MissingArg(
            "Missing required arguments for parameter(s): b".to_string()
        )
    );
}

#[test]
fn test_extraneous_is_reported_before_missing() {
    // A typo both leaves `b` unbound and adds an unknown key; the typo wins.
    let mut bp = Blueprint::for_target(simple_registry(), "Main").expect("target resolves");
    bp.apply([("a", Arg::value("foo")), ("c", Arg::value("bar"))], None);
    let err = bp.make().unwrap_err();
    assert!(matches!(err, BlueprintError::ExtraneousArg(_)), "got {err:?}");
}

#[test]
fn test_layer_shadowing() {
    let mut bp = Blueprint::for_target(simple_registry(), "Main").expect("target resolves");
    bp.apply(
        [("a", Arg::value("base")), ("b", Arg::value("base"))],
        Some("defaults"),
    );
    bp.apply([("a", Arg::value("override"))], Some("cli"));
    let made = bp.make().expect("make succeeds");
    let main = instance(&made);
    assert_eq!(main.get("a"), Some(&Value::Str("override".to_string())));
    assert_eq!(main.get("b"), Some(&Value::Str("base".to_string())));
}

#[test]
fn test_apply_composition() {
    // Blueprint(T).apply(a).apply(b) == Blueprint(T).apply(the two applied)
    let registry = simple_registry();
    let mut direct = Blueprint::for_target(registry.clone(), "Main").expect("target resolves");
    direct.apply([("a", Arg::value("x")), ("b", Arg::value("y"))], None);
    direct.apply([("a", Arg::value("z"))], None);

    let mut staged = Blueprint::for_target(registry.clone(), "Main").expect("target resolves");
    staged.apply([("a", Arg::value("x")), ("b", Arg::value("y"))], None);
    staged.apply([("a", Arg::value("z"))], None);
    let mut composed = Blueprint::for_target(registry, "Main").expect("target resolves");
    composed.apply_blueprint(&staged).expect("same target");

    assert_eq!(direct.make().unwrap(), composed.make().unwrap());
}

#[test]
fn test_apply_blueprint_requires_identical_target() {
    let registry = ml_registry();
    let experiment = Blueprint::for_target(registry.clone(), "Experiment").expect("resolves");
    let mut model = Blueprint::for_target(registry, "models:Model").expect("resolves");
    let err = model.apply_blueprint(&experiment).unwrap_err();
    assert!(matches!(err, BlueprintError::InvalidArg(_)));
}

#[test]
fn test_clone_is_a_deep_copy() {
    let mut bp = Blueprint::for_target(simple_registry(), "Main").expect("target resolves");
    bp.apply([("a", Arg::value("x")), ("b", Arg::value("y"))], None);
    let clone = bp.clone();
    bp.apply([("a", Arg::value("mutated"))], None);

    let made = clone.make().expect("clone still makes");
    assert_eq!(instance(&made).get("a"), Some(&Value::Str("x".to_string())));
}

#[test]
fn test_polymorphic_subclass_construction() {
    let mut bp = Blueprint::for_target(ml_registry(), "Experiment").expect("target resolves");
    bp.apply(
        [
            ("model", Arg::castable("Transformer")),
            ("model.n_layers", Arg::castable("16")),
        ],
        None,
    );
    let made = bp.make().expect("make succeeds");
    let model = instance(instance(&made).get("model").expect("model field"));
    assert_eq!(model.class, "Transformer");
    assert_eq!(model.get("n_layers"), Some(&Value::Int(16)));
    assert_eq!(model.get("d_model"), Some(&Value::Int(512)));
}

#[test]
fn test_unspecified_factory_consumes_subarguments() {
    // No factory is named for `model`; the annotation's default factory is
    // probed, but Model has no parameters, so naming a subclass field must
    // go through an explicit factory instead.
    let mut bp = Blueprint::for_target(ml_registry(), "Experiment").expect("target resolves");
    bp.apply([("model.n_layers", Arg::castable("16"))], None);
    let err = bp.make().unwrap_err();
    assert!(matches!(err, BlueprintError::ExtraneousArg(_)), "got {err:?}");
}

#[test]
fn test_all_defaults_instance_commits_without_bindings() {
    let mut registry = Registry::new();
    registry.add_class(
        ClassDef::new("test", "Inner").field(FieldDef::new("n", Ty::Int).default_value(3)),
    );
    registry.add_class(
        ClassDef::new("test", "Outer").field(FieldDef::new("inner", Ty::class("Inner"))),
    );
    let bp = Blueprint::for_target(Arc::new(registry), "Outer").expect("target resolves");
    let made = bp.make().expect("all-defaults instance");
    let inner = instance(instance(&made).get("inner").expect("inner"));
    assert_eq!(inner.get("n"), Some(&Value::Int(3)));
}

#[test]
fn test_polymorphic_factory_via_function() {
    use crate::factories::FunctionFactory;

    let mut registry = Registry::new();
    registry.add_class(ClassDef::new("data", "Dataset"));
    registry.add_function(
        FunctionDef::new("data", "wikipedia_text", Ty::class("Dataset"), |kwargs| {
            Ok(Value::Instance(crate::value::Instance {
                class: "Dataset".to_string(),
                fields: kwargs.clone(),
            }))
        })
        .param(SigParam::new("seed", Ty::Int)),
    );
    registry.add_class(
        ClassDef::new("exp", "Run").field(
            FieldDef::new("dataset", Ty::class("Dataset")).meta_factory(Arc::new(
                FunctionFactory::new().with_default_module("data"),
            )),
        ),
    );

    let mut bp = Blueprint::for_target(Arc::new(registry), "Run").expect("target resolves");
    bp.apply(
        [
            ("dataset", Arg::castable("wikipedia_text")),
            ("dataset.seed", Arg::castable("217")),
        ],
        None,
    );
    let made = bp.make().expect("make succeeds");
    let dataset = instance(instance(&made).get("dataset").expect("dataset"));
    assert_eq!(dataset.get("seed"), Some(&Value::Int(217)));
}

#[test]
fn test_direct_factory_binding() {
    let registry = ml_registry();
    let transformer = registry.class_def("Transformer").expect("registered");
    let mut bp = Blueprint::for_target(registry, "Experiment").expect("target resolves");
    bp.apply(
        [
            ("model", Arg::factory(Factory::Target(transformer))),
            ("model.n_layers", Arg::castable("4")),
        ],
        None,
    );
    let made = bp.make().expect("make succeeds");
    let model = instance(instance(&made).get("model").expect("model"));
    assert_eq!(model.class, "Transformer");
    assert_eq!(model.get("n_layers"), Some(&Value::Int(4)));
}

#[test]
fn test_value_of_wrong_type_is_invalid() {
    let mut bp = Blueprint::for_target(simple_registry(), "Main").expect("target resolves");
    bp.apply([("a", Arg::value(5)), ("b", Arg::value("ok"))], None);
    let err = bp.make().unwrap_err();
    let BlueprintError::InvalidArg(message) = err else {
        panic!("expected invalid arg, got {err:?}");
    };
    assert!(message.contains("\"a\""), "message: {message}");
}

#[test]
fn test_uninterpretable_castable_reports_both_failures() {
    let mut bp = Blueprint::for_target(ml_registry(), "Experiment").expect("target resolves");
    bp.apply([("model", Arg::castable("NoSuchModel"))], None);
    let err = bp.make().unwrap_err();
    let BlueprintError::InvalidArg(message) = err else {
        panic!("expected invalid arg, got {err:?}");
    };
    assert!(message.contains("Failed to interpret it as a value"));
    assert!(message.contains("Failed to interpret it as a factory for polymorphic construction"));
    assert!(message.contains("NoSuchModel"));
}

#[test]
fn test_castable_with_subparameters_hint() {
    let mut bp = Blueprint::for_target(simple_registry(), "Main").expect("target resolves");
    bp.apply(
        [
            ("a", Arg::castable("foo")),
            ("a.x", Arg::castable("1")),
            ("b", Arg::castable("bar")),
        ],
        None,
    );
    let err = bp.make().unwrap_err();
    let BlueprintError::InvalidArg(message) = err else {
        panic!("expected invalid arg, got {err:?}");
    };
    assert!(
        message.contains("Not a value, since subparameters were provided (e.g. \"a.x\")"),
        "message: {message}"
    );
}

#[test]
fn test_signature_collection_rules() {
    let mut registry = Registry::new();
    registry.add_function(
        FunctionDef::new("jobs", "star_args", Ty::Any, |_| Ok(Value::Null))
            .param(SigParam::new("rest", Ty::Any).kind(ParamKind::VarPositional)),
    );
    registry.add_function(
        FunctionDef::new("jobs", "pos_only", Ty::Any, |_| Ok(Value::Null))
            .param(SigParam::new("x", Ty::Int).kind(ParamKind::PositionalOnly)),
    );
    registry.add_function(
        FunctionDef::new("jobs", "pos_only_defaulted", Ty::Any, |kwargs| {
            Ok(kwargs.get("y").cloned().unwrap_or(Value::Null))
        })
        .param(SigParam::new("x", Ty::Int).kind(ParamKind::PositionalOnly).default(1))
        .param(SigParam::new("y", Ty::Int)),
    );
    let registry = Arc::new(registry);

    let bp = Blueprint::new(
        registry.clone(),
        Factory::Target(registry.resolve("star_args").expect("registered")),
    );
    let err = bp.make().unwrap_err();
    let BlueprintError::Construction(message) = err else {
        panic!("expected construction error, got {err:?}");
    };
    assert!(message.contains("*args"), "message: {message}");

    let bp = Blueprint::new(
        registry.clone(),
        Factory::Target(registry.resolve("pos_only").expect("registered")),
    );
    let err = bp.make().unwrap_err();
    assert!(matches!(err, BlueprintError::Construction(_)));

    // A defaulted positional-only parameter is silently discarded.
    let mut bp = Blueprint::new(
        registry.clone(),
        Factory::Target(registry.resolve("pos_only_defaulted").expect("registered")),
    );
    bp.apply([("y", Arg::castable("5"))], None);
    assert_eq!(bp.make().expect("make succeeds"), Value::Int(5));
}

#[test]
fn test_type_valued_parameter() {
    let mut registry = Registry::new();
    registry.add_class(ClassDef::new("models", "Model"));
    registry.add_class(ClassDef::new("models", "Transformer").base("Model"));
    registry.add_class(
        ClassDef::new("test", "Trainer")
            .field(FieldDef::new("model_cls", Ty::type_of(Ty::class("Model")))),
    );
    let mut bp = Blueprint::for_target(Arc::new(registry), "Trainer").expect("target resolves");
    bp.apply([("model_cls", Arg::castable("Transformer"))], None);
    let made = bp.make().expect("make succeeds");
    assert_eq!(
        instance(&made).get("model_cls"),
        Some(&Value::Type("Transformer".to_string()))
    );
}

#[test]
fn test_optional_parameter_accepts_none_and_subclass() {
    let mut registry = Registry::new();
    registry.add_class(ClassDef::new("models", "Model"));
    registry.add_class(
        ClassDef::new("models", "Transformer")
            .base("Model")
            .field(FieldDef::new("n_layers", Ty::Int).default_value(2)),
    );
    registry.add_class(
        ClassDef::new("test", "Maybe")
            .field(FieldDef::new("model", Ty::optional(Ty::class("Model")))),
    );
    let registry = Arc::new(registry);

    let mut bp = Blueprint::for_target(registry.clone(), "Maybe").expect("target resolves");
    bp.apply([("model", Arg::castable("None"))], None);
    let made = bp.make().expect("make succeeds");
    assert_eq!(instance(&made).get("model"), Some(&Value::Null));

    let mut bp = Blueprint::for_target(registry, "Maybe").expect("target resolves");
    bp.apply(
        [
            ("model", Arg::castable("Transformer")),
            ("model.n_layers", Arg::castable("8")),
        ],
        None,
    );
    let made = bp.make().expect("make succeeds");
    let model = instance(instance(&made).get("model").expect("model"));
    assert_eq!(model.get("n_layers"), Some(&Value::Int(8)));
}
