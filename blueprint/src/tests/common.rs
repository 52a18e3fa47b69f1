use crate::registry::{ClassDef, FieldDef, FunctionDef, Registry, SigParam};
use crate::ty::Ty;
use crate::value::{Instance, Value};
use indexmap::IndexMap;
use std::sync::Arc;

/// `test:Main` with two string fields, the smallest useful target.
pub fn simple_registry() -> Arc<Registry> {
    let mut registry = Registry::new();
    registry.add_class(
        ClassDef::new("test", "Main")
            .field(FieldDef::new("a", Ty::Str))
            .field(FieldDef::new("b", Ty::Str)),
    );
    Arc::new(registry)
}

/// A small model zoo: `Model` with subclasses `Transformer` and `Mlp`, and
/// an `Experiment` holding one.
pub fn ml_registry() -> Arc<Registry> {
    let mut registry = Registry::new();
    registry.add_class(ClassDef::new("models", "Model"));
    registry.add_class(
        ClassDef::new("models", "Transformer")
            .base("Model")
            .field(FieldDef::new("n_layers", Ty::Int).default_value(2))
            .field(FieldDef::new("d_model", Ty::Int).default_value(512)),
    );
    registry.add_class(
        ClassDef::new("models", "Mlp")
            .base("Model")
            .field(FieldDef::new("hidden", Ty::Int).default_value(64)),
    );
    registry.add_class(
        ClassDef::new("exp", "Experiment").field(FieldDef::new("model", Ty::class("Model"))),
    );
    registry.add_function(
        FunctionDef::new("data", "wikipedia_text", Ty::class("Dataset"), |kwargs| {
            Ok(Value::Instance(Instance {
                class: "Dataset".to_string(),
                fields: kwargs.clone(),
            }))
        })
        .param(SigParam::new("seed", Ty::Int)),
    );
    registry.add_class(ClassDef::new("data", "Dataset"));
    Arc::new(registry)
}

pub fn instance(value: &Value) -> &Instance {
    let Value::Instance(instance) = value else {
        panic!("expected an instance, got {value:?}");
    };
    instance
}

pub fn fields(pairs: &[(&str, Value)]) -> IndexMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}
