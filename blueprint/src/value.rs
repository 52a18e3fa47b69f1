//! Runtime values produced by construction.

use crate::registry::Registry;
use crate::ty::Ty;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A constructed value. Opaque to the argument map; the engine only inspects
/// values to check that they satisfy a parameter's static type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    Dict(IndexMap<String, Value>),
    Instance(Instance),
    /// A class object itself (the result of a `type[T]` factory).
    Type(String),
}

/// An instance of a registered class: the class name plus its constructed
/// fields in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub class: String,
    pub fields: IndexMap<String, Value>,
}

impl Instance {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

impl Value {
    /// Compact single-line rendering used by help output and diagnostics.
    pub fn repr(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(x) => x.to_string(),
            Value::Str(s) => format!("{s:?}"),
            Value::List(items) => {
                let rendered: Vec<String> = items.iter().map(Value::repr).collect();
                format!("[{}]", rendered.join(", "))
            }
            Value::Tuple(items) => {
                let rendered: Vec<String> = items.iter().map(Value::repr).collect();
                format!("({})", rendered.join(", "))
            }
            Value::Dict(map) => {
                let rendered: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{k:?}: {}", v.repr()))
                    .collect();
                format!("{{{}}}", rendered.join(", "))
            }
            Value::Instance(inst) => {
                let rendered: Vec<String> = inst
                    .fields
                    .iter()
                    .map(|(k, v)| format!("{k}={}", v.repr()))
                    .collect();
                format!("{}({})", inst.class, rendered.join(", "))
            }
            Value::Type(class) => format!("type[{class}]"),
        }
    }

    /// A short rendering of the value's runtime type for error messages.
    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "None".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Int(_) => "int".to_string(),
            Value::Float(_) => "float".to_string(),
            Value::Str(_) => "str".to_string(),
            Value::List(_) => "list".to_string(),
            Value::Tuple(_) => "tuple".to_string(),
            Value::Dict(_) => "dict".to_string(),
            Value::Instance(inst) => inst.class.clone(),
            Value::Type(class) => format!("type[{class}]"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repr())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Returns whether `value`'s runtime shape satisfies the static type `ty`.
///
/// Mirrors [`ty_is_subtype`](crate::ty::ty_is_subtype) at the value level:
/// unions accept any member, lists are checked element-wise, instances follow
/// the registered base chain. No implicit numeric widening.
pub fn value_satisfies(value: &Value, ty: &Ty, registry: &Registry) -> bool {
    match (value, ty) {
        (_, Ty::Any | Ty::Generic(_)) => true,
        (_, Ty::Union(members)) => members.iter().any(|m| value_satisfies(value, m, registry)),
        (Value::Null, Ty::Null) => true,
        (Value::Bool(_), Ty::Bool) => true,
        (Value::Int(_), Ty::Int) => true,
        (Value::Float(_), Ty::Float) => true,
        (Value::Str(_), Ty::Str) => true,
        (Value::List(items), Ty::List(t) | Ty::Seq(t)) => {
            items.iter().all(|v| value_satisfies(v, t, registry))
        }
        (Value::Tuple(items), Ty::Seq(t) | Ty::TupleOf(t)) => {
            items.iter().all(|v| value_satisfies(v, t, registry))
        }
        (Value::Tuple(items), Ty::Tuple(ts)) => {
            items.len() == ts.len()
                && items
                    .iter()
                    .zip(ts.iter())
                    .all(|(v, t)| value_satisfies(v, t, registry))
        }
        (Value::Dict(map), Ty::Dict(k, v)) => {
            matches!(**k, Ty::Str | Ty::Any)
                && map.values().all(|x| value_satisfies(x, v, registry))
        }
        (Value::Dict(map), Ty::TypedDict(name)) => {
            let Some(schema) = registry.typed_dict(name) else {
                return false;
            };
            schema
                .keys
                .iter()
                .all(|key| match map.get(&key.name) {
                    Some(v) => value_satisfies(v, &key.ty, registry),
                    None => !key.required,
                })
                && map.keys().all(|k| schema.keys.iter().any(|key| key.name == *k))
        }
        (Value::Instance(inst), Ty::Class(class)) => {
            registry.class_is_subclass(&inst.class, class)
        }
        (Value::Type(class), Ty::Type(inner)) => match &**inner {
            Ty::Class(base) => registry.class_is_subclass(class, base),
            Ty::Any => true,
            _ => false,
        },
        _ => false,
    }
}
