//! Type-aware coercion of castable strings.
//!
//! Scalars use standard parses; containers and typed dicts accept JSON
//! literals with elements cast recursively; `type[T]` targets resolve a
//! registered class name.

use crate::errors::CastError;
use crate::registry::Registry;
use crate::ty::Ty;
use crate::value::Value;
use indexmap::IndexMap;

fn err(value: &str, ty: &Ty) -> CastError {
    CastError(format!("Could not cast {value:?} to {ty}"))
}

/// Try to coerce `value` to `ty`.
pub fn cast(value: &str, ty: &Ty, registry: &Registry) -> Result<Value, CastError> {
    match ty {
        Ty::Str => Ok(Value::Str(value.to_string())),
        Ty::Bool => match value {
            "true" | "True" => Ok(Value::Bool(true)),
            "false" | "False" => Ok(Value::Bool(false)),
            _ => Err(err(value, ty)),
        },
        Ty::Int => value
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| err(value, ty)),
        Ty::Float => value
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| err(value, ty)),
        Ty::Null => match value {
            "None" | "null" => Ok(Value::Null),
            _ => Err(err(value, ty)),
        },
        Ty::Any => Ok(cast_any(value)),
        Ty::Union(members) => {
            for member in members {
                if let Ok(v) = cast(value, member, registry) {
                    return Ok(v);
                }
            }
            Err(err(value, ty))
        }
        Ty::Type(inner) => cast_type_value(value, inner, registry).ok_or_else(|| err(value, ty)),
        Ty::List(..) | Ty::Seq(..) | Ty::Tuple(..) | Ty::TupleOf(..) | Ty::Dict(..)
        | Ty::TypedDict(_) => {
            let json: serde_json::Value =
                serde_json::from_str(value).map_err(|_| err(value, ty))?;
            json_to_value(&json, ty, registry).map_err(|_| err(value, ty))
        }
        Ty::Class(_) | Ty::Generic(_) => Err(err(value, ty)),
    }
}

/// Untyped cast: `null`/booleans/numbers if they parse, else the string.
fn cast_any(value: &str) -> Value {
    match value {
        "None" | "null" => return Value::Null,
        "true" | "True" => return Value::Bool(true),
        "false" | "False" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(i) = value.parse::<i64>() {
        return Value::Int(i);
    }
    if let Ok(x) = value.parse::<f64>() {
        return Value::Float(x);
    }
    Value::Str(value.to_string())
}

/// Resolve a class reference (`Name` or `module:Name`) as a `type[inner]`
/// value, checking the subtype bound.
fn cast_type_value(value: &str, inner: &Ty, registry: &Registry) -> Option<Value> {
    let def = registry.resolve(value)?;
    let Ty::Class(class) = &def.output else {
        return None;
    };
    match inner {
        Ty::Class(base) if registry.class_is_subclass(class, base) => {
            Some(Value::Type(class.clone()))
        }
        Ty::Any => Some(Value::Type(class.clone())),
        _ => None,
    }
}

fn json_to_value(
    json: &serde_json::Value,
    ty: &Ty,
    registry: &Registry,
) -> Result<Value, CastError> {
    let fail = || CastError(format!("JSON value does not fit {ty}"));
    match ty {
        Ty::Any => Ok(json_untyped(json)),
        Ty::Str => json.as_str().map(|s| Value::Str(s.to_string())).ok_or_else(fail),
        Ty::Bool => json.as_bool().map(Value::Bool).ok_or_else(fail),
        Ty::Int => json.as_i64().map(Value::Int).ok_or_else(fail),
        Ty::Float => json.as_f64().map(Value::Float).ok_or_else(fail),
        Ty::Null => json.is_null().then_some(Value::Null).ok_or_else(fail),
        Ty::Union(members) => {
            for member in members {
                if let Ok(v) = json_to_value(json, member, registry) {
                    return Ok(v);
                }
            }
            Err(fail())
        }
        Ty::List(elem) => {
            let items = json.as_array().ok_or_else(fail)?;
            let converted: Result<Vec<Value>, CastError> = items
                .iter()
                .map(|item| json_to_value(item, elem, registry))
                .collect();
            Ok(Value::List(converted?))
        }
        Ty::Seq(elem) | Ty::TupleOf(elem) => {
            let items = json.as_array().ok_or_else(fail)?;
            let converted: Result<Vec<Value>, CastError> = items
                .iter()
                .map(|item| json_to_value(item, elem, registry))
                .collect();
            Ok(Value::Tuple(converted?))
        }
        Ty::Tuple(elems) => {
            let items = json.as_array().ok_or_else(fail)?;
            if items.len() != elems.len() {
                return Err(fail());
            }
            let converted: Result<Vec<Value>, CastError> = items
                .iter()
                .zip(elems.iter())
                .map(|(item, elem)| json_to_value(item, elem, registry))
                .collect();
            Ok(Value::Tuple(converted?))
        }
        Ty::Dict(key, value_ty) => {
            if !matches!(**key, Ty::Str | Ty::Any) {
                return Err(fail());
            }
            let object = json.as_object().ok_or_else(fail)?;
            let mut out = IndexMap::new();
            for (k, v) in object {
                out.insert(k.clone(), json_to_value(v, value_ty, registry)?);
            }
            Ok(Value::Dict(out))
        }
        Ty::TypedDict(name) => {
            let schema = registry
                .typed_dict(name)
                .ok_or_else(|| CastError(format!("unknown typed dict {name:?}")))?;
            let object = json.as_object().ok_or_else(fail)?;
            let mut out = IndexMap::new();
            for key in &schema.keys {
                match object.get(&key.name) {
                    Some(v) => {
                        out.insert(key.name.clone(), json_to_value(v, &key.ty, registry)?);
                    }
                    None if key.required => return Err(fail()),
                    None => {}
                }
            }
            if object.keys().any(|k| !schema.keys.iter().any(|key| key.name == *k)) {
                return Err(fail());
            }
            Ok(Value::Dict(out))
        }
        Ty::Class(_) | Ty::Type(_) | Ty::Generic(_) => Err(fail()),
    }
}

fn json_untyped(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => Value::Str(s.clone()),
        serde_json::Value::Array(items) => Value::List(items.iter().map(json_untyped).collect()),
        serde_json::Value::Object(map) => Value::Dict(
            map.iter()
                .map(|(k, v)| (k.clone(), json_untyped(v)))
                .collect(),
        ),
    }
}
