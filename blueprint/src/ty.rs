//! Static type model for blueprint parameters.
//!
//! Types are explicit data, not runtime reflection: nominal classes and
//! typed dicts refer to [`Registry`](crate::registry::Registry) entries by
//! name, and the subtype relation consults the registered base chains.

use crate::registry::Registry;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Static type of a parameter, as declared in a registered schema.
///
/// - [`Ty::Any`] accepts every value and disables polymorphic defaults.
/// - [`Ty::Class`] is a nominal registered class; subtyping follows the
///   registered base chain.
/// - [`Ty::Type`] is the class object itself (a factory result that is a
///   class, not an instance).
/// - [`Ty::Seq`] constructs a tuple; [`Ty::TupleOf`] is the homogeneous
///   `tuple[T, ...]` form, [`Ty::Tuple`] the fixed heterogeneous form.
/// - [`Ty::Generic`] is a class type parameter, resolved during generic
///   factory application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Ty {
    Any,
    Null,
    Bool,
    Int,
    Float,
    Str,
    Class(String),
    Type(Box<Ty>),
    Union(Vec<Ty>),
    List(Box<Ty>),
    Seq(Box<Ty>),
    Tuple(Vec<Ty>),
    TupleOf(Box<Ty>),
    Dict(Box<Ty>, Box<Ty>),
    TypedDict(String),
    Generic(String),
}

impl Ty {
    /// `T | None`.
    pub fn optional(inner: Ty) -> Ty {
        Ty::Union(vec![inner, Ty::Null])
    }

    pub fn class(name: impl Into<String>) -> Ty {
        Ty::Class(name.into())
    }

    pub fn list(elem: Ty) -> Ty {
        Ty::List(Box::new(elem))
    }

    pub fn seq(elem: Ty) -> Ty {
        Ty::Seq(Box::new(elem))
    }

    pub fn tuple_of(elem: Ty) -> Ty {
        Ty::TupleOf(Box::new(elem))
    }

    pub fn dict(key: Ty, value: Ty) -> Ty {
        Ty::Dict(Box::new(key), Box::new(value))
    }

    pub fn type_of(inner: Ty) -> Ty {
        Ty::Type(Box::new(inner))
    }

    /// If this is exactly `U | None`, return `U`.
    pub fn unwrap_optional(&self) -> Option<&Ty> {
        let Ty::Union(members) = self else { return None };
        if members.len() != 2 || !members.contains(&Ty::Null) {
            return None;
        }
        members.iter().find(|m| **m != Ty::Null)
    }

    /// True for types satisfied by numbered/keyed sub-arguments.
    pub fn is_variadic_container(&self) -> bool {
        matches!(
            self,
            Ty::List(_)
                | Ty::Seq(_)
                | Ty::Tuple(_)
                | Ty::TupleOf(_)
                | Ty::Dict(..)
                | Ty::TypedDict(_)
        )
    }

    /// Substitute generic type parameters by name.
    pub(crate) fn substitute(&self, bindings: &[(String, Ty)]) -> Ty {
        match self {
            Ty::Generic(name) => bindings
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, t)| t.clone())
                .unwrap_or_else(|| self.clone()),
            Ty::Type(inner) => Ty::Type(Box::new(inner.substitute(bindings))),
            Ty::Union(ms) => Ty::Union(ms.iter().map(|m| m.substitute(bindings)).collect()),
            Ty::List(t) => Ty::List(Box::new(t.substitute(bindings))),
            Ty::Seq(t) => Ty::Seq(Box::new(t.substitute(bindings))),
            Ty::Tuple(ts) => Ty::Tuple(ts.iter().map(|t| t.substitute(bindings)).collect()),
            Ty::TupleOf(t) => Ty::TupleOf(Box::new(t.substitute(bindings))),
            Ty::Dict(k, v) => Ty::Dict(
                Box::new(k.substitute(bindings)),
                Box::new(v.substitute(bindings)),
            ),
            _ => self.clone(),
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Any => write!(f, "Any"),
            Ty::Null => write!(f, "None"),
            Ty::Bool => write!(f, "bool"),
            Ty::Int => write!(f, "int"),
            Ty::Float => write!(f, "float"),
            Ty::Str => write!(f, "str"),
            Ty::Class(name) | Ty::TypedDict(name) | Ty::Generic(name) => write!(f, "{name}"),
            Ty::Type(inner) => write!(f, "type[{inner}]"),
            Ty::Union(members) => {
                let rendered: Vec<String> = members.iter().map(Ty::to_string).collect();
                write!(f, "{}", rendered.join(" | "))
            }
            Ty::List(t) => write!(f, "list[{t}]"),
            Ty::Seq(t) => write!(f, "Sequence[{t}]"),
            Ty::Tuple(ts) => {
                let rendered: Vec<String> = ts.iter().map(Ty::to_string).collect();
                write!(f, "tuple[{}]", rendered.join(", "))
            }
            Ty::TupleOf(t) => write!(f, "tuple[{t}, ...]"),
            Ty::Dict(k, v) => write!(f, "dict[{k}, {v}]"),
        }
    }
}

/// Returns whether `sub` is accepted where `sup` is expected.
///
/// - `Any` and an expected-side `Generic` accept everything (the sub side
///   being generic does *not* silently pass).
/// - Unions use containment semantics on both sides.
/// - `List`, `Seq` and `TupleOf` are covariant; a list type is also a
///   sequence type, and tuples satisfy sequence/homogeneous-tuple types
///   element-wise.
/// - Nominal classes follow the registered base chain.
pub fn ty_is_subtype(sub: &Ty, sup: &Ty, registry: &Registry) -> bool {
    if matches!(sup, Ty::Any | Ty::Generic(_)) {
        return true;
    }
    if sub == sup {
        return true;
    }
    match (sub, sup) {
        (Ty::Union(members), _) => members.iter().all(|m| ty_is_subtype(m, sup, registry)),
        (_, Ty::Union(members)) => members.iter().any(|m| ty_is_subtype(sub, m, registry)),
        (Ty::Class(a), Ty::Class(b)) => registry.class_is_subclass(a, b),
        (Ty::Type(a), Ty::Type(b)) => ty_is_subtype(a, b, registry),
        (Ty::List(a), Ty::List(b) | Ty::Seq(b)) => ty_is_subtype(a, b, registry),
        (Ty::Seq(a), Ty::Seq(b)) => ty_is_subtype(a, b, registry),
        (Ty::TupleOf(a), Ty::TupleOf(b) | Ty::Seq(b)) => ty_is_subtype(a, b, registry),
        (Ty::Tuple(xs), Ty::Tuple(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .zip(ys.iter())
                    .all(|(x, y)| ty_is_subtype(x, y, registry))
        }
        (Ty::Tuple(xs), Ty::TupleOf(e) | Ty::Seq(e)) => {
            xs.iter().all(|x| ty_is_subtype(x, e, registry))
        }
        (Ty::Dict(ka, va), Ty::Dict(kb, vb)) => {
            ty_is_subtype(ka, kb, registry) && ty_is_subtype(va, vb, registry)
        }
        _ => false,
    }
}
