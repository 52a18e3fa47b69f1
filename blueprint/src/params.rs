//! Parameter collection: turning a factory into its parameter list.
//!
//! Field-schema targets iterate their declared fields; signature targets
//! reflect their registered signature; container factories synthesize
//! variadic parameters from the sub-paths actually present in the argument
//! map.

use crate::argmap::ArgumentMap;
use crate::errors::{BlueprintError, CastError};
use crate::factories::{MetaFactory, Standard, factory_for_instantiable};
use crate::registry::{
    CastFn, Factory, MetaSpec, ParamDefault, ParamKind, ParamSpec, Registry,
};
use crate::ty::Ty;
use crate::value::Value;
use indexmap::IndexSet;
use std::sync::Arc;

/// A parameter discovered during the construction walk.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: Ty,
    pub meta_factory: Option<Arc<dyn MetaFactory>>,
    pub default: Option<ParamDefault>,
    pub doc: String,
    pub cast: Option<CastFn>,
}

impl Param {
    /// Coerce a castable string for this parameter.
    ///
    /// A field-level cast always wins; otherwise casting routes through the
    /// meta-factory so results line up with polymorphic construction.
    pub fn cast_value(&self, value: &str, registry: &Registry) -> Result<Value, CastError> {
        if let Some(cast_fn) = &self.cast {
            return (cast_fn.0)(value);
        }
        if let Some(meta) = &self.meta_factory {
            return meta.perform_cast(value, &self.ty, registry);
        }
        crate::cast::cast(value, &self.ty, registry)
    }
}

/// A parameter-collection failure at one level of the walk.
///
/// Soft by design: an unspecified-factory probe swallows it and falls back
/// to default/missing handling, while a user-named factory surfaces it as a
/// [`BlueprintError::Construction`].
#[derive(Debug, Clone)]
pub(crate) struct CollectFailure(pub String);

impl CollectFailure {
    pub(crate) fn into_error(self) -> BlueprintError {
        BlueprintError::Construction(self.0)
    }
}

fn standard_meta(ty: &Ty, default_module: Option<&str>) -> Arc<dyn MetaFactory> {
    let mut standard = Standard::new(ty.clone());
    if let Some(module) = default_module {
        standard = standard.with_default_module(module);
    }
    Arc::new(standard)
}

/// Extract the parameter list of `factory`, without variadic synthesis.
pub(crate) fn collect_params(
    factory: &Factory,
    registry: &Registry,
) -> Result<Vec<Param>, CollectFailure> {
    let def = match factory {
        Factory::Target(def) => def,
        // Containers have no fixed parameter list; the variadic path owns them.
        Factory::Container(ty) => {
            return Err(CollectFailure(format!(
                "Could not collect parameters to construct {ty}"
            )));
        }
        Factory::TypeValue(_) | Factory::NullValue => return Ok(Vec::new()),
    };

    match &def.params {
        ParamSpec::Fields(fields) => Ok(fields
            .iter()
            .map(|field| Param {
                name: field.name.clone(),
                ty: field.ty.clone(),
                meta_factory: match &field.meta {
                    MetaSpec::Auto => Some(standard_meta(&field.ty, Some(&def.module))),
                    MetaSpec::Disabled => None,
                    MetaSpec::Custom(meta) => Some(meta.clone()),
                },
                default: field.default.clone(),
                doc: field.doc.clone(),
                cast: field.cast.clone(),
            })
            .collect()),
        ParamSpec::Signature(sig) => {
            let mut params = Vec::new();
            for (i, sigparam) in sig.iter().enumerate() {
                match sigparam.kind {
                    ParamKind::PositionalOnly => {
                        if sigparam.default.is_none() {
                            return Err(CollectFailure(format!(
                                "Cannot construct {} because it has positional-only parameter {} without a default",
                                def.name, sigparam.name
                            )));
                        }
                        // Defaulted positional-only params are unreachable by
                        // name; they fall back to their own default.
                        continue;
                    }
                    ParamKind::VarPositional => {
                        return Err(CollectFailure(format!(
                            "Cannot collect parameters from {} due to *args parameter {}",
                            def.name, sigparam.name
                        )));
                    }
                    ParamKind::VarKeyword => {
                        let Some(Ty::TypedDict(dict_name)) = &sigparam.ty else {
                            return Err(CollectFailure(format!(
                                "Cannot collect parameters from {} due to **kwargs parameter {}",
                                def.name, sigparam.name
                            )));
                        };
                        let Some(schema) = registry.typed_dict(dict_name) else {
                            return Err(CollectFailure(format!(
                                "Cannot collect parameters from {}, unknown typed dict {dict_name:?}",
                                def.name
                            )));
                        };
                        for key in &schema.keys {
                            params.push(Param {
                                name: key.name.clone(),
                                ty: key.ty.clone(),
                                meta_factory: Some(standard_meta(&key.ty, None)),
                                default: (!key.required).then_some(ParamDefault::NotRequired),
                                doc: String::new(),
                                cast: None,
                            });
                        }
                        continue;
                    }
                    ParamKind::Positional | ParamKind::KeywordOnly => {}
                }

                // An unannotated first parameter of a method-style target
                // defaults to the owning class.
                let ty = match (&sigparam.ty, i, &def.owner) {
                    (Some(ty), ..) => ty.clone(),
                    (None, 0, Some(owner)) => Ty::Class(owner.clone()),
                    _ => Ty::Any,
                };
                params.push(Param {
                    name: sigparam.name.clone(),
                    ty: ty.clone(),
                    meta_factory: Some(standard_meta(&ty, None)),
                    default: sigparam.default.clone().map(ParamDefault::Value),
                    doc: String::new(),
                    cast: None,
                });
            }
            Ok(params)
        }
    }
}

/// Result of variadic synthesis: the synthesized parameter list, the
/// constructor to thunk, and the declared element types (used by the
/// wildcard-vs-default audit).
pub(crate) struct Variadic {
    pub params: Vec<Param>,
    pub ctor: Factory,
    pub element_types: Vec<Ty>,
}

/// Synthesize variadic parameters for a container factory from the sub-paths
/// observed in the argument map. `Ok(None)` means the factory is not a
/// variadic container; structural misuse is a hard error.
pub(crate) fn collect_variadic(
    factory: &Factory,
    path: &str,
    arg_map: &ArgumentMap,
    registry: &Registry,
) -> Result<Option<Variadic>, BlueprintError> {
    let Factory::Container(ty) = factory else {
        return Ok(None);
    };

    let mut elements: IndexSet<String> = IndexSet::new();
    for subpath in arg_map.subpaths(path, true) {
        if let Some(element) = subpath.split('.').nth(1) {
            if !element.is_empty() {
                elements.insert(element.to_string());
            }
        }
    }

    let synthesized = |name: &str, elem_ty: &Ty| Param {
        name: name.to_string(),
        ty: elem_ty.clone(),
        meta_factory: Some(standard_meta(elem_ty, None)),
        default: None,
        doc: String::new(),
        cast: None,
    };

    match ty {
        Ty::List(elem) | Ty::Seq(elem) | Ty::TupleOf(elem) => {
            let max = parse_indices(&elements, ty)?;
            let params = (0..max.map_or(0, |m| m + 1))
                .map(|i| synthesized(&i.to_string(), elem))
                .collect();
            Ok(Some(Variadic {
                params,
                ctor: factory.clone(),
                element_types: vec![(**elem).clone()],
            }))
        }
        Ty::Tuple(elems) => {
            let max = parse_indices(&elements, ty)?;
            if let Some(max) = max {
                if max >= elems.len() {
                    let mut message = format!(
                        "Tuple type {ty} must take {} items; arguments for index {max} were specified",
                        elems.len()
                    );
                    if elems.len() == 1 {
                        message.push_str(&format!(
                            ". Homogeneous tuples should be typed as tuple[{}, ...] not tuple[{}]",
                            elems[0], elems[0]
                        ));
                    }
                    return Err(BlueprintError::Construction(message));
                }
            }
            let params = (0..max.map_or(0, |m| m + 1))
                .map(|i| synthesized(&i.to_string(), &elems[i]))
                .collect();
            Ok(Some(Variadic {
                params,
                ctor: factory.clone(),
                element_types: elems.clone(),
            }))
        }
        Ty::Dict(key, value) => {
            if !matches!(**key, Ty::Str | Ty::Any) {
                if !elements.is_empty() {
                    return Err(BlueprintError::Construction(format!(
                        "Variadic dict type must take str keys, not {key}"
                    )));
                }
                return Ok(None);
            }
            let params = elements
                .iter()
                .map(|element| synthesized(element, value))
                .collect();
            Ok(Some(Variadic {
                params,
                ctor: factory.clone(),
                element_types: vec![(**value).clone()],
            }))
        }
        Ty::TypedDict(name) => {
            let Some(schema) = registry.typed_dict(name) else {
                return Err(BlueprintError::Construction(format!(
                    "Unknown typed dict {name:?}"
                )));
            };
            let mut params = Vec::new();
            let mut element_types = Vec::new();
            for dict_key in &schema.keys {
                let mut param = synthesized(&dict_key.name, &dict_key.ty);
                if !dict_key.required {
                    param.default = Some(ParamDefault::NotRequired);
                }
                params.push(param);
                element_types.push(dict_key.ty.clone());
            }
            Ok(Some(Variadic {
                params,
                ctor: factory.clone(),
                element_types,
            }))
        }
        _ => Ok(None),
    }
}

/// Parse observed elements as sequence indices; returns the largest index.
fn parse_indices(elements: &IndexSet<String>, ty: &Ty) -> Result<Option<usize>, BlueprintError> {
    let mut max: Option<usize> = None;
    for element in elements {
        let Ok(index) = element.parse::<usize>() else {
            return Err(BlueprintError::Construction(format!(
                "Sequence type {ty} takes integer indices, got {element:?}"
            )));
        };
        max = Some(max.map_or(index, |m| m.max(index)));
    }
    Ok(max)
}

/// Element-type parameters used by the wildcard-vs-default audit: collect
/// the params a synthesized element would have, ignoring failures.
pub(crate) fn element_params(ty: &Ty, registry: &Registry) -> Option<Vec<Param>> {
    let factory = factory_for_instantiable(ty, registry)?;
    collect_params(&factory, registry).ok()
}
