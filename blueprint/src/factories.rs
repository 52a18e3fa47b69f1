//! Meta-factories: the policy objects behind polymorphic construction.
//!
//! A meta-factory represents a set of possible factories for a parameter's
//! static type. When a blueprint constructs a value it lets you specify not
//! only the arguments but the factory to produce it: a parameter of type
//! `Model` can be satisfied by any registered subclass of `Model`, selected
//! by name from the argument map.
//!
//! All resolution happens against the [`Registry`]; there is no import
//! machinery, so `module:Name` references and bare-name subclass search are
//! the whole vocabulary.

use crate::cast::cast;
use crate::errors::{CastError, MetaFromString};
use crate::registry::{Factory, ParamSpec, Registry, TargetDef, TypeParam};
use crate::ty::{Ty, ty_is_subtype};
use crate::value::Value;
use regex::Regex;
use std::fmt;
use std::sync::{Arc, LazyLock};

/// Policy mapping a parameter's static type to factories and casts.
pub trait MetaFactory: fmt::Debug + Send + Sync {
    /// The default callable used when no factory is named.
    ///
    /// `None` means there is no default: to construct a value of the
    /// expected type, the user must name a factory explicitly.
    fn unspecified_factory(&self, registry: &Registry) -> Option<Factory>;

    /// Resolve a user-supplied string to a factory.
    fn from_string(&self, factory: &str, registry: &Registry) -> Result<Factory, MetaFromString>;

    /// Try to coerce a string to a value of the expected type.
    fn perform_cast(
        &self,
        value: &str,
        default_target: &Ty,
        registry: &Registry,
    ) -> Result<Value, CastError>;
}

static FACTORY_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<base>[^\s\[\]]+)(?:\[(?P<generic>.+)\])?$")
        .expect("factory reference pattern always compiles")
});

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

fn lookup_in_module(
    module: &str,
    name: &str,
    registry: &Registry,
) -> Result<Arc<TargetDef>, MetaFromString> {
    if !registry.has_module(module) {
        return Err(MetaFromString(format!("Could not find module {module:?}")));
    }
    registry.lookup_qualified(module, name).ok_or_else(|| {
        MetaFromString(format!("No attribute named {name:?} in module {module}"))
    })
}

/// Resolve a factory reference against the subtype lattice.
///
/// `module:Name` resolves through the registry's qualified table; a bare
/// `Name` searches the lattice rooted at `base` (including `base` itself);
/// `Name[Arg, ...]` additionally applies generic arguments. With no base
/// (an `Any`-typed parameter) only qualified references can resolve.
pub(crate) fn find_subclass(
    spec: &str,
    base: Option<&str>,
    registry: &Registry,
) -> Result<Factory, MetaFromString> {
    let (mut module, var) = match spec.split_once(':') {
        Some((m, v)) => (Some(m.to_string()), v.to_string()),
        None => (None, spec.to_string()),
    };

    let Some(caps) = FACTORY_REF.captures(&var) else {
        return Err(MetaFromString(format!(
            "Failed to parse {spec:?} as a class name"
        )));
    };
    let mut name = caps
        .name("base")
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    let generic = caps.name("generic").map(|m| m.as_str().to_string());

    if module.is_none() && !is_identifier(&name) {
        if let Some((m, n)) = name.rsplit_once('.') {
            module = Some(m.to_string());
            name = n.to_string();
        }
        if !is_identifier(&name) {
            let base_repr = base.unwrap_or("Any");
            return Err(MetaFromString(format!(
                "No subclass of {base_repr} named {name:?} (invalid identifier)"
            )));
        }
    }

    if let Some(module) = module {
        let def = lookup_in_module(&module, &name, registry)?;
        return maybe_generic(def, generic.as_deref(), registry);
    }

    let Some(base) = base else {
        return Err(MetaFromString(format!(
            "Could not find {spec:?}, try a fully qualified name e.g. module_name:{spec}"
        )));
    };
    match registry.find_subclass_named(base, &name) {
        Some(def) => maybe_generic(def, generic.as_deref(), registry),
        None => Err(MetaFromString(format!(
            "No subclass of {base} named {name:?}"
        ))),
    }
}

/// Apply a generic argument string (`A, mod:B, ...`) to a resolved target.
fn maybe_generic(
    def: Arc<TargetDef>,
    generic: Option<&str>,
    registry: &Registry,
) -> Result<Factory, MetaFromString> {
    let Some(generic) = generic else {
        return Ok(Factory::Target(def));
    };

    let arg_strs: Vec<&str> = generic.split(',').map(str::trim).collect();
    if arg_strs.len() != def.type_params.len() {
        return Err(MetaFromString(format!(
            "{} takes {} type parameter(s); got {}",
            def.qualified_name(),
            def.type_params.len(),
            arg_strs.len()
        )));
    }

    let mut args = Vec::with_capacity(arg_strs.len());
    for (arg, param) in arg_strs.iter().zip(def.type_params.iter()) {
        args.push(resolve_generic_arg(arg, param, registry)?);
    }
    Ok(Factory::Target(specialize(&def, &args)))
}

fn resolve_generic_arg(
    arg: &str,
    param: &TypeParam,
    registry: &Registry,
) -> Result<Ty, MetaFromString> {
    let resolved = if arg.contains(':') {
        find_subclass(arg, None, registry)?
    } else {
        match &param.bound {
            Some(Ty::Class(bound)) => find_subclass(arg, Some(bound), registry)?,
            _ => registry
                .class_def(arg)
                .map(Factory::Target)
                .ok_or_else(|| {
                    MetaFromString(format!("No registered class named {arg:?}"))
                })?,
        }
    };
    match resolved {
        Factory::Target(def) => Ok(def.output.clone()),
        other => Ok(other.output()),
    }
}

/// Substitute generic type parameters through a target's schema.
fn specialize(def: &Arc<TargetDef>, args: &[Ty]) -> Arc<TargetDef> {
    let bindings: Vec<(String, Ty)> = def
        .type_params
        .iter()
        .zip(args.iter())
        .map(|(p, a)| (p.name.clone(), a.clone()))
        .collect();

    let mut specialized = (**def).clone();
    let rendered: Vec<String> = args.iter().map(Ty::to_string).collect();
    specialized.name = format!("{}[{}]", def.name, rendered.join(", "));
    specialized.type_params = Vec::new();
    specialized.params = match &def.params {
        ParamSpec::Fields(fields) => ParamSpec::Fields(
            fields
                .iter()
                .map(|f| {
                    let mut f = f.clone();
                    f.ty = f.ty.substitute(&bindings);
                    f
                })
                .collect(),
        ),
        ParamSpec::Signature(params) => ParamSpec::Signature(
            params
                .iter()
                .map(|p| {
                    let mut p = p.clone();
                    p.ty = p.ty.map(|t| t.substitute(&bindings));
                    p
                })
                .collect(),
        ),
    };
    Arc::new(specialized)
}

/// The factory an instantiable annotation names by itself, if any.
///
/// Classes construct through their registered target; containers construct
/// through variadic synthesis; `type[C]` and `None` get zero-argument
/// thunks. Scalars and special forms have no factory.
pub(crate) fn factory_for_instantiable(ty: &Ty, registry: &Registry) -> Option<Factory> {
    match ty {
        Ty::Class(name) => registry.class_def(name).map(Factory::Target),
        Ty::List(_) | Ty::Seq(_) | Ty::Tuple(_) | Ty::TupleOf(_) | Ty::Dict(..)
        | Ty::TypedDict(_) => Some(Factory::Container(ty.clone())),
        Ty::Type(inner) => match &**inner {
            Ty::Class(name) => Some(Factory::TypeValue(name.clone())),
            _ => None,
        },
        Ty::Null => Some(Factory::NullValue),
        _ => None,
    }
}

/// Derive the unspecified factory from a bare annotation.
pub(crate) fn unspecified_from_annotation(ty: &Ty, registry: &Registry) -> Option<Factory> {
    if let Some(inner) = ty.unwrap_optional() {
        return factory_for_instantiable(inner, registry);
    }
    if matches!(ty, Ty::Union(_)) {
        return None;
    }
    factory_for_instantiable(ty, registry)
}

/// Meta-factory for class-typed parameters: any registered subclass of
/// `base` can serve as the factory; `default` is used when nothing is named.
#[derive(Debug, Clone)]
pub struct Subclass {
    base: String,
    default: String,
}

impl Subclass {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            default: base.clone(),
            base,
        }
    }

    pub fn with_default(base: impl Into<String>, default: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            default: default.into(),
        }
    }
}

impl MetaFactory for Subclass {
    fn unspecified_factory(&self, registry: &Registry) -> Option<Factory> {
        registry.class_def(&self.default).map(Factory::Target)
    }

    fn from_string(&self, factory: &str, registry: &Registry) -> Result<Factory, MetaFromString> {
        find_subclass(factory, Some(&self.base), registry)
    }

    fn perform_cast(
        &self,
        value: &str,
        _default_target: &Ty,
        registry: &Registry,
    ) -> Result<Value, CastError> {
        match cast(value, &Ty::Class(self.default.clone()), registry) {
            Ok(v) => Ok(v),
            Err(_) => cast(value, &Ty::Class(self.base.clone()), registry),
        }
    }
}

/// Meta-factory for function-valued parameters: any registered function can
/// serve as the factory.
#[derive(Debug, Clone, Default)]
pub struct FunctionFactory {
    unspecified: Option<Factory>,
    default_module: Option<String>,
}

impl FunctionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unspecified(mut self, factory: Factory) -> Self {
        self.unspecified = Some(factory);
        self
    }

    /// Module used to resolve bare (unqualified) factory names.
    pub fn with_default_module(mut self, module: impl Into<String>) -> Self {
        self.default_module = Some(module.into());
        self
    }
}

impl MetaFactory for FunctionFactory {
    fn unspecified_factory(&self, _registry: &Registry) -> Option<Factory> {
        self.unspecified.clone()
    }

    fn from_string(&self, factory: &str, registry: &Registry) -> Result<Factory, MetaFromString> {
        if let Some((module, name)) = factory.split_once(':') {
            return lookup_in_module(module, name, registry).map(Factory::Target);
        }
        let Some(module) = &self.default_module else {
            return Err(MetaFromString(format!(
                "No module specified in {factory:?} and no default module specified"
            )));
        };
        lookup_in_module(module, factory, registry).map(Factory::Target)
    }

    fn perform_cast(
        &self,
        value: &str,
        default_target: &Ty,
        registry: &Registry,
    ) -> Result<Value, CastError> {
        cast(value, default_target, registry)
    }
}

/// Meta-factory for union-typed parameters.
#[derive(Debug, Clone)]
pub struct UnionFactory {
    type_args: Vec<Ty>,
    default: Option<Ty>,
}

impl UnionFactory {
    /// If `default` is not given and the union is `U | None` with `U`
    /// constructible, `U` becomes the default.
    pub fn new(type_args: Vec<Ty>, default: Option<Ty>) -> Self {
        let default = default.or_else(|| {
            if type_args.len() == 2 && type_args.contains(&Ty::Null) {
                type_args
                    .iter()
                    .find(|t| !matches!(t, Ty::Null) && matches!(t, Ty::Class(_)))
                    .cloned()
            } else {
                None
            }
        });
        Self { type_args, default }
    }
}

impl MetaFactory for UnionFactory {
    fn unspecified_factory(&self, registry: &Registry) -> Option<Factory> {
        self.default
            .as_ref()
            .and_then(|d| factory_for_instantiable(d, registry))
    }

    fn from_string(&self, factory: &str, registry: &Registry) -> Result<Factory, MetaFromString> {
        if let Some(Ty::Class(default)) = &self.default {
            return find_subclass(factory, Some(default), registry);
        }
        for ty in &self.type_args {
            if let Ty::Class(class) = ty {
                if factory == class {
                    return find_subclass(factory, Some(class), registry);
                }
            }
        }
        Err(MetaFromString(format!(
            "Could not produce a union instance from {factory:?}"
        )))
    }

    fn perform_cast(
        &self,
        value: &str,
        _default_target: &Ty,
        registry: &Registry,
    ) -> Result<Value, CastError> {
        // Cast against the whole union, never just an unwrapped optional:
        // "None" must cast to Null even when a default class is set.
        cast(value, &Ty::Union(self.type_args.clone()), registry)
    }
}

/// Meta-factory for `type[Base]` parameters: the constructed value is the
/// class itself, not an instance.
#[derive(Debug, Clone)]
pub struct TypeSubclass {
    base: String,
    default: String,
}

impl TypeSubclass {
    /// # Panics
    /// Panics unless `base_type` (and `default_type`, when given) have the
    /// shape `type[Class]`.
    pub fn new(base_type: &Ty, default_type: Option<&Ty>) -> Self {
        fn class_of(ty: &Ty) -> &str {
            let Ty::Type(inner) = ty else {
                panic!("TypeSubclass expects a type[Class] annotation, got {ty}");
            };
            let Ty::Class(name) = &**inner else {
                panic!("TypeSubclass expects a type[Class] annotation, got {ty}");
            };
            name
        }
        let base = class_of(base_type).to_string();
        let default = default_type.map_or_else(|| base.clone(), |t| class_of(t).to_string());
        Self { base, default }
    }
}

impl MetaFactory for TypeSubclass {
    fn unspecified_factory(&self, _registry: &Registry) -> Option<Factory> {
        Some(Factory::TypeValue(self.default.clone()))
    }

    fn from_string(&self, factory: &str, registry: &Registry) -> Result<Factory, MetaFromString> {
        match find_subclass(factory, Some(&self.base), registry)? {
            Factory::Target(def) => Ok(Factory::TypeValue(def.name.clone())),
            other => Ok(other),
        }
    }

    fn perform_cast(
        &self,
        value: &str,
        _default_target: &Ty,
        registry: &Registry,
    ) -> Result<Value, CastError> {
        let default_ty = Ty::type_of(Ty::Class(self.default.clone()));
        match cast(value, &default_ty, registry) {
            Ok(v) => Ok(v),
            Err(_) => cast(value, &Ty::type_of(Ty::Class(self.base.clone())), registry),
        }
    }
}

/// The default meta-factory, auto-chosen from the annotation.
#[derive(Debug, Clone)]
pub struct Standard {
    annotation: Ty,
    unspecified: Option<Factory>,
    default_module: Option<String>,
}

impl Standard {
    pub fn new(annotation: Ty) -> Self {
        Self {
            annotation,
            unspecified: None,
            default_module: None,
        }
    }

    pub fn with_unspecified(mut self, factory: Factory) -> Self {
        self.unspecified = Some(factory);
        self
    }

    pub fn with_default_module(mut self, module: impl Into<String>) -> Self {
        self.default_module = Some(module.into());
        self
    }

    fn from_string_bare(
        &self,
        factory: &str,
        registry: &Registry,
    ) -> Result<Factory, MetaFromString> {
        match &self.annotation {
            Ty::Any => find_subclass(factory, None, registry),
            Ty::Type(inner) => {
                let base = match &**inner {
                    Ty::Class(name) => name.clone(),
                    other => {
                        return Err(MetaFromString(format!(
                            "Could not produce a type[{other}] instance from {factory:?}"
                        )));
                    }
                };
                match find_subclass(factory, Some(&base), registry)? {
                    Factory::Target(def) => Ok(Factory::TypeValue(def.name.clone())),
                    other => Ok(other),
                }
            }
            Ty::Union(members) => {
                if let Some(Factory::Target(def)) = &self.unspecified {
                    if let Ty::Class(class) = &def.output {
                        if let Ok(found) = find_subclass(factory, Some(class), registry) {
                            return Ok(found);
                        }
                    }
                }
                for member in members {
                    if let Ty::Class(class) = member {
                        if let Ok(found) = find_subclass(factory, Some(class), registry) {
                            return Ok(found);
                        }
                    }
                }
                if members.contains(&Ty::Null) && factory == "None" {
                    return Ok(Factory::NullValue);
                }
                Err(MetaFromString(format!(
                    "Could not produce a union instance from {factory:?}"
                )))
            }
            Ty::Class(class) => find_subclass(factory, Some(class), registry),
            Ty::Null if factory == "None" => Ok(Factory::NullValue),
            other => Err(MetaFromString(format!(
                "Could not produce a {other} instance from {factory:?}"
            ))),
        }
    }
}

impl MetaFactory for Standard {
    fn unspecified_factory(&self, registry: &Registry) -> Option<Factory> {
        if let Some(explicit) = &self.unspecified {
            return Some(explicit.clone());
        }
        unspecified_from_annotation(&self.annotation, registry)
    }

    fn from_string(&self, factory: &str, registry: &Registry) -> Result<Factory, MetaFromString> {
        // Qualified references resolve directly, then get checked against
        // the annotation.
        if let Some((module, var)) = factory.split_once(':') {
            let Some(caps) = FACTORY_REF.captures(var) else {
                return Err(MetaFromString(format!(
                    "Failed to parse {factory:?} as a class name"
                )));
            };
            let name = caps.name("base").map(|m| m.as_str()).unwrap_or_default();
            let generic = caps.name("generic").map(|m| m.as_str());
            let def = lookup_in_module(module, name, registry)?;
            let resolved = maybe_generic(def, generic, registry)?;
            if !matches!(self.annotation, Ty::Any)
                && !ty_is_subtype(&resolved.output(), &self.annotation, registry)
            {
                return Err(MetaFromString(format!(
                    "Expected {} from {factory:?} to be a subtype of {}",
                    resolved.qualified_name(),
                    self.annotation
                )));
            }
            return Ok(resolved);
        }

        match self.from_string_bare(factory, registry) {
            Ok(resolved) => Ok(resolved),
            Err(e) => {
                // Fall back to the default module before surfacing the error.
                if let Some(module) = &self.default_module {
                    if let Ok(def) = lookup_in_module(module, factory, registry) {
                        let resolved = Factory::Target(def);
                        if matches!(self.annotation, Ty::Any)
                            || ty_is_subtype(&resolved.output(), &self.annotation, registry)
                        {
                            return Ok(resolved);
                        }
                    }
                }
                Err(e)
            }
        }
    }

    fn perform_cast(
        &self,
        value: &str,
        _default_target: &Ty,
        registry: &Registry,
    ) -> Result<Value, CastError> {
        if let Some(Factory::Target(def)) = &self.unspecified {
            if let Ok(v) = cast(value, &def.output, registry) {
                return Ok(v);
            }
        }
        cast(value, &self.annotation, registry)
    }
}
