//! The blueprint surface and the construction walk.
//!
//! A [`Blueprint`] binds a target factory to an ordered stack of argument
//! layers. `make` runs the construction walk, audits the argument map, and
//! evaluates the resulting lazy graph.

use crate::argmap::{Arg, ArgumentMap, Layer};
use crate::argv::argv_to_args;
use crate::errors::BlueprintError;
use crate::lazy::{Evaluatable, Thunk, ValueMap, check_reference_targets, evaluate};
use crate::params::{CollectFailure, Param, collect_params, collect_variadic, element_params};
use crate::registry::{Factory, ParamDefault, Registry};
use crate::ty::ty_is_subtype;
use crate::value::{Value, value_satisfies};
use indexmap::{IndexMap, IndexSet};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;

/// A binding of a construction target together with an ordered stack of
/// argument layers.
#[derive(Debug, Clone)]
pub struct Blueprint {
    target: Factory,
    registry: Arc<Registry>,
    arg_map: ArgumentMap,
}

/// Diagnostic side channels populated by one construction walk.
#[derive(Debug, Default)]
struct WalkState {
    all_params: IndexMap<String, Param>,
    used_args: HashSet<(String, usize)>,
    meta_factory_value: IndexMap<String, Factory>,
    missing_params: Vec<String>,
}

/// The lazy result of a construction walk, before audits and evaluation.
#[derive(Debug)]
pub(crate) struct MakeResult {
    pub(crate) value_mapping: ValueMap,
    pub(crate) all_params: IndexMap<String, Param>,
    pub(crate) used_args: HashSet<(String, usize)>,
    pub(crate) meta_factory_value: IndexMap<String, Factory>,
    pub(crate) missing_params: Vec<String>,
}

impl Blueprint {
    /// Create a blueprint over an explicit factory.
    pub fn new(registry: Arc<Registry>, target: Factory) -> Self {
        Self {
            target,
            registry,
            arg_map: ArgumentMap::new(),
        }
    }

    /// Create a blueprint over a registered target, referenced as
    /// `module:Name` or a unique bare name.
    pub fn for_target(
        registry: Arc<Registry>,
        reference: &str,
    ) -> Result<Self, BlueprintError> {
        let Some(def) = registry.resolve(reference) else {
            return Err(BlueprintError::Construction(format!(
                "No registered target named {reference:?}"
            )));
        };
        Ok(Self::new(registry, Factory::Target(def)))
    }

    pub fn target(&self) -> &Factory {
        &self.target
    }

    fn target_repr(&self) -> String {
        self.target.qualified_name()
    }

    /// Push a layer of bindings.
    pub fn apply<K: Into<String>>(
        &mut self,
        args: impl IntoIterator<Item = (K, Arg)>,
        layer_name: Option<&str>,
    ) -> &mut Self {
        self.arg_map.add_layer(Layer::new(args, layer_name));
        self
    }

    /// Append another blueprint's layers; the targets must be identical.
    pub fn apply_blueprint(&mut self, other: &Blueprint) -> Result<&mut Self, BlueprintError> {
        if other.target != self.target {
            return Err(BlueprintError::InvalidArg(format!(
                "Cannot apply Blueprint for {} to Blueprint for {}",
                other.target_repr(),
                self.target_repr()
            )));
        }
        for layer in other.arg_map.layers() {
            self.arg_map.add_layer(layer.clone());
        }
        Ok(self)
    }

    /// Parse argv tokens into a layer and push it.
    ///
    /// A `--help` token raises [`BlueprintError::Help`] carrying the help
    /// text for the blueprint with the remaining tokens applied.
    pub fn apply_from_argv(
        &mut self,
        argv: &[impl AsRef<str>],
        allow_hyphens: bool,
        layer_name: Option<&str>,
    ) -> Result<&mut Self, BlueprintError> {
        let mut help = false;
        let mut tokens: Vec<&str> = Vec::with_capacity(argv.len());
        for token in argv {
            let token = token.as_ref();
            if token == "--help" {
                help = true;
            } else {
                tokens.push(token);
            }
        }
        let args = argv_to_args(&tokens, allow_hyphens)?;
        self.apply(args, Some(layer_name.unwrap_or("command line")));
        if help {
            return Err(BlueprintError::Help(self.get_help()?));
        }
        Ok(self)
    }

    pub(crate) fn make_lazy(&self) -> Result<MakeResult, BlueprintError> {
        tracing::debug!(entry_point = %self.target_repr(), "constructing blueprint");
        let mut state = WalkState::default();
        let value_mapping =
            construct_target(&self.target, "", &self.arg_map, &self.registry, &mut state)?
                .map_err(CollectFailure::into_error)?;
        Ok(MakeResult {
            value_mapping,
            all_params: state.all_params,
            used_args: state.used_args,
            meta_factory_value: state.meta_factory_value,
            missing_params: state.missing_params,
        })
    }

    /// Audit the argument map and evaluate the target.
    ///
    /// Extraneous arguments are reported before missing ones so typos do
    /// not masquerade as missing arguments.
    pub fn make(&self) -> Result<Value, BlueprintError> {
        let r = self.make_lazy()?;
        let param_paths: IndexSet<String> = r.all_params.keys().cloned().collect();
        self.arg_map
            .check_extraneous(&r.used_args, &param_paths, &self.target_repr())?;
        check_reference_targets(&r.value_mapping, &param_paths)?;
        if !r.missing_params.is_empty() {
            return Err(BlueprintError::MissingArg(format!(
                "Missing required arguments for parameter(s): {}",
                r.missing_params.join(", ")
            )));
        }
        let mut value_mapping = r.value_mapping;
        evaluate(&mut value_mapping, &self.registry)
    }

    /// Apply argv then make.
    pub fn make_from_argv(
        &mut self,
        argv: &[impl AsRef<str>],
        allow_hyphens: bool,
    ) -> Result<Value, BlueprintError> {
        self.apply_from_argv(argv, allow_hyphens, None)?;
        self.make()
    }

    /// Render tabular help for every discovered parameter.
    ///
    /// Applied arguments affect the output (polymorphically constructed
    /// fields change the parameter tree). Extraneous, invalid-reference and
    /// missing findings become inline warnings, never errors.
    pub fn get_help(&self) -> Result<String, BlueprintError> {
        let r = self.make_lazy()?;
        let param_paths: IndexSet<String> = r.all_params.keys().cloned().collect();

        let mut out = String::new();
        if let Err(e) =
            self.arg_map
                .check_extraneous(&r.used_args, &param_paths, &self.target_repr())
        {
            let _ = writeln!(out, "WARNING: {e}\n");
        }
        if let Err(e) = check_reference_targets(&r.value_mapping, &param_paths) {
            let _ = writeln!(out, "WARNING: {e}\n");
        }
        if !r.missing_params.is_empty() {
            let _ = writeln!(
                out,
                "WARNING: Missing required arguments for parameter(s): {}\n",
                r.missing_params.join(", ")
            );
        }

        let _ = writeln!(out, "Entry point: {}", self.target_repr());
        let _ = writeln!(out);
        let doc = match &self.target {
            Factory::Target(def) => def.doc.clone(),
            _ => String::new(),
        };
        if !doc.is_empty() {
            for line in doc.lines() {
                let _ = writeln!(out, "  {line}");
            }
            let _ = writeln!(out);
        }

        let mut rows: Vec<[String; 4]> = Vec::with_capacity(r.all_params.len());
        for (param_path, param) in &r.all_params {
            let found = self.arg_map.get(param_path);
            let arg_str = match found {
                None => {
                    if let Some(factory) = r.meta_factory_value.get(param_path) {
                        format!("{} (meta_factory)", factory.qualified_name())
                    } else if let Some(default) = &param.default {
                        format!("{} (default)", default.to_help_str())
                    } else {
                        "-".to_string()
                    }
                }
                Some(found) => {
                    let mut rendered = match found.value {
                        Arg::Castable(s) => s.clone(),
                        Arg::Reference(target) => format!("@={target}"),
                        Arg::Value(v) => v.repr(),
                        Arg::Factory(f) => f.qualified_name(),
                    };
                    if let Some(layer_name) = found.layer_name {
                        rendered.push_str(&format!(" (from {layer_name})"));
                    }
                    rendered
                }
            };
            rows.push([
                param_path.clone(),
                param.ty.to_string(),
                arg_str,
                param.doc.clone(),
            ]);
        }

        // Columns are padded to at most 40 characters; longer cells overflow
        // to the next 20-aligned column.
        const CLIP: usize = 40;
        let mut widths = [0usize; 3];
        for row in &rows {
            for (i, width) in widths.iter_mut().enumerate() {
                *width = (*width).max(row[i].len()).min(CLIP);
            }
        }

        fn pad(s: &str, width: usize) -> String {
            if s.len() <= width {
                format!("{s:<width$}")
            } else {
                let target = s.len() + (20 - s.len() % 20) % 20;
                format!("{s:<target$}")
            }
        }

        let _ = writeln!(out, "Arguments:");
        for [path, ty, arg, doc] in &rows {
            let line = format!(
                "  {}  {}  {}  {doc}",
                pad(path, widths[0]),
                pad(ty, widths[1]),
                pad(arg, widths[2])
            );
            let _ = writeln!(out, "{}", line.trim_end());
        }
        Ok(out)
    }
}

fn join_path(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{path}.{name}")
    }
}

/// Recursively bind the parameters of `factory` at `path`.
///
/// The outer `Result` carries hard errors; the inner one carries a soft
/// parameter-collection failure, which unspecified-factory probes swallow
/// and user-named factories escalate.
fn construct_target(
    factory: &Factory,
    path: &str,
    arg_map: &ArgumentMap,
    registry: &Registry,
    state: &mut WalkState,
) -> Result<Result<ValueMap, CollectFailure>, BlueprintError> {
    let (params, ctor) = match collect_params(factory, registry) {
        Ok(params) => (params, factory.clone()),
        Err(failure) => match collect_variadic(factory, path, arg_map, registry)? {
            Some(variadic) => (variadic.params, variadic.ctor),
            None => return Ok(Err(failure)),
        },
    };

    let mut kwargs: IndexMap<String, String> = IndexMap::new();
    let mut value_mapping = ValueMap::new();
    for param in &params {
        if let Some((param_path, sub_mapping)) =
            construct_arg(param, path, arg_map, registry, state)?
        {
            value_mapping.extend(sub_mapping);
            kwargs.insert(param.name.clone(), param_path);
        }
    }
    value_mapping.insert(
        path.to_string(),
        Evaluatable::Thunk(Thunk {
            factory: ctor,
            kwargs,
        }),
    );
    Ok(Ok(value_mapping))
}

/// Bind one parameter; `None` means nothing is passed and the constructor's
/// own default applies.
fn construct_arg(
    param: &Param,
    obj_path: &str,
    arg_map: &ArgumentMap,
    registry: &Registry,
    state: &mut WalkState,
) -> Result<Option<(String, ValueMap)>, BlueprintError> {
    let param_path = join_path(obj_path, &param.name);
    state.all_params.insert(param_path.clone(), param.clone());

    let Some(found) = arg_map.get(&param_path) else {
        // Nothing specified: probe the unspecified factory with isolated
        // diagnostic buffers, and only commit if sub-arguments were
        // actually consumed.
        if let Some(factory) = param
            .meta_factory
            .as_ref()
            .and_then(|meta| meta.unspecified_factory(registry))
        {
            let mut sub = WalkState::default();
            let built = construct_target(&factory, &param_path, arg_map, registry, &mut sub)?;

            let sub_missing = std::mem::take(&mut sub.missing_params);
            let all_defaulted = sub.all_params.values().all(|p| p.default.is_some());
            state.all_params.extend(sub.all_params);
            state.used_args.extend(sub.used_args);
            state.meta_factory_value.extend(sub.meta_factory_value);

            match built {
                Ok(value_mapping) => {
                    let Some(Evaluatable::Thunk(thunk)) = value_mapping.get(param_path.as_str())
                    else {
                        unreachable!("construct_target always emits a thunk at its own path");
                    };
                    if !thunk.kwargs.is_empty() {
                        tracing::trace!(path = %param_path, factory = %factory.qualified_name(), "committing unspecified factory");
                        state
                            .meta_factory_value
                            .insert(param_path.clone(), factory);
                        state.missing_params.extend(sub_missing);
                        return Ok(Some((param_path, value_mapping)));
                    }

                    // No sub-arguments were consumed. A field-schema factory
                    // whose parameters all have defaults still constructs a
                    // usable all-defaults instance when the parameter itself
                    // has no default.
                    if param.default.is_none() && is_field_schema(&factory) && all_defaulted {
                        debug_assert!(sub_missing.is_empty());
                        return Ok(Some((param_path, value_mapping)));
                    }

                    if param.default.is_none() {
                        if sub_missing.is_empty() {
                            state.missing_params.push(param_path);
                        } else {
                            state.missing_params.extend(sub_missing);
                        }
                    } else {
                        check_wildcard_variadic_default(
                            &factory,
                            param,
                            &param_path,
                            arg_map,
                            registry,
                        )?;
                    }
                    return Ok(None);
                }
                Err(_) => {
                    debug_assert!(sub_missing.is_empty());
                    // Fall through: the factory itself is unconstructible,
                    // so behave as if there were no factory at all.
                }
            }
        }

        if param.default.is_none() {
            state.missing_params.push(param_path);
        }
        return Ok(None);
    };

    state
        .used_args
        .insert((found.key.to_string(), found.layer_index));
    let spec = found.value;

    // A concrete value of the expected type is used as-is.
    if let Arg::Value(v) = spec {
        if value_satisfies(v, &param.ty, registry) {
            let mut mapping = ValueMap::new();
            mapping.insert(param_path.clone(), Evaluatable::Value(v.clone()));
            return Ok(Some((param_path, mapping)));
        }
    }

    // A castable string casts to a value, unless sub-paths were provided:
    // those must be consumed by a factory recursion instead, so a cast
    // succeeding here would only strand them as extraneous.
    if let Arg::Castable(s) = spec {
        let has_subpaths =
            param.meta_factory.is_some() && !arg_map.subpaths(&param_path, true).is_empty();
        if !has_subpaths {
            if let Ok(casted) = param.cast_value(s, registry) {
                let mut mapping = ValueMap::new();
                mapping.insert(param_path.clone(), Evaluatable::Value(casted));
                return Ok(Some((param_path, mapping)));
            }
        }
    }

    if let Arg::Reference(target) = spec {
        let mut mapping = ValueMap::new();
        mapping.insert(param_path.clone(), Evaluatable::ParamRef(target.clone()));
        return Ok(Some((param_path, mapping)));
    }

    // A factory whose output is a subtype of the parameter type recurses
    // with it as the sub-target.
    if let Arg::Factory(factory) = spec {
        if ty_is_subtype(&factory.output(), &param.ty, registry) {
            let value_mapping = construct_target(factory, &param_path, arg_map, registry, state)?
                .map_err(CollectFailure::into_error)?;
            return Ok(Some((param_path, value_mapping)));
        }
    }

    if let Arg::Castable(s) = spec {
        if let Some(meta) = &param.meta_factory {
            let factory = match meta.from_string(s, registry) {
                Ok(factory) => factory,
                Err(meta_err) => {
                    // Re-attempt the cast so the combined error explains
                    // both failures.
                    let cast_error = match param.cast_value(s, registry) {
                        Err(e) => e.to_string(),
                        Ok(_) => {
                            let subpaths = arg_map.subpaths(&param_path, true);
                            let example = subpaths
                                .first()
                                .map(|suffix| format!("{param_path}{suffix}"))
                                .unwrap_or_else(|| param_path.clone());
                            format!(
                                "Not a value, since subparameters were provided (e.g. {example:?})"
                            )
                        }
                    };
                    return Err(BlueprintError::InvalidArg(format!(
                        "Could not interpret argument {s:?} provided for param {param_path:?}...\n\n\
                         - Failed to interpret it as a value:\n{cast_error}\n\n\
                         - Failed to interpret it as a factory for polymorphic construction:\n{meta_err}"
                    )));
                }
            };
            let value_mapping = construct_target(&factory, &param_path, arg_map, registry, state)?
                .map_err(CollectFailure::into_error)?;
            state
                .meta_factory_value
                .insert(param_path.clone(), factory);
            return Ok(Some((param_path, value_mapping)));
        }

        // No meta-factory: surface the cast failure directly.
        return match param.cast_value(s, registry) {
            Err(e) => Err(BlueprintError::InvalidArg(format!(
                "Could not cast {s:?} to {}:\n{e}",
                param.ty
            ))),
            Ok(_) => Err(BlueprintError::InvalidArg(format!(
                "Expected {:?} to be castable to {}, got {s:?}",
                param.name, param.ty
            ))),
        };
    }

    let got = match spec {
        Arg::Value(v) => v.type_name(),
        Arg::Factory(f) => format!("a factory producing {}", f.output()),
        Arg::Castable(_) | Arg::Reference(_) => unreachable!("handled above"),
    };
    Err(BlueprintError::InvalidArg(format!(
        "Expected {:?} to be {}, got {got}",
        param.name, param.ty
    )))
}

fn is_field_schema(factory: &Factory) -> bool {
    matches!(factory, Factory::Target(def) if def.is_field_schema())
}

/// Defaults are opaque to wildcards. When a variadic-capable parameter keeps
/// its (non-empty) default because no sub-paths were observed, probe whether
/// any wildcard *would* have matched an element parameter, and fail loudly
/// if so.
fn check_wildcard_variadic_default(
    factory: &Factory,
    param: &Param,
    obj_path: &str,
    arg_map: &ArgumentMap,
    registry: &Registry,
) -> Result<(), BlueprintError> {
    match &param.default {
        Some(ParamDefault::Value(Value::Tuple(items))) if items.is_empty() => return Ok(()),
        Some(ParamDefault::Factory(Factory::Container(_))) => return Ok(()),
        Some(ParamDefault::NotRequired) => return Ok(()),
        _ => {}
    }

    let Some(variadic) = collect_variadic(factory, obj_path, arg_map, registry)? else {
        return Ok(());
    };
    if !variadic.params.is_empty() || variadic.element_types.is_empty() {
        return Ok(());
    }

    for element_type in &variadic.element_types {
        let Some(params) = element_params(element_type, registry) else {
            continue;
        };
        for element_param in params {
            let probe_path = format!("{obj_path}.__empty_variadic.{}", element_param.name);
            let Some(found) = arg_map.get(&probe_path) else {
                continue;
            };
            let display_path = format!("{obj_path}.(variadic).{}", element_param.name);
            return Err(BlueprintError::Construction(format!(
                "\n\nYou've hit an interesting case.\n\n\
                 It is possible to construct \"{display_path}\" using variadics, but no variadic \
                 (or polymorphic) parametrisation was found.\n\
                 This is fine in theory, because \"{display_path}\" has a default value.\n\n\
                 However, you also specified the wildcard {:?} and you may have expected it to \
                 modify the default value. This is not possible -- default values are opaque to \
                 the blueprint. The only way in which defaults interact with construction is \
                 presence / absence. So out of caution, here's an error!\n\n\
                 If this error is a false positive, consider scoping the wildcard more narrowly \
                 or using exact keys. As always, appending --help will show you what gets mapped \
                 to which param.",
                found.key
            )));
        }
    }
    Ok(())
}
