//! Lazy evaluation graph: the value mapping produced by the construction
//! walk, and its memoizing evaluator.

use crate::errors::BlueprintError;
use crate::registry::{Factory, Kwargs, Registry};
use crate::value::Value;
use crate::wildcard::{wildcard_key_approx, wildcard_key_to_regex};
use indexmap::{IndexMap, IndexSet};
use std::collections::HashSet;

/// Parameter path → evaluable node. Always contains the empty key (the root
/// thunk) after a successful construction walk.
pub type ValueMap = IndexMap<String, Evaluatable>;

/// A deferred call: a factory plus a map from argument names to
/// parameter-path references.
#[derive(Debug, Clone)]
pub struct Thunk {
    pub factory: Factory,
    pub kwargs: IndexMap<String, String>,
}

/// One node of the lazy graph.
#[derive(Debug, Clone)]
pub enum Evaluatable {
    /// Fully reduced.
    Value(Value),
    /// Indirection to another entry of the value mapping.
    ParamRef(String),
    Thunk(Thunk),
}

/// Evaluate the mapping rooted at the empty path.
///
/// Depth-first and memoizing: after a `ParamRef` resolves, its slot is
/// overwritten with the reduced value so later dereferences are O(1).
/// Evaluation is idempotent. A path revisited while still in progress is a
/// reference cycle and fails with a `Construction` error rather than
/// recursing unboundedly.
pub fn evaluate(value_mapping: &mut ValueMap, registry: &Registry) -> Result<Value, BlueprintError> {
    debug_assert!(value_mapping.contains_key(""));
    let mut in_progress = HashSet::new();
    inner(value_mapping, "", registry, &mut in_progress)
}

fn inner(
    value_mapping: &mut ValueMap,
    path: &str,
    registry: &Registry,
    in_progress: &mut HashSet<String>,
) -> Result<Value, BlueprintError> {
    let Some(node) = value_mapping.get(path).cloned() else {
        return Err(BlueprintError::Construction(format!(
            "No value mapping entry for {path:?}"
        )));
    };
    if !in_progress.insert(path.to_string()) {
        return Err(BlueprintError::Construction(format!(
            "Reference cycle detected while evaluating {path:?}"
        )));
    }

    let result = match node {
        Evaluatable::Value(value) => Ok(value),
        Evaluatable::ParamRef(target) => {
            tracing::trace!(path, target, "dereferencing");
            let value = inner(value_mapping, &target, registry, in_progress)
                .map_err(|e| e.with_note(&format!(" (when dereferencing {path:?})")))?;
            value_mapping.insert(path.to_string(), Evaluatable::Value(value.clone()));
            Ok(value)
        }
        Evaluatable::Thunk(thunk) => {
            let mut kwargs = Kwargs::new();
            for (name, target) in &thunk.kwargs {
                let value = inner(value_mapping, target, registry, in_progress).map_err(|e| {
                    e.with_note(&format!(
                        " (when evaluating argument {name:?} for {})",
                        thunk.factory.qualified_name()
                    ))
                })?;
                kwargs.insert(name.clone(), value);
            }
            thunk
                .factory
                .call(&kwargs, registry)
                .map_err(BlueprintError::Construction)
        }
    };

    in_progress.remove(path);
    result
}

/// Validate that every `ParamRef` targets a discovered parameter path.
pub fn check_reference_targets(
    value_mapping: &ValueMap,
    param_paths: &IndexSet<String>,
) -> Result<(), BlueprintError> {
    for (param_path, node) in value_mapping {
        let Evaluatable::ParamRef(target) = node else {
            continue;
        };
        if param_paths.contains(target) {
            continue;
        }

        let mut extra = String::new();
        let best = param_paths
            .iter()
            .map(|p| wildcard_key_approx(target, p))
            .max_by(|a, b| a.0.total_cmp(&b.0));
        if let Some((score, suggestion)) = best {
            if score > 0.1 {
                extra.push_str(&format!("\nDid you mean {suggestion:?}?"));
            }
        }
        let nested = wildcard_key_to_regex(&format!("...{target}"));
        if let Some(found) = param_paths.iter().find(|p| nested.is_match(p)) {
            extra.push_str(&format!(
                "\nDid you get the nesting wrong, maybe you meant {found:?}?"
            ));
        }

        return Err(BlueprintError::InvalidArg(format!(
            "Invalid reference target {target:?} for {param_path}{extra}"
        )));
    }
    Ok(())
}
