//! Layered argument storage with wildcard fallback and extraneity auditing.

use crate::errors::BlueprintError;
use crate::registry::Factory;
use crate::value::Value;
use crate::wildcard::{wildcard_key_approx, wildcard_key_to_regex};
use indexmap::{IndexMap, IndexSet};
use regex::Regex;
use std::collections::HashSet;

/// A value bound to a key within a layer.
#[derive(Debug, Clone)]
pub enum Arg {
    /// A concrete value, opaque to the engine.
    Value(Value),
    /// A string requiring type-aware coercion.
    Castable(String),
    /// A reference to another parameter path.
    Reference(String),
    /// A factory to construct the parameter with.
    Factory(Factory),
}

impl Arg {
    pub fn value(v: impl Into<Value>) -> Self {
        Arg::Value(v.into())
    }

    pub fn castable(s: impl Into<String>) -> Self {
        Arg::Castable(s.into())
    }

    pub fn reference(path: impl Into<String>) -> Self {
        Arg::Reference(path.into())
    }

    pub fn factory(f: Factory) -> Self {
        Arg::Factory(f)
    }
}

#[derive(Debug, Clone)]
struct WildcardEntry {
    key: String,
    pattern: Regex,
    value: Arg,
}

/// One labeled mapping of keys to bound values.
///
/// Exact keys take precedence over wildcards within a layer; wildcards are
/// ordered longest-key-first so more specific patterns bind first.
#[derive(Debug, Clone)]
pub struct Layer {
    name: Option<String>,
    exact: IndexMap<String, Arg>,
    wildcards: Vec<WildcardEntry>,
}

impl Layer {
    pub fn new<K: Into<String>>(
        args: impl IntoIterator<Item = (K, Arg)>,
        name: Option<&str>,
    ) -> Self {
        let mut entries: Vec<(String, Arg)> =
            args.into_iter().map(|(k, v)| (k.into(), v)).collect();
        // Longest key first, stable, so specific wildcards match before
        // broad ones.
        entries.sort_by_key(|(k, _)| std::cmp::Reverse(k.len()));

        let mut exact = IndexMap::new();
        let mut wildcards = Vec::new();
        for (key, value) in entries {
            if key.contains("...") {
                let pattern = wildcard_key_to_regex(&key);
                wildcards.push(WildcardEntry {
                    key,
                    pattern,
                    value,
                });
            } else {
                exact.insert(key, value);
            }
        }
        Self {
            name: name.map(str::to_string),
            exact,
            wildcards,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn get(&self, exact_key: &str) -> Option<(&str, &Arg)> {
        if let Some((key, value)) = self.exact.get_key_value(exact_key) {
            return Some((key.as_str(), value));
        }
        self.wildcards
            .iter()
            .find(|entry| entry.pattern.is_match(exact_key))
            .map(|entry| (entry.key.as_str(), &entry.value))
    }

    /// Keys in lookup order, with their wildcard flag.
    fn iter_keys(&self) -> impl Iterator<Item = (&str, bool)> {
        self.exact
            .keys()
            .map(|k| (k.as_str(), false))
            .chain(self.wildcards.iter().map(|e| (e.key.as_str(), true)))
    }

    fn wildcard_pattern(&self, key: &str) -> Option<&Regex> {
        self.wildcards
            .iter()
            .find(|e| e.key == key)
            .map(|e| &e.pattern)
    }
}

/// An argument found by [`ArgumentMap::get`].
#[derive(Debug)]
pub struct FoundArg<'a> {
    /// The layer key that matched (exact or wildcard).
    pub key: &'a str,
    pub value: &'a Arg,
    pub layer_index: usize,
    pub layer_name: Option<&'a str>,
}

/// Ordered stack of layers; later layers shadow earlier ones.
#[derive(Debug, Clone, Default)]
pub struct ArgumentMap {
    layers: Vec<Layer>,
}

impl ArgumentMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_layer(&mut self, layer: Layer) {
        self.layers.push(layer);
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Look up a concrete path, newest layer first.
    pub fn get(&self, exact_key: &str) -> Option<FoundArg<'_>> {
        for (index, layer) in self.layers.iter().enumerate().rev() {
            if let Some((key, value)) = layer.get(exact_key) {
                return Some(FoundArg {
                    key,
                    value,
                    layer_index: index,
                    layer_name: layer.name(),
                });
            }
        }
        None
    }

    /// Suffixes `s` such that `path + s` matches an argument in this map.
    ///
    /// For exact keys the suffix is literal (`""` when the key equals
    /// `path`, suppressed when `strict`). For wildcard keys the suffix is
    /// reconstructed from the portion of the key after the last occurrence
    /// of the path's final literal segment, provided the key up to that
    /// point matches the path.
    pub fn subpaths(&self, path: &str, strict: bool) -> Vec<String> {
        debug_assert!(!path.ends_with('.'));
        let wildcard_literal = path.rsplit('.').next().unwrap_or("");

        let mut out = Vec::new();
        for layer in &self.layers {
            for (key, is_wildcard) in layer.iter_keys() {
                if is_wildcard {
                    if path.is_empty() {
                        continue;
                    }
                    let Some(i) = key.rfind(wildcard_literal) else {
                        continue;
                    };
                    if wildcard_key_to_regex(key).is_match(path) {
                        if !strict {
                            out.push(String::new());
                        }
                        continue;
                    }
                    let end = i + wildcard_literal.len();
                    if end < key.len()
                        && key.as_bytes()[end] == b'.'
                        && wildcard_key_to_regex(&key[..end]).is_match(path)
                    {
                        out.push(key[end..].to_string());
                    }
                } else if path.is_empty() {
                    // A container at the blueprint root: every key is a
                    // sub-path of the empty prefix.
                    out.push(format!(".{key}"));
                } else {
                    if key == path {
                        if !strict {
                            out.push(String::new());
                        }
                        continue;
                    }
                    if let Some(rest) = key.strip_prefix(path) {
                        if rest.starts_with('.') {
                            out.push(rest.to_string());
                        }
                    }
                }
            }
        }
        out
    }

    /// Audit every binding: each `(key, layer)` pair must be used, clobbered
    /// by a later layer, or it is extraneous.
    ///
    /// Runs before the missing-parameter check so typos do not masquerade as
    /// missing arguments; the error carries the best approximate suggestion
    /// plus nesting/hyphen/parent hints.
    pub fn check_extraneous(
        &self,
        used_args: &HashSet<(String, usize)>,
        param_paths: &IndexSet<String>,
        target: &str,
    ) -> Result<(), BlueprintError> {
        for (index, layer) in self.layers.iter().enumerate() {
            for (key, is_wildcard) in layer.iter_keys() {
                // A pair missing from used_args was either extraneous or
                // clobbered by a match in a later layer.
                if used_args.contains(&(key.to_string(), index)) {
                    continue;
                }

                let corresponds = if is_wildcard {
                    let pattern = layer
                        .wildcard_pattern(key)
                        .expect("wildcard key has a compiled pattern");
                    param_paths.iter().any(|p| pattern.is_match(p))
                } else {
                    param_paths.contains(key)
                };
                if corresponds {
                    continue;
                }

                let mut extra = String::new();
                let best = param_paths
                    .iter()
                    .map(|p| wildcard_key_approx(key, p))
                    .max_by(|a, b| a.0.total_cmp(&b.0));
                if let Some((score, suggestion)) = best {
                    if score > 0.1 {
                        extra.push_str(&format!("\nDid you mean {suggestion:?}?"));
                    }
                }
                if !is_wildcard {
                    let nested = wildcard_key_to_regex(&format!("...{key}"));
                    if let Some(found) = param_paths.iter().find(|p| nested.is_match(p)) {
                        extra.push_str(&format!(
                            "\nDid you get the nesting wrong, maybe you meant {found:?}?"
                        ));
                    }
                }
                if key.starts_with("--") {
                    extra.push_str("\nDid you mean to use allow_hyphens in your entrypoint?");
                }

                let mut valid_parent_help = String::new();
                if !is_wildcard {
                    if let Some(parent) = valid_parent(key, param_paths) {
                        valid_parent_help = format!(" (parent key {parent:?} is valid)");
                    }
                }

                return Err(BlueprintError::ExtraneousArg(format!(
                    "Extraneous argument {key:?} to Blueprint for {target}{extra}\nAppend --help to your command to see valid arguments{valid_parent_help}"
                )));
            }
        }
        Ok(())
    }
}

/// Deepest strict prefix of `key` that names a discovered parameter.
fn valid_parent<'a>(key: &str, param_paths: &'a IndexSet<String>) -> Option<&'a str> {
    let parts: Vec<&str> = key.split('.').collect();
    for i in (1..parts.len()).rev() {
        let parent = parts[..i].join(".");
        if let Some(found) = param_paths.get(&parent) {
            return Some(found.as_str());
        }
    }
    None
}
