//! Command-line token parsing.
//!
//! Grammar: `key=value` binds a castable string, `key@=path` binds a
//! reference; `--help` is handled by the caller. Duplicate keys within one
//! token vector keep the last value.

use crate::argmap::Arg;
use crate::errors::BlueprintError;
use indexmap::IndexMap;

/// Parse a token vector into an ordered key → binding mapping.
///
/// With `allow_hyphens`, a leading `--` is stripped from keys. Without it,
/// hyphens are preserved so that misuse surfaces as an extraneity error
/// carrying the hyphen hint.
pub fn argv_to_args(
    argv: &[impl AsRef<str>],
    allow_hyphens: bool,
) -> Result<IndexMap<String, Arg>, BlueprintError> {
    let mut out = IndexMap::new();
    for token in argv {
        let token = token.as_ref();
        let Some(eq) = token.find('=') else {
            return Err(BlueprintError::InvalidArg(format!(
                "Invalid argument {token:?}, expected key=value or key@=reference"
            )));
        };
        let (raw_key, is_reference) = match token[..eq].strip_suffix('@') {
            Some(key) => (key, true),
            None => (&token[..eq], false),
        };
        let value = &token[eq + 1..];

        let key = if allow_hyphens {
            raw_key.strip_prefix("--").unwrap_or(raw_key)
        } else {
            raw_key
        };
        if key.is_empty() {
            return Err(BlueprintError::InvalidArg(format!(
                "Invalid argument {token:?}, missing key"
            )));
        }

        let arg = if is_reference {
            if value.contains("...") {
                return Err(BlueprintError::InvalidArg(format!(
                    "Cannot use wildcard {value:?} as a reference target"
                )));
            }
            Arg::reference(value)
        } else {
            Arg::castable(value)
        };
        out.insert(key.to_string(), arg);
    }
    Ok(out)
}
