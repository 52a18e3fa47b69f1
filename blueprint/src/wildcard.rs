//! Wildcard key compilation and approximate matching.
//!
//! A wildcard key contains the literal token `...`, which matches any run
//! of zero or more path segments: `...name` matches `name`, `a.name` and
//! `a.b.name`; `model...count` matches `model.count` and
//! `model.layers.count`. Compiled matchers are cached process-wide.

use regex::Regex;
use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};

static PATTERN_CACHE: LazyLock<Mutex<HashMap<String, Regex>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// One segment of a wildcard key.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Seg {
    Literal(String),
    Wild,
}

/// Split a key into literal and wildcard segments.
///
/// `...` acts as a segment wherever it appears; the forms `...name`,
/// `a...b` and `model...` all parse with the wildcard as its own segment.
fn segments(key: &str) -> Vec<Seg> {
    let canonical = key.replace("...", "\u{0}");
    let mut segs = Vec::new();
    for piece in canonical.split('.') {
        for (i, lit) in piece.split('\u{0}').enumerate() {
            if i > 0 {
                segs.push(Seg::Wild);
            }
            if !lit.is_empty() {
                segs.push(Seg::Literal(lit.to_string()));
            }
        }
    }
    segs
}

/// Compile a wildcard key into an anchored full-match regex.
pub fn wildcard_key_to_regex(key: &str) -> Regex {
    if let Some(re) = PATTERN_CACHE
        .lock()
        .expect("wildcard pattern cache poisoned")
        .get(key)
    {
        return re.clone();
    }

    // A wildcard segment absorbs its neighboring separator so that the
    // zero-segment case still produces a well-formed path: leading `...`
    // becomes `(?:[^.]+\.)*`, a trailing or inner `...` becomes
    // `(?:\.[^.]+)*` after the preceding literal.
    let segs = segments(key);
    if segs.iter().all(|s| matches!(s, Seg::Wild)) {
        let re = Regex::new("^.*$").expect("wildcard patterns always compile");
        PATTERN_CACHE
            .lock()
            .expect("wildcard pattern cache poisoned")
            .insert(key.to_string(), re.clone());
        return re;
    }
    let mut pattern = String::from("^(?:");
    let mut need_sep = false;
    for seg in &segs {
        match seg {
            Seg::Literal(lit) => {
                if need_sep {
                    pattern.push_str(r"\.");
                }
                pattern.push_str(&regex::escape(lit));
                need_sep = true;
            }
            Seg::Wild => {
                if need_sep {
                    pattern.push_str(r"(?:\.[^.]+)*");
                } else {
                    pattern.push_str(r"(?:[^.]+\.)*");
                    need_sep = false;
                }
            }
        }
    }
    pattern.push_str(")$");
    let re = Regex::new(&pattern).expect("wildcard patterns always compile");
    PATTERN_CACHE
        .lock()
        .expect("wildcard pattern cache poisoned")
        .insert(key.to_string(), re.clone());
    re
}

/// Returns whether `key` (exact or wildcard) matches the concrete `path`.
pub fn wildcard_match(key: &str, path: &str) -> bool {
    wildcard_key_to_regex(key).is_match(path)
}

/// Score how well `key` approximates the candidate `path`, for suggestions.
///
/// The score is the fraction of the candidate's characters captured by the
/// best ordered alignment of the key's literal segments onto the candidate's
/// segments: a literal segment aligned to a candidate segment captures
/// `similarity * segment_len` characters; wildcard and unmatched candidate
/// segments capture nothing. Returns the score and the candidate itself as
/// the suggestion payload.
pub fn wildcard_key_approx(key: &str, path: &str) -> (f64, String) {
    let key_segs = segments(key);
    let path_segs: Vec<&str> = path.split('.').collect();
    if path.is_empty() || path_segs.is_empty() {
        return (0.0, path.to_string());
    }

    // memo[ki][pi]: best captured chars aligning key_segs[ki..] onto
    // path_segs[pi..]; None marks "no valid alignment".
    let mut memo: Vec<Vec<Option<Option<f64>>>> =
        vec![vec![None; path_segs.len() + 1]; key_segs.len() + 1];

    fn best(
        key_segs: &[Seg],
        path_segs: &[&str],
        ki: usize,
        pi: usize,
        memo: &mut Vec<Vec<Option<Option<f64>>>>,
    ) -> Option<f64> {
        if let Some(cached) = memo[ki][pi] {
            return cached;
        }
        let result = if ki == key_segs.len() {
            // Remaining candidate segments go unmatched.
            Some(0.0)
        } else if pi == path_segs.len() {
            // Candidate exhausted: valid only if the leftover key segments
            // are all wildcards (which may match zero segments).
            key_segs[ki..]
                .iter()
                .all(|seg| matches!(seg, Seg::Wild))
                .then_some(0.0)
        } else {
            let mut out: Option<f64> = None;
            match &key_segs[ki] {
                Seg::Literal(lit) => {
                    // Align the literal to this candidate segment...
                    if let Some(rest) = best(key_segs, path_segs, ki + 1, pi + 1, memo) {
                        let sim = strsim::normalized_levenshtein(lit, path_segs[pi]);
                        let captured = sim * path_segs[pi].len() as f64 + rest;
                        out = Some(out.map_or(captured, |b: f64| b.max(captured)));
                    }
                    // ...or skip the candidate segment entirely.
                    if let Some(skipped) = best(key_segs, path_segs, ki, pi + 1, memo) {
                        out = Some(out.map_or(skipped, |b: f64| b.max(skipped)));
                    }
                }
                Seg::Wild => {
                    // A wildcard consumes zero or more candidate segments.
                    for consumed in 0..=(path_segs.len() - pi) {
                        if let Some(rest) = best(key_segs, path_segs, ki + 1, pi + consumed, memo)
                        {
                            out = Some(out.map_or(rest, |b: f64| b.max(rest)));
                        }
                    }
                }
            }
            out
        };
        memo[ki][pi] = Some(result);
        result
    }

    let captured = best(&key_segs, &path_segs, 0, 0, &mut memo).unwrap_or(0.0);
    (captured / path.len() as f64, path.to_string())
}
