//! String and JSON-schema similarity kernel.
//!
//! Two primitives used by the deduplication engine: Jaro-Winkler similarity
//! over lowercased strings, and a structural similarity over JSON Schema
//! `properties`/`required` declarations. Both return scores in `[0, 1]` and
//! are symmetric in their arguments.

use std::collections::HashSet;

use serde_json::Value;

/// Winkler prefix bonus considers at most this many leading characters.
const MAX_PREFIX: usize = 4;

/// Winkler prefix scaling factor.
const PREFIX_SCALE: f64 = 0.1;

/// Jaro-Winkler similarity of two strings, case-insensitive.
///
/// Two empty strings are identical (1.0); one empty string matches nothing
/// (0.0). The Winkler bonus rewards a shared prefix of up to four characters
/// and the result is clamped to 1.0.
pub fn jaro_winkler(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();

    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let j = jaro(&a, &b);
    let prefix = a
        .iter()
        .zip(b.iter())
        .take(MAX_PREFIX)
        .take_while(|(x, y)| x == y)
        .count();

    (j + PREFIX_SCALE * prefix as f64 * (1.0 - j)).min(1.0)
}

/// Jaro similarity over char slices.
///
/// Matches are counted within a window of `floor(max(|a|,|b|)/2) - 1`
/// positions; transpositions are matched characters that appear in a
/// different order.
fn jaro(a: &[char], b: &[char]) -> f64 {
    let window = (a.len().max(b.len()) / 2).saturating_sub(1);

    let mut a_matched = vec![false; a.len()];
    let mut b_matched = vec![false; b.len()];
    let mut matches = 0usize;

    for (i, ca) in a.iter().enumerate() {
        let lo = i.saturating_sub(window);
        let hi = (i + window + 1).min(b.len());
        for j in lo..hi {
            if !b_matched[j] && b[j] == *ca {
                a_matched[i] = true;
                b_matched[j] = true;
                matches += 1;
                break;
            }
        }
    }

    if matches == 0 {
        return 0.0;
    }

    let a_seq: Vec<char> = a
        .iter()
        .enumerate()
        .filter(|(i, _)| a_matched[*i])
        .map(|(_, c)| *c)
        .collect();
    let b_seq: Vec<char> = b
        .iter()
        .enumerate()
        .filter(|(j, _)| b_matched[*j])
        .map(|(_, c)| *c)
        .collect();
    let transpositions = a_seq
        .iter()
        .zip(b_seq.iter())
        .filter(|(x, y)| x != y)
        .count();

    let m = matches as f64;
    let t = transpositions as f64 / 2.0;
    (m / a.len() as f64 + m / b.len() as f64 + (m - t) / m) / 3.0
}

/// Structural similarity of two JSON schemas.
///
/// Compares the `(name, type)` pairs under `properties` (weight 0.7) and the
/// `required` name sets (weight 0.3). Deep-equal schemas short-circuit to
/// 1.0; a missing schema on either side scores 0.0.
pub fn schema_similarity(a: Option<&Value>, b: Option<&Value>) -> f64 {
    let (Some(a), Some(b)) = (a, b) else {
        return 0.0;
    };

    // serde_json object equality is key-based, so this covers canonical
    // deep equality regardless of key order.
    if a == b {
        return 1.0;
    }

    let props_a = property_set(a);
    let props_b = property_set(b);
    let prop_sim = overlap_ratio(&props_a, &props_b);

    let req_a = required_set(a);
    let req_b = required_set(b);
    let req_sim = overlap_ratio(&req_a, &req_b);

    0.7 * prop_sim + 0.3 * req_sim
}

/// Dice coefficient over two sets; two empty sets count as identical.
fn overlap_ratio<T: std::hash::Hash + Eq>(a: &HashSet<T>, b: &HashSet<T>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let common = a.intersection(b).count();
    2.0 * common as f64 / (a.len() + b.len()) as f64
}

/// Extract `(name, type)` pairs from a schema's `properties` object.
/// A property without a `type` is recorded as `unknown`.
fn property_set(schema: &Value) -> HashSet<(String, String)> {
    schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| {
            props
                .iter()
                .map(|(name, decl)| {
                    let ty = decl
                        .get("type")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown");
                    (name.clone(), ty.to_string())
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Extract the `required` property names of a schema.
fn required_set(schema: &Value) -> HashSet<String> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
