//! Bucket math: weight ranges, variation choice, namespaces, rollouts, and overrides.

use serde_json::Value;
use url::Url;

use crate::condition::scalar_string;
use crate::hashing::bucket_hash;
use crate::model::{BucketRange, Namespace};

/// Evenly split the unit interval between `n` variations.
pub(crate) fn equal_weights(n: usize) -> Vec<f64> {
    if n == 0 {
        Vec::new()
    } else {
        vec![1.0 / n as f64; n]
    }
}

/// Build one bucket range per variation from `weights`, scaled down by `coverage`.
///
/// Weights that don't match the variation count or don't sum to 1 (within a 0.01 tolerance) are
/// replaced with equal weights. The accumulator advances by the *full* weight while each range
/// only spans `coverage * weight`, which leaves uncovered gaps between ranges when coverage is
/// partial.
pub(crate) fn bucket_ranges(n: usize, coverage: f64, weights: &[f64]) -> Vec<BucketRange> {
    let coverage = coverage.clamp(0.0, 1.0);
    let sum: f64 = weights.iter().sum();
    let weights = if weights.len() != n || (sum - 1.0).abs() > 0.01 {
        equal_weights(n)
    } else {
        weights.to_vec()
    };

    let mut acc = 0.0;
    weights
        .iter()
        .map(|weight| {
            let start = acc;
            acc += weight;
            BucketRange(start, start + coverage * weight)
        })
        .collect()
}

/// Index of the first range containing `hash` under half-open membership, or `-1`.
pub(crate) fn choose_variation(hash: f64, ranges: &[BucketRange]) -> i32 {
    for (index, range) in ranges.iter().enumerate() {
        if range.contains(hash) {
            return index as i32;
        }
    }
    -1
}

/// Whether `user_id` falls into the namespace's slice of the unit interval.
pub(crate) fn in_namespace(user_id: &str, namespace: &Namespace) -> bool {
    let Namespace(id, lo, hi) = namespace;
    match bucket_hash(&format!("__{id}"), user_id, 1) {
        Some(n) => n >= *lo && n < *hi,
        None => false,
    }
}

/// Whether the context is included in a forced-value rollout.
///
/// With neither a range nor a coverage the rollout is unconditional. Otherwise the hashing
/// attribute must be present: a range is checked by membership, a bare coverage by `hash <=
/// coverage`.
pub(crate) fn included_in_rollout(
    attributes: &Value,
    seed: &str,
    hash_attribute: Option<&str>,
    fallback_attribute: Option<&str>,
    range: Option<&BucketRange>,
    coverage: Option<f64>,
    hash_version: i64,
) -> bool {
    if range.is_none() && coverage.is_none() {
        return true;
    }

    let (_, hash_value) = hash_attribute_value(attributes, hash_attribute, fallback_attribute);
    if hash_value.is_empty() {
        return false;
    }
    let Some(n) = bucket_hash(seed, &hash_value, hash_version) else {
        return false;
    };

    if let Some(range) = range {
        range.contains(n)
    } else if let Some(coverage) = coverage {
        n <= coverage
    } else {
        true
    }
}

/// Resolve the attribute a hash should be computed over.
///
/// Returns the attribute name actually used and its canonical string value. The value is empty
/// when the attribute is missing or not a scalar; the fallback attribute is consulted only when
/// the primary resolves to an empty value.
pub(crate) fn hash_attribute_value(
    attributes: &Value,
    hash_attribute: Option<&str>,
    fallback_attribute: Option<&str>,
) -> (String, String) {
    let attribute = hash_attribute.filter(|a| !a.is_empty()).unwrap_or("id");
    let value = attribute_string(attributes, attribute);
    if value.is_empty() {
        if let Some(fallback) = fallback_attribute.filter(|a| !a.is_empty()) {
            let fallback_value = attribute_string(attributes, fallback);
            if !fallback_value.is_empty() {
                return (fallback.to_owned(), fallback_value);
            }
        }
    }
    (attribute.to_owned(), value)
}

fn attribute_string(attributes: &Value, name: &str) -> String {
    attributes
        .get(name)
        .and_then(scalar_string)
        .unwrap_or_default()
}

/// Experiment override parsed from a page URL's query string: `?<key>=<variation index>`.
/// Returns the index only when it parses and addresses an existing variation.
pub(crate) fn query_string_override(key: &str, url: &str, num_variations: usize) -> Option<i32> {
    let url = Url::parse(url).ok()?;
    let raw = url
        .query_pairs()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.into_owned())?;
    let index: i32 = raw.parse().ok()?;
    (index >= 0 && (index as usize) < num_variations).then_some(index)
}
