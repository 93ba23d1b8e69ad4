//! Wire data model for features, rules, and experiments.
//!
//! All types mirror the camelCase JSON served by the features endpoint. Definitions are immutable
//! once decoded; evaluation never mutates them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Map of feature id to feature definition, as served by the features endpoint.
pub type FeatureMap = HashMap<String, Feature>;

/// A feature flag: a default value plus an ordered list of override rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Feature {
    /// Value returned when no rule applies. Defaults to JSON `null`.
    pub default_value: Value,
    /// Override rules, evaluated in order; the first applicable rule wins.
    pub rules: Vec<FeatureRule>,
}

/// A single override rule attached to a feature.
///
/// A rule either forces a value (optionally behind a rollout) or describes an experiment through
/// `variations` and the bucketing fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[allow(missing_docs)]
pub struct FeatureRule {
    pub condition: Option<Value>,
    pub parent_conditions: Vec<ParentCondition>,
    pub coverage: Option<f64>,
    pub force: Option<Value>,
    pub variations: Option<Vec<Value>>,
    pub key: Option<String>,
    pub weights: Option<Vec<f64>>,
    pub namespace: Option<Namespace>,
    pub hash_attribute: Option<String>,
    pub fallback_attribute: Option<String>,
    pub hash_version: Option<i64>,
    pub range: Option<BucketRange>,
    pub ranges: Option<Vec<BucketRange>>,
    pub meta: Vec<VariationMeta>,
    pub filters: Vec<Filter>,
    pub seed: Option<String>,
    pub name: Option<String>,
    pub phase: Option<String>,
    pub disable_sticky_bucketing: bool,
    pub bucket_version: Option<i64>,
    pub min_bucket_version: Option<i64>,
}

/// An experiment: an ordered list of variation values with weighted, deterministic bucketing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Experiment {
    pub key: String,
    pub variations: Vec<Value>,
    #[serde(default)]
    pub weights: Option<Vec<f64>>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub coverage: Option<f64>,
    #[serde(default)]
    pub ranges: Option<Vec<BucketRange>>,
    #[serde(default)]
    pub condition: Option<Value>,
    #[serde(default)]
    pub parent_conditions: Vec<ParentCondition>,
    #[serde(default)]
    pub namespace: Option<Namespace>,
    /// Forced variation index. Unlike a rule's `force`, this is an index into `variations`.
    #[serde(default)]
    pub force: Option<i32>,
    #[serde(default)]
    pub hash_attribute: Option<String>,
    #[serde(default)]
    pub fallback_attribute: Option<String>,
    #[serde(default)]
    pub hash_version: Option<i64>,
    #[serde(default)]
    pub meta: Vec<VariationMeta>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub seed: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub disable_sticky_bucketing: bool,
    #[serde(default)]
    pub bucket_version: Option<i64>,
    #[serde(default)]
    pub min_bucket_version: Option<i64>,
}

fn default_true() -> bool {
    true
}

impl Experiment {
    /// Create an experiment with the given key and variation values; all optional fields take
    /// their defaults (`active = true`, full coverage, equal weights).
    pub fn new(key: impl Into<String>, variations: Vec<Value>) -> Experiment {
        Experiment {
            key: key.into(),
            variations,
            weights: None,
            active: true,
            coverage: None,
            ranges: None,
            condition: None,
            parent_conditions: Vec::new(),
            namespace: None,
            force: None,
            hash_attribute: None,
            fallback_attribute: None,
            hash_version: None,
            meta: Vec::new(),
            filters: Vec::new(),
            seed: None,
            name: None,
            phase: None,
            disable_sticky_bucketing: false,
            bucket_version: None,
            min_bucket_version: None,
        }
    }
}

/// Display metadata attached to one experiment variation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[allow(missing_docs)]
pub struct VariationMeta {
    pub key: Option<String>,
    pub name: Option<String>,
    /// When set, a matching experiment rule records its result but lets evaluation continue to
    /// the next rule.
    pub passthrough: bool,
}

/// Mutually-exclusive traffic filter: the user is kept only if a dedicated hash lands inside one
/// of the filter's ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[allow(missing_docs)]
pub struct Filter {
    pub seed: String,
    pub ranges: Vec<BucketRange>,
    pub hash_version: i64,
    pub attribute: String,
}

impl Default for Filter {
    fn default() -> Filter {
        Filter {
            seed: String::new(),
            ranges: Vec::new(),
            hash_version: 2,
            attribute: "id".to_owned(),
        }
    }
}

/// A condition on another feature's value that gates a rule or experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentCondition {
    /// Id of the parent feature.
    pub id: String,
    /// Condition applied to `{"value": <parent result value>}`.
    pub condition: Value,
    /// When set, an unmet condition fails the whole feature instead of skipping the rule.
    #[serde(default)]
    pub gate: bool,
}

/// Half-open bucket interval `[lo, hi)` within `[0, 1]`, serialized as a two-element array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketRange(pub f64, pub f64);

impl BucketRange {
    pub(crate) fn contains(&self, n: f64) -> bool {
        self.0 <= n && n < self.1
    }
}

/// Experiment namespace, serialized as `[id, lo, hi]`. Users hash into `[0, 1)` per namespace id,
/// and only those landing in `[lo, hi)` take part, which makes experiments in disjoint slices of
/// the same namespace mutually exclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Namespace(pub String, pub f64, pub f64);

/// How a feature evaluation arrived at its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub enum FeatureSource {
    UnknownFeature,
    DefaultValue,
    Force,
    Experiment,
    CyclicPrerequisite,
    Prerequisite,
}

/// Outcome of evaluating a feature for a context.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureResult {
    /// The assigned value. JSON `null` for unknown features and failed prerequisites.
    pub value: Value,
    /// Convenience truthiness of `value` (`null`, `false`, `0`, and `""` are off).
    pub on: bool,
    /// Negation of `on`.
    pub off: bool,
    /// How the value was decided.
    pub source: FeatureSource,
    /// The experiment behind the value, when `source` is `Experiment`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experiment: Option<Experiment>,
    /// The result of that experiment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experiment_result: Option<ExperimentResult>,
}

/// Outcome of running an experiment for a context.
///
/// `variation_id` and `value` are always populated: a context that is not part of the experiment
/// (`in_experiment == false`) reports variation `0` and the first variation value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentResult {
    /// Whether the context is enrolled (bucketed in or explicitly forced).
    pub in_experiment: bool,
    /// Index of the assigned variation.
    pub variation_id: i32,
    /// Value of the assigned variation.
    pub value: Value,
    /// Whether a hash decided the assignment (`false` for forced and fallback results).
    pub hash_used: bool,
    /// The attribute the assignment hashed on.
    pub hash_attribute: String,
    /// The value of that attribute, in canonical string form.
    pub hash_value: String,
    /// Id of the feature the experiment came from, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_id: Option<String>,
    /// Unique key of the assigned variation: `meta.key` when provided, else the stringified index.
    pub key: String,
    /// The hash position in `[0, 1)`, when a hash was used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<f64>,
    /// Human-readable variation name, when provided in `meta`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Whether the assigned variation is a passthrough.
    pub passthrough: bool,
    /// Whether a persisted sticky bucket decided the assignment. Always `false`: sticky-bucket
    /// fields are preserved in the data model but no storage backend is wired up.
    pub sticky_bucket_used: bool,
}

/// Response body of the features endpoint: either a plain feature map or an encrypted blob.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FeaturesPayload {
    #[serde(default)]
    pub features: Option<HashMap<String, TryParse<Feature>>>,
    #[serde(default)]
    pub encrypted_features: Option<String>,
}

/// `TryParse` allows a subfield to fail parsing without failing the parsing of the whole
/// structure.
///
/// This keeps one malformed feature definition from poisoning the rest of the payload: features
/// that parse stay servable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TryParse<T> {
    /// Successfully parsed.
    Parsed(T),
    /// Parsing failed; the raw JSON is preserved.
    ParseFailed(Value),
}

impl<T> From<TryParse<T>> for Option<T> {
    fn from(value: TryParse<T>) -> Self {
        match value {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parse_full_rule() {
        let feature: Feature = serde_json::from_value(json!({
            "defaultValue": false,
            "rules": [{
                "condition": {"country": "fr"},
                "parentConditions": [{"id": "parent", "condition": {"value": true}, "gate": true}],
                "coverage": 0.5,
                "variations": [false, true],
                "key": "checkout-exp",
                "weights": [0.3, 0.7],
                "namespace": ["checkout", 0, 0.5],
                "hashAttribute": "company",
                "fallbackAttribute": "deviceId",
                "hashVersion": 2,
                "range": [0, 0.25],
                "ranges": [[0, 0.5], [0.5, 1]],
                "meta": [{"key": "control"}, {"key": "treatment", "passthrough": true}],
                "filters": [{"seed": "holdout", "ranges": [[0, 0.1]]}],
                "seed": "checkout-seed",
                "name": "Checkout experiment",
                "phase": "1"
            }]
        }))
        .unwrap();

        let rule = &feature.rules[0];
        assert_eq!(rule.coverage, Some(0.5));
        assert_eq!(rule.key.as_deref(), Some("checkout-exp"));
        assert_eq!(
            rule.namespace,
            Some(Namespace("checkout".to_owned(), 0.0, 0.5))
        );
        assert_eq!(rule.hash_version, Some(2));
        assert_eq!(rule.range, Some(BucketRange(0.0, 0.25)));
        assert_eq!(rule.ranges.as_deref().map(<[_]>::len), Some(2));
        assert!(rule.meta[1].passthrough);
        assert!(rule.parent_conditions[0].gate);
        // Filter defaults fill in unsupplied fields.
        assert_eq!(rule.filters[0].hash_version, 2);
        assert_eq!(rule.filters[0].attribute, "id");
    }

    #[test]
    fn rule_defaults_are_empty() {
        let rule: FeatureRule = serde_json::from_value(json!({"force": 1})).unwrap();
        assert_eq!(rule.force, Some(json!(1)));
        assert_eq!(rule.hash_version, None);
        assert!(rule.parent_conditions.is_empty());
        assert!(rule.meta.is_empty());
        assert!(!rule.disable_sticky_bucketing);
    }

    #[test]
    fn experiment_requires_variations() {
        assert!(serde_json::from_value::<Experiment>(json!({"key": "exp"})).is_err());
    }

    #[test]
    fn experiment_is_active_by_default() {
        let experiment: Experiment =
            serde_json::from_value(json!({"key": "exp", "variations": [0, 1]})).unwrap();
        assert!(experiment.active);
        assert_eq!(experiment.force, None);

        let experiment: Experiment =
            serde_json::from_value(json!({"key": "exp", "variations": [0, 1], "active": false}))
                .unwrap();
        assert!(!experiment.active);
    }

    #[test]
    fn numeric_fields_accept_ints_and_floats() {
        let rule: FeatureRule =
            serde_json::from_value(json!({"coverage": 1, "weights": [1, 0], "range": [0, 1]}))
                .unwrap();
        assert_eq!(rule.coverage, Some(1.0));
        assert_eq!(rule.weights, Some(vec![1.0, 0.0]));
        assert_eq!(rule.range, Some(BucketRange(0.0, 1.0)));
    }

    #[test]
    fn bucket_range_membership_is_half_open() {
        let range = BucketRange(0.2, 0.4);
        assert!(range.contains(0.2));
        assert!(range.contains(0.39999));
        assert!(!range.contains(0.4));
        assert!(!range.contains(0.1));
    }

    #[test]
    fn payload_parses_partially_if_unexpected() {
        let payload: FeaturesPayload = serde_json::from_value(json!({
            "features": {
                "good": {"defaultValue": 1},
                "bad": {"defaultValue": 1, "rules": "not-an-array"}
            }
        }))
        .unwrap();

        let features = payload.features.unwrap();
        assert!(matches!(features.get("good"), Some(TryParse::Parsed(_))));
        assert!(matches!(features.get("bad"), Some(TryParse::ParseFailed(_))));
    }

    #[test]
    fn payload_accepts_encrypted_variant() {
        let payload: FeaturesPayload =
            serde_json::from_value(json!({"encryptedFeatures": "abc.def"})).unwrap();
        assert!(payload.features.is_none());
        assert_eq!(payload.encrypted_features.as_deref(), Some("abc.def"));
    }
}
