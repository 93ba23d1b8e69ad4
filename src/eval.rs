//! Feature and experiment evaluation.
//!
//! Evaluation is pure: results are a function of the feature map and the context, and no call
//! here blocks or errors. A snapshot of the feature map is taken once per top-level call and used
//! for the whole prerequisite recursion.

use serde_json::{json, Value};

use crate::bucketing;
use crate::condition::{eval_condition, is_truthy};
use crate::context::Context;
use crate::hashing::bucket_hash;
use crate::model::{
    Experiment, ExperimentResult, Feature, FeatureMap, FeatureResult, FeatureRule, FeatureSource,
    Filter,
};

/// Evaluate the feature with the given id for the context.
///
/// Never fails: unknown features, prerequisite cycles, and unmet gating prerequisites are all
/// encoded in [`FeatureResult::source`].
pub fn eval_feature(context: &Context, feature_id: &str) -> FeatureResult {
    let features = context.features();
    eval_feature_with_map(context, &features, feature_id, &mut Vec::new())
}

/// Run an experiment for the context.
pub fn run_experiment(context: &Context, experiment: &Experiment) -> ExperimentResult {
    let features = context.features();
    run_with_map(context, &features, experiment, None, &mut Vec::new())
}

fn eval_feature_with_map(
    context: &Context,
    features: &FeatureMap,
    feature_id: &str,
    path: &mut Vec<String>,
) -> FeatureResult {
    if path.iter().any(|id| id == feature_id) {
        log::warn!(target: "growthbook", "prerequisite cycle detected at feature {feature_id:?}");
        return feature_result(Value::Null, FeatureSource::CyclicPrerequisite, None, None);
    }
    let Some(feature) = features.get(feature_id) else {
        log::trace!(target: "growthbook", "unknown feature {feature_id:?}");
        return feature_result(Value::Null, FeatureSource::UnknownFeature, None, None);
    };

    path.push(feature_id.to_owned());
    let result = eval_rules(context, features, feature_id, feature, path);
    path.pop();

    log::trace!(target: "growthbook", "evaluated feature {feature_id:?}: {:?} from {:?}", result.value, result.source);
    result
}

fn eval_rules(
    context: &Context,
    features: &FeatureMap,
    feature_id: &str,
    feature: &Feature,
    path: &mut Vec<String>,
) -> FeatureResult {
    'rules: for rule in &feature.rules {
        for parent in &rule.parent_conditions {
            let parent_result = eval_feature_with_map(context, features, &parent.id, path);
            if parent_result.source == FeatureSource::CyclicPrerequisite {
                return feature_result(Value::Null, FeatureSource::CyclicPrerequisite, None, None);
            }
            if !eval_condition(&json!({ "value": parent_result.value }), &parent.condition) {
                if parent.gate {
                    log::debug!(target: "growthbook", "feature {feature_id:?} blocked by prerequisite {:?}", parent.id);
                    return feature_result(Value::Null, FeatureSource::Prerequisite, None, None);
                }
                continue 'rules;
            }
        }

        if is_filtered_out(&rule.filters, &context.attributes) {
            continue;
        }

        if let Some(condition) = &rule.condition {
            if !eval_condition(&context.attributes, condition) {
                continue;
            }
        }

        if let Some(force) = &rule.force {
            let seed = rule.seed.as_deref().unwrap_or(feature_id);
            if !bucketing::included_in_rollout(
                &context.attributes,
                seed,
                rule.hash_attribute.as_deref(),
                rule.fallback_attribute.as_deref(),
                rule.range.as_ref(),
                rule.coverage,
                rule.hash_version.unwrap_or(1),
            ) {
                continue;
            }
            return feature_result(force.clone(), FeatureSource::Force, None, None);
        }

        let Some(variations) = &rule.variations else {
            log::warn!(target: "growthbook", "skipping rule on feature {feature_id:?} with neither force nor variations");
            continue;
        };
        let experiment = experiment_from_rule(feature_id, rule, variations.clone());
        let result = run_with_map(context, features, &experiment, Some(feature_id), path);
        if result.in_experiment && !result.passthrough {
            let value = result.value.clone();
            return feature_result(
                value,
                FeatureSource::Experiment,
                Some(experiment),
                Some(result),
            );
        }
    }

    feature_result(
        feature.default_value.clone(),
        FeatureSource::DefaultValue,
        None,
        None,
    )
}

/// An experiment rule carries the experiment inline; lift it into a standalone [`Experiment`].
/// Parent conditions stay behind: they were already enforced at the rule level.
fn experiment_from_rule(
    feature_id: &str,
    rule: &FeatureRule,
    variations: Vec<Value>,
) -> Experiment {
    Experiment {
        key: rule.key.clone().unwrap_or_else(|| feature_id.to_owned()),
        variations,
        weights: rule.weights.clone(),
        active: true,
        coverage: rule.coverage,
        ranges: rule.ranges.clone(),
        condition: rule.condition.clone(),
        parent_conditions: Vec::new(),
        namespace: rule.namespace.clone(),
        force: None,
        hash_attribute: rule.hash_attribute.clone(),
        fallback_attribute: rule.fallback_attribute.clone(),
        hash_version: rule.hash_version,
        meta: rule.meta.clone(),
        filters: rule.filters.clone(),
        seed: rule.seed.clone(),
        name: rule.name.clone(),
        phase: rule.phase.clone(),
        disable_sticky_bucketing: rule.disable_sticky_bucketing,
        bucket_version: rule.bucket_version,
        min_bucket_version: rule.min_bucket_version,
    }
}

fn run_with_map(
    context: &Context,
    features: &FeatureMap,
    experiment: &Experiment,
    feature_id: Option<&str>,
    path: &mut Vec<String>,
) -> ExperimentResult {
    // Experiments need at least two variations.
    if experiment.variations.len() < 2 {
        return experiment_result(context, experiment, -1, false, feature_id, None);
    }
    if !context.enabled {
        return experiment_result(context, experiment, -1, false, feature_id, None);
    }

    // Overrides take precedence over everything, including `active`.
    if let Some(url) = &context.url {
        if let Some(forced) =
            bucketing::query_string_override(&experiment.key, url, experiment.variations.len())
        {
            return experiment_result(context, experiment, forced, false, feature_id, None);
        }
    }
    if let Some(&forced) = context.forced_variations.get(&experiment.key) {
        return experiment_result(context, experiment, forced, false, feature_id, None);
    }

    if !experiment.active {
        return experiment_result(context, experiment, -1, false, feature_id, None);
    }

    let (_, hash_value) = bucketing::hash_attribute_value(
        &context.attributes,
        experiment.hash_attribute.as_deref(),
        experiment.fallback_attribute.as_deref(),
    );
    if hash_value.is_empty() {
        log::debug!(target: "growthbook", "skipping experiment {:?}: no value for hashing attribute", experiment.key);
        return experiment_result(context, experiment, -1, false, feature_id, None);
    }

    // Filters supersede the namespace check.
    if !experiment.filters.is_empty() {
        if is_filtered_out(&experiment.filters, &context.attributes) {
            return experiment_result(context, experiment, -1, false, feature_id, None);
        }
    } else if let Some(namespace) = &experiment.namespace {
        if !bucketing::in_namespace(&hash_value, namespace) {
            return experiment_result(context, experiment, -1, false, feature_id, None);
        }
    }

    if let Some(condition) = &experiment.condition {
        if !eval_condition(&context.attributes, condition) {
            return experiment_result(context, experiment, -1, false, feature_id, None);
        }
    }

    for parent in &experiment.parent_conditions {
        let parent_result = eval_feature_with_map(context, features, &parent.id, path);
        if parent_result.source == FeatureSource::CyclicPrerequisite {
            return experiment_result(context, experiment, -1, false, feature_id, None);
        }
        if !eval_condition(&json!({ "value": parent_result.value }), &parent.condition) {
            return experiment_result(context, experiment, -1, false, feature_id, None);
        }
    }

    let ranges = match &experiment.ranges {
        Some(ranges) => ranges.clone(),
        None => bucketing::bucket_ranges(
            experiment.variations.len(),
            experiment.coverage.unwrap_or(1.0),
            experiment.weights.as_deref().unwrap_or(&[]),
        ),
    };
    let seed = experiment.seed.as_deref().unwrap_or(&experiment.key);
    let Some(n) = bucket_hash(seed, &hash_value, experiment.hash_version.unwrap_or(1)) else {
        log::warn!(target: "growthbook", "experiment {:?} uses an unknown hash version", experiment.key);
        return experiment_result(context, experiment, -1, false, feature_id, None);
    };
    let chosen = bucketing::choose_variation(n, &ranges);

    if chosen < 0 {
        return experiment_result(context, experiment, -1, false, feature_id, None);
    }
    if let Some(forced) = experiment.force {
        return experiment_result(context, experiment, forced, false, feature_id, None);
    }
    if context.qa_mode {
        return experiment_result(context, experiment, -1, false, feature_id, None);
    }

    experiment_result(context, experiment, chosen, true, feature_id, Some(n))
}

/// A rule or experiment is filtered out when *any* of its filters excludes the context: a filter
/// excludes when its attribute is empty or its hash lands outside every range.
fn is_filtered_out(filters: &[Filter], attributes: &Value) -> bool {
    filters.iter().any(|filter| {
        let (_, hash_value) =
            bucketing::hash_attribute_value(attributes, Some(&filter.attribute), None);
        if hash_value.is_empty() {
            return true;
        }
        match bucket_hash(&filter.seed, &hash_value, filter.hash_version) {
            Some(n) => !filter.ranges.iter().any(|range| range.contains(n)),
            None => true,
        }
    })
}

fn feature_result(
    value: Value,
    source: FeatureSource,
    experiment: Option<Experiment>,
    experiment_result: Option<ExperimentResult>,
) -> FeatureResult {
    let on = is_truthy(&value);
    FeatureResult {
        on,
        off: !on,
        value,
        source,
        experiment,
        experiment_result,
    }
}

/// Build an [`ExperimentResult`]. A variation index outside `variations` (notably `-1`) marks the
/// context as not enrolled and reports variation 0.
fn experiment_result(
    context: &Context,
    experiment: &Experiment,
    variation_index: i32,
    hash_used: bool,
    feature_id: Option<&str>,
    bucket: Option<f64>,
) -> ExperimentResult {
    let mut in_experiment = true;
    let mut variation_index = variation_index;
    if variation_index < 0 || variation_index as usize >= experiment.variations.len() {
        variation_index = 0;
        in_experiment = false;
    }

    let (hash_attribute, hash_value) = bucketing::hash_attribute_value(
        &context.attributes,
        experiment.hash_attribute.as_deref(),
        experiment.fallback_attribute.as_deref(),
    );
    let meta = experiment.meta.get(variation_index as usize);

    ExperimentResult {
        in_experiment,
        variation_id: variation_index,
        value: experiment
            .variations
            .get(variation_index as usize)
            .cloned()
            .unwrap_or(Value::Null),
        hash_used,
        hash_attribute,
        hash_value,
        feature_id: feature_id.map(str::to_owned),
        key: meta
            .and_then(|meta| meta.key.clone())
            .unwrap_or_else(|| variation_index.to_string()),
        bucket,
        name: meta.and_then(|meta| meta.name.clone()),
        passthrough: meta.map(|meta| meta.passthrough).unwrap_or(false),
        sticky_bucket_used: false,
    }
}
