//! MongoDB-style targeting condition evaluation over JSON attributes.
//!
//! Conditions are plain JSON trees: logical operators (`$or`, `$nor`, `$and`, `$not`) at the top
//! level, and `path: matcher` entries otherwise. Paths are dot-separated and resolve through
//! nested objects and array indices; a path that resolves to nothing yields a distinct
//! *undefined* value (`None` here), which is never conflated with JSON `null`.

use std::cmp::Ordering;

use regex::Regex;
use serde_json::{Number, Value};

/// Evaluate `condition` against `attributes`, returning whether it matches.
///
/// Misconfigured conditions (unknown operators, malformed operands) never panic or error: the
/// affected condition simply does not match.
pub fn eval_condition(attributes: &Value, condition: &Value) -> bool {
    let Value::Object(condition) = condition else {
        return false;
    };
    if let Some(conditions) = condition.get("$or") {
        return eval_any(attributes, conditions);
    }
    if let Some(conditions) = condition.get("$nor") {
        return !eval_any(attributes, conditions);
    }
    if let Some(conditions) = condition.get("$and") {
        return eval_all(attributes, conditions);
    }
    if let Some(inner) = condition.get("$not") {
        return !eval_condition(attributes, inner);
    }

    condition
        .iter()
        .all(|(path, matcher)| eval_condition_value(matcher, get_path(attributes, path)))
}

/// `$or` over a list of conditions. An empty list matches.
fn eval_any(attributes: &Value, conditions: &Value) -> bool {
    let Value::Array(conditions) = conditions else {
        return false;
    };
    if conditions.is_empty() {
        return true;
    }
    conditions
        .iter()
        .any(|condition| eval_condition(attributes, condition))
}

/// `$and` over a list of conditions. An empty list matches.
fn eval_all(attributes: &Value, conditions: &Value) -> bool {
    let Value::Array(conditions) = conditions else {
        return false;
    };
    conditions
        .iter()
        .all(|condition| eval_condition(attributes, condition))
}

/// Resolve a dot-separated path against a JSON value. Each segment indexes an object by key or an
/// array by number; anything else resolves to undefined.
fn get_path<'a>(attributes: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = attributes;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// An operator object is a nonempty object whose keys are all `$`-prefixed.
fn is_operator_object(value: &Value) -> bool {
    match value {
        Value::Object(map) => !map.is_empty() && map.keys().all(|key| key.starts_with('$')),
        _ => false,
    }
}

/// Apply a matcher to the (possibly undefined) value found at a path.
fn eval_condition_value(matcher: &Value, value: Option<&Value>) -> bool {
    if is_operator_object(matcher) {
        let Value::Object(operators) = matcher else {
            unreachable!("operator objects are objects");
        };
        return operators
            .iter()
            .all(|(operator, operand)| eval_operator(operator, value, operand));
    }
    if matcher.is_object() {
        // A non-operator object is a nested condition applied to the value at the path.
        return eval_condition(value.unwrap_or(&Value::Null), matcher);
    }
    match value {
        Some(value) => json_eq(value, matcher),
        None => false,
    }
}

fn eval_operator(operator: &str, value: Option<&Value>, operand: &Value) -> bool {
    match operator {
        "$eq" => value.is_some_and(|v| json_eq(v, operand)),
        "$ne" => !value.is_some_and(|v| json_eq(v, operand)),
        "$lt" => compare(value, operand).is_some_and(|ordering| ordering == Ordering::Less),
        "$lte" => compare(value, operand).is_some_and(|ordering| ordering != Ordering::Greater),
        "$gt" => compare(value, operand).is_some_and(|ordering| ordering == Ordering::Greater),
        "$gte" => compare(value, operand).is_some_and(|ordering| ordering != Ordering::Less),
        "$regex" => {
            let (Some(value), Value::String(pattern)) = (value, operand) else {
                return false;
            };
            let Ok(regex) = Regex::new(pattern) else {
                return false;
            };
            scalar_string(value).is_some_and(|s| regex.is_match(&s))
        }
        "$in" => matches!(operand, Value::Array(_)) && in_list(value, operand),
        "$nin" => matches!(operand, Value::Array(_)) && !in_list(value, operand),
        "$all" => {
            let (Some(Value::Array(items)), Value::Array(matchers)) = (value, operand) else {
                return false;
            };
            matchers.iter().all(|matcher| {
                items
                    .iter()
                    .any(|item| eval_condition_value(matcher, Some(item)))
            })
        }
        "$elemMatch" => {
            let Some(Value::Array(items)) = value else {
                return false;
            };
            if is_operator_object(operand) {
                items
                    .iter()
                    .any(|item| eval_condition_value(operand, Some(item)))
            } else {
                items.iter().any(|item| eval_condition(item, operand))
            }
        }
        "$size" => {
            let Some(Value::Array(items)) = value else {
                return false;
            };
            let length = Value::from(items.len() as u64);
            eval_condition_value(operand, Some(&length))
        }
        "$exists" => {
            if is_truthy(operand) {
                value.is_some()
            } else {
                value.is_none()
            }
        }
        "$type" => operand.as_str().is_some_and(|name| name == type_name(value)),
        "$not" => !eval_condition_value(operand, value),
        "$veq" | "$vne" | "$vgt" | "$vgte" | "$vlt" | "$vlte" => {
            let Some(value) = value.and_then(scalar_string) else {
                return false;
            };
            let Some(target) = scalar_string(operand) else {
                return false;
            };
            let a = padded_version_string(&value);
            let b = padded_version_string(&target);
            match operator {
                "$veq" => a == b,
                "$vne" => a != b,
                "$vgt" => a > b,
                "$vgte" => a >= b,
                "$vlt" => a < b,
                "$vlte" => a <= b,
                _ => unreachable!(),
            }
        }
        _ => {
            log::warn!(target: "growthbook", "unknown condition operator {operator:?}");
            false
        }
    }
}

/// `$in` membership. Array values match when any of their elements is in the list.
fn in_list(value: Option<&Value>, list: &Value) -> bool {
    let Value::Array(list) = list else {
        return false;
    };
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .any(|item| list.iter().any(|candidate| json_eq(item, candidate))),
        Some(value) => list.iter().any(|candidate| json_eq(value, candidate)),
        None => false,
    }
}

/// Deep JSON equality that, unlike `Value`'s `PartialEq`, treats `1` and `1.0` as equal.
fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(a, b)| json_eq(a, b))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, a)| b.get(key).is_some_and(|b| json_eq(a, b)))
        }
        (a, b) => a == b,
    }
}

/// Ordering for the `$lt` family: numeric when both operands are numbers or numeric strings,
/// else lexicographic on canonical string forms. Undefined and composite values do not compare.
fn compare(value: Option<&Value>, operand: &Value) -> Option<Ordering> {
    let value = value?;
    if let (Some(a), Some(b)) = (as_number(value), as_number(operand)) {
        return a.partial_cmp(&b);
    }
    let a = scalar_string(value)?;
    let b = scalar_string(operand)?;
    Some(a.cmp(&b))
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Canonical string form of a scalar, matching how the wire format stringifies values for
/// hashing and comparisons: whole numbers render without a decimal point.
pub(crate) fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(number_string(n)),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn number_string(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    let f = n.as_f64().unwrap_or(0.0);
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

fn type_name(value: Option<&Value>) -> &'static str {
    match value {
        None => "undefined",
        Some(Value::Null) => "null",
        Some(Value::Bool(_)) => "boolean",
        Some(Value::Number(_)) => "number",
        Some(Value::String(_)) => "string",
        Some(Value::Array(_)) => "array",
        Some(Value::Object(_)) => "object",
    }
}

/// Truthiness used for `$exists` operands and `FeatureResult::on`: `null`, `false`, numeric `0`,
/// and the empty string are falsy; everything else (including `"0"` and `"false"`) is truthy.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Transform a version string so that lexicographic comparison orders versions correctly:
/// strip a leading `v` and any build metadata, split on dots and dashes, left pad numeric parts
/// with spaces to width 5, and append `~` to plain three-part releases so that prereleases sort
/// before them.
fn padded_version_string(version: &str) -> String {
    let version = version.strip_prefix('v').unwrap_or(version);
    let version = version.split('+').next().unwrap_or(version);
    let mut parts: Vec<&str> = version.split(['.', '-']).collect();
    if parts.len() == 3 {
        parts.push("~");
    }
    parts
        .iter()
        .map(|part| {
            if !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()) {
                format!("{part:>5}")
            } else {
                (*part).to_owned()
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn eval(attributes: serde_json::Value, condition: serde_json::Value) -> bool {
        eval_condition(&attributes, &condition)
    }

    #[test]
    fn direct_equality() {
        assert!(eval(json!({"browser": "chrome"}), json!({"browser": "chrome"})));
        assert!(!eval(json!({"browser": "safari"}), json!({"browser": "chrome"})));
        assert!(!eval(json!({}), json!({"browser": "chrome"})));
    }

    #[test]
    fn direct_equality_on_arrays_is_strict() {
        assert!(eval(json!({"tags": ["a", "b"]}), json!({"tags": ["a", "b"]})));
        assert!(!eval(json!({"tags": ["b", "a"]}), json!({"tags": ["a", "b"]})));
    }

    #[test]
    fn integer_and_float_forms_are_equal() {
        assert!(eval(json!({"age": 21.0}), json!({"age": 21})));
        assert!(eval(json!({"age": 21}), json!({"age": {"$eq": 21.0}})));
    }

    #[test]
    fn nested_paths() {
        let attributes = json!({"user": {"address": {"country": "fr"}}, "items": [10, 20]});
        assert!(eval(attributes.clone(), json!({"user.address.country": "fr"})));
        assert!(eval(attributes.clone(), json!({"items.1": 20})));
        assert!(!eval(attributes.clone(), json!({"items.2": {"$exists": true}})));
        assert!(!eval(attributes, json!({"user.missing.country": "fr"})));
    }

    #[test]
    fn non_operator_object_is_a_nested_condition() {
        let attributes = json!({"user": {"name": "alice", "age": 30}});
        assert!(eval(attributes.clone(), json!({"user": {"name": "alice"}})));
        assert!(!eval(attributes, json!({"user": {"name": "bob"}})));
    }

    #[test]
    fn logical_operators() {
        let attributes = json!({"age": 25, "country": "fr"});
        assert!(eval(
            attributes.clone(),
            json!({"$or": [{"age": {"$lt": 18}}, {"country": "fr"}]})
        ));
        assert!(eval(
            attributes.clone(),
            json!({"$and": [{"age": {"$gte": 18}}, {"country": "fr"}]})
        ));
        assert!(!eval(
            attributes.clone(),
            json!({"$nor": [{"country": "fr"}]})
        ));
        assert!(eval(attributes.clone(), json!({"$nor": [{"country": "us"}]})));
        assert!(eval(attributes, json!({"$not": {"country": "us"}})));
    }

    #[test]
    fn empty_logical_lists_match() {
        assert!(eval(json!({}), json!({"$or": []})));
        assert!(eval(json!({}), json!({"$nor": []})));
        assert!(eval(json!({}), json!({"$and": []})));
    }

    #[test]
    fn ne_matches_missing_attributes() {
        assert!(eval(json!({}), json!({"plan": {"$ne": "pro"}})));
        assert!(eval(json!({"plan": "free"}), json!({"plan": {"$ne": "pro"}})));
        assert!(!eval(json!({"plan": "pro"}), json!({"plan": {"$ne": "pro"}})));
    }

    #[test]
    fn numeric_comparisons() {
        assert!(eval(json!({"age": 20}), json!({"age": {"$gt": 18, "$lt": 65}})));
        assert!(!eval(json!({"age": 18}), json!({"age": {"$gt": 18}})));
        assert!(eval(json!({"age": 18}), json!({"age": {"$gte": 18}})));
        assert!(!eval(json!({}), json!({"age": {"$lt": 65}})));
    }

    #[test]
    fn numeric_strings_compare_numerically() {
        assert!(eval(json!({"age": "20"}), json!({"age": {"$gt": 9}})));
        assert!(eval(json!({"age": 20}), json!({"age": {"$gt": "9"}})));
    }

    #[test]
    fn plain_strings_compare_lexicographically() {
        assert!(eval(json!({"word": "apple"}), json!({"word": {"$lt": "banana"}})));
        assert!(!eval(json!({"word": "cherry"}), json!({"word": {"$lt": "banana"}})));
    }

    #[test]
    fn regex_operator() {
        assert!(eval(
            json!({"email": "test@example.com"}),
            json!({"email": {"$regex": "^test"}})
        ));
        assert!(!eval(
            json!({"email": "other@example.com"}),
            json!({"email": {"$regex": "^test"}})
        ));
        // Invalid patterns never match.
        assert!(!eval(json!({"email": "x"}), json!({"email": {"$regex": "(("}})));
    }

    #[test]
    fn in_and_nin() {
        assert!(eval(json!({"country": "fr"}), json!({"country": {"$in": ["fr", "de"]}})));
        assert!(!eval(json!({"country": "us"}), json!({"country": {"$in": ["fr", "de"]}})));
        assert!(eval(json!({"country": "us"}), json!({"country": {"$nin": ["fr", "de"]}})));
        assert!(eval(json!({}), json!({"country": {"$nin": ["fr", "de"]}})));
        // Array attributes match on overlap.
        assert!(eval(json!({"tags": ["a", "b"]}), json!({"tags": {"$in": ["b", "c"]}})));
        assert!(!eval(json!({"tags": ["a", "b"]}), json!({"tags": {"$in": ["c"]}})));
        // A non-array operand is a misconfiguration and never matches.
        assert!(!eval(json!({"country": "fr"}), json!({"country": {"$nin": "fr"}})));
    }

    #[test]
    fn all_operator() {
        let attributes = json!({"tags": ["a", "b", "c"]});
        assert!(eval(attributes.clone(), json!({"tags": {"$all": ["a", "c"]}})));
        assert!(!eval(attributes.clone(), json!({"tags": {"$all": ["a", "d"]}})));
        assert!(!eval(json!({"tags": "a"}), json!({"tags": {"$all": ["a"]}})));
    }

    #[test]
    fn elem_match_with_operator_object() {
        let attributes = json!({"scores": [3, 7, 12]});
        assert!(eval(attributes.clone(), json!({"scores": {"$elemMatch": {"$gt": 10}}})));
        assert!(!eval(attributes, json!({"scores": {"$elemMatch": {"$gt": 20}}})));
    }

    #[test]
    fn elem_match_with_nested_condition() {
        let attributes = json!({"orders": [{"total": 5}, {"total": 50}]});
        assert!(eval(
            attributes.clone(),
            json!({"orders": {"$elemMatch": {"total": {"$gt": 30}}}})
        ));
        assert!(!eval(
            attributes,
            json!({"orders": {"$elemMatch": {"total": {"$gt": 100}}}})
        ));
    }

    #[test]
    fn size_operator() {
        let attributes = json!({"tags": ["a", "b", "c"]});
        assert!(eval(attributes.clone(), json!({"tags": {"$size": 3}})));
        assert!(!eval(attributes.clone(), json!({"tags": {"$size": 2}})));
        assert!(eval(attributes.clone(), json!({"tags": {"$size": {"$gt": 2}}})));
        assert!(!eval(json!({"tags": "abc"}), json!({"tags": {"$size": 3}})));
    }

    #[test]
    fn exists_distinguishes_null_from_missing() {
        assert!(eval(json!({"name": null}), json!({"name": {"$exists": true}})));
        assert!(!eval(json!({}), json!({"name": {"$exists": true}})));
        assert!(eval(json!({}), json!({"name": {"$exists": false}})));
        assert!(!eval(json!({"name": "x"}), json!({"name": {"$exists": false}})));
    }

    #[test]
    fn type_operator() {
        assert!(eval(json!({"x": "s"}), json!({"x": {"$type": "string"}})));
        assert!(eval(json!({"x": 1}), json!({"x": {"$type": "number"}})));
        assert!(eval(json!({"x": null}), json!({"x": {"$type": "null"}})));
        assert!(eval(json!({"x": [1]}), json!({"x": {"$type": "array"}})));
        assert!(eval(json!({"x": {}}), json!({"x": {"$type": "object"}})));
        assert!(eval(json!({}), json!({"x": {"$type": "undefined"}})));
        assert!(!eval(json!({"x": null}), json!({"x": {"$type": "undefined"}})));
    }

    #[test]
    fn not_matcher() {
        assert!(eval(json!({"age": 20}), json!({"age": {"$not": {"$lt": 18}}})));
        assert!(!eval(json!({"age": 10}), json!({"age": {"$not": {"$lt": 18}}})));
    }

    #[test]
    fn version_comparisons() {
        assert!(eval(json!({"v": "1.2.3"}), json!({"v": {"$vlt": "1.2.4"}})));
        assert!(eval(json!({"v": "1.10.0"}), json!({"v": {"$vgt": "1.9.0"}})));
        assert!(eval(json!({"v": "v1.2.3"}), json!({"v": {"$veq": "1.2.3"}})));
        assert!(eval(json!({"v": "1.2.3+build42"}), json!({"v": {"$veq": "1.2.3"}})));
        assert!(eval(json!({"v": "1.2.3"}), json!({"v": {"$vne": "1.2.4"}})));
        assert!(eval(json!({"v": "1.2"}), json!({"v": {"$vlte": "1.2"}})));
        assert!(!eval(json!({}), json!({"v": {"$vgte": "1.0.0"}})));
    }

    #[test]
    fn prereleases_sort_before_releases() {
        assert!(eval(json!({"v": "1.0.0-beta"}), json!({"v": {"$vlt": "1.0.0"}})));
        assert!(eval(json!({"v": "1.0.0"}), json!({"v": {"$vgt": "1.0.0-rc.1"}})));
        assert!(eval(json!({"v": "1.0.0-alpha"}), json!({"v": {"$vlt": "1.0.0-beta"}})));
    }

    #[test]
    fn unknown_operator_fails_the_condition() {
        assert!(!eval(json!({"x": 1}), json!({"x": {"$near": 1}})));
    }

    #[test]
    fn operator_object_requires_all_dollar_keys() {
        // A mixed object is not an operator object; it is a nested condition, and `$gt` is then
        // treated as a path that resolves to undefined.
        assert!(!eval(json!({"x": {"a": 1}}), json!({"x": {"$gt": 0, "a": 1}})));
    }
}
