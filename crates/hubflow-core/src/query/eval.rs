// ── Query evaluation ──

use std::cmp::Ordering;

use serde_json::Value;

use super::{Query, QueryError};
use crate::model::{Device, values_equal};

/// Three-valued evaluation result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Match,
    NoMatch,
    /// The addressed attribute is absent on this device.
    Missing,
}

impl Outcome {
    pub fn is_match(self) -> bool {
        self == Self::Match
    }

    fn from_bool(b: bool) -> Self {
        if b { Self::Match } else { Self::NoMatch }
    }
}

impl Query {
    /// Evaluate against a device.
    ///
    /// Every branch is visited, so a malformed sub-query is reported no
    /// matter how the other branches evaluate.
    pub fn evaluate(&self, device: &Device) -> Result<Outcome, QueryError> {
        match self {
            Self::All => Ok(Outcome::Match),

            Self::Eq { path, value } => leaf(device, path, |actual| {
                Ok(Outcome::from_bool(values_equal(actual, value)))
            }),
            Self::Ne { path, value } => leaf(device, path, |actual| {
                Ok(Outcome::from_bool(!values_equal(actual, value)))
            }),
            Self::Lt { path, value } => compare(device, path, value, Ordering::is_lt),
            Self::Le { path, value } => compare(device, path, value, Ordering::is_le),
            Self::Gt { path, value } => compare(device, path, value, Ordering::is_gt),
            Self::Ge { path, value } => compare(device, path, value, Ordering::is_ge),

            Self::Contains { path, value } => leaf(device, path, |actual| {
                let hit = match (actual, value) {
                    (Value::String(s), Value::String(needle)) => s.contains(needle.as_str()),
                    (Value::Array(items), needle) => items.iter().any(|i| values_equal(i, needle)),
                    _ => false,
                };
                Ok(Outcome::from_bool(hit))
            }),

            Self::In { path, values } => {
                let Value::Array(candidates) = values else {
                    return Err(QueryError::malformed(format!(
                        "`in` on {path} expects an array of values"
                    )));
                };
                leaf(device, path, |actual| {
                    Ok(Outcome::from_bool(
                        candidates.iter().any(|c| values_equal(actual, c)),
                    ))
                })
            }

            Self::Matches { path, pattern } => {
                let re = pattern.regex().map_err(|e| {
                    QueryError::malformed(format!("invalid pattern for {path}: {e}"))
                })?;
                leaf(device, path, |actual| {
                    Ok(Outcome::from_bool(
                        actual.as_str().is_some_and(|s| re.is_match(s)),
                    ))
                })
            }

            Self::Exists { path } => {
                validate_path(path)?;
                Ok(Outcome::from_bool(device.lookup(path).is_some()))
            }

            Self::And { all } => {
                if all.is_empty() {
                    return Err(QueryError::malformed("`and` needs at least one operand"));
                }
                let outcomes = all
                    .iter()
                    .map(|q| q.evaluate(device))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(if outcomes.contains(&Outcome::NoMatch) {
                    Outcome::NoMatch
                } else if outcomes.contains(&Outcome::Missing) {
                    Outcome::Missing
                } else {
                    Outcome::Match
                })
            }

            Self::Or { any } => {
                if any.is_empty() {
                    return Err(QueryError::malformed("`or` needs at least one operand"));
                }
                let outcomes = any
                    .iter()
                    .map(|q| q.evaluate(device))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(if outcomes.contains(&Outcome::Match) {
                    Outcome::Match
                } else if outcomes.contains(&Outcome::Missing) {
                    Outcome::Missing
                } else {
                    Outcome::NoMatch
                })
            }

            Self::Not { not } => Ok(match not.evaluate(device)? {
                Outcome::Match => Outcome::NoMatch,
                Outcome::NoMatch => Outcome::Match,
                Outcome::Missing => Outcome::Missing,
            }),
        }
    }

    /// Convenience wrapper: `true` only on [`Outcome::Match`].
    pub fn is_match(&self, device: &Device) -> Result<bool, QueryError> {
        self.evaluate(device).map(Outcome::is_match)
    }
}

fn validate_path(path: &str) -> Result<(), QueryError> {
    if path.is_empty() || path.split('.').any(str::is_empty) {
        return Err(QueryError::malformed(format!("invalid attribute path {path:?}")));
    }
    Ok(())
}

fn leaf(
    device: &Device,
    path: &str,
    test: impl FnOnce(&Value) -> Result<Outcome, QueryError>,
) -> Result<Outcome, QueryError> {
    validate_path(path)?;
    match device.lookup(path) {
        Some(actual) => test(&actual),
        None => Ok(Outcome::Missing),
    }
}

fn compare(
    device: &Device,
    path: &str,
    value: &Value,
    accept: fn(Ordering) -> bool,
) -> Result<Outcome, QueryError> {
    let Some(bound) = value.as_f64() else {
        return Err(QueryError::malformed(format!(
            "ordering on {path} needs a numeric operand, got {value}"
        )));
    };
    leaf(device, path, |actual| {
        let hit = actual
            .as_f64()
            .and_then(|a| a.partial_cmp(&bound))
            .is_some_and(accept);
        Ok(Outcome::from_bool(hit))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::model::Domain;

    fn sensor() -> Device {
        let record = serde_json::from_value(json!({
            "name": "Kitchen temperature",
            "type": "ZHATemperature",
            "state": { "temperature": 2150, "lastupdated": "2024-01-01T10:00:00" },
            "config": { "battery": 80, "on": true, "tags": ["kitchen", "ground"] }
        }))
        .unwrap();
        Device::from_record(Domain::Sensors, "3", record)
    }

    #[test]
    fn leaf_operators() {
        let d = sensor();
        assert_eq!(Query::eq("type", "ZHATemperature").evaluate(&d), Ok(Outcome::Match));
        assert_eq!(Query::ne("config.battery", 80).evaluate(&d), Ok(Outcome::NoMatch));
        assert_eq!(Query::gt("state.temperature", 2000).evaluate(&d), Ok(Outcome::Match));
        assert_eq!(Query::lt("config.battery", 80.0).evaluate(&d), Ok(Outcome::NoMatch));
        assert_eq!(
            Query::Le { path: "config.battery".into(), value: json!(80) }.evaluate(&d),
            Ok(Outcome::Match)
        );
        assert_eq!(
            Query::Contains { path: "config.tags".into(), value: json!("kitchen") }.evaluate(&d),
            Ok(Outcome::Match)
        );
        assert_eq!(
            Query::Contains { path: "name".into(), value: json!("temp") }.evaluate(&d),
            Ok(Outcome::Match)
        );
        assert_eq!(
            Query::In { path: "id".into(), values: json!(["1", "3"]) }.evaluate(&d),
            Ok(Outcome::Match)
        );
        assert_eq!(Query::matches("name", "^Kitchen").evaluate(&d), Ok(Outcome::Match));
    }

    #[test]
    fn absent_attribute_is_missing_not_a_match() {
        let d = sensor();
        assert_eq!(Query::eq("state.presence", true).evaluate(&d), Ok(Outcome::Missing));
        assert_eq!(Query::not(Query::eq("state.presence", true)).evaluate(&d), Ok(Outcome::Missing));
        assert_eq!(Query::exists("state.presence").evaluate(&d), Ok(Outcome::NoMatch));
        assert_eq!(Query::exists("state.temperature").evaluate(&d), Ok(Outcome::Match));
        assert!(!Query::ne("state.presence", true).is_match(&d).unwrap());
    }

    #[test]
    fn connectives_use_three_valued_logic() {
        let d = sensor();
        let missing = Query::eq("state.presence", true);
        let yes = Query::eq("config.on", true);
        let no = Query::eq("config.on", false);

        assert_eq!(Query::and([yes.clone(), missing.clone()]).evaluate(&d), Ok(Outcome::Missing));
        assert_eq!(Query::and([no.clone(), missing.clone()]).evaluate(&d), Ok(Outcome::NoMatch));
        assert_eq!(Query::or([yes.clone(), missing.clone()]).evaluate(&d), Ok(Outcome::Match));
        assert_eq!(Query::or([no.clone(), missing]).evaluate(&d), Ok(Outcome::Missing));
        assert_eq!(Query::or([no, yes]).evaluate(&d), Ok(Outcome::Match));
        assert_eq!(Query::All.evaluate(&d), Ok(Outcome::Match));
    }

    #[test]
    fn non_numeric_actual_does_not_match_ordering() {
        let d = sensor();
        assert_eq!(Query::gt("name", 1).evaluate(&d), Ok(Outcome::NoMatch));
    }

    #[test]
    fn malformed_queries_are_errors() {
        let d = sensor();
        assert!(Query::gt("config.battery", "high").evaluate(&d).is_err());
        assert!(Query::matches("name", "(unclosed").evaluate(&d).is_err());
        assert!(Query::eq("state..on", true).evaluate(&d).is_err());
        assert!(Query::eq("", true).evaluate(&d).is_err());
        assert!(Query::and(Vec::new()).evaluate(&d).is_err());
        assert!(Query::or(Vec::new()).evaluate(&d).is_err());
        assert!(
            Query::In { path: "id".into(), values: json!("3") }.evaluate(&d).is_err()
        );
    }

    #[test]
    fn malformed_branch_is_reported_even_when_sibling_decides() {
        let d = sensor();
        let q = Query::and([Query::eq("config.on", false), Query::gt("config.battery", "x")]);
        assert!(q.evaluate(&d).is_err());
    }
}
