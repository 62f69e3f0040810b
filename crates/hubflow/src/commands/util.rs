//! Shared helpers for command handlers.

use hubflow_core::Query;
use serde_json::Value;

use crate::cli::FilterArgs;
use crate::error::CliError;

/// Combine `--domain`, `--where` and `--query` into one query.
///
/// No filter at all selects every device.
pub fn build_query(filter: &FilterArgs) -> Result<Query, CliError> {
    let mut parts = Vec::new();

    if let Some(ref domain) = filter.domain {
        parts.push(Query::eq("domain", domain.as_str()));
    }

    for clause in &filter.filters {
        parts.push(parse_where(clause)?);
    }

    if let Some(ref raw) = filter.query {
        let query: Query = serde_json::from_str(raw).map_err(|e| CliError::InvalidQuery {
            reason: e.to_string(),
        })?;
        parts.push(query);
    }

    Ok(match parts.len() {
        0 => Query::All,
        1 => parts.remove(0),
        _ => Query::and(parts),
    })
}

/// Whether any filter flag was given.
pub fn has_filter(filter: &FilterArgs) -> bool {
    filter.domain.is_some() || !filter.filters.is_empty() || filter.query.is_some()
}

/// Parse `path=value`. The value is read as JSON when it parses
/// (`true`, `42`, `"x"`), otherwise as a bare string.
fn parse_where(clause: &str) -> Result<Query, CliError> {
    let Some((path, raw)) = clause.split_once('=') else {
        return Err(CliError::Validation {
            field: "where".into(),
            reason: format!("expected PATH=VALUE, got '{clause}'"),
        });
    };
    let path = path.trim();
    if path.is_empty() {
        return Err(CliError::Validation {
            field: "where".into(),
            reason: format!("empty attribute path in '{clause}'"),
        });
    }
    let value = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::from(raw));
    Ok(Query::eq(path, value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn filter(domain: Option<&str>, filters: &[&str], query: Option<&str>) -> FilterArgs {
        FilterArgs {
            domain: domain.map(Into::into),
            filters: filters.iter().map(ToString::to_string).collect(),
            query: query.map(Into::into),
        }
    }

    #[test]
    fn no_filter_selects_everything() {
        assert_eq!(build_query(&FilterArgs::default()).unwrap(), Query::All);
        assert!(!has_filter(&FilterArgs::default()));
    }

    #[test]
    fn where_values_are_typed_when_possible() {
        let query = build_query(&filter(None, &["state.on=true"], None)).unwrap();
        assert_eq!(query, Query::eq("state.on", true));

        let query = build_query(&filter(None, &["name=Hall light"], None)).unwrap();
        assert_eq!(query, Query::eq("name", "Hall light"));
    }

    #[test]
    fn filters_combine_with_and() {
        let query = build_query(&filter(
            Some("sensors"),
            &["config.battery=90"],
            Some(r#"{"op":"exists","path":"state.buttonevent"}"#),
        ))
        .unwrap();

        assert_eq!(
            query,
            Query::and(vec![
                Query::eq("domain", "sensors"),
                Query::eq("config.battery", json!(90)),
                Query::exists("state.buttonevent"),
            ])
        );
    }

    #[test]
    fn malformed_clauses_are_rejected() {
        assert!(matches!(
            build_query(&filter(None, &["no-equals-sign"], None)),
            Err(CliError::Validation { .. })
        ));
        assert!(matches!(
            build_query(&filter(None, &[], Some("{\"op\":\"nope\"}"))),
            Err(CliError::InvalidQuery { .. })
        ));
    }
}
