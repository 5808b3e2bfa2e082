use std::collections::BTreeMap;
use std::env;

use super::types::{ConfigError, Environment};

pub(super) fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

pub(super) fn env_or_default(key: &str, default: &str) -> String {
    env_optional(key).unwrap_or_else(|| default.to_string())
}

pub(super) fn env_required(key: &'static str) -> Result<String, ConfigError> {
    env_optional(key).ok_or(ConfigError::MissingValue(key))
}

pub(super) fn parse_u32(field: &'static str, value: String) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidValue { field, value })
}

pub(super) fn parse_u64(field: &'static str, value: String) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidValue { field, value })
}

pub(super) fn parse_i64(field: &'static str, value: String) -> Result<i64, ConfigError> {
    value.parse::<i64>().map_err(|_| ConfigError::InvalidValue { field, value })
}

/// Accepts either a JSON array or a comma separated list.
pub(super) fn parse_question_ids(field: &'static str, raw: String) -> Result<Vec<String>, ConfigError> {
    if raw.trim_start().starts_with('[') {
        let parsed: Vec<serde_json::Value> = serde_json::from_str(&raw)
            .map_err(|_| ConfigError::InvalidValue { field, value: raw.clone() })?;
        return parsed
            .into_iter()
            .map(|item| match item {
                serde_json::Value::String(value) => Ok(value.trim().to_string()),
                serde_json::Value::Number(value) => Ok(value.to_string()),
                other => Err(ConfigError::InvalidValue { field, value: other.to_string() }),
            })
            .filter(|item| !matches!(item, Ok(value) if value.is_empty()))
            .collect();
    }

    Ok(raw
        .split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect())
}

pub(super) fn parse_answer_map(
    field: &'static str,
    value: Option<String>,
) -> Result<BTreeMap<String, String>, ConfigError> {
    let Some(raw) = value else {
        return Ok(BTreeMap::new());
    };

    let parsed: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&raw)
        .map_err(|_| ConfigError::InvalidValue { field, value: raw.clone() })?;

    Ok(parsed
        .into_iter()
        .filter_map(|(question_id, answer)| match answer {
            serde_json::Value::String(text) => Some((question_id, text)),
            serde_json::Value::Null => None,
            other => Some((question_id, other.to_string())),
        })
        .collect())
}

pub(super) fn parse_bool(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "yes" | "YES" | "on" | "ON")
}

pub(super) fn parse_environment(value: Option<String>) -> Environment {
    match value.as_deref().map(|item| item.to_lowercase()) {
        Some(ref val) if val == "production" || val == "prod" => Environment::Production,
        Some(ref val) if val == "staging" => Environment::Staging,
        Some(ref val) if val == "test" || val == "testing" => Environment::Test,
        _ => Environment::Development,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_question_ids_json() {
        let raw = "[\"q1\", 7, \" q3 \"]".to_string();
        let parsed = parse_question_ids("EXAM_QUESTION_IDS", raw).expect("ids json");
        assert_eq!(parsed, vec!["q1".to_string(), "7".to_string(), "q3".to_string()]);
    }

    #[test]
    fn parse_question_ids_csv() {
        let raw = "q1, q2,,q3".to_string();
        let parsed = parse_question_ids("EXAM_QUESTION_IDS", raw).expect("ids csv");
        assert_eq!(parsed, vec!["q1".to_string(), "q2".to_string(), "q3".to_string()]);
    }

    #[test]
    fn parse_question_ids_rejects_nested_values() {
        let raw = "[[\"q1\"]]".to_string();
        assert!(parse_question_ids("EXAM_QUESTION_IDS", raw).is_err());
    }

    #[test]
    fn parse_answer_map_skips_nulls() {
        let raw = "{\"q1\": \"B\", \"q2\": null, \"q3\": 42}".to_string();
        let parsed = parse_answer_map("EXAM_EXISTING_ANSWERS", Some(raw)).expect("answers");
        assert_eq!(parsed.get("q1").map(String::as_str), Some("B"));
        assert_eq!(parsed.get("q3").map(String::as_str), Some("42"));
        assert!(!parsed.contains_key("q2"));
    }

    #[test]
    fn parse_bool_variants() {
        assert!(parse_bool("1"));
        assert!(parse_bool("true"));
        assert!(parse_bool("TRUE"));
        assert!(parse_bool("yes"));
        assert!(parse_bool("on"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("0"));
    }

    #[test]
    fn parse_environment_variants() {
        assert_eq!(parse_environment(Some("prod".to_string())), Environment::Production);
        assert_eq!(parse_environment(Some("production".to_string())), Environment::Production);
        assert_eq!(parse_environment(Some("staging".to_string())), Environment::Staging);
        assert_eq!(parse_environment(Some("testing".to_string())), Environment::Test);
        assert_eq!(parse_environment(None), Environment::Development);
    }
}
