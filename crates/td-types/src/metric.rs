//! Regex rules that pull numeric metrics out of unstructured job logs.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;

/// A named pattern with exactly one capture group.
///
/// Scanning logs with a regex is brittle to format drift. Services that
/// report structured metrics take precedence; rules are the fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "MetricRuleDef", into = "MetricRuleDef")]
pub struct MetricRule {
    name: String,
    regex: Regex,
}

/// Serialized shape of a [`MetricRule`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MetricRuleDef {
    name: String,
    #[serde(alias = "regex")]
    pattern: String,
}

impl MetricRule {
    /// Compile a rule, checking the pattern has a single capture group.
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                field: "metric.name".to_string(),
            });
        }

        let regex = Regex::new(pattern).map_err(|e| ValidationError::InvalidMetricPattern {
            name: name.clone(),
            message: e.to_string(),
        })?;

        // captures_len counts the implicit whole-match group.
        let groups = regex.captures_len() - 1;
        if groups != 1 {
            return Err(ValidationError::CaptureGroupCount { name, groups });
        }

        Ok(Self { name, regex })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    /// Value captured by the first match in `text`, if it parses as a number.
    pub fn extract(&self, text: &str) -> Option<f64> {
        let captures = self.regex.captures(text)?;
        let raw = captures.get(1)?.as_str().trim();
        raw.parse::<f64>().ok().filter(|v| v.is_finite())
    }
}

impl PartialEq for MetricRule {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.pattern() == other.pattern()
    }
}

impl TryFrom<MetricRuleDef> for MetricRule {
    type Error = ValidationError;

    fn try_from(def: MetricRuleDef) -> Result<Self, Self::Error> {
        Self::new(def.name, &def.pattern)
    }
}

impl From<MetricRule> for MetricRuleDef {
    fn from(rule: MetricRule) -> Self {
        Self {
            pattern: rule.regex.as_str().to_string(),
            name: rule.name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f1_rule() -> MetricRule {
        MetricRule::new("f1", r"'f1_': ([0-9.]+)").unwrap()
    }

    #[test]
    fn extracts_the_captured_number() {
        let log = "INFO results: {'exact_': 81.2, 'f1_': 0.894, 'total': 10570}";
        assert_eq!(f1_rule().extract(log), Some(0.894));
    }

    #[test]
    fn missing_match_is_absent() {
        assert_eq!(f1_rule().extract("epoch 1/1 done"), None);
        assert_eq!(f1_rule().extract(""), None);
    }

    #[test]
    fn first_match_wins() {
        let log = "'f1_': 0.5\n'f1_': 0.9";
        assert_eq!(f1_rule().extract(log), Some(0.5));
    }

    #[test]
    fn extraction_is_idempotent() {
        let rule = f1_rule();
        let log = "'f1_': 0.894";
        let first = rule.extract(log);
        assert_eq!(first, rule.extract(log));
        assert_eq!(first, rule.extract(log));
    }

    #[test]
    fn non_numeric_capture_is_absent() {
        let rule = MetricRule::new("acc", r"acc = (\S+)").unwrap();
        assert_eq!(rule.extract("acc = n/a"), None);
        assert_eq!(rule.extract("acc = 0.84"), Some(0.84));
    }

    #[test]
    fn capture_group_count_is_enforced() {
        assert_eq!(
            MetricRule::new("loss", r"loss: [0-9.]+"),
            Err(ValidationError::CaptureGroupCount {
                name: "loss".into(),
                groups: 0
            })
        );
        assert!(matches!(
            MetricRule::new("loss", r"(loss): ([0-9.]+)"),
            Err(ValidationError::CaptureGroupCount { groups: 2, .. })
        ));
        // Non-capturing groups do not count.
        assert!(MetricRule::new("loss", r"(?:train_)?loss: ([0-9.]+)").is_ok());
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        assert!(matches!(
            MetricRule::new("loss", r"loss: ([0-9.]+"),
            Err(ValidationError::InvalidMetricPattern { .. })
        ));
    }

    #[test]
    fn deserialization_validates_the_pattern() {
        let ok: MetricRule =
            serde_json::from_str(r#"{"name": "f1", "pattern": "'f1_': ([0-9.]+)"}"#).unwrap();
        assert_eq!(ok, f1_rule());

        let bad = serde_json::from_str::<MetricRule>(r#"{"name": "f1", "pattern": "f1"}"#);
        assert!(bad.is_err());
    }
}
