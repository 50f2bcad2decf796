//! Typed hyperparameter values and their flat string wire form.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::ValidationError;

/// A primitive hyperparameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Hyperparameters after validation, keyed by name.
pub type ScalarMap = BTreeMap<String, Scalar>;

impl Scalar {
    /// Convert a raw configuration value, rejecting nulls, arrays and objects.
    pub fn from_config(name: &str, value: &serde_json::Value) -> Result<Self, ValidationError> {
        use serde_json::Value;

        let non_scalar = |kind: &str| ValidationError::NonScalarHyperparameter {
            name: name.to_string(),
            kind: kind.to_string(),
        };

        match value {
            Value::Bool(b) => Ok(Self::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(Self::Int(i)),
                None => n.as_f64().map(Self::Float).ok_or_else(|| non_scalar("number")),
            },
            Value::String(s) => Ok(Self::Text(s.clone())),
            Value::Null => Err(non_scalar("null")),
            Value::Array(_) => Err(non_scalar("array")),
            Value::Object(_) => Err(non_scalar("object")),
        }
    }

    /// Flat string form sent to the remote service.
    ///
    /// Booleans are written Python-style because the remote entry points parse
    /// them that way.
    pub fn to_wire(&self) -> String {
        match self {
            Self::Bool(true) => "True".to_string(),
            Self::Bool(false) => "False".to_string(),
            Self::Int(v) => v.to_string(),
            Self::Float(v) => float_to_wire(*v),
            Self::Text(v) => v.clone(),
        }
    }

    /// Best-effort inverse of [`Scalar::to_wire`].
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "True" | "true" => return Self::Bool(true),
            "False" | "false" => return Self::Bool(false),
            _ => {}
        }
        if let Ok(v) = raw.parse::<i64>() {
            return Self::Int(v);
        }
        match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => Self::Float(v),
            _ => Self::Text(raw.to_string()),
        }
    }

    /// Numeric view, used when ranking or plotting trial values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Finite floats always carry a decimal point so they never read back as
/// integers.
fn float_to_wire(v: f64) -> String {
    let raw = v.to_string();
    if v.is_finite() && !raw.contains(['.', 'e', 'E']) {
        format!("{raw}.0")
    } else {
        raw
    }
}

/// Render a validated map into the flat string map the wire format requires.
pub fn to_wire_map(values: &ScalarMap) -> BTreeMap<String, String> {
    values
        .iter()
        .map(|(name, value)| (name.clone(), value.to_wire()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn config_values_convert_to_scalars() {
        assert_eq!(Scalar::from_config("a", &json!(true)), Ok(Scalar::Bool(true)));
        assert_eq!(Scalar::from_config("a", &json!(3)), Ok(Scalar::Int(3)));
        assert_eq!(Scalar::from_config("a", &json!(2e-5)), Ok(Scalar::Float(2e-5)));
        assert_eq!(
            Scalar::from_config("a", &json!("bert")),
            Ok(Scalar::Text("bert".into()))
        );
    }

    #[test]
    fn nested_config_values_are_rejected() {
        for (value, kind) in [
            (json!([1, 2]), "array"),
            (json!({"x": 1}), "object"),
            (serde_json::Value::Null, "null"),
        ] {
            match Scalar::from_config("layers", &value) {
                Err(ValidationError::NonScalarHyperparameter { name, kind: got }) => {
                    assert_eq!(name, "layers");
                    assert_eq!(got, kind);
                }
                other => panic!("expected rejection for {kind}, got {other:?}"),
            }
        }
    }

    #[test]
    fn booleans_use_python_spelling_on_the_wire() {
        assert_eq!(Scalar::Bool(true).to_wire(), "True");
        assert_eq!(Scalar::Bool(false).to_wire(), "False");
        assert_eq!(Scalar::Int(128).to_wire(), "128");
        assert_eq!(Scalar::Float(0.5).to_wire(), "0.5");
    }

    #[test]
    fn integral_floats_stay_floats_across_the_wire() {
        for v in [0.0, 1.0, -3.0, 1e21] {
            let wire = Scalar::Float(v).to_wire();
            assert_eq!(Scalar::from_wire(&wire), Scalar::Float(v), "wire form {wire}");
        }
        assert_eq!(Scalar::Float(1.0).to_wire(), "1.0");
        assert_eq!(Scalar::Float(2e-5).to_wire(), "0.00002");
    }

    #[test]
    fn wire_strings_parse_back_to_typed_values() {
        assert_eq!(Scalar::from_wire("True"), Scalar::Bool(true));
        assert_eq!(Scalar::from_wire("false"), Scalar::Bool(false));
        assert_eq!(Scalar::from_wire("32"), Scalar::Int(32));
        assert_eq!(Scalar::from_wire("3e-05"), Scalar::Float(3e-5));
        assert_eq!(Scalar::from_wire("NaN"), Scalar::Text("NaN".into()));
        assert_eq!(
            Scalar::from_wire("bert-base-uncased"),
            Scalar::Text("bert-base-uncased".into())
        );
    }

    #[test]
    fn untagged_deserialization_keeps_integers_integral() {
        let values: Vec<Scalar> = serde_json::from_str(r#"[1, 1.5, "x", false]"#).unwrap();
        assert_eq!(
            values,
            vec![
                Scalar::Int(1),
                Scalar::Float(1.5),
                Scalar::Text("x".into()),
                Scalar::Bool(false)
            ]
        );
    }
}
