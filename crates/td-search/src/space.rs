//! Search space definitions.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use td_types::{Scalar, ValidationError};

/// Hint for how the optimizer should explore a numeric range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scaling {
    #[default]
    Auto,
    Linear,
    Logarithmic,
    /// Dense near the upper bound; only for continuous ranges inside [0, 1).
    ReverseLogarithmic,
}

/// Describes the range of one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParameterKind {
    /// Real-valued range [low, high].
    Continuous {
        low: f64,
        high: f64,
        #[serde(default)]
        scaling: Scaling,
    },
    /// Integer range [low, high] inclusive.
    Integer {
        low: i64,
        high: i64,
        #[serde(default)]
        scaling: Scaling,
    },
    /// Categorical choices.
    Categorical { values: Vec<Scalar> },
}

/// A single parameter dimension in the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    /// Hyperparameter name as the entry point expects it (e.g. "learning_rate").
    pub name: String,
    #[serde(flatten)]
    pub kind: ParameterKind,
}

impl ParameterDef {
    fn validate(&self) -> Result<(), ValidationError> {
        let name = &self.name;
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                field: "parameter.name".to_string(),
            });
        }

        match &self.kind {
            ParameterKind::Continuous { low, high, scaling } => {
                if !low.is_finite() || !high.is_finite() || low >= high {
                    return Err(ValidationError::InvertedRange {
                        name: name.clone(),
                        low: low.to_string(),
                        high: high.to_string(),
                    });
                }
                let scaling_error = |message: &str| ValidationError::InvalidScaling {
                    name: name.clone(),
                    low: low.to_string(),
                    high: high.to_string(),
                    message: message.to_string(),
                };
                match scaling {
                    Scaling::Logarithmic if *low <= 0.0 => {
                        Err(scaling_error("logarithmic scaling needs low > 0"))
                    }
                    Scaling::ReverseLogarithmic if *low < 0.0 || *high >= 1.0 => {
                        Err(scaling_error("reverse logarithmic scaling needs 0 <= low < high < 1"))
                    }
                    _ => Ok(()),
                }
            }
            ParameterKind::Integer { low, high, scaling } => {
                if low >= high {
                    return Err(ValidationError::InvertedRange {
                        name: name.clone(),
                        low: low.to_string(),
                        high: high.to_string(),
                    });
                }
                let scaling_error = |message: &str| ValidationError::InvalidScaling {
                    name: name.clone(),
                    low: low.to_string(),
                    high: high.to_string(),
                    message: message.to_string(),
                };
                match scaling {
                    Scaling::Logarithmic if *low <= 0 => {
                        Err(scaling_error("logarithmic scaling needs low > 0"))
                    }
                    Scaling::ReverseLogarithmic => {
                        Err(scaling_error("reverse logarithmic scaling is continuous-only"))
                    }
                    _ => Ok(()),
                }
            }
            ParameterKind::Categorical { values } => {
                if values.is_empty() {
                    Err(ValidationError::EmptyRange { name: name.clone() })
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// The full search space: an ordered list of parameter definitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub parameters: Vec<ParameterDef>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, name: impl Into<String>, kind: ParameterKind) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind,
        });
        self
    }

    pub fn add_float(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.add(
            name,
            ParameterKind::Continuous {
                low,
                high,
                scaling: Scaling::Auto,
            },
        )
    }

    pub fn add_log_float(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.add(
            name,
            ParameterKind::Continuous {
                low,
                high,
                scaling: Scaling::Logarithmic,
            },
        )
    }

    pub fn add_int(self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.add(
            name,
            ParameterKind::Integer {
                low,
                high,
                scaling: Scaling::Auto,
            },
        )
    }

    pub fn add_choice(self, name: impl Into<String>, values: Vec<Scalar>) -> Self {
        self.add(name, ParameterKind::Categorical { values })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(|p| p.name.as_str())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.parameters.is_empty() {
            return Err(ValidationError::EmptySearchSpace);
        }
        let mut seen = HashSet::new();
        for param in &self.parameters {
            param.validate()?;
            if !seen.insert(param.name.as_str()) {
                return Err(ValidationError::DuplicateParameter {
                    name: param.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Total number of grid points (returns `None` if any parameter is
    /// continuous without a natural grid).
    pub fn grid_size(&self) -> Option<usize> {
        let mut total: usize = 1;
        for param in &self.parameters {
            let dim_size = match &param.kind {
                ParameterKind::Integer { low, high, .. } => {
                    usize::try_from(high.checked_sub(*low)?.checked_add(1)?).ok()?
                }
                ParameterKind::Categorical { values } => values.len(),
                ParameterKind::Continuous { .. } => return None,
            };
            total = total.checked_mul(dim_size)?;
        }
        Some(total)
    }
}
