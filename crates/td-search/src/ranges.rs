//! Range representation understood by the external tuning service.
//!
//! The service takes three lists of ranges with string-encoded bounds. The
//! orchestrator translates a [`SearchSpace`] into this form; sandbox services
//! parse it back.

use serde::{Deserialize, Serialize};

use td_types::{Scalar, ValidationError};

use crate::space::{ParameterKind, Scaling, SearchSpace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalingType {
    Auto,
    Linear,
    Logarithmic,
    ReverseLogarithmic,
}

impl From<Scaling> for ScalingType {
    fn from(scaling: Scaling) -> Self {
        match scaling {
            Scaling::Auto => Self::Auto,
            Scaling::Linear => Self::Linear,
            Scaling::Logarithmic => Self::Logarithmic,
            Scaling::ReverseLogarithmic => Self::ReverseLogarithmic,
        }
    }
}

impl From<ScalingType> for Scaling {
    fn from(scaling: ScalingType) -> Self {
        match scaling {
            ScalingType::Auto => Self::Auto,
            ScalingType::Linear => Self::Linear,
            ScalingType::Logarithmic => Self::Logarithmic,
            ScalingType::ReverseLogarithmic => Self::ReverseLogarithmic,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContinuousRange {
    pub name: String,
    pub min_value: String,
    pub max_value: String,
    pub scaling_type: ScalingType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IntegerRange {
    pub name: String,
    pub min_value: String,
    pub max_value: String,
    pub scaling_type: ScalingType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CategoricalRange {
    pub name: String,
    pub values: Vec<String>,
}

/// Search space in the tuning service's wire form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ParameterRanges {
    #[serde(default)]
    pub continuous_parameter_ranges: Vec<ContinuousRange>,
    #[serde(default)]
    pub integer_parameter_ranges: Vec<IntegerRange>,
    #[serde(default)]
    pub categorical_parameter_ranges: Vec<CategoricalRange>,
}

impl ParameterRanges {
    /// Validate `space` and translate it.
    pub fn from_space(space: &SearchSpace) -> Result<Self, ValidationError> {
        space.validate()?;

        let mut ranges = Self::default();
        for param in &space.parameters {
            match &param.kind {
                ParameterKind::Continuous { low, high, scaling } => {
                    ranges.continuous_parameter_ranges.push(ContinuousRange {
                        name: param.name.clone(),
                        min_value: low.to_string(),
                        max_value: high.to_string(),
                        scaling_type: (*scaling).into(),
                    })
                }
                ParameterKind::Integer { low, high, scaling } => {
                    ranges.integer_parameter_ranges.push(IntegerRange {
                        name: param.name.clone(),
                        min_value: low.to_string(),
                        max_value: high.to_string(),
                        scaling_type: (*scaling).into(),
                    })
                }
                ParameterKind::Categorical { values } => {
                    ranges.categorical_parameter_ranges.push(CategoricalRange {
                        name: param.name.clone(),
                        values: values.iter().map(Scalar::to_wire).collect(),
                    })
                }
            }
        }
        Ok(ranges)
    }

    /// Parse the wire form back into a validated space. Parameter order is
    /// continuous, then integer, then categorical.
    pub fn to_space(&self) -> Result<SearchSpace, ValidationError> {
        let mut space = SearchSpace::new();

        for range in &self.continuous_parameter_ranges {
            space = space.add(
                range.name.clone(),
                ParameterKind::Continuous {
                    low: parse_bound(&range.name, &range.min_value)?,
                    high: parse_bound(&range.name, &range.max_value)?,
                    scaling: range.scaling_type.into(),
                },
            );
        }
        for range in &self.integer_parameter_ranges {
            space = space.add(
                range.name.clone(),
                ParameterKind::Integer {
                    low: parse_bound(&range.name, &range.min_value)?,
                    high: parse_bound(&range.name, &range.max_value)?,
                    scaling: range.scaling_type.into(),
                },
            );
        }
        for range in &self.categorical_parameter_ranges {
            space = space.add(
                range.name.clone(),
                ParameterKind::Categorical {
                    values: range.values.iter().map(|v| Scalar::from_wire(v)).collect(),
                },
            );
        }

        space.validate()?;
        Ok(space)
    }

    /// Names of every tuned parameter.
    pub fn names(&self) -> Vec<&str> {
        self.continuous_parameter_ranges
            .iter()
            .map(|r| r.name.as_str())
            .chain(self.integer_parameter_ranges.iter().map(|r| r.name.as_str()))
            .chain(self.categorical_parameter_ranges.iter().map(|r| r.name.as_str()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.continuous_parameter_ranges.len()
            + self.integer_parameter_ranges.len()
            + self.categorical_parameter_ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn parse_bound<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, ValidationError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| ValidationError::Invalid {
        message: format!("bad bound '{raw}' for {name}: {e}"),
    })
}
