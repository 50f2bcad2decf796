//! Parameter sweep strategies used by the sandbox tuner.
//!
//! Real searches delegate trial selection to the remote optimizer; these exist
//! so the sandbox can stand in for it.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use td_types::{Scalar, ScalarMap};

use crate::space::{ParameterKind, Scaling, SearchSpace};

/// Common trait for all search strategies.
pub trait SearchStrategy: Send {
    /// Generate the next batch of parameter combinations to evaluate.
    fn suggest(&mut self, count: usize) -> Vec<ScalarMap>;

    /// Human-readable strategy name.
    fn name(&self) -> &str;
}

// ---- Grid search ----

/// One grid dimension. Integer ranges are indexed arithmetically instead of
/// being expanded.
#[derive(Debug, Clone)]
enum GridAxis {
    Integers { low: i64, len: usize },
    Values(Vec<Scalar>),
}

impl GridAxis {
    fn len(&self) -> usize {
        match self {
            Self::Integers { len, .. } => *len,
            Self::Values(values) => values.len(),
        }
    }

    fn value(&self, index: usize) -> Scalar {
        match self {
            Self::Integers { low, .. } => Scalar::Int(low.wrapping_add(index as i64)),
            Self::Values(values) => values[index].clone(),
        }
    }
}

/// Exhaustive grid search. Continuous dimensions are cut into `float_steps`
/// points spaced according to their scaling.
///
/// Points are decoded from a mixed-radix index on demand, in the order of a
/// nested loop with the last parameter varying fastest, so the grid is never
/// materialized.
#[derive(Debug, Clone)]
pub struct GridSearch {
    cursor: usize,
    total: usize,
    axes: Vec<(String, GridAxis)>,
}

impl GridSearch {
    pub fn new(space: &SearchSpace, float_steps: usize) -> Self {
        let axes: Vec<(String, GridAxis)> = space
            .parameters
            .iter()
            .map(|param| (param.name.clone(), Self::axis(&param.kind, float_steps)))
            .collect();
        // A product past usize::MAX cannot be walked to the end anyway.
        let total = axes
            .iter()
            .try_fold(1usize, |acc, (_, axis)| acc.checked_mul(axis.len()))
            .unwrap_or(usize::MAX);
        Self {
            cursor: 0,
            total,
            axes,
        }
    }

    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    fn axis(kind: &ParameterKind, float_steps: usize) -> GridAxis {
        match kind {
            ParameterKind::Continuous { low, high, scaling } => {
                let steps = float_steps.max(2);
                GridAxis::Values(
                    (0..steps)
                        .map(|i| {
                            let t = i as f64 / (steps - 1) as f64;
                            Scalar::Float(interpolate(*low, *high, t, *scaling))
                        })
                        .collect(),
                )
            }
            ParameterKind::Integer { low, high, .. } => {
                let span = i128::from(*high) - i128::from(*low) + 1;
                GridAxis::Integers {
                    low: *low,
                    len: usize::try_from(span.max(0)).unwrap_or(usize::MAX),
                }
            }
            ParameterKind::Categorical { values } => GridAxis::Values(values.clone()),
        }
    }

    fn point(&self, mut index: usize) -> ScalarMap {
        let mut combo = ScalarMap::new();
        for (name, axis) in self.axes.iter().rev() {
            let len = axis.len();
            combo.insert(name.clone(), axis.value(index % len));
            index /= len;
        }
        combo
    }
}

impl SearchStrategy for GridSearch {
    fn suggest(&mut self, count: usize) -> Vec<ScalarMap> {
        let end = self.cursor.saturating_add(count).min(self.total);
        let batch = (self.cursor..end).map(|i| self.point(i)).collect();
        self.cursor = end;
        batch
    }

    fn name(&self) -> &str {
        "grid"
    }
}

// ---- Random search ----

/// Independent random sampling across the search space, seeded so sandbox
/// runs are reproducible.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    space: SearchSpace,
    rng: StdRng,
}

impl RandomSearch {
    pub fn new(space: SearchSpace, seed: u64) -> Self {
        Self {
            space,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn sample_one(&mut self) -> ScalarMap {
        let mut params = ScalarMap::new();

        for param in &self.space.parameters {
            let value = match &param.kind {
                ParameterKind::Continuous { low, high, scaling } => {
                    let t: f64 = self.rng.random_range(0.0..=1.0);
                    Scalar::Float(interpolate(*low, *high, t, *scaling))
                }
                ParameterKind::Integer {
                    low,
                    high,
                    scaling: Scaling::Logarithmic,
                } => {
                    let t: f64 = self.rng.random_range(0.0..=1.0);
                    let v = interpolate(*low as f64, *high as f64, t, Scaling::Logarithmic);
                    Scalar::Int((v.round() as i64).clamp(*low, *high))
                }
                ParameterKind::Integer { low, high, .. } => {
                    Scalar::Int(self.rng.random_range(*low..=*high))
                }
                ParameterKind::Categorical { values } => {
                    let idx = self.rng.random_range(0..values.len());
                    values[idx].clone()
                }
            };
            params.insert(param.name.clone(), value);
        }

        params
    }
}

impl SearchStrategy for RandomSearch {
    fn suggest(&mut self, count: usize) -> Vec<ScalarMap> {
        (0..count).map(|_| self.sample_one()).collect()
    }

    fn name(&self) -> &str {
        "random"
    }
}

/// Point at fraction `t` of [low, high] under the given scaling.
fn interpolate(low: f64, high: f64, t: f64, scaling: Scaling) -> f64 {
    let value = match scaling {
        Scaling::Logarithmic => {
            let (log_low, log_high) = (low.ln(), high.ln());
            (log_low + t * (log_high - log_low)).exp()
        }
        Scaling::ReverseLogarithmic => {
            // Log-uniform in (1 - x), so points crowd toward `high`.
            let (a, b) = ((1.0 - low).ln(), (1.0 - high).ln());
            1.0 - (a + t * (b - a)).exp()
        }
        Scaling::Auto | Scaling::Linear => low + t * (high - low),
    };
    value.clamp(low, high)
}
