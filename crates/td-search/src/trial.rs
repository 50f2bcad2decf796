//! Search budgets and per-trial outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use td_types::{ScalarMap, TerminalStatus, ValidationError};

/// Whether we are maximizing or minimizing the objective.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveDirection {
    #[default]
    Maximize,
    Minimize,
}

impl ObjectiveDirection {
    /// Whether `candidate` beats `incumbent` in this direction.
    pub fn improves(self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Self::Maximize => candidate > incumbent,
            Self::Minimize => candidate < incumbent,
        }
    }
}

/// Search strategy the remote optimizer is asked to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyHint {
    #[default]
    Bayesian,
    Random,
    Grid,
    Hyperband,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EarlyStopping {
    #[default]
    Off,
    Auto,
}

/// Limits and goals handed to the optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchBudget {
    /// Maximum number of trials to run.
    pub max_trials: usize,
    /// How many trials may run at once.
    pub max_parallel_trials: usize,
    pub direction: ObjectiveDirection,
    pub strategy: StrategyHint,
    pub early_stopping: EarlyStopping,
}

impl Default for SearchBudget {
    fn default() -> Self {
        Self {
            max_trials: 10,
            max_parallel_trials: 2,
            direction: ObjectiveDirection::Maximize,
            strategy: StrategyHint::Bayesian,
            early_stopping: EarlyStopping::Off,
        }
    }
}

impl SearchBudget {
    pub fn new(max_trials: usize, max_parallel_trials: usize) -> Self {
        Self {
            max_trials,
            max_parallel_trials,
            ..Default::default()
        }
    }

    pub fn with_direction(mut self, direction: ObjectiveDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_strategy(mut self, strategy: StrategyHint) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_early_stopping(mut self, early_stopping: EarlyStopping) -> Self {
        self.early_stopping = early_stopping;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_trials == 0 {
            return Err(ValidationError::InvalidBudget {
                message: "max_trials must be >= 1".to_string(),
            });
        }
        if self.max_parallel_trials == 0 {
            return Err(ValidationError::InvalidBudget {
                message: "max_parallel_trials must be >= 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Lifecycle state of a remote search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchState {
    InProgress,
    Stopping,
    Completed,
    Failed,
    Stopped,
}

impl SearchState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }
}

/// One finished trial, with typed hyperparameter values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialOutcome {
    pub trial_name: String,
    /// The tuned values this trial ran with.
    pub hyperparameters: ScalarMap,
    pub status: TerminalStatus,
    /// Objective metric; `None` when the trial failed or the value was not found.
    pub objective: Option<f64>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Collected result of a search, trials in submission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub search_id: String,
    pub search_name: String,
    pub state: SearchState,
    pub direction: ObjectiveDirection,
    pub trials: Vec<TrialOutcome>,
    pub best_trial: Option<TrialOutcome>,
}

impl SearchOutcome {
    pub fn new(
        search_id: String,
        search_name: String,
        state: SearchState,
        direction: ObjectiveDirection,
        trials: Vec<TrialOutcome>,
    ) -> Self {
        let mut outcome = Self {
            search_id,
            search_name,
            state,
            direction,
            trials: Vec::new(),
            best_trial: None,
        };
        for trial in &trials {
            outcome.update_best(trial);
        }
        outcome.trials = trials;
        outcome
    }

    /// Update the best trial if `trial` succeeded and improves on the current best.
    fn update_best(&mut self, trial: &TrialOutcome) {
        let objective = match (trial.status, trial.objective) {
            (TerminalStatus::Succeeded, Some(value)) => value,
            _ => return,
        };
        let dominated = match self.best_trial.as_ref().and_then(|best| best.objective) {
            None => true,
            Some(current_best) => self.direction.improves(objective, current_best),
        };
        if dominated {
            self.best_trial = Some(trial.clone());
        }
    }

    pub fn best(&self) -> Option<&TrialOutcome> {
        self.best_trial.as_ref()
    }

    /// (hyperparameters, objective) pairs in submission order.
    pub fn pairs(&self) -> Vec<(&ScalarMap, Option<f64>)> {
        self.trials
            .iter()
            .map(|t| (&t.hyperparameters, t.objective))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use td_types::Scalar;

    fn trial(name: &str, objective: Option<f64>, status: TerminalStatus) -> TrialOutcome {
        let mut hyperparameters = ScalarMap::new();
        hyperparameters.insert("learning_rate".into(), Scalar::Float(3e-5));
        TrialOutcome {
            trial_name: name.to_string(),
            hyperparameters,
            status,
            objective,
            failure_reason: None,
            created_at: Utc::now(),
            ended_at: None,
        }
    }

    #[test]
    fn best_trial_tracking_maximize() {
        let outcome = SearchOutcome::new(
            "s".into(),
            "search".into(),
            SearchState::Completed,
            ObjectiveDirection::Maximize,
            vec![
                trial("t1", Some(0.81), TerminalStatus::Succeeded),
                trial("t2", Some(0.88), TerminalStatus::Succeeded),
                trial("t3", Some(0.85), TerminalStatus::Succeeded),
            ],
        );
        assert_eq!(outcome.best().unwrap().trial_name, "t2");
        assert_eq!(outcome.pairs().len(), 3);
    }

    #[test]
    fn best_trial_tracking_minimize_skips_failures() {
        let outcome = SearchOutcome::new(
            "s".into(),
            "search".into(),
            SearchState::Completed,
            ObjectiveDirection::Minimize,
            vec![
                trial("t1", Some(0.40), TerminalStatus::Succeeded),
                trial("t2", None, TerminalStatus::Failed),
                trial("t3", Some(0.05), TerminalStatus::Stopped),
                trial("t4", Some(0.30), TerminalStatus::Succeeded),
            ],
        );
        assert_eq!(outcome.best().unwrap().trial_name, "t4");
    }

    #[test]
    fn no_best_without_objectives() {
        let outcome = SearchOutcome::new(
            "s".into(),
            "search".into(),
            SearchState::Failed,
            ObjectiveDirection::Maximize,
            vec![trial("t1", None, TerminalStatus::Failed)],
        );
        assert!(outcome.best().is_none());
    }

    #[test]
    fn budget_validation() {
        assert!(SearchBudget::default().validate().is_ok());
        assert!(SearchBudget::new(0, 1).validate().is_err());
        assert!(SearchBudget::new(4, 0).validate().is_err());
    }

    #[test]
    fn budget_deserializes_with_defaults() {
        let budget: SearchBudget =
            serde_json::from_str(r#"{"max_trials": 6, "direction": "minimize"}"#).unwrap();
        assert_eq!(budget.max_trials, 6);
        assert_eq!(budget.max_parallel_trials, 2);
        assert_eq!(budget.direction, ObjectiveDirection::Minimize);
        assert_eq!(budget.strategy, StrategyHint::Bayesian);
    }
}
