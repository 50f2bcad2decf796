//! Drives a hyperparameter search through an external optimizer.
//!
//! The optimizer owns trial selection, parallelism and early stopping. This
//! side translates the search space, waits for the search to settle, and
//! returns the finished trials in the order they were submitted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use td_jobs::build_request;
use td_types::{
    JobSpec, MetricRule, Scalar, SessionConfig, TdError, TdResult, TimeoutError, ValidationError,
};

use crate::ranges::ParameterRanges;
use crate::service::{SearchDescription, SearchRequest, SearchService};
use crate::space::SearchSpace;
use crate::trial::{ObjectiveDirection, SearchBudget, SearchOutcome, TrialOutcome};

/// Caller-owned token for a submitted search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHandle {
    pub search_id: String,
    pub search_name: String,
    pub direction: ObjectiveDirection,
    pub max_trials: usize,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct SearchOrchestrator<S: SearchService> {
    service: S,
    session: SessionConfig,
}

impl<S: SearchService> SearchOrchestrator<S> {
    pub fn new(service: S, session: SessionConfig) -> Self {
        Self { service, session }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Validate the inputs, translate the space and start the remote search.
    pub async fn submit_search(
        &self,
        template: &JobSpec,
        space: &SearchSpace,
        objective: &MetricRule,
        budget: &SearchBudget,
    ) -> TdResult<SearchHandle> {
        budget.validate()?;
        let ranges = ParameterRanges::from_space(space)?;
        let mut job = build_request(template, &self.session)?;

        if let Some(name) = ranges
            .names()
            .into_iter()
            .find(|name| job.hyperparameters.contains_key(*name))
        {
            return Err(ValidationError::ParameterConflict {
                name: name.to_string(),
            }
            .into());
        }
        if !job.metric_rules.iter().any(|r| r.name() == objective.name()) {
            job.metric_rules.push(objective.clone());
        }

        let search_name = job.job_name.clone();
        info!(
            search_name = %search_name,
            tuned = ranges.len(),
            max_trials = budget.max_trials,
            max_parallel = budget.max_parallel_trials,
            strategy = ?budget.strategy,
            objective = objective.name(),
            service = self.service.name(),
            "Submitting hyperparameter search"
        );

        let search_id = self
            .service
            .create_search(SearchRequest {
                search_name: search_name.clone(),
                template: job,
                ranges,
                objective: objective.clone(),
                budget: budget.clone(),
            })
            .await?;
        info!(search_id = %search_id, "Hyperparameter search created");

        Ok(SearchHandle {
            search_id,
            search_name,
            direction: budget.direction,
            max_trials: budget.max_trials,
            submitted_at: Utc::now(),
        })
    }

    /// Wait for the search to settle and collect its finished trials.
    ///
    /// Exceeding `timeout` returns [`TimeoutError::Search`]; the remote
    /// search keeps running.
    pub async fn await_search(
        &self,
        handle: &SearchHandle,
        poll_interval: Duration,
        timeout: Duration,
    ) -> TdResult<SearchOutcome> {
        if poll_interval.is_zero() {
            return Err(ValidationError::Invalid {
                message: "poll interval must be greater than zero".to_string(),
            }
            .into());
        }

        let waited = tokio::time::timeout(
            timeout,
            self.service
                .wait_for_completion(&handle.search_id, poll_interval),
        )
        .await;

        let description = match waited {
            Ok(result) => result?,
            Err(_) => {
                warn!(search_id = %handle.search_id, "Gave up waiting for search");
                return Err(TdError::Timeout(TimeoutError::Search {
                    search_id: handle.search_id.clone(),
                    waited_secs: timeout.as_secs(),
                }));
            }
        };

        let outcome = collect_outcome(description, handle.direction);
        info!(
            search_id = %outcome.search_id,
            state = ?outcome.state,
            trials = outcome.trials.len(),
            best = ?outcome.best().and_then(|t| t.objective),
            "Hyperparameter search finished"
        );
        Ok(outcome)
    }

    /// Submit and wait using the session's polling settings.
    pub async fn search(
        &self,
        template: &JobSpec,
        space: &SearchSpace,
        objective: &MetricRule,
        budget: &SearchBudget,
    ) -> TdResult<SearchOutcome> {
        let handle = self.submit_search(template, space, objective, budget).await?;
        self.await_search(&handle, self.session.poll_interval(), self.session.timeout())
            .await
    }
}

/// Keep the finished trials, typed, in submission order.
fn collect_outcome(description: SearchDescription, direction: ObjectiveDirection) -> SearchOutcome {
    let mut trials: Vec<TrialOutcome> = description
        .trials
        .into_iter()
        .filter_map(|report| {
            let status = report.status.terminal()?;
            Some(TrialOutcome {
                hyperparameters: report
                    .tuned_hyperparameters
                    .iter()
                    .map(|(name, raw)| (name.clone(), Scalar::from_wire(raw)))
                    .collect(),
                trial_name: report.trial_name,
                status,
                objective: report.objective,
                failure_reason: report.failure_reason,
                created_at: report.created_at,
                ended_at: report.ended_at,
            })
        })
        .collect();
    // Stable, so trials started together keep the order the service listed them in.
    trials.sort_by_key(|t| t.created_at);

    SearchOutcome::new(
        description.search_id,
        description.search_name,
        description.state,
        direction,
        trials,
    )
}
