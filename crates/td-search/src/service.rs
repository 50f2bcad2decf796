//! Remote black-box optimizer abstraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use td_jobs::JobRequest;
use td_types::{JobStatus, MetricRule, ServiceResult};

use crate::ranges::ParameterRanges;
use crate::trial::{SearchBudget, SearchState};

/// Search-creation payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub search_name: String,
    /// Every trial runs this job with the tuned values merged into its
    /// static hyperparameters.
    pub template: JobRequest,
    pub ranges: ParameterRanges,
    pub objective: MetricRule,
    pub budget: SearchBudget,
}

/// One trial as the service reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialReport {
    pub trial_name: String,
    pub created_at: DateTime<Utc>,
    pub status: JobStatus,
    /// Tuned values in wire form.
    pub tuned_hyperparameters: BTreeMap<String, String>,
    pub objective: Option<f64>,
    pub failure_reason: Option<String>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Snapshot of a remote search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchDescription {
    pub search_id: String,
    pub search_name: String,
    pub state: SearchState,
    pub max_trials: usize,
    pub trials: Vec<TrialReport>,
    pub failure_reason: Option<String>,
}

impl SearchDescription {
    pub fn terminal_trials(&self) -> impl Iterator<Item = &TrialReport> {
        self.trials.iter().filter(|t| t.status.is_terminal())
    }

    /// The search is over: either the service says so, or the whole trial
    /// budget has been spent and every trial has finished.
    pub fn is_settled(&self) -> bool {
        if self.state.is_terminal() {
            return true;
        }
        self.trials.len() >= self.max_trials && self.trials.iter().all(|t| t.status.is_terminal())
    }
}

/// Core search service interface.
#[async_trait]
pub trait SearchService: Send + Sync {
    /// Start a search. Returns the service-assigned search id.
    async fn create_search(&self, request: SearchRequest) -> ServiceResult<String>;

    /// Current state and trials of a search.
    async fn describe_search(&self, search_id: &str) -> ServiceResult<SearchDescription>;

    /// Human-readable service name.
    fn name(&self) -> &str;

    /// Block until the search settles, checking every `poll_interval`.
    async fn wait_for_completion(
        &self,
        search_id: &str,
        poll_interval: Duration,
    ) -> ServiceResult<SearchDescription> {
        loop {
            let description = self.describe_search(search_id).await?;
            if description.is_settled() {
                return Ok(description);
            }
            debug!(
                search_id = %search_id,
                state = ?description.state,
                trials = description.trials.len(),
                "Search still running"
            );
            tokio::time::sleep(poll_interval).await;
        }
    }
}

#[async_trait]
impl<S: SearchService + ?Sized> SearchService for Arc<S> {
    async fn create_search(&self, request: SearchRequest) -> ServiceResult<String> {
        (**self).create_search(request).await
    }

    async fn describe_search(&self, search_id: &str) -> ServiceResult<SearchDescription> {
        (**self).describe_search(search_id).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    async fn wait_for_completion(
        &self,
        search_id: &str,
        poll_interval: Duration,
    ) -> ServiceResult<SearchDescription> {
        (**self).wait_for_completion(search_id, poll_interval).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(name: &str, status: JobStatus) -> TrialReport {
        TrialReport {
            trial_name: name.to_string(),
            created_at: Utc::now(),
            status,
            tuned_hyperparameters: BTreeMap::new(),
            objective: None,
            failure_reason: None,
            ended_at: None,
        }
    }

    fn description(state: SearchState, trials: Vec<TrialReport>) -> SearchDescription {
        SearchDescription {
            search_id: "s-1".into(),
            search_name: "search".into(),
            state,
            max_trials: 2,
            trials,
            failure_reason: None,
        }
    }

    #[test]
    fn settled_when_service_reports_terminal_state() {
        let d = description(SearchState::Stopped, vec![report("a", JobStatus::InProgress)]);
        assert!(d.is_settled());
        assert_eq!(d.terminal_trials().count(), 0);
    }

    #[test]
    fn settled_when_budget_spent_and_trials_finished() {
        let d = description(
            SearchState::InProgress,
            vec![report("a", JobStatus::Succeeded), report("b", JobStatus::Failed)],
        );
        assert!(d.is_settled());

        let d = description(
            SearchState::InProgress,
            vec![report("a", JobStatus::Succeeded), report("b", JobStatus::InProgress)],
        );
        assert!(!d.is_settled());

        let d = description(SearchState::InProgress, vec![report("a", JobStatus::Succeeded)]);
        assert!(!d.is_settled());
    }
}
