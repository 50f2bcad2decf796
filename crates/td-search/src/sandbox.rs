//! Sandbox (simulated) tuning service.
//!
//! Plans every trial up front with a grid or seeded random strategy, then
//! replays them on the tokio clock with at most `max_parallel_trials` running
//! at once. Trials reuse the job sandbox's [`SandboxRun`] scripts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use td_jobs::{JobRequest, SandboxRun, SandboxScript};
use td_types::{
    to_wire_map, JobStatus, RemoteServiceError, ScalarMap, ServiceResult, TerminalStatus,
};

use crate::service::{SearchDescription, SearchRequest, SearchService, TrialReport};
use crate::strategy::{GridSearch, RandomSearch, SearchStrategy};
use crate::trial::{SearchState, StrategyHint};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxTunerConfig {
    /// Base seed for random searches; each search offsets it by its sequence.
    pub seed: u64,
    /// Points per continuous dimension under a grid strategy.
    pub grid_steps: usize,
    pub id_prefix: String,
    /// Trial run time under the default script.
    pub run_time_secs: u64,
}

impl Default for SandboxTunerConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            grid_steps: 4,
            id_prefix: "sandbox-search".to_string(),
            run_time_secs: 60,
        }
    }
}

struct PlannedTrial {
    trial_name: String,
    tuned: ScalarMap,
    run: SandboxRun,
    /// Offset from search start at which the trial begins.
    starts_after: Duration,
}

impl PlannedTrial {
    fn ends_after(&self) -> Duration {
        self.starts_after + self.run.duration
    }
}

struct SandboxSearch {
    sequence: u64,
    request: SearchRequest,
    trials: Vec<PlannedTrial>,
    started: Instant,
    created_at: DateTime<Utc>,
}

/// A fully in-process tuning service.
pub struct SandboxTuner {
    config: SandboxTunerConfig,
    script: SandboxScript,
    searches: Mutex<HashMap<String, SandboxSearch>>,
    next_sequence: AtomicU64,
}

impl SandboxTuner {
    pub fn new(config: SandboxTunerConfig) -> Self {
        let run_time = Duration::from_secs(config.run_time_secs);
        let script: SandboxScript =
            Arc::new(move |_: &JobRequest| SandboxRun::succeeded(run_time, "Training complete."));
        Self {
            config,
            script,
            searches: Mutex::new(HashMap::new()),
            next_sequence: AtomicU64::new(1),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(SandboxTunerConfig::default())
    }

    /// Replace the default script. It sees each trial's full job request,
    /// tuned values included.
    pub fn with_script<F>(mut self, script: F) -> Self
    where
        F: Fn(&JobRequest) -> SandboxRun + Send + Sync + 'static,
    {
        self.script = Arc::new(script);
        self
    }

    /// Search requests received so far, in submission order.
    pub fn submitted(&self) -> Vec<SearchRequest> {
        let searches = self.searches.lock();
        let mut requests: Vec<(u64, SearchRequest)> = searches
            .values()
            .map(|s| (s.sequence, s.request.clone()))
            .collect();
        requests.sort_by_key(|(sequence, _)| *sequence);
        requests.into_iter().map(|(_, request)| request).collect()
    }

    pub fn search_count(&self) -> usize {
        self.searches.lock().len()
    }

    fn plan(
        &self,
        search_id: &str,
        sequence: u64,
        request: &SearchRequest,
    ) -> ServiceResult<Vec<PlannedTrial>> {
        let rejected = |message: String| RemoteServiceError::Rejected {
            status: 400,
            message,
        };
        request.budget.validate().map_err(|e| rejected(e.to_string()))?;
        let space = request.ranges.to_space().map_err(|e| rejected(e.to_string()))?;

        let mut strategy: Box<dyn SearchStrategy> = match request.budget.strategy {
            StrategyHint::Grid => Box::new(GridSearch::new(&space, self.config.grid_steps)),
            StrategyHint::Random | StrategyHint::Bayesian | StrategyHint::Hyperband => Box::new(
                RandomSearch::new(space, self.config.seed.wrapping_add(sequence)),
            ),
        };
        let suggestions = strategy.suggest(request.budget.max_trials);
        debug!(
            search_id = %search_id,
            strategy = strategy.name(),
            trials = suggestions.len(),
            "Sandbox search planned"
        );

        // Each trial takes the slot that frees up first.
        let parallel = request.budget.max_parallel_trials.min(suggestions.len()).max(1);
        let mut slots = vec![Duration::ZERO; parallel];
        let mut trials = Vec::with_capacity(suggestions.len());
        for (index, tuned) in suggestions.into_iter().enumerate() {
            let trial_name = format!("{search_id}-{:03}", index + 1);
            let mut job = request.template.clone();
            job.job_name = trial_name.clone();
            job.hyperparameters
                .extend(tuned.iter().map(|(k, v)| (k.clone(), v.clone())));
            let run = (self.script)(&job);

            let (slot, free_at) = slots
                .iter()
                .copied()
                .enumerate()
                .min_by_key(|(_, free_at)| *free_at)
                .unwrap_or((0, Duration::ZERO));
            slots[slot] = free_at + run.duration;

            trials.push(PlannedTrial {
                trial_name,
                tuned,
                run,
                starts_after: free_at,
            });
        }
        Ok(trials)
    }
}

impl fmt::Debug for SandboxTuner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxTuner")
            .field("config", &self.config)
            .field("searches", &self.search_count())
            .finish_non_exhaustive()
    }
}

fn at_offset(base: DateTime<Utc>, offset: Duration) -> DateTime<Utc> {
    base + chrono::Duration::from_std(offset).unwrap_or_default()
}

#[async_trait]
impl SearchService for SandboxTuner {
    async fn create_search(&self, request: SearchRequest) -> ServiceResult<String> {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        let search_id = format!("{}-{:05}", self.config.id_prefix, sequence);
        let trials = self.plan(&search_id, sequence, &request)?;

        info!(
            search_id = %search_id,
            search_name = %request.search_name,
            trials = trials.len(),
            max_parallel = request.budget.max_parallel_trials,
            "Sandbox search accepted"
        );

        self.searches.lock().insert(
            search_id.clone(),
            SandboxSearch {
                sequence,
                request,
                trials,
                started: Instant::now(),
                created_at: Utc::now(),
            },
        );
        Ok(search_id)
    }

    async fn describe_search(&self, search_id: &str) -> ServiceResult<SearchDescription> {
        let searches = self.searches.lock();
        let search = searches
            .get(search_id)
            .ok_or_else(|| RemoteServiceError::UnknownSearch {
                search_id: search_id.to_string(),
            })?;

        let elapsed = search.started.elapsed();
        let objective = &search.request.objective;

        let trials: Vec<TrialReport> = search
            .trials
            .iter()
            .filter(|t| t.starts_after <= elapsed)
            .map(|t| {
                let finished = elapsed >= t.ends_after();
                let status = if finished {
                    JobStatus::from(t.run.status)
                } else {
                    JobStatus::InProgress
                };
                let value = match (finished, t.run.status) {
                    (true, TerminalStatus::Succeeded) => t
                        .run
                        .reported_metrics
                        .get(objective.name())
                        .copied()
                        .or_else(|| objective.extract(&t.run.log)),
                    _ => None,
                };
                TrialReport {
                    trial_name: t.trial_name.clone(),
                    created_at: at_offset(search.created_at, t.starts_after),
                    status,
                    tuned_hyperparameters: to_wire_map(&t.tuned),
                    objective: value,
                    failure_reason: if finished { t.run.failure_reason.clone() } else { None },
                    ended_at: finished.then(|| at_offset(search.created_at, t.ends_after())),
                }
            })
            .collect();

        let done = trials.len() == search.trials.len()
            && trials.iter().all(|t| t.status.is_terminal());
        let state = if done {
            SearchState::Completed
        } else {
            SearchState::InProgress
        };
        debug!(
            search_id = %search_id,
            ?state,
            started = trials.len(),
            "Sandbox search status call"
        );

        Ok(SearchDescription {
            search_id: search_id.to_string(),
            search_name: search.request.search_name.clone(),
            state,
            max_trials: search.trials.len(),
            trials,
            failure_reason: None,
        })
    }

    fn name(&self) -> &str {
        "sandbox-tuner"
    }
}
