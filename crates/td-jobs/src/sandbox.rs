//! Sandbox (simulated) job service.
//!
//! Runs jobs entirely in-process on the tokio clock. Useful for developing job
//! configurations, integration testing, and exercising the orchestrator
//! without a remote account.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use td_types::{JobStatus, RemoteServiceError, ServiceResult, TerminalStatus};

use crate::service::{JobDescription, JobRequest, JobService};

/// Configuration for the sandbox service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// How long a job runs under the default script.
    pub run_time_secs: u64,
    /// Prefix for generated job ids.
    pub id_prefix: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            run_time_secs: 60,
            id_prefix: "sandbox-job".to_string(),
        }
    }
}

/// Scripted behaviour of one simulated job.
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxRun {
    pub duration: Duration,
    pub status: TerminalStatus,
    /// Full output, exposed once the job finishes.
    pub log: String,
    pub failure_reason: Option<String>,
    pub reported_metrics: BTreeMap<String, f64>,
}

impl SandboxRun {
    pub fn succeeded(duration: Duration, log: impl Into<String>) -> Self {
        Self {
            duration,
            status: TerminalStatus::Succeeded,
            log: log.into(),
            failure_reason: None,
            reported_metrics: BTreeMap::new(),
        }
    }

    pub fn failed(duration: Duration, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            duration,
            status: TerminalStatus::Failed,
            log: format!("AlgorithmError: {reason}"),
            failure_reason: Some(reason),
            reported_metrics: BTreeMap::new(),
        }
    }

    pub fn stopped(duration: Duration) -> Self {
        Self {
            duration,
            status: TerminalStatus::Stopped,
            log: String::new(),
            failure_reason: None,
            reported_metrics: BTreeMap::new(),
        }
    }

    /// Report a metric in structured form alongside the log.
    pub fn with_reported_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.reported_metrics.insert(name.into(), value);
        self
    }
}

/// Decides how a submitted job will behave.
pub type SandboxScript = Arc<dyn Fn(&JobRequest) -> SandboxRun + Send + Sync>;

struct SandboxJob {
    sequence: u64,
    request: JobRequest,
    run: SandboxRun,
    started: Instant,
    created_at: DateTime<Utc>,
}

/// A fully in-process job service.
pub struct SandboxJobService {
    config: SandboxConfig,
    script: SandboxScript,
    jobs: DashMap<String, SandboxJob>,
    next_sequence: AtomicU64,
    failing_describes: AtomicUsize,
}

impl SandboxJobService {
    pub fn new(config: SandboxConfig) -> Self {
        let run_time = Duration::from_secs(config.run_time_secs);
        let script: SandboxScript =
            Arc::new(move |_: &JobRequest| SandboxRun::succeeded(run_time, "Training complete."));
        Self {
            config,
            script,
            jobs: DashMap::new(),
            next_sequence: AtomicU64::new(1),
            failing_describes: AtomicUsize::new(0),
        }
    }

    /// Create a sandbox service with default settings.
    pub fn with_defaults() -> Self {
        Self::new(SandboxConfig::default())
    }

    /// Replace the default script.
    pub fn with_script<F>(mut self, script: F) -> Self
    where
        F: Fn(&JobRequest) -> SandboxRun + Send + Sync + 'static,
    {
        self.script = Arc::new(script);
        self
    }

    /// Make the next `count` status calls fail with a transport error.
    pub fn fail_next_describes(&self, count: usize) {
        self.failing_describes.store(count, Ordering::SeqCst);
    }

    /// Requests received so far, in submission order.
    pub fn submitted(&self) -> Vec<JobRequest> {
        let mut jobs: Vec<(u64, JobRequest)> = self
            .jobs
            .iter()
            .map(|entry| (entry.sequence, entry.request.clone()))
            .collect();
        jobs.sort_by_key(|(sequence, _)| *sequence);
        jobs.into_iter().map(|(_, request)| request).collect()
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_describes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl fmt::Debug for SandboxJobService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxJobService")
            .field("config", &self.config)
            .field("jobs", &self.jobs.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl JobService for SandboxJobService {
    async fn create_job(&self, request: JobRequest) -> ServiceResult<String> {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        let job_id = format!("{}-{:05}", self.config.id_prefix, sequence);
        let run = (self.script)(&request);

        info!(
            job_id = %job_id,
            job_name = %request.job_name,
            status = ?run.status,
            "Sandbox job accepted"
        );

        self.jobs.insert(
            job_id.clone(),
            SandboxJob {
                sequence,
                request,
                run,
                started: Instant::now(),
                created_at: Utc::now(),
            },
        );
        Ok(job_id)
    }

    async fn describe_job(&self, job_id: &str) -> ServiceResult<JobDescription> {
        if self.take_injected_failure() {
            return Err(RemoteServiceError::Transport {
                message: "sandbox: injected status failure".to_string(),
            });
        }

        let job = self
            .jobs
            .get(job_id)
            .ok_or_else(|| RemoteServiceError::UnknownJob {
                job_id: job_id.to_string(),
            })?;

        let finished = job.started.elapsed() >= job.run.duration;
        debug!(job_id = %job_id, finished, "Sandbox status call");

        let description = if finished {
            let ran_for = chrono::Duration::from_std(job.run.duration).unwrap_or_default();
            JobDescription {
                job_id: job_id.to_string(),
                job_name: job.request.job_name.clone(),
                status: JobStatus::from(job.run.status),
                failure_reason: job.run.failure_reason.clone(),
                log_excerpt: job.run.log.clone(),
                final_metrics: job.run.reported_metrics.clone(),
                created_at: job.created_at,
                ended_at: Some(job.created_at + ran_for),
            }
        } else {
            JobDescription {
                job_id: job_id.to_string(),
                job_name: job.request.job_name.clone(),
                status: JobStatus::InProgress,
                failure_reason: None,
                log_excerpt: String::new(),
                final_metrics: BTreeMap::new(),
                created_at: job.created_at,
                ended_at: None,
            }
        };
        Ok(description)
    }

    fn name(&self) -> &str {
        "sandbox"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use td_types::ExecutionTarget;

    fn request(name: &str) -> JobRequest {
        JobRequest {
            job_name: name.to_string(),
            entry_point: "train.py".to_string(),
            source_bundle: "s3://bucket/code".to_string(),
            hyperparameters: Default::default(),
            target: ExecutionTarget::default(),
            role: "role".to_string(),
            output_location: None,
            inputs: BTreeMap::new(),
            framework: None,
            metric_rules: Vec::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn job_finishes_after_run_time() {
        let service = SandboxJobService::new(SandboxConfig {
            run_time_secs: 30,
            ..Default::default()
        });
        let id = service.create_job(request("a")).await.unwrap();

        let early = service.describe_job(&id).await.unwrap();
        assert_eq!(early.status, JobStatus::InProgress);
        assert!(early.log_excerpt.is_empty());

        tokio::time::advance(Duration::from_secs(30)).await;
        let done = service.describe_job(&id).await.unwrap();
        assert_eq!(done.status, JobStatus::Succeeded);
        assert_eq!(done.log_excerpt, "Training complete.");
        assert!(done.ended_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn script_controls_outcome() {
        let service = SandboxJobService::with_defaults()
            .with_script(|_| SandboxRun::failed(Duration::from_secs(1), "CUDA out of memory"));
        let id = service.create_job(request("b")).await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;

        let done = service.describe_job(&id).await.unwrap();
        assert_eq!(done.status, JobStatus::Failed);
        assert_eq!(done.failure_reason.as_deref(), Some("CUDA out of memory"));
    }

    #[tokio::test]
    async fn unknown_job_is_reported() {
        let service = SandboxJobService::with_defaults();
        assert_eq!(
            service.describe_job("nope").await,
            Err(RemoteServiceError::UnknownJob {
                job_id: "nope".into()
            })
        );
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let service = SandboxJobService::with_defaults();
        let id = service.create_job(request("c")).await.unwrap();
        service.fail_next_describes(1);

        assert!(matches!(
            service.describe_job(&id).await,
            Err(RemoteServiceError::Transport { .. })
        ));
        assert!(service.describe_job(&id).await.is_ok());
    }

    #[tokio::test]
    async fn submitted_requests_keep_order() {
        let service = SandboxJobService::with_defaults();
        for name in ["first", "second", "third"] {
            service.create_job(request(name)).await.unwrap();
        }
        let names: Vec<String> = service
            .submitted()
            .into_iter()
            .map(|r| r.job_name)
            .collect();
        assert_eq!(names, vec!["first", "second", "third"]);
        assert_eq!(service.job_count(), 3);
    }
}
