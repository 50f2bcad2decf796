//! Training job orchestrator that ties a [`JobSpec`], a [`JobService`] and a
//! [`SessionConfig`] together: validate, submit, poll, collect metrics.

use chrono::Utc;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use td_types::{
    JobHandle, JobResult, JobSpec, MetricRule, TdResult, TerminalStatus, TimeoutError,
    ValidationError,
};

use crate::service::{JobDescription, JobRequest, JobService};

/// Longest job name the remote services accept.
pub const MAX_JOB_NAME_LEN: usize = 63;

/// Submits jobs and waits for their outcome.
///
/// Holds no per-job state: everything needed to follow a job lives in the
/// [`JobHandle`] returned by [`TrainingJobOrchestrator::submit`], so one
/// orchestrator can serve concurrent callers.
#[derive(Debug)]
pub struct TrainingJobOrchestrator<S: JobService> {
    service: S,
    session: td_types::SessionConfig,
}

impl<S: JobService> TrainingJobOrchestrator<S> {
    pub fn new(service: S, session: td_types::SessionConfig) -> Self {
        Self { service, session }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn session(&self) -> &td_types::SessionConfig {
        &self.session
    }

    /// Validate `spec` and create the remote job. Returns as soon as the
    /// service has accepted the request.
    pub async fn submit(&self, spec: &JobSpec) -> TdResult<JobHandle> {
        let request = build_request(spec, &self.session)?;
        let job_name = request.job_name.clone();

        info!(
            job_name = %job_name,
            entry_point = %request.entry_point,
            instance_type = %request.target.instance_type,
            service = self.service.name(),
            "Submitting training job"
        );

        let job_id = self.service.create_job(request).await?;
        info!(job_id = %job_id, job_name = %job_name, "Training job created");

        Ok(JobHandle {
            job_id,
            job_name,
            metric_rules: spec.metric_rules.clone(),
            submitted_at: Utc::now(),
        })
    }

    /// Poll the job every `poll_interval` until it reaches a terminal state.
    ///
    /// A failed job is a normal result. Exceeding `timeout` returns
    /// [`TimeoutError::Job`] and leaves the remote job running.
    pub async fn await_completion(
        &self,
        handle: &JobHandle,
        poll_interval: Duration,
        timeout: Duration,
    ) -> TdResult<JobResult> {
        if poll_interval.is_zero() {
            return Err(ValidationError::Invalid {
                message: "poll interval must be greater than zero".to_string(),
            }
            .into());
        }

        let start = Instant::now();
        loop {
            let description = self.service.describe_job(&handle.job_id).await?;

            if let Some(status) = description.status.terminal() {
                let result = collect_result(handle, description, status);
                info!(
                    job_id = %handle.job_id,
                    status = ?result.status,
                    metrics = ?result.metrics,
                    "Training job finished"
                );
                return Ok(result);
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                warn!(
                    job_id = %handle.job_id,
                    elapsed = ?elapsed,
                    "Gave up waiting for training job"
                );
                return Err(TimeoutError::Job {
                    job_id: handle.job_id.clone(),
                    waited_secs: elapsed.as_secs(),
                }
                .into());
            }

            debug!(
                job_id = %handle.job_id,
                status = ?description.status,
                elapsed = ?elapsed,
                "Training job still running"
            );
            tokio::time::sleep(poll_interval.min(timeout - elapsed)).await;
        }
    }

    /// Submit and wait using the session's polling settings.
    pub async fn run(&self, spec: &JobSpec) -> TdResult<JobResult> {
        let handle = self.submit(spec).await?;
        self.await_completion(&handle, self.session.poll_interval(), self.session.timeout())
            .await
    }

    /// Apply `rule` to raw log text. Never fails: a miss is `None`.
    pub fn extract_metric(raw_log_text: &str, rule: &MetricRule) -> Option<f64> {
        rule.extract(raw_log_text)
    }
}

/// Validate a spec against the session and build the creation payload.
pub fn build_request(spec: &JobSpec, session: &td_types::SessionConfig) -> TdResult<JobRequest> {
    let hyperparameters = spec.validate()?;
    let role = session
        .resolve_role(spec.role.as_deref())
        .ok_or(ValidationError::MissingRole)?;

    let job_name = unique_job_name(&spec.job_name_prefix());
    let output_location = spec
        .output_location
        .clone()
        .or_else(|| session.output_location_for(&job_name));

    Ok(JobRequest {
        job_name,
        entry_point: spec.entry_point.clone(),
        source_bundle: spec.source_bundle.clone(),
        hyperparameters,
        target: spec.target.clone(),
        role,
        output_location,
        inputs: spec.inputs.clone(),
        framework: spec.framework.clone(),
        metric_rules: spec.metric_rules.clone(),
    })
}

/// `<prefix>-<timestamp>-<8 hex>`, trimmed to [`MAX_JOB_NAME_LEN`].
pub fn unique_job_name(prefix: &str) -> String {
    let timestamp = Utc::now().format("%Y-%m-%d-%H-%M-%S");
    let suffix = Uuid::new_v4().simple().to_string();
    let tail = format!("{}-{}", timestamp, &suffix[..8]);

    let budget = MAX_JOB_NAME_LEN - tail.len() - 1;
    let prefix: String = prefix
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .take(budget)
        .collect();
    let prefix = prefix.trim_matches('-');
    if prefix.is_empty() {
        format!("job-{tail}")
    } else {
        format!("{prefix}-{tail}")
    }
}

fn collect_result(
    handle: &JobHandle,
    description: JobDescription,
    status: TerminalStatus,
) -> JobResult {
    let metrics: BTreeMap<String, Option<f64>> = handle
        .metric_rules
        .iter()
        .map(|rule| {
            let value = description
                .final_metrics
                .get(rule.name())
                .copied()
                .or_else(|| rule.extract(&description.log_excerpt));
            if value.is_none() && status == TerminalStatus::Succeeded {
                debug!(
                    job_id = %handle.job_id,
                    metric = rule.name(),
                    "Metric not found in job output"
                );
            }
            (rule.name().to_string(), value)
        })
        .collect();

    JobResult {
        job_id: handle.job_id.clone(),
        job_name: handle.job_name.clone(),
        status,
        metrics,
        failure_reason: description.failure_reason,
        submitted_at: handle.submitted_at,
        finished_at: description.ended_at.unwrap_or_else(Utc::now),
    }
}
