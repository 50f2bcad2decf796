//! Remote job-execution service abstraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use td_types::{ExecutionTarget, Framework, JobStatus, MetricRule, ScalarMap, ServiceResult};

/// Validated job-creation payload.
///
/// Hyperparameters are still typed here; each service implementation decides
/// how to put them on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub job_name: String,
    pub entry_point: String,
    pub source_bundle: String,
    pub hyperparameters: ScalarMap,
    pub target: ExecutionTarget,
    pub role: String,
    pub output_location: Option<String>,
    pub inputs: BTreeMap<String, String>,
    pub framework: Option<Framework>,
    /// Forwarded so services that scrape metrics themselves can do so.
    pub metric_rules: Vec<MetricRule>,
}

/// Snapshot of a remote job returned by a status call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescription {
    pub job_id: String,
    pub job_name: String,
    pub status: JobStatus,
    pub failure_reason: Option<String>,
    /// Tail of the job's textual output.
    pub log_excerpt: String,
    /// Metrics the job reported in structured form, if the service has them.
    pub final_metrics: BTreeMap<String, f64>,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Core job service interface.
///
/// Implementations may call a real remote API or simulate jobs locally (see
/// [`crate::sandbox::SandboxJobService`]). Methods take `&self` so one service
/// can be shared by callers working on different jobs.
#[async_trait]
pub trait JobService: Send + Sync {
    /// Create a job. Returns the service-assigned job id without waiting for
    /// the job to run.
    async fn create_job(&self, request: JobRequest) -> ServiceResult<String>;

    /// Current status and output of a job.
    async fn describe_job(&self, job_id: &str) -> ServiceResult<JobDescription>;

    /// Human-readable service name.
    fn name(&self) -> &str;
}

#[async_trait]
impl<S: JobService + ?Sized> JobService for Arc<S> {
    async fn create_job(&self, request: JobRequest) -> ServiceResult<String> {
        (**self).create_job(request).await
    }

    async fn describe_job(&self, job_id: &str) -> ServiceResult<JobDescription> {
        (**self).describe_job(job_id).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
