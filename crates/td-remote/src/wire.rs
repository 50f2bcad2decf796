//! Request and response bodies exchanged with the remote service.
//!
//! Hyperparameters travel as a flat string map. Response bodies are lenient:
//! optional fields may be missing or null.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use td_jobs::{JobDescription, JobRequest};
use td_search::{
    EarlyStopping, ObjectiveDirection, ParameterRanges, SearchDescription, SearchRequest,
    SearchState, StrategyHint, TrialReport,
};
use td_types::{to_wire_map, ExecutionTarget, Framework, JobStatus, MetricRule};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    pub name: String,
    pub regex: String,
}

impl From<&MetricRule> for MetricDefinition {
    fn from(rule: &MetricRule) -> Self {
        Self {
            name: rule.name().to_string(),
            regex: rule.pattern().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateJobBody {
    pub job_name: String,
    pub entry_point: String,
    pub source_bundle: String,
    pub hyperparameters: BTreeMap<String, String>,
    pub target: ExecutionTarget,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_location: Option<String>,
    pub inputs: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework: Option<Framework>,
    pub metric_definitions: Vec<MetricDefinition>,
}

impl From<&JobRequest> for CreateJobBody {
    fn from(request: &JobRequest) -> Self {
        Self {
            job_name: request.job_name.clone(),
            entry_point: request.entry_point.clone(),
            source_bundle: request.source_bundle.clone(),
            hyperparameters: to_wire_map(&request.hyperparameters),
            target: request.target.clone(),
            role: request.role.clone(),
            output_location: request.output_location.clone(),
            inputs: request.inputs.clone(),
            framework: request.framework.clone(),
            metric_definitions: request.metric_rules.iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateJobResponse {
    pub job_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescribeJobResponse {
    pub job_id: String,
    pub job_name: String,
    pub status: JobStatus,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub log_excerpt: Option<String>,
    #[serde(default)]
    pub final_metrics: Option<BTreeMap<String, f64>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

impl From<DescribeJobResponse> for JobDescription {
    fn from(body: DescribeJobResponse) -> Self {
        Self {
            job_id: body.job_id,
            job_name: body.job_name,
            status: body.status,
            failure_reason: body.failure_reason,
            log_excerpt: body.log_excerpt.unwrap_or_default(),
            final_metrics: body.final_metrics.unwrap_or_default(),
            created_at: body.created_at,
            ended_at: body.ended_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateSearchBody {
    pub search_name: String,
    pub training_job: CreateJobBody,
    pub parameter_ranges: ParameterRanges,
    pub objective: MetricDefinition,
    pub direction: ObjectiveDirection,
    pub strategy: StrategyHint,
    pub early_stopping: EarlyStopping,
    pub max_trials: usize,
    pub max_parallel_trials: usize,
}

impl From<&SearchRequest> for CreateSearchBody {
    fn from(request: &SearchRequest) -> Self {
        Self {
            search_name: request.search_name.clone(),
            training_job: CreateJobBody::from(&request.template),
            parameter_ranges: request.ranges.clone(),
            objective: MetricDefinition::from(&request.objective),
            direction: request.budget.direction,
            strategy: request.budget.strategy,
            early_stopping: request.budget.early_stopping,
            max_trials: request.budget.max_trials,
            max_parallel_trials: request.budget.max_parallel_trials,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateSearchResponse {
    pub search_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialBody {
    pub trial_name: String,
    pub created_at: DateTime<Utc>,
    pub status: JobStatus,
    #[serde(default)]
    pub tuned_hyperparameters: BTreeMap<String, String>,
    #[serde(default)]
    pub objective: Option<f64>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescribeSearchResponse {
    pub search_id: String,
    pub search_name: String,
    pub state: SearchState,
    pub max_trials: usize,
    #[serde(default)]
    pub trials: Vec<TrialBody>,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

impl From<DescribeSearchResponse> for SearchDescription {
    fn from(body: DescribeSearchResponse) -> Self {
        Self {
            search_id: body.search_id,
            search_name: body.search_name,
            state: body.state,
            max_trials: body.max_trials,
            trials: body
                .trials
                .into_iter()
                .map(|t| TrialReport {
                    trial_name: t.trial_name,
                    created_at: t.created_at,
                    status: t.status,
                    tuned_hyperparameters: t.tuned_hyperparameters,
                    objective: t.objective,
                    failure_reason: t.failure_reason,
                    ended_at: t.ended_at,
                })
                .collect(),
            failure_reason: body.failure_reason,
        }
    }
}

/// Error payload some services attach to non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    #[serde(alias = "error")]
    pub message: String,
}
