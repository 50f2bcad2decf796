use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::ValidationError;
use crate::metric::MetricRule;
use crate::scalar::{Scalar, ScalarMap};

/// Compute resources a job runs on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionTarget {
    pub instance_type: String,
    #[serde(default = "default_instance_count")]
    pub instance_count: u32,
    #[serde(default)]
    pub volume_size_gb: Option<u32>,
    /// Hard cap on remote run time, enforced by the service.
    #[serde(default)]
    pub max_runtime_secs: Option<u64>,
}

fn default_instance_count() -> u32 {
    1
}

impl ExecutionTarget {
    pub fn new(instance_type: impl Into<String>, instance_count: u32) -> Self {
        Self {
            instance_type: instance_type.into(),
            instance_count,
            volume_size_gb: None,
            max_runtime_secs: None,
        }
    }
}

impl Default for ExecutionTarget {
    fn default() -> Self {
        Self::new("ml.p3.2xlarge", 1)
    }
}

/// Training container the entry point runs in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Framework {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub python_version: Option<String>,
}

/// Declarative description of one remote training invocation.
///
/// Hyperparameters stay as raw configuration values until submission, where
/// they are checked to be scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub entry_point: String,
    /// Opaque location of the code bundle (e.g. an object-store URI).
    pub source_bundle: String,
    #[serde(default)]
    pub hyperparameters: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub target: ExecutionTarget,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub base_job_name: Option<String>,
    #[serde(default)]
    pub output_location: Option<String>,
    /// Input channels: channel name to opaque data location.
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
    #[serde(default)]
    pub framework: Option<Framework>,
    #[serde(default)]
    pub metric_rules: Vec<MetricRule>,
}

impl JobSpec {
    pub fn new(entry_point: impl Into<String>, source_bundle: impl Into<String>) -> Self {
        Self {
            entry_point: entry_point.into(),
            source_bundle: source_bundle.into(),
            hyperparameters: BTreeMap::new(),
            target: ExecutionTarget::default(),
            role: None,
            base_job_name: None,
            output_location: None,
            inputs: BTreeMap::new(),
            framework: None,
            metric_rules: Vec::new(),
        }
    }

    pub fn with_hyperparameter(
        mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.hyperparameters.insert(name.into(), value.into());
        self
    }

    pub fn with_target(mut self, target: ExecutionTarget) -> Self {
        self.target = target;
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_base_job_name(mut self, name: impl Into<String>) -> Self {
        self.base_job_name = Some(name.into());
        self
    }

    pub fn with_input(mut self, channel: impl Into<String>, location: impl Into<String>) -> Self {
        self.inputs.insert(channel.into(), location.into());
        self
    }

    pub fn with_framework(mut self, framework: Framework) -> Self {
        self.framework = Some(framework);
        self
    }

    pub fn with_metric(mut self, rule: MetricRule) -> Self {
        self.metric_rules.push(rule);
        self
    }

    /// Check the spec and return its hyperparameters as typed scalars.
    pub fn validate(&self) -> Result<ScalarMap, ValidationError> {
        if self.entry_point.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                field: "entry_point".to_string(),
            });
        }
        if self.source_bundle.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                field: "source_bundle".to_string(),
            });
        }
        if self.target.instance_type.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                field: "target.instance_type".to_string(),
            });
        }
        if self.target.instance_count == 0 {
            return Err(ValidationError::InvalidInstanceCount);
        }

        self.hyperparameters
            .iter()
            .map(|(name, value)| Scalar::from_config(name, value).map(|v| (name.clone(), v)))
            .collect()
    }

    /// Job name prefix: the configured base name, else the entry point stem.
    pub fn job_name_prefix(&self) -> String {
        if let Some(base) = self.base_job_name.as_deref().filter(|b| !b.trim().is_empty()) {
            return base.to_string();
        }
        let file = self.entry_point.rsplit('/').next().unwrap_or(&self.entry_point);
        let stem = file.split('.').next().unwrap_or(file);
        stem.replace('_', "-")
    }
}

/// Remote job status as reported by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Stopping,
    Succeeded,
    Failed,
    Stopped,
}

impl JobStatus {
    /// The terminal form of this status, if the job can no longer change.
    pub fn terminal(self) -> Option<TerminalStatus> {
        match self {
            Self::Succeeded => Some(TerminalStatus::Succeeded),
            Self::Failed => Some(TerminalStatus::Failed),
            Self::Stopped => Some(TerminalStatus::Stopped),
            Self::Pending | Self::InProgress | Self::Stopping => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.terminal().is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalStatus {
    Succeeded,
    Failed,
    Stopped,
}

impl From<TerminalStatus> for JobStatus {
    fn from(status: TerminalStatus) -> Self {
        match status {
            TerminalStatus::Succeeded => Self::Succeeded,
            TerminalStatus::Failed => Self::Failed,
            TerminalStatus::Stopped => Self::Stopped,
        }
    }
}

/// Caller-owned token for a submitted job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobHandle {
    /// Identifier assigned by the remote service.
    pub job_id: String,
    pub job_name: String,
    /// Rules evaluated against the job output once it finishes.
    pub metric_rules: Vec<MetricRule>,
    pub submitted_at: DateTime<Utc>,
}

/// Outcome of a job that reached a terminal state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: String,
    pub job_name: String,
    pub status: TerminalStatus,
    /// One entry per metric rule; `None` when the value could not be found.
    pub metrics: BTreeMap<String, Option<f64>>,
    pub failure_reason: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl JobResult {
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied().flatten()
    }

    pub fn succeeded(&self) -> bool {
        self.status == TerminalStatus::Succeeded
    }

    pub fn duration_seconds(&self) -> i64 {
        (self.finished_at - self.submitted_at).num_seconds()
    }
}
