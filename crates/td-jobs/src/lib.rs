//! # td-jobs
//!
//! Remote training job orchestration for TrainDeck.
//!
//! Provides the [`JobService`] abstraction over a managed training API, the
//! [`TrainingJobOrchestrator`] that validates, submits and follows jobs, an
//! in-process sandbox service, and presets for the BERT fine-tuning jobs.

pub mod orchestrator;
pub mod presets;
pub mod sandbox;
pub mod service;

pub use orchestrator::{build_request, unique_job_name, TrainingJobOrchestrator, MAX_JOB_NAME_LEN};
pub use sandbox::{SandboxConfig, SandboxJobService, SandboxRun, SandboxScript};
pub use service::{JobDescription, JobRequest, JobService};
