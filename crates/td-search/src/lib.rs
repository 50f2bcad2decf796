//! # td-search
//!
//! Hyperparameter search over remote training jobs.
//!
//! A [`SearchSpace`] is translated into the optimizer's [`ParameterRanges`]
//! and handed to a [`SearchService`] together with a job template and an
//! objective metric. [`SearchOrchestrator`] waits for the search to settle
//! and returns every finished trial in submission order.

pub mod orchestrator;
pub mod ranges;
pub mod sandbox;
pub mod service;
pub mod space;
pub mod strategy;
pub mod trial;

pub use orchestrator::{SearchHandle, SearchOrchestrator};
pub use ranges::{CategoricalRange, ContinuousRange, IntegerRange, ParameterRanges, ScalingType};
pub use sandbox::{SandboxTuner, SandboxTunerConfig};
pub use service::{SearchDescription, SearchRequest, SearchService, TrialReport};
pub use space::{ParameterDef, ParameterKind, Scaling, SearchSpace};
pub use strategy::{GridSearch, RandomSearch, SearchStrategy};
pub use trial::{
    EarlyStopping, ObjectiveDirection, SearchBudget, SearchOutcome, SearchState, StrategyHint,
    TrialOutcome,
};
