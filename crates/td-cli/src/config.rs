//! TOML configuration for the `traindeck` binary.
//!
//! Precedence, highest first: command-line flags, `TRAINDECK_*` environment
//! variables, the config file, built-in defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;

use td_search::{SearchBudget, SearchSpace};
use td_types::{config_error, JobSpec, MetricRule, SessionConfig, TdResult};

pub const ENV_ENDPOINT: &str = "TRAINDECK_ENDPOINT";
pub const ENV_AUTH_TOKEN: &str = "TRAINDECK_AUTH_TOKEN";
pub const ENV_ROLE: &str = "TRAINDECK_ROLE";
pub const ENV_BUCKET: &str = "TRAINDECK_BUCKET";
pub const ENV_REGION: &str = "TRAINDECK_REGION";

/// Where jobs and searches are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Base URL of the remote service.
    pub endpoint: Option<String>,
    pub auth_token: Option<String>,
    /// Run everything in-process instead.
    pub sandbox: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSettings {
    pub space: SearchSpace,
    pub objective: MetricRule,
    #[serde(default)]
    pub budget: SearchBudget,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainDeckConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub service: ServiceSettings,
    #[serde(default)]
    pub job: Option<JobSpec>,
    #[serde(default)]
    pub search: Option<SearchSettings>,
}

impl TrainDeckConfig {
    pub fn from_toml_str(content: &str) -> TdResult<Self> {
        toml::from_str(content).map_err(|e| config_error!("failed to parse config: {}", e))
    }

    pub fn load_from_file(path: &Path) -> TdResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| config_error!("failed to read {}: {}", path.display(), e))?;
        Self::from_toml_str(&content)
            .map_err(|e| config_error!("{}: {}", path.display(), e))
    }

    /// Load `path` if given, otherwise start from defaults, then apply the
    /// process environment.
    pub fn load(path: Option<&Path>) -> TdResult<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `TRAINDECK_*` overrides read through `lookup`. Empty values are
    /// ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(endpoint) = get(ENV_ENDPOINT) {
            self.service.endpoint = Some(endpoint);
        }
        if let Some(token) = get(ENV_AUTH_TOKEN) {
            self.service.auth_token = Some(token);
        }
        if let Some(role) = get(ENV_ROLE) {
            self.session.default_role = Some(role);
        }
        if let Some(bucket) = get(ENV_BUCKET) {
            self.session.default_bucket = Some(bucket);
        }
        if let Some(region) = get(ENV_REGION) {
            self.session.region = Some(region);
        }
    }

    pub fn require_job(&self) -> TdResult<&JobSpec> {
        self.job
            .as_ref()
            .ok_or_else(|| config_error!("config has no [job] section"))
    }

    pub fn require_search(&self) -> TdResult<&SearchSettings> {
        self.search
            .as_ref()
            .ok_or_else(|| config_error!("config has no [search] section"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use td_search::{ObjectiveDirection, ParameterKind, Scaling, StrategyHint};
    use td_types::{Scalar, TdError};

    const SAMPLE: &str = include_str!("../traindeck.example.toml");

    #[test]
    fn sample_config_parses() {
        let config = TrainDeckConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.session.poll_interval_secs, 60);
        assert!(config.service.sandbox);

        let job = config.require_job().unwrap();
        assert_eq!(job.entry_point, "run_glue.py");
        assert_eq!(job.metric_rules[0].name(), "accuracy");
        let hyperparameters = job.validate().unwrap();
        assert_eq!(hyperparameters["do_lower_case"], Scalar::Bool(true));
        assert_eq!(hyperparameters["max_seq_length"], Scalar::Int(128));

        let search = config.require_search().unwrap();
        assert_eq!(search.budget.max_trials, 6);
        assert_eq!(search.budget.strategy, StrategyHint::Random);
        assert_eq!(search.budget.direction, ObjectiveDirection::Maximize);
        assert!(search.space.validate().is_ok());
        assert_eq!(
            search.space.parameters[0].kind,
            ParameterKind::Continuous {
                low: 1e-5,
                high: 1e-4,
                scaling: Scaling::Logarithmic
            }
        );
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[session]\ndefault_role = \"arn:role\"\ntimeout_secs = 600").unwrap();

        let config = TrainDeckConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.session.default_role.as_deref(), Some("arn:role"));
        assert_eq!(config.session.timeout_secs, 600);
        assert_eq!(config.session.poll_interval_secs, 30);
        assert!(config.job.is_none());
        assert!(matches!(config.require_search(), Err(TdError::Config(_))));
    }

    #[test]
    fn missing_and_malformed_files_are_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            TrainDeckConfig::load_from_file(&missing),
            Err(TdError::Config(_))
        ));

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "[session\npoll_interval_secs = ").unwrap();
        assert!(matches!(
            TrainDeckConfig::load_from_file(&broken),
            Err(TdError::Config(_))
        ));
    }

    #[test]
    fn bad_metric_pattern_fails_to_load() {
        let content = r#"
[search]
objective = { name = "accuracy", pattern = "acc: [0-9.]+" }
space = { parameters = [{ name = "epochs", type = "integer", low = 1, high = 3 }] }
"#;
        assert!(TrainDeckConfig::from_toml_str(content).is_err());
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut config = TrainDeckConfig::from_toml_str(SAMPLE).unwrap();
        let env: HashMap<&str, &str> = [
            (ENV_ENDPOINT, "https://training.internal:8443"),
            (ENV_ROLE, "arn:aws:iam::1:role/override"),
            (ENV_BUCKET, "  "),
        ]
        .into_iter()
        .collect();

        let before_bucket = config.session.default_bucket.clone();
        config.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(
            config.service.endpoint.as_deref(),
            Some("https://training.internal:8443")
        );
        assert_eq!(
            config.session.default_role.as_deref(),
            Some("arn:aws:iam::1:role/override")
        );
        assert_eq!(config.session.default_bucket, before_bucket);
        assert!(config.service.auth_token.is_none());
    }
}
