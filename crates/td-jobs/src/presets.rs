//! Ready-made job specs for the BERT fine-tuning runs the demo pipeline uses.
//!
//! Both entry points print their evaluation dict with keys suffixed by the
//! global step (empty for the final evaluation), e.g. `{'exact_': 81.2,
//! 'f1_': 88.5}`, which is what the metric patterns below match.

use td_types::{ExecutionTarget, Framework, JobSpec, MetricRule, ValidationError};

pub const SQUAD_F1_PATTERN: &str = r"'f1_': ([0-9.]+)";
pub const SQUAD_EXACT_PATTERN: &str = r"'exact_': ([0-9.]+)";
pub const GLUE_ACCURACY_PATTERN: &str = r"'acc_': ([0-9.]+)";
pub const GLUE_F1_PATTERN: &str = r"'f1_': ([0-9.]+)";

fn pytorch() -> Framework {
    Framework {
        name: "pytorch".to_string(),
        version: "1.4.0".to_string(),
        python_version: Some("py3".to_string()),
    }
}

pub fn squad_metric_rules() -> Result<Vec<MetricRule>, ValidationError> {
    Ok(vec![
        MetricRule::new("f1", SQUAD_F1_PATTERN)?,
        MetricRule::new("exact", SQUAD_EXACT_PATTERN)?,
    ])
}

pub fn glue_metric_rules() -> Result<Vec<MetricRule>, ValidationError> {
    Ok(vec![
        MetricRule::new("accuracy", GLUE_ACCURACY_PATTERN)?,
        MetricRule::new("f1", GLUE_F1_PATTERN)?,
    ])
}

/// Fine-tune `bert-base-cased` on one GLUE task (e.g. "MRPC").
pub fn glue_fine_tuning(
    task_name: &str,
    source_bundle: &str,
    data_location: &str,
) -> Result<JobSpec, ValidationError> {
    if task_name.trim().is_empty() {
        return Err(ValidationError::EmptyField {
            field: "task_name".to_string(),
        });
    }

    let mut spec = JobSpec::new("run_glue.py", source_bundle)
        .with_base_job_name(format!("glue-{}", task_name.to_lowercase()))
        .with_framework(pytorch())
        .with_target(ExecutionTarget::new("ml.p3.2xlarge", 1))
        .with_input("glue_data", data_location)
        .with_hyperparameter("model_type", "bert")
        .with_hyperparameter("model_name_or_path", "bert-base-cased")
        .with_hyperparameter("task_name", task_name)
        .with_hyperparameter("do_train", true)
        .with_hyperparameter("do_eval", true)
        .with_hyperparameter("max_seq_length", 128)
        .with_hyperparameter("per_gpu_train_batch_size", 32)
        .with_hyperparameter("learning_rate", 2e-5)
        .with_hyperparameter("num_train_epochs", 3)
        .with_hyperparameter("output_dir", "/opt/ml/model");
    spec.metric_rules = glue_metric_rules()?;
    Ok(spec)
}

/// Fine-tune `bert-base-uncased` on SQuAD v1.1.
pub fn squad_fine_tuning(
    source_bundle: &str,
    data_location: &str,
) -> Result<JobSpec, ValidationError> {
    let mut spec = JobSpec::new("run_squad.py", source_bundle)
        .with_base_job_name("squad")
        .with_framework(pytorch())
        .with_target(ExecutionTarget::new("ml.p3.2xlarge", 1))
        .with_input("squad", data_location)
        .with_hyperparameter("model_type", "bert")
        .with_hyperparameter("model_name_or_path", "bert-base-uncased")
        .with_hyperparameter("do_train", true)
        .with_hyperparameter("do_eval", true)
        .with_hyperparameter("do_lower_case", true)
        .with_hyperparameter("train_file", "train-v1.1.json")
        .with_hyperparameter("predict_file", "dev-v1.1.json")
        .with_hyperparameter("per_gpu_train_batch_size", 12)
        .with_hyperparameter("learning_rate", 3e-5)
        .with_hyperparameter("num_train_epochs", 2)
        .with_hyperparameter("max_seq_length", 384)
        .with_hyperparameter("doc_stride", 128)
        .with_hyperparameter("output_dir", "/opt/ml/model");
    spec.metric_rules = squad_metric_rules()?;
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use td_types::Scalar;

    #[test]
    fn squad_preset_is_valid_and_scrapes_f1() {
        let spec = squad_fine_tuning("s3://bucket/code.tar.gz", "s3://bucket/squad").unwrap();
        let params = spec.validate().unwrap();
        assert_eq!(params["do_lower_case"], Scalar::Bool(true));
        assert_eq!(params["learning_rate"], Scalar::Float(3e-5));

        let log = "Results: {'exact_': 81.02, 'f1_': 88.37, 'total_': 10570}";
        let f1 = spec.metric_rules.iter().find(|r| r.name() == "f1").unwrap();
        assert_eq!(f1.extract(log), Some(88.37));
    }

    #[test]
    fn glue_preset_names_the_task() {
        let spec = glue_fine_tuning("MRPC", "s3://bucket/code.tar.gz", "s3://bucket/glue").unwrap();
        assert_eq!(spec.job_name_prefix(), "glue-mrpc");
        assert_eq!(spec.inputs["glue_data"], "s3://bucket/glue");

        let log = "eval results {'acc_': 0.8455, 'f1_': 0.8912, 'acc_and_f1_': 0.868}";
        let values: Vec<Option<f64>> = spec.metric_rules.iter().map(|r| r.extract(log)).collect();
        assert_eq!(values, vec![Some(0.8455), Some(0.8912)]);
    }

    #[test]
    fn glue_requires_task_name() {
        assert!(glue_fine_tuning(" ", "s3://b/c", "s3://b/d").is_err());
    }
}
