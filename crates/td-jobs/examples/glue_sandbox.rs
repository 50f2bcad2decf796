use std::time::Duration;

use td_jobs::*;
use td_types::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("TrainDeck GLUE sandbox example");

    let spec = presets::glue_fine_tuning("MRPC", "s3://bucket/code.tar.gz", "s3://bucket/glue")?
        .with_role("arn:aws:iam::111122223333:role/training");
    println!("Job prefix: {}", spec.job_name_prefix());

    // Every job finishes after five seconds and prints a final eval dict.
    let service = SandboxJobService::with_defaults().with_script(|request| {
        println!("Sandbox received {} hyperparameters", request.hyperparameters.len());
        SandboxRun::succeeded(
            Duration::from_secs(5),
            "***** Eval results *****\n{'acc_': 0.8603, 'f1_': 0.9021}",
        )
    });

    let session = SessionConfig::default()
        .with_bucket("bucket")
        .with_polling(Duration::from_secs(1), Duration::from_secs(60));
    let orchestrator = TrainingJobOrchestrator::new(service, session.clone());

    let handle = orchestrator.submit(&spec).await?;
    println!("Submitted {} as {}", handle.job_name, handle.job_id);

    let result = orchestrator
        .await_completion(&handle, session.poll_interval(), session.timeout())
        .await?;
    println!("Status: {:?}", result.status);
    for (name, value) in &result.metrics {
        match value {
            Some(v) => println!("  {name}: {v:.4}"),
            None => println!("  {name}: not reported"),
        }
    }

    Ok(())
}
