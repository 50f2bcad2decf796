//! `traindeck`: submit training jobs and hyperparameter searches from a
//! TOML config, against a remote service or the in-process sandbox.

mod config;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use td_jobs::{presets, JobService, SandboxJobService, TrainingJobOrchestrator};
use td_remote::HttpServiceClient;
use td_search::{SandboxTuner, SearchOrchestrator, SearchService};
use td_types::{JobSpec, MetricRule, SessionConfig};

use config::{SearchSettings, TrainDeckConfig};

#[derive(Parser, Debug)]
#[command(name = "traindeck", version, about = "Remote training jobs and hyperparameter searches")]
struct Args {
    /// Log level used when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Run against the in-process sandbox instead of the configured endpoint
    #[arg(long, global = true)]
    sandbox: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit the configured job and wait for it to finish
    Run,

    /// Submit the configured job and print its handle without waiting
    Submit,

    /// Show the current status of a job
    Describe {
        job_id: String,
    },

    /// Run the configured hyperparameter search and print every finished trial
    Tune,

    /// Apply a metric pattern to a log file (or stdin) and print the value
    Extract {
        /// Metric name
        #[arg(long, default_value = "metric")]
        name: String,

        /// Regex with exactly one capture group
        #[arg(long)]
        pattern: String,

        file: Option<PathBuf>,
    },

    /// Print a ready-made [job] section
    Preset {
        #[arg(value_enum)]
        kind: PresetKind,

        /// Location of the training code bundle
        #[arg(long)]
        source: String,

        /// Location of the training data
        #[arg(long)]
        data: String,

        /// GLUE task name
        #[arg(long, default_value = "MRPC")]
        task: String,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PresetKind {
    Glue,
    Squad,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = TrainDeckConfig::load(args.config.as_deref())?;
    if args.sandbox {
        config.service.sandbox = true;
    }

    match args.command {
        command @ (Command::Run | Command::Submit) => {
            let wait = matches!(command, Command::Run);
            let spec = config.require_job()?.clone();
            if config.service.sandbox {
                submit_job(SandboxJobService::with_defaults(), &config.session, &spec, wait).await
            } else {
                submit_job(http_client(&config)?, &config.session, &spec, wait).await
            }
        }
        Command::Describe { job_id } => {
            if config.service.sandbox {
                bail!("sandbox jobs only live as long as the process that submitted them");
            }
            let description = http_client(&config)?.describe_job(&job_id).await?;
            print_json(&description)
        }
        Command::Tune => {
            let template = config.require_job()?.clone();
            let search = config.require_search()?.clone();
            if config.service.sandbox {
                tune(SandboxTuner::with_defaults(), &config.session, &template, &search).await
            } else {
                tune(http_client(&config)?, &config.session, &template, &search).await
            }
        }
        Command::Extract {
            name,
            pattern,
            file,
        } => {
            let rule = MetricRule::new(name, &pattern)?;
            let text = match file {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                None => {
                    let mut buffer = String::new();
                    std::io::stdin().read_to_string(&mut buffer)?;
                    buffer
                }
            };
            match rule.extract(&text) {
                Some(value) => {
                    println!("{value}");
                    Ok(())
                }
                None => bail!("no match for {} in input", rule.name()),
            }
        }
        Command::Preset {
            kind,
            source,
            data,
            task,
        } => {
            print!("{}", render_preset(kind, &task, &source, &data)?);
            Ok(())
        }
    }
}

/// A `[job]` section that loads back as the same spec.
fn render_preset(kind: PresetKind, task: &str, source: &str, data: &str) -> anyhow::Result<String> {
    #[derive(Serialize)]
    struct JobSection {
        job: JobSpec,
    }

    let job = match kind {
        PresetKind::Glue => presets::glue_fine_tuning(task, source, data)?,
        PresetKind::Squad => presets::squad_fine_tuning(source, data)?,
    };
    Ok(toml::to_string_pretty(&JobSection { job })?)
}

fn http_client(config: &TrainDeckConfig) -> anyhow::Result<HttpServiceClient> {
    let Some(endpoint) = config.service.endpoint.as_deref() else {
        bail!(
            "no service endpoint configured; set [service] endpoint, TRAINDECK_ENDPOINT, \
             or pass --sandbox"
        );
    };
    let client = HttpServiceClient::new(endpoint)?;
    Ok(match &config.service.auth_token {
        Some(token) => client.with_auth_token(token.clone()),
        None => client,
    })
}

async fn submit_job<S: JobService>(
    service: S,
    session: &SessionConfig,
    spec: &JobSpec,
    wait: bool,
) -> anyhow::Result<()> {
    let orchestrator = TrainingJobOrchestrator::new(service, session.clone());
    let handle = orchestrator.submit(spec).await?;
    if !wait {
        return print_json(&handle);
    }

    let result = orchestrator
        .await_completion(&handle, session.poll_interval(), session.timeout())
        .await?;
    print_json(&result)?;
    if !result.succeeded() {
        bail!("job {} finished with status {:?}", result.job_name, result.status);
    }
    Ok(())
}

async fn tune<S: SearchService>(
    service: S,
    session: &SessionConfig,
    template: &JobSpec,
    search: &SearchSettings,
) -> anyhow::Result<()> {
    let orchestrator = SearchOrchestrator::new(service, session.clone());
    let outcome = orchestrator
        .search(template, &search.space, &search.objective, &search.budget)
        .await?;
    if let Some(best) = outcome.best() {
        info!(trial = %best.trial_name, objective = ?best.objective, "Best trial");
    }
    print_json(&outcome)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
