mod logic;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ensemble_coordination::ensemble::{
    ExecutionContext, ExecutionCoordinator, ExecutionOptions, ExecutionRequest, ValidationLevel,
};
use ensemble_coordination::{EngineConfig, InMemoryRepository};

use logic::EchoLogic;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute an ensemble and print the result as JSON
    Run {
        /// YAML or JSON definitions document
        #[arg(long)]
        definitions: PathBuf,

        #[arg(long)]
        ensemble: String,

        /// Input object handed to every agent, as JSON
        #[arg(long)]
        input: Option<String>,

        #[arg(long, default_value_t = 300)]
        timeout_secs: u64,

        /// Attempts per agent
        #[arg(long, default_value_t = 1)]
        max_retries: u32,

        #[arg(long, default_value_t = false)]
        fail_fast: bool,

        #[arg(long, default_value_t = false)]
        collect_all: bool,

        /// Attach a progress snapshot to the result metadata
        #[arg(long, default_value_t = false)]
        monitor: bool,

        /// Engine config file (TOML); ENSEMBLE_* variables override it
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print a summary of an ensemble definition
    Status {
        #[arg(long)]
        definitions: PathBuf,

        #[arg(long)]
        ensemble: String,
    },

    /// Validate an ensemble definition; exits 1 when invalid
    Validate {
        #[arg(long)]
        definitions: PathBuf,

        #[arg(long)]
        ensemble: String,

        #[arg(long, default_value_t = false)]
        comprehensive: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Run {
            definitions,
            ensemble,
            input,
            timeout_secs,
            max_retries,
            fail_fast,
            collect_all,
            monitor,
            config,
        } => {
            let config = match config {
                Some(path) => EngineConfig::load(&path)
                    .with_context(|| format!("loading config {}", path.display()))?,
                None => EngineConfig::from_env().context("reading ENSEMBLE_* overrides")?,
            };
            let coordinator = coordinator(&definitions)?.with_config(config);

            let options = ExecutionOptions {
                max_retries,
                fail_fast,
                collect_all,
                enable_monitoring: monitor,
                ..Default::default()
            }
            .with_timeout(Duration::from_secs(timeout_secs));

            let mut request = ExecutionRequest::new(ensemble).with_options(options);
            if let Some(raw) = input {
                request.input = parse_input(&raw)?;
            }

            let cancel = CancellationToken::new();
            let ctx = ExecutionContext::with_token(cancel.clone());
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, cancelling execution");
                    cancel.cancel();
                }
            });

            let result = coordinator
                .execute_with_context(&ctx, request)
                .await
                .context("executing ensemble")?;
            info!(status = %result.status, "Run complete");

            let summary = result.summary();
            print_json(&json!({ "result": result, "summary": summary }))?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Status {
            definitions,
            ensemble,
        } => {
            let view = coordinator(&definitions)?
                .ensemble_status(&ensemble)
                .context("looking up ensemble")?;
            print_json(&view)?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Validate {
            definitions,
            ensemble,
            comprehensive,
        } => {
            let level = if comprehensive {
                ValidationLevel::Comprehensive
            } else {
                ValidationLevel::Basic
            };
            let report = coordinator(&definitions)?
                .validate_ensemble(&ensemble, level)
                .context("looking up ensemble")?;
            print_json(&report)?;
            Ok(if report.is_valid {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

fn coordinator(definitions: &Path) -> Result<ExecutionCoordinator> {
    let repo = InMemoryRepository::load_file(definitions)
        .with_context(|| format!("loading definitions {}", definitions.display()))?;
    info!(elements = repo.len(), "Definitions loaded");
    Ok(ExecutionCoordinator::new(repo.shared(), Arc::new(EchoLogic)))
}

fn parse_input(raw: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str(raw).context("parsing --input")? {
        Value::Object(map) => Ok(map),
        other => bail!("--input must be a JSON object, got {other}"),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_input_requires_object() {
        let map = parse_input(r#"{"topic": "release"}"#).unwrap();
        assert_eq!(map["topic"], "release");

        let err = parse_input("[1, 2]").unwrap_err();
        assert!(err.to_string().contains("must be a JSON object"));
        assert!(parse_input("not json").is_err());
    }

    #[test]
    fn test_run_defaults() {
        let args = Args::try_parse_from([
            "ensemble-runner",
            "run",
            "--definitions",
            "defs.yaml",
            "--ensemble",
            "team",
        ])
        .unwrap();

        match args.command {
            Command::Run {
                timeout_secs,
                max_retries,
                fail_fast,
                monitor,
                ..
            } => {
                assert_eq!(timeout_secs, 300);
                assert_eq!(max_retries, 1);
                assert!(!fail_fast);
                assert!(!monitor);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
