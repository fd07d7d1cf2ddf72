mod cli;
mod ui;

use std::sync::Arc;

use anyhow::{Context, Result};
use bidtrack::config::BidtrackConfig;
use bidtrack::state_machine::{RunCommandResult, StorageSpec};
use bidtrack::{
    ComputeNodeEndpoint, Delivery, ExecutionState, InMemoryJobStore, JobExecutions,
    JobStateResolver, RequesterEndpoint, VerificationResult, WaitCondition,
};
use clap::Parser;
use cli::{Cli, Command};
use tracing_subscriber::EnvFilter;
use ui::ExecutionProgress;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = BidtrackConfig::load().context("failed to load bidtrack.toml")?;
    init_tracing(&config, cli.verbose);

    match cli.command {
        Command::Demo { job, nodes } => run_demo(&config, &job, &nodes).await,
        Command::States => {
            ui::print_states();
            Ok(())
        }
        Command::Inspect { file } => {
            let contents = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let job: JobExecutions = serde_json::from_str(&contents)
                .with_context(|| format!("failed to decode {}", file.display()))?;
            ui::print_summary(job.job_id(), job.verification_tally(), &job.count_by_state());
            Ok(())
        }
    }
}

fn init_tracing(config: &BidtrackConfig, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Drive one execution per node from ask-for-bid to publication.
async fn run_demo(config: &BidtrackConfig, job_id: &str, nodes: &[String]) -> Result<()> {
    let store = Arc::new(InMemoryJobStore::new());
    let requester = RequesterEndpoint::new(Arc::clone(&store));
    let compute = ComputeNodeEndpoint::new(Arc::clone(&store));
    let resolver = JobStateResolver::new(Arc::clone(&store), config.poll_config());

    for node_id in nodes {
        let copy = requester.create_execution(job_id, node_id).await?;
        let progress = ExecutionProgress::start(&copy);

        let copy = track(&progress, requester.ask_for_bid(&copy).await?);
        let bid = track(&progress, compute.accept_ask_for_bid(&copy).await?);
        // At-least-once transport: the node's answer arrives twice.
        track(&progress, compute.accept_ask_for_bid(&copy).await?);
        let copy = bid;

        let copy = track(&progress, requester.accept_bid(&copy).await?);
        let output = RunCommandResult {
            stdout: format!("hello from {node_id}\n"),
            ..Default::default()
        };
        let proposal = format!("result:{job_id}:{node_id}").into_bytes();
        let copy = track(
            &progress,
            compute.propose_result(&copy, proposal, Some(output)).await?,
        );
        let verdict = VerificationResult {
            complete: true,
            result: true,
        };
        let copy = track(&progress, requester.verify(&copy, verdict).await?);
        let published = StorageSpec {
            storage_source: "inline".into(),
            name: format!("{job_id}-{node_id}"),
            ..Default::default()
        };
        let copy = track(&progress, requester.complete(&copy, published).await?);
        progress.finish(&copy);
    }

    let job = resolver.wait(job_id, WaitCondition::AllTerminal).await?;
    println!("{}", serde_json::to_string_pretty(&job)?);
    ui::print_summary(job_id, job.verification_tally(), &job.count_by_state());
    Ok(())
}

fn track(progress: &ExecutionProgress, delivery: Delivery) -> ExecutionState {
    let execution = match delivery {
        Delivery::Applied(execution) => execution,
        Delivery::Duplicate(execution) => {
            progress.duplicate(execution.state);
            execution
        }
    };
    progress.update_state(execution.state);
    execution
}
