//! Command-line client: trigger a domain search for a disclosure (or resume the one already
//! tracked for it) and poll until the results are in.

use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use color_eyre::eyre;
use tracing_subscriber::EnvFilter;

use priorart_domain::{Disclosure, Domain};
use priorart_poller::{
	Clock, FileSnapshots, HttpSearchApi, NO_RESULTS_FOUND, PollOutcome, PollPolicy, Poller,
	SnapshotStore,
};

#[derive(Debug, Parser)]
#[command(
	version = priorart_cli::VERSION,
	rename_all = "kebab",
	styles = priorart_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	/// Disclosure JSON with `id`, `keywords`, and optional `title` and `description`.
	#[arg(long, short = 'd', value_name = "FILE")]
	pub disclosure: PathBuf,
	#[arg(long, value_name = "patents|papers")]
	pub domain: Domain,
	/// Forget the tracked job and trigger a fresh search.
	#[arg(long)]
	pub reset: bool,
	#[arg(long, value_name = "MS", default_value_t = 30_000)]
	pub request_timeout_ms: u64,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = priorart_config::load(&args.config)?;
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

	let raw = tokio::fs::read(&args.disclosure).await?;
	let disclosure: Disclosure = serde_json::from_slice(&raw)?;

	if disclosure.id.trim().is_empty() {
		return Err(eyre::eyre!("Disclosure id must be non-empty."));
	}

	let snapshots = Arc::new(FileSnapshots::new(&config.poller.snapshot_dir));

	if args.reset {
		reset_job(snapshots.as_ref(), &disclosure, args.domain).await?;
	}

	let api = HttpSearchApi::new(
		&config.poller.api_base,
		Duration::from_millis(args.request_timeout_ms),
	)?;
	let poller = Poller::new(
		Arc::new(api),
		snapshots,
		PollPolicy::from_config(&config.poller),
		Clock::system(),
	);
	let outcome = poller.run(&disclosure, args.domain).await?;

	report(&disclosure, args.domain, outcome)
}

async fn reset_job(
	snapshots: &FileSnapshots,
	disclosure: &Disclosure,
	domain: Domain,
) -> color_eyre::Result<()> {
	let key = priorart_poller::JobKey { disclosure_id: disclosure.id.clone(), domain };

	if let Some(mut job) = snapshots.load(&key).await? {
		tracing::info!(
			disclosure_id = %disclosure.id,
			domain = %domain,
			state = %job.state,
			"Resetting tracked search job."
		);

		job.reset();
		snapshots.save(&job).await?;
	}

	Ok(())
}

fn report(disclosure: &Disclosure, domain: Domain, outcome: PollOutcome) -> color_eyre::Result<()> {
	match outcome {
		PollOutcome::Complete(status) => {
			let results = status.results.unwrap_or_default();

			for result in &results {
				println!("{}", serde_json::to_string(result)?);
			}

			tracing::info!(
				disclosure_id = %disclosure.id,
				domain = %domain,
				count = results.len(),
				kept = results.iter().filter(|r| r.add_to_report).count(),
				"Search complete."
			);

			Ok(())
		},
		PollOutcome::NotReady { attempts } => {
			tracing::warn!(
				disclosure_id = %disclosure.id,
				domain = %domain,
				attempts,
				"Results were not ready in time. Run again later to resume."
			);

			Err(eyre::eyre!("{NO_RESULTS_FOUND} for {} ({domain}).", disclosure.id))
		},
		PollOutcome::Failed { message } =>
			Err(eyre::eyre!("Search for {} ({domain}) failed: {message}", disclosure.id)),
		PollOutcome::Abandoned => Err(eyre::eyre!(
			"Search for {} ({domain}) was abandoned. Use --reset to start over.",
			disclosure.id
		)),
	}
}
