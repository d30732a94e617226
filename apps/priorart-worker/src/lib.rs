pub mod worker;

mod error;

pub use error::{Error, Result};

use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use priorart_providers::RateLimiters;
use priorart_service::{PriorArtService, Providers};
use priorart_storage::db::Db;

#[derive(Debug, Parser)]
#[command(
	version = priorart_cli::VERSION,
	rename_all = "kebab",
	styles = priorart_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = priorart_config::load(&args.config)?;
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();

	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema().await?;

	// One limiter set per process; every concurrently executing run shares the backend spacing.
	let limiters = RateLimiters::from_config(&config.providers);
	let providers = Providers::from_config(&config, &limiters)?;
	let policy = worker::WorkerPolicy::from_config(&config.worker);
	let service = Arc::new(PriorArtService::new(config, db, providers));

	worker::run_worker(service, policy).await
}
