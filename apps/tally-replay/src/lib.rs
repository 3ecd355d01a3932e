pub mod replay;
pub mod synthetic;

use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use tokio::io::{self, BufReader};
use tracing_subscriber::EnvFilter;

use tally_service::{
	Collaborators, MemoryQuota, PgQuota, PgUsageLog, QuotaLimits, TallyService, TracingUsageLog,
};
use tally_storage::db::Db;

#[derive(Debug, Parser)]
#[command(
	version = tally_cli::VERSION,
	rename_all = "kebab",
	styles = tally_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	/// JSON-lines workload. Reads stdin when omitted.
	#[arg(long, short = 'i', value_name = "FILE")]
	pub input: Option<PathBuf>,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = tally_config::load(&args.config)?;
	let filter = EnvFilter::new(config.service.log_level.clone());

	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

	let collaborators = collaborators(&config).await?;
	let service = TallyService::start(&config, collaborators);
	let stdout = std::io::stdout();
	let result = match args.input.as_ref() {
		Some(path) => {
			let file = tokio::fs::File::open(path).await?;

			replay::replay(&service.orchestrator, BufReader::new(file), stdout.lock()).await
		},
		None => replay::replay(&service.orchestrator, BufReader::new(io::stdin()), stdout.lock()).await,
	};
	let written = service.shutdown().await;
	let replayed = result?;

	tracing::info!(replayed, usage_records = written, "Replay finished.");

	Ok(())
}

async fn collaborators(config: &tally_config::Config) -> color_eyre::Result<Collaborators> {
	let limits = QuotaLimits::from_config(&config.quota);
	let search = Arc::new(synthetic::SyntheticSearch);

	let Some(postgres) = config.storage.postgres.as_ref() else {
		tracing::info!("No Postgres configured. Using in-memory quota ledger.");

		return Ok(Collaborators::new(
			Arc::new(MemoryQuota::new(limits)),
			search,
			Arc::new(TracingUsageLog),
		));
	};
	let db = Db::connect(postgres).await?;

	db.ensure_schema().await?;

	Ok(Collaborators::new(
		Arc::new(PgQuota::new(db.clone(), limits)),
		search,
		Arc::new(PgUsageLog::new(db)),
	))
}
