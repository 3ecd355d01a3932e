use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = tally_replay::Args::parse();

	tally_replay::run(args).await
}
