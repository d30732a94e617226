use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = priorart_poll::Args::parse();

	priorart_poll::run(args).await
}
