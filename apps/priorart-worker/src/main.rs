use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = priorart_worker::Args::parse();

	priorart_worker::run(args).await
}
