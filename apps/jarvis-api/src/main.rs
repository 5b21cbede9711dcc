use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = jarvis_api::Args::parse();

	jarvis_api::run(args).await
}
