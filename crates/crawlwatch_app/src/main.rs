mod app;
mod cli;
mod render;

use clap::Parser;
use crawlwatch_logging::crawl_info;

use cli::{Cli, CliCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    crawlwatch_logging::initialize(cli.log_to.into(), cli.log_level, &cli.log_file);
    crawl_info!("crawlwatch {} starting", env!("CARGO_PKG_VERSION"));

    match &cli.command {
        CliCommand::Run(args) => app::run(&cli, args).await,
        CliCommand::Stop { session } => app::stop(&cli, session).await,
        CliCommand::Status { session } => app::status(&cli, session).await,
    }
}
