use clap::Parser;
use ward::cli::{self, Cli};
use ward::logging;

#[tokio::main]
async fn main() -> miette::Result<()> {
    logging::init();
    let cli = Cli::parse();
    cli::run(cli).await
}
