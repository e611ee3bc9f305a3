use clap::Parser;

use immostat::cli::{run, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    immostat::logging::init();
    let cli = Cli::parse();
    let output = run(cli).await?;
    println!("{}", output);
    Ok(())
}
