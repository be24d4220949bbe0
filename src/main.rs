use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rival_lib::run(rival_lib::cli::Cli::parse()).await
}
