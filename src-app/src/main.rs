use clap::Parser;
use rentora_app::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rentora_app::init_tracing();
    rentora_app::run(Cli::parse()).await
}
