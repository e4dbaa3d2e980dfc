// src/main.rs
use keyfactor_provider::{cli, init_logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    if !cli::run_cli().await? {
        std::process::exit(1);
    }
    Ok(())
}
