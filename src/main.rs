// src/main.rs

use proclaunch::engine::CoordinatorState;
use proclaunch::{cli, logging, run};

#[tokio::main]
async fn main() {
    match run_main().await {
        Ok(Some(CoordinatorState::Complete)) | Ok(None) => {}
        Ok(Some(_)) => std::process::exit(2),
        Err(err) => {
            eprintln!("proclaunch error: {err:?}");
            std::process::exit(1);
        }
    }
}

async fn run_main() -> anyhow::Result<Option<CoordinatorState>> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    run(args).await
}
