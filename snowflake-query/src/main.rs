use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use snowflake_query::args::Args;
use snowflake_query::interrupt::InterruptListener;

// the interrupt listener needs a worker of its own while the main task blocks on stdout
#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let filter = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    // stdout carries the CSV, everything else goes to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(std::io::stderr)
        .init();

    let cancel = CancellationToken::new();
    let listener = InterruptListener::arm(cancel.clone());

    let result = snowflake_query::run(&args, std::io::stdout().lock(), &cancel).await;
    listener.disarm();

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
