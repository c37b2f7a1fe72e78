//! pw - paginated listing for S3-compatible object storage
//!
//! Lists buckets and objects page by page, with resumable continuation
//! tokens and folder-style navigation.

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use pagewalk_cli::commands::{self, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins; --debug only changes the fallback level.
    let fallback = if cli.debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let exit_code = commands::execute(cli).await;

    std::process::exit(exit_code.as_i32());
}
