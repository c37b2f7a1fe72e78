//! CLI command definitions and execution
//!
//! Each command parses its own arguments, opens what it needs, and maps
//! failures to an exit code through `pw_core::Error::exit_code`.

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use pw_core::{AliasManager, Config, ConfigManager, PagedLister};
use pw_s3::S3Backend;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

mod alias;
mod completions;
mod ls;
mod tree;

/// pw - page through object storage listings
///
/// Lists buckets and objects on S3-compatible services one page at a time,
/// with resumable continuation tokens and folder-style navigation.
#[derive(Parser, Debug)]
#[command(name = "pw")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format: human-readable or JSON
    #[arg(long, global = true, default_value = "false")]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true, default_value = "false")]
    pub no_color: bool,

    /// Disable the paging spinner
    #[arg(long, global = true, default_value = "false")]
    pub no_progress: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true, default_value = "false")]
    pub quiet: bool,

    /// Enable debug logging
    #[arg(long, global = true, default_value = "false")]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage storage service aliases
    #[command(subcommand)]
    Alias(alias::AliasCommands),

    /// List buckets and objects
    Ls(ls::LsArgs),

    /// Show a bucket's folders as a tree
    Tree(tree::TreeArgs),

    /// Generate shell completion scripts
    Completions(completions::CompletionsArgs),
}

/// Combine command-line flags with the `[defaults]` table
fn output_config(cli: &Cli, config: &Config) -> OutputConfig {
    let defaults = &config.defaults;
    OutputConfig {
        json: cli.json || defaults.output == "json",
        no_color: cli.no_color || defaults.color == "never",
        no_progress: cli.no_progress || !defaults.progress,
        quiet: cli.quiet,
    }
}

/// Open a lister over the S3 endpoint an alias names
async fn open_lister(alias_name: &str) -> pw_core::Result<PagedLister<S3Backend>> {
    let alias = AliasManager::new()?.get(alias_name)?;
    Ok(PagedLister::new(S3Backend::new(&alias).await?))
}

/// Token cancelled on Ctrl+C, so listings stop before their next page
fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("Interrupt received, stopping before the next page");
            trigger.cancel();
        }
    });
    token
}

/// Execute the CLI command and return an exit code
pub async fn execute(cli: Cli) -> ExitCode {
    let config = match ConfigManager::new().and_then(|manager| manager.load()) {
        Ok(config) => config,
        Err(e) => {
            Formatter::new(OutputConfig {
                json: cli.json,
                no_color: cli.no_color,
                ..Default::default()
            })
            .error(&e.to_string());
            return ExitCode::from(&e);
        }
    };

    if config.defaults.color == "always" && !cli.no_color {
        console::set_colors_enabled(true);
        console::set_colors_enabled_stderr(true);
    }

    let output_config = output_config(&cli, &config);
    match cli.command {
        Commands::Alias(cmd) => alias::execute(cmd, output_config).await,
        Commands::Ls(args) => ls::execute(args, &config.defaults, output_config).await,
        Commands::Tree(args) => tree::execute(args, &config.defaults, output_config).await,
        Commands::Completions(args) => completions::execute(args),
    }
}
