//! ls command - List buckets and objects
//!
//! With only an alias, lists buckets. With a bucket, lists one level of the
//! virtual folder tree, or every object below the prefix with `--recursive`.
//! `--page` prints a single page plus the token that resumes after it.

use std::fmt::Write as _;

use clap::Args;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use pw_core::{
    ContinuationToken, Defaults, HierarchyNode, IncludeFlags, ListBackend, ListPath, ListRequest,
    PagedLister, parse_list_path,
};

use super::{interrupt_token, open_lister};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig, PageProgress};

/// Width of a `%Y-%m-%d %H:%M:%S` timestamp
const BLANK_DATE: &str = "                   ";

/// List buckets or objects
#[derive(Args, Debug)]
pub struct LsArgs {
    /// Listing path: alias, alias/bucket, or alias/bucket/prefix
    pub path: String,

    /// List every object below the prefix instead of one level
    #[arg(short, long)]
    pub recursive: bool,

    /// Page-size hint sent to the server (default from config)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub page_size: Option<u32>,

    /// Print exactly one page and the token for the next one
    #[arg(long)]
    pub page: bool,

    /// Resume a paged listing from a token printed by --page
    #[arg(long, value_name = "TOKEN", requires = "page")]
    pub continuation_token: Option<ContinuationToken>,

    /// Include previous object versions
    #[arg(long)]
    pub versions: bool,

    /// Include delete markers
    #[arg(long)]
    pub deleted: bool,

    /// Print totals after the listing
    #[arg(long)]
    pub summarize: bool,
}

/// Output structure for ls command (JSON format)
#[derive(Debug, Serialize)]
pub(crate) struct LsOutput {
    entries: Vec<HierarchyNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    continuation_token: Option<ContinuationToken>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<Summary>,
    /// Set when the listing stopped before its last page
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    incomplete: bool,
    #[serde(skip)]
    interrupted: bool,
    /// Page fetch error that ended the listing after some entries arrived
    #[serde(skip)]
    failure: Option<pw_core::Error>,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
struct Summary {
    prefixes: usize,
    objects: usize,
    total_size_bytes: i64,
    total_size_human: String,
}

impl Summary {
    fn of(entries: &[HierarchyNode]) -> Self {
        let mut summary = Self {
            prefixes: 0,
            objects: 0,
            total_size_bytes: 0,
            total_size_human: String::new(),
        };
        for entry in entries {
            match entry {
                HierarchyNode::Prefix { .. } => summary.prefixes += 1,
                HierarchyNode::Leaf(item) => {
                    summary.objects += 1;
                    summary.total_size_bytes += item.size_bytes.unwrap_or(0);
                }
            }
        }
        summary.total_size_human =
            humansize::format_size(summary.total_size_bytes.max(0) as u64, humansize::BINARY);
        summary
    }
}

/// How a listing is walked
#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    /// One page, optionally resumed from a token
    Page(Option<ContinuationToken>),
    /// One level of the virtual folder tree
    Level(char),
    /// Every entry below the prefix
    Flat,
}

#[derive(Debug)]
struct Plan {
    request: ListRequest,
    mode: Mode,
}

fn plan(path: &ListPath, args: &LsArgs, defaults: &Defaults) -> Plan {
    let delimiter = defaults.delimiter;
    let hierarchical = !args.recursive && !path.is_alias_root();
    let prefix = if hierarchical {
        path.dir_prefix(delimiter)
    } else {
        path.prefix.clone()
    };

    let request = path
        .to_request()
        .with_prefix(prefix)
        .with_page_size(args.page_size.unwrap_or(defaults.page_size))
        .with_include(IncludeFlags {
            versions: args.versions,
            deleted: args.deleted,
            ..IncludeFlags::default()
        });

    if args.page {
        let request = if hierarchical {
            request.with_delimiter(delimiter)
        } else {
            request
        };
        return Plan {
            request,
            mode: Mode::Page(args.continuation_token.clone()),
        };
    }

    let mode = if hierarchical {
        Mode::Level(delimiter)
    } else {
        Mode::Flat
    };
    Plan { request, mode }
}

async fn run<B: ListBackend>(
    lister: &PagedLister<B>,
    plan: Plan,
    summarize: bool,
    cancel: CancellationToken,
    progress: &mut PageProgress,
) -> pw_core::Result<LsOutput> {
    let mut entries = Vec::new();
    let mut continuation_token = None;
    let mut failure = None;

    match plan.mode {
        Mode::Page(token) => {
            let page = lister.list_page(&plan.request, token.as_ref()).await?;
            progress.add_entries(page.len(), 1);
            continuation_token = page.continuation_token.clone();
            entries = page.into_nodes();
        }
        Mode::Level(delimiter) => {
            let mut cursor = lister
                .list_hierarchical(plan.request, delimiter)?
                .with_cancellation(cancel.clone());
            while let Some(node) = cursor.next().await {
                match node {
                    Ok(node) => entries.push(node),
                    Err(e) if entries.is_empty() => return Err(e),
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
                progress.add_entries(1, cursor.pages_fetched());
            }
        }
        Mode::Flat => {
            let mut cursor = lister
                .list_all(plan.request)?
                .with_cancellation(cancel.clone());
            while let Some(item) = cursor.next().await {
                match item {
                    Ok(item) => entries.push(HierarchyNode::Leaf(item)),
                    Err(e) if entries.is_empty() => return Err(e),
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
                progress.add_entries(1, cursor.pages_fetched());
            }
        }
    }

    let summary = summarize.then(|| Summary::of(&entries));
    let interrupted = cancel.is_cancelled();
    Ok(LsOutput {
        entries,
        continuation_token,
        summary,
        incomplete: interrupted || failure.is_some(),
        interrupted,
        failure,
    })
}

/// Render one entry as a human-readable line
fn render_line(node: &HierarchyNode, formatter: &Formatter) -> String {
    match node {
        HierarchyNode::Prefix { name } => {
            format!("[{BLANK_DATE}] {:>10} {}", "PRE", formatter.folder(name))
        }
        HierarchyNode::Leaf(item) => {
            let date = item
                .last_modified
                .map(|d| d.strftime("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| BLANK_DATE.to_string());
            let size = item.size_human.as_deref().unwrap_or("");

            let mut line = format!("[{}] {size:>10} {}", formatter.dim(&date), item.name);
            if let Some(version) = &item.version_id {
                let _ = write!(line, " (version {version})");
            }
            if item.deleted {
                line.push_str(" [deleted]");
            }
            line
        }
    }
}

fn print_output(output: &LsOutput, formatter: &Formatter) {
    if formatter.is_json() {
        formatter.json(output);
        return;
    }

    for entry in &output.entries {
        formatter.println(&render_line(entry, formatter));
    }

    if let Some(token) = &output.continuation_token {
        formatter.println(&format!(
            "\nNext page: --continuation-token {}",
            formatter.dim(token.as_str())
        ));
    }

    if let Some(summary) = &output.summary {
        formatter.println(&format!(
            "\nTotal: {} prefixes, {} objects, {}",
            summary.prefixes, summary.objects, summary.total_size_human
        ));
    }
}

/// Execute the ls command
pub async fn execute(args: LsArgs, defaults: &Defaults, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config.clone());

    let path = match parse_list_path(&args.path) {
        Ok(path) => path,
        Err(e) => {
            formatter.error(&e.to_string());
            return ExitCode::from(&e);
        }
    };

    let lister = match open_lister(&path.alias).await {
        Ok(lister) => lister,
        Err(e) => {
            formatter.error(&e.to_string());
            return ExitCode::from(&e);
        }
    };

    let plan = plan(&path, &args, defaults);
    tracing::debug!(path = %path, mode = ?plan.mode, "Listing");

    let mut progress = PageProgress::new(&output_config, &format!("Listing {path}"));
    let result = run(&lister, plan, args.summarize, interrupt_token(), &mut progress).await;
    progress.finish();

    match result {
        Ok(output) => {
            print_output(&output, &formatter);
            if let Some(e) = &output.failure {
                formatter.error(&format!(
                    "Listing of {path} stopped after {} entries: {e}",
                    output.entries.len()
                ));
                ExitCode::from(e)
            } else if output.interrupted {
                formatter.warning("Listing interrupted; output is incomplete");
                ExitCode::Interrupted
            } else {
                ExitCode::Success
            }
        }
        Err(e) => {
            formatter.error(&format!("Failed to list {path}: {e}"));
            ExitCode::from(&e)
        }
    }
}
