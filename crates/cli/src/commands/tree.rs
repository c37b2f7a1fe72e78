//! tree command - Walk the virtual folder tree of a bucket
//!
//! Each level is one hierarchical listing; folders are descended by listing
//! again with the folder as prefix, down to `--depth` levels.

use std::future::Future;
use std::pin::Pin;

use clap::Args;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use pw_core::{
    Defaults, Error, HierarchyNode, ListBackend, ListPath, ListRequest, PagedLister,
    parse_list_path,
};

use super::{interrupt_token, open_lister};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig, PageProgress};

/// Show a bucket as a tree
#[derive(Args, Debug)]
pub struct TreeArgs {
    /// Listing path: alias/bucket or alias/bucket/prefix
    pub path: String,

    /// Maximum number of levels to descend (unlimited by default)
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
    pub depth: Option<u32>,

    /// Page-size hint sent to the server (default from config)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub page_size: Option<u32>,
}

/// One node of the rendered tree
#[derive(Debug, Serialize)]
struct TreeEntry {
    name: String,
    folder: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    size_bytes: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<TreeEntry>,
}

/// Output structure for tree command (JSON format)
#[derive(Debug, Serialize)]
struct TreeOutput {
    root: String,
    entries: Vec<TreeEntry>,
    folders: usize,
    objects: usize,
    /// Set when the walk stopped before visiting every folder
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    incomplete: bool,
    #[serde(skip)]
    interrupted: bool,
    /// Page fetch error that ended the walk after some entries arrived
    #[serde(skip)]
    failure: Option<Error>,
}

struct Walk<'a, B> {
    lister: &'a PagedLister<B>,
    base: ListRequest,
    delimiter: char,
    max_depth: Option<u32>,
    cancel: CancellationToken,
    folders: usize,
    objects: usize,
    failure: Option<Error>,
}

impl<'a, B: ListBackend> Walk<'a, B> {
    /// List one level below `prefix` and descend into its folders
    ///
    /// A fetch error is kept in `failure` and stops the walk; entries
    /// listed before it are still returned.
    fn level<'w>(
        &'w mut self,
        prefix: String,
        depth: u32,
        progress: &'w mut PageProgress,
    ) -> Pin<Box<dyn Future<Output = pw_core::Result<Vec<TreeEntry>>> + 'w>> {
        Box::pin(async move {
            let lister = self.lister;
            let request = self.base.clone().with_prefix(prefix.clone());
            let mut cursor = lister
                .list_hierarchical(request, self.delimiter)?
                .with_cancellation(self.cancel.clone());

            let mut nodes = Vec::new();
            while let Some(node) = cursor.next().await {
                match node {
                    Ok(node) => nodes.push(node),
                    Err(e) => {
                        self.failure = Some(e);
                        break;
                    }
                }
                progress.add_entries(1, cursor.pages_fetched());
            }

            let descend = self.max_depth.is_none_or(|max| depth < max);
            let mut entries = Vec::with_capacity(nodes.len());
            for node in nodes {
                let short = node
                    .name()
                    .strip_prefix(prefix.as_str())
                    .unwrap_or(node.name())
                    .to_string();
                match node {
                    HierarchyNode::Prefix { name } => {
                        self.folders += 1;
                        let children = if descend
                            && self.failure.is_none()
                            && !self.cancel.is_cancelled()
                        {
                            self.level(name, depth + 1, progress).await?
                        } else {
                            Vec::new()
                        };
                        entries.push(TreeEntry {
                            name: short,
                            folder: true,
                            size_bytes: None,
                            children,
                        });
                    }
                    HierarchyNode::Leaf(item) => {
                        self.objects += 1;
                        entries.push(TreeEntry {
                            name: short,
                            folder: false,
                            size_bytes: item.size_bytes,
                            children: Vec::new(),
                        });
                    }
                }
            }
            Ok(entries)
        })
    }
}

async fn run<B: ListBackend>(
    lister: &PagedLister<B>,
    path: &ListPath,
    args: &TreeArgs,
    defaults: &Defaults,
    cancel: CancellationToken,
    progress: &mut PageProgress,
) -> pw_core::Result<TreeOutput> {
    if path.is_alias_root() {
        return Err(Error::InvalidPath(format!(
            "tree needs a bucket: use {}/BUCKET[/PREFIX]",
            path.alias
        )));
    }

    let mut walk = Walk {
        lister,
        base: path
            .to_request()
            .with_page_size(args.page_size.unwrap_or(defaults.page_size)),
        delimiter: defaults.delimiter,
        max_depth: args.depth,
        cancel,
        folders: 0,
        objects: 0,
        failure: None,
    };

    let entries = walk
        .level(path.dir_prefix(defaults.delimiter), 1, progress)
        .await?;

    if let Some(e) = walk.failure.take_if(|_| entries.is_empty()) {
        return Err(e);
    }

    let interrupted = walk.cancel.is_cancelled();
    Ok(TreeOutput {
        root: path.to_string(),
        entries,
        folders: walk.folders,
        objects: walk.objects,
        incomplete: interrupted || walk.failure.is_some(),
        interrupted,
        failure: walk.failure,
    })
}

fn render(output: &TreeOutput, formatter: &Formatter) -> Vec<String> {
    let mut lines = vec![output.root.clone()];
    render_level(&output.entries, "", formatter, &mut lines);
    lines
}

fn render_level(entries: &[TreeEntry], indent: &str, formatter: &Formatter, lines: &mut Vec<String>) {
    for (i, entry) in entries.iter().enumerate() {
        let last = i + 1 == entries.len();
        let branch = if last { "└── " } else { "├── " };
        let name = if entry.folder {
            formatter.folder(&entry.name)
        } else {
            entry.name.clone()
        };
        lines.push(format!("{indent}{branch}{name}"));

        let child_indent = format!("{indent}{}", if last { "    " } else { "│   " });
        render_level(&entry.children, &child_indent, formatter, lines);
    }
}

/// Execute the tree command
pub async fn execute(args: TreeArgs, defaults: &Defaults, output_config: OutputConfig) -> ExitCode {
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

    let mut progress = PageProgress::new(&output_config, &format!("Walking {path}"));
    let result = run(&lister, &path, &args, defaults, interrupt_token(), &mut progress).await;
    progress.finish();

    match result {
        Ok(output) => {
            if formatter.is_json() {
                formatter.json(&output);
            } else {
                for line in render(&output, &formatter) {
                    formatter.println(&line);
                }
                formatter.println(&format!(
                    "\n{} folders, {} objects",
                    output.folders, output.objects
                ));
            }
            if let Some(e) = &output.failure {
                formatter.error(&format!("Walk of {path} stopped early: {e}"));
                ExitCode::from(e)
            } else if output.interrupted {
                formatter.warning("Walk interrupted; tree is incomplete");
                ExitCode::Interrupted
            } else {
                ExitCode::Success
            }
        }
        Err(e) => {
            formatter.error(&format!("Failed to walk {path}: {e}"));
            ExitCode::from(&e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pw_core::MemoryBackend;

    use crate::commands::tests::FailingBackend;

    fn photos_backend() -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend
            .put_blobs(
                "photos",
                ["2023/c.jpg", "2024/feb/b.jpg", "2024/jan/a.jpg", "cover.png"],
            )
            .unwrap();
        backend
    }

    fn photos() -> PagedLister<MemoryBackend> {
        PagedLister::new(photos_backend())
    }

    fn plain() -> Formatter {
        Formatter::new(OutputConfig {
            no_color: true,
            ..Default::default()
        })
    }

    async fn walk<B: ListBackend>(
        lister: &PagedLister<B>,
        raw: &str,
        depth: Option<u32>,
    ) -> pw_core::Result<TreeOutput> {
        let args = TreeArgs {
            path: raw.to_string(),
            depth,
            page_size: Some(1),
        };
        let mut progress = PageProgress::new(
            &OutputConfig {
                no_progress: true,
                ..Default::default()
            },
            "test",
        );
        let path = parse_list_path(raw).unwrap();
        run(
            lister,
            &path,
            &args,
            &Defaults::default(),
            CancellationToken::new(),
            &mut progress,
        )
        .await
    }

    #[tokio::test]
    async fn test_full_tree() {
        let lister = photos();
        let output = walk(&lister, "m/photos", None).await.unwrap();
        assert_eq!(output.folders, 4);
        assert_eq!(output.objects, 4);

        insta::assert_snapshot!(render(&output, &plain()).join("\n"), @r"
        m/photos
        ├── 2023/
        │   └── c.jpg
        ├── 2024/
        │   ├── feb/
        │   │   └── b.jpg
        │   └── jan/
        │       └── a.jpg
        └── cover.png
        ");
    }

    #[tokio::test]
    async fn test_depth_limits_descent() {
        let lister = photos();
        let output = walk(&lister, "m/photos", Some(1)).await.unwrap();
        assert_eq!(output.folders, 2);
        assert_eq!(output.objects, 1);
        assert!(output.entries.iter().all(|e| e.children.is_empty()));
        // One level, one entry per page.
        assert_eq!(lister.backend().fetch_count(), 3);
    }

    #[tokio::test]
    async fn test_subtree_from_prefix() {
        let lister = photos();
        let output = walk(&lister, "m/photos/2024", None).await.unwrap();
        let names: Vec<_> = output.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["feb/", "jan/"]);
        assert_eq!(output.objects, 2);
    }

    #[tokio::test]
    async fn test_failure_mid_walk_keeps_visited_entries() {
        // Page size 1: fetch 1 lists "2023/", fetch 2 (the rest of the root) fails.
        let lister = PagedLister::new(FailingBackend::on_fetch(photos_backend(), 2));
        let output = walk(&lister, "m/photos", None).await.unwrap();

        assert!(output.incomplete);
        assert!(matches!(output.failure, Some(Error::BackendUnavailable(_))));
        assert_eq!(output.folders, 1);
        assert_eq!(output.objects, 0);
        insta::assert_snapshot!(render(&output, &plain()).join("\n"), @r"
        m/photos
        └── 2023/
        ");
    }

    #[tokio::test]
    async fn test_failure_in_subfolder_stops_descent() {
        // Fetches 1-3 list the root one entry at a time; fetch 4 is "2023/".
        let lister = PagedLister::new(FailingBackend::on_fetch(photos_backend(), 4));
        let output = walk(&lister, "m/photos", None).await.unwrap();

        assert!(output.incomplete);
        assert!(output.failure.is_some());
        assert_eq!(output.folders, 2);
        assert_eq!(output.objects, 1);
        assert!(output.entries.iter().all(|e| e.children.is_empty()));
    }

    #[tokio::test]
    async fn test_failure_before_any_entry_is_an_error() {
        let lister = PagedLister::new(FailingBackend::on_fetch(photos_backend(), 1));
        let err = walk(&lister, "m/photos", None).await.unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable(_)));
    }

    #[tokio::test]
    async fn test_alias_root_rejected() {
        let lister = photos();
        let err = walk(&lister, "m", None).await.unwrap_err();
        assert!(matches!(err, Error::InvalidPath(_)));
    }

    #[tokio::test]
    async fn test_cancelled_walk_stops_fetching() {
        let lister = photos();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let args = TreeArgs {
            path: "m/photos".into(),
            depth: None,
            page_size: None,
        };
        let mut progress = PageProgress::new(
            &OutputConfig {
                no_progress: true,
                ..Default::default()
            },
            "test",
        );
        let output = run(
            &lister,
            &parse_list_path("m/photos").unwrap(),
            &args,
            &Defaults::default(),
            cancel,
            &mut progress,
        )
        .await
        .unwrap();

        assert!(output.interrupted);
        assert!(output.entries.is_empty());
        assert_eq!(lister.backend().fetch_count(), 0);
    }
}
