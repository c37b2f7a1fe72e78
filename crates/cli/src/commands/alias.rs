//! Alias management commands
//!
//! Aliases are named references to S3-compatible storage endpoints,
//! including connection details and credentials.

use clap::Subcommand;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use serde::Serialize;

use pw_core::{Alias, AliasManager, RetryConfig, TimeoutConfig};

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Alias subcommands for managing storage service connections
#[derive(Subcommand, Debug)]
pub enum AliasCommands {
    /// Add or update an alias
    Set(SetArgs),

    /// List all configured aliases
    List(ListArgs),

    /// Remove an alias
    Remove(RemoveArgs),
}

/// Arguments for the `alias set` command
#[derive(clap::Args, Debug)]
pub struct SetArgs {
    /// Alias name (e.g., "local", "s3", "minio")
    pub name: String,

    /// S3 endpoint URL (e.g., "http://localhost:9000", "https://s3.amazonaws.com")
    pub endpoint: String,

    /// Access key ID
    pub access_key: String,

    /// Secret access key
    pub secret_key: String,

    /// AWS region
    #[arg(long, default_value = "us-east-1")]
    pub region: String,

    /// Bucket lookup style: auto, path, or dns
    #[arg(long, default_value = "auto")]
    pub bucket_lookup: String,

    /// Attempts per page request, including the first
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Read timeout per page request, in milliseconds
    #[arg(long)]
    pub read_timeout_ms: Option<u64>,

    /// Fail instead of replacing an alias that already exists
    #[arg(long)]
    pub no_overwrite: bool,
}

/// Arguments for the `alias list` command
#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Show a table with region, lookup, and transport settings
    #[arg(short, long)]
    pub long: bool,
}

/// Arguments for the `alias remove` command
#[derive(clap::Args, Debug)]
pub struct RemoveArgs {
    /// Name of the alias to remove
    pub name: String,
}

/// JSON output for alias list
#[derive(Serialize)]
struct AliasListOutput {
    aliases: Vec<AliasInfo>,
}

/// Alias information for output (never includes credentials)
#[derive(Debug, Serialize)]
struct AliasInfo {
    name: String,
    endpoint: String,
    region: String,
    bucket_lookup: String,
    max_attempts: u32,
    read_timeout_ms: u64,
}

impl From<&Alias> for AliasInfo {
    fn from(alias: &Alias) -> Self {
        Self {
            name: alias.name.clone(),
            endpoint: alias.endpoint.clone(),
            region: alias.region.clone(),
            bucket_lookup: alias.bucket_lookup.clone(),
            max_attempts: alias.retry_config().max_attempts,
            read_timeout_ms: alias.timeout_config().read_ms,
        }
    }
}

/// JSON output for alias set/remove operations
#[derive(Serialize)]
struct AliasOperationOutput {
    success: bool,
    alias: String,
    message: String,
}

/// Execute an alias subcommand
pub async fn execute(cmd: AliasCommands, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let alias_manager = match AliasManager::new() {
        Ok(am) => am,
        Err(e) => {
            formatter.error(&e.to_string());
            return ExitCode::from(&e);
        }
    };

    match cmd {
        AliasCommands::Set(args) => execute_set(args, &alias_manager, &formatter),
        AliasCommands::List(args) => execute_list(args, &alias_manager, &formatter),
        AliasCommands::Remove(args) => execute_remove(args, &alias_manager, &formatter),
    }
}

fn build_alias(args: &SetArgs) -> Alias {
    let mut alias = Alias::new(
        args.name.clone(),
        args.endpoint.clone(),
        args.access_key.clone(),
        args.secret_key.clone(),
    );
    alias.region = args.region.clone();
    alias.bucket_lookup = args.bucket_lookup.clone();
    alias.retry = args.max_attempts.map(|max_attempts| RetryConfig {
        max_attempts,
        ..RetryConfig::default()
    });
    alias.timeout = args.read_timeout_ms.map(|read_ms| TimeoutConfig {
        read_ms,
        ..TimeoutConfig::default()
    });
    alias
}

fn execute_set(args: SetArgs, manager: &AliasManager, formatter: &Formatter) -> ExitCode {
    let alias = build_alias(&args);
    let name = alias.name.clone();

    let result = if args.no_overwrite {
        manager.add(alias)
    } else {
        manager.set(alias)
    };
    match result {
        Ok(()) => {
            if formatter.is_json() {
                formatter.json(&AliasOperationOutput {
                    success: true,
                    alias: name.clone(),
                    message: format!("Alias '{name}' configured successfully"),
                });
            } else {
                formatter.success(&format!("Alias '{name}' configured successfully."));
            }
            ExitCode::Success
        }
        Err(e) => {
            formatter.error(&e.to_string());
            ExitCode::from(&e)
        }
    }
}

fn alias_table(aliases: &[AliasInfo]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Name", "Endpoint", "Region", "Lookup", "Attempts", "Read timeout"]);

    for info in aliases {
        table.add_row(vec![
            info.name.clone(),
            info.endpoint.clone(),
            info.region.clone(),
            info.bucket_lookup.clone(),
            info.max_attempts.to_string(),
            format!("{}ms", info.read_timeout_ms),
        ]);
    }
    table
}

fn execute_list(args: ListArgs, manager: &AliasManager, formatter: &Formatter) -> ExitCode {
    let aliases = match manager.list() {
        Ok(aliases) => aliases,
        Err(e) => {
            formatter.error(&e.to_string());
            return ExitCode::from(&e);
        }
    };
    let infos: Vec<AliasInfo> = aliases.iter().map(AliasInfo::from).collect();

    if formatter.is_json() {
        formatter.json(&AliasListOutput { aliases: infos });
    } else if infos.is_empty() {
        formatter.println("No aliases configured.");
    } else if args.long {
        formatter.println(&alias_table(&infos).to_string());
    } else {
        for info in &infos {
            formatter.println(&format!("{:<12} {}", info.name, info.endpoint));
        }
    }
    ExitCode::Success
}

fn execute_remove(args: RemoveArgs, manager: &AliasManager, formatter: &Formatter) -> ExitCode {
    match manager.remove(&args.name) {
        Ok(()) => {
            if formatter.is_json() {
                formatter.json(&AliasOperationOutput {
                    success: true,
                    alias: args.name.clone(),
                    message: format!("Alias '{}' removed successfully", args.name),
                });
            } else {
                formatter.success(&format!("Alias '{}' removed successfully.", args.name));
            }
            ExitCode::Success
        }
        Err(e) => {
            formatter.error(&e.to_string());
            ExitCode::from(&e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pw_core::ConfigManager;
    use tempfile::TempDir;

    fn set_args(name: &str, endpoint: &str) -> SetArgs {
        SetArgs {
            name: name.to_string(),
            endpoint: endpoint.to_string(),
            access_key: "accesskey".to_string(),
            secret_key: "secretkey".to_string(),
            region: "us-east-1".to_string(),
            bucket_lookup: "auto".to_string(),
            max_attempts: None,
            read_timeout_ms: None,
            no_overwrite: false,
        }
    }

    fn temp_manager() -> (AliasManager, TempDir) {
        let dir = TempDir::new().unwrap();
        let manager =
            AliasManager::with_config_manager(ConfigManager::with_path(dir.path().join("c.toml")));
        (manager, dir)
    }

    #[test]
    fn test_build_alias_applies_transport_overrides() {
        let mut args = set_args("minio", "http://localhost:9000");
        args.max_attempts = Some(5);
        args.read_timeout_ms = Some(1500);

        let alias = build_alias(&args);
        assert_eq!(alias.retry_config().max_attempts, 5);
        assert_eq!(alias.retry_config().initial_backoff_ms, 100);
        assert_eq!(alias.timeout_config().read_ms, 1500);
        assert_eq!(alias.timeout_config().connect_ms, 5000);
    }

    #[test]
    fn test_build_alias_defaults_leave_transport_unset() {
        let alias = build_alias(&set_args("minio", "http://localhost:9000"));
        assert!(alias.retry.is_none());
        assert!(alias.timeout.is_none());
    }

    #[test]
    fn test_set_rejects_invalid_endpoint() {
        let (manager, _dir) = temp_manager();
        let code = execute_set(
            set_args("bad", "ftp://example.com"),
            &manager,
            &Formatter::default(),
        );
        assert_eq!(code, ExitCode::UsageError);
        assert!(!manager.exists("bad").unwrap());
    }

    #[test]
    fn test_set_without_overwrite_keeps_existing_alias() {
        let (manager, _dir) = temp_manager();
        let formatter = Formatter::default();
        assert_eq!(
            execute_set(set_args("minio", "http://a:9000"), &manager, &formatter),
            ExitCode::Success
        );

        let mut args = set_args("minio", "http://b:9000");
        args.no_overwrite = true;
        assert_eq!(execute_set(args, &manager, &formatter), ExitCode::Conflict);
        assert_eq!(manager.get("minio").unwrap().endpoint, "http://a:9000");

        let mut args = set_args("other", "http://b:9000");
        args.no_overwrite = true;
        assert_eq!(execute_set(args, &manager, &formatter), ExitCode::Success);
    }

    #[test]
    fn test_remove_missing_is_not_found() {
        let (manager, _dir) = temp_manager();
        let code = execute_remove(
            RemoveArgs {
                name: "ghost".into(),
            },
            &manager,
            &Formatter::default(),
        );
        assert_eq!(code, ExitCode::NotFound);
    }

    #[test]
    fn test_alias_info_hides_credentials() {
        let alias = Alias::new("test", "http://localhost:9000", "key", "secret");
        let json = serde_json::to_string(&AliasInfo::from(&alias)).unwrap();
        assert!(!json.contains("secret"));
        insta::assert_json_snapshot!(AliasInfo::from(&alias), @r#"
        {
          "name": "test",
          "endpoint": "http://localhost:9000",
          "region": "us-east-1",
          "bucket_lookup": "auto",
          "max_attempts": 3,
          "read_timeout_ms": 30000
        }
        "#);
    }

    #[test]
    fn test_alias_table_lists_every_alias() {
        let infos = vec![
            AliasInfo::from(&Alias::new("a", "http://a:9000", "k", "s")),
            AliasInfo::from(&Alias::new("b", "http://b:9000", "k", "s")),
        ];
        let rendered = alias_table(&infos).to_string();
        assert!(rendered.contains("http://a:9000"));
        assert!(rendered.contains("http://b:9000"));
        assert!(rendered.contains("Read timeout"));
    }
}
