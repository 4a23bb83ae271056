//! Command-line arguments of the `dirstore` binary.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// dirstore - directory backend storage tools
#[derive(Parser, Debug)]
#[command(name = "dirstore")]
#[command(author = "dirstore contributors")]
#[command(version)]
#[command(about = "Offline tools for the dirstore directory backend", long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long = "config", default_value = "dirstore.toml", global = true)]
    pub config: PathBuf,

    /// Override the configured log level
    #[arg(long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load entries from an LDIF file into the backend
    ImportLdif(ImportLdifArgs),

    /// Show trust state, limits and sizes of every index
    IndexStatus(IndexStatusArgs),

    /// Rebuild the indexes of stored entries and mark them trusted
    RebuildIndex(RebuildIndexArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ImportLdifArgs {
    /// LDIF file to import
    #[arg(short = 'l', long = "ldif", value_name = "FILE")]
    pub ldif_file: PathBuf,

    /// Add entries to the existing content one at a time
    #[arg(long = "append")]
    pub append: bool,

    /// Replace entries that already exist
    #[arg(long = "replace-existing")]
    pub replace_existing: bool,

    /// Remove all existing content before importing
    #[arg(long = "clear-backend")]
    pub clear_backend: bool,

    /// Only import entries at or below this DN (repeatable)
    #[arg(long = "include-branch", value_name = "DN")]
    pub include_branches: Vec<String>,

    /// Skip entries at or below this DN (repeatable)
    #[arg(long = "exclude-branch", value_name = "DN")]
    pub exclude_branches: Vec<String>,

    /// Number of import worker threads
    #[arg(long = "threads", value_name = "N")]
    pub threads: Option<usize>,

    /// Write rejected records to this file
    #[arg(long = "reject-file", value_name = "PATH")]
    pub reject_file: Option<String>,

    /// Write skipped records to this file
    #[arg(long = "skip-file", value_name = "PATH")]
    pub skip_file: Option<String>,

    #[arg(long = "skip-schema-validation")]
    pub skip_schema_validation: bool,

    /// Directory for the import's temporary sort chunks
    #[arg(long = "temp-dir", value_name = "DIR")]
    pub temp_dir: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct IndexStatusArgs {
    /// Only report the container holding this base DN
    #[arg(long = "base-dn", value_name = "DN")]
    pub base_dn: Option<String>,

    /// Print JSON instead of a table
    #[arg(long = "json")]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RebuildIndexArgs {
    /// Only rebuild the indexes of this base DN
    #[arg(long = "base-dn", value_name = "DN")]
    pub base_dn: Option<String>,

    /// Directory for the rebuild's temporary sort chunks
    #[arg(long = "temp-dir", value_name = "DIR")]
    pub temp_dir: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_import_command() {
        let cli = Cli::parse_from([
            "dirstore",
            "--config",
            "/etc/dirstore.toml",
            "import-ldif",
            "--ldif",
            "data.ldif",
            "--include-branch",
            "ou=people,dc=example,dc=com",
            "--include-branch",
            "ou=groups,dc=example,dc=com",
            "--threads",
            "4",
            "--replace-existing",
        ]);

        assert_eq!(cli.config, PathBuf::from("/etc/dirstore.toml"));
        match cli.command {
            Command::ImportLdif(args) => {
                assert_eq!(args.ldif_file, PathBuf::from("data.ldif"));
                assert_eq!(args.include_branches.len(), 2);
                assert_eq!(args.threads, Some(4));
                assert!(args.replace_existing);
                assert!(!args.append);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_index_status_defaults() {
        let cli = Cli::parse_from(["dirstore", "index-status", "--json"]);
        assert_eq!(cli.config, PathBuf::from("dirstore.toml"));
        match cli.command {
            Command::IndexStatus(args) => {
                assert!(args.json);
                assert!(args.base_dn.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_rebuild_index() {
        let cli = Cli::parse_from(["dirstore", "rebuild-index", "--base-dn", "dc=example,dc=com"]);
        match cli.command {
            Command::RebuildIndex(args) => {
                assert_eq!(args.base_dn.as_deref(), Some("dc=example,dc=com"));
                assert!(args.temp_dir.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_import_requires_file() {
        assert!(Cli::try_parse_from(["dirstore", "import-ldif"]).is_err());
    }
}
