use super::app_config::LogLevel;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command line arguments.
#[derive(Debug, Parser)]
#[command(
    name = "anomaly-cache",
    version,
    about = "LRU image cache with throttled persistence",
    long_about = None
)]
pub struct CliArgs {
    /// Configuration file path.
    #[arg(short, long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH", global = true)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum, global = true)]
    pub log_level: Option<LogLevel>,

    /// Maximum number of cached images.
    #[arg(long, global = true)]
    pub capacity: Option<usize>,

    /// Durable store directory.
    #[arg(long, value_name = "DIR", global = true)]
    pub store_dir: Option<PathBuf>,

    /// Base URL for relative image paths.
    #[arg(long, value_name = "URL", global = true)]
    pub base_url: Option<String>,

    /// Share one download between concurrent requests for the same URL.
    #[arg(long, global = true)]
    pub coalesce: bool,

    /// Keep cache metadata in memory only, for this run.
    #[arg(long, global = true, conflicts_with = "store_dir")]
    pub ephemeral: bool,

    /// Operation to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Cache operations.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load images into the cache.
    Preload {
        /// Image URLs.
        #[arg(required = true)]
        urls: Vec<String>,

        /// Load one at a time instead of concurrently.
        #[arg(long)]
        sequential: bool,
    },
    /// Show cached URLs and statistics.
    Status,
    /// Remove images from the cache.
    Remove {
        /// Image URLs.
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Empty the cache and erase the persisted record.
    Clear,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_preload() {
        let args = CliArgs::parse_from([
            "anomaly-cache",
            "preload",
            "https://a.example/1.png",
            "https://a.example/2.png",
            "--sequential",
        ]);

        match args.command {
            Command::Preload { urls, sequential } => {
                assert_eq!(urls.len(), 2);
                assert!(sequential);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = CliArgs::parse_from(["anomaly-cache", "status", "--capacity", "3"]);

        assert_eq!(args.capacity, Some(3));
        assert!(matches!(args.command, Command::Status));
    }

    #[test]
    fn test_ephemeral_conflicts_with_store_dir() {
        assert!(
            CliArgs::try_parse_from(["anomaly-cache", "--ephemeral", "--store-dir", "/tmp/x", "clear"])
                .is_err()
        );
        assert!(CliArgs::parse_from(["anomaly-cache", "clear", "--ephemeral"]).ephemeral);
    }

    #[test]
    fn test_remove_requires_urls() {
        assert!(CliArgs::try_parse_from(["anomaly-cache", "remove"]).is_err());
    }
}
