//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Durable sequential download queue for HLS video streams.
///
/// Items are persisted in the data directory and processed one at a time by
/// `run`, using the built-in streaming engine or ffmpeg.
#[derive(Parser, Debug)]
#[command(name = "stream-downloader")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: $XDG_CONFIG_HOME/stream-downloader/config.toml)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the queue and history files
    #[arg(long, value_name = "DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Enqueue a stream without downloading it yet
    Add(AddArgs),
    /// Remove a pending item by video id
    Remove {
        /// Video id of the pending item
        video_id: String,
    },
    /// Print pending items in processing order
    List,
    /// Process the persisted queue until it is empty
    Run,
    /// Drop every pending item
    PurgeQueue,
    /// Forget which videos were downloaded
    PurgeHistory,
    /// Report whether ffmpeg is available
    Check,
}

#[derive(clap::Args, Debug, Clone, PartialEq)]
pub struct AddArgs {
    /// Video id (numeric or text)
    #[arg(long)]
    pub video_id: String,

    /// Playlist URL (`.m3u8`)
    #[arg(long)]
    pub url: String,

    /// Owner id
    #[arg(long)]
    pub user_id: Option<String>,

    /// Owner display name, used by `%%username%%`
    #[arg(long)]
    pub user_name: Option<String>,

    /// Video title, used by `%%videotitle%%`
    #[arg(long)]
    pub title: Option<String>,

    /// Video timestamp
    #[arg(long)]
    pub time: Option<f64>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_run_parses_with_defaults() {
        let args = Args::try_parse_from(["stream-downloader", "run"]).unwrap();
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert!(args.config.is_none());
        assert!(args.data_dir.is_none());
        assert_eq!(args.command, Command::Run);
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["stream-downloader", "-v", "list"]).unwrap();
        assert_eq!(args.verbose, 1);

        let args = Args::try_parse_from(["stream-downloader", "list", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_quiet_flag_sets_quiet() {
        let args = Args::try_parse_from(["stream-downloader", "--quiet", "run"]).unwrap();
        assert!(args.quiet);
    }

    #[test]
    fn test_cli_global_paths() {
        let args = Args::try_parse_from([
            "stream-downloader",
            "--config",
            "/etc/sd.toml",
            "check",
            "--data-dir",
            "/tmp/sd",
        ])
        .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("/etc/sd.toml")));
        assert_eq!(args.data_dir, Some(PathBuf::from("/tmp/sd")));
        assert_eq!(args.command, Command::Check);
    }

    #[test]
    fn test_cli_add_requires_id_and_url() {
        let result = Args::try_parse_from(["stream-downloader", "add", "--url", "http://h/a.m3u8"]);
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::MissingRequiredArgument
        );
    }

    #[test]
    fn test_cli_add_all_fields() {
        let args = Args::try_parse_from([
            "stream-downloader",
            "add",
            "--video-id",
            "42",
            "--url",
            "http://h/v/index.m3u8",
            "--user-id",
            "7",
            "--user-name",
            "Bob",
            "--title",
            "Clip",
            "--time",
            "12.5",
        ])
        .unwrap();
        let Command::Add(add) = args.command else {
            panic!("expected add command");
        };
        assert_eq!(add.video_id, "42");
        assert_eq!(add.url, "http://h/v/index.m3u8");
        assert_eq!(add.user_id.as_deref(), Some("7"));
        assert_eq!(add.user_name.as_deref(), Some("Bob"));
        assert_eq!(add.title.as_deref(), Some("Clip"));
        assert_eq!(add.time, Some(12.5));
    }

    #[test]
    fn test_cli_remove_takes_positional_id() {
        let args = Args::try_parse_from(["stream-downloader", "remove", "abc"]).unwrap();
        assert_eq!(
            args.command,
            Command::Remove {
                video_id: "abc".to_string()
            }
        );
    }

    #[test]
    fn test_cli_kebab_case_subcommands() {
        let args = Args::try_parse_from(["stream-downloader", "purge-queue"]).unwrap();
        assert_eq!(args.command, Command::PurgeQueue);
        let args = Args::try_parse_from(["stream-downloader", "purge-history"]).unwrap();
        assert_eq!(args.command, Command::PurgeHistory);
    }

    #[test]
    fn test_cli_missing_subcommand_is_error() {
        let result = Args::try_parse_from(["stream-downloader"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Args::try_parse_from(["stream-downloader", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_invalid_flag_returns_error() {
        let err = Args::try_parse_from(["stream-downloader", "--invalid-flag", "run"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }
}
