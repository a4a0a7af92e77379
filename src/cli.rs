//! CLI argument parsing for the upload-ingest-worker binary.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "upload-ingest-worker", about = "Ingests uploaded CSV files and notifies recipients")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Listen for upload events on NATS (default if no subcommand given)
    Serve,
    /// Process a single uploaded object and print the run report
    Run {
        /// Bucket holding the object
        #[arg(long)]
        bucket: String,
        /// Object name within the bucket
        #[arg(long)]
        object: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_no_command_defaults_to_none() {
        let cli = Cli::parse_from(["upload-ingest-worker"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_serve_command_parses() {
        let cli = Cli::parse_from(["upload-ingest-worker", "serve"]);
        assert!(matches!(cli.command, Some(Command::Serve)));
    }

    #[test]
    fn test_cli_run_command_parses() {
        let cli = Cli::parse_from([
            "upload-ingest-worker",
            "run",
            "--bucket",
            "uploads",
            "--object",
            "daily/users.csv",
        ]);
        match cli.command {
            Some(Command::Run { bucket, object }) => {
                assert_eq!(bucket, "uploads");
                assert_eq!(object, "daily/users.csv");
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_cli_run_requires_object() {
        let result = Cli::try_parse_from(["upload-ingest-worker", "run", "--bucket", "uploads"]);
        assert!(result.is_err());
    }
}
