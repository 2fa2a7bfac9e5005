//! Command-line argument definitions.

use clap::{Parser, Subcommand};

/// Lightopedia: grounded question answering over Light's help articles.
#[derive(Debug, Parser)]
#[command(name = "lightopedia", version, about)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Index help articles from an allowlisted repository.
    #[command(name = "index-docs", visible_alias = "index:docs")]
    IndexDocs {
        /// Repository slug (owner/name).
        #[arg(long)]
        repo: Option<String>,

        /// Branch to index (defaults to the repository default branch).
        #[arg(long)]
        branch: Option<String>,

        /// Re-index files even when their revision is unchanged.
        #[arg(long)]
        force: bool,

        /// Print the repository allowlist and exit.
        #[arg(long)]
        list: bool,
    },

    /// Serve the HTTP ask/debug surface.
    Serve {
        /// Listen port (defaults to LIGHTOPEDIA_PORT or 8080).
        #[arg(long)]
        port: Option<u16>,
    },

    /// Ask one question from the terminal.
    Ask {
        /// The question text.
        question: String,
    },
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_index_docs() {
        let cli = Cli::try_parse_from([
            "lightopedia",
            "index-docs",
            "--repo",
            "light-platform/help-center",
            "--force",
        ])
        .unwrap_or_else(|e| panic!("parse failed: {e}"));
        match cli.command {
            Commands::IndexDocs {
                repo, force, list, ..
            } => {
                assert_eq!(repo.as_deref(), Some("light-platform/help-center"));
                assert!(force);
                assert!(!list);
            }
            Commands::Serve { .. } | Commands::Ask { .. } => panic!("wrong command"),
        }
    }

    #[test]
    fn test_parse_index_docs_alias() {
        let cli = Cli::try_parse_from(["lightopedia", "index:docs", "--list"])
            .unwrap_or_else(|e| panic!("parse failed: {e}"));
        assert!(matches!(
            cli.command,
            Commands::IndexDocs { list: true, .. }
        ));
    }

    #[test]
    fn test_parse_ask() {
        let cli = Cli::try_parse_from(["lightopedia", "ask", "Can Light export invoices?"])
            .unwrap_or_else(|e| panic!("parse failed: {e}"));
        assert!(matches!(cli.command, Commands::Ask { .. }));
    }

    #[test]
    fn test_parse_serve_port() {
        let cli = Cli::try_parse_from(["lightopedia", "serve", "--port", "9000"])
            .unwrap_or_else(|e| panic!("parse failed: {e}"));
        assert!(matches!(
            cli.command,
            Commands::Serve { port: Some(9000) }
        ));
    }
}
