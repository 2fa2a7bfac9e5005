//! Command implementations.
//!
//! Exit discipline: `Ok` exits 0; any validation or fatal error bubbles up
//! as `Err` and exits 1. Per-file indexing errors are reported but do not
//! fail a completed run.

#![allow(clippy::print_stdout)]

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use super::parser::Commands;
use crate::config::ServiceConfig;
use crate::core::QuestionInput;
use crate::fetcher::{GithubAuth, GithubFetcher};
use crate::http::{self, AppState};
use crate::indexer::Indexer;
use crate::pipeline::Lightopedia;
use crate::policy;

/// Runs a parsed command to completion.
///
/// # Errors
///
/// Returns any validation or fatal error; the binary maps this to exit
/// code 1.
pub async fn execute(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::IndexDocs {
            repo,
            branch,
            force,
            list,
        } => index_docs(repo, branch, force, list).await,
        Commands::Serve { port } => serve(port).await,
        Commands::Ask { question } => ask(&question).await,
    }
}

async fn index_docs(
    repo: Option<String>,
    branch: Option<String>,
    force: bool,
    list: bool,
) -> anyhow::Result<()> {
    if list {
        println!("Indexable repositories:");
        for repo in policy::ALLOWED_REPOS {
            println!("  {repo}");
        }
        return Ok(());
    }

    let repo = repo.context("--repo is required (or use --list)")?;
    let config = ServiceConfig::from_env()?;
    if !config.has_vcs_credentials() {
        tracing::warn!("no VCS credentials configured; only public repositories will work");
    }

    let fetcher = GithubFetcher::new(GithubAuth::from_config(&config));
    let pipeline = Lightopedia::from_config(&config)?;
    let indexer = Indexer::new(pipeline.store(), pipeline.embedder());

    let branch = branch.unwrap_or_else(|| policy::DEFAULT_BRANCH.to_string());
    let summary = indexer
        .index_repo_from_host(&fetcher, &repo, &branch, force)
        .await?;

    println!(
        "indexed {} documents ({} chunks), {} skipped, {} errors [run {}]",
        summary.documents_processed,
        summary.chunks_created,
        summary.skipped,
        summary.errors.len(),
        summary.run_id
    );
    for error in &summary.errors {
        println!("  error: {error}");
    }
    Ok(())
}

async fn serve(port: Option<u16>) -> anyhow::Result<()> {
    let config = ServiceConfig::from_env()?;
    let pipeline = Arc::new(Lightopedia::from_config(&config)?);
    let state = Arc::new(AppState::new(pipeline, config.api_keys.clone()));
    let port = port.unwrap_or(config.http_port);
    http::serve(state, port).await.context("http server failed")
}

async fn ask(question: &str) -> anyhow::Result<()> {
    let config = ServiceConfig::from_env()?;
    let pipeline = Lightopedia::from_config(&config)?;

    let outcome = pipeline
        .handle_question(
            &QuestionInput::bare(question),
            &[],
            None,
            &CancellationToken::new(),
        )
        .await?;

    println!("{}", outcome.response);
    println!("\n[request {}]", outcome.request_id);
    Ok(())
}
