// ABOUTME: Entry point for the promptui binary.
// ABOUTME: Loads .env and config, initializes tracing, and renders or drives the demo pages.

mod cli;
mod demo;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use promptui_browser::{PromptuiConfig, RenderResult, Session, ToolCall, normalize_url};
use promptui_core::router::parse_prompt_url;
use promptui_store::SnapshotStore;
use serde_json::Value;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("promptui=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = PromptuiConfig::from_env()?;
    if let Some(format) = cli.format {
        config.format = format;
    }
    tracing::debug!("config: {:?}", config);

    let store = if config.snapshots && !cli.no_snapshots {
        Some(Arc::new(SnapshotStore::open(&config.home).with_context(|| {
            format!("opening snapshot archive in {}", config.home.display())
        })?))
    } else {
        None
    };

    let browser = Arc::new(demo::browser(config.format));
    let mut session = Session::with_config(browser, &config);
    if let Some(store) = &store {
        session = session.with_sink(store.clone());
    }

    match cli.command {
        Commands::Render { url, json } => {
            let result = session.navigate(&url, vec![]).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_result(&result)?;
            }
        }
        Commands::Exec { url, tool, args } => {
            let args: Value = serde_json::from_str(&args).context("--args must be JSON")?;
            session.navigate(&url, vec![]).await?;
            let output = session.execute(&tool, args).await?;
            println!("{} returned {}\n", tool, serde_json::to_string(&output)?);
            print_result(&follow_page(&mut session).await?)?;
        }
        Commands::Batch { url, calls } => {
            let calls: Vec<ToolCall> =
                serde_json::from_str(&calls).context("--calls must be a JSON array of tool calls")?;
            session.navigate(&url, vec![]).await?;
            let page = session.page().context("no page is open")?.clone();
            let outputs = page.executes(&calls).await?;
            for (call, output) in calls.iter().zip(&outputs) {
                println!("{} returned {}", call.name, serde_json::to_string(output)?);
            }
            println!();
            print_result(&follow_page(&mut session).await?)?;
        }
        Commands::Snapshots { url } => {
            let store = match store {
                Some(store) => store,
                None => Arc::new(SnapshotStore::open(&config.home)?),
            };
            let url = url.map(|u| normalize_url(&u));
            for record in store.replay()? {
                if url.as_deref().is_some_and(|u| u != record.url) {
                    continue;
                }
                println!("{}  {}  {}", record.saved_at.to_rfc3339(), record.snapshot_id, record.url);
            }
        }
    }

    Ok(())
}

/// Re-render after tool calls. When a tool navigated the page elsewhere,
/// open the new address instead.
async fn follow_page(session: &mut Session) -> anyhow::Result<RenderResult> {
    let moved_to = session.page().map(|page| page.url()).and_then(|url| {
        let current = parse_prompt_url(session.current_url()).ok()?;
        (url.pathname() != current.pathname()).then(|| url.to_prompt_url())
    });
    let result = match moved_to {
        Some(target) => session.navigate(&target, vec![]).await?,
        None => session.refresh().await?,
    };
    Ok(result)
}

fn print_result(result: &RenderResult) -> anyhow::Result<()> {
    println!("{}", result.prompt.trim_end());
    println!("\nTools:");
    println!("{}", serde_json::to_string_pretty(&result.tools)?);
    Ok(())
}
