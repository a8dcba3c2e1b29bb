//! 🚀 ksc-cli — the front door, the bouncer, the maitre d' of the kibana sidecar.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 This binary crate is the thin CLI wrapper that parses flags, loads config,
//! sets up logging, and then lets the real code do the heavy lifting.
//! Like a manager. 🦆

use std::future::Future;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::Table;
use ksc::app_config::{AppConfig, load_config};
use ksc::reconciler::CycleOutcome;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// 📋 Keeps Kibana's configuration in Elasticsearch the way we configured it.
#[derive(Debug, Parser)]
#[command(name = "kibana-sidecar", version)]
struct Cli {
    /// Optional TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Elasticsearch endpoint URL, e.g. 'http://elasticsearch:9200'
    #[arg(long, global = true, env = "ELASTICSEARCH_ENDPOINT")]
    elasticsearch_endpoint: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Reconcile forever, once per interval. Overrides config changes made interactively.
    Daemon,
    /// Reconcile exactly once and report what happened
    Once,
    /// Print version and target information
    Version,
}

/// 🚀 main() — where it all begins. The genesis. The big bang.
///
/// 🔧 Steps:
/// 1. Init tracing (so we can see what goes wrong, and when)
/// 2. Parse args
/// 3. Load config (the moment of truth)
/// 4. Run the thing (send it and pray 🙏)
/// 5. Handle errors (cry)
#[tokio::main]
async fn main() -> Result<()> {
    // 📡 Set up tracing — info by default, RUST_LOG if you want to see the wire
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let result = run(cli).await;

    // 💀 Error handling: the part where we find out what went wrong
    // and print it in a way that's helpful at 3am
    if let Err(err) = result {
        error!("💀 error: {}", err);
        let mut the_vibes_are_giving_connection_issues = false;
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
            let cause_str = cause.to_string();
            if cause_str.contains("error sending request")
                || cause_str.contains("onnection refused")
                || cause_str.contains("tcp connect error")
                || cause_str.contains("dns error")
            {
                the_vibes_are_giving_connection_issues = true;
            }
        }
        if the_vibes_are_giving_connection_issues {
            error!(
                "🔧 hint: looks like Elasticsearch isn't reachable. \
                Double-check --elasticsearch-endpoint and that the cluster is actually running. ☕"
            );
        }
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let app_config = load_config(cli.config.as_deref(), cli.elasticsearch_endpoint.as_deref())
        .context("💀 In ksc-cli, we couldn't load the configuration. Check the file, check the KSC_* env vars, check for tabs where spaces should be.")?;

    match cli.command.unwrap_or(Command::Daemon) {
        Command::Daemon => daemon(app_config).await,
        Command::Once => once(app_config).await,
        Command::Version => {
            println!("{}", version_table(&app_config));
            Ok(())
        }
    }
}

/// 🔁 Forever. Or until Ctrl-C, which only lands between cycles. A second Ctrl-C
/// doesn't wait for anything.
async fn daemon(app_config: AppConfig) -> Result<()> {
    let shutdown = CancellationToken::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if relay_interrupts(tokio::signal::ctrl_c, signal_shutdown).await {
            error!("💀 Second Ctrl-C, abandoning the cycle in flight");
            std::process::exit(130);
        }
    });

    ksc::run(app_config, shutdown)
        .await
        .context("💀 The sidecar daemon could not start")?;
    Ok(())
}

async fn once(app_config: AppConfig) -> Result<()> {
    let outcome = ksc::run_once(app_config)
        .await
        .context("💀 The single reconciliation cycle could not start")?;
    println!("{}", outcome_table(&outcome));
    if !outcome.is_complete() {
        anyhow::bail!("💀 The cycle ended in {:?}", outcome.state);
    }
    Ok(())
}

/// 🛑 First interrupt cancels `shutdown`. Returns `true` once a second one arrives,
/// `false` if the signal source gives out first.
async fn relay_interrupts<F, Fut>(mut next_interrupt: F, shutdown: CancellationToken) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if next_interrupt().await.is_err() {
        return false;
    }
    info!("🛑 Ctrl-C received, stopping after the current cycle. Press it again to stop right now.");
    shutdown.cancel();
    next_interrupt().await.is_ok()
}

fn version_table(app_config: &AppConfig) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["🔧 Setting", "📋 Value"]);
    table.add_row(vec!["package", env!("CARGO_PKG_NAME")]);
    table.add_row(vec!["version", env!("CARGO_PKG_VERSION")]);
    table.add_row(vec!["endpoint", app_config.elasticsearch.url.as_str()]);
    table.add_row(vec!["index", app_config.kibana.index_name.as_str()]);
    table.add_row(vec!["index pattern", app_config.kibana.index_pattern_title.as_str()]);
    table.add_row(vec!["config version", app_config.kibana.config_version.as_str()]);
    table
}

fn outcome_table(outcome: &CycleOutcome) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["📊 Cycle", "📋 Result"]);
    table.add_row(vec!["state".to_string(), format!("{:?}", outcome.state)]);
    table.add_row(vec![
        "connection attempts".to_string(),
        outcome.connection_attempts.to_string(),
    ]);
    table.add_row(vec![
        "index".to_string(),
        outcome
            .index_action
            .map(|action| format!("{action:?}"))
            .unwrap_or_else(|| "-".to_string()),
    ]);
    table.add_row(vec![
        "index-pattern".to_string(),
        outcome.index_pattern_id.clone().unwrap_or_else(|| "-".to_string()),
    ]);
    table.add_row(vec![
        "config".to_string(),
        outcome.config_id.clone().unwrap_or_else(|| "-".to_string()),
    ]);
    for err in &outcome.errors {
        table.add_row(vec!["error".to_string(), err.to_string()]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[tokio::test]
    async fn the_one_where_the_first_ctrl_c_is_polite_and_the_second_is_not() {
        let shutdown = CancellationToken::new();
        let mut presses = 0;

        let force = relay_interrupts(
            || {
                presses += 1;
                std::future::ready(Ok(()))
            },
            shutdown.clone(),
        )
        .await;

        assert!(shutdown.is_cancelled(), "the first press asks the loop to stop");
        assert!(force, "the second press means now");
        assert_eq!(presses, 2);
    }

    #[tokio::test]
    async fn the_one_where_a_broken_signal_handler_does_not_force_anything() {
        let shutdown = CancellationToken::new();
        let mut presses = 0;

        let force = relay_interrupts(
            || {
                presses += 1;
                std::future::ready(if presses == 1 {
                    Ok(())
                } else {
                    Err(std::io::Error::other("signal handler went away"))
                })
            },
            shutdown.clone(),
        )
        .await;

        assert!(shutdown.is_cancelled());
        assert!(!force);
    }

    #[test]
    fn the_one_where_the_help_text_actually_says_something() {
        let about = Cli::command()
            .get_about()
            .map(|about| about.to_string())
            .unwrap_or_default();
        assert!(about.contains("Kibana"), "got '{about}'");
        Cli::command().debug_assert();
    }
}
