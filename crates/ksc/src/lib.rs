//! 🚀 ksc — the kibana sidecar core.
//!
//! Every interval: connect to Elasticsearch (with a few retries), wipe and recreate the
//! Kibana index with a known mapping, and write one index-pattern document and one
//! config document into it. Whatever anyone clicked in the meantime is gone. That's the job.

pub mod app_config;
pub mod backends;
pub mod connector;
pub mod desired_state;
pub mod documents;
pub mod errors;
pub mod index_manager;
pub mod mapping;
pub mod reconciler;
pub mod scheduler;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::app_config::AppConfig;
use crate::connector::HttpConnector;
use crate::desired_state::DesiredState;
use crate::reconciler::{CycleOutcome, Reconciler, RetryPolicy};
use crate::scheduler::Scheduler;

/// 🏗️ Wire a reconciler against the configured Elasticsearch endpoint.
pub fn build_reconciler(app_config: &AppConfig) -> Result<Reconciler<HttpConnector>> {
    let desired = DesiredState::from_config(&app_config.kibana)
        .context("💀 Could not assemble the desired Kibana state")?;
    Ok(Reconciler::new(
        HttpConnector::new(app_config.elasticsearch.clone()),
        app_config.elasticsearch.url.clone(),
        desired,
        RetryPolicy::from_runtime(&app_config.runtime),
    ))
}

/// 🔁 Run the daemon loop until `shutdown` is cancelled. Returns the cycle count.
pub async fn run(app_config: AppConfig, shutdown: CancellationToken) -> Result<u64> {
    let reconciler = build_reconciler(&app_config)?;
    let scheduler = Scheduler::from_runtime(&app_config.runtime);
    Ok(scheduler.run(&reconciler, shutdown).await)
}

/// 🎯 Run exactly one cycle and hand back what happened.
pub async fn run_once(app_config: AppConfig) -> Result<CycleOutcome> {
    let reconciler = build_reconciler(&app_config)?;
    Ok(reconciler.run_cycle().await)
}
