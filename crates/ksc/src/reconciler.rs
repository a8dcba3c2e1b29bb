//! 🎬 *[camera pans across a Kibana instance someone has been "customizing"]*
//! 🎬 "In a world where dashboards drift..."
//! 🎬 "One reconciler dared to put them back."
//! 🎬 *[record scratch]* 🦆
//!
//! 📦 The Reconciler: one cycle, start to finish.
//!
//! ```text
//! Disconnected → Connecting → IndexReady → WritingPattern → WritingConfig → CycleComplete
//!                    │             │
//!                    └─────────────┴──────────→ CycleFailed
//! ```
//!
//! - Connecting retries up to `max_attempts` with a constant backoff. Running out ends the cycle.
//! - Index trouble ends the cycle. No retry, no partial writes.
//! - Document write trouble gets logged and the cycle carries on. The config document is
//!   still written when the index-pattern write failed, pointing at `""`.
//!
//! ⚠️ Nothing escapes. Every failure is absorbed into the [`CycleOutcome`] and the logs.
//! The scheduler will simply try again next interval.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::app_config::RuntimeConfig;
use crate::backends::{EngineBackend, SearchEngine};
use crate::connector::{Connector, connect};
use crate::desired_state::DesiredState;
use crate::documents::{ConfigDocument, DocumentId, IndexPatternDocument};
use crate::errors::SidecarError;
use crate::index_manager::{IndexAction, ensure_index};
use crate::scheduler::{Clock, SystemClock};

/// 🔁 How stubborn to be about connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Same pause every time. Attempt one and attempt five wait equally long.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_runtime(runtime: &RuntimeConfig) -> Self {
        Self {
            max_attempts: runtime.connection_attempts(),
            backoff: runtime.retry_backoff(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_runtime(&RuntimeConfig::default())
    }
}

/// 🚦 Where a cycle is, or where it ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Disconnected,
    Connecting,
    IndexReady,
    WritingPattern,
    WritingConfig,
    CycleComplete,
    CycleFailed,
}

/// 📋 The full story of one cycle, absorbed errors included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    pub state: CycleState,
    pub connection_attempts: u32,
    pub index_action: Option<IndexAction>,
    /// Full `_id` of the index-pattern document, if it was written.
    pub index_pattern_id: Option<String>,
    /// Full `_id` of the config document, if it was written.
    pub config_id: Option<String>,
    pub errors: Vec<SidecarError>,
}

impl CycleOutcome {
    fn new() -> Self {
        Self {
            state: CycleState::Disconnected,
            connection_attempts: 0,
            index_action: None,
            index_pattern_id: None,
            config_id: None,
            errors: Vec::new(),
        }
    }

    fn transition(&mut self, next: CycleState) {
        debug!("🚦 {:?} → {:?}", self.state, next);
        self.state = next;
    }

    pub fn is_complete(&self) -> bool {
        self.state == CycleState::CycleComplete
    }

    /// 📝 Document-level failures the cycle logged and carried on past.
    /// Refused connection attempts that were followed by a successful one don't count.
    pub fn document_failures(&self) -> usize {
        self.errors
            .iter()
            .filter(|err| !err.is_fatal_to_cycle())
            .count()
    }
}

/// 🆔 Where index-pattern ids come from. Swappable so a test can make the dice fail.
pub type IdSource = fn() -> Result<DocumentId, SidecarError>;

/// 📦 Connector + desired state + retry policy + clock. Holds no per-cycle state:
/// the client handle is built fresh inside every cycle and dropped at the end of it.
#[derive(Debug)]
pub struct Reconciler<C, K = SystemClock> {
    connector: C,
    endpoint: String,
    desired: DesiredState,
    retry: RetryPolicy,
    clock: K,
    id_source: IdSource,
}

impl<C: Connector> Reconciler<C, SystemClock> {
    pub fn new(connector: C, endpoint: impl Into<String>, desired: DesiredState, retry: RetryPolicy) -> Self {
        Self {
            connector,
            endpoint: endpoint.into(),
            desired,
            retry,
            clock: SystemClock,
            id_source: DocumentId::index_pattern,
        }
    }
}

impl<C: Connector, K: Clock> Reconciler<C, K> {
    /// 🕰️ Swap the wall clock for something more predictable.
    pub fn with_clock<K2: Clock>(self, clock: K2) -> Reconciler<C, K2> {
        Reconciler {
            connector: self.connector,
            endpoint: self.endpoint,
            desired: self.desired,
            retry: self.retry,
            clock,
            id_source: self.id_source,
        }
    }

    pub fn with_id_source(mut self, id_source: IdSource) -> Self {
        self.id_source = id_source;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn desired(&self) -> &DesiredState {
        &self.desired
    }

    /// 🚀 One full cycle: connect (with retries), then [`Reconciler::reconcile`].
    pub async fn run_cycle(&self) -> CycleOutcome {
        let mut outcome = CycleOutcome::new();
        outcome.transition(CycleState::Connecting);

        match self.connect_with_retry(&mut outcome).await {
            Some(handle) => self.apply(&handle, outcome).await,
            None => {
                outcome.transition(CycleState::CycleFailed);
                outcome
            }
        }
    }

    /// 🎯 Everything after a successful connection, against a handle you already have.
    /// No retries and no sleeping, so it can be driven directly.
    pub async fn reconcile<E: SearchEngine + ?Sized>(&self, handle: &E) -> CycleOutcome {
        let mut outcome = CycleOutcome::new();
        outcome.transition(CycleState::Connecting);
        self.apply(handle, outcome).await
    }

    async fn connect_with_retry(&self, outcome: &mut CycleOutcome) -> Option<EngineBackend> {
        let attempts = self.retry.max_attempts.max(1);
        for attempt in 1..=attempts {
            outcome.connection_attempts = attempt;
            match connect(&self.connector, &self.endpoint).await {
                Ok(handle) => return Some(handle),
                Err(err) => {
                    warn!("🔌 Connection attempt {attempt}/{attempts} failed: {err}");
                    outcome.errors.push(err);
                    if attempt < attempts {
                        info!(
                            "💤 Couldn't connect to Elasticsearch. Waiting {}s...",
                            self.retry.backoff.as_secs_f64()
                        );
                        tokio::time::sleep(self.retry.backoff).await;
                    }
                }
            }
        }
        error!("💀 Could not connect to Elasticsearch after {attempts} attempts, skipping this cycle");
        None
    }

    async fn apply<E: SearchEngine + ?Sized>(&self, handle: &E, mut outcome: CycleOutcome) -> CycleOutcome {
        match ensure_index(handle, &self.desired.index_name, &self.desired.mapping).await {
            Ok(action) => {
                outcome.index_action = Some(action);
                outcome.transition(CycleState::IndexReady);
            }
            Err(err) => {
                outcome.errors.push(err);
                outcome.transition(CycleState::CycleFailed);
                return outcome;
            }
        }

        outcome.transition(CycleState::WritingPattern);
        // 🔗 only the uuid part goes into defaultIndex; empty when there's nothing to point at
        let default_index = match self.write_index_pattern(handle).await {
            Ok(id) => {
                let suffix = id.suffix().to_string();
                outcome.index_pattern_id = Some(id.to_string());
                suffix
            }
            Err(err) => {
                error!("💀 Could not create index-pattern document, the config will point nowhere: {err}");
                outcome.errors.push(err);
                String::new()
            }
        };

        outcome.transition(CycleState::WritingConfig);
        match self.write_config(handle, &default_index).await {
            Ok(id) => outcome.config_id = Some(id.to_string()),
            Err(err) => {
                error!("💀 Could not create config document: {err}");
                outcome.errors.push(err);
            }
        }

        outcome.transition(CycleState::CycleComplete);
        outcome
    }

    async fn write_index_pattern<E: SearchEngine + ?Sized>(
        &self,
        handle: &E,
    ) -> Result<DocumentId, SidecarError> {
        let id = (self.id_source)()?;
        let body = IndexPatternDocument::build(self.clock.now(), &self.desired).to_body()?;
        self.put(handle, &id, &body).await?;
        Ok(id)
    }

    async fn write_config<E: SearchEngine + ?Sized>(
        &self,
        handle: &E,
        default_index: &str,
    ) -> Result<DocumentId, SidecarError> {
        let id = DocumentId::config(&self.desired.config_version);
        let body = ConfigDocument::build(self.clock.now(), &self.desired, default_index).to_body()?;
        self.put(handle, &id, &body).await?;
        Ok(id)
    }

    async fn put<E: SearchEngine + ?Sized>(
        &self,
        handle: &E,
        id: &DocumentId,
        body: &str,
    ) -> Result<(), SidecarError> {
        let receipt = handle
            .put_document(
                &self.desired.index_name,
                &self.desired.document_type,
                &id.to_string(),
                body,
            )
            .await
            .map_err(|err| SidecarError::document_write(format!("{id}: {err}")))?;
        info!("📥 Added {} to index {}", receipt.id, receipt.index);
        Ok(())
    }
}
