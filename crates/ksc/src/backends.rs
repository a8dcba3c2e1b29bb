//! 🔌 Backends — where the real I/O happens.
//!
//! 🎭 This module is the casting agency for search engines. Need to talk to a real
//! Elasticsearch over HTTP? We've got a backend for that. Need a pretend cluster that
//! remembers every call so a test can read it back like a court transcript? Also got one.
//!
//! The reconciler only ever sees [`SearchEngine`], five operations, no more:
//! `ping`, `index_exists`, `create_index`, `delete_index`, `put_document`.
//! What happens behind them is a backend's private business.
//!
//! 🦆 The duck is here because every file must have one. This is law.

use async_trait::async_trait;

use crate::errors::EngineError;

pub mod elasticsearch;
pub mod in_mem;

// 🎯 Re-exports so callers write `backends::ElasticsearchConfig` instead of spelunking.
pub use elasticsearch::{ElasticsearchConfig, ElasticsearchEngine};
pub use in_mem::{EngineCall, EngineOp, InMemoryEngine};

/// 🏓 What came back from a liveness probe. Logged, never interpreted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PingInfo {
    /// HTTP status of the probe.
    pub status: u16,
    /// `version.number`, when the engine bothered to tell us.
    pub version: Option<String>,
    pub cluster_name: Option<String>,
}

/// 🧾 Proof of delivery for a single document write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutReceipt {
    pub id: String,
    pub index: String,
}

/// 🔍 The search-engine collaborator, as an opaque RPC surface.
///
/// # Contract
/// - Every method is one round trip. No retries in here. Retries are the reconciler's problem.
/// - `create_index` / `delete_index` return the engine's `acknowledged` flag. `false` is
///   not an error. It's a shrug from the cluster, and the caller decides how to feel about it.
/// - `Err(...)` means transport or protocol trouble: no answer, a non-2xx, a garbled body.
#[async_trait]
pub trait SearchEngine: std::fmt::Debug + Send + Sync {
    /// 🏓 Round-trip liveness probe.
    async fn ping(&self) -> Result<PingInfo, EngineError>;
    async fn index_exists(&self, index: &str) -> Result<bool, EngineError>;
    /// 🏗️ Create `index` with the given settings+mappings JSON body.
    async fn create_index(&self, index: &str, mapping: &str) -> Result<bool, EngineError>;
    async fn delete_index(&self, index: &str) -> Result<bool, EngineError>;
    /// 📥 Store `body` under `id` (create or overwrite).
    async fn put_document(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        body: &str,
    ) -> Result<PutReceipt, EngineError>;
}

/// 🎭 The many faces of a search engine — a polymorphic casting call.
///
/// This is the client handle the connector hands out each cycle. The enum dispatches
/// to the concrete engine so the reconciler stays blissfully ignorant of whether it is
/// talking to a cluster of overworked nodes or a `Vec` in RAM.
#[derive(Debug)]
pub enum EngineBackend {
    Elasticsearch(ElasticsearchEngine),
    InMemory(InMemoryEngine),
}

#[async_trait]
impl SearchEngine for EngineBackend {
    async fn ping(&self) -> Result<PingInfo, EngineError> {
        match self {
            EngineBackend::Elasticsearch(es) => es.ping().await,
            EngineBackend::InMemory(mem) => mem.ping().await,
        }
    }

    async fn index_exists(&self, index: &str) -> Result<bool, EngineError> {
        match self {
            EngineBackend::Elasticsearch(es) => es.index_exists(index).await,
            EngineBackend::InMemory(mem) => mem.index_exists(index).await,
        }
    }

    async fn create_index(&self, index: &str, mapping: &str) -> Result<bool, EngineError> {
        match self {
            EngineBackend::Elasticsearch(es) => es.create_index(index, mapping).await,
            EngineBackend::InMemory(mem) => mem.create_index(index, mapping).await,
        }
    }

    async fn delete_index(&self, index: &str) -> Result<bool, EngineError> {
        match self {
            EngineBackend::Elasticsearch(es) => es.delete_index(index).await,
            EngineBackend::InMemory(mem) => mem.delete_index(index).await,
        }
    }

    async fn put_document(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        body: &str,
    ) -> Result<PutReceipt, EngineError> {
        match self {
            EngineBackend::Elasticsearch(es) => es.put_document(index, doc_type, id, body).await,
            EngineBackend::InMemory(mem) => mem.put_document(index, doc_type, id, body).await,
        }
    }
}
