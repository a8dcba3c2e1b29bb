//! # Previously, on the sidecar...
//!
//! 🎬 The cluster was down. Again. The integration tests needed one. Again. Someone
//! had to pretend to be Elasticsearch, convincingly enough to fool a reconciler, and
//! honestly enough to testify afterwards about every single request it received.
//!
//! That someone was this module.
//!
//! [`InMemoryEngine`] is a [`SearchEngine`] that lives in RAM. It keeps indices and
//! documents in a couple of maps behind an `Arc<Mutex<...>>`, so a test can hand a clone
//! to the reconciler and still read the call log afterwards. It can also be told to
//! misbehave: refuse pings, fail specific operations, or shrug with `acknowledged: false`.
//!
//! ⚠️ This is NOT for production. If you're deploying this to prod, please also
//! deploy a therapist.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::backends::{PingInfo, PutReceipt, SearchEngine};
use crate::errors::EngineError;

/// 📜 One entry in the court transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Ping,
    IndexExists {
        index: String,
    },
    DeleteIndex {
        index: String,
    },
    CreateIndex {
        index: String,
        mapping: String,
    },
    PutDocument {
        index: String,
        doc_type: String,
        id: String,
        body: String,
    },
}

/// 🎯 Index-level operations that can be scripted to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineOp {
    IndexExists,
    DeleteIndex,
    CreateIndex,
}

#[derive(Debug, Default)]
struct InMemoryState {
    calls: Vec<EngineCall>,
    indices: BTreeSet<String>,
    // index -> (id -> body)
    documents: BTreeMap<String, BTreeMap<String, String>>,
    // u32::MAX means "forever"
    refused_pings: u32,
    failing_ops: HashSet<EngineOp>,
    failing_id_prefixes: Vec<String>,
    unacknowledged: bool,
}

/// 📦 A search engine that never forgets. Clone it freely: every clone shares one state.
#[derive(Debug, Default, Clone)]
pub struct InMemoryEngine {
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, InMemoryState> {
        // 🔒 a panicking test elsewhere should not take the transcript down with it
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 🗂️ Start with `index` already present.
    pub fn with_index(self, index: &str) -> Self {
        self.lock().indices.insert(index.to_string());
        self
    }

    /// 🙅 Refuse the next `count` pings.
    pub fn refusing_pings(self, count: u32) -> Self {
        self.lock().refused_pings = count;
        self
    }

    /// 🏝️ Refuse every ping, forever.
    pub fn unreachable(self) -> Self {
        self.refusing_pings(u32::MAX)
    }

    pub fn failing(self, op: EngineOp) -> Self {
        self.lock().failing_ops.insert(op);
        self
    }

    /// 💥 Fail every document write whose id starts with `prefix`.
    pub fn failing_puts_for(self, prefix: &str) -> Self {
        self.lock().failing_id_prefixes.push(prefix.to_string());
        self
    }

    /// 🤷 Create and delete still happen, but report `acknowledged: false`.
    pub fn unacknowledged(self) -> Self {
        self.lock().unacknowledged = true;
        self
    }

    /// 📜 Every call received so far, in order.
    pub fn calls(&self) -> Vec<EngineCall> {
        self.lock().calls.clone()
    }

    pub fn has_index(&self, index: &str) -> bool {
        self.lock().indices.contains(index)
    }

    pub fn document(&self, index: &str, id: &str) -> Option<String> {
        self.lock()
            .documents
            .get(index)
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    /// 🆔 Ids stored in `index`, sorted.
    pub fn document_ids(&self, index: &str) -> Vec<String> {
        self.lock()
            .documents
            .get(index)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn check(state: &InMemoryState, op: EngineOp) -> Result<(), EngineError> {
        if state.failing_ops.contains(&op) {
            return Err(EngineError::scripted(format!("{op:?} was told to fail")));
        }
        Ok(())
    }
}

#[async_trait]
impl SearchEngine for InMemoryEngine {
    async fn ping(&self) -> Result<PingInfo, EngineError> {
        let mut state = self.lock();
        state.calls.push(EngineCall::Ping);
        if state.refused_pings > 0 {
            if state.refused_pings != u32::MAX {
                state.refused_pings -= 1;
            }
            return Err(EngineError::scripted("connection refused"));
        }
        Ok(PingInfo {
            status: 200,
            version: Some("in-memory".to_string()),
            cluster_name: Some("in-memory".to_string()),
        })
    }

    async fn index_exists(&self, index: &str) -> Result<bool, EngineError> {
        let mut state = self.lock();
        state.calls.push(EngineCall::IndexExists {
            index: index.to_string(),
        });
        Self::check(&state, EngineOp::IndexExists)?;
        Ok(state.indices.contains(index))
    }

    async fn create_index(&self, index: &str, mapping: &str) -> Result<bool, EngineError> {
        let mut state = self.lock();
        state.calls.push(EngineCall::CreateIndex {
            index: index.to_string(),
            mapping: mapping.to_string(),
        });
        Self::check(&state, EngineOp::CreateIndex)?;
        if !state.indices.insert(index.to_string()) {
            return Err(EngineError::Status {
                status: 400,
                body: format!("resource_already_exists_exception: {index}"),
            });
        }
        Ok(!state.unacknowledged)
    }

    async fn delete_index(&self, index: &str) -> Result<bool, EngineError> {
        let mut state = self.lock();
        state.calls.push(EngineCall::DeleteIndex {
            index: index.to_string(),
        });
        Self::check(&state, EngineOp::DeleteIndex)?;
        if !state.indices.remove(index) {
            return Err(EngineError::Status {
                status: 404,
                body: format!("index_not_found_exception: {index}"),
            });
        }
        state.documents.remove(index);
        Ok(!state.unacknowledged)
    }

    async fn put_document(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        body: &str,
    ) -> Result<PutReceipt, EngineError> {
        let mut state = self.lock();
        state.calls.push(EngineCall::PutDocument {
            index: index.to_string(),
            doc_type: doc_type.to_string(),
            id: id.to_string(),
            body: body.to_string(),
        });
        if state
            .failing_id_prefixes
            .iter()
            .any(|prefix| id.starts_with(prefix.as_str()))
        {
            return Err(EngineError::scripted(format!("put of '{id}' was told to fail")));
        }
        // 🏗️ like Elasticsearch, writing into a missing index quietly creates it
        state.indices.insert(index.to_string());
        state
            .documents
            .entry(index.to_string())
            .or_default()
            .insert(id.to_string(), body.to_string());
        Ok(PutReceipt {
            id: id.to_string(),
            index: index.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn the_one_where_the_engine_keeps_a_transcript_of_everything() {
        let engine = InMemoryEngine::new();
        let witness = engine.clone();

        engine.ping().await.expect("pings are free in RAM");
        assert!(!engine.index_exists(".kibana").await.expect("exists"));
        assert!(engine.create_index(".kibana", "{}").await.expect("create"));
        engine
            .put_document(".kibana", "doc", "config:6.1.1", "{}")
            .await
            .expect("put");

        assert_eq!(witness.calls().len(), 4, "the clone saw everything");
        assert!(witness.has_index(".kibana"));
        assert_eq!(witness.document_ids(".kibana"), vec!["config:6.1.1".to_string()]);
    }

    #[tokio::test]
    async fn the_one_where_pings_are_refused_exactly_as_often_as_asked() {
        let engine = InMemoryEngine::new().refusing_pings(2);

        assert!(engine.ping().await.is_err());
        assert!(engine.ping().await.is_err());
        assert!(engine.ping().await.is_ok(), "third time's the charm");
    }

    #[tokio::test]
    async fn the_one_where_deleting_an_index_takes_its_documents_with_it() {
        let engine = InMemoryEngine::new();
        engine
            .put_document(".kibana", "doc", "index-pattern:abc", "{}")
            .await
            .expect("put");

        assert!(engine.delete_index(".kibana").await.expect("delete"));
        assert!(!engine.has_index(".kibana"));
        assert!(engine.document(".kibana", "index-pattern:abc").is_none());
        assert!(
            engine.delete_index(".kibana").await.is_err(),
            "you cannot delete what is already gone"
        );
    }

    #[tokio::test]
    async fn the_one_where_scripted_failures_fail_and_shrugs_shrug() {
        let engine = InMemoryEngine::new()
            .with_index(".kibana")
            .failing(EngineOp::IndexExists)
            .failing_puts_for("index-pattern:")
            .unacknowledged();

        assert!(engine.index_exists(".kibana").await.is_err());
        assert!(!engine.delete_index(".kibana").await.expect("delete still happens"));
        assert!(!engine.create_index(".kibana", "{}").await.expect("create still happens"));
        assert!(
            engine
                .put_document(".kibana", "doc", "index-pattern:x", "{}")
                .await
                .is_err()
        );
        assert!(
            engine
                .put_document(".kibana", "doc", "config:6.1.1", "{}")
                .await
                .is_ok()
        );
    }
}
