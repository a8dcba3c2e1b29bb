//! 🏷️ Errors — the official taxonomy of sadness.
//!
//! 🎬 *[a sidecar stares at a 503. the 503 stares back.]*
//!
//! Two layers live here:
//! - [`EngineError`]: what the wire said. Transport hiccups, rude status codes,
//!   response bodies that refuse to parse. The search engine's feelings, raw.
//! - [`SidecarError`]: what the reconciler does about it. Four flavours, two of
//!   which end the cycle and two of which get logged and shrugged off.
//!
//! Nothing here ever escapes the reconciler. The process does not exit because
//! Elasticsearch had a bad hour. It logs, it sleeps, it tries again. 🦆

use thiserror::Error;

/// 📡 Failures from a single call to the search engine collaborator.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The request never got a response: DNS, TCP, TLS, timeout.
    #[error("transport error: {0}")]
    Transport(String),

    /// The engine answered, but not with a 2xx.
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// The engine answered with a body we could not make sense of.
    #[error("could not decode response: {0}")]
    Decode(String),

    /// The endpoint URL cannot carry the paths we need to append.
    #[error("invalid endpoint '{0}'")]
    InvalidEndpoint(String),

    /// A failure injected into the in-memory engine on purpose.
    #[error("scripted failure: {0}")]
    Scripted(String),
}

impl EngineError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn scripted(msg: impl Into<String>) -> Self {
        Self::Scripted(msg.into())
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        // 🔍 reqwest buries the useful bit (connection refused, dns error) in the source chain
        let mut msg = err.to_string();
        let mut cause = std::error::Error::source(&err);
        while let Some(inner) = cause {
            msg.push_str(": ");
            msg.push_str(&inner.to_string());
            cause = inner.source();
        }
        Self::Transport(msg)
    }
}

/// 💀 The reconciliation failure taxonomy.
///
/// `Connection` and `IndexState` end the cycle on the spot: nothing downstream can be
/// trusted without a reachable engine and a freshly built index. `DocumentWrite` and
/// `IdentifierGeneration` are logged and the cycle keeps going, because each document
/// write stands alone. There is no cross-document transaction. There never was.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SidecarError {
    /// Could not build a client or the liveness ping failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// Existence check, delete or create of the target index failed.
    #[error("index state error: {0}")]
    IndexState(String),

    /// Serializing or persisting a single document failed.
    #[error("document write error: {0}")]
    DocumentWrite(String),

    /// The random source let us down while minting a document id.
    #[error("identifier generation error: {0}")]
    IdentifierGeneration(String),
}

impl SidecarError {
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn index_state(msg: impl Into<String>) -> Self {
        Self::IndexState(msg.into())
    }

    pub fn document_write(msg: impl Into<String>) -> Self {
        Self::DocumentWrite(msg.into())
    }

    pub fn identifier_generation(msg: impl Into<String>) -> Self {
        Self::IdentifierGeneration(msg.into())
    }

    /// 🚦 Whether this failure abandons the rest of the cycle.
    pub fn is_fatal_to_cycle(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::IndexState(_))
    }
}
