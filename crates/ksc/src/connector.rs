//! 🔌 Connector — "Hello? Is this thing on?" — a developer, gesturing at a cluster.
//!
//! A [`Connector`] knows how to build a client handle for an endpoint. [`connect`] builds
//! one and pings it, and only hands it over if the ping comes back. Whatever goes wrong
//! on the way (bad URL, TLS tantrum, DNS, a 401) is flattened into a single
//! [`SidecarError::Connection`]. The reconciler doesn't care *why* nobody answered. It
//! just knows to wait and knock again.

use async_trait::async_trait;
use tracing::info;

use crate::backends::{
    ElasticsearchConfig, ElasticsearchEngine, EngineBackend, InMemoryEngine, SearchEngine,
};
use crate::errors::{EngineError, SidecarError};

/// 🏗️ Builds a fresh client handle. No liveness check here, that's [`connect`]'s job.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, endpoint: &str) -> Result<EngineBackend, EngineError>;
}

/// 📡 Hands out real HTTP handles to Elasticsearch.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    config: ElasticsearchConfig,
}

impl HttpConnector {
    pub fn new(config: ElasticsearchConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for HttpConnector {
    async fn open(&self, endpoint: &str) -> Result<EngineBackend, EngineError> {
        ElasticsearchEngine::new(&self.config, endpoint).map(EngineBackend::Elasticsearch)
    }
}

/// 🧪 Hands out clones of one shared [`InMemoryEngine`], whatever the endpoint says.
#[derive(Debug, Clone, Default)]
pub struct InMemoryConnector {
    engine: InMemoryEngine,
}

impl InMemoryConnector {
    pub fn new(engine: InMemoryEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &InMemoryEngine {
        &self.engine
    }
}

#[async_trait]
impl Connector for InMemoryConnector {
    async fn open(&self, _endpoint: &str) -> Result<EngineBackend, EngineError> {
        Ok(EngineBackend::InMemory(self.engine.clone()))
    }
}

/// 🚀 Build a handle for `endpoint` and prove it's alive with a ping.
pub async fn connect<C: Connector + ?Sized>(
    connector: &C,
    endpoint: &str,
) -> Result<EngineBackend, SidecarError> {
    info!("📡 Attempting to connect to Elasticsearch endpoint '{endpoint}'");
    let handle = connector
        .open(endpoint)
        .await
        .map_err(|err| SidecarError::connection(format!("{endpoint}: {err}")))?;

    let ping = handle
        .ping()
        .await
        .map_err(|err| SidecarError::connection(format!("{endpoint}: {err}")))?;

    info!(
        "✅ Elasticsearch ping status: {}, version: {}, cluster: {}",
        ping.status,
        ping.version.as_deref().unwrap_or("unknown"),
        ping.cluster_name.as_deref().unwrap_or("unknown"),
    );
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::EngineCall;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn the_one_where_a_live_cluster_gets_a_handle() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "version": { "number": "6.1.1" } })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let handle = connect(&HttpConnector::new(ElasticsearchConfig::default()), &server.uri())
            .await
            .expect("alive means connected");

        assert!(matches!(handle, EngineBackend::Elasticsearch(_)));
    }

    #[tokio::test]
    async fn the_one_where_a_bad_url_and_a_dead_ping_look_the_same_from_up_here() {
        let http = HttpConnector::new(ElasticsearchConfig::default());
        let bad_url = connect(&http, "::not a url::").await.expect_err("bad url");
        assert!(matches!(bad_url, SidecarError::Connection(_)));

        let mem = InMemoryConnector::new(InMemoryEngine::new().unreachable());
        let dead = connect(&mem, "http://elasticsearch:9200").await.expect_err("no pong");
        assert!(matches!(dead, SidecarError::Connection(_)));
        assert_eq!(mem.engine().calls(), vec![EngineCall::Ping]);
    }
}
