//! # 📡 THE ELASTICSEARCH BACKEND
//!
//! 🎬 COLD OPEN — INT. SERVER ROOM — 3:47 AM
//!
//! Someone clicked around in Kibana. They changed the default index pattern. They
//! "just wanted to try something". The dashboards are now showing data from 2019.
//! Nobody knows why. Except us. We know. And in at most an hour, we'll fix it.
//!
//! 🚀 This module is the HTTP client the reconciler talks through. It speaks just enough
//! of the Elasticsearch REST API to ping, check, drop, create, and write:
//!
//! | operation      | request                         |
//! |----------------|---------------------------------|
//! | `ping`         | `GET /`                         |
//! | `index_exists` | `HEAD /{index}`                 |
//! | `create_index` | `PUT /{index}` + mapping body   |
//! | `delete_index` | `DELETE /{index}`               |
//! | `put_document` | `PUT /{index}/{type}/{id}`      |
//!
//! ⚠️ Every request carries a deadline (connect + overall). A cluster that never answers
//! does not get to hold the sidecar hostage forever.
//!
//! 🦆 (mandatory duck, no context provided, none shall be requested)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, Url};
use serde::Deserialize;
use tracing::{debug, trace};

use crate::backends::{PingInfo, PutReceipt, SearchEngine};
use crate::errors::EngineError;

/// 📡 How to reach Elasticsearch and how long to wait for it.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ElasticsearchConfig {
    /// 📡 Endpoint URL, e.g. `http://elasticsearch:9200`.
    pub url: String,
    /// 🔒 Username. The bouncer at the club. Except the club is a database.
    pub username: Option<String>,
    /// 🔒 Password. "password123" is not a password. It is a confession.
    pub password: Option<String>,
    /// 🔒 API key — the velvet rope variant of authentication. Wins over basic auth.
    pub api_key: Option<String>,
    /// ⏱️ TCP/TLS handshake deadline.
    pub connect_timeout_secs: u64,
    /// ⏱️ Whole-request deadline, per call.
    pub request_timeout_secs: u64,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: "http://elasticsearch:9200".to_string(),
            username: None,
            password: None,
            api_key: None,
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
        }
    }
}

/// 📡 A `reqwest`-backed [`SearchEngine`].
///
/// Internally holds:
/// - `client`: the HTTP muscle 💪, built once per handle with both deadlines baked in
/// - `base_url`: the parsed endpoint every path gets appended to
/// - `config`: auth material
#[derive(Debug)]
pub struct ElasticsearchEngine {
    client: reqwest::Client,
    base_url: Url,
    config: ElasticsearchConfig,
}

#[derive(Debug, Deserialize)]
struct RootInfo {
    cluster_name: Option<String>,
    version: Option<VersionInfo>,
}

#[derive(Debug, Deserialize)]
struct VersionInfo {
    number: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AckResponse {
    #[serde(default)]
    acknowledged: bool,
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_index")]
    index: String,
}

impl ElasticsearchEngine {
    /// 🚀 Build a client bound to `endpoint`. No network traffic happens here.
    ///
    /// `endpoint` wins over `config.url`: the connector decides where we point,
    /// the config only decides how we authenticate and how patient we are.
    pub fn new(config: &ElasticsearchConfig, endpoint: &str) -> Result<Self, EngineError> {
        let base_url = Url::parse(endpoint.trim())
            .map_err(|err| EngineError::InvalidEndpoint(format!("{endpoint}: {err}")))?;
        if base_url.cannot_be_a_base() {
            return Err(EngineError::InvalidEndpoint(endpoint.to_string()));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|err| {
                EngineError::transport(format!(
                    "💀 The HTTP client refused to be born. The TLS stack wept: {err}"
                ))
            })?;

        Ok(Self {
            client,
            base_url,
            config: config.clone(),
        })
    }

    /// 🧭 `base_url` + percent-encoded path segments.
    ///
    /// Trailing slash on the endpoint or not, `http://host:9200` and `http://host:9200/`
    /// both end up at `http://host:9200/{index}`. One slash of difference. Infinite
    /// suffering of difference. Not here.
    fn url_for(&self, segments: &[&str]) -> Result<Url, EngineError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| EngineError::InvalidEndpoint(self.base_url.to_string()))?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    /// 🔒 Auth priority: API key wins over basic auth. This is not a democracy.
    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(ref api_key) = self.config.api_key {
            request.header("Authorization", format!("ApiKey {api_key}"))
        } else if let Some(ref username) = self.config.username {
            request.basic_auth(username, self.config.password.as_ref())
        } else {
            request
        }
    }

    /// 💀 Non-2xx becomes [`EngineError::Status`] with whatever poetry the body contained.
    async fn success_body(response: Response) -> Result<String, EngineError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(EngineError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    async fn acknowledged(response: Response) -> Result<bool, EngineError> {
        let body = Self::success_body(response).await?;
        let ack: AckResponse = serde_json::from_str(&body)
            .map_err(|err| EngineError::decode(format!("{err} in '{body}'")))?;
        Ok(ack.acknowledged)
    }
}

#[async_trait]
impl SearchEngine for ElasticsearchEngine {
    async fn ping(&self) -> Result<PingInfo, EngineError> {
        let url = self.base_url.clone();
        trace!("🏓 GET {url}");
        let response = self.authorize(self.client.get(url)).send().await?;
        let status = response.status().as_u16();
        let body = Self::success_body(response).await?;

        // 📋 The root document is informational. If it doesn't parse, we still got a 2xx,
        // and a 2xx is all liveness ever promised us.
        let info = match serde_json::from_str::<RootInfo>(&body) {
            Ok(root) => PingInfo {
                status,
                version: root.version.and_then(|v| v.number),
                cluster_name: root.cluster_name,
            },
            Err(err) => {
                debug!("🤷 Ping answered {status} but the body was not the usual root document: {err}");
                PingInfo {
                    status,
                    ..PingInfo::default()
                }
            }
        };
        Ok(info)
    }

    async fn index_exists(&self, index: &str) -> Result<bool, EngineError> {
        let url = self.url_for(&[index])?;
        trace!("🔍 HEAD {url}");
        let response = self.authorize(self.client.head(url)).send().await?;
        match response.status().as_u16() {
            200 => Ok(true),
            404 => Ok(false),
            status => Err(EngineError::Status {
                status,
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn create_index(&self, index: &str, mapping: &str) -> Result<bool, EngineError> {
        let url = self.url_for(&[index])?;
        debug!("🏗️ PUT {url} ({} bytes of mapping)", mapping.len());
        let response = self
            .authorize(self.client.put(url))
            .header("Content-Type", "application/json")
            .body(mapping.to_string())
            .send()
            .await?;
        Self::acknowledged(response).await
    }

    async fn delete_index(&self, index: &str) -> Result<bool, EngineError> {
        let url = self.url_for(&[index])?;
        debug!("🗑️ DELETE {url}");
        let response = self.authorize(self.client.delete(url)).send().await?;
        Self::acknowledged(response).await
    }

    async fn put_document(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        body: &str,
    ) -> Result<PutReceipt, EngineError> {
        let url = self.url_for(&[index, doc_type, id])?;
        debug!("📥 PUT {url}");
        let response = self
            .authorize(self.client.put(url))
            .header("Content-Type", "application/json")
            .body(body.to_string())
            .send()
            .await?;
        let body = Self::success_body(response).await?;
        let put: PutResponse = serde_json::from_str(&body)
            .map_err(|err| EngineError::decode(format!("{err} in '{body}'")))?;
        Ok(PutReceipt {
            id: put.id,
            index: put.index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn engine_for(server: &MockServer) -> ElasticsearchEngine {
        ElasticsearchEngine::new(&ElasticsearchConfig::default(), &server.uri())
            .expect("💀 a mock server uri should always parse")
    }

    #[tokio::test]
    async fn the_one_where_ping_reads_the_version_off_the_root_document() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "cluster_name": "logging",
                "version": { "number": "6.1.1" },
                "tagline": "You Know, for Search"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let info = engine_for(&server).ping().await.expect("ping should land");

        assert_eq!(info.status, 200);
        assert_eq!(info.version.as_deref(), Some("6.1.1"));
        assert_eq!(info.cluster_name.as_deref(), Some("logging"));
    }

    #[tokio::test]
    async fn the_one_where_a_grumpy_root_endpoint_fails_the_ping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(401).set_body_string("security_exception"))
            .mount(&server)
            .await;

        let err = engine_for(&server).ping().await.expect_err("401 is not alive enough");

        match err {
            EngineError::Status { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "security_exception");
            }
            other => panic!("💀 expected a status error, serde took us to {other:?}"),
        }
    }

    #[tokio::test]
    async fn the_one_where_nobody_is_home_at_all() {
        // 🧪 port 1 is reserved for tcpmux, which nobody has run since the nineties
        let engine = ElasticsearchEngine::new(&ElasticsearchConfig::default(), "http://127.0.0.1:1")
            .expect("the url is fine, the server is the problem");

        let err = engine.ping().await.expect_err("nothing listens on port 1");

        assert!(matches!(err, EngineError::Transport(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn the_one_where_a_cluster_that_takes_forever_gets_cut_off() {
        // 🐌 three seconds of silence against a one second deadline
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "version": { "number": "6.1.1" } }))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let config = ElasticsearchConfig {
            request_timeout_secs: 1,
            ..ElasticsearchConfig::default()
        };
        let engine = ElasticsearchEngine::new(&config, &server.uri()).expect("valid uri");
        let started = std::time::Instant::now();

        let err = engine.ping().await.expect_err("the deadline should fire first");

        assert!(matches!(err, EngineError::Transport(_)), "got {err:?}");
        assert!(
            started.elapsed() < Duration::from_secs(3),
            "we gave up before the response ever showed up"
        );
    }

    #[tokio::test]
    async fn the_one_where_head_tells_us_if_the_index_is_home() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/.kibana"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/.nope"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/.broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let engine = engine_for(&server);

        assert!(engine.index_exists(".kibana").await.expect("200 means yes"));
        assert!(!engine.index_exists(".nope").await.expect("404 means no"));
        assert!(
            engine.index_exists(".broken").await.is_err(),
            "500 means neither, and we refuse to guess"
        );
    }

    #[tokio::test]
    async fn the_one_where_create_and_delete_report_their_acknowledgement() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/.kibana"))
            .and(header("Content-Type", "application/json"))
            .and(body_string(r#"{"settings":{}}"#))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "acknowledged": true,
                "shards_acknowledged": true,
                "index": ".kibana"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/.kibana"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "acknowledged": false })))
            .expect(1)
            .mount(&server)
            .await;

        let engine = engine_for(&server);

        assert!(engine.create_index(".kibana", r#"{"settings":{}}"#).await.expect("create"));
        assert!(!engine.delete_index(".kibana").await.expect("delete"));
    }

    #[tokio::test]
    async fn the_one_where_create_index_bounces_off_an_existing_index() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/.kibana"))
            .respond_with(
                ResponseTemplate::new(400).set_body_string("resource_already_exists_exception"),
            )
            .mount(&server)
            .await;

        let err = engine_for(&server)
            .create_index(".kibana", "{}")
            .await
            .expect_err("400 is a failure, not an opinion");

        assert!(matches!(err, EngineError::Status { status: 400, .. }));
    }

    #[tokio::test]
    async fn the_one_where_a_document_lands_under_index_type_and_id() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/.kibana/doc/config:6.1.1"))
            .and(body_string(r#"{"type":"config"}"#))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "_index": ".kibana",
                "_type": "doc",
                "_id": "config:6.1.1",
                "result": "created"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let receipt = engine_for(&server)
            .put_document(".kibana", "doc", "config:6.1.1", r#"{"type":"config"}"#)
            .await
            .expect("put should land");

        assert_eq!(
            receipt,
            PutReceipt {
                id: "config:6.1.1".to_string(),
                index: ".kibana".to_string()
            }
        );
    }

    #[tokio::test]
    async fn the_one_where_the_api_key_outranks_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/.kibana"))
            .and(header("Authorization", "ApiKey c2VjcmV0"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let config = ElasticsearchConfig {
            username: Some("elastic".to_string()),
            password: Some("changeme".to_string()),
            api_key: Some("c2VjcmV0".to_string()),
            ..ElasticsearchConfig::default()
        };
        let engine = ElasticsearchEngine::new(&config, &server.uri()).expect("valid uri");

        assert!(engine.index_exists(".kibana").await.expect("authorized head"));
    }

    #[test]
    fn the_one_where_paths_are_glued_on_with_exactly_one_slash() {
        let config = ElasticsearchConfig::default();
        let with_slash = ElasticsearchEngine::new(&config, "http://es:9200/").expect("valid");
        let without = ElasticsearchEngine::new(&config, "http://es:9200").expect("valid");
        let prefixed = ElasticsearchEngine::new(&config, "http://proxy/es/").expect("valid");

        let expected = "http://es:9200/.kibana/doc/config:6.1.1";
        let segments = [".kibana", "doc", "config:6.1.1"];
        assert_eq!(with_slash.url_for(&segments).expect("url").as_str(), expected);
        assert_eq!(without.url_for(&segments).expect("url").as_str(), expected);
        assert_eq!(
            prefixed.url_for(&[".kibana"]).expect("url").as_str(),
            "http://proxy/es/.kibana"
        );
    }

    #[test]
    fn the_one_where_garbage_endpoints_are_rejected_up_front() {
        let config = ElasticsearchConfig::default();
        assert!(matches!(
            ElasticsearchEngine::new(&config, "not a url"),
            Err(EngineError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            ElasticsearchEngine::new(&config, "mailto:ops@example.com"),
            Err(EngineError::InvalidEndpoint(_))
        ));
    }
}
