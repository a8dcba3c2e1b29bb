//! 🔧 App Configuration — the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." — every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment. Layers, from "meh" to "final answer":
//! 1. serde defaults baked into the structs below
//! 2. an optional TOML file
//! 3. `KSC_*` environment variables (nested with `__`, e.g. `KSC_RUNTIME__CYCLE_INTERVAL_SECS`)
//! 4. the `--elasticsearch-endpoint` flag, which outranks everyone
//!
//! Everything is read once, before the scheduler starts. Nothing mutates it afterwards.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, ensure};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::backends::ElasticsearchConfig;

/// 📦 The AppConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    /// 📡 Where Elasticsearch lives and how we knock on its door.
    pub elasticsearch: ElasticsearchConfig,
    /// 📊 What Kibana should look like when we're done with it.
    pub kibana: KibanaConfig,
    /// ⏱️ How hard and how often we try.
    pub runtime: RuntimeConfig,
}

/// 📊 The desired Kibana state, minus the mapping blob itself.
///
/// These are non-negotiable inputs. Nobody computes a build number here. We were
/// handed `16350` and `6.1.1` on a stone tablet and we write them down faithfully.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct KibanaConfig {
    /// 🗂️ The index Kibana keeps its saved objects in.
    pub index_name: String,
    /// 🔍 Title of the index-pattern document, i.e. which log indices it matches.
    pub index_pattern_title: String,
    /// ⏰ The field in log documents that carries the timestamp.
    pub time_field_name: String,
    /// 📦 Mapping type the documents are written under.
    pub document_type: String,
    /// 🔢 `config.buildNum` in the config document.
    pub build_num: u32,
    /// 🪪 Fixed suffix of the config document id. Same every cycle, so it overwrites.
    pub config_version: String,
    /// 📄 Optional JSON file replacing the built-in index mapping.
    pub mapping_file: Option<PathBuf>,
}

impl Default for KibanaConfig {
    fn default() -> Self {
        Self {
            index_name: ".kibana".to_string(),
            index_pattern_title: "filebeat-*".to_string(),
            time_field_name: "@timestamp".to_string(),
            document_type: "doc".to_string(),
            build_num: 16350,
            config_version: "6.1.1".to_string(),
            mapping_file: None,
        }
    }
}

/// ⏱️ Retry and scheduling knobs.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// 🔁 Connection attempts per cycle before giving up on that cycle.
    pub max_connection_retries: u32,
    /// 💤 Constant pause between connection attempts. Not exponential. Not creative.
    pub retry_backoff_secs: u64,
    /// 🕰️ Pause between the end of one cycle and the start of the next.
    pub cycle_interval_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_connection_retries: 5,
            retry_backoff_secs: 10,
            cycle_interval_secs: 60 * 60,
        }
    }
}

impl RuntimeConfig {
    /// At least one attempt, always. Zero retries would mean a cycle that never even tries.
    pub fn connection_attempts(&self) -> u32 {
        self.max_connection_retries.max(1)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }
}

impl AppConfig {
    /// 🚦 Reject configs that would make every single cycle fail in the same boring way.
    pub fn validate(self) -> anyhow::Result<Self> {
        ensure!(
            !self.elasticsearch.url.trim().is_empty(),
            "💀 elasticsearch.url is empty. We cannot reconcile with the void."
        );
        ensure!(
            !self.kibana.index_name.trim().is_empty(),
            "💀 kibana.index_name is empty. Elasticsearch will not let us create an index called nothing."
        );
        ensure!(
            !self.kibana.config_version.trim().is_empty(),
            "💀 kibana.config_version is empty. The config document needs a stable id suffix."
        );
        ensure!(
            !self.kibana.document_type.trim().is_empty(),
            "💀 kibana.document_type is empty. Documents need a type to live under."
        );
        ensure!(
            self.runtime.cycle_interval_secs > 0,
            "💀 runtime.cycle_interval_secs is 0. That's not a sidecar, that's a denial of service."
        );
        if self.runtime.max_connection_retries == 0 {
            warn!("⚠️ runtime.max_connection_retries is 0, treating it as a single attempt per cycle");
        }
        Ok(self)
    }
}

/// 🚀 Load the config — from defaults, a file, env vars, and the CLI, in that order.
///
/// 📐 DESIGN NOTE:
///   - `config_file_name` None → defaults + env vars. No file. No assumptions.
///   - `config_file_name` Some → defaults + TOML + env vars, env wins on conflicts.
///   - `endpoint_override` Some → replaces `elasticsearch.url` no matter who set it.
///
/// 💀 Returns an error if the config is unparseable or fails validation.
pub fn load_config(
    config_file_name: Option<&Path>,
    endpoint_override: Option<&str>,
) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new();
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };
    let config = config.merge(Env::prefixed("KSC_").split("__"));
    let config = match endpoint_override {
        Some(url) => config.merge(Serialized::default("elasticsearch.url", url)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (KSC_*). \
             The file exists in our hearts, but apparently not in valid TOML.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (KSC_*). \
                 No file was provided, this one's all on the environment. Classic."
            .to_string(),
    };

    let app_config: AppConfig = config.extract().context(context_msg)?;
    app_config.validate()
}
