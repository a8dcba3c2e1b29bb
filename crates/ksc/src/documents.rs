//! 📝 Documents — the two saved objects we force Kibana to believe in.
//!
//! 🎬 *[two documents walk into an index. one gets a brand-new id every hour.
//! the other has been called `config:6.1.1` its whole life and is tired of being overwritten.]*
//!
//! - [`IndexPatternDocument`]: which log indices to look at and which field is the clock.
//!   Written under `index-pattern:<random uuid v4>`, so every cycle makes a new one.
//! - [`ConfigDocument`]: Kibana's advanced settings. Written under `config:<version>`,
//!   the same id every cycle, so it overwrites in place. Its `defaultIndex` points at
//!   the uuid of the index-pattern written just before it, or at `""` if that write failed.
//!
//! Everything in here is pure. The only thing that can go wrong is the random source. 🦆

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::desired_state::DesiredState;
use crate::errors::SidecarError;

pub const INDEX_PATTERN_TYPE: &str = "index-pattern";
pub const CONFIG_TYPE: &str = "config";

/// No field introspection happens. Kibana fills the list in itself on first use.
pub const EMPTY_FIELDS: &str = "[]";

/// 🕰️ `updated_at` format: UTC, millisecond precision, literal `Z`.
pub fn kibana_timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// 🎲 Shape sixteen random bytes into an RFC 4122 version-4 UUID.
///
/// `fill` supplies the randomness. The high nibble of byte 6 is forced to `0100`
/// and the top two bits of byte 8 to `10`, whatever the bytes were.
pub fn uuid_v4_from<E: fmt::Display>(
    fill: impl FnOnce(&mut [u8; 16]) -> Result<(), E>,
) -> Result<Uuid, SidecarError> {
    let mut bytes = [0u8; 16];
    fill(&mut bytes).map_err(|err| {
        SidecarError::identifier_generation(format!(
            "💀 the random source refused to hand over 16 bytes: {err}"
        ))
    })?;
    Ok(uuid::Builder::from_random_bytes(bytes).into_uuid())
}

/// 🎲 A UUID v4 from the operating system's CSPRNG. Nothing weaker is ever used.
pub fn random_uuid_v4() -> Result<Uuid, SidecarError> {
    uuid_v4_from(|bytes| getrandom::getrandom(bytes))
}

/// 🪪 `"<type>:<suffix>"`, the `_id` of a saved object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentId {
    doc_type: &'static str,
    suffix: String,
}

impl DocumentId {
    /// 🆕 A never-before-seen index-pattern id, straight from the OS random source.
    pub fn index_pattern() -> Result<Self, SidecarError> {
        Ok(Self::index_pattern_from(random_uuid_v4()?))
    }

    pub fn index_pattern_from(uuid: Uuid) -> Self {
        Self {
            doc_type: INDEX_PATTERN_TYPE,
            suffix: uuid.to_string(),
        }
    }

    /// 📌 The config id. Same input, same id, every cycle, forever.
    pub fn config(version: &str) -> Self {
        Self {
            doc_type: CONFIG_TYPE,
            suffix: version.to_string(),
        }
    }

    /// The part after the colon. For index-patterns, this is what `defaultIndex` refers to.
    pub fn suffix(&self) -> &str {
        &self.suffix
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.doc_type, self.suffix)
    }
}

/// 🔍 `{"type":"index-pattern","updated_at":..,"index-pattern":{..}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexPatternDocument {
    #[serde(rename = "type")]
    pub type_name: String,
    pub updated_at: String,
    #[serde(rename = "index-pattern")]
    pub index_pattern: IndexPattern,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexPattern {
    pub title: String,
    #[serde(rename = "timeFieldName")]
    pub time_field_name: String,
    /// Always [`EMPTY_FIELDS`]. Yes, it's a string containing JSON. Kibana's idea, not ours.
    pub fields: String,
}

impl IndexPatternDocument {
    pub fn build(now: DateTime<Utc>, desired: &DesiredState) -> Self {
        Self {
            type_name: INDEX_PATTERN_TYPE.to_string(),
            updated_at: kibana_timestamp(now),
            index_pattern: IndexPattern {
                title: desired.index_pattern_title.clone(),
                time_field_name: desired.time_field_name.clone(),
                fields: EMPTY_FIELDS.to_string(),
            },
        }
    }

    pub fn to_body(&self) -> Result<String, SidecarError> {
        to_body(self)
    }
}

/// ⚙️ `{"type":"config","updated_at":..,"config":{"buildNum":..,"defaultIndex":..}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(rename = "type")]
    pub type_name: String,
    pub updated_at: String,
    pub config: ConfigDefinition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDefinition {
    #[serde(rename = "buildNum")]
    pub build_num: u32,
    /// Suffix of an index-pattern id, or empty when there is none to point at.
    #[serde(rename = "defaultIndex")]
    pub default_index: String,
}

impl ConfigDocument {
    pub fn build(now: DateTime<Utc>, desired: &DesiredState, default_index: &str) -> Self {
        Self {
            type_name: CONFIG_TYPE.to_string(),
            updated_at: kibana_timestamp(now),
            config: ConfigDefinition {
                build_num: desired.build_num,
                default_index: default_index.to_string(),
            },
        }
    }

    pub fn to_body(&self) -> Result<String, SidecarError> {
        to_body(self)
    }
}

fn to_body<T: Serialize>(document: &T) -> Result<String, SidecarError> {
    serde_json::to_string(document).map_err(|err| {
        SidecarError::document_write(format!("💀 could not serialize document: {err}"))
    })
}
