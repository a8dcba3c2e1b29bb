//! 🎯 The desired state — everything a cycle needs to know about what Kibana *should*
//! look like, frozen before the first cycle and never touched again.

use anyhow::Context;

use crate::app_config::KibanaConfig;
use crate::mapping::IndexMapping;

/// 📦 Target index, document constants, and the mapping blob, bundled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredState {
    pub index_name: String,
    pub document_type: String,
    pub index_pattern_title: String,
    pub time_field_name: String,
    pub build_num: u32,
    pub config_version: String,
    pub mapping: IndexMapping,
}

impl DesiredState {
    /// 🏗️ Resolve the mapping (file or built-in) and freeze the Kibana constants.
    pub fn from_config(kibana: &KibanaConfig) -> anyhow::Result<Self> {
        let mapping = IndexMapping::resolve(kibana.mapping_file.as_deref())
            .context("💀 Could not settle on an index mapping")?;
        Ok(Self::with_mapping(kibana, mapping))
    }

    pub fn with_mapping(kibana: &KibanaConfig, mapping: IndexMapping) -> Self {
        Self {
            index_name: kibana.index_name.clone(),
            document_type: kibana.document_type.clone(),
            index_pattern_title: kibana.index_pattern_title.clone(),
            time_field_name: kibana.time_field_name.clone(),
            build_num: kibana.build_num,
            config_version: kibana.config_version.clone(),
            mapping,
        }
    }
}

impl Default for DesiredState {
    fn default() -> Self {
        Self::with_mapping(&KibanaConfig::default(), IndexMapping::builtin())
    }
}
