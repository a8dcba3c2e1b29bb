//! 🗺️ The index mapping — a big static blob of JSON that Kibana expects its
//! `.kibana` index to be created with.
//!
//! We don't compute it. We don't diff it. We don't have opinions about it. It is shipped
//! in `assets/kibana_index_mapping.json`, compiled into the binary, and handed to
//! `create_index` verbatim every cycle. A JSON file on disk can replace it when Kibana
//! moves on without us.

use std::path::Path;

use anyhow::Context;

const BUILTIN_MAPPING: &str = include_str!("../assets/kibana_index_mapping.json");

/// 📄 Settings + mappings body for the target index, already validated as JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMapping {
    body: String,
}

impl IndexMapping {
    /// The mapping that ships with the binary.
    pub fn builtin() -> Self {
        Self {
            body: BUILTIN_MAPPING.to_string(),
        }
    }

    /// 📄 Read a replacement mapping from disk. It has to at least be a JSON object.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let body = std::fs::read_to_string(path).with_context(|| {
            format!(
                "💀 Could not read mapping file '{}'. It was supposed to be there. It is not.",
                path.display()
            )
        })?;
        Self::from_json(body)
            .with_context(|| format!("💀 Mapping file '{}' is not usable", path.display()))
    }

    pub fn from_json(body: String) -> anyhow::Result<Self> {
        let parsed: serde_json::Value =
            serde_json::from_str(&body).context("💀 The mapping is not valid JSON")?;
        anyhow::ensure!(
            parsed.is_object(),
            "💀 The mapping must be a JSON object with settings and mappings, not a {}",
            json_kind(&parsed)
        );
        Ok(Self { body })
    }

    /// 📦 Either the file named in config, or the built-in blob.
    pub fn resolve(mapping_file: Option<&Path>) -> anyhow::Result<Self> {
        match mapping_file {
            Some(path) => Self::from_file(path),
            None => Ok(Self::builtin()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.body
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn the_one_where_the_builtin_mapping_knows_about_every_saved_object_type() {
        let mapping: serde_json::Value =
            serde_json::from_str(IndexMapping::builtin().as_str()).expect("builtin is JSON");

        assert_eq!(mapping["settings"]["number_of_shards"], 1);
        assert_eq!(mapping["settings"]["number_of_replicas"], 0);

        let doc = &mapping["mappings"]["doc"];
        assert_eq!(doc["dynamic"], "strict");
        for saved_object in [
            "config",
            "dashboard",
            "index-pattern",
            "search",
            "server",
            "timelion-sheet",
            "type",
            "updated_at",
            "url",
            "visualization",
        ] {
            assert!(
                doc["properties"].get(saved_object).is_some(),
                "mapping lost track of '{saved_object}'"
            );
        }
        assert_eq!(doc["properties"]["config"]["properties"]["buildNum"]["type"], "keyword");
    }

    #[test]
    fn the_one_where_a_mapping_file_replaces_the_builtin() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"settings":{{"number_of_shards":3}}}}"#).expect("write");

        let mapping = IndexMapping::resolve(Some(file.path())).expect("valid file");

        assert_eq!(mapping.as_str(), r#"{"settings":{"number_of_shards":3}}"#);
        assert_eq!(IndexMapping::resolve(None).expect("builtin"), IndexMapping::builtin());
    }

    #[test]
    fn the_one_where_not_json_and_not_an_object_are_both_turned_away() {
        assert!(IndexMapping::from_json("{ nope".to_string()).is_err());

        let err = IndexMapping::from_json("[1, 2, 3]".to_string()).expect_err("arrays are out");
        assert!(format!("{err:#}").contains("array"));

        let missing = IndexMapping::from_file(Path::new("/definitely/not/here.json"));
        assert!(missing.is_err());
    }
}
