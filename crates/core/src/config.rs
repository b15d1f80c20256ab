use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Read-only configuration surface for the anchor feature.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnchorConfig {
    /// Scheme prefixed onto bare-domain values submitted through the UI,
    /// e.g. `https://`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_protocol: Option<String>,
    /// Registers the built-in external-anchor rule
    /// (`target=_blank`, `rel=noopener noreferrer`).
    pub add_target_to_external_anchors: bool,
    /// Raw decorator definitions, keyed by decorator id. Entries that fail
    /// to parse are dropped during normalization.
    pub decorators: BTreeMap<String, serde_json::Value>,
}

impl AnchorConfig {
    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// A parsed decorator definition. Manual decorators become toggleable model
/// attributes; automatic decorators match the anchor value against a
/// pattern and contribute presentation attributes only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum DecoratorSpec {
    #[serde(rename_all = "camelCase")]
    Manual {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        #[serde(default)]
        attributes: BTreeMap<String, String>,
        #[serde(default)]
        default_value: bool,
    },
    #[serde(rename_all = "camelCase")]
    Automatic {
        pattern: String,
        #[serde(default)]
        attributes: BTreeMap<String, String>,
    },
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_camel_case_config() {
        let config = AnchorConfig::from_json_str(
            r#"{
                "defaultProtocol": "https://",
                "addTargetToExternalAnchors": true,
                "decorators": {
                    "isDownloadable": {
                        "mode": "manual",
                        "label": "Downloadable",
                        "attributes": { "download": "file" },
                        "defaultValue": true
                    }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.default_protocol.as_deref(), Some("https://"));
        assert!(config.add_target_to_external_anchors);

        let spec: DecoratorSpec =
            serde_json::from_value(config.decorators["isDownloadable"].clone()).unwrap();
        assert_eq!(
            spec,
            DecoratorSpec::Manual {
                label: Some("Downloadable".to_string()),
                attributes: BTreeMap::from([("download".to_string(), "file".to_string())]),
                default_value: true,
            }
        );
    }

    #[test]
    fn empty_config_is_valid() {
        let config = AnchorConfig::from_json_str("{}").unwrap();
        assert_eq!(config, AnchorConfig::default());
    }

    #[test]
    fn automatic_spec_requires_pattern() {
        let err = serde_json::from_value::<DecoratorSpec>(json!({
            "mode": "automatic",
            "attributes": { "class": "internal" }
        }));
        assert!(err.is_err());
    }
}
