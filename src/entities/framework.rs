// 🗂️ Framework Entity - the container every level and competency hangs from

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type FrameworkId = i64;
pub type ScaleId = i64;

// ============================================================================
// SCALE (consumed as an opaque lookup)
// ============================================================================

/// Rating scale; only the ordered values matter here
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scale {
    pub id: ScaleId,
    pub name: String,
    pub values: Vec<String>,
}

impl Scale {
    /// Parse the comma separated storage form ("Not yet,Basic,Competent")
    pub fn parse_values(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect()
    }
}

/// Serialized into the framework record as JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleConfiguration {
    #[serde(rename = "scaleid")]
    pub scale_id: ScaleId,
    #[serde(rename = "minproficiencyid")]
    pub min_proficiency_id: usize,
    #[serde(rename = "defaultid")]
    pub default_id: usize,
}

impl ScaleConfiguration {
    /// Default is the third value (or the last, for shorter scales);
    /// proficiency starts at the default
    pub fn for_scale(scale: &Scale) -> Self {
        let default_id = scale.values.len().min(3);
        ScaleConfiguration {
            scale_id: scale.id,
            min_proficiency_id: default_id,
            default_id,
        }
    }
}

// ============================================================================
// FRAMEWORK
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameworkDraft {
    pub short_name: String,
    pub external_id: String,
    pub description: String,
    pub scale_configuration: ScaleConfiguration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Framework {
    pub id: FrameworkId,
    pub short_name: String,

    /// Globally unique, fixed at creation
    pub external_id: String,

    pub description: String,
    pub scale_configuration: ScaleConfiguration,
    pub visible: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub modified_by: i64,
}

impl Framework {
    pub fn scale_id(&self) -> ScaleId {
        self.scale_configuration.scale_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scale(values: &[&str]) -> Scale {
        Scale {
            id: 4,
            name: "Test".to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    #[test]
    fn test_parse_scale_values() {
        let values = Scale::parse_values("Not yet competent, Competent ,,Expert");
        assert_eq!(values, vec!["Not yet competent", "Competent", "Expert"]);
    }

    #[test]
    fn test_scale_configuration_defaults_to_third_value() {
        let config = ScaleConfiguration::for_scale(&scale(&["a", "b", "c", "d", "e"]));
        assert_eq!(config.default_id, 3);
        assert_eq!(config.min_proficiency_id, 3);
        assert_eq!(config.scale_id, 4);
    }

    #[test]
    fn test_scale_configuration_short_scale_uses_last_value() {
        let config = ScaleConfiguration::for_scale(&scale(&["no", "yes"]));
        assert_eq!(config.default_id, 2);
    }

    #[test]
    fn test_scale_configuration_json_keys() {
        let config = ScaleConfiguration::for_scale(&scale(&["a", "b", "c"]));
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["scaleid"], 4);
        assert_eq!(json["minproficiencyid"], 3);
        assert_eq!(json["defaultid"], 3);
    }
}
