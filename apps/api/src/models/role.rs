use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Resolution status of one requested role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleStatus {
    /// Nothing in the KB resembles the phrase.
    #[default]
    Unknown,
    /// One or more candidates await an operator decision.
    Suggest,
    /// Finalized; downstream JD/plan composition may consume it.
    Match,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceSource {
    #[default]
    Auto,
    Manual,
}

/// A ranked KB record proposed as the resolution of a phrase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub role_id: String,
    pub title: String,
    /// 0.0 to 1.0
    pub score: f64,
    pub is_custom: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_status_serde_is_snake_case() {
        assert_eq!(serde_json::to_string(&RoleStatus::Suggest).unwrap(), r#""suggest""#);
        let status: RoleStatus = serde_json::from_str(r#""match""#).unwrap();
        assert_eq!(status, RoleStatus::Match);
    }

    #[test]
    fn test_confidence_source_default_is_auto() {
        assert_eq!(ConfidenceSource::default(), ConfidenceSource::Auto);
        assert_eq!(
            serde_json::to_string(&ConfidenceSource::Manual).unwrap(),
            r#""manual""#
        );
    }
}
