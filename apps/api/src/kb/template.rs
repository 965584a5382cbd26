//! Role template bodies as consumed by downstream JD/plan composition.
//!
//! Curated templates may still carry the legacy flat `must_haves`/`nice_to_haves` keys;
//! custom and newer curated ones use nested `skills.{must,nice}`. Both are accepted and
//! `skills.*` wins when it is non-empty.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::kb::store::{KbError, KbRecord};

const DEFAULT_SENIORITY: &str = "Mid";
const DEFAULT_BENEFITS: &[&str] = &["Equity", "Flexible work", "Growth opportunities"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Skills {
    #[serde(default)]
    pub must: Vec<String>,
    #[serde(default)]
    pub nice: Vec<String>,
}

/// Canonical template shape handed to downstream collaborators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoleTemplate {
    pub title: Option<String>,
    pub mission: Option<String>,
    pub skills: Skills,
    pub responsibilities: Vec<String>,
    pub function: Option<String>,
    pub seniority: Option<String>,
    pub benefits: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawTemplate {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    mission: Option<String>,
    #[serde(default)]
    skills: Option<Skills>,
    #[serde(default, alias = "mustHaves")]
    must_haves: Vec<String>,
    #[serde(default, alias = "niceToHaves")]
    nice_to_haves: Vec<String>,
    #[serde(default)]
    responsibilities: Vec<String>,
    #[serde(default)]
    function: Option<String>,
    #[serde(default)]
    seniority: Option<String>,
    #[serde(default)]
    benefits: Option<Vec<String>>,
}

impl From<RawTemplate> for RoleTemplate {
    fn from(raw: RawTemplate) -> Self {
        let nested = raw.skills.unwrap_or_default();
        let must = if nested.must.is_empty() {
            raw.must_haves
        } else {
            nested.must
        };
        let nice = if nested.nice.is_empty() {
            raw.nice_to_haves
        } else {
            nested.nice
        };
        RoleTemplate {
            title: raw.title,
            mission: raw.mission,
            skills: Skills { must, nice },
            responsibilities: raw.responsibilities,
            function: raw.function,
            seniority: raw.seniority,
            benefits: raw.benefits.unwrap_or_else(default_benefits),
        }
    }
}

fn default_benefits() -> Vec<String> {
    DEFAULT_BENEFITS.iter().map(|b| b.to_string()).collect()
}

impl RoleTemplate {
    /// Placeholder used when no template body can be found, so editors still have every key.
    pub fn fallback(title: Option<&str>, function: Option<&str>, seniority: Option<&str>) -> Self {
        RoleTemplate {
            title: title.map(str::to_string),
            mission: None,
            skills: Skills::default(),
            responsibilities: Vec::new(),
            function: function.map(str::to_string),
            seniority: Some(seniority.unwrap_or(DEFAULT_SENIORITY).to_string()),
            benefits: default_benefits(),
        }
    }
}

/// Reads one template body. Unlike the lookup chain below, a missing file is an error here.
pub fn load_template(path: &Path) -> Result<RoleTemplate, KbError> {
    let text = fs::read_to_string(path).map_err(|source| KbError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let raw: RawTemplate = serde_json::from_str(&text).map_err(|source| KbError::Malformed {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(raw.into())
}

/// What a caller knows about a role when asking for its template.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateLookup<'a> {
    pub file: Option<&'a str>,
    pub role_id: Option<&'a str>,
    pub title: Option<&'a str>,
    pub function: Option<&'a str>,
    pub seniority: Option<&'a str>,
}

/// Resolves a role's template: explicit file, then KB id, then case-insensitive title,
/// then a minimal fallback. Malformed template files are still errors.
pub fn load_template_for_role(
    lookup: TemplateLookup<'_>,
    kb: &[KbRecord],
) -> Result<RoleTemplate, KbError> {
    if let Some(file) = lookup.file {
        let path = Path::new(file);
        if path.exists() {
            return load_template(path);
        }
    }

    let by_id = lookup
        .role_id
        .and_then(|id| kb.iter().find(|r| r.id() == id));
    let record = by_id.or_else(|| {
        let wanted = lookup.title?.trim().to_lowercase();
        if wanted.is_empty() {
            return None;
        }
        kb.iter()
            .find(|r| r.title().trim().to_lowercase() == wanted)
    });

    if let Some(record) = record {
        let path = Path::new(&record.entry.file);
        if path.exists() {
            return load_template(path);
        }
    }

    Ok(RoleTemplate::fallback(
        lookup.title,
        lookup.function,
        lookup.seniority,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kb::store::{KbStore, CURATED_INDEX};
    use tempfile::tempdir;

    #[test]
    fn test_nested_skills_shape() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.json");
        fs::write(
            &path,
            r#"{"mission": "Ship v1", "skills": {"must": ["Rust"], "nice": ["Kafka"]},
                "responsibilities": ["Own the API"], "seniority": "Senior"}"#,
        )
        .unwrap();

        let tpl = load_template(&path).unwrap();
        assert_eq!(tpl.mission.as_deref(), Some("Ship v1"));
        assert_eq!(tpl.skills.must, vec!["Rust"]);
        assert_eq!(tpl.skills.nice, vec!["Kafka"]);
        assert_eq!(tpl.responsibilities, vec!["Own the API"]);
        assert_eq!(tpl.benefits.len(), 3);
    }

    #[test]
    fn test_legacy_flat_shape() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.json");
        fs::write(
            &path,
            r#"{"mustHaves": ["Python"], "nice_to_haves": ["dbt"], "responsibilities": []}"#,
        )
        .unwrap();

        let tpl = load_template(&path).unwrap();
        assert_eq!(tpl.skills.must, vec!["Python"]);
        assert_eq!(tpl.skills.nice, vec!["dbt"]);
    }

    #[test]
    fn test_nested_skills_win_over_legacy_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.json");
        fs::write(
            &path,
            r#"{"skills": {"must": ["Go"], "nice": []}, "must_haves": ["Java"], "nice_to_haves": ["Scala"]}"#,
        )
        .unwrap();

        let tpl = load_template(&path).unwrap();
        assert_eq!(tpl.skills.must, vec!["Go"]);
        // Empty nested list falls through to the legacy key.
        assert_eq!(tpl.skills.nice, vec!["Scala"]);
    }

    #[test]
    fn test_lookup_by_title_then_fallback() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("role_knowledge")).unwrap();
        fs::write(
            dir.path().join("role_knowledge/pm.json"),
            r#"{"skills": {"must": ["Roadmaps"], "nice": []}}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join(CURATED_INDEX),
            r#"[{"id": "pm", "title": "Product Manager", "file": "role_knowledge/pm.json"}]"#,
        )
        .unwrap();
        let kb = KbStore::new(dir.path()).load().unwrap();

        let found = load_template_for_role(
            TemplateLookup {
                title: Some("  product manager "),
                ..Default::default()
            },
            &kb,
        )
        .unwrap();
        assert_eq!(found.skills.must, vec!["Roadmaps"]);

        let missing = load_template_for_role(
            TemplateLookup {
                title: Some("Chief Vibes Officer"),
                ..Default::default()
            },
            &kb,
        )
        .unwrap();
        assert_eq!(missing.title.as_deref(), Some("Chief Vibes Officer"));
        assert_eq!(missing.seniority.as_deref(), Some("Mid"));
        assert!(missing.skills.must.is_empty());
    }
}
