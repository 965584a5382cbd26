//! Knowledge Base Store: loads the curated and custom role collections and merges them.
//!
//! The store never caches. Each call reads both files again so a template saved by
//! `CustomRoleWriter` a moment earlier is visible to the very next resolution.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::kb::normalize::normalize;

pub const CURATED_INDEX: &str = "roles_kb.json";
pub const CUSTOM_INDEX: &str = "roles_kb_custom.json";
pub const CUSTOM_TEMPLATE_DIR: &str = "role_knowledge_custom";
/// Index files written by older tooling store paths relative to the repo root, as `data/...`.
const LEGACY_DATA_PREFIX: &str = "data";
/// Offset-less timestamps, read as UTC.
const NAIVE_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

#[derive(Debug, Error)]
pub enum KbError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed KB file {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("duplicate role id '{0}' across curated and custom KB")]
    DuplicateId(String),
}

/// A catalog entry exactly as persisted in either index file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KbEntry {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub file: String,
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub seniority: Option<String>,
    #[serde(default)]
    pub approved: bool,
    #[serde(
        default,
        alias = "createdAt",
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

/// A bad `created_at` only loses the timestamp; it never fails the whole index.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match raw {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(text)) => parse_timestamp(&text),
        Some(other) => {
            warn!("Ignoring non-string created_at {other}");
            None
        }
    })
}

/// RFC 3339, or an ISO timestamp without offset taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    let naive = NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok());
    if naive.is_none() {
        warn!("Ignoring unparseable created_at '{raw}'");
    }
    naive.map(|n| n.and_utc())
}

/// A KB entry augmented with search fields at load time. The derived fields are never written back.
#[derive(Debug, Clone, Serialize)]
pub struct KbRecord {
    #[serde(flatten)]
    pub entry: KbEntry,
    pub norm_title: String,
    pub norm_aliases: Vec<String>,
    /// `norm_title` followed by `norm_aliases`; what the matcher scores against.
    #[serde(skip)]
    pub match_corpus: Vec<String>,
    pub is_custom: bool,
}

impl KbRecord {
    pub fn id(&self) -> &str {
        &self.entry.id
    }

    pub fn title(&self) -> &str {
        &self.entry.title
    }
}

/// Filesystem-backed view of the two KB collections under one data directory.
#[derive(Debug, Clone)]
pub struct KbStore {
    data_dir: PathBuf,
}

impl KbStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn curated_index_path(&self) -> PathBuf {
        self.data_dir.join(CURATED_INDEX)
    }

    pub fn custom_index_path(&self) -> PathBuf {
        self.data_dir.join(CUSTOM_INDEX)
    }

    pub fn custom_template_dir(&self) -> PathBuf {
        self.data_dir.join(CUSTOM_TEMPLATE_DIR)
    }

    /// Reads both collections and returns the merged, augmented list: curated first, then custom.
    pub fn load(&self) -> Result<Vec<KbRecord>, KbError> {
        let curated = read_entries(&self.curated_index_path())?;
        let custom = read_entries(&self.custom_index_path())?;
        let (curated_len, custom_len) = (curated.len(), custom.len());

        let custom_dir = self.custom_template_dir();
        let mut seen = HashSet::new();
        let mut records = Vec::with_capacity(curated_len + custom_len);

        for mut entry in curated.into_iter().chain(custom) {
            if !seen.insert(entry.id.clone()) {
                return Err(KbError::DuplicateId(entry.id));
            }
            let resolved = self.resolve_file(&entry.file);
            let is_custom = resolved.starts_with(&custom_dir);
            entry.file = resolved.to_string_lossy().replace('\\', "/");
            records.push(augment(entry, is_custom));
        }

        debug!(
            "KB loaded from {}: {} curated, {} custom",
            self.data_dir.display(),
            curated_len,
            custom_len
        );
        Ok(records)
    }

    /// Raw custom index entries, as the writer needs them for append-and-rewrite.
    pub fn load_custom_index(&self) -> Result<Vec<KbEntry>, KbError> {
        read_entries(&self.custom_index_path())
    }

    /// Looks a record up by id over a fresh load.
    pub fn find(&self, id: &str) -> Result<Option<KbRecord>, KbError> {
        Ok(self.load()?.into_iter().find(|r| r.id() == id))
    }

    /// Maps a stored `file` value onto the data directory. Paths already rooted there stay
    /// as they are; a leading `data/` stands for the data directory itself.
    pub fn resolve_file(&self, file: &str) -> PathBuf {
        let path = Path::new(file);
        if path.is_absolute() || path.starts_with(&self.data_dir) {
            return path.to_path_buf();
        }
        let relative = path.strip_prefix(LEGACY_DATA_PREFIX).unwrap_or(path);
        self.data_dir.join(relative)
    }
}

fn read_entries(path: &Path) -> Result<Vec<KbEntry>, KbError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(KbError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_str(&text).map_err(|source| KbError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

fn augment(entry: KbEntry, is_custom: bool) -> KbRecord {
    let norm_title = normalize(&entry.title);
    let norm_aliases: Vec<String> = entry.aliases.iter().map(|a| normalize(a)).collect();
    let match_corpus = std::iter::once(norm_title.clone())
        .chain(norm_aliases.iter().cloned())
        .collect();
    KbRecord {
        entry,
        norm_title,
        norm_aliases,
        match_corpus,
        is_custom,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const CURATED: &str = r#"[
        {"id": "founding_engineer", "title": "Founding Engineer",
         "aliases": ["Founder Engineer", "First Engineer"],
         "file": "role_knowledge/founding_engineer.json", "function": "Engineering"},
        {"id": "genai_intern", "title": "GenAI Intern", "aliases": ["Gen AI Intern"],
         "file": "data/role_knowledge/genai_intern.json", "seniority": "Intern", "approved": true}
    ]"#;

    const CUSTOM: &str = r#"[
        {"id": "data_analyst_ii_20250101_120000", "title": "Data Analyst II", "aliases": [],
         "file": "role_knowledge_custom/data_analyst_ii_20250101_120000.json",
         "function": "Data", "approved": false, "createdAt": "2025-01-01T12:00:00Z"}
    ]"#;

    fn write(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn test_missing_files_load_as_empty() {
        let dir = tempdir().unwrap();
        let kb = KbStore::new(dir.path()).load().unwrap();
        assert!(kb.is_empty());
    }

    #[test]
    fn test_load_merges_curated_then_custom() {
        let dir = tempdir().unwrap();
        write(dir.path(), CURATED_INDEX, CURATED);
        write(dir.path(), CUSTOM_INDEX, CUSTOM);

        let kb = KbStore::new(dir.path()).load().unwrap();
        let ids: Vec<&str> = kb.iter().map(|r| r.id()).collect();
        assert_eq!(
            ids,
            vec!["founding_engineer", "genai_intern", "data_analyst_ii_20250101_120000"]
        );
        assert!(!kb[0].is_custom);
        assert!(!kb[1].is_custom);
        assert!(kb[2].is_custom);
        assert!(kb[2].entry.created_at.is_some());
        assert!(kb[1].entry.approved);
        assert!(!kb[0].entry.approved);
    }

    #[test]
    fn test_augmented_fields_are_normalized() {
        let dir = tempdir().unwrap();
        write(dir.path(), CURATED_INDEX, CURATED);

        let kb = KbStore::new(dir.path()).load().unwrap();
        let founding = &kb[0];
        assert_eq!(founding.norm_title, "founding engineer");
        assert_eq!(founding.norm_aliases, vec!["founder engineer", "first engineer"]);
        assert_eq!(
            founding.match_corpus,
            vec!["founding engineer", "founder engineer", "first engineer"]
        );
    }

    #[test]
    fn test_file_paths_resolve_under_data_dir() {
        let dir = tempdir().unwrap();
        write(dir.path(), CURATED_INDEX, CURATED);

        let store = KbStore::new(dir.path());
        let kb = store.load().unwrap();
        let expected = dir.path().join("role_knowledge/founding_engineer.json");
        assert_eq!(PathBuf::from(&kb[0].entry.file), expected);
    }

    #[test]
    fn test_legacy_data_prefix_maps_onto_absolute_data_dir() {
        let dir = tempdir().unwrap();
        assert!(dir.path().is_absolute());
        write(dir.path(), CURATED_INDEX, CURATED);

        let kb = KbStore::new(dir.path()).load().unwrap();
        let genai = kb.iter().find(|r| r.id() == "genai_intern").unwrap();
        assert_eq!(
            PathBuf::from(&genai.entry.file),
            dir.path().join("role_knowledge/genai_intern.json")
        );
    }

    #[test]
    fn test_relative_data_dir_keeps_rooted_paths() {
        let store = KbStore::new("data");
        assert_eq!(
            store.resolve_file("data/role_knowledge/g.json"),
            PathBuf::from("data/role_knowledge/g.json")
        );
        assert_eq!(
            store.resolve_file("role_knowledge/g.json"),
            PathBuf::from("data/role_knowledge/g.json")
        );
    }

    #[test]
    fn test_created_at_without_offset_is_read_as_utc() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            CUSTOM_INDEX,
            r#"[
                {"id": "a", "title": "A", "file": "role_knowledge_custom/a.json",
                 "created_at": "2025-01-01T12:00:00"},
                {"id": "b", "title": "B", "file": "role_knowledge_custom/b.json",
                 "created_at": "2025-01-02T08:30:00.123456"},
                {"id": "c", "title": "C", "file": "role_knowledge_custom/c.json",
                 "created_at": "yesterday-ish"},
                {"id": "d", "title": "D", "file": "role_knowledge_custom/d.json",
                 "created_at": null}
            ]"#,
        );

        let kb = KbStore::new(dir.path()).load().unwrap();
        assert_eq!(kb.len(), 4);
        assert_eq!(
            kb[0].entry.created_at.unwrap().to_rfc3339(),
            "2025-01-01T12:00:00+00:00"
        );
        assert!(kb[1].entry.created_at.is_some());
        assert!(kb[2].entry.created_at.is_none());
        assert!(kb[3].entry.created_at.is_none());
    }

    #[test]
    fn test_parse_timestamp_honours_offsets() {
        let ts = parse_timestamp("2025-01-01T12:00:00+02:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2025-01-01T10:00:00+00:00");
        assert!(parse_timestamp("   ").is_none());
    }

    #[test]
    fn test_find_reads_fresh_state() {
        let dir = tempdir().unwrap();
        let store = KbStore::new(dir.path());
        assert!(store.find("founding_engineer").unwrap().is_none());

        write(dir.path(), CURATED_INDEX, CURATED);
        let found = store.find("founding_engineer").unwrap().unwrap();
        assert_eq!(found.title(), "Founding Engineer");
    }

    #[test]
    fn test_malformed_custom_index_is_a_hard_error() {
        let dir = tempdir().unwrap();
        write(dir.path(), CURATED_INDEX, CURATED);
        write(dir.path(), CUSTOM_INDEX, "[{\"id\": \"broken\",");

        let err = KbStore::new(dir.path()).load().unwrap_err();
        assert!(matches!(err, KbError::Malformed { .. }), "got {err:?}");
    }

    #[test]
    fn test_duplicate_id_is_an_integrity_fault() {
        let dir = tempdir().unwrap();
        write(dir.path(), CURATED_INDEX, CURATED);
        write(
            dir.path(),
            CUSTOM_INDEX,
            r#"[{"id": "genai_intern", "title": "Another", "file": "role_knowledge_custom/x.json"}]"#,
        );

        let err = KbStore::new(dir.path()).load().unwrap_err();
        assert!(matches!(err, KbError::DuplicateId(ref id) if id == "genai_intern"));
    }
}
