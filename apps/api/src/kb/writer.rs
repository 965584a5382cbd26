//! Custom Template Writer: persists a newly authored role template and indexes it.
//!
//! Two files change per save: the template body and the custom KB index. Each is written
//! with a temp-file-then-rename so readers never see a partial file, but the pair is not
//! transactional. The body is written first; a crash before the index rewrite leaves an
//! orphan template that no KB load will see.
//!
//! Ids are `{slug}_{YYYYMMDD_HHMMSS}`. Saves landing in the same second get `_{n}` appended
//! from an in-process sequence, and the body is committed with a no-clobber rename so an
//! existing template is never replaced. Index rewrites are serialized in-process only;
//! two processes saving at once can still lose one index entry.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{info, warn};

use crate::kb::normalize::slugify;
use crate::kb::store::{KbEntry, KbError, KbStore, CUSTOM_TEMPLATE_DIR};
use crate::kb::template::Skills;

const DEFAULT_FUNCTION: &str = "Engineering";
const DEFAULT_INTERVIEW_LOOP: &[&str] = &[
    "Screen",
    "Tech Deep-Dive",
    "System Design",
    "Founder Chat",
    "References",
];
const MAX_ID_ATTEMPTS: u32 = 16;

/// Last timestamp handed out and how many ids it has produced.
static ID_CLOCK: Mutex<Option<(String, u32)>> = Mutex::new(None);
static INDEX_LOCK: Mutex<()> = Mutex::new(());

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("invalid role title: {0}")]
    InvalidTitle(String),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize custom role: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("custom KB index unreadable: {0}")]
    Index(#[from] KbError),
}

/// What an operator submits when creating a role the KB does not have.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewRolePayload {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub seniority: Option<String>,
    #[serde(default)]
    pub skills: Skills,
    #[serde(default)]
    pub responsibilities: Vec<String>,
    #[serde(default)]
    pub interview_loop: Option<Vec<String>>,
    #[serde(default)]
    pub sourcing_tags: Vec<String>,
}

/// Full template body written once per custom role and never edited in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomTemplate {
    pub id: String,
    pub title: String,
    pub aliases: Vec<String>,
    pub function: String,
    pub seniority: Option<String>,
    pub skills: Skills,
    pub responsibilities: Vec<String>,
    pub interview_loop: Vec<String>,
    pub sourcing_tags: Vec<String>,
    pub approved: bool,
    pub version: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SavedRole {
    pub id: String,
    pub file: String,
    pub title: String,
}

pub struct CustomRoleWriter {
    store: KbStore,
}

impl CustomRoleWriter {
    pub fn new(store: KbStore) -> Self {
        Self { store }
    }

    pub fn save(&self, payload: NewRolePayload) -> Result<SavedRole, PersistError> {
        let title = payload.title.trim().to_string();
        if title.is_empty() {
            return Err(PersistError::InvalidTitle("title is empty".to_string()));
        }
        let slug = slugify(&title);
        if slug.is_empty() {
            return Err(PersistError::InvalidTitle(format!(
                "'{title}' has no characters usable in an id"
            )));
        }

        let _guard = INDEX_LOCK.lock().unwrap_or_else(|e| e.into_inner());

        // Read the index before touching disk so a corrupt index never gains an orphan body.
        let mut index = self.store.load_custom_index()?;

        let created_at = Utc::now();
        let stamp = created_at.format("%Y%m%d_%H%M%S").to_string();
        let template_dir = self.store.custom_template_dir();

        let mut attempt = 0;
        let (template, relative_file) = loop {
            attempt += 1;
            let id = format!("{slug}_{}", next_id_suffix(&stamp));
            let template = CustomTemplate {
                id: id.clone(),
                title: title.clone(),
                aliases: payload.aliases.clone(),
                function: payload
                    .function
                    .clone()
                    .unwrap_or_else(|| DEFAULT_FUNCTION.to_string()),
                seniority: payload.seniority.clone(),
                skills: payload.skills.clone(),
                responsibilities: payload.responsibilities.clone(),
                interview_loop: payload.interview_loop.clone().unwrap_or_else(|| {
                    DEFAULT_INTERVIEW_LOOP.iter().map(|s| s.to_string()).collect()
                }),
                sourcing_tags: payload.sourcing_tags.clone(),
                approved: false,
                version: 1,
                created_at,
            };
            let body = serde_json::to_string_pretty(&template)?;
            let path = template_dir.join(format!("{id}.json"));

            match write_atomic(&path, &body, false) {
                Ok(()) => break (template, format!("{CUSTOM_TEMPLATE_DIR}/{id}.json")),
                Err(e)
                    if e.kind() == io::ErrorKind::AlreadyExists && attempt < MAX_ID_ATTEMPTS =>
                {
                    warn!(
                        "Custom template {} already exists, retrying with next id",
                        path.display()
                    );
                }
                Err(source) => return Err(PersistError::Io { path, source }),
            }
        };

        index.push(KbEntry {
            id: template.id.clone(),
            title: template.title.clone(),
            aliases: template.aliases.clone(),
            file: relative_file.clone(),
            function: Some(template.function.clone()),
            seniority: template.seniority.clone(),
            approved: false,
            created_at: Some(created_at),
        });
        let index_path = self.store.custom_index_path();
        let index_body = serde_json::to_string_pretty(&index)?;
        write_atomic(&index_path, &index_body, true).map_err(|source| PersistError::Io {
            path: index_path.clone(),
            source,
        })?;

        info!(
            "Saved custom role '{}' as {} ({} custom entries)",
            template.title,
            template.id,
            index.len()
        );

        Ok(SavedRole {
            id: template.id,
            file: self
                .store
                .resolve_file(&relative_file)
                .to_string_lossy()
                .replace('\\', "/"),
            title: template.title,
        })
    }
}

/// `stamp` for the first id in a given second, `stamp_2`, `stamp_3`, ... after that.
fn next_id_suffix(stamp: &str) -> String {
    let mut clock = ID_CLOCK.lock().unwrap_or_else(|e| e.into_inner());
    let seq = match clock.as_mut() {
        Some((last, seq)) if last == stamp => {
            *seq += 1;
            *seq
        }
        _ => {
            *clock = Some((stamp.to_string(), 1));
            1
        }
    };
    if seq == 1 {
        stamp.to_string()
    } else {
        format!("{stamp}_{seq}")
    }
}

/// Writes `contents` to a temp file beside `path`, syncs it, then renames it into place.
/// The temp file is removed on every error path when the `NamedTempFile` drops.
fn write_atomic(path: &Path, contents: &str, clobber: bool) -> io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;

    if clobber {
        tmp.persist(path).map_err(|e| e.error)?;
    } else {
        tmp.persist_noclobber(path).map_err(|e| e.error)?;
    }
    Ok(())
}
