//! Role Resolution State Machine.
//!
//! Every requested role starts in whatever state the matcher classified it as
//! (`unknown` or `suggest`). Only operator actions move a role to `match`:
//! accepting a suggestion, or creating a custom role. A matched role may be
//! re-finalized through the same two actions.
//!
//! Within one session a template is assigned to at most one role. Ids finalized on
//! other roles are filtered out of a role's suggestions when they are presented; the
//! matcher itself knows nothing about sessions.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::kb::store::KbRecord;
use crate::kb::writer::SavedRole;
use crate::models::role::{ConfidenceSource, RoleStatus, Suggestion};
use crate::resolution::extractor::LlmBudget;
use crate::resolution::matcher::{match_one, MatchResult};

#[derive(Debug, Error, PartialEq)]
pub enum ResolutionError {
    #[error("no role at index {0}")]
    RoleIndex(usize),

    #[error("'{0}' is not among the suggestions for this role")]
    NotOffered(String),

    #[error("'{role_id}' is already assigned to role #{index}")]
    AlreadyAssigned { role_id: String, index: usize },
}

/// One role the requester wants filled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoleRequest {
    pub title: String,
    pub status: RoleStatus,
    /// Set only when `status` is `match`.
    pub role_id: Option<String>,
    /// Template body location; set only when `status` is `match`.
    pub file: Option<String>,
    /// `None` for manually created roles.
    pub confidence: Option<f64>,
    pub confidence_source: ConfidenceSource,
    /// Empty once matched.
    pub suggestions: Vec<Suggestion>,
}

impl RoleRequest {
    pub fn from_match(result: MatchResult) -> Self {
        RoleRequest {
            title: result.title,
            status: result.status,
            role_id: None,
            file: None,
            confidence: Some(result.confidence),
            confidence_source: ConfidenceSource::Auto,
            suggestions: result.suggestions,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status != RoleStatus::Match
    }

    /// any -> match, from a KB record the operator picked among the suggestions.
    pub fn accept_suggestion(&mut self, record: &KbRecord, score: f64) {
        self.status = RoleStatus::Match;
        self.role_id = Some(record.id().to_string());
        self.title = record.title().to_string();
        self.file = Some(record.entry.file.clone());
        self.confidence = Some(score);
        self.confidence_source = ConfidenceSource::Auto;
        self.suggestions.clear();
    }

    /// any -> match, from a template the operator just authored.
    pub fn apply_custom(&mut self, saved: &SavedRole) {
        self.status = RoleStatus::Match;
        self.role_id = Some(saved.id.clone());
        self.title = saved.title.clone();
        self.file = Some(saved.file.clone());
        self.confidence = None;
        self.confidence_source = ConfidenceSource::Manual;
        self.suggestions.clear();
    }

    /// Replaces the suggestions of a pending role. Matched roles are left alone.
    pub fn refresh(&mut self, result: MatchResult) {
        if !self.is_pending() {
            return;
        }
        self.status = result.status;
        self.confidence = Some(result.confidence);
        self.suggestions = result.suggestions;
    }
}

/// One hiring-plan session: the roles extracted from a prompt and their resolution state.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub prompt: String,
    pub roles: Vec<RoleRequest>,
    pub llm: LlmBudget,
    pub created_at: DateTime<Utc>,
}

/// A role as presented to the operator: suggestions filtered for the session.
#[derive(Debug, Clone, Serialize)]
pub struct RoleView {
    pub index: usize,
    #[serde(flatten)]
    pub role: RoleRequest,
    /// Index into `suggestions` to preselect.
    pub default_suggestion: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub prompt: String,
    pub roles: Vec<RoleView>,
    pub llm: LlmBudget,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(prompt: impl Into<String>, llm: LlmBudget) -> Self {
        Self {
            id: Uuid::new_v4(),
            prompt: prompt.into(),
            roles: Vec::new(),
            llm,
            created_at: Utc::now(),
        }
    }

    pub fn role(&self, index: usize) -> Result<&RoleRequest, ResolutionError> {
        self.roles.get(index).ok_or(ResolutionError::RoleIndex(index))
    }

    pub fn add_role(&mut self, result: MatchResult) -> usize {
        self.roles.push(RoleRequest::from_match(result));
        self.roles.len() - 1
    }

    /// Drops a role from the session. This is a collection operation, not a transition.
    pub fn remove_role(&mut self, index: usize) -> Result<RoleRequest, ResolutionError> {
        self.role(index)?;
        Ok(self.roles.remove(index))
    }

    /// Template ids finalized on roles other than `index`, with the role holding each.
    fn assigned_elsewhere(&self, index: usize) -> HashMap<&str, usize> {
        self.roles
            .iter()
            .enumerate()
            .filter(|(i, role)| *i != index && role.status == RoleStatus::Match)
            .filter_map(|(i, role)| role.role_id.as_deref().map(|id| (id, i)))
            .collect()
    }

    fn exclude_assigned(&self, index: usize, suggestions: &[Suggestion]) -> Vec<Suggestion> {
        let taken = self.assigned_elsewhere(index);
        suggestions
            .iter()
            .filter(|s| !taken.contains_key(s.role_id.as_str()))
            .cloned()
            .collect()
    }

    /// The stored suggestions of a role minus templates finalized elsewhere in the session.
    pub fn visible_suggestions(&self, index: usize) -> Result<Vec<Suggestion>, ResolutionError> {
        let role = self.role(index)?;
        Ok(self.exclude_assigned(index, &role.suggestions))
    }

    /// What the operator may choose from right now. A matched role has no stored
    /// suggestions, so its title is scored against `kb` again.
    pub fn candidate_suggestions(
        &self,
        index: usize,
        kb: &[KbRecord],
        threshold: u8,
    ) -> Result<Vec<Suggestion>, ResolutionError> {
        let role = self.role(index)?;
        if role.is_pending() {
            return self.visible_suggestions(index);
        }
        let fresh = match_one(&role.title, kb, threshold);
        Ok(self.exclude_assigned(index, &fresh.suggestions))
    }

    /// Finalizes a role with a suggested KB record.
    pub fn accept(
        &mut self,
        index: usize,
        role_id: &str,
        kb: &[KbRecord],
        threshold: u8,
    ) -> Result<&RoleRequest, ResolutionError> {
        if let Some(&holder) = self.assigned_elsewhere(index).get(role_id) {
            return Err(ResolutionError::AlreadyAssigned {
                role_id: role_id.to_string(),
                index: holder,
            });
        }

        let score = self
            .candidate_suggestions(index, kb, threshold)?
            .into_iter()
            .find(|s| s.role_id == role_id)
            .map(|s| s.score)
            .ok_or_else(|| ResolutionError::NotOffered(role_id.to_string()))?;
        let record = kb
            .iter()
            .find(|r| r.id() == role_id)
            .ok_or_else(|| ResolutionError::NotOffered(role_id.to_string()))?;

        let role = &mut self.roles[index];
        role.accept_suggestion(record, score);
        Ok(role)
    }

    /// Finalizes a role with a freshly saved custom template.
    pub fn finalize_custom(
        &mut self,
        index: usize,
        saved: &SavedRole,
    ) -> Result<&RoleRequest, ResolutionError> {
        let role = self
            .roles
            .get_mut(index)
            .ok_or(ResolutionError::RoleIndex(index))?;
        role.apply_custom(saved);
        Ok(role)
    }

    /// Re-scores every pending role against `kb`, e.g. after new custom roles were saved.
    pub fn refresh_pending(&mut self, kb: &[KbRecord], threshold: u8) -> usize {
        let mut refreshed = 0;
        for role in self.roles.iter_mut().filter(|r| r.is_pending()) {
            let result = match_one(&role.title, kb, threshold);
            role.refresh(result);
            refreshed += 1;
        }
        refreshed
    }

    pub fn view(&self) -> SessionView {
        let roles = self
            .roles
            .iter()
            .enumerate()
            .map(|(index, role)| {
                let suggestions = self.exclude_assigned(index, &role.suggestions);
                let default_suggestion = default_index(&suggestions);
                RoleView {
                    index,
                    role: RoleRequest {
                        suggestions,
                        ..role.clone()
                    },
                    default_suggestion,
                }
            })
            .collect();

        SessionView {
            id: self.id,
            prompt: self.prompt.clone(),
            roles,
            llm: self.llm.clone(),
            created_at: self.created_at,
        }
    }
}

/// Newest custom suggestion if there is one, otherwise the top-scored one.
fn default_index(suggestions: &[Suggestion]) -> Option<usize> {
    if suggestions.is_empty() {
        return None;
    }
    let newest_custom = suggestions
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_custom)
        .filter_map(|(i, s)| s.created_at.map(|at| (i, at)))
        .max_by_key(|(_, at)| *at)
        .map(|(i, _)| i);
    Some(newest_custom.unwrap_or(0))
}
