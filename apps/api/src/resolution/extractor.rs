//! Phrase Extractor: turns one free-text hiring prompt into candidate role-title phrases.
//!
//! Two tiers, first success wins:
//! 1. An external structured extractor (`RoleExtractor`, the LLM in production), only when
//!    one is configured and the session still has LLM budget. It never fails the caller.
//! 2. `split_phrases`, a local heuristic splitter.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::kb::normalize::normalize;
use crate::llm_client::{self, LlmClient};
use crate::resolution::prompts::{
    role_extraction_system, INTAKE_EXTRACTION_FEATURE, ROLE_EXTRACTION_PROMPT_TEMPLATE,
};

pub const MAX_PHRASE_TOKENS: usize = 7;
/// Segments this short with no role noun are treated as orphaned modifiers.
const ORPHAN_MAX_TOKENS: usize = 2;

/// Sentence punctuation, commas, and the joining words that separate roles in a request.
static SEGMENT_SPLIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[.!?;,|\n]+|\b(?:and|or|plus|with)\b").expect("valid segment regex")
});

/// Leading tokens that never belong to a role title.
const FILLER: &[&str] = &[
    // pronouns
    "i", "im", "ive", "id", "we", "were", "weve", "wed", "our", "us", "my", "me", "you", "they",
    "someone", "somebody",
    // desire / intent
    "need", "needs", "needed", "want", "wants", "would", "like", "love", "hire", "hires",
    "hiring", "hired", "looking", "look", "search", "searching", "seek", "seeking", "find",
    "get", "add", "recruit", "recruiting", "plan", "planning", "to", "for",
    "are", "is", "am", "be", "will", "have", "has", "got", "going", "can", "could", "should",
    "must", "help", "also", "let", "lets",
    // articles, counts
    "a", "an", "the", "some", "few", "couple", "of", "several", "multiple", "one", "two",
    "three", "four", "five", "six", "seven", "eight", "nine", "ten", "another", "more",
    // politeness
    "please", "kindly", "hi", "hey", "hello", "thanks", "thank", "so", "just", "now",
    // dangling joiners
    "and", "or", "plus", "with",
];

/// Nouns that terminate a role title.
const ROLE_NOUNS: &[&str] = &[
    "engineer", "developer", "designer", "analyst", "manager", "scientist", "architect",
    "intern", "lead", "director", "researcher", "specialist", "consultant", "administrator",
    "admin", "recruiter", "marketer", "writer", "officer", "coordinator", "associate",
    "representative", "rep", "executive", "head", "vp", "cto", "ceo", "cfo", "coo", "founder",
    "owner", "strategist", "technician", "tester", "programmer", "accountant", "editor",
    "producer", "operator", "advocate", "partner", "assistant", "agent", "sre", "hacker",
    "generalist", "principal", "fellow", "trainee", "apprentice",
];

fn is_filler(token: &str) -> bool {
    FILLER.contains(&token) || token.chars().all(|c| c.is_ascii_digit())
}

fn is_role_noun(token: &str) -> bool {
    ROLE_NOUNS.contains(&token)
}

// ────────────────────────────────────────────────────────────────────────────
// External extraction seam
// ────────────────────────────────────────────────────────────────────────────

/// One role the external extractor found in a prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRole {
    pub title: String,
    pub seniority: Option<String>,
    pub function: Option<String>,
    pub count: u32,
}

/// `used` is true only when the collaborator actually answered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionMeta {
    pub used: bool,
    pub model: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionOutcome {
    pub roles: Vec<ExtractedRole>,
    pub meta: ExtractionMeta,
}

/// Whole-prompt role extraction by an external collaborator. Implementations report
/// failures through `ExtractionMeta::error` rather than returning them.
#[async_trait]
pub trait RoleExtractor: Send + Sync {
    async fn extract_roles(&self, prompt: &str) -> ExtractionOutcome;
}

#[derive(Debug, Deserialize)]
struct RolesEnvelope {
    #[serde(default)]
    roles: Vec<RawExtractedRole>,
}

#[derive(Debug, Deserialize)]
struct RawExtractedRole {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    seniority: Option<String>,
    #[serde(default)]
    function: Option<String>,
    #[serde(default)]
    count: Option<u32>,
}

/// `RoleExtractor` backed by the shared LLM client.
pub struct LlmRoleExtractor {
    llm: LlmClient,
}

impl LlmRoleExtractor {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl RoleExtractor for LlmRoleExtractor {
    async fn extract_roles(&self, prompt: &str) -> ExtractionOutcome {
        let request = ROLE_EXTRACTION_PROMPT_TEMPLATE.replace("{prompt_text}", prompt);
        let mut meta = ExtractionMeta {
            used: false,
            model: Some(llm_client::MODEL.to_string()),
            error: None,
        };

        match self
            .llm
            .call_json::<RolesEnvelope>(&request, &role_extraction_system())
            .await
        {
            Ok(envelope) => {
                meta.used = true;
                let roles = envelope
                    .roles
                    .into_iter()
                    .filter_map(|raw| {
                        let title = raw.title?.trim().to_string();
                        if title.is_empty() {
                            return None;
                        }
                        Some(ExtractedRole {
                            title,
                            seniority: raw.seniority.filter(|s| !s.trim().is_empty()),
                            function: raw.function.filter(|f| !f.trim().is_empty()),
                            count: raw.count.unwrap_or(1).max(1),
                        })
                    })
                    .collect();
                ExtractionOutcome { roles, meta }
            }
            Err(e) => {
                meta.error = Some(e.to_string());
                ExtractionOutcome {
                    roles: Vec::new(),
                    meta,
                }
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// LLM budget
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LlmUsage {
    pub feature: String,
    pub model: Option<String>,
    pub error: Option<String>,
}

/// Per-session cap on external LLM calls, with a log of every charged call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LlmBudget {
    pub cap: u32,
    pub calls: u32,
    pub log: Vec<LlmUsage>,
}

impl LlmBudget {
    pub fn new(cap: u32) -> Self {
        Self {
            cap,
            ..Default::default()
        }
    }

    pub fn remaining(&self) -> u32 {
        self.cap.saturating_sub(self.calls)
    }

    /// Charges one call when the collaborator was actually used.
    pub fn record(&mut self, meta: &ExtractionMeta, feature: &str) {
        if !meta.used {
            return;
        }
        self.calls += 1;
        self.log.push(LlmUsage {
            feature: feature.to_string(),
            model: meta.model.clone(),
            error: meta.error.clone(),
        });
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Extractor
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhraseSource {
    External,
    Heuristic,
}

#[derive(Debug, Clone, Serialize)]
pub struct Extraction {
    pub phrases: Vec<String>,
    pub source: PhraseSource,
    /// Present whenever the external extractor was consulted, successful or not.
    pub meta: Option<ExtractionMeta>,
}

#[derive(Clone, Default)]
pub struct PhraseExtractor {
    external: Option<Arc<dyn RoleExtractor>>,
}

impl PhraseExtractor {
    pub fn heuristic_only() -> Self {
        Self { external: None }
    }

    pub fn with_external(external: Arc<dyn RoleExtractor>) -> Self {
        Self {
            external: Some(external),
        }
    }

    pub async fn extract(&self, prompt: &str, budget: &mut LlmBudget) -> Extraction {
        let mut consulted = None;

        if let Some(external) = self.external.as_ref().filter(|_| budget.remaining() > 0) {
            let outcome = external.extract_roles(prompt).await;
            budget.record(&outcome.meta, INTAKE_EXTRACTION_FEATURE);

            let titles: Vec<String> = outcome
                .roles
                .iter()
                .map(|r| r.title.trim())
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();

            if outcome.meta.used && !titles.is_empty() {
                debug!("External extractor returned {} role titles", titles.len());
                return Extraction {
                    phrases: titles,
                    source: PhraseSource::External,
                    meta: Some(outcome.meta),
                };
            }

            match &outcome.meta.error {
                Some(err) => warn!("External role extraction failed, using heuristic: {err}"),
                None => debug!("External extractor returned no roles, using heuristic"),
            }
            consulted = Some(outcome.meta);
        }

        Extraction {
            phrases: split_phrases(prompt),
            source: PhraseSource::Heuristic,
            meta: consulted,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Heuristic splitter
// ────────────────────────────────────────────────────────────────────────────

/// Splits a prompt into deduplicated role phrases of 1 to 7 tokens.
///
/// Splitting runs on the original text so punctuation boundaries survive; each segment
/// is then normalized, stripped of leading filler and cut to its last 7 tokens (role
/// nouns sit at the end). Short modifier-only segments ("backend" in "backend, frontend,
/// and QA engineers") borrow the head noun of a neighbouring phrase.
pub fn split_phrases(prompt: &str) -> Vec<String> {
    let mut candidates: Vec<Vec<String>> = SEGMENT_SPLIT
        .split(prompt)
        .map(clean_segment)
        .filter(|tokens| (1..=MAX_PHRASE_TOKENS).contains(&tokens.len()))
        .collect();

    repair_head_nouns(&mut candidates);

    let mut phrases: Vec<String> = Vec::with_capacity(candidates.len());
    for phrase in candidates.into_iter().map(|tokens| tokens.join(" ")) {
        if !phrases.contains(&phrase) {
            phrases.push(phrase);
        }
    }

    if phrases.is_empty() {
        let whole = clean_segment(prompt);
        if !whole.is_empty() {
            phrases.push(whole.join(" "));
        }
    }
    phrases
}

fn clean_segment(segment: &str) -> Vec<String> {
    let normalized = normalize(segment);
    let tokens: Vec<&str> = normalized.split_whitespace().collect();

    let start = tokens
        .iter()
        .position(|t| !is_filler(t))
        .unwrap_or(tokens.len());
    let kept = &tokens[start..];
    let kept = &kept[kept.len().saturating_sub(MAX_PHRASE_TOKENS)..];

    let mut out: Vec<String> = kept.iter().map(|t| t.to_string()).collect();
    if let Some(last) = out.last_mut() {
        if let Some(singular) = singular_role_noun(last) {
            *last = singular.to_string();
        }
    }
    out
}

/// "engineers" -> "engineer" when the singular is a known role noun.
fn singular_role_noun(token: &str) -> Option<&'static str> {
    let stem = token.strip_suffix('s')?;
    ROLE_NOUNS.iter().copied().find(|noun| *noun == stem)
}

fn head_noun(tokens: &[String]) -> Option<&str> {
    tokens.last().map(String::as_str).filter(|t| is_role_noun(t))
}

fn repair_head_nouns(candidates: &mut [Vec<String>]) {
    let heads: Vec<Option<String>> = candidates
        .iter()
        .map(|tokens| head_noun(tokens).map(str::to_string))
        .collect();

    let mut last_seen: Option<String> = None;
    for (i, tokens) in candidates.iter_mut().enumerate() {
        if let Some(head) = &heads[i] {
            last_seen = Some(head.clone());
            continue;
        }
        if tokens.len() > ORPHAN_MAX_TOKENS {
            continue;
        }
        let borrowed = heads[i + 1..]
            .iter()
            .flatten()
            .next()
            .cloned()
            .or_else(|| last_seen.clone());
        if let Some(head) = borrowed {
            tokens.push(head);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FakeExtractor {
        outcome: ExtractionOutcome,
        calls: AtomicU32,
    }

    impl FakeExtractor {
        fn new(outcome: ExtractionOutcome) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl RoleExtractor for FakeExtractor {
        async fn extract_roles(&self, _prompt: &str) -> ExtractionOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    fn answered(titles: &[&str]) -> ExtractionOutcome {
        ExtractionOutcome {
            roles: titles
                .iter()
                .map(|t| ExtractedRole {
                    title: t.to_string(),
                    seniority: None,
                    function: None,
                    count: 1,
                })
                .collect(),
            meta: ExtractionMeta {
                used: true,
                model: Some("test-model".to_string()),
                error: None,
            },
        }
    }

    #[test]
    fn test_single_clean_role_is_idempotent() {
        assert_eq!(split_phrases("backend engineer"), vec!["backend engineer"]);
    }

    #[test]
    fn test_head_noun_repair_completes_modifiers() {
        let phrases = split_phrases("backend, frontend, and QA engineers");
        assert_eq!(
            phrases,
            vec!["backend engineer", "frontend engineer", "qa engineer"]
        );
        for phrase in &phrases {
            assert!(phrase.ends_with("engineer"), "{phrase}");
        }
    }

    #[test]
    fn test_trailing_modifier_borrows_last_seen_head() {
        assert_eq!(
            split_phrases("QA engineer, plus mobile"),
            vec!["qa engineer", "mobile engineer"]
        );
    }

    #[test]
    fn test_filler_is_stripped_from_each_segment() {
        assert_eq!(
            split_phrases("I need to hire a founding engineer and a GenAI intern"),
            vec!["founding engineer", "genai intern"]
        );
        assert_eq!(
            split_phrases("We're hiring 2 senior data scientists plus a product designer."),
            vec!["senior data scientist", "product designer"]
        );
    }

    #[test]
    fn test_long_segment_keeps_noun_phrase_tail() {
        let phrases = split_phrases(
            "Looking for someone who can own our entire cloud infrastructure platform engineer",
        );
        assert_eq!(phrases.len(), 1);
        let tokens: Vec<&str> = phrases[0].split_whitespace().collect();
        assert_eq!(tokens.len(), MAX_PHRASE_TOKENS);
        assert_eq!(tokens.last(), Some(&"engineer"));
    }

    #[test]
    fn test_duplicates_collapse_in_first_seen_order() {
        assert_eq!(
            split_phrases("designer; backend engineer; Designer!"),
            vec!["designer", "backend engineer"]
        );
    }

    #[test]
    fn test_filler_only_prompt_yields_nothing() {
        assert!(split_phrases("").is_empty());
        assert!(split_phrases("Hiring, hiring. Please help!").is_empty());
    }

    #[test]
    fn test_symbols_survive_normalization() {
        assert_eq!(split_phrases("need a C# developer"), vec!["c# developer"]);
    }

    #[tokio::test]
    async fn test_external_titles_used_verbatim_and_charged() {
        let fake = FakeExtractor::new(answered(&["Founding Engineer", "GenAI Intern"]));
        let extractor = PhraseExtractor::with_external(fake.clone());
        let mut budget = LlmBudget::new(2);

        let extraction = extractor.extract("anything", &mut budget).await;
        assert_eq!(extraction.source, PhraseSource::External);
        assert_eq!(extraction.phrases, vec!["Founding Engineer", "GenAI Intern"]);
        assert_eq!(budget.calls, 1);
        assert_eq!(budget.log[0].feature, INTAKE_EXTRACTION_FEATURE);
    }

    #[tokio::test]
    async fn test_exhausted_budget_skips_external() {
        let fake = FakeExtractor::new(answered(&["Founding Engineer"]));
        let extractor = PhraseExtractor::with_external(fake.clone());
        let mut budget = LlmBudget::new(0);

        let extraction = extractor.extract("backend engineer", &mut budget).await;
        assert_eq!(extraction.source, PhraseSource::Heuristic);
        assert_eq!(extraction.phrases, vec!["backend engineer"]);
        assert!(extraction.meta.is_none());
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_external_falls_back_without_charge() {
        let fake = FakeExtractor::new(ExtractionOutcome {
            roles: vec![],
            meta: ExtractionMeta {
                used: false,
                model: Some("test-model".to_string()),
                error: Some("HTTP error: timed out".to_string()),
            },
        });
        let extractor = PhraseExtractor::with_external(fake.clone());
        let mut budget = LlmBudget::new(3);

        let extraction = extractor.extract("a GenAI intern", &mut budget).await;
        assert_eq!(extraction.source, PhraseSource::Heuristic);
        assert_eq!(extraction.phrases, vec!["genai intern"]);
        assert_eq!(extraction.meta.unwrap().error.as_deref(), Some("HTTP error: timed out"));
        assert_eq!(budget.calls, 0);
        assert_eq!(budget.remaining(), 3);
    }

    #[tokio::test]
    async fn test_empty_external_answer_falls_back_but_is_charged() {
        let fake = FakeExtractor::new(answered(&[]));
        let extractor = PhraseExtractor::with_external(fake);
        let mut budget = LlmBudget::new(1);

        let extraction = extractor.extract("product designer", &mut budget).await;
        assert_eq!(extraction.source, PhraseSource::Heuristic);
        assert_eq!(extraction.phrases, vec!["product designer"]);
        assert_eq!(budget.remaining(), 0);
    }

    #[test]
    fn test_envelope_tolerates_missing_fields() {
        let env: RolesEnvelope =
            serde_json::from_str(r#"{"roles": [{"title": "ML Engineer"}, {"count": 2}]}"#).unwrap();
        assert_eq!(env.roles.len(), 2);
        assert!(env.roles[1].title.is_none());
    }
}
