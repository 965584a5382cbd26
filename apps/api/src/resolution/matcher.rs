//! Fuzzy Matcher: scores a phrase against every title and alias in the KB.
//!
//! Algorithm:
//! 1. Candidates are `(corpus text, record)` pairs, one per title/alias, so a strong
//!    alias hit surfaces a record whose canonical title looks nothing like the phrase.
//! 2. Each candidate is scored with a token-set ratio (0 to 100).
//! 3. The top 10 candidates are folded per role id keeping the best score.
//! 4. The folded list is ranked and cut to 3 suggestions, scores scaled into the 0.0 to 1.0 range.
//!
//! The matcher only ever classifies `unknown` or `suggest`; `match` is an operator decision.

use std::collections::BTreeSet;
use std::collections::HashMap;

use serde::Serialize;

use crate::kb::normalize::{normalize, title_case};
use crate::kb::store::KbRecord;
use crate::models::role::{RoleStatus, Suggestion};

pub const DEFAULT_THRESHOLD: u8 = 88;
const TOP_CANDIDATES: usize = 10;
const MAX_SUGGESTIONS: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    pub status: RoleStatus,
    /// The phrase echoed back in title case.
    pub title: String,
    /// Best aggregated score, 0.0 to 1.0.
    pub confidence: f64,
    /// Whether the best score reached the configured threshold. Informational only:
    /// nothing is finalized on this basis.
    pub meets_threshold: bool,
    pub suggestions: Vec<Suggestion>,
}

/// Scores `phrase` against the KB. Never fails; an empty KB yields `unknown`.
pub fn match_one(phrase: &str, kb: &[KbRecord], threshold: u8) -> MatchResult {
    let phrase = normalize(phrase);
    let title = title_case(&phrase);

    let mut scored: Vec<(f64, &KbRecord)> = kb
        .iter()
        .flat_map(|record| record.match_corpus.iter().map(move |text| (text, record)))
        .map(|(text, record)| (token_set_ratio(&phrase, text), record))
        .filter(|(score, _)| *score > 0.0)
        .collect();

    // Stable sort keeps merged-KB order among equal scores.
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.truncate(TOP_CANDIDATES);

    let mut best_by_id: Vec<(f64, &KbRecord)> = Vec::new();
    let mut slot_by_id: HashMap<&str, usize> = HashMap::new();
    for (score, record) in scored {
        match slot_by_id.get(record.id()) {
            Some(&slot) => {
                if score > best_by_id[slot].0 {
                    best_by_id[slot].0 = score;
                }
            }
            None => {
                slot_by_id.insert(record.id(), best_by_id.len());
                best_by_id.push((score, record));
            }
        }
    }
    best_by_id.sort_by(|a, b| b.0.total_cmp(&a.0));

    let suggestions: Vec<Suggestion> = best_by_id
        .into_iter()
        .take(MAX_SUGGESTIONS)
        .map(|(score, record)| Suggestion {
            role_id: record.id().to_string(),
            title: record.title().to_string(),
            score: score / 100.0,
            is_custom: record.is_custom,
            created_at: record.entry.created_at,
        })
        .collect();

    let best = suggestions.first().map(|s| s.score * 100.0).unwrap_or(0.0);
    // With no suggestions the best score is 0, below any configured threshold.
    let status = if suggestions.is_empty() {
        RoleStatus::Unknown
    } else {
        RoleStatus::Suggest
    };

    MatchResult {
        status,
        title,
        confidence: best / 100.0,
        meets_threshold: !suggestions.is_empty() && best >= f64::from(threshold),
        suggestions,
    }
}

/// Order-insensitive similarity in 0 to 100.
///
/// Tokens are split into the sorted intersection and the two sorted differences. When one
/// side's tokens are a subset of the other's the result is 100 ("engineer" vs "backend
/// engineer"); otherwise the best pairwise ratio of `sect`, `sect + diff_ab` and
/// `sect + diff_ba` wins.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let sect: Vec<&str> = tokens_a.intersection(&tokens_b).copied().collect();
    let diff_ab: Vec<&str> = tokens_a.difference(&tokens_b).copied().collect();
    let diff_ba: Vec<&str> = tokens_b.difference(&tokens_a).copied().collect();

    if !sect.is_empty() && (diff_ab.is_empty() || diff_ba.is_empty()) {
        return 100.0;
    }

    let sect = sect.join(" ");
    let combined_ab = join_nonempty(&sect, &diff_ab.join(" "));
    let combined_ba = join_nonempty(&sect, &diff_ba.join(" "));

    let mut best = ratio(&combined_ab, &combined_ba);
    if !sect.is_empty() {
        best = best
            .max(ratio(&sect, &combined_ab))
            .max(ratio(&sect, &combined_ba));
    }
    best
}

/// Indel similarity in 0 to 100: `2 * lcs / (|a| + |b|)` over chars. Substitutions
/// count as a deletion plus an insertion, so partial overlaps score higher than under
/// Levenshtein.
fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 100.0;
    }
    200.0 * lcs_len(&a, &b) as f64 / total as f64
}

/// Longest common subsequence length, one DP row at a time.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut row = vec![0usize; b.len() + 1];
    for &ca in a {
        let mut diag = 0;
        for (j, &cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == cb {
                diag + 1
            } else {
                above.max(row[j])
            };
            diag = above;
        }
    }
    row[b.len()]
}

fn join_nonempty(head: &str, tail: &str) -> String {
    match (head.is_empty(), tail.is_empty()) {
        (true, _) => tail.to_string(),
        (_, true) => head.to_string(),
        _ => format!("{head} {tail}"),
    }
}
