// Knowledge base: the merged role catalog and its template files.

pub mod handlers;
pub mod normalize;
pub mod store;
pub mod template;
pub mod writer;

#[cfg(test)]
pub(crate) mod test_support {
    use super::normalize::normalize;
    use super::store::{KbEntry, KbRecord};

    /// Builds an augmented record without touching disk.
    pub fn record(id: &str, title: &str, aliases: &[&str], is_custom: bool) -> KbRecord {
        let norm_title = normalize(title);
        let norm_aliases: Vec<String> = aliases.iter().map(|a| normalize(a)).collect();
        let mut match_corpus = vec![norm_title.clone()];
        match_corpus.extend(norm_aliases.iter().cloned());
        KbRecord {
            entry: KbEntry {
                id: id.to_string(),
                title: title.to_string(),
                aliases: aliases.iter().map(|a| a.to_string()).collect(),
                file: format!("data/role_knowledge/{id}.json"),
                function: Some("Engineering".to_string()),
                seniority: None,
                approved: !is_custom,
                created_at: None,
            },
            norm_title,
            norm_aliases,
            match_corpus,
            is_custom,
        }
    }
}
