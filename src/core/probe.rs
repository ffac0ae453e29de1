//! Precomputed view of the next chapter's synopsis.
//!
//! Both the sanitizer and the local violation detector ask the same
//! questions of a piece of text ("how many next-chapter keywords does
//! it hit", "does it name a next-chapter role and an active action"),
//! so the next-synopsis side is tokenized once here.

use indexmap::IndexSet;

use crate::core::lexicon::{self, ACTION_FAMILIES};
use crate::core::similarity::{bigram_similarity, max_similarity};
use crate::core::text::{collect_name_tokens, extract_keywords, split_clauses};

/// Clause budget for the next synopsis
pub const NEXT_CLAUSE_LIMIT: usize = 12;
/// Keyword budget for the next synopsis
pub const NEXT_KEYWORD_LIMIT: usize = 28;
/// Name-token budget for the next synopsis
pub const NEXT_NAME_LIMIT: usize = 24;

#[derive(Debug, Clone)]
pub struct NextChapterProbe
{
    synopsis: String,
    clauses: Vec<String>,
    keywords: IndexSet<String>,
    roles: IndexSet<String>,
    active_families: Vec<&'static [&'static str]>,
}

impl NextChapterProbe
{
    /// Tokenize `next_synopsis`. `character_names` are known cast names;
    /// only those that literally appear in the next synopsis become role
    /// tokens.
    pub fn new(
        next_synopsis: &str,
        character_names: &[String],
    ) -> Self
    {
        let mut roles = collect_name_tokens(next_synopsis, NEXT_NAME_LIMIT);
        for name in character_names
        {
            let name = name.trim();
            if !name.is_empty() && next_synopsis.contains(name)
            {
                roles.insert(name.to_string());
            }
        }

        // A family is active only if one of its members is in the synopsis
        let active_families = ACTION_FAMILIES
            .iter()
            .copied()
            .filter(|family| lexicon::contains_any(next_synopsis, family))
            .collect();

        Self {
            synopsis: next_synopsis.to_string(),
            clauses: split_clauses(next_synopsis, NEXT_CLAUSE_LIMIT),
            keywords: extract_keywords(next_synopsis, NEXT_KEYWORD_LIMIT),
            roles,
            active_families,
        }
    }

    pub fn synopsis(&self) -> &str
    {
        &self.synopsis
    }

    pub fn keywords(&self) -> &IndexSet<String>
    {
        &self.keywords
    }

    pub fn roles(&self) -> &IndexSet<String>
    {
        &self.roles
    }

    /// Number of next-synopsis keywords that appear in `text`
    pub fn keyword_hits(
        &self,
        text: &str,
    ) -> usize
    {
        let lowered = text.to_lowercase();
        self.keywords
            .iter()
            .filter(|k| lowered.contains(k.as_str()))
            .count()
    }

    /// Best similarity against any next-synopsis clause
    pub fn clause_similarity(
        &self,
        text: &str,
    ) -> f64
    {
        max_similarity(text, &self.clauses)
    }

    /// Similarity against the whole next synopsis
    pub fn whole_similarity(
        &self,
        text: &str,
    ) -> f64
    {
        bigram_similarity(text, &self.synopsis)
    }

    /// True if `text` names a next-chapter role
    pub fn has_role_token(
        &self,
        text: &str,
    ) -> bool
    {
        self.roles
            .iter()
            .any(|r| text.contains(r.as_str()))
    }

    /// True if `text` contains a verb from an active action family
    pub fn has_action_token(
        &self,
        text: &str,
    ) -> bool
    {
        self.active_families
            .iter()
            .any(|family| lexicon::contains_any(text, family))
    }

    /// Role and active action together: the text narrates a next-chapter move
    pub fn has_role_action(
        &self,
        text: &str,
    ) -> bool
    {
        self.has_role_token(text) && self.has_action_token(text)
    }
}
