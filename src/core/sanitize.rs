//! Synopsis sanitization against the next chapter.
//!
//! Removes clauses of the current chapter's synopsis that already narrate
//! next-chapter events, so the planning prompt does not invite the model
//! to echo them. Never produces an empty result for non-empty input.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::probe::NextChapterProbe;
use crate::core::text::split_clauses;

/// Clause budget for the current synopsis
const CURRENT_CLAUSE_LIMIT: usize = 14;

/// Joiner for surviving clauses
const CLAUSE_JOINER: &str = "；";

/// Drop thresholds for a current-synopsis clause
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SanitizeThresholds
{
    /// Drop when clause similarity reaches this alone
    pub similarity: f64,
    /// Drop when similarity reaches this and keyword hits reach `paired_hits`
    pub paired_similarity: f64,
    pub paired_hits: usize,
    /// Drop when keyword hits reach this alone
    pub keyword_hits: usize,
}

impl Default for SanitizeThresholds
{
    fn default() -> Self
    {
        Self { similarity: 0.58, paired_similarity: 0.46, paired_hits: 2, keyword_hits: 4 }
    }
}

/// Result of [`sanitize`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SanitizedSynopsis
{
    pub sanitized: String,
    pub removed_count: usize,
}

impl SanitizedSynopsis
{
    fn unchanged(text: &str) -> Self
    {
        Self { sanitized: text.to_string(), removed_count: 0 }
    }
}

/// Sanitize with default thresholds and no known character names
pub fn sanitize(
    current: &str,
    next: &str,
) -> SanitizedSynopsis
{
    sanitize_with(current, next, &[], &SanitizeThresholds::default())
}

/// Sanitize `current` against `next`.
///
/// A clause is dropped when it is too similar to a next-synopsis clause,
/// hits too many next-synopsis keywords, or pairs a next-chapter role with
/// an active cross-chapter action. Survivors are rejoined with `；`. When
/// nothing survives the original text is returned, with `removed_count`
/// still reporting how many clauses were judged spoilers.
pub fn sanitize_with(
    current: &str,
    next: &str,
    character_names: &[String],
    th: &SanitizeThresholds,
) -> SanitizedSynopsis
{
    if current.trim().is_empty() || next.trim().is_empty()
    {
        return SanitizedSynopsis::unchanged(current);
    }

    let probe = NextChapterProbe::new(next, character_names);
    let clauses = split_clauses(current, CURRENT_CLAUSE_LIMIT);

    let mut kept = Vec::with_capacity(clauses.len());
    let mut removed = 0usize;

    for clause in &clauses
    {
        if is_spoiler_clause(&probe, clause, th)
        {
            debug!(clause = %clause, "dropping next-chapter clause from synopsis");
            removed += 1;
        }
        else
        {
            kept.push(clause.as_str());
        }
    }

    if removed == 0
    {
        return SanitizedSynopsis::unchanged(current);
    }

    if kept.is_empty()
    {
        return SanitizedSynopsis { sanitized: current.to_string(), removed_count: removed };
    }

    SanitizedSynopsis { sanitized: kept.join(CLAUSE_JOINER), removed_count: removed }
}

fn is_spoiler_clause(
    probe: &NextChapterProbe,
    clause: &str,
    th: &SanitizeThresholds,
) -> bool
{
    let hits = probe.keyword_hits(clause);
    let sim = probe.clause_similarity(clause);

    sim >= th.similarity
        || (sim >= th.paired_similarity && hits >= th.paired_hits)
        || hits >= th.keyword_hits
        || probe.has_role_action(clause)
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn empty_next_returns_input()
    {
        let out = sanitize("主角在雨夜回到老宅", "");
        assert_eq!(out, SanitizedSynopsis { sanitized: "主角在雨夜回到老宅".into(), removed_count: 0 });
    }

    #[test]
    fn empty_current_returns_input()
    {
        let out = sanitize("", "主角进入密室并找到钥匙");
        assert_eq!(out.sanitized, "");
        assert_eq!(out.removed_count, 0);
    }

    #[test]
    fn drops_clause_that_narrates_next_chapter()
    {
        let current = "主角在雨夜回到老宅，翻出父亲的旧日记；李明采访了目击者并确认了身份";
        let next = "李明采访了目击者并确认了身份，案件出现转机";
        let out = sanitize(current, next);
        assert_eq!(out.removed_count, 1);
        assert_eq!(out.sanitized, "主角在雨夜回到老宅，翻出父亲的旧日记");
    }

    #[test]
    fn role_plus_active_action_is_dropped()
    {
        let names = vec!["李明".to_string()];
        let current = "雨夜里老宅的灯一直亮着；李明连夜约见那位目击者";
        let next = "李明约见目击者，得到关键证词";
        let out = sanitize_with(current, next, &names, &SanitizeThresholds::default());
        assert_eq!(out.removed_count, 1);
        assert_eq!(out.sanitized, "雨夜里老宅的灯一直亮着");
    }

    #[test]
    fn all_dropped_falls_back_to_original()
    {
        let current = "主角进入密室并找到钥匙";
        let out = sanitize(current, "主角进入密室并找到钥匙");
        assert_eq!(out.sanitized, current);
        assert_eq!(out.removed_count, 1);
    }

    #[test]
    fn unrelated_synopsis_is_untouched()
    {
        let current = "主角在集市上结识了卖花的少女。两人约定明日再见";
        let out = sanitize(current, "北方边境爆发战事，援军迟迟未到");
        assert_eq!(out.sanitized, current);
        assert_eq!(out.removed_count, 0);
    }
}
