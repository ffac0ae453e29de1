//! Clause splitting, keyword extraction and name-token collection over
//! short narrative text blocks.
//!
//! All functions are pure and infallible: malformed or empty input
//! yields empty containers.
//!
//! Segmentation works on maximal runs of CJK ideographs or other
//! alphanumerics. Inside a CJK run, lexicon verbs are isolated first
//! (leftmost-longest) and the remaining stretches are cut at function
//! characters such as `的` `了` `并`.

use std::sync::LazyLock;

use aho_corasick::{AhoCorasick, MatchKind};
use indexmap::IndexSet;
use regex::Regex;

use crate::core::lexicon::{self, FUNCTION_CHARS, NAME_STOPLIST, STOPWORDS};

/// Clause delimiters (full-width and half-width)
const CLAUSE_DELIMS: &[char] = &['。', '！', '？', '；', ';', '\n'];

/// Clauses shorter than this are noise ("然后", "忽然间")
const MIN_CLAUSE_CHARS: usize = 6;

/// Keyword length bounds (in chars, inclusive)
const KEYWORD_MIN_CHARS: usize = 2;
const KEYWORD_MAX_CHARS: usize = 12;

static RUN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\p{Han}+|[[\p{Alphabetic}\p{Nd}]--\p{Han}]+").expect("static run pattern")
});

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\p{Han}{2,6}").expect("static name pattern"));

static LEXICON: LazyLock<AhoCorasick> = LazyLock::new(|| {
    AhoCorasick::builder()
        .match_kind(MatchKind::LeftmostLongest)
        .build(lexicon::isolated_words())
        .expect("static lexicon patterns")
});

/// One token produced by [`segment`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment
{
    pub text: String,
    /// True when the token is an isolated lexicon verb
    pub lexicon: bool,
    /// True when the token came from a CJK run
    pub han: bool,
}

/// Number of Unicode scalar values in `s`
pub fn char_len(s: &str) -> usize
{
    s.chars()
        .count()
}

/// Clip `s` to at most `max` chars (char-boundary safe)
pub fn clip_chars(
    s: &str,
    max: usize,
) -> String
{
    s.chars()
        .take(max)
        .collect()
}

/// Split text into tokens (lowercased)
pub fn segment(text: &str) -> Vec<Segment>
{
    let lowered = text.to_lowercase();
    let mut out = Vec::new();

    for run in RUN_RE.find_iter(&lowered)
    {
        let run = run.as_str();
        let han = run
            .chars()
            .next()
            .is_some_and(is_han);

        if !han
        {
            out.push(Segment { text: run.to_string(), lexicon: false, han: false });
            continue;
        }

        // Isolate lexicon verbs, then cut what is left at function chars
        let mut cursor = 0;
        for hit in LEXICON.find_iter(run)
        {
            push_plain(&run[cursor..hit.start()], &mut out);
            out.push(Segment {
                text: run[hit.start()..hit.end()].to_string(),
                lexicon: true,
                han: true,
            });
            cursor = hit.end();
        }
        push_plain(&run[cursor..], &mut out);
    }

    out
}

fn push_plain(
    stretch: &str,
    out: &mut Vec<Segment>,
)
{
    for piece in stretch.split(FUNCTION_CHARS)
    {
        if !piece.is_empty()
        {
            out.push(Segment { text: piece.to_string(), lexicon: false, han: true });
        }
    }
}

fn is_han(c: char) -> bool
{
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{F900}'..='\u{FAFF}'
        | '\u{20000}'..='\u{2FA1F}')
}

/// Split on `。！？；;\n`, trim, drop clauses under 6 chars, keep the
/// first `limit`.
pub fn split_clauses(
    text: &str,
    limit: usize,
) -> Vec<String>
{
    text.split(CLAUSE_DELIMS)
        .map(str::trim)
        .filter(|c| char_len(c) >= MIN_CLAUSE_CHARS)
        .take(limit)
        .map(str::to_string)
        .collect()
}

/// Keywords of 2–12 chars, stopwords removed, first-seen order.
pub fn extract_keywords(
    text: &str,
    limit: usize,
) -> IndexSet<String>
{
    let mut out = IndexSet::new();

    for seg in segment(text)
    {
        if out.len() >= limit
        {
            break;
        }

        let n = char_len(&seg.text);
        if !(KEYWORD_MIN_CHARS..=KEYWORD_MAX_CHARS).contains(&n)
        {
            continue;
        }
        if STOPWORDS.contains(&seg.text.as_str())
        {
            continue;
        }

        out.insert(seg.text);
    }

    out
}

/// Candidate character names: CJK runs of 2–6 chars outside the
/// lexicon and the narrative-noun stoplist.
pub fn collect_name_tokens(
    text: &str,
    limit: usize,
) -> IndexSet<String>
{
    let mut out = IndexSet::new();

    for seg in segment(text)
        .into_iter()
        .filter(|s| s.han && !s.lexicon)
    {
        for m in NAME_RE.find_iter(&seg.text)
        {
            if out.len() >= limit
            {
                return out;
            }

            let tok = m.as_str();
            if NAME_STOPLIST.contains(&tok) || STOPWORDS.contains(&tok)
            {
                continue;
            }

            out.insert(tok.to_string());
        }
    }

    out
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn texts(segs: &[Segment]) -> Vec<&str>
    {
        segs.iter()
            .map(|s| s.text.as_str())
            .collect()
    }

    #[test]
    fn segment_isolates_verbs_and_drops_particles()
    {
        let segs = segment("李明采访了目击者并确认了身份");
        assert_eq!(texts(&segs), vec!["李明", "采访", "目击者", "确认", "身份"]);
        assert!(segs[1].lexicon);
        assert!(!segs[0].lexicon);
    }

    #[test]
    fn segment_keeps_ascii_runs_lowercased()
    {
        let segs = segment("Alice 进入 Tower-7");
        assert_eq!(texts(&segs), vec!["alice", "进入", "tower", "7"]);
        assert!(!segs[0].han);
    }

    #[test]
    fn split_clauses_drops_short_and_truncates()
    {
        let text = "主角在雨夜回到老宅。然后！他发现门锁被人撬开；邻居说昨晚听见争吵\n短句";
        let clauses = split_clauses(text, 8);
        assert_eq!(clauses, vec!["主角在雨夜回到老宅", "他发现门锁被人撬开", "邻居说昨晚听见争吵"]);

        let capped = split_clauses(text, 1);
        assert_eq!(capped.len(), 1);
    }

    #[test]
    fn keywords_skip_stopwords_and_respect_limit()
    {
        let kws = extract_keywords("然后，李明采访了目击者", 10);
        assert!(!kws.contains("然后"));
        assert!(kws.contains("李明"));
        assert!(kws.contains("采访"));

        let capped = extract_keywords("李明采访了目击者并确认了身份", 2);
        assert_eq!(capped.len(), 2);
    }

    #[test]
    fn name_tokens_exclude_verbs_and_stoplist()
    {
        let names = collect_name_tokens("李明采访了目击者并确认了身份", 10);
        assert!(names.contains("李明"));
        assert!(names.contains("目击者"));
        assert!(!names.contains("采访"));
        assert!(!names.contains("身份"));
    }

    #[test]
    fn empty_inputs_give_empty_outputs()
    {
        assert!(split_clauses("", 8).is_empty());
        assert!(extract_keywords("", 8).is_empty());
        assert!(collect_name_tokens("。。！", 8).is_empty());
    }

    #[test]
    fn clip_is_char_safe()
    {
        assert_eq!(clip_chars("主角发现密室", 2), "主角");
        assert_eq!(char_len("主角"), 2);
    }
}
