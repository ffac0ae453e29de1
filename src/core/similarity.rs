//! Character-bigram Dice similarity.
//!
//! The single similarity primitive shared by synopsis sanitization and
//! violation detection, so thresholds mean the same thing everywhere.

use std::collections::HashMap;

/// Punctuation stripped before comparison (whitespace is always stripped)
const STRIP_PUNCT: &[char] = &[
    '，', '。', '！', '？', '；', '：', '、', '“', '”', '‘', '’', '（', '）', '《', '》', '【', '】',
    '…', '—', '·', ',', '.', '!', '?', ';', ':', '"', '\'', '(', ')', '[', ']', '<', '>', '-', '_',
    '*', '#', '`', '~',
];

/// Lowercase and drop whitespace plus the fixed punctuation set
pub fn normalize(s: &str) -> Vec<char>
{
    s.chars()
        .flat_map(char::to_lowercase)
        .filter(|c| !c.is_whitespace() && !STRIP_PUNCT.contains(c))
        .collect()
}

fn bigrams(chars: &[char]) -> HashMap<(char, char), usize>
{
    let mut map = HashMap::with_capacity(chars.len());
    for w in chars.windows(2)
    {
        *map.entry((w[0], w[1]))
            .or_insert(0) += 1;
    }
    map
}

/// Dice coefficient over character bigrams, in `[0, 1]`.
///
/// Both empty → 1.0; exactly one empty → 0.0; either side shorter than
/// two chars → exact-equality test.
pub fn bigram_similarity(
    a: &str,
    b: &str,
) -> f64
{
    let na = normalize(a);
    let nb = normalize(b);

    match (na.is_empty(), nb.is_empty())
    {
        (true, true) => return 1.0,
        (true, false) | (false, true) => return 0.0,
        _ =>
        {}
    }

    if na.len() < 2 || nb.len() < 2
    {
        return if na == nb { 1.0 } else { 0.0 };
    }

    let ga = bigrams(&na);
    let gb = bigrams(&nb);

    // Multiset overlap keeps the measure symmetric
    let overlap: usize = ga
        .iter()
        .map(|(k, ca)| {
            gb.get(k)
                .map_or(0, |cb| (*ca).min(*cb))
        })
        .sum();

    let total = (na.len() - 1) + (nb.len() - 1);
    (2 * overlap) as f64 / total as f64
}

/// Highest similarity of `text` against any of `others` (0.0 when empty)
pub fn max_similarity<'a, I>(
    text: &str,
    others: I,
) -> f64
where
    I: IntoIterator<Item = &'a String>,
{
    others
        .into_iter()
        .map(|o| bigram_similarity(text, o))
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn edge_cases()
    {
        assert_eq!(bigram_similarity("", ""), 1.0);
        assert_eq!(bigram_similarity("abc", ""), 0.0);
        assert_eq!(bigram_similarity("", "abc"), 0.0);
        assert_eq!(bigram_similarity("a", "a"), 1.0);
        assert_eq!(bigram_similarity("a", "ab"), 0.0);
        // Punctuation-only strings normalize to empty
        assert_eq!(bigram_similarity("。！", " "), 1.0);
    }

    #[test]
    fn identical_and_disjoint()
    {
        assert_eq!(bigram_similarity("主角发现密室", "主角发现密室"), 1.0);
        assert_eq!(bigram_similarity("主角发现密室", "天空下着大雨"), 0.0);
    }

    #[test]
    fn normalization_ignores_case_space_and_punct()
    {
        assert_eq!(bigram_similarity("Hello, World", "hello world"), 1.0);
        assert_eq!(bigram_similarity("主角，发现密室。", "主角发现密室"), 1.0);
    }

    #[test]
    fn partial_overlap_value()
    {
        // 9 + 10 bigrams, 5 shared
        let s = bigram_similarity("主角在密室中找到钥匙", "主角进入密室并找到钥匙");
        assert!((s - 10.0 / 19.0).abs() < 1e-9, "got {s}");
    }

    #[test]
    fn max_similarity_over_clauses()
    {
        let clauses = vec!["天空下着大雨".to_string(), "主角发现密室".to_string()];
        assert_eq!(max_similarity("主角发现密室", &clauses), 1.0);
        assert_eq!(max_similarity("主角发现密室", &Vec::<String>::new()), 0.0);
    }
}
