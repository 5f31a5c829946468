//! Lexical features used for query classification

use serde::Serialize;

/// Recency and web-only signals (ASCII words match whole tokens)
const WEB_KEYWORDS: &[&str] = &[
    "latest", "recent", "recently", "news", "today", "current", "currently", "now", "update",
    "updated", "release", "price", "breaking",
];

/// Hangul/CJK web signals match as substrings
const WEB_KEYWORDS_CJK: &[&str] = &[
    "최신", "최근", "업데이트", "뉴스", "오늘", "현재", "실시간", "속보",
];

/// Comparison, definition and how-to signals
const COMPLEX_KEYWORDS: &[&str] = &[
    "difference", "differences", "vs", "versus", "compare", "comparison", "why", "how",
    "explain", "define", "definition", "meaning", "pros", "cons", "tradeoff", "tradeoffs",
];

const COMPLEX_KEYWORDS_CJK: &[&str] = &[
    "뜻", "의미", "정의", "비교", "차이", "방법", "어떻게", "왜", "장단점",
];

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct QueryFeatures {
    pub token_count: usize,
    pub entity_count: usize,
    pub has_web_keyword: bool,
    pub has_complex_keyword: bool,
    pub has_question_mark: bool,
}

impl QueryFeatures {
    pub fn extract(text: &str) -> Self {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let words: Vec<String> = tokens.iter().map(|t| bare_word(t)).collect();
        let lower = text.to_lowercase();

        Self {
            token_count: tokens.len(),
            entity_count: count_entities(&tokens),
            has_web_keyword: matches_any(&words, &lower, WEB_KEYWORDS, WEB_KEYWORDS_CJK),
            has_complex_keyword: matches_any(
                &words,
                &lower,
                COMPLEX_KEYWORDS,
                COMPLEX_KEYWORDS_CJK,
            ),
            has_question_mark: text.contains('?') || text.contains('？'),
        }
    }

    /// Weighted complexity score in [0, 1]
    pub fn score(&self) -> f64 {
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        0.25 * (self.token_count as f64 / 8.0).min(1.0)
            + 0.20 * (self.entity_count as f64 / 5.0).min(1.0)
            + 0.25 * flag(self.has_complex_keyword)
            + 0.25 * flag(self.has_web_keyword)
            + 0.05 * flag(self.has_question_mark)
    }
}

/// Lowercased token without surrounding punctuation
fn bare_word(token: &str) -> String {
    token
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}

fn matches_any(words: &[String], lower: &str, ascii: &[&str], cjk: &[&str]) -> bool {
    words.iter().any(|w| ascii.contains(&w.as_str())) || cjk.iter().any(|k| lower.contains(k))
}

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{AC00}'..='\u{D7A3}'   // Hangul syllables
        | '\u{1100}'..='\u{11FF}' // Hangul jamo
        | '\u{3040}'..='\u{30FF}' // Kana
        | '\u{4E00}'..='\u{9FFF}' // CJK ideographs
    )
}

fn is_capitalized(token: &str) -> bool {
    token
        .trim_start_matches(|c: char| !c.is_alphanumeric())
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_uppercase())
}

/// Runs of two or more capitalized Latin words count once; so does every
/// token with at least two script-specific characters
fn count_entities(tokens: &[&str]) -> usize {
    let mut entities = 0;
    let mut run = 0;

    for token in tokens {
        if is_capitalized(token) {
            run += 1;
            continue;
        }
        if run >= 2 {
            entities += 1;
        }
        run = 0;
        if token.chars().filter(|c| is_cjk(*c)).count() >= 2 {
            entities += 1;
        }
    }
    if run >= 2 {
        entities += 1;
    }
    entities
}
