//! PII sanitizer
//!
//! Redacts email- and phone-like spans in evidence titles and snippets.
//! Never rejects; running it twice changes nothing.

use std::borrow::Cow;
use std::sync::LazyLock;

use fusegate_common::EvidenceItem;
use regex_lite::Regex;

use crate::{Gate, GateContext, GateVerdict};

/// A compiled redaction pattern
struct PiiPattern {
    regex: &'static LazyLock<Option<Regex>>,
    placeholder: &'static str,
}

static RE_EMAIL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}").ok());

// Separated groups (010-1234-5678, +1 415 555 0100, (02) 123-4567) or bare KR mobile
static RE_PHONE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?:\+\d{1,3}[-.\s]?)?\(?\d{2,4}\)?[-.\s]\d{3,4}[-.\s]\d{4}\b|\b01[016-9]\d{7,8}\b",
    )
    .ok()
});

// Email first so digits inside addresses are not taken for phones
static PATTERNS: [PiiPattern; 2] = [
    PiiPattern {
        regex: &RE_EMAIL,
        placeholder: "[REDACTED_EMAIL]",
    },
    PiiPattern {
        regex: &RE_PHONE,
        placeholder: "[REDACTED_PHONE]",
    },
];

#[derive(Debug, Default)]
pub struct PiiSanitizer;

impl PiiSanitizer {
    pub fn new() -> Self {
        Self
    }

    /// Redact a single string, returning the text and the number of spans replaced
    pub fn sanitize_text<'a>(&self, text: &'a str) -> (Cow<'a, str>, usize) {
        let mut current = Cow::Borrowed(text);
        let mut replaced = 0;

        for pattern in &PATTERNS {
            let Some(re) = pattern.regex.as_ref() else {
                continue;
            };
            let hits = re.find_iter(&current).count();
            if hits == 0 {
                continue;
            }
            replaced += hits;
            current = Cow::Owned(re.replace_all(&current, pattern.placeholder).into_owned());
        }

        (current, replaced)
    }

    fn sanitize_field(&self, field: &mut String) -> usize {
        let (clean, replaced) = self.sanitize_text(field);
        if replaced > 0 {
            *field = clean.into_owned();
        }
        replaced
    }
}

impl Gate for PiiSanitizer {
    fn name(&self) -> &'static str {
        "pii"
    }

    fn check(&self, _evidence: &[EvidenceItem], _ctx: &GateContext) -> GateVerdict {
        GateVerdict::pass("text sanitation")
    }

    fn sanitize(&self, evidence: &mut [EvidenceItem]) -> usize {
        evidence
            .iter_mut()
            .map(|item| {
                self.sanitize_field(&mut item.title) + self.sanitize_field(&mut item.snippet)
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacts_email_and_phone() {
        let sanitizer = PiiSanitizer::new();
        let (clean, n) = sanitizer.sanitize_text("문의: hong@example.co.kr 또는 010-1234-5678");
        assert_eq!(n, 2);
        assert_eq!(clean, "문의: [REDACTED_EMAIL] 또는 [REDACTED_PHONE]");
    }

    #[test]
    fn test_international_and_bare_mobile() {
        let sanitizer = PiiSanitizer::new();
        let (clean, n) = sanitizer.sanitize_text("Call +1 415 555 0100 or 01098765432.");
        assert_eq!(n, 2);
        assert!(!clean.contains("415"));
        assert!(!clean.contains("0109"));
    }

    #[test]
    fn test_leaves_dates_and_plain_text() {
        let sanitizer = PiiSanitizer::new();
        let text = "Released 2024-01-15, version 1.80 with 1500 ms timeout";
        let (clean, n) = sanitizer.sanitize_text(text);
        assert_eq!(n, 0);
        assert!(matches!(clean, Cow::Borrowed(_)));
    }

    #[test]
    fn test_idempotent() {
        let sanitizer = PiiSanitizer::new();
        let (once, _) = sanitizer.sanitize_text("mail a.b@c.io, tel (02) 123-4567");
        let (twice, n) = sanitizer.sanitize_text(&once);
        assert_eq!(n, 0);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_sanitizes_evidence_fields() {
        let sanitizer = PiiSanitizer::new();
        let mut evidence = vec![EvidenceItem::new("id:1", "web")
            .with_text("Contact ops@fusegate.dev", "Phone 02-555-0199 for help")];
        let n = Gate::sanitize(&sanitizer, &mut evidence);
        assert_eq!(n, 2);
        assert_eq!(evidence[0].title, "Contact [REDACTED_EMAIL]");
        assert_eq!(evidence[0].snippet, "Phone [REDACTED_PHONE] for help");
    }
}
