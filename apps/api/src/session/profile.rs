//! Profile extraction: raw resume text → redacted skill mentions and snippets.
//!
//! Redaction runs before anything is stored, so PII never reaches the agents
//! or the generation capability.

use std::collections::HashSet;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::session::models::Profile;

const MIN_SNIPPET_CHARS: usize = 3;
const HEADER_NAME_MAX_CHARS: usize = 30;

struct Redaction {
    pattern: Regex,
    replacement: &'static str,
}

fn redaction(pattern: &str, replacement: &'static str) -> Redaction {
    Redaction {
        // Patterns are compile-time literals covered by tests.
        pattern: Regex::new(pattern).expect("invalid redaction pattern"),
        replacement,
    }
}

// Order matters: labelled and long-form patterns run before bare digit runs.
static REDACTIONS: Lazy<Vec<Redaction>> = Lazy::new(|| {
    vec![
        redaction(r"(?i)\b[STFG]\d{7}[A-Z]\b", "[NRIC_REDACTED]"),
        redaction(
            r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
            "[EMAIL_REDACTED]",
        ),
        redaction(
            r"(?i)(?:https?://)?(?:www\.)?(?:linkedin\.com|github\.com)/[\w\-./]+",
            "[LINK_REDACTED]",
        ),
        redaction(
            r"(?im)\b(?:date of birth|dob|born)\b\s*[:\-]?[^\n]*",
            "[DOB_REDACTED]",
        ),
        redaction(
            r"(?i)\b(?:race|religion|nationality|marital status|gender)\s*[:\-]\s*\w+",
            "[DEMOGRAPHIC_REDACTED]",
        ),
        redaction(
            r"(?i)\b(account|a/c|acc|posb|dbs|ocbc|uob)\W{0,3}\d[\d\s-]{5,14}\d",
            "$1 [BANK_ACCT_REDACTED]",
        ),
        redaction(r"\b\d(?:[ -]?\d){12,18}\b", "[CREDIT_CARD_REDACTED]"),
        redaction(
            r"\+\d{1,3}[\s-]?(?:\(\d+\)[\s-]?)?\d[\d\s-]{6,}\d",
            "[PHONE_REDACTED]",
        ),
        redaction(r"\b[689]\d{3}[- ]?\d{4}\b", "[PHONE_REDACTED]"),
        redaction(r"(?i)\bsingapore\s*\d{6}\b", "[POSTAL_CODE]"),
        redaction(r"\b\d{6}\b", "[POSTAL_CODE]"),
        redaction(r"#\d{1,4}-\d{1,5}", "[UNIT_NO]"),
        redaction(r"(?i)\b(?:blk|block)\s*\d+[A-Za-z]?\b", "[BLOCK_NO]"),
        redaction(
            r"((?i:name|candidate)):\s*[A-Z][a-z]+ [A-Z][a-z]+",
            "$1: [NAME_REDACTED]",
        ),
        redaction(r"(?i)(?:SGD|S\$|\$)\s?\d[\d,]*(?:\.\d{2})?", "[MONEY_REDACTED]"),
    ]
});

static HEADER_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z .]+$").expect("invalid header pattern"));

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[A-Z_]+\]").expect("invalid placeholder pattern"));

static SKILLS_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:technical\s+|key\s+|core\s+)?skills\s*[:\-]\s*(.*)$")
        .expect("invalid skills pattern")
});

static SKILLS_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:technical\s+|key\s+|core\s+)?skills\s*:?$").expect("invalid skills pattern")
});

/// Removes contact details, identifiers, demographics, and financial numbers.
/// The first non-empty line is treated as the candidate's name when it is
/// short and purely alphabetic.
pub fn redact_pii(text: &str) -> String {
    let mut out = text.to_string();
    for r in REDACTIONS.iter() {
        out = r.pattern.replace_all(&out, r.replacement).into_owned();
    }

    let mut lines: Vec<String> = out.lines().map(str::to_string).collect();
    if let Some(first) = lines.iter_mut().find(|l| !l.trim().is_empty()) {
        let trimmed = first.trim();
        if trimmed.chars().count() < HEADER_NAME_MAX_CHARS && HEADER_NAME.is_match(trimmed) {
            *first = "[NAME_REDACTED_HEADER]".to_string();
        }
    }
    lines.join("\n")
}

/// Builds a `Profile` from raw extracted document text.
pub fn extract_profile(raw_text: &str) -> Profile {
    let redacted = redact_pii(raw_text);

    let mut skills = Vec::new();
    let mut snippets = Vec::new();
    let mut seen_skills = HashSet::new();
    let mut seen_snippets = HashSet::new();
    let mut in_skills_block = false;

    for line in redacted.lines() {
        let line = collapse_whitespace(strip_bullet(line.trim()));
        if line.is_empty() {
            in_skills_block = false;
            continue;
        }
        if is_redaction_residue(&line) {
            continue;
        }

        if SKILLS_HEADER.is_match(&line) {
            in_skills_block = true;
            continue;
        }
        if let Some(caps) = SKILLS_LABEL.captures(&line) {
            push_skills(&caps[1], &mut skills, &mut seen_skills);
            continue;
        }
        if in_skills_block && looks_like_list(&line) {
            push_skills(&line, &mut skills, &mut seen_skills);
            continue;
        }
        in_skills_block = false;

        for sentence in split_sentences(&line) {
            if sentence.chars().count() >= MIN_SNIPPET_CHARS
                && seen_snippets.insert(sentence.to_lowercase())
            {
                snippets.push(sentence);
            }
        }
    }

    Profile {
        skill_mentions: skills,
        snippets,
        set_at: Some(Utc::now()),
    }
}

/// Splits on sentence-ending punctuation followed by whitespace.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') && chars.peek().map_or(true, |n| n.is_whitespace()) {
            let s = current.trim();
            if !s.is_empty() {
                sentences.push(s.to_string());
            }
            current.clear();
        }
    }
    let s = current.trim();
    if !s.is_empty() {
        sentences.push(s.to_string());
    }
    sentences
}

fn push_skills(list: &str, skills: &mut Vec<String>, seen: &mut HashSet<String>) {
    for item in list.split([',', ';', '|', '•', '/']) {
        let item = item.trim().trim_end_matches('.').trim();
        if !item.is_empty() && seen.insert(item.to_lowercase()) {
            skills.push(item.to_string());
        }
    }
}

fn looks_like_list(line: &str) -> bool {
    line.contains([',', ';', '|', '•']) || line.split_whitespace().count() <= 3
}

fn strip_bullet(line: &str) -> &str {
    line.trim_start_matches(['-', '*', '•', '·', '▪'])
        .trim_start()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// True for lines that carry nothing but placeholders and field labels,
/// e.g. `Email: [EMAIL_REDACTED] | Phone: [PHONE_REDACTED]`.
fn is_redaction_residue(line: &str) -> bool {
    if !PLACEHOLDER.is_match(line) {
        return false;
    }
    let rest = PLACEHOLDER.replace_all(line, " ");
    !rest
        .split_whitespace()
        .any(|w| w.chars().any(char::is_alphabetic) && !w.ends_with(':'))
}
