//! Factual containment: a generated text may not state a fact that none of its
//! sources state.
//!
//! A "fact" here is a number (digits or spelled out), a capitalized name or
//! acronym, or a concrete entity noun (document, tool, or artifact type).
//! Capitalized words are candidates wherever they sit in a sentence, so a
//! sentence-opening word the sources never use is reported too.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::agents::rubric::RubricComponent;
use crate::embeddings::tokenize;

static RUBRIC_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:situation|task|action|result)\s*:").expect("invalid label pattern")
});

/// Capitalized words that open ordinary sentences and never name anything.
const FUNCTION_WORDS: &[&str] = &[
    "a", "additionally", "after", "again", "all", "also", "although", "an", "and", "another",
    "as", "at", "because", "before", "both", "but", "by", "during", "each", "eventually",
    "every", "finally", "first", "for", "from", "he", "her", "here", "his", "how", "however",
    "if", "in", "initially", "instead", "into", "it", "its", "last", "later", "many", "meanwhile",
    "more", "most", "much", "my", "next", "no", "not", "now", "of", "on", "once", "or", "other",
    "our", "over", "overall", "previously", "recently", "second", "several", "she", "since", "so",
    "some", "that", "the", "their", "then", "there", "therefore", "these", "they", "this",
    "those", "though", "through", "to", "together", "under", "until", "us", "we", "what", "when",
    "where", "which", "while", "who", "why", "with", "within", "without", "yes", "yet", "you",
];

const UNIT_WORDS: &[&str] = &[
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen",
    "nineteen",
];

const TENS_WORDS: &[&str] = &[
    "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
];

/// Entity nouns the Coach must never introduce. Singular, lowercase.
const ENTITY_NOUNS: &[&str] = &[
    "audit trail",
    "balance sheet",
    "bank statement",
    "budget",
    "cash flow statement",
    "contract",
    "crm",
    "dashboard",
    "database",
    "expense report",
    "forecast",
    "general ledger",
    "income statement",
    "invoice",
    "journal entry",
    "ledger",
    "memo",
    "payroll",
    "pivot table",
    "presentation",
    "purchase order",
    "receipt",
    "report",
    "script",
    "slide deck",
    "spreadsheet",
    "tax return",
    "ticket",
    "trial balance",
    "vendor statement",
    "working paper",
];

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Fact {
    Number(String),
    ProperNoun(String),
    EntityNoun(String),
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fact::Number(v) | Fact::ProperNoun(v) | Fact::EntityNoun(v) => write!(f, "{v}"),
        }
    }
}

/// Singular form for matching: "invoices" → "invoice", "entries" → "entry".
pub fn fold_plural(word: &str) -> String {
    if word.len() > 4 && word.ends_with("ies") {
        format!("{}y", &word[..word.len() - 3])
    } else if word.len() > 3 && word.ends_with('s') && !word.ends_with("ss") {
        word[..word.len() - 1].to_string()
    } else {
        word.to_string()
    }
}

/// Drops markdown emphasis and "Situation:"-style rubric labels.
fn strip_markdown(text: &str) -> String {
    let plain: String = text
        .chars()
        .map(|c| if matches!(c, '*' | '_' | '#' | '`') { ' ' } else { c })
        .collect();
    RUBRIC_LABEL.replace_all(&plain, " ").into_owned()
}

/// Digits plus decimal point, with thousands separators and units removed.
fn normalize_number(token: &str) -> Option<String> {
    if !token.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    let digits: String = token
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let digits = digits.trim_matches('.');
    (!digits.is_empty()).then(|| digits.to_string())
}

fn is_rubric_label(word: &str) -> bool {
    RubricComponent::ALL
        .iter()
        .any(|c| c.label().eq_ignore_ascii_case(word))
}

fn is_acronym(word: &str) -> bool {
    word.chars().count() >= 2
        && word.chars().any(|c| c.is_ascii_uppercase())
        && word.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

/// Value of a number word, or how it scales the running value.
enum NumberWord {
    Value(u64),
    Scale(u64),
    Hundred,
}

fn number_word(word: &str) -> Option<NumberWord> {
    if let Some(i) = UNIT_WORDS.iter().position(|w| *w == word) {
        return Some(NumberWord::Value(i as u64));
    }
    if let Some(i) = TENS_WORDS.iter().position(|w| *w == word) {
        return Some(NumberWord::Value(20 + 10 * i as u64));
    }
    match word {
        "dozen" => Some(NumberWord::Scale(12)),
        "hundred" => Some(NumberWord::Hundred),
        "thousand" => Some(NumberWord::Scale(1_000)),
        "million" => Some(NumberWord::Scale(1_000_000)),
        "billion" => Some(NumberWord::Scale(1_000_000_000)),
        _ => None,
    }
}

/// Runs of number words read as one value: "eighty five" → 85,
/// "two thousand" → 2000. A lone "one" is a pronoun more often than a count
/// and is not reported.
fn spelled_numbers(text: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut run_len = 0;
    let mut lone_one = false;
    let (mut total, mut current) = (0u64, 0u64);

    for word in tokenize(text).iter().map(String::as_str).chain(std::iter::once("")) {
        match number_word(word) {
            Some(NumberWord::Value(v)) => current += v,
            Some(NumberWord::Hundred) => current = current.max(1) * 100,
            Some(NumberWord::Scale(scale)) => {
                total += current.max(1) * scale;
                current = 0;
            }
            None => {
                if run_len > 0 && !(run_len == 1 && lone_one) {
                    found.push((total + current).to_string());
                }
                run_len = 0;
                total = 0;
                current = 0;
                continue;
            }
        }
        lone_one = run_len == 0 && word == "one";
        run_len += 1;
    }
    found
}

fn numbers(text: &str) -> BTreeSet<String> {
    let mut found: BTreeSet<String> = text.split_whitespace().filter_map(normalize_number).collect();
    found.extend(spelled_numbers(text));
    found
}

fn proper_nouns(text: &str) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    for raw in text.split_whitespace() {
        let word = raw.trim_matches(|c: char| !c.is_alphanumeric());
        // "Deloitte's" names Deloitte
        let word = word.split(['\'', '\u{2019}']).next().unwrap_or(word);
        if word.is_empty() || word == "I" || is_rubric_label(word) {
            continue;
        }
        if is_acronym(word) {
            found.insert(word.to_lowercase());
            continue;
        }
        let capitalized = word.chars().next().is_some_and(char::is_uppercase);
        let lower = word.to_lowercase();
        if capitalized
            && !FUNCTION_WORDS.contains(&lower.as_str())
            && number_word(&lower).is_none()
        {
            found.insert(lower);
        }
    }
    found
}

fn entity_nouns(text: &str) -> BTreeSet<String> {
    let words: Vec<String> = tokenize(text).iter().map(|w| fold_plural(w)).collect();
    let mut found = BTreeSet::new();
    for i in 0..words.len() {
        for len in 1..=3 {
            if i + len > words.len() {
                break;
            }
            let phrase = words[i..i + len].join(" ");
            if ENTITY_NOUNS.contains(&phrase.as_str()) {
                found.insert(phrase);
            }
        }
    }
    found
}

/// Every fact stated in `text`.
pub fn extract_facts(text: &str) -> BTreeSet<Fact> {
    let text = strip_markdown(text);
    let mut facts: BTreeSet<Fact> = numbers(&text).into_iter().map(Fact::Number).collect();
    facts.extend(proper_nouns(&text).into_iter().map(Fact::ProperNoun));
    facts.extend(entity_nouns(&text).into_iter().map(Fact::EntityNoun));
    facts
}

/// Facts in `candidate` that appear in none of `sources`.
/// Proper nouns match any source word case-insensitively, wherever it sits in
/// the sentence; numbers and entity nouns must match a source fact of the same kind.
pub fn untraceable_facts<S: AsRef<str>>(candidate: &str, sources: &[S]) -> Vec<Fact> {
    let mut source_numbers = HashSet::new();
    let mut source_words = HashSet::new();
    let mut source_entities = HashSet::new();
    for source in sources {
        let source = strip_markdown(source.as_ref());
        source_numbers.extend(numbers(&source));
        source_words.extend(tokenize(&source));
        source_entities.extend(entity_nouns(&source));
    }

    extract_facts(candidate)
        .into_iter()
        .filter(|fact| match fact {
            Fact::Number(n) => !source_numbers.contains(n),
            Fact::ProperNoun(p) => !source_words.contains(p),
            Fact::EntityNoun(e) => !source_entities.contains(e),
        })
        .collect()
}
