//! Lightweight lexical cues used to pull structure out of patient messages.
//!
//! Matching is word based: messages are lowercased and split on anything that
//! is not alphanumeric, so punctuation and spacing never hide a cue.

use super::domain::{MAX_SEVERITY, MIN_SEVERITY};

/// Recognised symptom keywords, in match-priority order.
pub const SYMPTOM_VOCABULARY: &[&str] = &[
    "headache",
    "fever",
    "cough",
    "pain",
    "nausea",
    "fatigue",
    "dizziness",
    "rash",
    "shortness of breath",
    "anxiety",
];

pub const DEFAULT_SEVERITY: u8 = 5;
pub const DEFAULT_DURATION_DAYS: u32 = 3;

const NEGATION_CUES: &[&str] = &["none", "no symptoms", "nothing"];
const AFFIRMATIVE_CUES: &[&str] = &["yes", "sure", "ok", "okay", "fine", "please"];
const DECLINE_CUES: &[&str] = &["no", "nope", "not", "don"];

const SEVERE_CUES: &[&str] = &["severe", "extreme", "terrible", "worst"];
const MODERATE_CUES: &[&str] = &["moderate", "average", "medium"];
const MILD_CUES: &[&str] = &["mild", "slight", "little"];

const NUMBER_WORDS: &[(&str, u32)] = &[
    ("one", 1),
    ("two", 2),
    ("three", 3),
    ("four", 4),
    ("five", 5),
    ("six", 6),
    ("seven", 7),
    ("eight", 8),
    ("nine", 9),
    ("ten", 10),
    ("eleven", 11),
    ("twelve", 12),
];

/// Lowercased word tokens of `text`.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

fn has_token(tokens: &[String], cue: &str) -> bool {
    tokens.iter().any(|token| token == cue)
}

fn has_phrase(tokens: &[String], phrase: &str) -> bool {
    let words: Vec<&str> = phrase.split(' ').collect();
    tokens
        .windows(words.len())
        .any(|window| window.iter().zip(&words).all(|(token, word)| token == word))
}

fn has_cue(tokens: &[String], cue: &str) -> bool {
    if cue.contains(' ') {
        has_phrase(tokens, cue)
    } else {
        has_token(tokens, cue)
    }
}

fn any_cue(tokens: &[String], cues: &[&str]) -> bool {
    cues.iter().any(|cue| has_cue(tokens, cue))
}

/// Single keywords match word prefixes so plurals ("headaches") still count.
fn mentions_keyword(tokens: &[String], keyword: &str) -> bool {
    if keyword.contains(' ') {
        has_phrase(tokens, keyword)
    } else {
        tokens.iter().any(|token| token.starts_with(keyword))
    }
}

pub fn contains_negation(text: &str) -> bool {
    any_cue(&tokenize(text), NEGATION_CUES)
}

/// An explicit decline wins over a polite "please".
pub fn is_affirmative(text: &str) -> bool {
    let tokens = tokenize(text);
    !any_cue(&tokens, DECLINE_CUES) && any_cue(&tokens, AFFIRMATIVE_CUES)
}

/// Every vocabulary keyword mentioned in `text`, in vocabulary order.
pub fn find_symptoms(text: &str) -> Vec<&'static str> {
    let tokens = tokenize(text);
    SYMPTOM_VOCABULARY
        .iter()
        .copied()
        .filter(|keyword| mentions_keyword(&tokens, keyword))
        .collect()
}

pub fn first_symptom(text: &str) -> Option<&'static str> {
    find_symptoms(text).into_iter().next()
}

fn parse_number(token: &str) -> Option<u32> {
    if token.chars().all(|c| c.is_ascii_digit()) {
        return token.parse().ok();
    }
    NUMBER_WORDS
        .iter()
        .find(|(word, _)| *word == token)
        .map(|(_, value)| *value)
}

fn unit_multiplier(token: &str) -> Option<u32> {
    match token {
        "day" | "days" => Some(1),
        "week" | "weeks" => Some(7),
        "month" | "months" => Some(30),
        _ => None,
    }
}

/// A 1-10 rating written as digits, ignoring numbers that carry a time unit.
pub fn parse_severity(text: &str) -> Option<u8> {
    let tokens = tokenize(text);
    tokens.iter().enumerate().find_map(|(index, token)| {
        if !token.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let followed_by_unit = tokens
            .get(index + 1)
            .and_then(|next| unit_multiplier(next))
            .is_some();
        if followed_by_unit {
            return None;
        }
        let value: u32 = token.parse().ok()?;
        (u32::from(MIN_SEVERITY)..=u32::from(MAX_SEVERITY))
            .contains(&value)
            .then_some(value as u8)
    })
}

/// Severity from digits, else intensity adjectives.
pub fn described_severity(text: &str) -> Option<u8> {
    if let Some(severity) = parse_severity(text) {
        return Some(severity);
    }

    let tokens = tokenize(text);
    if any_cue(&tokens, SEVERE_CUES) {
        Some(9)
    } else if any_cue(&tokens, MODERATE_CUES) {
        Some(5)
    } else if any_cue(&tokens, MILD_CUES) {
        Some(2)
    } else {
        None
    }
}

/// Severity as described, else the default of 5.
pub fn infer_severity(text: &str) -> u8 {
    described_severity(text).unwrap_or(DEFAULT_SEVERITY)
}

/// A number immediately followed by a day/week/month unit, in days.
pub fn parse_duration(text: &str) -> Option<u32> {
    let tokens = tokenize(text);
    tokens.windows(2).find_map(|pair| {
        let number = parse_number(&pair[0])?;
        let multiplier = unit_multiplier(&pair[1])?;
        Some(number.saturating_mul(multiplier))
    })
}

/// Duration from an explicit count, else recency cues.
pub fn described_duration(text: &str) -> Option<u32> {
    if let Some(days) = parse_duration(text) {
        return Some(days);
    }

    let tokens = tokenize(text);
    let mentions = |prefix: &str| tokens.iter().any(|token| token.starts_with(prefix));

    if any_cue(&tokens, &["today", "just now", "recent", "recently"]) {
        Some(1)
    } else if any_cue(&tokens, &["yesterday", "couple", "few"]) {
        Some(2)
    } else if mentions("week") {
        Some(7)
    } else if mentions("month") {
        Some(30)
    } else {
        None
    }
}

/// Duration as described, else the default of 3.
pub fn infer_duration(text: &str) -> u32 {
    described_duration(text).unwrap_or(DEFAULT_DURATION_DAYS)
}
