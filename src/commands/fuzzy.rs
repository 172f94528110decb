//! Fuzzy phrase similarity

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref SPECIAL_CHARS: Regex = Regex::new(r#"[&/\\#,+()!$~%.'":*?<>{}]"#).unwrap();
    static ref SPACE_RUNS: Regex = Regex::new(r"  +").unwrap();
}

/// Remove punctuation and pattern symbols from command text and collapse
/// runs of spaces
pub fn strip_specials(text: &str) -> String {
    let stripped = SPECIAL_CHARS.replace_all(text, "");
    SPACE_RUNS.replace_all(&stripped, " ").trim().to_string()
}

fn normalize(text: &str) -> Vec<char> {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Dice coefficient over character bigrams, ignoring whitespace and case.
///
/// Returns a value in `[0, 1]`; two empty strings and identical strings
/// score 1, and a string too short to form a bigram scores 0 against
/// anything else.
pub fn dice_coefficient(first: &str, second: &str) -> f64 {
    let first = normalize(first);
    let second = normalize(second);

    if first.is_empty() && second.is_empty() {
        return 1.0;
    }
    if first.is_empty() || second.is_empty() {
        return 0.0;
    }
    if first == second {
        return 1.0;
    }
    if first.len() < 2 || second.len() < 2 {
        return 0.0;
    }

    let mut bigrams: HashMap<(char, char), usize> = HashMap::new();
    for pair in first.windows(2) {
        *bigrams.entry((pair[0], pair[1])).or_insert(0) += 1;
    }

    let mut intersection = 0usize;
    for pair in second.windows(2) {
        if let Some(count) = bigrams.get_mut(&(pair[0], pair[1])) {
            if *count > 0 {
                *count -= 1;
                intersection += 1;
            }
        }
    }

    (2 * intersection) as f64 / (first.len() + second.len() - 2) as f64
}
