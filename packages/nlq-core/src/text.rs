//! Identifier normalisation and question tokenisation.
//!
//! Physical column names and user phrasing never line up exactly, so every
//! comparison between the two goes through these helpers: `customer_name`,
//! `customerName` and `Customer Name` all normalise to `customer name`.

/// Words that never name a table, column or entity.
pub const STOP_WORDS: &[&str] = &[
    "a", "all", "an", "and", "any", "are", "as", "at", "be", "by", "can", "could", "did", "do",
    "does", "find", "for", "from", "get", "give", "has", "have", "how", "i", "in", "is", "it",
    "its", "list", "many", "me", "much", "my", "of", "on", "only", "or", "our", "please", "show",
    "tell", "that", "the", "their", "there", "these", "this", "those", "to", "was", "we", "were",
    "what", "when", "where", "which", "who", "whose", "why", "with", "you", "your",
];

/// Normalises an identifier or phrase to lowercase words separated by one space.
///
/// Splits on any non-alphanumeric separator and on camelCase boundaries.
pub fn normalize_identifier(raw: &str) -> String {
    split_words(raw).join(" ")
}

/// Normalised form with separators removed (`customer name` -> `customername`).
pub fn compact_identifier(raw: &str) -> String {
    split_words(raw).concat()
}

/// Splits an identifier or phrase into lowercase words.
pub fn split_words(raw: &str) -> Vec<String> {
    let cleaned = strip_possessives(raw);
    let chars: Vec<char> = cleaned.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            // "customerName" and the "S" in "HTTPServer"
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower) {
                words.push(std::mem::take(&mut current));
            }
        }
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Content-bearing words of a question: lowercase, stop words and short
/// tokens removed, order preserved, duplicates dropped.
pub fn question_terms(question: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for word in question_words(question) {
        if word.chars().count() > 2 && !is_stop_word(&word) && !terms.contains(&word) {
            terms.push(word);
        }
    }
    terms
}

/// All lowercase words of a question, split on whitespace and punctuation only.
///
/// Unlike [`split_words`] this does not split camelCase, so it is suitable for
/// free text.
pub fn question_words(question: &str) -> Vec<String> {
    strip_possessives(question)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

/// Returns true if `needle` occurs as a contiguous word sequence in `haystack`.
pub fn contains_words(haystack: &[String], needle: &[String]) -> bool {
    if needle.is_empty() || needle.len() > haystack.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Human-readable label for a column (`total_revenue` -> `total revenue`).
pub fn column_label(column: &str) -> String {
    let label = normalize_identifier(column);
    if label.is_empty() {
        column.to_string()
    } else {
        label
    }
}

fn strip_possessives(raw: &str) -> String {
    raw.replace("'s", "").replace("\u{2019}s", "")
}
