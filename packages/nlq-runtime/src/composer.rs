//! Turns a result set into a short natural-language answer.
//!
//! Deterministic extraction is tried first. Only when it cannot produce a
//! confident answer is the language model asked, and if that fails too a
//! templated summary is returned. Composition never fails.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use nlq_core::result::{as_number, display_value, format_float};
use nlq_core::text::{self, column_label};
use nlq_core::{LanguageModel, ResultSet, Row};
use serde::Serialize;
use serde_json::Value;

use crate::translator::TranslationResult;

/// Distinct values listed before the rest is summarised as "and N more".
const MAX_LISTED_VALUES: usize = 10;

const COUNT_WORDS: &[&str] = &["count", "total", "num", "number", "of", "cnt"];
/// Column words that mark a numeric column as holding a count.
const COUNT_COLUMN_WORDS: &[&str] = &["count", "cnt", "num", "total"];
const AVERAGE_WORDS: &[&str] = &["avg", "average", "mean"];
const SUM_WORDS: &[&str] = &["sum", "total"];
const MAX_WORDS: &[&str] = &["max", "maximum", "highest", "largest", "biggest", "top"];
const MIN_WORDS: &[&str] = &["min", "minimum", "lowest", "smallest", "least"];

/// How a summary was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositionMethod {
    /// Read directly from the result set
    Deterministic,
    /// Written by the language model
    Model,
    /// Generic row/column description after the model failed
    Template,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composition {
    pub summary: String,
    pub method: CompositionMethod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Aggregate {
    Count,
    Average,
    Sum,
    Max,
    Min,
}

impl Aggregate {
    fn detect(question: &str, words: &[String], result: &ResultSet) -> Option<Self> {
        let has = |w: &str| words.iter().any(|x| x == w);
        let lowered = question.to_lowercase();
        // "number of" is also how lookups of number-like fields read
        let counted_number = lowered.contains("number of") && count_column(result).is_some();
        if has("count") || lowered.contains("how many") || counted_number {
            Some(Aggregate::Count)
        } else if AVERAGE_WORDS.iter().any(|w| has(w)) {
            Some(Aggregate::Average)
        } else if MAX_WORDS.iter().any(|w| has(w)) {
            Some(Aggregate::Max)
        } else if MIN_WORDS.iter().any(|w| has(w)) {
            Some(Aggregate::Min)
        } else if SUM_WORDS.iter().any(|w| has(w)) {
            Some(Aggregate::Sum)
        } else {
            None
        }
    }
}

pub struct AnswerComposer {
    model: Option<Arc<dyn LanguageModel>>,
    model_timeout: Duration,
    max_prompt_rows: usize,
}

impl AnswerComposer {
    pub fn new(model: Option<Arc<dyn LanguageModel>>, model_timeout: Duration, max_prompt_rows: usize) -> Self {
        Self {
            model,
            model_timeout,
            max_prompt_rows,
        }
    }

    /// Produces a non-empty summary for any result set.
    pub async fn compose(
        &self,
        question: &str,
        translation: &TranslationResult,
        result: &ResultSet,
    ) -> Composition {
        if let Some(summary) = extract_answer(question, translation, result) {
            tracing::debug!("Deterministic answer: {}", summary);
            return Composition {
                summary,
                method: CompositionMethod::Deterministic,
            };
        }

        if let Some(summary) = self.summarize_with_model(question, translation, result).await {
            return Composition {
                summary,
                method: CompositionMethod::Model,
            };
        }

        let summary = template_summary(result);
        tracing::info!("Composer degraded to template summary: {}", summary);
        Composition {
            summary,
            method: CompositionMethod::Template,
        }
    }

    async fn summarize_with_model(
        &self,
        question: &str,
        translation: &TranslationResult,
        result: &ResultSet,
    ) -> Option<String> {
        let model = self.model.as_ref()?;
        let prompt = summary_prompt(question, &translation.query_text, result, self.max_prompt_rows);

        match tokio::time::timeout(self.model_timeout, model.generate(&prompt)).await {
            Ok(Ok(text)) => {
                let trimmed = text.trim();
                let summary = trimmed
                    .strip_prefix("ANSWER:")
                    .or_else(|| trimmed.strip_prefix("Answer:"))
                    .unwrap_or(trimmed)
                    .trim();
                if summary.is_empty() {
                    tracing::debug!("Model returned an empty summary");
                    None
                } else {
                    Some(summary.to_string())
                }
            }
            Ok(Err(e)) => {
                tracing::debug!("Summary model call failed: {}", e);
                None
            }
            Err(_) => {
                tracing::debug!(
                    "Summary model call timed out after {} ms",
                    self.model_timeout.as_millis()
                );
                None
            }
        }
    }
}

/// Generic, truthful description of a result set.
pub fn template_summary(result: &ResultSet) -> String {
    if result.is_empty() {
        return "No matching data found.".to_string();
    }
    let rows = result.row_count();
    let columns = result.columns.len();
    let mut summary = format!(
        "The query returned {} row{} across {} column{}.",
        rows,
        if rows == 1 { "" } else { "s" },
        columns,
        if columns == 1 { "" } else { "s" }
    );
    if result.truncated {
        summary.push_str(" Results were capped at the row limit.");
    }
    summary
}

/// Renders the fallback prompt: question, SQL and up to `max_rows` rows.
pub fn summary_prompt(question: &str, sql: &str, result: &ResultSet, max_rows: usize) -> String {
    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "You are a precise data analyst. Answer the question using the EXACT values in the data."
    );
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "QUESTION: \"{}\"", question);
    let _ = writeln!(prompt, "SQL: {}", sql);
    let _ = writeln!(prompt, "DATA ({} rows):", result.row_count());
    if result.is_empty() {
        let _ = writeln!(prompt, "(no rows)");
    } else {
        let _ = writeln!(prompt, "Columns: {}", result.columns.join(", "));
    }
    for (i, row) in result.rows.iter().take(max_rows).enumerate() {
        let cells: Vec<String> = result
            .columns
            .iter()
            .map(|c| format!("{}={}", c, row.get(c).map(display_value).unwrap_or_default()))
            .collect();
        let _ = writeln!(prompt, "Row {}: {}", i + 1, cells.join(", "));
    }
    if result.row_count() > max_rows {
        let _ = writeln!(
            prompt,
            "[Showing the first {} of {} rows]",
            max_rows,
            result.row_count()
        );
    }
    let _ = writeln!(prompt);
    let _ = writeln!(
        prompt,
        "Reply with one to three sentences. If there are no rows, say that no matching data was found."
    );
    let _ = writeln!(prompt);
    prompt.push_str("ANSWER:");
    prompt
}

/// Deterministic extraction. Returns `None` when no confident answer exists.
pub fn extract_answer(question: &str, translation: &TranslationResult, result: &ResultSet) -> Option<String> {
    if result.is_empty() || result.columns.is_empty() {
        return None;
    }

    let words = text::question_words(question);
    let requested = requested_columns(question, &result.columns);
    let aggregate = Aggregate::detect(question, &words, result);

    match aggregate {
        Some(Aggregate::Count) => {
            if let Some(answer) = count_answer(translation, result) {
                return Some(answer);
            }
        }
        // A ranked list is summarised by the model rather than cut to one row
        Some(Aggregate::Max) if asks_for_ranking(&words) && result.row_count() > 1 => return None,
        Some(Aggregate::Max) | Some(Aggregate::Min) => {
            if let Some(answer) = extremum(aggregate == Some(Aggregate::Max), &requested, result) {
                return Some(answer);
            }
        }
        Some(kind) if result.row_count() == 1 => {
            if let Some(answer) = single_aggregate(kind, &requested, result) {
                return Some(answer);
            }
        }
        _ => {}
    }

    let names = mentioned_names(question, &result.columns);
    if let Some(answer) = entity_lookup(&names, &requested, result) {
        return Some(answer);
    }

    if result.row_count() == 1 {
        return single_row(&requested, result);
    }

    if names.is_empty() {
        if let Some(column) = requested.first() {
            return list_values(column, result);
        }
    }
    None
}

/// Result columns the question refers to, strongest match first.
///
/// A column whose full word sequence appears in the question outranks one
/// that merely shares a word with it.
fn requested_columns(question: &str, columns: &[String]) -> Vec<String> {
    let words = text::question_words(question);
    let terms = text::question_terms(question);
    let compact_question: String = words.concat();

    let mut scored: Vec<(usize, &String)> = columns
        .iter()
        .filter_map(|column| {
            let column_words = text::split_words(column);
            if column_words.is_empty() {
                return None;
            }
            let compact = column_words.concat();
            let score = if text::contains_words(&words, &column_words)
                || (compact.len() > 3 && compact_question.contains(&compact))
            {
                3
            } else {
                terms
                    .iter()
                    .filter(|t| column_words.iter().any(|w| w == *t || w == singular(t)))
                    .count()
            };
            (score > 0).then_some((score, column))
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().map(|(_, c)| c.clone()).collect()
}

fn singular(term: &str) -> &str {
    if term.len() > 3 && term.ends_with('s') && !term.ends_with("ss") {
        &term[..term.len() - 1]
    } else {
        term
    }
}

fn is_id_column(column: &str) -> bool {
    text::split_words(column).last().is_some_and(|w| w == "id")
}

fn is_name_column(column: &str) -> bool {
    let words = text::split_words(column);
    words.iter().any(|w| w == "name") && !is_id_column(column)
}

/// Label for an aggregate column with its aggregate words removed.
fn subject_of(column: &str, strip: &[&str]) -> Option<String> {
    let remaining: Vec<String> = text::split_words(column)
        .into_iter()
        .filter(|w| !strip.contains(&w.as_str()))
        .collect();
    if remaining.is_empty() {
        None
    } else {
        Some(remaining.join(" "))
    }
}

fn numeric_column(requested: &[String], result: &ResultSet) -> Option<String> {
    requested
        .iter()
        .find(|c| result.is_numeric_column(c))
        .or_else(|| result.columns.iter().find(|c| result.is_numeric_column(c)))
        .cloned()
}

/// `f0_` (BigQuery) or `count(*)` (DataFusion) style names for unaliased
/// expressions.
fn is_anonymous_column(column: &str) -> bool {
    let anonymous_field = column
        .strip_prefix('f')
        .and_then(|rest| rest.strip_suffix('_'))
        .is_some_and(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()));
    anonymous_field || column.contains('(')
}

fn is_count_column(column: &str) -> bool {
    text::split_words(column)
        .iter()
        .any(|w| COUNT_COLUMN_WORDS.contains(&w.as_str()))
}

/// Numeric column holding a count, either by name or as an unaliased expression.
fn count_column(result: &ResultSet) -> Option<&String> {
    result
        .columns
        .iter()
        .find(|c| (is_count_column(c) || is_anonymous_column(c)) && result.is_numeric_column(c))
}

fn counted_subject(translation: &TranslationResult) -> String {
    translation
        .target_tables
        .first()
        .map(|t| column_label(t))
        .unwrap_or_else(|| "records".to_string())
}

/// Answers a count question from its count column, or from the number of
/// rows when the statement listed rows instead of counting them. Grouped
/// counts are left to the later stages.
fn count_answer(translation: &TranslationResult, result: &ResultSet) -> Option<String> {
    // A lone numeric cell under any alias is the count itself
    let lone_cell = match result.columns.as_slice() {
        [only] if result.row_count() == 1 && result.is_numeric_column(only) && !is_id_column(only) => {
            Some(only)
        }
        _ => None,
    };
    if let Some(column) = count_column(result).or(lone_cell) {
        if result.row_count() != 1 {
            return None;
        }
        let shown = result.rows[0].get(column).and_then(as_number).map(format_float)?;
        let subject = if is_count_column(column) {
            subject_of(column, COUNT_WORDS)
        } else {
            None
        }
        .unwrap_or_else(|| counted_subject(translation));
        return Some(format!("The dataset contains a total of {} {}.", shown, subject));
    }

    let rows = result.row_count();
    let subject = counted_subject(translation);
    if rows == 1 && !result.truncated {
        return Some(format!("There is 1 {}.", singular(&subject)));
    }
    let bound = if result.truncated { "at least " } else { "" };
    Some(format!("There are {}{} {}.", bound, rows, subject))
}

/// "top 3 customers": the question wants several ranked rows.
fn asks_for_ranking(words: &[String]) -> bool {
    words
        .windows(2)
        .any(|pair| pair[0] == "top" && pair[1].parse::<usize>().is_ok_and(|n| n > 1))
}

fn single_aggregate(kind: Aggregate, requested: &[String], result: &ResultSet) -> Option<String> {
    let column = numeric_column(requested, result)?;
    let value = result.rows[0].get(&column)?;
    let shown = as_number(value).map(format_float)?;

    let answer = match kind {
        Aggregate::Average => {
            let subject = subject_of(&column, AVERAGE_WORDS).unwrap_or_else(|| column_label(&column));
            format!("The average {} is {}.", subject, shown)
        }
        Aggregate::Sum => {
            let subject = subject_of(&column, SUM_WORDS).unwrap_or_else(|| column_label(&column));
            format!("The total {} is {}.", subject, shown)
        }
        Aggregate::Count | Aggregate::Max | Aggregate::Min => return None,
    };
    Some(answer)
}

fn extremum(highest: bool, requested: &[String], result: &ResultSet) -> Option<String> {
    let strip: &[&str] = if highest { MAX_WORDS } else { MIN_WORDS };
    let column = requested
        .iter()
        .find(|c| result.is_numeric_column(c) && !is_id_column(c))
        .or_else(|| {
            result
                .columns
                .iter()
                .find(|c| result.is_numeric_column(c) && !is_id_column(c))
        })?
        .clone();

    let mut best: Option<(f64, &Row)> = None;
    for row in &result.rows {
        let Some(n) = row.get(&column).and_then(as_number) else {
            continue;
        };
        let better = match best {
            None => true,
            Some((current, _)) => {
                if highest {
                    n > current
                } else {
                    n < current
                }
            }
        };
        if better {
            best = Some((n, row));
        }
    }
    let (value, row) = best?;

    let subject = subject_of(&column, strip).unwrap_or_else(|| column_label(&column));
    let owner = result
        .columns
        .iter()
        .filter(|c| is_name_column(c))
        .find_map(|c| row.get(c).filter(|v| !v.is_null()).map(display_value));

    let direction = if highest { "highest" } else { "lowest" };
    Some(match owner {
        Some(name) => format!(
            "The {} {} is {} (belongs to {}).",
            direction,
            subject,
            format_float(value),
            name
        ),
        None => format!("The {} {} is {}.", direction, subject, format_float(value)),
    })
}

/// Candidate entity names: runs of capitalised words and possessives.
///
/// Runs made only of result column vocabulary ("Customer Names") are not
/// names.
fn mentioned_names(question: &str, columns: &[String]) -> Vec<String> {
    let vocabulary: Vec<String> = columns.iter().flat_map(|c| text::split_words(c)).collect();
    let mut names: Vec<String> = Vec::new();
    let mut run: Vec<String> = Vec::new();

    let flush = |run: &mut Vec<String>, names: &mut Vec<String>| {
        if run.is_empty() {
            return;
        }
        let all_vocabulary = run.iter().all(|w| {
            let lowered = w.to_lowercase();
            vocabulary.iter().any(|v| *v == lowered || v == singular(&lowered))
        });
        let name = run.join(" ");
        if !all_vocabulary && !names.contains(&name) {
            names.push(name);
        }
        run.clear();
    };

    let raw_words: Vec<&str> = question.split_whitespace().collect();
    for (i, raw) in raw_words.iter().enumerate() {
        let possessive = raw.contains("'s") || raw.contains('\u{2019}');
        let word: String = raw
            .replace("'s", "")
            .replace("\u{2019}s", "")
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '-')
            .collect();
        if word.is_empty() {
            flush(&mut run, &mut names);
            continue;
        }
        let lowered = word.to_lowercase();
        let mut capitalised = word.chars().next().is_some_and(|c| c.is_uppercase());
        // Sentence-initial capital only counts when the next word continues the name
        if i == 0 && !possessive {
            capitalised &= raw_words
                .get(1)
                .and_then(|next| next.chars().next())
                .is_some_and(|c| c.is_uppercase());
        }
        if (capitalised || possessive) && !text::is_stop_word(&lowered) && lowered.len() > 1 {
            run.push(word);
        } else {
            flush(&mut run, &mut names);
        }
        // Punctuation or a possessive ends a name
        if possessive || raw.ends_with(|c: char| !c.is_alphanumeric()) {
            flush(&mut run, &mut names);
        }
    }
    flush(&mut run, &mut names);
    names
}

fn name_matches(candidate: &str, value: &str) -> bool {
    let candidate = candidate.to_lowercase();
    let value = value.to_lowercase();
    if candidate == value || value.contains(&candidate) {
        return true;
    }
    let value_words: Vec<&str> = value.split_whitespace().collect();
    candidate.split_whitespace().all(|w| value_words.contains(&w))
}

fn entity_lookup(names: &[String], requested: &[String], result: &ResultSet) -> Option<String> {
    if names.is_empty() {
        return None;
    }
    let name_columns: Vec<&String> = result.columns.iter().filter(|c| is_name_column(c)).collect();
    if name_columns.is_empty() {
        return None;
    }

    let mut answers = Vec::new();
    for row in &result.rows {
        let matched = name_columns.iter().find_map(|column| {
            let value = row.get(column.as_str()).filter(|v| !v.is_null()).map(display_value)?;
            names
                .iter()
                .any(|n| name_matches(n, &value))
                .then_some((column.as_str(), value))
        });
        let Some((name_column, entity)) = matched else {
            continue;
        };

        let present = |c: &&String| row.get(c.as_str()).is_some_and(|v| !v.is_null() && !is_blank(v));
        let field = requested
            .iter()
            .filter(|c| c.as_str() != name_column && !is_name_column(c))
            .find(present)
            .or_else(|| {
                result
                    .columns
                    .iter()
                    .filter(|c| c.as_str() != name_column && !is_id_column(c) && !is_name_column(c))
                    .find(present)
            });
        if let Some(field) = field {
            if let Some(value) = row.get(field.as_str()) {
                answers.push(format!(
                    "{}'s {} is {}",
                    entity,
                    column_label(field),
                    display_value(value)
                ));
            }
        }
    }

    if answers.is_empty() {
        None
    } else {
        Some(format!("{}.", answers.join("; ")))
    }
}

fn is_blank(value: &Value) -> bool {
    matches!(value, Value::String(s) if s.trim().is_empty())
}

fn single_row(requested: &[String], result: &ResultSet) -> Option<String> {
    let row = &result.rows[0];
    let literal = |column: &str| {
        row.get(column)
            .map(|v| format!("The {} is {}", column_label(column), display_value(v)))
    };

    if let Some(column) = requested.first() {
        return literal(column.as_str()).map(|s| format!("{}.", s));
    }
    match result.columns.as_slice() {
        [only] => literal(only.as_str()).map(|s| format!("{}.", s)),
        [first, second] => {
            let a = literal(first.as_str())?;
            let b = literal(second.as_str())?;
            Some(format!("{} and {}{}.", a, b[..1].to_lowercase(), &b[1..]))
        }
        _ => None,
    }
}

fn list_values(column: &str, result: &ResultSet) -> Option<String> {
    let mut distinct: Vec<String> = Vec::new();
    for value in result.column_values(column) {
        if value.is_null() || is_blank(value) {
            continue;
        }
        let shown = display_value(value);
        if !distinct.contains(&shown) {
            distinct.push(shown);
        }
    }
    if distinct.is_empty() {
        return None;
    }

    let label = column_label(column);
    if distinct.len() <= MAX_LISTED_VALUES {
        Some(format!("The {} values are: {}.", label, distinct.join(", ")))
    } else {
        Some(format!(
            "The {} values are: {} (and {} more).",
            label,
            distinct[..MAX_LISTED_VALUES].join(", "),
            distinct.len() - MAX_LISTED_VALUES
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;
    use crate::translator::Confidence;
    use nlq_core::{ModelError, QueryRows};
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn translation(tables: &[&str]) -> TranslationResult {
        TranslationResult {
            query_text: "SELECT 1".into(),
            target_tables: tables.iter().map(|t| t.to_string()).collect(),
            confidence: Confidence::High,
        }
    }

    fn result(columns: &[&str], rows: Vec<Vec<Value>>) -> ResultSet {
        ResultSet::from_query_rows(
            QueryRows {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows,
            },
            100,
        )
    }

    fn composer(model: Option<Arc<ScriptedModel>>) -> AnswerComposer {
        AnswerComposer::new(
            model.map(|m| m as Arc<dyn LanguageModel>),
            Duration::from_secs(1),
            50,
        )
    }

    #[test]
    fn count_aggregate_uses_column_subject() {
        let answer = extract_answer(
            "Count total customers",
            &translation(&["customers"]),
            &result(&["total_customers"], vec![vec![json!(3)]]),
        );
        assert_eq!(answer.unwrap(), "The dataset contains a total of 3 customers.");
    }

    #[test]
    fn count_of_anonymous_column_falls_back_to_table() {
        let answer = extract_answer(
            "How many contacts are there?",
            &translation(&["contacts"]),
            &result(&["count(*)"], vec![vec![json!(7)]]),
        );
        assert_eq!(answer.unwrap(), "The dataset contains a total of 7 contacts.");
    }

    #[test]
    fn average_and_total() {
        let avg = extract_answer(
            "What is the average revenue?",
            &translation(&["customers"]),
            &result(&["avg_revenue"], vec![vec![json!(2500.456)]]),
        );
        assert_eq!(avg.unwrap(), "The average revenue is 2500.46.");

        let total = extract_answer(
            "total revenue",
            &translation(&["customers"]),
            &result(&["total_revenue"], vec![vec![json!("7500")]]),
        );
        assert_eq!(total.unwrap(), "The total revenue is 7500.");
    }

    #[test]
    fn extremum_names_the_owner() {
        let answer = extract_answer(
            "Which customer has the highest revenue?",
            &translation(&["customers"]),
            &result(
                &["customer_name", "revenue"],
                vec![
                    vec![json!("John Doe"), json!(1200)],
                    vec![json!("Alice Brown"), json!(5000)],
                    vec![json!("Bob Stone"), json!(300)],
                ],
            ),
        );
        assert_eq!(
            answer.unwrap(),
            "The highest revenue is 5000 (belongs to Alice Brown)."
        );
    }

    #[test]
    fn entity_lookup_uses_possessive_form() {
        let answer = extract_answer(
            "What is John Doe's email?",
            &translation(&["contacts"]),
            &result(
                &["name", "email"],
                vec![
                    vec![json!("Jane Roe"), json!("jane@example.com")],
                    vec![json!("John Doe"), json!("john.doe@example.com")],
                ],
            ),
        );
        assert_eq!(answer.unwrap(), "John Doe's email is john.doe@example.com.");
    }

    #[test]
    fn number_of_lookup_is_not_a_count() {
        let answer = extract_answer(
            "What is the account number of John Doe?",
            &translation(&["accounts"]),
            &result(&["account_number"], vec![vec![json!(12345)]]),
        );
        assert_eq!(answer.unwrap(), "The account number is 12345.");

        let counted = extract_answer(
            "What is the number of open accounts?",
            &translation(&["accounts"]),
            &result(&["open_accounts_count"], vec![vec![json!(12)]]),
        );
        assert_eq!(counted.unwrap(), "The dataset contains a total of 12 open accounts.");
    }

    #[test]
    fn count_question_over_listed_rows_counts_them() {
        let rows = vec![
            vec![json!(1), json!("Alice Brown")],
            vec![json!(2), json!("Bob Stone")],
            vec![json!(3), json!("Carol White")],
        ];
        let answer = extract_answer(
            "How many customers are there?",
            &translation(&["customers"]),
            &result(&["customer_id", "customer_name"], rows.clone()),
        );
        assert_eq!(answer.unwrap(), "There are 3 customers.");

        // At the row cap the true count may be larger
        let capped = ResultSet::from_query_rows(
            QueryRows {
                columns: vec!["customer_id".into(), "customer_name".into()],
                rows,
            },
            3,
        );
        let answer = extract_answer("How many customers are there?", &translation(&["customers"]), &capped);
        assert_eq!(answer.unwrap(), "There are at least 3 customers.");
    }

    #[test]
    fn count_under_any_alias_is_read_from_the_cell() {
        let answer = extract_answer(
            "How many customers are there?",
            &translation(&["customers"]),
            &result(&["f0_"], vec![vec![json!("42")]]),
        );
        assert_eq!(answer.unwrap(), "The dataset contains a total of 42 customers.");

        let answer = extract_answer(
            "How many customers are there?",
            &translation(&["customers"]),
            &result(&["customers"], vec![vec![json!(9)]]),
        );
        assert_eq!(answer.unwrap(), "The dataset contains a total of 9 customers.");
    }

    #[test]
    fn top_n_list_is_left_to_the_model() {
        let answer = extract_answer(
            "Show the top 3 customers by revenue",
            &translation(&["customers"]),
            &result(
                &["customer_name", "revenue"],
                vec![
                    vec![json!("Alice Brown"), json!(5000)],
                    vec![json!("John Doe"), json!(1200)],
                    vec![json!("Bob Stone"), json!(300)],
                ],
            ),
        );
        assert!(answer.is_none());
    }

    #[test]
    fn column_matching_ignores_case_and_separators() {
        let answer = extract_answer(
            "what is the Customer Name",
            &translation(&["customers"]),
            &result(
                &["customer_name", "revenue", "customer_id"],
                vec![vec![json!("Alice Brown"), json!(5000), json!(2)]],
            ),
        );
        assert_eq!(answer.unwrap(), "The customer name is Alice Brown.");

        let listed = extract_answer(
            "list every customerName",
            &translation(&["customers"]),
            &result(
                &["customer_name"],
                vec![vec![json!("A")], vec![json!("B")], vec![json!("A")]],
            ),
        );
        assert_eq!(listed.unwrap(), "The customer name values are: A, B.");
    }

    #[test]
    fn single_cell_is_returned_literally() {
        let answer = extract_answer(
            "What is John Doe's email?",
            &translation(&["contacts"]),
            &result(&["email"], vec![vec![json!("john.doe@example.com")]]),
        );
        assert_eq!(answer.unwrap(), "The email is john.doe@example.com.");
    }

    #[test]
    fn long_listings_are_abbreviated() {
        let rows = (0..13).map(|i| vec![json!(format!("c{}", i))]).collect();
        let answer = extract_answer(
            "show all emails",
            &translation(&["contacts"]),
            &result(&["email"], rows),
        );
        assert_eq!(
            answer.unwrap(),
            "The email values are: c0, c1, c2, c3, c4, c5, c6, c7, c8, c9 (and 3 more)."
        );
    }

    #[test]
    fn unrelated_multi_row_result_is_not_extracted() {
        let answer = extract_answer(
            "Summarise recent activity",
            &translation(&["events"]),
            &result(&["a", "b"], vec![vec![json!(1), json!(2)], vec![json!(3), json!(4)]]),
        );
        assert!(answer.is_none());
    }

    #[tokio::test]
    async fn model_fallback_strips_answer_prefix() {
        let model = Arc::new(ScriptedModel::replying("ANSWER: Activity was steady."));
        let composition = composer(Some(Arc::clone(&model)))
            .compose(
                "Summarise recent activity",
                &translation(&["events"]),
                &result(&["a", "b"], vec![vec![json!(1), json!(2)], vec![json!(3), json!(4)]]),
            )
            .await;
        assert_eq!(composition.method, CompositionMethod::Model);
        assert_eq!(composition.summary, "Activity was steady.");
        let prompt = model.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("Row 2: a=3, b=4"));
    }

    #[tokio::test]
    async fn model_failure_degrades_to_template() {
        let model = Arc::new(ScriptedModel::failing(ModelError::Unreachable("down".into())));
        let composer = composer(Some(Arc::clone(&model)));

        let empty = composer
            .compose("anything", &translation(&[]), &result(&["a"], vec![]))
            .await;
        assert_eq!(empty.method, CompositionMethod::Template);
        assert_eq!(empty.summary, "No matching data found.");

        let many = composer
            .compose(
                "Summarise recent activity",
                &translation(&[]),
                &result(&["a", "b"], vec![vec![json!(1), json!(2)], vec![json!(3), json!(4)]]),
            )
            .await;
        assert_eq!(many.summary, "The query returned 2 rows across 2 columns.");
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn zero_column_result_still_has_summary() {
        let composition = composer(None)
            .compose("anything", &translation(&[]), &ResultSet::default())
            .await;
        assert!(!composition.summary.is_empty());
    }
}
