//! Natural-language to SQL translation.
//!
//! The prompt embeds every table of the active snapshot, so nothing about the
//! warehouse layout is hard-coded here. Model output is cleaned and passed
//! through the read-only guard before it can reach the executor.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use nlq_core::schema::{SchemaSnapshot, TableDescriptor};
use nlq_core::sql_guard::{self, GuardViolation};
use nlq_core::text;
use nlq_core::{LanguageModel, ModelError, PipelineConfig, TranslationError};
use serde::Serialize;

use crate::retry::retry_transient;

/// Score added when a question names a table outright.
const NAMED_TABLE_BONUS: usize = 1000;

/// Whether every identifier in the generated SQL was found in the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Low,
}

/// A validated, read-only statement ready for execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslationResult {
    pub query_text: String,
    /// Short names of the tables the statement reads or the question names,
    /// in snapshot declaration order
    pub target_tables: Vec<String>,
    pub confidence: Confidence,
}

/// A table with its relevance to a question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedTable {
    pub name: String,
    pub score: usize,
}

pub struct QueryTranslator {
    model: Arc<dyn LanguageModel>,
    max_question_length: usize,
    row_limit: usize,
    attempts: u32,
    retry_delay_ms: u64,
    model_timeout: Duration,
}

impl QueryTranslator {
    pub fn new(model: Arc<dyn LanguageModel>, config: &PipelineConfig) -> Self {
        Self {
            model,
            max_question_length: config.max_question_length,
            row_limit: config.max_result_rows,
            attempts: config.translation_attempts,
            retry_delay_ms: config.translation_retry_delay_ms,
            model_timeout: Duration::from_millis(config.model_timeout_ms),
        }
    }

    /// Translates `question` into a single read-only statement over `snapshot`.
    pub async fn translate(
        &self,
        question: &str,
        snapshot: &SchemaSnapshot,
    ) -> Result<TranslationResult, TranslationError> {
        let length = question.chars().count();
        if length > self.max_question_length {
            return Err(TranslationError::QuestionTooLong {
                max: self.max_question_length,
                actual: length,
            });
        }
        let question = question.trim();
        if question.is_empty() {
            return Err(TranslationError::EmptyQuestion);
        }

        let prompt = self.build_prompt(question, snapshot);
        let prompt = prompt.as_str();
        let query_text = retry_transient(
            move |_| async move { self.generate_statement(prompt).await },
            self.attempts,
            self.retry_delay_ms,
            "SQL generation",
            |err: &TranslationError| match err {
                TranslationError::ModelUnavailable(e) => e.is_transient(),
                TranslationError::Malformed(_) => true,
                _ => false,
            },
        )
        .await?;

        let result = analyze_statement(question, query_text, snapshot);
        if result.confidence == Confidence::Low {
            tracing::warn!(
                "Low-confidence translation for '{}': {}",
                question,
                result.query_text
            );
        }
        tracing::info!(
            "Generated SQL over [{}]: {}",
            result.target_tables.join(", "),
            result.query_text
        );
        Ok(result)
    }

    /// Builds the generation prompt: full schema, the most relevant tables,
    /// and the output rules.
    pub fn build_prompt(&self, question: &str, snapshot: &SchemaSnapshot) -> String {
        let relevant: Vec<String> = rank_tables(question, snapshot)
            .into_iter()
            .filter(|t| t.score > 0)
            .map(|t| t.name)
            .collect();
        let example_table = relevant
            .first()
            .and_then(|n| snapshot.table(n))
            .or_else(|| snapshot.tables().first())
            .map(|t| t.qualified_name.as_str())
            .unwrap_or("dataset.table_name");

        let mut prompt = String::new();
        let _ = writeln!(
            prompt,
            "You are a SQL expert. Convert the natural-language question below into one valid SQL query."
        );
        let _ = writeln!(prompt);
        if snapshot.is_empty() {
            let _ = writeln!(
                prompt,
                "No tables were discovered in dataset {}. Use only names stated in the question.",
                snapshot.dataset
            );
        } else {
            let _ = writeln!(prompt, "Available Tables and Columns:");
            let _ = writeln!(prompt, "{}", snapshot.summary());
            if !relevant.is_empty() {
                let _ = writeln!(prompt, "Most relevant tables for this question:");
                let _ = writeln!(prompt, "{}", snapshot.summary_for(&relevant));
            }
        }
        let _ = writeln!(prompt, "Question: {}", question);
        let _ = writeln!(prompt);
        let _ = writeln!(prompt, "Requirements:");
        let _ = writeln!(
            prompt,
            "1. Return ONLY the SQL query, with no explanation and no markdown."
        );
        let _ = writeln!(
            prompt,
            "2. Use the qualified table names listed above, e.g. {}.",
            example_table
        );
        let _ = writeln!(
            prompt,
            "3. Use only tables and columns that appear in the schema; check spelling."
        );
        let _ = writeln!(
            prompt,
            "4. Select every column needed to answer the question, including any field the question asks for by name."
        );
        let _ = writeln!(
            prompt,
            "5. When a name or value is mentioned, filter with LOWER(column) LIKE '%value%'."
        );
        let _ = writeln!(
            prompt,
            "6. For highest/lowest/top/bottom questions, ORDER BY the relevant column (DESC for highest)."
        );
        let _ = writeln!(prompt, "7. Include LIMIT {}.", self.row_limit);
        let _ = writeln!(
            prompt,
            "8. Emit exactly one read-only statement starting with SELECT or WITH. Never use {}.",
            sql_guard::FORBIDDEN_KEYWORDS.join(", ")
        );
        let _ = writeln!(prompt);
        prompt.push_str("SQL Query:");
        prompt
    }

    async fn generate_statement(&self, prompt: &str) -> Result<String, TranslationError> {
        let raw = match tokio::time::timeout(self.model_timeout, self.model.generate(prompt)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => return Err(TranslationError::ModelUnavailable(e)),
            Err(_) => {
                return Err(TranslationError::ModelUnavailable(ModelError::Timeout(
                    self.model_timeout.as_millis() as u64,
                )))
            }
        };

        let sql = sql_guard::clean_model_output(&raw);
        match sql_guard::check_read_only(&sql) {
            Ok(()) => Ok(sql),
            Err(violation) if violation.is_unsafe() => {
                tracing::warn!("Rejected generated SQL ({}): {}", violation, sql);
                Err(TranslationError::Unsafe(violation.to_string()))
            }
            Err(GuardViolation::Empty) => {
                Err(TranslationError::Malformed("empty output".to_string()))
            }
            Err(violation) => Err(TranslationError::Malformed(violation.to_string())),
        }
    }
}

/// Ranks every table of the snapshot by relevance to the question.
///
/// A table named in the question outranks everything else. Otherwise the
/// score is the number of (question noun, column) pairs where the column
/// name contains the noun, case-insensitively, with semantic hints
/// ("email" also matching `mail`). Ties keep declaration order.
pub fn rank_tables(question: &str, snapshot: &SchemaSnapshot) -> Vec<RankedTable> {
    let words = text::question_words(question);
    let terms = text::question_terms(question);

    let mut ranked: Vec<RankedTable> = snapshot
        .tables()
        .iter()
        .map(|table| {
            let mut score = column_matches(table, &terms, snapshot);
            if names_table(&words, table) {
                score += NAMED_TABLE_BONUS;
            }
            RankedTable {
                name: table.name.clone(),
                score,
            }
        })
        .collect();
    // Stable sort keeps declaration order among equal scores
    ranked.sort_by(|a, b| b.score.cmp(&a.score));
    ranked
}

fn column_matches(table: &TableDescriptor, terms: &[String], snapshot: &SchemaSnapshot) -> usize {
    let mut score = 0;
    for term in terms {
        let singular = singular(term);
        let hinted: Vec<String> = snapshot
            .find_columns_by_hint(term)
            .into_iter()
            .filter(|m| m.table == table.name)
            .map(|m| m.column)
            .collect();
        score += table
            .columns
            .iter()
            .filter(|c| {
                let name = c.name.to_lowercase();
                let compact = text::compact_identifier(&c.name);
                name.contains(term.as_str())
                    || compact.contains(term.as_str())
                    || (singular.len() > 2 && compact.contains(singular))
                    || hinted.contains(&c.name)
            })
            .count();
    }
    score
}

fn names_table(words: &[String], table: &TableDescriptor) -> bool {
    let lowered = table.name.to_lowercase();
    words.iter().any(|w| *w == lowered) || text::contains_words(words, &text::split_words(&table.name))
}

fn singular(term: &str) -> &str {
    if term.len() > 3 && term.ends_with('s') && !term.ends_with("ss") {
        &term[..term.len() - 1]
    } else {
        term
    }
}

/// Derives target tables and confidence for a validated statement.
fn analyze_statement(question: &str, query_text: String, snapshot: &SchemaSnapshot) -> TranslationResult {
    let references = sql_guard::analyze_references(&query_text);
    let words = text::question_words(question);

    let mut confidence = Confidence::High;
    let mut referenced: Vec<&str> = Vec::new();
    for relation in &references.relations {
        match snapshot.resolve_relation(relation) {
            Some(table) => referenced.push(table.name.as_str()),
            // `EXTRACT(YEAR FROM created_at)` puts a column after FROM
            None if snapshot.has_column(relation) => {}
            None => {
                tracing::debug!("Relation '{}' not found in snapshot", relation);
                confidence = Confidence::Low;
            }
        }
    }
    for identifier in &references.identifiers {
        if !snapshot.has_column(identifier) && snapshot.table(identifier).is_none() {
            tracing::debug!("Identifier '{}' not found in snapshot", identifier);
            confidence = Confidence::Low;
        }
    }

    let target_tables = snapshot
        .tables()
        .iter()
        .filter(|t| referenced.contains(&t.name.as_str()) || names_table(&words, t))
        .map(|t| t.name.clone())
        .collect();

    TranslationResult {
        query_text,
        target_tables,
        confidence,
    }
}
