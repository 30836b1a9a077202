//! Read-only guard and lightweight analysis for generated SQL.
//!
//! Nothing here is a SQL parser. The guard is deliberately strict: a
//! forbidden keyword anywhere in the text (string literals included) rejects
//! the statement.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

/// Keywords that must never reach the warehouse.
pub const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "TRUNCATE", "CREATE", "MERGE", "GRANT",
    "REVOKE",
];

/// Statement verbs accepted as read-only.
pub const READ_ONLY_VERBS: &[&str] = &["SELECT", "WITH"];

const SQL_KEYWORDS: &[&str] = &[
    "all", "and", "any", "array", "as", "asc", "between", "by", "case", "cast", "cross",
    "current", "date", "datetime", "day", "desc", "distinct", "else", "end", "escape", "except",
    "exists", "extract", "false", "first", "following", "for", "from", "full", "group", "having",
    "hour", "ilike", "in", "inner", "intersect", "interval", "is", "join", "last", "left", "like",
    "limit", "minute", "month", "natural", "not", "null", "nulls", "offset", "on", "or", "order",
    "outer", "over", "partition", "preceding", "qualify", "quarter", "range", "right", "row",
    "rows", "second", "select", "some", "struct", "then", "time", "timestamp", "true",
    "unbounded", "union", "unnest", "using", "week", "when", "where", "window", "with", "year",
];

/// Why a generated statement was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardViolation {
    /// Nothing left after cleanup
    Empty,
    /// Statement does not begin with a read-only verb
    NotReadOnly { verb: String },
    /// A mutating keyword appears in the text
    ForbiddenKeyword(String),
    /// More than one statement
    MultipleStatements,
}

impl GuardViolation {
    /// True for violations of the read-only policy, as opposed to output that
    /// is merely not a statement.
    pub fn is_unsafe(&self) -> bool {
        matches!(
            self,
            GuardViolation::ForbiddenKeyword(_) | GuardViolation::MultipleStatements
        )
    }
}

impl std::fmt::Display for GuardViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuardViolation::Empty => write!(f, "empty statement"),
            GuardViolation::NotReadOnly { verb } => {
                write!(f, "statement must start with SELECT or WITH, found '{}'", verb)
            }
            GuardViolation::ForbiddenKeyword(k) => write!(f, "forbidden keyword '{}'", k),
            GuardViolation::MultipleStatements => write!(f, "multiple statements"),
        }
    }
}

fn forbidden_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let pattern = format!(r"(?i)\b({})\b", FORBIDDEN_KEYWORDS.join("|"));
        Regex::new(&pattern).expect("forbidden keyword pattern is valid")
    })
}

fn trailing_limit_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)\blimit\s+(\d+)(\s+offset\s+\d+)?\s*$")
            .expect("limit pattern is valid")
    })
}

fn label_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(sql\s+query|sql|query)\s*:\s*").expect("label pattern is valid")
    })
}

/// Strips markdown fences, a leading `SQL:` label and trailing semicolons.
pub fn clean_model_output(text: &str) -> String {
    let mut body = text.trim();
    if let Some(start) = body.find("```") {
        let after = &body[start + 3..];
        // Skip the info string (` ```sql `)
        let after = match after.find('\n') {
            Some(nl) if after[..nl].trim().chars().all(|c| c.is_alphanumeric()) => &after[nl + 1..],
            _ => after,
        };
        body = match after.find("```") {
            Some(end) => &after[..end],
            None => after,
        };
    }
    let body = label_regex().replace(body.trim(), "");
    strip_trailing_comments(body.trim())
        .trim_end_matches(|c: char| c == ';' || c.is_whitespace())
        .to_string()
}

/// Removes `-- line` and `/* block */` comments that follow the last token.
pub fn strip_trailing_comments(sql: &str) -> &str {
    let mut body = sql.trim_end();
    loop {
        let before = body.len();
        if body.ends_with("*/") {
            if let Some(start) = body.rfind("/*") {
                body = body[..start].trim_end();
            }
        }
        let line_start = body.rfind('\n').map_or(0, |i| i + 1);
        if let Some(pos) = line_comment_start(&body[line_start..]) {
            body = body[..line_start + pos].trim_end();
        }
        if body.len() == before {
            return body;
        }
    }
}

/// Byte offset of a `--` outside quotes, if the line has one.
fn line_comment_start(line: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut prev = '\0';
    for (i, c) in line.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if matches!(c, '\'' | '"' | '`') => quote = Some(c),
            None if c == '-' && prev == '-' => return Some(i - 1),
            None => {}
        }
        prev = c;
    }
    None
}

/// Checks that `sql` is exactly one read-only statement.
pub fn check_read_only(sql: &str) -> Result<(), GuardViolation> {
    if let Some(m) = forbidden_regex().find(sql) {
        return Err(GuardViolation::ForbiddenKeyword(m.as_str().to_uppercase()));
    }

    let tokens = tokenize(sql);
    if tokens.iter().any(|t| matches!(t, Token::Punct(';'))) {
        return Err(GuardViolation::MultipleStatements);
    }

    let first = tokens.iter().find(|t| !matches!(t, Token::Punct('(')));
    match first {
        None => Err(GuardViolation::Empty),
        Some(Token::Word(w)) if READ_ONLY_VERBS.iter().any(|v| v.eq_ignore_ascii_case(w)) => Ok(()),
        Some(Token::Word(w)) => Err(GuardViolation::NotReadOnly { verb: w.clone() }),
        Some(other) => Err(GuardViolation::NotReadOnly {
            verb: other.describe(),
        }),
    }
}

/// Caps the statement's row count.
///
/// Appends `LIMIT row_limit` when there is no trailing limit; lowers a
/// trailing limit that exceeds the cap.
pub fn apply_row_limit(sql: &str, row_limit: usize) -> String {
    let trimmed = strip_trailing_comments(sql.trim())
        .trim_end_matches(|c: char| c == ';' || c.is_whitespace());
    if let Some(caps) = trailing_limit_regex().captures(trimmed) {
        let Some(number) = caps.get(1) else {
            return trimmed.to_string();
        };
        let requested: usize = number.as_str().parse().unwrap_or(usize::MAX);
        if requested <= row_limit {
            return trimmed.to_string();
        }
        let mut rewritten = String::with_capacity(trimmed.len());
        rewritten.push_str(&trimmed[..number.start()]);
        rewritten.push_str(&row_limit.to_string());
        rewritten.push_str(&trimmed[number.end()..]);
        return rewritten;
    }
    format!("{}\nLIMIT {}", trimmed, row_limit)
}

/// Names referenced by a statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlReferences {
    /// Relations following FROM/JOIN, as written (qualified names kept whole)
    pub relations: Vec<String>,
    /// Other identifiers, with qualifiers removed, that are neither keywords,
    /// functions nor aliases
    pub identifiers: Vec<String>,
}

/// Collects relation and column-like identifiers from a statement.
pub fn analyze_references(sql: &str) -> SqlReferences {
    let tokens = tokenize(sql);
    let names = group_names(&tokens);

    let mut aliases: HashSet<String> = HashSet::new();
    let mut relations = Vec::new();
    let mut candidates: Vec<String> = Vec::new();

    for (i, item) in names.iter().enumerate() {
        let Item::Name(parts) = item else { continue };
        let prev = i.checked_sub(1).and_then(|p| names.get(p));
        let next = names.get(i + 1);
        let next2 = names.get(i + 2);
        let single_keyword = parts.len() == 1 && is_keyword(&parts[0]);

        if single_keyword {
            continue;
        }
        if matches!(next, Some(Item::Punct('('))) {
            // Function call or `UNNEST(`
            continue;
        }
        if prev.is_some_and(|p| p.is_word("as")) {
            aliases.insert(parts[parts.len() - 1].to_lowercase());
            continue;
        }
        if next.is_some_and(|n| n.is_word("as")) && matches!(next2, Some(Item::Punct('('))) {
            aliases.insert(parts[parts.len() - 1].to_lowercase());
            continue;
        }
        if prev.is_some_and(|p| p.is_word("from") || p.is_word("join")) {
            relations.push(parts.join("."));
            // `FROM customers c`
            if let Some(Item::Name(alias)) = next {
                if alias.len() == 1 && !is_keyword(&alias[0]) {
                    aliases.insert(alias[0].to_lowercase());
                }
            }
            continue;
        }
        if let Some(Item::Name(prev_parts)) = prev {
            if prev_parts.len() == 1 && is_keyword(&prev_parts[0]) {
                candidates.push(parts[parts.len() - 1].clone());
                continue;
            }
            // Implicit alias directly after a relation was handled above;
            // an identifier right after another name is an implicit column alias.
            if let Some(prev_index) = i.checked_sub(2) {
                if names
                    .get(prev_index)
                    .is_some_and(|p| p.is_word("from") || p.is_word("join"))
                {
                    continue;
                }
            }
            aliases.insert(parts[parts.len() - 1].to_lowercase());
            continue;
        }
        candidates.push(parts[parts.len() - 1].clone());
    }

    let mut identifiers = Vec::new();
    for candidate in candidates {
        if aliases.contains(&candidate.to_lowercase()) {
            continue;
        }
        if !identifiers.contains(&candidate) {
            identifiers.push(candidate);
        }
    }

    // CTE names are not catalog relations
    relations.retain(|r| r.contains('.') || !aliases.contains(&r.to_lowercase()));

    SqlReferences {
        relations,
        identifiers,
    }
}

fn is_keyword(word: &str) -> bool {
    let lowered = word.to_ascii_lowercase();
    SQL_KEYWORDS.contains(&lowered.as_str())
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    /// Backtick-quoted identifier
    Quoted(String),
    Literal,
    Number,
    Punct(char),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Word(w) | Token::Quoted(w) => w.clone(),
            Token::Literal => "string literal".to_string(),
            Token::Number => "number".to_string(),
            Token::Punct(c) => c.to_string(),
        }
    }
}

fn tokenize(sql: &str) -> Vec<Token> {
    let chars: Vec<char> = sql.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if (c == '-' && chars.get(i + 1) == Some(&'-')) || c == '#' {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
        } else if c == '/' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                i += 1;
            }
            i += 2;
        } else if c == '\'' || c == '"' {
            i += 1;
            while i < chars.len() {
                if chars[i] == '\\' {
                    i += 2;
                    continue;
                }
                if chars[i] == c {
                    // Doubled quote is an escaped quote
                    if chars.get(i + 1) == Some(&c) {
                        i += 2;
                        continue;
                    }
                    break;
                }
                i += 1;
            }
            i += 1;
            tokens.push(Token::Literal);
        } else if c == '`' {
            let start = i + 1;
            i = start;
            while i < chars.len() && chars[i] != '`' {
                i += 1;
            }
            tokens.push(Token::Quoted(chars[start..i.min(chars.len())].iter().collect()));
            i += 1;
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Word(chars[start..i].iter().collect()));
        } else if c.is_ascii_digit() {
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '.') {
                i += 1;
            }
            tokens.push(Token::Number);
        } else {
            tokens.push(Token::Punct(c));
            i += 1;
        }
    }
    tokens
}

#[derive(Debug, Clone, PartialEq)]
enum Item {
    /// Dotted name; backtick-quoted segments are split on dots too
    Name(Vec<String>),
    Punct(char),
    Other,
}

impl Item {
    fn is_word(&self, word: &str) -> bool {
        matches!(self, Item::Name(parts) if parts.len() == 1 && parts[0].eq_ignore_ascii_case(word))
    }
}

fn group_names(tokens: &[Token]) -> Vec<Item> {
    let mut items = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        match &tokens[i] {
            Token::Word(_) | Token::Quoted(_) => {
                let mut parts = Vec::new();
                loop {
                    match &tokens[i] {
                        Token::Word(w) => parts.push(w.clone()),
                        Token::Quoted(q) => {
                            parts.extend(q.split('.').filter(|s| !s.is_empty()).map(str::to_string))
                        }
                        _ => break,
                    }
                    let dotted = matches!(tokens.get(i + 1), Some(Token::Punct('.')))
                        && matches!(tokens.get(i + 2), Some(Token::Word(_) | Token::Quoted(_)));
                    if !dotted {
                        break;
                    }
                    i += 2;
                }
                if parts.is_empty() {
                    items.push(Item::Other);
                } else {
                    items.push(Item::Name(parts));
                }
                i += 1;
            }
            Token::Punct(c) => {
                items.push(Item::Punct(*c));
                i += 1;
            }
            Token::Literal | Token::Number => {
                items.push(Item::Other);
                i += 1;
            }
        }
    }
    items
}
