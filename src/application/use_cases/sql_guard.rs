//! Static safety filter for generated SQL.
//!
//! Rules run in a fixed order and the first failure wins:
//! - Empty input
//! - Statement count (one optional trailing `;`)
//! - Leading `SELECT`
//! - Mutating keywords (`DROP`, `DELETE`, `UPDATE`, `INSERT`, `ALTER`, `TRUNCATE`)
//! - Inline comment marker `--`
//! - `FROM` clause
//! - Parenthesis balance
//! - `SELECT ... FROM ...` shape
//!
//! This is a heuristic filter, not a parser. It may reject valid reads; it
//! must never accept a write.

use crate::domain::query::{Rejection, ValidatedQuery};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

static LEADING_SELECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^SELECT\b").unwrap());
static FORBIDDEN_KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(DROP|DELETE|UPDATE|INSERT|ALTER|TRUNCATE)\b").unwrap());
static FROM_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bFROM\b").unwrap());
static SELECT_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^SELECT\s+\S.*?\s+FROM\s+\S.*$").unwrap());

#[derive(Debug, Clone, Default)]
pub struct SqlGuard;

impl SqlGuard {
    pub fn new() -> Self {
        Self
    }

    pub fn check(&self, candidate: &str) -> std::result::Result<ValidatedQuery, Rejection> {
        match Self::apply_rules(candidate) {
            Ok(sql) => {
                info!(sql = %sql, "SQL accepted");
                Ok(ValidatedQuery::new(sql))
            }
            Err(rejection) => {
                warn!(sql = candidate, code = rejection.code, reason = %rejection.message, "SQL rejected");
                Err(rejection)
            }
        }
    }

    fn apply_rules(candidate: &str) -> std::result::Result<String, Rejection> {
        let sql = candidate.trim();
        if sql.is_empty() {
            return Err(Rejection::new("EMPTY_QUERY", "Query is empty"));
        }

        let sql = match sql.matches(';').count() {
            0 => sql,
            1 if sql.ends_with(';') => sql.trim_end_matches(';').trim_end(),
            1 => {
                return Err(Rejection::new(
                    "SEMICOLON_NOT_TERMINAL",
                    "A semicolon is only allowed as the final character",
                ))
            }
            n => {
                return Err(Rejection::new(
                    "MULTIPLE_STATEMENTS",
                    format!("Found {} semicolons, only one statement is allowed", n),
                ))
            }
        };

        if !LEADING_SELECT.is_match(sql) {
            return Err(Rejection::new("NOT_SELECT", "Only SELECT statements are allowed"));
        }

        if let Some(found) = FORBIDDEN_KEYWORD.find(sql) {
            return Err(Rejection::new(
                "FORBIDDEN_KEYWORD",
                format!("Keyword {} is not allowed", found.as_str().to_uppercase()),
            ));
        }

        if sql.contains("--") {
            return Err(Rejection::new("COMMENT_MARKER", "SQL comments are not allowed"));
        }

        if !FROM_TOKEN.is_match(sql) {
            return Err(Rejection::new("MISSING_FROM", "Query has no FROM clause"));
        }

        let open = sql.matches('(').count();
        let close = sql.matches(')').count();
        if open != close {
            return Err(Rejection::new(
                "UNBALANCED_PARENTHESES",
                format!("{} opening and {} closing parentheses", open, close),
            ));
        }

        if !SELECT_SHAPE.is_match(sql) {
            return Err(Rejection::new(
                "MALFORMED_SELECT",
                "Query does not match SELECT <columns> FROM <source>",
            ));
        }

        Ok(sql.to_string())
    }
}
