//! Execution of guarded SELECT statements against the catalog database.
//!
//! - One fresh read-only connection per statement
//! - Wall-clock bound equal to the configured database timeout; a statement
//!   still running at the deadline is interrupted
//! - Connection closed on success and failure, dropped on timeout
//! - No retries

use super::sqlite::{column_value, CatalogDb};
use crate::domain::error::{AppError, Result};
use crate::domain::query::ValidatedQuery;
use serde::Serialize;
use sqlx::{Column, Row};
use std::sync::Arc;
use tracing::{info, warn};

pub const NO_RESULTS: &str = "Không tìm thấy kết quả";

/// Rows returned by a statement, each keyed by column name.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
    pub row_count: usize,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub struct RelationalExecutor {
    db: Arc<CatalogDb>,
}

impl RelationalExecutor {
    pub fn new(db: Arc<CatalogDb>) -> Self {
        Self { db }
    }

    pub async fn execute(&self, query: &ValidatedQuery) -> Result<QueryResult> {
        let mut bounded = self.db.connect().await?;

        let outcome = tokio::time::timeout(
            bounded.remaining(),
            sqlx::query(query.as_str()).fetch_all(&mut bounded.conn),
        )
        .await
        .map(|rows| {
            rows.map_err(|e| AppError::DatabaseError(format!("Query execution failed: {}", e)))
        });
        let rows = bounded.finish(outcome, "Query").await?;

        let mut result = QueryResult::default();
        for row in &rows {
            if result.columns.is_empty() {
                result.columns = row
                    .columns()
                    .iter()
                    .map(|c| c.name().to_string())
                    .collect();
            }

            let mut row_map = serde_json::Map::new();
            for (i, column) in row.columns().iter().enumerate() {
                row_map.insert(column.name().to_string(), column_value(row, i));
            }
            result.rows.push(row_map);
        }
        result.row_count = result.rows.len();

        info!(rows = result.row_count, "Executed catalog query");
        Ok(result)
    }

    /// Failures collapse into an empty result; callers cannot tell the two apart.
    pub async fn execute_or_empty(&self, query: &ValidatedQuery) -> QueryResult {
        match self.execute(query).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, sql = query.as_str(), "Catalog query failed, continuing with no rows");
                QueryResult::default()
            }
        }
    }
}

/// Renders rows as `column: value` lines for prompt context.
pub fn format_rows(result: &QueryResult) -> String {
    if result.rows.is_empty() {
        return NO_RESULTS.to_string();
    }

    result
        .rows
        .iter()
        .map(|row| {
            result
                .columns
                .iter()
                .map(|col| {
                    let value = row.get(col).unwrap_or(&serde_json::Value::Null);
                    format!("{}: {}", col, render_value(value))
                })
                .collect::<Vec<_>>()
                .join(", ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::sql_guard::SqlGuard;
    use crate::infrastructure::db::sqlite::test_support::{
        seeded_db, CROSS_JOIN_TABLE, SHOP_SCHEMA, SLOW_COUNT,
    };
    use std::time::{Duration, Instant};

    async fn executor() -> (RelationalExecutor, std::path::PathBuf) {
        let path = seeded_db(SHOP_SCHEMA).await;
        let db = Arc::new(CatalogDb::open(&path, 5).unwrap());
        (RelationalExecutor::new(db), path)
    }

    #[tokio::test]
    async fn test_execute_maps_rows_in_column_order() {
        let (executor, path) = executor().await;
        let query = SqlGuard::new()
            .check("SELECT Name, Price FROM Product WHERE Price < 30000 ORDER BY Price")
            .unwrap();

        let result = executor.execute(&query).await.unwrap();
        assert_eq!(result.columns, vec!["Name", "Price"]);
        assert_eq!(result.row_count, 2);
        assert_eq!(result.rows[0]["Name"], "Cà phê sữa đá");

        let text = format_rows(&result);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Name: Cà phê sữa đá, Price: 25000"));
        assert!(lines[1].starts_with("Name: Bạc xỉu, Price: 29000"));
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_unknown_column_collapses_to_empty() {
        let (executor, path) = executor().await;
        let query = SqlGuard::new()
            .check("SELECT Flavour FROM Product")
            .unwrap();

        assert!(executor.execute(&query).await.is_err());
        let result = executor.execute_or_empty(&query).await;
        assert!(result.is_empty());
        assert_eq!(format_rows(&result), NO_RESULTS);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_subquery_executes() {
        let (executor, path) = executor().await;
        let query = SqlGuard::new()
            .check("SELECT Name FROM Product WHERE Id IN (SELECT Id FROM Product)")
            .unwrap();
        assert!(executor.execute(&query).await.is_ok());
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_slow_statement_is_interrupted_at_deadline() {
        let path = seeded_db(CROSS_JOIN_TABLE).await;
        let executor = RelationalExecutor::new(Arc::new(CatalogDb::open(&path, 1).unwrap()));
        let query = SqlGuard::new().check(SLOW_COUNT).unwrap();

        let started = Instant::now();
        let outcome = executor.execute(&query).await;
        let elapsed = started.elapsed();

        assert!(matches!(outcome, Err(AppError::Timeout(_))), "{:?}", outcome);
        assert!(elapsed < Duration::from_millis(1500), "took {:?}", elapsed);

        let started = Instant::now();
        assert!(executor.execute_or_empty(&query).await.is_empty());
        assert!(started.elapsed() < Duration::from_millis(1500));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_format_nulls() {
        let mut row = serde_json::Map::new();
        row.insert("Rate".to_string(), serde_json::Value::Null);
        let result = QueryResult {
            columns: vec!["Rate".to_string()],
            rows: vec![row],
            row_count: 1,
        };
        assert_eq!(format_rows(&result), "Rate: null");
    }
}
