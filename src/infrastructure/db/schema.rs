use super::sqlite::{list_user_tables, quote_ident, CatalogDb};
use crate::domain::error::{AppError, Result};
use sqlx::sqlite::SqliteConnection;
use sqlx::Row;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
struct ColumnInfo {
    name: String,
    data_type: String,
    primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, PartialOrd, Eq, Ord)]
struct ForeignKeyInfo {
    from: String,
    table: String,
    to: String,
}

#[derive(Debug, Clone, PartialEq, PartialOrd, Eq, Ord)]
struct IndexInfo {
    name: String,
    unique: bool,
}

#[derive(Debug, Clone)]
struct TableInfo {
    name: String,
    columns: Vec<ColumnInfo>,
    foreign_keys: Vec<ForeignKeyInfo>,
    indexes: Vec<IndexInfo>,
}

/// Introspects the catalog database into the text used to ground SQL generation.
pub struct SchemaDescriber {
    db: Arc<CatalogDb>,
}

impl SchemaDescriber {
    pub fn new(db: Arc<CatalogDb>) -> Self {
        Self { db }
    }

    pub async fn describe(&self) -> Result<String> {
        let mut bounded = self.db.connect().await?;
        let outcome =
            tokio::time::timeout(bounded.remaining(), Self::collect_tables(&mut bounded.conn)).await;
        let tables = bounded.finish(outcome, "Schema introspection").await?;

        debug!(tables = tables.len(), "Described catalog schema");
        Ok(render(&tables))
    }

    async fn collect_tables(conn: &mut SqliteConnection) -> Result<Vec<TableInfo>> {
        let mut tables = Vec::new();
        for name in list_user_tables(conn).await? {
            let columns = Self::columns(conn, &name).await?;
            let foreign_keys = Self::foreign_keys(conn, &name).await;
            let indexes = Self::indexes(conn, &name).await;
            tables.push(TableInfo {
                name,
                columns,
                foreign_keys,
                indexes,
            });
        }
        Ok(tables)
    }

    async fn columns(conn: &mut SqliteConnection, table: &str) -> Result<Vec<ColumnInfo>> {
        let sql = format!("PRAGMA table_info({})", quote_ident(table));
        let rows = sqlx::query(&sql)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to read columns of {}: {}", table, e))
            })?;

        rows.iter()
            .map(|row| -> std::result::Result<ColumnInfo, sqlx::Error> {
                Ok(ColumnInfo {
                    name: row.try_get("name")?,
                    data_type: row.try_get("type")?,
                    primary_key: row.try_get::<i64, _>("pk")? > 0,
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to decode columns of {}: {}", table, e))
            })
    }

    /// Tables without foreign keys return an empty list.
    async fn foreign_keys(conn: &mut SqliteConnection, table: &str) -> Vec<ForeignKeyInfo> {
        let sql = format!("PRAGMA foreign_key_list({})", quote_ident(table));
        let rows = match sqlx::query(&sql).fetch_all(&mut *conn).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(table, error = %e, "Skipping foreign keys");
                return Vec::new();
            }
        };

        let mut keys: Vec<ForeignKeyInfo> = rows
            .iter()
            .map(|row| ForeignKeyInfo {
                from: row.try_get("from").unwrap_or_default(),
                table: row.try_get("table").unwrap_or_default(),
                // NULL when the reference targets the parent's primary key implicitly
                to: row
                    .try_get::<Option<String>, _>("to")
                    .ok()
                    .flatten()
                    .unwrap_or_default(),
            })
            .collect();
        keys.sort();
        keys
    }

    async fn indexes(conn: &mut SqliteConnection, table: &str) -> Vec<IndexInfo> {
        let sql = format!("PRAGMA index_list({})", quote_ident(table));
        let rows = match sqlx::query(&sql).fetch_all(&mut *conn).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(table, error = %e, "Skipping indexes");
                return Vec::new();
            }
        };

        let mut indexes: Vec<IndexInfo> = rows
            .iter()
            .map(|row| IndexInfo {
                name: row.try_get("name").unwrap_or_default(),
                unique: row.try_get::<i64, _>("unique").unwrap_or(0) != 0,
            })
            .filter(|index| !index.name.starts_with("sqlite_autoindex"))
            .collect();
        indexes.sort();
        indexes
    }
}

fn render(tables: &[TableInfo]) -> String {
    let mut out = String::new();
    for table in tables {
        out.push_str(&format!("Table: {}\n", table.name));
        out.push_str("Columns:\n");
        for column in &table.columns {
            out.push_str(&format!("  - {} ({})", column.name, column.data_type));
            if column.primary_key {
                out.push_str(" (PRIMARY KEY)");
            }
            out.push('\n');
        }

        if !table.foreign_keys.is_empty() {
            out.push_str("Foreign keys:\n");
            for fk in &table.foreign_keys {
                out.push_str(&format!(
                    "  - FOREIGN KEY ({}) REFERENCES {}({})\n",
                    fk.from, fk.table, fk.to
                ));
            }
        }

        if !table.indexes.is_empty() {
            out.push_str("Indexes:\n");
            for index in &table.indexes {
                let prefix = if index.unique { "UNIQUE " } else { "" };
                out.push_str(&format!("  - {}INDEX {}\n", prefix, index.name));
            }
        }
        out.push('\n');
    }
    out.trim_end().to_string()
}
