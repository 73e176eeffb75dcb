use crate::domain::error::{AppError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Connection, Row};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::time::error::Elapsed;
use tracing::debug;

/// SQLite virtual machine steps between deadline checks.
const PROGRESS_STEPS: i32 = 1000;

/// Read-only handle on the catalog database file.
///
/// Every operation opens its own connection so a slow statement never holds
/// a shared pool slot; callers close the connection when they are done.
#[derive(Debug, Clone)]
pub struct CatalogDb {
    path: PathBuf,
    options: SqliteConnectOptions,
    timeout: Duration,
}

impl CatalogDb {
    pub fn open(path: &Path, timeout_secs: u64) -> Result<Self> {
        if !path.exists() {
            return Err(AppError::NotFound(format!(
                "Database file not found at {}",
                path.display()
            )));
        }

        let timeout = Duration::from_secs(timeout_secs);
        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .busy_timeout(timeout);

        Ok(Self {
            path: path.to_path_buf(),
            options,
            timeout,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Opens a connection whose statements are interrupted once the configured
    /// timeout has passed, counted from this call.
    pub async fn connect(&self) -> Result<BoundedConnection> {
        let deadline = Instant::now() + self.timeout;

        let mut conn =
            tokio::time::timeout(self.timeout, SqliteConnection::connect_with(&self.options))
                .await
                .map_err(|_| {
                    AppError::Timeout(format!(
                        "Connecting to {} took longer than {:?}",
                        self.path.display(),
                        self.timeout
                    ))
                })?
                .map_err(|e| AppError::DatabaseError(format!("Failed to connect: {}", e)))?;

        {
            let mut handle = conn
                .lock_handle()
                .await
                .map_err(|e| AppError::DatabaseError(format!("Failed to lock connection: {}", e)))?;
            // Returning false makes SQLite abort the running statement.
            handle.set_progress_handler(PROGRESS_STEPS, move || Instant::now() < deadline);
        }

        Ok(BoundedConnection {
            conn,
            deadline,
            timeout: self.timeout,
        })
    }
}

/// A catalog connection with a wall-clock deadline on everything it runs.
pub struct BoundedConnection {
    pub conn: SqliteConnection,
    deadline: Instant,
    timeout: Duration,
}

impl BoundedConnection {
    /// Time left before the deadline; zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Ends the connection and turns the bounded outcome into a result.
    ///
    /// On timeout the connection is dropped rather than closed: a close would
    /// queue behind the statement still running on the worker thread.
    pub async fn finish<T>(
        self,
        outcome: std::result::Result<Result<T>, Elapsed>,
        what: &str,
    ) -> Result<T> {
        let timed_out = AppError::Timeout(format!(
            "{} timed out after {} seconds",
            what,
            self.timeout.as_secs()
        ));

        let result = match outcome {
            Ok(result) => result,
            Err(_) => {
                drop(self.conn);
                return Err(timed_out);
            }
        };

        if let Err(e) = self.conn.close().await {
            debug!(error = %e, "Failed to close catalog connection cleanly");
        }

        match result {
            // An interrupted statement surfaces as a database error.
            Err(_) if Instant::now() >= self.deadline => Err(timed_out),
            other => other,
        }
    }
}

pub async fn list_user_tables(conn: &mut SqliteConnection) -> Result<Vec<String>> {
    let rows = sqlx::query(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(format!("Failed to list tables: {}", e)))?;

    rows.iter()
        .map(|row| {
            row.try_get::<String, _>("name")
                .map_err(|e| AppError::DatabaseError(format!("Invalid table row: {}", e)))
        })
        .collect()
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Converts one SQLite cell into JSON, following the value's runtime storage class.
pub fn column_value(row: &SqliteRow, index: usize) -> serde_json::Value {
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v
            .map(|n| serde_json::Value::Number(n.into()))
            .unwrap_or(serde_json::Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v
            .and_then(serde_json::Number::from_f64)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v
            .map(serde_json::Value::String)
            .unwrap_or(serde_json::Value::Null);
    }
    if let Ok(Some(bytes)) = row.try_get::<Option<Vec<u8>>, _>(index) {
        return serde_json::Value::String(format!("<{} bytes>", bytes.len()));
    }

    serde_json::Value::Null
}

#[cfg(test)]
pub(crate) mod test_support {
    use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
    use sqlx::Connection;
    use std::path::PathBuf;

    /// Creates a throwaway database file seeded with the given statements.
    pub async fn seeded_db(statements: &[&str]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("brewdesk-{}.db", uuid::Uuid::new_v4()));
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);
        let mut conn = SqliteConnection::connect_with(&options).await.unwrap();
        for statement in statements {
            sqlx::query(statement).execute(&mut conn).await.unwrap();
        }
        conn.close().await.unwrap();
        path
    }

    /// A table whose six-way self join takes seconds to count.
    pub const CROSS_JOIN_TABLE: &[&str] = &[
        "CREATE TABLE T (x INTEGER)",
        "INSERT INTO T (x) WITH RECURSIVE seq(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM seq WHERE x < 25) SELECT x FROM seq",
    ];

    pub const SLOW_COUNT: &str = "SELECT COUNT(*) FROM T a, T b, T c, T d, T e, T f";

    pub const SHOP_SCHEMA: &[&str] = &[
        "CREATE TABLE Categories (Id INTEGER PRIMARY KEY AUTOINCREMENT, Name TEXT NOT NULL, Description TEXT)",
        "CREATE TABLE Product (Id INTEGER PRIMARY KEY AUTOINCREMENT, Categories_id INTEGER, Name TEXT NOT NULL, Price REAL, Descriptions TEXT, Link_Image TEXT, FOREIGN KEY (Categories_id) REFERENCES Categories(Id))",
        "CREATE INDEX idx_product_price ON Product(Price)",
        "CREATE UNIQUE INDEX idx_product_name ON Product(Name)",
        "CREATE TABLE Customers (id INTEGER PRIMARY KEY, name TEXT, sex TEXT, age INTEGER, picture BLOB, embedding BLOB)",
        "CREATE TABLE Orders (Id INTEGER PRIMARY KEY, Customer_id INTEGER, Store_id INTEGER, Order_date TEXT, FOREIGN KEY (Customer_id) REFERENCES Customers(id))",
        "CREATE TABLE Order_detail (Id INTEGER PRIMARY KEY, Order_id INTEGER, Product_id INTEGER, Quantity INTEGER, Price REAL, Rate INTEGER, FOREIGN KEY (Order_id) REFERENCES Orders(Id), FOREIGN KEY (Product_id) REFERENCES Product(Id))",
        "INSERT INTO Categories (Name, Description) VALUES ('Cà phê', 'Cà phê pha phin'), ('Trà sữa', 'Trà sữa trân châu')",
        "INSERT INTO Product (Categories_id, Name, Price, Descriptions, Link_Image) VALUES (1, 'Cà phê sữa đá', 25000, 'Cà phê phin đậm đà với sữa đặc và đá', 'a.png'), (1, 'Bạc xỉu', 29000, 'Nhiều sữa, ít cà phê, vị ngọt béo', 'b.png'), (2, 'Trà sữa trân châu đường đen', 45000, 'Trà sữa với trân châu nấu đường đen', 'c.png'), (2, 'Trà đào cam sả', 39000, 'Trà đào thanh mát với cam và sả', NULL)",
        "INSERT INTO Customers (id, name, sex, age) VALUES (1, 'Lan', 'Nữ', 24), (2, 'Minh', 'Nam', 31)",
        "INSERT INTO Orders (Id, Customer_id, Store_id, Order_date) VALUES (1, 1, 1, '2024-05-01'), (2, 1, 1, '2024-05-09'), (3, 2, 1, '2024-05-03')",
        "INSERT INTO Order_detail (Order_id, Product_id, Quantity, Price, Rate) VALUES (1, 1, 2, 25000, 5), (2, 3, 1, 45000, 4), (3, 2, 1, 29000, NULL)",
    ];
}
