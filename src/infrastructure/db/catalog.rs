use super::sqlite::{column_value, list_user_tables, quote_ident, CatalogDb};
use crate::domain::conversation::UserKey;
use crate::domain::customer::{CallerProfile, PurchaseRecord, PURCHASE_HISTORY_LIMIT};
use crate::domain::error::{AppError, Result};
use crate::domain::retrieval::{PassageMetadata, RetrievedPassage};
use sqlx::sqlite::SqliteConnection;
use sqlx::{Column, Row};
use std::sync::Arc;
use tracing::info;

const MISSING_VALUE: &str = "không có";

/// Human-readable Vietnamese labels for catalog columns, per table.
fn column_label(table: &str, column: &str) -> Option<&'static str> {
    let label = match (table.to_ascii_lowercase().as_str(), column) {
        ("categories", "Id") => "id danh mục",
        ("categories", "Name") => "tên danh mục",
        ("categories", "Description") => "mô tả danh mục",

        ("product", "Id") => "id sản phẩm",
        ("product", "Name") => "tên sản phẩm",
        ("product", "Categories_id") => "id danh mục",
        ("product", "Product_Prep") => "thành phần sản phẩm",
        ("product", "Calories") => "calo",
        ("product", "Dietary_Fibre_g") => "chất xơ",
        ("product", "Sugars_g") => "đường",
        ("product", "Protein_g") => "protein",
        ("product", "Vitamin_A") => "vitamin A",
        ("product", "Vitamin_C") => "vitamin C",
        ("product", "Caffeine_mg") => "caffeine",
        ("product", "Price") => "đơn giá",
        ("product", "Sales_rank") => "hạng bán chạy",
        ("product", "Descriptions") => "mô tả sản phẩm",

        ("store", "Id") => "id cửa hàng",
        ("store", "Name") => "tên cửa hàng",
        ("store", "Address") => "địa chỉ",
        ("store", "Phone") => "số điện thoại",
        ("store", "Open_Close") => "giờ mở cửa đóng cửa",

        ("orders", "Id") => "id đơn hàng",
        ("orders", "Customer_id") => "id khách hàng",
        ("orders", "Store_id") => "id cửa hàng",
        ("orders", "Order_date") => "ngày đặt hàng",

        ("order_detail", "Order_id") => "id đơn hàng",
        ("order_detail", "Product_id") => "id sản phẩm",
        ("order_detail", "Quantity") => "số lượng",
        ("order_detail", "Price") => "đơn giá",
        ("order_detail", "Rate") => "đánh giá",

        ("customer_preferences", "Customer_id") => "id khách hàng",
        ("customer_preferences", "Preferred_categories") => "danh mục ưa thích",
        ("customer_preferences", "Max_price") => "giá tối đa",

        ("customers", "id") => "id khách hàng",
        ("customers", "name") => "tên khách hàng",
        ("customers", "sex") => "giới tính",
        ("customers", "age") => "tuổi",
        ("customers", "location") => "địa chỉ",
        _ => return None,
    };
    Some(label)
}

/// Columns that never go into index passages (binary blobs and image links).
fn is_excluded(table: &str, column: &str) -> bool {
    let table = table.to_ascii_lowercase();
    (table == "customers" && matches!(column, "embedding" | "picture"))
        || (table == "product" && column == "Link_Image")
}

fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => MISSING_VALUE.to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Read-side lookups used by request handling and index building.
pub struct CatalogRepository {
    db: Arc<CatalogDb>,
}

impl CatalogRepository {
    pub fn new(db: Arc<CatalogDb>) -> Self {
        Self { db }
    }

    pub async fn caller_profile(&self, user_key: &UserKey) -> Result<Option<CallerProfile>> {
        let Some(id) = user_key.account_id() else {
            return Ok(None);
        };

        let mut bounded = self.db.connect().await?;
        let outcome =
            tokio::time::timeout(bounded.remaining(), fetch_profile(&mut bounded.conn, id)).await;
        bounded.finish(outcome, "Customer lookup").await
    }

    /// The most recent purchases for an account, newest first.
    pub async fn purchase_history(&self, user_key: &UserKey) -> Result<Vec<PurchaseRecord>> {
        let Some(id) = user_key.account_id() else {
            return Ok(Vec::new());
        };

        let mut bounded = self.db.connect().await?;
        let outcome =
            tokio::time::timeout(bounded.remaining(), fetch_purchases(&mut bounded.conn, id))
                .await;
        bounded.finish(outcome, "Purchase lookup").await
    }

    /// One passage per row across every user table, for the catalog index.
    pub async fn load_catalog_documents(&self) -> Result<Vec<RetrievedPassage>> {
        let mut bounded = self.db.connect().await?;
        let outcome =
            tokio::time::timeout(bounded.remaining(), fetch_catalog_rows(&mut bounded.conn)).await;
        let documents = bounded.finish(outcome, "Catalog scan").await?;

        info!(documents = documents.len(), "Loaded catalog rows for indexing");
        Ok(documents)
    }

    /// One passage per product that has a description, for the description index.
    pub async fn load_product_descriptions(&self) -> Result<Vec<RetrievedPassage>> {
        let mut bounded = self.db.connect().await?;
        let outcome =
            tokio::time::timeout(bounded.remaining(), fetch_descriptions(&mut bounded.conn)).await;
        let documents = bounded.finish(outcome, "Product scan").await?;

        info!(documents = documents.len(), "Loaded product descriptions for indexing");
        Ok(documents)
    }
}

async fn fetch_profile(conn: &mut SqliteConnection, id: i64) -> Result<Option<CallerProfile>> {
    let row = sqlx::query("SELECT id, name, sex FROM Customers WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to load customer {}: {}", id, e)))?;

    Ok(row.map(|row| CallerProfile {
        id,
        name: row
            .try_get::<Option<String>, _>("name")
            .ok()
            .flatten()
            .unwrap_or_default(),
        attribute: row.try_get::<Option<String>, _>("sex").ok().flatten(),
    }))
}

async fn fetch_purchases(conn: &mut SqliteConnection, id: i64) -> Result<Vec<PurchaseRecord>> {
    let sql = r#"
        SELECT o.Order_date AS date,
               p.Name AS product_name,
               od.Quantity AS quantity,
               p.Price * od.Quantity AS price,
               od.Rate AS rating
        FROM Orders o
        JOIN Order_detail od ON od.Order_id = o.Id
        JOIN Product p ON p.Id = od.Product_id
        WHERE o.Customer_id = ?
        ORDER BY o.Order_date DESC
        LIMIT ?
    "#;

    let rows = sqlx::query(sql)
        .bind(id)
        .bind(PURCHASE_HISTORY_LIMIT)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!("Failed to load purchases for {}: {}", id, e))
        })?;

    Ok(rows
        .iter()
        .map(|row| PurchaseRecord {
            date: row
                .try_get::<Option<String>, _>("date")
                .ok()
                .flatten()
                .unwrap_or_default(),
            product_name: row
                .try_get::<Option<String>, _>("product_name")
                .ok()
                .flatten()
                .unwrap_or_default(),
            quantity: row
                .try_get::<Option<i64>, _>("quantity")
                .ok()
                .flatten()
                .unwrap_or(0),
            price: number_as_f64(&column_value(row, 3)),
            rating: row.try_get::<Option<i64>, _>("rating").ok().flatten(),
        })
        .collect())
}

async fn fetch_catalog_rows(conn: &mut SqliteConnection) -> Result<Vec<RetrievedPassage>> {
    let mut documents = Vec::new();
    for table in list_user_tables(conn).await? {
        let sql = format!("SELECT * FROM {}", quote_ident(&table));
        let rows = sqlx::query(&sql)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to read {}: {}", table, e)))?;

        for (row_index, row) in rows.iter().enumerate() {
            let mut columns = Vec::new();
            let mut data = serde_json::Map::new();
            let mut parts = Vec::new();

            for (i, column) in row.columns().iter().enumerate() {
                let name = column.name();
                if is_excluded(&table, name) {
                    continue;
                }
                let value = column_value(row, i);
                let label = column_label(&table, name).unwrap_or(name);
                parts.push(format!("{}: {}", label, display_value(&value)));
                columns.push(name.to_string());
                data.insert(name.to_string(), value);
            }

            documents.push(RetrievedPassage {
                text: format!("Bảng {}: {}", table, parts.join(", ")),
                metadata: PassageMetadata::Row {
                    table: table.clone(),
                    columns,
                    data,
                    row_index,
                },
            });
        }
    }
    Ok(documents)
}

async fn fetch_descriptions(conn: &mut SqliteConnection) -> Result<Vec<RetrievedPassage>> {
    let rows = sqlx::query("SELECT Name, Descriptions FROM Product")
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to read products: {}", e)))?;

    Ok(rows
        .iter()
        .filter_map(|row| {
            let name = row.try_get::<Option<String>, _>("Name").ok().flatten()?;
            let description = row
                .try_get::<Option<String>, _>("Descriptions")
                .ok()
                .flatten()
                .filter(|d| !d.trim().is_empty())?;
            Some(RetrievedPassage {
                text: description.clone(),
                metadata: PassageMetadata::Product { name, description },
            })
        })
        .collect())
}

fn number_as_f64(value: &serde_json::Value) -> f64 {
    value.as_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::db::sqlite::test_support::{seeded_db, SHOP_SCHEMA};

    async fn repository() -> (CatalogRepository, std::path::PathBuf) {
        let path = seeded_db(SHOP_SCHEMA).await;
        let db = Arc::new(CatalogDb::open(&path, 5).unwrap());
        (CatalogRepository::new(db), path)
    }

    #[tokio::test]
    async fn test_caller_profile() {
        let (repo, path) = repository().await;

        let profile = repo.caller_profile(&UserKey::Account(1)).await.unwrap().unwrap();
        assert_eq!(profile.name, "Lan");
        assert_eq!(profile.attribute.as_deref(), Some("Nữ"));

        assert!(repo.caller_profile(&UserKey::Account(99)).await.unwrap().is_none());
        assert!(repo.caller_profile(&UserKey::Anonymous).await.unwrap().is_none());
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_purchase_history_newest_first() {
        let (repo, path) = repository().await;

        let purchases = repo.purchase_history(&UserKey::Account(1)).await.unwrap();
        assert_eq!(purchases.len(), 2);
        assert_eq!(purchases[0].date, "2024-05-09");
        assert_eq!(purchases[0].product_name, "Trà sữa trân châu đường đen");
        assert_eq!(purchases[1].quantity, 2);
        assert_eq!(purchases[1].price, 50000.0);
        assert_eq!(purchases[1].rating, Some(5));

        let other = repo.purchase_history(&UserKey::Account(2)).await.unwrap();
        assert_eq!(other.len(), 1);
        assert_eq!(other[0].rating, None);

        assert!(repo.purchase_history(&UserKey::Anonymous).await.unwrap().is_empty());
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_catalog_documents_use_labels_and_skip_blobs() {
        let (repo, path) = repository().await;

        let documents = repo.load_catalog_documents().await.unwrap();
        // 2 categories + 2 customers + 3 order lines + 3 orders + 4 products
        assert_eq!(documents.len(), 14);

        let product = documents
            .iter()
            .find(|d| d.text.starts_with("Bảng Product:") && d.text.contains("Bạc xỉu"))
            .unwrap();
        assert!(product.text.contains("tên sản phẩm: Bạc xỉu"));
        assert!(!product.text.contains("b.png"));
        match &product.metadata {
            PassageMetadata::Row { table, columns, .. } => {
                assert_eq!(table, "Product");
                assert!(!columns.contains(&"Link_Image".to_string()));
            }
            other => panic!("unexpected metadata {:?}", other),
        }

        let customer = documents
            .iter()
            .find(|d| d.text.starts_with("Bảng Customers:") && d.text.contains("Minh"))
            .unwrap();
        assert!(customer.text.contains("giới tính: Nam"));
        assert!(!customer.text.contains("embedding"));

        let unrated = documents
            .iter()
            .find(|d| d.text.starts_with("Bảng Order_detail:") && d.text.contains("đánh giá: không có"));
        assert!(unrated.is_some());
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_product_descriptions() {
        let (repo, path) = repository().await;

        let documents = repo.load_product_descriptions().await.unwrap();
        assert_eq!(documents.len(), 4);
        assert!(documents.iter().any(|d| matches!(
            &d.metadata,
            PassageMetadata::Product { name, .. } if name == "Trà đào cam sả"
        )));
        let _ = std::fs::remove_file(path);
    }
}
