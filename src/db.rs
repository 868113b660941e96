use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{PgPool, Row};

use crate::error::StoreError;
use crate::store::{merge_at, put_at, segments, DocumentStore, StoreRead};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Document tree kept as one JSONB value per named root.
///
/// Reads pull only the requested subtree; writes lock the row and rewrite
/// the whole tree inside a transaction.
#[derive(Debug, Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
    tree: String,
}

impl PgDocumentStore {
    pub fn with_tree(pool: PgPool, tree: &str) -> Self {
        Self {
            pool,
            tree: tree.to_string(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn rewrite<F>(&self, path: &str, edit: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Value) -> Result<(), StoreError> + Send,
    {
        let unavailable = |e: sqlx::Error| StoreError::unavailable(path, e);
        let mut tx = self.pool.begin().await.map_err(unavailable)?;

        sqlx::query(
            "INSERT INTO college_store.trees (name) VALUES ($1) ON CONFLICT (name) DO NOTHING",
        )
        .bind(&self.tree)
        .execute(&mut *tx)
        .await
        .map_err(unavailable)?;

        let mut root: Value =
            sqlx::query("SELECT root FROM college_store.trees WHERE name = $1 FOR UPDATE")
                .bind(&self.tree)
                .fetch_one(&mut *tx)
                .await
                .map_err(unavailable)?
                .try_get("root")
                .map_err(unavailable)?;

        edit(&mut root)?;

        sqlx::query(
            r#"
            UPDATE college_store.trees
            SET root = $2, updated_at = now()
            WHERE name = $1
            "#,
        )
        .bind(&self.tree)
        .bind(&root)
        .execute(&mut *tx)
        .await
        .map_err(unavailable)?;

        tx.commit().await.map_err(unavailable)
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn read(&self, path: &str) -> Result<StoreRead, StoreError> {
        let keys: Vec<String> = segments(path).into_iter().map(str::to_string).collect();
        let row = sqlx::query("SELECT root #> $2 AS value FROM college_store.trees WHERE name = $1")
            .bind(&self.tree)
            .bind(&keys)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::unavailable(path, e))?;

        let Some(row) = row else {
            return Ok(StoreRead::absent());
        };
        let value: Option<Value> = row
            .try_get("value")
            .map_err(|e| StoreError::unavailable(path, e))?;
        Ok(value.map(StoreRead::found).unwrap_or_else(StoreRead::absent))
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        self.rewrite(path, |root| put_at(root, &segments(path), value)).await
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), StoreError> {
        self.rewrite(path, |root| merge_at(root, &segments(path), fields)).await
    }
}
