//! Postgres-backed store.
//!
//! Farm and power live as JSONB documents keyed by name in
//! `farmerbot_documents`; nodes live one row each in `farmerbot_nodes`,
//! ordered by the sequence assigned on first insert.

use async_trait::async_trait;
use farmerbot_id::NodeId;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::postgres::PgPool;
use sqlx::types::Json;
use sqlx::Row;

use super::{DbError, Store};
use crate::models::{Farm, Node, Power};

const FARM_KEY: &str = "farm";
const POWER_KEY: &str = "power";

/// Store for farm, node and power records in Postgres.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn get_document<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, DbError> {
        let row = sqlx::query(
            r#"
            SELECT body
            FROM farmerbot_documents
            WHERE key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)?;

        match row {
            Some(row) => {
                let body: serde_json::Value = row.try_get("body").map_err(DbError::Query)?;
                Ok(Some(serde_json::from_value(body)?))
            }
            None => Ok(None),
        }
    }

    async fn set_document<T: Serialize + Sync>(&self, key: &str, body: &T) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO farmerbot_documents (key, body, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (key) DO UPDATE
            SET body = EXCLUDED.body, updated_at = now()
            "#,
        )
        .bind(key)
        .bind(Json(body))
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;
        Ok(())
    }
}

fn decode_node(row: &sqlx::postgres::PgRow) -> Result<Node, DbError> {
    let body: serde_json::Value = row.try_get("body").map_err(DbError::Query)?;
    Ok(serde_json::from_value(body)?)
}

#[async_trait]
impl Store for PgStore {
    async fn get_farm(&self) -> Result<Farm, DbError> {
        self.get_document(FARM_KEY)
            .await?
            .ok_or_else(|| DbError::not_found("farm", "definition"))
    }

    async fn set_farm(&self, farm: &Farm) -> Result<(), DbError> {
        self.set_document(FARM_KEY, farm).await
    }

    async fn get_power(&self) -> Result<Power, DbError> {
        Ok(self.get_document(POWER_KEY).await?.unwrap_or_default())
    }

    async fn set_power(&self, power: &Power) -> Result<(), DbError> {
        self.set_document(POWER_KEY, power).await
    }

    async fn get_node(&self, id: NodeId) -> Result<Node, DbError> {
        let row = sqlx::query(
            r#"
            SELECT body
            FROM farmerbot_nodes
            WHERE node_id = $1
            "#,
        )
        .bind(i64::from(id.get()))
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)?
        .ok_or_else(|| DbError::not_found("node", id))?;

        decode_node(&row)
    }

    async fn get_nodes(&self) -> Result<Vec<Node>, DbError> {
        let rows = sqlx::query(
            r#"
            SELECT body
            FROM farmerbot_nodes
            ORDER BY seq ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?;

        rows.iter().map(decode_node).collect()
    }

    async fn update_node(&self, node: &Node) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO farmerbot_nodes (node_id, body, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (node_id) DO UPDATE
            SET body = EXCLUDED.body, updated_at = now()
            "#,
        )
        .bind(i64::from(node.id.get()))
        .bind(Json(node))
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;
        Ok(())
    }

    async fn set_nodes(&self, nodes: &[Node]) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await.map_err(DbError::Query)?;

        sqlx::query("DELETE FROM farmerbot_nodes")
            .execute(&mut *tx)
            .await
            .map_err(DbError::Query)?;

        for node in nodes {
            sqlx::query(
                r#"
                INSERT INTO farmerbot_nodes (node_id, body, updated_at)
                VALUES ($1, $2, now())
                "#,
            )
            .bind(i64::from(node.id.get()))
            .bind(Json(node))
            .execute(&mut *tx)
            .await
            .map_err(DbError::Query)?;
        }

        tx.commit().await.map_err(DbError::Query)?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), DbError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(DbError::Query)?;
        Ok(())
    }
}
