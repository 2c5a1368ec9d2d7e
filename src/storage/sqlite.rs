//! SQLite-backed metadata registry.
//!
//! One row per object. The namespace key is enforced unique by the schema, and
//! the version list (with its block manifests) is kept as a JSON column since
//! it is only ever read and written as a whole.

use super::{
    error::{StorageError, StorageResult},
    metadata_registry::MetadataRegistry,
};
use crate::models::{ObjectId, ObjectMetadata, Version};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    FromRow, Sqlite, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::str::FromStr;
use tracing::debug;

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

#[derive(FromRow, Debug)]
struct MetadataRow {
    object_id: i64,
    grp: String,
    partition: String,
    path: String,
    name: String,
    versions: String,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
}

impl MetadataRow {
    fn into_metadata(self) -> StorageResult<ObjectMetadata> {
        let versions: Vec<Version> = serde_json::from_str(&self.versions)?;
        Ok(ObjectMetadata {
            // ids are stored bit-for-bit in SQLite's signed INTEGER
            id: ObjectId::from_raw(self.object_id as u64),
            group: self.grp,
            partition: self.partition,
            path: self.path,
            name: self.name,
            versions,
            created_at: self.created_at,
            modified_at: self.modified_at,
        })
    }
}

const SELECT_COLUMNS: &str =
    "SELECT object_id, grp, partition, path, name, versions, created_at, modified_at \
     FROM object_metadata";

#[derive(Clone, Debug)]
pub struct SqliteMetadataRegistry {
    pool: SqlitePool,
}

impl SqliteMetadataRegistry {
    /// Open (creating if missing) the database at `url`.
    pub async fn connect(url: &str, max_connections: u32) -> StorageResult<Self> {
        let opts = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;
        Ok(Self { pool })
    }

    /// Apply the embedded schema. Idempotent.
    pub async fn migrate(&self) -> StorageResult<()> {
        let statements = SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        for stmt in statements {
            debug!("executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn fetch_optional(
        &self,
        sql: &str,
        binds: (&str, &str, &str),
        last: LastBind<'_>,
    ) -> StorageResult<Option<ObjectMetadata>> {
        let query = sqlx::query_as::<Sqlite, MetadataRow>(sql)
            .bind(binds.0)
            .bind(binds.1)
            .bind(binds.2);
        let query = match last {
            LastBind::Name(name) => query.bind(name),
            LastBind::Id(id) => query.bind(id.as_u64() as i64),
        };
        query
            .fetch_optional(&self.pool)
            .await?
            .map(MetadataRow::into_metadata)
            .transpose()
    }
}

enum LastBind<'a> {
    Name(&'a str),
    Id(ObjectId),
}

/// Return true if the SQLx error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

#[async_trait]
impl MetadataRegistry for SqliteMetadataRegistry {
    async fn create(&self, metadata: &ObjectMetadata) -> StorageResult<()> {
        let versions = serde_json::to_string(&metadata.versions)?;
        let result = sqlx::query(
            "INSERT INTO object_metadata
                (object_id, grp, partition, path, name, versions, created_at, modified_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(metadata.id.as_u64() as i64)
        .bind(&metadata.group)
        .bind(&metadata.partition)
        .bind(&metadata.path)
        .bind(&metadata.name)
        .bind(versions)
        .bind(metadata.created_at)
        .bind(metadata.modified_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(StorageError::Conflict(format!(
                "object {} already exists",
                metadata.namespace_key()
            ))),
            Err(err) => Err(StorageError::Sqlx(err)),
        }
    }

    async fn update(&self, metadata: &ObjectMetadata) -> StorageResult<()> {
        let versions = serde_json::to_string(&metadata.versions)?;
        let result = sqlx::query(
            "UPDATE object_metadata SET versions = ?, modified_at = ? WHERE object_id = ?",
        )
        .bind(versions)
        .bind(metadata.modified_at)
        .bind(metadata.id.as_u64() as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("object {}", metadata.id)));
        }
        Ok(())
    }

    async fn delete(&self, metadata: &ObjectMetadata) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM object_metadata WHERE object_id = ?")
            .bind(metadata.id.as_u64() as i64)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("object {}", metadata.id)));
        }
        Ok(())
    }

    async fn metadata_by_object_name(
        &self,
        group: &str,
        partition: &str,
        path: &str,
        name: &str,
    ) -> StorageResult<ObjectMetadata> {
        let sql = format!(
            "{} WHERE grp = ? AND partition = ? AND path = ? AND name = ?",
            SELECT_COLUMNS
        );
        self.fetch_optional(&sql, (group, partition, path), LastBind::Name(name))
            .await?
            .ok_or_else(|| {
                StorageError::NotFound(format!("object {}/{}:{}/{}", group, partition, path, name))
            })
    }

    async fn metadata_by_object_id(
        &self,
        group: &str,
        partition: &str,
        path: &str,
        id: ObjectId,
    ) -> StorageResult<ObjectMetadata> {
        let sql = format!(
            "{} WHERE grp = ? AND partition = ? AND path = ? AND object_id = ?",
            SELECT_COLUMNS
        );
        self.fetch_optional(&sql, (group, partition, path), LastBind::Id(id))
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("object {}", id)))
    }

    async fn find_metadata(
        &self,
        group: &str,
        partition: &str,
        path: &str,
    ) -> StorageResult<Vec<ObjectMetadata>> {
        let sql = format!(
            "{} WHERE grp = ? AND partition = ? AND path = ? ORDER BY name ASC",
            SELECT_COLUMNS
        );
        let rows: Vec<MetadataRow> = sqlx::query_as(&sql)
            .bind(group)
            .bind(partition)
            .bind(path)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(MetadataRow::into_metadata).collect()
    }

    async fn health_check(&self) -> StorageResult<()> {
        let v = sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        if v != 1 {
            return Err(StorageError::Backend(format!("unexpected result: {}", v)));
        }
        Ok(())
    }
}
