use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, FutureExt};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Error as SqlxError, Row};
use tracing::{error, info};

use super::store::{DocStore, StoreError, StoreResult};
use crate::models::{
    normalize_collaborators, Collaborator, Comment, Document, DocumentId, NewComment, NewDocument,
    ScenePayload, UserId, Version, VersionRange,
};

const SCHEMA: [&str; 6] = [
    r#"
    CREATE TABLE IF NOT EXISTS canvas_documents (
        id TEXT PRIMARY KEY,
        owner TEXT NOT NULL,
        scene JSONB NOT NULL,
        head_seq BIGINT NOT NULL DEFAULT 0,
        comment_seq BIGINT NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS canvas_collaborators (
        document TEXT NOT NULL REFERENCES canvas_documents(id),
        user_id TEXT NOT NULL,
        role TEXT NOT NULL,
        PRIMARY KEY (document, user_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS canvas_versions (
        document TEXT NOT NULL REFERENCES canvas_documents(id),
        seq BIGINT NOT NULL,
        scene JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (document, seq)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS canvas_comments (
        document TEXT NOT NULL REFERENCES canvas_documents(id),
        seq BIGINT NOT NULL,
        author TEXT NOT NULL,
        text TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (document, seq)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS canvas_collaborators_user_idx ON canvas_collaborators (user_id)",
    "CREATE INDEX IF NOT EXISTS canvas_documents_owner_idx ON canvas_documents (owner)",
];

const DOCUMENT_SELECT: &str = r#"
    SELECT
        d.id,
        d.owner,
        d.scene,
        d.head_seq,
        d.created_at,
        d.updated_at,
        COALESCE(
            (SELECT json_agg(json_build_object('userId', c.user_id, 'role', c.role) ORDER BY c.user_id)
             FROM canvas_collaborators c WHERE c.document = d.id),
            '[]'
        ) AS collaborators
    FROM canvas_documents d
"#;

/// Postgres-backed document store.
///
/// Sequence numbers come from counters on the document row. Bumping the
/// counter with `UPDATE ... RETURNING` takes the row lock, so concurrent
/// appends for one document queue on that row while other documents
/// proceed untouched.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new database connection pool and make sure the schema exists
    pub async fn connect(database_url: &str) -> Result<Self, SqlxError> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await?;

        info!("Database connection pool created successfully");

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<(), SqlxError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("Database schema verified");
        Ok(())
    }

    async fn begin(&self) -> Result<sqlx::Transaction<'static, sqlx::Postgres>, SqlxError> {
        let pool_idle = self.pool.num_idle() as u32;
        let pool_size = self.pool.size();
        match self.pool.begin().await {
            Ok(tx) => Ok(tx),
            Err(e) => {
                error!(
                    "Failed to acquire connection from pool: {}. Pool state: {} idle, {} total",
                    e, pool_idle, pool_size
                );
                Err(e)
            }
        }
    }

    async fn fetch_document<'e, E>(executor: E, id: &DocumentId) -> StoreResult<Option<Document>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let sql = format!("{} WHERE d.id = $1", DOCUMENT_SELECT);
        let row = sqlx::query(&sql).bind(id.as_str()).fetch_optional(executor).await?;
        row.map(|r| document_from_row(&r)).transpose()
    }
}

fn to_seq(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn to_db_seq(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn document_from_row(row: &PgRow) -> StoreResult<Document> {
    let collaborators: Vec<Collaborator> = serde_json::from_value(row.try_get("collaborators")?)
        .map_err(|e| StoreError::Backend(format!("Corrupt collaborator list: {}", e)))?;
    let id: String = row.try_get("id")?;
    let owner: String = row.try_get("owner")?;
    let scene: serde_json::Value = row.try_get("scene")?;
    Ok(Document {
        id: id.into(),
        owner: owner.into(),
        scene: ScenePayload::new(scene),
        head_seq: to_seq(row.try_get("head_seq")?),
        collaborators,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn version_from_row(row: &PgRow) -> StoreResult<Version> {
    let scene: serde_json::Value = row.try_get("scene")?;
    Ok(Version {
        seq: to_seq(row.try_get("seq")?),
        scene: ScenePayload::new(scene),
        created_at: row.try_get("created_at")?,
    })
}

async fn replace_collaborators(
    tx: &mut sqlx::Transaction<'static, sqlx::Postgres>,
    id: &DocumentId,
    collaborators: &[Collaborator],
) -> Result<(), SqlxError> {
    sqlx::query("DELETE FROM canvas_collaborators WHERE document = $1")
        .bind(id.as_str())
        .execute(&mut **tx)
        .await?;
    for collaborator in collaborators {
        sqlx::query("INSERT INTO canvas_collaborators (document, user_id, role) VALUES ($1, $2, $3)")
            .bind(id.as_str())
            .bind(collaborator.user_id.as_str())
            .bind(collaborator.role.as_str())
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

impl DocStore for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    fn get_document<'a>(&'a self, id: &'a DocumentId) -> BoxFuture<'a, StoreResult<Option<Document>>> {
        async move { Self::fetch_document(&self.pool, id).await }.boxed()
    }

    fn create_document(&self, new_doc: NewDocument, at: DateTime<Utc>) -> BoxFuture<'_, StoreResult<Document>> {
        async move {
            let id = new_doc.id.unwrap_or_else(DocumentId::generate);
            let collaborators = normalize_collaborators(&new_doc.owner, new_doc.collaborators);

            let mut tx = self.begin().await?;
            let inserted = sqlx::query(
                r#"
                INSERT INTO canvas_documents (id, owner, scene, head_seq, comment_seq, created_at, updated_at)
                VALUES ($1, $2, $3, 0, 0, $4, $4)
                ON CONFLICT (id) DO NOTHING
                RETURNING id;
                "#,
            )
            .bind(id.as_str())
            .bind(new_doc.owner.as_str())
            .bind(new_doc.scene.as_json())
            .bind(at)
            .fetch_optional(&mut *tx)
            .await?;

            if inserted.is_none() {
                return Err(StoreError::Conflict(format!("Document '{}' already exists", id)));
            }

            replace_collaborators(&mut tx, &id, &collaborators).await?;
            let doc = Self::fetch_document(&mut *tx, &id).await?.ok_or(StoreError::NotFound)?;
            tx.commit().await?;

            info!("Document {} created for owner {}", id, doc.owner);
            Ok(doc)
        }
        .boxed()
    }

    fn set_collaborators<'a>(
        &'a self,
        id: &'a DocumentId,
        collaborators: Vec<Collaborator>,
        at: DateTime<Utc>,
    ) -> BoxFuture<'a, StoreResult<Document>> {
        async move {
            let mut tx = self.begin().await?;
            let owner_row = sqlx::query("UPDATE canvas_documents SET updated_at = $2 WHERE id = $1 RETURNING owner")
                .bind(id.as_str())
                .bind(at)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(StoreError::NotFound)?;
            let owner: String = owner_row.try_get("owner")?;

            let collaborators = normalize_collaborators(&UserId::from(owner), collaborators);
            replace_collaborators(&mut tx, id, &collaborators).await?;
            let doc = Self::fetch_document(&mut *tx, id).await?.ok_or(StoreError::NotFound)?;
            tx.commit().await?;
            Ok(doc)
        }
        .boxed()
    }

    fn append_version<'a>(
        &'a self,
        id: &'a DocumentId,
        scene: ScenePayload,
        at: DateTime<Utc>,
    ) -> BoxFuture<'a, StoreResult<Version>> {
        async move {
            let mut tx = self.begin().await?;

            // Row lock held until commit serializes appends on this document
            let row = sqlx::query(
                r#"
                UPDATE canvas_documents
                SET head_seq = head_seq + 1,
                    scene = $2,
                    updated_at = $3
                WHERE id = $1
                RETURNING head_seq;
                "#,
            )
            .bind(id.as_str())
            .bind(scene.as_json())
            .bind(at)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound)?;
            let seq: i64 = row.try_get("head_seq")?;

            sqlx::query("INSERT INTO canvas_versions (document, seq, scene, created_at) VALUES ($1, $2, $3, $4)")
                .bind(id.as_str())
                .bind(seq)
                .bind(scene.as_json())
                .bind(at)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(Version { seq: to_seq(seq), scene, created_at: at })
        }
        .boxed()
    }

    fn list_versions<'a>(&'a self, id: &'a DocumentId, range: VersionRange) -> BoxFuture<'a, StoreResult<Vec<Version>>> {
        async move {
            if Self::fetch_document(&self.pool, id).await?.is_none() {
                return Err(StoreError::NotFound);
            }
            let limit = range.limit.map(|l| i64::try_from(l).unwrap_or(i64::MAX));
            let rows = match range.from {
                Some(from) => {
                    sqlx::query(
                        r#"
                        SELECT seq, scene, created_at FROM canvas_versions
                        WHERE document = $1 AND seq >= $2
                        ORDER BY seq ASC
                        LIMIT $3;
                        "#,
                    )
                    .bind(id.as_str())
                    .bind(to_db_seq(from))
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
                }
                None => {
                    sqlx::query(
                        r#"
                        SELECT seq, scene, created_at FROM (
                            SELECT seq, scene, created_at FROM canvas_versions
                            WHERE document = $1
                            ORDER BY seq DESC
                            LIMIT $2
                        ) latest
                        ORDER BY seq ASC;
                        "#,
                    )
                    .bind(id.as_str())
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
                }
            };
            rows.iter().map(version_from_row).collect()
        }
        .boxed()
    }

    fn list_documents_for<'a>(&'a self, user: &'a UserId) -> BoxFuture<'a, StoreResult<Vec<Document>>> {
        async move {
            let sql = format!(
                r#"{}
                WHERE d.owner = $1
                    OR EXISTS (SELECT 1 FROM canvas_collaborators c WHERE c.document = d.id AND c.user_id = $1)
                ORDER BY d.updated_at DESC, d.id ASC"#,
                DOCUMENT_SELECT
            );
            let rows = sqlx::query(&sql).bind(user.as_str()).fetch_all(&self.pool).await?;
            rows.iter().map(document_from_row).collect()
        }
        .boxed()
    }

    fn append_comment(&self, new_comment: NewComment) -> BoxFuture<'_, StoreResult<Comment>> {
        async move {
            let mut tx = self.begin().await?;
            let row = sqlx::query("UPDATE canvas_documents SET comment_seq = comment_seq + 1 WHERE id = $1 RETURNING comment_seq")
                .bind(new_comment.document_id.as_str())
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(StoreError::NotFound)?;
            let seq: i64 = row.try_get("comment_seq")?;

            sqlx::query("INSERT INTO canvas_comments (document, seq, author, text, created_at) VALUES ($1, $2, $3, $4, $5)")
                .bind(new_comment.document_id.as_str())
                .bind(seq)
                .bind(new_comment.author.as_str())
                .bind(&new_comment.text)
                .bind(new_comment.created_at)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            Ok(Comment {
                document_id: new_comment.document_id,
                seq: to_seq(seq),
                author: new_comment.author,
                text: new_comment.text,
                created_at: new_comment.created_at,
            })
        }
        .boxed()
    }

    fn list_comments<'a>(&'a self, id: &'a DocumentId) -> BoxFuture<'a, StoreResult<Vec<Comment>>> {
        async move {
            if Self::fetch_document(&self.pool, id).await?.is_none() {
                return Err(StoreError::NotFound);
            }
            let rows = sqlx::query(
                "SELECT seq, author, text, created_at FROM canvas_comments WHERE document = $1 ORDER BY seq ASC",
            )
            .bind(id.as_str())
            .fetch_all(&self.pool)
            .await?;

            rows.iter()
                .map(|row| -> StoreResult<Comment> {
                    let author: String = row.try_get("author")?;
                    Ok(Comment {
                        document_id: id.clone(),
                        seq: to_seq(row.try_get("seq")?),
                        author: author.into(),
                        text: row.try_get("text")?,
                        created_at: row.try_get("created_at")?,
                    })
                })
                .collect()
        }
        .boxed()
    }
}
