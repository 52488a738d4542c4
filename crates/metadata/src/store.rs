//! Metadata store trait and SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{ImageRepo, JobRepo, ProductRepo, UploadRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: UploadRepo + ImageRepo + ProductRepo + JobRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store and run migrations.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection avoids
            // persistent "database is locked" failures under server concurrency.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// Implement the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use time::OffsetDateTime;
    use uuid::Uuid;

    #[async_trait]
    impl UploadRepo for SqliteStore {
        async fn create_or_get_upload(
            &self,
            upload: &NewUpload,
            now: OffsetDateTime,
        ) -> MetadataResult<UploadRow> {
            // Upsert so concurrent first chunks cannot fail: the race loser
            // falls through to the SELECT and sees the winner's row. The
            // conflict arm refreshes updated_at so ongoing chunk activity
            // keeps the session alive for the attach stall check.
            sqlx::query(
                r#"
                INSERT INTO uploads (
                    upload_id, original_filename, total_size, status,
                    metadata_json, created_at, updated_at
                ) VALUES (?, ?, ?, 'uploading', ?, ?, ?)
                ON CONFLICT(upload_id) DO UPDATE SET updated_at = excluded.updated_at
                "#,
            )
            .bind(upload.upload_id)
            .bind(&upload.original_filename)
            .bind(upload.total_size)
            .bind(&upload.metadata_json)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;

            let row = sqlx::query_as::<_, UploadRow>("SELECT * FROM uploads WHERE upload_id = ?")
                .bind(upload.upload_id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| {
                    MetadataError::Internal(format!(
                        "upload {} missing immediately after upsert",
                        upload.upload_id
                    ))
                })?;
            Ok(row)
        }

        async fn get_upload(&self, upload_id: Uuid) -> MetadataResult<Option<UploadRow>> {
            let row = sqlx::query_as::<_, UploadRow>("SELECT * FROM uploads WHERE upload_id = ?")
                .bind(upload_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_upload_by_id(&self, id: i64) -> MetadataResult<Option<UploadRow>> {
            let row = sqlx::query_as::<_, UploadRow>("SELECT * FROM uploads WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn update_status(
            &self,
            id: i64,
            status: &str,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let result =
                sqlx::query("UPDATE uploads SET status = ?, updated_at = ? WHERE id = ?")
                    .bind(status)
                    .bind(updated_at)
                    .bind(id)
                    .execute(&self.pool)
                    .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("upload id {id} not found")));
            }
            Ok(())
        }

        async fn update_status_if(
            &self,
            id: i64,
            from: &str,
            to: &str,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<bool> {
            let result = sqlx::query(
                "UPDATE uploads SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
            )
            .bind(to)
            .bind(updated_at)
            .bind(id)
            .bind(from)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn set_assembled(
            &self,
            id: i64,
            file_checksum: &str,
            file_size: i64,
            path: &str,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let result = sqlx::query(
                r#"
                UPDATE uploads
                SET file_checksum = ?, file_size = ?, path = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(file_checksum)
            .bind(file_size)
            .bind(path)
            .bind(updated_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("upload id {id} not found")));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ImageRepo for SqliteStore {
        async fn upsert_image(
            &self,
            image: &NewImage,
            now: OffsetDateTime,
        ) -> MetadataResult<ImageRow> {
            sqlx::query(
                r#"
                INSERT INTO images (
                    upload_id, variant, path, mime_type, width, height,
                    checksum, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(upload_id, variant) DO UPDATE SET
                    path = excluded.path,
                    mime_type = excluded.mime_type,
                    width = excluded.width,
                    height = excluded.height,
                    checksum = excluded.checksum,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(image.upload_id)
            .bind(&image.variant)
            .bind(&image.path)
            .bind(&image.mime_type)
            .bind(image.width)
            .bind(image.height)
            .bind(&image.checksum)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;

            let row = sqlx::query_as::<_, ImageRow>(
                "SELECT * FROM images WHERE upload_id = ? AND variant = ?",
            )
            .bind(image.upload_id)
            .bind(&image.variant)
            .fetch_one(&self.pool)
            .await?;
            Ok(row)
        }

        async fn get_image(
            &self,
            upload_id: i64,
            variant: &str,
        ) -> MetadataResult<Option<ImageRow>> {
            let row = sqlx::query_as::<_, ImageRow>(
                "SELECT * FROM images WHERE upload_id = ? AND variant = ?",
            )
            .bind(upload_id)
            .bind(variant)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn get_image_by_id(&self, id: i64) -> MetadataResult<Option<ImageRow>> {
            let row = sqlx::query_as::<_, ImageRow>("SELECT * FROM images WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn list_images(&self, upload_id: i64) -> MetadataResult<Vec<ImageRow>> {
            let rows = sqlx::query_as::<_, ImageRow>(
                "SELECT * FROM images WHERE upload_id = ? ORDER BY variant",
            )
            .bind(upload_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }

    #[async_trait]
    impl ProductRepo for SqliteStore {
        async fn create_product(
            &self,
            sku: &str,
            name: Option<&str>,
            now: OffsetDateTime,
        ) -> MetadataResult<ProductRow> {
            let result = sqlx::query(
                "INSERT INTO products (sku, name, created_at, updated_at) VALUES (?, ?, ?, ?)",
            )
            .bind(sku)
            .bind(name)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => {}
                Err(sqlx::Error::Database(db_err)) if db_err.message().contains("UNIQUE") => {
                    return Err(MetadataError::AlreadyExists(format!(
                        "product sku '{sku}' already exists"
                    )));
                }
                Err(e) => return Err(e.into()),
            }

            let row = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE sku = ?")
                .bind(sku)
                .fetch_one(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_product_by_sku(&self, sku: &str) -> MetadataResult<Option<ProductRow>> {
            let row = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE sku = ?")
                .bind(sku)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_product(&self, id: i64) -> MetadataResult<Option<ProductRow>> {
            let row = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn list_product_images(
            &self,
            product_id: i64,
        ) -> MetadataResult<Vec<ProductImageRow>> {
            let rows = sqlx::query_as::<_, ProductImageRow>(
                "SELECT * FROM product_images WHERE product_id = ? ORDER BY image_id",
            )
            .bind(product_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn attach_image(
            &self,
            product_id: i64,
            image_id: i64,
            is_primary: bool,
            now: OffsetDateTime,
        ) -> MetadataResult<ProductImageRow> {
            // "Clear others, then set this one" must be one atomic step, and
            // the denormalized primary_image_id moves in the same transaction.
            let mut tx = self.pool.begin().await?;

            let existing = sqlx::query_as::<_, ProductImageRow>(
                "SELECT * FROM product_images WHERE product_id = ? AND image_id = ?",
            )
            .bind(product_id)
            .bind(image_id)
            .fetch_optional(&mut *tx)
            .await?;

            if is_primary {
                sqlx::query("UPDATE product_images SET is_primary = 0 WHERE product_id = ?")
                    .bind(product_id)
                    .execute(&mut *tx)
                    .await?;
            }

            if existing.is_some() {
                if is_primary {
                    sqlx::query(
                        "UPDATE product_images SET is_primary = 1 WHERE product_id = ? AND image_id = ?",
                    )
                    .bind(product_id)
                    .bind(image_id)
                    .execute(&mut *tx)
                    .await?;
                }
            } else {
                sqlx::query(
                    r#"
                    INSERT INTO product_images (product_id, image_id, is_primary, created_at)
                    VALUES (?, ?, ?, ?)
                    "#,
                )
                .bind(product_id)
                .bind(image_id)
                .bind(is_primary)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }

            if is_primary {
                sqlx::query("UPDATE products SET primary_image_id = ?, updated_at = ? WHERE id = ?")
                    .bind(image_id)
                    .bind(now)
                    .bind(product_id)
                    .execute(&mut *tx)
                    .await?;
            }

            let row = sqlx::query_as::<_, ProductImageRow>(
                "SELECT * FROM product_images WHERE product_id = ? AND image_id = ?",
            )
            .bind(product_id)
            .bind(image_id)
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(row)
        }
    }

    #[async_trait]
    impl JobRepo for SqliteStore {
        async fn enqueue_job(&self, job: &JobRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO processing_jobs (
                    job_id, upload_id, source_path, state, attempts,
                    last_error, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(job.job_id)
            .bind(job.upload_id)
            .bind(&job.source_path)
            .bind(&job.state)
            .bind(job.attempts)
            .bind(&job.last_error)
            .bind(job.created_at)
            .bind(job.updated_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn claim_next_job(&self, now: OffsetDateTime) -> MetadataResult<Option<JobRow>> {
            // Claim inside a transaction so two workers can never pop the
            // same job; the guarded UPDATE is the claim.
            let mut tx = self.pool.begin().await?;

            let job = sqlx::query_as::<_, JobRow>(
                "SELECT * FROM processing_jobs WHERE state = 'queued' ORDER BY created_at, job_id LIMIT 1",
            )
            .fetch_optional(&mut *tx)
            .await?;

            let Some(mut job) = job else {
                tx.commit().await?;
                return Ok(None);
            };

            let result = sqlx::query(
                r#"
                UPDATE processing_jobs
                SET state = 'running', attempts = attempts + 1, updated_at = ?
                WHERE job_id = ? AND state = 'queued'
                "#,
            )
            .bind(now)
            .bind(job.job_id)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;

            if result.rows_affected() == 0 {
                return Ok(None);
            }

            job.state = "running".to_string();
            job.attempts += 1;
            job.updated_at = now;
            Ok(Some(job))
        }

        async fn get_job(&self, job_id: Uuid) -> MetadataResult<Option<JobRow>> {
            let row =
                sqlx::query_as::<_, JobRow>("SELECT * FROM processing_jobs WHERE job_id = ?")
                    .bind(job_id)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row)
        }

        async fn list_jobs_for_upload(&self, upload_id: i64) -> MetadataResult<Vec<JobRow>> {
            let rows = sqlx::query_as::<_, JobRow>(
                "SELECT * FROM processing_jobs WHERE upload_id = ? ORDER BY created_at DESC",
            )
            .bind(upload_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn finish_job(&self, job_id: Uuid, now: OffsetDateTime) -> MetadataResult<()> {
            sqlx::query(
                "UPDATE processing_jobs SET state = 'finished', updated_at = ? WHERE job_id = ?",
            )
            .bind(now)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn fail_job(
            &self,
            job_id: Uuid,
            error: &str,
            now: OffsetDateTime,
        ) -> MetadataResult<()> {
            sqlx::query(
                r#"
                UPDATE processing_jobs
                SET state = 'failed', last_error = ?, updated_at = ?
                WHERE job_id = ?
                "#,
            )
            .bind(error)
            .bind(now)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn requeue_job(
            &self,
            job_id: Uuid,
            error: &str,
            now: OffsetDateTime,
        ) -> MetadataResult<()> {
            sqlx::query(
                r#"
                UPDATE processing_jobs
                SET state = 'queued', last_error = ?, updated_at = ?
                WHERE job_id = ?
                "#,
            )
            .bind(error)
            .bind(now)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn recover_orphaned_jobs(
            &self,
            now: OffsetDateTime,
        ) -> MetadataResult<Vec<JobRow>> {
            let mut tx = self.pool.begin().await?;

            let mut jobs = sqlx::query_as::<_, JobRow>(
                "SELECT * FROM processing_jobs WHERE state = 'running'",
            )
            .fetch_all(&mut *tx)
            .await?;

            if !jobs.is_empty() {
                sqlx::query(
                    "UPDATE processing_jobs SET state = 'queued', updated_at = ? WHERE state = 'running'",
                )
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;

            for job in &mut jobs {
                job.state = "queued".to_string();
                job.updated_at = now;
            }
            Ok(jobs)
        }
    }
}

const SCHEMA_SQL: &str = r#"
-- Upload sessions
CREATE TABLE IF NOT EXISTS uploads (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    upload_id BLOB NOT NULL UNIQUE,
    original_filename TEXT,
    total_size INTEGER,
    file_size INTEGER,
    file_checksum TEXT,
    status TEXT NOT NULL DEFAULT 'uploading',
    metadata_json TEXT,
    path TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_uploads_status ON uploads(status, updated_at);

-- Image variants
CREATE TABLE IF NOT EXISTS images (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    upload_id INTEGER NOT NULL REFERENCES uploads(id) ON DELETE CASCADE,
    variant TEXT NOT NULL,
    path TEXT NOT NULL,
    mime_type TEXT,
    width INTEGER NOT NULL,
    height INTEGER NOT NULL,
    checksum TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (upload_id, variant)
);
CREATE INDEX IF NOT EXISTS idx_images_upload ON images(upload_id);

-- Catalog products
CREATE TABLE IF NOT EXISTS products (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sku TEXT NOT NULL UNIQUE,
    name TEXT,
    primary_image_id INTEGER REFERENCES images(id),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Product-image links
CREATE TABLE IF NOT EXISTS product_images (
    product_id INTEGER NOT NULL REFERENCES products(id) ON DELETE CASCADE,
    image_id INTEGER NOT NULL REFERENCES images(id) ON DELETE CASCADE,
    is_primary INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    PRIMARY KEY (product_id, image_id)
);
-- At most one primary link per product (partial unique index)
CREATE UNIQUE INDEX IF NOT EXISTS idx_product_images_primary
ON product_images(product_id) WHERE is_primary = 1;

-- Processing jobs
CREATE TABLE IF NOT EXISTS processing_jobs (
    job_id BLOB PRIMARY KEY,
    upload_id INTEGER NOT NULL REFERENCES uploads(id) ON DELETE CASCADE,
    source_path TEXT NOT NULL,
    state TEXT NOT NULL DEFAULT 'queued',
    attempts INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_jobs_state ON processing_jobs(state, created_at);
"#;
