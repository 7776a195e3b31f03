use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tinylink_core::error::StorageError;
use tinylink_core::repository::{ReadRepository, Repository, Result, UrlRecord};
use tinylink_core::shortcode::ShortCode;
use tracing::{debug, warn};

/// Postgres implementation of the repository contract.
///
/// Rows live in `url_shortened (id, url, access_count)`. Every write runs in
/// its own transaction and is rolled back explicitly on failure, so a failed
/// insert never leaves a half-written row and a failed batch of access count
/// increments is discarded as a whole.
#[derive(Debug, Clone)]
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a repository from an existing Postgres connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a repository by opening a new Postgres connection pool.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::new(pool))
    }

    /// Applies the embedded schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Migration(e.to_string()))
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(map_sqlx_error)
    }
}

async fn rollback(tx: Transaction<'static, Postgres>, operation: &str) {
    if let Err(e) = tx.rollback().await {
        // The connection drops the transaction anyway once it is returned to the pool.
        warn!(operation, error = %e, "Failed to roll back transaction");
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

fn parse_access_count(value: i64) -> Result<u64> {
    u64::try_from(value)
        .map_err(|_| StorageError::InvalidData(format!("negative access_count '{value}'")))
}

#[async_trait]
impl ReadRepository for PostgresRepository {
    async fn get(&self, code: &ShortCode) -> Result<Option<UrlRecord>> {
        let row = sqlx::query(
            r#"
            SELECT url, access_count
            FROM url_shortened
            WHERE id = $1
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let original_url: String = row.try_get("url").map_err(map_sqlx_error)?;
        let access_count: i64 = row.try_get("access_count").map_err(map_sqlx_error)?;

        Ok(Some(UrlRecord {
            original_url,
            access_count: parse_access_count(access_count)?,
        }))
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn insert(&self, code: &ShortCode, original_url: &str) -> Result<()> {
        let mut tx = self.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO url_shortened (id, url, access_count)
            VALUES ($1, $2, 0)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(code.as_str())
        .bind(original_url)
        .execute(&mut *tx)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 1 => {}
            Ok(_) => {
                rollback(tx, "insert").await;
                return Err(StorageError::Conflict(code.to_string()));
            }
            Err(err) => {
                rollback(tx, "insert").await;
                return Err(if is_unique_violation(&err) {
                    StorageError::Conflict(code.to_string())
                } else {
                    map_sqlx_error(err)
                });
            }
        }

        match tx.commit().await {
            Ok(()) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(StorageError::Conflict(code.to_string())),
            Err(err) => Err(map_sqlx_error(err)),
        }
    }

    async fn delete(&self, code: &ShortCode) -> Result<bool> {
        let mut tx = self.begin().await?;

        let result = sqlx::query(
            r#"
            DELETE FROM url_shortened
            WHERE id = $1
            "#,
        )
        .bind(code.as_str())
        .execute(&mut *tx)
        .await;

        let removed = match result {
            Ok(done) => done.rows_affected() > 0,
            Err(err) => {
                rollback(tx, "delete").await;
                return Err(map_sqlx_error(err));
            }
        };

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(removed)
    }

    async fn apply_access_counts(&self, deltas: &[(ShortCode, u64)]) -> Result<u64> {
        if deltas.is_empty() {
            return Ok(0);
        }

        let mut tx = self.begin().await?;
        let mut updated = 0;

        for (code, delta) in deltas {
            let delta = match i64::try_from(*delta) {
                Ok(delta) => delta,
                Err(_) => {
                    rollback(tx, "apply_access_counts").await;
                    return Err(StorageError::InvalidData(format!(
                        "access count delta for '{code}' overflows BIGINT: {delta}"
                    )));
                }
            };

            let result = sqlx::query(
                r#"
                UPDATE url_shortened
                SET access_count = access_count + $1
                WHERE id = $2
                "#,
            )
            .bind(delta)
            .bind(code.as_str())
            .execute(&mut *tx)
            .await;

            match result {
                Ok(done) => updated += done.rows_affected(),
                Err(err) => {
                    rollback(tx, "apply_access_counts").await;
                    return Err(map_sqlx_error(err));
                }
            }
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        debug!(batch = deltas.len(), updated, "Applied access count batch");
        Ok(updated)
    }
}
