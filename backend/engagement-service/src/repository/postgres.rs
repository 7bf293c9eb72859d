use super::{ContentStore, EventWrite, StoreError, StoreResult};
use crate::domain::{EngagementEvent, EngagementKind, EventKey, PostCounts};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            match db_err.code().as_deref() {
                Some(UNIQUE_VIOLATION) => return StoreError::ConstraintViolation,
                Some(FOREIGN_KEY_VIOLATION) => return StoreError::PostNotFound,
                _ => {}
            }
        }
        StoreError::Unavailable(err.to_string())
    }
}

/// Postgres-backed Content Store
///
/// Table and column names come from [`EngagementKind`] and are static, so they
/// are interpolated into SQL directly; all values are bound.
#[derive(Clone)]
pub struct PgContentStore {
    pool: PgPool,
}

impl PgContentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Lock the post row for the rest of the transaction. Event writes and
/// recomputes on one post are serialized through this lock.
async fn lock_post(tx: &mut Transaction<'_, Postgres>, post_id: Uuid) -> StoreResult<()> {
    let locked: Option<Uuid> = sqlx::query_scalar("SELECT id FROM posts WHERE id = $1 FOR UPDATE")
        .bind(post_id)
        .fetch_optional(&mut **tx)
        .await?;

    locked.map(|_| ()).ok_or(StoreError::PostNotFound)
}

/// Counter step of an event write. Runs under a savepoint so a failed update
/// rolls back alone and the event change can still commit.
async fn adjust_counter(
    tx: &mut Transaction<'_, Postgres>,
    post_id: Uuid,
    kind: EngagementKind,
    delta: i64,
) -> StoreResult<StoreResult<i64>> {
    let column = kind.counter_column();
    let sql = format!(
        r#"
        UPDATE posts
        SET {column} = GREATEST({column} + $2, 0)
        WHERE id = $1
        RETURNING {column}
        "#
    );

    sqlx::query("SAVEPOINT counter_adjust")
        .execute(&mut **tx)
        .await?;

    match sqlx::query_scalar::<_, i64>(&sql)
        .bind(post_id)
        .bind(delta)
        .fetch_one(&mut **tx)
        .await
    {
        Ok(count) => {
            sqlx::query("RELEASE SAVEPOINT counter_adjust")
                .execute(&mut **tx)
                .await?;
            Ok(Ok(count))
        }
        Err(err) => {
            sqlx::query("ROLLBACK TO SAVEPOINT counter_adjust")
                .execute(&mut **tx)
                .await?;
            Ok(Err(err.into()))
        }
    }
}

#[async_trait::async_trait]
impl ContentStore for PgContentStore {
    async fn insert_event(&self, key: &EventKey) -> StoreResult<EventWrite<EngagementEvent>> {
        let mut tx = self.pool.begin().await?;
        lock_post(&mut tx, key.post_id).await?;

        // Plain INSERT: the UNIQUE (post_id, user_id) constraint is the
        // duplicate check. On conflict the transaction is dropped and rolled back.
        let sql = format!(
            r#"
            INSERT INTO {} (post_id, user_id)
            VALUES ($1, $2)
            RETURNING id, post_id, user_id, created_at
            "#,
            key.kind.event_table()
        );

        let event = sqlx::query_as::<_, EngagementEvent>(&sql)
            .bind(key.post_id)
            .bind(key.user_id)
            .fetch_one(&mut *tx)
            .await?;

        let counter = adjust_counter(&mut tx, key.post_id, key.kind, 1).await?;
        tx.commit().await?;

        Ok(EventWrite {
            record: event,
            counter,
        })
    }

    async fn delete_event(&self, key: &EventKey) -> StoreResult<Option<EventWrite<Uuid>>> {
        let mut tx = self.pool.begin().await?;
        match lock_post(&mut tx, key.post_id).await {
            Ok(()) => {}
            // A missing post has no events to remove
            Err(StoreError::PostNotFound) => return Ok(None),
            Err(err) => return Err(err),
        }

        let sql = format!(
            "DELETE FROM {} WHERE post_id = $1 AND user_id = $2 RETURNING id",
            key.kind.event_table()
        );

        let deleted: Option<Uuid> = sqlx::query_scalar(&sql)
            .bind(key.post_id)
            .bind(key.user_id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(event_id) = deleted else {
            return Ok(None);
        };

        let counter = adjust_counter(&mut tx, key.post_id, key.kind, -1).await?;
        tx.commit().await?;

        Ok(Some(EventWrite {
            record: event_id,
            counter,
        }))
    }

    async fn recompute_counter(&self, post_id: Uuid, kind: EngagementKind) -> StoreResult<i64> {
        let mut tx = self.pool.begin().await?;
        lock_post(&mut tx, post_id).await?;

        // New statement after the lock is granted, so the count sees every
        // committed event write on this post.
        let column = kind.counter_column();
        let table = kind.event_table();
        let sql = format!(
            r#"
            UPDATE posts
            SET {column} = (SELECT COUNT(*) FROM {table} WHERE post_id = $1)
            WHERE id = $1
            RETURNING {column}
            "#
        );

        let count: i64 = sqlx::query_scalar(&sql)
            .bind(post_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(count)
    }

    async fn counters(&self, post_id: Uuid) -> StoreResult<Option<PostCounts>> {
        let counts = sqlx::query_as::<_, PostCounts>(
            r#"
            SELECT id AS post_id, like_count, prayer_count
            FROM posts
            WHERE id = $1
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(counts)
    }

    async fn has_event(&self, key: &EventKey) -> StoreResult<bool> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE post_id = $1 AND user_id = $2)",
            key.kind.event_table()
        );

        let exists: bool = sqlx::query_scalar(&sql)
            .bind(key.post_id)
            .bind(key.user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(exists)
    }

    async fn list_events(
        &self,
        post_id: Uuid,
        kind: EngagementKind,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<EngagementEvent>> {
        let sql = format!(
            r#"
            SELECT id, post_id, user_id, created_at
            FROM {}
            WHERE post_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
            kind.event_table()
        );

        let events = sqlx::query_as::<_, EngagementEvent>(&sql)
            .bind(post_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(events)
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
