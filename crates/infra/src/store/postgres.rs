//! Postgres-backed keyed store.
//!
//! One `items` table holds every record:
//!
//! ```sql
//! CREATE TABLE items (
//!     pk         TEXT        NOT NULL,
//!     sk         TEXT        NOT NULL,
//!     attrs      JSONB       NOT NULL,
//!     version    BIGINT      NOT NULL CHECK (version > 0),
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     PRIMARY KEY (pk, sk)
//! );
//! ```
//!
//! Conditional writes lock the target row (`SELECT ... FOR UPDATE`) inside a
//! transaction, compare its version, then insert or update. A concurrent
//! insert of the same key surfaces as a unique violation, which is reported
//! as a failed condition.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (serialization failure / deadlock) | `40001`, `40P01` | `Unavailable` |
//! | Database (connection exceptions) | `08***`, `57P0*` | `Unavailable` |
//! | Database (data exceptions) | `22***` | `Serialization` |
//! | Database (other) | Any other | `Unavailable` |
//! | PoolTimedOut / PoolClosed / Io | N/A | `Unavailable` |
//! | ColumnDecode / Decode | N/A | `Serialization` |

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use stockyard_core::{PartitionKey, SortKey, TableKey};

use super::r#trait::{
    Condition, ConditionalPut, KeyedStore, Record, StoreError, TransactOutcome, WriteOutcome,
    single_partition,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS items (
    pk         TEXT        NOT NULL,
    sk         TEXT        NOT NULL,
    attrs      JSONB       NOT NULL,
    version    BIGINT      NOT NULL CHECK (version > 0),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (pk, sk)
)
"#;

#[derive(Debug, Clone)]
pub struct PostgresKeyedStore {
    pool: Arc<PgPool>,
}

enum Applied {
    Written(u64),
    ConditionFailed(Option<u64>),
}

impl PostgresKeyedStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect and make sure the `items` table exists.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))
    }
}

/// Apply one conditional put inside an open transaction.
async fn apply_put(
    tx: &mut Transaction<'_, Postgres>,
    record: &Record,
    condition: Condition,
) -> Result<Applied, StoreError> {
    let current = current_version(tx, &record.key).await?;
    if !condition.holds(current) {
        return Ok(Applied::ConditionFailed(current));
    }

    let attrs = JsonValue::Object(record.attributes.clone());
    match current {
        None => {
            let inserted = sqlx::query(
                r#"
                INSERT INTO items (pk, sk, attrs, version)
                VALUES ($1, $2, $3, 1)
                "#,
            )
            .bind(record.key.partition.as_str())
            .bind(record.key.sort.as_str())
            .bind(&attrs)
            .execute(&mut **tx)
            .await;

            match inserted {
                Ok(_) => Ok(Applied::Written(1)),
                // Another writer created the row after our read.
                Err(e) if is_unique_violation(&e) => Ok(Applied::ConditionFailed(Some(1))),
                Err(e) => Err(map_sqlx_error("insert_item", e)),
            }
        }
        Some(version) => {
            let next = version + 1;
            sqlx::query(
                r#"
                UPDATE items
                SET attrs = $3, version = $4, updated_at = NOW()
                WHERE pk = $1 AND sk = $2
                "#,
            )
            .bind(record.key.partition.as_str())
            .bind(record.key.sort.as_str())
            .bind(&attrs)
            .bind(next as i64)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("update_item", e))?;
            Ok(Applied::Written(next))
        }
    }
}

async fn current_version(
    tx: &mut Transaction<'_, Postgres>,
    key: &TableKey,
) -> Result<Option<u64>, StoreError> {
    let row = sqlx::query("SELECT version FROM items WHERE pk = $1 AND sk = $2 FOR UPDATE")
        .bind(key.partition.as_str())
        .bind(key.sort.as_str())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_item", e))?;

    match row {
        Some(row) => {
            let v: i64 = row
                .try_get("version")
                .map_err(|e| StoreError::Serialization(format!("failed to read version: {e}")))?;
            Ok(Some(v as u64))
        }
        None => Ok(None),
    }
}

fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<Record, StoreError> {
    let pk: String = row
        .try_get("pk")
        .map_err(|e| StoreError::Serialization(format!("failed to read pk: {e}")))?;
    let sk: String = row
        .try_get("sk")
        .map_err(|e| StoreError::Serialization(format!("failed to read sk: {e}")))?;
    let attrs: JsonValue = row
        .try_get("attrs")
        .map_err(|e| StoreError::Serialization(format!("failed to read attrs: {e}")))?;
    let version: i64 = row
        .try_get("version")
        .map_err(|e| StoreError::Serialization(format!("failed to read version: {e}")))?;

    let attributes = match attrs {
        JsonValue::Object(map) => map,
        JsonValue::Null => Map::new(),
        other => {
            return Err(StoreError::Serialization(format!(
                "attrs of ({pk}, {sk}) is not an object: {other}"
            )));
        }
    };

    Ok(Record {
        key: TableKey::new(PartitionKey::from_raw(pk)?, SortKey::from_raw(sk)?),
        attributes,
        version: version as u64,
    })
}

/// Escape `LIKE` metacharacters so prefixes match literally.
fn like_prefix(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

#[async_trait]
impl KeyedStore for PostgresKeyedStore {
    #[instrument(skip(self, record), fields(key = %record.key, condition = ?condition), err)]
    async fn put_if(
        &self,
        record: Record,
        condition: Condition,
    ) -> Result<WriteOutcome, StoreError> {
        let mut tx = self.begin().await?;
        match apply_put(&mut tx, &record, condition).await? {
            Applied::Written(version) => {
                tx.commit()
                    .await
                    .map_err(|e| map_sqlx_error("commit_transaction", e))?;
                Ok(WriteOutcome::Written { version })
            }
            Applied::ConditionFailed(current_version) => {
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                Ok(WriteOutcome::ConditionFailed { current_version })
            }
        }
    }

    #[instrument(skip(self), fields(key = %key), err)]
    async fn get(&self, key: &TableKey) -> Result<Option<Record>, StoreError> {
        let row = sqlx::query("SELECT pk, sk, attrs, version FROM items WHERE pk = $1 AND sk = $2")
            .bind(key.partition.as_str())
            .bind(key.sort.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_item", e))?;

        row.as_ref().map(row_to_record).transpose()
    }

    #[instrument(skip(self), fields(partition = %partition), err)]
    async fn query(
        &self,
        partition: &PartitionKey,
        sort_prefix: Option<&str>,
    ) -> Result<Vec<Record>, StoreError> {
        let pattern = like_prefix(sort_prefix.unwrap_or(""));
        let rows = sqlx::query(
            r#"
            SELECT pk, sk, attrs, version
            FROM items
            WHERE pk = $1 AND sk LIKE $2
            ORDER BY sk COLLATE "C" ASC
            "#,
        )
        .bind(partition.as_str())
        .bind(pattern)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("query_partition", e))?;

        rows.iter().map(row_to_record).collect()
    }

    #[instrument(skip(self, ops), fields(op_count = ops.len()), err)]
    async fn transact(&self, ops: Vec<ConditionalPut>) -> Result<TransactOutcome, StoreError> {
        if single_partition(&ops)?.is_none() {
            return Ok(TransactOutcome::Committed { versions: vec![] });
        }

        let mut tx = self.begin().await?;
        let mut versions = Vec::with_capacity(ops.len());

        for (index, op) in ops.iter().enumerate() {
            match apply_put(&mut tx, &op.record, op.condition).await? {
                Applied::Written(v) => versions.push(v),
                Applied::ConditionFailed(current_version) => {
                    tx.rollback()
                        .await
                        .map_err(|e| map_sqlx_error("rollback", e))?;
                    return Ok(TransactOutcome::ConditionFailed {
                        index,
                        current_version,
                    });
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(TransactOutcome::Committed { versions })
    }

    #[instrument(skip(self), err)]
    async fn scan(
        &self,
        partition_prefix: &str,
        sort_prefix: Option<&str>,
    ) -> Result<Vec<Record>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT pk, sk, attrs, version
            FROM items
            WHERE pk LIKE $1 AND sk LIKE $2
            ORDER BY pk COLLATE "C" ASC, sk COLLATE "C" ASC
            "#,
        )
        .bind(like_prefix(partition_prefix))
        .bind(like_prefix(sort_prefix.unwrap_or("")))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("scan_items", e))?;

        rows.iter().map(row_to_record).collect()
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some(code) if code.starts_with("22") => StoreError::Serialization(msg),
                _ => StoreError::Unavailable(msg),
            }
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Serialization(format!("decode error in {operation}: {err}"))
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool timed out in {operation}"))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {operation}"))
        }
        _ => StoreError::Unavailable(format!("sqlx error in {operation}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_prefix_escapes_metacharacters() {
        assert_eq!(like_prefix("STOCKEVENT#"), "STOCKEVENT#%");
        assert_eq!(like_prefix("a_b%"), "a\\_b\\%%");
        assert_eq!(like_prefix(""), "%");
    }

    #[test]
    fn pool_errors_are_transient() {
        assert!(map_sqlx_error("x", sqlx::Error::PoolTimedOut).is_transient());
        assert!(!map_sqlx_error("x", sqlx::Error::Decode("bad".into())).is_transient());
    }
}
