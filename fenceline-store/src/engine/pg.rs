use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, Transaction};

use crate::{
    engine::Engine,
    error::{Result, StoreError},
    record::{BranchState, FenceRecord},
};

/// Postgres-backed fence record store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    table: String,
}

impl PgStore {
    pub fn new(pool: &PgPool) -> Self {
        Self {
            pool: pool.clone(),
            table: "tcc_fence".to_owned(),
        }
    }

    pub fn with_table(pool: &PgPool, table: impl Into<String>) -> Self {
        Self {
            pool: pool.clone(),
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// DDL for the fence table, for embedders that manage their own schema.
    pub fn get_schema(&self) -> String {
        let table = &self.table;

        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                global_tx_id VARCHAR(128) NOT NULL,
                branch_id VARCHAR(128) NOT NULL,
                action_name VARCHAR(64) NOT NULL,
                state SMALLINT NOT NULL,
                log_detail JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ,
                PRIMARY KEY (global_tx_id, branch_id)
            )
            "#
        )
    }
}

#[async_trait]
impl Engine for PgStore {
    type Session = Transaction<'static, Postgres>;

    async fn begin(&self) -> Result<Self::Session> {
        Ok(self.pool.begin().await?)
    }

    async fn commit(&self, session: Self::Session) -> Result<()> {
        Ok(session.commit().await?)
    }

    async fn rollback(&self, session: Self::Session) -> Result<()> {
        Ok(session.rollback().await?)
    }

    async fn create(&self, session: &mut Self::Session, record: FenceRecord) -> Result<()> {
        let table = &self.table;

        sqlx::query(
            format!(
                r#"
                INSERT INTO {table}
                (global_tx_id, branch_id, action_name, state, log_detail, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#
            )
            .as_str(),
        )
        .bind(record.global_tx_id.to_owned())
        .bind(record.branch_id.to_owned())
        .bind(record.action_name.to_owned())
        .bind(record.state)
        .bind(record.log_detail.clone())
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut **session)
        .await
        .map_err(|err| {
            if err
                .as_database_error()
                .is_some_and(|db| db.is_unique_violation())
            {
                StoreError::DuplicateRecord {
                    global_tx_id: record.global_tx_id.to_owned(),
                    branch_id: record.branch_id.to_owned(),
                }
            } else {
                StoreError::Sqlx(err)
            }
        })?;

        Ok(())
    }

    async fn get_for_update(
        &self,
        session: &mut Self::Session,
        global_tx_id: &'_ str,
        branch_id: &'_ str,
    ) -> Result<Option<FenceRecord>> {
        let table = &self.table;

        let record = sqlx::query_as::<_, FenceRecord>(
            format!(
                r#"
                SELECT * FROM {table}
                WHERE global_tx_id = $1 AND branch_id = $2
                FOR UPDATE
                "#
            )
            .as_str(),
        )
        .bind(global_tx_id)
        .bind(branch_id)
        .fetch_optional(&mut **session)
        .await?;

        Ok(record)
    }

    async fn update_state(
        &self,
        session: &mut Self::Session,
        global_tx_id: &'_ str,
        branch_id: &'_ str,
        from: BranchState,
        to: BranchState,
    ) -> Result<()> {
        let table = &self.table;

        let result = sqlx::query(
            format!(
                r#"
                UPDATE {table} SET state = $1, updated_at = $2
                WHERE global_tx_id = $3 AND branch_id = $4 AND state = $5
                "#
            )
            .as_str(),
        )
        .bind(to)
        .bind(Utc::now())
        .bind(global_tx_id)
        .bind(branch_id)
        .bind(from)
        .execute(&mut **session)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::UnexpectedState {
                global_tx_id: global_tx_id.to_owned(),
                branch_id: branch_id.to_owned(),
                expected: from,
            });
        }

        Ok(())
    }
}
