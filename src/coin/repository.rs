use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{Any, AnyPool, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::error::LedgerError;

use super::{
    model::{
        Account, AccountSnapshot, LedgerTransaction, NewLedgerTransaction, TransactionType,
        stamp_after,
    },
    repo::{LedgerStore, UnitOfWork},
};

/// SQLSTATE / SQLite result codes that mean "try again".
const TRANSIENT_CODES: &[&str] = &[
    "40001", // serialization_failure
    "40P01", // deadlock_detected
    "5",     // SQLITE_BUSY
    "6",     // SQLITE_LOCKED
    "261",   // SQLITE_BUSY_RECOVERY
    "262",   // SQLITE_LOCKED_SHAREDCACHE
    "517",   // SQLITE_BUSY_SNAPSHOT
];

#[derive(sqlx::FromRow)]
struct AccountRow {
    account_id: String,
    balance: i32,
    version: i64,
}

impl TryFrom<AccountRow> for AccountSnapshot {
    type Error = LedgerError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        Ok(AccountSnapshot {
            account_id: parse_uuid(&row.account_id)?,
            balance: row.balance,
            version: row.version,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: i32,
    account_id: String,
    transaction_type: String,
    amount: i32,
    balance_after: i32,
    order_id: Option<i32>,
    description: String,
    created_at: String,
}

impl TryFrom<TransactionRow> for LedgerTransaction {
    type Error = LedgerError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(LedgerTransaction {
            id: row.id,
            account_id: parse_uuid(&row.account_id)?,
            transaction_type: TransactionType::try_from(row.transaction_type.as_str())?,
            amount: row.amount,
            balance_after: row.balance_after,
            order_reference: row.order_id,
            description: row.description,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

pub struct LedgerRepository {
    pool: AnyPool,
}

impl LedgerRepository {
    pub fn new(pool: AnyPool) -> Self {
        LedgerRepository { pool }
    }

    pub fn pool_stats(&self) {
        debug!(
            total = self.pool.size(),
            idle = self.pool.num_idle(),
            "ledger pool stats"
        );
    }
}

#[async_trait]
impl LedgerStore for LedgerRepository {
    type Unit = SqlUnitOfWork;

    async fn begin(&self) -> Result<Self::Unit, LedgerError> {
        self.pool_stats();
        let tx = self.pool.begin().await.map_err(map_unit_error)?;
        Ok(SqlUnitOfWork { tx })
    }

    async fn get_account_balance(&self, account_id: Uuid) -> Result<Account, LedgerError> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT account_id, balance, version
            FROM coin_accounts
            WHERE account_id = $1
            "#,
        )
        .bind(account_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(LedgerError::DBError)?
        .ok_or(LedgerError::AccountNotFound(account_id))?;

        AccountSnapshot::try_from(row).map(Account::from)
    }

    async fn list_transactions_by_account(
        &self,
        account_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LedgerTransaction>, LedgerError> {
        self.get_account_balance(account_id).await?;

        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, account_id, transaction_type, amount, balance_after,
                   order_id, description, created_at
            FROM coin_transactions
            WHERE account_id = $1
            ORDER BY created_at ASC, id ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(account_id.to_string())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(LedgerError::DBError)?;

        rows.into_iter().map(LedgerTransaction::try_from).collect()
    }

    async fn get_transaction_by_id(&self, id: i32) -> Result<LedgerTransaction, LedgerError> {
        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, account_id, transaction_type, amount, balance_after,
                   order_id, description, created_at
            FROM coin_transactions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(LedgerError::DBError)?
        .ok_or(LedgerError::TransactionNotFound(id))?;

        LedgerTransaction::try_from(row)
    }
}

/// A database transaction. sqlx rolls it back when dropped uncommitted.
pub struct SqlUnitOfWork {
    tx: Transaction<'static, Any>,
}

#[async_trait]
impl UnitOfWork for SqlUnitOfWork {
    async fn get_account(&mut self, account_id: Uuid) -> Result<AccountSnapshot, LedgerError> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT account_id, balance, version
            FROM coin_accounts
            WHERE account_id = $1
            "#,
        )
        .bind(account_id.to_string())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_unit_error)?
        .ok_or(LedgerError::AccountNotFound(account_id))?;

        AccountSnapshot::try_from(row)
    }

    async fn set_account_balance(
        &mut self,
        expected: &AccountSnapshot,
        new_balance: i32,
    ) -> Result<Account, LedgerError> {
        let result = sqlx::query(
            r#"
            UPDATE coin_accounts
            SET balance = $1, version = version + 1
            WHERE account_id = $2 AND version = $3
            "#,
        )
        .bind(new_balance)
        .bind(expected.account_id.to_string())
        .bind(expected.version)
        .execute(&mut *self.tx)
        .await
        .map_err(map_unit_error)?;

        if result.rows_affected() == 0 {
            let still_there: Option<(i64,)> =
                sqlx::query_as("SELECT version FROM coin_accounts WHERE account_id = $1")
                    .bind(expected.account_id.to_string())
                    .fetch_optional(&mut *self.tx)
                    .await
                    .map_err(map_unit_error)?;
            return Err(match still_there {
                Some(_) => LedgerError::Conflict,
                None => LedgerError::AccountNotFound(expected.account_id),
            });
        }

        Ok(Account {
            account_id: expected.account_id,
            balance: new_balance,
        })
    }

    async fn insert_transaction(
        &mut self,
        record: NewLedgerTransaction,
    ) -> Result<LedgerTransaction, LedgerError> {
        if record.description.is_empty() {
            return Err(LedgerError::MissingDescription);
        }

        // The account row is locked by the balance update, so the latest
        // record cannot move under us.
        let latest: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT created_at
            FROM coin_transactions
            WHERE account_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(record.account_id.to_string())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_unit_error)?;
        let latest = latest.map(|(raw,)| parse_timestamp(&raw)).transpose()?;
        let created_at = stamp_after(truncate_to_stored(Utc::now())?, latest);

        let row: (i32,) = sqlx::query_as(
            r#"
            INSERT INTO coin_transactions
                (account_id, transaction_type, amount, balance_after, order_id, description, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id"#,
        )
        .bind(record.account_id.to_string())
        .bind(record.transaction_type.as_str())
        .bind(record.amount)
        .bind(record.balance_after)
        .bind(record.order_reference)
        .bind(&record.description)
        .bind(format_timestamp(&created_at))
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_unit_error)?;

        Ok(record.into_record(row.0, created_at))
    }

    async fn commit(self) -> Result<(), LedgerError> {
        self.tx.commit().await.map_err(map_unit_error)
    }

    async fn rollback(self) -> Result<(), LedgerError> {
        self.tx.rollback().await.map_err(map_unit_error)
    }
}

/// Errors inside a unit of work: transient codes become `Conflict` so the
/// coordinator retries the whole unit. Reads outside a unit report every
/// failure as `DBError`.
fn map_unit_error(err: sqlx::Error) -> LedgerError {
    match &err {
        sqlx::Error::Database(db_err) => match db_err.code() {
            Some(code) if TRANSIENT_CODES.contains(&&*code) => LedgerError::Conflict,
            _ => LedgerError::DBError(err),
        },
        _ => LedgerError::DBError(err),
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid, LedgerError> {
    Uuid::parse_str(raw).map_err(|_| LedgerError::CorruptRecord(format!("bad account id '{raw}'")))
}

fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, LedgerError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|_| LedgerError::CorruptRecord(format!("bad timestamp '{raw}'")))
}

/// The returned record must equal what a later read produces, so drop the
/// sub-microsecond part the column cannot hold.
fn truncate_to_stored(at: DateTime<Utc>) -> Result<DateTime<Utc>, LedgerError> {
    parse_timestamp(&format_timestamp(&at))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_sort_as_text() {
        let earlier = DateTime::parse_from_rfc3339("2026-01-02T03:04:05.000001Z")
            .unwrap()
            .with_timezone(&Utc);
        let later = DateTime::parse_from_rfc3339("2026-01-02T03:04:05.1Z")
            .unwrap()
            .with_timezone(&Utc);
        assert!(format_timestamp(&earlier) < format_timestamp(&later));
        assert_eq!(format_timestamp(&later), "2026-01-02T03:04:05.100000Z");
    }

    #[test]
    fn stored_timestamp_round_trips() {
        let now = Utc::now();
        let stored = truncate_to_stored(now).unwrap();
        assert_eq!(parse_timestamp(&format_timestamp(&stored)).unwrap(), stored);
    }

    #[derive(Debug, thiserror::Error)]
    #[error("database is locked")]
    struct Locked(&'static str);

    impl sqlx::error::DatabaseError for Locked {
        fn message(&self) -> &str {
            "database is locked"
        }

        fn code(&self) -> Option<std::borrow::Cow<'_, str>> {
            Some(self.0.into())
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::Other
        }
    }

    #[test]
    fn transient_codes_conflict_only_inside_a_unit() {
        for code in ["5", "262", "40001", "40P01"] {
            let err = sqlx::Error::Database(Box::new(Locked(code)));
            assert!(matches!(map_unit_error(err), LedgerError::Conflict), "{code}");
        }
        let err = sqlx::Error::Database(Box::new(Locked("23505")));
        assert!(matches!(map_unit_error(err), LedgerError::DBError(_)));
    }

    #[tokio::test]
    async fn reads_outside_a_unit_never_conflict() {
        sqlx::any::install_default_drivers();
        let pool = sqlx::any::AnyPoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        // No schema: every read fails at the database.
        let repository = LedgerRepository::new(pool);

        let err = repository.get_account_balance(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, LedgerError::DBError(_)));
        let err = repository.get_transaction_by_id(1).await.unwrap_err();
        assert!(matches!(err, LedgerError::DBError(_)));
    }

    #[test]
    fn pool_timeout_is_not_transient() {
        assert!(matches!(
            map_unit_error(sqlx::Error::PoolTimedOut),
            LedgerError::DBError(_)
        ));
    }
}
