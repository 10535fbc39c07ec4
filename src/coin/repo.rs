use async_trait::async_trait;
use uuid::Uuid;

use crate::error::LedgerError;

use super::model::{Account, AccountSnapshot, LedgerTransaction, NewLedgerTransaction};

/// Persistence boundary of the ledger.
///
/// Reads outside a unit of work see committed data only. Every balance
/// change goes through [`UnitOfWork`], obtained from [`LedgerStore::begin`].
#[async_trait]
pub trait LedgerStore: Send + Sync {
    type Unit: UnitOfWork + 'static;

    async fn begin(&self) -> Result<Self::Unit, LedgerError>;

    async fn get_account_balance(&self, account_id: Uuid) -> Result<Account, LedgerError>;

    /// Oldest first, ties broken by id. Fails with `AccountNotFound` for an
    /// unknown account rather than returning an empty page.
    async fn list_transactions_by_account(
        &self,
        account_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LedgerTransaction>, LedgerError>;

    async fn get_transaction_by_id(&self, id: i32) -> Result<LedgerTransaction, LedgerError>;
}

/// Atomic scope for one balance mutation. Dropping a unit without calling
/// [`UnitOfWork::commit`] discards everything written through it.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn get_account(&mut self, account_id: Uuid) -> Result<AccountSnapshot, LedgerError>;

    /// Writes `new_balance` if the account is still at `expected.version`.
    /// Returns `Conflict` when another writer got there first.
    async fn set_account_balance(
        &mut self,
        expected: &AccountSnapshot,
        new_balance: i32,
    ) -> Result<Account, LedgerError>;

    async fn insert_transaction(
        &mut self,
        record: NewLedgerTransaction,
    ) -> Result<LedgerTransaction, LedgerError>;

    async fn commit(self) -> Result<(), LedgerError>;

    async fn rollback(self) -> Result<(), LedgerError>;
}
