use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::LedgerError;

use super::{
    model::{Account, AccountSnapshot, LedgerTransaction, NewLedgerTransaction, stamp_after},
    repo::{LedgerStore, UnitOfWork},
};

#[derive(Debug, Clone, Copy)]
struct AccountRow {
    balance: i32,
    version: i64,
}

#[derive(Debug, Default)]
struct LedgerState {
    accounts: HashMap<Uuid, AccountRow>,
    transactions: Vec<LedgerTransaction>,
    next_id: i32,
}

/// In-process ledger store.
///
/// Intended for tests/dev. Units of work stage their writes and validate the
/// account versions they read when committing, so concurrent writers on one
/// account see `Conflict` exactly like the SQL store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerStore {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens an account. Account creation belongs to the user subsystem; this
    /// stands in for it.
    pub fn open_account(&self, account_id: Uuid, balance: i32) -> Result<(), LedgerError> {
        let mut state = write(&self.state)?;
        state
            .accounts
            .insert(account_id, AccountRow { balance, version: 0 });
        Ok(())
    }

    /// Removes an account, as the user subsystem would on user deletion.
    pub fn close_account(&self, account_id: Uuid) -> Result<(), LedgerError> {
        write(&self.state)?.accounts.remove(&account_id);
        Ok(())
    }

    pub fn transaction_count(&self) -> Result<usize, LedgerError> {
        Ok(read(&self.state)?.transactions.len())
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    type Unit = InMemoryUnitOfWork;

    async fn begin(&self) -> Result<Self::Unit, LedgerError> {
        Ok(InMemoryUnitOfWork {
            state: Arc::clone(&self.state),
            staged_balances: HashMap::new(),
            staged_transactions: Vec::new(),
        })
    }

    async fn get_account_balance(&self, account_id: Uuid) -> Result<Account, LedgerError> {
        let state = read(&self.state)?;
        state
            .accounts
            .get(&account_id)
            .map(|row| Account {
                account_id,
                balance: row.balance,
            })
            .ok_or(LedgerError::AccountNotFound(account_id))
    }

    async fn list_transactions_by_account(
        &self,
        account_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LedgerTransaction>, LedgerError> {
        let state = read(&self.state)?;
        if !state.accounts.contains_key(&account_id) {
            return Err(LedgerError::AccountNotFound(account_id));
        }

        let mut rows: Vec<LedgerTransaction> = state
            .transactions
            .iter()
            .filter(|tx| tx.account_id == account_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        Ok(rows
            .into_iter()
            .skip(usize::try_from(offset.max(0)).unwrap_or(usize::MAX))
            .take(usize::try_from(limit.max(0)).unwrap_or(usize::MAX))
            .collect())
    }

    async fn get_transaction_by_id(&self, id: i32) -> Result<LedgerTransaction, LedgerError> {
        let state = read(&self.state)?;
        state
            .transactions
            .iter()
            .find(|tx| tx.id == id)
            .cloned()
            .ok_or(LedgerError::TransactionNotFound(id))
    }
}

#[derive(Debug, Clone, Copy)]
struct StagedBalance {
    expected_version: i64,
    balance: i32,
}

pub struct InMemoryUnitOfWork {
    state: Arc<RwLock<LedgerState>>,
    staged_balances: HashMap<Uuid, StagedBalance>,
    staged_transactions: Vec<LedgerTransaction>,
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn get_account(&mut self, account_id: Uuid) -> Result<AccountSnapshot, LedgerError> {
        if let Some(staged) = self.staged_balances.get(&account_id) {
            return Ok(AccountSnapshot {
                account_id,
                balance: staged.balance,
                version: staged.expected_version,
            });
        }

        let state = read(&self.state)?;
        let row = state
            .accounts
            .get(&account_id)
            .ok_or(LedgerError::AccountNotFound(account_id))?;
        Ok(AccountSnapshot {
            account_id,
            balance: row.balance,
            version: row.version,
        })
    }

    async fn set_account_balance(
        &mut self,
        expected: &AccountSnapshot,
        new_balance: i32,
    ) -> Result<Account, LedgerError> {
        {
            let state = read(&self.state)?;
            let row = state
                .accounts
                .get(&expected.account_id)
                .ok_or(LedgerError::AccountNotFound(expected.account_id))?;
            if row.version != expected.version {
                return Err(LedgerError::Conflict);
            }
        }

        self.staged_balances.insert(
            expected.account_id,
            StagedBalance {
                expected_version: expected.version,
                balance: new_balance,
            },
        );
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

        // Ids are reserved eagerly; a rolled back unit leaves a gap.
        let (id, committed_latest) = {
            let mut state = write(&self.state)?;
            state.next_id += 1;
            let latest = latest_for(&state.transactions, record.account_id);
            (state.next_id, latest)
        };
        let latest = committed_latest.max(latest_for(&self.staged_transactions, record.account_id));
        let stored = record.into_record(id, stamp_after(Utc::now(), latest));
        self.staged_transactions.push(stored.clone());
        Ok(stored)
    }

    async fn commit(self) -> Result<(), LedgerError> {
        let mut state = write(&self.state)?;

        for (account_id, staged) in &self.staged_balances {
            match state.accounts.get(account_id) {
                None => return Err(LedgerError::AccountNotFound(*account_id)),
                Some(row) if row.version != staged.expected_version => {
                    return Err(LedgerError::Conflict);
                }
                Some(_) => {}
            }
        }

        for (account_id, staged) in self.staged_balances {
            if let Some(row) = state.accounts.get_mut(&account_id) {
                row.balance = staged.balance;
                row.version += 1;
            }
        }
        state.transactions.extend(self.staged_transactions);
        Ok(())
    }

    async fn rollback(self) -> Result<(), LedgerError> {
        Ok(())
    }
}

fn latest_for(transactions: &[LedgerTransaction], account_id: Uuid) -> Option<DateTime<Utc>> {
    transactions
        .iter()
        .filter(|tx| tx.account_id == account_id)
        .map(|tx| tx.created_at)
        .max()
}

fn read(state: &RwLock<LedgerState>) -> Result<RwLockReadGuard<'_, LedgerState>, LedgerError> {
    state
        .read()
        .map_err(|_| LedgerError::CommitFailed("lock poisoned".to_string()))
}

fn write(state: &RwLock<LedgerState>) -> Result<RwLockWriteGuard<'_, LedgerState>, LedgerError> {
    state
        .write()
        .map_err(|_| LedgerError::CommitFailed("lock poisoned".to_string()))
}
