use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Charge,
    Spend,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Charge => "CHARGE",
            TransactionType::Spend => "SPEND",
        }
    }

    /// Signed delta for a positive magnitude.
    pub fn signed(&self, amount: i32) -> i32 {
        match self {
            TransactionType::Charge => amount,
            TransactionType::Spend => -amount,
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TransactionType {
    type Error = LedgerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "CHARGE" => Ok(TransactionType::Charge),
            "SPEND" => Ok(TransactionType::Spend),
            other => Err(LedgerError::CorruptRecord(format!(
                "unknown transaction type '{other}'"
            ))),
        }
    }
}

/// Coin wallet of a user. Shares its id with the owning user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: Uuid,
    pub balance: i32,
}

/// Account as read inside a unit of work, with the version used to detect
/// concurrent writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub account_id: Uuid,
    pub balance: i32,
    pub version: i64,
}

impl From<AccountSnapshot> for Account {
    fn from(snapshot: AccountSnapshot) -> Self {
        Account {
            account_id: snapshot.account_id,
            balance: snapshot.balance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: i32,
    pub account_id: Uuid,
    pub transaction_type: TransactionType,
    /// Signed delta: positive for charges, negative for spends.
    pub amount: i32,
    pub balance_after: i32,
    #[serde(rename = "order_id", skip_serializing_if = "Option::is_none", default)]
    pub order_reference: Option<i32>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Record handed to the store; id and created_at are assigned on insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLedgerTransaction {
    pub account_id: Uuid,
    pub transaction_type: TransactionType,
    pub amount: i32,
    pub balance_after: i32,
    pub order_reference: Option<i32>,
    pub description: String,
}

impl NewLedgerTransaction {
    pub fn into_record(self, id: i32, created_at: DateTime<Utc>) -> LedgerTransaction {
        LedgerTransaction {
            id,
            account_id: self.account_id,
            transaction_type: self.transaction_type,
            amount: self.amount,
            balance_after: self.balance_after,
            order_reference: self.order_reference,
            description: self.description,
            created_at,
        }
    }
}

/// One charge or spend to be committed. `amount` is always a positive
/// magnitude; the sign comes from `transaction_type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRequest {
    pub account_id: Uuid,
    pub transaction_type: TransactionType,
    pub amount: i32,
    pub description: String,
    pub order_reference: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerMutation {
    pub account: Account,
    pub transaction: LedgerTransaction,
}

/// Normalized paging window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub page_size: i64,
}

impl Pagination {
    pub fn normalize(page: i64, page_size: i64) -> Self {
        use crate::constants::{DEFAULT_PAGE, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

        let page = if page < 1 { DEFAULT_PAGE } else { page };
        let page_size = if page_size < 1 {
            DEFAULT_PAGE_SIZE
        } else {
            page_size.min(MAX_PAGE_SIZE)
        };
        Pagination { page, page_size }
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }
}

/// Creation time for a new record on an account: the clock, but never
/// earlier than the account's latest record, so a clock stepping back cannot
/// reorder history.
pub fn stamp_after(now: DateTime<Utc>, latest: Option<DateTime<Utc>>) -> DateTime<Utc> {
    latest.map_or(now, |latest| latest.max(now))
}

/// Replays the deltas of `transactions` (oldest first) from
/// `opening_balance` and checks every `balance_after` along the way, then the
/// final balance against `current_balance`.
pub fn replay_is_consistent(
    opening_balance: i32,
    transactions: &[LedgerTransaction],
    current_balance: i32,
) -> bool {
    let mut running = i64::from(opening_balance);
    for tx in transactions {
        running += i64::from(tx.amount);
        if running != i64::from(tx.balance_after) || running < 0 {
            return false;
        }
    }
    running == i64::from(current_balance)
}
