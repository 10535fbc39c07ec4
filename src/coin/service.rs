use std::sync::Arc;

use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::LedgerError;

use super::{
    coordinator::LedgerCoordinator,
    model::{Account, LedgerMutation, LedgerTransaction, MutationRequest, Pagination, TransactionType},
    repo::LedgerStore,
};

pub struct CoinService<S: LedgerStore> {
    store: Arc<S>,
    coordinator: LedgerCoordinator<S>,
}

impl<S: LedgerStore> CoinService<S> {
    pub fn new(store: Arc<S>, coordinator: LedgerCoordinator<S>) -> Self {
        CoinService { store, coordinator }
    }

    /// Adds coins bought with real money.
    #[instrument(skip(self, description), err(Display))]
    pub async fn charge_user_coins(
        &self,
        account_id: Uuid,
        amount: i32,
        description: &str,
        order_reference: Option<i32>,
    ) -> Result<LedgerMutation, LedgerError> {
        self.mutate(TransactionType::Charge, account_id, amount, description, order_reference)
            .await
    }

    /// Deducts coins paid for an item.
    #[instrument(skip(self, description), err(Display))]
    pub async fn spend_user_coins(
        &self,
        account_id: Uuid,
        amount: i32,
        description: &str,
        order_reference: Option<i32>,
    ) -> Result<LedgerMutation, LedgerError> {
        self.mutate(TransactionType::Spend, account_id, amount, description, order_reference)
            .await
    }

    pub async fn list_user_transactions(
        &self,
        account_id: Uuid,
        page: i64,
        page_size: i64,
    ) -> Result<Vec<LedgerTransaction>, LedgerError> {
        let window = Pagination::normalize(page, page_size);
        self.store
            .list_transactions_by_account(account_id, window.limit(), window.offset())
            .await
    }

    pub async fn get_transaction_by_id(&self, id: i32) -> Result<LedgerTransaction, LedgerError> {
        if id <= 0 {
            return Err(LedgerError::InvalidId);
        }
        self.store.get_transaction_by_id(id).await
    }

    pub async fn get_balance(&self, account_id: Uuid) -> Result<Account, LedgerError> {
        self.store.get_account_balance(account_id).await
    }

    async fn mutate(
        &self,
        transaction_type: TransactionType,
        account_id: Uuid,
        amount: i32,
        description: &str,
        order_reference: Option<i32>,
    ) -> Result<LedgerMutation, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount);
        }
        if description.is_empty() {
            return Err(LedgerError::MissingDescription);
        }

        let mutation = self
            .coordinator
            .commit_mutation(&MutationRequest {
                account_id,
                transaction_type,
                amount,
                description: description.to_string(),
                order_reference,
            })
            .await?;

        info!(
            %account_id,
            transaction_id = mutation.transaction.id,
            balance = mutation.account.balance,
            "{} committed",
            transaction_type
        );
        Ok(mutation)
    }
}
