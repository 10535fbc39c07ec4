use std::{sync::Arc, time::Duration};

use tokio::time::Instant;
use tracing::{instrument, warn};

use crate::{
    config::Config,
    constants::{
        DEFAULT_LEDGER_COMMIT_WAIT_MS, DEFAULT_LEDGER_MAX_ATTEMPTS, DEFAULT_LEDGER_RETRY_BACKOFF_MS,
        DEFAULT_REQUEST_TIMEOUT_MS,
    },
    error::LedgerError,
};

use super::{
    guard::{BalanceGuard, NonNegativeBalance},
    model::{LedgerMutation, MutationRequest, NewLedgerTransaction},
    repo::{LedgerStore, UnitOfWork},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries, the first one included.
    pub max_attempts: u32,
    /// Sleep before retry `n` is `backoff * n`.
    pub backoff: Duration,
    /// Deadline for everything up to sending the commit, retries included.
    pub timeout: Duration,
    /// How long to wait for a commit acknowledgement once it is sent.
    pub commit_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: DEFAULT_LEDGER_MAX_ATTEMPTS,
            backoff: Duration::from_millis(DEFAULT_LEDGER_RETRY_BACKOFF_MS),
            timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            commit_wait: Duration::from_millis(DEFAULT_LEDGER_COMMIT_WAIT_MS),
        }
    }
}

impl From<&Config> for RetryPolicy {
    fn from(config: &Config) -> Self {
        RetryPolicy {
            max_attempts: config.ledger_max_attempts,
            backoff: config.ledger_retry_backoff,
            timeout: config.request_timeout,
            commit_wait: config.ledger_commit_wait,
        }
    }
}

/// Applies one balance change and its ledger record as a single unit.
pub struct LedgerCoordinator<S: LedgerStore, G: BalanceGuard = NonNegativeBalance> {
    store: Arc<S>,
    guard: G,
    policy: RetryPolicy,
}

impl<S: LedgerStore> LedgerCoordinator<S> {
    pub fn new(store: Arc<S>, policy: RetryPolicy) -> Self {
        Self::with_guard(store, NonNegativeBalance, policy)
    }
}

impl<S: LedgerStore, G: BalanceGuard> LedgerCoordinator<S, G> {
    pub fn with_guard(store: Arc<S>, guard: G, policy: RetryPolicy) -> Self {
        LedgerCoordinator {
            store,
            guard,
            policy,
        }
    }

    /// Commits `request` or leaves the store untouched.
    ///
    /// Conflicts are retried up to `max_attempts`; running out of attempts or
    /// of time before the commit is sent surfaces as `CommitFailed`, and
    /// nothing is persisted. A sent commit is never abandoned: it runs to
    /// completion, and if it is not acknowledged within `commit_wait` the
    /// result is `CommitUnconfirmed`. Validation, not-found and
    /// insufficient-funds errors are returned as-is on the first occurrence.
    #[instrument(
        skip(self, request),
        fields(
            account_id = %request.account_id,
            kind = %request.transaction_type,
            amount = request.amount
        ),
        err(Display)
    )]
    pub async fn commit_mutation(
        &self,
        request: &MutationRequest,
    ) -> Result<LedgerMutation, LedgerError> {
        let deadline = Instant::now() + self.policy.timeout;
        let mut attempt = 1;
        loop {
            let staged = tokio::time::timeout_at(deadline, self.begin_and_stage(request))
                .await
                .map_err(|_| self.timed_out())?;
            let outcome = match staged {
                Ok((unit, mutation)) => self.finish(unit).await.map(|()| mutation),
                Err(err) => Err(err),
            };

            match outcome {
                Err(LedgerError::Conflict) if attempt < self.policy.max_attempts => {
                    warn!(attempt, "ledger conflict, retrying");
                    tokio::time::timeout_at(
                        deadline,
                        tokio::time::sleep(self.policy.backoff * attempt),
                    )
                    .await
                    .map_err(|_| self.timed_out())?;
                    attempt += 1;
                }
                Err(LedgerError::Conflict) => {
                    return Err(LedgerError::CommitFailed(format!(
                        "account still contended after {attempt} attempts"
                    )));
                }
                Err(LedgerError::DBError(e)) => {
                    return Err(LedgerError::CommitFailed(e.to_string()));
                }
                other => return other,
            }
        }
    }

    fn timed_out(&self) -> LedgerError {
        LedgerError::CommitFailed(format!("timed out after {:?}", self.policy.timeout))
    }

    /// Everything before the commit. On error the unit is rolled back.
    async fn begin_and_stage(
        &self,
        request: &MutationRequest,
    ) -> Result<(S::Unit, LedgerMutation), LedgerError> {
        let mut unit = self.store.begin().await?;

        match self.stage(&mut unit, request).await {
            Ok(mutation) => Ok((unit, mutation)),
            Err(err) => {
                if let Err(rollback_err) = unit.rollback().await {
                    warn!(error = %rollback_err, "rollback failed; unit dropped");
                }
                Err(err)
            }
        }
    }

    /// Sends the commit on its own task so it completes even if this caller
    /// is cancelled, then waits up to `commit_wait` for the answer.
    async fn finish(&self, unit: S::Unit) -> Result<(), LedgerError> {
        let commit = tokio::spawn(unit.commit());
        match tokio::time::timeout(self.policy.commit_wait, commit).await {
            Ok(Ok(Ok(()))) => Ok(()),
            // The database refused the commit; nothing was applied.
            Ok(Ok(Err(LedgerError::DBError(e @ sqlx::Error::Database(_))))) => {
                Err(LedgerError::DBError(e))
            }
            // Connection lost mid-commit; the server may have applied it.
            Ok(Ok(Err(LedgerError::DBError(e)))) => {
                Err(LedgerError::CommitUnconfirmed(e.to_string()))
            }
            Ok(Ok(Err(err))) => Err(err),
            Ok(Err(join_err)) => Err(LedgerError::CommitUnconfirmed(join_err.to_string())),
            Err(_) => {
                warn!(wait = ?self.policy.commit_wait, "commit not acknowledged in time");
                Err(LedgerError::CommitUnconfirmed(format!(
                    "no acknowledgement after {:?}",
                    self.policy.commit_wait
                )))
            }
        }
    }

    async fn stage(
        &self,
        unit: &mut S::Unit,
        request: &MutationRequest,
    ) -> Result<LedgerMutation, LedgerError> {
        let snapshot = unit.get_account(request.account_id).await?;
        let delta = request.transaction_type.signed(request.amount);
        let new_balance = self.guard.apply_delta(snapshot.balance, delta)?;

        let account = unit.set_account_balance(&snapshot, new_balance).await?;
        let transaction = unit
            .insert_transaction(NewLedgerTransaction {
                account_id: request.account_id,
                transaction_type: request.transaction_type,
                amount: delta,
                balance_after: new_balance,
                order_reference: request.order_reference,
                description: request.description.clone(),
            })
            .await?;

        Ok(LedgerMutation {
            account,
            transaction,
        })
    }
}
