#![allow(dead_code)]

use std::sync::{
    Arc, OnceLock,
    atomic::{AtomicU32, Ordering},
};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use coin_ledger::{
    auth::model::Claims,
    coin::{
        coordinator::{LedgerCoordinator, RetryPolicy},
        in_memory::{InMemoryLedgerStore, InMemoryUnitOfWork},
        model::{Account, AccountSnapshot, LedgerTransaction, NewLedgerTransaction},
        repo::{LedgerStore, UnitOfWork},
        repository::LedgerRepository,
        service::CoinService,
    },
    error::LedgerError,
};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use rand::Rng;
use rsa::{
    RsaPrivateKey, RsaPublicKey,
    pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding},
};
use sqlx::{AnyPool, any::install_default_drivers};
use uuid::Uuid;

const SQLITE_SCHEMA: &str = include_str!("../../schema/sqlite.sql");

pub async fn setup_test_db() -> AnyPool {
    install_default_drivers();
    let timestamp: String = rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(7)
        .map(char::from)
        .collect();
    let db_name = format!("test_{}", timestamp);
    let database_url = format!("sqlite:file:{}?mode=memory&cache=shared", db_name);

    // Create the pool (which will internally use shared memory DB)
    let pool = AnyPool::connect(&database_url)
        .await
        .expect("Failed to create in-memory SQLite DB");

    for statement in SQLITE_SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
        sqlx::query(statement)
            .execute(&pool)
            .await
            .expect("Failed to create test table");
    }

    pool
}

/// Inserts an account row the way the user service does on sign-up.
pub async fn seed_account(pool: &AnyPool, balance: i32) -> Uuid {
    let account_id = Uuid::new_v4();
    sqlx::query("INSERT INTO coin_accounts (account_id, balance) VALUES ($1, $2)")
        .bind(account_id.to_string())
        .bind(balance)
        .execute(pool)
        .await
        .expect("Failed to insert test account");
    account_id
}

pub fn test_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 5,
        backoff: Duration::from_millis(1),
        timeout: Duration::from_secs(5),
        commit_wait: Duration::from_secs(5),
    }
}

pub fn sql_service(pool: AnyPool) -> (Arc<LedgerRepository>, CoinService<LedgerRepository>) {
    let store = Arc::new(LedgerRepository::new(pool));
    let coordinator = LedgerCoordinator::new(Arc::clone(&store), test_policy());
    (Arc::clone(&store), CoinService::new(store, coordinator))
}

pub fn memory_service(
    store: &Arc<InMemoryLedgerStore>,
) -> CoinService<InMemoryLedgerStore> {
    let coordinator = LedgerCoordinator::new(Arc::clone(store), test_policy());
    CoinService::new(Arc::clone(store), coordinator)
}

pub struct TestKeys {
    pub encoding: EncodingKey,
    pub public_pem: String,
}

/// One throwaway RSA key pair per test binary.
pub fn test_keys() -> &'static TestKeys {
    static KEYS: OnceLock<TestKeys> = OnceLock::new();
    KEYS.get_or_init(|| {
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, 2048).expect("Failed to generate RSA key");
        let private_pem = private
            .to_pkcs8_pem(LineEnding::LF)
            .expect("Failed to encode private key");
        let public_pem = RsaPublicKey::from(&private)
            .to_public_key_pem(LineEnding::LF)
            .expect("Failed to encode public key");
        TestKeys {
            encoding: EncodingKey::from_rsa_pem(private_pem.as_bytes())
                .expect("Failed to load private key"),
            public_pem,
        }
    })
}

pub fn token_for(subject: &str) -> String {
    let claims = Claims {
        sub: subject.to_string(),
        exp: (Utc::now().timestamp() + 3600) as usize,
    };
    encode(&Header::new(Algorithm::RS256), &claims, &test_keys().encoding)
        .expect("Failed to sign token")
}

/// In-memory store with scripted misbehaviour, for exercising the
/// coordinator's failure paths.
#[derive(Default)]
pub struct ScriptedStore {
    pub inner: InMemoryLedgerStore,
    /// Every insert fails after the balance write went through.
    pub fail_inserts: bool,
    /// Commits that report a conflict before one is let through.
    pub conflicting_commits: AtomicU32,
    /// Yield to the scheduler between unit steps so concurrent callers
    /// interleave.
    pub interleave: bool,
    /// Sleep inside the unit before reading the account.
    pub stall: Option<Duration>,
    /// Sleep inside commit before applying the writes.
    pub commit_delay: Option<Duration>,
    /// Sleep inside commit after the writes are applied.
    pub ack_delay: Option<Duration>,
    pub begins: AtomicU32,
}

impl ScriptedStore {
    pub fn with_account(balance: i32) -> (Self, Uuid) {
        let store = ScriptedStore::default();
        let account_id = Uuid::new_v4();
        store
            .inner
            .open_account(account_id, balance)
            .expect("Failed to open account");
        (store, account_id)
    }

    pub fn attempts(&self) -> u32 {
        self.begins.load(Ordering::SeqCst)
    }
}

pub struct ScriptedUnit {
    inner: InMemoryUnitOfWork,
    fail_inserts: bool,
    conflict_on_commit: bool,
    interleave: bool,
    stall: Option<Duration>,
    commit_delay: Option<Duration>,
    ack_delay: Option<Duration>,
}

impl ScriptedUnit {
    async fn pause(&self) {
        if self.interleave {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl LedgerStore for ScriptedStore {
    type Unit = ScriptedUnit;

    async fn begin(&self) -> Result<Self::Unit, LedgerError> {
        self.begins.fetch_add(1, Ordering::SeqCst);
        let conflict_on_commit = self
            .conflicting_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        Ok(ScriptedUnit {
            inner: self.inner.begin().await?,
            fail_inserts: self.fail_inserts,
            conflict_on_commit,
            interleave: self.interleave,
            stall: self.stall,
            commit_delay: self.commit_delay,
            ack_delay: self.ack_delay,
        })
    }

    async fn get_account_balance(&self, account_id: Uuid) -> Result<Account, LedgerError> {
        self.inner.get_account_balance(account_id).await
    }

    async fn list_transactions_by_account(
        &self,
        account_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LedgerTransaction>, LedgerError> {
        self.inner
            .list_transactions_by_account(account_id, limit, offset)
            .await
    }

    async fn get_transaction_by_id(&self, id: i32) -> Result<LedgerTransaction, LedgerError> {
        self.inner.get_transaction_by_id(id).await
    }
}

#[async_trait]
impl UnitOfWork for ScriptedUnit {
    async fn get_account(&mut self, account_id: Uuid) -> Result<AccountSnapshot, LedgerError> {
        if let Some(stall) = self.stall {
            tokio::time::sleep(stall).await;
        }
        let snapshot = self.inner.get_account(account_id).await?;
        self.pause().await;
        Ok(snapshot)
    }

    async fn set_account_balance(
        &mut self,
        expected: &AccountSnapshot,
        new_balance: i32,
    ) -> Result<Account, LedgerError> {
        let account = self.inner.set_account_balance(expected, new_balance).await?;
        self.pause().await;
        Ok(account)
    }

    async fn insert_transaction(
        &mut self,
        record: NewLedgerTransaction,
    ) -> Result<LedgerTransaction, LedgerError> {
        if self.fail_inserts {
            return Err(LedgerError::DBError(sqlx::Error::Protocol(
                "injected insert fault".to_string(),
            )));
        }
        let stored = self.inner.insert_transaction(record).await?;
        self.pause().await;
        Ok(stored)
    }

    async fn commit(self) -> Result<(), LedgerError> {
        if self.conflict_on_commit {
            return Err(LedgerError::Conflict);
        }
        if let Some(delay) = self.commit_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.commit().await?;
        if let Some(delay) = self.ack_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn rollback(self) -> Result<(), LedgerError> {
        self.inner.rollback().await
    }
}
