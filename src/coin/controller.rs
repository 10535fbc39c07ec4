use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    auth::authenticate,
    constants::{BAD_REQUEST, INTERNAL_ERROR, NOT_FOUND, OK_RESPONSE, UNAUTHORIZED},
    error::LedgerError,
    req::Request,
    utils::{des_from_str, query_number, ser_to_str},
};

use super::{
    model::{LedgerMutation, Pagination},
    repo::LedgerStore,
    service::CoinService,
};

#[derive(Deserialize, Debug)]
pub struct CoinMutationBody {
    pub amount: i32,
    pub description: String,
    pub order_id: Option<i32>,
}

pub struct CoinController<S: LedgerStore> {
    service: CoinService<S>,
    public_key: DecodingKey,
}

impl<S: LedgerStore> CoinController<S> {
    pub fn new(service: CoinService<S>, public_key: DecodingKey) -> Self {
        CoinController {
            service,
            public_key,
        }
    }

    pub async fn charge(&self, request: &Request) -> (String, String) {
        let (account_id, body) = match self.mutation_input(request) {
            Ok(input) => input,
            Err(response) => return response,
        };
        let result = self
            .service
            .charge_user_coins(account_id, body.amount, &body.description, body.order_id)
            .await;
        mutation_response(result, "Coins charged successfully")
    }

    pub async fn spend(&self, request: &Request) -> (String, String) {
        let (account_id, body) = match self.mutation_input(request) {
            Ok(input) => input,
            Err(response) => return response,
        };
        let result = self
            .service
            .spend_user_coins(account_id, body.amount, &body.description, body.order_id)
            .await;
        mutation_response(result, "Coins spent successfully")
    }

    pub async fn transactions(&self, request: &Request) -> (String, String) {
        let account_id = match self.caller(request) {
            Ok(id) => id,
            Err(response) => return response,
        };
        let window = Pagination::normalize(
            query_number(&request.query, "page"),
            query_number(&request.query, "limit"),
        );

        match self
            .service
            .list_user_transactions(account_id, window.page, window.page_size)
            .await
        {
            Ok(transactions) => json_ok(&json!({
                "transactions": transactions,
                "page": window.page,
                "limit": window.page_size,
            })),
            Err(err) => error_response(&err),
        }
    }

    /// `id_segment` is the path segment after `/coins/transactions/`.
    pub async fn transaction(&self, request: &Request, id_segment: &str) -> (String, String) {
        let account_id = match self.caller(request) {
            Ok(id) => id,
            Err(response) => return response,
        };
        let Ok(id) = id_segment.parse::<i32>() else {
            return error_response(&LedgerError::InvalidId);
        };

        match self.service.get_transaction_by_id(id).await {
            // Other accounts' records are reported as absent.
            Ok(transaction) if transaction.account_id != account_id => {
                error_response(&LedgerError::TransactionNotFound(id))
            }
            Ok(transaction) => json_ok(&json!({ "transaction": transaction })),
            Err(err) => error_response(&err),
        }
    }

    pub async fn balance(&self, request: &Request) -> (String, String) {
        let account_id = match self.caller(request) {
            Ok(id) => id,
            Err(response) => return response,
        };
        match self.service.get_balance(account_id).await {
            Ok(account) => json_ok(&json!({ "account": account })),
            Err(err) => error_response(&err),
        }
    }

    fn caller(&self, request: &Request) -> Result<Uuid, (String, String)> {
        authenticate(&request.headers, &self.public_key).map_err(|err| {
            info!("Unauthorized request to {}: {}", request.path, err);
            (UNAUTHORIZED.to_string(), "".to_string())
        })
    }

    fn mutation_input(&self, request: &Request) -> Result<(Uuid, CoinMutationBody), (String, String)> {
        let account_id = self.caller(request)?;
        let body: CoinMutationBody = des_from_str(&request.body).map_err(|err| {
            info!("Invalid body on {}: {}", request.path, err);
            (
                BAD_REQUEST.to_string(),
                json!({ "error": "Invalid request" }).to_string(),
            )
        })?;
        Ok((account_id, body))
    }
}

fn mutation_response(result: Result<LedgerMutation, LedgerError>, message: &str) -> (String, String) {
    match result {
        Ok(mutation) => json_ok(&json!({
            "message": message,
            "account": mutation.account,
            "transaction": mutation.transaction,
        })),
        Err(err) => error_response(&err),
    }
}

fn json_ok(value: &serde_json::Value) -> (String, String) {
    match ser_to_str(value) {
        Ok(body) => (OK_RESPONSE.to_string(), body),
        Err(err) => {
            error!("serde error: {}", err);
            (INTERNAL_ERROR.to_string(), "".to_string())
        }
    }
}

pub fn error_response(err: &LedgerError) -> (String, String) {
    let status = match err {
        e if e.is_validation() => BAD_REQUEST,
        LedgerError::InsufficientFunds { .. } => BAD_REQUEST,
        e if e.is_not_found() => NOT_FOUND,
        other => {
            error!("Ledger failure: {:?}", other);
            return (
                INTERNAL_ERROR.to_string(),
                json!({ "error": "Internal server error" }).to_string(),
            );
        }
    };
    warn!("Request rejected: {}", err);
    (status.to_string(), json!({ "error": err.to_string() }).to_string())
}
