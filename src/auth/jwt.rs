use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};

use crate::{auth::model::Claims, error::ServiceError};

pub fn get_public_key(pem: &str) -> Result<DecodingKey, ServiceError> {
    DecodingKey::from_rsa_pem(pem.replace("\\n", "\n").as_bytes()).map_err(ServiceError::KeyError)
}

pub fn verify_jwt(token: &str, key: &DecodingKey) -> Result<Claims, ServiceError> {
    let validation = Validation::new(Algorithm::RS256);
    decode::<Claims>(token, key, &validation)
        .map(|data| data.claims)
        .map_err(ServiceError::TokenError)
}
