pub mod jwt;
pub mod model;

use std::collections::HashMap;

use jsonwebtoken::DecodingKey;
use uuid::Uuid;

use crate::{error::ServiceError, utils::extract_token};

/// Resolves the caller's account from the bearer token in `headers`.
pub fn authenticate(
    headers: &HashMap<String, String>,
    key: &DecodingKey,
) -> Result<Uuid, ServiceError> {
    let token = extract_token(headers).ok_or(ServiceError::MissingToken)?;
    let claims = jwt::verify_jwt(&token, key)?;
    Uuid::parse_str(&claims.sub).map_err(|_| ServiceError::InvalidSubject(claims.sub))
}
