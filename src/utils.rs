use std::collections::HashMap;

use serde::{Serialize, de::DeserializeOwned};

pub fn des_from_str<T: DeserializeOwned>(string: &str) -> Result<T, serde_json::Error> {
    serde_json::from_str(string)
}

pub fn ser_to_str<T: Serialize>(t: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(t)
}

/// Token from an `Authorization: Bearer <token>` header. Header names are
/// expected lowercased, as `Request` stores them.
pub fn extract_token(headers: &HashMap<String, String>) -> Option<String> {
    let value = headers.get("authorization")?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
        return None;
    }
    Some(token.trim().to_string())
}

/// Numeric query parameter; absent or unparsable values read as 0 so the
/// caller's defaults apply.
pub fn query_number(query: &HashMap<String, String>, name: &str) -> i64 {
    query
        .get(name)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}
