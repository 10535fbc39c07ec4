use serde::{Deserialize, Serialize};

/// Claims issued by the user service. `sub` carries the account id.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}
